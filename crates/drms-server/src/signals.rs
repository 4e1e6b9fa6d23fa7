//! The signal thread (spec §5: "one signal thread, which sigwaits
//! SIGINT/SIGTERM/SIGQUIT/SIGUSR1 and initiates graceful (USR1: commit) or
//! abort (others) shutdown"). Grounded on
//! `flow-worker::register_signal_handlers`'s `tokio::signal::unix::signal`
//! + `futures::select!` shape, extended from that function's two signals to
//! this spec's four.

use futures::{select, FutureExt};
use tokio::signal::unix::{signal, SignalKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    /// SIGUSR1: finish in-flight commits, flush the archive worker, exit 0.
    Commit,
    /// SIGINT/SIGTERM/SIGQUIT: drop in-flight work, exit 1.
    Abort,
}

/// Waits for the first shutdown-triggering signal and reports which kind
/// of shutdown it asked for.
pub fn register_signal_handlers() -> anyhow::Result<impl std::future::Future<Output = ShutdownKind>> {
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    Ok(async move {
        select! {
            _ = sigusr1.recv().fuse() => {
                tracing::info!("caught SIGUSR1; committing and shutting down");
                ShutdownKind::Commit
            }
            _ = sigint.recv().fuse() => {
                tracing::warn!("caught SIGINT; aborting");
                ShutdownKind::Abort
            }
            _ = sigterm.recv().fuse() => {
                tracing::warn!("caught SIGTERM; aborting");
                ShutdownKind::Abort
            }
            _ = sigquit.recv().fuse() => {
                tracing::warn!("caught SIGQUIT; aborting");
                ShutdownKind::Abort
            }
        }
    })
}
