//! The storage-unit service daemon binary (spec §5, §6): CLI surface,
//! `tracing-subscriber` setup, a TCP listener wiring connections to
//! `drms-sumsd::Dispatcher`, and the signal thread. Grounded on
//! `agent/src/main.rs`'s `clap::Parser` + manual `tokio::runtime::Builder`
//! shape in the teacher.

mod config;
mod connection;
mod signals;
mod simulated_archive;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use drms_client::PgSqlChannel;
use drms_sumsd::{ArchiveWorker, Dispatcher, TcpArchiveClient};
use tokio::net::TcpListener;

use config::{Args, ServerConfig};
use signals::{register_signal_handlers, ShutdownKind};
use simulated_archive::SimulatedArchiveClient;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;
    tracing::info!(?args.listen_addr, ?args.database, simulate = args.simulate, "starting");

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(async_main(args));
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = ?e, "fatal error");
            std::process::exit(1);
        }
    }
}

fn init_tracing(args: &Args) -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let writer = match &args.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).context("creating --log-dir")?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join("drms-sumsd.log"))
                .context("opening log file")?;
            tracing_subscriber::fmt::writer::BoxMakeWriter::new(Arc::new(file))
        }
        None => tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stderr),
    };
    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(writer).finish();
    tracing::subscriber::set_global_default(subscriber).context("setting tracing default failed")?;
    Ok(())
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let pg_pool = sqlx::postgres::PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&args.database)
        .await
        .context("connecting to database")?;

    let worker = if args.simulate {
        let root = std::env::temp_dir().join("drms-sumsd-sim");
        std::fs::create_dir_all(&root).context("creating simulated archive root")?;
        ArchiveWorker::spawn(SimulatedArchiveClient::new(root, args.local_site))
    } else {
        let archive_addr = args.archive_addr.clone().context("--archive-addr is required unless --simulate is set")?;
        let client = TcpArchiveClient::connect(&archive_addr).await.context("connecting to archive manager")?;
        ArchiveWorker::spawn(client)
    };

    let dispatcher = Arc::new(
        Dispatcher::<PgSqlChannel>::new(worker.clone(), args.local_site)
            .with_session_overrides(args.retention_override, args.archive_flag()),
    );
    let server_config = Arc::new(ServerConfig::from_args(&args));

    let listener = TcpListener::bind(&args.listen_addr).await.context("binding client listener")?;
    tracing::info!(addr = %args.listen_addr, "listening for client connections");

    let accept_loop = {
        let dispatcher = dispatcher.clone();
        let server_config = server_config.clone();
        let pg_pool = pg_pool.clone();
        async move {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(ok) => ok,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                tracing::debug!(%peer, "accepted connection");
                let dispatcher = dispatcher.clone();
                let server_config = server_config.clone();
                let pg_pool = pg_pool.clone();
                tokio::spawn(async move {
                    connection::handle_connection(stream, &dispatcher, &server_config, || PgSqlChannel::new(pg_pool.clone(), server_config.default_namespace.clone())).await;
                    tracing::debug!(%peer, "connection closed");
                });
            }
        }
    };

    let shutdown = register_signal_handlers()?;
    tokio::select! {
        () = accept_loop => unreachable!("accept loop never returns"),
        kind = shutdown => {
            match kind {
                ShutdownKind::Commit => graceful_shutdown(&dispatcher, &worker).await,
                ShutdownKind::Abort => abort_shutdown(&worker),
            }
        }
    }
}

/// SIGUSR1 path (spec §5 "graceful (USR1: commit) shutdown", §4.6
/// "Shutdown protocol"): stop accepting opens, give open sessions a short
/// grace period to disconnect, then flush the archive worker.
async fn graceful_shutdown(dispatcher: &Dispatcher<PgSqlChannel>, worker: &drms_sumsd::WorkerHandle) -> anyhow::Result<()> {
    const GRACE_ATTEMPTS: u32 = 30;
    const GRACE_INTERVAL: std::time::Duration = std::time::Duration::from_millis(200);

    for attempt in 0..GRACE_ATTEMPTS {
        let (_, reply) = dispatcher.dispatch(0, drms_proto::Opcode::Shutdown, vec![("query".to_string(), drms_types::value::Value::Int(0))]).await;
        let safe = reply.iter().any(|(k, v)| k == "safe_to_halt" && matches!(v, drms_types::value::Value::Char(1)));
        if safe {
            break;
        }
        tracing::info!(attempt, "waiting for open sessions to disconnect");
        tokio::time::sleep(GRACE_INTERVAL).await;
    }

    worker.close().await.context("flushing archive worker")?;
    Ok(())
}

/// SIGINT/SIGTERM/SIGQUIT path (spec §5 "Cancellation"): no flush, just
/// stop the archive worker and a short grace interval before the caller
/// exits non-zero.
fn abort_shutdown(worker: &drms_sumsd::WorkerHandle) -> anyhow::Result<()> {
    worker.abort();
    Err(anyhow::anyhow!("aborted by signal"))
}
