//! The archive worker (spec §4.7, §5): one dedicated task owning the
//! single connection to the external archive manager. Grounded on
//! `agent::handlers::serve`'s task-plus-channel shape (a background task
//! fed by an unbounded `mpsc` channel, driven from an async `select!` loop)
//! — this worker is simpler than the teacher's multi-handler dispatch loop
//! because it only ever drains one queue, so it's a plain `while let Some`
//! rather than a `select!` across several.
//!
//! Spec §4.6 step 5 describes a tagged out-box that a separate responder
//! thread matches back to the original caller. A `tokio::sync::oneshot`
//! embedded directly in each request *is* that tag — the channel itself
//! is the one-shot, single-consumer delivery path, so there's no separate
//! out-box queue or responder task to build.

use std::time::Duration;

use async_trait::async_trait;
use drms_client::{ArchiveSubmitter, SubmitRequest};
use drms_types::storage_unit::Sunum;
use tokio::sync::{mpsc, oneshot};

use crate::archive_client::{ArchiveClient, ArchiveUnit, GetOutcome, SubmitMode};
use crate::error::{Result, SumsError};

/// Inventory fetches that come back partial are retried up to this many
/// times before the caller gets `RemoteSumsTryLater` (SPEC_FULL §C.9, the
/// original's six-retry constant, preserved verbatim).
pub const MAX_INVENTORY_RETRIES: u32 = 6;

/// `GET`/`INFO` batch size ceiling (spec §4.5/§6, "empirically optimal for
/// the external manager").
pub const ARCHIVE_BATCH_MAX: usize = 64;

const ARCHIVE_WAIT_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug)]
pub enum WorkerRequest {
    Alloc {
        series: String,
        tapegroup: i32,
        bytes: u64,
        reply: oneshot::Sender<Result<ArchiveUnit>>,
    },
    Alloc2 {
        sunum: Sunum,
        series: String,
        tapegroup: i32,
        bytes: u64,
        reply: oneshot::Sender<Result<ArchiveUnit>>,
    },
    Get {
        sunums: Vec<Sunum>,
        retention_days: i32,
        reply: oneshot::Sender<Result<Vec<ArchiveUnit>>>,
    },
    Put {
        sunum: Sunum,
        directory: String,
        mode: SubmitMode,
        retention_days: i32,
        reply: oneshot::Sender<Result<()>>,
    },
    Info {
        sunums: Vec<Sunum>,
        reply: oneshot::Sender<Result<Vec<ArchiveUnit>>>,
    },
    /// Flush and exit (spec §4.7 step 8).
    Close { reply: oneshot::Sender<Result<()>> },
    /// Exit immediately without flushing (spec §4.7 step 9, §5 cancellation
    /// step c).
    Abort,
}

/// A handle dispatcher tasks hold to submit work to the archive worker.
/// Cloning is cheap (an `mpsc::UnboundedSender` clone); every dispatcher
/// call site gets its own clone rather than sharing one behind a lock,
/// since the channel itself serializes delivery into the worker's in-box
/// (spec §5 "processes requests in FIFO order of the in-box").
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<WorkerRequest>,
}

impl WorkerHandle {
    async fn roundtrip<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> WorkerRequest,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(build(reply_tx)).map_err(|_| SumsError::WorkerGone)?;
        reply_rx.await.map_err(|_| SumsError::ReplyDropped)?
    }

    pub async fn alloc(&self, series: &str, tapegroup: i32, bytes: u64) -> Result<ArchiveUnit> {
        self.roundtrip(|reply| WorkerRequest::Alloc {
            series: series.to_string(),
            tapegroup,
            bytes,
            reply,
        })
        .await
    }

    pub async fn alloc2(&self, sunum: Sunum, series: &str, tapegroup: i32, bytes: u64) -> Result<ArchiveUnit> {
        self.roundtrip(|reply| WorkerRequest::Alloc2 {
            sunum,
            series: series.to_string(),
            tapegroup,
            bytes,
            reply,
        })
        .await
    }

    pub async fn get(&self, sunums: &[Sunum], retention_days: i32) -> Result<Vec<ArchiveUnit>> {
        self.roundtrip(|reply| WorkerRequest::Get {
            sunums: sunums.to_vec(),
            retention_days,
            reply,
        })
        .await
    }

    pub async fn put(&self, sunum: Sunum, directory: &str, mode: SubmitMode, retention_days: i32) -> Result<()> {
        self.roundtrip(|reply| WorkerRequest::Put {
            sunum,
            directory: directory.to_string(),
            mode,
            retention_days,
            reply,
        })
        .await
    }

    pub async fn info(&self, sunums: &[Sunum]) -> Result<Vec<ArchiveUnit>> {
        self.roundtrip(|reply| WorkerRequest::Info {
            sunums: sunums.to_vec(),
            reply,
        })
        .await
    }

    pub async fn close(&self) -> Result<()> {
        self.roundtrip(|reply| WorkerRequest::Close { reply }).await
    }

    /// Posts `ABORT` without waiting for a reply (spec §5 cancellation
    /// step c, "posts CLOSE to the archive worker's in-box" — `ABORT` here
    /// since no flush should happen).
    pub fn abort(&self) {
        let _ = self.tx.send(WorkerRequest::Abort);
    }
}

/// The other side of `drms-client`'s archive seam (spec §4.5 "On
/// commit"): a committing session never sees `WorkerHandle` directly —
/// `ClientSession::with_submitter` is handed one behind this trait object
/// so the session crate never depends back on `drms-sumsd`.
#[async_trait]
impl ArchiveSubmitter for WorkerHandle {
    async fn submit(&self, request: SubmitRequest) -> drms_client::Result<()> {
        let mode = if request.archive { SubmitMode::Arch } else { SubmitMode::Temp };
        self.put(request.sunum, &request.directory, mode, request.retention_days)
            .await
            .map_err(to_client_error)
    }
}

fn to_client_error(err: SumsError) -> drms_client::ClientError {
    match err {
        SumsError::Drms(e) => drms_client::ClientError::Drms(e),
        SumsError::Client(e) => e,
        other => drms_client::ClientError::Drms(drms_types::DrmsError::QueryFailed(other.to_string())),
    }
}

pub struct ArchiveWorker<C: ArchiveClient> {
    client: C,
    rx: mpsc::UnboundedReceiver<WorkerRequest>,
}

impl<C: ArchiveClient> ArchiveWorker<C> {
    pub fn spawn(client: C) -> WorkerHandle
    where
        C: 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Self { client, rx };
        tokio::spawn(worker.run());
        WorkerHandle { tx }
    }

    #[tracing::instrument(skip(self))]
    async fn run(mut self) {
        while let Some(req) = self.rx.recv().await {
            match req {
                WorkerRequest::Alloc { series, tapegroup, bytes, reply } => {
                    let _ = reply.send(self.client.alloc(&series, tapegroup, bytes).await);
                }
                WorkerRequest::Alloc2 { sunum, series, tapegroup, bytes, reply } => {
                    let _ = reply.send(self.client.alloc2(sunum, &series, tapegroup, bytes).await);
                }
                WorkerRequest::Get { sunums, retention_days, reply } => {
                    let _ = reply.send(self.get_with_retry(&sunums, retention_days).await);
                }
                WorkerRequest::Put { sunum, directory, mode, retention_days, reply } => {
                    let _ = reply.send(self.client.put(sunum, &directory, mode, retention_days).await);
                }
                WorkerRequest::Info { sunums, reply } => {
                    let _ = reply.send(self.info_in_batches(&sunums).await);
                }
                WorkerRequest::Close { reply } => {
                    let result = self.client.close().await;
                    let _ = reply.send(result);
                    return;
                }
                WorkerRequest::Abort => {
                    tracing::warn!("archive worker aborting without flush");
                    return;
                }
            }
        }
    }

    /// `GET` (spec §4.7 step 5): on "pending", polls `wait` with a bounded
    /// timeout up to `MAX_INVENTORY_RETRIES` times before giving up with
    /// `RemoteSumsTryLater` — the "retry locally" policy of spec §7 for a
    /// partial inventory.
    async fn get_with_retry(&mut self, sunums: &[Sunum], retention_days: i32) -> Result<Vec<ArchiveUnit>> {
        match self.client.get(sunums, retention_days).await? {
            GetOutcome::Ready(units) => return Ok(units),
            GetOutcome::Pending => {}
        }

        for attempt in 1..=MAX_INVENTORY_RETRIES {
            tracing::debug!(attempt, "polling archive manager for pending inventory");
            match self.client.wait(sunums, ARCHIVE_WAIT_TIMEOUT).await {
                Ok(Some(units)) => return Ok(units),
                Ok(None) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(SumsError::Drms(drms_types::DrmsError::RemoteSumsTryLater))
    }

    async fn info_in_batches(&mut self, sunums: &[Sunum]) -> Result<Vec<ArchiveUnit>> {
        let mut out = Vec::with_capacity(sunums.len());
        for chunk in sunums.chunks(ARCHIVE_BATCH_MAX) {
            out.extend(self.client.info(chunk).await?);
        }
        Ok(out)
    }
}
