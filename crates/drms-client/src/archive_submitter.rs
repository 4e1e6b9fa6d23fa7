//! The seam between a committing session and the archive worker (spec
//! §4.5 "On commit"). `drms-client` has no dependency on `drms-sumsd` (the
//! archive worker lives on the other side of that edge, and depends back
//! on this crate for `ClientSession`), so the submit call can't reach
//! `WorkerHandle` directly — this trait is the boundary, implemented later
//! by whatever owns the real connection. Grounded on
//! `control::services::builds_root::LocalBuildsRoot`'s `BuildsRootService`
//! seam around `tokio::fs`: a narrow async trait wrapping the one
//! operation the caller needs, so the session can be tested without a
//! running archive manager.

use async_trait::async_trait;
use drms_types::storage_unit::Sunum;

use crate::error::Result;

/// One unit's commit-time submission (spec §4.5 steps 1-4): the directory
/// holding its just-written `Records.txt`, whether it should be archived
/// to tape or just kept as a temporary holding area, and the retention
/// clamp to apply.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub sunum: Sunum,
    pub directory: String,
    pub archive: bool,
    pub retention_days: i32,
}

#[async_trait]
pub trait ArchiveSubmitter: Send + Sync {
    async fn submit(&self, request: SubmitRequest) -> Result<()>;
}

/// The default submitter for a session with nowhere to send committed
/// units (tests, and any series with no committable unit this commit) —
/// `submit` is simply never expected to be called in that case, but
/// `close_all` doesn't need to special-case "no submitter" when it always
/// has one.
#[derive(Debug, Default)]
pub struct NullArchiveSubmitter;

#[async_trait]
impl ArchiveSubmitter for NullArchiveSubmitter {
    async fn submit(&self, _request: SubmitRequest) -> Result<()> {
        Ok(())
    }
}
