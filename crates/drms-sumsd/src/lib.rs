//! Storage-unit service daemon: the per-call dispatcher (§4.6), the
//! archive-manager worker (§4.7), drive/tape occupancy (§4.5), and
//! remote-site fallback (§4.8).

pub mod archive_client;
pub mod dispatcher;
pub mod drive_model;
pub mod error;
pub mod remote_fallback;
pub mod worker;

pub use archive_client::{ArchiveClient, ArchiveUnit, GetOutcome, SubmitMode, TcpArchiveClient};
pub use dispatcher::Dispatcher;
pub use drive_model::{Drive, DriveId, DriveModel, DriveState, TapeId};
pub use error::{Result, SumsError};
pub use remote_fallback::{resolve_empty_sudir, FallbackOutcome, RemoteSiteResolver, ResolverVerdict};
pub use worker::{ArchiveWorker, WorkerHandle, WorkerRequest, ARCHIVE_BATCH_MAX, MAX_INVENTORY_RETRIES};
