//! Record/series/storage-unit caches, the session contract, link
//! resolution, and the SQL channel to the catalog (spec §4.3/4.4).

pub mod archive_submitter;
pub mod error;
pub mod link_resolver;
pub mod record_cache;
pub mod series_cache;
pub mod session;
pub mod sql_channel;
pub mod storage_unit_cache;

pub use archive_submitter::{ArchiveSubmitter, NullArchiveSubmitter, SubmitRequest};
pub use error::{ClientError, Result};
pub use link_resolver::LinkResolver;
pub use record_cache::RecordCache;
pub use series_cache::SeriesCache;
pub use session::{ClientSession, CloseAction};
pub use sql_channel::{PgSqlChannel, SeriesHeader, SqlChannel};
pub use storage_unit_cache::StorageUnitCache;
