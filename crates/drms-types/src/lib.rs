//! Core data model for the DRMS record/series runtime: typed values, time
//! and slot arithmetic, keywords, links, segments, storage units, and the
//! session-scoped types the catalog runtime builds on.

pub mod error;
pub mod keyword;
pub mod link;
pub mod record;
pub mod segment;
pub mod series;
pub mod session;
pub mod storage_unit;
pub mod time;
pub mod value;

pub use error::{DrmsError, ErrorCategory, Result};
pub use keyword::{Keyword, LinkKeywordInfo, RecScope, SlotFlavor, SlotParams};
pub use link::{LinkDef, LinkKind, LinkValue, MAX_LINK_DEPTH};
pub use record::{Record, RecordLifetime, RecordState};
pub use segment::{Protocol, SegmentDef, SegmentScope, MAX_SEGMENT_RANK};
pub use series::{ArchiveFlag, PrimeKeyView, SeriesTemplate};
pub use session::SessionInfo;
pub use storage_unit::{SiteKind, SlotState, StorageUnit, Sunum, UnitMode};
pub use value::{Value, ValueType};
