//! Records (spec §3 "Record").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::link::LinkValue;
use crate::storage_unit::Sunum;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Series prototype, no data.
    Template,
    /// Writable, uncommitted.
    New,
    /// Read-only, loaded from the catalog.
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordLifetime {
    Permanent,
    /// Registered in the session's temp-record list; deleted at commit,
    /// or everything is discarded on abort (spec §4.3 "Temp-record
    /// registry").
    Transient,
}

/// An in-memory record. Immutable once committed (spec §3 "Record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub series: String,
    pub recnum: i64,
    pub sunum: Option<Sunum>,
    pub slot: Option<u32>,
    pub creator_session: i64,
    pub state: RecordState,
    pub lifetime: RecordLifetime,
    pub keywords: BTreeMap<String, Value>,
    pub links: BTreeMap<String, LinkValue>,
    /// Segment names present on this record; segment bytes live under the
    /// owning storage unit's slot directory, not in this struct (spec §3
    /// "Segment" is a file, not an in-memory value).
    pub segments: Vec<String>,
}

impl Record {
    pub fn is_open(&self) -> bool {
        self.state == RecordState::Open
    }

    /// Keyword/segment/link mutators must fail on a read-only (`Open`)
    /// record (spec §3 invariants, testable via `KeywordReadOnly`/
    /// `RecordReadOnly`).
    pub fn require_writable(&self) -> crate::error::Result<()> {
        if self.is_open() {
            Err(crate::error::DrmsError::RecordReadOnly(self.recnum))
        } else {
            Ok(())
        }
    }
}
