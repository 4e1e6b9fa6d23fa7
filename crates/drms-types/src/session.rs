//! Session identity and configuration (spec §3 "Session").
//!
//! The session's *runtime* behavior — caches, the SQL channel, temp-record
//! bookkeeping — lives in `drms-client`, which holds a [`SessionInfo`] as
//! its configuration. This module only carries the plain data.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: i64,
    pub namespace: String,
    /// Overrides the series' default retention when set; only takes effect
    /// if the session owns the series being archived (spec §4.7 "On
    /// opcode GET").
    pub retention_override: Option<i32>,
    /// Overrides the series' archive flag for this session's writes.
    pub archive_override: Option<crate::series::ArchiveFlag>,
}

impl SessionInfo {
    pub fn new(session_id: i64, namespace: impl Into<String>) -> Self {
        Self {
            session_id,
            namespace: namespace.into(),
            retention_override: None,
            archive_override: None,
        }
    }
}
