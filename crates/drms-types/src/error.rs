/// Error taxonomy for the record/series runtime (spec §7).
///
/// Variants are grouped by who recovers: most of these are returned to the
/// caller as a typed status; a handful are logged and cause the owning
/// session to abort instead (`QueryFailed`, `ArchiveWorkerDied`).
#[derive(Debug, thiserror::Error)]
pub enum DrmsError {
    #[error("unknown series: {0}")]
    UnknownSeries(String),

    #[error("unknown keyword: {0}")]
    UnknownKeyword(String),

    #[error("unknown link: {0}")]
    UnknownLink(String),

    #[error("invalid keyword: {0}")]
    InvalidKeyword(String),

    #[error("invalid link: {0}")]
    InvalidLink(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid link type for link {0}")]
    InvalidLinkType(String),

    #[error("catalog returned an unexpected field count for {query}: expected {expected}, got {got}")]
    BadFieldCount {
        query: String,
        expected: usize,
        got: usize,
    },

    #[error("catalog returned a malformed result set: {0}")]
    BadQueryResult(String),

    #[error("keyword {0} is read-only on an open record")]
    KeywordReadOnly(String),

    #[error("record {0} is read-only")]
    RecordReadOnly(i64),

    #[error("link {0} is not set")]
    LinkNotSet(String),

    #[error("bad link {0}: {1}")]
    BadLink(String, String),

    #[error("link resolution exceeded the maximum chain depth ({0})")]
    LinkDepthExceeded(usize),

    #[error("failed to create directory {0}")]
    MkdirFailed(String),

    #[error("failed to create file {0}")]
    FileCreate(String),

    #[error("sunum {0} is not hosted at the local site")]
    SunumNotLocal(u64),

    #[error("storage unit is offline; try again later")]
    RemoteSumsTryLater,

    #[error("remote SUMS master resolver failed")]
    ErrorRemoteSumsMaster,

    #[error("a non-idempotent catalog statement failed: {0}")]
    QueryFailed(String),

    #[error("the archive worker thread could not be started: {0}")]
    ArchiveWorkerDied(String),

    #[error("the archive manager reports a tape read already pending for this unit")]
    ArchiveTapeReadPending,

    #[error("client did not advertise offline-read capability at OPEN")]
    OfflineReadUnsupported,
}

/// Error category, used to decide whether a [`DrmsError`] is reported to the
/// caller, surfaces only in logs while the session aborts, or is fatal to the
/// whole process (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    CallerRecovers,
    SessionAborts,
    Fatal,
}

impl DrmsError {
    pub fn category(&self) -> ErrorCategory {
        use DrmsError::*;
        match self {
            QueryFailed(_) | ArchiveWorkerDied(_) => ErrorCategory::SessionAborts,
            _ => ErrorCategory::CallerRecovers,
        }
    }

    /// The wire status code carried in `rinfo` (spec §6). 0 is reserved for
    /// success and is never produced by this mapping.
    pub fn rinfo(&self) -> i32 {
        use DrmsError::*;
        match self {
            UnknownSeries(_) => 101,
            UnknownKeyword(_) => 102,
            UnknownLink(_) => 103,
            InvalidKeyword(_) => 104,
            InvalidLink(_) => 105,
            InvalidData(_) => 106,
            InvalidLinkType(_) => 107,
            BadFieldCount { .. } => 108,
            BadQueryResult(_) => 109,
            KeywordReadOnly(_) => 110,
            RecordReadOnly(_) => 111,
            LinkNotSet(_) => 112,
            BadLink(..) => 113,
            LinkDepthExceeded(_) => 114,
            MkdirFailed(_) => 115,
            FileCreate(_) => 116,
            SunumNotLocal(_) => 117,
            RemoteSumsTryLater => 118,
            ErrorRemoteSumsMaster => 119,
            QueryFailed(_) => 120,
            ArchiveWorkerDied(_) => 121,
            ArchiveTapeReadPending => 122,
            OfflineReadUnsupported => 123,
        }
    }
}

pub type Result<T> = std::result::Result<T, DrmsError>;
