#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(i32),

    #[error("truncated frame: expected at least {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("unknown key-value wire type tag {0}")]
    UnknownValueTag(u8),

    #[error("malformed key-value list: {0}")]
    MalformedKvList(String),

    #[error("malformed Records.txt manifest: {0}")]
    MalformedManifest(String),

    #[error("client did not advertise offline-read capability at OPEN")]
    OfflineReadUnsupported,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtoError>;
