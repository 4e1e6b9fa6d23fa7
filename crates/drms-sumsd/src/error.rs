use drms_types::DrmsError;

#[derive(Debug, thiserror::Error)]
pub enum SumsError {
    #[error(transparent)]
    Drms(#[from] DrmsError),

    #[error(transparent)]
    Client(#[from] drms_client::ClientError),

    #[error(transparent)]
    Proto(#[from] drms_proto::ProtoError),

    #[error("archive worker in-box is closed")]
    WorkerGone,

    #[error("archive worker reply channel dropped before answering")]
    ReplyDropped,
}

pub type Result<T> = std::result::Result<T, SumsError>;
