use drms_types::DrmsError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Drms(#[from] DrmsError),

    #[error("catalog query failed: {0}")]
    Sql(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
