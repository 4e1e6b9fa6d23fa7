/// A JSD parse error, with the 1-based source line it was found on when
/// known. Any error aborts the whole parse (spec §4.2 "Parser contract");
/// there is no partial template to recover.
#[derive(Debug, thiserror::Error)]
pub enum JsdError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("{0}")]
    Semantic(String),
}

impl JsdError {
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::Semantic(message.into())
    }
}

impl From<drms_types::DrmsError> for JsdError {
    fn from(e: drms_types::DrmsError) -> Self {
        JsdError::Semantic(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, JsdError>;
