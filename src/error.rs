use thiserror::Error;

/// Domain-error taxonomy. Every operation reports failures through this enum;
/// nothing in the core is retried or partially applied.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("record not found")]
    NotFound,
    #[error("cannot {action} a record in status '{status}'")]
    IllegalTransition {
        action: &'static str,
        status: String,
    },
    #[error("{0}")]
    Validation(String),
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    /// Wire error code for the IPC envelope.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound => "not_found",
            CoreError::IllegalTransition { .. } => "illegal_transition",
            CoreError::Validation(_) => "validation_error",
            CoreError::DuplicateKey(_) => "duplicate_key",
            CoreError::Db(_) => "db_query_failed",
        }
    }

    /// Maps a constraint violation onto `DuplicateKey(key)`; the UNIQUE
    /// indexes backstop the explicit pre-checks in the insert paths.
    pub fn from_insert(e: rusqlite::Error, key: &str) -> Self {
        if let rusqlite::Error::SqliteFailure(f, _) = &e {
            if f.code == rusqlite::ErrorCode::ConstraintViolation {
                return CoreError::DuplicateKey(key.to_string());
            }
        }
        CoreError::Db(e)
    }
}
