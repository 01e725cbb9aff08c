use thiserror::Error;

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("conflict check failed: {0}")]
    ConflictCheck(String),
}

pub type Result<T> = std::result::Result<T, DedupError>;
