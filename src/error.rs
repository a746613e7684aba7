use std::io;

use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to marshall json data {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error {0}")]
    Database(#[from] sqlx::Error),

    #[error("Malformed identifier {0}")]
    Identifier(#[from] uuid::Error),

    #[error("Malformed timestamp {0}")]
    Timestamp(#[from] time::error::ComponentRange),

    #[error("Password hashing failed {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("Background task failed {0}")]
    Task(#[from] JoinError),

    #[error("IO error {0}")]
    IoError(#[from] io::Error),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Generic error {0}")]
    Generic(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type Result<A> = std::result::Result<A, Error>;
