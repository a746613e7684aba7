use reqwest::StatusCode;
use std::result::Result as StdResult;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON marshalling failed {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP IO failed {0}")]
    Http(#[from] reqwest::Error),

    #[error("{code} ({status}): {message}")]
    Rejected {
        status: StatusCode,
        code: String,
        message: String,
    },
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Rejected { status, .. } if *status == StatusCode::CONFLICT)
    }
}

pub type Result<A> = StdResult<A, Error>;
