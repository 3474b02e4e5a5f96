use crate::DocId;
use sled::transaction::TransactionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("URL must begin with http:// or https://: {0}")]
    InvalidUrl(String),

    #[error("bookmark already exists: {0}")]
    Duplicate(String),

    #[error("bookmark {0} does not exist")]
    NotFound(DocId),

    #[error(transparent)]
    Storage(#[from] sled::Error),

    #[error("corrupt record: {0}")]
    Codec(#[from] bincode::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("scrape queue has shut down")]
    QueueClosed,

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Storage failures may succeed on a later attempt; everything else is a caller mistake
    /// or an expected outcome.
    pub fn is_retryable(&self) -> bool { matches!(self, Error::Storage(_)) }
}

impl From<TransactionError<Error>> for Error {
    fn from(err: TransactionError<Error>) -> Self {
        match err {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => Error::Storage(err),
        }
    }
}

/// Failure of the network collaborator. Never fatal to the queue.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("server answered with status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// Status code recorded on the bookmark's page info.
    pub fn status_code(&self) -> u16 {
        match self {
            FetchError::Status(code) => *code,
            FetchError::Timeout | FetchError::Transport(_) => 0,
        }
    }
}
