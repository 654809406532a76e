use indexer_common::event::EventParseError;
use indexer_common::queue::QueueError;
use reqwest::StatusCode;
use thiserror::Error;

/// The source system could not give us a talk.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("cannot build a source system url for talk {talk_id}")]
    InvalidUrl { talk_id: String },
    #[error("request for talk {talk_id} failed: {error}")]
    RequestError {
        talk_id: String,
        error: reqwest::Error,
    },
    #[error("source system returned {status} for talk {talk_id}: {body}")]
    StatusError {
        talk_id: String,
        status: StatusCode,
        body: String,
    },
}

/// The source system answered with something that is not a talk.
#[derive(Error, Debug)]
#[error("could not decode talk {talk_id}: {error}")]
pub struct DecodeError {
    pub talk_id: String,
    pub error: serde_json::Error,
}

/// Enumeration of errors that can occur while computing a talk document.
#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// The search engine did not apply a write.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("cannot build a search engine url for document {talk_id}")]
    InvalidUrl { talk_id: String },
    #[error("request for document {talk_id} failed: {error}")]
    RequestError {
        talk_id: String,
        error: reqwest::Error,
    },
    #[error("search engine returned {status} for document {talk_id}: {body}")]
    Rejected {
        talk_id: String,
        status: StatusCode,
        body: String,
    },
    #[error("document {talk_id} does not exist")]
    DocumentMissing { talk_id: String },
}

/// Enumeration of errors related to processing a single queue message.
#[derive(Error, Debug)]
pub enum EventError {
    #[error(transparent)]
    Parse(#[from] EventParseError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("not applied after an earlier event for talk {talk_id} failed")]
    Deferred { talk_id: String },
}

impl EventError {
    /// A short, stable name for the error, used as metrics label and in dead letters.
    pub fn kind(&self) -> &'static str {
        match self {
            EventError::Parse(_) => "parse",
            EventError::Projection(ProjectionError::Fetch(_)) => "fetch",
            EventError::Projection(ProjectionError::Decode(_)) => "decode",
            EventError::Index(_) => "index",
            EventError::Deferred { .. } => "deferred",
        }
    }
}

/// Enumeration of errors related to initialization and consumption of queue messages.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("a queue error occurred: {0}")]
    QueueError(#[from] QueueError),
    #[error("failed to construct http client: {0}")]
    ClientError(#[from] reqwest::Error),
}
