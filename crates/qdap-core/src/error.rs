use thiserror::Error;

/// Errors produced by the debug adapter protocol layer.
///
/// The first five variants are the request-level taxonomy: every one of them is
/// converted into a failure response by the dispatcher. The rest belong to the
/// transport and end at most the affected connection.
#[derive(Debug, Error)]
pub enum DapError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("protocol sequence error: {0}")]
    ProtocolSequence(String),

    #[error("handler failed: {0}")]
    HandlerExecution(String),

    #[error("unrecognized command: {0}")]
    UnknownCommand(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request did not complete within {0} ms")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of a [`DapError`], used for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedRequest,
    Validation,
    ProtocolSequence,
    HandlerExecution,
    UnknownCommand,
    Transport,
}

impl DapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DapError::MalformedRequest(_) => ErrorKind::MalformedRequest,
            DapError::Validation(_) => ErrorKind::Validation,
            DapError::ProtocolSequence(_) => ErrorKind::ProtocolSequence,
            DapError::HandlerExecution(_) | DapError::Timeout(_) | DapError::Other(_) => {
                ErrorKind::HandlerExecution
            }
            DapError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            DapError::Codec(_) | DapError::Transport(_) | DapError::Io(_) => ErrorKind::Transport,
        }
    }
}

impl From<serde_json::Error> for DapError {
    fn from(e: serde_json::Error) -> Self {
        DapError::Codec(e.to_string())
    }
}

pub type DapResult<T> = Result<T, DapError>;
