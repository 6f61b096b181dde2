use thiserror::Error;

use crate::model::ModelError;

#[derive(Debug, Error)]
pub enum Error {
    /// The endpoint could not be reached, rejected the request, or sent
    /// something unreadable.
    #[error("transport error: {0}")]
    Transport(#[source] ModelError),

    /// The answer stream broke after it had started.
    #[error("stream error: {0}")]
    Stream(#[source] ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
