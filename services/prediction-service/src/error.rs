use std::path::PathBuf;
use thiserror::Error;

use crate::normalize::Column;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything a request can fail with. Recovered at the request boundary and
/// rendered as a message; only the artifact variants make the service unavailable.
#[derive(Debug, Error)]
pub enum Error {
    #[error("`{}` not found. Export the model bundle and place it at this path.", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("Error loading model file: {0}")]
    ArtifactLoad(String),

    #[error("Prediction error: {0}")]
    Prediction(String),

    #[error("Value `{value}` for {field} is not in the stored encoding")]
    EncodingKeyMissing { field: Column, value: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Could not write prediction log: {0}")]
    Log(String),
}

impl Error {
    /// Artifact failures are preconditions for every interaction.
    pub fn halts_session(&self) -> bool {
        matches!(self, Error::ArtifactNotFound(_) | Error::ArtifactLoad(_))
    }

    /// Stable label for metrics and the JSON API.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ArtifactNotFound(_) => "artifact_not_found",
            Error::ArtifactLoad(_) => "artifact_load_error",
            Error::Prediction(_) => "prediction_error",
            Error::EncodingKeyMissing { .. } => "encoding_key_missing",
            Error::InvalidInput(_) => "invalid_input",
            Error::Log(_) => "log_error",
        }
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self { Error::Log(e.to_string()) }
}
