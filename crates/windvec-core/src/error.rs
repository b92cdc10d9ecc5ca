use std::fmt;

use thiserror::Error;

/// Boxed error produced by an external training backend.
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during windvec core operations.
#[derive(Debug, Error)]
pub enum WindvecError {
    /// There is no data to process.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// A token or label is absent from a trained structure.
    #[error("{kind} not found: {key:?}")]
    NotFound {
        /// What was being looked up ("token", "label", ...).
        kind: &'static str,
        /// The missing key.
        key: String,
    },

    /// Malformed hyperparameters or inconsistent shapes.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The training backend failed. The cause is carried, never inspected.
    #[error("training failed: {0}")]
    TrainingFailed(#[source] BoxedCause),

    /// Training was stopped through a cancellation token.
    #[error("training cancelled after {completed_epochs} epoch(s)")]
    Cancelled {
        /// Epochs that finished before the token was observed.
        completed_epochs: usize,
    },

    /// A persisted artifact or corpus record is malformed.
    #[error("malformed data: {0}")]
    Format(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WindvecError {
    /// Shorthand for a missing token.
    pub fn token_not_found(token: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "token",
            key: token.into(),
        }
    }

    /// Shorthand for a missing label.
    pub fn label_not_found(label: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "label",
            key: label.into(),
        }
    }

    /// Wrap any backend error as `TrainingFailed`.
    pub fn training_failed<E>(cause: E) -> Self
    where
        E: Into<BoxedCause>,
    {
        Self::TrainingFailed(cause.into())
    }
}

impl From<serde_json::Error> for WindvecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}

impl From<safetensors::SafeTensorError> for WindvecError {
    fn from(err: safetensors::SafeTensorError) -> Self {
        Self::Format(err.to_string())
    }
}

impl From<regex::Error> for WindvecError {
    fn from(err: regex::Error) -> Self {
        Self::InvalidConfig(format!("noise pattern: {err}"))
    }
}

/// Result type alias for windvec operations.
pub type Result<T> = std::result::Result<T, WindvecError>;

/// Pipeline stage at which a fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Tokenization,
    Vocabulary,
    EmbeddingTraining,
    WindowBuilding,
    ClassifierTraining,
    Decoding,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Tokenization => "tokenization",
            Stage::Vocabulary => "vocabulary build",
            Stage::EmbeddingTraining => "embedding training",
            Stage::WindowBuilding => "window building",
            Stage::ClassifierTraining => "classifier training",
            Stage::Decoding => "decoding",
        };
        f.write_str(name)
    }
}

/// A fatal pipeline error tagged with the stage that produced it.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: WindvecError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: WindvecError) -> Self {
        Self { stage, source }
    }
}

/// Attach a [`Stage`] to a core result.
pub trait StageExt<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, PipelineError>;
}

impl<T> StageExt<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, PipelineError> {
        self.map_err(|source| PipelineError::new(stage, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = WindvecError::EmptyInput("corpus has no tokens".into());
        assert_eq!(err.to_string(), "empty input: corpus has no tokens");

        let err = WindvecError::token_not_found("zebra");
        assert!(err.to_string().contains("zebra"));
        assert!(err.to_string().starts_with("token"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WindvecError>();
        assert_send_sync::<PipelineError>();
    }

    #[test]
    fn training_failure_keeps_cause() {
        let io = std::io::Error::other("worker died");
        let err = WindvecError::training_failed(io);
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("worker died"));
    }

    #[test]
    fn pipeline_error_names_stage() {
        let result: Result<()> = Err(WindvecError::InvalidConfig("window".into()));
        let err = result.at(Stage::WindowBuilding).unwrap_err();
        assert_eq!(err.stage, Stage::WindowBuilding);
        assert!(err.to_string().starts_with("window building failed"));
    }
}
