//! Error types for entity decoding and encoding.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while turning remote text or local rows into entities.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The CSV text is structurally broken.
    #[error("CSV error on line {line}: {message}")]
    Csv {
        /// 1-based line where the problem was found.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// The JSON text could not be parsed or produced.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is JSON but has the wrong top-level shape.
    #[error("unexpected document shape: expected {expected}")]
    UnexpectedShape {
        /// What the decoder wanted.
        expected: &'static str,
    },

    /// An envelope declared a schema version newer than this build reads.
    #[error("unsupported schema version {found} (max {supported})")]
    UnsupportedSchema {
        /// Version found in the document.
        found: u64,
        /// Highest version understood.
        supported: u64,
    },
}

impl ModelError {
    /// Creates a CSV error.
    pub fn csv(line: usize, message: impl Into<String>) -> Self {
        Self::Csv {
            line,
            message: message.into(),
        }
    }
}
