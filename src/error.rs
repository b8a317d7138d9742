//! Error types shared by cells, layers and optimizers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NnError {
    /// A tensor or state bundle does not have the shape (or arity) a component requires.
    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Invalid option or combination of options.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl NnError {
    pub fn shape_mismatch(
        context: impl Into<String>,
        expected: impl Into<Vec<usize>>,
        actual: impl Into<Vec<usize>>,
    ) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<serde_json::Error> for NnError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Crate result type. The error parameter defaults to [`NnError`] and can be
/// overridden, so derive macros that write `Result<T, E>` keep working in scope.
pub type Result<T, E = NnError> = std::result::Result<T, E>;
