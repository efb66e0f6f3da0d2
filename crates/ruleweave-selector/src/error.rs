//! Selector errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("invalid selector '{selector}' at offset {offset}: {message}")]
    Parse {
        selector: String,
        offset: usize,
        message: String,
    },

    #[error("cannot patch '{key}': {message}")]
    TypeMismatch { key: String, message: String },
}

impl SelectorError {
    pub(crate) fn parse(selector: &str, offset: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            selector: selector.to_string(),
            offset,
            message: message.into(),
        }
    }
}
