//! Error taxonomy for the mask editor core.
//!
//! Every fallible operation is all-or-nothing: when one of these is returned
//! the layer stack, history and playback state are exactly as they were
//! before the call.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EditorError>;

#[derive(Error, Debug)]
pub enum EditorError {
    /// Malformed or out-of-range configuration input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Operation invoked without its structural requirements (too few layers,
    /// no selection, empty clipboard, playback running, ...).
    #[error("cannot do that now: {0}")]
    Precondition(String),

    /// Export / import file access failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Image decode / encode failure.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl EditorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EditorError::Validation(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        EditorError::Precondition(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, EditorError::Validation(_))
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, EditorError::Precondition(_))
    }
}
