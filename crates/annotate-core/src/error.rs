//! Error types for annotate-core

use thiserror::Error;

use crate::config::ConfigError;
use crate::content::{DecodeError, EncodeError};
use crate::gallery::GalleryError;
use crate::image_codec::ImageError;
use crate::remote::RemoteError;

/// Result type alias for annotate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for annotate operations
#[derive(Error, Debug)]
pub enum Error {
    /// No account is logged in, so there is no project to work on
    #[error("no active project: log in to a store account first")]
    NoActiveProject,

    /// Project or item content is not valid
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Content could not be serialized
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Image payload or channel layout problem
    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    /// Gallery lookup miss on a write path
    #[error("Gallery error: {0}")]
    Gallery(#[from] GalleryError),

    /// Failure reported by the store
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Bad or missing configuration
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Failures a read operation reports as "nothing there" instead of an error.
    pub(crate) fn is_soft(&self) -> bool {
        matches!(
            self,
            Error::Decode(_) | Error::Image(_) | Error::Gallery(_)
        )
    }
}

/// Log soft failures of a read operation and report them as `None`.
pub(crate) fn or_none<T>(result: Result<Option<T>>, context: &str) -> Result<Option<T>> {
    match result {
        Err(e) if e.is_soft() => {
            tracing::error!("error while {context}: {e}");
            Ok(None)
        }
        other => other,
    }
}
