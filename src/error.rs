//! Error types for the diffmatte crate.

use std::fmt;
use std::path::PathBuf;

/// Which input image a load failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    /// The white-background rendering.
    White,
    /// The black-background rendering.
    Black,
    /// A source photo the subject is extracted from.
    Input,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::White => "white-background",
            Self::Black => "black-background",
            Self::Input => "input",
        })
    }
}

/// A call made to the external background service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOperation {
    /// Generate a described subject on a white background.
    PlaceOnWhite,
    /// Cut a named subject out of a photo onto a white background.
    IsolateOnWhite,
    /// Swap a white background for a black one.
    EditToBlack,
}

impl ServiceOperation {
    /// Stable command-line name of the operation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlaceOnWhite => "place-on-white",
            Self::IsolateOnWhite => "isolate-on-white",
            Self::EditToBlack => "edit-to-black",
        }
    }
}

impl fmt::Display for ServiceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while acquiring a background pair or recovering alpha.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The supplied inputs do not resolve to any acquisition path.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The external background service failed or returned no usable image.
    #[error("service error during {operation}: {message}")]
    Service {
        /// The service call that failed.
        operation: ServiceOperation,
        /// Failure detail.
        message: String,
    },

    /// The pixel buffers disagree in size after dimension reconciliation.
    #[error("pixel buffer size mismatch: white has {white_len} bytes, black has {black_len}")]
    DimensionMismatch {
        /// Byte length of the white-background buffer.
        white_len: usize,
        /// Byte length of the black-background buffer.
        black_len: usize,
    },

    /// An input image could not be read or decoded.
    #[error("failed to load {role} image '{}': {source}", .path.display())]
    Load {
        /// Which input failed.
        role: ImageRole,
        /// Path that was being read.
        path: PathBuf,
        /// Underlying decode error.
        source: image::ImageError,
    },

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The output image format cannot carry an alpha channel losslessly.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (encode, save).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Shorthand for a [`Error::Service`] failure.
    pub fn service(operation: ServiceOperation, message: impl Into<String>) -> Self {
        Self::Service {
            operation,
            message: message.into(),
        }
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
