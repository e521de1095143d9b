// Error types
// Failures raised by the editor commands; the window shell logs them and keeps going

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EditorError>;

#[derive(Debug, Error)]
pub enum EditorError {
    /// The file could not be read or is not a supported image
    #[error("failed to decode image {}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The image could not be encoded or written to disk
    #[error("failed to save image to {}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("no image loaded")]
    NoImageLoaded,

    #[error("{0} is not implemented")]
    Unimplemented(&'static str),

    #[error("invalid bitmap {width}x{height}: expected {expected} bytes, got {actual}")]
    InvalidBitmap {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}
