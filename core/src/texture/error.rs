//! Error types for texture decoding.

use std::path::PathBuf;

/// Errors that can occur while loading or building a [`super::CpuTexture`].
#[derive(Debug)]
pub enum TextureError {
    /// The file could not be read.
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The bytes are not a supported image or are corrupt.
    Decode(image::ImageError),
    /// The image has a zero width or height.
    EmptyImage,
    /// Pixel data length does not match `width * height * 4`.
    InvalidData {
        /// Expected byte count.
        expected: usize,
        /// Provided byte count.
        actual: usize,
    },
}

impl std::fmt::Display for TextureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read texture {}: {source}", path.display())
            }
            Self::Decode(e) => write!(f, "image decode error: {e}"),
            Self::EmptyImage => write!(f, "image has zero width or height"),
            Self::InvalidData { expected, actual } => {
                write!(f, "expected {expected} bytes of RGBA8 data, got {actual}")
            }
        }
    }
}

impl std::error::Error for TextureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<image::ImageError> for TextureError {
    fn from(e: image::ImageError) -> Self {
        Self::Decode(e)
    }
}
