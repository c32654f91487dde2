//! Graphics error types.

use std::fmt;

use lumen_core::texture::TextureError;

/// Errors that can occur in the graphics system.
#[derive(Debug)]
pub enum GraphicsError {
    /// Failed to initialize the graphics system.
    InitializationFailed(String),
    /// Failed to create a resource.
    ResourceCreationFailed(String),
    /// A requested feature is not supported.
    FeatureNotSupported(String),
    /// Out of GPU memory.
    OutOfMemory,
    /// The GPU device was lost.
    DeviceLost,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An internal error occurred.
    Internal(String),
    /// A fixed-capacity allocator ran out of room.
    CapacityExceeded {
        /// Which allocator overflowed.
        resource: &'static str,
        /// Total capacity of the allocator.
        capacity: u64,
        /// Amount the failed request needed.
        requested: u64,
    },
    /// An operation was issued in a state that does not permit it.
    InvalidState(String),
    /// A texture file could not be loaded.
    TextureLoad(TextureError),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::FeatureNotSupported(msg) => write!(f, "feature not supported: {msg}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::CapacityExceeded {
                resource,
                capacity,
                requested,
            } => write!(
                f,
                "{resource} capacity exceeded: requested {requested}, capacity {capacity}"
            ),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::TextureLoad(e) => write!(f, "texture load failed: {e}"),
        }
    }
}

impl std::error::Error for GraphicsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TextureLoad(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TextureError> for GraphicsError {
    fn from(e: TextureError) -> Self {
        Self::TextureLoad(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::InitializationFailed("no GPU found".to_string());
        assert_eq!(err.to_string(), "initialization failed: no GPU found");

        let err = GraphicsError::CapacityExceeded {
            resource: "descriptor table",
            capacity: 4,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "descriptor table capacity exceeded: requested 5, capacity 4"
        );
    }

    #[test]
    fn test_texture_error_source() {
        use std::error::Error;

        let err = GraphicsError::from(TextureError::EmptyImage);
        assert!(matches!(err, GraphicsError::TextureLoad(_)));
        assert!(err.source().is_some());
    }
}
