//! # Lumen Core
//!
//! GPU-agnostic data for the Lumen engine: CPU meshes, decoded textures and
//! the light layout shared with shaders.

pub mod light;
pub mod mesh;
pub mod profiling;
pub mod texture;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
