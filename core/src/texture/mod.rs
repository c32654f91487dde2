//! CPU-side texture types.
//!
//! Provides [`CpuTexture`] for holding decoded RGBA8 pixel data, and the
//! [`TextureError`] reported when a file cannot be decoded.

mod error;
mod types;

pub use error::TextureError;
pub use types::CpuTexture;
