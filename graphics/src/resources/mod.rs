//! GPU resources.
//!
//! This module contains the GPU resource types that are created by [`GraphicsDevice`]:
//! - [`Buffer`] - GPU memory buffer
//! - [`Texture`] - GPU texture/image
//! - [`ConstantRing`] - circular allocator streaming per-draw constants
//!
//! Buffers and textures are reference-counted with [`Arc`]. Each resource holds a
//! weak reference back to its parent device and tracks its current
//! [`ResourceState`](crate::types::ResourceState).
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice
//! [`Arc`]: std::sync::Arc

mod buffer;
mod constant_ring;
mod texture;

pub use buffer::Buffer;
pub use constant_ring::{CONSTANT_BUFFER_ALIGNMENT, ConstantRing, OverflowPolicy, RingAllocation};
pub use texture::Texture;
