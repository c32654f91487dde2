//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, resource states and the
//! descriptor structs used throughout the graphics system.

mod buffer;
mod state;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage, MemoryLocation};
pub use state::ResourceState;
pub use texture::{Extent3d, TextureDescriptor, TextureFormat, TextureUsage};
