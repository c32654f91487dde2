//! # Lumen Graphics
//!
//! GPU resource and descriptor management for the Lumen engine.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GraphicsInstance`] / [`GraphicsDevice`] - Backend selection and resource creation
//! - [`CommandSession`] - Record, submit and wait, with scratch buffers kept alive
//!   until the submission that reads them completes
//! - [`ConstantRing`] - Per-draw constants streamed into a 256-byte aligned ring
//! - [`DescriptorTableBuilder`] - Contiguous texture tables in the shader-visible heap
//! - [`TextureLoader`] - Image decode, upload and CPU-only views
//! - [`ResourceContext`] - The object owning all of the above, passed by `&mut`
//! - Multiple backend support: Vulkan, wgpu, and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use lumen_graphics::{GraphicsInstance, ResourceConfig, ResourceContext};
//!
//! let device = GraphicsInstance::new()?.create_device()?;
//! let mut ctx = ResourceContext::from_device(device, ResourceConfig::default())?;
//! let mesh = GpuMesh::from_cpu(&mut ctx, &generators::generate_sphere(1.0, 32, 16))?;
//! ctx.submit_and_reset()?;
//!
//! let draw = DrawConstants::write(&mut ctx, &vertex_data, &pixel_data)?;
//! ```

pub mod backend;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod instance;
pub mod materials;
pub mod mesh;
pub mod profiling;
pub mod raytracing;
pub mod resources;
pub mod sync;
pub mod texture_loader;
pub mod types;
pub mod uniforms;
pub mod upload;

// Re-export main types for convenience
pub use backend::{BackendCapabilities, GpuBackend};
pub use command::{CommandAllocator, CommandList, CommandQueue, CommandSession};
pub use context::{ResourceConfig, ResourceContext};
pub use descriptors::{
    CpuDescriptorHandle, Descriptor, DescriptorHeap, DescriptorTableBuilder, GpuDescriptorHandle,
};
pub use device::GraphicsDevice;
pub use error::GraphicsError;
pub use instance::{BackendType, GraphicsInstance, InstanceParameters, WgpuBackendType};
pub use materials::{Material, TextureSlot};
pub use mesh::{GpuMesh, IndexBufferView, VertexBufferView};
pub use raytracing::{GeometryInput, InstanceColorTable, RaytracingOutput};
pub use resources::{Buffer, ConstantRing, OverflowPolicy, Texture};
pub use sync::{Fence, FenceStatus};
pub use texture_loader::TextureLoader;
pub use types::{
    BufferDescriptor, BufferUsage, MemoryLocation, ResourceState, TextureDescriptor,
    TextureFormat, TextureUsage,
};
pub use uniforms::{DrawConstants, PixelShaderExternalData, VertexShaderExternalData};
pub use upload::StaticBufferDescriptor;

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);
static_assertions::assert_impl_all!(Buffer: Send, Sync);
static_assertions::assert_impl_all!(Texture: Send, Sync);
static_assertions::assert_impl_all!(DescriptorHeap: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_device() {
        let instance = GraphicsInstance::with_parameters(
            InstanceParameters::new().with_backend(BackendType::Dummy),
        )
        .unwrap();
        let device = instance.create_device().unwrap();
        assert_eq!(device.instance().backend_name(), "Dummy");
    }
}
