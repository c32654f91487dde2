//! GPU backend abstraction layer.
//!
//! The resource core never talks to a graphics API directly; it goes through
//! the [`GpuBackend`] trait and the opaque handle enums defined here.
//!
//! # Available Backends
//!
//! - `dummy` (always compiled): software device for tests and headless runs
//! - `wgpu-backend`: cross-platform backend using wgpu
//! - `vulkan-backend`: native Vulkan backend using ash and gpu-allocator
//!
//! Each backend owns its native objects through its own handle structs; the
//! enums below only select between them.

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

pub mod dummy;

use std::sync::Arc;
use std::time::Duration;

use crate::command::Command;
use crate::error::GraphicsError;
use crate::instance::{BackendType, InstanceParameters};
use crate::types::{BufferDescriptor, TextureDescriptor};

/// Size in bytes between consecutive descriptor handles.
pub const DEFAULT_DESCRIPTOR_INCREMENT: u32 = 32;

/// Limits reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendCapabilities {
    /// Largest buffer the backend can allocate, in bytes.
    pub max_buffer_size: u64,
    /// Largest width or height of a 2D texture.
    pub max_texture_dimension: u32,
    /// Distance between adjacent descriptor handles in a heap.
    pub descriptor_increment: u32,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self {
            max_buffer_size: 1 << 30,
            max_texture_dimension: 16384,
            descriptor_increment: DEFAULT_DESCRIPTOR_INCREMENT,
        }
    }
}

/// Handle to a GPU buffer resource.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub enum GpuBuffer {
    /// Host memory standing in for GPU memory.
    Dummy(dummy::DummyBuffer),
    /// wgpu backend buffer
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu_backend::WgpuBuffer),
    /// Vulkan backend buffer
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanBuffer),
}

/// Handle to a GPU texture resource.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub enum GpuTexture {
    Dummy(dummy::DummyTexture),
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu_backend::WgpuTexture),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanTexture),
}

/// Handle to a GPU fence: a monotonically increasing 64-bit counter.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub enum GpuFence {
    /// Counter guarded by a mutex, waited on with a condition variable.
    Dummy(dummy::DummyFence),
    /// Map from signaled values to queue submission indices.
    #[cfg(feature = "wgpu-backend")]
    Wgpu(wgpu_backend::WgpuFence),
    /// Vulkan timeline semaphore.
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanFence),
}

/// Handle to the memory backing recorded commands.
#[derive(Debug)]
pub enum GpuCommandAllocator {
    Dummy,
    #[cfg(feature = "wgpu-backend")]
    Wgpu,
    /// Vulkan command pool.
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanCommandPool),
}

/// GPU backend trait for abstracting different GPU APIs.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Name of the adapter the backend runs on.
    fn adapter_name(&self) -> String;

    /// Limits of the underlying device.
    fn capabilities(&self) -> BackendCapabilities;

    /// Create a buffer resource in the memory heap the descriptor asks for.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError>;

    /// Copy `data` into a host-writable buffer at `offset`.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8])
    -> Result<(), GraphicsError>;

    /// Read `size` bytes at `offset` from a host-readable buffer.
    ///
    /// The caller must have waited for any GPU work writing the buffer.
    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64)
    -> Result<Vec<u8>, GraphicsError>;

    /// Create a texture resource.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError>;

    /// Create a fence whose counter starts at `initial_value`.
    fn create_fence(&self, initial_value: u64) -> Result<GpuFence, GraphicsError>;

    /// Highest value the GPU has reached on this fence.
    fn fence_completed_value(&self, fence: &GpuFence) -> Result<u64, GraphicsError>;

    /// Block until the fence reaches `value`.
    ///
    /// Returns `Ok(false)` if `timeout` elapsed first. With no timeout the
    /// wait is unbounded.
    fn wait_fence(
        &self,
        fence: &GpuFence,
        value: u64,
        timeout: Option<Duration>,
    ) -> Result<bool, GraphicsError>;

    /// Enqueue a GPU-side signal of `value`, ordered after all prior submissions.
    fn queue_signal(&self, fence: &GpuFence, value: u64) -> Result<(), GraphicsError>;

    /// Create the memory backing one command list's recordings.
    fn create_command_allocator(&self) -> Result<GpuCommandAllocator, GraphicsError>;

    /// Recycle an allocator. The GPU must be done with everything it backs.
    fn reset_command_allocator(&self, allocator: &GpuCommandAllocator)
    -> Result<(), GraphicsError>;

    /// Translate recorded commands into native work and submit them.
    fn execute_commands(
        &self,
        allocator: &GpuCommandAllocator,
        commands: &[Command],
    ) -> Result<(), GraphicsError>;
}

/// Selects and creates a backend according to `params`.
///
/// [`BackendType::Auto`] tries Vulkan, then wgpu, then falls back to the
/// dummy backend. Any explicit choice that cannot be satisfied is an error.
pub fn create_backend(
    params: &InstanceParameters,
) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    match params.backend {
        BackendType::Dummy => {
            log::info!("Using dummy backend");
            Ok(Arc::new(dummy::DummyBackend::new()))
        }
        BackendType::Vulkan => create_vulkan(params),
        BackendType::Wgpu => create_wgpu(params),
        BackendType::Auto => {
            match create_vulkan(params) {
                Ok(backend) => return Ok(backend),
                Err(e) => log::warn!("Failed to create Vulkan backend: {e}"),
            }
            match create_wgpu(params) {
                Ok(backend) => return Ok(backend),
                Err(e) => log::warn!("Failed to create wgpu backend: {e}"),
            }
            log::info!("Using dummy backend");
            Ok(Arc::new(dummy::DummyBackend::new()))
        }
    }
}

#[cfg(feature = "vulkan-backend")]
fn create_vulkan(params: &InstanceParameters) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    let backend = vulkan::VulkanBackend::with_params(params)?;
    log::info!("Using Vulkan backend (ash)");
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "vulkan-backend"))]
fn create_vulkan(_params: &InstanceParameters) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    Err(GraphicsError::FeatureNotSupported(
        "crate built without the `vulkan-backend` feature".to_string(),
    ))
}

#[cfg(feature = "wgpu-backend")]
fn create_wgpu(params: &InstanceParameters) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    let backend = wgpu_backend::WgpuBackend::with_params(params)?;
    log::info!("Using wgpu backend");
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "wgpu-backend"))]
fn create_wgpu(_params: &InstanceParameters) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    Err(GraphicsError::FeatureNotSupported(
        "crate built without the `wgpu-backend` feature".to_string(),
    ))
}

/// Check if a real GPU backend was compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(any(feature = "vulkan-backend", feature = "wgpu-backend"))
}

static_assertions::assert_impl_all!(GpuBuffer: Send, Sync);
static_assertions::assert_impl_all!(GpuTexture: Send, Sync);
static_assertions::assert_impl_all!(GpuFence: Send, Sync);
static_assertions::assert_impl_all!(GpuCommandAllocator: Send, Sync);
