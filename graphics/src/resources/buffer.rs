//! GPU buffer resource.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::GpuBuffer;
use crate::device::GraphicsDevice;
use crate::types::{BufferDescriptor, BufferUsage, MemoryLocation, ResourceState};

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`]. Whoever holds
/// the `Arc<Buffer>` owns the GPU memory; views and descriptors that merely
/// refer to a buffer hold a [`Weak`] instead.
///
/// The buffer also tracks its [`ResourceState`] as of the most recently
/// recorded transition.
pub struct Buffer {
    device: Weak<GraphicsDevice>,
    descriptor: BufferDescriptor,
    gpu: GpuBuffer,
    state: Mutex<ResourceState>,
}

impl Buffer {
    pub(crate) fn new(
        device: Weak<GraphicsDevice>,
        descriptor: BufferDescriptor,
        gpu: GpuBuffer,
        initial_state: ResourceState,
    ) -> Self {
        Self {
            device,
            descriptor,
            gpu,
            state: Mutex::new(initial_state),
        }
    }

    /// Get the parent device, if it still exists.
    pub fn device(&self) -> Option<Arc<GraphicsDevice>> {
        self.device.upgrade()
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    pub fn location(&self) -> MemoryLocation {
        self.descriptor.location
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// State after the last recorded transition.
    pub fn state(&self) -> ResourceState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ResourceState) {
        *self.state.lock() = state;
    }

    pub(crate) fn gpu_handle(&self) -> &GpuBuffer {
        &self.gpu
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("location", &self.descriptor.location)
            .field("state", &self.state())
            .field("label", &self.descriptor.label)
            .finish()
    }
}

// Ensure Buffer is Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBuffer;

    fn detached(desc: BufferDescriptor) -> Buffer {
        let gpu = GpuBuffer::Dummy(DummyBuffer::new(desc.size, desc.location));
        Buffer::new(Weak::new(), desc, gpu, ResourceState::Common)
    }

    #[test]
    fn test_buffer_debug() {
        let buffer = detached(BufferDescriptor::new(1024, BufferUsage::VERTEX));
        let debug = format!("{:?}", buffer);
        assert!(debug.contains("Buffer"));
        assert!(debug.contains("1024"));
    }

    #[test]
    fn test_state_tracking() {
        let buffer = detached(BufferDescriptor::upload(256));
        assert_eq!(buffer.state(), ResourceState::Common);
        buffer.set_state(ResourceState::GenericRead);
        assert_eq!(buffer.state(), ResourceState::GenericRead);
        assert!(buffer.device().is_none());
    }
}
