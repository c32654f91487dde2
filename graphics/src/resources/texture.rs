//! GPU texture resource.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::backend::GpuTexture;
use crate::device::GraphicsDevice;
use crate::types::{Extent3d, ResourceState, TextureDescriptor, TextureFormat};

/// A GPU texture resource.
///
/// Textures are created by [`GraphicsDevice::create_texture`] and are
/// reference-counted. Like [`super::Buffer`], a texture tracks the state set
/// by the last recorded transition.
///
/// # Example
///
/// ```ignore
/// let texture = device.create_texture(&TextureDescriptor::new_2d(
///     256, 256,
///     TextureFormat::Rgba8Unorm,
///     TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
/// ))?;
/// assert_eq!(texture.state(), ResourceState::CopyDest);
/// ```
pub struct Texture {
    device: Weak<GraphicsDevice>,
    descriptor: TextureDescriptor,
    gpu: GpuTexture,
    state: Mutex<ResourceState>,
}

impl Texture {
    pub(crate) fn new(
        device: Weak<GraphicsDevice>,
        descriptor: TextureDescriptor,
        gpu: GpuTexture,
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

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    pub fn size(&self) -> Extent3d {
        self.descriptor.size
    }

    pub fn width(&self) -> u32 {
        self.descriptor.size.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.size.height
    }

    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// Get the texture label, if set.
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

    pub(crate) fn gpu_handle(&self) -> &GpuTexture {
        &self.gpu
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("size", &self.descriptor.size)
            .field("format", &self.descriptor.format)
            .field("state", &self.state())
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);
