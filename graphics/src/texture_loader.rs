//! Texture loading: decode, upload, and describe with a CPU-only view.

use std::path::Path;
use std::sync::Arc;

use lumen_core::texture::CpuTexture;

use crate::command::CommandSession;
use crate::descriptors::{
    CpuDescriptorAllocator, CpuDescriptorHandle, Descriptor, DescriptorHeap, ViewTarget,
};
use crate::error::GraphicsError;
use crate::resources::Texture;
use crate::types::{ResourceState, TextureDescriptor, TextureFormat, TextureUsage};
use crate::upload;

/// Loads textures and owns them for the rest of the loader's life.
///
/// Each load creates an `Rgba8Unorm` texture, records the upload on the
/// session, and writes a shader resource view into the next slot of a
/// CPU-only heap. The returned [`CpuDescriptorHandle`] is later registered in
/// a descriptor table. The texture becomes readable by shaders after the
/// session's next submission.
pub struct TextureLoader {
    views: CpuDescriptorAllocator,
    textures: Vec<Arc<Texture>>,
}

impl TextureLoader {
    /// Use `heap` for the views. The heap must be CPU-only.
    pub fn new(heap: Arc<DescriptorHeap>) -> Result<Self, GraphicsError> {
        if heap.is_shader_visible() {
            return Err(GraphicsError::InvalidParameter(
                "texture views are staged in a CPU-only heap".to_string(),
            ));
        }
        Ok(Self {
            views: CpuDescriptorAllocator::new(heap),
            textures: Vec::new(),
        })
    }

    /// Decode the image at `path` and upload it.
    ///
    /// # Errors
    ///
    /// `TextureLoad` if the file cannot be read or decoded. No GPU resource
    /// is created in that case.
    pub fn load_texture(
        &mut self,
        session: &mut CommandSession,
        path: impl AsRef<Path>,
    ) -> Result<CpuDescriptorHandle, GraphicsError> {
        let path = path.as_ref();
        let image = CpuTexture::load(path).map_err(|e| {
            log::error!("Failed to load texture {}: {e}", path.display());
            GraphicsError::from(e)
        })?;
        self.load_from_memory(session, &image)
    }

    /// Upload already-decoded pixels.
    pub fn load_from_memory(
        &mut self,
        session: &mut CommandSession,
        image: &CpuTexture,
    ) -> Result<CpuDescriptorHandle, GraphicsError> {
        lumen_core::profile_function!();

        if self.views.remaining() == 0 {
            return Err(GraphicsError::CapacityExceeded {
                resource: "CPU descriptor heap",
                capacity: self.views.heap().capacity() as u64,
                requested: self.views.allocated() as u64 + 1,
            });
        }

        let mut descriptor = TextureDescriptor::new_2d(
            image.width(),
            image.height(),
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        );
        descriptor.label = image.label().map(str::to_owned);

        let device = Arc::clone(session.device());
        let texture = device.create_texture(&descriptor)?;
        upload::upload_texture_data(
            session,
            &texture,
            image.data(),
            ResourceState::PixelShaderResource,
        )?;

        let handle = self
            .views
            .allocate(Descriptor::ShaderResourceView(ViewTarget::Texture(
                Arc::downgrade(&texture),
            )))?;
        self.textures.push(texture);

        log::info!(
            "Loaded texture {:?} ({}x{})",
            image.label(),
            image.width(),
            image.height()
        );
        Ok(handle)
    }

    /// Textures loaded so far, in load order.
    pub fn textures(&self) -> &[Arc<Texture>] {
        &self.textures
    }

    /// Texture described by a view this loader handed out.
    pub fn texture_for(&self, handle: CpuDescriptorHandle) -> Option<&Arc<Texture>> {
        let index = self.views.heap().index_of_cpu(handle)?;
        self.textures.get(index as usize)
    }

    /// Number of further textures the view heap can describe.
    pub fn remaining(&self) -> u32 {
        self.views.remaining()
    }

    pub fn view_heap(&self) -> &Arc<DescriptorHeap> {
        self.views.heap()
    }
}

impl std::fmt::Debug for TextureLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureLoader")
            .field("loaded", &self.textures.len())
            .field("remaining", &self.remaining())
            .finish()
    }
}
