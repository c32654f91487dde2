//! The resource context: one object owning every GPU resource allocator.
//!
//! A [`ResourceContext`] is built once from a device, a queue, a command list
//! and an allocator, and is then passed by `&mut` to whatever needs to
//! allocate: meshes upload static buffers through it, materials register
//! texture tables, the render loop streams constants.
//!
//! # Example
//!
//! ```ignore
//! let mut ctx = ResourceContext::from_device(device, ResourceConfig::default())?;
//! let mesh = GpuMesh::from_cpu(&mut ctx, &generators::generate_cube(0.5))?;
//! let albedo = ctx.load_texture("assets/albedo.png")?;
//! ctx.submit_and_reset()?;
//! ```

use std::path::Path;
use std::sync::Arc;

use lumen_core::texture::CpuTexture;

use crate::command::{CommandAllocator, CommandList, CommandQueue, CommandSession};
use crate::descriptors::{
    CpuDescriptorHandle, Descriptor, DescriptorHeap, DescriptorHeapDescriptor,
    DescriptorTableBuilder, GpuDescriptorHandle,
};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::{Buffer, ConstantRing, OverflowPolicy};
use crate::texture_loader::TextureLoader;
use crate::types::{BufferDescriptor, BufferUsage, ResourceState};
use crate::upload::{self, StaticBufferDescriptor};

/// Default number of 256-byte constant slots in the ring.
pub const DEFAULT_MAX_CONSTANT_BUFFERS: u32 = 1000;

/// Default number of texture views the descriptor tables can hold.
pub const DEFAULT_MAX_TEXTURE_DESCRIPTORS: u32 = 1000;

/// Sizes and policies of the context's allocators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceConfig {
    /// Ring capacity in 256-byte slots, also the size of the CBV region.
    pub max_constant_buffers: u32,
    /// Size of the SRV/UAV region and of the CPU-only view heap.
    pub max_texture_descriptors: u32,
    pub ring_overflow: OverflowPolicy,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_constant_buffers: DEFAULT_MAX_CONSTANT_BUFFERS,
            max_texture_descriptors: DEFAULT_MAX_TEXTURE_DESCRIPTORS,
            ring_overflow: OverflowPolicy::Wrap,
        }
    }
}

impl ResourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_constant_buffers(mut self, count: u32) -> Self {
        self.max_constant_buffers = count;
        self
    }

    pub fn with_max_texture_descriptors(mut self, count: u32) -> Self {
        self.max_texture_descriptors = count;
        self
    }

    pub fn with_ring_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.ring_overflow = policy;
        self
    }

    fn validate(&self) -> Result<(), GraphicsError> {
        if self.max_constant_buffers == 0 || self.max_texture_descriptors == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "resource limits must be non-zero: {self:?}"
            )));
        }
        if self
            .max_constant_buffers
            .checked_add(self.max_texture_descriptors)
            .is_none()
        {
            return Err(GraphicsError::InvalidParameter(
                "descriptor heap size overflows u32".to_string(),
            ));
        }
        Ok(())
    }
}

/// Owner of the command session, descriptor heaps, constant ring, table
/// builder and loaded textures.
///
/// Dropping the context waits for the GPU before anything is released.
pub struct ResourceContext {
    config: ResourceConfig,
    shader_heap: Arc<DescriptorHeap>,
    ring: ConstantRing,
    tables: DescriptorTableBuilder,
    textures: TextureLoader,
    session: CommandSession,
}

impl ResourceContext {
    /// Build the context around an existing queue, list and allocator.
    ///
    /// # Errors
    ///
    /// Any failure to create the fence, heaps or ring buffer aborts
    /// construction; there is no partially initialized context.
    pub fn new(
        device: Arc<GraphicsDevice>,
        queue: Arc<CommandQueue>,
        list: CommandList,
        allocator: CommandAllocator,
        config: ResourceConfig,
    ) -> Result<Self, GraphicsError> {
        config.validate()?;

        let session = CommandSession::new(Arc::clone(&device), queue, list, allocator)?;

        let shader_heap = device.create_descriptor_heap(
            &DescriptorHeapDescriptor::shader_visible(
                config.max_constant_buffers + config.max_texture_descriptors,
            )
            .with_label("shader_visible"),
        )?;
        let view_heap = device.create_descriptor_heap(
            &DescriptorHeapDescriptor::cpu_only(config.max_texture_descriptors)
                .with_label("texture_views"),
        )?;

        let ring = ConstantRing::new(
            Arc::clone(&device),
            Arc::clone(&shader_heap),
            config.max_constant_buffers,
            config.ring_overflow,
        )?;
        let tables = DescriptorTableBuilder::new(
            Arc::clone(&device),
            Arc::clone(&shader_heap),
            config.max_constant_buffers,
            config.max_texture_descriptors,
        )?;
        let textures = TextureLoader::new(view_heap)?;

        log::info!(
            "ResourceContext: {} constant slots, {} texture descriptors on {}",
            config.max_constant_buffers,
            config.max_texture_descriptors,
            device.name()
        );

        Ok(Self {
            config,
            shader_heap,
            ring,
            tables,
            textures,
            session,
        })
    }

    /// Build the context with a fresh queue, list and allocator.
    pub fn from_device(
        device: Arc<GraphicsDevice>,
        config: ResourceConfig,
    ) -> Result<Self, GraphicsError> {
        let queue = device.create_command_queue()?;
        let allocator = device.create_command_allocator()?;
        let list = device.create_command_list(Some("resource_context"));
        Self::new(device, queue, list, allocator, config)
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        self.session.device()
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn session(&self) -> &CommandSession {
        &self.session
    }

    /// Session for recording additional commands.
    pub fn session_mut(&mut self) -> &mut CommandSession {
        &mut self.session
    }

    /// The heap bound to shaders: constant views first, then texture tables.
    pub fn shader_visible_heap(&self) -> &Arc<DescriptorHeap> {
        &self.shader_heap
    }

    pub fn constant_ring(&self) -> &ConstantRing {
        &self.ring
    }

    pub fn table_builder(&self) -> &DescriptorTableBuilder {
        &self.tables
    }

    pub fn texture_loader(&self) -> &TextureLoader {
        &self.textures
    }

    /// Stage `data` into a new immutable GPU buffer.
    ///
    /// The contents are valid after the next [`submit_and_reset`](Self::submit_and_reset).
    pub fn create_static_buffer(
        &mut self,
        descriptor: &StaticBufferDescriptor,
        data: &[u8],
    ) -> Result<Arc<Buffer>, GraphicsError> {
        upload::create_static_buffer(&mut self.session, descriptor, data)
    }

    pub fn create_static_buffer_from_slice<T: bytemuck::Pod>(
        &mut self,
        items: &[T],
        usage: BufferUsage,
        label: Option<&str>,
    ) -> Result<Arc<Buffer>, GraphicsError> {
        upload::create_static_buffer_from_slice(&mut self.session, items, usage, label)
    }

    /// Execute everything recorded, wait for it and reopen the list.
    ///
    /// Constant data written before the call is retired afterwards, so the
    /// ring may reuse it.
    pub fn submit_and_reset(&mut self) -> Result<u64, GraphicsError> {
        let value = self.session.submit_and_reset()?;
        self.ring.retire();
        Ok(value)
    }

    pub fn wait_for_gpu(&self) -> Result<(), GraphicsError> {
        self.session.wait_for_gpu()
    }

    /// Stream constant data and return the handle of its view.
    pub fn write_constants(&mut self, data: &[u8]) -> Result<GpuDescriptorHandle, GraphicsError> {
        self.ring.write_constants(data)
    }

    pub fn write_constants_typed<T: bytemuck::Pod>(
        &mut self,
        value: &T,
    ) -> Result<GpuDescriptorHandle, GraphicsError> {
        self.ring.write_constants_typed(value)
    }

    /// Copy CPU views into consecutive shader-visible slots and return the
    /// handle of the first.
    pub fn append_views_and_get_table_handle(
        &mut self,
        views: &[CpuDescriptorHandle],
    ) -> Result<GpuDescriptorHandle, GraphicsError> {
        self.tables.append_views(views)
    }

    /// Reserve one table slot for a view written in place with
    /// [`write_view`](Self::write_view).
    pub fn reserve_descriptor_slot(
        &mut self,
    ) -> Result<(CpuDescriptorHandle, GpuDescriptorHandle), GraphicsError> {
        let (_, cpu, gpu) = self.tables.reserve_slot()?;
        Ok((cpu, gpu))
    }

    /// Write a view into a reserved slot of the shader-visible heap.
    pub fn write_view(
        &self,
        slot: CpuDescriptorHandle,
        descriptor: Descriptor,
    ) -> Result<(), GraphicsError> {
        let index = self.shader_heap.index_of_cpu(slot).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "handle {:#x} is not in the shader-visible heap",
                slot.ptr()
            ))
        })?;
        if index < self.config.max_constant_buffers {
            return Err(GraphicsError::InvalidParameter(format!(
                "slot {index} belongs to the constant ring"
            )));
        }
        if index >= self.tables.next_free_slot() {
            return Err(GraphicsError::InvalidParameter(format!(
                "slot {index} has not been reserved"
            )));
        }
        self.shader_heap.write(index, descriptor)
    }

    /// Decode and upload a texture file, returning its CPU-only view.
    pub fn load_texture(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<CpuDescriptorHandle, GraphicsError> {
        self.textures.load_texture(&mut self.session, path)
    }

    pub fn load_texture_from_memory(
        &mut self,
        image: &CpuTexture,
    ) -> Result<CpuDescriptorHandle, GraphicsError> {
        self.textures.load_from_memory(&mut self.session, image)
    }

    /// Copy a GPU buffer back to the CPU.
    ///
    /// Records the copy into a readback buffer and submits synchronously, so
    /// anything recorded earlier is flushed as well. Meant for debugging and
    /// tests.
    pub fn read_buffer(&mut self, buffer: &Arc<Buffer>) -> Result<Vec<u8>, GraphicsError> {
        let device = Arc::clone(self.session.device());
        let size = buffer.size();
        let readback = device.create_buffer(
            &BufferDescriptor::readback(size)
                .with_label(format!("{}_readback", buffer.label().unwrap_or("buffer"))),
        )?;

        let state = buffer.state();
        let list = self.session.list_mut();
        if state.allows_copy_source() {
            list.copy_buffer(buffer, 0, &readback, 0, size)?;
        } else {
            list.transition_buffer(buffer, state, ResourceState::CopySource)?;
            list.copy_buffer(buffer, 0, &readback, 0, size)?;
            list.transition_buffer(buffer, ResourceState::CopySource, state)?;
        }
        self.submit_and_reset()?;

        device.read_buffer(&readback, 0, size)
    }
}

impl Drop for ResourceContext {
    fn drop(&mut self) {
        if let Err(e) = self.session.wait_for_gpu() {
            log::warn!("ResourceContext: waiting for the GPU on drop failed: {e}");
        }
    }
}

impl std::fmt::Debug for ResourceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceContext")
            .field("config", &self.config)
            .field("ring", &self.ring)
            .field("next_table_slot", &self.tables.next_free_slot())
            .field("textures", &self.textures)
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{BackendType, GraphicsInstance, InstanceParameters};

    fn context(config: ResourceConfig) -> ResourceContext {
        let device = GraphicsInstance::with_parameters(
            InstanceParameters::new().with_backend(BackendType::Dummy),
        )
        .unwrap()
        .create_device()
        .unwrap();
        ResourceContext::from_device(device, config).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ResourceConfig::default();
        assert_eq!(config.max_constant_buffers, 1000);
        assert_eq!(config.max_texture_descriptors, 1000);
        assert_eq!(config.ring_overflow, OverflowPolicy::Wrap);
    }

    #[test]
    fn test_zero_limits_rejected() {
        let device = GraphicsInstance::with_parameters(
            InstanceParameters::new().with_backend(BackendType::Dummy),
        )
        .unwrap()
        .create_device()
        .unwrap();
        let config = ResourceConfig::new().with_max_constant_buffers(0);
        assert!(matches!(
            ResourceContext::from_device(device, config),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_heap_regions() {
        let ctx = context(
            ResourceConfig::new()
                .with_max_constant_buffers(8)
                .with_max_texture_descriptors(4),
        );
        assert_eq!(ctx.shader_visible_heap().capacity(), 12);
        assert_eq!(ctx.table_builder().next_free_slot(), 8);
        assert_eq!(ctx.constant_ring().capacity(), 8 * 256);
        assert_eq!(ctx.texture_loader().remaining(), 4);
    }

    #[test]
    fn test_static_buffer_round_trip() {
        let mut ctx = context(ResourceConfig::default());
        let data: Vec<u8> = (0..=255).collect();
        let buffer = ctx
            .create_static_buffer(
                &StaticBufferDescriptor::new(16, 16, BufferUsage::VERTEX),
                &data,
            )
            .unwrap();
        ctx.submit_and_reset().unwrap();
        assert_eq!(ctx.read_buffer(&buffer).unwrap(), data);
        assert_eq!(buffer.state(), ResourceState::GenericRead);
    }

    #[test]
    fn test_read_buffer_restores_state() {
        let mut ctx = context(ResourceConfig::default());
        let device = Arc::clone(ctx.device());
        let buffer = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::STORAGE))
            .unwrap();
        assert_eq!(buffer.state(), ResourceState::CopyDest);
        assert_eq!(ctx.read_buffer(&buffer).unwrap(), vec![0; 64]);
        assert_eq!(buffer.state(), ResourceState::CopyDest);
    }

    #[test]
    fn test_submit_retires_constants() {
        let mut ctx = context(
            ResourceConfig::new()
                .with_max_constant_buffers(2)
                .with_ring_overflow(OverflowPolicy::Error),
        );
        ctx.write_constants(&[0; 512]).unwrap();
        assert!(matches!(
            ctx.write_constants(&[0; 4]),
            Err(GraphicsError::CapacityExceeded { .. })
        ));
        ctx.submit_and_reset().unwrap();
        ctx.write_constants(&[0; 4]).unwrap();
        assert_eq!(ctx.constant_ring().wrap_count(), 1);
    }

    #[test]
    fn test_reserved_slot_accepts_view() {
        let mut ctx = context(
            ResourceConfig::new()
                .with_max_constant_buffers(2)
                .with_max_texture_descriptors(2),
        );
        let (cpu, gpu) = ctx.reserve_descriptor_slot().unwrap();
        ctx.write_view(cpu, Descriptor::UnorderedAccessView(std::sync::Weak::new()))
            .unwrap();
        assert!(matches!(
            ctx.shader_visible_heap().get_gpu(gpu),
            Some(Descriptor::UnorderedAccessView(_))
        ));

        let ring_slot = ctx.shader_visible_heap().cpu_handle(0).unwrap();
        assert!(ctx
            .write_view(ring_slot, Descriptor::UnorderedAccessView(std::sync::Weak::new()))
            .is_err());
    }

    #[test]
    fn test_unreserved_slot_rejects_view() {
        let mut ctx = context(
            ResourceConfig::new()
                .with_max_constant_buffers(2)
                .with_max_texture_descriptors(2),
        );
        let free = ctx.shader_visible_heap().cpu_handle(2).unwrap();
        assert!(matches!(
            ctx.write_view(free, Descriptor::UnorderedAccessView(std::sync::Weak::new())),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert!(ctx.shader_visible_heap().get(2).is_none());

        let (reserved, _) = ctx.reserve_descriptor_slot().unwrap();
        assert_eq!(reserved, free);
        ctx.write_view(reserved, Descriptor::UnorderedAccessView(std::sync::Weak::new()))
            .unwrap();

        let beyond = ctx.shader_visible_heap().cpu_handle(3).unwrap();
        assert!(ctx
            .write_view(beyond, Descriptor::UnorderedAccessView(std::sync::Weak::new()))
            .is_err());
    }
}
