//! Graphics device.
//!
//! The [`GraphicsDevice`] is the main interface for creating GPU resources.
//! It is created by [`GraphicsInstance::create_device`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::backend::{BackendCapabilities, GpuBackend};
use crate::command::{CommandAllocator, CommandList, CommandQueue};
use crate::descriptors::{
    CpuDescriptorHandle, Descriptor, DescriptorHeap, DescriptorHeapDescriptor,
    DescriptorHeapKind,
};
use crate::error::GraphicsError;
use crate::instance::GraphicsInstance;
use crate::resources::{Buffer, Texture};
use crate::sync::Fence;
use crate::types::{BufferDescriptor, MemoryLocation, ResourceState, TextureDescriptor};

/// First CPU descriptor address handed out.
const CPU_DESCRIPTOR_BASE: u64 = 0x1_0000;
/// First GPU descriptor address handed out.
const GPU_DESCRIPTOR_BASE: u64 = 0x1_0000_0000;
/// Heap address ranges are aligned to and separated by this many bytes.
const DESCRIPTOR_RANGE_ALIGNMENT: u64 = 0x1_0000;

/// A graphics device for creating GPU resources.
///
/// The device is created by [`GraphicsInstance::create_device`] and provides
/// methods for creating buffers, textures, fences, command objects and
/// descriptor heaps.
///
/// # Thread Safety
///
/// `GraphicsDevice` is `Send + Sync` and can be safely shared across threads.
/// All resource creation methods use interior mutability where needed.
///
/// # Example
///
/// ```ignore
/// let instance = GraphicsInstance::new()?;
/// let device = instance.create_device()?;
///
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))?;
/// assert_eq!(buffer.state(), ResourceState::CopyDest);
/// ```
pub struct GraphicsDevice {
    self_ref: Weak<GraphicsDevice>,
    instance: Arc<GraphicsInstance>,
    name: String,
    capabilities: BackendCapabilities,
    // Track allocated resources (weak references for cleanup/debugging)
    buffers: RwLock<Vec<Weak<Buffer>>>,
    textures: RwLock<Vec<Weak<Texture>>>,
    heaps: RwLock<Vec<Weak<DescriptorHeap>>>,
    next_cpu_address: AtomicU64,
    next_gpu_address: AtomicU64,
}

impl GraphicsDevice {
    pub(crate) fn new(
        instance: Arc<GraphicsInstance>,
        name: String,
        capabilities: BackendCapabilities,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            instance,
            name,
            capabilities,
            buffers: RwLock::new(Vec::new()),
            textures: RwLock::new(Vec::new()),
            heaps: RwLock::new(Vec::new()),
            next_cpu_address: AtomicU64::new(CPU_DESCRIPTOR_BASE),
            next_gpu_address: AtomicU64::new(GPU_DESCRIPTOR_BASE),
        })
    }

    /// Get the parent instance.
    pub fn instance(&self) -> &Arc<GraphicsInstance> {
        &self.instance
    }

    /// Get the device (adapter) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device capabilities.
    pub fn capabilities(&self) -> &BackendCapabilities {
        &self.capabilities
    }

    /// Distance in bytes between adjacent descriptor handles.
    pub fn descriptor_increment(&self) -> u32 {
        self.capabilities.descriptor_increment
    }

    pub(crate) fn backend(&self) -> &Arc<dyn GpuBackend> {
        self.instance.backend()
    }

    fn arc_self(&self) -> Result<Arc<Self>, GraphicsError> {
        self.self_ref.upgrade().ok_or_else(|| {
            GraphicsError::InvalidState("device has been dropped".to_string())
        })
    }

    /// Create a GPU buffer.
    ///
    /// The initial state follows the memory location: upload buffers start in
    /// [`ResourceState::GenericRead`], GPU-only and readback buffers in
    /// [`ResourceState::CopyDest`].
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer size exceeds device limits or allocation fails.
    pub fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
    ) -> Result<Arc<Buffer>, GraphicsError> {
        if descriptor.size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }
        if descriptor.size > self.capabilities.max_buffer_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer size {} exceeds maximum {}",
                descriptor.size, self.capabilities.max_buffer_size
            )));
        }

        let gpu = self.backend().create_buffer(descriptor)?;
        let initial_state = match descriptor.location {
            MemoryLocation::Upload => ResourceState::GenericRead,
            MemoryLocation::GpuOnly | MemoryLocation::Readback => ResourceState::CopyDest,
        };
        let buffer = Arc::new(Buffer::new(
            self.self_ref.clone(),
            descriptor.clone(),
            gpu,
            initial_state,
        ));

        if let Ok(mut buffers) = self.buffers.write() {
            buffers.retain(|w| w.strong_count() > 0);
            buffers.push(Arc::downgrade(&buffer));
        }

        log::trace!(
            "GraphicsDevice: created buffer {:?}, size={}, location={:?}",
            descriptor.label,
            descriptor.size,
            descriptor.location
        );

        Ok(buffer)
    }

    /// Create a GPU texture in [`ResourceState::CopyDest`].
    ///
    /// # Errors
    ///
    /// Returns an error if the texture dimensions exceed device limits or allocation fails.
    pub fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<Arc<Texture>, GraphicsError> {
        let max_dim = self.capabilities.max_texture_dimension;
        if descriptor.size.width > max_dim
            || descriptor.size.height > max_dim
            || descriptor.size.depth > max_dim
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture dimension exceeds maximum {max_dim}"
            )));
        }

        if descriptor.size.width == 0 || descriptor.size.height == 0 || descriptor.size.depth == 0
        {
            return Err(GraphicsError::InvalidParameter(
                "texture dimensions cannot be zero".to_string(),
            ));
        }

        let gpu = self.backend().create_texture(descriptor)?;
        let texture = Arc::new(Texture::new(
            self.self_ref.clone(),
            descriptor.clone(),
            gpu,
            ResourceState::CopyDest,
        ));

        if let Ok(mut textures) = self.textures.write() {
            textures.retain(|w| w.strong_count() > 0);
            textures.push(Arc::downgrade(&texture));
        }

        log::trace!(
            "GraphicsDevice: created texture {:?}, size={}x{}",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height
        );

        Ok(texture)
    }

    /// Host write into an [`MemoryLocation::Upload`] buffer.
    pub fn write_buffer(
        &self,
        buffer: &Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        if !buffer.location().is_host_writable() {
            return Err(GraphicsError::InvalidState(format!(
                "buffer {:?} in {:?} memory is not host-writable",
                buffer.label(),
                buffer.location()
            )));
        }
        check_host_range(buffer, offset, data.len() as u64)?;
        self.backend()
            .write_buffer(buffer.gpu_handle(), offset, data)
    }

    /// Host read from a [`MemoryLocation::Readback`] buffer.
    ///
    /// The caller must have waited for the GPU work that filled it.
    pub fn read_buffer(
        &self,
        buffer: &Buffer,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        if !buffer.location().is_host_readable() {
            return Err(GraphicsError::InvalidState(format!(
                "buffer {:?} in {:?} memory is not host-readable",
                buffer.label(),
                buffer.location()
            )));
        }
        check_host_range(buffer, offset, size)?;
        self.backend().read_buffer(buffer.gpu_handle(), offset, size)
    }

    /// Create a fence with its counter at zero.
    ///
    /// # Errors
    ///
    /// Fence creation failure is fatal for whoever needs the fence; there is
    /// no fallback synchronization.
    pub fn create_fence(&self) -> Result<Fence, GraphicsError> {
        let gpu = self.backend().create_fence(0).map_err(|e| {
            GraphicsError::InitializationFailed(format!("fence creation failed: {e}"))
        })?;
        log::trace!("GraphicsDevice: created fence");
        Ok(Fence::new(self.arc_self()?, gpu))
    }

    /// Create the queue commands are submitted to.
    pub fn create_command_queue(&self) -> Result<Arc<CommandQueue>, GraphicsError> {
        Ok(Arc::new(CommandQueue::new(self.arc_self()?)))
    }

    pub fn create_command_allocator(&self) -> Result<CommandAllocator, GraphicsError> {
        let gpu = self.backend().create_command_allocator()?;
        Ok(CommandAllocator::new(self.arc_self()?, gpu))
    }

    /// Create a command list, open for recording.
    pub fn create_command_list(&self, label: Option<&str>) -> CommandList {
        CommandList::new(label.map(str::to_owned))
    }

    /// Create a descriptor heap with its own handle address range.
    pub fn create_descriptor_heap(
        &self,
        descriptor: &DescriptorHeapDescriptor,
    ) -> Result<Arc<DescriptorHeap>, GraphicsError> {
        if descriptor.capacity == 0 {
            return Err(GraphicsError::InvalidParameter(
                "descriptor heap capacity cannot be zero".to_string(),
            ));
        }

        let increment = self.descriptor_increment();
        let span = (descriptor.capacity as u64 * increment as u64)
            .next_multiple_of(DESCRIPTOR_RANGE_ALIGNMENT)
            + DESCRIPTOR_RANGE_ALIGNMENT;
        let cpu_start = self.next_cpu_address.fetch_add(span, Ordering::Relaxed);
        let gpu_start = (descriptor.kind == DescriptorHeapKind::ShaderVisible)
            .then(|| self.next_gpu_address.fetch_add(span, Ordering::Relaxed));

        let heap = Arc::new(DescriptorHeap::new(
            descriptor.clone(),
            cpu_start,
            gpu_start,
            increment,
        ));

        if let Ok(mut heaps) = self.heaps.write() {
            heaps.retain(|w| w.strong_count() > 0);
            heaps.push(Arc::downgrade(&heap));
        }

        log::trace!(
            "GraphicsDevice: created {:?} descriptor heap {:?}, capacity={}",
            descriptor.kind,
            descriptor.label,
            descriptor.capacity
        );

        Ok(heap)
    }

    /// Find the live heap a CPU handle points into, with the slot index.
    pub fn resolve_cpu_handle(
        &self,
        handle: CpuDescriptorHandle,
    ) -> Option<(Arc<DescriptorHeap>, u32)> {
        let heaps = self.heaps.read().ok()?;
        heaps.iter().filter_map(Weak::upgrade).find_map(|heap| {
            let index = heap.index_of_cpu(handle)?;
            Some((heap, index))
        })
    }

    /// Contents of the slot a CPU handle points at.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the handle belongs to no live heap,
    /// `InvalidState` if the slot was never written.
    pub fn resolve_cpu_descriptor(
        &self,
        handle: CpuDescriptorHandle,
    ) -> Result<Descriptor, GraphicsError> {
        let (heap, index) = self.resolve_cpu_handle(handle).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "descriptor handle {:#x} does not belong to a live heap",
                handle.ptr()
            ))
        })?;
        heap.get(index).ok_or_else(|| {
            GraphicsError::InvalidState(format!(
                "descriptor slot {index} of heap {:?} is empty",
                heap.label()
            ))
        })
    }

    /// Copy `count` descriptors starting at `src` to the range starting at `dst`.
    pub fn copy_descriptors_simple(
        &self,
        count: u32,
        dst: CpuDescriptorHandle,
        src: CpuDescriptorHandle,
    ) -> Result<(), GraphicsError> {
        let unknown = |handle: CpuDescriptorHandle| {
            GraphicsError::InvalidParameter(format!(
                "descriptor handle {:#x} does not belong to a live heap",
                handle.ptr()
            ))
        };
        let (dst_heap, dst_index) = self.resolve_cpu_handle(dst).ok_or_else(|| unknown(dst))?;
        let (src_heap, src_index) = self.resolve_cpu_handle(src).ok_or_else(|| unknown(src))?;
        dst_heap.copy_from(dst_index, &src_heap, src_index, count)
    }

    /// Get the number of live buffers created by this device.
    pub fn buffer_count(&self) -> usize {
        self.buffers
            .read()
            .map(|b| b.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Get the number of live textures created by this device.
    pub fn texture_count(&self) -> usize {
        self.textures
            .read()
            .map(|t| t.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Get the number of live descriptor heaps created by this device.
    pub fn descriptor_heap_count(&self) -> usize {
        self.heaps
            .read()
            .map(|h| h.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Clean up dead weak references to released resources.
    pub fn cleanup_dead_resources(&self) {
        if let Ok(mut buffers) = self.buffers.write() {
            buffers.retain(|w| w.strong_count() > 0);
        }
        if let Ok(mut textures) = self.textures.write() {
            textures.retain(|w| w.strong_count() > 0);
        }
        if let Ok(mut heaps) = self.heaps.write() {
            heaps.retain(|w| w.strong_count() > 0);
        }
    }
}

fn check_host_range(buffer: &Buffer, offset: u64, size: u64) -> Result<(), GraphicsError> {
    match offset.checked_add(size) {
        Some(end) if end <= buffer.size() => Ok(()),
        _ => Err(GraphicsError::InvalidParameter(format!(
            "range {offset}+{size} exceeds buffer {:?} of {} bytes",
            buffer.label(),
            buffer.size()
        ))),
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("name", &self.name)
            .field("backend", &self.backend().name())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

// Ensure GraphicsDevice is Send + Sync
static_assertions::assert_impl_all!(GraphicsDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{BackendType, InstanceParameters};
    use crate::types::{BufferUsage, TextureFormat, TextureUsage};

    fn create_test_device() -> Arc<GraphicsDevice> {
        let instance = GraphicsInstance::with_parameters(
            InstanceParameters::new().with_backend(BackendType::Dummy),
        )
        .unwrap();
        instance.create_device().unwrap()
    }

    #[test]
    fn test_device_name() {
        let device = create_test_device();
        assert_eq!(device.name(), "Dummy Adapter");
    }

    #[test]
    fn test_create_buffer() {
        let device = create_test_device();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))
            .unwrap();
        assert_eq!(buffer.size(), 1024);
        assert_eq!(buffer.state(), ResourceState::CopyDest);
        assert_eq!(device.buffer_count(), 1);

        let upload = device.create_buffer(&BufferDescriptor::upload(64)).unwrap();
        assert_eq!(upload.state(), ResourceState::GenericRead);
    }

    #[test]
    fn test_create_buffer_zero_size() {
        let device = create_test_device();
        let result = device.create_buffer(&BufferDescriptor::new(0, BufferUsage::VERTEX));
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_create_texture() {
        let device = create_test_device();
        let texture = device
            .create_texture(&TextureDescriptor::new_2d(
                512,
                512,
                TextureFormat::Rgba8Unorm,
                TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            ))
            .unwrap();
        assert_eq!(texture.width(), 512);
        assert_eq!(texture.state(), ResourceState::CopyDest);
        assert_eq!(device.texture_count(), 1);
    }

    #[test]
    fn test_create_texture_zero_size() {
        let device = create_test_device();
        let result = device.create_texture(&TextureDescriptor::new_2d(
            0,
            512,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING,
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_host_access_checks() {
        let device = create_test_device();
        let gpu_only = device
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::COPY_DST))
            .unwrap();
        assert!(matches!(
            device.write_buffer(&gpu_only, 0, &[1, 2, 3, 4]),
            Err(GraphicsError::InvalidState(_))
        ));

        let upload = device.create_buffer(&BufferDescriptor::upload(16)).unwrap();
        assert!(matches!(
            device.write_buffer(&upload, 12, &[0; 8]),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert!(device.read_buffer(&upload, 0, 4).is_err());
    }

    #[test]
    fn test_descriptor_heaps_do_not_overlap() {
        let device = create_test_device();
        let a = device
            .create_descriptor_heap(&DescriptorHeapDescriptor::shader_visible(4096))
            .unwrap();
        let b = device
            .create_descriptor_heap(&DescriptorHeapDescriptor::cpu_only(4))
            .unwrap();
        let last_a = a.cpu_handle(4095).unwrap();
        assert!(last_a < b.cpu_start());
        assert_eq!(device.resolve_cpu_handle(last_a).unwrap().1, 4095);
        assert!(Arc::ptr_eq(&device.resolve_cpu_handle(b.cpu_start()).unwrap().0, &b));
        assert_eq!(device.descriptor_heap_count(), 2);
    }

    #[test]
    fn test_copy_descriptors_between_heaps() {
        let device = create_test_device();
        let staging = device
            .create_descriptor_heap(&DescriptorHeapDescriptor::cpu_only(2))
            .unwrap();
        let visible = device
            .create_descriptor_heap(&DescriptorHeapDescriptor::shader_visible(4))
            .unwrap();
        staging
            .write(0, Descriptor::UnorderedAccessView(Weak::new()))
            .unwrap();

        device
            .copy_descriptors_simple(1, visible.cpu_handle(3).unwrap(), staging.cpu_start())
            .unwrap();
        assert!(matches!(visible.get(3), Some(Descriptor::UnorderedAccessView(_))));

        assert!(matches!(
            device.resolve_cpu_descriptor(staging.cpu_handle(1).unwrap()),
            Err(GraphicsError::InvalidState(_))
        ));
        assert!(matches!(
            device.copy_descriptors_simple(1, CpuDescriptorHandle(1), staging.cpu_start()),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_resource_cleanup() {
        let device = create_test_device();
        {
            let _buffer = device
                .create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))
                .unwrap();
            assert_eq!(device.buffer_count(), 1);
        }
        device.cleanup_dead_resources();
        assert_eq!(device.buffer_count(), 0);
    }

    #[test]
    fn test_released_resources_do_not_accumulate() {
        let device = create_test_device();
        for _ in 0..64 {
            let _buffer = device
                .create_buffer(&BufferDescriptor::new(256, BufferUsage::VERTEX))
                .unwrap();
            let _texture = device
                .create_texture(&TextureDescriptor::new_2d(
                    4,
                    4,
                    TextureFormat::Rgba8Unorm,
                    TextureUsage::TEXTURE_BINDING,
                ))
                .unwrap();
        }
        assert!(device.buffers.read().unwrap().len() <= 1);
        assert!(device.textures.read().unwrap().len() <= 1);

        let _kept = device
            .create_buffer(&BufferDescriptor::new(256, BufferUsage::VERTEX))
            .unwrap();
        assert_eq!(device.buffers.read().unwrap().len(), 1);
        assert_eq!(device.buffer_count(), 1);
    }
}
