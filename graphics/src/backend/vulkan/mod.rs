//! Vulkan GPU backend implementation.
//!
//! Native backend built on ash with gpu-allocator for memory. The device is
//! headless: one graphics queue, no surface. Fences are timeline semaphores
//! and command allocators are command pools.
//!
//! Every handle keeps an `Arc<VulkanShared>`, so the logical device and the
//! instance outlive all objects created from them regardless of drop order.

mod allocator;
mod command;
mod conversion;
mod debug;
mod device;
mod instance;

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};
use parking_lot::Mutex;

use crate::command::Command;
use crate::error::GraphicsError;
use crate::instance::InstanceParameters;
use crate::types::{BufferDescriptor, MemoryLocation, TextureDescriptor};

use super::{
    BackendCapabilities, GpuBackend, GpuBuffer, GpuCommandAllocator, GpuFence, GpuTexture,
};

/// Objects every Vulkan handle depends on.
pub struct VulkanShared {
    _entry: ash::Entry,
    instance: ash::Instance,
    debug: Option<DebugMessenger>,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: Mutex<vk::Queue>,
    queue_family: u32,
    allocator: Mutex<Option<Allocator>>,
}

impl VulkanShared {
    fn with_allocator<T>(
        &self,
        f: impl FnOnce(&mut Allocator) -> Result<T, GraphicsError>,
    ) -> Result<T, GraphicsError> {
        let mut guard = self.allocator.lock();
        let allocator = guard
            .as_mut()
            .ok_or_else(|| GraphicsError::Internal("allocator already destroyed".to_string()))?;
        f(allocator)
    }

    fn free(&self, allocation: Allocation) {
        if let Some(allocator) = self.allocator.lock().as_mut() {
            if let Err(e) = allocator.free(allocation) {
                log::warn!("Failed to free GPU allocation: {e}");
            }
        }
    }

    fn submit(&self, submits: &[vk::SubmitInfo<'_>]) -> Result<(), GraphicsError> {
        let queue = self.queue.lock();
        unsafe { self.device.queue_submit(*queue, submits, vk::Fence::null()) }.map_err(map_vk)
    }
}

impl Drop for VulkanShared {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
        // The allocator frees its memory blocks through the device.
        drop(self.allocator.lock().take());
        unsafe {
            self.device.destroy_device(None);
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        log::info!("Vulkan device destroyed");
    }
}

/// Vulkan buffer with its memory allocation.
pub struct VulkanBuffer {
    shared: Arc<VulkanShared>,
    buffer: vk::Buffer,
    allocation: Mutex<Option<Allocation>>,
    location: MemoryLocation,
}

impl VulkanBuffer {
    pub fn raw(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn location(&self) -> MemoryLocation {
        self.location
    }
}

impl std::fmt::Debug for VulkanBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBuffer")
            .field("buffer", &self.buffer)
            .field("location", &self.location)
            .finish()
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.lock().take() {
            self.shared.free(allocation);
        }
        unsafe { self.shared.device.destroy_buffer(self.buffer, None) };
    }
}

/// Vulkan image with its memory allocation and current layout.
pub struct VulkanTexture {
    shared: Arc<VulkanShared>,
    image: vk::Image,
    allocation: Mutex<Option<Allocation>>,
    pub(crate) layout: Mutex<vk::ImageLayout>,
}

impl VulkanTexture {
    pub fn raw(&self) -> vk::Image {
        self.image
    }

    /// Layout the image will be in once recorded work has run.
    pub fn layout(&self) -> vk::ImageLayout {
        *self.layout.lock()
    }
}

impl std::fmt::Debug for VulkanTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanTexture")
            .field("image", &self.image)
            .field("layout", &self.layout())
            .finish()
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.lock().take() {
            self.shared.free(allocation);
        }
        unsafe { self.shared.device.destroy_image(self.image, None) };
    }
}

/// Timeline semaphore backing a fence.
pub struct VulkanFence {
    shared: Arc<VulkanShared>,
    semaphore: vk::Semaphore,
}

impl std::fmt::Debug for VulkanFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanFence")
            .field("semaphore", &self.semaphore)
            .finish()
    }
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe { self.shared.device.destroy_semaphore(self.semaphore, None) };
    }
}

struct PoolState {
    buffers: Vec<vk::CommandBuffer>,
    next: usize,
    /// Commands submitted since the last reset. Holding them keeps every
    /// referenced resource alive while the GPU may still use it.
    in_flight: Vec<Command>,
}

/// Command pool backing one command list's recordings.
pub struct VulkanCommandPool {
    shared: Arc<VulkanShared>,
    pool: vk::CommandPool,
    state: Mutex<PoolState>,
}

impl std::fmt::Debug for VulkanCommandPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("VulkanCommandPool")
            .field("pool", &self.pool)
            .field("command_buffers", &state.buffers.len())
            .field("in_use", &state.next)
            .finish()
    }
}

impl Drop for VulkanCommandPool {
    fn drop(&mut self) {
        unsafe { self.shared.device.destroy_command_pool(self.pool, None) };
    }
}

/// Vulkan GPU backend.
pub struct VulkanBackend {
    shared: Arc<VulkanShared>,
    adapter_name: String,
    capabilities: BackendCapabilities,
}

impl VulkanBackend {
    /// Create a backend with default parameters.
    pub fn new() -> Result<Self, GraphicsError> {
        Self::with_params(&InstanceParameters::default())
    }

    /// Load Vulkan, create the instance and pick a device.
    pub fn with_params(params: &InstanceParameters) -> Result<Self, GraphicsError> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to load Vulkan library: {e}"))
        })?;

        let application_name = params.application_name.as_deref().unwrap_or("Lumen");
        let instance::InstanceBundle { instance, debug } =
            instance::create_instance(&entry, application_name, params.validation)?;

        let selected = device::select_physical_device(&instance).and_then(|physical_device| {
            let queue_family = device::find_graphics_queue_family(&instance, physical_device)?;
            Ok((physical_device, queue_family))
        });
        let (physical_device, queue_family) = match selected {
            Ok(selected) => selected,
            Err(e) => {
                destroy_instance(&instance, &debug);
                return Err(e);
            }
        };

        let logical = match device::create_logical_device(&instance, physical_device, queue_family)
        {
            Ok(logical) => logical,
            Err(e) => {
                destroy_instance(&instance, &debug);
                return Err(e);
            }
        };

        let allocator =
            match allocator::create_allocator(&instance, physical_device, logical.clone()) {
                Ok(allocator) => allocator,
                Err(e) => {
                    unsafe { logical.destroy_device(None) };
                    destroy_instance(&instance, &debug);
                    return Err(e);
                }
            };

        let queue = unsafe { logical.get_device_queue(queue_family, 0) };
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let adapter_name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown Vulkan device".to_string());
        let capabilities = BackendCapabilities {
            max_texture_dimension: properties.limits.max_image_dimension2_d,
            ..BackendCapabilities::default()
        };

        log::info!("Vulkan backend initialized on {adapter_name}");

        Ok(Self {
            shared: Arc::new(VulkanShared {
                _entry: entry,
                instance,
                debug,
                physical_device,
                device: logical,
                queue: Mutex::new(queue),
                queue_family,
                allocator: Mutex::new(Some(allocator)),
            }),
            adapter_name,
            capabilities,
        })
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.shared.physical_device
    }

    /// Map a buffer's memory and run `f` on its bytes.
    fn with_mapped<T>(
        &self,
        buffer: &GpuBuffer,
        f: impl FnOnce(&mut [u8]) -> Result<T, GraphicsError>,
    ) -> Result<T, GraphicsError> {
        let buffer = vulkan_buffer(buffer)?;
        let mut allocation = buffer.allocation.lock();
        let allocation = allocation
            .as_mut()
            .ok_or_else(|| GraphicsError::Internal("buffer has no allocation".to_string()))?;
        let bytes = allocation.mapped_slice_mut().ok_or_else(|| {
            GraphicsError::InvalidState("buffer memory is not host visible".to_string())
        })?;
        f(bytes)
    }

    fn record_and_submit(
        &self,
        pool: &VulkanCommandPool,
        commands: &[Command],
    ) -> Result<(), GraphicsError> {
        let device = &self.shared.device;
        let mut state = pool.state.lock();

        if state.next == state.buffers.len() {
            let cmd = command::allocate_command_buffer(device, pool.pool)?;
            state.buffers.push(cmd);
        }
        let cmd = state.buffers[state.next];

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { device.begin_command_buffer(cmd, &begin_info) }.map_err(map_vk)?;
        for command in commands {
            log::trace!("VulkanBackend: recording {}", command.name());
            command::record_command(device, cmd, command)?;
        }
        unsafe { device.end_command_buffer(cmd) }.map_err(map_vk)?;

        let command_buffers = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        self.shared.submit(&[submit])?;

        state.next += 1;
        state.in_flight.extend(commands.iter().cloned());
        Ok(())
    }
}

impl GpuBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn adapter_name(&self) -> String {
        self.adapter_name.clone()
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        let device = &self.shared.device;
        let create_info = vk::BufferCreateInfo::default()
            .size(descriptor.size)
            .usage(conversion::convert_buffer_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create buffer: {e:?}"))
        })?;
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let name = descriptor.label.as_deref().unwrap_or("buffer");
        let bound = self
            .shared
            .with_allocator(|allocator| {
                allocator::allocate(
                    allocator,
                    name,
                    requirements,
                    conversion::convert_memory_location(descriptor.location),
                    true,
                )
            })
            .and_then(|allocation| {
                match unsafe {
                    device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                } {
                    Ok(()) => Ok(allocation),
                    Err(e) => {
                        self.shared.free(allocation);
                        Err(GraphicsError::ResourceCreationFailed(format!(
                            "Failed to bind buffer memory: {e:?}"
                        )))
                    }
                }
            });
        let allocation = match bound {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        log::trace!(
            "VulkanBackend: created buffer {:?} ({} bytes, {:?})",
            descriptor.label,
            descriptor.size,
            descriptor.location
        );

        Ok(GpuBuffer::Vulkan(VulkanBuffer {
            shared: Arc::clone(&self.shared),
            buffer,
            allocation: Mutex::new(Some(allocation)),
            location: descriptor.location,
        }))
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        self.with_mapped(buffer, |bytes| {
            let range = mapped_range(bytes.len(), offset, data.len() as u64)?;
            bytes[range].copy_from_slice(data);
            Ok(())
        })
    }

    fn read_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        self.with_mapped(buffer, |bytes| {
            let range = mapped_range(bytes.len(), offset, size)?;
            Ok(bytes[range].to_vec())
        })
    }

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<GpuTexture, GraphicsError> {
        let device = &self.shared.device;
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(conversion::convert_texture_format(descriptor.format))
            .extent(vk::Extent3D {
                width: descriptor.size.width,
                height: descriptor.size.height,
                depth: descriptor.size.depth,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(conversion::convert_texture_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.create_image(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create image: {e:?}"))
        })?;
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let name = descriptor.label.as_deref().unwrap_or("texture");
        let bound = self
            .shared
            .with_allocator(|allocator| {
                allocator::allocate(
                    allocator,
                    name,
                    requirements,
                    gpu_allocator::MemoryLocation::GpuOnly,
                    false,
                )
            })
            .and_then(|allocation| {
                match unsafe {
                    device.bind_image_memory(image, allocation.memory(), allocation.offset())
                } {
                    Ok(()) => Ok(allocation),
                    Err(e) => {
                        self.shared.free(allocation);
                        Err(GraphicsError::ResourceCreationFailed(format!(
                            "Failed to bind image memory: {e:?}"
                        )))
                    }
                }
            });
        let allocation = match bound {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        log::trace!(
            "VulkanBackend: created texture {:?} ({}x{})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height
        );

        Ok(GpuTexture::Vulkan(VulkanTexture {
            shared: Arc::clone(&self.shared),
            image,
            allocation: Mutex::new(Some(allocation)),
            layout: Mutex::new(vk::ImageLayout::UNDEFINED),
        }))
    }

    fn create_fence(&self, initial_value: u64) -> Result<GpuFence, GraphicsError> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = unsafe { self.shared.device.create_semaphore(&create_info, None) }
            .map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to create timeline semaphore: {e:?}"
                ))
            })?;

        Ok(GpuFence::Vulkan(VulkanFence {
            shared: Arc::clone(&self.shared),
            semaphore,
        }))
    }

    fn fence_completed_value(&self, fence: &GpuFence) -> Result<u64, GraphicsError> {
        let fence = vulkan_fence(fence)?;
        unsafe { self.shared.device.get_semaphore_counter_value(fence.semaphore) }.map_err(map_vk)
    }

    fn wait_fence(
        &self,
        fence: &GpuFence,
        value: u64,
        timeout: Option<Duration>,
    ) -> Result<bool, GraphicsError> {
        let fence = vulkan_fence(fence)?;
        let semaphores = [fence.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        let timeout_ns = timeout.map_or(u64::MAX, |t| {
            u64::try_from(t.as_nanos()).unwrap_or(u64::MAX)
        });

        match unsafe { self.shared.device.wait_semaphores(&wait_info, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(map_vk(e)),
        }
    }

    fn queue_signal(&self, fence: &GpuFence, value: u64) -> Result<(), GraphicsError> {
        let fence = vulkan_fence(fence)?;
        let semaphores = [fence.semaphore];
        let values = [value];
        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&values);
        let submit = vk::SubmitInfo::default()
            .signal_semaphores(&semaphores)
            .push_next(&mut timeline_info);
        self.shared.submit(&[submit])
    }

    fn create_command_allocator(&self) -> Result<GpuCommandAllocator, GraphicsError> {
        let pool = command::create_command_pool(&self.shared.device, self.shared.queue_family)?;
        Ok(GpuCommandAllocator::Vulkan(VulkanCommandPool {
            shared: Arc::clone(&self.shared),
            pool,
            state: Mutex::new(PoolState {
                buffers: Vec::new(),
                next: 0,
                in_flight: Vec::new(),
            }),
        }))
    }

    fn reset_command_allocator(
        &self,
        allocator: &GpuCommandAllocator,
    ) -> Result<(), GraphicsError> {
        let pool = vulkan_pool(allocator)?;
        let mut state = pool.state.lock();
        unsafe {
            self.shared
                .device
                .reset_command_pool(pool.pool, vk::CommandPoolResetFlags::empty())
        }
        .map_err(map_vk)?;
        state.next = 0;
        state.in_flight.clear();
        Ok(())
    }

    fn execute_commands(
        &self,
        allocator: &GpuCommandAllocator,
        commands: &[Command],
    ) -> Result<(), GraphicsError> {
        lumen_core::profile_scope!("vulkan_execute");
        self.record_and_submit(vulkan_pool(allocator)?, commands)
    }
}

type DebugMessenger = (ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT);

fn destroy_instance(instance: &ash::Instance, debug: &Option<DebugMessenger>) {
    unsafe {
        if let Some((debug_utils, messenger)) = debug {
            debug_utils.destroy_debug_utils_messenger(*messenger, None);
        }
        instance.destroy_instance(None);
    }
}

fn mapped_range(len: usize, offset: u64, size: u64) -> Result<std::ops::Range<usize>, GraphicsError> {
    match offset.checked_add(size) {
        Some(end) if end <= len as u64 => Ok(offset as usize..end as usize),
        _ => Err(GraphicsError::InvalidParameter(format!(
            "range {offset}+{size} exceeds mapped size of {len} bytes"
        ))),
    }
}

fn map_vk(result: vk::Result) -> GraphicsError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => GraphicsError::DeviceLost,
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            GraphicsError::OutOfMemory
        }
        other => GraphicsError::Internal(format!("Vulkan call failed: {other:?}")),
    }
}

fn vulkan_buffer(buffer: &GpuBuffer) -> Result<&VulkanBuffer, GraphicsError> {
    match buffer {
        GpuBuffer::Vulkan(buffer) => Ok(buffer),
        _ => Err(foreign_handle("buffer")),
    }
}

fn vulkan_fence(fence: &GpuFence) -> Result<&VulkanFence, GraphicsError> {
    match fence {
        GpuFence::Vulkan(fence) => Ok(fence),
        _ => Err(foreign_handle("fence")),
    }
}

fn vulkan_pool(allocator: &GpuCommandAllocator) -> Result<&VulkanCommandPool, GraphicsError> {
    match allocator {
        GpuCommandAllocator::Vulkan(pool) => Ok(pool),
        _ => Err(foreign_handle("command allocator")),
    }
}

fn foreign_handle(kind: &str) -> GraphicsError {
    GraphicsError::Internal(format!("{kind} handle does not belong to the Vulkan backend"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_range_bounds() {
        assert_eq!(mapped_range(16, 4, 8).unwrap(), 4..12);
        assert!(mapped_range(16, 12, 8).is_err());
        assert!(mapped_range(16, u64::MAX, 2).is_err());
    }

    #[test]
    fn test_device_lost_mapping() {
        assert!(matches!(
            map_vk(vk::Result::ERROR_DEVICE_LOST),
            GraphicsError::DeviceLost
        ));
        assert!(matches!(
            map_vk(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            GraphicsError::OutOfMemory
        ));
    }
}
