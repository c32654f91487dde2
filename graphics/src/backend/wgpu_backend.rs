//! wgpu GPU backend implementation.
//!
//! This backend uses wgpu for cross-platform GPU access, supporting
//! Vulkan, Metal, DX12 and GL.
//!
//! wgpu has no explicit resource states or fences. Transitions are tracked by
//! wgpu itself and are no-ops here; a fence value is mapped to the
//! submission index of an empty submit enqueued when the value is signaled.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::command::{Command, TextureCopyLayout};
use crate::error::GraphicsError;
use crate::instance::{InstanceParameters, WgpuBackendType};
use crate::resources::{Buffer, Texture};
use crate::types::{BufferDescriptor, BufferUsage, MemoryLocation, TextureDescriptor, TextureFormat, TextureUsage};

use super::{
    BackendCapabilities, DEFAULT_DESCRIPTOR_INCREMENT, GpuBackend, GpuBuffer,
    GpuCommandAllocator, GpuFence, GpuTexture,
};

/// Copy offsets and sizes must be multiples of this.
const COPY_ALIGNMENT: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

/// A wgpu buffer. Its allocation is rounded up to [`COPY_ALIGNMENT`].
#[derive(Debug)]
pub struct WgpuBuffer {
    buffer: wgpu::Buffer,
    location: MemoryLocation,
}

/// A wgpu texture.
#[derive(Debug)]
pub struct WgpuTexture {
    texture: wgpu::Texture,
}

impl WgpuTexture {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }
}

/// Fence emulated with submission indices.
#[derive(Debug)]
pub struct WgpuFence {
    completed: Arc<AtomicU64>,
    pending: Mutex<VecDeque<(u64, wgpu::SubmissionIndex)>>,
}

/// wgpu-based GPU backend.
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter.get_info().name)
            .finish()
    }
}

impl WgpuBackend {
    /// Create a wgpu backend with default parameters.
    pub fn new() -> Result<Self, GraphicsError> {
        Self::with_params(&InstanceParameters::default())
    }

    /// Create a wgpu backend on the API `params.wgpu_backend` selects.
    pub fn with_params(params: &InstanceParameters) -> Result<Self, GraphicsError> {
        let backends = match params.wgpu_backend {
            WgpuBackendType::Auto => wgpu::Backends::PRIMARY,
            WgpuBackendType::Vulkan => wgpu::Backends::VULKAN,
            WgpuBackendType::Metal => wgpu::Backends::METAL,
            WgpuBackendType::Dx12 => wgpu::Backends::DX12,
            WgpuBackendType::Gl => wgpu::Backends::GL,
        };
        let flags = if params.validation {
            wgpu::InstanceFlags::debugging()
        } else {
            wgpu::InstanceFlags::default()
        };

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            flags,
            backend_options: wgpu::BackendOptions::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("No compatible GPU adapter: {e}"))
        })?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Lumen Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("Device creation failed: {e}"))
        })?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Get the wgpu device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get the wgpu queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn encode_command(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        command: &Command,
    ) -> Result<(), GraphicsError> {
        match command {
            Command::CopyBuffer {
                src,
                src_offset,
                dst,
                dst_offset,
                size,
            } => {
                if src_offset % COPY_ALIGNMENT != 0 || dst_offset % COPY_ALIGNMENT != 0 {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "buffer copy offsets {src_offset}/{dst_offset} must be multiples of {COPY_ALIGNMENT}"
                    )));
                }
                let src = wgpu_buffer(src)?;
                let dst = wgpu_buffer(dst)?;
                let size = size.next_multiple_of(COPY_ALIGNMENT);
                encoder.copy_buffer_to_buffer(&src.buffer, *src_offset, &dst.buffer, *dst_offset, size);
            }
            Command::CopyBufferToTexture { src, layout, dst } => {
                self.encode_texture_upload(encoder, src, layout, dst)?;
            }
            // wgpu tracks resource usage itself.
            Command::BufferTransition { .. } | Command::TextureTransition { .. } => {}
        }
        Ok(())
    }

    fn encode_texture_upload(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        src: &Buffer,
        layout: &TextureCopyLayout,
        dst: &Texture,
    ) -> Result<(), GraphicsError> {
        let src = wgpu_buffer(src)?;
        let GpuTexture::Wgpu(texture) = dst.gpu_handle() else {
            return Err(foreign_handle("texture"));
        };
        let size = dst.size();

        encoder.copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer: &src.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: layout.offset,
                    bytes_per_row: Some(layout.bytes_per_row),
                    rows_per_image: Some(layout.rows),
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: size.depth,
            },
        );
        Ok(())
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn adapter_name(&self) -> String {
        self.adapter.get_info().name
    }

    fn capabilities(&self) -> BackendCapabilities {
        let limits = self.device.limits();
        BackendCapabilities {
            max_buffer_size: limits.max_buffer_size,
            max_texture_dimension: limits.max_texture_dimension_2d,
            descriptor_increment: DEFAULT_DESCRIPTOR_INCREMENT,
        }
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        let usage = match descriptor.location {
            MemoryLocation::Readback => wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            MemoryLocation::Upload | MemoryLocation::GpuOnly => {
                convert_buffer_usage(descriptor.usage)
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST
            }
        };

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size: descriptor.size.next_multiple_of(COPY_ALIGNMENT),
            usage,
            mapped_at_creation: false,
        });

        Ok(GpuBuffer::Wgpu(WgpuBuffer {
            buffer,
            location: descriptor.location,
        }))
    }

    /// Writes go through the queue's staging memory. Data is zero-padded to
    /// the copy alignment, so up to three bytes past its end are overwritten.
    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let GpuBuffer::Wgpu(buffer) = buffer else {
            return Err(foreign_handle("buffer"));
        };
        if offset % COPY_ALIGNMENT != 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "write offset {offset} is not a multiple of {COPY_ALIGNMENT}"
            )));
        }

        if data.len() as u64 % COPY_ALIGNMENT == 0 {
            self.queue.write_buffer(&buffer.buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize((data.len() as u64).next_multiple_of(COPY_ALIGNMENT) as usize, 0);
            self.queue.write_buffer(&buffer.buffer, offset, &padded);
        }
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        let GpuBuffer::Wgpu(buffer) = buffer else {
            return Err(foreign_handle("buffer"));
        };
        if buffer.location != MemoryLocation::Readback {
            return Err(GraphicsError::InvalidState(
                "only readback buffers can be mapped for reading".to_string(),
            ));
        }

        let slice = buffer.buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| GraphicsError::Internal(format!("device poll failed: {e}")))?;
        rx.recv()
            .map_err(|_| GraphicsError::Internal("buffer map callback dropped".to_string()))?
            .map_err(|e| GraphicsError::Internal(format!("buffer map failed: {e}")))?;

        let data = {
            let mapped = slice.get_mapped_range();
            mapped[offset as usize..(offset + size) as usize].to_vec()
        };
        buffer.buffer.unmap();
        Ok(data)
    }

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<GpuTexture, GraphicsError> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: descriptor.label.as_deref(),
            size: wgpu::Extent3d {
                width: descriptor.size.width,
                height: descriptor.size.height,
                depth_or_array_layers: descriptor.size.depth,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: convert_texture_format(descriptor.format),
            usage: convert_texture_usage(descriptor.usage) | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        Ok(GpuTexture::Wgpu(WgpuTexture { texture }))
    }

    fn create_fence(&self, initial_value: u64) -> Result<GpuFence, GraphicsError> {
        Ok(GpuFence::Wgpu(WgpuFence {
            completed: Arc::new(AtomicU64::new(initial_value)),
            pending: Mutex::new(VecDeque::new()),
        }))
    }

    fn fence_completed_value(&self, fence: &GpuFence) -> Result<u64, GraphicsError> {
        let fence = wgpu_fence(fence)?;
        // Runs completion callbacks of finished submissions.
        self.device
            .poll(wgpu::PollType::Poll)
            .map_err(|e| GraphicsError::Internal(format!("device poll failed: {e}")))?;
        Ok(fence.completed.load(Ordering::Acquire))
    }

    fn wait_fence(
        &self,
        fence: &GpuFence,
        value: u64,
        timeout: Option<Duration>,
    ) -> Result<bool, GraphicsError> {
        let fence = wgpu_fence(fence)?;
        if fence.completed.load(Ordering::Acquire) >= value {
            return Ok(true);
        }

        let submission = {
            let pending = fence.pending.lock();
            pending
                .iter()
                .find(|(signaled, _)| *signaled >= value)
                .map(|(_, index)| index.clone())
        };
        let Some(submission) = submission else {
            return Ok(false);
        };

        match self.device.poll(wgpu::PollType::Wait {
            submission_index: Some(submission),
            timeout,
        }) {
            Ok(_) => {}
            Err(wgpu::PollError::Timeout) => return Ok(false),
            Err(e) => return Err(GraphicsError::Internal(format!("device poll failed: {e}"))),
        }

        let completed = fence.completed.load(Ordering::Acquire);
        fence
            .pending
            .lock()
            .retain(|(signaled, _)| *signaled > completed);
        Ok(completed >= value)
    }

    fn queue_signal(&self, fence: &GpuFence, value: u64) -> Result<(), GraphicsError> {
        let fence = wgpu_fence(fence)?;
        let completed = Arc::clone(&fence.completed);
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(value, Ordering::AcqRel);
        });
        let index = self.queue.submit(std::iter::empty::<wgpu::CommandBuffer>());
        fence.pending.lock().push_back((value, index));
        Ok(())
    }

    fn create_command_allocator(&self) -> Result<GpuCommandAllocator, GraphicsError> {
        Ok(GpuCommandAllocator::Wgpu)
    }

    fn reset_command_allocator(
        &self,
        _allocator: &GpuCommandAllocator,
    ) -> Result<(), GraphicsError> {
        Ok(())
    }

    fn execute_commands(
        &self,
        _allocator: &GpuCommandAllocator,
        commands: &[Command],
    ) -> Result<(), GraphicsError> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Lumen Command List"),
            });
        for command in commands {
            self.encode_command(&mut encoder, command)?;
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

fn wgpu_buffer(buffer: &Buffer) -> Result<&WgpuBuffer, GraphicsError> {
    match buffer.gpu_handle() {
        GpuBuffer::Wgpu(buffer) => Ok(buffer),
        _ => Err(foreign_handle("buffer")),
    }
}

fn wgpu_fence(fence: &GpuFence) -> Result<&WgpuFence, GraphicsError> {
    match fence {
        GpuFence::Wgpu(fence) => Ok(fence),
        _ => Err(foreign_handle("fence")),
    }
}

fn foreign_handle(kind: &str) -> GraphicsError {
    GraphicsError::Internal(format!("{kind} handle does not belong to the wgpu backend"))
}

fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut result = wgpu::BufferUsages::empty();

    if usage.contains(BufferUsage::VERTEX) {
        result |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::CONSTANT) {
        result |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::STORAGE) {
        result |= wgpu::BufferUsages::STORAGE;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= wgpu::BufferUsages::COPY_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        result |= wgpu::BufferUsages::COPY_DST;
    }

    result
}

fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
    let mut result = wgpu::TextureUsages::empty();

    if usage.contains(TextureUsage::COPY_SRC) {
        result |= wgpu::TextureUsages::COPY_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        result |= wgpu::TextureUsages::COPY_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        result |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsage::STORAGE_BINDING) {
        result |= wgpu::TextureUsages::STORAGE_BINDING;
    }

    result
}
