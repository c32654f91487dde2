//! Dummy GPU backend for testing and development.
//!
//! This backend does not touch a GPU. Buffer and texture memory lives in
//! host vectors, recorded commands run on the CPU when they are executed,
//! and fences are counters guarded by a mutex and a condition variable.
//! Results are therefore observable byte for byte, which makes it the test
//! double for everything above the backend layer.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::command::{Command, TextureCopyLayout};
use crate::error::GraphicsError;
use crate::resources::{Buffer, Texture};
use crate::types::{BufferDescriptor, MemoryLocation, TextureDescriptor};

use super::{
    BackendCapabilities, GpuBackend, GpuBuffer, GpuCommandAllocator, GpuFence, GpuTexture,
};

/// Host memory standing in for a GPU buffer.
#[derive(Debug)]
pub struct DummyBuffer {
    memory: Mutex<Vec<u8>>,
    location: MemoryLocation,
}

impl DummyBuffer {
    pub fn new(size: u64, location: MemoryLocation) -> Self {
        Self {
            memory: Mutex::new(vec![0; size as usize]),
            location,
        }
    }

    pub fn location(&self) -> MemoryLocation {
        self.location
    }

    /// Copy of the whole buffer contents.
    pub fn contents(&self) -> Vec<u8> {
        self.memory.lock().clone()
    }
}

/// Host memory standing in for a GPU texture, rows tightly packed.
#[derive(Debug)]
pub struct DummyTexture {
    pixels: Mutex<Vec<u8>>,
    bytes_per_row: u32,
    rows: u32,
}

impl DummyTexture {
    pub fn new(descriptor: &TextureDescriptor) -> Self {
        let bytes_per_row = descriptor.unpadded_bytes_per_row();
        let rows = descriptor.size.height * descriptor.size.depth;
        Self {
            pixels: Mutex::new(vec![0; bytes_per_row as usize * rows as usize]),
            bytes_per_row,
            rows,
        }
    }

    /// Copy of the texel data.
    pub fn pixels(&self) -> Vec<u8> {
        self.pixels.lock().clone()
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.bytes_per_row
    }
}

/// Fence counter advanced by queue signals.
#[derive(Debug, Default)]
pub struct DummyFence {
    completed: Mutex<u64>,
    reached: Condvar,
}

impl DummyFence {
    pub fn new(initial_value: u64) -> Self {
        Self {
            completed: Mutex::new(initial_value),
            reached: Condvar::new(),
        }
    }

    fn signal(&self, value: u64) {
        let mut completed = self.completed.lock();
        *completed = (*completed).max(value);
        self.reached.notify_all();
    }

    fn wait(&self, value: u64, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut completed = self.completed.lock();
        while *completed < value {
            match deadline {
                Some(deadline) => {
                    if self.reached.wait_until(&mut completed, deadline).timed_out() {
                        return *completed >= value;
                    }
                }
                None => self.reached.wait(&mut completed),
            }
        }
        true
    }
}

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend;

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn adapter_name(&self) -> String {
        "Dummy Adapter".to_string()
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        Ok(GpuBuffer::Dummy(DummyBuffer::new(
            descriptor.size,
            descriptor.location,
        )))
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let buffer = dummy_buffer(buffer)?;
        let mut memory = buffer.memory.lock();
        let range = host_range(memory.len(), offset, data.len() as u64)?;
        memory[range].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        let buffer = dummy_buffer(buffer)?;
        let memory = buffer.memory.lock();
        let range = host_range(memory.len(), offset, size)?;
        Ok(memory[range].to_vec())
    }

    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
    ) -> Result<GpuTexture, GraphicsError> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}x{})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth
        );
        Ok(GpuTexture::Dummy(DummyTexture::new(descriptor)))
    }

    fn create_fence(&self, initial_value: u64) -> Result<GpuFence, GraphicsError> {
        Ok(GpuFence::Dummy(DummyFence::new(initial_value)))
    }

    fn fence_completed_value(&self, fence: &GpuFence) -> Result<u64, GraphicsError> {
        Ok(*dummy_fence(fence)?.completed.lock())
    }

    fn wait_fence(
        &self,
        fence: &GpuFence,
        value: u64,
        timeout: Option<Duration>,
    ) -> Result<bool, GraphicsError> {
        Ok(dummy_fence(fence)?.wait(value, timeout))
    }

    fn queue_signal(&self, fence: &GpuFence, value: u64) -> Result<(), GraphicsError> {
        // Work executes at submission, so every earlier submission is done.
        dummy_fence(fence)?.signal(value);
        Ok(())
    }

    fn create_command_allocator(&self) -> Result<GpuCommandAllocator, GraphicsError> {
        Ok(GpuCommandAllocator::Dummy)
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
        for command in commands {
            log::trace!("DummyBackend: executing {}", command.name());
            match command {
                Command::CopyBuffer {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    size,
                } => copy_buffer(src, *src_offset, dst, *dst_offset, *size)?,
                Command::CopyBufferToTexture { src, layout, dst } => {
                    copy_buffer_to_texture(src, layout, dst)?
                }
                Command::BufferTransition { .. } | Command::TextureTransition { .. } => {}
            }
        }
        Ok(())
    }
}

fn copy_buffer(
    src: &Buffer,
    src_offset: u64,
    dst: &Buffer,
    dst_offset: u64,
    size: u64,
) -> Result<(), GraphicsError> {
    let src = dummy_buffer(src.gpu_handle())?;
    let dst = dummy_buffer(dst.gpu_handle())?;
    if std::ptr::eq(src, dst) {
        let mut memory = src.memory.lock();
        let from = host_range(memory.len(), src_offset, size)?;
        host_range(memory.len(), dst_offset, size)?;
        memory.copy_within(from, dst_offset as usize);
        return Ok(());
    }

    let source = src.memory.lock();
    let mut target = dst.memory.lock();
    let from = host_range(source.len(), src_offset, size)?;
    let to = host_range(target.len(), dst_offset, size)?;
    target[to].copy_from_slice(&source[from]);
    Ok(())
}

fn copy_buffer_to_texture(
    src: &Buffer,
    layout: &TextureCopyLayout,
    dst: &Texture,
) -> Result<(), GraphicsError> {
    let src = dummy_buffer(src.gpu_handle())?;
    let GpuTexture::Dummy(texture) = dst.gpu_handle() else {
        return Err(foreign_handle("texture"));
    };

    let source = src.memory.lock();
    let mut pixels = texture.pixels.lock();
    let row_size = texture.bytes_per_row as usize;
    for row in 0..layout.rows.min(texture.rows) as usize {
        let offset = layout.offset + row as u64 * layout.bytes_per_row as u64;
        let from = host_range(source.len(), offset, row_size as u64)?;
        pixels[row * row_size..(row + 1) * row_size].copy_from_slice(&source[from]);
    }
    Ok(())
}

fn host_range(len: usize, offset: u64, size: u64) -> Result<std::ops::Range<usize>, GraphicsError> {
    match offset.checked_add(size) {
        Some(end) if end <= len as u64 => Ok(offset as usize..end as usize),
        _ => Err(GraphicsError::InvalidParameter(format!(
            "range {offset}+{size} exceeds buffer of {len} bytes"
        ))),
    }
}

fn dummy_buffer(buffer: &GpuBuffer) -> Result<&DummyBuffer, GraphicsError> {
    match buffer {
        GpuBuffer::Dummy(buffer) => Ok(buffer),
        #[allow(unreachable_patterns)]
        _ => Err(foreign_handle("buffer")),
    }
}

fn dummy_fence(fence: &GpuFence) -> Result<&DummyFence, GraphicsError> {
    match fence {
        GpuFence::Dummy(fence) => Ok(fence),
        #[allow(unreachable_patterns)]
        _ => Err(foreign_handle("fence")),
    }
}

fn foreign_handle(kind: &str) -> GraphicsError {
    GraphicsError::Internal(format!("{kind} handle does not belong to the dummy backend"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_buffer_write_read() {
        let backend = DummyBackend::new();
        let buffer = backend.create_buffer(&BufferDescriptor::upload(16)).unwrap();
        backend.write_buffer(&buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(backend.read_buffer(&buffer, 2, 6).unwrap(), vec![0, 0, 1, 2, 3, 4]);
        assert!(backend.write_buffer(&buffer, 14, &[0; 4]).is_err());
    }

    #[test]
    fn test_fence_wait_across_threads() {
        let backend = Arc::new(DummyBackend::new());
        let fence = Arc::new(backend.create_fence(0).unwrap());

        let waiter = {
            let backend = Arc::clone(&backend);
            let fence = Arc::clone(&fence);
            thread::spawn(move || backend.wait_fence(&fence, 3, None).unwrap())
        };
        backend.queue_signal(&fence, 3).unwrap();
        assert!(waiter.join().unwrap());
        assert_eq!(backend.fence_completed_value(&fence).unwrap(), 3);
    }

    #[test]
    fn test_fence_timeout_and_monotonic() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence(5).unwrap();
        assert!(!backend
            .wait_fence(&fence, 6, Some(Duration::from_millis(5)))
            .unwrap());
        backend.queue_signal(&fence, 2).unwrap();
        assert_eq!(backend.fence_completed_value(&fence).unwrap(), 5);
    }
}
