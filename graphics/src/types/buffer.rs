//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a constant (uniform) buffer.
        const CONSTANT = 1 << 2;
        /// Buffer can be read by shaders as a structured buffer.
        const STORAGE = 1 << 3;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 4;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 5;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Which memory heap a buffer lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryLocation {
    /// Device-local memory, not accessible from the CPU.
    #[default]
    GpuOnly,
    /// CPU-writable, GPU-readable staging memory.
    Upload,
    /// GPU-writable, CPU-readable memory for readback.
    Readback,
}

impl MemoryLocation {
    /// Whether the CPU can write this memory directly.
    pub fn is_host_writable(&self) -> bool {
        matches!(self, Self::Upload)
    }

    /// Whether the CPU can read this memory directly.
    pub fn is_host_readable(&self) -> bool {
        matches!(self, Self::Readback)
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Memory heap.
    pub location: MemoryLocation,
}

impl BufferDescriptor {
    /// Create a new device-local buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            location: MemoryLocation::GpuOnly,
        }
    }

    /// Create a descriptor for CPU-written staging memory.
    pub fn upload(size: u64) -> Self {
        Self::new(size, BufferUsage::COPY_SRC).with_location(MemoryLocation::Upload)
    }

    /// Create a descriptor for CPU-read readback memory.
    pub fn readback(size: u64) -> Self {
        Self::new(size, BufferUsage::COPY_DST).with_location(MemoryLocation::Readback)
    }

    /// Set the memory heap.
    pub fn with_location(mut self, location: MemoryLocation) -> Self {
        self.location = location;
        self
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builders() {
        let desc = BufferDescriptor::upload(512).with_label("scratch");
        assert_eq!(desc.location, MemoryLocation::Upload);
        assert!(desc.location.is_host_writable());
        assert_eq!(desc.label.as_deref(), Some("scratch"));

        let desc = BufferDescriptor::readback(64);
        assert!(desc.location.is_host_readable());
        assert!(desc.usage.contains(BufferUsage::COPY_DST));

        let desc = BufferDescriptor::new(16, BufferUsage::VERTEX);
        assert_eq!(desc.location, MemoryLocation::GpuOnly);
    }
}
