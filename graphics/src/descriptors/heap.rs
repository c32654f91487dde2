//! Descriptor heaps.

use std::sync::Weak;

use parking_lot::Mutex;

use crate::descriptors::{CpuDescriptorHandle, GpuDescriptorHandle};
use crate::error::GraphicsError;
use crate::resources::{Buffer, Texture};

/// Whether a heap can be referenced by shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapKind {
    /// Bound to the pipeline; has both CPU and GPU handles.
    ShaderVisible,
    /// Staging storage for views; CPU handles only.
    CpuOnly,
}

/// Describes a descriptor heap to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorHeapDescriptor {
    pub label: Option<String>,
    pub kind: DescriptorHeapKind,
    /// Number of slots.
    pub capacity: u32,
}

impl DescriptorHeapDescriptor {
    pub fn shader_visible(capacity: u32) -> Self {
        Self {
            label: None,
            kind: DescriptorHeapKind::ShaderVisible,
            capacity,
        }
    }

    pub fn cpu_only(capacity: u32) -> Self {
        Self {
            label: None,
            kind: DescriptorHeapKind::CpuOnly,
            capacity,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// What a shader resource view reads from.
#[derive(Debug, Clone)]
pub enum ViewTarget {
    Texture(Weak<Texture>),
    /// Structured buffer of `count` elements of `stride` bytes.
    Buffer {
        buffer: Weak<Buffer>,
        stride: u32,
        count: u32,
    },
}

/// Contents of one descriptor slot.
///
/// Descriptors never keep the described resource alive.
#[derive(Debug, Clone)]
pub enum Descriptor {
    /// Constant buffer view over `size` bytes at `offset`.
    ConstantBufferView {
        buffer: Weak<Buffer>,
        offset: u64,
        size: u64,
    },
    ShaderResourceView(ViewTarget),
    UnorderedAccessView(Weak<Texture>),
}

impl Descriptor {
    /// Whether the described resource is still alive.
    pub fn is_live(&self) -> bool {
        match self {
            Self::ConstantBufferView { buffer, .. } => buffer.strong_count() > 0,
            Self::ShaderResourceView(ViewTarget::Texture(texture)) => texture.strong_count() > 0,
            Self::ShaderResourceView(ViewTarget::Buffer { buffer, .. }) => {
                buffer.strong_count() > 0
            }
            Self::UnorderedAccessView(texture) => texture.strong_count() > 0,
        }
    }
}

/// A fixed-capacity array of descriptor slots.
///
/// Heaps are created by [`GraphicsDevice::create_descriptor_heap`], which
/// assigns each heap its own CPU (and, when shader-visible, GPU) address
/// range so handles from different heaps never collide.
///
/// [`GraphicsDevice::create_descriptor_heap`]: crate::GraphicsDevice::create_descriptor_heap
pub struct DescriptorHeap {
    descriptor: DescriptorHeapDescriptor,
    cpu_start: u64,
    gpu_start: Option<u64>,
    increment: u32,
    slots: Mutex<Vec<Option<Descriptor>>>,
}

impl DescriptorHeap {
    pub(crate) fn new(
        descriptor: DescriptorHeapDescriptor,
        cpu_start: u64,
        gpu_start: Option<u64>,
        increment: u32,
    ) -> Self {
        let slots = vec![None; descriptor.capacity as usize];
        Self {
            descriptor,
            cpu_start,
            gpu_start,
            increment,
            slots: Mutex::new(slots),
        }
    }

    pub fn kind(&self) -> DescriptorHeapKind {
        self.descriptor.kind
    }

    pub fn is_shader_visible(&self) -> bool {
        self.descriptor.kind == DescriptorHeapKind::ShaderVisible
    }

    pub fn capacity(&self) -> u32 {
        self.descriptor.capacity
    }

    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Distance in bytes between adjacent handles.
    pub fn increment(&self) -> u32 {
        self.increment
    }

    pub fn cpu_start(&self) -> CpuDescriptorHandle {
        CpuDescriptorHandle(self.cpu_start)
    }

    /// First GPU handle, or `None` for a CPU-only heap.
    pub fn gpu_start(&self) -> Option<GpuDescriptorHandle> {
        self.gpu_start.map(GpuDescriptorHandle)
    }

    pub fn cpu_handle(&self, index: u32) -> Result<CpuDescriptorHandle, GraphicsError> {
        self.check_index(index)?;
        Ok(self.cpu_start().offset(index, self.increment))
    }

    pub fn gpu_handle(&self, index: u32) -> Result<GpuDescriptorHandle, GraphicsError> {
        self.check_index(index)?;
        let start = self.gpu_start().ok_or_else(|| {
            GraphicsError::InvalidState(format!(
                "descriptor heap {:?} is not shader-visible",
                self.descriptor.label
            ))
        })?;
        Ok(start.offset(index, self.increment))
    }

    /// Slot index of a CPU handle, if the handle points into this heap.
    pub fn index_of_cpu(&self, handle: CpuDescriptorHandle) -> Option<u32> {
        slot_index(self.cpu_start, handle.0, self.increment, self.capacity())
    }

    /// Slot index of a GPU handle, if the handle points into this heap.
    pub fn index_of_gpu(&self, handle: GpuDescriptorHandle) -> Option<u32> {
        let start = self.gpu_start?;
        slot_index(start, handle.0, self.increment, self.capacity())
    }

    /// Write a descriptor into a slot, replacing what was there.
    pub fn write(&self, index: u32, descriptor: Descriptor) -> Result<(), GraphicsError> {
        self.check_index(index)?;
        self.slots.lock()[index as usize] = Some(descriptor);
        Ok(())
    }

    /// Contents of a slot, or `None` if it was never written.
    pub fn get(&self, index: u32) -> Option<Descriptor> {
        self.slots.lock().get(index as usize).cloned().flatten()
    }

    /// Contents of the slot a GPU handle refers to.
    pub fn get_gpu(&self, handle: GpuDescriptorHandle) -> Option<Descriptor> {
        self.index_of_gpu(handle).and_then(|index| self.get(index))
    }

    /// Number of slots that have been written.
    pub fn occupied(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    /// Copy `count` slots from `src` starting at `src_index` into this heap
    /// starting at `dst_index`. Empty source slots are copied as empty.
    pub fn copy_from(
        &self,
        dst_index: u32,
        src: &DescriptorHeap,
        src_index: u32,
        count: u32,
    ) -> Result<(), GraphicsError> {
        if count == 0 {
            return Ok(());
        }
        self.check_range(dst_index, count)?;
        src.check_range(src_index, count)?;

        let (dst_start, src_start, count) = (dst_index as usize, src_index as usize, count as usize);
        if std::ptr::eq(self, src) {
            let mut slots = self.slots.lock();
            let source: Vec<_> = slots[src_start..src_start + count].to_vec();
            slots[dst_start..dst_start + count].clone_from_slice(&source);
        } else {
            let source: Vec<_> = src.slots.lock()[src_start..src_start + count].to_vec();
            self.slots.lock()[dst_start..dst_start + count].clone_from_slice(&source);
        }
        Ok(())
    }

    fn check_index(&self, index: u32) -> Result<(), GraphicsError> {
        if index < self.capacity() {
            Ok(())
        } else {
            Err(GraphicsError::InvalidParameter(format!(
                "descriptor slot {index} out of range for heap {:?} of {} slots",
                self.descriptor.label,
                self.capacity()
            )))
        }
    }

    fn check_range(&self, start: u32, count: u32) -> Result<(), GraphicsError> {
        match start.checked_add(count) {
            Some(end) if end <= self.capacity() => Ok(()),
            _ => Err(GraphicsError::InvalidParameter(format!(
                "descriptor range {start}+{count} out of range for heap {:?} of {} slots",
                self.descriptor.label,
                self.capacity()
            ))),
        }
    }
}

impl std::fmt::Debug for DescriptorHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorHeap")
            .field("label", &self.descriptor.label)
            .field("kind", &self.descriptor.kind)
            .field("capacity", &self.descriptor.capacity)
            .field("cpu_start", &format_args!("{:#x}", self.cpu_start))
            .finish()
    }
}

static_assertions::assert_impl_all!(DescriptorHeap: Send, Sync);

fn slot_index(start: u64, address: u64, increment: u32, capacity: u32) -> Option<u32> {
    let delta = address.checked_sub(start)?;
    if delta % increment as u64 != 0 {
        return None;
    }
    let index = delta / increment as u64;
    (index < capacity as u64).then_some(index as u32)
}
