//! CPU-only descriptor allocation.

use std::sync::Arc;

use crate::descriptors::{CpuDescriptorHandle, Descriptor, DescriptorHeap};
use crate::error::GraphicsError;

/// Hands out slots of a CPU-only heap in order, never reclaiming them.
///
/// Views created here are later copied into the shader-visible heap by the
/// [`DescriptorTableBuilder`](super::DescriptorTableBuilder).
#[derive(Debug)]
pub struct CpuDescriptorAllocator {
    heap: Arc<DescriptorHeap>,
    next: u32,
}

impl CpuDescriptorAllocator {
    pub fn new(heap: Arc<DescriptorHeap>) -> Self {
        Self { heap, next: 0 }
    }

    pub fn heap(&self) -> &Arc<DescriptorHeap> {
        &self.heap
    }

    /// Number of slots handed out so far.
    pub fn allocated(&self) -> u32 {
        self.next
    }

    pub fn remaining(&self) -> u32 {
        self.heap.capacity() - self.next
    }

    /// Write `descriptor` into the next free slot and return its handle.
    pub fn allocate(&mut self, descriptor: Descriptor) -> Result<CpuDescriptorHandle, GraphicsError> {
        if self.next >= self.heap.capacity() {
            return Err(GraphicsError::CapacityExceeded {
                resource: "CPU descriptor heap",
                capacity: self.heap.capacity() as u64,
                requested: self.next as u64 + 1,
            });
        }
        let handle = self.heap.cpu_handle(self.next)?;
        self.heap.write(self.next, descriptor)?;
        self.next += 1;
        Ok(handle)
    }
}
