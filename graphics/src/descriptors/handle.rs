//! Descriptor handles.

/// Address of a descriptor slot as seen by the CPU.
///
/// Every heap, shader-visible or not, has a CPU address range. Handles are
/// `heap start + slot index * increment`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuDescriptorHandle(pub u64);

/// Address of a descriptor slot as seen by shaders.
///
/// Only shader-visible heaps have GPU handles. A GPU handle to the first
/// slot of a contiguous range is what a descriptor table binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuDescriptorHandle(pub u64);

impl CpuDescriptorHandle {
    pub fn ptr(self) -> u64 {
        self.0
    }

    /// Handle `count` slots further along the same heap.
    pub fn offset(self, count: u32, increment: u32) -> Self {
        Self(self.0 + count as u64 * increment as u64)
    }
}

impl GpuDescriptorHandle {
    pub fn ptr(self) -> u64 {
        self.0
    }

    /// Handle `count` slots further along the same heap.
    pub fn offset(self, count: u32, increment: u32) -> Self {
        Self(self.0 + count as u64 * increment as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset() {
        let cpu = CpuDescriptorHandle(0x1000);
        assert_eq!(cpu.offset(3, 32), CpuDescriptorHandle(0x1060));
        let gpu = GpuDescriptorHandle(0x1_0000_0000);
        assert_eq!(gpu.offset(0, 32), gpu);
        assert_eq!(gpu.offset(2, 32).ptr() - gpu.ptr(), 64);
    }
}
