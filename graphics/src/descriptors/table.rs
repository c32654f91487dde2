//! Descriptor table composition in the shader-visible heap.

use std::sync::Arc;

use crate::descriptors::{CpuDescriptorHandle, DescriptorHeap, GpuDescriptorHandle};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;

/// Builds descriptor tables by appending views to a region of the
/// shader-visible heap.
///
/// The region is `[base, base + capacity)`. The cursor only moves forward:
/// slots are never reclaimed, so the total number of views registered over
/// the builder's lifetime must fit the region. Exceeding it is reported as
/// [`GraphicsError::CapacityExceeded`] before any slot is written.
///
/// Views appended by one call occupy consecutive slots, so the returned GPU
/// handle addresses a contiguous table of `views.len()` entries.
pub struct DescriptorTableBuilder {
    device: Arc<GraphicsDevice>,
    heap: Arc<DescriptorHeap>,
    base: u32,
    capacity: u32,
    next: u32,
}

impl DescriptorTableBuilder {
    /// Manage `capacity` slots of `heap` starting at `base`.
    pub fn new(
        device: Arc<GraphicsDevice>,
        heap: Arc<DescriptorHeap>,
        base: u32,
        capacity: u32,
    ) -> Result<Self, GraphicsError> {
        if !heap.is_shader_visible() {
            return Err(GraphicsError::InvalidParameter(
                "descriptor tables need a shader-visible heap".to_string(),
            ));
        }
        if base.checked_add(capacity).is_none_or(|end| end > heap.capacity()) {
            return Err(GraphicsError::InvalidParameter(format!(
                "table region {base}+{capacity} does not fit heap of {} slots",
                heap.capacity()
            )));
        }
        Ok(Self {
            device,
            heap,
            base,
            capacity,
            next: 0,
        })
    }

    pub fn heap(&self) -> &Arc<DescriptorHeap> {
        &self.heap
    }

    /// First heap slot of the region.
    pub fn base_slot(&self) -> u32 {
        self.base
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Heap slot the next appended view will land in.
    pub fn next_free_slot(&self) -> u32 {
        self.base + self.next
    }

    pub fn remaining(&self) -> u32 {
        self.capacity - self.next
    }

    /// Heap slot of a GPU handle inside this builder's region.
    pub fn slot_of(&self, handle: GpuDescriptorHandle) -> Option<u32> {
        self.heap
            .index_of_gpu(handle)
            .filter(|slot| (self.base..self.base + self.capacity).contains(slot))
    }

    /// Copy the given CPU views into consecutive slots and return the GPU
    /// handle of the first one.
    pub fn append_views(
        &mut self,
        views: &[CpuDescriptorHandle],
    ) -> Result<GpuDescriptorHandle, GraphicsError> {
        let count = self.check_request(views.len())?;

        for view in views {
            self.device.resolve_cpu_descriptor(*view)?;
        }

        let first = self.next_free_slot();
        for (i, view) in views.iter().enumerate() {
            let dst = self.heap.cpu_handle(first + i as u32)?;
            self.device.copy_descriptors_simple(1, dst, *view)?;
        }
        self.commit(first, count)
    }

    /// Copy `count` contiguous CPU views starting at `src` and return the
    /// GPU handle of the first copy.
    pub fn append_range(
        &mut self,
        src: CpuDescriptorHandle,
        count: u32,
    ) -> Result<GpuDescriptorHandle, GraphicsError> {
        let count = self.check_request(count as usize)?;
        let first = self.next_free_slot();
        let dst = self.heap.cpu_handle(first)?;
        self.device.copy_descriptors_simple(count, dst, src)?;
        self.commit(first, count)
    }

    /// Reserve one slot for a view the caller writes in place.
    pub fn reserve_slot(
        &mut self,
    ) -> Result<(u32, CpuDescriptorHandle, GpuDescriptorHandle), GraphicsError> {
        self.check_request(1)?;
        let slot = self.next_free_slot();
        let cpu = self.heap.cpu_handle(slot)?;
        let gpu = self.commit(slot, 1)?;
        Ok((slot, cpu, gpu))
    }

    fn check_request(&self, count: usize) -> Result<u32, GraphicsError> {
        if count == 0 {
            return Err(GraphicsError::InvalidParameter(
                "descriptor table needs at least one view".to_string(),
            ));
        }
        let requested = self.next as u64 + count as u64;
        if requested > self.capacity as u64 {
            return Err(GraphicsError::CapacityExceeded {
                resource: "descriptor table heap",
                capacity: self.capacity as u64,
                requested,
            });
        }
        Ok(count as u32)
    }

    fn commit(&mut self, first: u32, count: u32) -> Result<GpuDescriptorHandle, GraphicsError> {
        let handle = self.heap.gpu_handle(first)?;
        self.next += count;
        log::trace!(
            "DescriptorTableBuilder: {count} view(s) at slot {first}, {} remaining",
            self.remaining()
        );
        Ok(handle)
    }
}

impl std::fmt::Debug for DescriptorTableBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorTableBuilder")
            .field("base", &self.base)
            .field("capacity", &self.capacity)
            .field("next", &self.next)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use super::*;
    use crate::descriptors::{
        CpuDescriptorAllocator, Descriptor, DescriptorHeapDescriptor, ViewTarget,
    };
    use crate::instance::{BackendType, GraphicsInstance, InstanceParameters};

    struct Fixture {
        builder: DescriptorTableBuilder,
        views: CpuDescriptorAllocator,
    }

    fn fixture(base: u32, capacity: u32) -> Fixture {
        let instance = GraphicsInstance::with_parameters(
            InstanceParameters::new().with_backend(BackendType::Dummy),
        )
        .unwrap();
        let device = instance.create_device().unwrap();
        let shader_heap = device
            .create_descriptor_heap(&DescriptorHeapDescriptor::shader_visible(base + capacity))
            .unwrap();
        let staging = device
            .create_descriptor_heap(&DescriptorHeapDescriptor::cpu_only(16))
            .unwrap();
        Fixture {
            builder: DescriptorTableBuilder::new(device, shader_heap, base, capacity).unwrap(),
            views: CpuDescriptorAllocator::new(staging),
        }
    }

    fn texture_view(views: &mut CpuDescriptorAllocator) -> CpuDescriptorHandle {
        views
            .allocate(Descriptor::ShaderResourceView(ViewTarget::Texture(Weak::new())))
            .unwrap()
    }

    #[test]
    fn test_append_is_contiguous() {
        let mut f = fixture(10, 8);
        let views: Vec<_> = (0..4).map(|_| texture_view(&mut f.views)).collect();

        let table = f.builder.append_views(&views).unwrap();
        let first = f.builder.slot_of(table).unwrap();
        assert_eq!(first, 10);
        for i in 0..4 {
            assert!(f.builder.heap().get(first + i).is_some());
        }
        assert_eq!(f.builder.next_free_slot(), 14);
        assert_eq!(f.builder.remaining(), 4);
    }

    #[test]
    fn test_capacity_checked_before_writing() {
        let mut f = fixture(0, 4);
        let views: Vec<_> = (0..5).map(|_| texture_view(&mut f.views)).collect();

        let err = f.builder.append_views(&views).unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::CapacityExceeded {
                capacity: 4,
                requested: 5,
                ..
            }
        ));
        assert_eq!(f.builder.heap().occupied(), 0);
        assert_eq!(f.builder.next_free_slot(), 0);
    }

    #[test]
    fn test_empty_and_unknown_views() {
        let mut f = fixture(0, 4);
        assert!(matches!(
            f.builder.append_views(&[]),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert!(matches!(
            f.builder.append_views(&[CpuDescriptorHandle(0xdead)]),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert_eq!(f.builder.remaining(), 4);
    }

    #[test]
    fn test_append_range_and_reserve() {
        let mut f = fixture(2, 4);
        let first = texture_view(&mut f.views);
        texture_view(&mut f.views);

        let table = f.builder.append_range(first, 2).unwrap();
        assert_eq!(f.builder.slot_of(table), Some(2));

        let (slot, _cpu, gpu) = f.builder.reserve_slot().unwrap();
        assert_eq!(slot, 4);
        assert_eq!(f.builder.slot_of(gpu), Some(4));
        assert!(f.builder.heap().get(slot).is_none());
        assert_eq!(f.builder.remaining(), 1);
    }

    #[test]
    fn test_region_must_fit_heap() {
        let f = fixture(0, 4);
        let device = Arc::clone(&f.builder.device);
        let heap = Arc::clone(f.builder.heap());
        assert!(DescriptorTableBuilder::new(device, heap, 2, 4).is_err());
    }
}
