//! Ring allocator for per-draw shader constants.
//!
//! The ring streams small constant blocks to the GPU every frame. It owns an
//! upload-heap buffer of `slots * 256` bytes and the first `slots` entries of
//! the shader-visible descriptor heap. Every allocation:
//!
//! 1. rounds its size up to [`CONSTANT_BUFFER_ALIGNMENT`],
//! 2. wraps the byte cursor to 0 if the block would run past the end,
//! 3. copies the data into the mapped buffer,
//! 4. writes a constant-buffer view for the block into the mirrored heap slot,
//! 5. advances both cursors.
//!
//! # Example
//!
//! ```ignore
//! let handle = ring.write_constants(bytemuck::bytes_of(&vertex_data))?;
//! // bind `handle` as the draw's constant table
//! ```
//!
//! # Reuse
//!
//! The ring does not track individual allocations. Bytes written since the
//! last [`retire`](ConstantRing::retire) are considered in flight; the owner
//! calls `retire` after a submission has been observed complete. An
//! allocation that would overwrite in-flight bytes is handled according to
//! the [`OverflowPolicy`].

use std::sync::Arc;

use crate::descriptors::{Descriptor, DescriptorHeap, GpuDescriptorHandle};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::Buffer;
use crate::types::{BufferDescriptor, BufferUsage, MemoryLocation};

/// Required alignment of constant-buffer views, in bytes.
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// What the ring does when an allocation would overwrite data the GPU may
/// still be reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OverflowPolicy {
    /// Log a warning and overwrite.
    #[default]
    Wrap,
    /// Refuse with [`GraphicsError::CapacityExceeded`].
    Error,
}

/// A block handed out by the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingAllocation {
    /// Byte offset into the ring buffer, a multiple of 256.
    pub offset: u64,
    /// Rounded size of the block.
    pub size: u64,
    /// Heap slot of the block's constant-buffer view.
    pub slot: u32,
    /// GPU handle of that view.
    pub handle: GpuDescriptorHandle,
}

impl RingAllocation {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Fixed-capacity circular allocator for constant data.
///
/// Single writer: the ring is used through `&mut` only.
pub struct ConstantRing {
    device: Arc<GraphicsDevice>,
    buffer: Arc<Buffer>,
    heap: Arc<DescriptorHeap>,
    slots: u32,
    capacity: u64,
    write_offset: u64,
    descriptor_cursor: u32,
    wrap_count: u64,
    /// Bytes consumed since the last retirement, skipped tails included.
    in_flight: u64,
    policy: OverflowPolicy,
    last_allocation: Option<RingAllocation>,
}

impl ConstantRing {
    /// Create a ring of `slots` 256-byte blocks whose views live in heap
    /// slots `[0, slots)`.
    pub fn new(
        device: Arc<GraphicsDevice>,
        heap: Arc<DescriptorHeap>,
        slots: u32,
        policy: OverflowPolicy,
    ) -> Result<Self, GraphicsError> {
        if slots == 0 {
            return Err(GraphicsError::InvalidParameter(
                "constant ring needs at least one slot".to_string(),
            ));
        }
        if !heap.is_shader_visible() {
            return Err(GraphicsError::InvalidParameter(
                "constant ring views need a shader-visible heap".to_string(),
            ));
        }
        if slots > heap.capacity() {
            return Err(GraphicsError::InvalidParameter(format!(
                "constant ring of {slots} slots does not fit heap of {} slots",
                heap.capacity()
            )));
        }

        let capacity = slots as u64 * CONSTANT_BUFFER_ALIGNMENT;
        let buffer = device.create_buffer(
            &BufferDescriptor::new(capacity, BufferUsage::CONSTANT)
                .with_location(MemoryLocation::Upload)
                .with_label("constant_ring"),
        )?;

        log::debug!("ConstantRing: {slots} slots ({capacity} bytes), policy {policy:?}");

        Ok(Self {
            device,
            buffer,
            heap,
            slots,
            capacity,
            write_offset: 0,
            descriptor_cursor: 0,
            wrap_count: 0,
            in_flight: 0,
            policy,
            last_allocation: None,
        })
    }

    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn slot_count(&self) -> u32 {
        self.slots
    }

    /// Byte offset the next allocation starts at, unless it wraps.
    pub fn write_offset(&self) -> u64 {
        self.write_offset
    }

    /// Heap slot the next constant-buffer view is written to.
    pub fn descriptor_cursor(&self) -> u32 {
        self.descriptor_cursor
    }

    /// Number of times the cursors went back to zero.
    pub fn wrap_count(&self) -> u64 {
        self.wrap_count
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn last_allocation(&self) -> Option<RingAllocation> {
        self.last_allocation
    }

    /// Bytes written since the last [`retire`](Self::retire).
    pub fn in_flight_bytes(&self) -> u64 {
        self.in_flight
    }

    /// Copy `data` into the ring and return the GPU handle of its view.
    pub fn write_constants(&mut self, data: &[u8]) -> Result<GpuDescriptorHandle, GraphicsError> {
        Ok(self.allocate(data)?.handle)
    }

    /// Typed variant of [`write_constants`](Self::write_constants).
    pub fn write_constants_typed<T: bytemuck::Pod>(
        &mut self,
        value: &T,
    ) -> Result<GpuDescriptorHandle, GraphicsError> {
        self.write_constants(bytemuck::bytes_of(value))
    }

    /// Copy `data` into the ring and describe the block it landed in.
    pub fn allocate(&mut self, data: &[u8]) -> Result<RingAllocation, GraphicsError> {
        lumen_core::profile_scope!("constant_ring_allocate");

        if data.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "constant data cannot be empty".to_string(),
            ));
        }
        let size = (data.len() as u64).next_multiple_of(CONSTANT_BUFFER_ALIGNMENT);
        if size > self.capacity {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} bytes of constant data exceed the ring capacity of {} bytes",
                data.len(),
                self.capacity
            )));
        }

        let wraps = self.write_offset + size > self.capacity
            || self.descriptor_cursor >= self.slots;
        let (offset, slot, skipped) = if wraps {
            (0, 0, self.capacity - self.write_offset)
        } else {
            (self.write_offset, self.descriptor_cursor, 0)
        };

        // The skipped tail only separates live data when something is in
        // flight; after a retire it holds nothing the GPU still reads.
        let gap = if self.in_flight > 0 { skipped } else { 0 };
        let consumed = self.in_flight + gap + size;
        if consumed > self.capacity {
            match self.policy {
                OverflowPolicy::Error => {
                    return Err(GraphicsError::CapacityExceeded {
                        resource: "constant ring",
                        capacity: self.capacity,
                        requested: consumed,
                    });
                }
                OverflowPolicy::Wrap => log::warn!(
                    "ConstantRing: overwriting constants at offset {offset} that were written since the last flush"
                ),
            }
        }

        self.device.write_buffer(&self.buffer, offset, data)?;
        self.heap.write(
            slot,
            Descriptor::ConstantBufferView {
                buffer: Arc::downgrade(&self.buffer),
                offset,
                size,
            },
        )?;
        let handle = self.heap.gpu_handle(slot)?;

        if wraps {
            self.wrap_count += 1;
            log::debug!(
                "ConstantRing: wrapped at offset {} (wrap #{})",
                self.write_offset,
                self.wrap_count
            );
        }
        self.write_offset = offset + size;
        self.descriptor_cursor = slot + 1;
        self.in_flight = consumed.min(self.capacity);
        lumen_core::profile_plot!("constant_ring_write_offset", self.write_offset);

        let allocation = RingAllocation {
            offset,
            size,
            slot,
            handle,
        };
        self.last_allocation = Some(allocation);
        Ok(allocation)
    }

    /// Mark everything written so far as no longer read by the GPU.
    ///
    /// Call only after the submission that consumed the data has completed.
    pub fn retire(&mut self) {
        self.in_flight = 0;
    }
}

impl std::fmt::Debug for ConstantRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantRing")
            .field("capacity", &self.capacity)
            .field("write_offset", &self.write_offset)
            .field("descriptor_cursor", &self.descriptor_cursor)
            .field("wrap_count", &self.wrap_count)
            .field("in_flight", &self.in_flight)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::DescriptorHeapDescriptor;
    use crate::instance::{BackendType, GraphicsInstance, InstanceParameters};

    fn ring(slots: u32, policy: OverflowPolicy) -> ConstantRing {
        let device = GraphicsInstance::with_parameters(
            InstanceParameters::new().with_backend(BackendType::Dummy),
        )
        .unwrap()
        .create_device()
        .unwrap();
        let heap = device
            .create_descriptor_heap(&DescriptorHeapDescriptor::shader_visible(slots + 4))
            .unwrap();
        ConstantRing::new(device, heap, slots, policy).unwrap()
    }

    #[test]
    fn test_offsets_follow_rounded_sizes() {
        let mut ring = ring(10, OverflowPolicy::Wrap);
        assert_eq!(ring.capacity(), 2560);

        let offsets: Vec<u64> = [64usize, 300, 4]
            .iter()
            .map(|&len| ring.allocate(&vec![1u8; len]).unwrap().offset)
            .collect();
        assert_eq!(offsets, vec![0, 256, 768]);
        assert_eq!(ring.write_offset(), 1024);
        assert_eq!(ring.descriptor_cursor(), 3);
    }

    #[test]
    fn test_every_offset_is_aligned() {
        let mut ring = ring(16, OverflowPolicy::Wrap);
        for len in [1usize, 17, 255, 256, 257, 511, 700, 1, 90, 1024] {
            let allocation = ring.allocate(&vec![0u8; len]).unwrap();
            assert_eq!(allocation.offset % CONSTANT_BUFFER_ALIGNMENT, 0);
            assert_eq!(allocation.size % CONSTANT_BUFFER_ALIGNMENT, 0);
            assert!(allocation.end() <= ring.capacity());
        }
    }

    #[test]
    fn test_wraps_to_zero_when_block_does_not_fit() {
        let mut ring = ring(4, OverflowPolicy::Wrap);
        ring.allocate(&[0; 512]).unwrap();
        ring.allocate(&[0; 256]).unwrap();
        assert_eq!(ring.write_offset(), 768);

        ring.retire();
        let wrapped = ring.allocate(&[0; 300]).unwrap();
        assert_eq!(wrapped.offset, 0);
        assert_eq!(wrapped.slot, 0);
        assert_eq!(ring.wrap_count(), 1);
        assert_eq!(ring.descriptor_cursor(), 1);
    }

    #[test]
    fn test_exact_fill_does_not_wrap() {
        let mut ring = ring(2, OverflowPolicy::Wrap);
        ring.allocate(&[0; 256]).unwrap();
        let last = ring.allocate(&[0; 256]).unwrap();
        assert_eq!(last.offset, 256);
        assert_eq!(ring.wrap_count(), 0);
    }

    #[test]
    fn test_view_describes_block() {
        let mut ring = ring(4, OverflowPolicy::Wrap);
        ring.allocate(&[0; 8]).unwrap();
        let allocation = ring.allocate(&[9; 260]).unwrap();

        let heap = Arc::clone(&ring.heap);
        match heap.get_gpu(allocation.handle) {
            Some(Descriptor::ConstantBufferView { offset, size, .. }) => {
                assert_eq!((offset, size), (256, 512));
            }
            other => panic!("unexpected descriptor {other:?}"),
        }
        assert_eq!(heap.index_of_gpu(allocation.handle), Some(1));
    }

    #[test]
    fn test_error_policy_refuses_to_alias() {
        let mut ring = ring(4, OverflowPolicy::Error);
        ring.allocate(&[0; 768]).unwrap();

        let err = ring.allocate(&[0; 512]).unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::CapacityExceeded {
                resource: "constant ring",
                capacity: 1024,
                ..
            }
        ));
        assert_eq!(ring.write_offset(), 768);
        assert_eq!(ring.wrap_count(), 0);

        ring.retire();
        assert_eq!(ring.allocate(&[0; 512]).unwrap().offset, 0);
    }

    #[test]
    fn test_retired_tail_is_not_counted_after_wrap() {
        let mut ring = ring(4, OverflowPolicy::Error);
        ring.allocate(&[0; 768]).unwrap();
        ring.retire();

        let wrapped = ring.allocate(&[0; 512]).unwrap();
        assert_eq!(wrapped.offset, 0);
        assert_eq!(ring.in_flight_bytes(), 512);

        // [512, 1024) only holds data from before the retire.
        let next = ring.allocate(&[0; 512]).unwrap();
        assert_eq!(next.offset, 512);
        assert_eq!(ring.in_flight_bytes(), 1024);

        assert!(matches!(
            ring.allocate(&[0; 256]),
            Err(GraphicsError::CapacityExceeded {
                requested: 1280,
                ..
            })
        ));
    }

    #[test]
    fn test_wrap_policy_overwrites_unflushed_data() {
        let mut ring = ring(2, OverflowPolicy::Wrap);
        ring.allocate(&[0; 512]).unwrap();
        let aliased = ring.allocate(&[0; 256]).unwrap();
        assert_eq!(aliased.offset, 0);
        assert_eq!(ring.in_flight_bytes(), ring.capacity());
    }

    #[test]
    fn test_rejects_empty_and_oversized_data() {
        let mut ring = ring(2, OverflowPolicy::Wrap);
        assert!(matches!(
            ring.allocate(&[]),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert!(matches!(
            ring.allocate(&[0; 513]),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert!(ring.last_allocation().is_none());
    }

    #[test]
    fn test_typed_write() {
        let mut ring = ring(2, OverflowPolicy::Wrap);
        let handle = ring.write_constants_typed(&[1.0f32; 4]).unwrap();
        assert_eq!(ring.last_allocation().unwrap().handle, handle);
        assert_eq!(ring.last_allocation().unwrap().size, 256);
    }
}
