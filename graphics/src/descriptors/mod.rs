//! Descriptor heaps, handles and table composition.
//!
//! The shader-visible heap is split in two regions:
//!
//! ```text
//! [0, max_constant_buffers)                       constant ring CBVs
//! [max_constant_buffers, + max_texture_descriptors)  SRV/UAV tables
//! ```
//!
//! Texture views are first written into a CPU-only heap by
//! [`CpuDescriptorAllocator`] and copied into the second region by
//! [`DescriptorTableBuilder`].

mod handle;
mod heap;
mod staging;
mod table;

pub use handle::{CpuDescriptorHandle, GpuDescriptorHandle};
pub use heap::{
    Descriptor, DescriptorHeap, DescriptorHeapDescriptor, DescriptorHeapKind, ViewTarget,
};
pub use staging::CpuDescriptorAllocator;
pub use table::DescriptorTableBuilder;
