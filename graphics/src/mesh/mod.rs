//! Meshes on the GPU.
//!
//! - [`GpuMesh`] - Immutable vertex and index buffers uploaded from a [`CpuMesh`]
//! - [`VertexBufferView`] / [`IndexBufferView`] - Non-owning views consumed by
//!   draw calls and by the raytracing geometry input
//!
//! The CPU-side types from `lumen-core` are re-exported here.

mod gpu;

pub use gpu::{GpuMesh, IndexBufferView, VertexBufferView};
pub use lumen_core::mesh::{CpuMesh, IndexFormat, Vertex, generators};
