//! CPU-side mesh types and generators.
//!
//! - [`Vertex`] - The single interleaved vertex format used by the renderer
//! - [`CpuMesh`] - Vertex and `u32` index arrays ready for upload
//! - Generators for common shapes (cube, quad, sphere)
//!
//! These types are re-exported by `lumen-graphics` for convenience.

mod data;
pub mod generators;

pub use data::{CpuMesh, IndexFormat, Vertex};
