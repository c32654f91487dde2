//! Materials and their texture tables.
//!
//! A [`Material`] names four texture views by [`TextureSlot`] and turns them
//! into one descriptor table when finalized. Shaders index the table as
//! `t0..t3`: albedo, metalness, normal, roughness.

mod material;

pub use material::{Material, TEXTURE_SLOT_COUNT, TextureSlot};
