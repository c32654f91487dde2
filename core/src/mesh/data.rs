//! CPU-side mesh data structures.
//!
//! This module provides:
//! - [`Vertex`] - Interleaved position / uv / normal / tangent vertex
//! - [`IndexFormat`] - Index data format (u16 or u32)
//! - [`CpuMesh`] - CPU-side mesh holding vertex and index arrays

use glam::{Vec2, Vec3};

/// Interleaved vertex matching the renderer's input layout.
///
/// The layout is 44 bytes: `position` (12), `uv` (8), `normal` (12),
/// `tangent` (12), with no padding between fields.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
}

static_assertions::const_assert_eq!(std::mem::size_of::<Vertex>(), 44);

impl Vertex {
    /// Size of one vertex in bytes.
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    /// Create a vertex with a zero tangent.
    pub fn new(position: [f32; 3], uv: [f32; 2], normal: [f32; 3]) -> Self {
        Self {
            position,
            uv,
            normal,
            tangent: [0.0; 3],
        }
    }
}

/// Index format for indexed drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit unsigned integers (max 65535 vertices).
    Uint16,
    /// 32-bit unsigned integers.
    #[default]
    Uint32,
}

impl IndexFormat {
    /// Get the size in bytes of each index.
    pub fn size(&self) -> usize {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

/// A CPU-side triangle mesh.
///
/// Meshes are built by the generators in [`super::generators`] or by model
/// loaders, and uploaded once into immutable GPU buffers by
/// `lumen_graphics::GpuMesh::from_cpu`. Indices are always 32-bit.
#[derive(Debug, Clone, Default)]
pub struct CpuMesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    label: Option<String>,
}

impl CpuMesh {
    /// Create a mesh from vertex and index arrays.
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
            label: None,
        }
    }

    /// Set a debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Get the debug label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Index format of this mesh's index data.
    pub fn index_format(&self) -> IndexFormat {
        IndexFormat::Uint32
    }

    /// Check whether the mesh has no geometry to draw.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    /// Raw vertex bytes, tightly packed at [`Vertex::STRIDE`].
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Raw index bytes.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Recompute per-vertex tangents from positions, uvs and normals.
    ///
    /// Tangents are accumulated per triangle, then orthonormalized against
    /// the vertex normal (Gram-Schmidt). Triangles with degenerate uvs
    /// contribute nothing; a vertex left without a usable tangent keeps a
    /// zero tangent. Triangles referencing out-of-range vertices are skipped.
    pub fn calculate_tangents(&mut self) {
        let mut accumulated = vec![Vec3::ZERO; self.vertices.len()];

        for tri in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let (Some(v0), Some(v1), Some(v2)) = (
                self.vertices.get(i0),
                self.vertices.get(i1),
                self.vertices.get(i2),
            ) else {
                log::warn!(
                    "Mesh {:?}: triangle ({i0}, {i1}, {i2}) references a missing vertex",
                    self.label
                );
                continue;
            };

            let p0 = Vec3::from(v0.position);
            let edge1 = Vec3::from(v1.position) - p0;
            let edge2 = Vec3::from(v2.position) - p0;

            let uv0 = Vec2::from(v0.uv);
            let duv1 = Vec2::from(v1.uv) - uv0;
            let duv2 = Vec2::from(v2.uv) - uv0;

            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            if det.abs() <= f32::EPSILON {
                continue;
            }
            let r = 1.0 / det;
            let tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;

            accumulated[i0] += tangent;
            accumulated[i1] += tangent;
            accumulated[i2] += tangent;
        }

        for (vertex, tangent) in self.vertices.iter_mut().zip(accumulated) {
            let normal = Vec3::from(vertex.normal);
            let orthogonal = tangent - normal * normal.dot(tangent);
            vertex.tangent = orthogonal.normalize_or_zero().to_array();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_triangle() -> CpuMesh {
        CpuMesh::new(
            vec![
                Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0], [0.0, 0.0, 1.0]),
                Vertex::new([1.0, 0.0, 0.0], [1.0, 0.0], [0.0, 0.0, 1.0]),
                Vertex::new([0.0, 1.0, 0.0], [0.0, 1.0], [0.0, 0.0, 1.0]),
            ],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn test_vertex_stride() {
        assert_eq!(Vertex::STRIDE, 44);
    }

    #[test]
    fn test_byte_views() {
        let mesh = unit_triangle();
        assert_eq!(mesh.vertex_bytes().len(), 3 * 44);
        assert_eq!(mesh.index_bytes().len(), 3 * 4);
        assert_eq!(mesh.index_format().size(), 4);
        assert!(!mesh.is_empty());
    }

    #[test]
    fn test_tangents_follow_u_axis() {
        let mut mesh = unit_triangle();
        mesh.calculate_tangents();
        for v in mesh.vertices() {
            assert!((v.tangent[0] - 1.0).abs() < 1e-5);
            assert!(v.tangent[1].abs() < 1e-5);
            assert!(v.tangent[2].abs() < 1e-5);
        }
    }

    #[test]
    fn test_tangents_degenerate_uv() {
        let mut mesh = unit_triangle();
        for v in &mut mesh.vertices {
            v.uv = [0.5, 0.5];
        }
        mesh.calculate_tangents();
        assert!(mesh.vertices().iter().all(|v| v.tangent == [0.0; 3]));
    }

    #[test]
    fn test_tangents_skip_bad_indices() {
        let mut mesh = unit_triangle();
        mesh.indices.extend_from_slice(&[0, 1, 99]);
        mesh.calculate_tangents();
        assert!((mesh.vertices()[0].tangent[0] - 1.0).abs() < 1e-5);
    }
}
