//! Mesh generators for common shapes.
//!
//! These generators produce [`CpuMesh`] values with tangents already
//! computed, ready for `lumen_graphics::GpuMesh::from_cpu`.

use std::f32::consts::PI;

use super::data::{CpuMesh, Vertex};

/// Generate a UV sphere mesh.
///
/// # Arguments
///
/// * `radius` - Sphere radius
/// * `segments` - Number of longitudinal segments (around the equator)
/// * `rings` - Number of latitudinal rings (from pole to pole)
pub fn generate_sphere(radius: f32, segments: u32, rings: u32) -> CpuMesh {
    let segments = segments.max(3);
    let rings = rings.max(2);

    let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);

    for ring in 0..=rings {
        let theta = ring as f32 * PI / rings as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();

        for segment in 0..=segments {
            let phi = segment as f32 * 2.0 * PI / segments as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();

            let normal = [sin_theta * cos_phi, cos_theta, sin_theta * sin_phi];
            vertices.push(Vertex::new(
                normal.map(|c| c * radius),
                [segment as f32 / segments as f32, ring as f32 / rings as f32],
                normal,
            ));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;

            indices.extend_from_slice(&[current, next, current + 1]);
            indices.extend_from_slice(&[current + 1, next, next + 1]);
        }
    }

    finish(CpuMesh::new(vertices, indices).with_label("sphere"))
}

/// Generate a quad on the XY plane facing +Z.
///
/// UV coordinates go from (0,0) at top-left to (1,1) at bottom-right.
pub fn generate_quad(half_width: f32, half_height: f32) -> CpuMesh {
    let n = [0.0, 0.0, 1.0];
    let vertices = vec![
        Vertex::new([-half_width, -half_height, 0.0], [0.0, 1.0], n),
        Vertex::new([half_width, -half_height, 0.0], [1.0, 1.0], n),
        Vertex::new([half_width, half_height, 0.0], [1.0, 0.0], n),
        Vertex::new([-half_width, half_height, 0.0], [0.0, 0.0], n),
    ];

    finish(CpuMesh::new(vertices, vec![0, 1, 2, 2, 3, 0]).with_label("quad"))
}

/// Generate an axis-aligned cube with 24 vertices (4 per face).
pub fn generate_cube(half_extent: f32) -> CpuMesh {
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        // normal, u axis, v axis
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, u, v) in FACES {
        let base = vertices.len() as u32;
        for (su, sv) in CORNERS {
            let position = [0, 1, 2].map(|i| (normal[i] + u[i] * su + v[i] * sv) * half_extent);
            let uv = [(su + 1.0) * 0.5, (1.0 - sv) * 0.5];
            vertices.push(Vertex::new(position, uv, normal));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    finish(CpuMesh::new(vertices, indices).with_label("cube"))
}

fn finish(mut mesh: CpuMesh) -> CpuMesh {
    mesh.calculate_tangents();
    mesh
}
