//! GPU mesh: a pair of static buffers plus the views describing them.

use std::sync::{Arc, Weak};

use lumen_core::mesh::{CpuMesh, IndexFormat, Vertex};

use crate::context::ResourceContext;
use crate::error::GraphicsError;
use crate::resources::Buffer;
use crate::types::BufferUsage;

/// Vertex buffer as bound to the input assembler: `{buffer, stride, size}`.
#[derive(Debug, Clone)]
pub struct VertexBufferView {
    pub buffer: Weak<Buffer>,
    /// Bytes between consecutive vertices.
    pub stride: u32,
    /// Total size in bytes.
    pub size: u64,
}

impl VertexBufferView {
    /// Number of vertices covered by the view.
    pub fn vertex_count(&self) -> u32 {
        if self.stride == 0 {
            return 0;
        }
        (self.size / self.stride as u64) as u32
    }
}

/// Index buffer as bound to the input assembler: `{buffer, format, size}`.
#[derive(Debug, Clone)]
pub struct IndexBufferView {
    pub buffer: Weak<Buffer>,
    pub format: IndexFormat,
    /// Total size in bytes.
    pub size: u64,
}

impl IndexBufferView {
    pub fn index_count(&self) -> u32 {
        (self.size / self.format.size() as u64) as u32
    }
}

/// Mesh whose geometry lives in immutable GPU-only buffers.
///
/// The mesh owns both buffers. Views handed out by [`vertex_view`] and
/// [`index_view`] only refer back to them and stop resolving once the mesh
/// is dropped.
///
/// [`vertex_view`]: GpuMesh::vertex_view
/// [`index_view`]: GpuMesh::index_view
pub struct GpuMesh {
    label: Option<String>,
    vertex_buffer: Arc<Buffer>,
    index_buffer: Arc<Buffer>,
    vertex_count: u32,
    index_count: u32,
}

impl GpuMesh {
    /// Upload `mesh` through the context's command session.
    ///
    /// The buffers are usable after the context's next
    /// [`submit_and_reset`](ResourceContext::submit_and_reset).
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the mesh has no vertices or no indices.
    pub fn from_cpu(ctx: &mut ResourceContext, mesh: &CpuMesh) -> Result<Self, GraphicsError> {
        lumen_core::profile_function!();

        if mesh.is_empty() {
            return Err(GraphicsError::InvalidParameter(format!(
                "mesh {:?} has {} vertices and {} indices",
                mesh.label(),
                mesh.vertex_count(),
                mesh.index_count()
            )));
        }

        let label = mesh.label().unwrap_or("mesh");
        let vertex_buffer = ctx.create_static_buffer_from_slice(
            mesh.vertices(),
            BufferUsage::VERTEX | BufferUsage::STORAGE,
            Some(&format!("{label}_vertices")),
        )?;
        let index_buffer = ctx.create_static_buffer_from_slice(
            mesh.indices(),
            BufferUsage::INDEX | BufferUsage::STORAGE,
            Some(&format!("{label}_indices")),
        )?;

        log::debug!(
            "GpuMesh {label:?}: {} vertices, {} indices",
            mesh.vertex_count(),
            mesh.index_count()
        );

        Ok(Self {
            label: mesh.label().map(str::to_owned),
            vertex_buffer,
            index_buffer,
            vertex_count: mesh.vertex_count(),
            index_count: mesh.index_count(),
        })
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices to draw.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn vertex_buffer(&self) -> &Arc<Buffer> {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &Arc<Buffer> {
        &self.index_buffer
    }

    pub fn vertex_view(&self) -> VertexBufferView {
        VertexBufferView {
            buffer: Arc::downgrade(&self.vertex_buffer),
            stride: Vertex::STRIDE,
            size: self.vertex_buffer.size(),
        }
    }

    pub fn index_view(&self) -> IndexBufferView {
        IndexBufferView {
            buffer: Arc::downgrade(&self.index_buffer),
            format: IndexFormat::Uint32,
            size: self.index_buffer.size(),
        }
    }
}

impl std::fmt::Debug for GpuMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuMesh")
            .field("label", &self.label)
            .field("vertex_count", &self.vertex_count)
            .field("index_count", &self.index_count)
            .finish()
    }
}
