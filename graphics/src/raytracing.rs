//! Buffers consumed by the raytracing pass.
//!
//! The acceleration structure build and traversal live outside this crate.
//! What they consume from here is a geometry description per mesh, a table
//! of per-instance colors, and an output texture with a UAV in the
//! shader-visible heap.

use std::sync::Arc;

use glam::Vec4;
use lumen_core::mesh::IndexFormat;

use crate::context::ResourceContext;
use crate::descriptors::{Descriptor, GpuDescriptorHandle, ViewTarget};
use crate::error::GraphicsError;
use crate::mesh::{GpuMesh, IndexBufferView, VertexBufferView};
use crate::resources::{Buffer, Texture};
use crate::types::{BufferUsage, ResourceState, TextureDescriptor, TextureFormat, TextureUsage};

/// Format of the position attribute read by the acceleration structure build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexPositionFormat {
    /// Three 32-bit floats at the start of each vertex.
    #[default]
    Rgb32Float,
}

impl VertexPositionFormat {
    pub fn size(&self) -> u32 {
        match self {
            Self::Rgb32Float => 12,
        }
    }
}

/// Bottom-level acceleration structure input for one mesh.
#[derive(Debug, Clone)]
pub struct GeometryInput {
    pub vertices: VertexBufferView,
    pub indices: IndexBufferView,
    pub vertex_format: VertexPositionFormat,
    pub index_format: IndexFormat,
}

impl GeometryInput {
    pub fn from_mesh(mesh: &GpuMesh) -> Self {
        Self {
            vertices: mesh.vertex_view(),
            indices: mesh.index_view(),
            vertex_format: VertexPositionFormat::Rgb32Float,
            index_format: IndexFormat::Uint32,
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.vertex_count()
    }

    /// Triangles described by the index buffer.
    pub fn triangle_count(&self) -> u32 {
        self.indices.index_count() / 3
    }
}

/// Immutable table of one RGBA color per raytraced instance.
///
/// Shaders read it as a structured buffer indexed by `InstanceID()`.
pub struct InstanceColorTable {
    buffer: Arc<Buffer>,
    count: u32,
}

impl InstanceColorTable {
    /// Bytes per entry.
    pub const STRIDE: u32 = std::mem::size_of::<Vec4>() as u32;

    /// Upload `colors` through the context.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` for an empty color list.
    pub fn new(ctx: &mut ResourceContext, colors: &[Vec4]) -> Result<Self, GraphicsError> {
        if colors.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "instance color table needs at least one color".to_string(),
            ));
        }
        let buffer = ctx.create_static_buffer_from_slice(
            colors,
            BufferUsage::STORAGE,
            Some("instance_colors"),
        )?;
        Ok(Self {
            buffer,
            count: colors.len() as u32,
        })
    }

    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Structured buffer view over the whole table.
    pub fn view(&self) -> Descriptor {
        Descriptor::ShaderResourceView(ViewTarget::Buffer {
            buffer: Arc::downgrade(&self.buffer),
            stride: Self::STRIDE,
            count: self.count,
        })
    }
}

impl std::fmt::Debug for InstanceColorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceColorTable")
            .field("count", &self.count)
            .finish()
    }
}

/// Texture the raytracing shaders write into, with its UAV.
pub struct RaytracingOutput {
    texture: Arc<Texture>,
    view: GpuDescriptorHandle,
}

impl RaytracingOutput {
    /// Create a `width` x `height` output and place its UAV in a reserved
    /// table slot.
    ///
    /// The texture is left in [`ResourceState::UnorderedAccess`] once the
    /// context submits.
    pub fn new(ctx: &mut ResourceContext, width: u32, height: u32) -> Result<Self, GraphicsError> {
        let texture = ctx.device().create_texture(
            &TextureDescriptor::new_2d(
                width,
                height,
                TextureFormat::Rgba8Unorm,
                TextureUsage::STORAGE_BINDING | TextureUsage::COPY_SRC,
            )
            .with_label("raytracing_output"),
        )?;
        let (cpu, gpu) = ctx.reserve_descriptor_slot()?;
        ctx.write_view(cpu, Descriptor::UnorderedAccessView(Arc::downgrade(&texture)))?;

        let state = texture.state();
        ctx.session_mut()
            .list_mut()
            .transition_texture(&texture, state, ResourceState::UnorderedAccess)?;

        log::debug!("Raytracing output {width}x{height} created");
        Ok(Self { texture, view: gpu })
    }

    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    /// Shader-visible handle of the UAV.
    pub fn view(&self) -> GpuDescriptorHandle {
        self.view
    }
}

impl std::fmt::Debug for RaytracingOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaytracingOutput")
            .field("width", &self.texture.width())
            .field("height", &self.texture.height())
            .finish()
    }
}
