//! Per-draw shader constant layouts.
//!
//! Both blocks are `#[repr(C)]` and `bytemuck::Pod`, and match the HLSL
//! constant buffers byte for byte. Every `float3` is followed by a 4-byte
//! scalar so the pair fills one 16-byte register.

use glam::{Mat4, Vec2, Vec3};
use lumen_core::light::{Light, MAX_LIGHTS};

use crate::context::ResourceContext;
use crate::descriptors::GpuDescriptorHandle;
use crate::error::GraphicsError;
use crate::materials::Material;

/// Vertex shader constants (`b0`).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VertexShaderExternalData {
    pub world: Mat4,
    /// Transforms normals into world space.
    pub world_inverse_transpose: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

static_assertions::const_assert_eq!(std::mem::size_of::<VertexShaderExternalData>(), 256);

impl VertexShaderExternalData {
    pub fn new(world: Mat4, view: Mat4, projection: Mat4) -> Self {
        Self {
            world,
            world_inverse_transpose: world.inverse().transpose(),
            view,
            projection,
        }
    }
}

impl Default for VertexShaderExternalData {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

/// Pixel shader constants (`b1`).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PixelShaderExternalData {
    pub uv_scale: Vec2,
    pub uv_offset: Vec2,
    pub camera_position: Vec3,
    /// Number of valid entries in `lights`.
    pub light_count: i32,
    pub color_tint: Vec3,
    pub _padding: f32,
    pub lights: [Light; MAX_LIGHTS],
}

static_assertions::const_assert_eq!(
    std::mem::size_of::<PixelShaderExternalData>(),
    48 + MAX_LIGHTS * 64
);
static_assertions::const_assert_eq!(std::mem::offset_of!(PixelShaderExternalData, lights), 48);

impl Default for PixelShaderExternalData {
    fn default() -> Self {
        Self::new(&Material::default(), Vec3::ZERO, &[])
    }
}

impl PixelShaderExternalData {
    /// Fill the block from a material's surface parameters, the camera and
    /// the scene lights.
    ///
    /// Lights beyond [`MAX_LIGHTS`] are dropped.
    pub fn new(material: &Material, camera_position: Vec3, lights: &[Light]) -> Self {
        let mut data: Self = bytemuck::Zeroable::zeroed();
        data.uv_scale = material.uv_scale();
        data.uv_offset = material.uv_offset();
        data.camera_position = camera_position;
        data.color_tint = material.tint();
        data.set_lights(lights);
        data
    }

    /// Replace the light list.
    pub fn set_lights(&mut self, lights: &[Light]) {
        if lights.len() > MAX_LIGHTS {
            log::warn!(
                "{} lights supplied, only the first {MAX_LIGHTS} are used",
                lights.len()
            );
        }
        let count = lights.len().min(MAX_LIGHTS);
        self.lights[..count].copy_from_slice(&lights[..count]);
        for light in &mut self.lights[count..] {
            *light = bytemuck::Zeroable::zeroed();
        }
        self.light_count = count as i32;
    }

    /// The lights the shader will read.
    pub fn active_lights(&self) -> &[Light] {
        &self.lights[..self.light_count.clamp(0, MAX_LIGHTS as i32) as usize]
    }
}

/// Handles of one draw's constant buffer views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawConstants {
    pub vertex: GpuDescriptorHandle,
    pub pixel: GpuDescriptorHandle,
}

impl DrawConstants {
    /// Stream both constant blocks into the ring, vertex block first.
    pub fn write(
        ctx: &mut ResourceContext,
        vertex: &VertexShaderExternalData,
        pixel: &PixelShaderExternalData,
    ) -> Result<Self, GraphicsError> {
        let vertex = ctx.write_constants_typed(vertex)?;
        let pixel = ctx.write_constants_typed(pixel)?;
        Ok(Self { vertex, pixel })
    }
}
