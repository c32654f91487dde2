//! Material definition.
//!
//! A [`Material`] holds the surface parameters that go into the pixel
//! constants (tint and UV transform) and four texture views. Finalizing the
//! material registers the views as one contiguous descriptor table.

use glam::{Vec2, Vec3};

use crate::context::ResourceContext;
use crate::descriptors::{CpuDescriptorHandle, GpuDescriptorHandle};
use crate::error::GraphicsError;

/// Number of texture slots in a material table.
pub const TEXTURE_SLOT_COUNT: usize = 4;

/// Position of a texture in a material's descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum TextureSlot {
    Albedo = 0,
    Metalness = 1,
    Normal = 2,
    Roughness = 3,
}

impl TextureSlot {
    /// All slots in table order.
    pub const ALL: [TextureSlot; TEXTURE_SLOT_COUNT] = [
        TextureSlot::Albedo,
        TextureSlot::Metalness,
        TextureSlot::Normal,
        TextureSlot::Roughness,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Slot at `index`, if it is in `0..4`.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// Surface description with a four-texture descriptor table.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    label: Option<String>,
    tint: Vec3,
    uv_scale: Vec2,
    uv_offset: Vec2,
    textures: [Option<CpuDescriptorHandle>; TEXTURE_SLOT_COUNT],
    table: Option<GpuDescriptorHandle>,
}

impl Default for Material {
    fn default() -> Self {
        Self::new(Vec3::ONE)
    }
}

impl Material {
    /// Create a material with the given color tint and an identity UV transform.
    pub fn new(tint: Vec3) -> Self {
        Self {
            label: None,
            tint,
            uv_scale: Vec2::ONE,
            uv_offset: Vec2::ZERO,
            textures: [None; TEXTURE_SLOT_COUNT],
            table: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_uv(mut self, scale: Vec2, offset: Vec2) -> Self {
        self.uv_scale = scale;
        self.uv_offset = offset;
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn tint(&self) -> Vec3 {
        self.tint
    }

    pub fn set_tint(&mut self, tint: Vec3) {
        self.tint = tint;
    }

    pub fn uv_scale(&self) -> Vec2 {
        self.uv_scale
    }

    pub fn set_uv_scale(&mut self, scale: Vec2) {
        self.uv_scale = scale;
    }

    pub fn uv_offset(&self) -> Vec2 {
        self.uv_offset
    }

    pub fn set_uv_offset(&mut self, offset: Vec2) {
        self.uv_offset = offset;
    }

    /// View registered for `slot`.
    pub fn texture(&self, slot: TextureSlot) -> Option<CpuDescriptorHandle> {
        self.textures[slot.index()]
    }

    /// Assign the view for `slot`.
    ///
    /// # Errors
    ///
    /// `InvalidState` once the material is finalized, since the table can no
    /// longer change.
    pub fn set_texture(
        &mut self,
        slot: TextureSlot,
        view: CpuDescriptorHandle,
    ) -> Result<(), GraphicsError> {
        if self.is_finalized() {
            return Err(GraphicsError::InvalidState(format!(
                "material {:?} is finalized; {slot:?} cannot change",
                self.label
            )));
        }
        self.textures[slot.index()] = Some(view);
        Ok(())
    }

    /// Assign the view at a numeric slot index.
    ///
    /// An index outside `0..4` is `InvalidParameter` and leaves the material
    /// unchanged.
    pub fn add_texture(
        &mut self,
        view: CpuDescriptorHandle,
        index: usize,
    ) -> Result<(), GraphicsError> {
        let slot = TextureSlot::from_index(index).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!(
                "texture slot {index} is outside 0..{TEXTURE_SLOT_COUNT}"
            ))
        })?;
        self.set_texture(slot, view)
    }

    pub fn is_finalized(&self) -> bool {
        self.table.is_some()
    }

    /// GPU handle of the first table slot, once finalized.
    pub fn texture_table(&self) -> Option<GpuDescriptorHandle> {
        self.table
    }

    /// Register the four views as a contiguous table and keep its handle.
    ///
    /// Calling it again returns the kept handle without touching the heap.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if a slot has no view
    /// - `CapacityExceeded` if fewer than four table slots remain; nothing is
    ///   appended in that case
    pub fn finalize(
        &mut self,
        ctx: &mut ResourceContext,
    ) -> Result<GpuDescriptorHandle, GraphicsError> {
        if let Some(table) = self.table {
            return Ok(table);
        }

        let mut views = [CpuDescriptorHandle::default(); TEXTURE_SLOT_COUNT];
        for slot in TextureSlot::ALL {
            views[slot.index()] = self.textures[slot.index()].ok_or_else(|| {
                GraphicsError::InvalidState(format!(
                    "material {:?} has no {slot:?} texture",
                    self.label
                ))
            })?;
        }

        let builder = ctx.table_builder();
        if (builder.remaining() as usize) < TEXTURE_SLOT_COUNT {
            return Err(GraphicsError::CapacityExceeded {
                resource: "descriptor table heap",
                capacity: builder.capacity() as u64,
                requested: (builder.capacity() - builder.remaining()) as u64
                    + TEXTURE_SLOT_COUNT as u64,
            });
        }

        // One append per slot; the builder's cursor keeps them adjacent.
        let mut first = None;
        for view in views {
            let handle = ctx.append_views_and_get_table_handle(&[view])?;
            first.get_or_insert(handle);
        }
        let table = first.ok_or_else(|| {
            GraphicsError::Internal("material table produced no handle".to_string())
        })?;

        log::debug!(
            "Material {:?}: texture table at slot {:?}",
            self.label,
            ctx.table_builder().slot_of(table)
        );
        self.table = Some(table);
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResourceConfig;
    use crate::instance::{BackendType, GraphicsInstance, InstanceParameters};
    use lumen_core::texture::CpuTexture;

    fn context(texture_descriptors: u32) -> ResourceContext {
        let device = GraphicsInstance::with_parameters(
            InstanceParameters::new().with_backend(BackendType::Dummy),
        )
        .unwrap()
        .create_device()
        .unwrap();
        ResourceContext::from_device(
            device,
            ResourceConfig::new()
                .with_max_constant_buffers(4)
                .with_max_texture_descriptors(texture_descriptors),
        )
        .unwrap()
    }

    fn textured_material(ctx: &mut ResourceContext) -> Material {
        let mut material = Material::default().with_label("brick");
        for slot in TextureSlot::ALL {
            let image = CpuTexture::from_rgba8(1, 1, vec![slot as u8; 4]).unwrap();
            let view = ctx.load_texture_from_memory(&image).unwrap();
            material.set_texture(slot, view).unwrap();
        }
        material
    }

    #[test]
    fn test_defaults() {
        let material = Material::new(Vec3::new(1.0, 0.5, 0.25));
        assert_eq!(material.uv_scale(), Vec2::ONE);
        assert_eq!(material.uv_offset(), Vec2::ZERO);
        assert!(!material.is_finalized());
        assert!(material.texture_table().is_none());
    }

    #[test]
    fn test_add_texture_rejects_bad_index() {
        let mut material = Material::default();
        let view = CpuDescriptorHandle(0x1_0000);
        assert!(matches!(
            material.add_texture(view, 4),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert_eq!(material, Material::default());

        material.add_texture(view, 2).unwrap();
        assert_eq!(material.texture(TextureSlot::Normal), Some(view));
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut ctx = context(8);
        let mut material = textured_material(&mut ctx);

        let first = material.finalize(&mut ctx).unwrap();
        let next_slot = ctx.table_builder().next_free_slot();
        let second = material.finalize(&mut ctx).unwrap();

        assert_eq!(first, second);
        assert_eq!(material.texture_table(), Some(first));
        assert_eq!(ctx.table_builder().next_free_slot(), next_slot);
    }

    #[test]
    fn test_finalized_table_is_contiguous() {
        let mut ctx = context(8);
        let mut material = textured_material(&mut ctx);
        let table = material.finalize(&mut ctx).unwrap();

        let heap = ctx.shader_visible_heap();
        let base = heap.index_of_gpu(table).unwrap();
        assert_eq!(base, 4);
        for slot in TextureSlot::ALL {
            let copied = heap.get(base + slot as u32).unwrap();
            let source = ctx
                .texture_loader()
                .view_heap()
                .get(slot as u32)
                .unwrap();
            assert_eq!(format!("{copied:?}"), format!("{source:?}"));
        }
    }

    #[test]
    fn test_finalize_requires_every_slot() {
        let mut ctx = context(8);
        let mut material = Material::default();
        let image = CpuTexture::from_rgba8(1, 1, vec![0; 4]).unwrap();
        let view = ctx.load_texture_from_memory(&image).unwrap();
        material.set_texture(TextureSlot::Albedo, view).unwrap();

        assert!(matches!(
            material.finalize(&mut ctx),
            Err(GraphicsError::InvalidState(_))
        ));
        assert!(!material.is_finalized());
    }

    #[test]
    fn test_finalize_checks_capacity_up_front() {
        let mut ctx = context(6);
        let mut first = textured_material(&mut ctx);
        first.finalize(&mut ctx).unwrap();

        let mut second = Material::default();
        for slot in TextureSlot::ALL {
            second
                .set_texture(slot, first.texture(slot).unwrap())
                .unwrap();
        }
        let err = second.finalize(&mut ctx).unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::CapacityExceeded {
                capacity: 6,
                requested: 8,
                ..
            }
        ));
        assert_eq!(ctx.table_builder().remaining(), 2);
    }

    #[test]
    fn test_finalized_material_is_frozen() {
        let mut ctx = context(8);
        let mut material = textured_material(&mut ctx);
        material.finalize(&mut ctx).unwrap();
        let view = material.texture(TextureSlot::Albedo).unwrap();
        assert!(matches!(
            material.set_texture(TextureSlot::Normal, view),
            Err(GraphicsError::InvalidState(_))
        ));
    }
}
