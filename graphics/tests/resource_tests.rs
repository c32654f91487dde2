//! Resource integration tests for the graphics crate.
//!
//! These tests drive [`ResourceContext`] end to end: static uploads, the
//! constant ring, descriptor tables, texture loading and material tables.
//! Tests are parameterized using `rstest` to run against multiple backends;
//! a backend without an adapter on this machine skips its case.
//!
//! ```bash
//! cargo test --test resource_tests
//! ```

mod common;

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use rstest::rstest;

use common::{Backend, TestContext, generate_test_pattern, solid_texture};
use lumen_core::light::Light;
use lumen_core::mesh::generators;
use lumen_graphics::descriptors::ViewTarget;
use lumen_graphics::{
    BufferUsage, Descriptor, DrawConstants, GeometryInput, GpuMesh, GraphicsError,
    InstanceColorTable, Material, OverflowPolicy, PixelShaderExternalData, ResourceConfig,
    ResourceState, StaticBufferDescriptor, TextureSlot, VertexShaderExternalData,
};

// ============================================================================
// Static Uploads
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
#[case::webgpu(Backend::WebGpu)]
fn test_static_buffer_round_trip(#[case] backend: Backend) {
    let Some(tc) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut ctx = tc.resource_context(ResourceConfig::default());

    let data = generate_test_pattern(4 * 300);
    let buffer = ctx
        .create_static_buffer(
            &StaticBufferDescriptor::new(4, 300, BufferUsage::STORAGE).with_label("pattern"),
            &data,
        )
        .unwrap();
    assert_eq!(ctx.session().pending_disposals(), 1);

    ctx.submit_and_reset().unwrap();
    assert_eq!(ctx.session().pending_disposals(), 0);
    assert_eq!(buffer.state(), ResourceState::GenericRead);
    assert_eq!(ctx.read_buffer(&buffer).unwrap(), data);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
#[case::webgpu(Backend::WebGpu)]
fn test_mesh_upload(#[case] backend: Backend) {
    let Some(tc) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut ctx = tc.small_context(4, 4);

    let sphere = generators::generate_sphere(1.0, 16, 8).with_label("sphere");
    let mesh = GpuMesh::from_cpu(&mut ctx, &sphere).unwrap();
    ctx.submit_and_reset().unwrap();

    assert_eq!(mesh.index_count(), sphere.index_count());
    assert_eq!(ctx.read_buffer(mesh.vertex_buffer()).unwrap(), sphere.vertex_bytes());

    let input = GeometryInput::from_mesh(&mesh);
    assert_eq!(input.vertices.size, sphere.vertex_bytes().len() as u64);
    assert_eq!(input.indices.size, sphere.index_bytes().len() as u64);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
#[case::webgpu(Backend::WebGpu)]
fn test_instance_colors(#[case] backend: Backend) {
    let Some(tc) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut ctx = tc.small_context(4, 4);

    let colors: Vec<Vec4> = (0..8).map(|i| Vec4::splat(i as f32 / 8.0)).collect();
    let table = InstanceColorTable::new(&mut ctx, &colors).unwrap();
    ctx.submit_and_reset().unwrap();

    assert_eq!(table.len(), 8);
    let bytes = ctx.read_buffer(table.buffer()).unwrap();
    let last = f32::from_ne_bytes(bytes[7 * 16..7 * 16 + 4].try_into().unwrap());
    assert_eq!(last, 7.0 / 8.0);
}

// ============================================================================
// Constant Ring
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
#[case::webgpu(Backend::WebGpu)]
fn test_constant_offsets_are_aligned(#[case] backend: Backend) {
    let Some(tc) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut ctx = tc.small_context(10, 4);

    let heap = Arc::clone(ctx.shader_visible_heap());
    let sizes = [100usize, 300, 64];
    let mut offsets = Vec::new();
    for (i, size) in sizes.into_iter().enumerate() {
        let handle = ctx.write_constants(&vec![i as u8; size]).unwrap();
        assert_eq!(heap.index_of_gpu(handle), Some(i as u32));
        let Some(Descriptor::ConstantBufferView { offset, size, .. }) = heap.get_gpu(handle) else {
            panic!("expected a constant buffer view");
        };
        assert_eq!(size % 256, 0);
        offsets.push(offset);
    }
    assert_eq!(offsets, vec![0, 256, 768]);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
#[case::webgpu(Backend::WebGpu)]
fn test_constant_ring_wraps_across_frames(#[case] backend: Backend) {
    let Some(tc) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut ctx = tc.resource_context(
        ResourceConfig::new()
            .with_max_constant_buffers(8)
            .with_max_texture_descriptors(4)
            .with_ring_overflow(OverflowPolicy::Error),
    );

    let vertex = VertexShaderExternalData::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY);

    for frame in 0..3 {
        for _ in 0..4 {
            ctx.write_constants_typed(&vertex).unwrap();
        }
        assert_eq!(ctx.constant_ring().write_offset(), 1024 * ((frame % 2) + 1));
        ctx.submit_and_reset().unwrap();
    }
    assert_eq!(ctx.constant_ring().wrap_count(), 1);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
#[case::webgpu(Backend::WebGpu)]
fn test_draw_constants(#[case] backend: Backend) {
    let Some(tc) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut ctx = tc.resource_context(ResourceConfig::default());

    let vertex = VertexShaderExternalData::new(
        Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)),
        Mat4::look_at_lh(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO, Vec3::Y),
        Mat4::perspective_lh(1.0, 16.0 / 9.0, 0.1, 100.0),
    );
    let pixel = PixelShaderExternalData::new(
        &Material::default(),
        Vec3::new(0.0, 0.0, -5.0),
        &[Light::default()],
    );

    let draw = DrawConstants::write(&mut ctx, &vertex, &pixel).unwrap();
    let heap = ctx.shader_visible_heap();
    let Some(Descriptor::ConstantBufferView { offset, size, .. }) = heap.get_gpu(draw.pixel) else {
        panic!("expected a constant buffer view");
    };
    assert_eq!((offset, size), (256, 2304));
    assert_eq!(heap.index_of_gpu(draw.vertex), Some(0));
    assert_eq!(heap.index_of_gpu(draw.pixel), Some(1));

    ctx.submit_and_reset().unwrap();
}

// ============================================================================
// Descriptor Tables
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
#[case::webgpu(Backend::WebGpu)]
fn test_texture_table_is_contiguous(#[case] backend: Backend) {
    let Some(tc) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut ctx = tc.small_context(16, 8);

    let views: Vec<_> = (0..4u8)
        .map(|i| {
            ctx.load_texture_from_memory(&solid_texture(4, 4, [i * 60, 0, 0, 255]))
                .unwrap()
        })
        .collect();
    ctx.submit_and_reset().unwrap();

    let table = ctx.append_views_and_get_table_handle(&views).unwrap();
    let heap = ctx.shader_visible_heap();
    let base = heap.index_of_gpu(table).unwrap();
    assert_eq!(base, 16);

    for (i, view) in views.iter().enumerate() {
        let texture = ctx.texture_loader().texture_for(*view).unwrap();
        let Some(Descriptor::ShaderResourceView(ViewTarget::Texture(weak))) =
            heap.get(base + i as u32)
        else {
            panic!("slot {} is not a texture view", base + i as u32);
        };
        assert!(Arc::ptr_eq(&weak.upgrade().unwrap(), texture));
        assert_eq!(texture.state(), ResourceState::PixelShaderResource);
    }
    assert_eq!(ctx.table_builder().next_free_slot(), 20);
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
#[case::webgpu(Backend::WebGpu)]
fn test_texture_capacity(#[case] backend: Backend) {
    let Some(tc) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut ctx = tc.small_context(4, 4);

    for _ in 0..4 {
        ctx.load_texture_from_memory(&solid_texture(2, 2, [255; 4]))
            .unwrap();
    }
    let fifth = ctx.load_texture_from_memory(&solid_texture(2, 2, [255; 4]));
    assert!(matches!(
        fifth,
        Err(GraphicsError::CapacityExceeded {
            capacity: 4,
            requested: 5,
            ..
        })
    ));
    ctx.submit_and_reset().unwrap();
}

// ============================================================================
// Materials
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
#[case::webgpu(Backend::WebGpu)]
fn test_material_finalize(#[case] backend: Backend) {
    let Some(tc) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut ctx = tc.small_context(4, 8);

    let mut material = Material::new(Vec3::new(0.8, 0.8, 0.8)).with_label("metal");
    for slot in TextureSlot::ALL {
        let view = ctx
            .load_texture_from_memory(&solid_texture(8, 8, [slot as u8 * 40, 0, 0, 255]))
            .unwrap();
        material.set_texture(slot, view).unwrap();
    }
    ctx.submit_and_reset().unwrap();

    let table = material.finalize(&mut ctx).unwrap();
    assert_eq!(ctx.table_builder().slot_of(table), Some(4));
    assert_eq!(material.finalize(&mut ctx).unwrap(), table);
    assert_eq!(ctx.table_builder().next_free_slot(), 8);
}

// ============================================================================
// Synchronization
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
#[case::webgpu(Backend::WebGpu)]
fn test_submissions_advance_fence(#[case] backend: Backend) {
    let Some(tc) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let mut ctx = tc.small_context(4, 4);

    let first = ctx.submit_and_reset().unwrap();
    let second = ctx.submit_and_reset().unwrap();
    assert_eq!(second, first + 1);

    let fence = ctx.session().fence();
    assert_eq!(fence.last_signaled_value(), second);
    assert!(fence.completed_value().unwrap() >= second);
    ctx.wait_for_gpu().unwrap();
}
