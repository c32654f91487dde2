use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use glam::{Mat4, Vec3};
use lumen_core::light::{Light, MAX_LIGHTS};
use lumen_core::mesh::generators;
use lumen_graphics::{
    BackendType, DrawConstants, GpuMesh, GraphicsInstance, InstanceParameters, Material,
    PixelShaderExternalData, ResourceConfig, ResourceContext, VertexShaderExternalData,
};

fn dummy_context(config: ResourceConfig) -> ResourceContext {
    let instance = GraphicsInstance::with_parameters(
        InstanceParameters::new().with_backend(BackendType::Dummy),
    )
    .unwrap();
    ResourceContext::from_device(instance.create_device().unwrap(), config).unwrap()
}

// ---------------------------------------------------------------------------
// Constant ring
// ---------------------------------------------------------------------------

fn bench_ring_small_writes(c: &mut Criterion) {
    let mut ctx = dummy_context(ResourceConfig::default());
    let data = [0u8; 64];
    c.bench_function("constant_ring_write_64_bytes", |b| {
        b.iter(|| {
            black_box(ctx.write_constants(black_box(&data)).unwrap());
        });
    });
}

fn bench_draw_constants(c: &mut Criterion) {
    let mut ctx = dummy_context(ResourceConfig::default());
    let vertex = VertexShaderExternalData::new(
        Mat4::from_rotation_y(0.5),
        Mat4::look_at_lh(Vec3::new(0.0, 2.0, -5.0), Vec3::ZERO, Vec3::Y),
        Mat4::perspective_lh(1.0, 16.0 / 9.0, 0.1, 100.0),
    );
    let lights = vec![Light::default(); MAX_LIGHTS];
    let pixel = PixelShaderExternalData::new(&Material::default(), Vec3::ZERO, &lights);

    c.bench_function("draw_constants_write", |b| {
        b.iter(|| {
            black_box(DrawConstants::write(&mut ctx, &vertex, &pixel).unwrap());
        });
    });
}

// ---------------------------------------------------------------------------
// Static uploads
// ---------------------------------------------------------------------------

fn bench_sphere_upload(c: &mut Criterion) {
    let sphere = generators::generate_sphere(1.0, 64, 32);
    let mut ctx = dummy_context(ResourceConfig::default());
    c.bench_function("gpu_mesh_upload_sphere_64x32", |b| {
        b.iter(|| {
            let mesh = GpuMesh::from_cpu(&mut ctx, &sphere).unwrap();
            ctx.submit_and_reset().unwrap();
            black_box(mesh);
        });
    });
}

// ---------------------------------------------------------------------------
// Descriptor tables
// ---------------------------------------------------------------------------

fn bench_material_finalize(c: &mut Criterion) {
    c.bench_function("material_finalize", |b| {
        b.iter_batched(
            || {
                let mut ctx = dummy_context(
                    ResourceConfig::new()
                        .with_max_constant_buffers(4)
                        .with_max_texture_descriptors(4),
                );
                let mut material = Material::default();
                let image =
                    lumen_core::texture::CpuTexture::from_rgba8(1, 1, vec![255; 4]).unwrap();
                for slot in lumen_graphics::TextureSlot::ALL {
                    let view = ctx.load_texture_from_memory(&image).unwrap();
                    material.set_texture(slot, view).unwrap();
                }
                (ctx, material)
            },
            |(mut ctx, mut material)| {
                black_box(material.finalize(&mut ctx).unwrap());
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_ring_small_writes,
    bench_draw_constants,
    bench_sphere_upload,
    bench_material_finalize,
);
criterion_main!(benches);
