//! Common utilities for resource integration tests.
//!
//! This module provides shared test infrastructure that can be reused
//! across different backend implementations.

use std::sync::Arc;

use lumen_core::texture::CpuTexture;
use lumen_graphics::{
    BackendType, GraphicsDevice, GraphicsInstance, InstanceParameters, ResourceConfig,
    ResourceContext, WgpuBackendType,
};

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Available GPU backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy backend (host memory, no GPU).
    Dummy,
    /// Vulkan backend (native via ash).
    Vulkan,
    /// WebGPU backend (via wgpu).
    WebGpu,
}

impl Backend {
    /// Check if this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            // Dummy backend is always available
            Backend::Dummy => true,
            #[cfg(feature = "vulkan-backend")]
            Backend::Vulkan => true,
            #[cfg(not(feature = "vulkan-backend"))]
            Backend::Vulkan => false,
            #[cfg(feature = "wgpu-backend")]
            Backend::WebGpu => true,
            #[cfg(not(feature = "wgpu-backend"))]
            Backend::WebGpu => false,
        }
    }

    /// Convert to InstanceParameters for creating a GraphicsInstance.
    pub fn to_instance_parameters(self) -> InstanceParameters {
        match self {
            Backend::Dummy => InstanceParameters::new().with_backend(BackendType::Dummy),
            Backend::Vulkan => InstanceParameters::new()
                .with_backend(BackendType::Vulkan)
                .with_application_name("lumen-tests"),
            Backend::WebGpu => InstanceParameters::new()
                .with_backend(BackendType::Wgpu)
                .with_wgpu_backend(WgpuBackendType::Auto),
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// Test context owning the instance and device for one backend.
pub struct TestContext {
    #[allow(dead_code)]
    pub backend: Backend,
    #[allow(dead_code)]
    instance: Arc<GraphicsInstance>,
    pub device: Arc<GraphicsDevice>,
}

impl TestContext {
    /// Create a new test context for the given backend.
    ///
    /// Returns `None` if the backend is not compiled in or no adapter is
    /// present on this machine.
    pub fn new(backend: Backend) -> Option<Self> {
        let _ = env_logger::builder().is_test(true).try_init();

        if !backend.is_available() {
            return None;
        }

        let instance = match GraphicsInstance::with_parameters(backend.to_instance_parameters()) {
            Ok(instance) => instance,
            Err(e) => {
                eprintln!("Backend {backend:?} failed to initialize: {e}");
                return None;
            }
        };
        let device = instance.create_device().ok()?;

        Some(Self {
            backend,
            instance,
            device,
        })
    }

    /// Build a resource context on this device.
    pub fn resource_context(&self, config: ResourceConfig) -> ResourceContext {
        ResourceContext::from_device(Arc::clone(&self.device), config)
            .expect("Failed to create resource context")
    }

    /// Context with small limits so capacity edges are quick to reach.
    pub fn small_context(&self, constant_buffers: u32, texture_descriptors: u32) -> ResourceContext {
        self.resource_context(
            ResourceConfig::new()
                .with_max_constant_buffers(constant_buffers)
                .with_max_texture_descriptors(texture_descriptors),
        )
    }
}

// ============================================================================
// Data Helpers
// ============================================================================

/// Generate a deterministic byte pattern.
pub fn generate_test_pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 7 % 251) as u8).collect()
}

/// Solid-color RGBA8 image.
#[allow(dead_code)]
pub fn solid_texture(width: u32, height: u32, rgba: [u8; 4]) -> CpuTexture {
    let pixels = rgba.repeat((width * height) as usize);
    CpuTexture::from_rgba8(width, height, pixels).expect("Failed to build texture")
}
