//! Graphics instance.
//!
//! The [`GraphicsInstance`] is the top-level entry point for the graphics system.
//! It selects a GPU backend and creates [`GraphicsDevice`]s on it.

use std::sync::{Arc, RwLock, Weak};

use crate::backend::{self, GpuBackend};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;

/// Which GPU backend to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Try Vulkan, then wgpu, then fall back to the dummy backend.
    #[default]
    Auto,
    /// Software backend without a GPU.
    Dummy,
    /// wgpu (WebGPU API over the platform's native API).
    Wgpu,
    /// Native Vulkan via ash.
    Vulkan,
}

/// Which native API wgpu should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WgpuBackendType {
    /// Let wgpu choose the primary API for the platform.
    #[default]
    Auto,
    Vulkan,
    Metal,
    Dx12,
    Gl,
}

/// Parameters for creating a [`GraphicsInstance`].
///
/// # Example
///
/// ```ignore
/// let params = InstanceParameters::new()
///     .with_backend(BackendType::Vulkan)
///     .with_validation(true);
/// let instance = GraphicsInstance::with_parameters(params)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceParameters {
    pub backend: BackendType,
    pub wgpu_backend: WgpuBackendType,
    /// Enable API validation layers when the backend has them.
    pub validation: bool,
    /// Application name reported to the driver.
    pub application_name: Option<String>,
}

impl InstanceParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_wgpu_backend(mut self, wgpu_backend: WgpuBackendType) -> Self {
        self.wgpu_backend = wgpu_backend;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }
}

/// The graphics instance owns the GPU backend and the devices created on it.
///
/// # Thread Safety
///
/// `GraphicsInstance` is `Send + Sync` and can be safely shared across threads.
///
/// # Example
///
/// ```ignore
/// let instance = GraphicsInstance::new()?;
/// let device = instance.create_device()?;
/// ```
pub struct GraphicsInstance {
    self_ref: Weak<GraphicsInstance>,
    parameters: InstanceParameters,
    backend: Arc<dyn GpuBackend>,
    devices: RwLock<Vec<Weak<GraphicsDevice>>>,
}

impl GraphicsInstance {
    /// Create an instance on the best available backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the graphics system cannot be initialized.
    pub fn new() -> Result<Arc<Self>, GraphicsError> {
        Self::with_parameters(InstanceParameters::default())
    }

    /// Create an instance with explicit parameters.
    pub fn with_parameters(parameters: InstanceParameters) -> Result<Arc<Self>, GraphicsError> {
        log::info!("Creating GraphicsInstance with {:?}", parameters.backend);

        let backend = backend::create_backend(&parameters)?;
        log::info!(
            "Using GPU backend: {} on {}",
            backend.name(),
            backend.adapter_name()
        );

        Ok(Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            parameters,
            backend,
            devices: RwLock::new(Vec::new()),
        }))
    }

    pub(crate) fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// Parameters the instance was created with.
    pub fn parameters(&self) -> &InstanceParameters {
        &self.parameters
    }

    /// Name of the selected backend (`"Dummy"`, `"wgpu"`, `"Vulkan (ash)"`).
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Create a graphics device on the instance's adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance is being dropped.
    pub fn create_device(&self) -> Result<Arc<GraphicsDevice>, GraphicsError> {
        let instance = self.self_ref.upgrade().ok_or_else(|| {
            GraphicsError::ResourceCreationFailed("instance has been dropped".to_string())
        })?;

        let name = self.backend.adapter_name();
        log::info!("Creating device on adapter: {name}");

        let device = GraphicsDevice::new(instance, name, self.backend.capabilities());

        if let Ok(mut devices) = self.devices.write() {
            devices.retain(|d| d.strong_count() > 0);
            devices.push(Arc::downgrade(&device));
        }

        Ok(device)
    }

    /// Live devices created by this instance.
    pub fn devices(&self) -> Vec<Arc<GraphicsDevice>> {
        self.devices
            .read()
            .map(|d| d.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    /// Number of live devices created by this instance.
    pub fn device_count(&self) -> usize {
        self.devices
            .read()
            .map(|d| d.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for GraphicsInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsInstance")
            .field("backend", &self.backend.name())
            .field("device_count", &self.device_count())
            .finish()
    }
}

// Ensure GraphicsInstance is Send + Sync
static_assertions::assert_impl_all!(GraphicsInstance: Send, Sync);
