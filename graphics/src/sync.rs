//! CPU-GPU synchronization.
//!
//! A [`Fence`] is a 64-bit counter the GPU advances. The queue enqueues a
//! signal of the next value after submitted work
//! ([`CommandQueue::signal`](crate::CommandQueue::signal)); the CPU blocks
//! until the counter reaches a value with [`Fence::wait`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::backend::GpuFence;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The GPU has not reached the last signaled value yet.
    Unsignaled,
    /// The GPU has caught up with every signal enqueued so far.
    Signaled,
}

/// CPU-GPU synchronization primitive with a monotonically increasing value.
///
/// The value only grows. "The GPU caught up" means the completed value is
/// at least the last signaled value.
///
/// # Example
///
/// ```ignore
/// let fence = device.create_fence()?;
/// queue.execute(&allocator, &mut list)?;
/// let value = queue.signal(&fence)?;
/// fence.wait(value)?;
/// assert_eq!(fence.status()?, FenceStatus::Signaled);
/// ```
pub struct Fence {
    device: Arc<GraphicsDevice>,
    gpu: GpuFence,
    last_signaled: AtomicU64,
}

impl Fence {
    pub(crate) fn new(device: Arc<GraphicsDevice>, gpu: GpuFence) -> Self {
        Self {
            device,
            gpu,
            last_signaled: AtomicU64::new(0),
        }
    }

    /// Highest value a signal has been enqueued for.
    pub fn last_signaled_value(&self) -> u64 {
        self.last_signaled.load(Ordering::Acquire)
    }

    /// Highest value the GPU has reached.
    pub fn completed_value(&self) -> Result<u64, GraphicsError> {
        self.device.backend().fence_completed_value(&self.gpu)
    }

    /// Check whether the GPU has caught up (non-blocking).
    pub fn status(&self) -> Result<FenceStatus, GraphicsError> {
        Ok(if self.completed_value()? >= self.last_signaled_value() {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        })
    }

    /// Block until the GPU reaches `value`.
    ///
    /// Returns immediately if the value was already reached.
    ///
    /// # Errors
    ///
    /// `InvalidState` if no signal for `value` has been enqueued, since such
    /// a wait could never finish.
    pub fn wait(&self, value: u64) -> Result<(), GraphicsError> {
        self.check_signaled(value)?;
        if self.completed_value()? >= value {
            return Ok(());
        }
        lumen_core::profile_scope!("fence_wait");
        let reached = self.device.backend().wait_fence(&self.gpu, value, None)?;
        self.confirm_reached(value, reached)
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns `true` if the value was reached.
    pub fn wait_timeout(&self, value: u64, timeout: Duration) -> Result<bool, GraphicsError> {
        self.check_signaled(value)?;
        if self.completed_value()? >= value {
            return Ok(true);
        }
        self.device
            .backend()
            .wait_fence(&self.gpu, value, Some(timeout))
    }

    /// Block until the GPU reaches the last signaled value.
    ///
    /// Idempotent: calling it again once the GPU has finished returns at once.
    pub fn wait_for_completion(&self) -> Result<(), GraphicsError> {
        self.wait(self.last_signaled_value())
    }

    pub(crate) fn gpu_handle(&self) -> &GpuFence {
        &self.gpu
    }

    pub(crate) fn mark_signaled(&self, value: u64) {
        self.last_signaled.fetch_max(value, Ordering::AcqRel);
    }

    /// A backend may end an untimed wait without reaching `value`; only the
    /// completed counter decides whether the caller may proceed.
    fn confirm_reached(&self, value: u64, reached: bool) -> Result<(), GraphicsError> {
        if reached {
            return Ok(());
        }
        let completed = self.completed_value()?;
        if completed >= value {
            return Ok(());
        }
        log::error!("Fence: wait for value {value} returned at completed value {completed}");
        Err(GraphicsError::Internal(format!(
            "fence wait returned before value {value} was reached (completed {completed})"
        )))
    }

    fn check_signaled(&self, value: u64) -> Result<(), GraphicsError> {
        let last = self.last_signaled_value();
        if value > last {
            return Err(GraphicsError::InvalidState(format!(
                "wait for fence value {value}, last signaled value is {last}"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fence")
            .field("last_signaled", &self.last_signaled_value())
            .field("gpu", &self.gpu)
            .finish()
    }
}

static_assertions::assert_impl_all!(Fence: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{BackendType, GraphicsInstance, InstanceParameters};

    fn device() -> Arc<GraphicsDevice> {
        GraphicsInstance::with_parameters(InstanceParameters::new().with_backend(BackendType::Dummy))
            .unwrap()
            .create_device()
            .unwrap()
    }

    #[test]
    fn test_new_fence_is_signaled() {
        let fence = device().create_fence().unwrap();
        assert_eq!(fence.last_signaled_value(), 0);
        assert_eq!(fence.completed_value().unwrap(), 0);
        assert_eq!(fence.status().unwrap(), FenceStatus::Signaled);
        fence.wait_for_completion().unwrap();
    }

    #[test]
    fn test_signal_and_wait_is_idempotent() {
        let device = device();
        let queue = device.create_command_queue().unwrap();
        let fence = device.create_fence().unwrap();

        let first = queue.signal(&fence).unwrap();
        let second = queue.signal(&fence).unwrap();
        assert_eq!((first, second), (1, 2));

        fence.wait_for_completion().unwrap();
        fence.wait_for_completion().unwrap();
        assert_eq!(fence.completed_value().unwrap(), 2);
        assert!(fence.wait_timeout(1, Duration::from_millis(1)).unwrap());
    }

    #[test]
    fn test_wait_for_unsignaled_value_is_rejected() {
        let fence = device().create_fence().unwrap();
        assert!(matches!(fence.wait(1), Err(GraphicsError::InvalidState(_))));
        assert!(fence.wait_timeout(5, Duration::ZERO).is_err());
    }

    #[test]
    fn test_wait_that_returns_early_is_an_error() {
        let device = device();
        let queue = device.create_command_queue().unwrap();

        let pending = device.create_fence().unwrap();
        pending.mark_signaled(1);
        assert!(matches!(
            pending.confirm_reached(1, false),
            Err(GraphicsError::Internal(_))
        ));

        let done = device.create_fence().unwrap();
        let value = queue.signal(&done).unwrap();
        done.confirm_reached(value, false).unwrap();
        done.wait(value).unwrap();
    }
}
