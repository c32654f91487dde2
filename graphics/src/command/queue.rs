//! Command queue and allocator.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::GpuCommandAllocator;
use crate::command::CommandList;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::sync::Fence;

/// Memory backing the recordings of a command list.
///
/// An allocator may only be reset once the GPU has finished everything
/// executed from it.
pub struct CommandAllocator {
    device: Arc<GraphicsDevice>,
    gpu: GpuCommandAllocator,
}

impl CommandAllocator {
    pub(crate) fn new(device: Arc<GraphicsDevice>, gpu: GpuCommandAllocator) -> Self {
        Self { device, gpu }
    }

    /// Recycle the allocator's memory.
    pub fn reset(&self) -> Result<(), GraphicsError> {
        self.device.backend().reset_command_allocator(&self.gpu)
    }

    pub(crate) fn gpu_handle(&self) -> &GpuCommandAllocator {
        &self.gpu
    }
}

impl std::fmt::Debug for CommandAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandAllocator")
            .field("gpu", &self.gpu)
            .finish()
    }
}

/// The queue closed command lists are executed on.
///
/// Execution and fence signals are ordered: a signal enqueued after
/// [`execute`](Self::execute) completes only once the executed work has.
pub struct CommandQueue {
    device: Arc<GraphicsDevice>,
    submissions: AtomicU64,
}

impl CommandQueue {
    pub(crate) fn new(device: Arc<GraphicsDevice>) -> Self {
        Self {
            device,
            submissions: AtomicU64::new(0),
        }
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Number of command lists executed so far.
    pub fn submission_count(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }

    /// Submit a closed command list.
    ///
    /// The list's commands are handed to the backend and dropped afterwards,
    /// releasing the references they held. The list stays closed until reset.
    pub fn execute(
        &self,
        allocator: &CommandAllocator,
        list: &mut CommandList,
    ) -> Result<(), GraphicsError> {
        if list.is_open() {
            return Err(GraphicsError::InvalidState(format!(
                "command list {:?} must be closed before execution",
                list.label()
            )));
        }

        lumen_core::profile_scope!("execute_command_list");
        let commands = list.take_commands();
        if let Err(err) = self
            .device
            .backend()
            .execute_commands(allocator.gpu_handle(), &commands)
        {
            // Recording already applied the transitions; the GPU never saw them.
            for command in commands.iter().rev() {
                command.revert_state();
            }
            log::error!(
                "CommandQueue: executing {:?} failed, tracked states reverted: {err}",
                list.label()
            );
            return Err(err);
        }
        self.submissions.fetch_add(1, Ordering::Relaxed);

        log::trace!(
            "CommandQueue: executed {:?} with {} command(s)",
            list.label(),
            commands.len()
        );
        Ok(())
    }

    /// Enqueue a signal of the fence's next value and return that value.
    pub fn signal(&self, fence: &Fence) -> Result<u64, GraphicsError> {
        let value = fence.last_signaled_value() + 1;
        self.device
            .backend()
            .queue_signal(fence.gpu_handle(), value)?;
        fence.mark_signaled(value);
        Ok(value)
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("submissions", &self.submission_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(CommandQueue: Send, Sync);
static_assertions::assert_impl_all!(CommandAllocator: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{BackendType, GraphicsInstance, InstanceParameters};
    use crate::types::BufferDescriptor;

    fn device() -> Arc<GraphicsDevice> {
        GraphicsInstance::with_parameters(InstanceParameters::new().with_backend(BackendType::Dummy))
            .unwrap()
            .create_device()
            .unwrap()
    }

    #[test]
    fn test_execute_requires_closed_list() {
        let device = device();
        let queue = device.create_command_queue().unwrap();
        let allocator = device.create_command_allocator().unwrap();
        let mut list = device.create_command_list(Some("open"));

        assert!(matches!(
            queue.execute(&allocator, &mut list),
            Err(GraphicsError::InvalidState(_))
        ));
        list.close().unwrap();
        queue.execute(&allocator, &mut list).unwrap();
        assert_eq!(queue.submission_count(), 1);
    }

    #[test]
    fn test_execute_releases_command_references() {
        let device = device();
        let queue = device.create_command_queue().unwrap();
        let allocator = device.create_command_allocator().unwrap();
        let mut list = device.create_command_list(None);

        let src = device.create_buffer(&BufferDescriptor::upload(16)).unwrap();
        let dst = device.create_buffer(&BufferDescriptor::readback(16)).unwrap();
        list.copy_buffer(&src, 0, &dst, 0, 16).unwrap();
        assert_eq!(Arc::strong_count(&src), 2);

        list.close().unwrap();
        queue.execute(&allocator, &mut list).unwrap();
        assert_eq!(Arc::strong_count(&src), 1);
        assert!(list.is_empty());

        allocator.reset().unwrap();
        list.reset().unwrap();
    }
}
