//! Synchronous command submission.

use std::sync::Arc;

use crate::command::{CommandAllocator, CommandList, CommandQueue};
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::Buffer;
use crate::sync::Fence;

/// A command list, its allocator and queue, and a fence, used as one unit.
///
/// Recording happens through [`list_mut`](Self::list_mut).
/// [`submit_and_reset`](Self::submit_and_reset) closes the list, executes it,
/// blocks until the GPU has finished and reopens the list. There is never
/// more than one submission in flight.
///
/// Transient buffers that recorded commands read from (upload scratch
/// buffers) are handed to [`retain`](Self::retain). They are released only
/// after the submission that used them has been observed complete.
pub struct CommandSession {
    device: Arc<GraphicsDevice>,
    queue: Arc<CommandQueue>,
    list: CommandList,
    allocator: CommandAllocator,
    fence: Fence,
    disposals: Vec<Arc<Buffer>>,
}

impl CommandSession {
    /// Take ownership of a list and allocator and create the session fence.
    ///
    /// A closed list is reopened.
    ///
    /// # Errors
    ///
    /// Fails with `InitializationFailed` if the fence cannot be created.
    pub fn new(
        device: Arc<GraphicsDevice>,
        queue: Arc<CommandQueue>,
        mut list: CommandList,
        allocator: CommandAllocator,
    ) -> Result<Self, GraphicsError> {
        let fence = device.create_fence()?;
        if !list.is_open() {
            list.reset()?;
        }
        Ok(Self {
            device,
            queue,
            list,
            allocator,
            fence,
            disposals: Vec::new(),
        })
    }

    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    pub fn list(&self) -> &CommandList {
        &self.list
    }

    /// The open list to record into.
    pub fn list_mut(&mut self) -> &mut CommandList {
        &mut self.list
    }

    /// Keep `buffer` alive until the next submission has completed.
    pub fn retain(&mut self, buffer: Arc<Buffer>) {
        self.disposals.push(buffer);
    }

    /// Number of buffers waiting for the next submission to complete.
    pub fn pending_disposals(&self) -> usize {
        self.disposals.len()
    }

    /// Close, execute, wait for the GPU, then reset allocator and list.
    ///
    /// Returns the fence value that was waited for.
    pub fn submit_and_reset(&mut self) -> Result<u64, GraphicsError> {
        lumen_core::profile_function!();

        if self.list.is_open() {
            self.list.close()?;
        }
        let command_count = self.list.len();
        self.queue.execute(&self.allocator, &mut self.list)?;
        let value = self.queue.signal(&self.fence)?;
        self.fence.wait(value)?;

        self.allocator.reset()?;
        self.list.reset()?;

        let released = self.disposals.len();
        self.disposals.clear();

        log::debug!(
            "CommandSession: submission {value} finished ({command_count} command(s), {released} scratch buffer(s) released)"
        );
        Ok(value)
    }

    /// Block until everything submitted so far has finished.
    pub fn wait_for_gpu(&self) -> Result<(), GraphicsError> {
        self.fence.wait_for_completion()
    }
}

impl std::fmt::Debug for CommandSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSession")
            .field("list", &self.list)
            .field("fence", &self.fence)
            .field("pending_disposals", &self.disposals.len())
            .finish()
    }
}
