//! Command list recording with resource-state validation.

use std::sync::Arc;

use crate::command::{Command, TextureCopyLayout};
use crate::error::GraphicsError;
use crate::resources::{Buffer, Texture};
use crate::types::ResourceState;

/// Required alignment of `bytes_per_row` in buffer-to-texture copies.
pub const TEXTURE_DATA_PITCH_ALIGNMENT: u32 = 256;

/// Required alignment of the first row's offset in buffer-to-texture copies.
pub const TEXTURE_DATA_PLACEMENT_ALIGNMENT: u64 = 512;

/// A list of recorded GPU commands.
///
/// A list is created open. Recording is only allowed while it is open;
/// [`close`](Self::close) ends recording and the queue then executes it.
/// After the GPU has finished, [`reset`](Self::reset) reopens it.
///
/// Every recording call validates its arguments against the resources'
/// tracked states, so a bad transition is reported at the call that
/// recorded it rather than at submission.
pub struct CommandList {
    label: Option<String>,
    open: bool,
    commands: Vec<Command>,
}

impl CommandList {
    pub(crate) fn new(label: Option<String>) -> Self {
        Self {
            label,
            open: true,
            commands: Vec::new(),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Number of commands recorded since the last reset.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Recorded commands, in order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Finish recording.
    pub fn close(&mut self) -> Result<(), GraphicsError> {
        self.ensure_open("close")?;
        self.open = false;
        Ok(())
    }

    /// Reopen a closed list, discarding anything it still holds.
    pub fn reset(&mut self) -> Result<(), GraphicsError> {
        if self.open {
            return Err(GraphicsError::InvalidState(format!(
                "command list {:?} reset while still open",
                self.label
            )));
        }
        self.commands.clear();
        self.open = true;
        Ok(())
    }

    pub(crate) fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Record a copy of `size` bytes from `src` to `dst`.
    pub fn copy_buffer(
        &mut self,
        src: &Arc<Buffer>,
        src_offset: u64,
        dst: &Arc<Buffer>,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        self.ensure_open("copy_buffer")?;

        if size == 0 {
            return Err(GraphicsError::InvalidParameter(
                "copy size cannot be zero".to_string(),
            ));
        }
        if Arc::ptr_eq(src, dst) {
            return Err(GraphicsError::InvalidParameter(
                "copy source and destination are the same buffer".to_string(),
            ));
        }
        check_range("source", src, src_offset, size)?;
        check_range("destination", dst, dst_offset, size)?;
        check_copy_source(src.state(), src.label())?;
        check_copy_dest(dst.state(), dst.label())?;

        self.commands.push(Command::CopyBuffer {
            src: Arc::clone(src),
            src_offset,
            dst: Arc::clone(dst),
            dst_offset,
            size,
        });
        Ok(())
    }

    /// Record a copy of texel rows from `src` into the whole of `dst`.
    pub fn copy_buffer_to_texture(
        &mut self,
        src: &Arc<Buffer>,
        layout: TextureCopyLayout,
        dst: &Arc<Texture>,
    ) -> Result<(), GraphicsError> {
        self.ensure_open("copy_buffer_to_texture")?;

        let row_size = dst.descriptor().unpadded_bytes_per_row();
        if layout.bytes_per_row % TEXTURE_DATA_PITCH_ALIGNMENT != 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "bytes_per_row {} is not a multiple of {TEXTURE_DATA_PITCH_ALIGNMENT}",
                layout.bytes_per_row
            )));
        }
        if layout.offset % TEXTURE_DATA_PLACEMENT_ALIGNMENT != 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture data offset {} is not a multiple of {TEXTURE_DATA_PLACEMENT_ALIGNMENT}",
                layout.offset
            )));
        }
        if layout.bytes_per_row < row_size {
            return Err(GraphicsError::InvalidParameter(format!(
                "bytes_per_row {} is smaller than a texture row ({row_size})",
                layout.bytes_per_row
            )));
        }
        if layout.rows != dst.height() {
            return Err(GraphicsError::InvalidParameter(format!(
                "copy covers {} rows, texture has {}",
                layout.rows,
                dst.height()
            )));
        }
        let span = layout.bytes_per_row as u64 * (layout.rows as u64 - 1) + row_size as u64;
        check_range("source", src, layout.offset, span)?;
        check_copy_source(src.state(), src.label())?;
        check_copy_dest(dst.state(), dst.label())?;

        self.commands.push(Command::CopyBufferToTexture {
            src: Arc::clone(src),
            layout,
            dst: Arc::clone(dst),
        });
        Ok(())
    }

    /// Record a state transition of a buffer.
    pub fn transition_buffer(
        &mut self,
        buffer: &Arc<Buffer>,
        before: ResourceState,
        after: ResourceState,
    ) -> Result<(), GraphicsError> {
        self.ensure_open("transition_buffer")?;
        check_transition(buffer.state(), before, after, buffer.label())?;

        buffer.set_state(after);
        self.commands.push(Command::BufferTransition {
            buffer: Arc::clone(buffer),
            before,
            after,
        });
        Ok(())
    }

    /// Record a state transition of a texture.
    pub fn transition_texture(
        &mut self,
        texture: &Arc<Texture>,
        before: ResourceState,
        after: ResourceState,
    ) -> Result<(), GraphicsError> {
        self.ensure_open("transition_texture")?;
        check_transition(texture.state(), before, after, texture.label())?;

        texture.set_state(after);
        self.commands.push(Command::TextureTransition {
            texture: Arc::clone(texture),
            before,
            after,
        });
        Ok(())
    }

    fn ensure_open(&self, operation: &str) -> Result<(), GraphicsError> {
        if self.open {
            Ok(())
        } else {
            Err(GraphicsError::InvalidState(format!(
                "{operation} on closed command list {:?}",
                self.label
            )))
        }
    }
}

impl std::fmt::Debug for CommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandList")
            .field("label", &self.label)
            .field("open", &self.open)
            .field("commands", &self.commands.len())
            .finish()
    }
}

fn check_range(role: &str, buffer: &Buffer, offset: u64, size: u64) -> Result<(), GraphicsError> {
    match offset.checked_add(size) {
        Some(end) if end <= buffer.size() => Ok(()),
        _ => Err(GraphicsError::InvalidParameter(format!(
            "copy {role} range {offset}+{size} exceeds buffer {:?} of {} bytes",
            buffer.label(),
            buffer.size()
        ))),
    }
}

fn check_copy_source(state: ResourceState, label: Option<&str>) -> Result<(), GraphicsError> {
    if state.allows_copy_source() {
        Ok(())
    } else {
        Err(GraphicsError::InvalidState(format!(
            "copy source {label:?} is in state {state:?}"
        )))
    }
}

fn check_copy_dest(state: ResourceState, label: Option<&str>) -> Result<(), GraphicsError> {
    if state.allows_copy_dest() {
        Ok(())
    } else {
        Err(GraphicsError::InvalidState(format!(
            "copy destination {label:?} is in state {state:?}"
        )))
    }
}

fn check_transition(
    current: ResourceState,
    before: ResourceState,
    after: ResourceState,
    label: Option<&str>,
) -> Result<(), GraphicsError> {
    if before == after {
        return Err(GraphicsError::InvalidParameter(format!(
            "transition of {label:?} from {before:?} to itself"
        )));
    }
    if current != before {
        return Err(GraphicsError::InvalidState(format!(
            "transition of {label:?} expects {before:?} but resource is in {current:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use super::*;
    use crate::backend::GpuBuffer;
    use crate::backend::dummy::DummyBuffer;
    use crate::types::{BufferDescriptor, BufferUsage};

    fn buffer(size: u64, state: ResourceState) -> Arc<Buffer> {
        let desc = BufferDescriptor::new(size, BufferUsage::COPY_SRC | BufferUsage::COPY_DST);
        let gpu = GpuBuffer::Dummy(DummyBuffer::new(size, desc.location));
        Arc::new(Buffer::new(Weak::new(), desc, gpu, state))
    }

    #[test]
    fn test_record_and_close() {
        let src = buffer(64, ResourceState::GenericRead);
        let dst = buffer(64, ResourceState::CopyDest);
        let mut list = CommandList::new(Some("test".into()));

        list.copy_buffer(&src, 0, &dst, 0, 64).unwrap();
        list.transition_buffer(&dst, ResourceState::CopyDest, ResourceState::GenericRead)
            .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(dst.state(), ResourceState::GenericRead);

        list.close().unwrap();
        let err = list.copy_buffer(&src, 0, &dst, 0, 4).unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidState(_)));
        assert!(list.close().is_err());
    }

    #[test]
    fn test_reset_requires_closed() {
        let mut list = CommandList::new(None);
        assert!(matches!(list.reset(), Err(GraphicsError::InvalidState(_))));
        list.close().unwrap();
        list.reset().unwrap();
        assert!(list.is_open());
        assert!(list.is_empty());
    }

    #[test]
    fn test_transition_state_mismatch() {
        let buf = buffer(16, ResourceState::CopyDest);
        let mut list = CommandList::new(None);
        let err = list
            .transition_buffer(&buf, ResourceState::Common, ResourceState::GenericRead)
            .unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidState(_)));
        assert_eq!(buf.state(), ResourceState::CopyDest);
        assert!(list.is_empty());
    }

    #[test]
    fn test_copy_validation() {
        let src = buffer(32, ResourceState::GenericRead);
        let dst = buffer(16, ResourceState::CopyDest);
        let read_only = buffer(32, ResourceState::GenericRead);
        let mut list = CommandList::new(None);

        assert!(matches!(
            list.copy_buffer(&src, 0, &dst, 0, 32),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert!(matches!(
            list.copy_buffer(&src, 0, &read_only, 0, 8),
            Err(GraphicsError::InvalidState(_))
        ));
        assert!(matches!(
            list.copy_buffer(&dst, 0, &src, 0, 8),
            Err(GraphicsError::InvalidState(_))
        ));
        assert!(matches!(
            list.copy_buffer(&src, 0, &src, 0, 8),
            Err(GraphicsError::InvalidParameter(_))
        ));
        assert!(list.is_empty());
    }
}
