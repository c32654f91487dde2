//! Command recording and submission.
//!
//! - [`CommandList`] - records [`Command`]s while open
//! - [`CommandAllocator`] - backing memory for one list's recordings
//! - [`CommandQueue`] - executes closed lists and signals fences
//! - [`CommandSession`] - the list/allocator/queue triple plus a fence,
//!   submitted and reset as one unit
//!
//! Commands are backend-neutral; each backend translates them when the
//! list is executed.

mod list;
mod queue;
mod session;

use std::sync::Arc;

pub use list::{CommandList, TEXTURE_DATA_PITCH_ALIGNMENT, TEXTURE_DATA_PLACEMENT_ALIGNMENT};
pub use queue::{CommandAllocator, CommandQueue};
pub use session::CommandSession;

use crate::resources::{Buffer, Texture};
use crate::types::ResourceState;

/// Placement of texel rows inside a buffer for buffer-to-texture copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureCopyLayout {
    /// Byte offset of the first row in the buffer.
    pub offset: u64,
    /// Distance in bytes between the starts of consecutive rows.
    pub bytes_per_row: u32,
    /// Number of rows.
    pub rows: u32,
}

/// A recorded GPU command.
///
/// Commands hold strong references to the resources they touch until the
/// list that recorded them is executed.
#[derive(Debug, Clone)]
pub enum Command {
    /// Copy a byte range between buffers.
    CopyBuffer {
        src: Arc<Buffer>,
        src_offset: u64,
        dst: Arc<Buffer>,
        dst_offset: u64,
        size: u64,
    },
    /// Copy rows of texels from a buffer into a whole texture.
    CopyBufferToTexture {
        src: Arc<Buffer>,
        layout: TextureCopyLayout,
        dst: Arc<Texture>,
    },
    /// Move a buffer between usage states.
    BufferTransition {
        buffer: Arc<Buffer>,
        before: ResourceState,
        after: ResourceState,
    },
    /// Move a texture between usage states.
    TextureTransition {
        texture: Arc<Texture>,
        before: ResourceState,
        after: ResourceState,
    },
}

impl Command {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CopyBuffer { .. } => "copy_buffer",
            Self::CopyBufferToTexture { .. } => "copy_buffer_to_texture",
            Self::BufferTransition { .. } => "buffer_transition",
            Self::TextureTransition { .. } => "texture_transition",
        }
    }

    /// Put a transitioned resource back into the state it had before the
    /// transition was recorded.
    pub(crate) fn revert_state(&self) {
        match self {
            Self::BufferTransition { buffer, before, .. } => buffer.set_state(*before),
            Self::TextureTransition { texture, before, .. } => texture.set_state(*before),
            Self::CopyBuffer { .. } | Self::CopyBufferToTexture { .. } => {}
        }
    }
}
