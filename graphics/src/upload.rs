//! One-shot uploads of immutable data into GPU-only memory.
//!
//! Data is copied into a transient upload-heap scratch buffer, and a GPU copy
//! into the destination is recorded on the session's command list. The
//! scratch buffer is handed to the session's disposal list, so it lives until
//! the submission that reads it has completed. The destination is returned at
//! once but its contents are only valid after the next
//! [`CommandSession::submit_and_reset`].

use std::sync::Arc;

use crate::command::{CommandSession, TEXTURE_DATA_PITCH_ALIGNMENT, TextureCopyLayout};
use crate::error::GraphicsError;
use crate::resources::{Buffer, Texture};
use crate::types::{BufferDescriptor, BufferUsage, ResourceState};

/// Shape and purpose of a static buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StaticBufferDescriptor {
    pub label: Option<String>,
    /// Size of one element in bytes.
    pub element_stride: u32,
    pub element_count: u32,
    /// How the buffer is read once uploaded.
    pub usage: BufferUsage,
}

impl StaticBufferDescriptor {
    pub fn new(element_stride: u32, element_count: u32, usage: BufferUsage) -> Self {
        Self {
            label: None,
            element_stride,
            element_count,
            usage,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Total size in bytes.
    pub fn size(&self) -> u64 {
        self.element_stride as u64 * self.element_count as u64
    }
}

/// Stage `data` and record its copy into a new GPU-only buffer.
///
/// The returned buffer ends in [`ResourceState::GenericRead`] once the
/// recorded commands have run.
///
/// # Errors
///
/// `InvalidParameter` if the stride or count is zero or `data` is not
/// exactly `stride * count` bytes.
pub fn create_static_buffer(
    session: &mut CommandSession,
    descriptor: &StaticBufferDescriptor,
    data: &[u8],
) -> Result<Arc<Buffer>, GraphicsError> {
    lumen_core::profile_function!();

    if descriptor.element_stride == 0 || descriptor.element_count == 0 {
        return Err(GraphicsError::InvalidParameter(format!(
            "static buffer {:?} needs a non-zero stride and count (got {} x {})",
            descriptor.label, descriptor.element_stride, descriptor.element_count
        )));
    }
    let size = descriptor.size();
    if data.len() as u64 != size {
        return Err(GraphicsError::InvalidParameter(format!(
            "static buffer {:?} expects {size} bytes, got {}",
            descriptor.label,
            data.len()
        )));
    }

    let device = Arc::clone(session.device());
    let label = descriptor.label.as_deref().unwrap_or("static");

    let dst = device.create_buffer(
        &BufferDescriptor::new(size, descriptor.usage | BufferUsage::COPY_DST)
            .with_label(label),
    )?;
    let scratch =
        device.create_buffer(&BufferDescriptor::upload(size).with_label(format!("{label}_upload")))?;
    device.write_buffer(&scratch, 0, data)?;

    let list = session.list_mut();
    list.copy_buffer(&scratch, 0, &dst, 0, size)?;
    list.transition_buffer(&dst, ResourceState::CopyDest, ResourceState::GenericRead)?;
    session.retain(scratch);

    log::debug!(
        "Upload: staged static buffer {label:?} ({} x {} bytes)",
        descriptor.element_count,
        descriptor.element_stride
    );
    Ok(dst)
}

/// Typed variant of [`create_static_buffer`]: stride and count come from
/// the slice.
pub fn create_static_buffer_from_slice<T: bytemuck::Pod>(
    session: &mut CommandSession,
    items: &[T],
    usage: BufferUsage,
    label: Option<&str>,
) -> Result<Arc<Buffer>, GraphicsError> {
    let count = u32::try_from(items.len()).map_err(|_| {
        GraphicsError::InvalidParameter(format!("{} elements exceed u32", items.len()))
    })?;
    let mut descriptor =
        StaticBufferDescriptor::new(std::mem::size_of::<T>() as u32, count, usage);
    descriptor.label = label.map(str::to_owned);
    create_static_buffer(session, &descriptor, bytemuck::cast_slice(items))
}

/// Stage tightly packed texel rows and record their copy into `texture`,
/// followed by a transition to `final_state`.
///
/// Rows are re-laid at a pitch aligned to [`TEXTURE_DATA_PITCH_ALIGNMENT`].
pub fn upload_texture_data(
    session: &mut CommandSession,
    texture: &Arc<Texture>,
    pixels: &[u8],
    final_state: ResourceState,
) -> Result<(), GraphicsError> {
    lumen_core::profile_function!();

    let row_size = texture.descriptor().unpadded_bytes_per_row() as usize;
    let rows = texture.height() as usize;
    if pixels.len() != row_size * rows {
        return Err(GraphicsError::InvalidParameter(format!(
            "texture {:?} expects {} bytes of texels, got {}",
            texture.label(),
            row_size * rows,
            pixels.len()
        )));
    }

    let pitch = (row_size as u32).next_multiple_of(TEXTURE_DATA_PITCH_ALIGNMENT);
    let mut staged = vec![0u8; pitch as usize * rows];
    for (dst, src) in staged
        .chunks_exact_mut(pitch as usize)
        .zip(pixels.chunks_exact(row_size))
    {
        dst[..row_size].copy_from_slice(src);
    }

    let device = Arc::clone(session.device());
    let scratch = device.create_buffer(
        &BufferDescriptor::upload(staged.len() as u64)
            .with_label(format!("{}_upload", texture.label().unwrap_or("texture"))),
    )?;
    device.write_buffer(&scratch, 0, &staged)?;

    let layout = TextureCopyLayout {
        offset: 0,
        bytes_per_row: pitch,
        rows: rows as u32,
    };
    let list = session.list_mut();
    list.copy_buffer_to_texture(&scratch, layout, texture)?;
    if final_state != texture.state() {
        list.transition_texture(texture, texture.state(), final_state)?;
    }
    session.retain(scratch);
    Ok(())
}
