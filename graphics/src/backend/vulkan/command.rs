//! Vulkan command pools and command recording.

use ash::vk;

use crate::backend::{GpuBuffer, GpuTexture};
use crate::command::{Command, TextureCopyLayout};
use crate::error::GraphicsError;
use crate::resources::{Buffer, Texture};
use crate::types::ResourceState;

use super::conversion::{buffer_access_for_state, image_access_for_layout, image_layout_for_state};
use super::{VulkanBuffer, VulkanTexture};

/// Create a command pool whose buffers are recycled together on reset.
pub fn create_command_pool(
    device: &ash::Device,
    queue_family_index: u32,
) -> Result<vk::CommandPool, GraphicsError> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family_index)
        .flags(vk::CommandPoolCreateFlags::TRANSIENT);

    unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create command pool: {e:?}"))
    })
}

/// Allocate one primary command buffer from `pool`.
pub fn allocate_command_buffer(
    device: &ash::Device,
    pool: vk::CommandPool,
) -> Result<vk::CommandBuffer, GraphicsError> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to allocate command buffer: {e:?}"))
    })?;
    buffers
        .into_iter()
        .next()
        .ok_or_else(|| GraphicsError::Internal("driver returned no command buffer".to_string()))
}

/// Record `command` into `cmd`.
///
/// Images are moved into `TRANSFER_DST_OPTIMAL` before a copy if they are
/// not there yet, so the first upload into a fresh image needs no explicit
/// transition.
pub fn record_command(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    command: &Command,
) -> Result<(), GraphicsError> {
    match command {
        Command::CopyBuffer {
            src,
            src_offset,
            dst,
            dst_offset,
            size,
        } => {
            let region = vk::BufferCopy::default()
                .src_offset(*src_offset)
                .dst_offset(*dst_offset)
                .size(*size);
            unsafe {
                device.cmd_copy_buffer(
                    cmd,
                    vulkan_buffer(src)?.raw(),
                    vulkan_buffer(dst)?.raw(),
                    &[region],
                )
            };
        }
        Command::CopyBufferToTexture { src, layout, dst } => {
            record_texture_upload(device, cmd, vulkan_buffer(src)?, layout, dst)?;
        }
        Command::BufferTransition {
            buffer,
            before,
            after,
        } => {
            let (src_access, src_stage) = buffer_access_for_state(*before);
            let (dst_access, dst_stage) = buffer_access_for_state(*after);
            let barrier = vk::BufferMemoryBarrier::default()
                .src_access_mask(src_access)
                .dst_access_mask(dst_access)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(vulkan_buffer(buffer)?.raw())
                .offset(0)
                .size(vk::WHOLE_SIZE);
            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    src_stage,
                    dst_stage,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[barrier],
                    &[],
                )
            };
        }
        Command::TextureTransition { texture, after, .. } => {
            transition_image(
                device,
                cmd,
                vulkan_texture(texture)?,
                image_layout_for_state(*after),
            );
        }
    }
    Ok(())
}

fn record_texture_upload(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src: &VulkanBuffer,
    layout: &TextureCopyLayout,
    dst: &Texture,
) -> Result<(), GraphicsError> {
    let texture = vulkan_texture(dst)?;
    transition_image(
        device,
        cmd,
        texture,
        image_layout_for_state(ResourceState::CopyDest),
    );

    let descriptor = dst.descriptor();
    let region = vk::BufferImageCopy::default()
        .buffer_offset(layout.offset)
        .buffer_row_length(layout.bytes_per_row / descriptor.format.block_size())
        .buffer_image_height(layout.rows)
        .image_subresource(color_layers())
        .image_offset(vk::Offset3D::default())
        .image_extent(vk::Extent3D {
            width: descriptor.size.width,
            height: descriptor.size.height,
            depth: descriptor.size.depth,
        });

    unsafe {
        device.cmd_copy_buffer_to_image(
            cmd,
            src.raw(),
            texture.raw(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        )
    };
    Ok(())
}

fn transition_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    texture: &VulkanTexture,
    new_layout: vk::ImageLayout,
) {
    let mut current = texture.layout.lock();
    if *current == new_layout {
        return;
    }

    let (src_access, src_stage) = image_access_for_layout(*current);
    let (dst_access, dst_stage) = image_access_for_layout(new_layout);
    let barrier = vk::ImageMemoryBarrier::default()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(*current)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(texture.raw())
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        )
    };
    *current = new_layout;
}

fn color_layers() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1)
}

fn vulkan_buffer(buffer: &Buffer) -> Result<&VulkanBuffer, GraphicsError> {
    match buffer.gpu_handle() {
        GpuBuffer::Vulkan(buffer) => Ok(buffer),
        _ => Err(GraphicsError::Internal(
            "buffer handle does not belong to the Vulkan backend".to_string(),
        )),
    }
}

fn vulkan_texture(texture: &Texture) -> Result<&VulkanTexture, GraphicsError> {
    match texture.gpu_handle() {
        GpuTexture::Vulkan(texture) => Ok(texture),
        _ => Err(GraphicsError::Internal(
            "texture handle does not belong to the Vulkan backend".to_string(),
        )),
    }
}
