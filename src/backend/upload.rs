// Host to device transfers through one persistently mapped staging buffer
//
// Uploads are strictly sequential: every copy blocks until the device is idle
// before the staging memory is written again. Startup use only.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::buffer::GpuBuffer;
use super::command::run_single_time_commands;
use super::image::{record_layout_transition, GpuImage, Texture};
use super::DeviceContext;
use crate::assets::DecodedImage;

/// Format of decoded texture pixels (tightly packed 8-bit RGBA)
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Check that `len` bytes at `offset` fit in a region of `capacity` bytes
pub fn check_fit(capacity: u64, offset: u64, len: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => anyhow::bail!(
            "Upload of {} bytes at offset {} exceeds staging capacity of {} bytes",
            len,
            offset,
            capacity
        ),
    }
}

/// Host-visible, host-coherent transfer source, mapped for its whole lifetime
pub struct StagingBuffer {
    mapped: *mut u8,
    buffer: GpuBuffer,
    ctx: Arc<DeviceContext>,
}

impl StagingBuffer {
    pub fn new(ctx: &Arc<DeviceContext>, capacity: vk::DeviceSize) -> Result<Self> {
        let buffer =
            GpuBuffer::host_visible(ctx, capacity, vk::BufferUsageFlags::TRANSFER_SRC)
                .context("Failed to create staging buffer")?;

        let mapped = unsafe {
            ctx.device
                .map_memory(buffer.memory, 0, capacity, vk::MemoryMapFlags::empty())
                .context("Failed to map staging buffer")?
        } as *mut u8;

        log::info!("Staging buffer ready ({} MiB)", capacity / (1024 * 1024));

        Ok(Self {
            mapped,
            buffer,
            ctx: Arc::clone(ctx),
        })
    }

    pub fn capacity(&self) -> vk::DeviceSize {
        self.buffer.size
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.buffer
    }

    /// Copy host bytes into the mapped region at `offset`
    pub fn write(&mut self, offset: vk::DeviceSize, bytes: &[u8]) -> Result<()> {
        check_fit(self.capacity(), offset, bytes.len() as u64)?;

        // Bounds checked above; the mapping covers the whole buffer
        unsafe {
            self.mapped
                .add(offset as usize)
                .copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
        }

        Ok(())
    }

    /// Copy `bytes` into a new device-local buffer usable as `usage`
    pub fn upload_buffer(&mut self, bytes: &[u8], usage: vk::BufferUsageFlags) -> Result<GpuBuffer> {
        let size = bytes.len() as vk::DeviceSize;
        self.write(0, bytes)?;

        let destination = GpuBuffer::new(
            &self.ctx,
            size,
            vk::BufferUsageFlags::TRANSFER_DST | usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let source = self.handle();
        run_single_time_commands(&self.ctx, |device, cb| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe { device.cmd_copy_buffer(cb, source, destination.buffer, &[region]) };
            Ok(())
        })
        .context("Failed to copy staging buffer to device buffer")?;

        log::info!("Uploaded {} bytes as {:?}", size, usage);
        Ok(destination)
    }

    /// Copy decoded pixels into a new device-local sampled texture
    pub fn upload_texture(&mut self, pixels: &DecodedImage) -> Result<Texture> {
        let expected = pixels.byte_len();
        if expected != pixels.pixels.len() {
            anyhow::bail!(
                "Texture {}x{} expects {} bytes, got {}",
                pixels.width,
                pixels.height,
                expected,
                pixels.pixels.len()
            );
        }
        self.write(0, &pixels.pixels)?;

        let extent = vk::Extent2D {
            width: pixels.width,
            height: pixels.height,
        };
        let image = GpuImage::new_2d(
            &self.ctx,
            extent,
            TEXTURE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let source = self.handle();
        run_single_time_commands(&self.ctx, |device, cb| {
            record_layout_transition(
                device,
                cb,
                image.image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;

            let region = buffer_image_copy(extent);
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cb,
                    source,
                    image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }

            record_layout_transition(
                device,
                cb,
                image.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })
        .context("Failed to copy staging buffer to texture image")?;

        log::info!("Uploaded {}x{} texture", extent.width, extent.height);
        Texture::from_image(image)
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        unsafe { self.ctx.device.unmap_memory(self.buffer.memory) };
    }
}

/// Whole-image copy from the start of a tightly packed buffer
fn buffer_image_copy(extent: vk::Extent2D) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
    }
}
