// Renderer - owns every GPU resource of the textured quad
//
// Initialization happens once, in dependency order. Field order is teardown
// order: everything that references the swapchain, the pipeline or the
// context is declared before them.

pub mod frame;
pub mod orchestrator;

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::assets::{self, DecodedImage};
use crate::backend::context::MAX_SWAPCHAIN_IMAGES;
use crate::backend::descriptor::allocate_descriptor_sets;
use crate::backend::{
    DescriptorBindings, DeviceContext, GpuBuffer, GraphicsPipeline, ShaderModule, StagingBuffer,
    Swapchain, SwapchainSettings, SwapchainSupportDetails, Texture, VulkanDevice,
};
use crate::config::Config;
use crate::mesh::{INDEX_TYPE, QUAD_INDICES, QUAD_VERTICES};
use crate::uniform::UniformBufferObject;
use frame::FrameSlot;
use orchestrator::{FrameBackend, Orchestrator};

pub struct Renderer {
    orchestrator: Orchestrator,
    slots: Vec<FrameSlot>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    descriptor_bindings: Vec<DescriptorBindings>,
    uniform_buffers: Vec<GpuBuffer>,
    texture: Option<Texture>,
    index_buffer: GpuBuffer,
    vertex_buffer: GpuBuffer,
    _staging: StagingBuffer,
    swapchain: Swapchain,
    pipeline: GraphicsPipeline,
    ctx: Arc<DeviceContext>,
    clear_color: [f32; 4],
    start: Instant,
}

impl Renderer {
    pub fn new(vulkan: Arc<VulkanDevice>, config: &Config) -> Result<Self> {
        log::info!("Initializing renderer...");

        let ctx = DeviceContext::new(vulkan)?;

        let details = SwapchainSupportDetails::fetch(ctx.vulkan())?;
        let requested = vk::Extent2D {
            width: config.window.width,
            height: config.window.height,
        };
        let settings = SwapchainSettings::select(&details, requested)?;

        // Shader modules only live until the pipeline exists
        let pipeline = {
            let vert = ShaderModule::load(&ctx.device, &config.assets.vertex_shader)?;
            let frag = ShaderModule::load(&ctx.device, &config.assets.fragment_shader)?;
            GraphicsPipeline::new(&ctx, settings.surface_format.format, &vert, &frag)?
        };

        let swapchain = Swapchain::new(&ctx, &details, &settings, pipeline.render_pass)?;
        let image_count = swapchain.image_count();
        if image_count > MAX_SWAPCHAIN_IMAGES as usize {
            anyhow::bail!(
                "Swapchain has {} images, descriptor pool holds {}",
                image_count,
                MAX_SWAPCHAIN_IMAGES
            );
        }

        let mut staging = StagingBuffer::new(&ctx, config.graphics.staging_buffer_size)?;
        let vertex_buffer = staging
            .upload_buffer(bytemuck::cast_slice(&QUAD_VERTICES), vk::BufferUsageFlags::VERTEX_BUFFER)
            .context("Failed to upload vertex buffer")?;
        let index_buffer = staging
            .upload_buffer(bytemuck::cast_slice(&QUAD_INDICES), vk::BufferUsageFlags::INDEX_BUFFER)
            .context("Failed to upload index buffer")?;
        let texture = load_texture(&config.assets.texture, |pixels| {
            staging.upload_texture(pixels)
        })?;

        let uniform_buffers = (0..image_count)
            .map(|_| {
                GpuBuffer::host_visible(
                    &ctx,
                    UniformBufferObject::SIZE,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                )
            })
            .collect::<Result<Vec<_>>>()
            .context("Failed to create uniform buffers")?;

        let descriptor_sets =
            allocate_descriptor_sets(&ctx, pipeline.descriptor_set_layout, image_count)?;
        let uniform_handles: Vec<vk::Buffer> = uniform_buffers.iter().map(|b| b.buffer).collect();
        let descriptor_bindings =
            descriptor_plan(&uniform_handles, texture.as_ref().map(Texture::descriptor_info));

        // One slot per swapchain image, so a slot's fence also guards its image
        let slots = FrameSlot::create_all(&ctx, image_count)?;
        let orchestrator = Orchestrator::new(slots.len(), swapchain.extent)?;

        log::info!("Renderer initialized ({} frames in flight)", slots.len());

        Ok(Self {
            orchestrator,
            slots,
            descriptor_sets,
            descriptor_bindings,
            uniform_buffers,
            texture,
            index_buffer,
            vertex_buffer,
            _staging: staging,
            swapchain,
            pipeline,
            ctx,
            clear_color: config.graphics.clear_color,
            start: Instant::now(),
        })
    }

    pub fn has_texture(&self) -> bool {
        self.texture.is_some()
    }

    /// Render one frame
    pub fn render(&mut self) -> Result<()> {
        let mut recorder = FrameRecorder {
            device: &self.ctx.device,
            graphics_queue: self.ctx.graphics_queue,
            present_queue: self.ctx.present_queue,
            swapchain: &self.swapchain,
            pipeline: &self.pipeline,
            slots: &self.slots,
            uniform_buffers: &self.uniform_buffers,
            descriptor_sets: &self.descriptor_sets,
            descriptor_bindings: &self.descriptor_bindings,
            vertex_buffer: self.vertex_buffer.buffer,
            index_buffer: self.index_buffer.buffer,
            clear_color: self.clear_color,
        };

        self.orchestrator.render(&mut recorder, self.start.elapsed())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up renderer...");
        // Nothing may be destroyed while the GPU still uses it
        if let Err(e) = self.ctx.wait_idle() {
            log::error!("{:#}", e);
        }
    }
}

/// Decode the texture and hand it to `upload`. A file that cannot be decoded
/// leaves the renderer without a texture rather than failing initialization.
fn load_texture<T, F>(path: &Path, upload: F) -> Result<Option<T>>
where
    F: FnOnce(&DecodedImage) -> Result<T>,
{
    match assets::load_rgba(path) {
        Some(pixels) => upload(&pixels).map(Some),
        None => {
            log::warn!("Rendering without a texture");
            Ok(None)
        }
    }
}

/// Descriptor contents for each swapchain image
fn descriptor_plan(
    uniform_buffers: &[vk::Buffer],
    texture: Option<vk::DescriptorImageInfo>,
) -> Vec<DescriptorBindings> {
    uniform_buffers
        .iter()
        .map(|&buffer| DescriptorBindings::new(buffer, UniformBufferObject::SIZE, texture))
        .collect()
}

/// Records and submits frames with the renderer's resources
struct FrameRecorder<'a> {
    device: &'a ash::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    swapchain: &'a Swapchain,
    pipeline: &'a GraphicsPipeline,
    slots: &'a [FrameSlot],
    uniform_buffers: &'a [GpuBuffer],
    descriptor_sets: &'a [vk::DescriptorSet],
    descriptor_bindings: &'a [DescriptorBindings],
    vertex_buffer: vk::Buffer,
    index_buffer: vk::Buffer,
    clear_color: [f32; 4],
}

impl FrameBackend for FrameRecorder<'_> {
    fn wait_for_fence(&mut self, slot: usize) -> Result<()> {
        let fence = self.slots[slot].sync.in_flight_fence;
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }
            .context("Failed to wait for in-flight fence")
    }

    fn reset_fence(&mut self, slot: usize) -> Result<()> {
        let fence = self.slots[slot].sync.in_flight_fence;
        unsafe { self.device.reset_fences(&[fence]) }.context("Failed to reset in-flight fence")
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<u32> {
        self.swapchain
            .acquire_next_image(u64::MAX, self.slots[slot].sync.image_available)
    }

    fn begin_frame(&mut self, slot: usize, image: u32) -> Result<()> {
        let cmd = self.slots[slot].command_buffer;
        let extent = self.swapchain.extent;

        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;

            let begin_info = vk::CommandBufferBeginInfo::builder();
            self.device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer")?;

            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            }];
            let render_pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.pipeline.render_pass)
                .framebuffer(self.swapchain.framebuffers[image as usize])
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);
            self.device
                .cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            self.device.cmd_set_viewport(cmd, 0, &[viewport]);

            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            self.device.cmd_set_scissor(cmd, 0, &[scissor]);
        }

        Ok(())
    }

    fn write_uniforms(&mut self, image: u32, ubo: &UniformBufferObject) -> Result<()> {
        self.uniform_buffers[image as usize].write(ubo.as_bytes())
    }

    fn write_descriptors(&mut self, image: u32) -> Result<()> {
        let image = image as usize;
        self.descriptor_bindings[image].write(self.device, self.descriptor_sets[image]);
        Ok(())
    }

    fn draw(&mut self, slot: usize, image: u32) -> Result<()> {
        let cmd = self.slots[slot].command_buffer;

        unsafe {
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            self.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout,
                0,
                &[self.descriptor_sets[image as usize]],
                &[],
            );
            self.device
                .cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer], &[0]);
            self.device
                .cmd_bind_index_buffer(cmd, self.index_buffer, 0, INDEX_TYPE);
            self.device
                .cmd_draw_indexed(cmd, QUAD_INDICES.len() as u32, 1, 0, 0, 0);

            self.device.cmd_end_render_pass(cmd);
            self.device
                .end_command_buffer(cmd)
                .context("Failed to end command buffer")?;
        }

        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let frame = &self.slots[slot];

        let wait_semaphores = [frame.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.sync.render_finished];
        let command_buffers = [frame.command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.queue_submit(
                self.graphics_queue,
                &[submit_info.build()],
                frame.sync.in_flight_fence,
            )
        }
        .context("Failed to submit draw command buffer")
    }

    fn present(&mut self, slot: usize, image: u32) -> Result<()> {
        self.swapchain.present(
            self.present_queue,
            image,
            &[self.slots[slot].sync.render_finished],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::descriptor::{TEXTURE_BINDING, UNIFORM_BINDING};
    use ash::vk::Handle;

    fn buffers(count: u64) -> Vec<vk::Buffer> {
        (1..=count).map(vk::Buffer::from_raw).collect()
    }

    #[test]
    fn missing_texture_skips_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut uploads = 0;

        let texture = load_texture(&dir.path().join("missing.png"), |_| {
            uploads += 1;
            Ok(())
        })
        .unwrap();

        assert!(texture.is_none());
        assert_eq!(uploads, 0);
    }

    #[test]
    fn corrupt_texture_skips_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.png");
        std::fs::write(&path, b"not an image").unwrap();

        let texture = load_texture(&path, |_| -> Result<()> {
            panic!("nothing to upload")
        })
        .unwrap();
        assert!(texture.is_none());
    }

    #[test]
    fn decoded_texture_is_uploaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let uploaded = load_texture(&path, |pixels| Ok((pixels.width, pixels.height, pixels.pixels.len())))
            .unwrap();
        assert_eq!(uploaded, Some((4, 2, 4 * 2 * 4)));
    }

    #[test]
    fn failed_upload_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        image::RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let result = load_texture(&path, |_| -> Result<()> { anyhow::bail!("out of memory") });
        assert!(result.is_err());
    }

    #[test]
    fn missing_texture_leaves_texture_binding_unwritten() {
        let set = vk::DescriptorSet::from_raw(5);
        let plan = descriptor_plan(&buffers(2), None);
        assert_eq!(plan.len(), 2);

        for (bindings, buffer) in plan.iter().zip(buffers(2)) {
            let writes = bindings.writes(set);
            assert_eq!(writes.len(), 1);
            assert_eq!(writes[0].dst_binding, UNIFORM_BINDING);
            assert_eq!(writes[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
            assert_eq!(unsafe { (*writes[0].p_buffer_info).buffer }, buffer);
        }
    }

    #[test]
    fn each_image_gets_its_own_uniform_buffer() {
        let texture = vk::DescriptorImageInfo {
            sampler: vk::Sampler::from_raw(40),
            image_view: vk::ImageView::from_raw(41),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        let plan = descriptor_plan(&buffers(3), Some(texture));

        let uniforms: Vec<vk::Buffer> = plan.iter().map(|b| b.uniform.buffer).collect();
        assert_eq!(uniforms, buffers(3));
        assert!(plan
            .iter()
            .all(|b| b.uniform.range == UniformBufferObject::SIZE));

        for bindings in &plan {
            let writes = bindings.writes(vk::DescriptorSet::from_raw(5));
            assert_eq!(writes.len(), 2);
            assert_eq!(writes[1].dst_binding, TEXTURE_BINDING);
            assert_eq!(unsafe { (*writes[1].p_image_info).image_view }, texture.image_view);
        }
    }
}
