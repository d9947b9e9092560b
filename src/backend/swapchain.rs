// Swapchain - Window presentation
//
// Negotiates a configuration with the surface and owns the resulting chain of
// presentable images, their views and one framebuffer per image.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use std::sync::Arc;

use super::image::create_image_view_2d;
use super::pipeline::create_framebuffer;
use super::{DeviceContext, QueueFamilies, VulkanDevice};

/// Everything the surface reports about what it supports
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn fetch(vulkan: &VulkanDevice) -> Result<Self> {
        let loader = &vulkan.surface_loader;
        let (physical_device, surface) = (vulkan.physical_device, vulkan.surface);

        let capabilities =
            unsafe { loader.get_physical_device_surface_capabilities(physical_device, surface) }
                .context("Failed to query surface capabilities")?;
        let formats = unsafe { loader.get_physical_device_surface_formats(physical_device, surface) }
            .context("Failed to query surface formats")?;
        let present_modes =
            unsafe { loader.get_physical_device_surface_present_modes(physical_device, surface) }
                .context("Failed to query surface present modes")?;

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// The chain asks for exactly the surface minimum
    pub fn requested_image_count(&self) -> u32 {
        self.capabilities.min_image_count
    }
}

/// Negotiated swapchain configuration
#[derive(Debug, Clone, Copy)]
pub struct SwapchainSettings {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
}

impl SwapchainSettings {
    /// Deterministic selection:
    /// - BGRA8 UNORM / sRGB non-linear if offered, else the first format
    /// - MAILBOX if offered, else FIFO (always available)
    /// - the surface's current extent if fixed, else `requested` clamped
    pub fn select(details: &SwapchainSupportDetails, requested: vk::Extent2D) -> Result<Self> {
        Ok(Self {
            surface_format: choose_surface_format(&details.formats)
                .context("Surface reports no formats")?,
            present_mode: choose_present_mode(&details.present_modes),
            extent: choose_extent(&details.capabilities, requested),
        })
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    // u32::MAX means the surface lets the swapchain pick
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: requested
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: requested
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// Concurrent sharing across both families when they differ
pub fn sharing_mode(families: QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![families.graphics, families.present],
        )
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    ctx: Arc<DeviceContext>,
}

impl Swapchain {
    /// Create the chain from scratch. There is no old swapchain to hand over:
    /// the chain lives for the whole run.
    pub fn new(
        ctx: &Arc<DeviceContext>,
        details: &SwapchainSupportDetails,
        settings: &SwapchainSettings,
        render_pass: vk::RenderPass,
    ) -> Result<Self> {
        let vulkan = ctx.vulkan();
        let (sharing, family_indices) = sharing_mode(vulkan.queue_families);

        log::info!(
            "Creating swapchain: {}x{} {:?}/{:?}, {:?}, {:?} sharing",
            settings.extent.width,
            settings.extent.height,
            settings.surface_format.format,
            settings.surface_format.color_space,
            settings.present_mode,
            sharing
        );

        let swapchain_loader = khr::Swapchain::new(&vulkan.instance, &ctx.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(vulkan.surface)
            .min_image_count(details.requested_image_count())
            .image_format(settings.surface_format.format)
            .image_color_space(settings.surface_format.color_space)
            .image_extent(settings.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing)
            .queue_family_indices(&family_indices)
            .pre_transform(details.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(settings.present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        // Views and framebuffers are filled in as they are created, so an
        // early return still releases what exists
        let mut chain = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            framebuffers: Vec::new(),
            format: settings.surface_format.format,
            extent: settings.extent,
            ctx: Arc::clone(ctx),
        };

        // The implementation may hand back more images than requested
        chain.images = unsafe { chain.swapchain_loader.get_swapchain_images(swapchain) }
            .context("Failed to get swapchain images")?;

        log::info!(
            "Created swapchain with {} images (requested {})",
            chain.images.len(),
            details.requested_image_count()
        );

        for &image in &chain.images {
            let view = create_image_view_2d(
                &ctx.device,
                image,
                chain.format,
                vk::ImageAspectFlags::COLOR,
            )?;
            chain.image_views.push(view);

            let framebuffer = create_framebuffer(&ctx.device, render_pass, view, chain.extent)?;
            chain.framebuffers.push(framebuffer);
        }

        Ok(chain)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire next image for rendering. Out-of-date is an error like any other.
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> Result<u32> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        }
        .context("Failed to acquire swapchain image")?;

        if suboptimal {
            log::trace!("Swapchain image {} is suboptimal", index);
        }

        Ok(index)
    }

    /// Queue an image for presentation once `wait_semaphores` signal
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
            .context("Failed to present swapchain image")?;

        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.ctx.device.destroy_framebuffer(framebuffer, None);
            }
            for &view in &self.image_views {
                self.ctx.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}
