// Device context - the immutable handles every other component borrows.
//
// Built once after bootstrap and shared through an Arc. The command pool and
// descriptor pool live here so that everything allocated from them is released
// before the pools themselves.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::command::create_command_pool;
use super::descriptor::create_descriptor_pool;
use super::VulkanDevice;

/// Upper bound on swapchain images, sizes the descriptor pool
pub const MAX_SWAPCHAIN_IMAGES: u32 = 8;

pub struct DeviceContext {
    pub device: ash::Device,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub command_pool: vk::CommandPool,
    pub descriptor_pool: vk::DescriptorPool,
    vulkan: Arc<VulkanDevice>,
}

impl DeviceContext {
    pub fn new(vulkan: Arc<VulkanDevice>) -> Result<Arc<Self>> {
        let device = vulkan.device.clone();

        let command_pool = create_command_pool(&device, vulkan.queue_families.graphics)
            .context("Failed to create command pool")?;

        let descriptor_pool = match create_descriptor_pool(&device, MAX_SWAPCHAIN_IMAGES) {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_command_pool(command_pool, None) };
                return Err(e);
            }
        };

        Ok(Arc::new(Self {
            memory_properties: vulkan.memory_properties,
            graphics_queue: vulkan.graphics_queue,
            present_queue: vulkan.present_queue,
            command_pool,
            descriptor_pool,
            device,
            vulkan,
        }))
    }

    /// Bootstrap handles (instance, surface, queue families)
    pub fn vulkan(&self) -> &VulkanDevice {
        &self.vulkan
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("Failed to wait for device idle")
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            // Frees every descriptor set and command buffer allocated from them
            self.device.destroy_descriptor_pool(self.descriptor_pool, None);
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
