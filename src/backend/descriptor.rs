// Descriptor set layout, pool and per-frame writes
//
// Binding 0: uniform buffer (vertex stage)
// Binding 1: combined image sampler (fragment stage)

use anyhow::{Context, Result};
use ash::vk;

use super::DeviceContext;

pub const UNIFORM_BINDING: u32 = 0;
pub const TEXTURE_BINDING: u32 = 1;

pub fn create_descriptor_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let bindings = [
        vk::DescriptorSetLayoutBinding::builder()
            .binding(UNIFORM_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build(),
        vk::DescriptorSetLayoutBinding::builder()
            .binding(TEXTURE_BINDING)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build(),
    ];

    let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

    unsafe { device.create_descriptor_set_layout(&layout_info, None) }
        .context("Failed to create descriptor set layout")
}

/// Room for `max_sets` sets of the layout above
pub fn create_descriptor_pool(device: &ash::Device, max_sets: u32) -> Result<vk::DescriptorPool> {
    let pool_sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: max_sets,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: max_sets,
        },
    ];

    let pool_info = vk::DescriptorPoolCreateInfo::builder()
        .pool_sizes(&pool_sizes)
        .max_sets(max_sets);

    unsafe { device.create_descriptor_pool(&pool_info, None) }
        .context("Failed to create descriptor pool")
}

/// One set per swapchain image, all with the same layout
pub fn allocate_descriptor_sets(
    ctx: &DeviceContext,
    layout: vk::DescriptorSetLayout,
    count: usize,
) -> Result<Vec<vk::DescriptorSet>> {
    let layouts = vec![layout; count];
    let alloc_info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(ctx.descriptor_pool)
        .set_layouts(&layouts);

    unsafe { ctx.device.allocate_descriptor_sets(&alloc_info) }
        .context("Failed to allocate descriptor sets")
}

/// What one descriptor set should point at. Rewriting the same bindings is
/// harmless, so it is applied every frame.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorBindings {
    pub uniform: vk::DescriptorBufferInfo,
    /// `None` while no texture is loaded; binding 1 is then left unwritten
    pub texture: Option<vk::DescriptorImageInfo>,
}

impl DescriptorBindings {
    pub fn new(
        uniform_buffer: vk::Buffer,
        uniform_range: vk::DeviceSize,
        texture: Option<vk::DescriptorImageInfo>,
    ) -> Self {
        Self {
            uniform: vk::DescriptorBufferInfo {
                buffer: uniform_buffer,
                offset: 0,
                range: uniform_range,
            },
            texture,
        }
    }

    /// Writes for `set`, uniform buffer first. Binding 1 is skipped while
    /// there is no texture. The returned structs point into `self`.
    pub fn writes(&self, set: vk::DescriptorSet) -> Vec<vk::WriteDescriptorSet> {
        let mut writes = vec![vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(UNIFORM_BINDING)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(std::slice::from_ref(&self.uniform))
            .build()];

        if let Some(texture) = self.texture.as_ref() {
            writes.push(
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(TEXTURE_BINDING)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(texture))
                    .build(),
            );
        }

        writes
    }

    pub fn write(&self, device: &ash::Device, set: vk::DescriptorSet) {
        let writes = self.writes(set);
        unsafe { device.update_descriptor_sets(&writes, &[]) };
    }
}
