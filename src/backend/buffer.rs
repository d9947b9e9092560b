// Buffer utilities for vertex, index, uniform and staging buffers
//
// Each buffer owns its own memory allocation; both are released on drop.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::DeviceContext;

/// Find the first memory type allowed by `type_bits` whose flags contain
/// `required`. `None` means the device has no such memory.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        let has_type = (type_bits & (1 << i)) != 0;
        let has_properties = memory_properties.memory_types[i as usize]
            .property_flags
            .contains(required);

        has_type && has_properties
    })
}

/// Allocate device memory satisfying `requirements` with the given properties
pub fn allocate_memory(
    ctx: &DeviceContext,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory> {
    let memory_type_index =
        find_memory_type(&ctx.memory_properties, requirements.memory_type_bits, properties)
            .with_context(|| format!("Failed to find suitable memory type for {:?}", properties))?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    unsafe { ctx.device.allocate_memory(&alloc_info, None) }
        .context("Failed to allocate device memory")
}

/// A buffer paired with its dedicated memory
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    ctx: Arc<DeviceContext>,
}

impl GpuBuffer {
    pub fn new(
        ctx: &Arc<DeviceContext>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { ctx.device.create_buffer(&buffer_info, None) }
            .context("Failed to create buffer")?;

        let requirements = unsafe { ctx.device.get_buffer_memory_requirements(buffer) };

        let memory = match allocate_memory(ctx, requirements, properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { ctx.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // From here on drop releases both halves
        let gpu_buffer = Self {
            buffer,
            memory,
            size,
            ctx: Arc::clone(ctx),
        };

        unsafe { ctx.device.bind_buffer_memory(buffer, memory, 0) }
            .context("Failed to bind buffer memory")?;

        Ok(gpu_buffer)
    }

    /// Host-visible, host-coherent buffer the CPU writes directly
    pub fn host_visible(
        ctx: &Arc<DeviceContext>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self> {
        Self::new(
            ctx,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// Map, copy, unmap. Only valid for host-visible buffers.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let len = bytes.len() as vk::DeviceSize;
        if len > self.size {
            anyhow::bail!("Write of {} bytes exceeds buffer size {}", len, self.size);
        }

        unsafe {
            let ptr = self
                .ctx
                .device
                .map_memory(self.memory, 0, len, vk::MemoryMapFlags::empty())
                .context("Failed to map buffer memory")? as *mut u8;

            ptr.copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
            self.ctx.device.unmap_memory(self.memory);
        }

        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_buffer(self.buffer, None);
            self.ctx.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Memory table shaped like a typical discrete GPU
    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &property_flags) in flags.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags,
                heap_index: 0,
            };
        }
        props
    }

    fn table() -> vk::PhysicalDeviceMemoryProperties {
        use vk::MemoryPropertyFlags as F;
        memory_properties(&[
            F::DEVICE_LOCAL,
            F::HOST_VISIBLE | F::HOST_COHERENT,
            F::HOST_VISIBLE | F::HOST_COHERENT | F::HOST_CACHED,
            F::DEVICE_LOCAL | F::HOST_VISIBLE | F::HOST_COHERENT,
        ])
    }

    #[test]
    fn first_matching_type_wins() {
        let props = table();
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        assert_eq!(find_memory_type(&props, 0b1111, host), Some(1));
        assert_eq!(
            find_memory_type(&props, 0b1111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
    }

    #[test]
    fn type_bits_filter_out_candidates() {
        let props = table();
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        assert_eq!(find_memory_type(&props, 0b1100, host), Some(2));
        assert_eq!(
            find_memory_type(&props, 0b1000, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(3)
        );
    }

    #[test]
    fn flags_must_be_fully_contained() {
        let props = table();
        let wanted = vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE;

        assert_eq!(find_memory_type(&props, 0b0111, wanted), None);
        assert_eq!(find_memory_type(&props, 0b1111, wanted), Some(3));
    }

    #[test]
    fn no_qualifying_type_is_none() {
        let props = table();
        assert_eq!(
            find_memory_type(&props, 0, vk::MemoryPropertyFlags::empty()),
            None
        );
        assert_eq!(
            find_memory_type(&props, 0b1111, vk::MemoryPropertyFlags::LAZILY_ALLOCATED),
            None
        );
    }

    #[test]
    fn bits_beyond_type_count_are_ignored() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(
            find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            None
        );
    }

    #[test]
    fn empty_requirement_matches_first_allowed_type() {
        let props = table();
        assert_eq!(
            find_memory_type(&props, 0b0100, vk::MemoryPropertyFlags::empty()),
            Some(2)
        );
    }
}
