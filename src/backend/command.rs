// Command pools and command buffers, including the one-shot pattern used for
// startup transfers.

use anyhow::{Context, Result};
use ash::vk;

use super::DeviceContext;

/// Command pool whose buffers can be reset individually
pub fn create_command_pool(device: &ash::Device, queue_family: u32) -> Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::builder()
        .queue_family_index(queue_family)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    unsafe { device.create_command_pool(&pool_info, None) }.context("Failed to create command pool")
}

pub fn allocate_primary_command_buffers(
    ctx: &DeviceContext,
    count: u32,
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(ctx.command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count);

    unsafe { ctx.device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate command buffers")
}

/// Allocate and begin a command buffer flagged for a single submission
pub fn begin_single_time_commands(ctx: &DeviceContext) -> Result<vk::CommandBuffer> {
    let command_buffer = allocate_primary_command_buffers(ctx, 1)?[0];

    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    if let Err(e) = unsafe { ctx.device.begin_command_buffer(command_buffer, &begin_info) } {
        unsafe { ctx.device.free_command_buffers(ctx.command_pool, &[command_buffer]) };
        return Err(e).context("Failed to begin one-shot command buffer");
    }

    Ok(command_buffer)
}

/// End, submit without synchronization objects, and block until the whole
/// device is idle. Startup transfers only: this stalls everything.
pub fn end_single_time_commands(ctx: &DeviceContext, command_buffer: vk::CommandBuffer) -> Result<()> {
    let result = submit_and_wait_idle(ctx, command_buffer);

    unsafe { ctx.device.free_command_buffers(ctx.command_pool, &[command_buffer]) };

    result
}

fn submit_and_wait_idle(ctx: &DeviceContext, command_buffer: vk::CommandBuffer) -> Result<()> {
    let command_buffers = [command_buffer];
    let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

    unsafe {
        ctx.device
            .end_command_buffer(command_buffer)
            .context("Failed to end one-shot command buffer")?;
        ctx.device
            .queue_submit(ctx.graphics_queue, &[submit_info.build()], vk::Fence::null())
            .context("Failed to submit one-shot command buffer")?;
        ctx.device
            .device_wait_idle()
            .context("Failed to wait for one-shot command buffer")?;
    }

    Ok(())
}

/// Record commands into a one-shot buffer and run them to completion
pub fn run_single_time_commands<F>(ctx: &DeviceContext, record: F) -> Result<()>
where
    F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
{
    let command_buffer = begin_single_time_commands(ctx)?;

    if let Err(e) = record(&ctx.device, command_buffer) {
        unsafe { ctx.device.free_command_buffers(ctx.command_pool, &[command_buffer]) };
        return Err(e);
    }

    end_single_time_commands(ctx, command_buffer)
}
