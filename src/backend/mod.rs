// Backend module - Vulkan abstraction layer
//
// Thin owned wrappers around ash handles. Everything past bootstrap borrows the
// shared DeviceContext.

pub mod buffer;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod upload;

pub use buffer::GpuBuffer;
pub use context::DeviceContext;
pub use descriptor::DescriptorBindings;
pub use device::{QueueFamilies, VulkanDevice};
pub use image::Texture;
pub use pipeline::GraphicsPipeline;
pub use shader::ShaderModule;
pub use swapchain::{Swapchain, SwapchainSettings, SwapchainSupportDetails};
pub use sync::FrameSync;
pub use upload::StagingBuffer;
