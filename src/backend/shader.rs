// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Modules only need to live until the
// pipeline that uses them has been created.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;

use crate::assets;

/// Shader module destroyed on drop
pub struct ShaderModule<'a> {
    pub module: vk::ShaderModule,
    device: &'a ash::Device,
}

impl<'a> ShaderModule<'a> {
    pub fn from_words(device: &'a ash::Device, code: &[u32]) -> Result<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

        let module = unsafe { device.create_shader_module(&create_info, None) }
            .context("Failed to create shader module")?;

        Ok(Self { module, device })
    }

    /// Load a compiled SPIR-V file from disk
    pub fn load(device: &'a ash::Device, path: &Path) -> Result<Self> {
        let code = assets::read_spirv(path)?;
        log::info!("Loaded shader {:?} ({} bytes)", path, code.len() * 4);
        Self::from_words(device, &code)
            .with_context(|| format!("Failed to create shader module from {:?}", path))
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}
