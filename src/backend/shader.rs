// Shader compilation and module creation
//
// GLSL source is compiled to SPIR-V at startup via shaderc. A failed
// compile is a hard error; building a module from broken output is never
// worth the frame it might produce.

use ash::vk;

use super::error::{VulkanError, VulkanResult};
use super::Device;

/// The two programmable stages this pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn kind(self) -> shaderc::ShaderKind {
        match self {
            ShaderStage::Vertex => shaderc::ShaderKind::Vertex,
            ShaderStage::Fragment => shaderc::ShaderKind::Fragment,
        }
    }
}

/// Wrapper around the shaderc compiler. The source text itself is opaque
/// input; only the stage kind and a debug name accompany it.
pub struct ShaderCompiler {
    compiler: shaderc::Compiler,
}

impl ShaderCompiler {
    pub fn new() -> VulkanResult<Self> {
        let compiler = shaderc::Compiler::new().ok_or_else(|| {
            VulkanError::Environment("shaderc compiler unavailable".to_owned())
        })?;
        Ok(Self { compiler })
    }

    /// Compile one stage to SPIR-V words. Warnings are logged with their
    /// count; errors abort the build.
    pub fn compile(&self, source: &str, stage: ShaderStage, name: &str) -> VulkanResult<Vec<u32>> {
        let artifact = self
            .compiler
            .compile_into_spirv(source, stage.kind(), name, "main", None)
            .map_err(|e| VulkanError::ShaderCompile {
                name: name.to_owned(),
                message: e.to_string(),
            })?;

        let warnings = artifact.get_num_warnings();
        if warnings > 0 {
            log::warn!(
                "Compiled '{}' with {} warning(s):\n{}",
                name,
                warnings,
                artifact.get_warning_messages()
            );
        } else {
            log::info!("Compiled '{}'", name);
        }

        Ok(artifact.as_binary().to_vec())
    }
}

/// Create a shader module from compiled SPIR-V words.
pub fn create_shader_module(device: &Device, code: &[u32]) -> VulkanResult<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    let module = unsafe { device.device.create_shader_module(&create_info, None)? };
    Ok(module)
}
