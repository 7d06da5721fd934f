// Error taxonomy for the one-shot initialization protocol
//
// Every stage propagates these up to the application shell, which logs
// and terminates. No stage retries; fallbacks live inside a stage.

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VulkanError {
    /// The host has no usable Vulkan driver at all (loader missing, or the
    /// windowing layer reports no required extensions). Distinct from a
    /// missing validation layer.
    #[error("Vulkan is not supported on this host: {0}")]
    Environment(String),

    /// A requested instance layer (validation) is not installed.
    #[error("requested layer '{0}' is not available")]
    UnsupportedCapability(String),

    /// Surface creation failed. Always fatal: this implies a platform or
    /// driver mismatch nothing downstream can recover from.
    #[error("failed to create window surface: {0}")]
    SurfaceCreation(vk::Result),

    #[error("no Vulkan physical devices available")]
    NoDevicesAvailable,

    #[error("no suitable physical device available")]
    NoSuitableDevice,

    #[error("failed to compile shader '{name}': {message}")]
    ShaderCompile { name: String, message: String },

    #[error("failed to create graphics pipeline: {0}")]
    PipelineCreation(vk::Result),

    /// Any other raw driver call failure.
    #[error("Vulkan call failed: {0}")]
    Api(#[from] vk::Result),
}

pub type VulkanResult<T> = Result<T, VulkanError>;
