// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash, one per negotiation stage. Construction runs
// strictly in sequence: instance -> surface -> device -> swapchain ->
// render pass -> pipeline. Teardown is the exact reverse.

pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;

pub use device::{select_physical_device, Device, QueueFamilyIndices};
pub use error::{VulkanError, VulkanResult};
pub use instance::{DiagnosticSink, Instance, LogSink};
pub use pipeline::{Pipeline, RenderPass};
pub use shader::{ShaderCompiler, ShaderStage};
pub use surface::Surface;
pub use swapchain::Swapchain;
