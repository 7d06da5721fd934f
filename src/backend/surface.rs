// Window surface - binds a native window handle to a renderable target
//
// Owned by the instance lifetime-wise: must be destroyed before it.

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use super::error::{VulkanError, VulkanResult};
use super::Instance;

pub struct Surface {
    pub loader: ash::extensions::khr::Surface,
    pub handle: vk::SurfaceKHR,
}

impl Surface {
    /// Bind a native window to a Vulkan surface. Failure here is always
    /// fatal: there is no sensible retry for a platform/driver mismatch.
    pub fn new(
        instance: &Instance,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> VulkanResult<Self> {
        let loader = ash::extensions::khr::Surface::new(&instance.entry, &instance.instance);

        let handle = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                display_handle,
                window_handle,
                None,
            )
        }
        .map_err(VulkanError::SurfaceCreation)?;

        log::info!("Created window surface");

        Ok(Self { loader, handle })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}
