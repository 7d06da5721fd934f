// Swapchain - window presentation chain
//
// Negotiates format, present mode, extent and image count against the
// driver's freshly queried surface support, then creates the chain and one
// image view per image. Rebuilding after a window resize is not handled.

use ash::vk;
use std::sync::Arc;

use super::error::{VulkanError, VulkanResult};
use super::{Device, Surface};

/// Fallback extent for the degenerate "no drawable size known" path.
pub const DEFAULT_EXTENT: glam::UVec2 = glam::UVec2::new(800, 600);

/// Per-device snapshot of surface support. Queried on demand; never cached
/// across devices, and re-queried between selection and chain creation.
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(surface: &Surface, physical_device: vk::PhysicalDevice) -> VulkanResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface
                    .loader
                    .get_physical_device_surface_capabilities(physical_device, surface.handle)?,
                formats: surface
                    .loader
                    .get_physical_device_surface_formats(physical_device, surface.handle)?,
                present_modes: surface
                    .loader
                    .get_physical_device_surface_present_modes(physical_device, surface.handle)?,
            })
        }
    }

    /// At least one format and one present mode; part of device suitability.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Prefer 8-bit BGRA with the standard non-linear color space; otherwise
/// whatever the driver lists first. Callers guarantee a non-empty list.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .unwrap_or(formats[0])
}

/// Prefer low-latency triple buffering; FIFO is the guaranteed fallback.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Driver-dictated extent verbatim, unless the driver reports the "any size
/// accepted" sentinel - then the drawable size, clamped into the supported
/// bounds. Reaching this path without a drawable size is an unsupported
/// configuration; the nominal default is substituted after logging.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    drawable_size: Option<(u32, u32)>,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    match drawable_size {
        Some((width, height)) => vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        },
        None => {
            log::error!(
                "surface accepts any extent but no drawable size is known; \
                 substituting {}x{}",
                DEFAULT_EXTENT.x,
                DEFAULT_EXTENT.y
            );
            vk::Extent2D {
                width: DEFAULT_EXTENT.x,
                height: DEFAULT_EXTENT.y,
            }
        }
    }
}

/// One more image than the minimum, capped at the maximum when the driver
/// reports a finite one (0 means unbounded).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let max_count = if capabilities.max_image_count > 0 {
        capabilities.max_image_count
    } else {
        u32::MAX
    };
    (capabilities.min_image_count + 1).min(max_count)
}

/// How chain images are shared between the graphics and present queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSharing {
    /// Roles share one family; no cross-queue access.
    Exclusive,
    /// Distinct families; concurrent access avoids explicit ownership
    /// transfers at some throughput cost.
    Concurrent([u32; 2]),
}

/// The fully negotiated chain parameters, ready to hand to the driver.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainPlan {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing: ImageSharing,
}

pub fn plan_swapchain(
    support: &SwapchainSupport,
    drawable_size: Option<(u32, u32)>,
    graphics_family: u32,
    present_family: u32,
) -> SwapchainPlan {
    let sharing = if graphics_family == present_family {
        ImageSharing::Exclusive
    } else {
        ImageSharing::Concurrent([graphics_family, present_family])
    };

    SwapchainPlan {
        format: choose_surface_format(&support.formats),
        present_mode: choose_present_mode(&support.present_modes),
        extent: choose_extent(&support.capabilities, drawable_size),
        image_count: choose_image_count(&support.capabilities),
        sharing,
    }
}

/// Presentation chain plus per-image views. Keeps the device alive through
/// the Arc; views are destroyed before the chain on drop.
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<Device>,
}

impl Swapchain {
    pub fn new(
        instance: &super::Instance,
        device: Arc<Device>,
        surface: &Surface,
        drawable_size: Option<(u32, u32)>,
    ) -> VulkanResult<Self> {
        // Support is not assumed stable since device selection; ask again.
        let support = SwapchainSupport::query(surface, device.physical_device)?;

        let (graphics_family, present_family) =
            match (device.queue_families.graphics, device.queue_families.present) {
                (Some(g), Some(p)) => (g, p),
                _ => return Err(VulkanError::NoSuitableDevice),
            };

        let plan = plan_swapchain(&support, drawable_size, graphics_family, present_family);
        log::info!(
            "Creating swapchain: {:?} {:?} {}x{}, {} images",
            plan.format.format,
            plan.present_mode,
            plan.extent.width,
            plan.extent.height,
            plan.image_count
        );

        let loader = ash::extensions::khr::Swapchain::new(&instance.instance, &device.device);

        let concurrent_families;
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle)
            .min_image_count(plan.image_count)
            .image_format(plan.format.format)
            .image_color_space(plan.format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        create_info = match plan.sharing {
            ImageSharing::Exclusive => create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE),
            ImageSharing::Concurrent(families) => {
                concurrent_families = families;
                create_info
                    .image_sharing_mode(vk::SharingMode::CONCURRENT)
                    .queue_family_indices(&concurrent_families)
            }
        };

        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };
        let images = unsafe { loader.get_swapchain_images(swapchain)? };

        let image_views = Self::create_image_views(&device, &images, plan.format.format)?;

        Ok(Self {
            swapchain,
            loader,
            images,
            image_views,
            format: plan.format.format,
            extent: plan.extent,
            device,
        })
    }

    fn create_image_views(
        device: &Device,
        images: &[vk::Image],
        format: vk::Format,
    ) -> VulkanResult<Vec<vk::ImageView>> {
        images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                let view = unsafe { device.device.create_image_view(&create_info, None)? };
                Ok(view)
            })
            .collect()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preferred() -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn linear_rgba() -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn hdr10() -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: vk::Format::A2B10G10R10_UNORM_PACK32,
            color_space: vk::ColorSpaceKHR::HDR10_ST2084_EXT,
        }
    }

    fn assert_format(actual: vk::SurfaceFormatKHR, expected: vk::SurfaceFormatKHR) {
        assert_eq!(actual.format, expected.format);
        assert_eq!(actual.color_space, expected.color_space);
    }

    fn caps(
        min_count: u32,
        max_count: u32,
        current: (u32, u32),
        min_extent: (u32, u32),
        max_extent: (u32, u32),
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min_extent.0,
                height: min_extent.1,
            },
            max_image_extent: vk::Extent2D {
                width: max_extent.0,
                height: max_extent.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn preferred_format_wins_regardless_of_position() {
        assert_format(choose_surface_format(&[preferred(), hdr10()]), preferred());
        assert_format(
            choose_surface_format(&[hdr10(), linear_rgba(), preferred()]),
            preferred(),
        );
    }

    #[test]
    fn first_format_is_the_fallback() {
        assert_format(choose_surface_format(&[hdr10(), linear_rgba()]), hdr10());
    }

    #[test]
    fn mailbox_preferred_fifo_guaranteed() {
        assert_eq!(
            choose_present_mode(&[
                vk::PresentModeKHR::FIFO,
                vk::PresentModeKHR::MAILBOX,
                vk::PresentModeKHR::IMMEDIATE,
            ]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn fixed_extent_is_taken_verbatim() {
        let capabilities = caps(1, 2, (1024, 768), (1, 1), (4096, 4096));
        let extent = choose_extent(&capabilities, Some((333, 444)));
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn sentinel_extent_clamps_the_drawable_size() {
        let capabilities = caps(1, 2, (u32::MAX, u32::MAX), (200, 100), (1920, 1080));

        let inside = choose_extent(&capabilities, Some((800, 600)));
        assert_eq!((inside.width, inside.height), (800, 600));

        let clamped = choose_extent(&capabilities, Some((4000, 50)));
        assert_eq!((clamped.width, clamped.height), (1920, 100));
    }

    #[test]
    fn sentinel_extent_without_a_window_uses_the_default() {
        let capabilities = caps(1, 2, (u32::MAX, u32::MAX), (1, 1), (4096, 4096));
        let extent = choose_extent(&capabilities, None);
        assert_eq!((extent.width, extent.height), (DEFAULT_EXTENT.x, DEFAULT_EXTENT.y));
    }

    #[test]
    fn image_count_is_min_plus_one_capped_at_max() {
        assert_eq!(choose_image_count(&caps(2, 8, (1, 1), (1, 1), (1, 1))), 3);
        assert_eq!(choose_image_count(&caps(2, 3, (1, 1), (1, 1), (1, 1))), 3);
        assert_eq!(choose_image_count(&caps(3, 3, (1, 1), (1, 1), (1, 1))), 3);
    }

    #[test]
    fn unbounded_max_imposes_no_cap() {
        assert_eq!(choose_image_count(&caps(4, 0, (1, 1), (1, 1), (1, 1))), 5);
    }

    #[test]
    fn distinct_families_share_concurrently() {
        let support = SwapchainSupport {
            capabilities: caps(1, 2, (640, 480), (1, 1), (4096, 4096)),
            formats: vec![preferred()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let plan = plan_swapchain(&support, None, 0, 2);
        assert_eq!(plan.sharing, ImageSharing::Concurrent([0, 2]));
    }

    #[test]
    fn single_device_end_to_end_scenario() {
        // One device, graphics = present = 0, one BGRA8 non-linear format,
        // FIFO only, min 1 / max 2 / fixed 800x600.
        let support = SwapchainSupport {
            capabilities: caps(1, 2, (800, 600), (800, 600), (800, 600)),
            formats: vec![preferred()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(support.is_adequate());

        let plan = plan_swapchain(&support, Some((800, 600)), 0, 0);
        assert_format(plan.format, preferred());
        assert_eq!(plan.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!((plan.extent.width, plan.extent.height), (800, 600));
        assert_eq!(plan.image_count, 2);
        assert_eq!(plan.sharing, ImageSharing::Exclusive);
    }

    #[test]
    fn empty_support_is_inadequate() {
        let support = SwapchainSupport {
            capabilities: caps(1, 2, (1, 1), (1, 1), (1, 1)),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(!support.is_adequate());
    }
}
