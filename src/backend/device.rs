// Physical device selection and logical device creation
//
// Responsibilities:
// - Enumerate candidate GPUs and take the first suitable one
// - Resolve graphics + presentation queue families against the surface
// - Open the logical device and fetch its queues

use ash::vk;
use std::collections::BTreeSet;
use std::ffi::CStr;

use super::error::{VulkanError, VulkanResult};
use super::instance::VALIDATION_LAYER;
use super::{Instance, Surface};

/// Device extensions every candidate must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::extensions::khr::Swapchain::name()];

/// Queue family indices for the two roles we need. They may coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both roles mapped onto concrete families. A precondition for every
    /// downstream stage; devices without it are rejected outright.
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Record one family's capabilities. Keeps the FIRST index found for
    /// each role so resolution is deterministic in family index order.
    fn record(&mut self, index: u32, supports_graphics: bool, supports_present: bool) {
        if self.graphics.is_none() && supports_graphics {
            self.graphics = Some(index);
        }
        if self.present.is_none() && supports_present {
            self.present = Some(index);
        }
    }
}

/// Scan queue families in index order, recording the first graphics-capable
/// and the first present-capable index. Stops as soon as both are known.
pub fn find_queue_families(
    instance: &Instance,
    surface: &Surface,
    physical_device: vk::PhysicalDevice,
) -> VulkanResult<QueueFamilyIndices> {
    let families = unsafe {
        instance
            .instance
            .get_physical_device_queue_family_properties(physical_device)
    };

    let mut indices = QueueFamilyIndices::default();
    for (index, properties) in families.iter().enumerate() {
        let index = index as u32;
        let supports_graphics = properties.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let supports_present = unsafe {
            surface.loader.get_physical_device_surface_support(
                physical_device,
                index,
                surface.handle,
            )?
        };

        indices.record(index, supports_graphics, supports_present);
        if indices.is_complete() {
            break;
        }
    }

    Ok(indices)
}

/// First-fit selection policy: the first candidate (in enumeration order)
/// the predicate accepts. Deliberately not a ranked choice - adequate for a
/// single-GPU target, and driver enumeration order breaks ties.
pub fn first_suitable<T: Copy, F>(candidates: &[T], mut is_suitable: F) -> Option<T>
where
    F: FnMut(&T) -> bool,
{
    candidates.iter().copied().find(|c| is_suitable(c))
}

fn supports_required_extensions(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
) -> VulkanResult<bool> {
    let available = unsafe {
        instance
            .instance
            .enumerate_device_extension_properties(physical_device)?
    };
    Ok(supports_all_extensions(&available, REQUIRED_DEVICE_EXTENSIONS))
}

fn supports_all_extensions(available: &[vk::ExtensionProperties], required: &[&CStr]) -> bool {
    required.iter().all(|&name| {
        available
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == name)
    })
}

fn is_suitable(
    instance: &Instance,
    surface: &Surface,
    physical_device: vk::PhysicalDevice,
) -> VulkanResult<bool> {
    let indices = find_queue_families(instance, surface, physical_device)?;
    if !indices.is_complete() {
        return Ok(false);
    }

    if !supports_required_extensions(instance, physical_device)? {
        return Ok(false);
    }

    // Only meaningful to ask about presentation support once the swapchain
    // extension is known to exist.
    let support = super::swapchain::SwapchainSupport::query(surface, physical_device)?;
    Ok(support.is_adequate())
}

/// Enumerate candidates and pick the first suitable one, together with its
/// resolved queue families.
pub fn select_physical_device(
    instance: &Instance,
    surface: &Surface,
) -> VulkanResult<(vk::PhysicalDevice, QueueFamilyIndices)> {
    let candidates = unsafe { instance.instance.enumerate_physical_devices()? };
    if candidates.is_empty() {
        return Err(VulkanError::NoDevicesAvailable);
    }

    log::info!("Found {} physical device(s)", candidates.len());

    let mut failure: Option<VulkanError> = None;
    let selected = first_suitable(&candidates, |&device| {
        match is_suitable(instance, surface, device) {
            Ok(suitable) => suitable,
            Err(e) => {
                failure = Some(e);
                false
            }
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    let physical_device = selected.ok_or(VulkanError::NoSuitableDevice)?;

    let properties = unsafe {
        instance
            .instance
            .get_physical_device_properties(physical_device)
    };
    log::info!(
        "Selected GPU: {} (API {}.{}.{})",
        unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy(),
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version),
        vk::api_version_patch(properties.api_version),
    );

    let indices = find_queue_families(instance, surface, physical_device)?;
    debug_assert!(indices.is_complete());

    Ok((physical_device, indices))
}

/// Logical device plus its resolved queues. Exclusive owner of everything
/// created from it; shared behind an Arc so derived resources keep it alive
/// until they are gone.
pub struct Device {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub queue_families: QueueFamilyIndices,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

impl Device {
    pub fn new(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilyIndices,
    ) -> VulkanResult<Self> {
        let (graphics_family, present_family) =
            match (queue_families.graphics, queue_families.present) {
                (Some(g), Some(p)) => (g, p),
                // Guaranteed complete by selection; never silently defaulted.
                _ => return Err(VulkanError::NoSuitableDevice),
            };

        // One queue of equal priority per unique family (1 or 2 entries).
        let unique_families: BTreeSet<u32> = [graphics_family, present_family].into();
        let priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<*const std::os::raw::c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        // Device layers are ignored by modern drivers but kept in step with
        // the instance for older loaders. Not re-validated here.
        let layer_names = if instance.validation_enabled() {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let features = vk::PhysicalDeviceFeatures::default();
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .instance
                .create_device(physical_device, &create_info, None)?
        };

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        log::info!(
            "Created logical device (graphics family {}, present family {})",
            graphics_family,
            present_family
        );

        Ok(Self {
            device,
            physical_device,
            queue_families,
            graphics_queue,
            present_queue,
        })
    }

    /// Wait for the device to go idle (used before teardown).
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::info!("Destroying logical device");
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(families: &[(bool, bool)]) -> QueueFamilyIndices {
        let mut indices = QueueFamilyIndices::default();
        for (index, &(graphics, present)) in families.iter().enumerate() {
            indices.record(index as u32, graphics, present);
            if indices.is_complete() {
                break;
            }
        }
        indices
    }

    #[test]
    fn records_first_family_for_each_role() {
        // Family 0: transfer-only, 1: graphics, 2: graphics + present
        let indices = resolve(&[(false, false), (true, false), (true, true)]);
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(2));
        assert!(indices.is_complete());
    }

    #[test]
    fn roles_may_share_one_family() {
        let indices = resolve(&[(true, true)]);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        assert!(indices.is_complete());
    }

    #[test]
    fn incomplete_when_a_role_is_unmapped() {
        let graphics_only = resolve(&[(true, false), (true, false)]);
        assert!(!graphics_only.is_complete());
        assert_eq!(graphics_only.graphics, Some(0));
        assert_eq!(graphics_only.present, None);

        assert!(!resolve(&[]).is_complete());
    }

    #[test]
    fn resolution_is_idempotent() {
        let families = [(false, true), (true, false), (true, true)];
        assert_eq!(resolve(&families), resolve(&families));
    }

    #[test]
    fn first_suitable_takes_enumeration_order() {
        let devices = [10, 20, 30, 40];
        assert_eq!(first_suitable(&devices, |&d| d >= 20), Some(20));
        assert_eq!(first_suitable(&devices, |&d| d == 40), Some(40));
    }

    #[test]
    fn first_suitable_distinguishes_empty_from_unqualified() {
        let empty: [i32; 0] = [];
        assert_eq!(first_suitable(&empty, |_| true), None);
        assert_eq!(first_suitable(&[1, 2, 3], |_| false), None);
    }

    fn extension(name: &str) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (i, byte) in name.bytes().enumerate() {
            props.extension_name[i] = byte as std::os::raw::c_char;
        }
        props
    }

    #[test]
    fn required_extension_checklist() {
        let available = [extension("VK_KHR_swapchain"), extension("VK_EXT_mesh_shader")];
        assert!(supports_all_extensions(&available, REQUIRED_DEVICE_EXTENSIONS));

        let missing = [extension("VK_EXT_mesh_shader")];
        assert!(!supports_all_extensions(&missing, REQUIRED_DEVICE_EXTENSIONS));
        assert!(!supports_all_extensions(&[], REQUIRED_DEVICE_EXTENSIONS));
    }
}
