//! Vulkan physical and logical device selection.

use ash::vk;

use crate::error::GraphicsError;

/// Select the best physical device supporting timeline semaphores.
///
/// Discrete GPUs are preferred over integrated ones, larger texture limits
/// break ties.
pub fn select_physical_device(
    instance: &ash::Instance,
) -> Result<vk::PhysicalDevice, GraphicsError> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to enumerate physical devices: {e:?}"))
    })?;

    if devices.is_empty() {
        return Err(GraphicsError::InitializationFailed(
            "No Vulkan-capable GPU found".to_string(),
        ));
    }

    let mut best = None;
    let mut best_score = 0;

    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if properties.api_version < super::instance::REQUIRED_API_VERSION
            || !supports_timeline_semaphores(instance, device)
        {
            log::info!("Skipping GPU {name:?}: no Vulkan 1.2 timeline semaphores");
            continue;
        }

        let mut score = 1;
        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 1000;
        } else if properties.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU {
            score += 100;
        }
        score += properties.limits.max_image_dimension2_d / 1024;

        log::info!(
            "Found GPU: {name:?} (type: {:?}, score: {score})",
            properties.device_type
        );

        if score > best_score {
            best_score = score;
            best = Some(device);
        }
    }

    best.ok_or_else(|| GraphicsError::InitializationFailed("No suitable GPU found".to_string()))
}

fn supports_timeline_semaphores(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let mut vulkan_12 = vk::PhysicalDeviceVulkan12Features::default();
    let mut features = vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan_12);
    unsafe { instance.get_physical_device_features2(device, &mut features) };
    vulkan_12.timeline_semaphore == vk::TRUE
}

/// Find a queue family that supports graphics, and therefore transfer, work.
pub fn find_graphics_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32, GraphicsError> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|index| index as u32)
        .ok_or_else(|| {
            GraphicsError::InitializationFailed("No graphics queue family found".to_string())
        })
}

/// Create the logical device with a single queue and timeline semaphores.
pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<ash::Device, GraphicsError> {
    let queue_priorities = [1.0f32];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(&queue_priorities)];

    #[allow(unused_mut)]
    let mut extensions: Vec<*const std::ffi::c_char> = Vec::new();
    #[cfg(target_os = "macos")]
    extensions.push(ash::khr::portability_subset::NAME.as_ptr());

    let mut vulkan_12 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extensions)
        .push_next(&mut vulkan_12);

    unsafe { instance.create_device(physical_device, &create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create logical device: {e:?}"))
    })
}
