//! Vulkan context for the compute filters.
//!
//! Note: Vulkan p_next chaining requires creating default structs and then assigning p_next,
//! which triggers clippy::field_reassign_with_default. This is the correct pattern for Vulkan.
#![allow(clippy::field_reassign_with_default)]

use crate::error::{Result, YuvForgeError};
use ash::vk;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;
use tracing::{debug, info, warn};

const VALIDATION_LAYER: &[u8] = b"VK_LAYER_KHRONOS_validation\0";

/// Builder for creating a DeviceContext.
#[must_use]
pub struct DeviceContextBuilder {
    app_name: String,
    app_version: (u32, u32, u32),
    enable_validation: bool,
    enable_descriptor_buffer: bool,
    compute_queue_count: u32,
}

impl Default for DeviceContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceContextBuilder {
    /// Create a new DeviceContextBuilder with default settings.
    pub fn new() -> Self {
        Self {
            app_name: "YuvForge".to_string(),
            app_version: (1, 0, 0),
            enable_validation: false,
            enable_descriptor_buffer: true,
            compute_queue_count: 1,
        }
    }

    /// Set the application name.
    pub fn app_name(mut self, name: &str) -> Self {
        self.app_name = name.to_string();
        self
    }

    /// Set the application version.
    pub fn app_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.app_version = (major, minor, patch);
        self
    }

    /// Enable or disable validation layers.
    pub fn enable_validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Enable `VK_EXT_descriptor_buffer` when the device has it (default: on).
    pub fn enable_descriptor_buffer(mut self, enable: bool) -> Self {
        self.enable_descriptor_buffer = enable;
        self
    }

    /// Number of queues to create in the compute family (clamped to what it offers).
    pub fn compute_queue_count(mut self, count: u32) -> Self {
        self.compute_queue_count = count.max(1);
        self
    }

    /// Build the DeviceContext.
    pub fn build(self) -> Result<DeviceContext> {
        DeviceContext::new(self)
    }
}

/// Descriptor sizes and alignment reported for `VK_EXT_descriptor_buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DescriptorBufferProperties {
    /// Required alignment of descriptor set offsets inside the buffer.
    pub offset_alignment: vk::DeviceSize,
    /// Bytes of one storage image descriptor.
    pub storage_image_size: usize,
    /// Bytes of one storage buffer descriptor.
    pub storage_buffer_size: usize,
    /// Bytes of one combined image sampler descriptor.
    pub combined_image_sampler_size: usize,
}

/// Optional device features the filters depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCapabilities {
    /// `samplerYcbcrConversion`, needed by the hardware sampler path.
    pub sampler_ycbcr_conversion: bool,
    /// 8-bit storage buffer access and `shaderInt8`, needed by 8-bit buffer planes.
    pub storage_buffer_8bit: bool,
    /// 16-bit storage buffer access and `shaderInt16`, needed by 16-bit buffer planes.
    pub storage_buffer_16bit: bool,
    /// Maximum descriptors in one push descriptor set.
    pub max_push_descriptors: u32,
    /// Present when `VK_EXT_descriptor_buffer` is enabled.
    pub descriptor_buffer: Option<DescriptorBufferProperties>,
}

/// Inner struct holding the actual Vulkan resources.
struct DeviceContextInner {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    push_descriptor: ash::khr::push_descriptor::Device,
    descriptor_buffer: Option<ash::ext::descriptor_buffer::Device>,
    compute_queue_family: u32,
    compute_queue_count: u32,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device_properties: vk::PhysicalDeviceProperties,
    capabilities: DeviceCapabilities,
}

impl Drop for DeviceContextInner {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Holds the Vulkan instance, device and compute queues.
///
/// This type is cheaply cloneable - clones share the same underlying Vulkan resources.
#[derive(Clone)]
pub struct DeviceContext {
    inner: Arc<DeviceContextInner>,
}

impl DeviceContext {
    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.inner.entry
    }

    /// Get the Vulkan instance.
    pub fn instance(&self) -> &ash::Instance {
        &self.inner.instance
    }

    /// Get the Vulkan device.
    pub fn device(&self) -> &ash::Device {
        &self.inner.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.inner.physical_device
    }

    /// Get the physical device properties.
    pub fn device_properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.inner.device_properties
    }

    /// Optional features detected and enabled on the device.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.inner.capabilities
    }

    /// Get the compute queue family index.
    pub fn compute_queue_family(&self) -> u32 {
        self.inner.compute_queue_family
    }

    /// Number of queues created in the compute family.
    pub fn compute_queue_count(&self) -> u32 {
        self.inner.compute_queue_count
    }

    /// Get a created queue.
    pub fn queue(&self, family: u32, index: u32) -> Result<vk::Queue> {
        if family != self.inner.compute_queue_family || index >= self.inner.compute_queue_count {
            return Err(YuvForgeError::InvalidInput(format!(
                "queue {}:{} was not created (compute family {} has {} queues)",
                family, index, self.inner.compute_queue_family, self.inner.compute_queue_count
            )));
        }
        Ok(unsafe { self.inner.device.get_device_queue(family, index) })
    }

    pub(crate) fn push_descriptor(&self) -> &ash::khr::push_descriptor::Device {
        &self.inner.push_descriptor
    }

    pub(crate) fn descriptor_buffer(&self) -> Option<&ash::ext::descriptor_buffer::Device> {
        self.inner.descriptor_buffer.as_ref()
    }

    pub(crate) fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.inner.memory_properties
    }

    /// Find a memory type that satisfies the requirements.
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        find_memory_type(&self.inner.memory_properties, type_filter, properties)
    }
}

/// Find a memory type index allowed by `type_filter` that has all of `properties`.
pub(crate) fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        (type_filter & (1 << i)) != 0
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties)
    })
}

/// Features a physical device offers that the filters can use.
struct SupportedFeatures {
    sampler_ycbcr_conversion: bool,
    storage_buffer_8bit: bool,
    shader_int8: bool,
    storage_buffer_16bit: bool,
    shader_int16: bool,
    buffer_device_address: bool,
    descriptor_buffer: bool,
    storage_image_extended_formats: bool,
    storage_image_write_without_format: bool,
}

impl DeviceContext {
    fn new(builder: DeviceContextBuilder) -> Result<Self> {
        // Load Vulkan.
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| YuvForgeError::InstanceCreation(e.to_string()))?;

        // Create instance.
        let app_name = CString::new(builder.app_name.clone())
            .map_err(|e| YuvForgeError::InvalidInput(format!("app name: {}", e)))?;
        let engine_name = CString::new("YuvForge")
            .map_err(|e| YuvForgeError::InvalidInput(format!("engine name: {}", e)))?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(
                0,
                builder.app_version.0,
                builder.app_version.1,
                builder.app_version.2,
            ))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let validation_layer = CStr::from_bytes_with_nul(VALIDATION_LAYER)
            .map_err(|e| YuvForgeError::InstanceCreation(e.to_string()))?;
        let mut layer_names: Vec<*const c_char> = Vec::new();
        if builder.enable_validation {
            layer_names.push(validation_layer.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|e| YuvForgeError::InstanceCreation(e.to_string()))?;

        info!("Created Vulkan instance");

        match Self::create_device(entry, instance.clone(), &builder) {
            Ok(context) => Ok(context),
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }

    fn create_device(
        entry: ash::Entry,
        instance: ash::Instance,
        builder: &DeviceContextBuilder,
    ) -> Result<Self> {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(|e| YuvForgeError::NoSuitableDevice(e.to_string()))?;

        let mut selected = None;
        for physical_device in physical_devices {
            let props = unsafe { instance.get_physical_device_properties(physical_device) };
            let device_name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
                .to_string_lossy()
                .to_string();
            debug!("Checking device: {}", device_name);

            if props.api_version < vk::API_VERSION_1_2 {
                debug!("Device {} is below Vulkan 1.2, skipping", device_name);
                continue;
            }

            let queue_families =
                unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

            // Prefer a compute-only family, otherwise any family with compute.
            let compute_family = queue_families
                .iter()
                .position(|q| {
                    q.queue_flags.contains(vk::QueueFlags::COMPUTE)
                        && !q.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                })
                .or_else(|| {
                    queue_families
                        .iter()
                        .position(|q| q.queue_flags.contains(vk::QueueFlags::COMPUTE))
                });
            let Some(family) = compute_family else {
                debug!("Device {} has no compute queue", device_name);
                continue;
            };

            let available_extensions = unsafe {
                instance
                    .enumerate_device_extension_properties(physical_device)
                    .unwrap_or_default()
            };
            let has_extension = |name: &CStr| -> bool {
                available_extensions.iter().any(|ext| {
                    let ext_name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
                    ext_name == name
                })
            };

            if !has_extension(ash::khr::push_descriptor::NAME) {
                debug!("Device {} lacks VK_KHR_push_descriptor", device_name);
                continue;
            }
            let descriptor_buffer = builder.enable_descriptor_buffer
                && has_extension(ash::ext::descriptor_buffer::NAME);

            info!("Selected device: {}", device_name);
            selected = Some((
                physical_device,
                family as u32,
                queue_families[family].queue_count,
                descriptor_buffer,
                props,
            ));
            break;
        }

        let (physical_device, compute_queue_family, family_queue_count, has_descriptor_buffer, device_properties) =
            selected.ok_or_else(|| {
                YuvForgeError::NoSuitableDevice(
                    "No Vulkan 1.2 device with compute and push descriptors found".to_string(),
                )
            })?;

        let supported =
            Self::query_features(&instance, physical_device, has_descriptor_buffer);
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let compute_queue_count = builder.compute_queue_count.min(family_queue_count);
        let queue_priorities = vec![1.0f32; compute_queue_count as usize];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(compute_queue_family)
            .queue_priorities(&queue_priorities)];

        let mut extension_names = vec![ash::khr::push_descriptor::NAME.as_ptr()];
        let descriptor_buffer_enabled = has_descriptor_buffer
            && supported.descriptor_buffer
            && supported.buffer_device_address;
        if descriptor_buffer_enabled {
            extension_names.push(ash::ext::descriptor_buffer::NAME.as_ptr());
        } else if builder.enable_descriptor_buffer {
            warn!("VK_EXT_descriptor_buffer not available, only push descriptors can be used");
        }

        // Enable what the device offers; generation checks the rest per filter.
        let mut features = vk::PhysicalDeviceFeatures::default();
        features.shader_int16 = supported.shader_int16.into();
        features.shader_storage_image_extended_formats =
            supported.storage_image_extended_formats.into();
        features.shader_storage_image_write_without_format =
            supported.storage_image_write_without_format.into();

        let mut vulkan11 = vk::PhysicalDeviceVulkan11Features::default()
            .sampler_ycbcr_conversion(supported.sampler_ycbcr_conversion)
            .storage_buffer16_bit_access(supported.storage_buffer_16bit);
        let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::default()
            .storage_buffer8_bit_access(supported.storage_buffer_8bit)
            .shader_int8(supported.shader_int8)
            .buffer_device_address(descriptor_buffer_enabled);
        let mut descriptor_buffer_features =
            vk::PhysicalDeviceDescriptorBufferFeaturesEXT::default().descriptor_buffer(true);

        // Chain: vulkan11 -> vulkan12 (-> descriptor buffer if enabled)
        if descriptor_buffer_enabled {
            vulkan12.p_next = (&mut descriptor_buffer_features
                as *mut vk::PhysicalDeviceDescriptorBufferFeaturesEXT)
                .cast();
        }
        vulkan11.p_next = (&mut vulkan12 as *mut vk::PhysicalDeviceVulkan12Features).cast();

        debug!("Enabling {} device extensions:", extension_names.len());
        for ext_name_ptr in &extension_names {
            let ext_name = unsafe { CStr::from_ptr(*ext_name_ptr) };
            debug!("  - {}", ext_name.to_string_lossy());
        }

        let mut device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);
        device_create_info.p_next =
            (&mut vulkan11 as *mut vk::PhysicalDeviceVulkan11Features).cast();

        let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }
            .map_err(|e| YuvForgeError::DeviceCreation(e.to_string()))?;

        let push_descriptor = ash::khr::push_descriptor::Device::new(&instance, &device);
        let descriptor_buffer = descriptor_buffer_enabled
            .then(|| ash::ext::descriptor_buffer::Device::new(&instance, &device));

        let (max_push_descriptors, descriptor_buffer_properties) =
            Self::query_properties(&instance, physical_device, descriptor_buffer_enabled);

        let capabilities = DeviceCapabilities {
            sampler_ycbcr_conversion: supported.sampler_ycbcr_conversion,
            storage_buffer_8bit: supported.storage_buffer_8bit && supported.shader_int8,
            storage_buffer_16bit: supported.storage_buffer_16bit && supported.shader_int16,
            max_push_descriptors,
            descriptor_buffer: descriptor_buffer_properties,
        };

        info!("Compute queue family: {} ({} queues)", compute_queue_family, compute_queue_count);
        info!("Created Vulkan device: {:?}", capabilities);

        Ok(Self {
            inner: Arc::new(DeviceContextInner {
                entry,
                instance,
                physical_device,
                device,
                push_descriptor,
                descriptor_buffer,
                compute_queue_family,
                compute_queue_count,
                memory_properties,
                device_properties,
                capabilities,
            }),
        })
    }

    fn query_features(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        with_descriptor_buffer: bool,
    ) -> SupportedFeatures {
        let mut vulkan11 = vk::PhysicalDeviceVulkan11Features::default();
        let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut descriptor_buffer = vk::PhysicalDeviceDescriptorBufferFeaturesEXT::default();

        if with_descriptor_buffer {
            vulkan12.p_next =
                (&mut descriptor_buffer as *mut vk::PhysicalDeviceDescriptorBufferFeaturesEXT)
                    .cast();
        }
        vulkan11.p_next = (&mut vulkan12 as *mut vk::PhysicalDeviceVulkan12Features).cast();
        let mut features2 = vk::PhysicalDeviceFeatures2::default();
        features2.p_next = (&mut vulkan11 as *mut vk::PhysicalDeviceVulkan11Features).cast();

        unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };

        let core = features2.features;
        SupportedFeatures {
            sampler_ycbcr_conversion: vulkan11.sampler_ycbcr_conversion == vk::TRUE,
            storage_buffer_8bit: vulkan12.storage_buffer8_bit_access == vk::TRUE,
            shader_int8: vulkan12.shader_int8 == vk::TRUE,
            storage_buffer_16bit: vulkan11.storage_buffer16_bit_access == vk::TRUE,
            shader_int16: core.shader_int16 == vk::TRUE,
            buffer_device_address: vulkan12.buffer_device_address == vk::TRUE,
            descriptor_buffer: with_descriptor_buffer
                && descriptor_buffer.descriptor_buffer == vk::TRUE,
            storage_image_extended_formats: core.shader_storage_image_extended_formats
                == vk::TRUE,
            storage_image_write_without_format: core.shader_storage_image_write_without_format
                == vk::TRUE,
        }
    }

    fn query_properties(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        with_descriptor_buffer: bool,
    ) -> (u32, Option<DescriptorBufferProperties>) {
        let mut push_props = vk::PhysicalDevicePushDescriptorPropertiesKHR::default();
        let mut descriptor_buffer_props =
            vk::PhysicalDeviceDescriptorBufferPropertiesEXT::default();

        if with_descriptor_buffer {
            push_props.p_next = (&mut descriptor_buffer_props
                as *mut vk::PhysicalDeviceDescriptorBufferPropertiesEXT)
                .cast();
        }
        let mut props2 = vk::PhysicalDeviceProperties2::default();
        props2.p_next = (&mut push_props as *mut vk::PhysicalDevicePushDescriptorPropertiesKHR).cast();

        unsafe { instance.get_physical_device_properties2(physical_device, &mut props2) };

        let descriptor_buffer = with_descriptor_buffer.then(|| DescriptorBufferProperties {
            offset_alignment: descriptor_buffer_props.descriptor_buffer_offset_alignment,
            storage_image_size: descriptor_buffer_props.storage_image_descriptor_size,
            storage_buffer_size: descriptor_buffer_props.storage_buffer_descriptor_size,
            combined_image_sampler_size: descriptor_buffer_props
                .combined_image_sampler_descriptor_size,
        });
        (push_props.max_push_descriptors, descriptor_buffer)
    }
}
