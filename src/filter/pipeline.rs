//! Vulkan objects behind a filter: sampler, descriptor set layout, pipeline and the
//! optional descriptor buffer.
//!
//! Note: Vulkan p_next chaining requires creating default structs and then assigning p_next,
//! which triggers clippy::field_reassign_with_default. This is the correct pattern for Vulkan.
#![allow(clippy::field_reassign_with_default)]

use super::record::PushConstants;
use super::{BindingModel, FilterConfig};
use crate::compiler::SHADER_ENTRY_POINT;
use crate::error::{Result, YuvForgeError};
use crate::shader::{BindingPlan, DescriptorKind, PARAMS_BINDING};
use crate::vulkan::{find_memory_type, DeviceContext};
use ash::vk;
use std::ffi::CString;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Round `value` up to a multiple of `alignment` (any non-zero alignment).
pub(crate) fn align_up(value: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

/// Host mapping of the descriptor buffer memory.
pub(crate) struct MappedMemory {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping stays valid until the owning `DescriptorStorage` is destroyed, and all
// access goes through the `Mutex` in `DescriptorStorage`.
unsafe impl Send for MappedMemory {}

impl MappedMemory {
    /// Mutable view of `len` bytes at `offset`, bounds checked.
    pub(crate) fn slice_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        let end = offset.checked_add(len).filter(|&end| end <= self.len).ok_or_else(|| {
            YuvForgeError::InvalidInput(format!(
                "descriptor write [{}, {}) outside mapped range of {} bytes",
                offset,
                offset + len,
                self.len
            ))
        })?;
        // SAFETY: [offset, end) lies inside the live mapping and `&mut self` is exclusive.
        Ok(unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset), end - offset) })
    }
}

/// Host-visible descriptor buffer with one slot per frame in flight.
pub(crate) struct DescriptorStorage {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub address: vk::DeviceAddress,
    pub usage: vk::BufferUsageFlags,
    /// Bytes per frame slot, aligned to the device's offset alignment.
    pub slot_size: vk::DeviceSize,
    /// Offset of each binding inside a slot.
    pub binding_offsets: Vec<(u32, vk::DeviceSize)>,
    mapped: Mutex<MappedMemory>,
}

impl DescriptorStorage {
    pub(crate) fn binding_offset(&self, binding: u32) -> Result<vk::DeviceSize> {
        self.binding_offsets
            .iter()
            .find(|(b, _)| *b == binding)
            .map(|(_, offset)| *offset)
            .ok_or_else(|| {
                YuvForgeError::InvalidInput(format!("binding {} not in descriptor layout", binding))
            })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, MappedMemory> {
        self.mapped.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// All Vulkan objects owned by one filter. Null handles are skipped on destroy.
#[derive(Default)]
pub(crate) struct PipelineObjects {
    pub ycbcr_conversion: Option<vk::SamplerYcbcrConversion>,
    pub sampler: Option<vk::Sampler>,
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub descriptor_storage: Option<DescriptorStorage>,
}

impl PipelineObjects {
    /// Destroy everything that was created.
    ///
    /// # Safety
    /// The objects must not be in use by pending GPU work.
    pub(crate) unsafe fn destroy(&mut self, device: &ash::Device) {
        if let Some(storage) = self.descriptor_storage.take() {
            device.unmap_memory(storage.memory);
            device.destroy_buffer(storage.buffer, None);
            device.free_memory(storage.memory, None);
        }
        if self.pipeline != vk::Pipeline::null() {
            device.destroy_pipeline(self.pipeline, None);
        }
        if self.pipeline_layout != vk::PipelineLayout::null() {
            device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
        if self.descriptor_set_layout != vk::DescriptorSetLayout::null() {
            device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        }
        if let Some(sampler) = self.sampler.take() {
            device.destroy_sampler(sampler, None);
        }
        if let Some(conversion) = self.ycbcr_conversion.take() {
            device.destroy_sampler_ycbcr_conversion(conversion, None);
        }
        self.pipeline = vk::Pipeline::null();
        self.pipeline_layout = vk::PipelineLayout::null();
        self.descriptor_set_layout = vk::DescriptorSetLayout::null();
    }
}

/// Create the pipeline objects for a validated configuration and its compiled shader.
pub(crate) fn create_pipeline(
    context: &DeviceContext,
    config: &FilterConfig,
    plan: &BindingPlan,
    spirv: &[u32],
) -> Result<PipelineObjects> {
    let mut objects = PipelineObjects::default();
    match build(context, config, plan, spirv, &mut objects) {
        Ok(()) => Ok(objects),
        Err(e) => {
            unsafe { objects.destroy(context.device()) };
            Err(e)
        }
    }
}

fn build(
    context: &DeviceContext,
    config: &FilterConfig,
    plan: &BindingPlan,
    spirv: &[u32],
    objects: &mut PipelineObjects,
) -> Result<()> {
    let device = context.device();

    if config.uses_ycbcr_sampler() {
        create_ycbcr_sampler(device, config, objects)?;
    }

    // Create descriptor set layout.
    let immutable_samplers: Vec<vk::Sampler> = objects.sampler.into_iter().collect();
    let mut bindings: Vec<vk::DescriptorSetLayoutBinding> = plan
        .slots()
        .iter()
        .map(|slot| {
            let binding = vk::DescriptorSetLayoutBinding::default()
                .binding(slot.binding)
                .descriptor_type(slot.kind.descriptor_type())
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::COMPUTE);
            if slot.kind == DescriptorKind::CombinedImageSampler {
                binding.immutable_samplers(&immutable_samplers)
            } else {
                binding
            }
        })
        .collect();
    // Reserved parameter block.
    bindings.push(
        vk::DescriptorSetLayoutBinding::default()
            .binding(PARAMS_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::COMPUTE),
    );

    let layout_flags = match config.binding_model {
        BindingModel::PushDescriptor => vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR,
        BindingModel::DescriptorBuffer => {
            vk::DescriptorSetLayoutCreateFlags::DESCRIPTOR_BUFFER_EXT
        }
    };
    let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
        .flags(layout_flags)
        .bindings(&bindings);

    objects.descriptor_set_layout =
        unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(|e| YuvForgeError::ResourceCreation(e.to_string()))?;

    // Create pipeline layout with push constants.
    let push_constant_range = vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::COMPUTE)
        .offset(0)
        .size(std::mem::size_of::<PushConstants>() as u32);

    let pipeline_layout_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(std::slice::from_ref(&objects.descriptor_set_layout))
        .push_constant_ranges(std::slice::from_ref(&push_constant_range));

    objects.pipeline_layout = unsafe { device.create_pipeline_layout(&pipeline_layout_info, None) }
        .map_err(|e| YuvForgeError::ResourceCreation(e.to_string()))?;

    // Create compute shader module.
    let shader_info = vk::ShaderModuleCreateInfo::default().code(spirv);
    let shader_module = unsafe { device.create_shader_module(&shader_info, None) }
        .map_err(|e| YuvForgeError::ResourceCreation(e.to_string()))?;

    // Create compute pipeline.
    let entry_point = CString::new(SHADER_ENTRY_POINT)
        .map_err(|e| YuvForgeError::ResourceCreation(e.to_string()))?;
    let stage_info = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(shader_module)
        .name(&entry_point);

    let pipeline_flags = match config.binding_model {
        BindingModel::PushDescriptor => vk::PipelineCreateFlags::empty(),
        BindingModel::DescriptorBuffer => vk::PipelineCreateFlags::DESCRIPTOR_BUFFER_EXT,
    };
    let pipeline_info = vk::ComputePipelineCreateInfo::default()
        .flags(pipeline_flags)
        .stage(stage_info)
        .layout(objects.pipeline_layout);

    let pipeline = unsafe {
        device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    };

    // Destroy shader module (no longer needed after pipeline creation)
    unsafe { device.destroy_shader_module(shader_module, None) };

    objects.pipeline = pipeline.map_err(|(_, e)| YuvForgeError::ResourceCreation(e.to_string()))?[0];

    if config.binding_model == BindingModel::DescriptorBuffer {
        objects.descriptor_storage = Some(create_descriptor_storage(
            context,
            objects.descriptor_set_layout,
            plan,
            config.max_frames,
        )?);
    }

    debug!(
        "Created {:?} pipeline with {} bindings ({:?})",
        config.filter_type,
        bindings.len(),
        config.binding_model
    );
    Ok(())
}

fn create_ycbcr_sampler(
    device: &ash::Device,
    config: &FilterConfig,
    objects: &mut PipelineObjects,
) -> Result<()> {
    let color = config.color.ok_or_else(|| {
        YuvForgeError::UnsupportedConfiguration(
            "the YCbCr sampler needs color conversion info".to_string(),
        )
    })?;

    // Nearest filtering everywhere keeps the sampler valid for every format.
    let conversion_info = vk::SamplerYcbcrConversionCreateInfo::default()
        .format(config.input_format)
        .ycbcr_model(color.model.into())
        .ycbcr_range(color.input_range.into())
        .components(vk::ComponentMapping::default())
        .x_chroma_offset(vk::ChromaLocation::MIDPOINT)
        .y_chroma_offset(vk::ChromaLocation::MIDPOINT)
        .chroma_filter(vk::Filter::NEAREST)
        .force_explicit_reconstruction(false);

    let conversion = unsafe { device.create_sampler_ycbcr_conversion(&conversion_info, None) }
        .map_err(|e| YuvForgeError::ResourceCreation(e.to_string()))?;
    objects.ycbcr_conversion = Some(conversion);

    let mut conversion_link = vk::SamplerYcbcrConversionInfo::default().conversion(conversion);
    let mut sampler_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::NEAREST)
        .min_filter(vk::Filter::NEAREST)
        .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .unnormalized_coordinates(false);
    sampler_info.p_next = (&mut conversion_link as *mut vk::SamplerYcbcrConversionInfo).cast();

    let sampler = unsafe { device.create_sampler(&sampler_info, None) }
        .map_err(|e| YuvForgeError::ResourceCreation(e.to_string()))?;
    objects.sampler = Some(sampler);
    Ok(())
}

fn create_descriptor_storage(
    context: &DeviceContext,
    layout: vk::DescriptorSetLayout,
    plan: &BindingPlan,
    max_frames: u32,
) -> Result<DescriptorStorage> {
    let device = context.device();
    let loader = context.descriptor_buffer().ok_or_else(|| {
        YuvForgeError::UnsupportedConfiguration("VK_EXT_descriptor_buffer is not enabled".to_string())
    })?;
    let props = context.capabilities().descriptor_buffer.ok_or_else(|| {
        YuvForgeError::UnsupportedConfiguration("VK_EXT_descriptor_buffer is not enabled".to_string())
    })?;

    let layout_size = unsafe { loader.get_descriptor_set_layout_size(layout) };
    let slot_size = align_up(layout_size, props.offset_alignment);
    let binding_offsets = plan
        .slots()
        .iter()
        .map(|slot| {
            let offset = unsafe { loader.get_descriptor_set_layout_binding_offset(layout, slot.binding) };
            (slot.binding, offset)
        })
        .collect();

    let size = slot_size * max_frames as vk::DeviceSize;
    let usage = vk::BufferUsageFlags::RESOURCE_DESCRIPTOR_BUFFER_EXT
        | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;

    let (buffer, memory) = create_buffer(
        device,
        context.memory_properties(),
        size,
        usage,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        vk::MemoryAllocateFlags::DEVICE_ADDRESS,
    )?;

    let ptr = unsafe { device.map_memory(memory, 0, size, vk::MemoryMapFlags::empty()) }
        .map_err(|e| YuvForgeError::MemoryAllocation(e.to_string()))
        .and_then(|ptr| {
            NonNull::new(ptr.cast::<u8>()).ok_or_else(|| {
                YuvForgeError::MemoryAllocation("descriptor buffer mapped to null".to_string())
            })
        });
    let ptr = match ptr {
        Ok(ptr) => ptr,
        Err(e) => {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(e);
        }
    };

    let address_info = vk::BufferDeviceAddressInfo::default().buffer(buffer);
    let address = unsafe { device.get_buffer_device_address(&address_info) };

    debug!(
        "Descriptor buffer: {} slots of {} bytes at {:#x}",
        max_frames, slot_size, address
    );

    Ok(DescriptorStorage {
        buffer,
        memory,
        address,
        usage,
        slot_size,
        binding_offsets,
        mapped: Mutex::new(MappedMemory {
            ptr,
            len: size as usize,
        }),
    })
}

/// Create a buffer with associated memory.
fn create_buffer(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
    allocate_flags: vk::MemoryAllocateFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let buffer_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.create_buffer(&buffer_info, None) }
        .map_err(|e| YuvForgeError::ResourceCreation(format!("buffer creation: {}", e)))?;

    let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

    let Some(memory_type_index) = find_memory_type(
        memory_properties,
        mem_requirements.memory_type_bits,
        properties,
    ) else {
        unsafe { device.destroy_buffer(buffer, None) };
        return Err(YuvForgeError::MemoryAllocation(format!(
            "No suitable memory type for buffer with properties {:?}",
            properties
        )));
    };

    let mut flags_info = vk::MemoryAllocateFlagsInfo::default().flags(allocate_flags);
    let mut alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(mem_requirements.size)
        .memory_type_index(memory_type_index);
    if !allocate_flags.is_empty() {
        alloc_info.p_next = (&mut flags_info as *mut vk::MemoryAllocateFlagsInfo).cast();
    }

    let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
        Ok(memory) => memory,
        Err(e) => {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(YuvForgeError::MemoryAllocation(e.to_string()));
        }
    };

    if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
        unsafe {
            device.destroy_buffer(buffer, None);
            device.free_memory(memory, None);
        }
        return Err(YuvForgeError::MemoryAllocation(e.to_string()));
    }

    Ok((buffer, memory))
}
