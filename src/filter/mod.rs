//! Compute filters over YCbCr and RGBA pictures.
//!
//! A [`YuvFilter`] is built once from a [`FilterConfig`]: the shader is generated and
//! compiled, and the descriptor set layout and compute pipeline are created. It is then
//! recorded once per frame against concrete images or buffers (see [`record`]).
//!
//! The filter is shared through an `Arc`; its Vulkan objects are destroyed when the last
//! owner drops it.

mod config;
mod pipeline;
pub mod record;

pub use config::{
    BindingModel, EdgeReplication, FilterConfig, FilterFlags, FilterType, ResourceKind,
};
pub use record::{
    dispatch_size, BufferPlane, BufferResource, DispatchInvocation, FilterResource,
    ImageResource, PushConstants, SubsampledLuma,
};

use crate::compiler::{ShaderCompiler, ShaderStage};
use crate::error::{Result, YuvForgeError};
use crate::shader::{BindingPlan, ShaderGenerator};
use crate::vulkan::{DeviceCapabilities, DeviceContext};
use ash::vk;
use pipeline::PipelineObjects;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Check that the device can run the filter described by `config` and `plan`.
pub(crate) fn check_device_support(
    config: &FilterConfig,
    plan: &BindingPlan,
    capabilities: &DeviceCapabilities,
) -> Result<()> {
    match config.binding_model {
        BindingModel::DescriptorBuffer => {
            if capabilities.descriptor_buffer.is_none() {
                return Err(YuvForgeError::UnsupportedConfiguration(
                    "descriptor buffer model needs VK_EXT_descriptor_buffer".to_string(),
                ));
            }
            if config.uses_ycbcr_sampler() {
                return Err(YuvForgeError::UnsupportedConfiguration(
                    "descriptor buffer model cannot use the immutable YCbCr sampler".to_string(),
                ));
            }
        }
        BindingModel::PushDescriptor => {
            // Plan bindings plus the reserved parameter block.
            let needed = plan.slots().len() as u32 + 1;
            if needed > capabilities.max_push_descriptors {
                return Err(YuvForgeError::UnsupportedConfiguration(format!(
                    "{} push descriptors needed, device allows {}",
                    needed, capabilities.max_push_descriptors
                )));
            }
        }
    }

    if config.uses_ycbcr_sampler() && !capabilities.sampler_ycbcr_conversion {
        return Err(YuvForgeError::UnsupportedConfiguration(
            "device lacks samplerYcbcrConversion".to_string(),
        ));
    }
    if plan.uses_buffer_elements(8) && !capabilities.storage_buffer_8bit {
        return Err(YuvForgeError::UnsupportedConfiguration(
            "device lacks 8-bit storage buffer access".to_string(),
        ));
    }
    if plan.uses_buffer_elements(16) && !capabilities.storage_buffer_16bit {
        return Err(YuvForgeError::UnsupportedConfiguration(
            "device lacks 16-bit storage buffer access".to_string(),
        ));
    }
    Ok(())
}

/// A compiled compute filter bound to one queue.
pub struct YuvFilter {
    context: DeviceContext,
    config: FilterConfig,
    plan: BindingPlan,
    shader_source: String,
    queue_family: u32,
    queue: vk::Queue,
    queue_lock: Mutex<()>,
    objects: PipelineObjects,
}

impl YuvFilter {
    /// Build a filter.
    ///
    /// Generates and compiles the shader, then creates the descriptor set layout, pipeline
    /// layout and compute pipeline. Fails without side effects when the configuration is
    /// invalid, the device lacks a needed capability, or compilation fails.
    pub fn create(
        context: &DeviceContext,
        queue_family: u32,
        queue_index: u32,
        compiler: &ShaderCompiler,
        config: FilterConfig,
    ) -> Result<Arc<Self>> {
        if config.max_frames == 0 {
            return Err(YuvForgeError::InvalidInput(
                "max_frames must be at least 1".to_string(),
            ));
        }

        let generator = ShaderGenerator::new(&config)?;
        check_device_support(&config, generator.bindings(), context.capabilities())?;
        let queue = context.queue(queue_family, queue_index)?;

        let shader = generator.generate()?;

        let name = format!("{:?}.comp", config.filter_type).to_lowercase();
        let spirv = compiler.compile(&shader.source, ShaderStage::Compute, &name)?;
        let objects = pipeline::create_pipeline(context, &config, &shader.bindings, &spirv)?;

        info!(
            "Created {:?} filter {:?} -> {:?} ({:?} -> {:?}, {} frames, {:?})",
            config.filter_type,
            config.input_format,
            config.output_format,
            config.input_kind,
            config.output_kind,
            config.max_frames,
            config.binding_model
        );

        Ok(Arc::new(Self {
            context: context.clone(),
            config,
            plan: shader.bindings,
            shader_source: shader.source,
            queue_family,
            queue,
            queue_lock: Mutex::new(()),
            objects,
        }))
    }

    /// The configuration the filter was built from.
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Bindings the shader declares and the recorder writes.
    pub fn bindings(&self) -> &BindingPlan {
        &self.plan
    }

    /// GLSL the pipeline was compiled from.
    pub fn shader_source(&self) -> &str {
        &self.shader_source
    }

    /// Get the device context.
    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.objects.pipeline
    }

    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.objects.pipeline_layout
    }

    pub fn descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.objects.descriptor_set_layout
    }

    /// Submit recorded command buffers to the filter's queue.
    ///
    /// Each wait semaphore blocks the compute shader stage. Does not wait for completion.
    pub fn submit(
        &self,
        command_buffers: &[vk::CommandBuffer],
        wait_semaphores: &[vk::Semaphore],
        signal_semaphores: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> Result<()> {
        let wait_stages = vec![vk::PipelineStageFlags::COMPUTE_SHADER; wait_semaphores.len()];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);

        let _guard = self.queue_lock.lock().unwrap_or_else(PoisonError::into_inner);
        unsafe {
            self.context
                .device()
                .queue_submit(self.queue, std::slice::from_ref(&submit_info), fence)
        }
        .map_err(YuvForgeError::Submission)
    }
}

impl Drop for YuvFilter {
    fn drop(&mut self) {
        unsafe { self.objects.destroy(self.context.device()) };
        debug!("Destroyed {:?} filter", self.config.filter_type);
    }
}
