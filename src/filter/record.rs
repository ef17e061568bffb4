//! Per-frame command recording: descriptor writes, push constants and the dispatch.

use super::{BindingModel, FilterConfig, ResourceKind, YuvFilter};
use crate::error::{Result, YuvForgeError};
use crate::format::{resolve_format, BufferLayout, FormatLayout};
use crate::shader::{BindingPlan, BindingRole, PlaneSlot, WORKGROUP_SIZE};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use tracing::trace;

/// An image the filter reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResource {
    /// The image itself. Only used by transfers.
    pub image: vk::Image,
    /// Format the image was created with.
    pub format: vk::Format,
    /// View of the whole image. Used for single-plane formats and for sampling through the
    /// YCbCr conversion sampler.
    pub view: vk::ImageView,
    /// One view per memory plane of a multi-planar image, in plane order.
    pub plane_views: Vec<vk::ImageView>,
    /// Layout the image is in when the dispatch executes.
    pub layout: vk::ImageLayout,
    /// Luma extent.
    pub extent: vk::Extent2D,
    /// Array layer to read or write.
    pub layer: u32,
}

/// Offset and row pitch of one plane inside a buffer, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferPlane {
    pub offset: vk::DeviceSize,
    pub row_pitch: vk::DeviceSize,
}

/// A linear buffer the filter reads or writes.
///
/// Buffers carry no layout of their own, so the plane offsets and pitches travel with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferResource {
    pub buffer: vk::Buffer,
    /// Format of the picture stored in the buffer.
    pub format: vk::Format,
    /// Bytes of the buffer the descriptor exposes, starting at 0.
    pub size: vk::DeviceSize,
    /// Per-plane placement in memory-plane order.
    pub planes: Vec<BufferPlane>,
    /// Luma extent of the stored picture.
    pub extent: vk::Extent2D,
}

impl BufferResource {
    /// Describe `buffer` as holding a picture laid out as `layout`.
    pub fn from_layout(buffer: vk::Buffer, layout: &BufferLayout, extent: vk::Extent2D) -> Self {
        Self {
            buffer,
            format: layout.format,
            size: layout.total_size(),
            planes: layout
                .planes
                .iter()
                .map(|p| BufferPlane {
                    offset: p.offset,
                    row_pitch: p.row_pitch,
                })
                .collect(),
            extent,
        }
    }
}

/// Either side of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResource<'a> {
    Image(&'a ImageResource),
    Buffer(&'a BufferResource),
}

impl FilterResource<'_> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            FilterResource::Image(_) => ResourceKind::Image,
            FilterResource::Buffer(_) => ResourceKind::Buffer,
        }
    }

    pub fn format(&self) -> vk::Format {
        match self {
            FilterResource::Image(image) => image.format,
            FilterResource::Buffer(buffer) => buffer.format,
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        match self {
            FilterResource::Image(image) => image.extent,
            FilterResource::Buffer(buffer) => buffer.extent,
        }
    }

    fn layer(&self) -> u32 {
        match self {
            FilterResource::Image(image) => image.layer,
            FilterResource::Buffer(_) => 0,
        }
    }
}

/// Auxiliary 2x2 box-filtered luma output. Same format as the output Y plane, half the extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsampledLuma {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
}

/// Everything one dispatch touches.
#[derive(Debug, Clone, Copy)]
pub struct DispatchInvocation<'a> {
    /// Absent for clear filters.
    pub input: Option<FilterResource<'a>>,
    pub output: FilterResource<'a>,
    pub subsampled_y: Option<&'a SubsampledLuma>,
}

// ============================================================================
// Push constants
// ============================================================================

/// Push constant block shared with the generated shader. Offsets and pitches are in bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct PushConstants {
    pub src_layer: u32,
    pub dst_layer: u32,
    pub input_width: u32,
    pub input_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub half_input_width: u32,
    pub half_input_height: u32,
    pub half_output_width: u32,
    pub half_output_height: u32,
    pub in_y_offset: u32,
    pub in_cb_offset: u32,
    pub in_cr_offset: u32,
    pub in_y_pitch: u32,
    pub in_cb_pitch: u32,
    pub in_cr_pitch: u32,
    pub out_y_offset: u32,
    pub out_cb_offset: u32,
    pub out_cr_offset: u32,
    pub out_y_pitch: u32,
    pub out_cb_pitch: u32,
    pub out_cr_pitch: u32,
}

fn to_u32(value: vk::DeviceSize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| YuvForgeError::InvalidInput(format!("{} {} does not fit in 32 bits", what, value)))
}

/// Offsets and pitches of up to three planes; missing planes stay zero.
fn plane_words(resource: Option<FilterResource<'_>>) -> Result<[(u32, u32); 3]> {
    let mut words = [(0, 0); 3];
    if let Some(FilterResource::Buffer(buffer)) = resource {
        for (slot, plane) in words.iter_mut().zip(&buffer.planes) {
            *slot = (
                to_u32(plane.offset, "plane offset")?,
                to_u32(plane.row_pitch, "row pitch")?,
            );
        }
    }
    Ok(words)
}

impl PushConstants {
    /// Fill the block from the resources of one dispatch.
    pub fn new(invocation: &DispatchInvocation<'_>) -> Result<Self> {
        let output = invocation.output.extent();
        let input = invocation
            .input
            .map(|i| i.extent())
            .unwrap_or(vk::Extent2D { width: 0, height: 0 });
        let [in_y, in_cb, in_cr] = plane_words(invocation.input)?;
        let [out_y, out_cb, out_cr] = plane_words(Some(invocation.output))?;

        Ok(Self {
            src_layer: invocation.input.map(|i| i.layer()).unwrap_or(0),
            dst_layer: invocation.output.layer(),
            input_width: input.width,
            input_height: input.height,
            output_width: output.width,
            output_height: output.height,
            half_input_width: input.width.div_ceil(2),
            half_input_height: input.height.div_ceil(2),
            half_output_width: output.width.div_ceil(2),
            half_output_height: output.height.div_ceil(2),
            in_y_offset: in_y.0,
            in_cb_offset: in_cb.0,
            in_cr_offset: in_cr.0,
            in_y_pitch: in_y.1,
            in_cb_pitch: in_cb.1,
            in_cr_pitch: in_cr.1,
            out_y_offset: out_y.0,
            out_cb_offset: out_cb.0,
            out_cr_offset: out_cr.0,
            out_y_pitch: out_y.1,
            out_cb_pitch: out_cb.1,
            out_cr_pitch: out_cr.1,
        })
    }
}

/// Workgroup counts for an output of `width` x `height` luma samples.
///
/// Each invocation covers a 2x2 luma block, so the grid spans the half-resolution extent.
pub fn dispatch_size(width: u32, height: u32) -> (u32, u32) {
    (
        width.div_ceil(2).div_ceil(WORKGROUP_SIZE),
        height.div_ceil(2).div_ceil(WORKGROUP_SIZE),
    )
}

// ============================================================================
// Resource checks
// ============================================================================

fn mismatch(side: &str, what: String) -> YuvForgeError {
    YuvForgeError::ResourceMismatch(format!("{}: {}", side, what))
}

fn check_resource(
    side: &str,
    resource: FilterResource<'_>,
    kind: ResourceKind,
    format: vk::Format,
    sampled: bool,
) -> Result<()> {
    if resource.kind() != kind {
        return Err(mismatch(
            side,
            format!("expected {:?}, got {:?}", kind, resource.kind()),
        ));
    }
    if resource.format() != format {
        return Err(mismatch(
            side,
            format!("expected {:?}, got {:?}", format, resource.format()),
        ));
    }
    let extent = resource.extent();
    if extent.width == 0 || extent.height == 0 {
        return Err(YuvForgeError::InvalidInput(format!(
            "{} extent {}x{} is empty",
            side, extent.width, extent.height
        )));
    }

    let layout = resolve_format(format)?;
    match resource {
        FilterResource::Image(image) => {
            let whole_view = sampled || layout.multi_plane().is_none();
            if whole_view {
                if image.view == vk::ImageView::null() {
                    return Err(mismatch(side, "missing image view".to_string()));
                }
            } else if image.plane_views.len() != layout.plane_count() as usize {
                return Err(mismatch(
                    side,
                    format!(
                        "{} plane views for a {}-plane format",
                        image.plane_views.len(),
                        layout.plane_count()
                    ),
                ));
            }
        }
        FilterResource::Buffer(buffer) => check_buffer(side, buffer, &layout)?,
    }
    Ok(())
}

fn check_buffer(side: &str, buffer: &BufferResource, layout: &FormatLayout) -> Result<()> {
    if buffer.planes.len() != layout.plane_count() as usize {
        return Err(mismatch(
            side,
            format!(
                "{} buffer planes for a {}-plane format",
                buffer.planes.len(),
                layout.plane_count()
            ),
        ));
    }

    let extent = buffer.extent;
    let geometry: Vec<(u32, u32, u32)> = match layout {
        FormatLayout::SinglePlane(f) => vec![(extent.width, extent.height, f.bytes_per_pixel)],
        FormatLayout::MultiPlane(d) => d
            .planes()
            .iter()
            .map(|&plane| {
                let (w, h) = d.plane_extent(plane, extent.width, extent.height);
                (w, h, d.plane_bytes_per_texel(plane))
            })
            .collect(),
    };
    let element_bytes = match layout {
        FormatLayout::SinglePlane(f) => vk::DeviceSize::from(f.container_bits() / 8),
        FormatLayout::MultiPlane(d) => vk::DeviceSize::from(d.bytes_per_sample()),
    };

    for (index, (plane, (width, height, texel))) in buffer.planes.iter().zip(geometry).enumerate() {
        if plane.offset % element_bytes != 0 || plane.row_pitch % element_bytes != 0 {
            return Err(YuvForgeError::InvalidInput(format!(
                "{} plane {}: offset {} and pitch {} must be multiples of {}",
                side, index, plane.offset, plane.row_pitch, element_bytes
            )));
        }
        let row_bytes = vk::DeviceSize::from(width) * vk::DeviceSize::from(texel);
        if plane.row_pitch < row_bytes {
            return Err(YuvForgeError::InvalidInput(format!(
                "{} plane {}: row pitch {} below row size {}",
                side, index, plane.row_pitch, row_bytes
            )));
        }
        let end = plane.offset + plane.row_pitch * vk::DeviceSize::from(height - 1) + row_bytes;
        if end > buffer.size {
            return Err(YuvForgeError::InvalidInput(format!(
                "{} plane {} ends at {} past buffer size {}",
                side, index, end, buffer.size
            )));
        }
    }
    Ok(())
}

/// Check that the resources of a dispatch have the shape `config` was built for.
pub(crate) fn check_invocation(config: &FilterConfig, invocation: &DispatchInvocation<'_>) -> Result<()> {
    match (config.has_input(), invocation.input) {
        (true, Some(input)) => {
            check_resource(
                "input",
                input,
                config.input_kind,
                config.input_format,
                config.uses_ycbcr_sampler(),
            )?;
            let (src, dst) = (input.extent(), invocation.output.extent());
            if src.width < dst.width || src.height < dst.height {
                return Err(YuvForgeError::InvalidInput(format!(
                    "input extent {}x{} is smaller than output extent {}x{}",
                    src.width, src.height, dst.width, dst.height
                )));
            }
        }
        (true, None) => return Err(mismatch("input", "missing".to_string())),
        (false, Some(_)) => {
            return Err(mismatch("input", "clear filters take no input".to_string()))
        }
        (false, None) => {}
    }

    check_resource(
        "output",
        invocation.output,
        config.output_kind,
        config.output_format,
        false,
    )?;

    let wants_aux = config.flags.contains(super::FilterFlags::ENABLE_Y_SUBSAMPLING);
    match (wants_aux, invocation.subsampled_y) {
        (true, None) => Err(mismatch("subsampled luma", "missing".to_string())),
        (false, Some(_)) => Err(mismatch(
            "subsampled luma",
            "filter was built without Y subsampling".to_string(),
        )),
        _ => Ok(()),
    }
}

// ============================================================================
// Descriptors
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub(crate) enum DescriptorInfo {
    Image(vk::DescriptorImageInfo),
    Buffer(vk::DescriptorBufferInfo),
}

/// One descriptor to write, keyed by binding index.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DescriptorWrite {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub info: DescriptorInfo,
}

impl DescriptorWrite {
    fn write_set(&self) -> vk::WriteDescriptorSet<'_> {
        let write = vk::WriteDescriptorSet::default()
            .dst_binding(self.binding)
            .descriptor_type(self.ty);
        match &self.info {
            DescriptorInfo::Image(info) => write.image_info(std::slice::from_ref(info)),
            DescriptorInfo::Buffer(info) => write.buffer_info(std::slice::from_ref(info)),
        }
    }
}

fn image_info(view: vk::ImageView, layout: vk::ImageLayout) -> DescriptorInfo {
    DescriptorInfo::Image(
        vk::DescriptorImageInfo::default()
            .image_view(view)
            .image_layout(layout),
    )
}

fn resource_info(resource: FilterResource<'_>, slot: PlaneSlot) -> Result<DescriptorInfo> {
    match (resource, slot) {
        (FilterResource::Image(image), PlaneSlot::Combined) => Ok(image_info(image.view, image.layout)),
        (FilterResource::Image(image), PlaneSlot::Plane(plane)) => image
            .plane_views
            .get(plane.index())
            .map(|&view| image_info(view, image.layout))
            .ok_or_else(|| mismatch("image", format!("no view for plane {:?}", plane))),
        // Every plane binds the whole buffer; the plane offsets come from push constants.
        (FilterResource::Buffer(buffer), _) => Ok(DescriptorInfo::Buffer(
            vk::DescriptorBufferInfo::default()
                .buffer(buffer.buffer)
                .offset(0)
                .range(buffer.size),
        )),
    }
}

/// Descriptor writes for every binding in `plan`, in plan order.
pub(crate) fn collect_descriptors(
    plan: &BindingPlan,
    invocation: &DispatchInvocation<'_>,
) -> Result<Vec<DescriptorWrite>> {
    plan.slots()
        .iter()
        .map(|slot| {
            let info = match slot.role {
                BindingRole::Input(plane) => {
                    let input = invocation
                        .input
                        .ok_or_else(|| mismatch("input", "missing".to_string()))?;
                    resource_info(input, plane)?
                }
                BindingRole::Output(plane) => resource_info(invocation.output, plane)?,
                BindingRole::SubsampledY => {
                    let aux = invocation
                        .subsampled_y
                        .ok_or_else(|| mismatch("subsampled luma", "missing".to_string()))?;
                    image_info(aux.view, aux.layout)
                }
            };
            Ok(DescriptorWrite {
                binding: slot.binding,
                ty: slot.kind.descriptor_type(),
                info,
            })
        })
        .collect()
}

// ============================================================================
// Recording
// ============================================================================

impl YuvFilter {
    /// Record one dispatch of the filter into `cmd`.
    ///
    /// `frame_index` selects the descriptor buffer slot; recordings that may be in flight at
    /// the same time must use different indices. The command buffer must be recording and
    /// the resources must already be in the layouts given.
    pub fn record(
        &self,
        cmd: vk::CommandBuffer,
        frame_index: u32,
        invocation: &DispatchInvocation<'_>,
    ) -> Result<()> {
        if frame_index >= self.config.max_frames {
            return Err(YuvForgeError::InvalidInput(format!(
                "frame index {} out of range for {} frames",
                frame_index, self.config.max_frames
            )));
        }
        check_invocation(&self.config, invocation)?;

        let push_constants = PushConstants::new(invocation)?;
        let descriptors = collect_descriptors(&self.plan, invocation)?;
        let device = self.context.device();

        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.objects.pipeline);
        }

        match self.config.binding_model {
            BindingModel::PushDescriptor => {
                let writes: Vec<vk::WriteDescriptorSet> =
                    descriptors.iter().map(DescriptorWrite::write_set).collect();
                unsafe {
                    self.context.push_descriptor().cmd_push_descriptor_set(
                        cmd,
                        vk::PipelineBindPoint::COMPUTE,
                        self.objects.pipeline_layout,
                        0,
                        &writes,
                    );
                }
            }
            BindingModel::DescriptorBuffer => {
                self.bind_descriptor_buffer(cmd, frame_index, &descriptors)?
            }
        }

        let output = invocation.output.extent();
        let (groups_x, groups_y) = dispatch_size(output.width, output.height);
        unsafe {
            device.cmd_push_constants(
                cmd,
                self.objects.pipeline_layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytemuck::bytes_of(&push_constants),
            );
            device.cmd_dispatch(cmd, groups_x, groups_y, 1);
        }

        trace!(
            "Recorded {:?} dispatch {}x{} for {}x{} output (frame {}, {} descriptors)",
            self.config.filter_type,
            groups_x,
            groups_y,
            output.width,
            output.height,
            frame_index,
            descriptors.len()
        );
        Ok(())
    }

    /// Image to image dispatch.
    pub fn record_image_to_image(
        &self,
        cmd: vk::CommandBuffer,
        frame_index: u32,
        input: &ImageResource,
        output: &ImageResource,
        subsampled_y: Option<&SubsampledLuma>,
    ) -> Result<()> {
        self.record(
            cmd,
            frame_index,
            &DispatchInvocation {
                input: Some(FilterResource::Image(input)),
                output: FilterResource::Image(output),
                subsampled_y,
            },
        )
    }

    /// Buffer to image dispatch.
    pub fn record_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        frame_index: u32,
        input: &BufferResource,
        output: &ImageResource,
        subsampled_y: Option<&SubsampledLuma>,
    ) -> Result<()> {
        self.record(
            cmd,
            frame_index,
            &DispatchInvocation {
                input: Some(FilterResource::Buffer(input)),
                output: FilterResource::Image(output),
                subsampled_y,
            },
        )
    }

    /// Image to buffer dispatch.
    pub fn record_image_to_buffer(
        &self,
        cmd: vk::CommandBuffer,
        frame_index: u32,
        input: &ImageResource,
        output: &BufferResource,
        subsampled_y: Option<&SubsampledLuma>,
    ) -> Result<()> {
        self.record(
            cmd,
            frame_index,
            &DispatchInvocation {
                input: Some(FilterResource::Image(input)),
                output: FilterResource::Buffer(output),
                subsampled_y,
            },
        )
    }

    /// Buffer to buffer dispatch.
    pub fn record_buffer_to_buffer(
        &self,
        cmd: vk::CommandBuffer,
        frame_index: u32,
        input: &BufferResource,
        output: &BufferResource,
        subsampled_y: Option<&SubsampledLuma>,
    ) -> Result<()> {
        self.record(
            cmd,
            frame_index,
            &DispatchInvocation {
                input: Some(FilterResource::Buffer(input)),
                output: FilterResource::Buffer(output),
                subsampled_y,
            },
        )
    }

    /// Dispatch of a clear filter, which has no input.
    pub fn record_clear(
        &self,
        cmd: vk::CommandBuffer,
        frame_index: u32,
        output: FilterResource<'_>,
        subsampled_y: Option<&SubsampledLuma>,
    ) -> Result<()> {
        self.record(
            cmd,
            frame_index,
            &DispatchInvocation {
                input: None,
                output,
                subsampled_y,
            },
        )
    }

    /// Write the descriptors into this frame's slot and point the pipeline at it.
    fn bind_descriptor_buffer(
        &self,
        cmd: vk::CommandBuffer,
        frame_index: u32,
        descriptors: &[DescriptorWrite],
    ) -> Result<()> {
        let unavailable = || {
            YuvForgeError::UnsupportedConfiguration("descriptor buffer is not set up".to_string())
        };
        let storage = self.objects.descriptor_storage.as_ref().ok_or_else(unavailable)?;
        let loader = self.context.descriptor_buffer().ok_or_else(unavailable)?;
        let props = self
            .context
            .capabilities()
            .descriptor_buffer
            .ok_or_else(unavailable)?;
        let device = self.context.device();

        let slot_offset = storage.slot_size * vk::DeviceSize::from(frame_index);
        let mut mapped = storage.lock();
        for write in descriptors {
            let address_info;
            let (data, size) = match &write.info {
                DescriptorInfo::Image(info) => (
                    vk::DescriptorDataEXT {
                        p_storage_image: info,
                    },
                    props.storage_image_size,
                ),
                DescriptorInfo::Buffer(info) => {
                    let address = unsafe {
                        device.get_buffer_device_address(
                            &vk::BufferDeviceAddressInfo::default().buffer(info.buffer),
                        )
                    };
                    address_info = vk::DescriptorAddressInfoEXT::default()
                        .address(address + info.offset)
                        .range(info.range)
                        .format(vk::Format::UNDEFINED);
                    (
                        vk::DescriptorDataEXT {
                            p_storage_buffer: &address_info,
                        },
                        props.storage_buffer_size,
                    )
                }
            };
            let get_info = vk::DescriptorGetInfoEXT::default().ty(write.ty).data(data);
            let start = usize::try_from(slot_offset + storage.binding_offset(write.binding)?)
                .map_err(|_| YuvForgeError::InvalidInput("descriptor offset overflow".to_string()))?;
            let dst = mapped.slice_mut(start, size)?;
            unsafe { loader.get_descriptor(&get_info, dst) };
        }
        drop(mapped);

        let binding_info = vk::DescriptorBufferBindingInfoEXT::default()
            .address(storage.address)
            .usage(storage.usage);
        unsafe {
            loader.cmd_bind_descriptor_buffers(cmd, std::slice::from_ref(&binding_info));
            loader.cmd_set_descriptor_buffer_offsets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                self.objects.pipeline_layout,
                0,
                &[0],
                &[slot_offset],
            );
        }
        Ok(())
    }
}
