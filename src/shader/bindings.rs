//! Descriptor binding plan shared by the GLSL declarations and the recorder.
//!
//! Bindings 0..=3 belong to the input, 4..=7 to the output. A single-plane resource sits at
//! the base of its range; plane `i` of a multi-planar resource sits at `base + 1 + i`.
//! Binding 8 is reserved for a uniform parameter block and binding 9 receives the
//! subsampled luma plane.

use super::{ShaderContext, Side};
use crate::filter::ResourceKind;
use crate::format::{FormatLayout, Plane};
use ash::vk;
use std::fmt::Write;

/// First binding of the input range.
pub const INPUT_BINDING_BASE: u32 = 0;
/// First binding of the output range.
pub const OUTPUT_BINDING_BASE: u32 = 4;
/// Reserved uniform buffer binding.
pub const PARAMS_BINDING: u32 = 8;
/// Auxiliary subsampled luma output.
pub const SUBSAMPLED_Y_BINDING: u32 = 9;
/// Number of bindings in the descriptor set layout.
pub const MAX_DESCRIPTOR_BINDINGS: u32 = 10;

/// Which side of the filter a resource belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Read by the shader.
    Input,
    /// Written by the shader.
    Output,
}

/// Descriptor type of a binding, with what the GLSL declaration needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// Storage image with a GLSL format qualifier.
    StorageImage {
        /// Format qualifier, e.g. `r8` or `rg16`.
        format: &'static str,
    },
    /// Sampled image read through the immutable YCbCr conversion sampler.
    CombinedImageSampler,
    /// Storage buffer addressed in elements of `element_bits`.
    StorageBuffer {
        /// 8 or 16.
        element_bits: u32,
    },
}

impl DescriptorKind {
    /// Vulkan descriptor type.
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            DescriptorKind::StorageImage { .. } => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorKind::StorageBuffer { .. } => vk::DescriptorType::STORAGE_BUFFER,
        }
    }

    fn is_buffer(&self) -> bool {
        matches!(self, DescriptorKind::StorageBuffer { .. })
    }
}

/// Which part of a resource a binding exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneSlot {
    /// The whole resource (single-plane formats and the sampled input).
    Combined,
    /// One plane of a multi-planar resource.
    Plane(Plane),
}

/// What a binding is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingRole {
    /// Read by the shader.
    Input(PlaneSlot),
    /// Written by the shader.
    Output(PlaneSlot),
    /// Auxiliary 2x2 subsampled luma output.
    SubsampledY,
}

/// One binding the generated shader declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSlot {
    /// Binding index within set 0.
    pub binding: u32,
    /// Descriptor type.
    pub kind: DescriptorKind,
    /// Purpose.
    pub role: BindingRole,
}

impl BindingSlot {
    /// GLSL identifier of the resource.
    pub fn name(&self) -> String {
        let is_buffer = self.kind.is_buffer();
        match self.role {
            BindingRole::SubsampledY => "outputImageSubsampledY".to_string(),
            BindingRole::Input(PlaneSlot::Combined)
                if self.kind == DescriptorKind::CombinedImageSampler =>
            {
                "inputImageSampled".to_string()
            }
            BindingRole::Input(slot) => resource_name(Direction::Input, is_buffer, slot),
            BindingRole::Output(slot) => resource_name(Direction::Output, is_buffer, slot),
        }
    }
}

/// GLSL identifier for a plane or whole resource, e.g. `inputImageCbCr` or `outputBufferRGB`.
pub(crate) fn resource_name(direction: Direction, is_buffer: bool, slot: PlaneSlot) -> String {
    let prefix = match direction {
        Direction::Input => "input",
        Direction::Output => "output",
    };
    let kind = if is_buffer { "Buffer" } else { "Image" };
    let suffix = match slot {
        PlaneSlot::Combined => "RGB",
        PlaneSlot::Plane(plane) => plane.suffix(),
    };
    format!("{}{}{}", prefix, kind, suffix)
}

/// Ordered list of the bindings a generated shader uses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BindingPlan {
    slots: Vec<BindingSlot>,
}

impl BindingPlan {
    pub(crate) fn new(ctx: &ShaderContext) -> Self {
        let mut slots = Vec::with_capacity(MAX_DESCRIPTOR_BINDINGS as usize);

        if let Some(input) = &ctx.input {
            if ctx.hw_sampler {
                slots.push(BindingSlot {
                    binding: INPUT_BINDING_BASE,
                    kind: DescriptorKind::CombinedImageSampler,
                    role: BindingRole::Input(PlaneSlot::Combined),
                });
            } else {
                push_side(&mut slots, INPUT_BINDING_BASE, input, BindingRole::Input);
            }
        }

        push_side(&mut slots, OUTPUT_BINDING_BASE, &ctx.output, BindingRole::Output);

        if ctx.subsample_y {
            if let FormatLayout::MultiPlane(d) = &ctx.output.layout {
                slots.push(BindingSlot {
                    binding: SUBSAMPLED_Y_BINDING,
                    kind: DescriptorKind::StorageImage {
                        format: d.plane_glsl_format(Plane::Y),
                    },
                    role: BindingRole::SubsampledY,
                });
            }
        }

        Self { slots }
    }

    /// All bindings in declaration order.
    pub fn slots(&self) -> &[BindingSlot] {
        &self.slots
    }

    /// Binding indices in declaration order.
    pub fn bindings(&self) -> Vec<u32> {
        self.slots.iter().map(|s| s.binding).collect()
    }

    /// The slot declared at `binding`, if any.
    pub fn slot(&self, binding: u32) -> Option<&BindingSlot> {
        self.slots.iter().find(|s| s.binding == binding)
    }

    /// Number of input bindings.
    pub fn input_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.role, BindingRole::Input(_)))
            .count()
    }

    /// Number of output bindings, including the subsampled luma plane.
    pub fn output_count(&self) -> usize {
        self.slots.len() - self.input_count()
    }

    /// Whether any storage buffer is addressed in `bits`-wide elements.
    pub fn uses_buffer_elements(&self, bits: u32) -> bool {
        self.slots.iter().any(
            |s| matches!(s.kind, DescriptorKind::StorageBuffer { element_bits } if element_bits == bits),
        )
    }
}

fn push_side(
    slots: &mut Vec<BindingSlot>,
    base: u32,
    side: &Side,
    role: fn(PlaneSlot) -> BindingRole,
) {
    match (&side.layout, side.kind) {
        (FormatLayout::SinglePlane(f), ResourceKind::Image) => slots.push(BindingSlot {
            binding: base,
            kind: DescriptorKind::StorageImage {
                format: f.glsl_format(),
            },
            role: role(PlaneSlot::Combined),
        }),
        (FormatLayout::SinglePlane(f), ResourceKind::Buffer) => slots.push(BindingSlot {
            binding: base,
            kind: DescriptorKind::StorageBuffer {
                element_bits: f.container_bits(),
            },
            role: role(PlaneSlot::Combined),
        }),
        (FormatLayout::MultiPlane(d), kind) => {
            for &plane in d.planes() {
                let descriptor = match kind {
                    ResourceKind::Image => DescriptorKind::StorageImage {
                        format: d.plane_glsl_format(plane),
                    },
                    ResourceKind::Buffer => DescriptorKind::StorageBuffer {
                        element_bits: d.container_bits(),
                    },
                };
                slots.push(BindingSlot {
                    binding: base + 1 + plane.index() as u32,
                    kind: descriptor,
                    role: role(PlaneSlot::Plane(plane)),
                });
            }
        }
    }
}

/// Emit one `layout (...)` declaration per slot.
pub(crate) fn emit_declarations(out: &mut String, plan: &BindingPlan, arrays: bool) {
    let image_type = if arrays { "image2DArray" } else { "image2D" };
    let sampler_type = if arrays {
        "sampler2DArray"
    } else {
        "sampler2D"
    };

    for slot in plan.slots() {
        let access = match slot.role {
            BindingRole::Input(_) => "readonly",
            BindingRole::Output(_) | BindingRole::SubsampledY => "writeonly",
        };
        let name = slot.name();
        match slot.kind {
            DescriptorKind::StorageImage { format } => {
                let _ = writeln!(
                    out,
                    "layout (set = 0, binding = {}, {}) uniform {} {} {};",
                    slot.binding, format, access, image_type, name
                );
            }
            DescriptorKind::CombinedImageSampler => {
                let _ = writeln!(
                    out,
                    "layout (set = 0, binding = {}) uniform {} {};",
                    slot.binding, sampler_type, name
                );
            }
            DescriptorKind::StorageBuffer { element_bits } => {
                let mut block = name.clone();
                block[..1].make_ascii_uppercase();
                let _ = writeln!(
                    out,
                    "layout (std430, set = 0, binding = {}) {} buffer {}Block {{ uint{}_t data[]; }} {};",
                    slot.binding, access, block, element_bits, name
                );
            }
        }
    }
    out.push('\n');
}
