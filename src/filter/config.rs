//! Declarative description of a filter: what it converts, from what to what.

use crate::shader::color::ColorConversion;
use ash::vk;

/// Kind of work a filter performs. Selected once when the filter is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    /// Read, optionally convert, and write between two YCbCr formats.
    Copy,
    /// Write a mid-level value to every output plane.
    Clear,
    /// Convert a YCbCr picture to RGBA.
    YcbcrToRgba,
    /// Convert RGBA to YCbCr. Not implemented; building it fails.
    RgbaToYcbcr,
    /// Scaling. Not implemented; building it fails.
    Resize,
}

/// Whether one side of a filter is a GPU image or a linear buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceKind {
    /// Storage image (or sampled image) with per-plane views.
    #[default]
    Image,
    /// Storage buffer with explicit per-plane offsets and row pitches.
    Buffer,
}

/// How descriptors reach the shader at record time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingModel {
    /// `VK_KHR_push_descriptor`: descriptors are pushed into the command buffer.
    #[default]
    PushDescriptor,
    /// `VK_EXT_descriptor_buffer`: descriptors are written into a per-frame slot of a
    /// host-visible buffer.
    DescriptorBuffer,
}

bitflags::bitflags! {
    /// Options that change the generated shader.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FilterFlags: u32 {
        /// Input buffer samples sit in the high bits of 16-bit containers and are shifted
        /// down on read. Images with X6/X4 formats are always read this way.
        const INPUT_MSB_TO_LSB_SHIFT = 1 << 0;
        /// Output buffer samples are shifted into the high bits of 16-bit containers on
        /// write. Images with X6/X4 formats are always written this way.
        const OUTPUT_LSB_TO_MSB_SHIFT = 1 << 1;
        /// Also write a 2x2 box-filtered luma plane to the auxiliary binding.
        const ENABLE_Y_SUBSAMPLING = 1 << 2;
        /// Reads one row/column past the input edge return the edge sample.
        const ROW_COLUMN_REPLICATION_ONE = 1 << 3;
        /// Every read past the input edge returns the nearest edge sample.
        const ROW_COLUMN_REPLICATION_ALL = 1 << 4;
        /// YCbCr to RGBA samples the input through the immutable YCbCr conversion sampler.
        const HW_YCBCR_SAMPLER = 1 << 5;
    }
}

/// Everything needed to generate, compile and bind one filter.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// What the filter does.
    pub filter_type: FilterType,
    /// Input pixel format. Ignored by [`FilterType::Clear`].
    pub input_format: vk::Format,
    /// Output pixel format.
    pub output_format: vk::Format,
    /// Image or buffer input.
    pub input_kind: ResourceKind,
    /// Image or buffer output.
    pub output_kind: ResourceKind,
    /// Frames that may be recorded before the first one completes.
    pub max_frames: u32,
    /// Shader options.
    pub flags: FilterFlags,
    /// Color model and ranges. Required for [`FilterType::YcbcrToRgba`].
    pub color: Option<ColorConversion>,
    /// Declare images as `image2DArray` and address them by layer.
    pub image_arrays: bool,
    /// Descriptor update mechanism.
    pub binding_model: BindingModel,
}

impl FilterConfig {
    /// Image to image filter with default options.
    pub fn new(filter_type: FilterType, input_format: vk::Format, output_format: vk::Format) -> Self {
        Self {
            filter_type,
            input_format,
            output_format,
            input_kind: ResourceKind::Image,
            output_kind: ResourceKind::Image,
            max_frames: 1,
            flags: FilterFlags::empty(),
            color: None,
            image_arrays: true,
            binding_model: BindingModel::PushDescriptor,
        }
    }

    /// Clear filter for `output_format`.
    pub fn clear(output_format: vk::Format) -> Self {
        Self::new(FilterType::Clear, vk::Format::UNDEFINED, output_format)
    }

    /// Set the input resource kind.
    #[must_use]
    pub fn input_kind(mut self, kind: ResourceKind) -> Self {
        self.input_kind = kind;
        self
    }

    /// Set the output resource kind.
    #[must_use]
    pub fn output_kind(mut self, kind: ResourceKind) -> Self {
        self.output_kind = kind;
        self
    }

    /// Set the number of frames in flight.
    #[must_use]
    pub fn max_frames(mut self, frames: u32) -> Self {
        self.max_frames = frames;
        self
    }

    /// Set the shader flags.
    #[must_use]
    pub fn flags(mut self, flags: FilterFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the color model and ranges.
    #[must_use]
    pub fn color(mut self, color: ColorConversion) -> Self {
        self.color = Some(color);
        self
    }

    /// Choose between `image2DArray` and `image2D` declarations.
    #[must_use]
    pub fn image_arrays(mut self, arrays: bool) -> Self {
        self.image_arrays = arrays;
        self
    }

    /// Set the descriptor binding model.
    #[must_use]
    pub fn binding_model(mut self, model: BindingModel) -> Self {
        self.binding_model = model;
        self
    }

    /// Whether the filter reads an input at all.
    pub fn has_input(&self) -> bool {
        self.filter_type != FilterType::Clear
    }

    /// Whether YCbCr to RGBA reads through the hardware conversion sampler.
    pub fn uses_ycbcr_sampler(&self) -> bool {
        self.filter_type == FilterType::YcbcrToRgba
            && self.flags.contains(FilterFlags::HW_YCBCR_SAMPLER)
    }

    /// Replication mode for reads past the input edge.
    pub fn replication(&self) -> EdgeReplication {
        if self.flags.contains(FilterFlags::ROW_COLUMN_REPLICATION_ALL) {
            EdgeReplication::All
        } else if self.flags.contains(FilterFlags::ROW_COLUMN_REPLICATION_ONE) {
            EdgeReplication::One
        } else {
            EdgeReplication::None
        }
    }
}

/// How reads past the input edge are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeReplication {
    /// Coordinates are used as is.
    None,
    /// A coordinate exactly one past the edge is pulled back onto it.
    One,
    /// Coordinates are clamped to the last valid sample.
    All,
}
