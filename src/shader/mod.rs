//! Runtime GLSL generation for the YCbCr compute filters.
//!
//! A shader is assembled from small emitters that append to one `String` in a fixed
//! order: header and extensions, push constants, workgroup size, resource declarations,
//! helper functions and finally `main`. Identical configurations always produce
//! byte-identical text.

mod bindings;
mod body;
pub mod color;
mod io;
pub mod range;

pub use bindings::{
    BindingPlan, BindingRole, BindingSlot, DescriptorKind, Direction, PlaneSlot,
    INPUT_BINDING_BASE, MAX_DESCRIPTOR_BINDINGS, OUTPUT_BINDING_BASE, PARAMS_BINDING,
    SUBSAMPLED_Y_BINDING,
};

use crate::error::{Result, YuvForgeError};
use crate::filter::{EdgeReplication, FilterConfig, FilterFlags, FilterType, ResourceKind};
use crate::format::{resolve_format, FormatLayout};
use color::ColorConversion;
use std::fmt::Write;
use tracing::debug;

/// Local workgroup size in both dimensions.
pub const WORKGROUP_SIZE: u32 = 16;

/// Push constant block members, in declaration order. All are `uint`.
pub const PUSH_CONSTANT_FIELDS: [&str; 22] = [
    "srcLayer",
    "dstLayer",
    "inputWidth",
    "inputHeight",
    "outputWidth",
    "outputHeight",
    "halfInputWidth",
    "halfInputHeight",
    "halfOutputWidth",
    "halfOutputHeight",
    "inYOffset",
    "inCbOffset",
    "inCrOffset",
    "inYPitch",
    "inCbPitch",
    "inCrPitch",
    "outYOffset",
    "outCbOffset",
    "outCrOffset",
    "outYPitch",
    "outCbPitch",
    "outCrPitch",
];

/// Generated GLSL and the bindings it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedShader {
    /// Complete compute shader source.
    pub source: String,
    /// Bindings declared by `source`.
    pub bindings: BindingPlan,
}

impl GeneratedShader {
    /// Length of the source in bytes.
    pub fn len(&self) -> usize {
        self.source.len()
    }

    /// Whether the source is empty.
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

/// Input or output of a filter as the generator sees it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Side {
    pub kind: ResourceKind,
    pub layout: FormatLayout,
    /// Bits between the sample's LSB and the container's LSB (MSB-aligned 16-bit data).
    pub shift: u32,
}

impl Side {
    /// `msb_aligned` only matters for buffers; X6/X4 image formats always keep their
    /// samples in the high bits of the container.
    fn new(format: ash::vk::Format, kind: ResourceKind, msb_aligned: bool) -> Result<Self> {
        let layout = resolve_format(format)?;
        let shift = match &layout {
            FormatLayout::MultiPlane(d)
                if d.container_bits() > d.bit_depth
                    && (kind == ResourceKind::Image || msb_aligned) =>
            {
                d.container_bits() - d.bit_depth
            }
            // 16-bit RGBA containers with fewer significant bits are always MSB aligned.
            FormatLayout::SinglePlane(f) if !f.packed => f.container_bits() - f.bit_depth,
            _ => 0,
        };
        Ok(Self {
            kind,
            layout,
            shift,
        })
    }
}

/// Validated generator inputs.
#[derive(Debug, Clone)]
pub(crate) struct ShaderContext {
    pub filter_type: FilterType,
    pub input: Option<Side>,
    pub output: Side,
    pub color: Option<ColorConversion>,
    pub hw_sampler: bool,
    pub subsample_y: bool,
    pub replication: EdgeReplication,
    pub arrays: bool,
}

impl ShaderContext {
    pub(crate) fn new(config: &FilterConfig) -> Result<Self> {
        match config.filter_type {
            FilterType::RgbaToYcbcr => {
                return Err(YuvForgeError::UnsupportedConfiguration(
                    "RGBA to YCbCr conversion is not implemented".to_string(),
                ))
            }
            FilterType::Resize => {
                return Err(YuvForgeError::UnsupportedConfiguration(
                    "resize filters are not implemented".to_string(),
                ))
            }
            _ => {}
        }

        let output = Side::new(
            config.output_format,
            config.output_kind,
            config.flags.contains(FilterFlags::OUTPUT_LSB_TO_MSB_SHIFT),
        )?;
        let input = if config.has_input() {
            Some(Side::new(
                config.input_format,
                config.input_kind,
                config.flags.contains(FilterFlags::INPUT_MSB_TO_LSB_SHIFT),
            )?)
        } else {
            None
        };

        let ctx = Self {
            filter_type: config.filter_type,
            input,
            output,
            color: config.color,
            hw_sampler: config.uses_ycbcr_sampler(),
            subsample_y: config.flags.contains(FilterFlags::ENABLE_Y_SUBSAMPLING),
            replication: config.replication(),
            arrays: config.image_arrays,
        };
        ctx.validate()?;
        Ok(ctx)
    }

    fn validate(&self) -> Result<()> {
        let unsupported = |msg: &str| Err(YuvForgeError::UnsupportedConfiguration(msg.to_string()));

        for side in self.input.iter().chain(std::iter::once(&self.output)) {
            if let FormatLayout::SinglePlane(f) = &side.layout {
                if f.packed && side.kind == ResourceKind::Buffer {
                    return unsupported("packed single-plane formats need an image resource");
                }
            }
        }

        match self.filter_type {
            FilterType::Copy => {
                let input_multi = self
                    .input
                    .as_ref()
                    .is_some_and(|s| s.layout.multi_plane().is_some());
                if !input_multi || self.output.layout.multi_plane().is_none() {
                    return unsupported("copy needs multi-planar YCbCr input and output");
                }
            }
            FilterType::Clear => {}
            FilterType::YcbcrToRgba => {
                let input = self.input.as_ref();
                if input.and_then(|s| s.layout.multi_plane()).is_none() {
                    return unsupported("YCbCr to RGBA needs a multi-planar input");
                }
                if self.output.layout.single_plane().is_none() {
                    return unsupported("YCbCr to RGBA needs a single-plane output");
                }
                if self.color.is_none() {
                    return unsupported("YCbCr to RGBA needs color conversion info");
                }
                if self.hw_sampler && input.is_some_and(|s| s.kind != ResourceKind::Image) {
                    return unsupported("the YCbCr sampler path needs an image input");
                }
                if self.subsample_y {
                    return unsupported("luma subsampling is not available for RGBA output");
                }
            }
            FilterType::RgbaToYcbcr | FilterType::Resize => {
                return unsupported("filter type is not implemented");
            }
        }

        if self.subsample_y && self.output.layout.multi_plane().is_none() {
            return unsupported("luma subsampling needs a multi-planar output");
        }
        Ok(())
    }

    /// Whether input and output bit depths differ.
    pub(crate) fn needs_bit_depth_conversion(&self) -> bool {
        self.input
            .as_ref()
            .is_some_and(|i| i.layout.bit_depth() != self.output.layout.bit_depth())
    }

    /// Whether input and output ranges differ.
    pub(crate) fn needs_range_conversion(&self) -> bool {
        self.color
            .as_ref()
            .is_some_and(|c| c.input_range != c.output_range)
    }
}

/// Format an `f64` as a GLSL float literal. Always contains a '.' or an exponent.
pub(crate) fn glsl_float(value: f64) -> String {
    let mut s = format!("{:?}", value);
    if !s.contains(|c| c == '.' || c == 'e' || c == 'E') {
        s.push_str(".0");
    }
    s
}

/// Validated generator for one filter configuration.
#[derive(Debug, Clone)]
pub struct ShaderGenerator {
    ctx: ShaderContext,
    plan: BindingPlan,
}

impl ShaderGenerator {
    /// Resolve formats and check that the configuration can be generated.
    pub fn new(config: &FilterConfig) -> Result<Self> {
        let ctx = ShaderContext::new(config)?;
        let plan = BindingPlan::new(&ctx);
        Ok(Self { ctx, plan })
    }

    /// Bindings the generated shader will declare.
    pub fn bindings(&self) -> &BindingPlan {
        &self.plan
    }

    /// Emit the complete shader.
    pub fn generate(&self) -> Result<GeneratedShader> {
        let ctx = &self.ctx;
        let mut source = String::with_capacity(8 * 1024);
        emit_header(&mut source, &self.plan);
        emit_push_constants(&mut source);
        emit_workgroup_size(&mut source);
        bindings::emit_declarations(&mut source, &self.plan, ctx.arrays);

        match ctx.filter_type {
            FilterType::Copy => body::emit_copy(&mut source, ctx)?,
            FilterType::Clear => body::emit_clear(&mut source, ctx)?,
            FilterType::YcbcrToRgba => body::emit_ycbcr_to_rgba(&mut source, ctx)?,
            FilterType::RgbaToYcbcr | FilterType::Resize => {
                return Err(YuvForgeError::UnsupportedConfiguration(format!(
                    "{:?} is not implemented",
                    ctx.filter_type
                )))
            }
        }

        debug!(
            "Generated {:?} shader: {} bytes, bindings {:?}",
            ctx.filter_type,
            source.len(),
            self.plan.bindings()
        );

        Ok(GeneratedShader {
            source,
            bindings: self.plan.clone(),
        })
    }
}

/// Generate the compute shader for `config`.
pub fn generate_shader(config: &FilterConfig) -> Result<GeneratedShader> {
    ShaderGenerator::new(config)?.generate()
}

fn emit_header(out: &mut String, plan: &BindingPlan) {
    out.push_str("#version 450\n");
    if plan.uses_buffer_elements(8) {
        out.push_str("#extension GL_EXT_shader_8bit_storage : require\n");
        out.push_str("#extension GL_EXT_shader_explicit_arithmetic_types_int8 : require\n");
    }
    if plan.uses_buffer_elements(16) {
        out.push_str("#extension GL_EXT_shader_16bit_storage : require\n");
        out.push_str("#extension GL_EXT_shader_explicit_arithmetic_types_int16 : require\n");
    }
    out.push('\n');
}

fn emit_push_constants(out: &mut String) {
    out.push_str("layout (push_constant) uniform PushConstants {\n");
    for field in PUSH_CONSTANT_FIELDS {
        let _ = writeln!(out, "    uint {};", field);
    }
    out.push_str("} pc;\n\n");
}

fn emit_workgroup_size(out: &mut String) {
    let _ = writeln!(
        out,
        "layout (local_size_x = {}, local_size_y = {}, local_size_z = 1) in;\n",
        WORKGROUP_SIZE, WORKGROUP_SIZE
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{ShaderCompiler, ShaderStage};
    use crate::filter::FilterFlags;
    use crate::shader::color::YcbcrModel;
    use crate::shader::range::ColorRange;
    use ash::vk;
    use std::collections::BTreeSet;

    const NV12: vk::Format = vk::Format::G8_B8R8_2PLANE_420_UNORM;
    const I420: vk::Format = vk::Format::G8_B8_R8_3PLANE_420_UNORM;
    const P010: vk::Format = vk::Format::G10X6_B10X6R10X6_2PLANE_420_UNORM_3PACK16;
    const YUV444: vk::Format = vk::Format::G8_B8_R8_3PLANE_444_UNORM;
    const NV16: vk::Format = vk::Format::G8_B8R8_2PLANE_422_UNORM;
    const P012: vk::Format = vk::Format::G12X4_B12X4R12X4_2PLANE_420_UNORM_3PACK16;

    /// 16-bit word a UNORM16 image holds after `imageStore` of `code * scale`.
    fn stored_word(code: u32, scale: f64) -> u32 {
        (code as f64 * scale * 65535.0).round() as u32
    }

    /// Code the image reader produces for a 16-bit word.
    fn read_code(word: u32, shift: u32) -> u32 {
        let raw = word as f64 / 65535.0;
        let code = (raw * 65535.0 + 0.5).floor();
        (code / (1u32 << shift) as f64).floor() as u32
    }

    fn declared_bindings(source: &str) -> BTreeSet<u32> {
        source
            .lines()
            .filter_map(|line| {
                let rest = line.split("binding = ").nth(1)?;
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().ok()
            })
            .collect()
    }

    fn compile(shader: &GeneratedShader, name: &str) {
        let compiler = ShaderCompiler::acquire().unwrap();
        if let Err(e) = compiler.compile(&shader.source, ShaderStage::Compute, name) {
            panic!("{} failed to compile: {}\n{}", name, e, shader.source);
        }
    }

    fn copy(input: vk::Format, output: vk::Format) -> FilterConfig {
        FilterConfig::new(FilterType::Copy, input, output)
    }

    fn to_rgba(input: vk::Format, output: vk::Format) -> FilterConfig {
        FilterConfig::new(FilterType::YcbcrToRgba, input, output)
            .color(ColorConversion::new(YcbcrModel::Bt709))
    }

    // ========================
    // Structure tests.
    // ========================

    #[test]
    fn test_glsl_float_literals() {
        assert_eq!(glsl_float(128.0), "128.0");
        assert_eq!(glsl_float(0.5), "0.5");
        assert_eq!(glsl_float(1.0e-10), "1e-10");
        assert!(glsl_float(1.0 / 219.0).starts_with("0.00456"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let configs = [
            copy(I420, NV12),
            copy(P010, NV12).color(ColorConversion::new(YcbcrModel::Bt709)),
            FilterConfig::clear(NV12),
            to_rgba(NV12, vk::Format::R8G8B8A8_UNORM),
        ];
        for config in configs {
            let first = generate_shader(&config).unwrap();
            let second = generate_shader(&config).unwrap();
            assert_eq!(first.source, second.source);
            assert_eq!(first.bindings, second.bindings);
        }
    }

    #[test]
    fn test_declared_bindings_match_plan() {
        let configs = [
            copy(I420, NV12),
            copy(NV12, I420).output_kind(ResourceKind::Buffer),
            FilterConfig::clear(P010).flags(FilterFlags::ENABLE_Y_SUBSAMPLING),
            to_rgba(I420, vk::Format::B8G8R8A8_UNORM).output_kind(ResourceKind::Buffer),
            to_rgba(NV12, vk::Format::R8G8B8A8_UNORM).flags(FilterFlags::HW_YCBCR_SAMPLER),
        ];
        for config in configs {
            let shader = generate_shader(&config).unwrap();
            let planned: BTreeSet<u32> = shader.bindings.bindings().into_iter().collect();
            assert_eq!(declared_bindings(&shader.source), planned, "{:?}", config);
        }
    }

    #[test]
    fn test_plane_counts() {
        let nv12 = generate_shader(&copy(NV12, NV12)).unwrap();
        assert_eq!(nv12.bindings.bindings(), vec![1, 2, 5, 6]);

        let i420 = generate_shader(&copy(I420, I420)).unwrap();
        assert_eq!(i420.bindings.bindings(), vec![1, 2, 3, 5, 6, 7]);

        let rgba = generate_shader(&to_rgba(NV12, vk::Format::R8G8B8A8_UNORM)).unwrap();
        assert_eq!(rgba.bindings.bindings(), vec![1, 2, 4]);
        assert!(rgba.source.contains("rgba8) uniform writeonly image2DArray outputImageRGB;"));
    }

    #[test]
    fn test_push_constant_block() {
        let shader = generate_shader(&copy(NV12, NV12)).unwrap();
        let block_start = shader.source.find("uniform PushConstants {").unwrap();
        let block = &shader.source[block_start..];
        let mut last = 0;
        for field in PUSH_CONSTANT_FIELDS {
            let at = block.find(&format!("uint {};", field)).unwrap();
            assert!(at > last, "{} out of order", field);
            last = at;
        }
        assert!(shader
            .source
            .contains("layout (local_size_x = 16, local_size_y = 16, local_size_z = 1) in;"));
    }

    // ========================
    // Filter body tests.
    // ========================

    #[test]
    fn test_clear_nv12_has_no_inputs() {
        let shader = generate_shader(&FilterConfig::clear(NV12)).unwrap();
        assert_eq!(shader.bindings.input_count(), 0);
        assert_eq!(shader.bindings.bindings(), vec![5, 6]);
        assert!(!shader.source.contains("inputImage"));
        assert!(!shader.source.contains("inputBuffer"));
        assert!(!shader.source.contains("readonly"));
        assert!(shader.source.contains("128.0"));
    }

    #[test]
    fn test_clear_10bit_uses_mid_code() {
        let shader = generate_shader(&FilterConfig::clear(P010)).unwrap();
        assert!(shader.source.contains("512.0"));
    }

    #[test]
    fn test_clear_x6_x4_images_store_high_bits() {
        for (format, shift, mid) in [(P010, 6u32, 512u32), (P012, 4, 2048)] {
            let generator = ShaderGenerator::new(&FilterConfig::clear(format)).unwrap();
            assert_eq!(generator.ctx.output.shift, shift);

            let shader = generator.generate().unwrap();
            let scale = (1u32 << shift) as f64 / 65535.0;
            assert!(shader.source.contains(&glsl_float(mid as f64)));
            assert!(shader.source.contains(&format!("* {}", glsl_float(scale))));

            let word = stored_word(mid, scale);
            assert_eq!(word, mid << shift);
            assert_eq!(read_code(word, shift), mid);
        }
    }

    #[test]
    fn test_copy_x6_x4_images_keep_codes() {
        for (format, shift, max) in [(P010, 6u32, 1023u32), (P012, 4, 4095)] {
            let generator = ShaderGenerator::new(&copy(format, format)).unwrap();
            assert_eq!(generator.ctx.input.as_ref().unwrap().shift, shift);
            assert_eq!(generator.ctx.output.shift, shift);

            let shader = generator.generate().unwrap();
            let inv = glsl_float(1.0 / (1u32 << shift) as f64);
            assert!(shader
                .source
                .contains(&format!("floor(floor(raw * 65535.0 + 0.5) * {})", inv)));
            assert!(shader.source.contains("// No conversion needed - direct copy"));

            let scale = (1u32 << shift) as f64 / 65535.0;
            for code in [0, 1, (max + 1) / 2, max] {
                let read = read_code(code << shift, shift);
                assert_eq!(read, code);
                assert_eq!(stored_word(read, scale), code << shift);
            }
        }
    }

    #[test]
    fn test_buffer_shift_follows_flags() {
        let buffers = |flags| {
            ShaderGenerator::new(
                &copy(P010, P010)
                    .input_kind(ResourceKind::Buffer)
                    .output_kind(ResourceKind::Buffer)
                    .flags(flags),
            )
            .unwrap()
        };
        let plain = buffers(FilterFlags::empty());
        assert_eq!(plain.ctx.input.as_ref().unwrap().shift, 0);
        assert_eq!(plain.ctx.output.shift, 0);

        let aligned =
            buffers(FilterFlags::INPUT_MSB_TO_LSB_SHIFT | FilterFlags::OUTPUT_LSB_TO_MSB_SHIFT);
        assert_eq!(aligned.ctx.input.as_ref().unwrap().shift, 6);
        assert_eq!(aligned.ctx.output.shift, 6);
    }

    #[test]
    fn test_subsampled_luma_is_msb_aligned_for_buffer_output() {
        let shader = generate_shader(
            &copy(NV12, P010)
                .output_kind(ResourceKind::Buffer)
                .flags(FilterFlags::ENABLE_Y_SUBSAMPLING),
        )
        .unwrap();
        let writer_start = shader.source.find("void writeSubsampledY").unwrap();
        let writer = &shader.source[writer_start..];
        let writer = &writer[..writer.find("}\n").unwrap()];
        assert!(writer.contains(&format!("* {}", glsl_float(64.0 / 65535.0))));
    }

    #[test]
    fn test_copy_same_depth_is_direct() {
        let shader = generate_shader(&copy(I420, NV12)).unwrap();
        assert!(shader.source.contains("// No conversion needed - direct copy"));
        assert!(!shader.source.contains("normalizeY"));
        assert_eq!(shader.bindings.bindings(), vec![1, 2, 3, 5, 6]);
    }

    #[test]
    fn test_copy_bit_depth_conversion() {
        let shader = generate_shader(&copy(P010, NV12)).unwrap();
        assert!(!shader.source.contains("direct copy"));
        assert!(shader.source.contains("float normalizeY(float code)"));
        assert!(shader.source.contains("float denormalizeY(float value)"));
        // 10-bit limited black.
        assert!(shader.source.contains("(code - 64.0)"));
        // 8-bit limited black.
        assert!(shader.source.contains("+ 16.0;"));
    }

    #[test]
    fn test_copy_range_conversion() {
        let config = copy(NV12, NV12).color(
            ColorConversion::new(YcbcrModel::Bt709)
                .input_range(ColorRange::Full)
                .output_range(ColorRange::Limited),
        );
        let shader = generate_shader(&config).unwrap();
        assert!(shader.source.contains("// Input range: 8-bit Full"));
        assert!(shader.source.contains("// Output range: 8-bit Limited"));
    }

    #[test]
    fn test_copy_444_to_420_averages_chroma() {
        let shader = generate_shader(&copy(YUV444, NV12)).unwrap();
        assert!(shader.source.contains("* 0.25"));
    }

    #[test]
    fn test_buffer_io_declares_extensions() {
        let shader =
            generate_shader(&copy(P010, NV12).input_kind(ResourceKind::Buffer)).unwrap();
        assert!(shader.source.contains("GL_EXT_shader_16bit_storage"));
        assert!(!shader.source.contains("GL_EXT_shader_8bit_storage"));
        assert!(shader.source.contains("uint16_t data[]"));
    }

    #[test]
    fn test_shift_flags() {
        let shader = generate_shader(
            &copy(P010, P010)
                .input_kind(ResourceKind::Buffer)
                .output_kind(ResourceKind::Buffer)
                .flags(FilterFlags::INPUT_MSB_TO_LSB_SHIFT | FilterFlags::OUTPUT_LSB_TO_MSB_SHIFT),
        )
        .unwrap();
        assert!(shader.source.contains(">> 6u"));
        assert!(shader.source.contains("<< 6u"));
    }

    #[test]
    fn test_edge_replication_modes() {
        let all = generate_shader(&copy(NV12, NV12).flags(FilterFlags::ROW_COLUMN_REPLICATION_ALL))
            .unwrap();
        assert!(all.source.contains("min(p, ivec2(pc.inputWidth, pc.inputHeight) - 1)"));

        let one = generate_shader(&copy(NV12, NV12).flags(FilterFlags::ROW_COLUMN_REPLICATION_ONE))
            .unwrap();
        assert!(one.source.contains("equal(p, ivec2(pc.inputWidth, pc.inputHeight))"));
    }

    #[test]
    fn test_y_subsampling_binding() {
        let shader =
            generate_shader(&copy(NV12, NV12).flags(FilterFlags::ENABLE_Y_SUBSAMPLING)).unwrap();
        assert_eq!(shader.bindings.bindings(), vec![1, 2, 5, 6, 9]);
        assert!(shader
            .source
            .contains("binding = 9, r8) uniform writeonly image2DArray outputImageSubsampledY;"));
        assert!(shader.source.contains("writeSubsampledY(chromaPos"));
    }

    #[test]
    fn test_hw_sampler_path() {
        let shader = generate_shader(
            &to_rgba(NV12, vk::Format::R8G8B8A8_UNORM).flags(FilterFlags::HW_YCBCR_SAMPLER),
        )
        .unwrap();
        assert_eq!(shader.bindings.bindings(), vec![0, 4]);
        assert!(shader.source.contains("uniform sampler2DArray inputImageSampled;"));
        assert!(!shader.source.contains("normalizeY"));
    }

    #[test]
    fn test_non_array_images() {
        let shader = generate_shader(&copy(NV12, NV12).image_arrays(false)).unwrap();
        assert!(shader.source.contains("image2D inputImageY;"));
        assert!(!shader.source.contains("image2DArray"));
        assert!(!shader.source.contains("srcLayer)"));
    }

    // ========================
    // Rejection tests.
    // ========================

    #[test]
    fn test_unimplemented_filters_are_rejected() {
        for filter_type in [FilterType::RgbaToYcbcr, FilterType::Resize] {
            let config = FilterConfig::new(filter_type, vk::Format::R8G8B8A8_UNORM, NV12);
            assert!(matches!(
                generate_shader(&config),
                Err(YuvForgeError::UnsupportedConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let unsupported = |config: FilterConfig| {
            matches!(
                generate_shader(&config),
                Err(YuvForgeError::UnsupportedConfiguration(_))
            )
        };
        // Copy into RGBA.
        assert!(unsupported(copy(NV12, vk::Format::R8G8B8A8_UNORM)));
        // YCbCr to RGBA without color info.
        assert!(unsupported(FilterConfig::new(
            FilterType::YcbcrToRgba,
            NV12,
            vk::Format::R8G8B8A8_UNORM
        )));
        // Luma subsampling with RGBA output.
        assert!(unsupported(
            to_rgba(NV12, vk::Format::R8G8B8A8_UNORM).flags(FilterFlags::ENABLE_Y_SUBSAMPLING)
        ));
        // Packed format in a buffer.
        assert!(unsupported(
            to_rgba(NV12, vk::Format::A2B10G10R10_UNORM_PACK32).output_kind(ResourceKind::Buffer)
        ));
        // Sampler path from a buffer.
        assert!(unsupported(
            to_rgba(NV12, vk::Format::R8G8B8A8_UNORM)
                .input_kind(ResourceKind::Buffer)
                .flags(FilterFlags::HW_YCBCR_SAMPLER)
        ));
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let err = generate_shader(&copy(vk::Format::D16_UNORM, NV12)).unwrap_err();
        assert!(matches!(err, YuvForgeError::UnsupportedFormat(vk::Format::D16_UNORM)));
    }

    // ========================
    // Compilation tests.
    // ========================

    #[test]
    fn test_generated_shaders_compile() {
        let configs = [
            ("copy_i420_nv12", copy(I420, NV12)),
            ("copy_p010_nv12", copy(P010, NV12)),
            ("copy_444_nv12", copy(YUV444, NV12)),
            ("copy_nv12_444", copy(NV12, YUV444)),
            ("copy_nv16_i420", copy(NV16, I420)),
            (
                "copy_buffers",
                copy(P010, I420)
                    .input_kind(ResourceKind::Buffer)
                    .output_kind(ResourceKind::Buffer)
                    .flags(
                        FilterFlags::INPUT_MSB_TO_LSB_SHIFT
                            | FilterFlags::ROW_COLUMN_REPLICATION_ALL,
                    ),
            ),
            (
                "copy_subsampled",
                copy(NV12, P010).flags(
                    FilterFlags::ENABLE_Y_SUBSAMPLING | FilterFlags::OUTPUT_LSB_TO_MSB_SHIFT,
                ),
            ),
            ("clear_nv12", FilterConfig::clear(NV12)),
            ("clear_p010", FilterConfig::clear(P010)),
            ("copy_p012_p010", copy(P012, P010)),
            (
                "clear_i420_buffer",
                FilterConfig::clear(I420).output_kind(ResourceKind::Buffer),
            ),
            ("clear_rgba", FilterConfig::clear(vk::Format::R8G8B8A8_UNORM)),
            ("rgba_nv12", to_rgba(NV12, vk::Format::R8G8B8A8_UNORM)),
            (
                "rgba_p010_buffer",
                to_rgba(P010, vk::Format::R16G16B16A16_UNORM)
                    .input_kind(ResourceKind::Buffer)
                    .output_kind(ResourceKind::Buffer),
            ),
            (
                "bgra_i420_buffer",
                to_rgba(I420, vk::Format::B8G8R8A8_UNORM).output_kind(ResourceKind::Buffer),
            ),
            (
                "rgba_hw_sampler",
                to_rgba(NV12, vk::Format::R8G8B8A8_UNORM).flags(FilterFlags::HW_YCBCR_SAMPLER),
            ),
            ("copy_no_arrays", copy(NV12, I420).image_arrays(false)),
        ];
        for (name, config) in configs {
            let shader = generate_shader(&config).unwrap();
            compile(&shader, name);
        }
    }
}
