//! Filter bodies: the helper functions each filter type needs, then `main`.
//!
//! Every invocation owns one 2x2 luma block, addressed by its chroma-resolution position
//! `chromaPos`, whatever the output chroma layout is. Writes past the right or bottom edge
//! of odd-sized outputs are skipped.

use super::color::{emit_ycbcr_to_rgb, YcbcrMatrix};
use super::range::{emit_denormalize, emit_normalize, ColorRange, RangeConstants};
use super::{glsl_float, io, ShaderContext, Side};
use crate::error::{Result, YuvForgeError};
use crate::format::{PixelFormatDescriptor, SinglePlaneFormat};
use std::fmt::Write;

/// Luma offsets inside the block, in write order.
const BLOCK: [(u32, u32); 4] = [(0, 0), (1, 0), (0, 1), (1, 1)];
const LUMA_NAMES: [&str; 4] = ["y00", "y10", "y01", "y11"];

fn offset(base: &str, dx: u32, dy: u32) -> String {
    if dx == 0 && dy == 0 {
        base.to_string()
    } else {
        format!("{} + ivec2({}, {})", base, dx, dy)
    }
}

/// Guard for a write at luma offset (dx, dy) inside the block.
fn edge_guard(dx: u32, dy: u32) -> Option<&'static str> {
    match (dx, dy) {
        (0, 0) => None,
        (1, 0) => Some("hasRight"),
        (0, 1) => Some("hasBelow"),
        _ => Some("hasRight && hasBelow"),
    }
}

fn guarded(out: &mut String, guard: Option<&str>, statement: &str) {
    match guard {
        Some(cond) => {
            let _ = writeln!(out, "    if ({}) {{", cond);
            let _ = writeln!(out, "        {}", statement);
            out.push_str("    }\n");
        }
        None => {
            let _ = writeln!(out, "    {}", statement);
        }
    }
}

fn emit_main_prologue(out: &mut String) {
    out.push_str("void main() {\n");
    out.push_str("    ivec2 chromaPos = ivec2(gl_GlobalInvocationID.xy);\n");
    out.push_str(
        "    if (chromaPos.x >= int(pc.halfOutputWidth) || chromaPos.y >= int(pc.halfOutputHeight)) {\n",
    );
    out.push_str("        return;\n");
    out.push_str("    }\n\n");
    out.push_str("    ivec2 lumaPos = chromaPos * 2;\n");
    out.push_str("    ivec2 outSize = ivec2(pc.outputWidth, pc.outputHeight);\n");
    out.push_str("    bool hasRight = lumaPos.x + 1 < outSize.x;\n");
    out.push_str("    bool hasBelow = lumaPos.y + 1 < outSize.y;\n\n");
}

/// One output chroma sample of the block.
struct ChromaTarget {
    /// Luma offset of the sample's top-left corner inside the block.
    dx: u32,
    dy: u32,
    /// Output chroma coordinate expression.
    dst: String,
}

/// Output chroma samples covered by one 2x2 block of `d`.
fn chroma_targets(d: &PixelFormatDescriptor) -> Vec<ChromaTarget> {
    let (sx, sy) = (d.chroma_subsample_x, d.chroma_subsample_y);
    let per_x = 2 / sx;
    let per_y = 2 / sy;
    let base = match (per_x, per_y) {
        (1, 1) => "chromaPos".to_string(),
        (2, 2) => "lumaPos".to_string(),
        (1, _) => "ivec2(chromaPos.x, lumaPos.y)".to_string(),
        _ => "ivec2(lumaPos.x, chromaPos.y)".to_string(),
    };
    let mut targets = Vec::with_capacity(4);
    for j in 0..per_y {
        for i in 0..per_x {
            targets.push(ChromaTarget {
                dx: i * sx,
                dy: j * sy,
                dst: offset(&base, i, j),
            });
        }
    }
    targets
}

/// Average of the input chroma samples that fall inside the output sample at (dx, dy).
fn chroma_source(
    input: &PixelFormatDescriptor,
    output: &PixelFormatDescriptor,
    dx: u32,
    dy: u32,
) -> String {
    let (isx, isy) = (input.chroma_subsample_x, input.chroma_subsample_y);
    let (osx, osy) = (output.chroma_subsample_x, output.chroma_subsample_y);
    let xs: Vec<u32> = if isx < osx { vec![dx, dx + 1] } else { vec![dx] };
    let ys: Vec<u32> = if isy < osy { vec![dy, dy + 1] } else { vec![dy] };

    let mut reads = Vec::with_capacity(4);
    for &y in &ys {
        for &x in &xs {
            let pos = match (isx, isy, x, y) {
                (2, 2, 0, 0) => "chromaPos".to_string(),
                (1, 1, ..) => offset("lumaPos", x, y),
                _ => format!("({}) / ivec2({}, {})", offset("lumaPos", x, y), isx, isy),
            };
            reads.push(format!("readCbCr(srcChromaPos({}))", pos));
        }
    }

    match reads.len() {
        1 => reads.remove(0),
        n => format!("({}) * {}", reads.join(" + "), glsl_float(1.0 / n as f64)),
    }
}

fn multi_plane<'a>(side: Option<&'a Side>, what: &str) -> Result<(&'a Side, &'a PixelFormatDescriptor)> {
    side.and_then(|s| s.layout.multi_plane().map(|d| (s, d)))
        .ok_or_else(|| {
            YuvForgeError::UnsupportedConfiguration(format!("{} must be multi-planar YCbCr", what))
        })
}

fn single_plane(side: &Side) -> Result<&SinglePlaneFormat> {
    side.layout.single_plane().ok_or_else(|| {
        YuvForgeError::UnsupportedConfiguration("output must be a single-plane format".to_string())
    })
}

/// Emit the COPY filter: read, optionally convert, write.
pub(crate) fn emit_copy(out: &mut String, ctx: &ShaderContext) -> Result<()> {
    let (input, in_desc) = multi_plane(ctx.input.as_ref(), "copy input")?;
    let (output, out_desc) = multi_plane(Some(&ctx.output), "copy output")?;

    io::emit_coordinate_helpers(out, ctx.replication, in_desc);
    io::emit_plane_readers(out, input, in_desc, ctx.arrays);
    io::emit_plane_writers(out, output, out_desc, ctx.arrays);
    if ctx.subsample_y {
        io::emit_subsampled_y_writer(out, out_desc, ctx.arrays);
    }

    let direct = !ctx.needs_bit_depth_conversion() && !ctx.needs_range_conversion();
    if !direct {
        let (in_range, out_range) = ctx
            .color
            .map(|c| (c.input_range, c.output_range))
            .unwrap_or((ColorRange::Limited, ColorRange::Limited));
        emit_normalize(out, &RangeConstants::new(in_desc.bit_depth, in_range));
        emit_denormalize(out, &RangeConstants::new(out_desc.bit_depth, out_range));
        out.push_str("float convertY(float code) {\n");
        out.push_str("    return denormalizeY(normalizeY(code));\n");
        out.push_str("}\n\n");
        out.push_str("vec2 convertCbCr(vec2 code) {\n");
        out.push_str("    return denormalizeCbCr(normalizeCbCr(code));\n");
        out.push_str("}\n\n");
    }
    let wrap = |func: &str, expr: String| {
        if direct {
            expr
        } else {
            format!("{}({})", func, expr)
        }
    };

    emit_main_prologue(out);
    if direct {
        out.push_str("    // No conversion needed - direct copy\n");
    } else {
        out.push_str("    // Bit depth and range conversion\n");
    }
    for ((dx, dy), name) in BLOCK.iter().zip(LUMA_NAMES) {
        let read = format!("readY(srcLumaPos({}))", offset("lumaPos", *dx, *dy));
        let _ = writeln!(out, "    float {} = {};", name, wrap("convertY", read));
    }
    out.push('\n');
    for ((dx, dy), name) in BLOCK.iter().zip(LUMA_NAMES) {
        let statement = format!("writeY({}, {});", offset("lumaPos", *dx, *dy), name);
        guarded(out, edge_guard(*dx, *dy), &statement);
    }
    out.push('\n');

    for target in chroma_targets(out_desc) {
        let value = wrap(
            "convertCbCr",
            chroma_source(in_desc, out_desc, target.dx, target.dy),
        );
        let statement = format!("writeCbCr({}, {});", target.dst, value);
        guarded(out, edge_guard(target.dx, target.dy), &statement);
    }

    if ctx.subsample_y {
        out.push_str("\n    writeSubsampledY(chromaPos, (y00 + y10 + y01 + y11) * 0.25);\n");
    }
    out.push_str("}\n");
    Ok(())
}

/// Emit the CLEAR filter: every output sample gets the mid-level code.
pub(crate) fn emit_clear(out: &mut String, ctx: &ShaderContext) -> Result<()> {
    let output = &ctx.output;
    match output.layout.multi_plane() {
        Some(d) => {
            io::emit_plane_writers(out, output, d, ctx.arrays);
            if ctx.subsample_y {
                io::emit_subsampled_y_writer(out, d, ctx.arrays);
            }
            let mid = glsl_float((1u64 << (d.bit_depth - 1)) as f64);

            emit_main_prologue(out);
            for (dx, dy) in BLOCK {
                let statement = format!("writeY({}, {});", offset("lumaPos", dx, dy), mid);
                guarded(out, edge_guard(dx, dy), &statement);
            }
            for target in chroma_targets(d) {
                let statement = format!("writeCbCr({}, vec2({}));", target.dst, mid);
                guarded(out, edge_guard(target.dx, target.dy), &statement);
            }
            if ctx.subsample_y {
                let _ = writeln!(out, "    writeSubsampledY(chromaPos, {});", mid);
            }
        }
        None => {
            let f = single_plane(output)?;
            io::emit_rgba_writer(out, output, f, ctx.arrays);
            emit_main_prologue(out);
            for (dx, dy) in BLOCK {
                let statement = format!(
                    "writeRGBA({}, vec4(0.5, 0.5, 0.5, 1.0));",
                    offset("lumaPos", dx, dy)
                );
                guarded(out, edge_guard(dx, dy), &statement);
            }
        }
    }
    out.push_str("}\n");
    Ok(())
}

/// Emit the YCbCr to RGBA filter.
pub(crate) fn emit_ycbcr_to_rgba(out: &mut String, ctx: &ShaderContext) -> Result<()> {
    let (input, in_desc) = multi_plane(ctx.input.as_ref(), "YCbCr to RGBA input")?;
    let rgba = single_plane(&ctx.output)?;
    let color = ctx.color.ok_or_else(|| {
        YuvForgeError::UnsupportedConfiguration(
            "YCbCr to RGBA needs color conversion info".to_string(),
        )
    })?;

    if ctx.hw_sampler {
        io::emit_sampled_reader(out, ctx.arrays);
        out.push_str("vec4 convertToRgba(ivec2 p) {\n");
        out.push_str("    return vec4(sampleRgb(p), 1.0);\n");
        out.push_str("}\n\n");
    } else {
        io::emit_coordinate_helpers(out, ctx.replication, in_desc);
        io::emit_plane_readers(out, input, in_desc, ctx.arrays);
        emit_normalize(
            out,
            &RangeConstants::new(in_desc.bit_depth, color.input_range),
        );
        emit_ycbcr_to_rgb(out, &YcbcrMatrix::new(color.primaries, 0.5, 0.5));

        let chroma_pos = match (in_desc.chroma_subsample_x, in_desc.chroma_subsample_y) {
            (1, 1) => "p".to_string(),
            (sx, sy) => format!("p / ivec2({}, {})", sx, sy),
        };
        out.push_str("vec4 convertToRgba(ivec2 p) {\n");
        out.push_str("    float y = normalizeY(readY(srcLumaPos(p)));\n");
        let _ = writeln!(
            out,
            "    vec2 cbcr = normalizeCbCr(readCbCr(srcChromaPos({}))) - 0.5;",
            chroma_pos
        );
        out.push_str("    return vec4(clamp(ycbcrToRgb(vec3(y, cbcr)), 0.0, 1.0), 1.0);\n");
        out.push_str("}\n\n");
    }

    io::emit_rgba_writer(out, &ctx.output, rgba, ctx.arrays);

    emit_main_prologue(out);
    for (dx, dy) in BLOCK {
        let pos = offset("lumaPos", dx, dy);
        let statement = format!("writeRGBA({}, convertToRgba({}));", pos, pos);
        guarded(out, edge_guard(dx, dy), &statement);
    }
    out.push_str("}\n");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::resolve_format;
    use ash::vk;

    fn desc(format: vk::Format) -> PixelFormatDescriptor {
        *resolve_format(format).unwrap().multi_plane().unwrap()
    }

    #[test]
    fn test_chroma_targets_per_layout() {
        let nv12 = chroma_targets(&desc(vk::Format::G8_B8R8_2PLANE_420_UNORM));
        assert_eq!(nv12.len(), 1);
        assert_eq!(nv12[0].dst, "chromaPos");

        let nv16 = chroma_targets(&desc(vk::Format::G8_B8R8_2PLANE_422_UNORM));
        assert_eq!(nv16.len(), 2);
        assert_eq!(nv16[1].dst, "ivec2(chromaPos.x, lumaPos.y) + ivec2(0, 1)");
        assert_eq!((nv16[1].dx, nv16[1].dy), (0, 1));

        let yuv444 = chroma_targets(&desc(vk::Format::G8_B8_R8_3PLANE_444_UNORM));
        assert_eq!(yuv444.len(), 4);
        assert_eq!(yuv444[3].dst, "lumaPos + ivec2(1, 1)");
    }

    #[test]
    fn test_chroma_source_same_layout_reads_once() {
        let nv12 = desc(vk::Format::G8_B8R8_2PLANE_420_UNORM);
        assert_eq!(
            chroma_source(&nv12, &nv12, 0, 0),
            "readCbCr(srcChromaPos(chromaPos))"
        );
    }

    #[test]
    fn test_chroma_source_444_to_420_averages_four() {
        let yuv444 = desc(vk::Format::G8_B8_R8_3PLANE_444_UNORM);
        let nv12 = desc(vk::Format::G8_B8R8_2PLANE_420_UNORM);
        let src = chroma_source(&yuv444, &nv12, 0, 0);
        assert_eq!(src.matches("readCbCr").count(), 4);
        assert!(src.ends_with(") * 0.25"));
    }

    #[test]
    fn test_chroma_source_420_to_444_replicates() {
        let nv12 = desc(vk::Format::G8_B8R8_2PLANE_420_UNORM);
        let yuv444 = desc(vk::Format::G8_B8_R8_3PLANE_444_UNORM);
        assert_eq!(
            chroma_source(&nv12, &yuv444, 1, 1),
            "readCbCr(srcChromaPos((lumaPos + ivec2(1, 1)) / ivec2(2, 2)))"
        );
    }

    #[test]
    fn test_edge_guards() {
        assert_eq!(edge_guard(0, 0), None);
        assert_eq!(edge_guard(1, 0), Some("hasRight"));
        assert_eq!(edge_guard(1, 1), Some("hasRight && hasBelow"));
    }
}
