//! Read and write accessors for planes, in the code domain.
//!
//! Readers return integer sample codes as floats at the sample's own bit depth, whatever
//! the container and alignment. Writers take unrounded codes, clamp them to the output bit
//! depth and round to nearest. Image planes go through normalized UNORM loads and stores;
//! buffer planes are indexed by element with byte offsets and pitches from the push
//! constants.

use super::bindings::{resource_name, Direction, PlaneSlot};
use super::{glsl_float, Side};
use crate::filter::{EdgeReplication, ResourceKind};
use crate::format::{PixelFormatDescriptor, Plane, SinglePlaneFormat};
use std::fmt::Write;

fn image_coord(pos: &str, layer: &str, arrays: bool) -> String {
    if arrays {
        format!("ivec3({}, int(pc.{}))", pos, layer)
    } else {
        pos.to_string()
    }
}

/// Push constant field prefix for the offset/pitch of `plane`.
fn plane_field(plane: Plane) -> &'static str {
    match plane {
        Plane::Y => "Y",
        Plane::CbCr | Plane::Cb => "Cb",
        Plane::Cr => "Cr",
    }
}

/// Element index of texel `pos` in a buffer plane. Single-plane data uses the Y slots.
fn buffer_index(
    direction: Direction,
    plane: Plane,
    element_bytes: u32,
    components: u32,
    pos: &str,
) -> String {
    let prefix = match direction {
        Direction::Input => "in",
        Direction::Output => "out",
    };
    let field = plane_field(plane);
    let column = if components > 1 {
        format!("uint({}.x) * {}u", pos, components)
    } else {
        format!("uint({}.x)", pos)
    };
    if element_bytes == 1 {
        format!(
            "pc.{p}{f}Offset + uint({pos}.y) * pc.{p}{f}Pitch + {column}",
            p = prefix,
            f = field,
            pos = pos,
            column = column
        )
    } else {
        format!(
            "pc.{p}{f}Offset / {e}u + uint({pos}.y) * (pc.{p}{f}Pitch / {e}u) + {column}",
            p = prefix,
            f = field,
            e = element_bytes,
            pos = pos,
            column = column
        )
    }
}

fn shift_suffix(op: &str, shift: u32) -> String {
    if shift == 0 {
        String::new()
    } else {
        format!(" {} {}u", op, shift)
    }
}

fn container_max(bits: u32) -> f64 {
    ((1u64 << bits) - 1) as f64
}

/// Emit `srcLumaPos` and `srcChromaPos`, which map a wanted input coordinate to the one
/// actually read according to the edge replication mode.
pub(crate) fn emit_coordinate_helpers(
    out: &mut String,
    replication: EdgeReplication,
    input: &PixelFormatDescriptor,
) {
    let chroma_w = if input.chroma_subsample_x == 2 {
        "pc.halfInputWidth"
    } else {
        "pc.inputWidth"
    };
    let chroma_h = if input.chroma_subsample_y == 2 {
        "pc.halfInputHeight"
    } else {
        "pc.inputHeight"
    };
    let luma_size = "ivec2(pc.inputWidth, pc.inputHeight)".to_string();
    let chroma_size = format!("ivec2({}, {})", chroma_w, chroma_h);

    for (name, size) in [("srcLumaPos", luma_size), ("srcChromaPos", chroma_size)] {
        let _ = writeln!(out, "ivec2 {}(ivec2 p) {{", name);
        match replication {
            EdgeReplication::None => out.push_str("    return p;\n"),
            EdgeReplication::One => {
                let _ = writeln!(out, "    return p - ivec2(equal(p, {}));", size);
            }
            EdgeReplication::All => {
                let _ = writeln!(out, "    return min(p, {} - 1);", size);
            }
        }
        out.push_str("}\n\n");
    }
}

/// Emit `readY(ivec2)` and `readCbCr(ivec2)` for a multi-planar input.
pub(crate) fn emit_plane_readers(
    out: &mut String,
    side: &Side,
    d: &PixelFormatDescriptor,
    arrays: bool,
) {
    match side.kind {
        ResourceKind::Image => emit_image_readers(out, side, d, arrays),
        ResourceKind::Buffer => emit_buffer_readers(out, side, d),
    }
}

fn emit_image_readers(out: &mut String, side: &Side, d: &PixelFormatDescriptor, arrays: bool) {
    let name = |plane| resource_name(Direction::Input, false, PlaneSlot::Plane(plane));
    let cmax = glsl_float(container_max(d.container_bits()));
    let to_code = |raw: &str| {
        let code = format!("floor({} * {} + 0.5)", raw, cmax);
        if side.shift == 0 {
            code
        } else {
            let inv = 1.0 / (1u32 << side.shift) as f64;
            format!("floor({} * {})", code, glsl_float(inv))
        }
    };

    let coord = image_coord("p", "srcLayer", arrays);
    out.push_str("float readY(ivec2 p) {\n");
    let _ = writeln!(out, "    float raw = imageLoad({}, {}).r;", name(Plane::Y), coord);
    let _ = writeln!(out, "    return {};", to_code("raw"));
    out.push_str("}\n\n");

    out.push_str("vec2 readCbCr(ivec2 p) {\n");
    if d.is_two_plane() {
        let _ = writeln!(
            out,
            "    vec2 raw = imageLoad({}, {}).rg;",
            name(Plane::CbCr),
            coord
        );
    } else {
        let _ = writeln!(
            out,
            "    vec2 raw = vec2(imageLoad({}, {}).r, imageLoad({}, {}).r);",
            name(Plane::Cb),
            coord,
            name(Plane::Cr),
            coord
        );
    }
    let _ = writeln!(out, "    return {};", to_code("raw"));
    out.push_str("}\n\n");
}

fn emit_buffer_readers(out: &mut String, side: &Side, d: &PixelFormatDescriptor) {
    let name = |plane| resource_name(Direction::Input, true, PlaneSlot::Plane(plane));
    let bytes = d.bytes_per_sample();
    let shift = shift_suffix(">>", side.shift);
    let load = |buffer: String, idx: &str| format!("float(uint({}.data[{}]){})", buffer, idx, shift);

    out.push_str("float readY(ivec2 p) {\n");
    let _ = writeln!(
        out,
        "    uint idx = {};",
        buffer_index(Direction::Input, Plane::Y, bytes, 1, "p")
    );
    let _ = writeln!(out, "    return {};", load(name(Plane::Y), "idx"));
    out.push_str("}\n\n");

    out.push_str("vec2 readCbCr(ivec2 p) {\n");
    if d.is_two_plane() {
        let _ = writeln!(
            out,
            "    uint idx = {};",
            buffer_index(Direction::Input, Plane::CbCr, bytes, 2, "p")
        );
        let _ = writeln!(
            out,
            "    return vec2({}, {});",
            load(name(Plane::CbCr), "idx"),
            load(name(Plane::CbCr), "idx + 1u")
        );
    } else {
        let _ = writeln!(
            out,
            "    uint cbIdx = {};",
            buffer_index(Direction::Input, Plane::Cb, bytes, 1, "p")
        );
        let _ = writeln!(
            out,
            "    uint crIdx = {};",
            buffer_index(Direction::Input, Plane::Cr, bytes, 1, "p")
        );
        let _ = writeln!(
            out,
            "    return vec2({}, {});",
            load(name(Plane::Cb), "cbIdx"),
            load(name(Plane::Cr), "crIdx")
        );
    }
    out.push_str("}\n\n");
}

/// Emit `writeY(ivec2, float)` and `writeCbCr(ivec2, vec2)` for a multi-planar output.
pub(crate) fn emit_plane_writers(
    out: &mut String,
    side: &Side,
    d: &PixelFormatDescriptor,
    arrays: bool,
) {
    match side.kind {
        ResourceKind::Image => emit_image_writers(out, side, d, arrays),
        ResourceKind::Buffer => emit_buffer_writers(out, side, d),
    }
}

/// Factor from a rounded code to the normalized value stored through a UNORM view.
fn image_store_scale(shift: u32, d: &PixelFormatDescriptor) -> String {
    let scale = (1u32 << shift) as f64 / container_max(d.container_bits());
    glsl_float(scale)
}

fn emit_image_writers(out: &mut String, side: &Side, d: &PixelFormatDescriptor, arrays: bool) {
    let name = |plane| resource_name(Direction::Output, false, PlaneSlot::Plane(plane));
    let max = glsl_float(d.max_code() as f64);
    let scale = image_store_scale(side.shift, d);
    let coord = image_coord("p", "dstLayer", arrays);

    out.push_str("void writeY(ivec2 p, float code) {\n");
    let _ = writeln!(
        out,
        "    imageStore({}, {}, vec4(floor(clamp(code, 0.0, {}) + 0.5) * {}, 0.0, 0.0, 1.0));",
        name(Plane::Y),
        coord,
        max,
        scale
    );
    out.push_str("}\n\n");

    out.push_str("void writeCbCr(ivec2 p, vec2 code) {\n");
    let _ = writeln!(
        out,
        "    vec2 v = floor(clamp(code, 0.0, {}) + 0.5) * {};",
        max, scale
    );
    if d.is_two_plane() {
        let _ = writeln!(
            out,
            "    imageStore({}, {}, vec4(v, 0.0, 1.0));",
            name(Plane::CbCr),
            coord
        );
    } else {
        let _ = writeln!(
            out,
            "    imageStore({}, {}, vec4(v.x, 0.0, 0.0, 1.0));",
            name(Plane::Cb),
            coord
        );
        let _ = writeln!(
            out,
            "    imageStore({}, {}, vec4(v.y, 0.0, 0.0, 1.0));",
            name(Plane::Cr),
            coord
        );
    }
    out.push_str("}\n\n");
}

fn emit_buffer_writers(out: &mut String, side: &Side, d: &PixelFormatDescriptor) {
    let name = |plane| resource_name(Direction::Output, true, PlaneSlot::Plane(plane));
    let bytes = d.bytes_per_sample();
    let element = format!("uint{}_t", d.container_bits());
    let max = glsl_float(d.max_code() as f64);
    let shift = shift_suffix("<<", side.shift);

    out.push_str("void writeY(ivec2 p, float code) {\n");
    let _ = writeln!(
        out,
        "    uint idx = {};",
        buffer_index(Direction::Output, Plane::Y, bytes, 1, "p")
    );
    let _ = writeln!(
        out,
        "    {}.data[idx] = {}(uint(clamp(code, 0.0, {}) + 0.5){});",
        name(Plane::Y),
        element,
        max,
        shift
    );
    out.push_str("}\n\n");

    out.push_str("void writeCbCr(ivec2 p, vec2 code) {\n");
    let _ = writeln!(
        out,
        "    uvec2 v = uvec2(clamp(code, 0.0, {}) + 0.5){};",
        max, shift
    );
    if d.is_two_plane() {
        let buffer = name(Plane::CbCr);
        let _ = writeln!(
            out,
            "    uint idx = {};",
            buffer_index(Direction::Output, Plane::CbCr, bytes, 2, "p")
        );
        let _ = writeln!(out, "    {}.data[idx] = {}(v.x);", buffer, element);
        let _ = writeln!(out, "    {}.data[idx + 1u] = {}(v.y);", buffer, element);
    } else {
        let _ = writeln!(
            out,
            "    uint cbIdx = {};",
            buffer_index(Direction::Output, Plane::Cb, bytes, 1, "p")
        );
        let _ = writeln!(
            out,
            "    uint crIdx = {};",
            buffer_index(Direction::Output, Plane::Cr, bytes, 1, "p")
        );
        let _ = writeln!(out, "    {}.data[cbIdx] = {}(v.x);", name(Plane::Cb), element);
        let _ = writeln!(out, "    {}.data[crIdx] = {}(v.y);", name(Plane::Cr), element);
    }
    out.push_str("}\n\n");
}

/// Emit `writeSubsampledY(ivec2, float)` targeting the auxiliary luma image, which shares
/// the output Y plane's format. Being an image, it is MSB aligned even when the main
/// output is a buffer.
pub(crate) fn emit_subsampled_y_writer(
    out: &mut String,
    d: &PixelFormatDescriptor,
    arrays: bool,
) {
    let _ = writeln!(out, "void writeSubsampledY(ivec2 p, float code) {{");
    let _ = writeln!(
        out,
        "    imageStore(outputImageSubsampledY, {}, vec4(floor(clamp(code, 0.0, {}) + 0.5) * {}, 0.0, 0.0, 1.0));",
        image_coord("p", "dstLayer", arrays),
        glsl_float(d.max_code() as f64),
        image_store_scale(d.container_bits() - d.bit_depth, d)
    );
    out.push_str("}\n\n");
}

/// Emit `writeRGBA(ivec2, vec4)` for a single-plane output; the color is normalized.
pub(crate) fn emit_rgba_writer(
    out: &mut String,
    side: &Side,
    f: &SinglePlaneFormat,
    arrays: bool,
) {
    let name = resource_name(
        Direction::Output,
        side.kind == ResourceKind::Buffer,
        PlaneSlot::Combined,
    );
    out.push_str("void writeRGBA(ivec2 p, vec4 rgba) {\n");
    match side.kind {
        ResourceKind::Image => {
            let _ = writeln!(
                out,
                "    imageStore({}, {}, rgba);",
                name,
                image_coord("p", "dstLayer", arrays)
            );
        }
        ResourceKind::Buffer => {
            let bits = f.container_bits();
            let element = format!("uint{}_t", bits);
            let max = glsl_float(container_max(f.bit_depth));
            let _ = writeln!(
                out,
                "    uvec4 code = uvec4(clamp(rgba, 0.0, 1.0) * {} + 0.5){};",
                max,
                shift_suffix("<<", side.shift)
            );
            let _ = writeln!(
                out,
                "    uint idx = {};",
                buffer_index(Direction::Output, Plane::Y, bits / 8, f.component_count, "p")
            );
            let order = if f.bgr_order {
                ["b", "g", "r", "a"]
            } else {
                ["r", "g", "b", "a"]
            };
            for (i, component) in order.iter().enumerate() {
                let target = if i == 0 {
                    "idx".to_string()
                } else {
                    format!("idx + {}u", i)
                };
                let _ = writeln!(
                    out,
                    "    {}.data[{}] = {}(code.{});",
                    name, target, element, component
                );
            }
        }
    }
    out.push_str("}\n\n");
}

/// Emit `sampleRgb(ivec2)`, which reads the input through the YCbCr conversion sampler.
pub(crate) fn emit_sampled_reader(out: &mut String, arrays: bool) {
    out.push_str("vec3 sampleRgb(ivec2 p) {\n");
    out.push_str("    vec2 uv = (vec2(p) + 0.5) / vec2(pc.inputWidth, pc.inputHeight);\n");
    if arrays {
        out.push_str("    return texture(inputImageSampled, vec3(uv, float(pc.srcLayer))).rgb;\n");
    } else {
        out.push_str("    return texture(inputImageSampled, uv).rgb;\n");
    }
    out.push_str("}\n\n");
}
