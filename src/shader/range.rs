//! Color range constants and the normalize/denormalize functions they are baked into.
//!
//! All constants are computed here in `f64` and printed as literals, so the shader never
//! divides at runtime and identical (bit depth, range) pairs always produce identical text.

use super::glsl_float;
use std::fmt::Write;

/// Numeric range occupied by valid sample codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorRange {
    /// Codes span `[0, 2^bitDepth - 1]`.
    Full,
    /// ITU studio swing with headroom and footroom (Y 16..235, C 16..240 at 8 bits).
    #[default]
    Limited,
}

/// Black/white levels and chroma scaling for one (bit depth, range) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeConstants {
    /// Significant bits per sample.
    pub bit_depth: u32,
    /// Range the constants describe.
    pub range: ColorRange,
    /// Luma code of black.
    pub y_black: f64,
    /// Luma code of white.
    pub y_white: f64,
    /// Lowest chroma code of the range.
    pub c_min: f64,
    /// Highest chroma code of the range.
    pub c_max: f64,
}

impl RangeConstants {
    /// Compute the constants for `bit_depth` (8..=16) and `range`.
    pub fn new(bit_depth: u32, range: ColorRange) -> Self {
        let max = ((1u64 << bit_depth) - 1) as f64;
        match range {
            ColorRange::Full => Self {
                bit_depth,
                range,
                y_black: 0.0,
                y_white: max,
                c_min: 0.0,
                c_max: max,
            },
            ColorRange::Limited => {
                // Limited-range tables are the 8-bit values scaled by 2^(bitDepth - 8).
                let scale = (1u64 << bit_depth.saturating_sub(8)) as f64;
                Self {
                    bit_depth,
                    range,
                    y_black: 16.0 * scale,
                    y_white: 235.0 * scale,
                    c_min: 16.0 * scale,
                    c_max: 240.0 * scale,
                }
            }
        }
    }

    /// Largest representable code.
    pub fn max_code(&self) -> f64 {
        ((1u64 << self.bit_depth) - 1) as f64
    }

    /// Distance between luma black and white.
    pub fn y_scale(&self) -> f64 {
        self.y_white - self.y_black
    }

    /// Chroma code that represents zero color difference.
    pub fn c_zero(&self) -> f64 {
        (1u64 << (self.bit_depth - 1)) as f64
    }

    /// Chroma codes spanned by a full unit of color difference.
    pub fn c_scale(&self) -> f64 {
        match self.range {
            ColorRange::Full => self.max_code(),
            ColorRange::Limited => self.c_max - self.c_min,
        }
    }

    /// Luma code to normalized `[0, 1]` (black to white). Not clamped.
    pub fn normalize_y(&self, code: f64) -> f64 {
        (code - self.y_black) * (1.0 / self.y_scale())
    }

    /// Chroma code to normalized `[0, 1]` with zero difference at 0.5. Not clamped.
    pub fn normalize_c(&self, code: f64) -> f64 {
        (code - self.c_zero()) * (1.0 / self.c_scale()) + 0.5
    }

    /// Normalized luma back to an unrounded code.
    pub fn denormalize_y(&self, value: f64) -> f64 {
        value * self.y_scale() + self.y_black
    }

    /// Normalized chroma back to an unrounded code.
    pub fn denormalize_c(&self, value: f64) -> f64 {
        (value - 0.5) * self.c_scale() + self.c_zero()
    }

    /// Round and clamp an unrounded code the way the shader writers do.
    pub fn to_code(&self, value: f64) -> u32 {
        (value.clamp(0.0, self.max_code()) + 0.5).floor() as u32
    }
}

/// Emit `normalizeY` and `normalizeCbCr` for the input side.
pub(crate) fn emit_normalize(out: &mut String, k: &RangeConstants) {
    let _ = writeln!(
        out,
        "// Input range: {}-bit {:?}",
        k.bit_depth, k.range
    );
    let _ = writeln!(out, "float normalizeY(float code) {{");
    let _ = writeln!(
        out,
        "    return (code - {}) * {};",
        glsl_float(k.y_black),
        glsl_float(1.0 / k.y_scale())
    );
    let _ = writeln!(out, "}}\n");
    let _ = writeln!(out, "vec2 normalizeCbCr(vec2 code) {{");
    let _ = writeln!(
        out,
        "    return (code - {}) * {} + 0.5;",
        glsl_float(k.c_zero()),
        glsl_float(1.0 / k.c_scale())
    );
    let _ = writeln!(out, "}}\n");
}

/// Emit `denormalizeY` and `denormalizeCbCr` for the output side.
///
/// Results are unrounded codes; the writers clamp and round.
pub(crate) fn emit_denormalize(out: &mut String, k: &RangeConstants) {
    let _ = writeln!(
        out,
        "// Output range: {}-bit {:?}",
        k.bit_depth, k.range
    );
    let _ = writeln!(out, "float denormalizeY(float value) {{");
    let _ = writeln!(
        out,
        "    return value * {} + {};",
        glsl_float(k.y_scale()),
        glsl_float(k.y_black)
    );
    let _ = writeln!(out, "}}\n");
    let _ = writeln!(out, "vec2 denormalizeCbCr(vec2 value) {{");
    let _ = writeln!(
        out,
        "    return (value - 0.5) * {} + {};",
        glsl_float(k.c_scale()),
        glsl_float(k.c_zero())
    );
    let _ = writeln!(out, "}}\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPTHS: [u32; 4] = [8, 10, 12, 16];
    const RANGES: [ColorRange; 2] = [ColorRange::Limited, ColorRange::Full];

    // ========================
    // Table tests.
    // ========================

    #[test]
    fn test_limited_range_tables() {
        let expected = [
            (8, 16.0, 235.0, 16.0, 240.0),
            (10, 64.0, 940.0, 64.0, 960.0),
            (12, 256.0, 3760.0, 256.0, 3840.0),
            (16, 4096.0, 60160.0, 4096.0, 61440.0),
        ];
        for (depth, y_black, y_white, c_min, c_max) in expected {
            let k = RangeConstants::new(depth, ColorRange::Limited);
            assert_eq!(k.y_black, y_black, "{}-bit", depth);
            assert_eq!(k.y_white, y_white, "{}-bit", depth);
            assert_eq!(k.c_min, c_min, "{}-bit", depth);
            assert_eq!(k.c_max, c_max, "{}-bit", depth);
        }
    }

    #[test]
    fn test_chroma_zero_and_scale() {
        let k = RangeConstants::new(8, ColorRange::Limited);
        assert_eq!(k.c_zero(), 128.0);
        assert_eq!(k.c_scale(), 224.0);

        let k = RangeConstants::new(10, ColorRange::Limited);
        assert_eq!(k.c_zero(), 512.0);
        assert_eq!(k.c_scale(), 896.0);

        let k = RangeConstants::new(8, ColorRange::Full);
        assert_eq!(k.c_zero(), 128.0);
        assert_eq!(k.c_scale(), 255.0);
    }

    #[test]
    fn test_full_range_spans_all_codes() {
        for depth in DEPTHS {
            let k = RangeConstants::new(depth, ColorRange::Full);
            let max = ((1u64 << depth) - 1) as f64;
            assert_eq!(k.y_black, 0.0);
            assert_eq!(k.y_white, max);
            assert_eq!(k.c_min, 0.0);
            assert_eq!(k.c_max, max);
        }
    }

    // ========================
    // Normalization tests.
    // ========================

    #[test]
    fn test_10bit_limited_black_and_white() {
        let k = RangeConstants::new(10, ColorRange::Limited);
        assert_eq!(k.normalize_y(64.0), 0.0);
        assert!((k.normalize_y(940.0) - 1.0).abs() < 1e-12);
        assert!(k.normalize_y(0.0) < 0.0);
        assert!(k.normalize_y(1023.0) > 1.0);
        assert!((k.normalize_c(512.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_round_trip_within_one_lsb() {
        for depth in DEPTHS {
            for range in RANGES {
                let k = RangeConstants::new(depth, range);
                for code in 0..=(1u32 << depth) - 1 {
                    let y = k.to_code(k.denormalize_y(k.normalize_y(code as f64)));
                    let c = k.to_code(k.denormalize_c(k.normalize_c(code as f64)));
                    assert!(
                        y.abs_diff(code) <= 1,
                        "luma {} -> {} at {}-bit {:?}",
                        code,
                        y,
                        depth,
                        range
                    );
                    assert!(
                        c.abs_diff(code) <= 1,
                        "chroma {} -> {} at {}-bit {:?}",
                        code,
                        c,
                        depth,
                        range
                    );
                }
            }
        }
    }

    #[test]
    fn test_to_code_clamps() {
        let k = RangeConstants::new(8, ColorRange::Limited);
        assert_eq!(k.to_code(-3.0), 0);
        assert_eq!(k.to_code(300.0), 255);
        assert_eq!(k.to_code(127.5), 128);
    }

    // ========================
    // Emission tests.
    // ========================

    #[test]
    fn test_emission_is_deterministic() {
        for depth in DEPTHS {
            for range in RANGES {
                let mut first = String::new();
                let mut second = String::new();
                emit_normalize(&mut first, &RangeConstants::new(depth, range));
                emit_denormalize(&mut first, &RangeConstants::new(depth, range));
                emit_normalize(&mut second, &RangeConstants::new(depth, range));
                emit_denormalize(&mut second, &RangeConstants::new(depth, range));
                assert_eq!(first, second);
            }
        }
    }

    #[test]
    fn test_emitted_constants_match_tables() {
        let mut src = String::new();
        emit_normalize(&mut src, &RangeConstants::new(10, ColorRange::Limited));
        emit_denormalize(&mut src, &RangeConstants::new(10, ColorRange::Limited));
        assert!(src.contains("(code - 64.0)"));
        assert!(src.contains("(code - 512.0)"));
        assert!(src.contains("value * 876.0 + 64.0"));
        assert!(src.contains("(value - 0.5) * 896.0 + 512.0"));
        assert!(!src
            .lines()
            .filter(|line| !line.starts_with("//"))
            .any(|line| line.contains('/')));
    }
}
