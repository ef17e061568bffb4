//! YCbCr color models and the conversion matrix emitted for YCbCr to RGB.

use super::glsl_float;
use super::range::ColorRange;
use ash::vk;
use std::fmt::Write;

/// Luma coefficients of a YCbCr color model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YcbcrPrimaries {
    /// Blue weight in luma.
    pub kb: f64,
    /// Red weight in luma.
    pub kr: f64,
}

impl YcbcrPrimaries {
    /// ITU-R BT.601.
    pub const BT601: Self = Self {
        kb: 0.114,
        kr: 0.299,
    };
    /// ITU-R BT.709.
    pub const BT709: Self = Self {
        kb: 0.0722,
        kr: 0.2126,
    };
    /// ITU-R BT.2020 (non-constant luminance).
    pub const BT2020: Self = Self {
        kb: 0.0593,
        kr: 0.2627,
    };

    /// Green weight in luma.
    pub fn kg(&self) -> f64 {
        1.0 - self.kb - self.kr
    }
}

/// Standard YCbCr models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YcbcrModel {
    /// ITU-R BT.601.
    Bt601,
    /// ITU-R BT.709.
    #[default]
    Bt709,
    /// ITU-R BT.2020.
    Bt2020,
}

impl YcbcrModel {
    /// Luma coefficients of the model.
    pub fn primaries(self) -> YcbcrPrimaries {
        match self {
            YcbcrModel::Bt601 => YcbcrPrimaries::BT601,
            YcbcrModel::Bt709 => YcbcrPrimaries::BT709,
            YcbcrModel::Bt2020 => YcbcrPrimaries::BT2020,
        }
    }
}

impl From<YcbcrModel> for vk::SamplerYcbcrModelConversion {
    fn from(model: YcbcrModel) -> Self {
        match model {
            YcbcrModel::Bt601 => vk::SamplerYcbcrModelConversion::YCBCR_601,
            YcbcrModel::Bt709 => vk::SamplerYcbcrModelConversion::YCBCR_709,
            YcbcrModel::Bt2020 => vk::SamplerYcbcrModelConversion::YCBCR_2020,
        }
    }
}

impl From<ColorRange> for vk::SamplerYcbcrRange {
    fn from(range: ColorRange) -> Self {
        match range {
            ColorRange::Full => vk::SamplerYcbcrRange::ITU_FULL,
            ColorRange::Limited => vk::SamplerYcbcrRange::ITU_NARROW,
        }
    }
}

/// Color model and ranges used by a filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorConversion {
    /// Named model, used for the hardware sampler conversion.
    pub model: YcbcrModel,
    /// Coefficients for the shader matrix; defaults to the model's.
    pub primaries: YcbcrPrimaries,
    /// Range of the input samples.
    pub input_range: ColorRange,
    /// Range of the output samples (YCbCr outputs only).
    pub output_range: ColorRange,
}

impl ColorConversion {
    /// Conversion for `model` with limited-range input and output.
    pub fn new(model: YcbcrModel) -> Self {
        Self {
            model,
            primaries: model.primaries(),
            input_range: ColorRange::Limited,
            output_range: ColorRange::Limited,
        }
    }

    /// Set the input range.
    #[must_use]
    pub fn input_range(mut self, range: ColorRange) -> Self {
        self.input_range = range;
        self
    }

    /// Set the output range.
    #[must_use]
    pub fn output_range(mut self, range: ColorRange) -> Self {
        self.output_range = range;
        self
    }

    /// Override the matrix coefficients.
    #[must_use]
    pub fn primaries(mut self, primaries: YcbcrPrimaries) -> Self {
        self.primaries = primaries;
        self
    }
}

/// Scalar form of the YCbCr to RGB matrix for centered chroma.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YcbcrMatrix {
    /// Cr contribution to R.
    pub r_cr: f64,
    /// Cb contribution to G (subtracted).
    pub g_cb: f64,
    /// Cr contribution to G (subtracted).
    pub g_cr: f64,
    /// Cb contribution to B.
    pub b_cb: f64,
}

impl YcbcrMatrix {
    /// Derive the matrix from luma coefficients and the maximum Cb/Cr excursion
    /// (0.5 for normalized digital chroma).
    pub fn new(primaries: YcbcrPrimaries, cb_max: f64, cr_max: f64) -> Self {
        let YcbcrPrimaries { kb, kr } = primaries;
        let kg = primaries.kg();
        Self {
            r_cr: (1.0 - kr) / cr_max,
            g_cb: kb * (1.0 - kb) / (cb_max * kg),
            g_cr: kr * (1.0 - kr) / (cr_max * kg),
            b_cb: (1.0 - kb) / cb_max,
        }
    }

    /// Apply the matrix on the CPU; chroma is centered on zero.
    pub fn to_rgb(&self, y: f64, cb: f64, cr: f64) -> [f64; 3] {
        [
            y + self.r_cr * cr,
            y - self.g_cb * cb - self.g_cr * cr,
            y + self.b_cb * cb,
        ]
    }
}

/// Emit `ycbcrToRgb(vec3)`, taking luma in `[0, 1]` and chroma centered on zero.
pub(crate) fn emit_ycbcr_to_rgb(out: &mut String, m: &YcbcrMatrix) {
    let _ = writeln!(out, "vec3 ycbcrToRgb(vec3 ycc) {{");
    let _ = writeln!(out, "    return vec3(");
    let _ = writeln!(out, "        ycc.x + {} * ycc.z,", glsl_float(m.r_cr));
    let _ = writeln!(
        out,
        "        ycc.x - {} * ycc.y - {} * ycc.z,",
        glsl_float(m.g_cb),
        glsl_float(m.g_cr)
    );
    let _ = writeln!(out, "        ycc.x + {} * ycc.y);", glsl_float(m.b_cb));
    let _ = writeln!(out, "}}\n");
}
