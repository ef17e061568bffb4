//! Pixel format descriptors.
//!
//! Maps a Vulkan format to the plane structure, bit depth and chroma subsampling the
//! shader generator and recorder need. Multi-planar YCbCr formats resolve to a
//! [`PixelFormatDescriptor`]; plain RGBA-like formats resolve to a [`SinglePlaneFormat`]
//! which carries no multi-plane information. Anything else is an error, so "unknown"
//! and "single plane" are never confused.

use crate::error::{Result, YuvForgeError};
use ash::vk;

/// Maximum number of memory planes a supported format can have.
pub const MAX_PLANES: usize = 3;

/// How the chroma samples of a multi-planar format are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneLayout {
    /// Y plane plus one plane of interleaved Cb/Cr pairs (NV12, P010, NV16...).
    TwoPlane,
    /// Separate Y, Cb and Cr planes (I420, YUV444...).
    ThreePlane,
}

/// A logical plane of a YCbCr format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plane {
    /// Luma.
    Y,
    /// Interleaved chroma of a 2-plane format.
    CbCr,
    /// Blue-difference chroma of a 3-plane format.
    Cb,
    /// Red-difference chroma of a 3-plane format.
    Cr,
}

impl Plane {
    /// Suffix used for GLSL identifiers of this plane.
    pub fn suffix(self) -> &'static str {
        match self {
            Plane::Y => "Y",
            Plane::CbCr => "CbCr",
            Plane::Cb => "Cb",
            Plane::Cr => "Cr",
        }
    }

    /// Memory plane index within the image.
    pub fn index(self) -> usize {
        match self {
            Plane::Y => 0,
            Plane::CbCr | Plane::Cb => 1,
            Plane::Cr => 2,
        }
    }

    /// Number of components stored per texel of this plane.
    pub fn component_count(self) -> u32 {
        match self {
            Plane::CbCr => 2,
            _ => 1,
        }
    }

    /// Whether the plane holds chroma samples.
    pub fn is_chroma(self) -> bool {
        !matches!(self, Plane::Y)
    }
}

const TWO_PLANES: [Plane; 2] = [Plane::Y, Plane::CbCr];
const THREE_PLANES: [Plane; 3] = [Plane::Y, Plane::Cb, Plane::Cr];

/// Resolved description of a multi-planar YCbCr format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormatDescriptor {
    /// The Vulkan format this was resolved from.
    pub format: vk::Format,
    /// Number of memory planes (2 or 3).
    pub plane_count: u32,
    /// Significant bits per sample (8, 10, 12 or 16).
    pub bit_depth: u32,
    /// Horizontal chroma subsampling ratio (1 or 2).
    pub chroma_subsample_x: u32,
    /// Vertical chroma subsampling ratio (1 or 2).
    pub chroma_subsample_y: u32,
    /// Semi-planar or fully planar storage.
    pub layout: PlaneLayout,
}

impl PixelFormatDescriptor {
    fn new(format: vk::Format, bit_depth: u32, sx: u32, sy: u32, layout: PlaneLayout) -> Self {
        Self {
            format,
            plane_count: match layout {
                PlaneLayout::TwoPlane => 2,
                PlaneLayout::ThreePlane => 3,
            },
            bit_depth,
            chroma_subsample_x: sx,
            chroma_subsample_y: sy,
            layout,
        }
    }

    /// Whether chroma is stored interleaved in a single plane.
    pub fn is_two_plane(&self) -> bool {
        self.layout == PlaneLayout::TwoPlane
    }

    /// The logical planes of this format in memory-plane order.
    pub fn planes(&self) -> &'static [Plane] {
        match self.layout {
            PlaneLayout::TwoPlane => &TWO_PLANES,
            PlaneLayout::ThreePlane => &THREE_PLANES,
        }
    }

    /// Bits of the storage container for one sample (8 or 16).
    pub fn container_bits(&self) -> u32 {
        if self.bit_depth > 8 {
            16
        } else {
            8
        }
    }

    /// Bytes per sample in memory.
    pub fn bytes_per_sample(&self) -> u32 {
        self.container_bits() / 8
    }

    /// Bytes per texel of the given plane.
    pub fn plane_bytes_per_texel(&self, plane: Plane) -> u32 {
        self.bytes_per_sample() * plane.component_count()
    }

    /// Format of a single-plane image view aliasing the given plane.
    pub fn plane_view_format(&self, plane: Plane) -> vk::Format {
        match (self.container_bits(), plane.component_count()) {
            (8, 1) => vk::Format::R8_UNORM,
            (8, _) => vk::Format::R8G8_UNORM,
            (_, 1) => vk::Format::R16_UNORM,
            _ => vk::Format::R16G16_UNORM,
        }
    }

    /// GLSL storage image format qualifier for the given plane.
    pub fn plane_glsl_format(&self, plane: Plane) -> &'static str {
        match (self.container_bits(), plane.component_count()) {
            (8, 1) => "r8",
            (8, _) => "rg8",
            (_, 1) => "r16",
            _ => "rg16",
        }
    }

    /// Extent of the given plane for a picture of `width` x `height` luma samples.
    pub fn plane_extent(&self, plane: Plane, width: u32, height: u32) -> (u32, u32) {
        if plane.is_chroma() {
            (
                width.div_ceil(self.chroma_subsample_x),
                height.div_ceil(self.chroma_subsample_y),
            )
        } else {
            (width, height)
        }
    }

    /// Largest code value representable at this bit depth.
    pub fn max_code(&self) -> u32 {
        (1u32 << self.bit_depth) - 1
    }
}

/// Resolved description of a single-plane, RGBA-like format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinglePlaneFormat {
    /// The Vulkan format this was resolved from.
    pub format: vk::Format,
    /// Significant bits per component.
    pub bit_depth: u32,
    /// Components per texel.
    pub component_count: u32,
    /// Bytes per texel in memory.
    pub bytes_per_pixel: u32,
    /// Whether components are packed into one 32-bit word (A2R10G10B10 style).
    pub packed: bool,
    /// Whether memory order is B, G, R, A.
    pub bgr_order: bool,
}

impl SinglePlaneFormat {
    /// GLSL storage image format qualifier.
    pub fn glsl_format(&self) -> &'static str {
        if self.packed {
            "rgb10_a2"
        } else if self.bytes_per_pixel == 4 {
            "rgba8"
        } else {
            "rgba16"
        }
    }

    /// Bits of the storage container for one component.
    pub fn container_bits(&self) -> u32 {
        if self.packed {
            self.bit_depth
        } else {
            self.bytes_per_pixel * 8 / self.component_count
        }
    }
}

/// Result of resolving a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatLayout {
    /// RGBA-like format with a single plane and no chroma information.
    SinglePlane(SinglePlaneFormat),
    /// Multi-planar YCbCr format.
    MultiPlane(PixelFormatDescriptor),
}

impl FormatLayout {
    /// The Vulkan format this layout describes.
    pub fn format(&self) -> vk::Format {
        match self {
            FormatLayout::SinglePlane(f) => f.format,
            FormatLayout::MultiPlane(d) => d.format,
        }
    }

    /// Number of memory planes.
    pub fn plane_count(&self) -> u32 {
        match self {
            FormatLayout::SinglePlane(_) => 1,
            FormatLayout::MultiPlane(d) => d.plane_count,
        }
    }

    /// Significant bits per sample.
    pub fn bit_depth(&self) -> u32 {
        match self {
            FormatLayout::SinglePlane(f) => f.bit_depth,
            FormatLayout::MultiPlane(d) => d.bit_depth,
        }
    }

    /// The multi-plane descriptor, if this is a YCbCr format.
    pub fn multi_plane(&self) -> Option<&PixelFormatDescriptor> {
        match self {
            FormatLayout::MultiPlane(d) => Some(d),
            FormatLayout::SinglePlane(_) => None,
        }
    }

    /// The single-plane descriptor, if this is an RGBA-like format.
    pub fn single_plane(&self) -> Option<&SinglePlaneFormat> {
        match self {
            FormatLayout::SinglePlane(f) => Some(f),
            FormatLayout::MultiPlane(_) => None,
        }
    }
}

/// Resolve a Vulkan format into its plane description.
///
/// Returns [`YuvForgeError::UnsupportedFormat`] for formats outside the supported set.
pub fn resolve_format(format: vk::Format) -> Result<FormatLayout> {
    use PlaneLayout::{ThreePlane, TwoPlane};

    let multi = |bits, sx, sy, layout| -> Result<FormatLayout> {
        Ok(FormatLayout::MultiPlane(PixelFormatDescriptor::new(
            format, bits, sx, sy, layout,
        )))
    };
    let single = |bit_depth, bytes_per_pixel, packed, bgr_order| -> Result<FormatLayout> {
        Ok(FormatLayout::SinglePlane(SinglePlaneFormat {
            format,
            bit_depth,
            component_count: 4,
            bytes_per_pixel,
            packed,
            bgr_order,
        }))
    };

    match format {
        // 2-plane 8-bit.
        vk::Format::G8_B8R8_2PLANE_420_UNORM => multi(8, 2, 2, TwoPlane),
        vk::Format::G8_B8R8_2PLANE_422_UNORM => multi(8, 2, 1, TwoPlane),
        vk::Format::G8_B8R8_2PLANE_444_UNORM => multi(8, 1, 1, TwoPlane),
        // 2-plane 10-bit.
        vk::Format::G10X6_B10X6R10X6_2PLANE_420_UNORM_3PACK16 => multi(10, 2, 2, TwoPlane),
        vk::Format::G10X6_B10X6R10X6_2PLANE_422_UNORM_3PACK16 => multi(10, 2, 1, TwoPlane),
        vk::Format::G10X6_B10X6R10X6_2PLANE_444_UNORM_3PACK16 => multi(10, 1, 1, TwoPlane),
        // 2-plane 12-bit.
        vk::Format::G12X4_B12X4R12X4_2PLANE_420_UNORM_3PACK16 => multi(12, 2, 2, TwoPlane),
        vk::Format::G12X4_B12X4R12X4_2PLANE_422_UNORM_3PACK16 => multi(12, 2, 1, TwoPlane),
        vk::Format::G12X4_B12X4R12X4_2PLANE_444_UNORM_3PACK16 => multi(12, 1, 1, TwoPlane),
        // 2-plane 16-bit.
        vk::Format::G16_B16R16_2PLANE_420_UNORM => multi(16, 2, 2, TwoPlane),
        vk::Format::G16_B16R16_2PLANE_422_UNORM => multi(16, 2, 1, TwoPlane),
        vk::Format::G16_B16R16_2PLANE_444_UNORM => multi(16, 1, 1, TwoPlane),
        // 3-plane 8-bit.
        vk::Format::G8_B8_R8_3PLANE_420_UNORM => multi(8, 2, 2, ThreePlane),
        vk::Format::G8_B8_R8_3PLANE_422_UNORM => multi(8, 2, 1, ThreePlane),
        vk::Format::G8_B8_R8_3PLANE_444_UNORM => multi(8, 1, 1, ThreePlane),
        // 3-plane 10-bit.
        vk::Format::G10X6_B10X6_R10X6_3PLANE_420_UNORM_3PACK16 => multi(10, 2, 2, ThreePlane),
        vk::Format::G10X6_B10X6_R10X6_3PLANE_422_UNORM_3PACK16 => multi(10, 2, 1, ThreePlane),
        vk::Format::G10X6_B10X6_R10X6_3PLANE_444_UNORM_3PACK16 => multi(10, 1, 1, ThreePlane),
        // 3-plane 12-bit.
        vk::Format::G12X4_B12X4_R12X4_3PLANE_420_UNORM_3PACK16 => multi(12, 2, 2, ThreePlane),
        vk::Format::G12X4_B12X4_R12X4_3PLANE_422_UNORM_3PACK16 => multi(12, 2, 1, ThreePlane),
        vk::Format::G12X4_B12X4_R12X4_3PLANE_444_UNORM_3PACK16 => multi(12, 1, 1, ThreePlane),
        // 3-plane 16-bit.
        vk::Format::G16_B16_R16_3PLANE_420_UNORM => multi(16, 2, 2, ThreePlane),
        vk::Format::G16_B16_R16_3PLANE_422_UNORM => multi(16, 2, 1, ThreePlane),
        vk::Format::G16_B16_R16_3PLANE_444_UNORM => multi(16, 1, 1, ThreePlane),
        // RGBA-like.
        vk::Format::R8G8B8A8_UNORM => single(8, 4, false, false),
        vk::Format::B8G8R8A8_UNORM => single(8, 4, false, true),
        vk::Format::R16G16B16A16_UNORM => single(16, 8, false, false),
        vk::Format::R10X6G10X6B10X6A10X6_UNORM_4PACK16 => single(10, 8, false, false),
        vk::Format::R12X4G12X4B12X4A12X4_UNORM_4PACK16 => single(12, 8, false, false),
        // Packed 10-bit, also used for packed 4:4:4 YCbCr (Y410).
        vk::Format::A2B10G10R10_UNORM_PACK32 => single(10, 4, true, false),
        vk::Format::A2R10G10B10_UNORM_PACK32 => single(10, 4, true, true),
        other => Err(YuvForgeError::UnsupportedFormat(other)),
    }
}

/// Geometry of one plane inside a linear buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaneGeometry {
    /// Byte offset of the first row.
    pub offset: vk::DeviceSize,
    /// Bytes between the starts of consecutive rows.
    pub row_pitch: vk::DeviceSize,
    /// Width of the plane in texels.
    pub width: u32,
    /// Height of the plane in rows.
    pub height: u32,
    /// Bytes per texel.
    pub bytes_per_texel: u32,
}

impl PlaneGeometry {
    /// Bytes covered by this plane.
    pub fn size(&self) -> vk::DeviceSize {
        self.row_pitch * self.height as vk::DeviceSize
    }
}

/// Layout of a picture stored in a linear buffer, one entry per memory plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferLayout {
    /// Format of the stored picture.
    pub format: vk::Format,
    /// Per-plane geometry in memory-plane order.
    pub planes: Vec<PlaneGeometry>,
}

impl BufferLayout {
    /// Tightly packed layout: planes back to back, row pitch equal to the row size.
    pub fn packed(format: vk::Format, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(YuvForgeError::InvalidInput(format!(
                "buffer layout needs a non-empty extent, got {}x{}",
                width, height
            )));
        }

        let mut planes = Vec::with_capacity(MAX_PLANES);
        match resolve_format(format)? {
            FormatLayout::SinglePlane(f) => {
                planes.push(PlaneGeometry {
                    offset: 0,
                    row_pitch: width as vk::DeviceSize * f.bytes_per_pixel as vk::DeviceSize,
                    width,
                    height,
                    bytes_per_texel: f.bytes_per_pixel,
                });
            }
            FormatLayout::MultiPlane(d) => {
                let mut offset = 0;
                for &plane in d.planes() {
                    let (w, h) = d.plane_extent(plane, width, height);
                    let bytes_per_texel = d.plane_bytes_per_texel(plane);
                    let geometry = PlaneGeometry {
                        offset,
                        row_pitch: w as vk::DeviceSize * bytes_per_texel as vk::DeviceSize,
                        width: w,
                        height: h,
                        bytes_per_texel,
                    };
                    offset += geometry.size();
                    planes.push(geometry);
                }
            }
        }

        Ok(Self { format, planes })
    }

    /// Total bytes spanned by all planes.
    pub fn total_size(&self) -> vk::DeviceSize {
        self.planes
            .iter()
            .map(|p| p.offset + p.size())
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================
    // Resolver tests.
    // ========================

    #[test]
    fn test_resolve_nv12() {
        let layout = resolve_format(vk::Format::G8_B8R8_2PLANE_420_UNORM).unwrap();
        let d = layout.multi_plane().unwrap();
        assert_eq!(d.plane_count, 2);
        assert_eq!(d.bit_depth, 8);
        assert_eq!((d.chroma_subsample_x, d.chroma_subsample_y), (2, 2));
        assert!(d.is_two_plane());
        assert_eq!(d.planes(), &[Plane::Y, Plane::CbCr]);
    }

    #[test]
    fn test_resolve_p010_and_p012() {
        let p010 = resolve_format(vk::Format::G10X6_B10X6R10X6_2PLANE_420_UNORM_3PACK16).unwrap();
        assert_eq!(p010.bit_depth(), 10);
        assert_eq!(p010.multi_plane().unwrap().container_bits(), 16);

        let p012 = resolve_format(vk::Format::G12X4_B12X4R12X4_2PLANE_420_UNORM_3PACK16).unwrap();
        assert_eq!(p012.bit_depth(), 12);
        assert_eq!(p012.plane_count(), 2);
    }

    #[test]
    fn test_resolve_422_subsampling() {
        let nv16 = resolve_format(vk::Format::G8_B8R8_2PLANE_422_UNORM).unwrap();
        let d = nv16.multi_plane().unwrap();
        assert_eq!((d.chroma_subsample_x, d.chroma_subsample_y), (2, 1));
    }

    #[test]
    fn test_resolve_three_plane() {
        let i420 = resolve_format(vk::Format::G8_B8_R8_3PLANE_420_UNORM).unwrap();
        let d = i420.multi_plane().unwrap();
        assert_eq!(d.plane_count, 3);
        assert!(!d.is_two_plane());
        assert_eq!(d.planes(), &[Plane::Y, Plane::Cb, Plane::Cr]);

        let yuv444 = resolve_format(vk::Format::G8_B8_R8_3PLANE_444_UNORM).unwrap();
        let d = yuv444.multi_plane().unwrap();
        assert_eq!((d.chroma_subsample_x, d.chroma_subsample_y), (1, 1));
    }

    #[test]
    fn test_resolve_single_plane_has_no_multi_plane_info() {
        for format in [
            vk::Format::R8G8B8A8_UNORM,
            vk::Format::B8G8R8A8_UNORM,
            vk::Format::A2B10G10R10_UNORM_PACK32,
            vk::Format::A2R10G10B10_UNORM_PACK32,
            vk::Format::R12X4G12X4B12X4A12X4_UNORM_4PACK16,
        ] {
            let layout = resolve_format(format).unwrap();
            assert_eq!(layout.plane_count(), 1, "{:?}", format);
            assert!(layout.multi_plane().is_none());
            assert!(layout.single_plane().is_some());
        }
    }

    #[test]
    fn test_resolve_unknown_format_is_error() {
        let err = resolve_format(vk::Format::D24_UNORM_S8_UINT).unwrap_err();
        assert!(matches!(
            err,
            YuvForgeError::UnsupportedFormat(vk::Format::D24_UNORM_S8_UINT)
        ));
    }

    #[test]
    fn test_plane_formats() {
        let nv12 = *resolve_format(vk::Format::G8_B8R8_2PLANE_420_UNORM)
            .unwrap()
            .multi_plane()
            .unwrap();
        assert_eq!(nv12.plane_glsl_format(Plane::Y), "r8");
        assert_eq!(nv12.plane_glsl_format(Plane::CbCr), "rg8");
        assert_eq!(nv12.plane_view_format(Plane::CbCr), vk::Format::R8G8_UNORM);

        let p010 = *resolve_format(vk::Format::G10X6_B10X6R10X6_2PLANE_420_UNORM_3PACK16)
            .unwrap()
            .multi_plane()
            .unwrap();
        assert_eq!(p010.plane_glsl_format(Plane::Y), "r16");
        assert_eq!(p010.plane_glsl_format(Plane::CbCr), "rg16");
        assert_eq!(p010.plane_view_format(Plane::Y), vk::Format::R16_UNORM);
    }

    #[test]
    fn test_single_plane_glsl_formats() {
        let f = |format| *resolve_format(format).unwrap().single_plane().unwrap();
        assert_eq!(f(vk::Format::R8G8B8A8_UNORM).glsl_format(), "rgba8");
        assert_eq!(f(vk::Format::R16G16B16A16_UNORM).glsl_format(), "rgba16");
        assert_eq!(f(vk::Format::A2B10G10R10_UNORM_PACK32).glsl_format(), "rgb10_a2");
        assert_eq!(f(vk::Format::R16G16B16A16_UNORM).container_bits(), 16);
        assert!(f(vk::Format::B8G8R8A8_UNORM).bgr_order);
    }

    #[test]
    fn test_plane_extent_rounds_up() {
        let d = *resolve_format(vk::Format::G8_B8R8_2PLANE_420_UNORM)
            .unwrap()
            .multi_plane()
            .unwrap();
        assert_eq!(d.plane_extent(Plane::Y, 1921, 1081), (1921, 1081));
        assert_eq!(d.plane_extent(Plane::CbCr, 1921, 1081), (961, 541));
    }

    // ========================
    // BufferLayout tests.
    // ========================

    #[test]
    fn test_packed_layout_nv12() {
        let layout = BufferLayout::packed(vk::Format::G8_B8R8_2PLANE_420_UNORM, 64, 64).unwrap();
        assert_eq!(layout.planes.len(), 2);
        assert_eq!(layout.planes[0].row_pitch, 64);
        assert_eq!(layout.planes[1].offset, 64 * 64);
        assert_eq!(layout.planes[1].row_pitch, 64);
        assert_eq!(layout.planes[1].height, 32);
        assert_eq!(layout.total_size(), 64 * 64 * 3 / 2);
    }

    #[test]
    fn test_packed_layout_i420_and_p010() {
        let i420 = BufferLayout::packed(vk::Format::G8_B8_R8_3PLANE_420_UNORM, 1920, 1080).unwrap();
        assert_eq!(i420.planes.len(), 3);
        assert_eq!(i420.planes[1].row_pitch, 960);
        assert_eq!(i420.planes[2].offset, 1920 * 1080 + 960 * 540);
        assert_eq!(i420.total_size(), 1920 * 1080 * 3 / 2);

        let p010 = BufferLayout::packed(
            vk::Format::G10X6_B10X6R10X6_2PLANE_420_UNORM_3PACK16,
            1920,
            1080,
        )
        .unwrap();
        assert_eq!(p010.planes[0].row_pitch, 3840);
        assert_eq!(p010.planes[1].row_pitch, 3840);
        assert_eq!(p010.total_size(), 1920 * 1080 * 3);
    }

    #[test]
    fn test_packed_layout_rgba() {
        let layout = BufferLayout::packed(vk::Format::R8G8B8A8_UNORM, 16, 8).unwrap();
        assert_eq!(layout.planes.len(), 1);
        assert_eq!(layout.planes[0].row_pitch, 64);
        assert_eq!(layout.total_size(), 16 * 8 * 4);
    }

    #[test]
    fn test_packed_layout_rejects_empty_extent() {
        assert!(BufferLayout::packed(vk::Format::R8G8B8A8_UNORM, 0, 8).is_err());
    }
}
