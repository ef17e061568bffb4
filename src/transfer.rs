//! Plane-wise copies between images and buffers, without conversion.
//!
//! Multi-planar images are copied one memory plane at a time using the `PLANE_n` aspects;
//! chroma planes use their subsampled extent. Single-plane images use the `COLOR` aspect.

use crate::error::{Result, YuvForgeError};
use crate::filter::{BufferResource, ImageResource};
use crate::format::{resolve_format, FormatLayout};
use crate::vulkan::DeviceContext;
use ash::vk;
use tracing::trace;

/// A copy between two resources holding the same format.
#[derive(Debug, Clone, Copy)]
pub enum TransferOp<'a> {
    ImageToBuffer {
        src: &'a ImageResource,
        dst: &'a BufferResource,
    },
    BufferToImage {
        src: &'a BufferResource,
        dst: &'a ImageResource,
    },
    ImageToImage {
        src: &'a ImageResource,
        dst: &'a ImageResource,
    },
}

/// Aspect of memory plane `index`.
pub fn plane_aspect(index: usize) -> vk::ImageAspectFlags {
    match index {
        0 => vk::ImageAspectFlags::PLANE_0,
        1 => vk::ImageAspectFlags::PLANE_1,
        _ => vk::ImageAspectFlags::PLANE_2,
    }
}

/// Aspect, extent and bytes per texel of every memory plane of `format` at `extent`.
fn plane_regions(
    format: vk::Format,
    extent: vk::Extent2D,
) -> Result<Vec<(vk::ImageAspectFlags, vk::Extent2D, u32)>> {
    Ok(match resolve_format(format)? {
        FormatLayout::SinglePlane(f) => {
            vec![(vk::ImageAspectFlags::COLOR, extent, f.bytes_per_pixel)]
        }
        FormatLayout::MultiPlane(d) => d
            .planes()
            .iter()
            .enumerate()
            .map(|(index, &plane)| {
                let (width, height) = d.plane_extent(plane, extent.width, extent.height);
                (
                    plane_aspect(index),
                    vk::Extent2D { width, height },
                    d.plane_bytes_per_texel(plane),
                )
            })
            .collect(),
    })
}

fn subresource(aspect: vk::ImageAspectFlags, layer: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: aspect,
        mip_level: 0,
        base_array_layer: layer,
        layer_count: 1,
    }
}

fn extent3d(extent: vk::Extent2D) -> vk::Extent3D {
    vk::Extent3D {
        width: extent.width,
        height: extent.height,
        depth: 1,
    }
}

/// Build buffer/image copy regions, one per plane.
///
/// Row pitches must be whole texels; they are passed as `buffer_row_length` in texels.
pub fn buffer_image_copy_regions(
    buffer: &BufferResource,
    image: &ImageResource,
) -> Result<Vec<vk::BufferImageCopy>> {
    if buffer.format != image.format {
        return Err(YuvForgeError::ResourceMismatch(format!(
            "buffer holds {:?}, image is {:?}",
            buffer.format, image.format
        )));
    }
    if buffer.extent != image.extent {
        return Err(YuvForgeError::ResourceMismatch(format!(
            "buffer is {}x{}, image is {}x{}",
            buffer.extent.width, buffer.extent.height, image.extent.width, image.extent.height
        )));
    }

    let planes = plane_regions(image.format, image.extent)?;
    if planes.len() != buffer.planes.len() {
        return Err(YuvForgeError::ResourceMismatch(format!(
            "{} buffer planes for a {}-plane format",
            buffer.planes.len(),
            planes.len()
        )));
    }

    planes
        .into_iter()
        .zip(&buffer.planes)
        .map(|((aspect, extent, texel_bytes), plane)| {
            let texel_bytes = vk::DeviceSize::from(texel_bytes);
            if plane.row_pitch % texel_bytes != 0 {
                return Err(YuvForgeError::InvalidInput(format!(
                    "row pitch {} is not a multiple of the {}-byte texel",
                    plane.row_pitch, texel_bytes
                )));
            }
            let row_length = u32::try_from(plane.row_pitch / texel_bytes)
                .map_err(|_| YuvForgeError::InvalidInput("row pitch too large".to_string()))?;
            Ok(vk::BufferImageCopy {
                buffer_offset: plane.offset,
                buffer_row_length: row_length,
                buffer_image_height: 0,
                image_subresource: subresource(aspect, image.layer),
                image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                image_extent: extent3d(extent),
            })
        })
        .collect()
}

/// Build image/image copy regions, one per plane.
pub fn image_copy_regions(src: &ImageResource, dst: &ImageResource) -> Result<Vec<vk::ImageCopy>> {
    if src.format != dst.format {
        return Err(YuvForgeError::ResourceMismatch(format!(
            "source is {:?}, destination is {:?}",
            src.format, dst.format
        )));
    }
    let extent = vk::Extent2D {
        width: src.extent.width.min(dst.extent.width),
        height: src.extent.height.min(dst.extent.height),
    };

    Ok(plane_regions(src.format, extent)?
        .into_iter()
        .map(|(aspect, extent, _)| vk::ImageCopy {
            src_subresource: subresource(aspect, src.layer),
            src_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            dst_subresource: subresource(aspect, dst.layer),
            dst_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            extent: extent3d(extent),
        })
        .collect())
}

/// Record a transfer into `cmd`.
///
/// Images must already be in their transfer layouts (`layout` of each resource is used as is).
pub fn record_transfer(
    context: &DeviceContext,
    cmd: vk::CommandBuffer,
    op: &TransferOp<'_>,
) -> Result<()> {
    let device = context.device();
    match *op {
        TransferOp::ImageToBuffer { src, dst } => {
            let regions = buffer_image_copy_regions(dst, src)?;
            unsafe {
                device.cmd_copy_image_to_buffer(cmd, src.image, src.layout, dst.buffer, &regions)
            };
            trace!("Recorded image to buffer copy, {} planes", regions.len());
        }
        TransferOp::BufferToImage { src, dst } => {
            let regions = buffer_image_copy_regions(src, dst)?;
            unsafe {
                device.cmd_copy_buffer_to_image(cmd, src.buffer, dst.image, dst.layout, &regions)
            };
            trace!("Recorded buffer to image copy, {} planes", regions.len());
        }
        TransferOp::ImageToImage { src, dst } => {
            let regions = image_copy_regions(src, dst)?;
            unsafe {
                device.cmd_copy_image(cmd, src.image, src.layout, dst.image, dst.layout, &regions)
            };
            trace!("Recorded image to image copy, {} planes", regions.len());
        }
    }
    Ok(())
}
