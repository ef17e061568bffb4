//! # YuvForge
//!
//! Runtime-generated Vulkan compute filters for YCbCr pictures.
//!
//! A filter is described by a [`FilterConfig`]: what it does ([`FilterType`]), the input
//! and output formats, whether each side is an image or a linear buffer, and a few
//! [`FilterFlags`]. From that description YuvForge
//!
//! 1. resolves both formats into plane layouts ([`resolve_format`]),
//! 2. generates a GLSL compute shader specialized for the pair ([`ShaderGenerator`]),
//! 3. compiles it and builds the descriptor set layout and compute pipeline ([`YuvFilter::create`]),
//! 4. records a dispatch per frame against concrete images or buffers ([`YuvFilter::record`]).
//!
//! Supported work: plane layout changes (2-plane and 3-plane), chroma up/down sampling
//! between 4:2:0, 4:2:2 and 4:4:4, bit-depth changes, full/limited range changes,
//! YCbCr to RGBA, clears, and an optional 2x2 subsampled luma side output.
//!
//! ## Example
//!
//! ```no_run
//! use ash::vk;
//! use yuvforge::{DeviceContextBuilder, FilterConfig, FilterType, ShaderCompiler, YuvFilter};
//!
//! # fn main() -> yuvforge::Result<()> {
//! let context = DeviceContextBuilder::new().app_name("nv12-to-i420").build()?;
//! let compiler = ShaderCompiler::acquire()?;
//!
//! let config = FilterConfig::new(
//!     FilterType::Copy,
//!     vk::Format::G8_B8R8_2PLANE_420_UNORM,
//!     vk::Format::G8_B8_R8_3PLANE_420_UNORM,
//! )
//! .max_frames(2);
//!
//! let filter = YuvFilter::create(&context, context.compute_queue_family(), 0, &compiler, config)?;
//! println!("{}", filter.shader_source());
//! # Ok(())
//! # }
//! ```

pub mod compiler;
pub mod error;
pub mod filter;
pub mod format;
pub mod shader;
pub mod transfer;
pub mod vulkan;

pub use compiler::{ShaderCompiler, ShaderStage};
pub use error::{Result, YuvForgeError};
pub use filter::{
    dispatch_size, BindingModel, BufferPlane, BufferResource, DispatchInvocation,
    EdgeReplication, FilterConfig, FilterFlags, FilterResource, FilterType, ImageResource,
    PushConstants, ResourceKind, SubsampledLuma, YuvFilter,
};
pub use format::{
    resolve_format, BufferLayout, FormatLayout, PixelFormatDescriptor, Plane, PlaneGeometry,
    PlaneLayout, SinglePlaneFormat,
};
pub use shader::color::{ColorConversion, YcbcrModel, YcbcrPrimaries};
pub use shader::range::ColorRange;
pub use shader::{generate_shader, BindingPlan, GeneratedShader, ShaderGenerator};
pub use transfer::{record_transfer, TransferOp};
pub use vulkan::{DeviceCapabilities, DeviceContext, DeviceContextBuilder};
