//! Example: print generated compute shaders.
//!
//! Prints the GLSL for a handful of filter configurations. With a Vulkan device present
//! it also builds each filter, which compiles the shader and creates the pipeline.
//!
//! Run with `RUST_LOG=debug` to see binding plans and pipeline creation.

use ash::vk;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};
use yuvforge::{
    generate_shader, ColorConversion, DeviceContextBuilder, FilterConfig, FilterFlags,
    FilterType, ResourceKind, ShaderCompiler, YcbcrModel, YuvFilter,
};

fn configs() -> Vec<(&'static str, FilterConfig)> {
    let nv12 = vk::Format::G8_B8R8_2PLANE_420_UNORM;
    let i420 = vk::Format::G8_B8_R8_3PLANE_420_UNORM;
    let p010 = vk::Format::G10X6_B10X6R10X6_2PLANE_420_UNORM_3PACK16;
    let yuv444 = vk::Format::G8_B8_R8_3PLANE_444_UNORM;

    vec![
        ("nv12 image -> i420 image", FilterConfig::new(FilterType::Copy, nv12, i420)),
        (
            "p010 buffer -> nv12 image, subsampled luma",
            FilterConfig::new(FilterType::Copy, p010, nv12)
                .input_kind(ResourceKind::Buffer)
                .flags(FilterFlags::INPUT_MSB_TO_LSB_SHIFT | FilterFlags::ENABLE_Y_SUBSAMPLING),
        ),
        (
            "yuv444 image -> nv12 buffer",
            FilterConfig::new(FilterType::Copy, yuv444, nv12).output_kind(ResourceKind::Buffer),
        ),
        (
            "nv12 image -> rgba image (BT.709)",
            FilterConfig::new(FilterType::YcbcrToRgba, nv12, vk::Format::R8G8B8A8_UNORM)
                .color(ColorConversion::new(YcbcrModel::Bt709)),
        ),
        ("clear p010", FilterConfig::clear(p010)),
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer().with_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            ),
        )
        .init();

    for (name, config) in configs() {
        let shader = generate_shader(&config)?;
        println!("// ==== {} ({} bytes, bindings {:?})", name, shader.len(), shader.bindings.bindings());
        println!("{}", shader.source);
    }

    let context = match DeviceContextBuilder::new()
        .app_name("dump_shader")
        .enable_validation(cfg!(debug_assertions))
        .build()
    {
        Ok(context) => context,
        Err(e) => {
            eprintln!("No Vulkan device, skipping pipeline creation: {}", e);
            return Ok(());
        }
    };
    let compiler = ShaderCompiler::acquire()?;
    for (name, config) in configs() {
        let filter = YuvFilter::create(&context, context.compute_queue_family(), 0, &compiler, config)?;
        println!("{}: pipeline {:?}", name, filter.pipeline());
    }

    Ok(())
}
