//! Error types for YuvForge.

use ash::vk;
use thiserror::Error;

/// Main error type for YuvForge operations.
#[derive(Error, Debug)]
pub enum YuvForgeError {
    /// Vulkan instance creation failed.
    #[error("Failed to create Vulkan instance: {0}")]
    InstanceCreation(String),

    /// Vulkan physical device selection failed.
    #[error("No suitable Vulkan physical device found: {0}")]
    NoSuitableDevice(String),

    /// Vulkan logical device creation failed.
    #[error("Failed to create Vulkan device: {0}")]
    DeviceCreation(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    MemoryAllocation(String),

    /// Resource creation failed (layouts, pipelines, samplers, buffers, etc.).
    #[error("Failed to create resource: {0}")]
    ResourceCreation(String),

    /// Invalid input (dimensions, frame index, buffer size, etc.).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The pixel format is not one the resolver knows about.
    #[error("Unsupported pixel format: {0:?}")]
    UnsupportedFormat(vk::Format),

    /// The requested filter type, format pair or flag combination cannot be generated.
    #[error("Unsupported filter configuration: {0}")]
    UnsupportedConfiguration(String),

    /// GLSL to SPIR-V compilation failed.
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// Resources handed to the recorder do not have the shape the filter was built for.
    #[error("Resource does not match filter configuration: {0}")]
    ResourceMismatch(String),

    /// Queue submission failed.
    #[error("Queue submission failed: {0}")]
    Submission(vk::Result),

    /// Generic Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(vk::Result),
}

impl From<vk::Result> for YuvForgeError {
    fn from(result: vk::Result) -> Self {
        YuvForgeError::Vulkan(result)
    }
}

/// Result type for YuvForge operations.
pub type Result<T> = std::result::Result<T, YuvForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vk_result() {
        let err: YuvForgeError = vk::Result::ERROR_DEVICE_LOST.into();
        assert!(matches!(err, YuvForgeError::Vulkan(vk::Result::ERROR_DEVICE_LOST)));
    }

    #[test]
    fn test_error_messages() {
        let err = YuvForgeError::UnsupportedFormat(vk::Format::D32_SFLOAT);
        assert!(err.to_string().contains("D32_SFLOAT"));

        let err = YuvForgeError::ResourceMismatch("input is a buffer".to_string());
        assert_eq!(
            err.to_string(),
            "Resource does not match filter configuration: input is a buffer"
        );
    }
}
