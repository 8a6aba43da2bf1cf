// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the hierarchy of error types for the rendering subsystem.

use super::format::{FramebufferStatus, ShaderStage};
use std::fmt;

/// An error related to the compilation or linking of a shader program.
#[derive(Debug)]
pub enum ShaderError {
    /// A shader stage failed to compile.
    CompilationFailed {
        /// The cache key of the program being built.
        label: String,
        /// The failing stage.
        stage: ShaderStage,
        /// The annotated compiler log.
        details: String,
    },
    /// The program failed to link.
    LinkFailed {
        /// The cache key of the program being built.
        label: String,
        /// The linker log.
        details: String,
    },
    /// The shader source could not be assembled from its chunks.
    Preprocess(String),
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::CompilationFailed {
                label,
                stage,
                details,
            } => {
                write!(
                    f,
                    "{stage:?} shader compilation failed for '{label}': {details}"
                )
            }
            ShaderError::LinkFailed { label, details } => {
                write!(f, "Program link failed for '{label}': {details}")
            }
            ShaderError::Preprocess(msg) => write!(f, "Shader preprocessing failed: {msg}"),
        }
    }
}

impl std::error::Error for ShaderError {}

/// An error related to the creation or use of a GPU resource (buffers, textures, etc.).
#[derive(Debug)]
pub enum ResourceError {
    /// A shader-specific error occurred.
    Shader(ShaderError),
    /// The format/type combination cannot be uploaded on this device.
    UnsupportedFormat(String),
    /// A required device extension is missing.
    MissingExtension(String),
    /// The image exceeds the maximum texture size of the device.
    TooLarge {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Device maximum along either axis.
        max: u32,
    },
    /// The device could not allocate storage.
    AllocationFailed(String),
    /// A framebuffer failed its completeness check.
    IncompleteFramebuffer(FramebufferStatus),
    /// The handle or ID used to reference a resource is invalid.
    InvalidHandle,
    /// The graphics context is lost; nothing can be created.
    ContextLost,
    /// An error originating from the specific graphics backend implementation.
    BackendError(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Shader(err) => write!(f, "Shader resource error: {err}"),
            ResourceError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {msg}"),
            ResourceError::MissingExtension(name) => {
                write!(f, "Required extension '{name}' is not available")
            }
            ResourceError::TooLarge { width, height, max } => write!(
                f,
                "Image of {width}x{height} exceeds the maximum texture size {max}"
            ),
            ResourceError::AllocationFailed(msg) => write!(f, "Allocation failed: {msg}"),
            ResourceError::IncompleteFramebuffer(status) => {
                write!(f, "Framebuffer is incomplete: {status:?}")
            }
            ResourceError::InvalidHandle => write!(f, "Invalid resource handle or ID."),
            ResourceError::ContextLost => write!(f, "The graphics context is lost."),
            ResourceError::BackendError(msg) => {
                write!(f, "Backend-specific resource error: {msg}")
            }
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Shader(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ShaderError> for ResourceError {
    fn from(err: ShaderError) -> Self {
        ResourceError::Shader(err)
    }
}

/// A high-level error returned by the renderer entry points.
#[derive(Debug)]
pub enum RenderError {
    /// The graphics context is lost and the call cannot proceed.
    ContextLost,
    /// The caller passed arguments that can never be valid (unknown render target,
    /// cube face out of range, assets from another store...).
    InvalidUsage(String),
    /// An error occurred while managing a GPU resource.
    ResourceError(ResourceError),
    /// The renderer configuration is invalid.
    Config(ConfigError),
    /// An unexpected or internal error occurred.
    Internal(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ContextLost => write!(f, "The graphics context is lost."),
            RenderError::InvalidUsage(msg) => write!(f, "Invalid renderer usage: {msg}"),
            RenderError::ResourceError(err) => {
                write!(f, "Graphics resource operation failed: {err}")
            }
            RenderError::Config(err) => write!(f, "Invalid renderer configuration: {err}"),
            RenderError::Internal(msg) => {
                write!(f, "An internal or unexpected error occurred: {msg}")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::ResourceError(err) => Some(err),
            RenderError::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for RenderError {
    fn from(err: ResourceError) -> Self {
        RenderError::ResourceError(err)
    }
}

impl From<ConfigError> for RenderError {
    fn from(err: ConfigError) -> Self {
        RenderError::Config(err)
    }
}

/// An error raised while loading [`RendererSettings`](super::RendererSettings).
#[derive(Debug)]
pub enum ConfigError {
    /// The RON text could not be parsed.
    Parse(ron::error::SpannedError),
    /// A field holds a value outside its valid range.
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why the value is rejected.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(err) => write!(f, "Failed to parse settings: {err}"),
            ConfigError::Invalid { field, reason } => {
                write!(f, "Invalid value for '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Parse(err) => Some(err),
            ConfigError::Invalid { .. } => None,
        }
    }
}

impl From<ron::error::SpannedError> for ConfigError {
    fn from(err: ron::error::SpannedError) -> Self {
        ConfigError::Parse(err)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn shader_error_display() {
        let err = ShaderError::CompilationFailed {
            label: "basic,map".to_string(),
            stage: ShaderStage::Fragment,
            details: "ERROR: 0:12: syntax error".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Fragment shader compilation failed for 'basic,map': ERROR: 0:12: syntax error"
        );
    }

    #[test]
    fn resource_error_display_wrapping_shader_error() {
        let res_err: ResourceError = ShaderError::Preprocess("cycle".to_string()).into();
        assert_eq!(
            format!("{res_err}"),
            "Shader resource error: Shader preprocessing failed: cycle"
        );
        assert!(res_err.source().is_some());
    }

    #[test]
    fn render_error_display_wrapping_resource_error() {
        let render_err: RenderError = ResourceError::TooLarge {
            width: 8192,
            height: 8192,
            max: 4096,
        }
        .into();
        assert_eq!(
            format!("{render_err}"),
            "Graphics resource operation failed: Image of 8192x8192 exceeds the maximum texture size 4096"
        );
        assert!(render_err.source().is_some());
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::Invalid {
            field: "pixel_ratio",
            reason: "must be positive".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "Invalid value for 'pixel_ratio': must be positive"
        );
    }
}
