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

//! The capabilities probe: device limits and extensions, queried once per context.

use super::device::{GraphicsDevice, Limit};
use super::error::ResourceError;
use super::format::{DataType, Precision, ShaderStage, TextureFormat};
use super::settings::RendererSettings;
use std::collections::BTreeSet;

/// Extensions the renderer knows how to use.
pub const KNOWN_EXTENSIONS: &[&str] = &[
    "EXT_color_buffer_float",
    "EXT_color_buffer_half_float",
    "EXT_float_blend",
    "EXT_texture_filter_anisotropic",
    "OES_texture_float_linear",
    "WEBGL_compressed_texture_s3tc",
    "WEBGL_compressed_texture_etc1",
    "WEBGL_compressed_texture_etc",
    "WEBGL_compressed_texture_astc",
    "EXT_texture_compression_bptc",
];

/// A read-only snapshot of what the device supports.
#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    /// Texture units available to fragment shaders.
    pub max_textures: u32,
    /// Texture units available to vertex shaders.
    pub max_vertex_textures: u32,
    /// Largest 2D texture edge.
    pub max_texture_size: u32,
    /// Largest cube map face edge.
    pub max_cubemap_size: u32,
    /// Vertex attribute slots.
    pub max_attributes: u32,
    /// Vertex uniform vectors.
    pub max_vertex_uniforms: u32,
    /// Fragment uniform vectors.
    pub max_fragment_uniforms: u32,
    /// Varying vectors.
    pub max_varyings: u32,
    /// MSAA samples.
    pub max_samples: u32,
    /// Largest anisotropy level, `1` without the extension.
    pub max_anisotropy: u32,
    /// The effective shader precision after probing.
    pub precision: Precision,
    /// Whether vertex shaders can sample textures.
    pub vertex_textures: bool,
    /// Whether logarithmic depth is in use.
    pub logarithmic_depth_buffer: bool,
    extensions: BTreeSet<String>,
}

impl Capabilities {
    /// Queries the device. Called at startup and after every context restoration.
    pub fn probe(device: &dyn GraphicsDevice, settings: &RendererSettings) -> Self {
        let extensions: BTreeSet<String> = KNOWN_EXTENSIONS
            .iter()
            .filter(|name| device.has_extension(name))
            .map(|name| name.to_string())
            .collect();

        let precision = Self::max_precision(device, settings.precision);
        if precision != settings.precision {
            log::warn!(
                "Precision '{}' is not supported, using '{}' instead.",
                settings.precision.as_glsl(),
                precision.as_glsl()
            );
        }

        let max_vertex_textures = device.get_limit(Limit::MaxVertexTextureImageUnits);
        let max_anisotropy = if extensions.contains("EXT_texture_filter_anisotropic") {
            device.get_limit(Limit::MaxAnisotropy).max(1)
        } else {
            1
        };

        let caps = Self {
            max_textures: device.get_limit(Limit::MaxTextureImageUnits),
            max_vertex_textures,
            max_texture_size: device.get_limit(Limit::MaxTextureSize),
            max_cubemap_size: device.get_limit(Limit::MaxCubeMapTextureSize),
            max_attributes: device.get_limit(Limit::MaxVertexAttribs),
            max_vertex_uniforms: device.get_limit(Limit::MaxVertexUniformVectors),
            max_fragment_uniforms: device.get_limit(Limit::MaxFragmentUniformVectors),
            max_varyings: device.get_limit(Limit::MaxVaryingVectors),
            max_samples: device.get_limit(Limit::MaxSamples),
            max_anisotropy,
            precision,
            vertex_textures: max_vertex_textures > 0,
            logarithmic_depth_buffer: settings.logarithmic_depth_buffer,
            extensions,
        };
        log::debug!(
            "Probed capabilities: max texture size {}, {} texture units, {} extensions.",
            caps.max_texture_size,
            caps.max_textures,
            caps.extensions.len()
        );
        caps
    }

    /// Returns the highest precision not above `requested` that both stages support.
    fn max_precision(device: &dyn GraphicsDevice, requested: Precision) -> Precision {
        let supported = |p| {
            device.supports_precision(ShaderStage::Vertex, p)
                && device.supports_precision(ShaderStage::Fragment, p)
        };
        [Precision::High, Precision::Medium]
            .into_iter()
            .filter(|p| *p <= requested)
            .find(|p| supported(*p))
            .unwrap_or(Precision::Low)
    }

    /// Checks for an extension found during probing.
    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    /// Iterates the probed extensions.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    /// Checks whether a texture of the given format and type can be uploaded.
    pub fn check_texture_format(
        &self,
        format: TextureFormat,
        data_type: DataType,
    ) -> Result<(), ResourceError> {
        if let TextureFormat::Compressed(c) = format {
            if !self.has_extension(c.extension()) {
                return Err(ResourceError::MissingExtension(c.extension().to_string()));
            }
        }
        if !format.accepts(data_type) {
            return Err(ResourceError::UnsupportedFormat(format!(
                "{format:?} with {data_type:?}"
            )));
        }
        Ok(())
    }
}
