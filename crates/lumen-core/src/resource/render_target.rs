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

//! Offscreen render target descriptions.

use crate::renderer::format::{DataType, SamplerParams, TextureFormat};

/// Describes an offscreen render target: a color texture plus optional depth and
/// stencil storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTargetDescriptor {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Format of the color texture.
    pub format: TextureFormat,
    /// Component type of the color texture.
    pub data_type: DataType,
    /// Sampler state of the color texture.
    pub sampler: SamplerParams,
    /// Attach a depth buffer.
    pub depth_buffer: bool,
    /// Attach a stencil buffer.
    pub stencil_buffer: bool,
    /// Store depth in a sampleable texture instead of a renderbuffer.
    pub depth_texture: bool,
    /// Regenerate color mipmaps after rendering into the target.
    pub generate_mipmaps: bool,
    /// Allocate a cube map with six renderable faces.
    pub cube: bool,
}

impl RenderTargetDescriptor {
    /// An RGBA8 target with a depth buffer and linear filtering.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Rgba,
            data_type: DataType::UnsignedByte,
            sampler: SamplerParams {
                min_filter: crate::renderer::format::MinFilter::Linear,
                ..SamplerParams::default()
            },
            depth_buffer: true,
            stencil_buffer: false,
            depth_texture: false,
            generate_mipmaps: false,
            cube: false,
        }
    }

    /// Bytes of the color storage, every face and the full mip chain included.
    pub fn color_byte_size(&self) -> usize {
        let base = self
            .format
            .image_byte_size(self.width, self.height, self.data_type);
        let faces = if self.cube { 6 } else { 1 };
        let mips = if self.generate_mipmaps { base / 3 } else { 0 };
        (base + mips) * faces
    }
}
