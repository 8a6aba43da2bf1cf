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

//! CPU-side texture descriptions.

use crate::renderer::format::{DataType, SamplerParams, TextureFormat};
use crate::renderer::state::Rect;

/// The color space texel values are stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    /// Values are linear.
    #[default]
    Linear,
    /// Values are sRGB encoded and decoded when sampled.
    Srgb,
}

/// A single image.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel bytes. `None` allocates storage without initializing it.
    pub data: Option<Vec<u8>>,
}

impl Image {
    /// Creates an image from pixel bytes.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data: Some(data),
        }
    }

    /// Creates an uninitialized image of the given size.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: None,
        }
    }

    /// A solid RGBA8 image.
    pub fn solid_rgba8(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::new(width, height, rgba.repeat((width * height) as usize))
    }
}

/// The images of a texture.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureImage {
    /// A 2D texture.
    Single(Image),
    /// A cube map, faces in +X, -X, +Y, -Y, +Z, -Z order.
    Cube(Box<[Image; 6]>),
}

/// A texture whose image data is uploaded lazily by the renderer.
///
/// Loaders fill [`Texture::image`] and call [`Texture::needs_update`]; a texture
/// whose version is `0` has never received data and renders as the placeholder.
#[derive(Debug, Clone)]
pub struct Texture {
    /// A debug name.
    pub name: String,
    /// The image data.
    pub image: Option<TextureImage>,
    /// Pixel layout.
    pub format: TextureFormat,
    /// Component type.
    pub data_type: DataType,
    /// Sampler state.
    pub sampler: SamplerParams,
    /// Generate mipmaps after each full upload.
    pub generate_mipmaps: bool,
    /// Flip images vertically on upload.
    pub flip_y: bool,
    /// Color space of the texel values.
    pub color_space: ColorSpace,
    version: u64,
    update_ranges: Vec<Rect>,
}

impl Default for Texture {
    fn default() -> Self {
        Self {
            name: String::new(),
            image: None,
            format: TextureFormat::Rgba,
            data_type: DataType::UnsignedByte,
            sampler: SamplerParams::default(),
            generate_mipmaps: true,
            flip_y: false,
            color_space: ColorSpace::Linear,
            version: 0,
            update_ranges: Vec::new(),
        }
    }
}

impl Texture {
    /// Creates a 2D texture from an image. The texture is immediately marked for upload.
    pub fn new(image: Image) -> Self {
        let mut texture = Self {
            image: Some(TextureImage::Single(image)),
            ..Self::default()
        };
        texture.needs_update();
        texture
    }

    /// Creates a cube texture from six faces.
    pub fn cube(faces: [Image; 6]) -> Self {
        let mut texture = Self {
            image: Some(TextureImage::Cube(Box::new(faces))),
            ..Self::default()
        };
        texture.needs_update();
        texture
    }

    /// Whether this is a cube map.
    pub fn is_cube(&self) -> bool {
        matches!(self.image, Some(TextureImage::Cube(_)))
    }

    /// Size of the base image (first face for cubes).
    pub fn size(&self) -> Option<(u32, u32)> {
        match &self.image {
            Some(TextureImage::Single(image)) => Some((image.width, image.height)),
            Some(TextureImage::Cube(faces)) => Some((faces[0].width, faces[0].height)),
            None => None,
        }
    }

    /// The version counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Flags the texture as changed.
    pub fn needs_update(&mut self) {
        self.version += 1;
    }

    /// Requests a sub-region upload instead of a full one. The caller also calls
    /// [`needs_update`](Self::needs_update).
    pub fn add_update_range(&mut self, region: Rect) {
        self.update_ranges.push(region);
    }

    /// Pending sub-region uploads.
    pub fn update_ranges(&self) -> &[Rect] {
        &self.update_ranges
    }

    /// Forgets pending sub-region uploads.
    pub fn clear_update_ranges(&mut self) {
        self.update_ranges.clear();
    }
}
