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

//! Data formats, texture parameters and draw enums of the device contract.

use super::state::CompareFunction;
use serde::Deserialize;

/// The component type of vertex, index or pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    /// `u8`
    #[default]
    UnsignedByte,
    /// `i8`
    Byte,
    /// `u16`
    UnsignedShort,
    /// `i16`
    Short,
    /// `u32`
    UnsignedInt,
    /// `i32`
    Int,
    /// 16-bit float.
    HalfFloat,
    /// `f32`
    Float,
    /// Packed 24-bit depth and 8-bit stencil.
    UnsignedInt248,
}

impl DataType {
    /// Size in bytes of a single component.
    pub const fn byte_size(self) -> usize {
        match self {
            DataType::UnsignedByte | DataType::Byte => 1,
            DataType::UnsignedShort | DataType::Short | DataType::HalfFloat => 2,
            DataType::UnsignedInt | DataType::Int | DataType::Float | DataType::UnsignedInt248 => 4,
        }
    }

    /// Whether this type is a packed format covering every channel of a pixel.
    pub const fn is_packed(self) -> bool {
        matches!(self, DataType::UnsignedInt248)
    }
}

/// A block-compressed texture format. Each one requires a device extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressedFormat {
    /// BC1 / DXT1 RGB.
    S3tcDxt1,
    /// BC3 / DXT5 RGBA.
    S3tcDxt5,
    /// ETC1 RGB.
    Etc1,
    /// ETC2 RGB.
    Etc2Rgb,
    /// ASTC 4x4 RGBA.
    Astc4x4,
    /// BC7 RGBA.
    Bptc,
}

impl CompressedFormat {
    /// The device extension that must be present to upload this format.
    pub const fn extension(self) -> &'static str {
        match self {
            CompressedFormat::S3tcDxt1 | CompressedFormat::S3tcDxt5 => {
                "WEBGL_compressed_texture_s3tc"
            }
            CompressedFormat::Etc1 => "WEBGL_compressed_texture_etc1",
            CompressedFormat::Etc2Rgb => "WEBGL_compressed_texture_etc",
            CompressedFormat::Astc4x4 => "WEBGL_compressed_texture_astc",
            CompressedFormat::Bptc => "EXT_texture_compression_bptc",
        }
    }

    /// Bytes per 4x4 block.
    pub const fn block_bytes(self) -> usize {
        match self {
            CompressedFormat::S3tcDxt1 | CompressedFormat::Etc1 | CompressedFormat::Etc2Rgb => 8,
            CompressedFormat::S3tcDxt5 | CompressedFormat::Astc4x4 | CompressedFormat::Bptc => 16,
        }
    }
}

/// The pixel layout of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// Single alpha channel.
    Alpha,
    /// Single red channel.
    Red,
    /// Red and green channels.
    Rg,
    /// Three color channels.
    Rgb,
    /// Four color channels.
    #[default]
    Rgba,
    /// Single luminance channel.
    Luminance,
    /// Luminance and alpha channels.
    LuminanceAlpha,
    /// Depth component.
    Depth,
    /// Depth and stencil components.
    DepthStencil,
    /// A block-compressed layout.
    Compressed(CompressedFormat),
}

impl TextureFormat {
    /// Number of channels per pixel, `0` for compressed formats.
    pub const fn channels(self) -> usize {
        match self {
            TextureFormat::Alpha
            | TextureFormat::Red
            | TextureFormat::Luminance
            | TextureFormat::Depth => 1,
            TextureFormat::Rg | TextureFormat::LuminanceAlpha | TextureFormat::DepthStencil => 2,
            TextureFormat::Rgb => 3,
            TextureFormat::Rgba => 4,
            TextureFormat::Compressed(_) => 0,
        }
    }

    /// Returns `true` for depth or depth-stencil formats.
    pub const fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth | TextureFormat::DepthStencil)
    }

    /// Bytes needed by one mip level of `width` x `height` pixels.
    pub fn image_byte_size(self, width: u32, height: u32, ty: DataType) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            TextureFormat::Compressed(c) => w.div_ceil(4) * h.div_ceil(4) * c.block_bytes(),
            _ if ty.is_packed() => w * h * ty.byte_size(),
            _ => w * h * self.channels() * ty.byte_size(),
        }
    }

    /// Checks whether a format/type pair is a valid upload combination.
    pub fn accepts(self, ty: DataType) -> bool {
        match self {
            TextureFormat::Depth => matches!(
                ty,
                DataType::UnsignedShort | DataType::UnsignedInt | DataType::Float
            ),
            TextureFormat::DepthStencil => ty == DataType::UnsignedInt248,
            TextureFormat::Compressed(_) => ty == DataType::UnsignedByte,
            TextureFormat::Alpha | TextureFormat::Luminance | TextureFormat::LuminanceAlpha => {
                matches!(
                    ty,
                    DataType::UnsignedByte | DataType::HalfFloat | DataType::Float
                )
            }
            _ => !matches!(ty, DataType::UnsignedInt248),
        }
    }
}

/// A texture binding point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    /// A 2D texture.
    Texture2D,
    /// A cube map.
    CubeMap,
}

/// The image a `tex_image_2d` or framebuffer attachment addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureImageTarget {
    /// The single image of a 2D texture.
    Texture2D,
    /// A cube face, `0..6` in +X, -X, +Y, -Y, +Z, -Z order.
    CubeFace(u32),
}

impl TextureImageTarget {
    /// The binding point the image belongs to.
    pub const fn binding(self) -> TextureTarget {
        match self {
            TextureImageTarget::Texture2D => TextureTarget::Texture2D,
            TextureImageTarget::CubeFace(_) => TextureTarget::CubeMap,
        }
    }
}

/// Number of faces of a cube map.
pub const CUBE_FACE_COUNT: u32 = 6;

/// Magnification filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum MagFilter {
    Nearest,
    #[default]
    Linear,
}

/// Minification filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum MinFilter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    #[default]
    LinearMipmapLinear,
}

impl MinFilter {
    /// Returns `true` if the filter samples mip levels.
    pub const fn uses_mipmaps(self) -> bool {
        !matches!(self, MinFilter::Nearest | MinFilter::Linear)
    }
}

/// Texture coordinate wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum Wrapping {
    Repeat,
    #[default]
    ClampToEdge,
    MirroredRepeat,
}

/// Sampler state applied to a texture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerParams {
    /// Wrapping along `s`.
    pub wrap_s: Wrapping,
    /// Wrapping along `t`.
    pub wrap_t: Wrapping,
    /// Magnification filter.
    pub mag_filter: MagFilter,
    /// Minification filter.
    pub min_filter: MinFilter,
    /// Anisotropic filtering level; `1` disables it.
    pub anisotropy: u32,
    /// Depth comparison mode for shadow samplers.
    pub compare: Option<CompareFunction>,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            wrap_s: Wrapping::ClampToEdge,
            wrap_t: Wrapping::ClampToEdge,
            mag_filter: MagFilter::Linear,
            min_filter: MinFilter::LinearMipmapLinear,
            anisotropy: 1,
            compare: None,
        }
    }
}

impl SamplerParams {
    /// Nearest filtering, clamped, no mipmaps. Used by depth and placeholder textures.
    pub const NEAREST_CLAMP: Self = Self {
        wrap_s: Wrapping::ClampToEdge,
        wrap_t: Wrapping::ClampToEdge,
        mag_filter: MagFilter::Nearest,
        min_filter: MinFilter::Nearest,
        anisotropy: 1,
        compare: None,
    };
}

/// A buffer binding point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data.
    Array,
    /// Index data.
    ElementArray,
}

/// Usage hint given when a buffer's storage is specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    /// Written once, drawn many times.
    #[default]
    Static,
    /// Rewritten often, drawn many times.
    Dynamic,
    /// Written once, drawn a few times.
    Stream,
}

/// The primitive topology of a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// The element type of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// 16-bit indices.
    U16,
    /// 32-bit indices.
    U32,
}

impl IndexType {
    /// Size in bytes of one index.
    pub const fn byte_size(self) -> usize {
        match self {
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        }
    }
}

/// Storage format of a renderbuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderbufferFormat {
    /// 16-bit depth.
    DepthComponent16,
    /// 8-bit stencil.
    StencilIndex8,
    /// Combined depth and stencil.
    DepthStencil,
}

impl RenderbufferFormat {
    /// Bytes per pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            RenderbufferFormat::DepthComponent16 => 2,
            RenderbufferFormat::StencilIndex8 => 1,
            RenderbufferFormat::DepthStencil => 4,
        }
    }
}

/// An attachment point of a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramebufferAttachment {
    /// A color attachment.
    Color(u32),
    /// The depth attachment.
    Depth,
    /// The stencil attachment.
    Stencil,
    /// The combined depth-stencil attachment.
    DepthStencil,
}

/// The result of a framebuffer completeness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum FramebufferStatus {
    Complete,
    IncompleteAttachment,
    IncompleteMissingAttachment,
    IncompleteDimensions,
    Unsupported,
}

/// A programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// The vertex stage.
    Vertex,
    /// The fragment stage.
    Fragment,
}

/// Floating-point precision qualifier used by generated shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// `lowp`
    Low,
    /// `mediump`
    Medium,
    /// `highp`
    #[default]
    High,
}

impl Precision {
    /// The GLSL qualifier keyword.
    pub const fn as_glsl(self) -> &'static str {
        match self {
            Precision::Low => "lowp",
            Precision::Medium => "mediump",
            Precision::High => "highp",
        }
    }
}

/// How a vertex attribute is read from the currently bound array buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribLayout {
    /// Components per vertex (1 to 4).
    pub size: u32,
    /// Component type.
    pub ty: DataType,
    /// Whether integer data is normalized to `[0, 1]` / `[-1, 1]`.
    pub normalized: bool,
    /// Byte stride between vertices, `0` for tightly packed.
    pub stride: u32,
    /// Byte offset of the first component.
    pub offset: u32,
}

/// Parameters of a full image upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TexImageDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub format: TextureFormat,
    /// Component type.
    pub data_type: DataType,
}

impl TexImageDesc {
    /// Bytes needed by the image.
    pub fn byte_size(&self) -> usize {
        self.format
            .image_byte_size(self.width, self.height, self.data_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_byte_size() {
        assert_eq!(
            TextureFormat::Rgba.image_byte_size(4, 2, DataType::UnsignedByte),
            32
        );
        assert_eq!(TextureFormat::Rgb.image_byte_size(2, 2, DataType::Float), 48);
        assert_eq!(
            TextureFormat::DepthStencil.image_byte_size(2, 2, DataType::UnsignedInt248),
            16
        );
        // 5x5 rounds up to 2x2 blocks.
        assert_eq!(
            TextureFormat::Compressed(CompressedFormat::S3tcDxt1).image_byte_size(
                5,
                5,
                DataType::UnsignedByte
            ),
            32
        );
    }

    #[test]
    fn test_format_type_combinations() {
        assert!(TextureFormat::Rgba.accepts(DataType::Float));
        assert!(!TextureFormat::Rgba.accepts(DataType::UnsignedInt248));
        assert!(TextureFormat::Depth.accepts(DataType::UnsignedInt));
        assert!(!TextureFormat::Depth.accepts(DataType::UnsignedByte));
        assert!(TextureFormat::DepthStencil.accepts(DataType::UnsignedInt248));
    }
}
