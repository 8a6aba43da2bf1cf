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

//! Fixed-function pipeline state enums shared by the device contract and the state tracker.

/// A server-side capability toggled with `enable` / `disable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    /// Color blending.
    Blend,
    /// Face culling.
    CullFace,
    /// Depth testing.
    DepthTest,
    /// Stencil testing.
    StencilTest,
    /// Scissor testing.
    ScissorTest,
    /// Polygon offset for filled primitives.
    PolygonOffsetFill,
    /// Alpha-to-coverage multisampling.
    SampleAlphaToCoverage,
}

impl Capability {
    /// Every capability, in a stable order.
    pub const ALL: [Capability; 7] = [
        Capability::Blend,
        Capability::CullFace,
        Capability::DepthTest,
        Capability::StencilTest,
        Capability::ScissorTest,
        Capability::PolygonOffsetFill,
        Capability::SampleAlphaToCoverage,
    ];
}

/// A comparison function used by depth and stencil tests and by shadow samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    /// The test never passes.
    Never,
    /// Passes if the new value is less than the existing value.
    Less,
    /// Passes if the values are equal.
    Equal,
    /// Passes if the new value is less than or equal to the existing value.
    #[default]
    LessEqual,
    /// Passes if the new value is greater than the existing value.
    Greater,
    /// Passes if the values differ.
    NotEqual,
    /// Passes if the new value is greater than or equal to the existing value.
    GreaterEqual,
    /// The test always passes.
    Always,
}

/// The operation combining source and destination blend terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendEquation {
    /// `src + dst`
    #[default]
    Add,
    /// `src - dst`
    Subtract,
    /// `dst - src`
    ReverseSubtract,
    /// `min(src, dst)`
    Min,
    /// `max(src, dst)`
    Max,
}

/// A multiplier applied to a blend term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    DstColor,
    OneMinusDstColor,
    SrcAlphaSaturate,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
}

/// The blending preset of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Blending {
    /// Blending disabled.
    None,
    /// Standard "over" compositing.
    #[default]
    Normal,
    /// Source added onto the destination.
    Additive,
    /// Source subtracted from the destination.
    Subtractive,
    /// Source multiplied with the destination.
    Multiply,
    /// Factors and equations taken from the material's [`CustomBlend`].
    Custom,
}

/// Explicit blend factors and equations for [`Blending::Custom`].
///
/// The alpha fields fall back to their color counterparts when `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CustomBlend {
    /// Equation for the color channels.
    pub equation: BlendEquation,
    /// Equation for the alpha channel.
    pub equation_alpha: Option<BlendEquation>,
    /// Source factor for the color channels.
    pub src: BlendFactor,
    /// Destination factor for the color channels.
    pub dst: BlendFactor,
    /// Source factor for the alpha channel.
    pub src_alpha: Option<BlendFactor>,
    /// Destination factor for the alpha channel.
    pub dst_alpha: Option<BlendFactor>,
}

impl Default for CustomBlend {
    fn default() -> Self {
        Self {
            equation: BlendEquation::Add,
            equation_alpha: None,
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::OneMinusSrcAlpha,
            src_alpha: None,
            dst_alpha: None,
        }
    }
}

/// Which faces are discarded when culling is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullFace {
    /// Cull back faces.
    #[default]
    Back,
    /// Cull front faces.
    Front,
    /// Cull everything (only points and lines survive).
    FrontAndBack,
}

/// The winding order that defines a front face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise.
    #[default]
    Ccw,
    /// Clockwise.
    Cw,
}

/// Which side of a surface a material renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    /// Front faces only.
    #[default]
    Front,
    /// Back faces only.
    Back,
    /// Both faces.
    Double,
}

/// What happens to a stencil value after a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
    Increment,
    IncrementWrap,
    Decrement,
    DecrementWrap,
    Invert,
}

/// An integer rectangle in framebuffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Bottom edge.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl Rect {
    /// Creates a new rectangle.
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns the rectangle with every component multiplied by `ratio` and floored.
    pub fn scaled(&self, ratio: f32) -> Self {
        let s = |v: i32| (v as f32 * ratio).floor() as i32;
        Self::new(s(self.x), s(self.y), s(self.width), s(self.height))
    }
}

/// Per-channel color write enables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub struct ColorMask {
    pub r: bool,
    pub g: bool,
    pub b: bool,
    pub a: bool,
}

impl ColorMask {
    /// Every channel writable.
    pub const ALL: Self = Self::splat(true);
    /// No channel writable.
    pub const NONE: Self = Self::splat(false);

    /// Uses the same flag for every channel.
    pub const fn splat(enabled: bool) -> Self {
        Self {
            r: enabled,
            g: enabled,
            b: enabled,
            a: enabled,
        }
    }
}

impl Default for ColorMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// The buffers a `clear` call touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClearFlags {
    bits: u8,
}

impl ClearFlags {
    /// Nothing.
    pub const NONE: Self = Self { bits: 0 };
    /// The color buffer.
    pub const COLOR: Self = Self { bits: 1 << 0 };
    /// The depth buffer.
    pub const DEPTH: Self = Self { bits: 1 << 1 };
    /// The stencil buffer.
    pub const STENCIL: Self = Self { bits: 1 << 2 };
    /// Every buffer.
    pub const ALL: Self = Self {
        bits: Self::COLOR.bits | Self::DEPTH.bits | Self::STENCIL.bits,
    };

    /// Builds flags from three booleans.
    pub const fn from_parts(color: bool, depth: bool, stencil: bool) -> Self {
        let mut bits = 0;
        if color {
            bits |= Self::COLOR.bits;
        }
        if depth {
            bits |= Self::DEPTH.bits;
        }
        if stencil {
            bits |= Self::STENCIL.bits;
        }
        Self { bits }
    }

    /// Returns the raw bits.
    pub const fn bits(&self) -> u8 {
        self.bits
    }

    /// Combines two sets of flags.
    pub const fn union(self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// Checks whether every flag of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        (self.bits & other.bits) == other.bits
    }

    /// Checks if no flag is set.
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

impl std::ops::BitOr for ClearFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_flags_from_parts() {
        let flags = ClearFlags::from_parts(true, false, true);
        assert!(flags.contains(ClearFlags::COLOR));
        assert!(!flags.contains(ClearFlags::DEPTH));
        assert!(flags.contains(ClearFlags::STENCIL));
        assert_eq!(ClearFlags::COLOR | ClearFlags::DEPTH | ClearFlags::STENCIL, ClearFlags::ALL);
        assert!(ClearFlags::from_parts(false, false, false).is_empty());
    }

    #[test]
    fn test_rect_scaled_floors() {
        let rect = Rect::new(1, 1, 101, 51).scaled(1.5);
        assert_eq!(rect, Rect::new(1, 1, 151, 76));
    }
}
