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

//! Defines the `Color` type used by materials, lights and clear values.

use crate::math::Vec3;
use serde::Deserialize;
use std::ops::{Add, AddAssign, Mul};

/// A color in **linear RGB** space using `f32` components.
///
/// Components may exceed `1.0` for HDR light intensities. Alpha is kept separately
/// by the owners that need it (materials carry an `opacity`, the renderer a clear alpha).
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Color {
    /// The red component in linear space.
    pub r: f32,
    /// The green component in linear space.
    pub g: f32,
    /// The blue component in linear space.
    pub b: f32,
}

impl Color {
    /// Pure white (`[1.0, 1.0, 1.0]`).
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    /// Pure black (`[0.0, 0.0, 0.0]`).
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);

    /// Creates a new color from linear components.
    #[inline]
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Creates a color from a packed sRGB hex value (`0xRRGGBB`), converting to linear space.
    pub fn from_hex(hex: u32) -> Self {
        let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
        Self::rgb(channel(16), channel(8), channel(0))
    }

    /// Returns the color multiplied by a scalar intensity.
    #[inline]
    pub fn scaled(self, factor: f32) -> Self {
        Self::rgb(self.r * factor, self.g * factor, self.b * factor)
    }

    /// Returns the components as a [`Vec3`], the layout uniforms expect.
    #[inline]
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.r, self.g, self.b)
    }

    /// Returns the components as an array.
    #[inline]
    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

/// Converts an sRGB component to linear space.
#[inline]
fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

impl Add for Color {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::rgb(self.r + rhs.r, self.g + rhs.g, self.b + rhs.b)
    }
}

impl AddAssign for Color {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Mul<f32> for Color {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        self.scaled(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_hex_white_and_black() {
        assert_eq!(Color::from_hex(0xffffff), Color::WHITE);
        assert_eq!(Color::from_hex(0x000000), Color::BLACK);
    }

    #[test]
    fn test_from_hex_is_linearized() {
        let grey = Color::from_hex(0x808080);
        // sRGB 0.5 is roughly 0.2158 in linear space.
        assert_relative_eq!(grey.r, 0.2158, epsilon = 1e-3);
        assert_eq!(grey.r, grey.g);
        assert_eq!(grey.g, grey.b);
    }

    #[test]
    fn test_accumulate() {
        let mut ambient = Color::BLACK;
        ambient += Color::rgb(0.2, 0.1, 0.0) * 2.0;
        ambient += Color::rgb(0.1, 0.1, 0.1);
        assert_relative_eq!(ambient.r, 0.5);
        assert_relative_eq!(ambient.g, 0.3);
        assert_relative_eq!(ambient.b, 0.1);
    }
}
