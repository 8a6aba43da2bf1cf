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

//! Defines light types for the rendering system.
//!
//! Lights are attached to scene objects, which provide their world position. The
//! render lanes flatten them into per-kind uniform arrays, and shadow-casting lights
//! get a [`LightShadow`] describing their shadow map.

use crate::color::Color;
use crate::math::{UVec2, Vec3};

/// A light that illuminates every surface equally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    /// The color of the light in linear RGB space.
    pub color: Color,
    /// The intensity multiplier.
    pub intensity: f32,
}

/// A light fading from a sky color above to a ground color below.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemisphereLight {
    /// Color received by upward-facing surfaces.
    pub sky_color: Color,
    /// Color received by downward-facing surfaces.
    pub ground_color: Color,
    /// The intensity multiplier.
    pub intensity: f32,
}

/// A directional light source that illuminates from a uniform direction.
///
/// The direction runs from the light's world position towards `target`.
///
/// # Examples
///
/// ```
/// use lumen_core::resource::DirectionalLight;
/// use lumen_core::math::Vec3;
/// use lumen_core::Color;
///
/// let sun = DirectionalLight {
///     color: Color::rgb(1.0, 0.95, 0.8),
///     intensity: 1.0,
///     target: Vec3::ZERO,
/// };
/// assert_eq!(sun.target, Vec3::ZERO);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// The color of the light in linear RGB space.
    pub color: Color,
    /// The intensity multiplier.
    pub intensity: f32,
    /// The world-space point the light aims at.
    pub target: Vec3,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            intensity: 1.0,
            target: Vec3::ZERO,
        }
    }
}

/// A point light source that emits light in all directions from a single point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// The color of the light in linear RGB space.
    pub color: Color,
    /// The intensity of the light.
    pub intensity: f32,
    /// Cut-off distance; `0` means unlimited.
    pub distance: f32,
    /// Attenuation exponent; `2` is physically correct.
    pub decay: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            intensity: 1.0,
            distance: 0.0,
            decay: 2.0,
        }
    }
}

/// A spot light source that emits light in a cone from a single point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    /// The color of the light in linear RGB space.
    pub color: Color,
    /// The intensity of the light.
    pub intensity: f32,
    /// Cut-off distance; `0` means unlimited.
    pub distance: f32,
    /// Attenuation exponent.
    pub decay: f32,
    /// Half-angle of the cone in radians.
    pub angle: f32,
    /// Fraction of the cone attenuated by the penumbra, in `[0, 1]`.
    pub penumbra: f32,
    /// The world-space point the light aims at.
    pub target: Vec3,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            intensity: 1.0,
            distance: 0.0,
            decay: 2.0,
            angle: std::f32::consts::FRAC_PI_3,
            penumbra: 0.0,
            target: Vec3::ZERO,
        }
    }
}

/// An enumeration of all supported light types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Uniform ambient light.
    Ambient(AmbientLight),
    /// Sky/ground gradient light.
    Hemisphere(HemisphereLight),
    /// A directional light (sun-like, infinite distance, no falloff).
    Directional(DirectionalLight),
    /// A point light (omni-directional with distance falloff).
    Point(PointLight),
    /// A spotlight (cone-shaped with distance and angular falloff).
    Spot(SpotLight),
}

/// The projection of a shadow camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShadowCamera {
    /// Used by directional lights.
    Orthographic {
        /// Left plane.
        left: f32,
        /// Right plane.
        right: f32,
        /// Top plane.
        top: f32,
        /// Bottom plane.
        bottom: f32,
        /// Near plane.
        near: f32,
        /// Far plane.
        far: f32,
    },
    /// Used by spot and point lights.
    Perspective {
        /// Vertical field of view in degrees.
        fov: f32,
        /// Near plane.
        near: f32,
        /// Far plane.
        far: f32,
    },
}

impl ShadowCamera {
    /// Near and far planes.
    pub fn near_far(&self) -> (f32, f32) {
        match *self {
            ShadowCamera::Orthographic { near, far, .. } => (near, far),
            ShadowCamera::Perspective { near, far, .. } => (near, far),
        }
    }
}

/// Shadow map configuration of a light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightShadow {
    /// The projection used to render the map.
    pub camera: ShadowCamera,
    /// Requested map size. Shrunk in place when the device cannot allocate it.
    pub map_size: UVec2,
    /// Depth bias.
    pub bias: f32,
    /// Bias along the surface normal.
    pub normal_bias: f32,
    /// Blur radius for filtered shadow types.
    pub radius: f32,
    /// Blur samples for variance shadows.
    pub blur_samples: u32,
    /// Shadow darkness in `[0, 1]`.
    pub intensity: f32,
    /// Re-render the map every frame.
    pub auto_update: bool,
    /// Re-render the map once when `auto_update` is off.
    pub needs_update: bool,
}

impl LightShadow {
    fn with_camera(camera: ShadowCamera) -> Self {
        Self {
            camera,
            map_size: UVec2::new(512, 512),
            bias: 0.0,
            normal_bias: 0.0,
            radius: 1.0,
            blur_samples: 8,
            intensity: 1.0,
            auto_update: true,
            needs_update: false,
        }
    }

    /// Default shadow settings for a light kind. Ambient and hemisphere lights cast no shadows.
    pub fn for_kind(kind: &LightKind) -> Option<Self> {
        match kind {
            LightKind::Directional(_) => Some(Self::with_camera(ShadowCamera::Orthographic {
                left: -5.0,
                right: 5.0,
                top: 5.0,
                bottom: -5.0,
                near: 0.5,
                far: 500.0,
            })),
            LightKind::Spot(_) => Some(Self::with_camera(ShadowCamera::Perspective {
                fov: 50.0,
                near: 0.5,
                far: 500.0,
            })),
            LightKind::Point(_) => Some(Self::with_camera(ShadowCamera::Perspective {
                fov: 90.0,
                near: 0.5,
                far: 500.0,
            })),
            LightKind::Ambient(_) | LightKind::Hemisphere(_) => None,
        }
    }
}

/// A light attached to a scene object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// The light kind and its parameters.
    pub kind: LightKind,
    /// Whether the light renders a shadow map.
    pub cast_shadow: bool,
    /// Shadow map configuration, `None` for kinds that cannot cast shadows.
    pub shadow: Option<LightShadow>,
}

impl Light {
    /// Wraps a light kind with default shadow settings and shadows off.
    pub fn new(kind: LightKind) -> Self {
        Self {
            shadow: LightShadow::for_kind(&kind),
            kind,
            cast_shadow: false,
        }
    }

    /// Enables shadow casting. No-op for kinds without shadow support.
    pub fn with_shadow(mut self) -> Self {
        self.cast_shadow = self.shadow.is_some();
        self
    }

    /// Whether this light currently renders a shadow map.
    pub fn casts_shadow(&self) -> bool {
        self.cast_shadow && self.shadow.is_some()
    }
}

impl From<LightKind> for Light {
    fn from(kind: LightKind) -> Self {
        Light::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambient_cannot_cast_shadows() {
        let light = Light::new(LightKind::Ambient(AmbientLight {
            color: Color::WHITE,
            intensity: 0.5,
        }))
        .with_shadow();
        assert!(!light.casts_shadow());
        assert!(light.shadow.is_none());
    }

    #[test]
    fn test_shadow_camera_matches_kind() {
        let dir = Light::new(LightKind::Directional(DirectionalLight::default())).with_shadow();
        assert!(dir.casts_shadow());
        assert!(matches!(
            dir.shadow.map(|s| s.camera),
            Some(ShadowCamera::Orthographic { .. })
        ));

        let point = Light::new(LightKind::Point(PointLight::default()));
        assert!(matches!(
            point.shadow.map(|s| s.camera),
            Some(ShadowCamera::Perspective { fov, .. }) if fov == 90.0
        ));
    }

    #[test]
    fn test_spot_light_default() {
        let light = SpotLight::default();
        assert_eq!(light.color, Color::WHITE);
        assert!(light.angle < std::f32::consts::FRAC_PI_2);
        assert_eq!(light.penumbra, 0.0);
    }
}
