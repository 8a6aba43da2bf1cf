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

//! Light state: the scene's lights flattened into per-kind uniform arrays.
//!
//! [`LightsState::setup`] runs once per frame with world-space inputs, then
//! [`LightsState::setup_view`] moves positions and directions into the camera's
//! view space. Lights with a rendered shadow map are ordered first within their
//! kind so shadow index `i` pairs with light index `i` in the shaders.

use crate::program_lane::{LightCounts, UniformTable};
use ahash::AHashMap;
use lumen_core::math::{Mat4, Vec2, Vec3};
use lumen_core::renderer::{GraphicsDevice, UniformValue};
use lumen_core::resource::{Light, LightKind, ObjectKey, RenderTargetKey};

/// A light collected from the scene, with its world position.
#[derive(Debug, Clone, Copy)]
pub struct LightInput {
    /// The scene node holding the light.
    pub object: ObjectKey,
    /// The light.
    pub light: Light,
    /// World position of the node.
    pub position: Vec3,
}

/// Shadow data of one light whose map was rendered this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowUniforms {
    /// The render target holding the map.
    pub map: RenderTargetKey,
    /// Map size in texels.
    pub map_size: Vec2,
    /// Depth bias.
    pub bias: f32,
    /// Bias along the normal.
    pub normal_bias: f32,
    /// Filter radius.
    pub radius: f32,
    /// World space to shadow texture coordinates. A translation for point lights.
    pub matrix: Mat4,
    /// Near plane of the shadow camera.
    pub camera_near: f32,
    /// Far plane of the shadow camera.
    pub camera_far: f32,
}

#[derive(Debug, Clone, Copy)]
struct DirectionalEntry {
    color: Vec3,
    direction: Vec3,
    shadow: Option<ShadowUniforms>,
}

#[derive(Debug, Clone, Copy)]
struct PointEntry {
    color: Vec3,
    position: Vec3,
    distance: f32,
    decay: f32,
    shadow: Option<ShadowUniforms>,
}

#[derive(Debug, Clone, Copy)]
struct SpotEntry {
    color: Vec3,
    position: Vec3,
    direction: Vec3,
    distance: f32,
    decay: f32,
    cone_cos: f32,
    penumbra_cos: f32,
    shadow: Option<ShadowUniforms>,
}

#[derive(Debug, Clone, Copy)]
struct HemisphereEntry {
    direction: Vec3,
    sky_color: Vec3,
    ground_color: Vec3,
}

impl ShadowUniforms {
    /// Shadow data of a light whose map is not rendered yet.
    fn pending() -> Self {
        Self {
            map: RenderTargetKey::default(),
            map_size: Vec2::ZERO,
            bias: 0.0,
            normal_bias: 0.0,
            radius: 0.0,
            matrix: Mat4::IDENTITY,
            camera_near: 0.0,
            camera_far: 0.0,
        }
    }
}

/// The lights of the current frame, ready for upload.
#[derive(Debug, Default)]
pub struct LightsState {
    ambient: Vec3,
    directional: Vec<DirectionalEntry>,
    point: Vec<PointEntry>,
    spot: Vec<SpotEntry>,
    hemisphere: Vec<HemisphereEntry>,
    view: Vec<UniformBlock>,
    counts: LightCounts,
    version: u64,
}

/// One named uniform of the view-space upload.
#[derive(Debug, Clone, PartialEq)]
struct UniformBlock {
    name: &'static str,
    value: UniformValue,
}

impl LightsState {
    /// Creates an empty light state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Light and shadow counts of the current frame.
    pub fn counts(&self) -> LightCounts {
        self.counts
    }

    /// Bumped every time the counts change. Programs built against an older
    /// version have the wrong array sizes.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Summed ambient radiance.
    pub fn ambient(&self) -> Vec3 {
        self.ambient
    }

    /// Flattens `lights`. `shadows` holds the lights whose map rendered this frame.
    pub fn setup(
        &mut self,
        lights: &[LightInput],
        shadows: &AHashMap<ObjectKey, ShadowUniforms>,
    ) {
        self.ambient = Vec3::ZERO;
        self.directional.clear();
        self.point.clear();
        self.spot.clear();
        self.hemisphere.clear();

        let mut ordered: Vec<&LightInput> = lights.iter().collect();
        ordered.sort_by_key(|input| !shadows.contains_key(&input.object));

        for input in ordered {
            let shadow = shadows.get(&input.object).copied();
            match input.light.kind {
                LightKind::Ambient(light) => {
                    self.ambient += light.color.scaled(light.intensity).to_vec3();
                }
                LightKind::Hemisphere(light) => self.hemisphere.push(HemisphereEntry {
                    direction: input.position.normalize_or(Vec3::Y),
                    sky_color: light.sky_color.scaled(light.intensity).to_vec3(),
                    ground_color: light.ground_color.scaled(light.intensity).to_vec3(),
                }),
                LightKind::Directional(light) => self.directional.push(DirectionalEntry {
                    color: light.color.scaled(light.intensity).to_vec3(),
                    direction: (input.position - light.target).normalize_or(Vec3::Y),
                    shadow,
                }),
                LightKind::Point(light) => self.point.push(PointEntry {
                    color: light.color.scaled(light.intensity).to_vec3(),
                    position: input.position,
                    distance: light.distance,
                    decay: light.decay,
                    shadow,
                }),
                LightKind::Spot(light) => self.spot.push(SpotEntry {
                    color: light.color.scaled(light.intensity).to_vec3(),
                    position: input.position,
                    direction: (input.position - light.target).normalize_or(Vec3::NEG_Z),
                    distance: light.distance,
                    decay: light.decay,
                    cone_cos: light.angle.cos(),
                    penumbra_cos: (light.angle * (1.0 - light.penumbra)).cos(),
                    shadow,
                }),
            }
        }

        let counts = LightCounts {
            directional: self.directional.len() as u32,
            point: self.point.len() as u32,
            spot: self.spot.len() as u32,
            hemisphere: self.hemisphere.len() as u32,
            directional_shadows: self.directional.iter().filter(|l| l.shadow.is_some()).count()
                as u32,
            point_shadows: self.point.iter().filter(|l| l.shadow.is_some()).count() as u32,
            spot_shadows: self.spot.iter().filter(|l| l.shadow.is_some()).count() as u32,
        };
        if counts != self.counts {
            self.counts = counts;
            self.version += 1;
        }
    }

    /// Flattens `lights` before any shadow map exists, counting every light
    /// for which `shadowed` holds as shadowed. Only the counts are meaningful;
    /// the next [`Self::setup`] replaces the shadow data.
    pub fn setup_expected(&mut self, lights: &[LightInput], shadowed: impl Fn(&LightInput) -> bool) {
        let shadows: AHashMap<ObjectKey, ShadowUniforms> = lights
            .iter()
            .filter(|input| shadowed(input))
            .map(|input| (input.object, ShadowUniforms::pending()))
            .collect();
        self.setup(lights, &shadows);
    }

    /// Computes the view-space arrays for the camera with view matrix `view`.
    pub fn setup_view(&mut self, view: &Mat4) {
        let mut blocks = vec![UniformBlock {
            name: "ambientLightColor",
            value: UniformValue::Vec3(self.ambient),
        }];
        let mut push = |name: &'static str, value: UniformValue| {
            blocks.push(UniformBlock { name, value });
        };

        if !self.directional.is_empty() {
            let lights = &self.directional;
            push(
                "directionalLightDirection",
                UniformValue::Vec3Array(
                    lights
                        .iter()
                        .map(|l| view.transform_vector3(l.direction).normalize_or_zero())
                        .collect(),
                ),
            );
            push(
                "directionalLightColor",
                UniformValue::Vec3Array(lights.iter().map(|l| l.color).collect()),
            );
        }

        if !self.point.is_empty() {
            let lights = &self.point;
            push(
                "pointLightPosition",
                UniformValue::Vec3Array(
                    lights.iter().map(|l| view.transform_point3(l.position)).collect(),
                ),
            );
            push(
                "pointLightColor",
                UniformValue::Vec3Array(lights.iter().map(|l| l.color).collect()),
            );
            push(
                "pointLightDistance",
                UniformValue::FloatArray(lights.iter().map(|l| l.distance).collect()),
            );
            push(
                "pointLightDecay",
                UniformValue::FloatArray(lights.iter().map(|l| l.decay).collect()),
            );
        }

        if !self.spot.is_empty() {
            let lights = &self.spot;
            push(
                "spotLightPosition",
                UniformValue::Vec3Array(
                    lights.iter().map(|l| view.transform_point3(l.position)).collect(),
                ),
            );
            push(
                "spotLightDirection",
                UniformValue::Vec3Array(
                    lights
                        .iter()
                        .map(|l| view.transform_vector3(l.direction).normalize_or_zero())
                        .collect(),
                ),
            );
            push(
                "spotLightColor",
                UniformValue::Vec3Array(lights.iter().map(|l| l.color).collect()),
            );
            push(
                "spotLightDistance",
                UniformValue::FloatArray(lights.iter().map(|l| l.distance).collect()),
            );
            push(
                "spotLightDecay",
                UniformValue::FloatArray(lights.iter().map(|l| l.decay).collect()),
            );
            push(
                "spotLightConeCos",
                UniformValue::FloatArray(lights.iter().map(|l| l.cone_cos).collect()),
            );
            push(
                "spotLightPenumbraCos",
                UniformValue::FloatArray(lights.iter().map(|l| l.penumbra_cos).collect()),
            );
        }

        if !self.hemisphere.is_empty() {
            let lights = &self.hemisphere;
            push(
                "hemisphereLightDirection",
                UniformValue::Vec3Array(
                    lights
                        .iter()
                        .map(|l| view.transform_vector3(l.direction).normalize_or_zero())
                        .collect(),
                ),
            );
            push(
                "hemisphereLightSkyColor",
                UniformValue::Vec3Array(lights.iter().map(|l| l.sky_color).collect()),
            );
            push(
                "hemisphereLightGroundColor",
                UniformValue::Vec3Array(lights.iter().map(|l| l.ground_color).collect()),
            );
        }

        let directional: Vec<ShadowUniforms> =
            self.directional.iter().filter_map(|l| l.shadow).collect();
        let spot: Vec<ShadowUniforms> = self.spot.iter().filter_map(|l| l.shadow).collect();
        let point: Vec<ShadowUniforms> = self.point.iter().filter_map(|l| l.shadow).collect();
        for (prefix, shadows) in [
            (ShadowNames::DIRECTIONAL, &directional),
            (ShadowNames::SPOT, &spot),
            (ShadowNames::POINT, &point),
        ] {
            if shadows.is_empty() {
                continue;
            }
            push(
                prefix.map_size,
                UniformValue::Vec2Array(shadows.iter().map(|s| s.map_size).collect()),
            );
            push(
                prefix.bias,
                UniformValue::FloatArray(shadows.iter().map(|s| s.bias).collect()),
            );
            push(
                prefix.normal_bias,
                UniformValue::FloatArray(shadows.iter().map(|s| s.normal_bias).collect()),
            );
            push(
                prefix.radius,
                UniformValue::FloatArray(shadows.iter().map(|s| s.radius).collect()),
            );
            push(
                prefix.matrix,
                UniformValue::Mat4Array(shadows.iter().map(|s| s.matrix).collect()),
            );
        }
        if !point.is_empty() {
            push(
                "pointShadowCameraNear",
                UniformValue::FloatArray(point.iter().map(|s| s.camera_near).collect()),
            );
            push(
                "pointShadowCameraFar",
                UniformValue::FloatArray(point.iter().map(|s| s.camera_far).collect()),
            );
        }

        self.view = blocks;
    }

    /// Uploads the view-space arrays to the program in use.
    ///
    /// Returns the number of device calls issued.
    pub fn upload(&self, device: &mut dyn GraphicsDevice, uniforms: &mut UniformTable) -> usize {
        self.view
            .iter()
            .filter(|block| uniforms.set(device, block.name, block.value.clone()))
            .count()
    }

    /// The shadow-map sampler arrays: uniform name and the targets bound to its
    /// elements, in light order.
    pub fn shadow_samplers(&self) -> [(&'static str, Vec<RenderTargetKey>); 3] {
        [
            (
                ShadowNames::DIRECTIONAL.map,
                self.directional.iter().filter_map(|l| l.shadow.map(|s| s.map)).collect(),
            ),
            (
                ShadowNames::SPOT.map,
                self.spot.iter().filter_map(|l| l.shadow.map(|s| s.map)).collect(),
            ),
            (
                ShadowNames::POINT.map,
                self.point.iter().filter_map(|l| l.shadow.map(|s| s.map)).collect(),
            ),
        ]
    }
}

/// Uniform names of one shadowed light kind.
struct ShadowNames {
    map: &'static str,
    map_size: &'static str,
    bias: &'static str,
    normal_bias: &'static str,
    radius: &'static str,
    matrix: &'static str,
}

impl ShadowNames {
    const DIRECTIONAL: Self = Self {
        map: "directionalShadowMap",
        map_size: "directionalShadowMapSize",
        bias: "directionalShadowBias",
        normal_bias: "directionalShadowNormalBias",
        radius: "directionalShadowRadius",
        matrix: "directionalShadowMatrix",
    };
    const SPOT: Self = Self {
        map: "spotShadowMap",
        map_size: "spotShadowMapSize",
        bias: "spotShadowBias",
        normal_bias: "spotShadowNormalBias",
        radius: "spotShadowRadius",
        matrix: "spotShadowMatrix",
    };
    const POINT: Self = Self {
        map: "pointShadowMap",
        map_size: "pointShadowMapSize",
        bias: "pointShadowBias",
        normal_bias: "pointShadowNormalBias",
        radius: "pointShadowRadius",
        matrix: "pointShadowMatrix",
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lumen_core::resource::{AmbientLight, DirectionalLight, PointLight, SpotLight};
    use lumen_core::Color;
    use slotmap::SlotMap;

    fn keys(n: usize) -> Vec<ObjectKey> {
        let mut map: SlotMap<ObjectKey, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    fn shadow(map: RenderTargetKey) -> ShadowUniforms {
        ShadowUniforms {
            map,
            map_size: Vec2::splat(512.0),
            bias: 0.0,
            normal_bias: 0.0,
            radius: 1.0,
            matrix: Mat4::IDENTITY,
            camera_near: 0.5,
            camera_far: 500.0,
        }
    }

    #[test]
    fn test_counts_and_version_follow_the_scene() {
        // --- 1. ARRANGE ---
        let k = keys(3);
        let ambient = LightInput {
            object: k[0],
            light: Light::new(LightKind::Ambient(AmbientLight {
                color: Color::WHITE,
                intensity: 0.25,
            })),
            position: Vec3::ZERO,
        };
        let sun = LightInput {
            object: k[1],
            light: Light::new(LightKind::Directional(DirectionalLight::default())),
            position: Vec3::new(0.0, 10.0, 0.0),
        };
        let bulb = LightInput {
            object: k[2],
            light: Light::new(LightKind::Point(PointLight::default())),
            position: Vec3::new(1.0, 2.0, 3.0),
        };
        let mut state = LightsState::new();

        // --- 2. ACT ---
        state.setup(&[ambient, sun, bulb], &AHashMap::new());
        let first = state.version();
        state.setup(&[ambient, sun, bulb], &AHashMap::new());
        let unchanged = state.version();
        state.setup(&[ambient, sun], &AHashMap::new());

        // --- 3. ASSERT ---
        assert_eq!(first, 1);
        assert_eq!(unchanged, first);
        assert_eq!(state.version(), 2);
        assert_eq!(state.counts().directional, 1);
        assert_eq!(state.counts().point, 0);
        assert_relative_eq!(state.ambient().x, 0.25);
    }

    #[test]
    fn test_expected_shadows_match_rendered_counts() {
        // --- 1. ARRANGE ---
        let k = keys(2);
        let mut targets: SlotMap<RenderTargetKey, ()> = SlotMap::with_key();
        let map = targets.insert(());
        let sun = LightInput {
            object: k[0],
            light: Light::new(LightKind::Directional(DirectionalLight::default())).with_shadow(),
            position: Vec3::new(0.0, 10.0, 0.0),
        };
        let bulb = LightInput {
            object: k[1],
            light: Light::new(LightKind::Point(PointLight::default())),
            position: Vec3::new(1.0, 2.0, 3.0),
        };
        let mut rendered = AHashMap::new();
        rendered.insert(k[0], shadow(map));
        let mut state = LightsState::new();

        // --- 2. ACT ---
        state.setup_expected(&[sun, bulb], |input| input.light.casts_shadow());
        let expected = (state.counts(), state.version());
        state.setup(&[sun, bulb], &rendered);

        // --- 3. ASSERT ---
        assert_eq!(expected.0.directional_shadows, 1);
        assert_eq!(expected.0.point_shadows, 0);
        assert_eq!(expected.0, state.counts());
        assert_eq!(expected.1, state.version());
    }

    #[test]
    fn test_shadowed_lights_come_first() {
        // --- 1. ARRANGE ---
        let k = keys(2);
        let mut targets: SlotMap<RenderTargetKey, ()> = SlotMap::with_key();
        let map = targets.insert(());
        let plain = LightInput {
            object: k[0],
            light: Light::new(LightKind::Spot(SpotLight::default())),
            position: Vec3::new(-1.0, 5.0, 0.0),
        };
        let caster = LightInput {
            object: k[1],
            light: Light::new(LightKind::Spot(SpotLight::default())).with_shadow(),
            position: Vec3::new(1.0, 5.0, 0.0),
        };
        let mut shadows = AHashMap::new();
        shadows.insert(k[1], shadow(map));
        let mut state = LightsState::new();

        // --- 2. ACT ---
        state.setup(&[plain, caster], &shadows);
        state.setup_view(&Mat4::IDENTITY);

        // --- 3. ASSERT ---
        assert_eq!(state.counts().spot, 2);
        assert_eq!(state.counts().spot_shadows, 1);
        let positions = state
            .view
            .iter()
            .find(|b| b.name == "spotLightPosition")
            .map(|b| b.value.clone());
        assert_eq!(
            positions,
            Some(UniformValue::Vec3Array(vec![
                Vec3::new(1.0, 5.0, 0.0),
                Vec3::new(-1.0, 5.0, 0.0)
            ]))
        );
        assert_eq!(state.shadow_samplers()[1], ("spotShadowMap", vec![map]));
    }

    #[test]
    fn test_directions_are_in_view_space() {
        let k = keys(1);
        let sun = LightInput {
            object: k[0],
            light: Light::new(LightKind::Directional(DirectionalLight::default())),
            position: Vec3::new(0.0, 10.0, 0.0),
        };
        let mut state = LightsState::new();
        state.setup(&[sun], &AHashMap::new());
        let view = Mat4::from_rotation_x(std::f32::consts::FRAC_PI_2);
        state.setup_view(&view);

        let direction = state
            .view
            .iter()
            .find_map(|b| match (&b.name, &b.value) {
                (&"directionalLightDirection", UniformValue::Vec3Array(v)) => v.first().copied(),
                _ => None,
            })
            .unwrap();
        assert_relative_eq!(direction.z, 1.0, epsilon = 1e-5);
    }
}
