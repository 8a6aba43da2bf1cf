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

//! The shadow map sub-pass.
//!
//! For every shadow-casting light, the lane renders the casters' depth (radial
//! distance for point lights) into an offscreen target, using substitute materials
//! that keep only what affects coverage. Variance shadow maps are then blurred in
//! two separable passes. Device work goes through a [`ShadowDrawer`], which the
//! frame orchestrator implements on top of its resource tables.

use super::lights::ShadowUniforms;
use crate::program_lane::shaders::{VSM_FRAG, VSM_VERT};
use ahash::{AHashMap, AHashSet};
use lumen_core::math::{Frustum, Mat4, Sphere, UVec2, Vec3};
use lumen_core::renderer::{
    DataType, MinFilter, Rect, ResourceError, SamplerParams, ShadowMapKind, ShadowMapSettings,
    TextureFormat, UniformValue,
};
use lumen_core::resource::{
    DepthPacking, DepthParams, DistanceParams, GeometryGroup, GeometryKey, Light, LightKind,
    LightShadow, Material, MaterialId, MaterialKey, MaterialKind, ObjectKey,
    RenderTargetDescriptor, RenderTargetKey, ShadowCamera,
};
use lumen_data::scene::SceneId;

/// Viewport atlas of point light maps, in units of the per-face size.
const POINT_FRAME_EXTENTS: UVec2 = UVec2::new(4, 2);

/// Look direction, up vector and atlas cell of each cube face.
const CUBE_FACES: [(Vec3, Vec3, (u32, u32)); 6] = [
    (Vec3::X, Vec3::Y, (2, 1)),
    (Vec3::NEG_X, Vec3::Y, (0, 1)),
    (Vec3::Z, Vec3::Y, (3, 1)),
    (Vec3::NEG_Z, Vec3::Y, (1, 1)),
    (Vec3::Y, Vec3::Z, (3, 0)),
    (Vec3::NEG_Y, Vec3::NEG_Z, (1, 0)),
];

/// Maps clip space to texture space.
const BIAS_MATRIX: Mat4 = Mat4::from_cols_array(&[
    0.5, 0.0, 0.0, 0.0, //
    0.0, 0.5, 0.0, 0.0, //
    0.0, 0.0, 0.5, 0.0, //
    0.5, 0.5, 0.5, 1.0,
]);

/// Device operations the shadow pass needs.
pub trait ShadowDrawer {
    /// The largest texture edge the device can allocate.
    fn max_texture_size(&self) -> u32;

    /// Registers a render target.
    fn create_target(&mut self, descriptor: RenderTargetDescriptor) -> RenderTargetKey;

    /// Frees a render target.
    fn dispose_target(&mut self, target: RenderTargetKey);

    /// Binds a target for drawing, allocating it first.
    fn bind_target(&mut self, target: RenderTargetKey) -> Result<(), ResourceError>;

    /// Clears color and depth of the bound target.
    fn clear(&mut self, color: [f32; 4]);

    /// Sets the viewport.
    fn set_viewport(&mut self, rect: Rect);

    /// Looks a scene material up.
    fn material(&self, key: MaterialKey) -> Option<&Material>;

    /// Draws one caster with a substitute material.
    fn draw_caster(&mut self, caster: &ShadowCaster, material: &Material, view: &ShadowView);

    /// Draws a fullscreen triangle sampling `source` through the `shadow_pass` uniform.
    fn draw_fullscreen(&mut self, material: &Material, source: RenderTargetKey);
}

/// An object rendered into shadow maps.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowCaster {
    /// The scene node.
    pub object: ObjectKey,
    /// Its geometry.
    pub geometry: GeometryKey,
    /// The material the object is normally drawn with.
    pub material: MaterialKey,
    /// The geometry group, for multi-material nodes.
    pub group: Option<GeometryGroup>,
    /// World matrix.
    pub model: Mat4,
    /// World-space bounds, `None` when unknown.
    pub bounds: Option<Sphere>,
    /// Skip the caster when its bounds are outside the light frustum.
    pub frustum_culled: bool,
}

/// A shadow-casting light of the current frame.
#[derive(Debug, Clone, Copy)]
pub struct ShadowLight {
    /// The scene node holding the light.
    pub object: ObjectKey,
    /// The light. Its `map_size` is shrunk when the device cannot allocate it.
    pub light: Light,
    /// World position of the node.
    pub position: Vec3,
}

/// The camera of one shadow view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowView {
    /// World to light space.
    pub view: Mat4,
    /// Light projection.
    pub projection: Mat4,
    /// Light position in world space.
    pub position: Vec3,
}

/// States of the shadow pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowPassState {
    /// Shadows are switched off.
    #[default]
    Disabled,
    /// Sizing and matching light records.
    CollectingLights,
    /// Drawing casters into a light's map.
    RenderingLight,
    /// Blurring a variance map.
    Blurring,
    /// Done for this frame.
    Idle,
}

/// What one run of the shadow pass did.
#[derive(Debug, Default)]
pub struct ShadowPassOutput {
    /// Shadow data of every light with a usable map.
    pub shadows: AHashMap<ObjectKey, ShadowUniforms>,
    /// Lights whose map was redrawn this frame.
    pub rendered: Vec<ObjectKey>,
    /// Lights whose requested size was shrunk, with the size kept per face.
    pub clamped: Vec<(ObjectKey, UVec2)>,
    /// First-time clamps of this resize: requested and clamped map sizes.
    pub warnings: Vec<(UVec2, UVec2)>,
    /// Lights whose map could not be allocated, with the reason.
    pub failed: Vec<(ObjectKey, String)>,
}

/// Per-light state kept across frames.
#[derive(Debug)]
struct ShadowLightRecord {
    map: RenderTargetKey,
    pass: Option<RenderTargetKey>,
    target_size: UVec2,
    last_warned: Option<UVec2>,
    view_projection: Mat4,
    matrix: Mat4,
    frustum: Option<Frustum>,
    rendered: bool,
    kind: ShadowMapKind,
    seen: bool,
}

/// A substitute material and the source version it mirrors.
#[derive(Debug)]
struct Substitute {
    source_version: u64,
    material: Material,
}

/// The shadow map sub-pass.
#[derive(Debug, Default)]
pub struct ShadowPassLane {
    records: AHashMap<(SceneId, ObjectKey), ShadowLightRecord>,
    substitutes: AHashMap<(MaterialId, bool), Substitute>,
    blur: Option<[Material; 2]>,
    state: ShadowPassState,
}

impl ShadowPassLane {
    /// Creates a new `ShadowPassLane`.
    pub fn new() -> Self {
        Self::default()
    }

    /// The state reached by the last run.
    pub fn state(&self) -> ShadowPassState {
        self.state
    }

    /// Number of lights with a record.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no light has a record.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The map target of a light.
    pub fn map(&self, scene: SceneId, light: ObjectKey) -> Option<RenderTargetKey> {
        self.records.get(&(scene, light)).map(|record| record.map)
    }

    /// The light-space frustum a light was last rendered with.
    pub fn frustum(&self, scene: SceneId, light: ObjectKey) -> Option<Frustum> {
        self.records.get(&(scene, light)).and_then(|record| record.frustum)
    }

    /// Renders the maps of `lights` for the scene `scene`.
    pub fn render(
        &mut self,
        drawer: &mut dyn ShadowDrawer,
        scene: SceneId,
        settings: &ShadowMapSettings,
        lights: &mut [ShadowLight],
        casters: &[ShadowCaster],
    ) -> ShadowPassOutput {
        let mut output = ShadowPassOutput::default();
        if !settings.enabled {
            self.state = ShadowPassState::Disabled;
            return output;
        }
        let redraw = settings.auto_update || settings.needs_update;

        self.state = ShadowPassState::CollectingLights;
        for ((owner, _), record) in self.records.iter_mut() {
            if *owner == scene {
                record.seen = false;
            }
        }

        let max_size = drawer.max_texture_size();
        for shadow_light in lights.iter_mut() {
            if !shadow_light.light.casts_shadow() {
                continue;
            }
            let object = shadow_light.object;
            let kind = shadow_light.light.kind;
            let position = shadow_light.position;
            let Some(shadow) = shadow_light.light.shadow.as_mut() else {
                continue;
            };
            let is_point = matches!(kind, LightKind::Point(_));
            let extents = if is_point {
                POINT_FRAME_EXTENTS
            } else {
                UVec2::ONE
            };

            let requested = shadow.map_size.max(UVec2::ONE);
            let mut face = requested;
            let mut target_size = requested * extents;
            if target_size.x > max_size || target_size.y > max_size {
                face = UVec2::new(
                    (max_size / extents.x).min(requested.x).max(1),
                    (max_size / extents.y).min(requested.y).max(1),
                );
                target_size = face * extents;
                shadow.map_size = face;
                output.clamped.push((object, face));
            }

            let record = match self.records.entry((scene, object)) {
                std::collections::hash_map::Entry::Occupied(slot) => slot.into_mut(),
                std::collections::hash_map::Entry::Vacant(slot) => {
                    let map = drawer.create_target(map_descriptor(target_size, settings.kind));
                    log::debug!("Created a {}x{} shadow map.", target_size.x, target_size.y);
                    slot.insert(ShadowLightRecord {
                        map,
                        pass: None,
                        target_size,
                        last_warned: None,
                        view_projection: Mat4::IDENTITY,
                        matrix: Mat4::IDENTITY,
                        frustum: None,
                        rendered: false,
                        kind: settings.kind,
                        seen: true,
                    })
                }
            };
            record.seen = true;

            if face != requested && record.last_warned != Some(requested) {
                log::warn!(
                    "Shadow map of {}x{} exceeds the maximum texture size {max_size}, clamped to {}x{}.",
                    requested.x,
                    requested.y,
                    face.x,
                    face.y
                );
                output.warnings.push((requested, face));
                record.last_warned = Some(requested);
            } else if face == requested {
                record.last_warned = None;
            }

            if record.target_size != target_size || record.kind != settings.kind {
                drawer.dispose_target(record.map);
                if let Some(pass) = record.pass.take() {
                    drawer.dispose_target(pass);
                }
                record.map = drawer.create_target(map_descriptor(target_size, settings.kind));
                record.target_size = target_size;
                record.kind = settings.kind;
                record.rendered = false;
            }

            let update = shadow.auto_update || shadow.needs_update || !record.rendered;
            if !(redraw && update) {
                if record.rendered {
                    output.shadows.insert(object, uniforms(record, shadow));
                }
                continue;
            }

            self.state = ShadowPassState::RenderingLight;
            if let Err(error) = drawer.bind_target(record.map) {
                let reason = error.to_string();
                log::error!("Shadow map allocation failed, the light renders unshadowed: {reason}");
                // Retry with a fresh target next frame.
                drawer.dispose_target(record.map);
                record.map = drawer.create_target(map_descriptor(target_size, settings.kind));
                record.rendered = false;
                output.failed.push((object, reason));
                continue;
            }
            drawer.clear([1.0, 1.0, 1.0, 1.0]);

            let views = light_views(&kind, position, shadow, face);
            let Some((_, first)) = views.first() else {
                continue;
            };
            record.view_projection = first.projection * first.view;
            record.frustum = Some(Frustum::from_view_projection(&record.view_projection));
            record.matrix = if is_point {
                Mat4::from_translation(-position)
            } else {
                BIAS_MATRIX * record.view_projection
            };

            for (viewport, view) in &views {
                drawer.set_viewport(*viewport);
                let frustum = Frustum::from_view_projection(&(view.projection * view.view));
                for caster in casters {
                    if caster.frustum_culled {
                        if let Some(bounds) = caster.bounds {
                            if !frustum.intersects_sphere(&bounds) {
                                continue;
                            }
                        }
                    }
                    let Some(source) = drawer.material(caster.material) else {
                        continue;
                    };
                    if !source.visible {
                        continue;
                    }
                    let key = substitute_for(&mut self.substitutes, source, is_point);
                    let Some(substitute) = self.substitutes.get_mut(&key) else {
                        continue;
                    };
                    if let MaterialKind::Distance(params) = &mut substitute.material.kind {
                        let (near, far) = shadow.camera.near_far();
                        *params = DistanceParams {
                            near,
                            far,
                            reference_position: position,
                        };
                    }
                    drawer.draw_caster(caster, &substitute.material, view);
                }
            }

            if settings.kind == ShadowMapKind::Vsm && !is_point {
                self.state = ShadowPassState::Blurring;
                let pass = *record.pass.get_or_insert_with(|| {
                    drawer.create_target(map_descriptor(target_size, ShadowMapKind::Vsm))
                });
                let blur = self.blur.get_or_insert_with(blur_materials);
                let viewport = Rect::new(0, 0, target_size.x as i32, target_size.y as i32);
                for (material, from, to) in [(0, record.map, pass), (1, pass, record.map)] {
                    let material = &mut blur[material];
                    if let MaterialKind::Shader(params) = &mut material.kind {
                        params.uniforms.insert(
                            "resolution".to_string(),
                            UniformValue::Vec2(target_size.as_vec2()),
                        );
                        params
                            .uniforms
                            .insert("radius".to_string(), UniformValue::Float(shadow.radius));
                        params.uniforms.insert(
                            "samples".to_string(),
                            UniformValue::Float(shadow.blur_samples as f32),
                        );
                    }
                    if drawer.bind_target(to).is_err() {
                        break;
                    }
                    drawer.set_viewport(viewport);
                    drawer.clear([0.0, 0.0, 0.0, 1.0]);
                    drawer.draw_fullscreen(material, from);
                }
            }

            shadow.needs_update = false;
            record.rendered = true;
            output.rendered.push(object);
            output.shadows.insert(object, uniforms(record, shadow));
        }

        self.prune(drawer, scene);
        self.state = ShadowPassState::Idle;
        output
    }

    /// Frees the records of `scene` whose light was not seen in the last run.
    fn prune(&mut self, drawer: &mut dyn ShadowDrawer, scene: SceneId) {
        self.records.retain(|(owner, _), record| {
            if *owner != scene || record.seen {
                return true;
            }
            drawer.dispose_target(record.map);
            if let Some(pass) = record.pass {
                drawer.dispose_target(pass);
            }
            log::debug!("Pruned the shadow map of a removed light.");
            false
        });
    }

    /// Every material owned by the lane, for program resolution.
    pub fn materials(&self) -> impl Iterator<Item = &Material> {
        self.substitutes
            .values()
            .map(|substitute| &substitute.material)
            .chain(self.blur.iter().flatten())
    }

    /// Drops the substitutes of a disposed source material.
    ///
    /// Returns the ids of the dropped substitutes so their programs can be released.
    pub fn forget_material(&mut self, source: MaterialId) -> Vec<MaterialId> {
        let mut dropped = Vec::new();
        for point in [false, true] {
            if let Some(substitute) = self.substitutes.remove(&(source, point)) {
                dropped.push(substitute.material.id());
            }
        }
        dropped
    }

    /// Marks every map stale after a context loss.
    pub fn invalidate(&mut self) {
        for record in self.records.values_mut() {
            record.rendered = false;
        }
    }

    /// Frees every target and forgets every material.
    ///
    /// Returns the ids of the lane's materials so their programs can be released.
    pub fn dispose(&mut self, drawer: &mut dyn ShadowDrawer) -> Vec<MaterialId> {
        for (_, record) in self.records.drain() {
            drawer.dispose_target(record.map);
            if let Some(pass) = record.pass {
                drawer.dispose_target(pass);
            }
        }
        let ids: Vec<MaterialId> = self.materials().map(Material::id).collect();
        self.substitutes.clear();
        self.blur = None;
        self.state = ShadowPassState::Disabled;
        ids
    }

    /// The ids of the lights with a record, for one scene.
    pub fn lights(&self, scene: SceneId) -> AHashSet<ObjectKey> {
        self.records
            .keys()
            .filter(|(owner, _)| *owner == scene)
            .map(|(_, light)| *light)
            .collect()
    }
}

/// The descriptor of a shadow map target.
fn map_descriptor(size: UVec2, kind: ShadowMapKind) -> RenderTargetDescriptor {
    let mut descriptor = RenderTargetDescriptor::new(size.x, size.y);
    if kind == ShadowMapKind::Vsm {
        descriptor.format = TextureFormat::Rg;
        descriptor.data_type = DataType::HalfFloat;
        descriptor.sampler = SamplerParams {
            min_filter: MinFilter::Linear,
            ..SamplerParams::default()
        };
    } else {
        descriptor.sampler = SamplerParams::NEAREST_CLAMP;
    }
    descriptor
}

/// The shader uniforms of a rendered record.
fn uniforms(record: &ShadowLightRecord, shadow: &LightShadow) -> ShadowUniforms {
    let (near, far) = shadow.camera.near_far();
    ShadowUniforms {
        map: record.map,
        map_size: record.target_size.as_vec2(),
        bias: shadow.bias,
        normal_bias: shadow.normal_bias,
        radius: shadow.radius,
        matrix: record.matrix,
        camera_near: near,
        camera_far: far,
    }
}

/// The projection of a shadow camera for a map of the given aspect ratio.
fn projection(camera: &ShadowCamera, fov_override: Option<f32>, aspect: f32) -> Mat4 {
    match *camera {
        ShadowCamera::Orthographic {
            left,
            right,
            top,
            bottom,
            near,
            far,
        } => Mat4::orthographic_rh_gl(left, right, bottom, top, near, far),
        ShadowCamera::Perspective { fov, near, far } => Mat4::perspective_rh_gl(
            fov_override.unwrap_or(fov.to_radians()),
            aspect,
            near,
            far,
        ),
    }
}

/// A view matrix looking from `eye` along `direction`.
fn look_along(eye: Vec3, direction: Vec3, up: Vec3) -> Mat4 {
    let up = if direction.cross(up).length_squared() < 1e-8 {
        Vec3::Z
    } else {
        up
    };
    Mat4::look_at_rh(eye, eye + direction, up)
}

/// The viewports and cameras a light renders its map with.
fn light_views(
    kind: &LightKind,
    position: Vec3,
    shadow: &LightShadow,
    face: UVec2,
) -> Vec<(Rect, ShadowView)> {
    let full = Rect::new(0, 0, face.x as i32, face.y as i32);
    let aspect = face.x as f32 / face.y as f32;
    match kind {
        LightKind::Directional(light) => {
            let view = look_along(position, light.target - position, Vec3::Y);
            vec![(
                full,
                ShadowView {
                    view,
                    projection: projection(&shadow.camera, None, aspect),
                    position,
                },
            )]
        }
        LightKind::Spot(light) => {
            let mut camera = shadow.camera;
            if let ShadowCamera::Perspective { far, .. } = &mut camera {
                if light.distance > 0.0 {
                    *far = light.distance;
                }
            }
            let view = look_along(position, light.target - position, Vec3::Y);
            vec![(
                full,
                ShadowView {
                    view,
                    projection: projection(&camera, Some(light.angle * 2.0), aspect),
                    position,
                },
            )]
        }
        LightKind::Point(_) => {
            let projection = projection(
                &shadow.camera,
                Some(std::f32::consts::FRAC_PI_2),
                1.0,
            );
            CUBE_FACES
                .iter()
                .map(|&(direction, up, (cx, cy))| {
                    let viewport = Rect::new(
                        (cx * face.x) as i32,
                        (cy * face.y) as i32,
                        face.x as i32,
                        face.y as i32,
                    );
                    let view = Mat4::look_at_rh(position, position + direction, up);
                    (
                        viewport,
                        ShadowView {
                            view,
                            projection,
                            position,
                        },
                    )
                })
                .collect()
        }
        LightKind::Ambient(_) | LightKind::Hemisphere(_) => Vec::new(),
    }
}

/// Resolves the cached substitute of `source`, refreshing it when the source changed.
fn substitute_for(
    substitutes: &mut AHashMap<(MaterialId, bool), Substitute>,
    source: &Material,
    point: bool,
) -> (MaterialId, bool) {
    let key = (source.id(), point);
    match substitutes.get_mut(&key) {
        Some(substitute) if substitute.source_version == source.version() => {}
        Some(substitute) => {
            mirror(&mut substitute.material, source);
            substitute.material.needs_update();
            substitute.source_version = source.version();
        }
        None => {
            let kind = if point {
                MaterialKind::Distance(DistanceParams::default())
            } else {
                MaterialKind::Depth(DepthParams {
                    packing: DepthPacking::Rgba,
                })
            };
            let mut material = Material::new(kind);
            mirror(&mut material, source);
            substitutes.insert(
                key,
                Substitute {
                    source_version: source.version(),
                    material,
                },
            );
        }
    }
    key
}

/// Copies the coverage-affecting state of `source`.
fn mirror(material: &mut Material, source: &Material) {
    material.name = format!("{}-shadow", material.kind.tag());
    material.maps.map = source.maps.map;
    material.maps.alpha_map = source.maps.alpha_map;
    material.maps.displacement_map = source.maps.displacement_map;
    material.alpha_test = source.alpha_test;
    material.side = source.effective_shadow_side();
    material.tone_mapped = false;
    material.fog = false;
    if source.clip_shadows {
        material.clipping_planes = source.clipping_planes.clone();
        material.clip_intersection = source.clip_intersection;
    } else {
        material.clipping_planes.clear();
        material.clip_intersection = false;
    }
}

/// The two passes of the variance blur: vertical reading packed depth, then
/// horizontal reading the distribution.
fn blur_materials() -> [Material; 2] {
    let make = |horizontal: bool| {
        let mut material = Material::shader(VSM_VERT, VSM_FRAG);
        material.name = if horizontal {
            String::from("vsm-horizontal")
        } else {
            String::from("vsm-vertical")
        };
        material.depth_test = false;
        material.depth_write = false;
        material.tone_mapped = false;
        material.fog = false;
        if let MaterialKind::Shader(params) = &mut material.kind {
            if horizontal {
                params
                    .defines
                    .insert(String::from("HORIZONTAL_PASS"), String::new());
            }
            params
                .uniforms
                .insert(String::from("samples"), UniformValue::Float(8.0));
            params
                .uniforms
                .insert(String::from("radius"), UniformValue::Float(1.0));
        }
        material
    };
    [make(false), make(true)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::resource::{DirectionalLight, PointLight};
    use lumen_core::Color;
    use lumen_data::Scene;
    use slotmap::SlotMap;

    struct FakeDrawer {
        max: u32,
        targets: SlotMap<RenderTargetKey, RenderTargetDescriptor>,
        materials: SlotMap<MaterialKey, Material>,
        failing_binds: u32,
        disposed: Vec<RenderTargetKey>,
        viewports: Vec<Rect>,
        draws: Vec<(ObjectKey, MaterialId)>,
        fullscreen: Vec<RenderTargetKey>,
    }

    impl FakeDrawer {
        fn new(max: u32) -> Self {
            Self {
                max,
                targets: SlotMap::with_key(),
                materials: SlotMap::with_key(),
                failing_binds: 0,
                disposed: Vec::new(),
                viewports: Vec::new(),
                draws: Vec::new(),
                fullscreen: Vec::new(),
            }
        }
    }

    impl ShadowDrawer for FakeDrawer {
        fn max_texture_size(&self) -> u32 {
            self.max
        }

        fn create_target(&mut self, descriptor: RenderTargetDescriptor) -> RenderTargetKey {
            self.targets.insert(descriptor)
        }

        fn dispose_target(&mut self, target: RenderTargetKey) {
            self.targets.remove(target);
            self.disposed.push(target);
        }

        fn bind_target(&mut self, target: RenderTargetKey) -> Result<(), ResourceError> {
            if self.failing_binds > 0 {
                self.failing_binds -= 1;
                return Err(ResourceError::AllocationFailed(String::from("out of memory")));
            }
            if self.targets.contains_key(target) {
                Ok(())
            } else {
                Err(ResourceError::InvalidHandle)
            }
        }

        fn clear(&mut self, _color: [f32; 4]) {}

        fn set_viewport(&mut self, rect: Rect) {
            self.viewports.push(rect);
        }

        fn material(&self, key: MaterialKey) -> Option<&Material> {
            self.materials.get(key)
        }

        fn draw_caster(&mut self, caster: &ShadowCaster, material: &Material, _view: &ShadowView) {
            self.draws.push((caster.object, material.id()));
        }

        fn draw_fullscreen(&mut self, _material: &Material, source: RenderTargetKey) {
            self.fullscreen.push(source);
        }
    }

    fn settings(kind: ShadowMapKind) -> ShadowMapSettings {
        ShadowMapSettings {
            enabled: true,
            auto_update: true,
            needs_update: false,
            kind,
        }
    }

    fn keys(n: usize) -> Vec<ObjectKey> {
        let mut map: SlotMap<ObjectKey, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    fn sun(object: ObjectKey, size: u32) -> ShadowLight {
        let mut light = Light::new(LightKind::Directional(DirectionalLight::default())).with_shadow();
        if let Some(shadow) = light.shadow.as_mut() {
            shadow.map_size = UVec2::splat(size);
        }
        ShadowLight {
            object,
            light,
            position: Vec3::new(0.0, 10.0, 0.0),
        }
    }

    fn caster(object: ObjectKey, material: MaterialKey, center: Vec3) -> ShadowCaster {
        ShadowCaster {
            object,
            geometry: GeometryKey::default(),
            material,
            group: None,
            model: Mat4::from_translation(center),
            bounds: Some(Sphere::new(center, 1.0)),
            frustum_culled: true,
        }
    }

    #[test]
    fn test_oversized_map_is_clamped_and_warned_once() {
        // --- 1. ARRANGE ---
        let scene = Scene::new();
        let k = keys(1);
        let mut drawer = FakeDrawer::new(1024);
        let mut lane = ShadowPassLane::new();
        let mut lights = [sun(k[0], 4096)];

        // --- 2. ACT ---
        let first = lane.render(&mut drawer, scene.id(), &settings(ShadowMapKind::Pcf), &mut lights, &[]);
        let second = lane.render(&mut drawer, scene.id(), &settings(ShadowMapKind::Pcf), &mut lights, &[]);

        // --- 3. ASSERT ---
        assert_eq!(first.warnings, vec![(UVec2::splat(4096), UVec2::splat(1024))]);
        assert_eq!(first.clamped, vec![(k[0], UVec2::splat(1024))]);
        assert!(second.warnings.is_empty());
        assert_eq!(lights[0].light.shadow.map(|s| s.map_size), Some(UVec2::splat(1024)));
        let map = lane.map(scene.id(), k[0]).unwrap();
        assert_eq!(drawer.targets[map].width, 1024);
        assert_eq!(lane.state(), ShadowPassState::Idle);
    }

    #[test]
    fn test_oversized_request_after_a_fitting_one_warns_again() {
        // --- 1. ARRANGE ---
        let scene = Scene::new();
        let k = keys(1);
        let mut drawer = FakeDrawer::new(1024);
        let mut lane = ShadowPassLane::new();
        let mut lights = [sun(k[0], 4096)];
        lane.render(&mut drawer, scene.id(), &settings(ShadowMapKind::Pcf), &mut lights, &[]);
        lane.render(&mut drawer, scene.id(), &settings(ShadowMapKind::Pcf), &mut lights, &[]);

        // --- 2. ACT ---
        lights[0] = sun(k[0], 4096);
        let resized = lane.render(&mut drawer, scene.id(), &settings(ShadowMapKind::Pcf), &mut lights, &[]);

        // --- 3. ASSERT ---
        assert_eq!(resized.warnings, vec![(UVec2::splat(4096), UVec2::splat(1024))]);
        assert_eq!(lights[0].light.shadow.map(|s| s.map_size), Some(UVec2::splat(1024)));
    }

    #[test]
    fn test_point_light_renders_six_faces_into_an_atlas() {
        // --- 1. ARRANGE ---
        let scene = Scene::new();
        let k = keys(2);
        let mut drawer = FakeDrawer::new(4096);
        let material = drawer.materials.insert(Material::lambert(Color::WHITE));
        let mut light = Light::new(LightKind::Point(PointLight::default())).with_shadow();
        if let Some(shadow) = light.shadow.as_mut() {
            shadow.map_size = UVec2::splat(256);
        }
        let mut lights = [ShadowLight {
            object: k[0],
            light,
            position: Vec3::ZERO,
        }];
        let casters = [ShadowCaster {
            frustum_culled: false,
            ..caster(k[1], material, Vec3::new(3.0, 0.0, 0.0))
        }];
        let mut lane = ShadowPassLane::new();

        // --- 2. ACT ---
        let output = lane.render(&mut drawer, scene.id(), &settings(ShadowMapKind::Pcf), &mut lights, &casters);

        // --- 3. ASSERT ---
        let map = lane.map(scene.id(), k[0]).unwrap();
        assert_eq!((drawer.targets[map].width, drawer.targets[map].height), (1024, 512));
        assert_eq!(drawer.viewports.len(), 6);
        assert_eq!(drawer.viewports[0], Rect::new(512, 256, 256, 256));
        assert_eq!(drawer.draws.len(), 6);
        let shadow = output.shadows[&k[0]];
        assert_eq!(shadow.matrix, Mat4::IDENTITY);
        let substitute = lane.materials().next().unwrap();
        assert!(matches!(substitute.kind, MaterialKind::Distance(_)));
    }

    #[test]
    fn test_casters_outside_the_light_frustum_are_culled() {
        let scene = Scene::new();
        let k = keys(3);
        let mut drawer = FakeDrawer::new(2048);
        let material = drawer.materials.insert(Material::lambert(Color::WHITE));
        let mut lights = [sun(k[0], 512)];
        let casters = [
            caster(k[1], material, Vec3::ZERO),
            caster(k[2], material, Vec3::new(100.0, 0.0, 0.0)),
        ];
        let mut lane = ShadowPassLane::new();

        lane.render(&mut drawer, scene.id(), &settings(ShadowMapKind::Basic), &mut lights, &casters);
        lane.render(&mut drawer, scene.id(), &settings(ShadowMapKind::Basic), &mut lights, &casters);

        assert_eq!(drawer.draws.len(), 2);
        assert!(drawer.draws.iter().all(|(object, _)| *object == k[1]));
        // One substitute serves both frames.
        assert_eq!(drawer.draws[0].1, drawer.draws[1].1);
        assert!(lane.frustum(scene.id(), k[0]).unwrap().contains_point(Vec3::ZERO));
    }

    #[test]
    fn test_failed_allocation_renders_unshadowed_then_retries() {
        // --- 1. ARRANGE ---
        let scene = Scene::new();
        let k = keys(1);
        let mut drawer = FakeDrawer::new(2048);
        drawer.failing_binds = 1;
        let mut lights = [sun(k[0], 512)];
        let mut lane = ShadowPassLane::new();

        // --- 2. ACT ---
        let failed = lane.render(&mut drawer, scene.id(), &settings(ShadowMapKind::Pcf), &mut lights, &[]);
        let retried = lane.render(&mut drawer, scene.id(), &settings(ShadowMapKind::Pcf), &mut lights, &[]);

        // --- 3. ASSERT ---
        assert_eq!(failed.failed.len(), 1);
        assert!(failed.shadows.is_empty());
        assert!(retried.failed.is_empty());
        assert!(retried.shadows.contains_key(&k[0]));
        assert_eq!(retried.rendered, vec![k[0]]);
    }

    #[test]
    fn test_removed_lights_are_pruned() {
        let scene = Scene::new();
        let k = keys(1);
        let mut drawer = FakeDrawer::new(2048);
        let mut lights = [sun(k[0], 256)];
        let mut lane = ShadowPassLane::new();
        lane.render(&mut drawer, scene.id(), &settings(ShadowMapKind::Pcf), &mut lights, &[]);
        let map = lane.map(scene.id(), k[0]).unwrap();

        lane.render(&mut drawer, scene.id(), &settings(ShadowMapKind::Pcf), &mut [], &[]);

        assert!(lane.is_empty());
        assert_eq!(drawer.disposed, vec![map]);
        assert!(drawer.targets.is_empty());
    }

    #[test]
    fn test_variance_maps_are_blurred_in_two_passes() {
        // --- 1. ARRANGE ---
        let scene = Scene::new();
        let k = keys(1);
        let mut drawer = FakeDrawer::new(2048);
        let mut lights = [sun(k[0], 256)];
        let mut lane = ShadowPassLane::new();

        // --- 2. ACT ---
        lane.render(&mut drawer, scene.id(), &settings(ShadowMapKind::Vsm), &mut lights, &[]);

        // --- 3. ASSERT ---
        let map = lane.map(scene.id(), k[0]).unwrap();
        assert_eq!(drawer.fullscreen.len(), 2);
        assert_eq!(drawer.fullscreen[0], map);
        assert_ne!(drawer.fullscreen[1], map);
        assert_eq!(drawer.targets[map].format, TextureFormat::Rg);
        assert_eq!(lane.materials().count(), 2);
    }

    #[test]
    fn test_disabled_shadows_do_nothing() {
        let scene = Scene::new();
        let k = keys(1);
        let mut drawer = FakeDrawer::new(2048);
        let mut lane = ShadowPassLane::new();
        let disabled = ShadowMapSettings {
            enabled: false,
            ..settings(ShadowMapKind::Pcf)
        };
        let output = lane.render(&mut drawer, scene.id(), &disabled, &mut [sun(k[0], 256)], &[]);
        assert!(output.shadows.is_empty());
        assert!(drawer.targets.is_empty());
        assert_eq!(lane.state(), ShadowPassState::Disabled);
    }
}
