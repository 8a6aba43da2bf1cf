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

//! Materials: fixed-function render state plus a closed set of shading models.
//!
//! A [`Material`] carries the state every shading model shares (blending, depth,
//! stencil, side, maps...) and a [`MaterialKind`] holding the parameters specific
//! to one model. The renderer derives shader permutations from both.

use super::{RenderTargetKey, TextureKey};
use crate::color::Color;
use crate::math::{Plane, Vec3};
use crate::renderer::state::{
    Blending, CompareFunction, CustomBlend, Side, StencilOperation,
};
use crate::renderer::uniform::UniformValue;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique identity of a [`Material`], issued at creation.
///
/// Ids increase monotonically, so sorting by id groups materials by creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u64);

impl MaterialId {
    fn next() -> Self {
        Self(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Where a material map samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapSource {
    /// A texture from the asset store.
    Texture(TextureKey),
    /// The color texture of a renderer-owned render target.
    RenderTarget(RenderTargetKey),
}

impl From<TextureKey> for MapSource {
    fn from(key: TextureKey) -> Self {
        MapSource::Texture(key)
    }
}

impl From<RenderTargetKey> for MapSource {
    fn from(key: RenderTargetKey) -> Self {
        MapSource::RenderTarget(key)
    }
}

/// Texture maps a material may sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct MaterialMaps {
    pub map: Option<MapSource>,
    pub alpha_map: Option<MapSource>,
    pub normal_map: Option<MapSource>,
    pub displacement_map: Option<MapSource>,
    pub emissive_map: Option<MapSource>,
    pub ao_map: Option<MapSource>,
    pub light_map: Option<MapSource>,
    /// A cube map used for reflections.
    pub env_map: Option<MapSource>,
}

impl MaterialMaps {
    /// Iterates the present maps with the sampler uniform name they bind to.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, MapSource)> {
        [
            ("map", self.map),
            ("alphaMap", self.alpha_map),
            ("normalMap", self.normal_map),
            ("displacementMap", self.displacement_map),
            ("emissiveMap", self.emissive_map),
            ("aoMap", self.ao_map),
            ("lightMap", self.light_map),
            ("envMap", self.env_map),
        ]
        .into_iter()
        .filter_map(|(name, source)| source.map(|s| (name, s)))
    }
}

/// Stencil test configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilState {
    /// Enables the stencil test.
    pub enabled: bool,
    /// Comparison function.
    pub func: CompareFunction,
    /// Reference value.
    pub reference: i32,
    /// Mask applied to both reference and stored value.
    pub func_mask: u32,
    /// Write mask.
    pub write_mask: u32,
    /// Operation when the stencil test fails.
    pub fail: StencilOperation,
    /// Operation when the stencil test passes and the depth test fails.
    pub z_fail: StencilOperation,
    /// Operation when both tests pass.
    pub z_pass: StencilOperation,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            enabled: false,
            func: CompareFunction::Always,
            reference: 0,
            func_mask: 0xff,
            write_mask: 0xff,
            fail: StencilOperation::Keep,
            z_fail: StencilOperation::Keep,
            z_pass: StencilOperation::Keep,
        }
    }
}

/// Depth offset applied to filled polygons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonOffset {
    /// Slope-scaled factor.
    pub factor: f32,
    /// Constant units.
    pub units: f32,
}

/// Parameters of the unlit model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicParams {
    /// Diffuse color.
    pub color: Color,
}

/// Parameters of the Lambertian model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LambertParams {
    /// Diffuse color.
    pub color: Color,
    /// Emitted color.
    pub emissive: Color,
}

/// Parameters of the Blinn-Phong model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhongParams {
    /// Diffuse color.
    pub color: Color,
    /// Emitted color.
    pub emissive: Color,
    /// Specular color.
    pub specular: Color,
    /// Specular exponent.
    pub shininess: f32,
}

/// Parameters of the metallic-roughness model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardParams {
    /// Base color.
    pub color: Color,
    /// Emitted color.
    pub emissive: Color,
    /// Surface roughness in `[0, 1]`.
    pub roughness: f32,
    /// Metalness in `[0, 1]`.
    pub metalness: f32,
    /// Scale of the environment map contribution.
    pub env_map_intensity: f32,
}

impl Default for StandardParams {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            emissive: Color::BLACK,
            roughness: 1.0,
            metalness: 0.0,
            env_map_intensity: 1.0,
        }
    }
}

/// Parameters of the extended physical model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalParams {
    /// The metallic-roughness base.
    pub standard: StandardParams,
    /// Clearcoat layer intensity.
    pub clearcoat: f32,
    /// Index of refraction.
    pub ior: f32,
    /// Fraction of light transmitted through the surface. A positive value moves
    /// the material into the transmissive render list.
    pub transmission: f32,
    /// Thickness of the transmissive volume.
    pub thickness: f32,
}

impl Default for PhysicalParams {
    fn default() -> Self {
        Self {
            standard: StandardParams::default(),
            clearcoat: 0.0,
            ior: 1.5,
            transmission: 0.0,
            thickness: 0.0,
        }
    }
}

/// How depth is written by [`MaterialKind::Depth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthPacking {
    /// Depth in the red channel.
    #[default]
    Basic,
    /// Depth packed across the four channels of an RGBA8 target.
    Rgba,
}

/// Parameters of the depth-only model used by shadow maps.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthParams {
    /// Depth packing.
    pub packing: DepthPacking,
}

/// Parameters of the distance model used by point light shadow maps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceParams {
    /// Distance mapped to `0`.
    pub near: f32,
    /// Distance mapped to `1`.
    pub far: f32,
    /// World-space point distances are measured from.
    pub reference_position: Vec3,
}

impl Default for DistanceParams {
    fn default() -> Self {
        Self {
            near: 1.0,
            far: 1000.0,
            reference_position: Vec3::ZERO,
        }
    }
}

/// Parameters of point sprites.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointsParams {
    /// Point color.
    pub color: Color,
    /// Point size in pixels.
    pub size: f32,
    /// Whether size shrinks with distance under perspective.
    pub size_attenuation: bool,
}

/// Parameters of lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineParams {
    /// Line color.
    pub color: Color,
    /// Rasterized width.
    pub line_width: f32,
}

/// A user-provided shader.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShaderParams {
    /// Vertex shader body. May use `#include <chunk>` directives.
    pub vertex_shader: String,
    /// Fragment shader body.
    pub fragment_shader: String,
    /// Extra `#define NAME VALUE` lines, an empty value defines the bare name.
    pub defines: BTreeMap<String, String>,
    /// Custom uniform values, uploaded by name.
    pub uniforms: BTreeMap<String, UniformValue>,
    /// Whether scene lights are fed to the shader.
    pub lights: bool,
    /// A fragment appended to the program cache key.
    pub custom_cache_key: String,
}

/// The shading model of a material and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialKind {
    /// Unlit.
    Basic(BasicParams),
    /// Lambertian diffuse.
    Lambert(LambertParams),
    /// Blinn-Phong.
    Phong(PhongParams),
    /// Metallic-roughness PBR.
    Standard(StandardParams),
    /// Extended PBR with transmission.
    Physical(PhysicalParams),
    /// Depth only.
    Depth(DepthParams),
    /// Distance to a reference point.
    Distance(DistanceParams),
    /// Point sprites.
    Points(PointsParams),
    /// Lines.
    Line(LineParams),
    /// A custom shader.
    Shader(ShaderParams),
}

impl MaterialKind {
    /// A short stable tag, used as the shader template id and in cache keys.
    pub fn tag(&self) -> &'static str {
        match self {
            MaterialKind::Basic(_) => "basic",
            MaterialKind::Lambert(_) => "lambert",
            MaterialKind::Phong(_) => "phong",
            MaterialKind::Standard(_) => "standard",
            MaterialKind::Physical(_) => "physical",
            MaterialKind::Depth(_) => "depth",
            MaterialKind::Distance(_) => "distance",
            MaterialKind::Points(_) => "points",
            MaterialKind::Line(_) => "line",
            MaterialKind::Shader(_) => "shader",
        }
    }

    /// Whether the model consumes scene lights.
    pub fn is_lit(&self) -> bool {
        match self {
            MaterialKind::Lambert(_)
            | MaterialKind::Phong(_)
            | MaterialKind::Standard(_)
            | MaterialKind::Physical(_) => true,
            MaterialKind::Shader(params) => params.lights,
            _ => false,
        }
    }

    /// The diffuse color, for models that have one.
    pub fn color(&self) -> Option<Color> {
        match self {
            MaterialKind::Basic(p) => Some(p.color),
            MaterialKind::Lambert(p) => Some(p.color),
            MaterialKind::Phong(p) => Some(p.color),
            MaterialKind::Standard(p) => Some(p.color),
            MaterialKind::Physical(p) => Some(p.standard.color),
            MaterialKind::Points(p) => Some(p.color),
            MaterialKind::Line(p) => Some(p.color),
            _ => None,
        }
    }
}

/// A material: shading model plus render state.
///
/// Materials are stored in an asset arena and referenced by key. Every material gets
/// a fresh [`MaterialId`] at creation (clones included); GPU-side state such as the
/// compiled program is cached against that id and [`Material::version`].
#[derive(Debug)]
pub struct Material {
    id: MaterialId,
    version: u64,
    /// A debug name.
    pub name: String,
    /// The shading model.
    pub kind: MaterialKind,
    /// Texture maps.
    pub maps: MaterialMaps,
    /// Rendered faces.
    pub side: Side,
    /// Faces rendered into shadow maps; derived from `side` when `None`.
    pub shadow_side: Option<Side>,
    /// Routes the material to the transparent list.
    pub transparent: bool,
    /// Opacity in `[0, 1]`.
    pub opacity: f32,
    /// Blending preset.
    pub blending: Blending,
    /// Factors used by [`Blending::Custom`].
    pub custom_blend: CustomBlend,
    /// Whether colors are premultiplied by alpha.
    pub premultiplied_alpha: bool,
    /// Enables depth testing.
    pub depth_test: bool,
    /// Enables depth writes.
    pub depth_write: bool,
    /// Depth comparison.
    pub depth_func: CompareFunction,
    /// Enables color writes.
    pub color_write: bool,
    /// Stencil configuration.
    pub stencil: StencilState,
    /// Polygon offset, disabled when `None`.
    pub polygon_offset: Option<PolygonOffset>,
    /// Fragments with alpha below this value are discarded; `0` disables the test.
    pub alpha_test: f32,
    /// Enables alpha-to-coverage.
    pub alpha_to_coverage: bool,
    /// Hidden materials are skipped when building render lists.
    pub visible: bool,
    /// Whether the renderer's tone mapping applies.
    pub tone_mapped: bool,
    /// Whether scene fog applies.
    pub fog: bool,
    /// Uses the `color` attribute.
    pub vertex_colors: bool,
    /// Uses face normals.
    pub flat_shading: bool,
    /// Renders triangle edges as lines.
    pub wireframe: bool,
    /// Local clipping planes in world space.
    pub clipping_planes: Vec<Plane>,
    /// Clip the union instead of the intersection of the planes.
    pub clip_intersection: bool,
    /// Apply clipping planes in shadow maps too.
    pub clip_shadows: bool,
}

impl Material {
    /// Creates a material with default render state.
    pub fn new(kind: MaterialKind) -> Self {
        Self {
            id: MaterialId::next(),
            version: 0,
            name: String::new(),
            kind,
            maps: MaterialMaps::default(),
            side: Side::Front,
            shadow_side: None,
            transparent: false,
            opacity: 1.0,
            blending: Blending::Normal,
            custom_blend: CustomBlend::default(),
            premultiplied_alpha: false,
            depth_test: true,
            depth_write: true,
            depth_func: CompareFunction::LessEqual,
            color_write: true,
            stencil: StencilState::default(),
            polygon_offset: None,
            alpha_test: 0.0,
            alpha_to_coverage: false,
            visible: true,
            tone_mapped: true,
            fog: true,
            vertex_colors: false,
            flat_shading: false,
            wireframe: false,
            clipping_planes: Vec::new(),
            clip_intersection: false,
            clip_shadows: false,
        }
    }

    /// An unlit material.
    pub fn basic(color: Color) -> Self {
        Self::new(MaterialKind::Basic(BasicParams { color }))
    }

    /// A Lambertian material.
    pub fn lambert(color: Color) -> Self {
        Self::new(MaterialKind::Lambert(LambertParams {
            color,
            emissive: Color::BLACK,
        }))
    }

    /// A Blinn-Phong material.
    pub fn phong(color: Color, shininess: f32) -> Self {
        Self::new(MaterialKind::Phong(PhongParams {
            color,
            emissive: Color::BLACK,
            specular: Color::rgb(0.07, 0.07, 0.07),
            shininess,
        }))
    }

    /// A metallic-roughness material.
    pub fn standard(color: Color, roughness: f32, metalness: f32) -> Self {
        Self::new(MaterialKind::Standard(StandardParams {
            color,
            roughness,
            metalness,
            ..StandardParams::default()
        }))
    }

    /// A physical material with the given transmission.
    pub fn physical(color: Color, transmission: f32) -> Self {
        Self::new(MaterialKind::Physical(PhysicalParams {
            standard: StandardParams {
                color,
                ..StandardParams::default()
            },
            transmission,
            ..PhysicalParams::default()
        }))
    }

    /// A point sprite material.
    pub fn points(color: Color, size: f32) -> Self {
        Self::new(MaterialKind::Points(PointsParams {
            color,
            size,
            size_attenuation: true,
        }))
    }

    /// A line material.
    pub fn line(color: Color) -> Self {
        Self::new(MaterialKind::Line(LineParams {
            color,
            line_width: 1.0,
        }))
    }

    /// A custom shader material.
    pub fn shader(vertex_shader: impl Into<String>, fragment_shader: impl Into<String>) -> Self {
        Self::new(MaterialKind::Shader(ShaderParams {
            vertex_shader: vertex_shader.into(),
            fragment_shader: fragment_shader.into(),
            ..ShaderParams::default()
        }))
    }

    /// The identity of this material.
    pub fn id(&self) -> MaterialId {
        self.id
    }

    /// The version counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Flags a change that affects the compiled program (kind, maps, defines...).
    pub fn needs_update(&mut self) {
        self.version += 1;
    }

    /// The transmission factor, `0` for non-physical models.
    pub fn transmission(&self) -> f32 {
        match &self.kind {
            MaterialKind::Physical(p) => p.transmission,
            _ => 0.0,
        }
    }

    /// The faces rendered into shadow maps.
    pub fn effective_shadow_side(&self) -> Side {
        self.shadow_side.unwrap_or(match self.side {
            Side::Front => Side::Back,
            Side::Back => Side::Front,
            Side::Double => Side::Double,
        })
    }
}

impl Clone for Material {
    fn clone(&self) -> Self {
        Self {
            id: MaterialId::next(),
            version: self.version,
            name: self.name.clone(),
            kind: self.kind.clone(),
            maps: self.maps,
            side: self.side,
            shadow_side: self.shadow_side,
            transparent: self.transparent,
            opacity: self.opacity,
            blending: self.blending,
            custom_blend: self.custom_blend,
            premultiplied_alpha: self.premultiplied_alpha,
            depth_test: self.depth_test,
            depth_write: self.depth_write,
            depth_func: self.depth_func,
            color_write: self.color_write,
            stencil: self.stencil,
            polygon_offset: self.polygon_offset,
            alpha_test: self.alpha_test,
            alpha_to_coverage: self.alpha_to_coverage,
            visible: self.visible,
            tone_mapped: self.tone_mapped,
            fog: self.fog,
            vertex_colors: self.vertex_colors,
            flat_shading: self.flat_shading,
            wireframe: self.wireframe,
            clipping_planes: self.clipping_planes.clone(),
            clip_intersection: self.clip_intersection,
            clip_shadows: self.clip_shadows,
        }
    }
}
