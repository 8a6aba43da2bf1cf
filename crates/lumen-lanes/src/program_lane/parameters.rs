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

//! Program parameters: every input that changes the generated shader source.
//!
//! Two draws whose parameters produce the same [`ProgramParameters::cache_key`]
//! share one compiled program.

use lumen_core::renderer::{
    Capabilities, OutputEncoding, Precision, RendererSettings, ShadowMapKind, Side, ToneMapping,
};
use lumen_core::resource::{DepthPacking, Material, MaterialKind};
use lumen_data::Fog;

// Fixed seeds keep custom-source hashes stable across runs and processes.
const SOURCE_HASH_SEEDS: (u64, u64, u64, u64) = (
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

/// Number of lights of each kind, and how many of them sample a shadow map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(missing_docs)]
pub struct LightCounts {
    pub directional: u32,
    pub point: u32,
    pub spot: u32,
    pub hemisphere: u32,
    pub directional_shadows: u32,
    pub point_shadows: u32,
    pub spot_shadows: u32,
}

impl LightCounts {
    /// Total number of lights contributing to shading.
    pub fn total(&self) -> u32 {
        self.directional + self.point + self.spot + self.hemisphere
    }

    /// Total number of shadowed lights.
    pub fn shadows(&self) -> u32 {
        self.directional_shadows + self.point_shadows + self.spot_shadows
    }
}

/// Active clipping planes of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClippingCounts {
    /// Number of planes uploaded.
    pub planes: u32,
    /// How many of the trailing planes are intersected instead of unioned.
    pub intersection: u32,
}

impl ClippingCounts {
    /// Planes that clip on their own.
    pub fn union_planes(&self) -> u32 {
        self.planes.saturating_sub(self.intersection)
    }
}

/// Per-object inputs of the program permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectFeatures {
    /// Drawn with a per-instance matrix.
    pub instancing: bool,
    /// Drawn with a per-instance color.
    pub instancing_color: bool,
    /// Number of morph targets of the geometry.
    pub morph_targets: u32,
    /// The geometry has morphed normals.
    pub morph_normals: bool,
    /// The object samples shadow maps.
    pub receive_shadow: bool,
}

/// Everything outside the material that a program depends on.
#[derive(Debug, Clone, Copy)]
pub struct ParameterContext<'a> {
    /// Renderer settings.
    pub settings: &'a RendererSettings,
    /// Device capabilities.
    pub capabilities: &'a Capabilities,
    /// Light counts of the current lights state.
    pub lights: LightCounts,
    /// A shadow pass ran this frame.
    pub shadow_map_enabled: bool,
    /// The fog of the scene.
    pub fog: Option<Fog>,
    /// Per-object features.
    pub object: ObjectFeatures,
    /// Active clipping planes.
    pub clipping: ClippingCounts,
    /// Drawing into an offscreen target rather than the default framebuffer.
    pub render_target: bool,
}

/// Sources of a custom shader material.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomSources {
    /// Vertex stage.
    pub vertex: String,
    /// Fragment stage.
    pub fragment: String,
    /// Hash of `vertex`.
    pub vertex_hash: u64,
    /// Hash of `fragment`.
    pub fragment_hash: u64,
}

/// The derived description of one program permutation.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct ProgramParameters {
    /// Debug name of the material.
    pub shader_name: String,
    /// Built-in template id, `None` for custom shaders.
    pub shader_id: Option<&'static str>,
    pub custom: Option<CustomSources>,
    /// Material-supplied defines, sorted by name.
    pub defines: Vec<(String, String)>,
    pub precision: Precision,
    pub map: bool,
    pub alpha_map: bool,
    pub normal_map: bool,
    pub displacement_map: bool,
    pub emissive_map: bool,
    pub ao_map: bool,
    pub light_map: bool,
    pub env_map: bool,
    pub vertex_colors: bool,
    pub instancing: bool,
    pub instancing_color: bool,
    pub morph_targets: u32,
    pub morph_normals: bool,
    pub shadow_map_enabled: bool,
    pub shadow_map_kind: ShadowMapKind,
    pub receive_shadow: bool,
    pub tone_mapping: ToneMapping,
    pub output_encoding: OutputEncoding,
    pub fog: bool,
    pub fog_exp2: bool,
    pub flat_shading: bool,
    pub double_sided: bool,
    pub flip_sided: bool,
    pub alpha_test: bool,
    pub premultiplied_alpha: bool,
    pub alpha_to_coverage: bool,
    pub transmission: bool,
    pub size_attenuation: bool,
    pub depth_packing: Option<DepthPacking>,
    pub logarithmic_depth: bool,
    pub lights: LightCounts,
    pub clipping: ClippingCounts,
    pub custom_cache_key: String,
}

impl ProgramParameters {
    /// Derives the parameters of drawing `material` in `ctx`.
    pub fn from_material(material: &Material, ctx: &ParameterContext<'_>) -> Self {
        let lit = material.kind.is_lit();
        let maps = &material.maps;

        let (shader_id, custom, defines, custom_cache_key) = match &material.kind {
            MaterialKind::Shader(params) => {
                let hasher = ahash::RandomState::with_seeds(
                    SOURCE_HASH_SEEDS.0,
                    SOURCE_HASH_SEEDS.1,
                    SOURCE_HASH_SEEDS.2,
                    SOURCE_HASH_SEEDS.3,
                );
                let custom = CustomSources {
                    vertex_hash: hasher.hash_one(&params.vertex_shader),
                    fragment_hash: hasher.hash_one(&params.fragment_shader),
                    vertex: params.vertex_shader.clone(),
                    fragment: params.fragment_shader.clone(),
                };
                let defines = params
                    .defines
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                (None, Some(custom), defines, params.custom_cache_key.clone())
            }
            kind => (Some(kind.tag()), None, Vec::new(), String::new()),
        };

        let (size_attenuation, depth_packing) = match &material.kind {
            MaterialKind::Points(p) => (p.size_attenuation, None),
            MaterialKind::Depth(p) => (false, Some(p.packing)),
            _ => (false, None),
        };

        let tone_mapping = if material.tone_mapped && !ctx.render_target {
            ctx.settings.tone_mapping
        } else {
            ToneMapping::None
        };
        let output_encoding = if ctx.render_target {
            OutputEncoding::Linear
        } else {
            ctx.settings.output_encoding
        };
        let fog = material.fog && ctx.fog.is_some();

        Self {
            shader_name: if material.name.is_empty() {
                material.kind.tag().to_string()
            } else {
                material.name.clone()
            },
            shader_id,
            custom,
            defines,
            precision: ctx.capabilities.precision,
            map: maps.map.is_some(),
            alpha_map: maps.alpha_map.is_some(),
            normal_map: maps.normal_map.is_some(),
            displacement_map: maps.displacement_map.is_some(),
            emissive_map: maps.emissive_map.is_some(),
            ao_map: maps.ao_map.is_some(),
            light_map: maps.light_map.is_some(),
            env_map: maps.env_map.is_some(),
            vertex_colors: material.vertex_colors,
            instancing: ctx.object.instancing,
            instancing_color: ctx.object.instancing_color,
            morph_targets: ctx.object.morph_targets,
            morph_normals: ctx.object.morph_normals && ctx.object.morph_targets > 0,
            shadow_map_enabled: lit && ctx.shadow_map_enabled,
            shadow_map_kind: ctx.settings.shadow_map.kind,
            receive_shadow: lit && ctx.object.receive_shadow,
            tone_mapping,
            output_encoding,
            fog,
            fog_exp2: fog && matches!(ctx.fog, Some(Fog::Exp2 { .. })),
            flat_shading: material.flat_shading,
            double_sided: material.side == Side::Double,
            flip_sided: material.side == Side::Back,
            alpha_test: material.alpha_test > 0.0,
            premultiplied_alpha: material.premultiplied_alpha,
            alpha_to_coverage: material.alpha_to_coverage,
            transmission: material.transmission() > 0.0,
            size_attenuation,
            depth_packing,
            logarithmic_depth: ctx.capabilities.logarithmic_depth_buffer,
            lights: if lit { ctx.lights } else { LightCounts::default() },
            clipping: ctx.clipping,
            custom_cache_key,
        }
    }

    /// Packs the boolean features in a fixed order.
    fn feature_bits(&self) -> u64 {
        [
            self.map,
            self.alpha_map,
            self.normal_map,
            self.displacement_map,
            self.emissive_map,
            self.ao_map,
            self.light_map,
            self.env_map,
            self.vertex_colors,
            self.instancing,
            self.instancing_color,
            self.morph_normals,
            self.shadow_map_enabled,
            self.receive_shadow,
            self.fog,
            self.fog_exp2,
            self.flat_shading,
            self.double_sided,
            self.flip_sided,
            self.alpha_test,
            self.premultiplied_alpha,
            self.alpha_to_coverage,
            self.transmission,
            self.size_attenuation,
            self.logarithmic_depth,
        ]
        .into_iter()
        .enumerate()
        .fold(0, |bits, (i, on)| bits | ((on as u64) << i))
    }

    /// The string identifying this permutation in the program cache.
    pub fn cache_key(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(24);
        match (&self.shader_id, &self.custom) {
            (Some(id), _) => parts.push(id.to_string()),
            (None, Some(custom)) => {
                parts.push(format!("{:016x}", custom.vertex_hash));
                parts.push(format!("{:016x}", custom.fragment_hash));
            }
            (None, None) => parts.push(String::from("?")),
        }
        for (name, value) in &self.defines {
            parts.push(name.clone());
            parts.push(value.clone());
        }
        parts.push(self.precision.as_glsl().to_string());
        parts.push(self.feature_bits().to_string());
        parts.push(self.morph_targets.to_string());
        parts.push(format!("{:?}", self.shadow_map_kind));
        parts.push(format!("{:?}", self.tone_mapping));
        parts.push(format!("{:?}", self.output_encoding));
        parts.push(match self.depth_packing {
            Some(DepthPacking::Basic) => String::from("depth"),
            Some(DepthPacking::Rgba) => String::from("rgba"),
            None => String::new(),
        });
        let l = &self.lights;
        for count in [
            l.directional,
            l.point,
            l.spot,
            l.hemisphere,
            l.directional_shadows,
            l.point_shadows,
            l.spot_shadows,
            self.clipping.planes,
            self.clipping.intersection,
        ] {
            parts.push(count.to_string());
        }
        parts.push(self.custom_cache_key.clone());
        parts.join(",")
    }

    /// The `#define` lines prepended to both stages.
    pub fn define_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut flag = |on: bool, name: &str| {
            if on {
                lines.push(format!("#define {name}"));
            }
        };
        flag(self.shader_id == Some("physical"), "PHYSICAL");
        flag(self.map, "USE_MAP");
        flag(self.alpha_map, "USE_ALPHAMAP");
        flag(self.normal_map, "USE_NORMALMAP");
        flag(self.displacement_map, "USE_DISPLACEMENTMAP");
        flag(self.emissive_map, "USE_EMISSIVEMAP");
        flag(self.ao_map, "USE_AOMAP");
        flag(self.light_map, "USE_LIGHTMAP");
        flag(self.env_map, "USE_ENVMAP");
        flag(
            self.map
                || self.alpha_map
                || self.normal_map
                || self.displacement_map
                || self.emissive_map
                || self.ao_map
                || self.light_map,
            "USE_UV",
        );
        flag(self.vertex_colors || self.instancing_color, "USE_COLOR");
        flag(self.instancing, "USE_INSTANCING");
        flag(self.instancing_color, "USE_INSTANCING_COLOR");
        flag(self.morph_targets > 0, "USE_MORPHTARGETS");
        flag(self.morph_normals, "USE_MORPHNORMALS");
        flag(self.shadow_map_enabled && self.receive_shadow, "USE_SHADOWMAP");
        if self.shadow_map_enabled && self.receive_shadow {
            flag(self.shadow_map_kind == ShadowMapKind::Pcf, "SHADOWMAP_TYPE_PCF");
            flag(self.shadow_map_kind == ShadowMapKind::PcfSoft, "SHADOWMAP_TYPE_PCF_SOFT");
            flag(self.shadow_map_kind == ShadowMapKind::Vsm, "SHADOWMAP_TYPE_VSM");
        }
        flag(self.fog, "USE_FOG");
        flag(self.fog_exp2, "FOG_EXP2");
        flag(self.flat_shading, "FLAT_SHADED");
        flag(self.double_sided, "DOUBLE_SIDED");
        flag(self.flip_sided, "FLIP_SIDED");
        flag(self.alpha_test, "USE_ALPHATEST");
        flag(self.premultiplied_alpha, "PREMULTIPLIED_ALPHA");
        flag(self.alpha_to_coverage, "ALPHA_TO_COVERAGE");
        flag(self.transmission, "USE_TRANSMISSION");
        flag(self.size_attenuation, "USE_SIZEATTENUATION");
        flag(self.logarithmic_depth, "USE_LOGDEPTHBUF");
        flag(self.output_encoding == OutputEncoding::Srgb, "SRGB_OUTPUT");

        if self.morph_targets > 0 {
            lines.push(format!("#define MORPHTARGETS_COUNT {}", self.morph_targets));
        }
        if let Some(mode) = tone_mapping_define(self.tone_mapping) {
            lines.push(format!("#define TONE_MAPPING {mode}"));
        }
        if let Some(packing) = self.depth_packing {
            let value = match packing {
                DepthPacking::Basic => 0,
                DepthPacking::Rgba => 1,
            };
            lines.push(format!("#define DEPTH_PACKING {value}"));
        }
        for (name, value) in &self.defines {
            lines.push(format!("#define {name} {value}").trim_end().to_string());
        }
        lines
    }
}

/// The `TONE_MAPPING` value selecting an operator in the shader.
fn tone_mapping_define(mode: ToneMapping) -> Option<u32> {
    match mode {
        ToneMapping::None => None,
        ToneMapping::Linear => Some(1),
        ToneMapping::Reinhard => Some(2),
        ToneMapping::Cineon => Some(3),
        ToneMapping::AcesFilmic => Some(4),
        ToneMapping::AgX => Some(5),
        ToneMapping::Neutral => Some(6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::resource::{MapSource, TextureKey};
    use lumen_core::Color;

    fn caps() -> Capabilities {
        let device = lumen_infra::HeadlessDevice::new();
        Capabilities::probe(&device, &RendererSettings::default())
    }

    fn context<'a>(settings: &'a RendererSettings, caps: &'a Capabilities) -> ParameterContext<'a> {
        ParameterContext {
            settings,
            capabilities: caps,
            lights: LightCounts {
                directional: 1,
                ..LightCounts::default()
            },
            shadow_map_enabled: false,
            fog: None,
            object: ObjectFeatures::default(),
            clipping: ClippingCounts::default(),
            render_target: false,
        }
    }

    #[test]
    fn test_equal_materials_share_a_key() {
        // --- 1. ARRANGE ---
        let (settings, caps) = (RendererSettings::default(), caps());
        let ctx = context(&settings, &caps);
        let a = Material::lambert(Color::WHITE);
        let b = Material::lambert(Color::BLACK);

        // --- 2. ACT ---
        let key_a = ProgramParameters::from_material(&a, &ctx).cache_key();
        let key_b = ProgramParameters::from_material(&b, &ctx).cache_key();

        // --- 3. ASSERT ---
        assert_eq!(key_a, key_b);
        assert!(key_a.starts_with("lambert,"));
    }

    #[test]
    fn test_feature_changes_alter_the_key() {
        let (settings, caps) = (RendererSettings::default(), caps());
        let ctx = context(&settings, &caps);
        let plain = Material::basic(Color::WHITE);
        let mut mapped = Material::basic(Color::WHITE);
        mapped.maps.map = Some(MapSource::Texture(TextureKey::default()));

        let plain_params = ProgramParameters::from_material(&plain, &ctx);
        let mapped_params = ProgramParameters::from_material(&mapped, &ctx);
        assert_ne!(plain_params.cache_key(), mapped_params.cache_key());
        assert!(mapped_params.define_lines().contains(&"#define USE_MAP".to_string()));
        assert!(mapped_params.define_lines().contains(&"#define USE_UV".to_string()));
    }

    #[test]
    fn test_material_side_selects_sided_defines() {
        // --- 1. ARRANGE ---
        let (settings, caps) = (RendererSettings::default(), caps());
        let ctx = context(&settings, &caps);
        let mut double = Material::basic(Color::WHITE);
        double.side = Side::Double;
        let mut back = Material::basic(Color::WHITE);
        back.side = Side::Back;

        // --- 2. ACT ---
        let double = ProgramParameters::from_material(&double, &ctx);
        let back = ProgramParameters::from_material(&back, &ctx);

        // --- 3. ASSERT ---
        assert!(double.double_sided && !double.flip_sided);
        assert!(back.flip_sided && !back.double_sided);
        assert!(double.define_lines().contains(&"#define DOUBLE_SIDED".to_string()));
        assert_ne!(double.cache_key(), back.cache_key());
    }

    #[test]
    fn test_unlit_materials_ignore_lights() {
        let (settings, caps) = (RendererSettings::default(), caps());
        let mut ctx = context(&settings, &caps);
        let material = Material::basic(Color::WHITE);
        let before = ProgramParameters::from_material(&material, &ctx).cache_key();
        ctx.lights.point = 3;
        let after = ProgramParameters::from_material(&material, &ctx).cache_key();
        assert_eq!(before, after);
    }

    #[test]
    fn test_render_target_disables_tone_mapping_and_encoding() {
        // --- 1. ARRANGE ---
        let settings = RendererSettings {
            tone_mapping: ToneMapping::AcesFilmic,
            ..RendererSettings::default()
        };
        let caps = caps();
        let mut ctx = context(&settings, &caps);
        let material = Material::standard(Color::WHITE, 0.5, 0.0);

        // --- 2. ACT ---
        let screen = ProgramParameters::from_material(&material, &ctx);
        ctx.render_target = true;
        let offscreen = ProgramParameters::from_material(&material, &ctx);

        // --- 3. ASSERT ---
        assert!(screen.define_lines().contains(&"#define TONE_MAPPING 4".to_string()));
        assert!(screen.define_lines().contains(&"#define SRGB_OUTPUT".to_string()));
        assert_eq!(offscreen.tone_mapping, ToneMapping::None);
        assert_eq!(offscreen.output_encoding, OutputEncoding::Linear);
    }

    #[test]
    fn test_custom_shader_key_hashes_sources() {
        let (settings, caps) = (RendererSettings::default(), caps());
        let ctx = context(&settings, &caps);
        let a = Material::shader("void main() {}", "void main() {}");
        let b = Material::shader("void main() {}", "void main() {}");
        let mut c = Material::shader("void main() {}", "void main() { }");
        if let MaterialKind::Shader(params) = &mut c.kind {
            params.custom_cache_key = String::from("v2");
        }

        let key_a = ProgramParameters::from_material(&a, &ctx).cache_key();
        let key_b = ProgramParameters::from_material(&b, &ctx).cache_key();
        let key_c = ProgramParameters::from_material(&c, &ctx).cache_key();
        assert_eq!(key_a, key_b);
        assert_ne!(key_a, key_c);
        assert!(key_c.ends_with(",v2"));
    }
}
