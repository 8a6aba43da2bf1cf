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

//! Built-in GLSL ES 3.0 sources, embedded at compile time.
//!
//! Templates are not valid GLSL on their own: they `#include <chunk>` pieces of
//! [`CHUNKS`] and reference light-count placeholders (`NUM_DIR_LIGHTS`...) that the
//! preprocessor resolves before compilation.
//!
//! # Templates
//!
//! - [`MESH_VERT`] - Shared vertex stage of the surface materials
//! - [`BASIC_FRAG`], [`LAMBERT_FRAG`], [`PHONG_FRAG`], [`STANDARD_FRAG`] - Surface shading
//! - [`DEPTH_VERT`] / [`DEPTH_FRAG`] - Depth output, packed for shadow maps
//! - [`DISTANCE_VERT`] / [`DISTANCE_FRAG`] - Radial distance for point-light shadows
//! - [`POINTS_VERT`] / [`POINTS_FRAG`] - Point sprites
//! - [`LINE_VERT`] / [`LINE_FRAG`] - Lines
//! - [`VSM_VERT`] / [`VSM_FRAG`] - Separable blur of variance shadow maps

/// Vertex stage shared by basic, Lambert, Phong, standard and physical materials.
pub const MESH_VERT: &str = include_str!("mesh.vert");

/// Unlit surface shading.
pub const BASIC_FRAG: &str = include_str!("basic.frag");

/// Diffuse-only lighting.
pub const LAMBERT_FRAG: &str = include_str!("lambert.frag");

/// Diffuse plus a specular highlight.
pub const PHONG_FRAG: &str = include_str!("phong.frag");

/// Metallic-roughness shading. Compiled with `PHYSICAL` for physical materials.
pub const STANDARD_FRAG: &str = include_str!("standard.frag");

/// Vertex stage of depth materials.
pub const DEPTH_VERT: &str = include_str!("depth.vert");

/// Writes depth, RGBA-packed when `DEPTH_PACKING` is `1`.
pub const DEPTH_FRAG: &str = include_str!("depth.frag");

/// Vertex stage of distance materials.
pub const DISTANCE_VERT: &str = include_str!("distance.vert");

/// Writes the packed distance to `referencePosition`.
pub const DISTANCE_FRAG: &str = include_str!("distance.frag");

/// Point sprites with optional size attenuation.
pub const POINTS_VERT: &str = include_str!("points.vert");

/// Point sprite shading.
pub const POINTS_FRAG: &str = include_str!("points.frag");

/// Line vertex stage.
pub const LINE_VERT: &str = include_str!("line.vert");

/// Line shading.
pub const LINE_FRAG: &str = include_str!("line.frag");

/// Fullscreen triangle of the VSM blur.
pub const VSM_VERT: &str = include_str!("vsm.vert");

/// One direction of the VSM blur, horizontal with `HORIZONTAL_PASS`.
pub const VSM_FRAG: &str = include_str!("vsm.frag");

macro_rules! chunks {
    ($($name:literal),* $(,)?) => {
        &[$(($name, include_str!(concat!("chunks/", $name, ".glsl")))),*]
    };
}

/// The built-in chunk library, by include name.
pub const CHUNKS: &[(&str, &str)] = chunks![
    "begin_vertex",
    "beginnormal_vertex",
    "clipping_planes_fragment",
    "clipping_planes_pars_fragment",
    "clipping_planes_pars_vertex",
    "clipping_planes_vertex",
    "color_vertex",
    "common",
    "emissive_fragment",
    "fog_fragment",
    "fog_pars_fragment",
    "fog_pars_vertex",
    "fog_vertex",
    "lights_fragment",
    "lights_pars_begin",
    "logdepthbuf_fragment",
    "logdepthbuf_pars_fragment",
    "logdepthbuf_pars_vertex",
    "logdepthbuf_vertex",
    "map_fragment",
    "map_pars_fragment",
    "morphtarget_pars_vertex",
    "morphtarget_vertex",
    "normal_fragment",
    "output_fragment",
    "packing",
    "project_vertex",
    "shadowmap_pars_fragment",
    "shadowmap_pars_vertex",
    "shadowmap_vertex",
    "tonemapping_pars_fragment",
    "transmission_fragment",
    "transmission_pars_fragment",
    "vertex_pars",
    "worldpos_vertex",
];

/// Returns the vertex and fragment templates of a built-in shading model.
pub fn template(shader_id: &str) -> Option<(&'static str, &'static str)> {
    Some(match shader_id {
        "basic" => (MESH_VERT, BASIC_FRAG),
        "lambert" => (MESH_VERT, LAMBERT_FRAG),
        "phong" => (MESH_VERT, PHONG_FRAG),
        "standard" | "physical" => (MESH_VERT, STANDARD_FRAG),
        "depth" => (DEPTH_VERT, DEPTH_FRAG),
        "distance" => (DISTANCE_VERT, DISTANCE_FRAG),
        "points" => (POINTS_VERT, POINTS_FRAG),
        "line" => (LINE_VERT, LINE_FRAG),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_templates_declare_output() {
        for frag in [BASIC_FRAG, LAMBERT_FRAG, PHONG_FRAG, STANDARD_FRAG, DEPTH_FRAG, VSM_FRAG] {
            assert!(frag.contains("fragColor"));
            assert!(frag.contains("void main"));
        }
    }

    #[test]
    fn test_every_include_names_a_chunk() {
        let templates = [
            MESH_VERT, BASIC_FRAG, LAMBERT_FRAG, PHONG_FRAG, STANDARD_FRAG, DEPTH_VERT,
            DEPTH_FRAG, DISTANCE_VERT, DISTANCE_FRAG, POINTS_VERT, LINE_VERT, VSM_FRAG,
        ];
        let sources = templates.iter().chain(CHUNKS.iter().map(|(_, source)| source));
        for source in sources {
            for line in source.lines() {
                let Some(rest) = line.trim().strip_prefix("#include") else {
                    continue;
                };
                let name = rest.trim().trim_start_matches('<').trim_end_matches('>');
                assert!(
                    CHUNKS.iter().any(|(chunk, _)| *chunk == name),
                    "unknown chunk <{name}>"
                );
            }
        }
    }

    #[test]
    fn test_physical_shares_standard_template() {
        assert_eq!(template("physical"), template("standard"));
        assert!(template("shader").is_none());
    }
}
