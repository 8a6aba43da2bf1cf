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

//! Indexed or non-indexed vertex data with named attributes.

use super::attribute::{AttributeData, AttributeId, BufferAttribute};
use crate::math::{Sphere, Vec3};
use std::collections::BTreeMap;

/// The name of the attribute holding vertex positions.
pub const POSITION: &str = "position";
/// The name of the attribute holding vertex normals.
pub const NORMAL: &str = "normal";
/// The name of the attribute holding texture coordinates.
pub const UV: &str = "uv";
/// The name of the attribute holding vertex colors.
pub const COLOR: &str = "color";

/// A sub-range of a geometry drawn with one material of a multi-material object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryGroup {
    /// First vertex (or index).
    pub start: u32,
    /// Number of vertices (or indices).
    pub count: u32,
    /// Index into the object's material list.
    pub material_index: usize,
}

/// The part of a geometry that is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawRange {
    /// First vertex (or index).
    pub start: u32,
    /// Number of vertices (or indices); `None` draws to the end.
    pub count: Option<u32>,
}

/// A collection of buffer attributes describing a mesh, line or point cloud.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    /// Optional index list.
    pub index: Option<BufferAttribute>,
    attributes: BTreeMap<String, BufferAttribute>,
    /// Morph target deltas (or absolute values), per base attribute name.
    pub morph_attributes: BTreeMap<String, Vec<BufferAttribute>>,
    /// If `true`, morph attributes are offsets added to the base attribute.
    pub morph_targets_relative: bool,
    /// Material groups.
    pub groups: Vec<GeometryGroup>,
    /// The drawn range.
    pub draw_range: DrawRange,
    /// Bounding sphere in object space, used for frustum culling.
    pub bounding_sphere: Option<Sphere>,
    /// Number of instances for geometries with instanced attributes.
    pub instance_count: Option<u32>,
}

impl Geometry {
    /// Creates an empty geometry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a named attribute.
    pub fn set_attribute(&mut self, name: impl Into<String>, attribute: BufferAttribute) -> &mut Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    /// Sets the index list.
    pub fn set_index(&mut self, index: BufferAttribute) -> &mut Self {
        assert!(
            index.index_type().is_some(),
            "index attributes must hold u16 or u32 data"
        );
        self.index = Some(index);
        self
    }

    /// Removes and returns an attribute.
    pub fn remove_attribute(&mut self, name: &str) -> Option<BufferAttribute> {
        self.attributes.remove(name)
    }

    /// Looks up an attribute.
    pub fn attribute(&self, name: &str) -> Option<&BufferAttribute> {
        self.attributes.get(name)
    }

    /// Looks up an attribute mutably.
    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut BufferAttribute> {
        self.attributes.get_mut(name)
    }

    /// Iterates attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &BufferAttribute)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates attributes mutably in name order.
    pub fn attributes_mut(&mut self) -> impl Iterator<Item = (&str, &mut BufferAttribute)> {
        self.attributes.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Appends a material group.
    pub fn add_group(&mut self, start: u32, count: u32, material_index: usize) -> &mut Self {
        self.groups.push(GeometryGroup {
            start,
            count,
            material_index,
        });
        self
    }

    /// Sets the drawn range.
    pub fn set_draw_range(&mut self, start: u32, count: Option<u32>) -> &mut Self {
        self.draw_range = DrawRange { start, count };
        self
    }

    /// Number of vertices, from the position attribute.
    pub fn vertex_count(&self) -> usize {
        self.attribute(POSITION).map_or(0, BufferAttribute::count)
    }

    /// Number of morph targets on the position attribute.
    pub fn morph_target_count(&self) -> usize {
        self.morph_attributes.get(POSITION).map_or(0, Vec::len)
    }

    /// Whether vertex colors are present.
    pub fn has_vertex_colors(&self) -> bool {
        self.attributes.contains_key(COLOR)
    }

    /// Every attribute identity, including index and morph attributes.
    pub fn attribute_ids(&self) -> Vec<AttributeId> {
        self.index
            .iter()
            .chain(self.attributes.values())
            .chain(self.morph_attributes.values().flatten())
            .map(BufferAttribute::id)
            .collect()
    }

    /// Computes the bounding sphere from float positions.
    pub fn compute_bounding_sphere(&mut self) {
        let sphere = match self.attribute(POSITION) {
            Some(position) if position.item_size() == 3 => match position.data() {
                AttributeData::F32(data) => Sphere::from_points(
                    data.chunks_exact(3).map(|c| Vec3::new(c[0], c[1], c[2])),
                ),
                _ => Sphere::EMPTY,
            },
            _ => Sphere::EMPTY,
        };
        self.bounding_sphere = Some(sphere);
    }

    /// A unit quad in the XY plane, two triangles, indexed.
    pub fn plane(width: f32, height: f32) -> Self {
        let (hw, hh) = (width * 0.5, height * 0.5);
        let mut geometry = Self::new();
        geometry
            .set_attribute(
                POSITION,
                BufferAttribute::from_f32(
                    vec![-hw, -hh, 0.0, hw, -hh, 0.0, hw, hh, 0.0, -hw, hh, 0.0],
                    3,
                ),
            )
            .set_attribute(
                NORMAL,
                BufferAttribute::from_f32([0.0, 0.0, 1.0].repeat(4), 3),
            )
            .set_attribute(
                UV,
                BufferAttribute::from_f32(vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0], 2),
            )
            .set_index(BufferAttribute::indices(&[0, 1, 2, 0, 2, 3]));
        geometry.compute_bounding_sphere();
        geometry
    }

    /// An axis-aligned box centered on the origin, 24 vertices and 36 indices.
    pub fn cuboid(width: f32, height: f32, depth: f32) -> Self {
        let h = Vec3::new(width, height, depth) * 0.5;
        // (normal, u axis, v axis) per face
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let mut positions = Vec::with_capacity(72);
        let mut normals = Vec::with_capacity(72);
        let mut uvs = Vec::with_capacity(48);
        let mut indices = Vec::with_capacity(36);
        for (face, (n, u, v)) in faces.iter().enumerate() {
            let base = (face * 4) as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = (*n + *u * su + *v * sv) * h;
                positions.extend_from_slice(&[p.x, p.y, p.z]);
                normals.extend_from_slice(&[n.x, n.y, n.z]);
                uvs.extend_from_slice(&[(su + 1.0) * 0.5, (sv + 1.0) * 0.5]);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        let mut geometry = Self::new();
        geometry
            .set_attribute(POSITION, BufferAttribute::from_f32(positions, 3))
            .set_attribute(NORMAL, BufferAttribute::from_f32(normals, 3))
            .set_attribute(UV, BufferAttribute::from_f32(uvs, 2))
            .set_index(BufferAttribute::indices(&indices));
        geometry.compute_bounding_sphere();
        geometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cuboid_layout() {
        let geometry = Geometry::cuboid(2.0, 2.0, 2.0);
        assert_eq!(geometry.vertex_count(), 24);
        assert_eq!(geometry.index.as_ref().map(BufferAttribute::count), Some(36));
        let sphere = geometry.bounding_sphere.unwrap();
        assert_relative_eq!(sphere.radius, 3f32.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_attribute_ids_cover_index_and_morphs() {
        let mut geometry = Geometry::plane(1.0, 1.0);
        geometry
            .morph_attributes
            .insert(POSITION.to_string(), vec![BufferAttribute::from_f32(vec![0.0; 12], 3)]);
        // index + position + normal + uv + one morph target
        assert_eq!(geometry.attribute_ids().len(), 5);
        assert_eq!(geometry.morph_target_count(), 1);
    }

    #[test]
    #[should_panic(expected = "index attributes")]
    fn test_float_index_panics() {
        Geometry::new().set_index(BufferAttribute::from_f32(vec![0.0, 1.0, 2.0], 1));
    }
}
