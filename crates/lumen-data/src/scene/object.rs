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

//! Scene graph nodes.

use lumen_core::math::{Mat4, Quat, Vec3};
use lumen_core::resource::{
    AttributeData, BufferAttribute, GeometryKey, Layers, Light, MaterialKey, ObjectKey,
};
use lumen_core::renderer::format::BufferUsage;

/// One material for the whole geometry, or one per geometry group.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialSlot {
    /// A single material.
    Single(MaterialKey),
    /// A material list indexed by `GeometryGroup::material_index`.
    Multi(Vec<MaterialKey>),
}

impl MaterialSlot {
    /// Iterates the referenced materials.
    pub fn keys(&self) -> impl Iterator<Item = MaterialKey> + '_ {
        let slice: &[MaterialKey] = match self {
            MaterialSlot::Single(key) => std::slice::from_ref(key),
            MaterialSlot::Multi(keys) => keys,
        };
        slice.iter().copied()
    }
}

impl From<MaterialKey> for MaterialSlot {
    fn from(key: MaterialKey) -> Self {
        MaterialSlot::Single(key)
    }
}

/// A geometry drawn with one or more materials.
#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    /// The geometry.
    pub geometry: GeometryKey,
    /// The material(s).
    pub material: MaterialSlot,
}

impl Renderable {
    /// Creates a single-material renderable.
    pub fn new(geometry: GeometryKey, material: MaterialKey) -> Self {
        Self {
            geometry,
            material: MaterialSlot::Single(material),
        }
    }
}

/// A renderable drawn many times with per-instance transforms.
#[derive(Debug, Clone)]
pub struct InstancedMesh {
    /// The shared geometry and material(s).
    pub renderable: Renderable,
    /// Number of instances drawn.
    pub count: u32,
    /// One 4x4 matrix per instance (item size 16).
    pub instance_matrix: BufferAttribute,
    /// Optional per-instance color (item size 3).
    pub instance_color: Option<BufferAttribute>,
}

impl InstancedMesh {
    /// Creates `count` instances, all with the identity transform.
    pub fn new(renderable: Renderable, count: u32) -> Self {
        let matrices = Mat4::IDENTITY.to_cols_array().repeat(count as usize);
        Self {
            renderable,
            count,
            instance_matrix: BufferAttribute::new(AttributeData::F32(matrices), 16)
                .instanced(1)
                .with_usage(BufferUsage::Dynamic),
            instance_color: None,
        }
    }

    /// Sets the transform of one instance.
    pub fn set_matrix_at(&mut self, index: usize, matrix: Mat4) {
        for (component, value) in matrix.to_cols_array().into_iter().enumerate() {
            self.instance_matrix.set_component(index, component, value);
        }
    }
}

/// What a scene node is.
#[derive(Debug, Clone)]
pub enum ObjectKind {
    /// A transform-only node.
    Group,
    /// Triangles.
    Mesh(Renderable),
    /// A connected line strip.
    Line(Renderable),
    /// Independent line segments.
    LineSegments(Renderable),
    /// Point sprites.
    Points(Renderable),
    /// An instanced triangle mesh.
    InstancedMesh(InstancedMesh),
    /// A light source positioned by the node.
    Light(Light),
}

impl ObjectKind {
    /// The renderable part of drawable kinds.
    pub fn renderable(&self) -> Option<&Renderable> {
        match self {
            ObjectKind::Mesh(r)
            | ObjectKind::Line(r)
            | ObjectKind::LineSegments(r)
            | ObjectKind::Points(r) => Some(r),
            ObjectKind::InstancedMesh(m) => Some(&m.renderable),
            ObjectKind::Group | ObjectKind::Light(_) => None,
        }
    }

    /// The light of light nodes.
    pub fn light(&self) -> Option<&Light> {
        match self {
            ObjectKind::Light(light) => Some(light),
            _ => None,
        }
    }
}

/// A node of the scene graph.
#[derive(Debug, Clone)]
pub struct Object3D {
    pub(crate) id: u64,
    /// A debug name.
    pub name: String,
    /// What the node is.
    pub kind: ObjectKind,
    /// Local translation.
    pub position: Vec3,
    /// Local rotation.
    pub rotation: Quat,
    /// Local scale.
    pub scale: Vec3,
    /// Recompute the local matrix from position/rotation/scale on every update.
    pub matrix_auto_update: bool,
    pub(crate) matrix: Mat4,
    pub(crate) matrix_world: Mat4,
    /// Hidden nodes and their descendants are skipped.
    pub visible: bool,
    /// Layer membership.
    pub layers: Layers,
    /// Rendered into shadow maps.
    pub cast_shadow: bool,
    /// Receives shadows.
    pub receive_shadow: bool,
    /// Skipped when its bounding sphere is outside the camera frustum.
    pub frustum_culled: bool,
    /// Sort key overriding depth order.
    pub render_order: i32,
    /// Weights of the geometry's morph targets.
    pub morph_target_influences: Vec<f32>,
    pub(crate) parent: Option<ObjectKey>,
    pub(crate) children: Vec<ObjectKey>,
}

impl Object3D {
    /// Creates a node at the origin.
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            id: 0,
            name: String::new(),
            kind,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            matrix_auto_update: true,
            matrix: Mat4::IDENTITY,
            matrix_world: Mat4::IDENTITY,
            visible: true,
            layers: Layers::default(),
            cast_shadow: false,
            receive_shadow: false,
            frustum_culled: true,
            render_order: 0,
            morph_target_influences: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// A triangle mesh node.
    pub fn mesh(geometry: GeometryKey, material: MaterialKey) -> Self {
        Self::new(ObjectKind::Mesh(Renderable::new(geometry, material)))
    }

    /// A light node.
    pub fn light(light: Light) -> Self {
        Self::new(ObjectKind::Light(light))
    }

    /// A group node.
    pub fn group() -> Self {
        Self::new(ObjectKind::Group)
    }

    /// Sets the local translation.
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// The per-scene sequential id, assigned when the node is added.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The local matrix.
    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// Overrides the local matrix and disables its automatic recomputation.
    pub fn set_matrix(&mut self, matrix: Mat4) {
        self.matrix = matrix;
        self.matrix_auto_update = false;
    }

    /// The world matrix, valid after `Scene::update_world_matrices`.
    pub fn matrix_world(&self) -> Mat4 {
        self.matrix_world
    }

    /// World-space position.
    pub fn world_position(&self) -> Vec3 {
        self.matrix_world.w_axis.truncate()
    }

    /// The parent node.
    pub fn parent(&self) -> Option<ObjectKey> {
        self.parent
    }

    /// The child nodes, in insertion order.
    pub fn children(&self) -> &[ObjectKey] {
        &self.children
    }

    pub(crate) fn update_matrix(&mut self) {
        if self.matrix_auto_update {
            self.matrix =
                Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position);
        }
    }
}
