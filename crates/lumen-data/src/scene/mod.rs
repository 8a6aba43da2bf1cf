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

//! The scene graph: an arena of nodes with parent/child links.

mod object;
mod propagation;

pub use self::object::{InstancedMesh, MaterialSlot, Object3D, ObjectKind, Renderable};

use lumen_core::color::Color;
use lumen_core::resource::{AttributeId, MaterialKey, ObjectKey};
use slotmap::SlotMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SCENE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one [`Scene`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneId(u64);

/// Scene fog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fog {
    /// Fog growing linearly between two distances.
    Linear {
        /// Fog color.
        color: Color,
        /// Distance where fog starts.
        near: f32,
        /// Distance where fog is opaque.
        far: f32,
    },
    /// Exponential squared fog.
    Exp2 {
        /// Fog color.
        color: Color,
        /// Density.
        density: f32,
    },
}

/// A scene graph.
#[derive(Debug)]
pub struct Scene {
    id: SceneId,
    objects: SlotMap<ObjectKey, Object3D>,
    roots: Vec<ObjectKey>,
    next_object_id: u64,
    pending_disposals: Vec<AttributeId>,
    /// Solid background color, cleared before drawing.
    pub background: Option<Color>,
    /// Fog applied to materials with `fog` enabled.
    pub fog: Option<Fog>,
    /// A material replacing every object's material when set.
    pub override_material: Option<MaterialKey>,
    /// Recompute world matrices at the start of every render.
    pub auto_update: bool,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Creates an empty scene.
    pub fn new() -> Self {
        Self {
            id: SceneId(NEXT_SCENE_ID.fetch_add(1, Ordering::Relaxed)),
            objects: SlotMap::with_key(),
            roots: Vec::new(),
            next_object_id: 1,
            pending_disposals: Vec::new(),
            background: None,
            fog: None,
            override_material: None,
            auto_update: true,
        }
    }

    /// The identity of this scene.
    pub fn id(&self) -> SceneId {
        self.id
    }

    fn insert(&mut self, mut object: Object3D, parent: Option<ObjectKey>) -> ObjectKey {
        object.id = self.next_object_id;
        self.next_object_id += 1;
        object.parent = parent;
        object.children.clear();
        self.objects.insert(object)
    }

    /// Adds a root node.
    pub fn add(&mut self, object: Object3D) -> ObjectKey {
        let key = self.insert(object, None);
        self.roots.push(key);
        key
    }

    /// Adds a node under `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is not in the scene.
    pub fn add_child(&mut self, parent: ObjectKey, object: Object3D) -> ObjectKey {
        assert!(self.objects.contains_key(parent), "parent is not in the scene");
        let key = self.insert(object, Some(parent));
        self.objects[parent].children.push(key);
        key
    }

    /// Moves a node (and its subtree) under a new parent, or to the root when `None`.
    ///
    /// Returns `false` if either node is missing or the move would create a cycle.
    pub fn attach(&mut self, key: ObjectKey, parent: Option<ObjectKey>) -> bool {
        if !self.objects.contains_key(key) {
            return false;
        }
        if let Some(parent) = parent {
            if !self.objects.contains_key(parent) || self.is_ancestor(key, parent) {
                return false;
            }
        }
        self.detach(key);
        self.objects[key].parent = parent;
        match parent {
            Some(parent) => self.objects[parent].children.push(key),
            None => self.roots.push(key),
        }
        true
    }

    /// Returns `true` if `ancestor` is `node` or one of its ancestors.
    fn is_ancestor(&self, ancestor: ObjectKey, node: ObjectKey) -> bool {
        let mut current = Some(node);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = self.objects.get(key).and_then(|o| o.parent);
        }
        false
    }

    fn detach(&mut self, key: ObjectKey) {
        match self.objects[key].parent {
            Some(parent) => {
                if let Some(p) = self.objects.get_mut(parent) {
                    p.children.retain(|&c| c != key);
                }
            }
            None => self.roots.retain(|&r| r != key),
        }
    }

    /// Removes a node and its whole subtree. Returns the number of removed nodes.
    ///
    /// Per-instance attributes of removed instanced meshes are queued for disposal.
    pub fn remove(&mut self, key: ObjectKey) -> usize {
        if !self.objects.contains_key(key) {
            return 0;
        }
        self.detach(key);
        let mut stack = vec![key];
        let mut removed = 0;
        while let Some(current) = stack.pop() {
            let Some(object) = self.objects.remove(current) else {
                continue;
            };
            removed += 1;
            if let ObjectKind::InstancedMesh(mesh) = &object.kind {
                self.pending_disposals.push(mesh.instance_matrix.id());
                if let Some(color) = &mesh.instance_color {
                    self.pending_disposals.push(color.id());
                }
            }
            stack.extend(object.children);
        }
        log::debug!("Removed {removed} node(s) from the scene.");
        removed
    }

    /// Retrieves a node.
    pub fn get(&self, key: ObjectKey) -> Option<&Object3D> {
        self.objects.get(key)
    }

    /// Retrieves a node mutably.
    pub fn get_mut(&mut self, key: ObjectKey) -> Option<&mut Object3D> {
        self.objects.get_mut(key)
    }

    /// Iterates every node in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectKey, &Object3D)> {
        self.objects.iter()
    }

    /// Iterates every node mutably in arena order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ObjectKey, &mut Object3D)> {
        self.objects.iter_mut()
    }

    /// The root nodes, in insertion order.
    pub fn roots(&self) -> &[ObjectKey] {
        &self.roots
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if the scene has no nodes.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Recomputes every world matrix.
    pub fn update_world_matrices(&mut self) {
        propagation::propagate_world_matrices(&mut self.objects, &self.roots);
    }

    /// Visits visible nodes depth-first, parents before children, siblings in
    /// insertion order. A hidden node hides its whole subtree.
    ///
    /// The third argument is the group order: the `render_order` of the
    /// nearest enclosing [`ObjectKind::Group`], or 0 outside any group.
    pub fn visit_visible(&self, mut visit: impl FnMut(ObjectKey, &Object3D, i32)) {
        let mut stack: Vec<(ObjectKey, i32)> =
            self.roots.iter().rev().map(|&key| (key, 0)).collect();
        while let Some((key, group_order)) = stack.pop() {
            let Some(object) = self.objects.get(key) else {
                continue;
            };
            if !object.visible {
                continue;
            }
            visit(key, object, group_order);
            let child_order = match object.kind {
                ObjectKind::Group => object.render_order,
                _ => group_order,
            };
            stack.extend(object.children.iter().rev().map(|&child| (child, child_order)));
        }
    }

    /// Takes the attribute identities queued by removals.
    pub fn drain_pending_disposals(&mut self) -> Vec<AttributeId> {
        std::mem::take(&mut self.pending_disposals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::resource::GeometryKey;

    #[test]
    fn test_visit_visible_order_and_pruning() {
        // --- 1. ARRANGE ---
        let mut scene = Scene::new();
        let a = scene.add(Object3D::group());
        let a1 = scene.add_child(a, Object3D::group());
        let hidden = scene.add_child(a, Object3D::group());
        scene.add_child(hidden, Object3D::group());
        let b = scene.add(Object3D::group());
        scene.get_mut(hidden).unwrap().visible = false;

        // --- 2. ACT ---
        let mut visited = Vec::new();
        scene.visit_visible(|key, _, _| visited.push(key));

        // --- 3. ASSERT ---
        assert_eq!(visited, vec![a, a1, b]);
    }

    #[test]
    fn test_visit_visible_carries_nearest_group_order() {
        // --- 1. ARRANGE ---
        let mut scene = Scene::new();
        let outer = scene.add(Object3D::group());
        scene.get_mut(outer).unwrap().render_order = 3;
        let leaf = scene.add_child(outer, Object3D::group());
        let inner = scene.add_child(outer, Object3D::group());
        scene.get_mut(inner).unwrap().render_order = 7;
        let nested = scene.add_child(inner, Object3D::group());

        // --- 2. ACT ---
        let mut orders = Vec::new();
        scene.visit_visible(|key, _, group_order| orders.push((key, group_order)));

        // --- 3. ASSERT ---
        assert_eq!(orders, vec![(outer, 0), (leaf, 3), (inner, 3), (nested, 7)]);
    }

    #[test]
    fn test_remove_subtree_queues_instance_buffers() {
        // --- 1. ARRANGE ---
        let mut scene = Scene::new();
        let root = scene.add(Object3D::group());
        let instanced = InstancedMesh::new(
            Renderable::new(GeometryKey::default(), MaterialKey::default()),
            4,
        );
        let matrix_id = instanced.instance_matrix.id();
        scene.add_child(root, Object3D::new(ObjectKind::InstancedMesh(instanced)));

        // --- 2. ACT ---
        let removed = scene.remove(root);

        // --- 3. ASSERT ---
        assert_eq!(removed, 2);
        assert!(scene.is_empty());
        assert!(scene.roots().is_empty());
        assert_eq!(scene.drain_pending_disposals(), vec![matrix_id]);
    }

    #[test]
    fn test_attach_rejects_cycles() {
        let mut scene = Scene::new();
        let parent = scene.add(Object3D::group());
        let child = scene.add_child(parent, Object3D::group());
        assert!(!scene.attach(parent, Some(child)));
        assert!(scene.attach(child, None));
        assert_eq!(scene.roots(), &[parent, child]);
        assert!(scene.get(parent).unwrap().children().is_empty());
    }

    #[test]
    fn test_object_ids_are_sequential() {
        let mut scene = Scene::new();
        let a = scene.add(Object3D::group());
        let b = scene.add(Object3D::group());
        assert!(scene.get(a).unwrap().id() < scene.get(b).unwrap().id());
    }
}
