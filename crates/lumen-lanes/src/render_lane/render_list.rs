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

//! Per-frame render lists: opaque, transmissive and transparent buckets over a
//! pooled item array.

use ahash::AHashMap;
use lumen_core::resource::{GeometryGroup, GeometryKey, Material, MaterialId, MaterialKey, ObjectKey};
use lumen_data::scene::SceneId;
use std::cmp::Ordering;

/// One draw of one object with one material.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    /// The scene node.
    pub object: ObjectKey,
    /// The node's per-scene id, the final sort tie-breaker.
    pub object_id: u64,
    /// The geometry drawn.
    pub geometry: GeometryKey,
    /// The material drawn with.
    pub material: MaterialKey,
    /// Identity of the material, used to batch opaque draws by program.
    pub material_id: MaterialId,
    /// Order of the enclosing render group.
    pub group_order: i32,
    /// The node's render order.
    pub render_order: i32,
    /// Camera-space depth of the node's world position.
    pub z: f32,
    /// The geometry group drawn, for multi-material nodes.
    pub group: Option<GeometryGroup>,
}

/// Orders two render items.
pub type RenderItemCompare = fn(&RenderItem, &RenderItem) -> Ordering;

/// Front-to-back order for opaque items, batching by material.
pub fn painter_sort_stable(a: &RenderItem, b: &RenderItem) -> Ordering {
    a.group_order
        .cmp(&b.group_order)
        .then(a.render_order.cmp(&b.render_order))
        .then(a.material_id.cmp(&b.material_id))
        .then(a.z.total_cmp(&b.z))
        .then(a.object_id.cmp(&b.object_id))
}

/// Back-to-front order for transparent and transmissive items.
pub fn reverse_painter_sort_stable(a: &RenderItem, b: &RenderItem) -> Ordering {
    a.group_order
        .cmp(&b.group_order)
        .then(a.render_order.cmp(&b.render_order))
        .then(b.z.total_cmp(&a.z))
        .then(a.object_id.cmp(&b.object_id))
}

/// The bucket a material is drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// Drawn first, sorted front to back.
    Opaque,
    /// Drawn after opaque items, sampling the opaque result.
    Transmissive,
    /// Drawn last, sorted back to front.
    Transparent,
}

impl Bucket {
    /// Selects the bucket of a material.
    pub fn of(material: &Material) -> Self {
        if material.transmission() > 0.0 {
            Bucket::Transmissive
        } else if material.transparent {
            Bucket::Transparent
        } else {
            Bucket::Opaque
        }
    }
}

/// The three buckets of one render call.
///
/// Items live in a pool that survives across frames; the buckets hold indices
/// into it.
#[derive(Debug, Default)]
pub struct RenderList {
    items: Vec<RenderItem>,
    len: usize,
    opaque: Vec<usize>,
    transmissive: Vec<usize>,
    transparent: Vec<usize>,
}

impl RenderList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties the buckets, keeping the pool.
    pub fn init(&mut self) {
        self.len = 0;
        self.opaque.clear();
        self.transmissive.clear();
        self.transparent.clear();
    }

    fn store(&mut self, item: RenderItem) -> usize {
        let index = self.len;
        if index < self.items.len() {
            self.items[index] = item;
        } else {
            self.items.push(item);
        }
        self.len += 1;
        index
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<usize> {
        match bucket {
            Bucket::Opaque => &mut self.opaque,
            Bucket::Transmissive => &mut self.transmissive,
            Bucket::Transparent => &mut self.transparent,
        }
    }

    /// Appends an item to the bucket of `material`.
    pub fn push(&mut self, item: RenderItem, material: &Material) {
        let index = self.store(item);
        self.bucket_mut(Bucket::of(material)).push(index);
    }

    /// Prepends an item to the bucket of `material`.
    pub fn unshift(&mut self, item: RenderItem, material: &Material) {
        let index = self.store(item);
        self.bucket_mut(Bucket::of(material)).insert(0, index);
    }

    /// Drops pooled items beyond this frame's logical length.
    pub fn finish(&mut self) {
        self.items.truncate(self.len);
    }

    /// Sorts the buckets; `None` selects the default comparators.
    pub fn sort(
        &mut self,
        opaque: Option<RenderItemCompare>,
        transparent: Option<RenderItemCompare>,
    ) {
        let opaque = opaque.unwrap_or(painter_sort_stable);
        let transparent = transparent.unwrap_or(reverse_painter_sort_stable);
        let items = &self.items;
        self.opaque.sort_by(|&a, &b| opaque(&items[a], &items[b]));
        self.transmissive
            .sort_by(|&a, &b| transparent(&items[a], &items[b]));
        self.transparent
            .sort_by(|&a, &b| transparent(&items[a], &items[b]));
    }

    fn resolve<'a>(&'a self, indices: &'a [usize]) -> impl Iterator<Item = &'a RenderItem> + 'a {
        indices.iter().map(move |&i| &self.items[i])
    }

    /// Items of a bucket, in draw order.
    pub fn bucket(&self, bucket: Bucket) -> impl Iterator<Item = &RenderItem> + '_ {
        let indices = match bucket {
            Bucket::Opaque => &self.opaque,
            Bucket::Transmissive => &self.transmissive,
            Bucket::Transparent => &self.transparent,
        };
        self.resolve(indices)
    }

    /// Opaque items, in draw order.
    pub fn opaque(&self) -> impl Iterator<Item = &RenderItem> + '_ {
        self.resolve(&self.opaque)
    }

    /// Transmissive items, in draw order.
    pub fn transmissive(&self) -> impl Iterator<Item = &RenderItem> + '_ {
        self.resolve(&self.transmissive)
    }

    /// Transparent items, in draw order.
    pub fn transparent(&self) -> impl Iterator<Item = &RenderItem> + '_ {
        self.resolve(&self.transparent)
    }

    /// Number of items pushed this frame.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing was pushed this frame.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of pooled items kept across frames.
    pub fn pool_size(&self) -> usize {
        self.items.len()
    }
}

/// One [`RenderList`] per scene and render-call depth, so a render nested in
/// another does not clobber the outer list.
#[derive(Debug, Default)]
pub struct RenderLists {
    lists: AHashMap<(SceneId, usize), RenderList>,
}

impl RenderLists {
    /// Creates an empty set of lists.
    pub fn new() -> Self {
        Self::default()
    }

    /// The list of `scene` at nesting `depth`, created on first use.
    pub fn get(&mut self, scene: SceneId, depth: usize) -> &mut RenderList {
        self.lists.entry((scene, depth)).or_default()
    }

    /// Takes the list out so it can be filled while the renderer is borrowed.
    pub fn take(&mut self, scene: SceneId, depth: usize) -> RenderList {
        self.lists.remove(&(scene, depth)).unwrap_or_default()
    }

    /// Puts back a list taken with [`take`](Self::take).
    pub fn restore(&mut self, scene: SceneId, depth: usize, list: RenderList) {
        self.lists.insert((scene, depth), list);
    }

    /// Drops every list.
    pub fn dispose(&mut self) {
        self.lists.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::color::Color;
    use slotmap::SlotMap;

    struct Fixture {
        opaque: Material,
        other_opaque: Material,
        transparent: Material,
        transmissive: Material,
        objects: Vec<ObjectKey>,
    }

    fn fixture() -> Fixture {
        let mut objects: SlotMap<ObjectKey, ()> = SlotMap::with_key();
        let mut transparent = Material::basic(Color::WHITE);
        transparent.transparent = true;
        Fixture {
            opaque: Material::basic(Color::WHITE),
            other_opaque: Material::basic(Color::BLACK),
            transparent,
            transmissive: Material::physical(Color::WHITE, 0.5),
            objects: (0..8).map(|_| objects.insert(())).collect(),
        }
    }

    fn item(f: &Fixture, id: u64, material: &Material, z: f32, render_order: i32) -> RenderItem {
        RenderItem {
            object: f.objects[id as usize],
            object_id: id,
            geometry: GeometryKey::default(),
            material: MaterialKey::default(),
            material_id: material.id(),
            group_order: 0,
            render_order,
            z,
            group: None,
        }
    }

    #[test]
    fn test_buckets_are_disjoint() {
        // --- 1. ARRANGE ---
        let f = fixture();
        let mut list = RenderList::new();
        list.init();

        // --- 2. ACT ---
        list.push(item(&f, 1, &f.opaque, 1.0, 0), &f.opaque);
        list.push(item(&f, 2, &f.transparent, 1.0, 0), &f.transparent);
        list.push(item(&f, 3, &f.transmissive, 1.0, 0), &f.transmissive);
        list.finish();

        // --- 3. ASSERT ---
        let ids = |bucket| list.bucket(bucket).map(|i| i.object_id).collect::<Vec<_>>();
        assert_eq!(ids(Bucket::Opaque), vec![1]);
        assert_eq!(ids(Bucket::Transparent), vec![2]);
        assert_eq!(ids(Bucket::Transmissive), vec![3]);
    }

    #[test]
    fn test_opaque_sort_batches_materials_then_front_to_back() {
        // --- 1. ARRANGE ---
        let f = fixture();
        let mut list = RenderList::new();
        list.init();
        list.push(item(&f, 1, &f.other_opaque, 1.0, 0), &f.other_opaque);
        list.push(item(&f, 2, &f.opaque, 5.0, 0), &f.opaque);
        list.push(item(&f, 3, &f.opaque, 2.0, 0), &f.opaque);
        list.push(item(&f, 4, &f.other_opaque, 0.5, -1), &f.other_opaque);

        // --- 2. ACT ---
        list.sort(None, None);

        // --- 3. ASSERT ---
        // render order first, then the older material id, then ascending z.
        let order: Vec<u64> = list.opaque().map(|i| i.object_id).collect();
        assert_eq!(order, vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_transparent_sort_back_to_front_with_id_tiebreak() {
        let f = fixture();
        let mut list = RenderList::new();
        list.init();
        list.push(item(&f, 5, &f.transparent, 1.0, 0), &f.transparent);
        list.push(item(&f, 2, &f.transparent, 3.0, 0), &f.transparent);
        list.push(item(&f, 3, &f.transparent, 1.0, 0), &f.transparent);

        list.sort(None, None);

        let order: Vec<u64> = list.transparent().map(|i| i.object_id).collect();
        assert_eq!(order, vec![2, 3, 5]);
    }

    #[test]
    fn test_pool_is_reused_and_trimmed() {
        let f = fixture();
        let mut list = RenderList::new();
        list.init();
        for id in 0..4 {
            list.push(item(&f, id, &f.opaque, 0.0, 0), &f.opaque);
        }
        list.finish();
        assert_eq!(list.pool_size(), 4);

        list.init();
        list.unshift(item(&f, 6, &f.opaque, 0.0, 0), &f.opaque);
        list.unshift(item(&f, 7, &f.opaque, 0.0, 0), &f.opaque);
        list.finish();

        assert_eq!(list.pool_size(), 2);
        let order: Vec<u64> = list.opaque().map(|i| i.object_id).collect();
        assert_eq!(order, vec![7, 6]);
    }
}
