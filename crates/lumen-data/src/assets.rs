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

//! Slot-table storage for geometries, materials and textures.

use lumen_core::resource::{
    AttributeId, Geometry, GeometryKey, Material, MaterialId, MaterialKey, Texture, TextureKey,
};
use slotmap::SlotMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one [`Assets`] instance. Keys from one store are meaningless in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u64);

/// Emitted when an asset is disposed, carrying what the renderer needs to free its
/// GPU state.
#[derive(Debug, Clone, PartialEq)]
pub enum DisposeEvent {
    /// A geometry was disposed.
    Geometry {
        /// The key the geometry was stored under.
        key: GeometryKey,
        /// Identities of every attribute the geometry held.
        attributes: Vec<AttributeId>,
    },
    /// A material was disposed.
    Material {
        /// The key the material was stored under.
        key: MaterialKey,
        /// The material identity.
        id: MaterialId,
    },
    /// A texture was disposed.
    Texture {
        /// The key the texture was stored under.
        key: TextureKey,
    },
}

/// A central, in-memory store of the resources referenced by scenes.
///
/// Each table hands out stable keys at insertion. Disposing an entry frees its slot
/// and queues a [`DisposeEvent`]; the renderer drains the queue in `collect_garbage`.
#[derive(Debug)]
pub struct Assets {
    id: StoreId,
    geometries: SlotMap<GeometryKey, Geometry>,
    materials: SlotMap<MaterialKey, Material>,
    textures: SlotMap<TextureKey, Texture>,
    dispose_events: Vec<DisposeEvent>,
}

impl Default for Assets {
    fn default() -> Self {
        Self::new()
    }
}

impl Assets {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self {
            id: StoreId(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed)),
            geometries: SlotMap::with_key(),
            materials: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            dispose_events: Vec::new(),
        }
    }

    /// The identity of this store.
    pub fn id(&self) -> StoreId {
        self.id
    }

    // --- Geometries ---

    /// Stores a geometry.
    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryKey {
        self.geometries.insert(geometry)
    }

    /// Retrieves a geometry.
    pub fn geometry(&self, key: GeometryKey) -> Option<&Geometry> {
        self.geometries.get(key)
    }

    /// Retrieves a geometry mutably.
    pub fn geometry_mut(&mut self, key: GeometryKey) -> Option<&mut Geometry> {
        self.geometries.get_mut(key)
    }

    /// Iterates every geometry.
    pub fn geometries(&self) -> impl Iterator<Item = (GeometryKey, &Geometry)> {
        self.geometries.iter()
    }

    /// Removes a geometry and queues its dispose event.
    pub fn dispose_geometry(&mut self, key: GeometryKey) -> Option<Geometry> {
        let geometry = self.geometries.remove(key)?;
        log::debug!("Disposing geometry {key:?}.");
        self.dispose_events.push(DisposeEvent::Geometry {
            key,
            attributes: geometry.attribute_ids(),
        });
        Some(geometry)
    }

    // --- Materials ---

    /// Stores a material.
    pub fn add_material(&mut self, material: Material) -> MaterialKey {
        self.materials.insert(material)
    }

    /// Retrieves a material.
    pub fn material(&self, key: MaterialKey) -> Option<&Material> {
        self.materials.get(key)
    }

    /// Retrieves a material mutably.
    pub fn material_mut(&mut self, key: MaterialKey) -> Option<&mut Material> {
        self.materials.get_mut(key)
    }

    /// Iterates every material.
    pub fn materials(&self) -> impl Iterator<Item = (MaterialKey, &Material)> {
        self.materials.iter()
    }

    /// Removes a material and queues its dispose event.
    pub fn dispose_material(&mut self, key: MaterialKey) -> Option<Material> {
        let material = self.materials.remove(key)?;
        log::debug!("Disposing material {key:?}.");
        self.dispose_events.push(DisposeEvent::Material {
            key,
            id: material.id(),
        });
        Some(material)
    }

    // --- Textures ---

    /// Stores a texture.
    pub fn add_texture(&mut self, texture: Texture) -> TextureKey {
        self.textures.insert(texture)
    }

    /// Retrieves a texture.
    pub fn texture(&self, key: TextureKey) -> Option<&Texture> {
        self.textures.get(key)
    }

    /// Retrieves a texture mutably.
    pub fn texture_mut(&mut self, key: TextureKey) -> Option<&mut Texture> {
        self.textures.get_mut(key)
    }

    /// Iterates every texture.
    pub fn textures(&self) -> impl Iterator<Item = (TextureKey, &Texture)> {
        self.textures.iter()
    }

    /// Removes a texture and queues its dispose event.
    pub fn dispose_texture(&mut self, key: TextureKey) -> Option<Texture> {
        let texture = self.textures.remove(key)?;
        log::debug!("Disposing texture {key:?}.");
        self.dispose_events.push(DisposeEvent::Texture { key });
        Some(texture)
    }

    // --- Dispose queue ---

    /// Number of dispose events not yet collected.
    pub fn pending_disposals(&self) -> usize {
        self.dispose_events.len()
    }

    /// Takes every queued dispose event.
    pub fn drain_dispose_events(&mut self) -> std::vec::Drain<'_, DisposeEvent> {
        self.dispose_events.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::Color;

    #[test]
    fn test_dispose_queues_events() {
        // --- 1. ARRANGE ---
        let mut assets = Assets::new();
        let geometry = assets.add_geometry(Geometry::plane(1.0, 1.0));
        let material = assets.add_material(Material::basic(Color::WHITE));
        let material_id = assets.material(material).unwrap().id();

        // --- 2. ACT ---
        assets.dispose_geometry(geometry);
        assets.dispose_material(material);
        assets.dispose_material(material);

        // --- 3. ASSERT ---
        assert!(assets.geometry(geometry).is_none());
        let events: Vec<_> = assets.drain_dispose_events().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            DisposeEvent::Geometry { attributes, .. } if attributes.len() == 4
        ));
        assert_eq!(
            events[1],
            DisposeEvent::Material {
                key: material,
                id: material_id
            }
        );
        assert_eq!(assets.pending_disposals(), 0);
    }

    #[test]
    fn test_reused_slot_gets_new_key() {
        let mut assets = Assets::new();
        let first = assets.add_material(Material::basic(Color::WHITE));
        assets.dispose_material(first);
        let second = assets.add_material(Material::basic(Color::BLACK));
        assert_ne!(first, second);
        assert!(assets.material(first).is_none());
    }

    #[test]
    fn test_store_ids_differ() {
        assert_ne!(Assets::new().id(), Assets::new().id());
    }
}
