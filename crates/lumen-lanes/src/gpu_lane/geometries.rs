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

//! Per-frame geometry uploads.

use super::buffers::{BufferRecord, BufferTable};
use crate::render_lane::bindings::BindingStates;
use lumen_core::renderer::{
    BufferTarget, BufferUsage, GraphicsDevice, IndexType, MemoryInfo, ResourceError,
};
use lumen_core::resource::geometry::POSITION;
use lumen_core::resource::{AttributeData, AttributeId, BufferAttribute, Geometry, GeometryKey};
use slotmap::SecondaryMap;

/// The line index drawn for a wireframe material.
#[derive(Debug)]
struct Wireframe {
    index: BufferAttribute,
    /// Version of the source index (or position) attribute it was built from.
    source: (AttributeId, u64),
}

#[derive(Debug, Default)]
struct TrackedGeometry {
    attributes: Vec<AttributeId>,
    wireframe: Option<Wireframe>,
    updated_frame: Option<u64>,
}

/// A line index ready to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireframeIndex {
    /// The uploaded buffer.
    pub record: BufferRecord,
    /// Index element type.
    pub index_type: IndexType,
    /// Number of indices.
    pub count: u32,
}

/// Uploads each geometry at most once per frame and frees the buffers of
/// attributes a geometry no longer holds.
#[derive(Debug, Default)]
pub struct GeometryUpdater {
    tracked: SecondaryMap<GeometryKey, TrackedGeometry>,
}

impl GeometryUpdater {
    /// Creates an updater tracking nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked geometries.
    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    /// Returns `true` if no geometry is tracked.
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Uploads every attribute of `geometry`, index and morph attributes included.
    ///
    /// Later calls in the same `frame` return immediately, however many objects
    /// share the geometry.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        device: &mut dyn GraphicsDevice,
        bindings: &mut BindingStates,
        buffers: &mut BufferTable,
        key: GeometryKey,
        geometry: &mut Geometry,
        frame: u64,
        memory: &mut MemoryInfo,
    ) -> Result<(), ResourceError> {
        if !self.tracked.contains_key(key) {
            self.tracked.insert(key, TrackedGeometry::default());
            memory.geometries += 1;
        }
        let Some(tracked) = self.tracked.get_mut(key) else {
            return Ok(());
        };
        if tracked.updated_frame == Some(frame) {
            return Ok(());
        }

        let current = geometry.attribute_ids();
        for stale in tracked.attributes.iter().filter(|id| !current.contains(*id)) {
            buffers.remove(device, bindings, *stale, memory);
        }
        tracked.attributes = current;

        if let Some(index) = geometry.index.as_mut() {
            buffers.upload(device, bindings, index, BufferTarget::ElementArray, memory)?;
        }
        for (_, attribute) in geometry.attributes_mut() {
            buffers.upload(device, bindings, attribute, BufferTarget::Array, memory)?;
        }
        for attribute in geometry.morph_attributes.values_mut().flatten() {
            buffers.upload(device, bindings, attribute, BufferTarget::Array, memory)?;
        }
        tracked.updated_frame = Some(frame);
        Ok(())
    }

    /// Uploads a per-instance attribute. Its buffer is freed when the owning
    /// object is removed from its scene.
    pub fn update_instanced(
        &mut self,
        device: &mut dyn GraphicsDevice,
        bindings: &mut BindingStates,
        buffers: &mut BufferTable,
        attribute: &mut BufferAttribute,
        memory: &mut MemoryInfo,
    ) -> Result<BufferRecord, ResourceError> {
        buffers.upload(device, bindings, attribute, BufferTarget::Array, memory)
    }

    /// The line index of a geometry, rebuilt when its triangles change.
    pub fn wireframe_index(
        &mut self,
        device: &mut dyn GraphicsDevice,
        bindings: &mut BindingStates,
        buffers: &mut BufferTable,
        key: GeometryKey,
        geometry: &Geometry,
        memory: &mut MemoryInfo,
    ) -> Result<Option<WireframeIndex>, ResourceError> {
        let Some(tracked) = self.tracked.get_mut(key) else {
            return Ok(None);
        };
        let source = match (&geometry.index, geometry.attribute(POSITION)) {
            (Some(index), _) => index,
            (None, Some(position)) => position,
            (None, None) => return Ok(None),
        };
        let stamp = (source.id(), source.version());

        let stale = tracked.wireframe.as_ref().map_or(true, |w| w.source != stamp);
        if stale {
            let lines = line_indices(geometry);
            match tracked.wireframe.as_mut() {
                Some(wireframe) => {
                    let rebuilt = BufferAttribute::indices(&lines);
                    wireframe.index.set_data(rebuilt.data().clone());
                    wireframe.source = stamp;
                }
                None => {
                    tracked.wireframe = Some(Wireframe {
                        index: BufferAttribute::indices(&lines).with_usage(BufferUsage::Static),
                        source: stamp,
                    });
                }
            }
        }
        let Some(wireframe) = tracked.wireframe.as_mut() else {
            return Ok(None);
        };
        let record = buffers.upload(
            device,
            bindings,
            &mut wireframe.index,
            BufferTarget::ElementArray,
            memory,
        )?;
        Ok(Some(WireframeIndex {
            record,
            index_type: wireframe.index.index_type().unwrap_or(IndexType::U32),
            count: wireframe.index.count() as u32,
        }))
    }

    /// Frees every buffer of a geometry. Returns `true` if it was tracked.
    pub fn dispose_geometry(
        &mut self,
        device: &mut dyn GraphicsDevice,
        bindings: &mut BindingStates,
        buffers: &mut BufferTable,
        key: GeometryKey,
        memory: &mut MemoryInfo,
    ) -> bool {
        let Some(tracked) = self.tracked.remove(key) else {
            return false;
        };
        for id in tracked
            .attributes
            .into_iter()
            .chain(tracked.wireframe.map(|w| w.index.id()))
        {
            buffers.remove(device, bindings, id, memory);
        }
        memory.geometries = memory.geometries.saturating_sub(1);
        true
    }

    /// Forgets every geometry after a context loss.
    pub fn invalidate(&mut self, memory: &mut MemoryInfo) {
        memory.geometries = memory.geometries.saturating_sub(self.tracked.len());
        self.tracked.clear();
    }

    /// Frees every tracked geometry.
    pub fn dispose(
        &mut self,
        device: &mut dyn GraphicsDevice,
        bindings: &mut BindingStates,
        buffers: &mut BufferTable,
        memory: &mut MemoryInfo,
    ) {
        let keys: Vec<GeometryKey> = self.tracked.keys().collect();
        for key in keys {
            self.dispose_geometry(device, bindings, buffers, key, memory);
        }
    }
}

/// Turns triangles into line pairs: `a b c` becomes `a b b c c a`.
fn line_indices(geometry: &Geometry) -> Vec<u32> {
    let triangles: Vec<u32> = match geometry.index.as_ref().map(BufferAttribute::data) {
        Some(AttributeData::U16(data)) => data.iter().map(|&i| u32::from(i)).collect(),
        Some(AttributeData::U32(data)) => data.clone(),
        _ => (0..geometry.vertex_count() as u32).collect(),
    };
    triangles
        .chunks_exact(3)
        .flat_map(|t| [t[0], t[1], t[1], t[2], t[2], t[0]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_infra::{DeviceCall, HeadlessDevice};
    use slotmap::SlotMap;

    fn key() -> GeometryKey {
        let mut keys: SlotMap<GeometryKey, ()> = SlotMap::with_key();
        keys.insert(())
    }

    #[test]
    fn test_geometry_uploads_once_per_frame() {
        // --- 1. ARRANGE ---
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut bindings = BindingStates::new();
        let mut buffers = BufferTable::new();
        let mut memory = MemoryInfo::default();
        let mut updater = GeometryUpdater::new();
        let mut geometry = Geometry::plane(1.0, 1.0);
        let key = key();

        // --- 2. ACT ---
        for _ in 0..3 {
            updater
                .update(&mut device, &mut bindings, &mut buffers, key, &mut geometry, 1, &mut memory)
                .unwrap();
        }
        geometry.attribute_mut("position").unwrap().needs_update();
        updater
            .update(&mut device, &mut bindings, &mut buffers, key, &mut geometry, 1, &mut memory)
            .unwrap();

        // --- 3. ASSERT ---
        assert_eq!(probe.count_calls(DeviceCall::is_buffer_upload), 4);
        assert_eq!(memory.geometries, 1);
        assert_eq!(buffers.len(), 4);

        updater
            .update(&mut device, &mut bindings, &mut buffers, key, &mut geometry, 2, &mut memory)
            .unwrap();
        assert_eq!(probe.count_calls(DeviceCall::is_buffer_upload), 5);
    }

    #[test]
    fn test_removed_attributes_are_freed() {
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut bindings = BindingStates::new();
        let mut buffers = BufferTable::new();
        let mut memory = MemoryInfo::default();
        let mut updater = GeometryUpdater::new();
        let mut geometry = Geometry::plane(1.0, 1.0);
        let key = key();
        updater
            .update(&mut device, &mut bindings, &mut buffers, key, &mut geometry, 1, &mut memory)
            .unwrap();

        geometry.remove_attribute("uv");
        updater
            .update(&mut device, &mut bindings, &mut buffers, key, &mut geometry, 2, &mut memory)
            .unwrap();

        assert_eq!(probe.live_buffers(), 3);
        assert!(updater.dispose_geometry(&mut device, &mut bindings, &mut buffers, key, &mut memory));
        assert_eq!(probe.live_buffers(), 0);
        assert_eq!(memory, MemoryInfo::default());
    }

    #[test]
    fn test_wireframe_index_doubles_edges() {
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut bindings = BindingStates::new();
        let mut buffers = BufferTable::new();
        let mut memory = MemoryInfo::default();
        let mut updater = GeometryUpdater::new();
        let mut geometry = Geometry::plane(1.0, 1.0);
        let key = key();
        updater
            .update(&mut device, &mut bindings, &mut buffers, key, &mut geometry, 1, &mut memory)
            .unwrap();

        let wireframe = updater
            .wireframe_index(&mut device, &mut bindings, &mut buffers, key, &geometry, &mut memory)
            .unwrap()
            .unwrap();

        assert_eq!(wireframe.count, 12);
        assert_eq!(wireframe.index_type, IndexType::U16);
        assert_eq!(line_indices(&geometry)[..6], [0, 1, 1, 2, 2, 0]);
    }
}
