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

//! Per-material renderer state: the programs a material was compiled into and
//! the stamps deciding when to resolve them again.

use crate::program_lane::cache::{ProgramCache, ProgramId};
use crate::render_lane::state::StateTracker;
use ahash::AHashMap;
use lumen_core::renderer::GraphicsDevice;
use lumen_core::resource::MaterialId;
use std::collections::BTreeMap;

/// What the renderer remembers about one material.
#[derive(Debug, Clone, Default)]
pub struct MaterialProperty {
    /// Every program acquired for this material, by cache key. A material drawn
    /// on objects with different features (instancing, morphing...) holds several.
    pub programs: BTreeMap<String, ProgramId>,
    /// The program used by the last draw.
    pub current_program: Option<ProgramId>,
    /// The cache key of `current_program`.
    pub cache_key: String,
    /// Material version `current_program` was resolved against.
    pub version: u64,
    /// Lights-state version `current_program` was resolved against.
    pub lights_version: u64,
}

impl MaterialProperty {
    /// Returns `true` if the current program was resolved for these stamps.
    pub fn is_current(&self, version: u64, lights_version: u64, cache_key: &str) -> bool {
        self.current_program.is_some()
            && self.version == version
            && self.lights_version == lights_version
            && self.cache_key == cache_key
    }
}

/// Material properties keyed by material identity.
#[derive(Debug, Default)]
pub struct MaterialProperties {
    properties: AHashMap<MaterialId, MaterialProperty>,
}

impl MaterialProperties {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The properties of a material.
    pub fn get(&self, id: MaterialId) -> Option<&MaterialProperty> {
        self.properties.get(&id)
    }

    /// The properties of a material, created empty on first access.
    pub fn entry(&mut self, id: MaterialId) -> &mut MaterialProperty {
        self.properties.entry(id).or_default()
    }

    /// Number of materials with properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns `true` if no material has properties.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Records the program resolved for a material, acquiring it once per key.
    ///
    /// Returns `false` if the material already held `cache_key`, in which case the
    /// caller's extra acquisition must be released.
    pub fn set_program(
        &mut self,
        id: MaterialId,
        cache_key: &str,
        program: ProgramId,
        version: u64,
        lights_version: u64,
    ) -> bool {
        let property = self.entry(id);
        let fresh = !property.programs.contains_key(cache_key);
        if fresh {
            property.programs.insert(cache_key.to_string(), program);
        }
        property.current_program = Some(program);
        property.cache_key = cache_key.to_string();
        property.version = version;
        property.lights_version = lights_version;
        fresh
    }

    /// Releases every program of a material and drops its properties.
    ///
    /// Returns the number of programs destroyed as a result.
    pub fn dispose_material(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        programs: &mut ProgramCache,
        id: MaterialId,
    ) -> usize {
        let Some(property) = self.properties.remove(&id) else {
            return 0;
        };
        property
            .programs
            .into_values()
            .filter(|&program| programs.release(device, state, program))
            .count()
    }

    /// Forces every material to resolve its program again on next use.
    pub fn invalidate(&mut self) {
        for property in self.properties.values_mut() {
            property.current_program = None;
        }
    }

    /// Releases every program and drops every property.
    pub fn dispose(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        programs: &mut ProgramCache,
    ) {
        let ids: Vec<MaterialId> = self.properties.keys().copied().collect();
        for id in ids {
            self.dispose_material(device, state, programs, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program_lane::parameters::{
        ClippingCounts, LightCounts, ObjectFeatures, ParameterContext, ProgramParameters,
    };
    use lumen_core::renderer::{Capabilities, RendererSettings};
    use lumen_core::resource::Material;
    use lumen_core::Color;
    use lumen_infra::HeadlessDevice;

    #[test]
    fn test_dispose_material_releases_every_program() {
        // --- 1. ARRANGE ---
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut state = StateTracker::new(&probe);
        let mut cache = ProgramCache::new(true);
        let mut properties = MaterialProperties::new();
        let settings = RendererSettings::default();
        let caps = Capabilities::probe(&probe, &settings);
        let material = Material::lambert(Color::WHITE);
        let mut ctx = ParameterContext {
            settings: &settings,
            capabilities: &caps,
            lights: LightCounts::default(),
            shadow_map_enabled: false,
            fog: None,
            object: ObjectFeatures::default(),
            clipping: ClippingCounts::default(),
            render_target: false,
        };
        for instancing in [false, true, false] {
            ctx.object.instancing = instancing;
            let params = ProgramParameters::from_material(&material, &ctx);
            let key = params.cache_key();
            if properties.get(material.id()).is_some_and(|p| p.programs.contains_key(&key)) {
                continue;
            }
            let acquired = cache.acquire(&mut device, &params, &key).unwrap();
            assert!(properties.set_program(material.id(), &key, acquired.id, 0, 0));
        }
        assert_eq!(probe.live_programs(), 2);

        // --- 2. ACT ---
        let destroyed =
            properties.dispose_material(&mut device, &mut state, &mut cache, material.id());

        // --- 3. ASSERT ---
        assert_eq!(destroyed, 2);
        assert_eq!(probe.live_programs(), 0);
        assert!(properties.is_empty());
    }

    #[test]
    fn test_stamps_decide_currency() {
        let mut properties = MaterialProperties::new();
        let material = Material::basic(Color::WHITE);
        let mut cache_ids: slotmap::SlotMap<ProgramId, ()> = slotmap::SlotMap::with_key();
        let program = cache_ids.insert(());

        properties.set_program(material.id(), "basic,1", program, 3, 7);
        let property = properties.get(material.id()).unwrap();

        assert!(property.is_current(3, 7, "basic,1"));
        assert!(!property.is_current(4, 7, "basic,1"));
        assert!(!property.is_current(3, 8, "basic,1"));
        properties.invalidate();
        assert!(!properties.get(material.id()).unwrap().is_current(3, 7, "basic,1"));
    }
}
