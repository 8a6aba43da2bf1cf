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

//! Reflected uniforms of a linked program and the last value uploaded to each.

use ahash::AHashMap;
use lumen_core::renderer::{
    ActiveUniform, GraphicsDevice, UniformLocation, UniformType, UniformValue,
};

/// A reflected uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformInfo {
    /// Location of the first element.
    pub location: UniformLocation,
    /// GLSL type.
    pub ty: UniformType,
    /// Array length, `1` for non-arrays.
    pub size: u32,
}

/// Name to location lookup plus a per-location upload cache.
///
/// The cache compares values, not identities: setting a value equal to the last
/// upload is skipped, and an array mutated in place uploads because it no longer
/// compares equal.
#[derive(Debug, Clone, Default)]
pub struct UniformTable {
    infos: AHashMap<String, UniformInfo>,
    cache: AHashMap<UniformLocation, UniformValue>,
}

impl UniformTable {
    /// Builds the table from program reflection.
    pub fn from_active(uniforms: Vec<ActiveUniform>) -> Self {
        Self {
            infos: uniforms
                .into_iter()
                .map(|u| {
                    let info = UniformInfo {
                        location: u.location,
                        ty: u.ty,
                        size: u.size,
                    };
                    (u.name, info)
                })
                .collect(),
            cache: AHashMap::new(),
        }
    }

    /// Returns `true` if the program has an active uniform called `name`.
    pub fn has(&self, name: &str) -> bool {
        self.infos.contains_key(name)
    }

    /// Looks a uniform up.
    pub fn get(&self, name: &str) -> Option<&UniformInfo> {
        self.infos.get(name)
    }

    /// Number of active uniforms.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Returns `true` if the program has no active uniform.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Uploads `value` to `name` unless it equals the last upload.
    ///
    /// The program must be in use. Returns `true` if a device call was issued.
    pub fn set(
        &mut self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        value: UniformValue,
    ) -> bool {
        let Some(info) = self.infos.get(name) else {
            return false;
        };
        if self.cache.get(&info.location) == Some(&value) {
            return false;
        }
        device.uniform(info.location, &value);
        self.cache.insert(info.location, value);
        true
    }

    /// The sampler uniforms, ordered by location.
    pub fn samplers(&self) -> Vec<(&str, UniformInfo)> {
        let mut samplers: Vec<(&str, UniformInfo)> = self
            .infos
            .iter()
            .filter(|(_, info)| info.ty.is_sampler())
            .map(|(name, info)| (name.as_str(), *info))
            .collect();
        samplers.sort_by_key(|(_, info)| info.location);
        samplers
    }

    /// Forgets every cached upload.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::math::Vec3;
    use lumen_infra::{DeviceCall, HeadlessDevice};

    fn table() -> UniformTable {
        UniformTable::from_active(vec![
            ActiveUniform {
                name: "opacity".to_string(),
                ty: UniformType::Float,
                size: 1,
                location: UniformLocation(0),
            },
            ActiveUniform {
                name: "points".to_string(),
                ty: UniformType::Vec3,
                size: 2,
                location: UniformLocation(1),
            },
            ActiveUniform {
                name: "map".to_string(),
                ty: UniformType::Sampler2D,
                size: 1,
                location: UniformLocation(3),
            },
        ])
    }

    #[test]
    fn test_equal_values_are_skipped() {
        // --- 1. ARRANGE ---
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut uniforms = table();

        // --- 2. ACT ---
        let first = uniforms.set(&mut device, "opacity", UniformValue::Float(0.5));
        let second = uniforms.set(&mut device, "opacity", UniformValue::Float(0.5));
        let third = uniforms.set(&mut device, "opacity", UniformValue::Float(0.25));

        // --- 3. ASSERT ---
        assert!(first);
        assert!(!second);
        assert!(third);
        let uploads = probe.count_calls(|c| matches!(c, DeviceCall::Uniform(..)));
        assert_eq!(uploads, 2);
    }

    #[test]
    fn test_mutated_array_uploads_again() {
        let mut device = HeadlessDevice::new();
        let mut uniforms = table();
        let mut points = vec![Vec3::ZERO, Vec3::X];
        assert!(uniforms.set(&mut device, "points", UniformValue::Vec3Array(points.clone())));
        points[1] = Vec3::Y;
        assert!(uniforms.set(&mut device, "points", UniformValue::Vec3Array(points.clone())));
        assert!(!uniforms.set(&mut device, "points", UniformValue::Vec3Array(points)));
    }

    #[test]
    fn test_unknown_names_and_sampler_listing() {
        let mut device = HeadlessDevice::new();
        let mut uniforms = table();
        assert!(!uniforms.set(&mut device, "missing", UniformValue::Int(1)));
        let samplers = uniforms.samplers();
        assert_eq!(samplers.len(), 1);
        assert_eq!(samplers[0].0, "map");
        uniforms.clear_cache();
        assert!(uniforms.has("opacity"));
    }
}
