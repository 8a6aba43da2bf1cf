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


//! Visibility layers shared by objects and cameras.

/// A 32-bit layer mask. An object is visible to a camera when their masks intersect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layers(pub u32);

impl Default for Layers {
    fn default() -> Self {
        Layers(1)
    }
}

impl Layers {
    /// Membership of layer `0` only.
    pub const DEFAULT: Self = Layers(1);
    /// Membership of every layer.
    pub const ALL: Self = Layers(u32::MAX);

    /// Sets membership to exactly one layer.
    pub fn set(&mut self, layer: u32) {
        self.0 = 1 << layer;
    }

    /// Adds a layer.
    pub fn enable(&mut self, layer: u32) {
        self.0 |= 1 << layer;
    }

    /// Removes a layer.
    pub fn disable(&mut self, layer: u32) {
        self.0 &= !(1 << layer);
    }

    /// Toggles a layer.
    pub fn toggle(&mut self, layer: u32) {
        self.0 ^= 1 << layer;
    }

    /// Checks membership of a single layer.
    pub fn is_enabled(&self, layer: u32) -> bool {
        self.0 & (1 << layer) != 0
    }

    /// Returns `true` if the two masks share at least one layer.
    pub fn test(&self, other: &Layers) -> bool {
        self.0 & other.0 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_intersection() {
        let mut object = Layers::default();
        let mut camera = Layers::default();
        assert!(object.test(&camera));

        object.set(3);
        assert!(!object.test(&camera));
        camera.enable(3);
        assert!(object.test(&camera));
        camera.disable(3);
        camera.toggle(0);
        assert_eq!(camera.0, 0);
        assert!(!object.test(&camera));
    }
}
