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

//! Vertex input binding state: bound buffers, enabled attribute arrays, pointers
//! and divisors.

use ahash::{AHashMap, AHashSet};
use lumen_core::renderer::{BufferHandle, BufferTarget, GraphicsDevice, VertexAttribLayout};

/// The pointer of one attribute location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AttributePointer {
    buffer: BufferHandle,
    layout: VertexAttribLayout,
}

/// Diffs vertex input bindings against what the device has.
///
/// A draw calls [`init_attributes`](Self::init_attributes), then enables and points
/// every attribute it uses, then [`disable_unused_attributes`](Self::disable_unused_attributes)
/// turns off the arrays left over from the previous draw.
#[derive(Debug, Default)]
pub struct BindingStates {
    buffers: AHashMap<BufferTarget, BufferHandle>,
    enabled: AHashSet<u32>,
    used: AHashSet<u32>,
    divisors: AHashMap<u32, u32>,
    pointers: AHashMap<u32, AttributePointer>,
}

impl BindingStates {
    /// Creates an empty binding state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `buffer` to `target` if it is not bound already.
    pub fn bind_buffer(
        &mut self,
        device: &mut dyn GraphicsDevice,
        target: BufferTarget,
        buffer: Option<BufferHandle>,
    ) {
        if self.buffers.get(&target).copied() == buffer {
            return;
        }
        device.bind_buffer(target, buffer);
        match buffer {
            Some(handle) => self.buffers.insert(target, handle),
            None => self.buffers.remove(&target),
        };
    }

    /// The buffer bound to `target`.
    pub fn bound_buffer(&self, target: BufferTarget) -> Option<BufferHandle> {
        self.buffers.get(&target).copied()
    }

    /// Starts collecting the locations used by the next draw.
    pub fn init_attributes(&mut self) {
        self.used.clear();
    }

    /// Enables the array at `location` with an instancing divisor.
    pub fn enable_attribute(&mut self, device: &mut dyn GraphicsDevice, location: u32, divisor: u32) {
        self.used.insert(location);
        if self.enabled.insert(location) {
            device.enable_vertex_attrib_array(location);
        }
        if self.divisors.get(&location).copied().unwrap_or(0) != divisor {
            device.vertex_attrib_divisor(location, divisor);
            self.divisors.insert(location, divisor);
        }
    }

    /// Points `location` at `buffer`, binding it to the array target first.
    pub fn vertex_attrib_pointer(
        &mut self,
        device: &mut dyn GraphicsDevice,
        location: u32,
        buffer: BufferHandle,
        layout: VertexAttribLayout,
    ) {
        let pointer = AttributePointer { buffer, layout };
        if self.pointers.get(&location) == Some(&pointer) {
            return;
        }
        self.bind_buffer(device, BufferTarget::Array, Some(buffer));
        device.vertex_attrib_pointer(location, &layout);
        self.pointers.insert(location, pointer);
    }

    /// Disables every array enabled earlier but not used by the current draw.
    pub fn disable_unused_attributes(&mut self, device: &mut dyn GraphicsDevice) {
        let mut stale: Vec<u32> = self.enabled.difference(&self.used).copied().collect();
        stale.sort_unstable();
        for location in stale {
            device.disable_vertex_attrib_array(location);
            self.enabled.remove(&location);
        }
    }

    /// Forgets every binding referring to a deleted buffer.
    pub fn forget_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.retain(|_, bound| *bound != buffer);
        self.pointers.retain(|_, pointer| pointer.buffer != buffer);
    }

    /// Disables every enabled array, unbinds buffers and clears the mirror.
    pub fn reset(&mut self, device: &mut dyn GraphicsDevice) {
        let mut enabled: Vec<u32> = self.enabled.drain().collect();
        enabled.sort_unstable();
        for location in enabled {
            device.disable_vertex_attrib_array(location);
        }
        for (&location, &divisor) in &self.divisors {
            if divisor != 0 {
                device.vertex_attrib_divisor(location, 0);
            }
        }
        device.bind_buffer(BufferTarget::Array, None);
        device.bind_buffer(BufferTarget::ElementArray, None);
        *self = Self::default();
    }

    /// Drops the mirror without talking to the device, after a context loss.
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::DataType;
    use lumen_infra::{DeviceCall, HeadlessDevice};

    fn layout(size: u32) -> VertexAttribLayout {
        VertexAttribLayout {
            size,
            ty: DataType::Float,
            normalized: false,
            stride: 0,
            offset: 0,
        }
    }

    #[test]
    fn test_unused_arrays_are_disabled_once() {
        // --- 1. ARRANGE ---
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut bindings = BindingStates::new();
        bindings.init_attributes();
        bindings.enable_attribute(&mut device, 0, 0);
        bindings.enable_attribute(&mut device, 1, 0);
        bindings.disable_unused_attributes(&mut device);
        probe.clear_calls();

        // --- 2. ACT ---
        bindings.init_attributes();
        bindings.enable_attribute(&mut device, 0, 0);
        bindings.disable_unused_attributes(&mut device);
        bindings.init_attributes();
        bindings.enable_attribute(&mut device, 0, 0);
        bindings.disable_unused_attributes(&mut device);

        // --- 3. ASSERT ---
        assert_eq!(probe.calls(), vec![DeviceCall::DisableVertexAttribArray(1)]);
    }

    #[test]
    fn test_pointer_rebinds_only_on_change() {
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut bindings = BindingStates::new();
        let buffer = BufferHandle(3);

        bindings.vertex_attrib_pointer(&mut device, 0, buffer, layout(3));
        bindings.vertex_attrib_pointer(&mut device, 0, buffer, layout(3));
        bindings.vertex_attrib_pointer(&mut device, 0, buffer, layout(2));

        assert_eq!(
            probe.count_calls(|c| matches!(c, DeviceCall::VertexAttribPointer(..))),
            2
        );
        assert_eq!(
            probe.count_calls(|c| matches!(c, DeviceCall::BindBuffer(..))),
            1
        );
        bindings.forget_buffer(buffer);
        assert_eq!(bindings.bound_buffer(BufferTarget::Array), None);
    }
}
