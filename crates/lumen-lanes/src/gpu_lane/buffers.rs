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

//! GPU copies of vertex and index attributes.

use crate::render_lane::bindings::BindingStates;
use ahash::AHashMap;
use lumen_core::renderer::{
    BufferHandle, BufferTarget, DataType, GraphicsDevice, MemoryInfo, ResourceError,
};
use lumen_core::resource::{AttributeId, BufferAttribute};

/// The GPU side of one [`BufferAttribute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRecord {
    /// The device buffer.
    pub handle: BufferHandle,
    /// The target the buffer was created for.
    pub target: BufferTarget,
    /// Component type of the data.
    pub data_type: DataType,
    /// Allocated size in bytes.
    pub byte_size: usize,
    /// Attribute version the buffer holds.
    pub version: u64,
}

/// Buffers keyed by attribute identity.
#[derive(Debug, Default)]
pub struct BufferTable {
    records: AHashMap<AttributeId, BufferRecord>,
}

impl BufferTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The record of an attribute, if it was uploaded.
    pub fn get(&self, id: AttributeId) -> Option<&BufferRecord> {
        self.records.get(&id)
    }

    /// Number of live buffers.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no buffer is live.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Creates or refreshes the buffer of `attribute`.
    ///
    /// Nothing is sent when the buffer already holds the attribute's version. A
    /// size change re-specifies the whole buffer; otherwise pending update ranges
    /// become sub-data uploads, and without ranges the whole buffer is rewritten.
    pub fn upload(
        &mut self,
        device: &mut dyn GraphicsDevice,
        bindings: &mut BindingStates,
        attribute: &mut BufferAttribute,
        target: BufferTarget,
        memory: &mut MemoryInfo,
    ) -> Result<BufferRecord, ResourceError> {
        let bytes = attribute.data().as_bytes();

        let Some(mut record) = self.records.get(&attribute.id()).copied() else {
            let handle = device.create_buffer()?;
            bindings.bind_buffer(device, target, Some(handle));
            if let Err(error) = device.buffer_data(target, bytes, attribute.usage) {
                bindings.forget_buffer(handle);
                device.delete_buffer(handle);
                return Err(error);
            }
            let record = BufferRecord {
                handle,
                target,
                data_type: attribute.data_type(),
                byte_size: bytes.len(),
                version: attribute.version(),
            };
            memory.gpu_bytes += record.byte_size;
            log::debug!(
                "Created {target:?} buffer {handle:?} ({} bytes).",
                record.byte_size
            );
            self.records.insert(attribute.id(), record);
            attribute.clear_update_ranges();
            return Ok(record);
        };

        if record.version >= attribute.version() {
            return Ok(record);
        }

        bindings.bind_buffer(device, target, Some(record.handle));
        if bytes.len() != record.byte_size {
            device.buffer_data(target, bytes, attribute.usage)?;
            memory.gpu_bytes = memory.gpu_bytes.saturating_sub(record.byte_size) + bytes.len();
            record.byte_size = bytes.len();
        } else if attribute.update_ranges().is_empty() {
            device.buffer_sub_data(target, 0, bytes);
        } else {
            let element = attribute.data_type().byte_size();
            for range in attribute.update_ranges() {
                let start = range.start * element;
                let end = start + range.count * element;
                device.buffer_sub_data(target, start, &bytes[start..end]);
            }
        }
        attribute.clear_update_ranges();
        record.data_type = attribute.data_type();
        record.version = attribute.version();
        self.records.insert(attribute.id(), record);
        Ok(record)
    }

    /// Deletes the buffer of an attribute. Returns `true` if one existed.
    pub fn remove(
        &mut self,
        device: &mut dyn GraphicsDevice,
        bindings: &mut BindingStates,
        id: AttributeId,
        memory: &mut MemoryInfo,
    ) -> bool {
        let Some(record) = self.records.remove(&id) else {
            return false;
        };
        bindings.forget_buffer(record.handle);
        device.delete_buffer(record.handle);
        memory.gpu_bytes = memory.gpu_bytes.saturating_sub(record.byte_size);
        log::debug!("Deleted buffer {:?}.", record.handle);
        true
    }

    /// Forgets every buffer after a context loss. Nothing is sent to the device.
    pub fn invalidate(&mut self, memory: &mut MemoryInfo) {
        for record in self.records.values() {
            memory.gpu_bytes = memory.gpu_bytes.saturating_sub(record.byte_size);
        }
        self.records.clear();
    }

    /// Deletes every buffer.
    pub fn dispose(
        &mut self,
        device: &mut dyn GraphicsDevice,
        bindings: &mut BindingStates,
        memory: &mut MemoryInfo,
    ) {
        let ids: Vec<AttributeId> = self.records.keys().copied().collect();
        for id in ids {
            self.remove(device, bindings, id, memory);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::resource::AttributeData;
    use lumen_infra::{DeviceCall, HeadlessDevice};

    #[test]
    fn test_upload_is_idempotent_per_version() {
        // --- 1. ARRANGE ---
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut bindings = BindingStates::new();
        let mut table = BufferTable::new();
        let mut memory = MemoryInfo::default();
        let mut attribute = BufferAttribute::from_f32(vec![0.0; 9], 3);

        // --- 2. ACT ---
        table
            .upload(&mut device, &mut bindings, &mut attribute, BufferTarget::Array, &mut memory)
            .unwrap();
        table
            .upload(&mut device, &mut bindings, &mut attribute, BufferTarget::Array, &mut memory)
            .unwrap();

        // --- 3. ASSERT ---
        assert_eq!(probe.count_calls(DeviceCall::is_buffer_upload), 1);
        assert_eq!(memory.gpu_bytes, 36);
    }

    #[test]
    fn test_update_ranges_become_sub_data() {
        // --- 1. ARRANGE ---
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut bindings = BindingStates::new();
        let mut table = BufferTable::new();
        let mut memory = MemoryInfo::default();
        let mut attribute = BufferAttribute::from_f32(vec![0.0; 12], 3);
        table
            .upload(&mut device, &mut bindings, &mut attribute, BufferTarget::Array, &mut memory)
            .unwrap();
        probe.clear_calls();

        // --- 2. ACT ---
        attribute.set_component(1, 0, 5.0);
        attribute.add_update_range(3, 3);
        table
            .upload(&mut device, &mut bindings, &mut attribute, BufferTarget::Array, &mut memory)
            .unwrap();

        // --- 3. ASSERT ---
        assert_eq!(
            probe.calls(),
            vec![DeviceCall::BufferSubData {
                target: BufferTarget::Array,
                offset: 12,
                size: 12,
            }]
        );
        assert!(attribute.update_ranges().is_empty());
    }

    #[test]
    fn test_size_change_respecifies_and_remove_frees_memory() {
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut bindings = BindingStates::new();
        let mut table = BufferTable::new();
        let mut memory = MemoryInfo::default();
        let mut attribute = BufferAttribute::from_f32(vec![0.0; 3], 3);
        table
            .upload(&mut device, &mut bindings, &mut attribute, BufferTarget::Array, &mut memory)
            .unwrap();

        attribute.set_data(AttributeData::F32(vec![1.0; 6]));
        let record = table
            .upload(&mut device, &mut bindings, &mut attribute, BufferTarget::Array, &mut memory)
            .unwrap();
        assert_eq!(record.byte_size, 24);
        assert_eq!(memory.gpu_bytes, 24);
        assert_eq!(
            probe.count_calls(|c| matches!(c, DeviceCall::BufferData { .. })),
            2
        );

        assert!(table.remove(&mut device, &mut bindings, attribute.id(), &mut memory));
        assert_eq!(memory.gpu_bytes, 0);
        assert_eq!(probe.live_buffers(), 0);
    }
}
