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

//! Typed vertex and index data.

use crate::renderer::format::{BufferUsage, DataType, IndexType};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ATTRIBUTE_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique identity of a [`BufferAttribute`].
///
/// GPU buffers are cached against this id, so a cloned attribute (which gets a
/// fresh id) never aliases the buffer of its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeId(u64);

impl AttributeId {
    fn next() -> Self {
        Self(NEXT_ATTRIBUTE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// The typed storage of an attribute.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum AttributeData {
    F32(Vec<f32>),
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
}

impl AttributeData {
    /// Number of components.
    pub fn len(&self) -> usize {
        match self {
            AttributeData::F32(v) => v.len(),
            AttributeData::U8(v) => v.len(),
            AttributeData::I8(v) => v.len(),
            AttributeData::U16(v) => v.len(),
            AttributeData::I16(v) => v.len(),
            AttributeData::U32(v) => v.len(),
            AttributeData::I32(v) => v.len(),
        }
    }

    /// Returns `true` if there are no components.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The component type.
    pub fn data_type(&self) -> DataType {
        match self {
            AttributeData::F32(_) => DataType::Float,
            AttributeData::U8(_) => DataType::UnsignedByte,
            AttributeData::I8(_) => DataType::Byte,
            AttributeData::U16(_) => DataType::UnsignedShort,
            AttributeData::I16(_) => DataType::Short,
            AttributeData::U32(_) => DataType::UnsignedInt,
            AttributeData::I32(_) => DataType::Int,
        }
    }

    /// The raw bytes, in native endianness.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttributeData::F32(v) => bytemuck::cast_slice(v),
            AttributeData::U8(v) => v,
            AttributeData::I8(v) => bytemuck::cast_slice(v),
            AttributeData::U16(v) => bytemuck::cast_slice(v),
            AttributeData::I16(v) => bytemuck::cast_slice(v),
            AttributeData::U32(v) => bytemuck::cast_slice(v),
            AttributeData::I32(v) => bytemuck::cast_slice(v),
        }
    }

    fn get(&self, i: usize) -> f32 {
        match self {
            AttributeData::F32(v) => v[i],
            AttributeData::U8(v) => v[i] as f32,
            AttributeData::I8(v) => v[i] as f32,
            AttributeData::U16(v) => v[i] as f32,
            AttributeData::I16(v) => v[i] as f32,
            AttributeData::U32(v) => v[i] as f32,
            AttributeData::I32(v) => v[i] as f32,
        }
    }

    fn set(&mut self, i: usize, value: f32) {
        match self {
            AttributeData::F32(v) => v[i] = value,
            AttributeData::U8(v) => v[i] = value as u8,
            AttributeData::I8(v) => v[i] = value as i8,
            AttributeData::U16(v) => v[i] = value as u16,
            AttributeData::I16(v) => v[i] = value as i16,
            AttributeData::U32(v) => v[i] = value as u32,
            AttributeData::I32(v) => v[i] = value as i32,
        }
    }
}

/// A sub-range of an attribute to re-upload, in components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRange {
    /// First component.
    pub start: usize,
    /// Number of components.
    pub count: usize,
}

/// An array of per-vertex (or per-instance) values, or an index list.
///
/// # Panics
///
/// Construction panics if `item_size` is not 1-4, 9 or 16, or if the data length
/// is not a multiple of it. Accessors panic on out-of-range indices.
#[derive(Debug)]
pub struct BufferAttribute {
    id: AttributeId,
    data: AttributeData,
    item_size: usize,
    /// Whether integer data is normalized when read by shaders.
    pub normalized: bool,
    /// The usage hint for the GPU buffer.
    pub usage: BufferUsage,
    /// Instancing divisor, `0` for per-vertex data.
    pub divisor: u32,
    version: u64,
    update_ranges: Vec<UpdateRange>,
}

impl BufferAttribute {
    /// Creates an attribute from typed data.
    pub fn new(data: AttributeData, item_size: usize) -> Self {
        assert!(
            matches!(item_size, 1..=4 | 9 | 16),
            "item size must be 1-4, 9 or 16, got {item_size}"
        );
        assert!(
            data.len() % item_size == 0,
            "data length {} is not a multiple of item size {item_size}",
            data.len()
        );
        Self {
            id: AttributeId::next(),
            data,
            item_size,
            normalized: false,
            usage: BufferUsage::Static,
            divisor: 0,
            version: 0,
            update_ranges: Vec::new(),
        }
    }

    /// Shorthand for float data.
    pub fn from_f32(data: Vec<f32>, item_size: usize) -> Self {
        Self::new(AttributeData::F32(data), item_size)
    }

    /// Creates an index attribute, choosing 16-bit storage when every index fits.
    pub fn indices(indices: &[u32]) -> Self {
        if indices.iter().all(|&i| i <= u16::MAX as u32) {
            Self::new(
                AttributeData::U16(indices.iter().map(|&i| i as u16).collect()),
                1,
            )
        } else {
            Self::new(AttributeData::U32(indices.to_vec()), 1)
        }
    }

    /// Marks the attribute as per-instance data advancing every `divisor` instances.
    pub fn instanced(mut self, divisor: u32) -> Self {
        self.divisor = divisor;
        self
    }

    /// Sets the usage hint.
    pub fn with_usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Marks integer data as normalized.
    pub fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    /// The identity of this attribute.
    pub fn id(&self) -> AttributeId {
        self.id
    }

    /// The typed data.
    pub fn data(&self) -> &AttributeData {
        &self.data
    }

    /// The component type.
    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    /// The index type, for index attributes.
    pub fn index_type(&self) -> Option<IndexType> {
        match self.data {
            AttributeData::U16(_) => Some(IndexType::U16),
            AttributeData::U32(_) => Some(IndexType::U32),
            _ => None,
        }
    }

    /// Components per item.
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Number of items.
    pub fn count(&self) -> usize {
        self.data.len() / self.item_size
    }

    /// Size of the data in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.as_bytes().len()
    }

    /// The version counter, bumped on every change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Flags the data as changed so the GPU copy is refreshed.
    pub fn needs_update(&mut self) {
        self.version += 1;
    }

    /// Replaces the data. The item size is kept.
    pub fn set_data(&mut self, data: AttributeData) {
        assert!(
            data.len() % self.item_size == 0,
            "data length {} is not a multiple of item size {}",
            data.len(),
            self.item_size
        );
        self.data = data;
        self.update_ranges.clear();
        self.needs_update();
    }

    /// Reads one component of one item.
    pub fn get_component(&self, index: usize, component: usize) -> f32 {
        assert!(component < self.item_size, "component {component} out of range");
        self.data.get(index * self.item_size + component)
    }

    /// Writes one component of one item and bumps the version.
    pub fn set_component(&mut self, index: usize, component: usize, value: f32) {
        assert!(component < self.item_size, "component {component} out of range");
        self.data.set(index * self.item_size + component, value);
        self.needs_update();
    }

    /// Restricts the next upload to a component range. Ranges accumulate until the
    /// renderer consumes them.
    pub fn add_update_range(&mut self, start: usize, count: usize) {
        assert!(
            start + count <= self.data.len(),
            "update range {start}..{} exceeds {} components",
            start + count,
            self.data.len()
        );
        self.update_ranges.push(UpdateRange { start, count });
    }

    /// Pending update ranges.
    pub fn update_ranges(&self) -> &[UpdateRange] {
        &self.update_ranges
    }

    /// Forgets pending update ranges. Called after an upload.
    pub fn clear_update_ranges(&mut self) {
        self.update_ranges.clear();
    }
}

impl Clone for BufferAttribute {
    fn clone(&self) -> Self {
        Self {
            id: AttributeId::next(),
            data: self.data.clone(),
            item_size: self.item_size,
            normalized: self.normalized,
            usage: self.usage,
            divisor: self.divisor,
            version: self.version,
            update_ranges: self.update_ranges.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_gets_fresh_id() {
        let a = BufferAttribute::from_f32(vec![0.0; 9], 3);
        let b = a.clone();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_set_component_bumps_version() {
        let mut a = BufferAttribute::from_f32(vec![0.0; 6], 3);
        assert_eq!(a.version(), 0);
        a.set_component(1, 2, 5.0);
        assert_eq!(a.version(), 1);
        assert_eq!(a.get_component(1, 2), 5.0);
        assert_eq!(a.count(), 2);
        assert_eq!(a.byte_len(), 24);
    }

    #[test]
    fn test_indices_pick_smallest_type() {
        assert_eq!(
            BufferAttribute::indices(&[0, 1, 2]).index_type(),
            Some(IndexType::U16)
        );
        assert_eq!(
            BufferAttribute::indices(&[0, 70_000]).index_type(),
            Some(IndexType::U32)
        );
    }

    #[test]
    #[should_panic(expected = "not a multiple of item size")]
    fn test_misaligned_data_panics() {
        let _ = BufferAttribute::from_f32(vec![0.0; 5], 3);
    }

    #[test]
    #[should_panic(expected = "item size")]
    fn test_invalid_item_size_panics() {
        let _ = BufferAttribute::from_f32(vec![0.0; 5], 5);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_component_out_of_range_panics() {
        let mut a = BufferAttribute::from_f32(vec![0.0; 3], 3);
        a.set_component(0, 3, 1.0);
    }
}
