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

//! GPU copies of textures, with a shared placeholder for textures that cannot be
//! uploaded.

use crate::render_lane::state::StateTracker;
use lumen_core::renderer::{
    Capabilities, DataType, GraphicsDevice, MemoryInfo, Rect, ResourceError, SamplerParams,
    TexImageDesc, TextureFormat, TextureHandle, TextureImageTarget, TextureTarget,
    CUBE_FACE_COUNT,
};
use lumen_core::resource::{Image, Texture, TextureImage, TextureKey};
use slotmap::SecondaryMap;

/// The GPU side of one [`Texture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRecord {
    /// The device texture, `None` while the texture falls back to the placeholder.
    pub handle: Option<TextureHandle>,
    /// Binding target.
    pub target: TextureTarget,
    /// Width of the base level.
    pub width: u32,
    /// Height of the base level.
    pub height: u32,
    /// Pixel layout.
    pub format: TextureFormat,
    /// Component type.
    pub data_type: DataType,
    /// Bytes of the base level, all faces included.
    pub byte_size: usize,
    /// Texture version the record was built from.
    pub version: u64,
}

impl TextureRecord {
    /// Returns `true` if the last upload failed and the placeholder stands in.
    pub fn is_fallback(&self) -> bool {
        self.handle.is_none()
    }
}

/// What [`TextureTable::upload`] bound.
#[derive(Debug)]
pub struct TextureUpload {
    /// The handle bound to the unit.
    pub handle: TextureHandle,
    /// Its target.
    pub target: TextureTarget,
    /// The upload failure that made the placeholder stand in, reported once per
    /// texture version.
    pub failure: Option<ResourceError>,
}

/// Textures keyed by asset key.
#[derive(Debug, Default)]
pub struct TextureTable {
    records: SecondaryMap<TextureKey, TextureRecord>,
    placeholder_2d: Option<TextureHandle>,
    placeholder_cube: Option<TextureHandle>,
}

impl TextureTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The record of a texture, if it was uploaded.
    pub fn get(&self, key: TextureKey) -> Option<&TextureRecord> {
        self.records.get(key)
    }

    /// Number of tracked textures.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no texture is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The 1x1 white texture bound in place of missing or failed textures.
    ///
    /// Created on first use and counted as a live texture.
    pub fn placeholder(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        unit: u32,
        target: TextureTarget,
        memory: &mut MemoryInfo,
    ) -> Result<TextureHandle, ResourceError> {
        let slot = match target {
            TextureTarget::Texture2D => &mut self.placeholder_2d,
            TextureTarget::CubeMap => &mut self.placeholder_cube,
        };
        if let Some(handle) = *slot {
            state.bind_texture(device, target, Some(handle), Some(unit));
            return Ok(handle);
        }

        let handle = device.create_texture()?;
        state.bind_texture(device, target, Some(handle), Some(unit));
        let white = [255u8; 4];
        let desc = TexImageDesc {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba,
            data_type: DataType::UnsignedByte,
        };
        let faces: Vec<TextureImageTarget> = match target {
            TextureTarget::Texture2D => vec![TextureImageTarget::Texture2D],
            TextureTarget::CubeMap => (0..CUBE_FACE_COUNT).map(TextureImageTarget::CubeFace).collect(),
        };
        for face in &faces {
            if let Err(error) = device.tex_image_2d(*face, 0, &desc, Some(&white)) {
                state.unbind_texture(handle);
                device.delete_texture(handle);
                return Err(error);
            }
        }
        device.tex_parameters(target, &SamplerParams::NEAREST_CLAMP);
        memory.textures += 1;
        memory.gpu_bytes += white.len() * faces.len();
        *slot = Some(handle);
        log::debug!("Created {target:?} placeholder texture {handle:?}.");
        Ok(handle)
    }

    /// Uploads `texture` if its version moved and binds it to `unit`.
    ///
    /// A texture with no image yet binds the placeholder. An unsupported format, a
    /// missing extension, an oversized image or an allocation failure also binds
    /// the placeholder and reports the failure; the upload is retried only once
    /// the texture version changes. Only a lost context is returned as an error.
    #[allow(clippy::too_many_arguments)]
    pub fn upload(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        unit: u32,
        capabilities: &Capabilities,
        key: TextureKey,
        texture: &mut Texture,
        memory: &mut MemoryInfo,
    ) -> Result<TextureUpload, ResourceError> {
        let target = if texture.is_cube() {
            TextureTarget::CubeMap
        } else {
            TextureTarget::Texture2D
        };

        if texture.version() == 0 || texture.image.is_none() {
            let handle = self.placeholder(device, state, unit, target, memory)?;
            return Ok(TextureUpload {
                handle,
                target,
                failure: None,
            });
        }

        let previous = self.records.get(key).copied();
        if let Some(record) = previous.filter(|r| r.version >= texture.version()) {
            let handle = match record.handle {
                Some(handle) => {
                    state.bind_texture(device, record.target, Some(handle), Some(unit));
                    handle
                }
                None => self.placeholder(device, state, unit, record.target, memory)?,
            };
            return Ok(TextureUpload {
                handle,
                target: record.target,
                failure: None,
            });
        }

        match self.allocate(device, state, unit, capabilities, texture, target, previous, memory) {
            Ok(record) => {
                self.records.insert(key, record);
                texture.clear_update_ranges();
                Ok(TextureUpload {
                    handle: record.handle.ok_or(ResourceError::InvalidHandle)?,
                    target,
                    failure: None,
                })
            }
            Err(ResourceError::ContextLost) => Err(ResourceError::ContextLost),
            Err(error) => {
                log::error!(
                    "Texture '{}' cannot be uploaded, using the placeholder: {error}",
                    texture.name
                );
                if let Some(old) = previous.and_then(|r| r.handle.map(|h| (h, r.byte_size))) {
                    self.free(device, state, old.0, old.1, memory);
                }
                let (width, height) = texture.size().unwrap_or((0, 0));
                self.records.insert(
                    key,
                    TextureRecord {
                        handle: None,
                        target,
                        width,
                        height,
                        format: texture.format,
                        data_type: texture.data_type,
                        byte_size: 0,
                        version: texture.version(),
                    },
                );
                texture.clear_update_ranges();
                let handle = self.placeholder(device, state, unit, target, memory)?;
                Ok(TextureUpload {
                    handle,
                    target,
                    failure: Some(error),
                })
            }
        }
    }

    /// Binds the device copy of `key` to `unit` without uploading anything.
    ///
    /// A texture never uploaded, or one that fell back, binds the placeholder of
    /// `target`.
    pub fn bind(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        unit: u32,
        key: TextureKey,
        target: TextureTarget,
        memory: &mut MemoryInfo,
    ) -> Result<TextureHandle, ResourceError> {
        let uploaded = self
            .records
            .get(key)
            .and_then(|record| record.handle.map(|handle| (handle, record.target)));
        match uploaded {
            Some((handle, bound)) => {
                state.bind_texture(device, bound, Some(handle), Some(unit));
                Ok(handle)
            }
            None => self.placeholder(device, state, unit, target, memory),
        }
    }

    /// Validates and sends the texture, reusing the previous storage when possible.
    #[allow(clippy::too_many_arguments)]
    fn allocate(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        unit: u32,
        capabilities: &Capabilities,
        texture: &Texture,
        target: TextureTarget,
        previous: Option<TextureRecord>,
        memory: &mut MemoryInfo,
    ) -> Result<TextureRecord, ResourceError> {
        capabilities.check_texture_format(texture.format, texture.data_type)?;
        let (width, height) = texture.size().ok_or(ResourceError::InvalidHandle)?;
        let max = match target {
            TextureTarget::Texture2D => capabilities.max_texture_size,
            TextureTarget::CubeMap => capabilities.max_cubemap_size,
        };
        if width > max || height > max {
            return Err(ResourceError::TooLarge { width, height, max });
        }

        let images: Vec<(TextureImageTarget, &Image)> = match &texture.image {
            Some(TextureImage::Single(image)) => vec![(TextureImageTarget::Texture2D, image)],
            Some(TextureImage::Cube(faces)) => faces
                .iter()
                .enumerate()
                .map(|(i, image)| (TextureImageTarget::CubeFace(i as u32), image))
                .collect(),
            None => return Err(ResourceError::InvalidHandle),
        };
        let desc = TexImageDesc {
            width,
            height,
            format: texture.format,
            data_type: texture.data_type,
        };
        let byte_size = desc.byte_size() * images.len();

        let reusable = previous.and_then(|r| {
            let same_storage = r.target == target
                && r.width == width
                && r.height == height
                && r.format == texture.format
                && r.data_type == texture.data_type;
            r.handle.map(|h| (h, same_storage, r.byte_size))
        });
        let (handle, created) = match reusable {
            Some((handle, _, _)) => (handle, false),
            None => (device.create_texture()?, true),
        };
        state.bind_texture(device, target, Some(handle), Some(unit));
        device.set_unpack_flip_y(texture.flip_y);

        let partial = matches!(reusable, Some((_, true, _)))
            && !texture.update_ranges().is_empty()
            && !matches!(texture.format, TextureFormat::Compressed(_));
        let sent = if partial {
            self.upload_regions(device, texture, &images);
            Ok(())
        } else {
            images.iter().try_for_each(|(face, image)| {
                device.tex_image_2d(*face, 0, &desc, image.data.as_deref())
            })
        };
        if let Err(error) = sent {
            if created {
                state.unbind_texture(handle);
                device.delete_texture(handle);
            }
            return Err(error);
        }

        let mut sampler = texture.sampler;
        sampler.anisotropy = sampler.anisotropy.clamp(1, capabilities.max_anisotropy.max(1));
        device.tex_parameters(target, &sampler);
        if texture.generate_mipmaps
            && sampler.min_filter.uses_mipmaps()
            && !matches!(texture.format, TextureFormat::Compressed(_))
        {
            device.generate_mipmap(target);
        }

        match reusable {
            Some((_, _, old_size)) => {
                memory.gpu_bytes = memory.gpu_bytes.saturating_sub(old_size) + byte_size;
            }
            None => {
                memory.textures += 1;
                memory.gpu_bytes += byte_size;
                log::debug!(
                    "Created texture '{}' {handle:?} ({width}x{height} {:?}).",
                    texture.name,
                    texture.format
                );
            }
        }

        Ok(TextureRecord {
            handle: Some(handle),
            target,
            width,
            height,
            format: texture.format,
            data_type: texture.data_type,
            byte_size,
            version: texture.version(),
        })
    }

    /// Sends only the pending update regions of each face.
    fn upload_regions(
        &self,
        device: &mut dyn GraphicsDevice,
        texture: &Texture,
        images: &[(TextureImageTarget, &Image)],
    ) {
        let pixel = texture.format.image_byte_size(1, 1, texture.data_type);
        for (face, image) in images {
            let Some(data) = image.data.as_deref() else {
                continue;
            };
            let row = image.width as usize * pixel;
            for region in texture.update_ranges() {
                let region = clip_region(*region, image.width, image.height);
                if region.width == 0 || region.height == 0 {
                    continue;
                }
                let (x, w) = (region.x as usize * pixel, region.width as usize * pixel);
                let mut bytes = Vec::with_capacity(w * region.height as usize);
                for y in region.y..region.y + region.height {
                    let start = y as usize * row + x;
                    bytes.extend_from_slice(&data[start..start + w]);
                }
                device.tex_sub_image_2d(
                    *face,
                    0,
                    region,
                    texture.format,
                    texture.data_type,
                    &bytes,
                );
            }
        }
    }

    fn free(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        handle: TextureHandle,
        byte_size: usize,
        memory: &mut MemoryInfo,
    ) {
        state.unbind_texture(handle);
        device.delete_texture(handle);
        memory.textures = memory.textures.saturating_sub(1);
        memory.gpu_bytes = memory.gpu_bytes.saturating_sub(byte_size);
        log::debug!("Deleted texture {handle:?}.");
    }

    /// Deletes the GPU copy of a texture. Returns `true` if one was tracked.
    pub fn remove(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        key: TextureKey,
        memory: &mut MemoryInfo,
    ) -> bool {
        let Some(record) = self.records.remove(key) else {
            return false;
        };
        if let Some(handle) = record.handle {
            self.free(device, state, handle, record.byte_size, memory);
        }
        true
    }

    /// Forgets every texture after a context loss. Nothing is sent to the device.
    pub fn invalidate(&mut self, memory: &mut MemoryInfo) {
        for record in self.records.values() {
            if record.handle.is_some() {
                memory.textures = memory.textures.saturating_sub(1);
                memory.gpu_bytes = memory.gpu_bytes.saturating_sub(record.byte_size);
            }
        }
        self.records.clear();
        for (slot, bytes) in [(&mut self.placeholder_2d, 4), (&mut self.placeholder_cube, 24)] {
            if slot.take().is_some() {
                memory.textures = memory.textures.saturating_sub(1);
                memory.gpu_bytes = memory.gpu_bytes.saturating_sub(bytes);
            }
        }
    }

    /// Deletes every texture, placeholders included.
    pub fn dispose(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        memory: &mut MemoryInfo,
    ) {
        let keys: Vec<TextureKey> = self.records.keys().collect();
        for key in keys {
            self.remove(device, state, key, memory);
        }
        for (slot, bytes) in [(self.placeholder_2d.take(), 4), (self.placeholder_cube.take(), 24)] {
            if let Some(handle) = slot {
                self.free(device, state, handle, bytes, memory);
            }
        }
    }
}

/// Clamps a region to the image bounds.
fn clip_region(region: Rect, width: u32, height: u32) -> Rect {
    let x = region.x.clamp(0, width as i32);
    let y = region.y.clamp(0, height as i32);
    let right = (region.x + region.width).clamp(x, width as i32);
    let bottom = (region.y + region.height).clamp(y, height as i32);
    Rect::new(x, y, right - x, bottom - y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::{Limit, RendererSettings};
    use lumen_infra::{DeviceCall, HeadlessDevice};
    use slotmap::SlotMap;

    struct Fixture {
        probe: HeadlessDevice,
        device: HeadlessDevice,
        state: StateTracker,
        caps: Capabilities,
        table: TextureTable,
        memory: MemoryInfo,
        key: TextureKey,
    }

    fn fixture(device: HeadlessDevice) -> Fixture {
        let caps = Capabilities::probe(&device, &RendererSettings::default());
        let mut keys: SlotMap<TextureKey, ()> = SlotMap::with_key();
        Fixture {
            probe: device.clone(),
            state: StateTracker::new(&device),
            device,
            caps,
            table: TextureTable::new(),
            memory: MemoryInfo::default(),
            key: keys.insert(()),
        }
    }

    fn upload(f: &mut Fixture, texture: &mut Texture) -> TextureUpload {
        f.table
            .upload(&mut f.device, &mut f.state, 0, &f.caps, f.key, texture, &mut f.memory)
            .unwrap()
    }

    #[test]
    fn test_upload_is_idempotent_per_version() {
        // --- 1. ARRANGE ---
        let mut f = fixture(HeadlessDevice::new());
        let mut texture = Texture::new(Image::solid_rgba8(4, 4, [1, 2, 3, 4]));

        // --- 2. ACT ---
        upload(&mut f, &mut texture);
        upload(&mut f, &mut texture);

        // --- 3. ASSERT ---
        assert_eq!(f.probe.count_calls(DeviceCall::is_texture_upload), 1);
        assert_eq!(
            f.probe.count_calls(|c| matches!(c, DeviceCall::GenerateMipmap(_))),
            1
        );
        assert_eq!(f.memory.textures, 1);
        assert_eq!(f.memory.gpu_bytes, 64);
    }

    #[test]
    fn test_oversized_texture_falls_back_until_version_changes() {
        // --- 1. ARRANGE ---
        let mut f = fixture(HeadlessDevice::new().with_limit(Limit::MaxTextureSize, 8));
        let mut texture = Texture::new(Image::solid_rgba8(16, 16, [0; 4]));

        // --- 2. ACT ---
        let first = upload(&mut f, &mut texture);
        let second = upload(&mut f, &mut texture);

        // --- 3. ASSERT ---
        assert!(matches!(
            first.failure,
            Some(ResourceError::TooLarge { max: 8, .. })
        ));
        assert!(second.failure.is_none());
        assert_eq!(first.handle, second.handle);
        assert!(f.table.get(f.key).unwrap().is_fallback());
        assert_eq!(f.probe.count_calls(DeviceCall::is_texture_upload), 1);
        assert_eq!(f.memory.textures, 1, "only the placeholder is live");

        texture.image = Some(TextureImage::Single(Image::solid_rgba8(8, 8, [0; 4])));
        texture.needs_update();
        let third = upload(&mut f, &mut texture);
        assert!(third.failure.is_none());
        assert_ne!(third.handle, first.handle);
        assert_eq!(f.memory.textures, 2);
    }

    #[test]
    fn test_update_ranges_upload_sub_regions() {
        let mut f = fixture(HeadlessDevice::new());
        let mut texture = Texture::new(Image::solid_rgba8(4, 4, [9; 4]));
        texture.generate_mipmaps = false;
        upload(&mut f, &mut texture);
        f.probe.clear_calls();

        texture.add_update_range(Rect::new(1, 1, 2, 2));
        texture.needs_update();
        upload(&mut f, &mut texture);

        let uploads: Vec<DeviceCall> = f
            .probe
            .calls()
            .into_iter()
            .filter(DeviceCall::is_texture_upload)
            .collect();
        assert_eq!(
            uploads,
            vec![DeviceCall::TexSubImage2D {
                target: TextureImageTarget::Texture2D,
                level: 0,
                region: Rect::new(1, 1, 2, 2),
            }]
        );
        assert!(f.probe.errors().is_empty(), "{:?}", f.probe.errors());
        assert!(texture.update_ranges().is_empty());
    }

    #[test]
    fn test_remove_and_dispose_free_memory() {
        let mut f = fixture(HeadlessDevice::new());
        let mut texture = Texture::new(Image::solid_rgba8(2, 2, [0; 4]));
        upload(&mut f, &mut texture);
        let mut empty = Texture::default();
        upload(&mut f, &mut empty);
        assert_eq!(f.memory.textures, 2);

        assert!(f.table.remove(&mut f.device, &mut f.state, f.key, &mut f.memory));
        assert_eq!(f.memory.textures, 1);
        f.table.dispose(&mut f.device, &mut f.state, &mut f.memory);
        assert_eq!(f.memory, MemoryInfo::default());
        assert_eq!(f.probe.live_textures(), 0);
    }

    #[test]
    fn test_bind_uses_uploaded_copy_or_placeholder() {
        // --- 1. ARRANGE ---
        let mut f = fixture(HeadlessDevice::new());
        let mut texture = Texture::new(Image::solid_rgba8(2, 2, [9; 4]));
        let uploaded = upload(&mut f, &mut texture).handle;
        let mut keys: SlotMap<TextureKey, ()> = SlotMap::with_key();
        keys.insert(());
        let unknown = keys.insert(());

        // --- 2. ACT ---
        let bound = f
            .table
            .bind(&mut f.device, &mut f.state, 3, f.key, TextureTarget::Texture2D, &mut f.memory)
            .unwrap();
        let fallback = f
            .table
            .bind(&mut f.device, &mut f.state, 4, unknown, TextureTarget::Texture2D, &mut f.memory)
            .unwrap();

        // --- 3. ASSERT ---
        assert_eq!(bound, uploaded);
        assert_ne!(fallback, uploaded);
        assert_eq!(f.state.bound_texture(3, TextureTarget::Texture2D), Some(uploaded));
        assert_eq!(f.state.bound_texture(4, TextureTarget::Texture2D), Some(fallback));
        assert_eq!(f.memory.textures, 2);
    }
}
