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

//! Offscreen render targets: a color texture, optional depth storage and one
//! framebuffer per face, allocated lazily.

use crate::render_lane::state::StateTracker;
use lumen_core::renderer::{
    DataType, FramebufferAttachment, FramebufferHandle, FramebufferStatus, GraphicsDevice,
    MemoryInfo, RenderbufferFormat, RenderbufferHandle, ResourceError, SamplerParams,
    TexImageDesc, TextureFormat, TextureHandle, TextureImageTarget, TextureTarget,
    CUBE_FACE_COUNT,
};
use lumen_core::resource::{RenderTargetDescriptor, RenderTargetKey};
use slotmap::SlotMap;

/// Device objects of an allocated target.
#[derive(Debug, Clone, Default)]
struct RenderTargetGpu {
    framebuffers: Vec<FramebufferHandle>,
    /// Mip level of the color texture attached to each framebuffer.
    levels: Vec<u32>,
    color: Option<TextureHandle>,
    depth_texture: Option<TextureHandle>,
    depth_buffer: Option<RenderbufferHandle>,
    byte_size: usize,
}

#[derive(Debug, Clone)]
struct RenderTargetEntry {
    descriptor: RenderTargetDescriptor,
    gpu: Option<RenderTargetGpu>,
}

fn color_target(descriptor: &RenderTargetDescriptor) -> TextureTarget {
    if descriptor.cube {
        TextureTarget::CubeMap
    } else {
        TextureTarget::Texture2D
    }
}

fn face_target(descriptor: &RenderTargetDescriptor, face: u32) -> TextureImageTarget {
    if descriptor.cube {
        TextureImageTarget::CubeFace(face)
    } else {
        TextureImageTarget::Texture2D
    }
}

/// Render targets keyed by handle.
///
/// Creating a target only records its descriptor. Device objects are allocated the
/// first time the target is bound or sampled, and again after a resize or a
/// context loss.
#[derive(Debug, Default)]
pub struct RenderTargetTable {
    targets: SlotMap<RenderTargetKey, RenderTargetEntry>,
}

impl RenderTargetTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a target. No device work happens until it is used.
    pub fn create(&mut self, descriptor: RenderTargetDescriptor) -> RenderTargetKey {
        self.targets.insert(RenderTargetEntry {
            descriptor,
            gpu: None,
        })
    }

    /// Returns `true` if `key` names a live target.
    pub fn contains(&self, key: RenderTargetKey) -> bool {
        self.targets.contains_key(key)
    }

    /// The descriptor of a target.
    pub fn descriptor(&self, key: RenderTargetKey) -> Option<&RenderTargetDescriptor> {
        self.targets.get(key).map(|entry| &entry.descriptor)
    }

    /// Number of registered targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Returns `true` if no target is registered.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Returns `true` if the device objects of a target exist.
    pub fn is_allocated(&self, key: RenderTargetKey) -> bool {
        self.targets.get(key).is_some_and(|entry| entry.gpu.is_some())
    }

    /// Changes the size of a target, freeing its device objects.
    ///
    /// Returns `false` if the target is unknown.
    pub fn resize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        key: RenderTargetKey,
        width: u32,
        height: u32,
        memory: &mut MemoryInfo,
    ) -> bool {
        let Some(entry) = self.targets.get_mut(key) else {
            return false;
        };
        if entry.descriptor.width == width && entry.descriptor.height == height {
            return true;
        }
        entry.descriptor.width = width;
        entry.descriptor.height = height;
        if let Some(gpu) = entry.gpu.take() {
            release(device, state, gpu, memory);
        }
        true
    }

    /// Allocates the device objects of a target if needed.
    ///
    /// The framebuffer binding is left as it was.
    pub fn ensure(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        key: RenderTargetKey,
        memory: &mut MemoryInfo,
    ) -> Result<(), ResourceError> {
        let entry = self.targets.get_mut(key).ok_or(ResourceError::InvalidHandle)?;
        if entry.gpu.is_some() {
            return Ok(());
        }
        let previous = state.framebuffer();
        let allocated = allocate(device, state, &entry.descriptor, memory);
        state.bind_framebuffer(device, previous);
        entry.gpu = Some(allocated?);
        Ok(())
    }

    /// Binds the framebuffer of `face` (`0` for 2D targets), allocating first.
    ///
    /// Returns the size of the target.
    pub fn bind(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        key: RenderTargetKey,
        face: u32,
        memory: &mut MemoryInfo,
    ) -> Result<(u32, u32), ResourceError> {
        self.bind_level(device, state, key, face, 0, memory)
    }

    /// Binds the framebuffer of `face` with mip `level` of the color texture
    /// attached, allocating first.
    ///
    /// Returns the size of that level.
    pub fn bind_level(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        key: RenderTargetKey,
        face: u32,
        level: u32,
        memory: &mut MemoryInfo,
    ) -> Result<(u32, u32), ResourceError> {
        self.ensure(device, state, key, memory)?;
        let entry = self.targets.get_mut(key).ok_or(ResourceError::InvalidHandle)?;
        let descriptor = &entry.descriptor;
        let gpu = entry.gpu.as_mut().ok_or(ResourceError::InvalidHandle)?;
        let slot = face as usize;
        let framebuffer = gpu
            .framebuffers
            .get(slot)
            .copied()
            .ok_or(ResourceError::InvalidHandle)?;
        state.bind_framebuffer(device, Some(framebuffer));
        if let (Some(attached), Some(color)) = (gpu.levels.get_mut(slot), gpu.color) {
            if *attached != level {
                device.framebuffer_texture_2d(
                    FramebufferAttachment::Color(0),
                    face_target(descriptor, face),
                    color,
                    level,
                );
                *attached = level;
            }
        }
        Ok((
            (descriptor.width >> level).max(1),
            (descriptor.height >> level).max(1),
        ))
    }

    /// The color texture of an allocated target.
    pub fn texture(&self, key: RenderTargetKey) -> Option<TextureHandle> {
        self.targets.get(key)?.gpu.as_ref()?.color
    }

    /// The depth texture of an allocated target, when it has one.
    pub fn depth_texture(&self, key: RenderTargetKey) -> Option<TextureHandle> {
        self.targets.get(key)?.gpu.as_ref()?.depth_texture
    }

    /// Regenerates the mipmaps of the color texture, if the target asks for them.
    pub fn generate_mipmaps(
        &self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        key: RenderTargetKey,
    ) {
        let Some(entry) = self.targets.get(key) else {
            return;
        };
        let descriptor = &entry.descriptor;
        if !descriptor.generate_mipmaps || !descriptor.sampler.min_filter.uses_mipmaps() {
            return;
        }
        if let Some(color) = entry.gpu.as_ref().and_then(|gpu| gpu.color) {
            let target = color_target(descriptor);
            state.bind_texture(device, target, Some(color), None);
            device.generate_mipmap(target);
        }
    }

    /// Deletes a target and its device objects. Returns `false` if it was unknown.
    pub fn remove(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        key: RenderTargetKey,
        memory: &mut MemoryInfo,
    ) -> bool {
        let Some(entry) = self.targets.remove(key) else {
            return false;
        };
        if let Some(gpu) = entry.gpu {
            release(device, state, gpu, memory);
        }
        true
    }

    /// Forgets every device object after a context loss, keeping the descriptors.
    pub fn invalidate(&mut self, memory: &mut MemoryInfo) {
        for entry in self.targets.values_mut() {
            if let Some(gpu) = entry.gpu.take() {
                memory.render_targets = memory.render_targets.saturating_sub(1);
                memory.gpu_bytes = memory.gpu_bytes.saturating_sub(gpu.byte_size);
            }
        }
    }

    /// Deletes every target.
    pub fn dispose(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        memory: &mut MemoryInfo,
    ) {
        for (_, entry) in self.targets.drain() {
            if let Some(gpu) = entry.gpu {
                release(device, state, gpu, memory);
            }
        }
    }
}

/// Creates the device objects of a descriptor, cleaning up on failure.
fn allocate(
    device: &mut dyn GraphicsDevice,
    state: &mut StateTracker,
    descriptor: &RenderTargetDescriptor,
    memory: &mut MemoryInfo,
) -> Result<RenderTargetGpu, ResourceError> {
    let mut gpu = RenderTargetGpu::default();
    match build(device, state, descriptor, &mut gpu) {
        Ok(()) => {
            memory.render_targets += 1;
            memory.gpu_bytes += gpu.byte_size;
            log::debug!(
                "Allocated {}x{} render target ({} framebuffer(s)).",
                descriptor.width,
                descriptor.height,
                gpu.framebuffers.len()
            );
            Ok(gpu)
        }
        Err(error) => {
            destroy(device, state, gpu);
            Err(error)
        }
    }
}

fn build(
    device: &mut dyn GraphicsDevice,
    state: &mut StateTracker,
    descriptor: &RenderTargetDescriptor,
    gpu: &mut RenderTargetGpu,
) -> Result<(), ResourceError> {
    let (width, height) = (descriptor.width, descriptor.height);
    let faces = if descriptor.cube { CUBE_FACE_COUNT } else { 1 };
    let target = color_target(descriptor);

    let color = device.create_texture()?;
    gpu.color = Some(color);
    state.bind_texture(device, target, Some(color), None);
    let desc = TexImageDesc {
        width,
        height,
        format: descriptor.format,
        data_type: descriptor.data_type,
    };
    for face in 0..faces {
        device.tex_image_2d(face_target(descriptor, face), 0, &desc, None)?;
    }
    device.tex_parameters(target, &descriptor.sampler);
    gpu.byte_size += desc.byte_size() * faces as usize;

    // Cube targets always take a renderbuffer for depth.
    let depth_texture = descriptor.depth_texture && !descriptor.cube;
    let depth_attachment = if descriptor.stencil_buffer {
        FramebufferAttachment::DepthStencil
    } else {
        FramebufferAttachment::Depth
    };
    if depth_texture {
        let depth = device.create_texture()?;
        gpu.depth_texture = Some(depth);
        state.bind_texture(device, TextureTarget::Texture2D, Some(depth), None);
        let desc = if descriptor.stencil_buffer {
            TexImageDesc {
                width,
                height,
                format: TextureFormat::DepthStencil,
                data_type: DataType::UnsignedInt248,
            }
        } else {
            TexImageDesc {
                width,
                height,
                format: TextureFormat::Depth,
                data_type: DataType::UnsignedInt,
            }
        };
        device.tex_image_2d(TextureImageTarget::Texture2D, 0, &desc, None)?;
        device.tex_parameters(TextureTarget::Texture2D, &SamplerParams::NEAREST_CLAMP);
        gpu.byte_size += desc.byte_size();
    } else if descriptor.depth_buffer || descriptor.stencil_buffer {
        let format = match (descriptor.depth_buffer, descriptor.stencil_buffer) {
            (true, true) => RenderbufferFormat::DepthStencil,
            (true, false) => RenderbufferFormat::DepthComponent16,
            _ => RenderbufferFormat::StencilIndex8,
        };
        let renderbuffer = device.create_renderbuffer()?;
        gpu.depth_buffer = Some(renderbuffer);
        device.bind_renderbuffer(Some(renderbuffer));
        device.renderbuffer_storage(format, width, height)?;
        device.bind_renderbuffer(None);
        gpu.byte_size += format.bytes_per_pixel() * width as usize * height as usize;
    }

    for face in 0..faces {
        let framebuffer = device.create_framebuffer()?;
        gpu.framebuffers.push(framebuffer);
        gpu.levels.push(0);
        state.bind_framebuffer(device, Some(framebuffer));
        device.framebuffer_texture_2d(
            FramebufferAttachment::Color(0),
            face_target(descriptor, face),
            color,
            0,
        );
        if let Some(depth) = gpu.depth_texture {
            device.framebuffer_texture_2d(depth_attachment, TextureImageTarget::Texture2D, depth, 0);
        } else if let Some(renderbuffer) = gpu.depth_buffer {
            let attachment = if descriptor.depth_buffer {
                depth_attachment
            } else {
                FramebufferAttachment::Stencil
            };
            device.framebuffer_renderbuffer(attachment, renderbuffer);
        }
        let status = device.check_framebuffer_status();
        if status != FramebufferStatus::Complete {
            return Err(ResourceError::IncompleteFramebuffer(status));
        }
    }
    Ok(())
}

fn release(
    device: &mut dyn GraphicsDevice,
    state: &mut StateTracker,
    gpu: RenderTargetGpu,
    memory: &mut MemoryInfo,
) {
    memory.render_targets = memory.render_targets.saturating_sub(1);
    memory.gpu_bytes = memory.gpu_bytes.saturating_sub(gpu.byte_size);
    destroy(device, state, gpu);
}

fn destroy(device: &mut dyn GraphicsDevice, state: &mut StateTracker, gpu: RenderTargetGpu) {
    for framebuffer in gpu.framebuffers {
        if state.framebuffer() == Some(framebuffer) {
            state.bind_framebuffer(device, None);
        }
        state.forget_framebuffer(framebuffer);
        device.delete_framebuffer(framebuffer);
    }
    for texture in gpu.color.into_iter().chain(gpu.depth_texture) {
        state.unbind_texture(texture);
        device.delete_texture(texture);
    }
    if let Some(renderbuffer) = gpu.depth_buffer {
        device.delete_renderbuffer(renderbuffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_infra::{DeviceCall, HeadlessDevice};

    #[test]
    fn test_allocation_is_lazy_and_happens_once() {
        // --- 1. ARRANGE ---
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut state = StateTracker::new(&probe);
        let mut memory = MemoryInfo::default();
        let mut table = RenderTargetTable::new();
        let key = table.create(RenderTargetDescriptor::new(64, 32));
        assert_eq!(probe.live_framebuffers(), 0);

        // --- 2. ACT ---
        let size = table.bind(&mut device, &mut state, key, 0, &mut memory).unwrap();
        table.bind(&mut device, &mut state, key, 0, &mut memory).unwrap();

        // --- 3. ASSERT ---
        assert_eq!(size, (64, 32));
        assert_eq!(probe.live_framebuffers(), 1);
        assert_eq!(probe.live_renderbuffers(), 1);
        assert_eq!(memory.render_targets, 1);
        assert_eq!(memory.gpu_bytes, 64 * 32 * 4 + 64 * 32 * 2);
        assert!(table.texture(key).is_some());
        assert!(state.framebuffer().is_some());
    }

    #[test]
    fn test_cube_targets_get_one_framebuffer_per_face() {
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut state = StateTracker::new(&probe);
        let mut memory = MemoryInfo::default();
        let mut table = RenderTargetTable::new();
        let mut descriptor = RenderTargetDescriptor::new(16, 16);
        descriptor.cube = true;
        descriptor.depth_texture = true;
        let key = table.create(descriptor);

        table.bind(&mut device, &mut state, key, 5, &mut memory).unwrap();

        assert_eq!(probe.live_framebuffers(), 6);
        assert_eq!(table.depth_texture(key), None);
        assert!(probe.errors().is_empty(), "{:?}", probe.errors());
    }

    #[test]
    fn test_resize_reallocates_on_next_bind() {
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut state = StateTracker::new(&probe);
        let mut memory = MemoryInfo::default();
        let mut table = RenderTargetTable::new();
        let key = table.create(RenderTargetDescriptor::new(8, 8));
        table.bind(&mut device, &mut state, key, 0, &mut memory).unwrap();

        assert!(table.resize(&mut device, &mut state, key, 4, 4, &mut memory));
        assert!(!table.is_allocated(key));
        assert_eq!(memory, MemoryInfo::default());
        assert_eq!(state.framebuffer(), None);

        table.bind(&mut device, &mut state, key, 0, &mut memory).unwrap();
        let images: Vec<DeviceCall> = probe
            .calls()
            .into_iter()
            .filter(|c| matches!(c, DeviceCall::TexImage2D { width: 4, .. }))
            .collect();
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn test_allocation_failure_cleans_up() {
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut state = StateTracker::new(&probe);
        let mut memory = MemoryInfo::default();
        let mut table = RenderTargetTable::new();
        let key = table.create(RenderTargetDescriptor::new(8, 8));
        probe.fail_next_allocations(1);

        let result = table.bind(&mut device, &mut state, key, 0, &mut memory);

        assert!(matches!(result, Err(ResourceError::AllocationFailed(_))));
        assert_eq!(probe.live_textures(), 0);
        assert_eq!(memory, MemoryInfo::default());
        assert!(table.contains(key));
    }

    #[test]
    fn test_bind_level_reattaches_only_on_change() {
        // --- 1. ARRANGE ---
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut state = StateTracker::new(&probe);
        let mut memory = MemoryInfo::default();
        let mut table = RenderTargetTable::new();
        let key = table.create(RenderTargetDescriptor::new(64, 32));
        table.bind(&mut device, &mut state, key, 0, &mut memory).unwrap();
        probe.clear_calls();

        // --- 2. ACT ---
        let level_two = table
            .bind_level(&mut device, &mut state, key, 0, 2, &mut memory)
            .unwrap();
        table
            .bind_level(&mut device, &mut state, key, 0, 2, &mut memory)
            .unwrap();
        let base = table.bind(&mut device, &mut state, key, 0, &mut memory).unwrap();

        // --- 3. ASSERT ---
        assert_eq!(level_two, (16, 8));
        assert_eq!(base, (64, 32));
        let levels: Vec<u32> = probe
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::FramebufferTexture2D { level, .. } => Some(level),
                _ => None,
            })
            .collect();
        assert_eq!(levels, vec![2, 0]);
    }
}
