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

//! The headless implementation of the `GraphicsDevice` trait.

use super::call::DeviceCall;
use super::glsl::{self, Declaration};
use lumen_core::renderer::*;
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct BufferObject {
    size: usize,
}

#[derive(Debug, Default)]
struct TextureObject {
    target: Option<TextureTarget>,
    // (image target, level) -> (width, height)
    levels: HashMap<(TextureImageTarget, u32), (u32, u32)>,
}

#[derive(Debug, Clone, Copy)]
enum Attachment {
    Texture {
        texture: TextureHandle,
        target: TextureImageTarget,
        level: u32,
    },
    Renderbuffer(RenderbufferHandle),
}

#[derive(Debug, Default)]
struct FramebufferObject {
    attachments: HashMap<FramebufferAttachment, Attachment>,
}

#[derive(Debug, Default)]
struct RenderbufferObject {
    storage: Option<(RenderbufferFormat, u32, u32)>,
}

#[derive(Debug)]
struct ShaderObject {
    compiled: bool,
    log: String,
    uniforms: Vec<Declaration>,
    attributes: Vec<Declaration>,
}

#[derive(Debug)]
struct ProgramObject {
    linked: bool,
    log: String,
    uniforms: Vec<ActiveUniform>,
    attributes: Vec<ActiveAttribute>,
    values: HashMap<UniformLocation, UniformValue>,
}

/// The internal state of the headless device, shared by every clone of the handle.
#[derive(Debug)]
struct HeadlessState {
    limits: HashMap<Limit, u32>,
    extensions: BTreeSet<String>,
    max_precision: Precision,
    drawing_buffer_size: (u32, u32),
    lost: bool,
    failing_allocations: u32,
    next_handle: u32,

    buffers: HashMap<u32, BufferObject>,
    textures: HashMap<u32, TextureObject>,
    framebuffers: HashMap<u32, FramebufferObject>,
    renderbuffers: HashMap<u32, RenderbufferObject>,
    shaders: HashMap<u32, ShaderObject>,
    programs: HashMap<u32, ProgramObject>,

    array_buffer: Option<BufferHandle>,
    element_buffer: Option<BufferHandle>,
    active_unit: u32,
    bound_textures: HashMap<(u32, TextureTarget), TextureHandle>,
    framebuffer: Option<FramebufferHandle>,
    renderbuffer: Option<RenderbufferHandle>,
    program: Option<ProgramHandle>,

    calls: Vec<DeviceCall>,
    errors: Vec<String>,
}

impl HeadlessState {
    fn new() -> Self {
        let limits = HashMap::from([
            (Limit::MaxTextureSize, 4096),
            (Limit::MaxCubeMapTextureSize, 4096),
            (Limit::MaxRenderbufferSize, 4096),
            (Limit::MaxTextureImageUnits, 16),
            (Limit::MaxVertexTextureImageUnits, 16),
            (Limit::MaxCombinedTextureImageUnits, 32),
            (Limit::MaxVertexAttribs, 16),
            (Limit::MaxVertexUniformVectors, 1024),
            (Limit::MaxFragmentUniformVectors, 1024),
            (Limit::MaxVaryingVectors, 15),
            (Limit::MaxSamples, 4),
            (Limit::MaxAnisotropy, 16),
        ]);
        let extensions = [
            "EXT_color_buffer_float",
            "EXT_color_buffer_half_float",
            "EXT_float_blend",
            "EXT_texture_filter_anisotropic",
            "OES_texture_float_linear",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            limits,
            extensions,
            max_precision: Precision::High,
            drawing_buffer_size: (800, 600),
            lost: false,
            failing_allocations: 0,
            next_handle: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            renderbuffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            array_buffer: None,
            element_buffer: None,
            active_unit: 0,
            bound_textures: HashMap::new(),
            framebuffer: None,
            renderbuffer: None,
            program: None,
            calls: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn next_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn limit(&self, limit: Limit) -> u32 {
        self.limits.get(&limit).copied().unwrap_or(0)
    }

    fn error(&mut self, message: String) {
        log::trace!("Headless device error: {message}");
        self.errors.push(message);
    }

    fn take_allocation_failure(&mut self) -> bool {
        if self.failing_allocations > 0 {
            self.failing_allocations -= 1;
            true
        } else {
            false
        }
    }

    fn bound_buffer(&self, target: BufferTarget) -> Option<BufferHandle> {
        match target {
            BufferTarget::Array => self.array_buffer,
            BufferTarget::ElementArray => self.element_buffer,
        }
    }

    fn bound_texture(&self, target: TextureTarget) -> Option<TextureHandle> {
        self.bound_textures
            .get(&(self.active_unit, target))
            .copied()
    }

    fn attachment_size(&self, attachment: &Attachment) -> Option<(u32, u32)> {
        match *attachment {
            Attachment::Texture {
                texture,
                target,
                level,
            } => self
                .textures
                .get(&texture.0)?
                .levels
                .get(&(target, level))
                .copied(),
            Attachment::Renderbuffer(rb) => self
                .renderbuffers
                .get(&rb.0)?
                .storage
                .map(|(_, w, h)| (w, h)),
        }
    }

    fn framebuffer_status(&self) -> FramebufferStatus {
        let Some(handle) = self.framebuffer else {
            return FramebufferStatus::Complete;
        };
        let Some(framebuffer) = self.framebuffers.get(&handle.0) else {
            return FramebufferStatus::Unsupported;
        };
        if framebuffer.attachments.is_empty() {
            return FramebufferStatus::IncompleteMissingAttachment;
        }
        let mut size = None;
        for attachment in framebuffer.attachments.values() {
            let Some(attachment_size) = self.attachment_size(attachment) else {
                return FramebufferStatus::IncompleteAttachment;
            };
            match size {
                None => size = Some(attachment_size),
                Some(s) if s != attachment_size => {
                    return FramebufferStatus::IncompleteDimensions
                }
                _ => {}
            }
        }
        FramebufferStatus::Complete
    }

    fn link(&self, vertex: ShaderHandle, fragment: ShaderHandle) -> ProgramObject {
        let (Some(vs), Some(fs)) = (self.shaders.get(&vertex.0), self.shaders.get(&fragment.0))
        else {
            return ProgramObject::failed("ERROR: invalid shader object attached".to_string());
        };
        if !vs.compiled || !fs.compiled {
            return ProgramObject::failed(
                "ERROR: One or more attached shaders not successfully compiled".to_string(),
            );
        }

        let mut uniforms: Vec<ActiveUniform> = Vec::new();
        let mut next_location = 0;
        for decl in vs.uniforms.iter().chain(&fs.uniforms) {
            if uniforms.iter().any(|u| u.name == decl.name) {
                continue;
            }
            uniforms.push(ActiveUniform {
                name: decl.name.clone(),
                ty: decl.ty,
                size: decl.size,
                location: UniformLocation(next_location),
            });
            next_location += decl.size;
        }

        let mut attributes = Vec::new();
        let mut next_attribute = 0;
        for decl in &vs.attributes {
            let attribute = ActiveAttribute {
                name: decl.name.clone(),
                ty: decl.ty,
                location: next_attribute,
            };
            next_attribute += attribute.location_count();
            attributes.push(attribute);
        }

        ProgramObject {
            linked: true,
            log: String::new(),
            uniforms,
            attributes,
            values: HashMap::new(),
        }
    }
}

impl ProgramObject {
    fn failed(log: String) -> Self {
        Self {
            linked: false,
            log,
            uniforms: Vec::new(),
            attributes: Vec::new(),
            values: HashMap::new(),
        }
    }
}

/// A graphics device that executes nothing on a GPU.
///
/// `HeadlessDevice` simulates a GL context well enough to drive the renderer without
/// a window: it hands out object handles, validates uploads against its limits,
/// compiles shader sources with a small GLSL front end (so `#error` and missing
/// `main` fail like a driver would), reflects uniforms and attributes, checks
/// framebuffer completeness and records every call for inspection.
///
/// The handle is cheap to clone; all clones share one context. Tests keep a clone
/// after handing the device to the renderer to inspect the call log, lose and
/// restore the context, or inject allocation failures.
#[derive(Clone, Debug)]
pub struct HeadlessDevice {
    state: Arc<Mutex<HeadlessState>>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Creates a device with WebGL2-like limits and a drawing buffer of 800x600.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HeadlessState::new())),
        }
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs a mutating operation unless the context is lost, recording `call` first.
    fn record(&self, call: DeviceCall, operation: impl FnOnce(&mut HeadlessState)) {
        let mut state = self.state();
        if state.lost {
            return;
        }
        state.calls.push(call);
        operation(&mut state);
    }

    // --- Configuration ---

    /// Overrides a limit.
    pub fn with_limit(self, limit: Limit, value: u32) -> Self {
        self.set_limit(limit, value);
        self
    }

    /// Adds a supported extension.
    pub fn with_extension(self, name: &str) -> Self {
        self.state().extensions.insert(name.to_string());
        self
    }

    /// Removes a supported extension.
    pub fn without_extension(self, name: &str) -> Self {
        self.state().extensions.remove(name);
        self
    }

    /// Caps the shader precision the device reports as supported.
    pub fn with_max_precision(self, precision: Precision) -> Self {
        self.state().max_precision = precision;
        self
    }

    /// Sets the size of the default framebuffer.
    pub fn with_drawing_buffer_size(self, width: u32, height: u32) -> Self {
        self.state().drawing_buffer_size = (width, height);
        self
    }

    /// Overrides a limit on a live device.
    pub fn set_limit(&self, limit: Limit, value: u32) {
        self.state().limits.insert(limit, value);
    }

    // --- Context simulation ---

    /// Loses the context. Every object becomes invalid and calls are ignored.
    pub fn lose_context(&self) {
        let mut state = self.state();
        state.lost = true;
        log::info!("Headless context lost.");
    }

    /// Restores a lost context. The new context starts empty, in its default state.
    pub fn restore_context(&self) {
        let mut state = self.state();
        if !state.lost {
            return;
        }
        state.lost = false;
        state.buffers.clear();
        state.textures.clear();
        state.framebuffers.clear();
        state.renderbuffers.clear();
        state.shaders.clear();
        state.programs.clear();
        state.array_buffer = None;
        state.element_buffer = None;
        state.active_unit = 0;
        state.bound_textures.clear();
        state.framebuffer = None;
        state.renderbuffer = None;
        state.program = None;
        log::info!("Headless context restored.");
    }

    /// Makes the next `count` storage allocations (buffer data, texture images,
    /// renderbuffer storage) fail.
    pub fn fail_next_allocations(&self, count: u32) {
        self.state().failing_allocations = count;
    }

    // --- Inspection ---

    /// A copy of the call log.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state().calls.clone()
    }

    /// Takes the call log, leaving it empty.
    pub fn take_calls(&self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.state().calls)
    }

    /// Empties the call log.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count_calls(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    /// The recorded draw calls.
    pub fn draw_calls(&self) -> Vec<DeviceCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.is_draw())
            .cloned()
            .collect()
    }

    /// Misuse detected by the device (the equivalent of GL errors).
    pub fn errors(&self) -> Vec<String> {
        self.state().errors.clone()
    }

    /// Live buffer objects.
    pub fn live_buffers(&self) -> usize {
        self.state().buffers.len()
    }

    /// Live texture objects.
    pub fn live_textures(&self) -> usize {
        self.state().textures.len()
    }

    /// Live framebuffer objects.
    pub fn live_framebuffers(&self) -> usize {
        self.state().framebuffers.len()
    }

    /// Live renderbuffer objects.
    pub fn live_renderbuffers(&self) -> usize {
        self.state().renderbuffers.len()
    }

    /// Live program objects.
    pub fn live_programs(&self) -> usize {
        self.state().programs.len()
    }

    /// The program currently in use.
    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.state().program
    }

    /// The framebuffer currently bound.
    pub fn current_framebuffer(&self) -> Option<FramebufferHandle> {
        self.state().framebuffer
    }

    /// The last value uploaded to a named uniform of a program.
    pub fn uniform_value(&self, program: ProgramHandle, name: &str) -> Option<UniformValue> {
        let state = self.state();
        let object = state.programs.get(&program.0)?;
        let uniform = object.uniforms.iter().find(|u| u.name == name)?;
        object.values.get(&uniform.location).cloned()
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    // --- Context ---

    fn is_context_lost(&self) -> bool {
        self.state().lost
    }

    fn get_limit(&self, limit: Limit) -> u32 {
        self.state().limit(limit)
    }

    fn has_extension(&self, name: &str) -> bool {
        self.state().extensions.contains(name)
    }

    fn supports_precision(&self, _stage: ShaderStage, precision: Precision) -> bool {
        precision <= self.state().max_precision
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        self.state().drawing_buffer_size
    }

    // --- Buffers ---

    fn create_buffer(&mut self) -> Result<BufferHandle, ResourceError> {
        let mut state = self.state();
        if state.lost {
            return Err(ResourceError::ContextLost);
        }
        let handle = BufferHandle(state.next_handle());
        state.buffers.insert(handle.0, BufferObject { size: 0 });
        state.calls.push(DeviceCall::CreateBuffer(handle));
        Ok(handle)
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.record(DeviceCall::DeleteBuffer(buffer), |state| {
            state.buffers.remove(&buffer.0);
            if state.array_buffer == Some(buffer) {
                state.array_buffer = None;
            }
            if state.element_buffer == Some(buffer) {
                state.element_buffer = None;
            }
        });
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>) {
        self.record(DeviceCall::BindBuffer(target, buffer), |state| {
            if let Some(b) = buffer {
                if !state.buffers.contains_key(&b.0) {
                    state.error(format!("bind_buffer: unknown buffer {b:?}"));
                    return;
                }
            }
            match target {
                BufferTarget::Array => state.array_buffer = buffer,
                BufferTarget::ElementArray => state.element_buffer = buffer,
            }
        });
    }

    fn buffer_data(
        &mut self,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<(), ResourceError> {
        let mut state = self.state();
        if state.lost {
            return Err(ResourceError::ContextLost);
        }
        state.calls.push(DeviceCall::BufferData {
            target,
            size: data.len(),
            usage,
        });
        let Some(bound) = state.bound_buffer(target) else {
            state.error(format!("buffer_data: no buffer bound to {target:?}"));
            return Err(ResourceError::InvalidHandle);
        };
        if state.take_allocation_failure() {
            return Err(ResourceError::AllocationFailed(format!(
                "out of memory allocating {} bytes",
                data.len()
            )));
        }
        if let Some(object) = state.buffers.get_mut(&bound.0) {
            object.size = data.len();
        }
        Ok(())
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, byte_offset: usize, data: &[u8]) {
        self.record(
            DeviceCall::BufferSubData {
                target,
                offset: byte_offset,
                size: data.len(),
            },
            |state| {
                let size = state
                    .bound_buffer(target)
                    .and_then(|b| state.buffers.get(&b.0))
                    .map(|o| o.size);
                match size {
                    None => state.error(format!("buffer_sub_data: no buffer bound to {target:?}")),
                    Some(size) if byte_offset + data.len() > size => state.error(format!(
                        "buffer_sub_data: range {}..{} exceeds buffer size {size}",
                        byte_offset,
                        byte_offset + data.len()
                    )),
                    _ => {}
                }
            },
        );
    }

    // --- Textures ---

    fn create_texture(&mut self) -> Result<TextureHandle, ResourceError> {
        let mut state = self.state();
        if state.lost {
            return Err(ResourceError::ContextLost);
        }
        let handle = TextureHandle(state.next_handle());
        state.textures.insert(handle.0, TextureObject::default());
        state.calls.push(DeviceCall::CreateTexture(handle));
        Ok(handle)
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.record(DeviceCall::DeleteTexture(texture), |state| {
            state.textures.remove(&texture.0);
            state.bound_textures.retain(|_, bound| *bound != texture);
        });
    }

    fn active_texture(&mut self, unit: u32) {
        self.record(DeviceCall::ActiveTexture(unit), |state| {
            if unit >= state.limit(Limit::MaxCombinedTextureImageUnits) {
                state.error(format!("active_texture: unit {unit} out of range"));
                return;
            }
            state.active_unit = unit;
        });
    }

    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureHandle>) {
        self.record(DeviceCall::BindTexture(target, texture), |state| {
            let unit = state.active_unit;
            let Some(handle) = texture else {
                state.bound_textures.remove(&(unit, target));
                return;
            };
            let Some(object) = state.textures.get_mut(&handle.0) else {
                state.error(format!("bind_texture: unknown texture {handle:?}"));
                return;
            };
            match object.target {
                Some(existing) if existing != target => {
                    state.error(format!(
                        "bind_texture: {handle:?} is a {existing:?}, not a {target:?}"
                    ));
                    return;
                }
                _ => object.target = Some(target),
            }
            state.bound_textures.insert((unit, target), handle);
        });
    }

    fn set_unpack_flip_y(&mut self, flip: bool) {
        self.record(DeviceCall::UnpackFlipY(flip), |_| {});
    }

    fn tex_image_2d(
        &mut self,
        target: TextureImageTarget,
        level: u32,
        desc: &TexImageDesc,
        data: Option<&[u8]>,
    ) -> Result<(), ResourceError> {
        let mut state = self.state();
        if state.lost {
            return Err(ResourceError::ContextLost);
        }
        state.calls.push(DeviceCall::TexImage2D {
            target,
            level,
            width: desc.width,
            height: desc.height,
            format: desc.format,
        });
        let Some(bound) = state.bound_texture(target.binding()) else {
            state.error(format!("tex_image_2d: no texture bound to {target:?}"));
            return Err(ResourceError::InvalidHandle);
        };
        let max = match target {
            TextureImageTarget::Texture2D => state.limit(Limit::MaxTextureSize),
            TextureImageTarget::CubeFace(_) => state.limit(Limit::MaxCubeMapTextureSize),
        };
        if desc.width > max || desc.height > max {
            return Err(ResourceError::TooLarge {
                width: desc.width,
                height: desc.height,
                max,
            });
        }
        if let Some(data) = data {
            let expected = desc.byte_size();
            if data.len() != expected {
                return Err(ResourceError::BackendError(format!(
                    "tex_image_2d: expected {expected} bytes, got {}",
                    data.len()
                )));
            }
        }
        if state.take_allocation_failure() {
            return Err(ResourceError::AllocationFailed(format!(
                "out of memory allocating a {}x{} image",
                desc.width, desc.height
            )));
        }
        if let Some(object) = state.textures.get_mut(&bound.0) {
            object.levels.insert((target, level), (desc.width, desc.height));
        }
        Ok(())
    }

    fn tex_sub_image_2d(
        &mut self,
        target: TextureImageTarget,
        level: u32,
        region: Rect,
        format: TextureFormat,
        data_type: DataType,
        data: &[u8],
    ) {
        self.record(
            DeviceCall::TexSubImage2D {
                target,
                level,
                region,
            },
            |state| {
                let size = state
                    .bound_texture(target.binding())
                    .and_then(|t| state.textures.get(&t.0))
                    .and_then(|o| o.levels.get(&(target, level)).copied());
                let Some((width, height)) = size else {
                    state.error(format!("tex_sub_image_2d: no storage for {target:?}"));
                    return;
                };
                let fits = region.x >= 0
                    && region.y >= 0
                    && (region.x + region.width) as u32 <= width
                    && (region.y + region.height) as u32 <= height;
                let expected = format.image_byte_size(
                    region.width.max(0) as u32,
                    region.height.max(0) as u32,
                    data_type,
                );
                if !fits || data.len() != expected {
                    state.error(format!("tex_sub_image_2d: invalid region {region:?}"));
                }
            },
        );
    }

    fn tex_parameters(&mut self, target: TextureTarget, params: &SamplerParams) {
        self.record(DeviceCall::TexParameters(target, *params), |state| {
            if state.bound_texture(target).is_none() {
                state.error(format!("tex_parameters: no texture bound to {target:?}"));
            }
        });
    }

    fn generate_mipmap(&mut self, target: TextureTarget) {
        self.record(DeviceCall::GenerateMipmap(target), |state| {
            if state.bound_texture(target).is_none() {
                state.error(format!("generate_mipmap: no texture bound to {target:?}"));
            }
        });
    }

    // --- Framebuffers ---

    fn create_framebuffer(&mut self) -> Result<FramebufferHandle, ResourceError> {
        let mut state = self.state();
        if state.lost {
            return Err(ResourceError::ContextLost);
        }
        let handle = FramebufferHandle(state.next_handle());
        state
            .framebuffers
            .insert(handle.0, FramebufferObject::default());
        state.calls.push(DeviceCall::CreateFramebuffer(handle));
        Ok(handle)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.record(DeviceCall::DeleteFramebuffer(framebuffer), |state| {
            state.framebuffers.remove(&framebuffer.0);
            if state.framebuffer == Some(framebuffer) {
                state.framebuffer = None;
            }
        });
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.record(DeviceCall::BindFramebuffer(framebuffer), |state| {
            if let Some(fb) = framebuffer {
                if !state.framebuffers.contains_key(&fb.0) {
                    state.error(format!("bind_framebuffer: unknown framebuffer {fb:?}"));
                    return;
                }
            }
            state.framebuffer = framebuffer;
        });
    }

    fn framebuffer_texture_2d(
        &mut self,
        attachment: FramebufferAttachment,
        target: TextureImageTarget,
        texture: TextureHandle,
        level: u32,
    ) {
        self.record(
            DeviceCall::FramebufferTexture2D {
                attachment,
                target,
                texture,
                level,
            },
            |state| {
                let Some(fb) = state.framebuffer else {
                    state.error("framebuffer_texture_2d: default framebuffer bound".into());
                    return;
                };
                if let Some(object) = state.framebuffers.get_mut(&fb.0) {
                    object.attachments.insert(
                        attachment,
                        Attachment::Texture {
                            texture,
                            target,
                            level,
                        },
                    );
                }
            },
        );
    }

    fn create_renderbuffer(&mut self) -> Result<RenderbufferHandle, ResourceError> {
        let mut state = self.state();
        if state.lost {
            return Err(ResourceError::ContextLost);
        }
        let handle = RenderbufferHandle(state.next_handle());
        state
            .renderbuffers
            .insert(handle.0, RenderbufferObject::default());
        state.calls.push(DeviceCall::CreateRenderbuffer(handle));
        Ok(handle)
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        self.record(DeviceCall::DeleteRenderbuffer(renderbuffer), |state| {
            state.renderbuffers.remove(&renderbuffer.0);
            if state.renderbuffer == Some(renderbuffer) {
                state.renderbuffer = None;
            }
        });
    }

    fn bind_renderbuffer(&mut self, renderbuffer: Option<RenderbufferHandle>) {
        self.record(DeviceCall::BindRenderbuffer(renderbuffer), |state| {
            state.renderbuffer = renderbuffer;
        });
    }

    fn renderbuffer_storage(
        &mut self,
        format: RenderbufferFormat,
        width: u32,
        height: u32,
    ) -> Result<(), ResourceError> {
        let mut state = self.state();
        if state.lost {
            return Err(ResourceError::ContextLost);
        }
        state.calls.push(DeviceCall::RenderbufferStorage {
            format,
            width,
            height,
        });
        let Some(bound) = state.renderbuffer else {
            state.error("renderbuffer_storage: no renderbuffer bound".into());
            return Err(ResourceError::InvalidHandle);
        };
        let max = state.limit(Limit::MaxRenderbufferSize);
        if width > max || height > max {
            return Err(ResourceError::TooLarge { width, height, max });
        }
        if state.take_allocation_failure() {
            return Err(ResourceError::AllocationFailed(format!(
                "out of memory allocating a {width}x{height} renderbuffer"
            )));
        }
        if let Some(object) = state.renderbuffers.get_mut(&bound.0) {
            object.storage = Some((format, width, height));
        }
        Ok(())
    }

    fn framebuffer_renderbuffer(
        &mut self,
        attachment: FramebufferAttachment,
        renderbuffer: RenderbufferHandle,
    ) {
        self.record(
            DeviceCall::FramebufferRenderbuffer(attachment, renderbuffer),
            |state| {
                let Some(fb) = state.framebuffer else {
                    state.error("framebuffer_renderbuffer: default framebuffer bound".into());
                    return;
                };
                if let Some(object) = state.framebuffers.get_mut(&fb.0) {
                    object
                        .attachments
                        .insert(attachment, Attachment::Renderbuffer(renderbuffer));
                }
            },
        );
    }

    fn check_framebuffer_status(&self) -> FramebufferStatus {
        let state = self.state();
        if state.lost {
            return FramebufferStatus::Unsupported;
        }
        state.framebuffer_status()
    }

    // --- Shaders and programs ---

    fn create_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderHandle, ResourceError> {
        let mut state = self.state();
        if state.lost {
            return Err(ResourceError::ContextLost);
        }
        let handle = ShaderHandle(state.next_handle());
        let analysis = glsl::analyse(stage, source);
        state.shaders.insert(
            handle.0,
            ShaderObject {
                compiled: analysis.compiled,
                log: analysis.log,
                uniforms: analysis.uniforms,
                attributes: analysis.attributes,
            },
        );
        state.calls.push(DeviceCall::CreateShader(stage, handle));
        Ok(handle)
    }

    fn shader_compile_status(&self, shader: ShaderHandle) -> bool {
        self.state()
            .shaders
            .get(&shader.0)
            .is_some_and(|s| s.compiled)
    }

    fn shader_info_log(&self, shader: ShaderHandle) -> String {
        self.state()
            .shaders
            .get(&shader.0)
            .map(|s| s.log.clone())
            .unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        self.record(DeviceCall::DeleteShader(shader), |state| {
            state.shaders.remove(&shader.0);
        });
    }

    fn create_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, ResourceError> {
        let mut state = self.state();
        if state.lost {
            return Err(ResourceError::ContextLost);
        }
        let handle = ProgramHandle(state.next_handle());
        let program = state.link(vertex, fragment);
        state.programs.insert(handle.0, program);
        state.calls.push(DeviceCall::CreateProgram(handle));
        Ok(handle)
    }

    fn program_link_status(&self, program: ProgramHandle) -> bool {
        self.state()
            .programs
            .get(&program.0)
            .is_some_and(|p| p.linked)
    }

    fn program_info_log(&self, program: ProgramHandle) -> String {
        self.state()
            .programs
            .get(&program.0)
            .map(|p| p.log.clone())
            .unwrap_or_default()
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.record(DeviceCall::DeleteProgram(program), |state| {
            state.programs.remove(&program.0);
            if state.program == Some(program) {
                state.program = None;
            }
        });
    }

    fn active_uniforms(&self, program: ProgramHandle) -> Vec<ActiveUniform> {
        self.state()
            .programs
            .get(&program.0)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn active_attributes(&self, program: ProgramHandle) -> Vec<ActiveAttribute> {
        self.state()
            .programs
            .get(&program.0)
            .map(|p| p.attributes.clone())
            .unwrap_or_default()
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.record(DeviceCall::UseProgram(program), |state| {
            if let Some(p) = program {
                if !state.programs.contains_key(&p.0) {
                    state.error(format!("use_program: unknown program {p:?}"));
                    return;
                }
            }
            state.program = program;
        });
    }

    fn uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        self.record(DeviceCall::Uniform(location, value.clone()), |state| {
            let Some(program) = state.program else {
                state.error("uniform: no program in use".into());
                return;
            };
            let known = state.programs.get(&program.0).is_some_and(|p| {
                p.uniforms.iter().any(|u| {
                    location.0 >= u.location.0 && location.0 < u.location.0 + u.size
                })
            });
            if !known {
                state.error(format!("uniform: no uniform at {location:?} in {program:?}"));
                return;
            }
            if let Some(object) = state.programs.get_mut(&program.0) {
                object.values.insert(location, value.clone());
            }
        });
    }

    // --- Vertex input ---

    fn enable_vertex_attrib_array(&mut self, location: u32) {
        self.record(DeviceCall::EnableVertexAttribArray(location), |state| {
            if location >= state.limit(Limit::MaxVertexAttribs) {
                state.error(format!("enable_vertex_attrib_array: {location} out of range"));
            }
        });
    }

    fn disable_vertex_attrib_array(&mut self, location: u32) {
        self.record(DeviceCall::DisableVertexAttribArray(location), |_| {});
    }

    fn vertex_attrib_pointer(&mut self, location: u32, layout: &VertexAttribLayout) {
        self.record(DeviceCall::VertexAttribPointer(location, *layout), |state| {
            if state.array_buffer.is_none() {
                state.error(format!("vertex_attrib_pointer: no array buffer for {location}"));
            }
        });
    }

    fn vertex_attrib_divisor(&mut self, location: u32, divisor: u32) {
        self.record(DeviceCall::VertexAttribDivisor(location, divisor), |_| {});
    }

    // --- Fixed-function state ---

    fn enable(&mut self, capability: Capability) {
        self.record(DeviceCall::Enable(capability), |_| {});
    }

    fn disable(&mut self, capability: Capability) {
        self.record(DeviceCall::Disable(capability), |_| {});
    }

    fn blend_equation_separate(&mut self, color: BlendEquation, alpha: BlendEquation) {
        self.record(DeviceCall::BlendEquation(color, alpha), |_| {});
    }

    fn blend_func_separate(
        &mut self,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.record(
            DeviceCall::BlendFunc(src_color, dst_color, src_alpha, dst_alpha),
            |_| {},
        );
    }

    fn depth_func(&mut self, func: CompareFunction) {
        self.record(DeviceCall::DepthFunc(func), |_| {});
    }

    fn depth_mask(&mut self, write: bool) {
        self.record(DeviceCall::DepthMask(write), |_| {});
    }

    fn color_mask(&mut self, mask: ColorMask) {
        self.record(DeviceCall::ColorMask(mask), |_| {});
    }

    fn stencil_func(&mut self, func: CompareFunction, reference: i32, mask: u32) {
        self.record(DeviceCall::StencilFunc(func, reference, mask), |_| {});
    }

    fn stencil_op(
        &mut self,
        fail: StencilOperation,
        depth_fail: StencilOperation,
        pass: StencilOperation,
    ) {
        self.record(DeviceCall::StencilOp(fail, depth_fail, pass), |_| {});
    }

    fn stencil_mask(&mut self, mask: u32) {
        self.record(DeviceCall::StencilMask(mask), |_| {});
    }

    fn cull_face(&mut self, face: CullFace) {
        self.record(DeviceCall::CullFace(face), |_| {});
    }

    fn front_face(&mut self, face: FrontFace) {
        self.record(DeviceCall::FrontFace(face), |_| {});
    }

    fn polygon_offset(&mut self, factor: f32, units: f32) {
        self.record(DeviceCall::PolygonOffset(factor, units), |_| {});
    }

    fn line_width(&mut self, width: f32) {
        self.record(DeviceCall::LineWidth(width), |_| {});
    }

    fn viewport(&mut self, rect: Rect) {
        self.record(DeviceCall::Viewport(rect), |_| {});
    }

    fn scissor(&mut self, rect: Rect) {
        self.record(DeviceCall::Scissor(rect), |_| {});
    }

    // --- Clears ---

    fn clear_color(&mut self, rgba: [f32; 4]) {
        self.record(DeviceCall::ClearColor(rgba), |_| {});
    }

    fn clear_depth(&mut self, depth: f32) {
        self.record(DeviceCall::ClearDepth(depth), |_| {});
    }

    fn clear_stencil(&mut self, stencil: i32) {
        self.record(DeviceCall::ClearStencil(stencil), |_| {});
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.record(DeviceCall::Clear(flags), |state| {
            if state.framebuffer_status() != FramebufferStatus::Complete {
                state.error("clear: framebuffer incomplete".into());
            }
        });
    }

    // --- Draws ---

    fn draw_arrays(&mut self, mode: PrimitiveMode, first: u32, count: u32, instances: u32) {
        self.record(
            DeviceCall::DrawArrays {
                mode,
                first,
                count,
                instances,
            },
            |state| check_draw(state, "draw_arrays"),
        );
    }

    fn draw_elements(
        &mut self,
        mode: PrimitiveMode,
        count: u32,
        index_type: IndexType,
        byte_offset: usize,
        instances: u32,
    ) {
        self.record(
            DeviceCall::DrawElements {
                mode,
                count,
                index_type,
                offset: byte_offset,
                instances,
            },
            |state| {
                check_draw(state, "draw_elements");
                if state.element_buffer.is_none() {
                    state.error("draw_elements: no element buffer bound".into());
                }
            },
        );
    }
}

fn check_draw(state: &mut HeadlessState, what: &str) {
    let linked = state
        .program
        .and_then(|p| state.programs.get(&p.0))
        .is_some_and(|p| p.linked);
    if !linked {
        state.error(format!("{what}: no linked program in use"));
    }
    if state.framebuffer_status() != FramebufferStatus::Complete {
        state.error(format!("{what}: framebuffer incomplete"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "uniform mat4 modelMatrix;\nin vec3 position;\nin mat4 instanceMatrix;\nvoid main() {}\n";
    const FS: &str = "uniform vec3 diffuse;\nuniform float weights[ 4 ];\nvoid main() {}\n";

    #[test]
    fn test_program_reflection_and_uniform_values() {
        // --- 1. ARRANGE ---
        let mut device = HeadlessDevice::new();
        let vs = device.create_shader(ShaderStage::Vertex, VS).unwrap();
        let fs = device.create_shader(ShaderStage::Fragment, FS).unwrap();

        // --- 2. ACT ---
        let program = device.create_program(vs, fs).unwrap();
        device.use_program(Some(program));
        let uniforms = device.active_uniforms(program);
        let diffuse = uniforms.iter().find(|u| u.name == "diffuse").unwrap();
        device.uniform(diffuse.location, &UniformValue::Float(0.5));

        // --- 3. ASSERT ---
        assert!(device.program_link_status(program));
        assert_eq!(uniforms.len(), 3);
        assert_eq!(uniforms[2].size, 4);
        let attributes = device.active_attributes(program);
        assert_eq!(attributes[1].name, "instanceMatrix");
        assert_eq!(attributes[1].location, 1);
        assert_eq!(
            device.uniform_value(program, "diffuse"),
            Some(UniformValue::Float(0.5))
        );
        assert!(device.errors().is_empty());
    }

    #[test]
    fn test_failed_shader_fails_link() {
        let mut device = HeadlessDevice::new();
        let vs = device
            .create_shader(ShaderStage::Vertex, "void main() {}\n#error nope\n")
            .unwrap();
        let fs = device.create_shader(ShaderStage::Fragment, FS).unwrap();
        assert!(!device.shader_compile_status(vs));
        assert!(device.shader_info_log(vs).contains("nope"));
        let program = device.create_program(vs, fs).unwrap();
        assert!(!device.program_link_status(program));
    }

    #[test]
    fn test_lost_context_ignores_calls_and_restores_empty() {
        // --- 1. ARRANGE ---
        let mut device = HeadlessDevice::new();
        let observer = device.clone();
        device.create_buffer().unwrap();
        observer.lose_context();

        // --- 2. ACT ---
        let result = device.create_texture();
        device.viewport(Rect::new(0, 0, 1, 1));
        observer.restore_context();

        // --- 3. ASSERT ---
        assert!(matches!(result, Err(ResourceError::ContextLost)));
        assert_eq!(observer.call_count(), 1);
        assert_eq!(observer.live_buffers(), 0);
        assert!(!device.is_context_lost());
    }

    #[test]
    fn test_texture_limits_and_injected_failures() {
        let mut device = HeadlessDevice::new().with_limit(Limit::MaxTextureSize, 64);
        let texture = device.create_texture().unwrap();
        device.bind_texture(TextureTarget::Texture2D, Some(texture));
        let desc = |size| TexImageDesc {
            width: size,
            height: size,
            format: TextureFormat::Rgba,
            data_type: DataType::UnsignedByte,
        };

        let too_large = device.tex_image_2d(TextureImageTarget::Texture2D, 0, &desc(128), None);
        assert!(matches!(too_large, Err(ResourceError::TooLarge { max: 64, .. })));

        device.fail_next_allocations(1);
        let failed = device.tex_image_2d(TextureImageTarget::Texture2D, 0, &desc(32), None);
        assert!(matches!(failed, Err(ResourceError::AllocationFailed(_))));
        assert!(device
            .tex_image_2d(TextureImageTarget::Texture2D, 0, &desc(32), None)
            .is_ok());
    }

    #[test]
    fn test_framebuffer_completeness() {
        let mut device = HeadlessDevice::new();
        let framebuffer = device.create_framebuffer().unwrap();
        device.bind_framebuffer(Some(framebuffer));
        assert_eq!(
            device.check_framebuffer_status(),
            FramebufferStatus::IncompleteMissingAttachment
        );

        let texture = device.create_texture().unwrap();
        device.bind_texture(TextureTarget::Texture2D, Some(texture));
        let desc = TexImageDesc {
            width: 16,
            height: 16,
            format: TextureFormat::Rgba,
            data_type: DataType::UnsignedByte,
        };
        device
            .tex_image_2d(TextureImageTarget::Texture2D, 0, &desc, None)
            .unwrap();
        device.framebuffer_texture_2d(
            FramebufferAttachment::Color(0),
            TextureImageTarget::Texture2D,
            texture,
            0,
        );
        assert_eq!(device.check_framebuffer_status(), FramebufferStatus::Complete);

        let renderbuffer = device.create_renderbuffer().unwrap();
        device.bind_renderbuffer(Some(renderbuffer));
        device
            .renderbuffer_storage(RenderbufferFormat::DepthComponent16, 8, 8)
            .unwrap();
        device.framebuffer_renderbuffer(FramebufferAttachment::Depth, renderbuffer);
        assert_eq!(
            device.check_framebuffer_status(),
            FramebufferStatus::IncompleteDimensions
        );
    }
}
