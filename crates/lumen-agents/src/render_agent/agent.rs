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

//! Defines the [`Renderer`], the frame orchestrator that owns the device and every
//! table mirroring scene resources on it.

use super::draw::{DrawContext, ViewUniforms};
use super::gpu::GpuTables;
use super::lifecycle::Lifecycle;
use ahash::AHashSet;
use lumen_core::color::Color;
use lumen_core::renderer::{
    Capabilities, ClearFlags, ColorMask, DiagnosticKind, Diagnostics, GraphicsDevice, MinFilter,
    Rect, RenderError, RenderInfo, RendererSettings, ResourceError, CUBE_FACE_COUNT,
};
use lumen_core::resource::{
    Camera, Geometry, GeometryGroup, GeometryKey, LightShadow, MapSource, MaterialKey, ObjectKey,
    RenderTargetDescriptor, RenderTargetKey, TextureKey,
};
use lumen_data::{Assets, DisposeEvent, MaterialSlot, ObjectKind, Renderable, Scene, SceneId, StoreId};
use lumen_lanes::program_lane::ProgramId;
use lumen_lanes::render_lane::{
    LightInput, LightsState, RenderItem, RenderList, RenderLists, ShadowCaster, ShadowLight,
    ShadowPassLane, ShadowPassOutput,
};

/// The render target draws go to, with the face and mip level attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TargetBinding {
    key: RenderTargetKey,
    face: u32,
    level: u32,
}

/// What one traversal of the scene found.
#[derive(Debug, Default)]
struct Collected {
    lights: Vec<LightInput>,
    shadow_lights: Vec<ShadowLight>,
    casters: Vec<ShadowCaster>,
    // Some drawn object casts or receives shadows.
    shadow_items: bool,
    geometries: Vec<GeometryKey>,
    instanced: Vec<ObjectKey>,
    materials: Vec<MaterialKey>,
}

/// Turns scenes into draw calls on one graphics device.
///
/// The renderer owns every GPU-side table (buffers, textures, render targets,
/// programs), the pipeline-state mirror and the shadow pass. Each public entry
/// point runs to completion on the caller's thread and observes the context
/// lifecycle once, on entry.
pub struct Renderer {
    // The device every call goes through.
    device: Box<dyn GraphicsDevice>,
    // Configuration, read at the start of every frame.
    settings: RendererSettings,
    // Limits probed at creation and after every context restoration.
    capabilities: Capabilities,
    lifecycle: Lifecycle,
    // GPU tables and state mirrors.
    gpu: GpuTables,
    // Render lists, one per scene.
    lists: RenderLists,
    lights: LightsState,
    shadows: ShadowPassLane,
    diagnostics: Diagnostics,
    info: RenderInfo,
    // `None` draws to the default framebuffer.
    render_target: Option<TargetBinding>,
    // Viewport and scissor of the default framebuffer, in logical pixels.
    viewport: Option<Rect>,
    scissor: Option<Rect>,
    scissor_test: bool,
    // Opaque objects are rendered here before transmissive ones are drawn.
    transmission_target: Option<RenderTargetKey>,
    // The quad drawn by fullscreen passes.
    fullscreen: Geometry,
    // Programs already reported for running out of texture units.
    unit_warnings: AHashSet<ProgramId>,
    // The asset store this renderer is bound to, set on first use.
    store: Option<StoreId>,
    frame: u64,
}

impl Renderer {
    /// Creates a renderer drawing through `device`.
    ///
    /// Fails if `settings` does not validate.
    pub fn new(
        device: Box<dyn GraphicsDevice>,
        settings: RendererSettings,
    ) -> Result<Self, RenderError> {
        settings.validate()?;
        let capabilities = Capabilities::probe(device.as_ref(), &settings);
        let gpu = GpuTables::new(device.as_ref(), &settings);
        log::info!(
            "Renderer created: {} texture units, max texture size {}, {:?} precision.",
            capabilities.max_textures,
            capabilities.max_texture_size,
            capabilities.precision
        );
        Ok(Self {
            diagnostics: Diagnostics::new(settings.diagnostics_capacity),
            device,
            settings,
            capabilities,
            lifecycle: Lifecycle::Active,
            gpu,
            lists: RenderLists::new(),
            lights: LightsState::new(),
            shadows: ShadowPassLane::new(),
            info: RenderInfo::default(),
            render_target: None,
            viewport: None,
            scissor: None,
            scissor_test: false,
            transmission_target: None,
            fullscreen: Geometry::plane(2.0, 2.0),
            unit_warnings: AHashSet::new(),
            store: None,
            frame: 0,
        })
    }

    /// Renders `scene` as seen from `camera`.
    ///
    /// While the context is lost this does nothing. Degraded resources (a texture
    /// that cannot be uploaded, a shader that does not compile, a shadow map that
    /// cannot be allocated) are logged and recorded in [`diagnostics`](Self::diagnostics)
    /// and the frame goes on without them.
    pub fn render(
        &mut self,
        scene: &mut Scene,
        camera: &Camera,
        assets: &mut Assets,
    ) -> Result<(), RenderError> {
        self.check_store(assets)?;
        if !self.observe_context() {
            return Ok(());
        }
        match self.render_frame(scene, camera, assets) {
            Err(ResourceError::ContextLost) => {
                self.mark_lost();
                Ok(())
            }
            result => result.map_err(RenderError::from),
        }
    }

    fn render_frame(
        &mut self,
        scene: &mut Scene,
        camera: &Camera,
        assets: &mut Assets,
    ) -> Result<(), ResourceError> {
        // Step 1: counters, released scene buffers and world matrices.
        self.frame += 1;
        if self.settings.info_auto_reset {
            self.info.reset();
        }
        self.gpu
            .programs
            .set_check_errors(self.settings.check_shader_errors);
        let released = scene.drain_pending_disposals();
        self.gpu
            .dispose_attributes(self.device.as_mut(), &released, &mut self.info.memory);
        if scene.auto_update {
            scene.update_world_matrices();
        }
        compute_bounds(scene, assets);

        // Step 2: traverse, cull and fill the render list.
        let scene_id = scene.id();
        let mut list = self.lists.take(scene_id, 0);
        list.init();
        let collected = collect(scene, camera, assets, true, &mut list);
        list.finish();
        if self.settings.sort_objects {
            list.sort(None, None);
        }

        let result = self.draw_frame(scene, camera, assets, &list, collected);
        self.lists.restore(scene_id, 0, list);
        result?;

        self.info.render.frame += 1;
        self.info.programs = self.gpu.programs.len();
        Ok(())
    }

    fn draw_frame(
        &mut self,
        scene: &mut Scene,
        camera: &Camera,
        assets: &mut Assets,
        list: &RenderList,
        collected: Collected,
    ) -> Result<(), ResourceError> {
        // Step 3: bring buffers and textures up to date, once per frame.
        self.upload_geometries(scene, assets, &collected)?;
        self.upload_textures(assets, &collected.materials)?;

        // Step 4: shadow maps.
        let view = ViewUniforms::of_camera(camera);
        let mut shadow_lights = collected.shadow_lights;
        let mut output = ShadowPassOutput::default();
        if self.settings.shadow_map.enabled && !shadow_lights.is_empty() && collected.shadow_items {
            let settings = self.settings.shadow_map;
            let mut shadows = std::mem::take(&mut self.shadows);
            {
                let mut ctx = self.draw_context(scene, assets, view);
                output = shadows.render(
                    &mut ctx,
                    scene.id(),
                    &settings,
                    &mut shadow_lights,
                    &collected.casters,
                );
            }
            self.shadows = shadows;
            self.settings.shadow_map.needs_update = false;
            self.apply_shadow_output(scene, &output);
        }

        // Step 5: lights and the output target.
        self.lights.setup(&collected.lights, &output.shadows);
        self.lights.setup_view(&view.view);
        let Some(viewport) = self.bind_output()? else {
            return Ok(());
        };
        if self.settings.auto_clear || scene.background.is_some() {
            let (color, alpha) = match scene.background {
                Some(color) => (color, 1.0),
                None => (self.settings.clear_color, self.settings.clear_alpha),
            };
            let flags = if self.settings.auto_clear {
                ClearFlags::from_parts(
                    self.settings.auto_clear_color || scene.background.is_some(),
                    self.settings.auto_clear_depth,
                    self.settings.auto_clear_stencil,
                )
            } else {
                ClearFlags::COLOR
            };
            self.clear_buffers(rgba(color, alpha), flags);
        }

        // Step 6: what transmissive materials see through.
        let scene: &Scene = scene;
        let assets: &Assets = assets;
        let transmission = if list.transmissive().next().is_some() {
            self.render_transmission(scene, assets, list, view, viewport)?
        } else {
            None
        };

        // Step 7: the three buckets.
        {
            let mut ctx = self.draw_context(scene, assets, view);
            ctx.transmission = transmission;
            ctx.draw_list(list.opaque(), &view, false)?;
            ctx.draw_list(list.transmissive(), &view, true)?;
            ctx.draw_list(list.transparent(), &view, true)?;
        }

        // Step 8: mipmaps of the target drawn to.
        if let Some(binding) = self.render_target {
            self.gpu
                .targets
                .generate_mipmaps(self.device.as_mut(), &mut self.gpu.state, binding.key);
        }
        Ok(())
    }

    fn draw_context<'a>(
        &'a mut self,
        scene: &'a Scene,
        assets: &'a Assets,
        view: ViewUniforms,
    ) -> DrawContext<'a> {
        DrawContext {
            device: self.device.as_mut(),
            gpu: &mut self.gpu,
            settings: &self.settings,
            capabilities: &self.capabilities,
            lights: &self.lights,
            diagnostics: &mut self.diagnostics,
            info: &mut self.info,
            unit_warnings: &mut self.unit_warnings,
            assets,
            scene,
            fullscreen: Some(&mut self.fullscreen),
            fog: scene.fog,
            view,
            shadow_map_enabled: self.settings.shadow_map.enabled,
            render_target: self.render_target.is_some(),
            transmission: None,
            pass_source: None,
            side: None,
            frame: self.frame,
        }
    }

    fn upload_geometries(
        &mut self,
        scene: &mut Scene,
        assets: &mut Assets,
        collected: &Collected,
    ) -> Result<(), ResourceError> {
        let device = self.device.as_mut();
        let gpu = &mut self.gpu;
        let memory = &mut self.info.memory;
        for &key in &collected.geometries {
            let Some(geometry) = assets.geometry_mut(key) else {
                continue;
            };
            tolerate(
                gpu.geometries.update(
                    device,
                    &mut gpu.bindings,
                    &mut gpu.buffers,
                    key,
                    geometry,
                    self.frame,
                    memory,
                ),
                "Geometry upload",
            )?;
        }
        for &object in &collected.instanced {
            let Some(ObjectKind::InstancedMesh(instanced)) =
                scene.get_mut(object).map(|node| &mut node.kind)
            else {
                continue;
            };
            let attributes = std::iter::once(&mut instanced.instance_matrix)
                .chain(instanced.instance_color.as_mut());
            for attribute in attributes {
                tolerate(
                    gpu.geometries.update_instanced(
                        device,
                        &mut gpu.bindings,
                        &mut gpu.buffers,
                        attribute,
                        memory,
                    ),
                    "Instance attribute upload",
                )?;
            }
        }
        Ok(())
    }

    fn upload_textures(
        &mut self,
        assets: &mut Assets,
        materials: &[MaterialKey],
    ) -> Result<(), ResourceError> {
        let mut keys: Vec<TextureKey> = materials
            .iter()
            .filter_map(|&key| assets.material(key))
            .flat_map(|material| material.maps.iter())
            .filter_map(|(_, source)| match source {
                MapSource::Texture(key) => Some(key),
                MapSource::RenderTarget(_) => None,
            })
            .collect();
        keys.sort_unstable();
        keys.dedup();

        for key in keys {
            let Some(texture) = assets.texture_mut(key) else {
                continue;
            };
            let upload = tolerate(
                self.gpu.textures.upload(
                    self.device.as_mut(),
                    &mut self.gpu.state,
                    0,
                    &self.capabilities,
                    key,
                    texture,
                    &mut self.info.memory,
                ),
                "Texture upload",
            )?;
            if let Some(failure) = upload.and_then(|upload| upload.failure) {
                self.diagnostics.push(
                    self.frame,
                    DiagnosticKind::TextureFallback {
                        reason: failure.to_string(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Writes clamped sizes and redraw flags back to the lights and records what
    /// went wrong.
    fn apply_shadow_output(&mut self, scene: &mut Scene, output: &ShadowPassOutput) {
        for &(object, size) in &output.clamped {
            if let Some(shadow) = light_shadow_mut(scene, object) {
                shadow.map_size = size;
            }
        }
        for &object in &output.rendered {
            if let Some(shadow) = light_shadow_mut(scene, object) {
                shadow.needs_update = false;
            }
        }
        for &(requested, clamped) in &output.warnings {
            self.diagnostics.push(
                self.frame,
                DiagnosticKind::ShadowMapClamped {
                    requested: (requested.x, requested.y),
                    clamped: (clamped.x, clamped.y),
                },
            );
        }
        for (_, reason) in &output.failed {
            self.diagnostics.push(
                self.frame,
                DiagnosticKind::ShadowMapAllocationFailed {
                    reason: reason.clone(),
                },
            );
        }
    }

    /// Binds the current render target (or the default framebuffer) and sets the
    /// viewport and scissor. Returns the viewport, or `None` if the target cannot
    /// be drawn to.
    fn bind_output(&mut self) -> Result<Option<Rect>, ResourceError> {
        let device = self.device.as_mut();
        let gpu = &mut self.gpu;
        let (viewport, scissor) = match self.render_target {
            Some(binding) => {
                let bound = gpu.targets.bind_level(
                    device,
                    &mut gpu.state,
                    binding.key,
                    binding.face,
                    binding.level,
                    &mut self.info.memory,
                );
                let (width, height) = match bound {
                    Ok(size) => size,
                    Err(ResourceError::ContextLost) => return Err(ResourceError::ContextLost),
                    Err(error) => {
                        self.diagnostics.push(
                            self.frame,
                            DiagnosticKind::RenderTargetIncomplete {
                                reason: error.to_string(),
                            },
                        );
                        return Ok(None);
                    }
                };
                let full = Rect::new(0, 0, width as i32, height as i32);
                (full, full)
            }
            None => {
                gpu.state.bind_framebuffer(device, None);
                let (width, height) = device.drawing_buffer_size();
                let full = Rect::new(0, 0, width as i32, height as i32);
                let ratio = self.settings.pixel_ratio;
                (
                    self.viewport.map_or(full, |rect| rect.scaled(ratio)),
                    self.scissor.map_or(full, |rect| rect.scaled(ratio)),
                )
            }
        };
        gpu.state.set_viewport(device, viewport);
        gpu.state.set_scissor(device, scissor);
        gpu.state
            .set_scissor_test(device, self.scissor_test && self.render_target.is_none());
        Ok(Some(viewport))
    }

    fn clear_buffers(&mut self, color: [f32; 4], flags: ClearFlags) {
        if flags.is_empty() {
            return;
        }
        let device = self.device.as_mut();
        let state = &mut self.gpu.state;
        if flags.contains(ClearFlags::COLOR) {
            state.set_clear_color(device, color);
            state.set_color_mask(device, ColorMask::splat(true));
        }
        if flags.contains(ClearFlags::DEPTH) {
            state.set_clear_depth(device, 1.0);
            state.set_depth_mask(device, true);
        }
        if flags.contains(ClearFlags::STENCIL) {
            state.set_clear_stencil(device, 0);
            state.set_stencil_mask(device, u32::MAX);
        }
        device.clear(flags);
    }

    /// Renders the opaque bucket into the transmission target, then binds the
    /// output again.
    fn render_transmission(
        &mut self,
        scene: &Scene,
        assets: &Assets,
        list: &RenderList,
        view: ViewUniforms,
        viewport: Rect,
    ) -> Result<Option<RenderTargetKey>, ResourceError> {
        let width = viewport.width.max(1) as u32;
        let height = viewport.height.max(1) as u32;
        let key = match self.transmission_target {
            Some(key) if self.gpu.targets.contains(key) => key,
            _ => {
                let mut descriptor = RenderTargetDescriptor::new(width, height);
                descriptor.generate_mipmaps = true;
                descriptor.sampler.min_filter = MinFilter::LinearMipmapLinear;
                let key = self.gpu.targets.create(descriptor);
                self.transmission_target = Some(key);
                key
            }
        };

        let device = self.device.as_mut();
        let gpu = &mut self.gpu;
        let memory = &mut self.info.memory;
        gpu.targets
            .resize(device, &mut gpu.state, key, width, height, memory);
        match gpu.targets.bind(device, &mut gpu.state, key, 0, memory) {
            Ok(_) => {}
            Err(ResourceError::ContextLost) => return Err(ResourceError::ContextLost),
            Err(error) => {
                self.diagnostics.push(
                    self.frame,
                    DiagnosticKind::RenderTargetIncomplete {
                        reason: error.to_string(),
                    },
                );
                self.bind_output()?;
                return Ok(None);
            }
        }
        gpu.state
            .set_viewport(device, Rect::new(0, 0, width as i32, height as i32));
        gpu.state.set_scissor_test(device, false);
        self.clear_buffers([0.0; 4], ClearFlags::COLOR | ClearFlags::DEPTH);

        {
            let mut ctx = self.draw_context(scene, assets, view);
            ctx.render_target = true;
            ctx.draw_list(list.opaque(), &view, false)?;
        }
        self.gpu
            .targets
            .generate_mipmaps(self.device.as_mut(), &mut self.gpu.state, key);
        self.bind_output()?;
        Ok(Some(key))
    }

    /// Compiles the programs of every material reachable from the visible objects
    /// of `scene`, without drawing.
    ///
    /// Returns the number of programs created. Shadow-casting lights count as
    /// shadowed whenever the first frame would render their maps.
    pub fn compile(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        assets: &Assets,
    ) -> Result<usize, RenderError> {
        self.check_store(assets)?;
        if !self.observe_context() {
            return Ok(0);
        }
        let before = self.gpu.programs.len();
        let mut list = RenderList::new();
        let collected = collect(scene, camera, assets, false, &mut list);
        list.finish();
        let shadows_expected = self.settings.shadow_map.enabled
            && !collected.shadow_lights.is_empty()
            && collected.shadow_items;
        self.lights.setup_expected(&collected.lights, |input| {
            shadows_expected && input.light.casts_shadow()
        });

        let view = ViewUniforms::of_camera(camera);
        let result = {
            let mut ctx = self.draw_context(scene, assets, view);
            list.opaque()
                .chain(list.transmissive())
                .chain(list.transparent())
                .try_for_each(|item| ctx.prepare_item(item))
                .and_then(|()| {
                    // The transmission pass draws the opaque bucket offscreen.
                    if list.transmissive().next().is_none() || ctx.render_target {
                        return Ok(());
                    }
                    ctx.render_target = true;
                    list.opaque().try_for_each(|item| ctx.prepare_item(item))
                })
        };
        match result {
            Ok(()) => {}
            Err(ResourceError::ContextLost) => {
                self.mark_lost();
                return Ok(0);
            }
            Err(error) => return Err(error.into()),
        }
        self.info.programs = self.gpu.programs.len();
        Ok(self.gpu.programs.len().saturating_sub(before))
    }

    /// Directs the following frames to `target` (`None` for the default
    /// framebuffer), drawing into `face` of cube targets and mip `level`.
    pub fn set_render_target(
        &mut self,
        target: Option<RenderTargetKey>,
        face: u32,
        level: u32,
    ) -> Result<(), RenderError> {
        let Some(key) = target else {
            self.render_target = None;
            return Ok(());
        };
        let descriptor = self
            .gpu
            .targets
            .descriptor(key)
            .ok_or_else(|| RenderError::InvalidUsage(format!("unknown render target {key:?}")))?;
        let faces = if descriptor.cube { CUBE_FACE_COUNT } else { 1 };
        if face >= faces {
            return Err(RenderError::InvalidUsage(format!(
                "face {face} is out of range for a target with {faces} face(s)"
            )));
        }
        let levels = mip_levels(descriptor);
        if level >= levels {
            return Err(RenderError::InvalidUsage(format!(
                "mip level {level} is out of range for a target with {levels} level(s)"
            )));
        }
        self.render_target = Some(TargetBinding { key, face, level });
        Ok(())
    }

    /// The render target the next frame draws to.
    pub fn render_target(&self) -> Option<RenderTargetKey> {
        self.render_target.map(|binding| binding.key)
    }

    /// Sets the viewport of the default framebuffer, in logical pixels.
    pub fn set_viewport(&mut self, rect: Rect) {
        self.viewport = Some(rect);
    }

    /// Sets the scissor box of the default framebuffer, in logical pixels.
    pub fn set_scissor(&mut self, rect: Rect) {
        self.scissor = Some(rect);
    }

    /// Enables the scissor test on the default framebuffer.
    pub fn set_scissor_test(&mut self, enabled: bool) {
        self.scissor_test = enabled;
    }

    /// Sets the color used by automatic and explicit clears.
    pub fn set_clear_color(&mut self, color: Color, alpha: f32) {
        self.settings.clear_color = color;
        self.settings.clear_alpha = alpha;
    }

    /// Clears the buffers of the current target.
    pub fn clear(&mut self, color: bool, depth: bool, stencil: bool) -> Result<(), RenderError> {
        if !self.observe_context() {
            return Ok(());
        }
        match self.bind_output() {
            Ok(Some(_)) => {}
            Ok(None) => return Ok(()),
            Err(ResourceError::ContextLost) => {
                self.mark_lost();
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        }
        let clear = rgba(self.settings.clear_color, self.settings.clear_alpha);
        self.clear_buffers(clear, ClearFlags::from_parts(color, depth, stencil));
        Ok(())
    }

    /// Registers a render target. Device objects are allocated on first use.
    pub fn create_render_target(&mut self, descriptor: RenderTargetDescriptor) -> RenderTargetKey {
        self.gpu.targets.create(descriptor)
    }

    /// The description of a render target.
    pub fn render_target_descriptor(&self, key: RenderTargetKey) -> Option<&RenderTargetDescriptor> {
        self.gpu.targets.descriptor(key)
    }

    /// Changes the size of a render target, freeing its device objects.
    pub fn resize_render_target(
        &mut self,
        key: RenderTargetKey,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        let gpu = &mut self.gpu;
        let known = gpu.targets.resize(
            self.device.as_mut(),
            &mut gpu.state,
            key,
            width,
            height,
            &mut self.info.memory,
        );
        if !known {
            return Err(RenderError::InvalidUsage(format!(
                "unknown render target {key:?}"
            )));
        }
        if let Some(binding) = self.render_target.filter(|binding| binding.key == key) {
            let levels = self.gpu.targets.descriptor(key).map_or(1, mip_levels);
            if binding.level >= levels {
                self.render_target = Some(TargetBinding { level: 0, ..binding });
            }
        }
        Ok(())
    }

    /// Deletes a render target. Returns `false` if it was unknown.
    pub fn dispose_render_target(&mut self, key: RenderTargetKey) -> bool {
        if self.render_target.is_some_and(|binding| binding.key == key) {
            self.render_target = None;
        }
        let gpu = &mut self.gpu;
        gpu.targets
            .remove(self.device.as_mut(), &mut gpu.state, key, &mut self.info.memory)
    }

    /// Frees the GPU state of every asset disposed since the last call.
    ///
    /// Returns the number of dispose events handled.
    pub fn collect_garbage(&mut self, assets: &mut Assets) -> usize {
        let events: Vec<DisposeEvent> = assets.drain_dispose_events().collect();
        let device = self.device.as_mut();
        let memory = &mut self.info.memory;
        for event in &events {
            match event {
                DisposeEvent::Geometry { key, attributes } => {
                    self.gpu.dispose_geometry(device, *key, memory);
                    self.gpu.dispose_attributes(device, attributes, memory);
                }
                DisposeEvent::Material { id, .. } => {
                    let mut released = self.gpu.dispose_material(device, *id);
                    for substitute in self.shadows.forget_material(*id) {
                        released += self.gpu.dispose_material(device, substitute);
                    }
                    if released > 0 {
                        log::debug!("Released {released} program(s) of material {id:?}.");
                    }
                }
                DisposeEvent::Texture { key } => self.gpu.dispose_texture(device, *key, memory),
            }
        }
        self.info.programs = self.gpu.programs.len();
        events.len()
    }

    /// Releases every GPU resource. The renderer stays usable and recreates what
    /// the next frame needs.
    pub fn dispose(&mut self) {
        let scene = Scene::new();
        let assets = Assets::new();
        let mut shadows = std::mem::take(&mut self.shadows);
        let materials = {
            let mut ctx = self.draw_context(&scene, &assets, ViewUniforms::default());
            shadows.dispose(&mut ctx)
        };
        self.shadows = shadows;

        let device = self.device.as_mut();
        for id in materials {
            self.gpu.dispose_material(device, id);
        }
        if let Some(key) = self.transmission_target.take() {
            let gpu = &mut self.gpu;
            gpu.targets
                .remove(device, &mut gpu.state, key, &mut self.info.memory);
        }
        self.gpu.dispose(device, &mut self.info.memory);
        self.lists.dispose();
        self.unit_warnings.clear();
        self.render_target = None;
        self.info.programs = self.gpu.programs.len();
        log::info!("Renderer disposed.");
    }

    /// Registers a shader chunk usable with `#include <name>`.
    pub fn register_chunk(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.gpu.programs.chunks_mut().register(name, source);
    }

    /// The shadow map of a light, once it has been rendered.
    pub fn shadow_map(&self, scene: SceneId, light: ObjectKey) -> Option<RenderTargetKey> {
        self.shadows.map(scene, light)
    }

    /// Counters of live resources and of the last frame's draws.
    pub fn info(&self) -> &RenderInfo {
        &self.info
    }

    /// The limits of the device.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Degraded-path events, most recent last.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// The configuration.
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    /// The configuration, for changes applied from the next frame on.
    pub fn settings_mut(&mut self) -> &mut RendererSettings {
        &mut self.settings
    }

    /// Where the renderer stands with respect to its context.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn check_store(&mut self, assets: &Assets) -> Result<(), RenderError> {
        match self.store {
            Some(store) if store != assets.id() => Err(RenderError::InvalidUsage(
                "the assets belong to another store than the one this renderer draws from"
                    .to_string(),
            )),
            Some(_) => Ok(()),
            None => {
                self.store = Some(assets.id());
                Ok(())
            }
        }
    }

    /// Observes the context once and acts on the transition.
    ///
    /// Returns `true` if the entry point can talk to the device.
    fn observe_context(&mut self) -> bool {
        let previous = self.lifecycle;
        let next = previous.observe(self.device.is_context_lost());
        match next {
            Lifecycle::Lost => {
                self.mark_lost();
                false
            }
            Lifecycle::Restoring => {
                self.restore();
                self.lifecycle = next.observe(self.device.is_context_lost());
                self.lifecycle.is_active()
            }
            Lifecycle::Active => {
                self.lifecycle = next;
                true
            }
        }
    }

    fn mark_lost(&mut self) {
        if self.lifecycle != Lifecycle::Lost {
            self.diagnostics.push(self.frame, DiagnosticKind::ContextLost);
        }
        self.lifecycle = Lifecycle::Lost;
    }

    /// Forgets every device object after a restoration; resources are created
    /// again when next used.
    fn restore(&mut self) {
        self.capabilities = Capabilities::probe(self.device.as_ref(), &self.settings);
        self.gpu.state.reset(self.device.as_mut());
        self.gpu.invalidate(&mut self.info.memory);
        self.shadows.invalidate();
        self.unit_warnings.clear();
        self.diagnostics.push(self.frame, DiagnosticKind::ContextRestored);
    }
}

/// Lets a frame go on past a failed resource operation, unless the context is lost.
fn tolerate<T>(result: Result<T, ResourceError>, what: &str) -> Result<Option<T>, ResourceError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ResourceError::ContextLost) => Err(ResourceError::ContextLost),
        Err(error) => {
            log::error!("{what} failed: {error}");
            Ok(None)
        }
    }
}

fn rgba(color: Color, alpha: f32) -> [f32; 4] {
    let [r, g, b] = color.to_array();
    [r, g, b, alpha]
}

/// Mip levels of the color texture of a target.
fn mip_levels(descriptor: &RenderTargetDescriptor) -> u32 {
    if descriptor.generate_mipmaps {
        32 - descriptor.width.max(descriptor.height).max(1).leading_zeros()
    } else {
        1
    }
}

fn light_shadow_mut(scene: &mut Scene, object: ObjectKey) -> Option<&mut LightShadow> {
    match &mut scene.get_mut(object)?.kind {
        ObjectKind::Light(light) => light.shadow.as_mut(),
        _ => None,
    }
}

/// Computes the missing bounding spheres of the geometries the scene draws.
fn compute_bounds(scene: &Scene, assets: &mut Assets) {
    for (_, object) in scene.iter() {
        let Some(renderable) = object.kind.renderable() else {
            continue;
        };
        if let Some(geometry) = assets.geometry_mut(renderable.geometry) {
            if geometry.bounding_sphere.is_none() {
                geometry.compute_bounding_sphere();
            }
        }
    }
}

/// The (material, group) pairs an object draws with.
fn draw_parts(
    renderable: &Renderable,
    geometry: &Geometry,
    override_material: Option<MaterialKey>,
) -> Vec<(MaterialKey, Option<GeometryGroup>)> {
    if let Some(material) = override_material {
        return vec![(material, None)];
    }
    match &renderable.material {
        MaterialSlot::Single(material) => vec![(*material, None)],
        MaterialSlot::Multi(materials) => geometry
            .groups
            .iter()
            .filter_map(|group| {
                materials
                    .get(group.material_index)
                    .map(|material| (*material, Some(*group)))
            })
            .collect(),
    }
}

/// Walks the visible objects of `scene`, pushing render items into `list` and
/// gathering lights and shadow casters.
fn collect(
    scene: &Scene,
    camera: &Camera,
    assets: &Assets,
    cull: bool,
    list: &mut RenderList,
) -> Collected {
    let frustum = camera.frustum();
    let view_projection = camera.view_projection();
    let mut collected = Collected::default();

    scene.visit_visible(|key, object, group_order| {
        if !object.layers.test(&camera.layers) {
            return;
        }
        if let ObjectKind::Light(light) = &object.kind {
            let position = object.world_position();
            collected.lights.push(LightInput {
                object: key,
                light: *light,
                position,
            });
            if light.casts_shadow() {
                collected.shadow_lights.push(ShadowLight {
                    object: key,
                    light: *light,
                    position,
                });
            }
            return;
        }
        let Some(renderable) = object.kind.renderable() else {
            return;
        };
        let Some(geometry) = assets.geometry(renderable.geometry) else {
            return;
        };
        let model = object.matrix_world();
        let instanced = matches!(object.kind, ObjectKind::InstancedMesh(_));
        let bounds = geometry
            .bounding_sphere
            .map(|sphere| sphere.transformed(&model));
        // Instances spread beyond the geometry's own bounds.
        let cull_bounds = if instanced { None } else { bounds };

        collected.geometries.push(renderable.geometry);
        if instanced {
            collected.instanced.push(key);
        }
        if object.cast_shadow || object.receive_shadow {
            collected.shadow_items = true;
        }
        if object.cast_shadow {
            for (material, group) in draw_parts(renderable, geometry, None) {
                collected.casters.push(ShadowCaster {
                    object: key,
                    geometry: renderable.geometry,
                    material,
                    group,
                    model,
                    bounds: cull_bounds,
                    frustum_culled: object.frustum_culled,
                });
                collected.materials.push(material);
            }
        }

        let visible = !cull
            || !object.frustum_culled
            || cull_bounds.map_or(true, |sphere| frustum.intersects_sphere(&sphere));
        if !visible {
            return;
        }
        let center = bounds.map_or_else(|| object.world_position(), |sphere| sphere.center);
        let z = view_projection.project_point3(center).z;
        for (material_key, group) in draw_parts(renderable, geometry, scene.override_material) {
            let Some(material) = assets.material(material_key) else {
                continue;
            };
            if !material.visible {
                continue;
            }
            list.push(
                RenderItem {
                    object: key,
                    object_id: object.id(),
                    geometry: renderable.geometry,
                    material: material_key,
                    material_id: material.id(),
                    group_order,
                    render_order: object.render_order,
                    z,
                    group,
                },
                material,
            );
            collected.materials.push(material_key);
        }
    });

    collected.instanced.sort_unstable();
    collected.instanced.dedup();
    collected.materials.sort_unstable();
    collected.materials.dedup();
    collected
}
