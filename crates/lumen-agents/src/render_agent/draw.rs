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

//! One draw: program resolution, uniforms, texture units, vertex inputs and the
//! draw call itself.

use super::gpu::GpuTables;
use ahash::AHashSet;
use lumen_core::math::{Mat3, Mat4, Vec2, Vec3, Vec4};
use lumen_core::renderer::{
    BufferHandle, BufferTarget, Capabilities, ClearFlags, ColorMask, DiagnosticKind, Diagnostics,
    GraphicsDevice, IndexType, MemoryInfo, PrimitiveMode, Rect, RenderInfo, RendererSettings,
    ResourceError, Side, TextureTarget, UniformType, UniformValue, VertexAttribLayout,
};
use lumen_core::resource::geometry::{NORMAL, POSITION};
use lumen_core::resource::{
    BufferAttribute, Camera, Geometry, GeometryGroup, GeometryKey, MapSource, Material,
    MaterialKey, MaterialKind, RenderTargetDescriptor, RenderTargetKey, TextureKey,
};
use lumen_data::{Assets, Fog, InstancedMesh, ObjectKind, Scene};
use lumen_lanes::program_lane::{
    ClippingCounts, ObjectFeatures, ParameterContext, ProgramId, ProgramParameters, ProgramState,
};
use lumen_lanes::render_lane::{
    LightsState, RenderItem, ShadowCaster, ShadowDrawer, ShadowView,
};

/// Morph targets the built-in vertex stage reads.
pub const MAX_MORPH_TARGETS: usize = 4;

/// Camera-dependent uniforms shared by every draw of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct ViewUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub orthographic: bool,
    pub far: f32,
}

impl ViewUniforms {
    pub fn of_camera(camera: &Camera) -> Self {
        Self {
            view: camera.matrix_world_inverse(),
            projection: camera.projection_matrix(),
            position: camera.position(),
            orthographic: !camera.is_perspective(),
            far: camera.projection.near_far().1,
        }
    }

    fn of_shadow(view: &ShadowView, far: f32) -> Self {
        Self {
            view: view.view,
            projection: view.projection,
            position: view.position,
            // Orthographic projections keep w at 1.
            orthographic: view.projection.w_axis.w == 1.0,
            far,
        }
    }

    /// The identity view of fullscreen passes.
    fn screen(far: f32) -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            position: Vec3::ZERO,
            orthographic: true,
            far,
        }
    }
}

/// The primitive a scene node draws with, if it draws at all.
pub(crate) fn primitive_mode(kind: &ObjectKind) -> Option<PrimitiveMode> {
    match kind {
        ObjectKind::Mesh(_) | ObjectKind::InstancedMesh(_) => Some(PrimitiveMode::Triangles),
        ObjectKind::Line(_) => Some(PrimitiveMode::LineStrip),
        ObjectKind::LineSegments(_) => Some(PrimitiveMode::Lines),
        ObjectKind::Points(_) => Some(PrimitiveMode::Points),
        ObjectKind::Group | ObjectKind::Light(_) => None,
    }
}

/// What a draw needs to know about the drawn node.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DrawObject<'a> {
    pub geometry_key: Option<GeometryKey>,
    pub geometry: &'a Geometry,
    pub model: Mat4,
    pub mode: PrimitiveMode,
    pub group: Option<GeometryGroup>,
    pub instances: Option<&'a InstancedMesh>,
    pub morph_influences: &'a [f32],
    pub receive_shadow: bool,
}

impl DrawObject<'_> {
    fn features(&self) -> ObjectFeatures {
        ObjectFeatures {
            instancing: self.instances.is_some(),
            instancing_color: self
                .instances
                .is_some_and(|instances| instances.instance_color.is_some()),
            morph_targets: self.geometry.morph_target_count().min(MAX_MORPH_TARGETS) as u32,
            morph_normals: self.geometry.morph_attributes.contains_key(NORMAL),
            receive_shadow: self.receive_shadow,
        }
    }

    /// The buffer feeding the vertex input `name`.
    fn attribute(&self, name: &str) -> Option<&BufferAttribute> {
        if let Some(attribute) = self.geometry.attribute(name) {
            return Some(attribute);
        }
        match name {
            "instanceMatrix" => self.instances.map(|instances| &instances.instance_matrix),
            "instanceColor" => self
                .instances
                .and_then(|instances| instances.instance_color.as_ref()),
            _ => {
                let index: usize = name.strip_prefix("morphTarget")?.parse().ok()?;
                self.geometry.morph_attributes.get(POSITION)?.get(index)
            }
        }
    }
}

/// Where a sampler reads from.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SamplerSource {
    Texture(TextureKey),
    Target(RenderTargetKey),
    Placeholder,
}

impl From<MapSource> for SamplerSource {
    fn from(source: MapSource) -> Self {
        match source {
            MapSource::Texture(key) => SamplerSource::Texture(key),
            MapSource::RenderTarget(key) => SamplerSource::Target(key),
        }
    }
}

/// Everything a draw borrows from the renderer for the duration of one pass.
pub(crate) struct DrawContext<'a> {
    pub device: &'a mut dyn GraphicsDevice,
    pub gpu: &'a mut GpuTables,
    pub settings: &'a RendererSettings,
    pub capabilities: &'a Capabilities,
    pub lights: &'a LightsState,
    pub diagnostics: &'a mut Diagnostics,
    pub info: &'a mut RenderInfo,
    pub unit_warnings: &'a mut AHashSet<ProgramId>,
    pub assets: &'a Assets,
    pub scene: &'a Scene,
    pub fullscreen: Option<&'a mut Geometry>,
    pub fog: Option<Fog>,
    pub view: ViewUniforms,
    pub shadow_map_enabled: bool,
    pub render_target: bool,
    pub transmission: Option<RenderTargetKey>,
    pub pass_source: Option<RenderTargetKey>,
    /// Faces drawn instead of the material's side.
    pub side: Option<Side>,
    pub frame: u64,
}

impl<'a> DrawContext<'a> {
    /// Resolves the program of `material` for an object with `features`,
    /// acquiring and compiling it on first use.
    pub fn resolve_program(
        &mut self,
        material: &Material,
        features: ObjectFeatures,
    ) -> Result<ProgramId, ResourceError> {
        let ctx = ParameterContext {
            settings: self.settings,
            capabilities: self.capabilities,
            lights: self.lights.counts(),
            shadow_map_enabled: self.shadow_map_enabled,
            fog: self.fog,
            object: features,
            clipping: clipping_counts(material, self.settings),
            render_target: self.render_target,
        };
        let parameters = ProgramParameters::from_material(material, &ctx);
        let cache_key = parameters.cache_key();
        let id = material.id();
        let lights_version = self.lights.version();

        let known = self.gpu.properties.get(id).and_then(|property| {
            if property.is_current(material.version(), lights_version, &cache_key) {
                property.current_program
            } else {
                property.programs.get(&cache_key).copied()
            }
        });
        let program = match known {
            Some(program) => program,
            None => {
                let acquired = self
                    .gpu
                    .programs
                    .acquire(self.device, &parameters, &cache_key)?;
                if acquired.created {
                    self.report_compile(acquired.id);
                }
                acquired.id
            }
        };
        self.gpu.properties.set_program(
            id,
            &cache_key,
            program,
            material.version(),
            lights_version,
        );
        self.gpu.programs.ensure(self.device, program)?;
        Ok(program)
    }

    fn report_compile(&mut self, program: ProgramId) {
        let Some(entry) = self.gpu.programs.get(program) else {
            return;
        };
        if entry.state == ProgramState::Broken {
            self.diagnostics.push(
                self.frame,
                DiagnosticKind::ShaderCompile {
                    cache_key: entry.cache_key.clone(),
                    log: entry.diagnostics.clone().unwrap_or_default(),
                },
            );
        } else {
            log::info!(
                "Compiled program '{}' ({} programs cached).",
                entry.parameters().shader_name,
                self.gpu.programs.len()
            );
        }
    }

    /// The drawable and material of a render-list item, if both still exist.
    fn item_object(&self, item: &RenderItem) -> Option<(DrawObject<'a>, &'a Material)> {
        let assets: &'a Assets = self.assets;
        let scene: &'a Scene = self.scene;
        let node = scene.get(item.object)?;
        let geometry = assets.geometry(item.geometry)?;
        let material = assets.material(item.material)?;
        let instances = match &node.kind {
            ObjectKind::InstancedMesh(instanced) => Some(instanced),
            _ => None,
        };
        let object = DrawObject {
            geometry_key: Some(item.geometry),
            geometry,
            model: node.matrix_world(),
            mode: primitive_mode(&node.kind)?,
            group: item.group,
            instances,
            morph_influences: &node.morph_target_influences,
            receive_shadow: node.receive_shadow,
        };
        Some((object, material))
    }

    /// Resolves the program of an item without drawing it.
    pub fn prepare_item(&mut self, item: &RenderItem) -> Result<(), ResourceError> {
        let Some((object, material)) = self.item_object(item) else {
            return Ok(());
        };
        self.resolve_program(material, object.features()).map(|_| ())
    }

    /// Draws one item. With `split_double_sided`, double-sided materials draw
    /// their back faces first, then their front faces.
    pub fn draw_item(
        &mut self,
        item: &RenderItem,
        view: &ViewUniforms,
        split_double_sided: bool,
    ) -> Result<(), ResourceError> {
        let Some((object, material)) = self.item_object(item) else {
            return Ok(());
        };
        if split_double_sided && material.side == Side::Double {
            self.side = Some(Side::Back);
            let back = self.draw(&object, material, view);
            self.side = Some(Side::Front);
            let front = back.and_then(|()| self.draw(&object, material, view));
            self.side = None;
            return front;
        }
        self.draw(&object, material, view)
    }

    /// Draws a bucket in order. A failed draw is logged and skipped; only a lost
    /// context stops the pass.
    pub fn draw_list<'i>(
        &mut self,
        items: impl IntoIterator<Item = &'i RenderItem>,
        view: &ViewUniforms,
        split_double_sided: bool,
    ) -> Result<(), ResourceError> {
        for item in items {
            match self.draw_item(item, view, split_double_sided) {
                Ok(()) => {}
                Err(ResourceError::ContextLost) => return Err(ResourceError::ContextLost),
                Err(error) => log::error!("Skipped object {}: {error}", item.object_id),
            }
        }
        Ok(())
    }

    /// Draws `object` with `material` as seen from `view`.
    ///
    /// Broken programs without a program object skip the draw. Only a lost
    /// context is an error the frame cannot recover from.
    pub fn draw(
        &mut self,
        object: &DrawObject<'_>,
        material: &Material,
        view: &ViewUniforms,
    ) -> Result<(), ResourceError> {
        let program = self.resolve_program(material, object.features())?;
        let Some(handle) = self.gpu.programs.get(program).and_then(|entry| entry.program) else {
            return Ok(());
        };

        let front_face_cw = object.model.determinant() < 0.0;
        self.gpu.state.set_material(self.device, material, front_face_cw);
        if let Some(side) = self.side {
            self.gpu.state.set_side(self.device, side, front_face_cw);
        }
        if let MaterialKind::Line(params) = &material.kind {
            self.gpu.state.set_line_width(self.device, params.line_width);
        }
        self.gpu.state.use_program(self.device, Some(handle));

        self.set_uniforms(program, object, material, view);
        self.bind_textures(program, material)?;
        self.bind_attributes(program, object);
        self.issue(object, material)
    }

    fn set_uniforms(
        &mut self,
        program: ProgramId,
        object: &DrawObject<'_>,
        material: &Material,
        view: &ViewUniforms,
    ) {
        let model_view = view.view * object.model;
        let mut values: Vec<(&str, UniformValue)> = vec![
            ("projectionMatrix", view.projection.into()),
            ("viewMatrix", view.view.into()),
            ("cameraPosition", view.position.into()),
            ("isOrthographic", view.orthographic.into()),
            ("modelMatrix", object.model.into()),
            ("modelViewMatrix", model_view.into()),
            (
                "normalMatrix",
                Mat3::from_mat4(model_view).inverse().transpose().into(),
            ),
            ("toneMappingExposure", self.settings.tone_mapping_exposure.into()),
            ("opacity", material.opacity.into()),
            ("alphaTest", material.alpha_test.into()),
        ];
        if self.capabilities.logarithmic_depth_buffer {
            values.push(("logDepthBufFC", (2.0 / (view.far + 1.0).log2()).into()));
        }
        if !object.morph_influences.is_empty() {
            let mut influences = object.morph_influences.to_vec();
            influences.resize(MAX_MORPH_TARGETS, 0.0);
            values.push(("morphTargetInfluences", UniformValue::FloatArray(influences)));
        }
        if material.fog {
            match self.fog {
                Some(Fog::Linear { color, near, far }) => {
                    values.push(("fogColor", color.to_vec3().into()));
                    values.push(("fogNear", near.into()));
                    values.push(("fogFar", far.into()));
                }
                Some(Fog::Exp2 { color, density }) => {
                    values.push(("fogColor", color.to_vec3().into()));
                    values.push(("fogDensity", density.into()));
                }
                None => {}
            }
        }
        self.material_values(material, &mut values);
        if self.settings.local_clipping_enabled && !material.clipping_planes.is_empty() {
            let to_view = view.view.inverse().transpose();
            let planes: Vec<Vec4> = material
                .clipping_planes
                .iter()
                .map(|plane| to_view * plane.to_vec4())
                .collect();
            values.push(("clippingPlanes", UniformValue::Vec4Array(planes)));
        }

        let Some(entry) = self.gpu.programs.get_mut(program) else {
            return;
        };
        let uniforms = &mut entry.uniforms;
        for (name, value) in values {
            uniforms.set(self.device, name, value);
        }
        if let MaterialKind::Shader(params) = &material.kind {
            for (name, value) in &params.uniforms {
                uniforms.set(self.device, name, value.clone());
            }
        }
        if material.kind.is_lit() {
            self.lights.upload(self.device, uniforms);
        }
    }

    /// The uniforms of the shading model.
    fn material_values(&self, material: &Material, values: &mut Vec<(&str, UniformValue)>) {
        if let Some(color) = material.kind.color() {
            values.push(("diffuse", color.to_vec3().into()));
        }
        match &material.kind {
            MaterialKind::Lambert(p) => values.push(("emissive", p.emissive.to_vec3().into())),
            MaterialKind::Phong(p) => {
                values.push(("emissive", p.emissive.to_vec3().into()));
                values.push(("specular", p.specular.to_vec3().into()));
                values.push(("shininess", p.shininess.into()));
            }
            MaterialKind::Standard(p) => {
                values.push(("emissive", p.emissive.to_vec3().into()));
                values.push(("roughness", p.roughness.into()));
                values.push(("metalness", p.metalness.into()));
                values.push(("envMapIntensity", p.env_map_intensity.into()));
            }
            MaterialKind::Physical(p) => {
                let s = &p.standard;
                values.push(("emissive", s.emissive.to_vec3().into()));
                values.push(("roughness", s.roughness.into()));
                values.push(("metalness", s.metalness.into()));
                values.push(("envMapIntensity", s.env_map_intensity.into()));
                values.push(("clearcoat", p.clearcoat.into()));
                values.push(("ior", p.ior.into()));
                values.push(("transmission", p.transmission.into()));
                values.push(("thickness", p.thickness.into()));
                let size = self
                    .transmission
                    .and_then(|key| self.gpu.targets.descriptor(key))
                    .map_or(Vec2::ONE, |d| Vec2::new(d.width as f32, d.height as f32));
                values.push(("transmissionSamplerSize", size.into()));
            }
            MaterialKind::Distance(p) => {
                values.push(("nearDistance", p.near.into()));
                values.push(("farDistance", p.far.into()));
                values.push(("referencePosition", p.reference_position.into()));
            }
            MaterialKind::Points(p) => {
                values.push(("size", p.size.into()));
                let height = self.gpu.state.viewport().height as f32;
                values.push(("scale", (height * 0.5).into()));
            }
            _ => {}
        }
    }

    /// Assigns texture units to every sampler of the program and binds them.
    fn bind_textures(&mut self, program: ProgramId, material: &Material) -> Result<(), ResourceError> {
        let samplers: Vec<(String, UniformType, u32)> = match self.gpu.programs.get(program) {
            Some(entry) => entry
                .uniforms
                .samplers()
                .into_iter()
                .map(|(name, info)| (name.to_string(), info.ty, info.size))
                .collect(),
            None => return Ok(()),
        };
        if samplers.is_empty() {
            return Ok(());
        }

        let shadow_maps = self.lights.shadow_samplers();
        let max = self.capabilities.max_textures;
        let mut next = 0u32;
        let mut requested = 0u32;
        let mut assignments: Vec<(String, UniformValue)> = Vec::with_capacity(samplers.len());
        for (name, ty, size) in samplers {
            let target = if ty == UniformType::SamplerCube {
                TextureTarget::CubeMap
            } else {
                TextureTarget::Texture2D
            };
            let sources = self.sampler_sources(&name, size as usize, material, &shadow_maps);
            let mut units = Vec::with_capacity(sources.len());
            for source in sources {
                requested += 1;
                if next >= max {
                    continue;
                }
                self.bind_source(next, source, target)?;
                units.push(next as i32);
                next += 1;
            }
            if units.len() != size as usize {
                continue;
            }
            let value = match units.as_slice() {
                [unit] => UniformValue::Int(*unit),
                _ => UniformValue::IntArray(units),
            };
            assignments.push((name, value));
        }

        if requested > max && self.unit_warnings.insert(program) {
            self.diagnostics.push(
                self.frame,
                DiagnosticKind::TextureUnitsExceeded { requested, max },
            );
        }
        if let Some(entry) = self.gpu.programs.get_mut(program) {
            for (name, value) in assignments {
                entry.uniforms.set(self.device, &name, value);
            }
        }
        Ok(())
    }

    fn sampler_sources(
        &self,
        name: &str,
        size: usize,
        material: &Material,
        shadow_maps: &[(&'static str, Vec<RenderTargetKey>); 3],
    ) -> Vec<SamplerSource> {
        if let Some((_, source)) = material.maps.iter().find(|(map, _)| *map == name) {
            return vec![source.into()];
        }
        let single = |key: Option<RenderTargetKey>| {
            vec![key.map_or(SamplerSource::Placeholder, SamplerSource::Target)]
        };
        match name {
            "transmissionSamplerMap" => single(self.transmission),
            "shadow_pass" => single(self.pass_source),
            _ => {
                let mut sources: Vec<SamplerSource> = shadow_maps
                    .iter()
                    .find(|(uniform, _)| *uniform == name)
                    .map(|(_, keys)| keys.iter().copied().map(SamplerSource::Target).collect())
                    .unwrap_or_default();
                sources.resize(size.max(1), SamplerSource::Placeholder);
                sources
            }
        }
    }

    fn bind_source(
        &mut self,
        unit: u32,
        source: SamplerSource,
        target: TextureTarget,
    ) -> Result<(), ResourceError> {
        let gpu = &mut *self.gpu;
        let memory = &mut self.info.memory;
        match source {
            SamplerSource::Texture(key) => {
                gpu.textures
                    .bind(self.device, &mut gpu.state, unit, key, target, memory)?;
            }
            SamplerSource::Target(key) => match gpu.targets.texture(key) {
                Some(handle) => gpu
                    .state
                    .bind_texture(self.device, target, Some(handle), Some(unit)),
                None => {
                    gpu.textures
                        .placeholder(self.device, &mut gpu.state, unit, target, memory)?;
                }
            },
            SamplerSource::Placeholder => {
                gpu.textures
                    .placeholder(self.device, &mut gpu.state, unit, target, memory)?;
            }
        }
        Ok(())
    }

    /// Points every active vertex input of the program at its buffer.
    fn bind_attributes(&mut self, program: ProgramId, object: &DrawObject<'_>) {
        let Some(entry) = self.gpu.programs.get(program) else {
            return;
        };
        let mut inputs: Vec<_> = entry.attributes.values().collect();
        inputs.sort_by_key(|input| input.location);

        let bindings = &mut self.gpu.bindings;
        bindings.init_attributes();
        for input in inputs {
            let Some(attribute) = object.attribute(&input.name) else {
                continue;
            };
            let Some(record) = self.gpu.buffers.get(attribute.id()) else {
                continue;
            };
            let columns = input.location_count();
            let component = attribute.data_type().byte_size() as u32;
            let item = attribute.item_size() as u32;
            let size = (item / columns).max(1);
            let stride = if columns > 1 { item * component } else { 0 };
            for column in 0..columns {
                let location = input.location + column;
                let layout = VertexAttribLayout {
                    size,
                    ty: attribute.data_type(),
                    normalized: attribute.normalized,
                    stride,
                    offset: column * size * component,
                };
                bindings.enable_attribute(self.device, location, attribute.divisor);
                bindings.vertex_attrib_pointer(self.device, location, record.handle, layout);
            }
        }
        bindings.disable_unused_attributes(self.device);
    }

    /// Issues the draw call, clamped to the draw range and group.
    fn issue(&mut self, object: &DrawObject<'_>, material: &Material) -> Result<(), ResourceError> {
        let geometry = object.geometry;
        let mut mode = object.mode;
        let mut factor = 1u64;
        let mut index: Option<(BufferHandle, IndexType, u64)> = None;

        if material.wireframe && mode == PrimitiveMode::Triangles {
            if let Some(key) = object.geometry_key {
                let gpu = &mut *self.gpu;
                let wireframe = gpu.geometries.wireframe_index(
                    self.device,
                    &mut gpu.bindings,
                    &mut gpu.buffers,
                    key,
                    geometry,
                    &mut self.info.memory,
                )?;
                if let Some(wireframe) = wireframe {
                    index = Some((
                        wireframe.record.handle,
                        wireframe.index_type,
                        u64::from(wireframe.count),
                    ));
                    mode = PrimitiveMode::Lines;
                    factor = 2;
                }
            }
        }
        if factor == 1 {
            if let Some(attribute) = &geometry.index {
                let Some(record) = self.gpu.buffers.get(attribute.id()) else {
                    return Ok(());
                };
                let ty = attribute.index_type().unwrap_or(IndexType::U32);
                index = Some((record.handle, ty, attribute.count() as u64));
            }
        }

        let data_count = index.map_or(geometry.vertex_count() as u64, |(_, _, count)| count);
        let range = geometry.draw_range;
        let range_start = u64::from(range.start) * factor;
        let range_count = range.count.map_or(u64::MAX, |count| u64::from(count) * factor);
        let (group_start, group_count) = object.group.map_or((0, u64::MAX), |group| {
            (u64::from(group.start) * factor, u64::from(group.count) * factor)
        });
        let start = range_start.max(group_start);
        let end = data_count
            .min(range_start.saturating_add(range_count))
            .min(group_start.saturating_add(group_count));
        if end <= start {
            return Ok(());
        }
        let count = (end - start) as u32;
        let instances = object
            .instances
            .map(|instances| instances.count)
            .or(geometry.instance_count)
            .unwrap_or(1);
        if instances == 0 {
            return Ok(());
        }

        match index {
            Some((handle, ty, _)) => {
                self.gpu
                    .bindings
                    .bind_buffer(self.device, BufferTarget::ElementArray, Some(handle));
                self.device
                    .draw_elements(mode, count, ty, start as usize * ty.byte_size(), instances);
            }
            None => self.device.draw_arrays(mode, start as u32, count, instances),
        }
        self.info.update(count, mode, instances);
        Ok(())
    }
}

/// Local clipping planes of a material, when local clipping is on.
fn clipping_counts(material: &Material, settings: &RendererSettings) -> ClippingCounts {
    if !settings.local_clipping_enabled {
        return ClippingCounts::default();
    }
    let planes = material.clipping_planes.len() as u32;
    ClippingCounts {
        planes,
        intersection: if material.clip_intersection { planes } else { 0 },
    }
}

impl ShadowDrawer for DrawContext<'_> {
    fn max_texture_size(&self) -> u32 {
        self.capabilities.max_texture_size
    }

    fn create_target(&mut self, descriptor: RenderTargetDescriptor) -> RenderTargetKey {
        self.gpu.targets.create(descriptor)
    }

    fn dispose_target(&mut self, target: RenderTargetKey) {
        let gpu = &mut *self.gpu;
        gpu.targets
            .remove(self.device, &mut gpu.state, target, &mut self.info.memory);
    }

    fn bind_target(&mut self, target: RenderTargetKey) -> Result<(), ResourceError> {
        let gpu = &mut *self.gpu;
        gpu.targets
            .bind(self.device, &mut gpu.state, target, 0, &mut self.info.memory)
            .map(|_| ())
    }

    fn clear(&mut self, color: [f32; 4]) {
        let state = &mut self.gpu.state;
        state.set_scissor_test(self.device, false);
        state.set_clear_color(self.device, color);
        state.set_color_mask(self.device, ColorMask::splat(true));
        state.set_depth_mask(self.device, true);
        self.device.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.gpu.state.set_viewport(self.device, rect);
    }

    fn material(&self, key: MaterialKey) -> Option<&Material> {
        self.assets.material(key)
    }

    fn draw_caster(&mut self, caster: &ShadowCaster, material: &Material, view: &ShadowView) {
        let assets = self.assets;
        let scene = self.scene;
        let Some(geometry) = assets.geometry(caster.geometry) else {
            return;
        };
        let node = scene.get(caster.object);
        let Some(mode) = node.and_then(|node| primitive_mode(&node.kind)) else {
            return;
        };
        let instances = match node.map(|node| &node.kind) {
            Some(ObjectKind::InstancedMesh(instanced)) => Some(instanced),
            _ => None,
        };
        let object = DrawObject {
            geometry_key: Some(caster.geometry),
            geometry,
            model: caster.model,
            mode,
            group: caster.group,
            instances,
            morph_influences: node.map_or(&[][..], |node| &node.morph_target_influences[..]),
            receive_shadow: false,
        };
        let view = ViewUniforms::of_shadow(view, self.view.far);
        if let Err(error) = self.draw(&object, material, &view) {
            log::error!("Shadow caster draw failed: {error}");
        }
    }

    fn draw_fullscreen(&mut self, material: &Material, source: RenderTargetKey) {
        let Some(quad) = self.fullscreen.take() else {
            return;
        };
        let uploaded = upload_quad(self.device, self.gpu, quad, &mut self.info.memory);
        if let Err(error) = uploaded {
            log::error!("Fullscreen quad upload failed: {error}");
            self.fullscreen = Some(quad);
            return;
        }

        let object = DrawObject {
            geometry_key: None,
            geometry: quad,
            model: Mat4::IDENTITY,
            mode: PrimitiveMode::Triangles,
            group: None,
            instances: None,
            morph_influences: &[],
            receive_shadow: false,
        };
        let view = ViewUniforms::screen(self.view.far);
        self.pass_source = Some(source);
        if let Err(error) = self.draw(&object, material, &view) {
            log::error!("Fullscreen pass failed: {error}");
        }
        self.pass_source = None;
        self.fullscreen = Some(quad);
    }
}

/// Uploads the index and attributes of the fullscreen quad.
fn upload_quad(
    device: &mut dyn GraphicsDevice,
    gpu: &mut GpuTables,
    quad: &mut Geometry,
    memory: &mut MemoryInfo,
) -> Result<(), ResourceError> {
    if let Some(index) = quad.index.as_mut() {
        gpu.buffers.upload(
            device,
            &mut gpu.bindings,
            index,
            BufferTarget::ElementArray,
            memory,
        )?;
    }
    for (_, attribute) in quad.attributes_mut() {
        gpu.buffers
            .upload(device, &mut gpu.bindings, attribute, BufferTarget::Array, memory)?;
    }
    Ok(())
}
