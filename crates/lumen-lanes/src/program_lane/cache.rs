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

//! The program cache: one compiled program per distinct cache key, reference
//! counted by the materials using it.

use super::parameters::ProgramParameters;
use super::preprocess::{replace_light_nums, unroll_loops, ChunkLibrary, PreprocessError};
use super::shaders;
use super::uniforms::UniformTable;
use crate::render_lane::state::StateTracker;
use ahash::AHashMap;
use lumen_core::renderer::{
    ActiveAttribute, GraphicsDevice, ProgramHandle, ResourceError, ShaderError, ShaderHandle,
    ShaderStage,
};
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Identifies an entry of the [`ProgramCache`].
    pub struct ProgramId;
}

/// Lines of source shown on each side of a failing line.
const ERROR_CONTEXT_LINES: usize = 6;

/// Health of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    /// Compiled and linked.
    Ready,
    /// Failed to preprocess, compile or link. Kept so the failure is reported once.
    Broken,
    /// The context was lost; rebuilt on next use.
    Lost,
}

/// One compiled program permutation.
#[derive(Debug)]
pub struct ProgramEntry {
    /// The key this entry was built for.
    pub cache_key: String,
    /// The linked program, `None` when no program object exists.
    pub program: Option<ProgramHandle>,
    /// Reflected uniforms and their upload cache.
    pub uniforms: UniformTable,
    /// Reflected vertex attributes, by name.
    pub attributes: AHashMap<String, ActiveAttribute>,
    /// Number of outstanding acquisitions.
    pub used_times: u32,
    /// The annotated compile or link log of a broken entry.
    pub diagnostics: Option<String>,
    /// Health of the entry.
    pub state: ProgramState,
    parameters: ProgramParameters,
}

impl ProgramEntry {
    /// Returns `true` if the entry can be drawn with.
    pub fn is_ready(&self) -> bool {
        self.state == ProgramState::Ready
    }

    /// The parameters the entry was built from.
    pub fn parameters(&self) -> &ProgramParameters {
        &self.parameters
    }
}

/// The result of [`ProgramCache::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramAcquire {
    /// The acquired entry.
    pub id: ProgramId,
    /// The entry was built by this call.
    pub created: bool,
}

/// The outcome of building the sources and program of one entry.
struct Built {
    program: Option<ProgramHandle>,
    uniforms: UniformTable,
    attributes: AHashMap<String, ActiveAttribute>,
    diagnostics: Option<String>,
    state: ProgramState,
}

impl Built {
    fn broken(program: Option<ProgramHandle>, diagnostics: String) -> Self {
        Self {
            program,
            uniforms: UniformTable::default(),
            attributes: AHashMap::new(),
            diagnostics: Some(diagnostics),
            state: ProgramState::Broken,
        }
    }

    fn lost() -> Self {
        Self {
            program: None,
            uniforms: UniformTable::default(),
            attributes: AHashMap::new(),
            diagnostics: None,
            state: ProgramState::Lost,
        }
    }
}

/// Shares compiled programs between materials with the same cache key.
///
/// A program is compiled the first time its key is acquired and deleted when the
/// last acquisition is released. Build failures never fail the frame: the entry is
/// kept in the [`ProgramState::Broken`] state and its log is returned to the caller
/// through [`ProgramEntry::diagnostics`].
#[derive(Debug)]
pub struct ProgramCache {
    programs: SlotMap<ProgramId, ProgramEntry>,
    by_key: AHashMap<String, ProgramId>,
    chunks: ChunkLibrary,
    check_errors: bool,
}

impl ProgramCache {
    /// Creates an empty cache with the built-in chunk library.
    ///
    /// With `check_errors` off, compile and link statuses are not queried and every
    /// linked program is assumed healthy.
    pub fn new(check_errors: bool) -> Self {
        Self {
            programs: SlotMap::with_key(),
            by_key: AHashMap::new(),
            chunks: ChunkLibrary::new(),
            check_errors,
        }
    }

    /// The chunk library includes resolve against.
    pub fn chunks(&self) -> &ChunkLibrary {
        &self.chunks
    }

    /// Mutable access to the chunk library, to register custom chunks.
    ///
    /// Programs already compiled keep their sources.
    pub fn chunks_mut(&mut self) -> &mut ChunkLibrary {
        &mut self.chunks
    }

    /// Turns compile and link status checks on or off.
    pub fn set_check_errors(&mut self, check: bool) {
        self.check_errors = check;
    }

    /// Returns the entry for `cache_key`, building it on first use.
    ///
    /// Only a lost context makes this fail; compile failures yield a broken entry.
    pub fn acquire(
        &mut self,
        device: &mut dyn GraphicsDevice,
        parameters: &ProgramParameters,
        cache_key: &str,
    ) -> Result<ProgramAcquire, ResourceError> {
        if let Some(&id) = self.by_key.get(cache_key) {
            if let Some(entry) = self.programs.get_mut(id) {
                entry.used_times += 1;
                return Ok(ProgramAcquire { id, created: false });
            }
        }

        let built = self.build(device, parameters, cache_key);
        if built.state == ProgramState::Lost {
            return Err(ResourceError::ContextLost);
        }
        let id = self.programs.insert(ProgramEntry {
            cache_key: cache_key.to_string(),
            program: built.program,
            uniforms: built.uniforms,
            attributes: built.attributes,
            used_times: 1,
            diagnostics: built.diagnostics,
            state: built.state,
            parameters: parameters.clone(),
        });
        self.by_key.insert(cache_key.to_string(), id);
        Ok(ProgramAcquire { id, created: true })
    }

    /// Drops one acquisition. Deletes the entry and its program at zero.
    ///
    /// Returns `true` if the entry was destroyed.
    pub fn release(
        &mut self,
        device: &mut dyn GraphicsDevice,
        state: &mut StateTracker,
        id: ProgramId,
    ) -> bool {
        let Some(entry) = self.programs.get_mut(id) else {
            return false;
        };
        entry.used_times = entry.used_times.saturating_sub(1);
        if entry.used_times > 0 {
            return false;
        }
        if let Some(entry) = self.programs.remove(id) {
            self.by_key.remove(&entry.cache_key);
            if let Some(program) = entry.program {
                state.forget_program(program);
                device.delete_program(program);
            }
            log::debug!("Released program '{}'.", entry.parameters.shader_name);
        }
        true
    }

    /// Retrieves an entry.
    pub fn get(&self, id: ProgramId) -> Option<&ProgramEntry> {
        self.programs.get(id)
    }

    /// Retrieves an entry mutably.
    pub fn get_mut(&mut self, id: ProgramId) -> Option<&mut ProgramEntry> {
        self.programs.get_mut(id)
    }

    /// Finds the entry built for `cache_key`.
    pub fn find(&self, cache_key: &str) -> Option<ProgramId> {
        self.by_key.get(cache_key).copied()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Returns `true` if no program is cached.
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Iterates every entry.
    pub fn iter(&self) -> impl Iterator<Item = (ProgramId, &ProgramEntry)> {
        self.programs.iter()
    }

    /// Rebuilds an entry invalidated by a context loss.
    ///
    /// Ready and broken entries are left alone.
    pub fn ensure(
        &mut self,
        device: &mut dyn GraphicsDevice,
        id: ProgramId,
    ) -> Result<(), ResourceError> {
        let Some(entry) = self.programs.get(id) else {
            return Ok(());
        };
        if entry.state != ProgramState::Lost {
            return Ok(());
        }
        let parameters = entry.parameters.clone();
        let cache_key = entry.cache_key.clone();
        let built = self.build(device, &parameters, &cache_key);
        if built.state == ProgramState::Lost {
            return Err(ResourceError::ContextLost);
        }
        if let Some(entry) = self.programs.get_mut(id) {
            entry.program = built.program;
            entry.uniforms = built.uniforms;
            entry.attributes = built.attributes;
            entry.diagnostics = built.diagnostics;
            entry.state = built.state;
        }
        Ok(())
    }

    /// Marks every entry lost after a context loss, keeping the reference counts.
    pub fn invalidate(&mut self) {
        for entry in self.programs.values_mut() {
            entry.program = None;
            entry.uniforms = UniformTable::default();
            entry.attributes.clear();
            entry.state = ProgramState::Lost;
        }
    }

    /// Deletes every program and empties the cache.
    pub fn dispose(&mut self, device: &mut dyn GraphicsDevice, state: &mut StateTracker) {
        for (_, entry) in self.programs.drain() {
            if let Some(program) = entry.program {
                state.forget_program(program);
                device.delete_program(program);
            }
        }
        self.by_key.clear();
    }

    /// Assembles, compiles and links the program of `parameters`.
    fn build(
        &self,
        device: &mut dyn GraphicsDevice,
        parameters: &ProgramParameters,
        cache_key: &str,
    ) -> Built {
        let name = &parameters.shader_name;
        let (vertex, fragment) = match self.sources(parameters) {
            Ok(sources) => sources,
            Err(error) => {
                let details = ShaderError::Preprocess(error.to_string()).to_string();
                log::error!("Program '{name}' could not be assembled: {details}");
                return Built::broken(None, details);
            }
        };

        let vs = match device.create_shader(ShaderStage::Vertex, &vertex) {
            Ok(shader) => shader,
            Err(ResourceError::ContextLost) => return Built::lost(),
            Err(error) => return Built::broken(None, error.to_string()),
        };
        let fs = match device.create_shader(ShaderStage::Fragment, &fragment) {
            Ok(shader) => shader,
            Err(error) => {
                device.delete_shader(vs);
                return match error {
                    ResourceError::ContextLost => Built::lost(),
                    error => Built::broken(None, error.to_string()),
                };
            }
        };
        let program = match device.create_program(vs, fs) {
            Ok(program) => program,
            Err(error) => {
                device.delete_shader(vs);
                device.delete_shader(fs);
                return match error {
                    ResourceError::ContextLost => Built::lost(),
                    error => Built::broken(None, error.to_string()),
                };
            }
        };

        let failure = if self.check_errors {
            self.check(&*device, name, program, [(vs, &vertex), (fs, &fragment)])
        } else {
            None
        };
        device.delete_shader(vs);
        device.delete_shader(fs);

        if let Some(error) = failure {
            log::error!("{error}");
            return Built::broken(Some(program), error.to_string());
        }

        log::info!("Compiled program '{name}' ({cache_key}).");
        Built {
            program: Some(program),
            uniforms: UniformTable::from_active(device.active_uniforms(program)),
            attributes: device
                .active_attributes(program)
                .into_iter()
                .map(|a| (a.name.clone(), a))
                .collect(),
            diagnostics: None,
            state: ProgramState::Ready,
        }
    }

    /// Queries compile and link statuses, returning the first failure.
    fn check(
        &self,
        device: &dyn GraphicsDevice,
        name: &str,
        program: ProgramHandle,
        stages: [(ShaderHandle, &String); 2],
    ) -> Option<ShaderError> {
        for ((shader, source), stage) in stages
            .into_iter()
            .zip([ShaderStage::Vertex, ShaderStage::Fragment])
        {
            if !device.shader_compile_status(shader) {
                let log = device.shader_info_log(shader);
                return Some(ShaderError::CompilationFailed {
                    label: name.to_string(),
                    stage,
                    details: annotate(&log, source),
                });
            }
        }
        if !device.program_link_status(program) {
            return Some(ShaderError::LinkFailed {
                label: name.to_string(),
                details: device.program_info_log(program),
            });
        }
        None
    }

    /// Produces the final vertex and fragment sources.
    fn sources(&self, parameters: &ProgramParameters) -> Result<(String, String), PreprocessError> {
        let (vertex, fragment) = match (&parameters.shader_id, &parameters.custom) {
            (Some(id), _) => shaders::template(id).ok_or_else(|| PreprocessError::UnknownChunk {
                name: id.to_string(),
                chain: Vec::new(),
            })?,
            (None, Some(custom)) => (custom.vertex.as_str(), custom.fragment.as_str()),
            (None, None) => {
                return Err(PreprocessError::UnknownChunk {
                    name: parameters.shader_name.clone(),
                    chain: Vec::new(),
                })
            }
        };

        let mut prefix = String::from("#version 300 es\n");
        let precision = parameters.precision.as_glsl();
        prefix.push_str(&format!("precision {precision} float;\nprecision {precision} int;\n"));
        prefix.push_str(&format!("#define SHADER_NAME {}\n", parameters.shader_name));
        for line in parameters.define_lines() {
            prefix.push_str(&line);
            prefix.push('\n');
        }

        let assemble = |body: &str| -> Result<String, PreprocessError> {
            let source = self.chunks.resolve_includes(body)?;
            let source = replace_light_nums(&source, &parameters.lights, &parameters.clipping);
            let source = unroll_loops(&source)?;
            Ok(format!("{prefix}{source}"))
        };
        Ok((assemble(vertex)?, assemble(fragment)?))
    }
}

/// Adds the numbered source lines around each `ERROR: 0:<line>:` entry of `log`.
fn annotate(log: &str, source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut out = log.trim_end().to_string();
    for entry in log.lines() {
        let Some(line) = entry
            .strip_prefix("ERROR: 0:")
            .and_then(|rest| rest.split(':').next())
            .and_then(|n| n.trim().parse::<usize>().ok())
        else {
            continue;
        };
        let from = line.saturating_sub(ERROR_CONTEXT_LINES).max(1);
        let to = (line + ERROR_CONTEXT_LINES).min(lines.len());
        out.push('\n');
        for number in from..=to {
            let marker = if number == line { '>' } else { ' ' };
            let text = lines.get(number - 1).copied().unwrap_or("");
            out.push_str(&format!("\n{marker}{number:>5}: {text}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program_lane::parameters::{
        ClippingCounts, LightCounts, ObjectFeatures, ParameterContext,
    };
    use lumen_core::renderer::{Capabilities, RendererSettings};
    use lumen_core::resource::Material;
    use lumen_core::Color;
    use lumen_infra::{DeviceCall, HeadlessDevice};

    fn parameters(material: &Material, device: &HeadlessDevice) -> ProgramParameters {
        let settings = RendererSettings::default();
        let caps = Capabilities::probe(device, &settings);
        let ctx = ParameterContext {
            settings: &settings,
            capabilities: &caps,
            lights: LightCounts {
                directional: 1,
                ..LightCounts::default()
            },
            shadow_map_enabled: false,
            fog: None,
            object: ObjectFeatures::default(),
            clipping: ClippingCounts::default(),
            render_target: false,
        };
        ProgramParameters::from_material(material, &ctx)
    }

    #[test]
    fn test_shared_key_reuses_the_entry() {
        // --- 1. ARRANGE ---
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut cache = ProgramCache::new(true);
        let params = parameters(&Material::lambert(Color::WHITE), &probe);
        let key = params.cache_key();

        // --- 2. ACT ---
        let first = cache.acquire(&mut device, &params, &key).unwrap();
        let second = cache.acquire(&mut device, &params, &key).unwrap();

        // --- 3. ASSERT ---
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        let entry = cache.get(first.id).unwrap();
        assert_eq!(entry.used_times, 2);
        assert!(entry.is_ready(), "{:?}", entry.diagnostics);
        assert!(entry.uniforms.has("diffuse"));
        assert!(entry.attributes.contains_key("position"));
        assert_eq!(
            probe.count_calls(|c| matches!(c, DeviceCall::CreateProgram(_))),
            1
        );
    }

    #[test]
    fn test_release_at_zero_deletes_the_program() {
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut state = StateTracker::new(&probe);
        let mut cache = ProgramCache::new(true);
        let params = parameters(&Material::basic(Color::WHITE), &probe);
        let key = params.cache_key();
        let id = cache.acquire(&mut device, &params, &key).unwrap().id;
        cache.acquire(&mut device, &params, &key).unwrap();

        assert!(!cache.release(&mut device, &mut state, id));
        assert_eq!(probe.live_programs(), 1);
        assert!(cache.release(&mut device, &mut state, id));
        assert_eq!(probe.live_programs(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.find(&key), None);
    }

    #[test]
    fn test_compile_error_yields_a_broken_entry() {
        // --- 1. ARRANGE ---
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut cache = ProgramCache::new(true);
        let material = Material::shader(
            "void main() { gl_Position = vec4( 0.0 ); }",
            "#error broken on purpose\nvoid main() {}",
        );
        let params = parameters(&material, &probe);

        // --- 2. ACT ---
        let acquired = cache
            .acquire(&mut device, &params, &params.cache_key())
            .unwrap();

        // --- 3. ASSERT ---
        let entry = cache.get(acquired.id).unwrap();
        assert_eq!(entry.state, ProgramState::Broken);
        assert!(entry.program.is_some());
        let log = entry.diagnostics.as_deref().unwrap();
        assert!(log.contains("broken on purpose"));
        assert!(log.contains(">"), "annotated source expected: {log}");
    }

    #[test]
    fn test_include_cycle_yields_a_broken_entry_without_program() {
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut cache = ProgramCache::new(true);
        cache.chunks_mut().register("a", "#include <b>");
        cache.chunks_mut().register("b", "#include <a>");
        let material = Material::shader("#include <a>\nvoid main() {}", "void main() {}");
        let params = parameters(&material, &probe);

        let id = cache
            .acquire(&mut device, &params, &params.cache_key())
            .unwrap()
            .id;

        let entry = cache.get(id).unwrap();
        assert_eq!(entry.state, ProgramState::Broken);
        assert_eq!(entry.program, None);
        assert!(entry.diagnostics.as_deref().unwrap().contains("a -> b -> a"));
        assert_eq!(
            probe.count_calls(|c| matches!(c, DeviceCall::CreateShader(..))),
            0
        );
    }

    #[test]
    fn test_lost_entries_are_rebuilt_on_ensure() {
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut cache = ProgramCache::new(true);
        let params = parameters(&Material::phong(Color::WHITE, 30.0), &probe);
        let id = cache
            .acquire(&mut device, &params, &params.cache_key())
            .unwrap()
            .id;

        probe.lose_context();
        cache.invalidate();
        assert!(matches!(
            cache.ensure(&mut device, id),
            Err(ResourceError::ContextLost)
        ));
        probe.restore_context();
        cache.ensure(&mut device, id).unwrap();

        let entry = cache.get(id).unwrap();
        assert!(entry.is_ready());
        assert_eq!(entry.used_times, 1);
    }
}
