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

//! The device-side tables owned by one renderer.

use lumen_core::renderer::{GraphicsDevice, MemoryInfo, RendererSettings};
use lumen_core::resource::{AttributeId, GeometryKey, MaterialId, TextureKey};
use lumen_lanes::gpu_lane::{
    BufferTable, GeometryUpdater, MaterialProperties, RenderTargetTable, TextureTable,
};
use lumen_lanes::program_lane::ProgramCache;
use lumen_lanes::render_lane::{BindingStates, StateTracker};

/// Every table mirroring CPU resources on the device, plus the state mirrors.
///
/// Kept together so a draw can borrow all of them at once while the renderer
/// lends out its scene-side data separately.
#[derive(Debug)]
pub(crate) struct GpuTables {
    pub state: StateTracker,
    pub bindings: BindingStates,
    pub buffers: BufferTable,
    pub textures: TextureTable,
    pub targets: RenderTargetTable,
    pub geometries: GeometryUpdater,
    pub properties: MaterialProperties,
    pub programs: ProgramCache,
}

impl GpuTables {
    pub fn new(device: &dyn GraphicsDevice, settings: &RendererSettings) -> Self {
        Self {
            state: StateTracker::new(device),
            bindings: BindingStates::new(),
            buffers: BufferTable::new(),
            textures: TextureTable::new(),
            targets: RenderTargetTable::new(),
            geometries: GeometryUpdater::new(),
            properties: MaterialProperties::new(),
            programs: ProgramCache::new(settings.check_shader_errors),
        }
    }

    pub fn dispose_geometry(
        &mut self,
        device: &mut dyn GraphicsDevice,
        key: GeometryKey,
        memory: &mut MemoryInfo,
    ) {
        let tracked = self.geometries.dispose_geometry(
            device,
            &mut self.bindings,
            &mut self.buffers,
            key,
            memory,
        );
        if tracked {
            log::debug!("Freed geometry {key:?}.");
        }
    }

    /// Releases the programs of a material. Returns the number destroyed.
    pub fn dispose_material(&mut self, device: &mut dyn GraphicsDevice, id: MaterialId) -> usize {
        self.properties
            .dispose_material(device, &mut self.state, &mut self.programs, id)
    }

    pub fn dispose_texture(
        &mut self,
        device: &mut dyn GraphicsDevice,
        key: TextureKey,
        memory: &mut MemoryInfo,
    ) {
        if self.textures.remove(device, &mut self.state, key, memory) {
            log::debug!("Freed texture {key:?}.");
        }
    }

    pub fn dispose_attributes(
        &mut self,
        device: &mut dyn GraphicsDevice,
        attributes: &[AttributeId],
        memory: &mut MemoryInfo,
    ) {
        for id in attributes {
            self.buffers.remove(device, &mut self.bindings, *id, memory);
        }
    }

    /// Drops every device object without talking to the device.
    pub fn invalidate(&mut self, memory: &mut MemoryInfo) {
        self.bindings.invalidate();
        self.buffers.invalidate(memory);
        self.textures.invalidate(memory);
        self.targets.invalidate(memory);
        self.geometries.invalidate(memory);
        self.properties.invalidate();
        self.programs.invalidate();
    }

    /// Deletes every device object.
    pub fn dispose(&mut self, device: &mut dyn GraphicsDevice, memory: &mut MemoryInfo) {
        self.properties
            .dispose(device, &mut self.state, &mut self.programs);
        self.programs.dispose(device, &mut self.state);
        self.geometries
            .dispose(device, &mut self.bindings, &mut self.buffers, memory);
        self.buffers.dispose(device, &mut self.bindings, memory);
        self.textures.dispose(device, &mut self.state, memory);
        self.targets.dispose(device, &mut self.state, memory);
        self.bindings.reset(device);
    }
}
