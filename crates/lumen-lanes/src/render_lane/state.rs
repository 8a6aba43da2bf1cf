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

//! A write-through mirror of the device pipeline state.
//!
//! Every pipeline mutation the renderer makes goes through the [`StateTracker`].
//! Each setter compares the requested value against the snapshot and only talks
//! to the device on change, so replaying a setter sequence is free.

use ahash::AHashMap;
use lumen_core::renderer::{
    BlendEquation, BlendFactor, Blending, Capability, ColorMask, CompareFunction, CullFace,
    CustomBlend, FramebufferHandle, FrontFace, GraphicsDevice, ProgramHandle, Rect, Side,
    StencilOperation, TextureHandle, TextureTarget,
};
use lumen_core::resource::Material;

/// Blend equations and factors as the device sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlendParams {
    equation: (BlendEquation, BlendEquation),
    /// `(src color, dst color, src alpha, dst alpha)`
    factors: (BlendFactor, BlendFactor, BlendFactor, BlendFactor),
}

impl Default for BlendParams {
    fn default() -> Self {
        Self {
            equation: (BlendEquation::Add, BlendEquation::Add),
            factors: (
                BlendFactor::One,
                BlendFactor::Zero,
                BlendFactor::One,
                BlendFactor::Zero,
            ),
        }
    }
}

impl BlendParams {
    /// The preset factors of a blending mode.
    fn for_mode(blending: Blending, custom: &CustomBlend, premultiplied: bool) -> Self {
        use BlendFactor::*;
        let add = (BlendEquation::Add, BlendEquation::Add);
        let (equation, factors) = match (blending, premultiplied) {
            (Blending::Custom, _) => (
                (custom.equation, custom.equation_alpha.unwrap_or(custom.equation)),
                (
                    custom.src,
                    custom.dst,
                    custom.src_alpha.unwrap_or(custom.src),
                    custom.dst_alpha.unwrap_or(custom.dst),
                ),
            ),
            (Blending::Additive, true) => (add, (One, One, One, One)),
            (Blending::Additive, false) => (add, (SrcAlpha, One, One, One)),
            (Blending::Subtractive, _) => (add, (Zero, OneMinusSrcColor, Zero, One)),
            (Blending::Multiply, true) => (add, (Zero, SrcColor, Zero, SrcAlpha)),
            (Blending::Multiply, false) => (add, (Zero, SrcColor, Zero, SrcColor)),
            (Blending::Normal | Blending::None, true) => {
                (add, (One, OneMinusSrcAlpha, One, OneMinusSrcAlpha))
            }
            (Blending::Normal | Blending::None, false) => {
                (add, (SrcAlpha, OneMinusSrcAlpha, One, OneMinusSrcAlpha))
            }
        };
        Self { equation, factors }
    }
}

/// Stencil function and operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StencilParams {
    func: (CompareFunction, i32, u32),
    ops: (StencilOperation, StencilOperation, StencilOperation),
    write_mask: u32,
}

impl Default for StencilParams {
    fn default() -> Self {
        Self {
            func: (CompareFunction::Always, 0, u32::MAX),
            ops: (
                StencilOperation::Keep,
                StencilOperation::Keep,
                StencilOperation::Keep,
            ),
            write_mask: u32::MAX,
        }
    }
}

/// The mirrored pipeline state.
#[derive(Debug, Clone, PartialEq)]
struct StateSnapshot {
    capabilities: AHashMap<Capability, bool>,
    blend: BlendParams,
    depth_func: CompareFunction,
    depth_mask: bool,
    color_mask: ColorMask,
    stencil: StencilParams,
    cull_face: CullFace,
    front_face: FrontFace,
    polygon_offset: (f32, f32),
    line_width: f32,
    scissor: Rect,
    viewport: Rect,
    clear_color: [f32; 4],
    clear_depth: f32,
    clear_stencil: i32,
    active_unit: u32,
    textures: AHashMap<(u32, TextureTarget), TextureHandle>,
    program: Option<ProgramHandle>,
    framebuffer: Option<FramebufferHandle>,
}

impl StateSnapshot {
    /// The state of a freshly created context with a `width` x `height` drawing buffer.
    fn initial(width: u32, height: u32) -> Self {
        let full = Rect::new(0, 0, width as i32, height as i32);
        Self {
            capabilities: Capability::ALL.iter().map(|&c| (c, false)).collect(),
            blend: BlendParams::default(),
            depth_func: CompareFunction::Less,
            depth_mask: true,
            color_mask: ColorMask::ALL,
            stencil: StencilParams::default(),
            cull_face: CullFace::Back,
            front_face: FrontFace::Ccw,
            polygon_offset: (0.0, 0.0),
            line_width: 1.0,
            scissor: full,
            viewport: full,
            clear_color: [0.0; 4],
            clear_depth: 1.0,
            clear_stencil: 0,
            active_unit: 0,
            textures: AHashMap::new(),
            program: None,
            framebuffer: None,
        }
    }
}

/// Diffs pipeline state changes against a snapshot of the device.
#[derive(Debug)]
pub struct StateTracker {
    current: StateSnapshot,
}

impl StateTracker {
    /// Creates a tracker assuming `device` is in its initial state.
    pub fn new(device: &dyn GraphicsDevice) -> Self {
        let (width, height) = device.drawing_buffer_size();
        Self {
            current: StateSnapshot::initial(width, height),
        }
    }

    /// Drives the device back to the default state and resets the snapshot.
    ///
    /// Every default is issued explicitly, whatever the snapshot believes, so the
    /// tracker is trustworthy again after a context restoration.
    pub fn reset(&mut self, device: &mut dyn GraphicsDevice) {
        let (width, height) = device.drawing_buffer_size();
        let state = StateSnapshot::initial(width, height);

        for capability in Capability::ALL {
            device.disable(capability);
        }
        device.blend_equation_separate(state.blend.equation.0, state.blend.equation.1);
        let (sc, dc, sa, da) = state.blend.factors;
        device.blend_func_separate(sc, dc, sa, da);
        device.depth_func(state.depth_func);
        device.depth_mask(state.depth_mask);
        device.color_mask(state.color_mask);
        let (func, reference, mask) = state.stencil.func;
        device.stencil_func(func, reference, mask);
        let (fail, z_fail, z_pass) = state.stencil.ops;
        device.stencil_op(fail, z_fail, z_pass);
        device.stencil_mask(state.stencil.write_mask);
        device.cull_face(state.cull_face);
        device.front_face(state.front_face);
        device.polygon_offset(state.polygon_offset.0, state.polygon_offset.1);
        device.line_width(state.line_width);
        device.scissor(state.scissor);
        device.viewport(state.viewport);
        device.clear_color(state.clear_color);
        device.clear_depth(state.clear_depth);
        device.clear_stencil(state.clear_stencil);
        device.active_texture(0);
        device.bind_texture(TextureTarget::Texture2D, None);
        device.bind_texture(TextureTarget::CubeMap, None);
        device.use_program(None);
        device.bind_framebuffer(None);

        self.current = state;
        log::debug!("Pipeline state reset to defaults ({width}x{height}).");
    }

    // --- Capabilities ---

    /// Returns `true` if `capability` is enabled.
    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.current
            .capabilities
            .get(&capability)
            .copied()
            .unwrap_or(false)
    }

    /// Enables a capability.
    pub fn enable(&mut self, device: &mut dyn GraphicsDevice, capability: Capability) {
        if !self.is_enabled(capability) {
            device.enable(capability);
            self.current.capabilities.insert(capability, true);
        }
    }

    /// Disables a capability.
    pub fn disable(&mut self, device: &mut dyn GraphicsDevice, capability: Capability) {
        if self.is_enabled(capability) {
            device.disable(capability);
            self.current.capabilities.insert(capability, false);
        }
    }

    fn set_enabled(&mut self, device: &mut dyn GraphicsDevice, capability: Capability, on: bool) {
        if on {
            self.enable(device, capability);
        } else {
            self.disable(device, capability);
        }
    }

    // --- Blending ---

    /// Applies a blending mode.
    ///
    /// `Blending::None` only disables blending; the factors stay as they were.
    pub fn set_blending(
        &mut self,
        device: &mut dyn GraphicsDevice,
        blending: Blending,
        custom: &CustomBlend,
        premultiplied_alpha: bool,
    ) {
        if blending == Blending::None {
            self.disable(device, Capability::Blend);
            return;
        }
        self.enable(device, Capability::Blend);

        let params = BlendParams::for_mode(blending, custom, premultiplied_alpha);
        if params.equation != self.current.blend.equation {
            device.blend_equation_separate(params.equation.0, params.equation.1);
            self.current.blend.equation = params.equation;
        }
        if params.factors != self.current.blend.factors {
            let (sc, dc, sa, da) = params.factors;
            device.blend_func_separate(sc, dc, sa, da);
            self.current.blend.factors = params.factors;
        }
    }

    // --- Depth & color ---

    /// Enables or disables depth testing.
    pub fn set_depth_test(&mut self, device: &mut dyn GraphicsDevice, enabled: bool) {
        self.set_enabled(device, Capability::DepthTest, enabled);
    }

    /// Enables or disables depth writes.
    pub fn set_depth_mask(&mut self, device: &mut dyn GraphicsDevice, write: bool) {
        if self.current.depth_mask != write {
            device.depth_mask(write);
            self.current.depth_mask = write;
        }
    }

    /// Sets the depth comparison function.
    pub fn set_depth_func(&mut self, device: &mut dyn GraphicsDevice, func: CompareFunction) {
        if self.current.depth_func != func {
            device.depth_func(func);
            self.current.depth_func = func;
        }
    }

    /// Sets the color write mask.
    pub fn set_color_mask(&mut self, device: &mut dyn GraphicsDevice, mask: ColorMask) {
        if self.current.color_mask != mask {
            device.color_mask(mask);
            self.current.color_mask = mask;
        }
    }

    // --- Stencil ---

    /// Enables or disables stencil testing.
    pub fn set_stencil_test(&mut self, device: &mut dyn GraphicsDevice, enabled: bool) {
        self.set_enabled(device, Capability::StencilTest, enabled);
    }

    /// Sets the stencil comparison.
    pub fn set_stencil_func(
        &mut self,
        device: &mut dyn GraphicsDevice,
        func: CompareFunction,
        reference: i32,
        mask: u32,
    ) {
        let value = (func, reference, mask);
        if self.current.stencil.func != value {
            device.stencil_func(func, reference, mask);
            self.current.stencil.func = value;
        }
    }

    /// Sets the stencil operations.
    pub fn set_stencil_op(
        &mut self,
        device: &mut dyn GraphicsDevice,
        fail: StencilOperation,
        z_fail: StencilOperation,
        z_pass: StencilOperation,
    ) {
        let value = (fail, z_fail, z_pass);
        if self.current.stencil.ops != value {
            device.stencil_op(fail, z_fail, z_pass);
            self.current.stencil.ops = value;
        }
    }

    /// Sets the stencil write mask.
    pub fn set_stencil_mask(&mut self, device: &mut dyn GraphicsDevice, mask: u32) {
        if self.current.stencil.write_mask != mask {
            device.stencil_mask(mask);
            self.current.stencil.write_mask = mask;
        }
    }

    // --- Rasterization ---

    /// Culls `face`, or disables culling with `None`.
    pub fn set_cull_face(&mut self, device: &mut dyn GraphicsDevice, face: Option<CullFace>) {
        let Some(face) = face else {
            self.disable(device, Capability::CullFace);
            return;
        };
        self.enable(device, Capability::CullFace);
        if self.current.cull_face != face {
            device.cull_face(face);
            self.current.cull_face = face;
        }
    }

    /// Treats clockwise faces as front faces when `flipped`.
    pub fn set_flip_sided(&mut self, device: &mut dyn GraphicsDevice, flipped: bool) {
        let face = if flipped { FrontFace::Cw } else { FrontFace::Ccw };
        if self.current.front_face != face {
            device.front_face(face);
            self.current.front_face = face;
        }
    }

    /// Enables polygon offset with the given factor and units, or disables it.
    pub fn set_polygon_offset(&mut self, device: &mut dyn GraphicsDevice, offset: Option<(f32, f32)>) {
        let Some(offset) = offset else {
            self.disable(device, Capability::PolygonOffsetFill);
            return;
        };
        self.enable(device, Capability::PolygonOffsetFill);
        if self.current.polygon_offset != offset {
            device.polygon_offset(offset.0, offset.1);
            self.current.polygon_offset = offset;
        }
    }

    /// Sets the rasterized line width.
    pub fn set_line_width(&mut self, device: &mut dyn GraphicsDevice, width: f32) {
        if self.current.line_width != width {
            device.line_width(width);
            self.current.line_width = width;
        }
    }

    // --- Viewport, scissor, clear ---

    /// The current viewport.
    pub fn viewport(&self) -> Rect {
        self.current.viewport
    }

    /// Sets the viewport.
    pub fn set_viewport(&mut self, device: &mut dyn GraphicsDevice, rect: Rect) {
        if self.current.viewport != rect {
            device.viewport(rect);
            self.current.viewport = rect;
        }
    }

    /// Sets the scissor rectangle.
    pub fn set_scissor(&mut self, device: &mut dyn GraphicsDevice, rect: Rect) {
        if self.current.scissor != rect {
            device.scissor(rect);
            self.current.scissor = rect;
        }
    }

    /// Enables or disables the scissor test.
    pub fn set_scissor_test(&mut self, device: &mut dyn GraphicsDevice, enabled: bool) {
        self.set_enabled(device, Capability::ScissorTest, enabled);
    }

    /// Sets the color used by color clears.
    pub fn set_clear_color(&mut self, device: &mut dyn GraphicsDevice, rgba: [f32; 4]) {
        if self.current.clear_color != rgba {
            device.clear_color(rgba);
            self.current.clear_color = rgba;
        }
    }

    /// Sets the value used by depth clears.
    pub fn set_clear_depth(&mut self, device: &mut dyn GraphicsDevice, depth: f32) {
        if self.current.clear_depth != depth {
            device.clear_depth(depth);
            self.current.clear_depth = depth;
        }
    }

    /// Sets the value used by stencil clears.
    pub fn set_clear_stencil(&mut self, device: &mut dyn GraphicsDevice, stencil: i32) {
        if self.current.clear_stencil != stencil {
            device.clear_stencil(stencil);
            self.current.clear_stencil = stencil;
        }
    }

    // --- Bindings ---

    /// The program in use.
    pub fn program(&self) -> Option<ProgramHandle> {
        self.current.program
    }

    /// Makes `program` current. Returns `true` if the binding changed.
    pub fn use_program(
        &mut self,
        device: &mut dyn GraphicsDevice,
        program: Option<ProgramHandle>,
    ) -> bool {
        if self.current.program == program {
            return false;
        }
        device.use_program(program);
        self.current.program = program;
        true
    }

    /// Forgets a deleted program.
    pub fn forget_program(&mut self, program: ProgramHandle) {
        if self.current.program == Some(program) {
            self.current.program = None;
        }
    }

    /// The bound framebuffer, `None` for the default one.
    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.current.framebuffer
    }

    /// Binds a framebuffer. Returns `true` if the binding changed.
    pub fn bind_framebuffer(
        &mut self,
        device: &mut dyn GraphicsDevice,
        framebuffer: Option<FramebufferHandle>,
    ) -> bool {
        if self.current.framebuffer == framebuffer {
            return false;
        }
        device.bind_framebuffer(framebuffer);
        self.current.framebuffer = framebuffer;
        true
    }

    /// Forgets a deleted framebuffer.
    pub fn forget_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if self.current.framebuffer == Some(framebuffer) {
            self.current.framebuffer = None;
        }
    }

    /// Selects the active texture unit.
    pub fn active_texture(&mut self, device: &mut dyn GraphicsDevice, unit: u32) {
        if self.current.active_unit != unit {
            device.active_texture(unit);
            self.current.active_unit = unit;
        }
    }

    /// The texture bound to `target` on `unit`.
    pub fn bound_texture(&self, unit: u32, target: TextureTarget) -> Option<TextureHandle> {
        self.current.textures.get(&(unit, target)).copied()
    }

    /// Binds a texture to `target`, on `unit` or on the active unit when `None`.
    pub fn bind_texture(
        &mut self,
        device: &mut dyn GraphicsDevice,
        target: TextureTarget,
        texture: Option<TextureHandle>,
        unit: Option<u32>,
    ) {
        let unit = unit.unwrap_or(self.current.active_unit);
        if self.bound_texture(unit, target) == texture {
            return;
        }
        self.active_texture(device, unit);
        device.bind_texture(target, texture);
        match texture {
            Some(handle) => self.current.textures.insert((unit, target), handle),
            None => self.current.textures.remove(&(unit, target)),
        };
    }

    /// Clears every unit slot holding a deleted texture.
    pub fn unbind_texture(&mut self, texture: TextureHandle) {
        self.current.textures.retain(|_, bound| *bound != texture);
    }

    // --- Materials ---

    /// Applies the render state of a material.
    ///
    /// `front_face_cw` is set when the object's world transform mirrors it.
    pub fn set_material(
        &mut self,
        device: &mut dyn GraphicsDevice,
        material: &Material,
        front_face_cw: bool,
    ) {
        self.set_side(device, material.side, front_face_cw);

        if material.blending == Blending::Normal && !material.transparent {
            self.set_blending(device, Blending::None, &material.custom_blend, false);
        } else {
            self.set_blending(
                device,
                material.blending,
                &material.custom_blend,
                material.premultiplied_alpha,
            );
        }

        self.set_depth_func(device, material.depth_func);
        self.set_depth_test(device, material.depth_test);
        self.set_depth_mask(device, material.depth_write);
        self.set_color_mask(device, ColorMask::splat(material.color_write));

        let stencil = &material.stencil;
        self.set_stencil_test(device, stencil.enabled);
        if stencil.enabled {
            self.set_stencil_mask(device, stencil.write_mask);
            self.set_stencil_func(device, stencil.func, stencil.reference, stencil.func_mask);
            self.set_stencil_op(device, stencil.fail, stencil.z_fail, stencil.z_pass);
        }

        self.set_polygon_offset(
            device,
            material.polygon_offset.map(|offset| (offset.factor, offset.units)),
        );
        self.set_enabled(
            device,
            Capability::SampleAlphaToCoverage,
            material.alpha_to_coverage,
        );
    }

    /// Culls according to `side`; back-sided faces flip the front face.
    pub fn set_side(&mut self, device: &mut dyn GraphicsDevice, side: Side, front_face_cw: bool) {
        if side == Side::Double {
            self.set_cull_face(device, None);
        } else {
            self.set_cull_face(device, Some(CullFace::Back));
        }
        let flipped = (side == Side::Back) != front_face_cw;
        self.set_flip_sided(device, flipped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::color::Color;
    use lumen_infra::HeadlessDevice;

    #[test]
    fn test_replaying_setters_issues_no_calls() {
        // --- 1. ARRANGE ---
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut state = StateTracker::new(&device);
        let mut material = Material::lambert(Color::WHITE);
        material.transparent = true;
        material.side = Side::Double;

        let apply = |state: &mut StateTracker, device: &mut HeadlessDevice| {
            state.set_material(device, &material, false);
            state.set_viewport(device, Rect::new(0, 0, 320, 240));
            state.set_scissor(device, Rect::new(10, 10, 20, 20));
            state.set_scissor_test(device, true);
            state.set_clear_color(device, [0.1, 0.2, 0.3, 1.0]);
            state.set_line_width(device, 2.0);
            state.bind_texture(device, TextureTarget::Texture2D, Some(TextureHandle(7)), Some(3));
        };
        apply(&mut state, &mut device);
        let first_pass = probe.call_count();

        // --- 2. ACT ---
        probe.clear_calls();
        apply(&mut state, &mut device);

        // --- 3. ASSERT ---
        assert!(first_pass > 0);
        assert_eq!(probe.call_count(), 0, "replay issued {:?}", probe.calls());
    }

    #[test]
    fn test_normal_opaque_material_disables_blending() {
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut state = StateTracker::new(&device);
        let mut material = Material::basic(Color::WHITE);

        state.set_material(&mut device, &material, false);
        assert!(!state.is_enabled(Capability::Blend));

        material.transparent = true;
        state.set_material(&mut device, &material, false);
        assert!(state.is_enabled(Capability::Blend));
        assert_eq!(
            state.current.blend.factors,
            (
                BlendFactor::SrcAlpha,
                BlendFactor::OneMinusSrcAlpha,
                BlendFactor::One,
                BlendFactor::OneMinusSrcAlpha
            )
        );
    }

    #[test]
    fn test_premultiplied_blend_presets() {
        let custom = CustomBlend::default();
        let additive = BlendParams::for_mode(Blending::Additive, &custom, true);
        assert_eq!(
            additive.factors,
            (BlendFactor::One, BlendFactor::One, BlendFactor::One, BlendFactor::One)
        );
        let multiply = BlendParams::for_mode(Blending::Multiply, &custom, false);
        assert_eq!(multiply.factors.1, BlendFactor::SrcColor);
        let custom = CustomBlend {
            equation: BlendEquation::Max,
            src: BlendFactor::DstColor,
            ..CustomBlend::default()
        };
        let params = BlendParams::for_mode(Blending::Custom, &custom, false);
        assert_eq!(params.equation, (BlendEquation::Max, BlendEquation::Max));
        assert_eq!(params.factors.2, BlendFactor::DstColor);
    }

    #[test]
    fn test_back_side_with_mirrored_transform_keeps_ccw() {
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut state = StateTracker::new(&device);

        state.set_side(&mut device, Side::Back, true);

        assert_eq!(state.current.front_face, FrontFace::Ccw);
        assert!(state.is_enabled(Capability::CullFace));
        state.set_side(&mut device, Side::Back, false);
        assert_eq!(state.current.front_face, FrontFace::Cw);
    }

    #[test]
    fn test_unbind_texture_clears_every_slot() {
        // --- 1. ARRANGE ---
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut state = StateTracker::new(&device);
        let texture = TextureHandle(4);
        state.bind_texture(&mut device, TextureTarget::Texture2D, Some(texture), Some(0));
        state.bind_texture(&mut device, TextureTarget::Texture2D, Some(texture), Some(2));

        // --- 2. ACT ---
        state.unbind_texture(texture);

        // --- 3. ASSERT ---
        assert_eq!(state.bound_texture(0, TextureTarget::Texture2D), None);
        assert_eq!(state.bound_texture(2, TextureTarget::Texture2D), None);
    }

    #[test]
    fn test_reset_issues_defaults_and_restores_snapshot() {
        // --- 1. ARRANGE ---
        let probe = HeadlessDevice::new();
        let mut device = probe.clone();
        let mut state = StateTracker::new(&device);
        state.enable(&mut device, Capability::DepthTest);
        state.use_program(&mut device, Some(ProgramHandle(9)));
        probe.clear_calls();

        // --- 2. ACT ---
        state.reset(&mut device);

        // --- 3. ASSERT ---
        let (w, h) = device.drawing_buffer_size();
        assert_eq!(state.current, StateSnapshot::initial(w, h));
        assert!(probe.count_calls(|c| matches!(c, lumen_infra::DeviceCall::Disable(_))) >= 7);
        assert!(!state.use_program(&mut device, None));
    }
}
