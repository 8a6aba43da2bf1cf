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

//! The `GraphicsDevice` contract: an OpenGL / WebGL shaped immediate-mode device.
//!
//! The device is a thin, stateful command surface. It performs no caching of its own:
//! redundant-call elimination is the job of the renderer's state tracker, which is why
//! every state setter here maps one-to-one onto a single backend call.

use super::error::ResourceError;
use super::format::*;
use super::handles::*;
use super::state::*;
use super::uniform::{ActiveAttribute, ActiveUniform, UniformValue};
use std::any::Any;
use std::fmt::Debug;

/// An implementation-defined limit queried once by the capabilities probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Limit {
    MaxTextureSize,
    MaxCubeMapTextureSize,
    MaxRenderbufferSize,
    MaxTextureImageUnits,
    MaxVertexTextureImageUnits,
    MaxCombinedTextureImageUnits,
    MaxVertexAttribs,
    MaxVertexUniformVectors,
    MaxFragmentUniformVectors,
    MaxVaryingVectors,
    MaxSamples,
    MaxAnisotropy,
}

/// The immediate-mode graphics device the renderer drives.
///
/// Methods take `&mut self` because the device holds mutable binding state
/// (current program, bound buffers, active texture unit...). Object creation may
/// fail when the context is lost or the device is out of memory.
pub trait GraphicsDevice: Debug + 'static {
    /// Returns the device as `&dyn Any` for downcasting in tests and tools.
    fn as_any(&self) -> &dyn Any;

    /// Returns the device as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    // --- Context ---

    /// Returns `true` while the underlying context is lost.
    fn is_context_lost(&self) -> bool;

    /// Queries an implementation limit.
    fn get_limit(&self, limit: Limit) -> u32;

    /// Checks for a named extension.
    fn has_extension(&self, name: &str) -> bool;

    /// Checks whether a float precision is supported in a given stage.
    fn supports_precision(&self, stage: ShaderStage, precision: Precision) -> bool;

    /// The size in pixels of the default framebuffer.
    fn drawing_buffer_size(&self) -> (u32, u32);

    // --- Buffers ---

    /// Creates a new, storage-less buffer object.
    fn create_buffer(&mut self) -> Result<BufferHandle, ResourceError>;

    /// Deletes a buffer object. Deleting an unknown handle is a no-op.
    fn delete_buffer(&mut self, buffer: BufferHandle);

    /// Binds a buffer (or nothing) to a target.
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>);

    /// (Re)specifies the storage of the buffer bound to `target` and fills it.
    /// ## Arguments
    /// * `target` - The binding point whose buffer is specified.
    /// * `data` - The new contents; its length becomes the buffer size.
    /// * `usage` - The usage hint.
    /// ## Errors
    /// * `ResourceError::AllocationFailed` - If the device is out of memory.
    fn buffer_data(
        &mut self,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<(), ResourceError>;

    /// Overwrites part of the buffer bound to `target`.
    fn buffer_sub_data(&mut self, target: BufferTarget, byte_offset: usize, data: &[u8]);

    // --- Textures ---

    /// Creates a new texture object.
    fn create_texture(&mut self) -> Result<TextureHandle, ResourceError>;

    /// Deletes a texture object.
    fn delete_texture(&mut self, texture: TextureHandle);

    /// Selects the texture unit subsequent `bind_texture` calls affect.
    fn active_texture(&mut self, unit: u32);

    /// Binds a texture (or nothing) to the active unit.
    fn bind_texture(&mut self, target: TextureTarget, texture: Option<TextureHandle>);

    /// Sets whether uploaded images are flipped vertically.
    fn set_unpack_flip_y(&mut self, flip: bool);

    /// Specifies one mip level of the bound texture.
    /// ## Arguments
    /// * `target` - The 2D image or cube face to specify.
    /// * `level` - The mip level.
    /// * `desc` - Size, format and component type of the image.
    /// * `data` - The pixels, or `None` to allocate uninitialized storage.
    /// ## Errors
    /// * `ResourceError::UnsupportedFormat` - For an invalid format/type pair.
    /// * `ResourceError::MissingExtension` - For a compressed format whose extension is missing.
    /// * `ResourceError::TooLarge` - If the image exceeds the maximum texture size.
    fn tex_image_2d(
        &mut self,
        target: TextureImageTarget,
        level: u32,
        desc: &TexImageDesc,
        data: Option<&[u8]>,
    ) -> Result<(), ResourceError>;

    /// Overwrites a sub-region of one mip level of the bound texture.
    fn tex_sub_image_2d(
        &mut self,
        target: TextureImageTarget,
        level: u32,
        region: Rect,
        format: TextureFormat,
        data_type: DataType,
        data: &[u8],
    );

    /// Applies sampler parameters to the bound texture.
    fn tex_parameters(&mut self, target: TextureTarget, params: &SamplerParams);

    /// Generates the mip chain of the bound texture.
    fn generate_mipmap(&mut self, target: TextureTarget);

    // --- Framebuffers ---

    /// Creates a new framebuffer object.
    fn create_framebuffer(&mut self) -> Result<FramebufferHandle, ResourceError>;

    /// Deletes a framebuffer object.
    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Binds a framebuffer, or the default framebuffer when `None`.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);

    /// Attaches a texture image to the bound framebuffer.
    fn framebuffer_texture_2d(
        &mut self,
        attachment: FramebufferAttachment,
        target: TextureImageTarget,
        texture: TextureHandle,
        level: u32,
    );

    /// Creates a new renderbuffer object.
    fn create_renderbuffer(&mut self) -> Result<RenderbufferHandle, ResourceError>;

    /// Deletes a renderbuffer object.
    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);

    /// Binds a renderbuffer.
    fn bind_renderbuffer(&mut self, renderbuffer: Option<RenderbufferHandle>);

    /// Allocates storage for the bound renderbuffer.
    fn renderbuffer_storage(
        &mut self,
        format: RenderbufferFormat,
        width: u32,
        height: u32,
    ) -> Result<(), ResourceError>;

    /// Attaches a renderbuffer to the bound framebuffer.
    fn framebuffer_renderbuffer(
        &mut self,
        attachment: FramebufferAttachment,
        renderbuffer: RenderbufferHandle,
    );

    /// Checks the completeness of the bound framebuffer.
    fn check_framebuffer_status(&self) -> FramebufferStatus;

    // --- Shaders and programs ---

    /// Creates and compiles a shader stage. A handle is returned even when compilation
    /// fails; query [`shader_compile_status`](Self::shader_compile_status) afterwards.
    fn create_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderHandle, ResourceError>;

    /// Whether the last compilation of the shader succeeded.
    fn shader_compile_status(&self, shader: ShaderHandle) -> bool;

    /// The compiler log of the shader.
    fn shader_info_log(&self, shader: ShaderHandle) -> String;

    /// Deletes a shader stage.
    fn delete_shader(&mut self, shader: ShaderHandle);

    /// Creates a program from two stages and links it. A handle is returned even
    /// when linking fails.
    fn create_program(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, ResourceError>;

    /// Whether the program linked.
    fn program_link_status(&self, program: ProgramHandle) -> bool;

    /// The linker log of the program.
    fn program_info_log(&self, program: ProgramHandle) -> String;

    /// Deletes a program.
    fn delete_program(&mut self, program: ProgramHandle);

    /// Reflects the active uniforms of a linked program.
    fn active_uniforms(&self, program: ProgramHandle) -> Vec<ActiveUniform>;

    /// Reflects the active attributes of a linked program.
    fn active_attributes(&self, program: ProgramHandle) -> Vec<ActiveAttribute>;

    /// Makes a program current.
    fn use_program(&mut self, program: Option<ProgramHandle>);

    /// Uploads a value to a location of the current program.
    fn uniform(&mut self, location: UniformLocation, value: &UniformValue);

    // --- Vertex input ---

    /// Enables a vertex attribute array.
    fn enable_vertex_attrib_array(&mut self, location: u32);

    /// Disables a vertex attribute array.
    fn disable_vertex_attrib_array(&mut self, location: u32);

    /// Points an attribute at the currently bound array buffer.
    fn vertex_attrib_pointer(&mut self, location: u32, layout: &VertexAttribLayout);

    /// Sets the instancing divisor of an attribute.
    fn vertex_attrib_divisor(&mut self, location: u32, divisor: u32);

    // --- Fixed-function state ---

    /// Enables a capability.
    fn enable(&mut self, capability: Capability);

    /// Disables a capability.
    fn disable(&mut self, capability: Capability);

    /// Sets the blend equations for color and alpha.
    fn blend_equation_separate(&mut self, color: BlendEquation, alpha: BlendEquation);

    /// Sets the blend factors for color and alpha.
    fn blend_func_separate(
        &mut self,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    );

    /// Sets the depth comparison.
    fn depth_func(&mut self, func: CompareFunction);

    /// Enables or disables depth writes.
    fn depth_mask(&mut self, write: bool);

    /// Sets color channel write enables.
    fn color_mask(&mut self, mask: ColorMask);

    /// Sets the stencil test function.
    fn stencil_func(&mut self, func: CompareFunction, reference: i32, mask: u32);

    /// Sets the stencil operations.
    fn stencil_op(
        &mut self,
        fail: StencilOperation,
        depth_fail: StencilOperation,
        pass: StencilOperation,
    );

    /// Sets the stencil write mask.
    fn stencil_mask(&mut self, mask: u32);

    /// Selects which faces are culled.
    fn cull_face(&mut self, face: CullFace);

    /// Selects the front-face winding.
    fn front_face(&mut self, face: FrontFace);

    /// Sets the polygon offset factor and units.
    fn polygon_offset(&mut self, factor: f32, units: f32);

    /// Sets the rasterized line width.
    fn line_width(&mut self, width: f32);

    /// Sets the viewport rectangle.
    fn viewport(&mut self, rect: Rect);

    /// Sets the scissor rectangle.
    fn scissor(&mut self, rect: Rect);

    // --- Clears ---

    /// Sets the clear color.
    fn clear_color(&mut self, rgba: [f32; 4]);

    /// Sets the clear depth.
    fn clear_depth(&mut self, depth: f32);

    /// Sets the clear stencil value.
    fn clear_stencil(&mut self, stencil: i32);

    /// Clears the selected buffers of the bound framebuffer.
    fn clear(&mut self, flags: ClearFlags);

    // --- Draws ---

    /// Draws non-indexed primitives. `instances` of `1` is a plain draw.
    fn draw_arrays(&mut self, mode: PrimitiveMode, first: u32, count: u32, instances: u32);

    /// Draws indexed primitives from the bound element buffer.
    fn draw_elements(
        &mut self,
        mode: PrimitiveMode,
        count: u32,
        index_type: IndexType,
        byte_offset: usize,
        instances: u32,
    );
}
