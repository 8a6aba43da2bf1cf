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

//! The log entries recorded by the headless device.

use lumen_core::renderer::*;

/// One recorded device call.
///
/// Object creation, state changes, uploads and draws are recorded. Pure queries
/// (limits, status checks, reflection) are not.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum DeviceCall {
    CreateBuffer(BufferHandle),
    DeleteBuffer(BufferHandle),
    BindBuffer(BufferTarget, Option<BufferHandle>),
    BufferData {
        target: BufferTarget,
        size: usize,
        usage: BufferUsage,
    },
    BufferSubData {
        target: BufferTarget,
        offset: usize,
        size: usize,
    },
    CreateTexture(TextureHandle),
    DeleteTexture(TextureHandle),
    ActiveTexture(u32),
    BindTexture(TextureTarget, Option<TextureHandle>),
    UnpackFlipY(bool),
    TexImage2D {
        target: TextureImageTarget,
        level: u32,
        width: u32,
        height: u32,
        format: TextureFormat,
    },
    TexSubImage2D {
        target: TextureImageTarget,
        level: u32,
        region: Rect,
    },
    TexParameters(TextureTarget, SamplerParams),
    GenerateMipmap(TextureTarget),
    CreateFramebuffer(FramebufferHandle),
    DeleteFramebuffer(FramebufferHandle),
    BindFramebuffer(Option<FramebufferHandle>),
    FramebufferTexture2D {
        attachment: FramebufferAttachment,
        target: TextureImageTarget,
        texture: TextureHandle,
        level: u32,
    },
    CreateRenderbuffer(RenderbufferHandle),
    DeleteRenderbuffer(RenderbufferHandle),
    BindRenderbuffer(Option<RenderbufferHandle>),
    RenderbufferStorage {
        format: RenderbufferFormat,
        width: u32,
        height: u32,
    },
    FramebufferRenderbuffer(FramebufferAttachment, RenderbufferHandle),
    CreateShader(ShaderStage, ShaderHandle),
    DeleteShader(ShaderHandle),
    CreateProgram(ProgramHandle),
    DeleteProgram(ProgramHandle),
    UseProgram(Option<ProgramHandle>),
    Uniform(UniformLocation, UniformValue),
    EnableVertexAttribArray(u32),
    DisableVertexAttribArray(u32),
    VertexAttribPointer(u32, VertexAttribLayout),
    VertexAttribDivisor(u32, u32),
    Enable(Capability),
    Disable(Capability),
    BlendEquation(BlendEquation, BlendEquation),
    BlendFunc(BlendFactor, BlendFactor, BlendFactor, BlendFactor),
    DepthFunc(CompareFunction),
    DepthMask(bool),
    ColorMask(ColorMask),
    StencilFunc(CompareFunction, i32, u32),
    StencilOp(StencilOperation, StencilOperation, StencilOperation),
    StencilMask(u32),
    CullFace(CullFace),
    FrontFace(FrontFace),
    PolygonOffset(f32, f32),
    LineWidth(f32),
    Viewport(Rect),
    Scissor(Rect),
    ClearColor([f32; 4]),
    ClearDepth(f32),
    ClearStencil(i32),
    Clear(ClearFlags),
    DrawArrays {
        mode: PrimitiveMode,
        first: u32,
        count: u32,
        instances: u32,
    },
    DrawElements {
        mode: PrimitiveMode,
        count: u32,
        index_type: IndexType,
        offset: usize,
        instances: u32,
    },
}

impl DeviceCall {
    /// Returns `true` for draw calls.
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            DeviceCall::DrawArrays { .. } | DeviceCall::DrawElements { .. }
        )
    }

    /// Returns `true` for calls that upload buffer data.
    pub fn is_buffer_upload(&self) -> bool {
        matches!(
            self,
            DeviceCall::BufferData { .. } | DeviceCall::BufferSubData { .. }
        )
    }

    /// Returns `true` for calls that upload texture data.
    pub fn is_texture_upload(&self) -> bool {
        matches!(
            self,
            DeviceCall::TexImage2D { .. } | DeviceCall::TexSubImage2D { .. }
        )
    }
}
