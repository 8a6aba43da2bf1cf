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


//! The device contract and the renderer-wide configuration, statistics and error types.

pub mod capabilities;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod format;
pub mod handles;
pub mod info;
pub mod settings;
pub mod state;
pub mod uniform;

pub use self::capabilities::Capabilities;
pub use self::device::{GraphicsDevice, Limit};
pub use self::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use self::error::{ConfigError, RenderError, ResourceError, ShaderError};
pub use self::format::*;
pub use self::handles::*;
pub use self::info::{FrameInfo, MemoryInfo, RenderInfo};
pub use self::settings::{
    OutputEncoding, RendererSettings, ShadowMapKind, ShadowMapSettings, ToneMapping,
};
pub use self::state::*;
pub use self::uniform::{ActiveAttribute, ActiveUniform, UniformType, UniformValue};
