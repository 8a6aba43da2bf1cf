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


//! CPU-side descriptions of the resources the renderer draws.
//!
//! The renderer never owns these objects. It reads them, caches GPU state against
//! their identities and version counters, and frees that state when they are disposed.

pub mod attribute;
pub mod camera;
pub mod geometry;
pub mod layers;
pub mod light;
pub mod material;
pub mod render_target;
pub mod texture;

pub use self::attribute::{AttributeData, AttributeId, BufferAttribute, UpdateRange};
pub use self::camera::{Camera, Projection};
pub use self::geometry::{DrawRange, Geometry, GeometryGroup};
pub use self::layers::Layers;
pub use self::light::*;
pub use self::material::*;
pub use self::render_target::RenderTargetDescriptor;
pub use self::texture::{ColorSpace, Image, Texture, TextureImage};

slotmap::new_key_type! {
    /// A stable handle to a [`Geometry`] stored in an asset arena.
    pub struct GeometryKey;
    /// A stable handle to a [`Material`] stored in an asset arena.
    pub struct MaterialKey;
    /// A stable handle to a [`Texture`] stored in an asset arena.
    pub struct TextureKey;
    /// A stable handle to an object of a scene graph.
    pub struct ObjectKey;
    /// A stable handle to a render target owned by a renderer.
    pub struct RenderTargetKey;
}
