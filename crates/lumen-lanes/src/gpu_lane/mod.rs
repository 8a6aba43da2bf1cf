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

//! GPU resource tables: device copies of CPU resources, refreshed by version.
//!
//! Every table follows the same contract: `get` looks a record up, `upload` creates
//! or refreshes it when the CPU version moved, `remove` frees it, `invalidate`
//! forgets everything after a context loss and `dispose` frees everything. Memory
//! counters in [`MemoryInfo`](lumen_core::renderer::MemoryInfo) follow creations
//! and removals.

pub mod buffers;
pub mod geometries;
pub mod properties;
pub mod render_targets;
pub mod textures;

pub use self::buffers::{BufferRecord, BufferTable};
pub use self::geometries::{GeometryUpdater, WireframeIndex};
pub use self::properties::{MaterialProperties, MaterialProperty};
pub use self::render_targets::RenderTargetTable;
pub use self::textures::{TextureRecord, TextureTable, TextureUpload};
