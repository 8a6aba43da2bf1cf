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

//! Acts as the **[A]gent** for rendering: the frame orchestrator.
//!
//! The agent decides *what* is drawn each frame and in which order, and leaves the
//! GPU-facing work to the lanes:
//! - traversing the scene, culling it against the camera and filling the render
//!   lists;
//! - bringing buffers and textures up to date once per frame;
//! - running the shadow pass when a light casts shadows onto something;
//! - drawing the opaque, transmissive and transparent buckets through the program
//!   cache and the state tracker;
//! - following the context lifecycle and rebuilding device state after a loss.

mod agent;
mod draw;
mod gpu;
mod lifecycle;

pub use agent::Renderer;
pub use draw::MAX_MORPH_TARGETS;
pub use lifecycle::Lifecycle;
