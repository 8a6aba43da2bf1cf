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

//! # Lumen Core
//!
//! Foundational crate containing the device contract, core types and the CPU-side
//! resource descriptions that the rest of the renderer is built on.
//!
//! - [`renderer`] defines the `GraphicsDevice` trait every backend implements, the
//!   GPU handle types, pipeline-state enums, errors, capabilities, settings and
//!   per-frame counters.
//! - [`resource`] defines what the application hands to the renderer: geometry,
//!   materials, textures, lights, cameras and render target descriptions.
//! - [`math`] re-exports the linear algebra types and adds the culling volumes.

#![warn(missing_docs)]

pub mod color;
pub mod math;
pub mod renderer;
pub mod resource;

pub use color::Color;
