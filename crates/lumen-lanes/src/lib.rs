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

//! Hot-path execution pipelines of the renderer.
//!
//! Lanes hold the per-frame machinery: the GPU resource tables that mirror CPU
//! resources on the device, the program lane that turns material features into
//! compiled shader permutations, and the render lane that diffs pipeline state,
//! builds render lists and drives the shadow pass.

#![warn(missing_docs)]

pub mod gpu_lane;
pub mod program_lane;
pub mod render_lane;
