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

//! The render lane: pipeline state diffing, vertex bindings, render lists, light
//! state and the shadow pass.

pub mod bindings;
pub mod lights;
pub mod render_list;
pub mod shadow_pass_lane;
pub mod state;

pub use self::bindings::BindingStates;
pub use self::lights::{LightInput, LightsState, ShadowUniforms};
pub use self::render_list::{
    painter_sort_stable, reverse_painter_sort_stable, Bucket, RenderItem, RenderItemCompare,
    RenderList, RenderLists,
};
pub use self::shadow_pass_lane::{
    ShadowCaster, ShadowDrawer, ShadowLight, ShadowPassLane, ShadowPassOutput, ShadowPassState,
    ShadowView,
};
pub use self::state::StateTracker;
