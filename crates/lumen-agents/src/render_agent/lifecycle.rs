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

//! The context lifecycle of a renderer.

/// Where the renderer stands with respect to its graphics context.
///
/// Transitions are `Active -> Lost -> Restoring -> Active`. Every public entry
/// point observes the device once, on entry, and acts on the resulting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// The context is usable.
    #[default]
    Active,
    /// The context is gone. Rendering and compiling are no-ops.
    Lost,
    /// The context came back; tables are being invalidated and the
    /// capabilities probed again.
    Restoring,
}

impl Lifecycle {
    /// The next state, given whether the device reports its context lost.
    pub fn observe(self, context_lost: bool) -> Self {
        match (self, context_lost) {
            (_, true) => Lifecycle::Lost,
            (Lifecycle::Lost, false) => Lifecycle::Restoring,
            (Lifecycle::Restoring, false) => Lifecycle::Active,
            (Lifecycle::Active, false) => Lifecycle::Active,
        }
    }

    /// Returns `true` when draw calls can be issued.
    pub fn is_active(self) -> bool {
        self == Lifecycle::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_and_restoration_cycle() {
        let mut state = Lifecycle::default();
        assert!(state.is_active());

        state = state.observe(true);
        assert_eq!(state, Lifecycle::Lost);
        assert_eq!(state.observe(true), Lifecycle::Lost);

        state = state.observe(false);
        assert_eq!(state, Lifecycle::Restoring);
        assert!(!state.is_active());

        state = state.observe(false);
        assert_eq!(state, Lifecycle::Active);
    }

    #[test]
    fn test_loss_during_restoration() {
        assert_eq!(Lifecycle::Restoring.observe(true), Lifecycle::Lost);
    }
}
