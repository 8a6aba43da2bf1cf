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

//! A bounded log of degraded-path events.
//!
//! Every recoverable problem the renderer works around (a clamped shadow map, a
//! texture replaced by the placeholder, a broken shader...) is logged through `log`
//! and also retained here so callers and tests can inspect it after a frame.

use std::collections::VecDeque;
use std::fmt;

/// What happened.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticKind {
    /// A shadow map request exceeded the device maximum and was shrunk.
    ShadowMapClamped {
        /// Requested edge length.
        requested: (u32, u32),
        /// Size actually allocated.
        clamped: (u32, u32),
    },
    /// A shadow map could not be allocated; the light renders unshadowed.
    ShadowMapAllocationFailed {
        /// The allocation error.
        reason: String,
    },
    /// A texture could not be uploaded and the placeholder is bound instead.
    TextureFallback {
        /// The upload error.
        reason: String,
    },
    /// A program failed to compile or link and is kept in a broken state.
    ShaderCompile {
        /// The cache key of the program.
        cache_key: String,
        /// The annotated compiler or linker log.
        log: String,
    },
    /// A draw needed more texture units than the device provides.
    TextureUnitsExceeded {
        /// Units requested.
        requested: u32,
        /// Units available.
        max: u32,
    },
    /// A render target failed its completeness check.
    RenderTargetIncomplete {
        /// The failure.
        reason: String,
    },
    /// The graphics context was lost.
    ContextLost,
    /// The graphics context was restored.
    ContextRestored,
}

impl DiagnosticKind {
    /// The log level this kind is reported at.
    pub fn level(&self) -> log::Level {
        match self {
            DiagnosticKind::ShaderCompile { .. } | DiagnosticKind::RenderTargetIncomplete { .. } => {
                log::Level::Error
            }
            DiagnosticKind::ContextRestored => log::Level::Info,
            _ => log::Level::Warn,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::ShadowMapClamped { requested, clamped } => write!(
                f,
                "Shadow map of {}x{} exceeds the maximum texture size, clamped to {}x{}",
                requested.0, requested.1, clamped.0, clamped.1
            ),
            DiagnosticKind::ShadowMapAllocationFailed { reason } => {
                write!(f, "Shadow map allocation failed, light renders unshadowed: {reason}")
            }
            DiagnosticKind::TextureFallback { reason } => {
                write!(f, "Texture upload failed, using placeholder: {reason}")
            }
            DiagnosticKind::ShaderCompile { cache_key, log } => {
                write!(f, "Program '{cache_key}' is broken:\n{log}")
            }
            DiagnosticKind::TextureUnitsExceeded { requested, max } => write!(
                f,
                "Trying to use {requested} texture units while this device supports only {max}"
            ),
            DiagnosticKind::RenderTargetIncomplete { reason } => {
                write!(f, "Render target is incomplete: {reason}")
            }
            DiagnosticKind::ContextLost => write!(f, "Graphics context lost"),
            DiagnosticKind::ContextRestored => write!(f, "Graphics context restored"),
        }
    }
}

/// A recorded event.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// The frame number at which the event was recorded.
    pub frame: u64,
    /// The event.
    pub kind: DiagnosticKind,
}

/// A ring buffer of the most recent diagnostics.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    entries: VecDeque<Diagnostic>,
    capacity: usize,
}

impl Diagnostics {
    /// Creates an empty log retaining at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Logs an event and retains it, evicting the oldest entry when full.
    pub fn push(&mut self, frame: u64, kind: DiagnosticKind) {
        log::log!(kind.level(), "{kind}");
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(Diagnostic { frame, kind });
    }

    /// Iterates the retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counts retained entries matching a predicate.
    pub fn count(&self, mut predicate: impl FnMut(&DiagnosticKind) -> bool) -> usize {
        self.entries.iter().filter(|d| predicate(&d.kind)).count()
    }

    /// Forgets every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut diagnostics = Diagnostics::new(2);
        diagnostics.push(0, DiagnosticKind::ContextLost);
        diagnostics.push(1, DiagnosticKind::ContextRestored);
        diagnostics.push(
            2,
            DiagnosticKind::TextureFallback {
                reason: "too large".to_string(),
            },
        );
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.iter().next().map(|d| d.frame), Some(1));
        assert_eq!(
            diagnostics.count(|k| matches!(k, DiagnosticKind::TextureFallback { .. })),
            1
        );
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let mut diagnostics = Diagnostics::new(0);
        diagnostics.push(0, DiagnosticKind::ContextLost);
        assert!(diagnostics.is_empty());
    }
}
