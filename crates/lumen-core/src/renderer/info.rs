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

//! Memory and per-frame statistics of the renderer.

use super::format::PrimitiveMode;

/// Counts of live GPU resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    /// Geometries with at least one uploaded buffer.
    pub geometries: usize,
    /// Live texture objects, placeholders included.
    pub textures: usize,
    /// Allocated render targets.
    pub render_targets: usize,
    /// Estimated bytes of buffer, texture and renderbuffer storage.
    pub gpu_bytes: usize,
}

/// Statistics of the draws issued since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Number of `render` calls since creation.
    pub frame: u64,
    /// Draw calls.
    pub calls: u64,
    /// Triangles submitted.
    pub triangles: u64,
    /// Points submitted.
    pub points: u64,
    /// Line segments submitted.
    pub lines: u64,
}

/// A collection of renderer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderInfo {
    /// Live GPU resources.
    pub memory: MemoryInfo,
    /// Draw statistics.
    pub render: FrameInfo,
    /// Live compiled programs.
    pub programs: usize,
}

impl RenderInfo {
    /// Records one draw call of `count` vertices repeated `instances` times.
    pub fn update(&mut self, count: u32, mode: PrimitiveMode, instances: u32) {
        let count = count as u64;
        let instances = instances.max(1) as u64;
        self.render.calls += 1;
        match mode {
            PrimitiveMode::Triangles => self.render.triangles += instances * (count / 3),
            PrimitiveMode::TriangleStrip | PrimitiveMode::TriangleFan => {
                self.render.triangles += instances * count.saturating_sub(2)
            }
            PrimitiveMode::Lines => self.render.lines += instances * (count / 2),
            PrimitiveMode::LineStrip => self.render.lines += instances * count.saturating_sub(1),
            PrimitiveMode::LineLoop => self.render.lines += instances * count,
            PrimitiveMode::Points => self.render.points += instances * count,
        }
    }

    /// Resets the per-frame draw counters. The frame number is kept.
    pub fn reset(&mut self) {
        self.render.calls = 0;
        self.render.triangles = 0;
        self.render.points = 0;
        self.render.lines = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_counts_primitives() {
        let mut info = RenderInfo::default();
        info.update(36, PrimitiveMode::Triangles, 1);
        info.update(6, PrimitiveMode::Triangles, 4);
        info.update(5, PrimitiveMode::LineStrip, 1);
        info.update(10, PrimitiveMode::Points, 1);
        assert_eq!(info.render.calls, 4);
        assert_eq!(info.render.triangles, 12 + 8);
        assert_eq!(info.render.lines, 4);
        assert_eq!(info.render.points, 10);

        info.render.frame = 3;
        info.reset();
        assert_eq!(info.render.calls, 0);
        assert_eq!(info.render.frame, 3);
    }
}
