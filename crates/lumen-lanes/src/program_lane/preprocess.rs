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

//! Source assembly: `#include` resolution, light-count substitution and loop unrolling.

use super::parameters::{ClippingCounts, LightCounts};
use super::shaders::CHUNKS;
use ahash::AHashMap;
use std::borrow::Cow;
use thiserror::Error;

/// Maximum nesting of `#include` directives.
pub const MAX_INCLUDE_DEPTH: usize = 16;

const UNROLL_START: &str = "#pragma unroll_loop_start";
const UNROLL_END: &str = "#pragma unroll_loop_end";

/// A failure to assemble a shader source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreprocessError {
    /// An `#include` names a chunk that is not registered.
    #[error("unknown shader chunk <{name}> (included from: {})", .chain.join(" -> "))]
    UnknownChunk {
        /// The missing chunk.
        name: String,
        /// The chunks being expanded when the include was met, outermost first.
        chain: Vec<String>,
    },
    /// A chunk includes itself, directly or not.
    #[error("cyclic shader include: {}", .chain.join(" -> "))]
    IncludeCycle {
        /// The include chain, ending with the repeated chunk.
        chain: Vec<String>,
    },
    /// Includes nest deeper than [`MAX_INCLUDE_DEPTH`].
    #[error("shader includes nested deeper than {max}: {}", .chain.join(" -> "))]
    TooDeep {
        /// The depth limit.
        max: usize,
        /// The include chain at the limit.
        chain: Vec<String>,
    },
    /// An unrolled loop block cannot be parsed.
    #[error("malformed unrolled loop at line {line}: {reason}")]
    MalformedLoop {
        /// One-based line of the `unroll_loop_start` pragma.
        line: usize,
        /// What is wrong with it.
        reason: String,
    },
}

/// The named chunks `#include <name>` directives resolve against.
///
/// Starts with the built-in library. Registered chunks override built-ins of the
/// same name.
#[derive(Debug, Clone)]
pub struct ChunkLibrary {
    chunks: AHashMap<String, Cow<'static, str>>,
}

impl Default for ChunkLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkLibrary {
    /// A library holding the built-in chunks.
    pub fn new() -> Self {
        Self {
            chunks: CHUNKS
                .iter()
                .map(|&(name, source)| (name.to_string(), Cow::Borrowed(source)))
                .collect(),
        }
    }

    /// A library with no chunks at all.
    pub fn empty() -> Self {
        Self {
            chunks: AHashMap::new(),
        }
    }

    /// Adds or replaces a chunk.
    pub fn register(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.chunks.insert(name.into(), Cow::Owned(source.into()));
    }

    /// Looks a chunk up.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.chunks.get(name).map(|source| source.as_ref())
    }

    /// Recursively replaces every `#include <name>` line with the chunk source.
    pub fn resolve_includes(&self, source: &str) -> Result<String, PreprocessError> {
        let mut out = String::with_capacity(source.len() * 2);
        let mut chain = Vec::new();
        self.expand(source, &mut chain, &mut out)?;
        Ok(out)
    }

    fn expand(
        &self,
        source: &str,
        chain: &mut Vec<String>,
        out: &mut String,
    ) -> Result<(), PreprocessError> {
        for line in source.lines() {
            let Some(name) = parse_include(line) else {
                out.push_str(line);
                out.push('\n');
                continue;
            };
            if chain.iter().any(|c| c == name) {
                let mut cycle = chain.clone();
                cycle.push(name.to_string());
                return Err(PreprocessError::IncludeCycle { chain: cycle });
            }
            if chain.len() >= MAX_INCLUDE_DEPTH {
                let mut deep = chain.clone();
                deep.push(name.to_string());
                return Err(PreprocessError::TooDeep {
                    max: MAX_INCLUDE_DEPTH,
                    chain: deep,
                });
            }
            let chunk = self
                .get(name)
                .ok_or_else(|| PreprocessError::UnknownChunk {
                    name: name.to_string(),
                    chain: chain.clone(),
                })?;
            chain.push(name.to_string());
            self.expand(chunk, chain, out)?;
            chain.pop();
        }
        Ok(())
    }
}

/// Extracts `name` from an `#include <name>` line.
fn parse_include(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("#include")?;
    let name = rest.trim().strip_prefix('<')?.strip_suffix('>')?;
    Some(name.trim())
}

/// Replaces the light and clipping count placeholders with literals.
pub fn replace_light_nums(source: &str, lights: &LightCounts, clipping: &ClippingCounts) -> String {
    let replacements = [
        ("NUM_DIR_LIGHT_SHADOWS", lights.directional_shadows),
        ("NUM_SPOT_LIGHT_SHADOWS", lights.spot_shadows),
        ("NUM_POINT_LIGHT_SHADOWS", lights.point_shadows),
        ("NUM_DIR_LIGHTS", lights.directional),
        ("NUM_SPOT_LIGHTS", lights.spot),
        ("NUM_POINT_LIGHTS", lights.point),
        ("NUM_HEMI_LIGHTS", lights.hemisphere),
        ("UNION_CLIPPING_PLANES", clipping.union_planes()),
        ("NUM_CLIPPING_PLANES", clipping.planes),
    ];
    let mut out = source.to_string();
    for (token, value) in replacements {
        if out.contains(token) {
            out = out.replace(token, &value.to_string());
        }
    }
    out
}

/// Expands every `#pragma unroll_loop_start` / `unroll_loop_end` block.
///
/// The block must hold a single `for ( int i = A; i < B; i ++ ) { ... }` loop with
/// literal bounds. Each iteration is emitted in its own scope with `[ i ]` and
/// `UNROLLED_LOOP_INDEX` replaced by the iteration number.
pub fn unroll_loops(source: &str) -> Result<String, PreprocessError> {
    if !source.contains(UNROLL_START) {
        return Ok(source.to_string());
    }

    let lines: Vec<&str> = source.lines().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    while i < lines.len() {
        if lines[i].trim() != UNROLL_START {
            out.push_str(lines[i]);
            out.push('\n');
            i += 1;
            continue;
        }

        let start_line = i + 1;
        let malformed = |reason: &str| PreprocessError::MalformedLoop {
            line: start_line,
            reason: reason.to_string(),
        };
        let end = lines[i + 1..]
            .iter()
            .position(|l| matches!(l.trim(), UNROLL_END | UNROLL_START))
            .map(|offset| i + 1 + offset)
            .ok_or_else(|| malformed("missing unroll_loop_end"))?;
        if lines[end].trim() == UNROLL_START {
            return Err(malformed("nested unroll_loop_start"));
        }

        let block: Vec<&str> = lines[i + 1..end]
            .iter()
            .copied()
            .filter(|l| !l.trim().is_empty())
            .collect();
        let (header, body) = match block.as_slice() {
            [header, body @ .., close] if close.trim() == "}" => (*header, body),
            _ => return Err(malformed("expected a single braced for loop")),
        };
        let (from, to) = parse_loop_header(header).ok_or_else(|| malformed(header.trim()))?;

        for index in from..to {
            let n = index.to_string();
            out.push_str("{\n");
            for line in body {
                let line = line
                    .replace("[ i ]", &format!("[ {n} ]"))
                    .replace("[i]", &format!("[{n}]"))
                    .replace("UNROLLED_LOOP_INDEX", &n);
                out.push_str(&line);
                out.push('\n');
            }
            out.push_str("}\n");
        }
        i = end + 1;
    }
    Ok(out)
}

/// Parses `for ( int i = A; i < B; i ++ ) {` into `(A, B)`.
fn parse_loop_header(header: &str) -> Option<(i64, i64)> {
    let compact: String = header.chars().filter(|c| !c.is_whitespace()).collect();
    let inner = compact.strip_prefix("for(inti=")?.strip_suffix("i++){")?;
    let (from, rest) = inner.split_once(";i<")?;
    let to = rest.strip_suffix(';')?;
    Some((from.parse().ok()?, to.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library(chunks: &[(&str, &str)]) -> ChunkLibrary {
        let mut library = ChunkLibrary::empty();
        for (name, source) in chunks {
            library.register(*name, *source);
        }
        library
    }

    #[test]
    fn test_resolve_nested_includes() {
        // --- 1. ARRANGE ---
        let library = library(&[("outer", "a\n#include <inner>\nc"), ("inner", "b")]);

        // --- 2. ACT ---
        let resolved = library.resolve_includes("#include <outer>\nd").unwrap();

        // --- 3. ASSERT ---
        assert_eq!(resolved, "a\nb\nc\nd\n");
    }

    #[test]
    fn test_unknown_chunk_reports_chain() {
        let library = library(&[("outer", "#include <missing>")]);
        let err = library.resolve_includes("#include <outer>").unwrap_err();
        assert_eq!(
            err,
            PreprocessError::UnknownChunk {
                name: "missing".to_string(),
                chain: vec!["outer".to_string()],
            }
        );
        assert!(err.to_string().contains("<missing>"));
    }

    #[test]
    fn test_include_cycle_is_detected() {
        // --- 1. ARRANGE ---
        let library = library(&[("a", "#include <b>"), ("b", "#include <a>")]);

        // --- 2. ACT ---
        let err = library.resolve_includes("#include <a>").unwrap_err();

        // --- 3. ASSERT ---
        assert_eq!(err.to_string(), "cyclic shader include: a -> b -> a");
    }

    #[test]
    fn test_include_depth_is_bounded() {
        let chunks: Vec<(String, String)> = (0..20)
            .map(|i| (format!("c{i}"), format!("#include <c{}>", i + 1)))
            .chain(std::iter::once(("c20".to_string(), "leaf".to_string())))
            .collect();
        let mut library = ChunkLibrary::empty();
        for (name, source) in &chunks {
            library.register(name.as_str(), source.as_str());
        }
        let err = library.resolve_includes("#include <c0>").unwrap_err();
        assert!(matches!(err, PreprocessError::TooDeep { max: MAX_INCLUDE_DEPTH, .. }));
    }

    #[test]
    fn test_registered_chunk_overrides_builtin() {
        let mut library = ChunkLibrary::new();
        library.register("common", "// replaced");
        assert_eq!(library.resolve_includes("#include <common>").unwrap(), "// replaced\n");
    }

    #[test]
    fn test_replace_light_nums() {
        let counts = LightCounts {
            directional: 2,
            directional_shadows: 1,
            ..LightCounts::default()
        };
        let clipping = ClippingCounts {
            planes: 3,
            intersection: 1,
        };
        let out = replace_light_nums(
            "NUM_DIR_LIGHTS NUM_DIR_LIGHT_SHADOWS NUM_POINT_LIGHTS UNION_CLIPPING_PLANES NUM_CLIPPING_PLANES",
            &counts,
            &clipping,
        );
        assert_eq!(out, "2 1 0 2 3");
    }

    #[test]
    fn test_unroll_loop_expands_iterations() {
        // --- 1. ARRANGE ---
        let source = "\
before
#pragma unroll_loop_start
for ( int i = 0; i < 2; i ++ ) {
    x += lights[ i ].color * UNROLLED_LOOP_INDEX;
}
#pragma unroll_loop_end
after";

        // --- 2. ACT ---
        let out = unroll_loops(source).unwrap();

        // --- 3. ASSERT ---
        assert_eq!(
            out,
            "before\n{\n    x += lights[ 0 ].color * 0;\n}\n{\n    x += lights[ 1 ].color * 1;\n}\nafter\n"
        );
    }

    #[test]
    fn test_unroll_empty_range_emits_nothing() {
        let source = "#pragma unroll_loop_start\nfor ( int i = 3; i < 3; i ++ ) {\n  y;\n}\n#pragma unroll_loop_end";
        assert_eq!(unroll_loops(source).unwrap(), "");
    }

    #[test]
    fn test_unroll_rejects_symbolic_bounds() {
        let source = "#pragma unroll_loop_start\nfor ( int i = 0; i < N; i ++ ) {\n}\n#pragma unroll_loop_end";
        assert!(matches!(
            unroll_loops(source),
            Err(PreprocessError::MalformedLoop { line: 1, .. })
        ));
        let unterminated = "#pragma unroll_loop_start\nfor ( int i = 0; i < 1; i ++ ) {\n}";
        assert!(unroll_loops(unterminated).is_err());
    }
}
