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

//! A small GLSL front end for the headless device: conditional compilation,
//! `#error` detection and reflection of uniform and attribute declarations.
//!
//! This is not a GLSL compiler. It understands exactly as much of the language as
//! the renderer's shader templates use, so that compile failures, reflection and
//! active-uniform sets behave like a real driver for those sources.

use lumen_core::renderer::{ShaderStage, UniformType};
use std::collections::HashMap;

/// A uniform or attribute declaration found in an active region of a shader.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Declaration {
    pub name: String,
    pub ty: UniformType,
    pub size: u32,
}

/// The result of analysing one shader source.
#[derive(Debug, Clone, Default)]
pub(crate) struct ShaderAnalysis {
    pub compiled: bool,
    pub log: String,
    pub uniforms: Vec<Declaration>,
    pub attributes: Vec<Declaration>,
}

/// Runs the conditional preprocessor over `source` and reflects its declarations.
pub(crate) fn analyse(stage: ShaderStage, source: &str) -> ShaderAnalysis {
    let mut analysis = ShaderAnalysis {
        compiled: true,
        ..ShaderAnalysis::default()
    };
    let mut defines: HashMap<String, String> = HashMap::new();
    // (region active, some branch already taken, parent active)
    let mut stack: Vec<(bool, bool, bool)> = Vec::new();
    let mut has_main = false;

    for (index, raw) in source.lines().enumerate() {
        let line_number = index + 1;
        let line = raw.trim();
        let active = stack.last().map_or(true, |frame| frame.0);

        if let Some(directive) = line.strip_prefix('#') {
            let directive = directive.trim_start();
            let (keyword, rest) = split_keyword(directive);
            match keyword {
                "ifdef" | "ifndef" | "if" => {
                    let condition = match keyword {
                        "ifdef" => defines.contains_key(rest.trim()),
                        "ifndef" => !defines.contains_key(rest.trim()),
                        _ => evaluate(rest, &defines) != 0,
                    };
                    let taken = active && condition;
                    stack.push((taken, taken, active));
                }
                "elif" => {
                    if let Some(frame) = stack.last_mut() {
                        let taken = frame.2 && !frame.1 && evaluate(rest, &defines) != 0;
                        frame.0 = taken;
                        frame.1 |= taken;
                    }
                }
                "else" => {
                    if let Some(frame) = stack.last_mut() {
                        frame.0 = frame.2 && !frame.1;
                        frame.1 = true;
                    }
                }
                "endif" => {
                    if stack.pop().is_none() {
                        fail(&mut analysis, line_number, "#endif", "unexpected #endif");
                    }
                }
                "define" if active => {
                    let (name, value) = split_keyword(rest);
                    if !name.is_empty() && !name.contains('(') {
                        defines.insert(name.to_string(), value.trim().to_string());
                    }
                }
                "undef" if active => {
                    defines.remove(rest.trim());
                }
                "error" if active => {
                    fail(&mut analysis, line_number, "#error", rest.trim());
                }
                _ => {}
            }
            continue;
        }

        if !active {
            continue;
        }
        let code = line.split("//").next().unwrap_or("").trim();
        if code.contains("void main") {
            has_main = true;
        }
        if let Some(rest) = code.strip_prefix("uniform ") {
            if let Some(decl) = parse_declaration(rest, &defines) {
                if !analysis.uniforms.iter().any(|d| d.name == decl.name) {
                    analysis.uniforms.push(decl);
                }
            }
        } else if stage == ShaderStage::Vertex {
            let rest = code
                .strip_prefix("in ")
                .or_else(|| code.strip_prefix("attribute "));
            if let Some(decl) = rest.and_then(|r| parse_declaration(r, &defines)) {
                analysis.attributes.push(decl);
            }
        }
    }

    if !stack.is_empty() {
        fail(
            &mut analysis,
            source.lines().count(),
            "#if",
            "unterminated conditional directive",
        );
    }
    if !has_main && analysis.compiled {
        fail(&mut analysis, 1, "main", "function 'main' is not defined");
    }
    analysis
}

fn fail(analysis: &mut ShaderAnalysis, line: usize, token: &str, message: &str) {
    analysis.compiled = false;
    analysis
        .log
        .push_str(&format!("ERROR: 0:{line}: '{token}' : {message}\n"));
}

fn split_keyword(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(|c: char| c.is_whitespace()) {
        Some(at) => (&text[..at], &text[at..]),
        None => (text, ""),
    }
}

/// Parses `[precision] type name[ size ];`.
fn parse_declaration(text: &str, defines: &HashMap<String, String>) -> Option<Declaration> {
    let text = text.trim().trim_end_matches(';').trim();
    let mut tokens = text
        .split_whitespace()
        .filter(|t| !matches!(*t, "lowp" | "mediump" | "highp"));
    let ty = UniformType::from_glsl(tokens.next()?)?;
    let rest: String = tokens.collect::<Vec<_>>().join(" ");
    let (name, size) = match rest.find('[') {
        Some(open) => {
            let close = rest.find(']')?;
            let inner = rest.get(open + 1..close)?.trim();
            let size = inner
                .parse::<u32>()
                .ok()
                .or_else(|| defines.get(inner).and_then(|v| v.parse().ok()))?;
            (rest[..open].trim().to_string(), size)
        }
        None => (rest.trim().to_string(), 1),
    };
    if name.is_empty() || size == 0 {
        return None;
    }
    Some(Declaration { name, ty, size })
}

/// Evaluates a `#if` expression. Unknown identifiers evaluate to zero.
fn evaluate(expression: &str, defines: &HashMap<String, String>) -> i64 {
    let tokens = tokenize(expression);
    let mut parser = ExprParser {
        tokens: &tokens,
        position: 0,
        defines,
    };
    parser.or()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(i64),
    Ident(String),
    Op(&'static str),
}

fn tokenize(text: &str) -> Vec<Token> {
    const OPS: [&str; 13] = [
        "&&", "||", "==", "!=", "<=", ">=", "<", ">", "!", "(", ")", "+", "-",
    ];
    let mut tokens = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        if let Some(op) = OPS.iter().find(|op| rest.starts_with(*op)) {
            tokens.push(Token::Op(op));
            rest = rest[op.len()..].trim_start();
            continue;
        }
        let end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if end == 0 {
            rest = rest[1..].trim_start();
            continue;
        }
        let word = &rest[..end];
        tokens.push(match word.parse::<i64>() {
            Ok(n) => Token::Number(n),
            Err(_) => Token::Ident(word.to_string()),
        });
        rest = rest[end..].trim_start();
    }
    tokens
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    position: usize,
    defines: &'a HashMap<String, String>,
}

impl ExprParser<'_> {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.position) {
            Some(Token::Op(op)) => Some(op),
            _ => None,
        }
    }

    fn or(&mut self) -> i64 {
        let mut value = self.and();
        while self.peek_op() == Some("||") {
            self.position += 1;
            let rhs = self.and();
            value = ((value != 0) || (rhs != 0)) as i64;
        }
        value
    }

    fn and(&mut self) -> i64 {
        let mut value = self.comparison();
        while self.peek_op() == Some("&&") {
            self.position += 1;
            let rhs = self.comparison();
            value = ((value != 0) && (rhs != 0)) as i64;
        }
        value
    }

    fn comparison(&mut self) -> i64 {
        let lhs = self.additive();
        let Some(op) = self.peek_op() else {
            return lhs;
        };
        if !matches!(op, "==" | "!=" | "<" | ">" | "<=" | ">=") {
            return lhs;
        }
        self.position += 1;
        let rhs = self.additive();
        let result = match op {
            "==" => lhs == rhs,
            "!=" => lhs != rhs,
            "<" => lhs < rhs,
            ">" => lhs > rhs,
            "<=" => lhs <= rhs,
            _ => lhs >= rhs,
        };
        result as i64
    }

    fn additive(&mut self) -> i64 {
        let mut value = self.unary();
        while let Some(op @ ("+" | "-")) = self.peek_op() {
            self.position += 1;
            let rhs = self.unary();
            value = if op == "+" { value + rhs } else { value - rhs };
        }
        value
    }

    fn unary(&mut self) -> i64 {
        if self.peek_op() == Some("!") {
            self.position += 1;
            return (self.unary() == 0) as i64;
        }
        self.primary()
    }

    fn primary(&mut self) -> i64 {
        let Some(token) = self.tokens.get(self.position).cloned() else {
            return 0;
        };
        self.position += 1;
        match token {
            Token::Number(n) => n,
            Token::Op("(") => {
                let value = self.or();
                if self.peek_op() == Some(")") {
                    self.position += 1;
                }
                value
            }
            Token::Ident(name) if name == "defined" => {
                let parenthesized = self.peek_op() == Some("(");
                if parenthesized {
                    self.position += 1;
                }
                let defined = match self.tokens.get(self.position) {
                    Some(Token::Ident(target)) => self.defines.contains_key(target),
                    _ => false,
                };
                self.position += 1;
                if parenthesized && self.peek_op() == Some(")") {
                    self.position += 1;
                }
                defined as i64
            }
            Token::Ident(name) => self
                .defines
                .get(&name)
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(0),
            Token::Op(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditionals_select_active_declarations() {
        // --- 1. ARRANGE ---
        let source = "#define USE_MAP\n\
                      #define NUM_LIGHTS 2\n\
                      #ifdef USE_MAP\n\
                      uniform sampler2D map;\n\
                      #else\n\
                      uniform vec3 fallback;\n\
                      #endif\n\
                      #if NUM_LIGHTS > 0 && defined( USE_MAP )\n\
                      uniform highp vec3 lightColor[ 2 ];\n\
                      #endif\n\
                      in vec3 position;\n\
                      void main() {}\n";

        // --- 2. ACT ---
        let analysis = analyse(ShaderStage::Vertex, source);

        // --- 3. ASSERT ---
        assert!(analysis.compiled, "{}", analysis.log);
        let names: Vec<_> = analysis.uniforms.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["map", "lightColor"]);
        assert_eq!(analysis.uniforms[1].size, 2);
        assert_eq!(analysis.attributes[0].name, "position");
    }

    #[test]
    fn test_error_directive_fails_only_when_active() {
        let inactive = analyse(
            ShaderStage::Fragment,
            "#ifdef NOPE\n#error never\n#endif\nvoid main() {}\n",
        );
        assert!(inactive.compiled);

        let active = analyse(ShaderStage::Fragment, "void main() {}\n#error broken shader\n");
        assert!(!active.compiled);
        assert!(active.log.contains("0:2:"));
        assert!(active.log.contains("broken shader"));
    }

    #[test]
    fn test_missing_main_fails() {
        let analysis = analyse(ShaderStage::Vertex, "uniform float x;\n");
        assert!(!analysis.compiled);
    }

    #[test]
    fn test_zero_sized_arrays_are_not_reflected() {
        let analysis = analyse(
            ShaderStage::Fragment,
            "uniform sampler2D shadowMap[ 0 ];\nvoid main() {}\n",
        );
        assert!(analysis.uniforms.is_empty());
    }
}
