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

//! Uniform values and program reflection data.

use super::handles::UniformLocation;
use crate::math::{Mat3, Mat4, Vec2, Vec3, Vec4};

/// A value uploaded to a uniform location.
///
/// Equality is plain value equality. The uniform cache compares against the last
/// value uploaded to a location, so a mutated array uploads while an equal one is
/// skipped.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
    Vec2Array(Vec<Vec2>),
    Vec3Array(Vec<Vec3>),
    Vec4Array(Vec<Vec4>),
    Mat4Array(Vec<Mat4>),
}

impl UniformValue {
    /// Number of array elements carried by the value (`1` for scalars).
    pub fn len(&self) -> usize {
        match self {
            UniformValue::FloatArray(v) => v.len(),
            UniformValue::IntArray(v) => v.len(),
            UniformValue::Vec2Array(v) => v.len(),
            UniformValue::Vec3Array(v) => v.len(),
            UniformValue::Vec4Array(v) => v.len(),
            UniformValue::Mat4Array(v) => v.len(),
            _ => 1,
        }
    }

    /// Returns `true` for an empty array value.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Mat3> for UniformValue {
    fn from(v: Mat3) -> Self {
        UniformValue::Mat3(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

/// The GLSL type of an active uniform or attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    Bool,
    Mat3,
    Mat4,
    Sampler2D,
    SamplerCube,
    Sampler2DShadow,
}

impl UniformType {
    /// Parses a GLSL type keyword.
    pub fn from_glsl(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "float" => UniformType::Float,
            "vec2" => UniformType::Vec2,
            "vec3" => UniformType::Vec3,
            "vec4" => UniformType::Vec4,
            "int" => UniformType::Int,
            "bool" => UniformType::Bool,
            "mat3" => UniformType::Mat3,
            "mat4" => UniformType::Mat4,
            "sampler2D" => UniformType::Sampler2D,
            "samplerCube" => UniformType::SamplerCube,
            "sampler2DShadow" => UniformType::Sampler2DShadow,
            _ => return None,
        })
    }

    /// Returns `true` for sampler types, which consume texture units.
    pub const fn is_sampler(self) -> bool {
        matches!(
            self,
            UniformType::Sampler2D | UniformType::SamplerCube | UniformType::Sampler2DShadow
        )
    }
}

/// A uniform reported by program reflection.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveUniform {
    /// Base name, without any `[0]` suffix.
    pub name: String,
    /// GLSL type.
    pub ty: UniformType,
    /// Array length, `1` for non-arrays.
    pub size: u32,
    /// Location of the first element.
    pub location: UniformLocation,
}

/// A vertex attribute reported by program reflection.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAttribute {
    /// Attribute name.
    pub name: String,
    /// GLSL type.
    pub ty: UniformType,
    /// Location of the attribute. Matrices occupy consecutive locations.
    pub location: u32,
}

impl ActiveAttribute {
    /// Number of consecutive locations the attribute occupies.
    pub const fn location_count(&self) -> u32 {
        match self.ty {
            UniformType::Mat3 => 3,
            UniformType::Mat4 => 4,
            _ => 1,
        }
    }
}
