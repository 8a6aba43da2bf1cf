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

//! Global settings for the rendering system.
//!
//! Settings are plain data. They can be built in code or loaded from RON text, where
//! every omitted field keeps its default:
//!
//! ```ron
//! (
//!     pixel_ratio: 2.0,
//!     tone_mapping: AcesFilmic,
//!     shadow_map: (enabled: true, kind: Vsm),
//! )
//! ```

use super::error::ConfigError;
use super::format::Precision;
use crate::color::Color;
use serde::Deserialize;

/// The tone-mapping operator applied to lit fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[allow(missing_docs)]
pub enum ToneMapping {
    #[default]
    None,
    Linear,
    Reinhard,
    Cineon,
    AcesFilmic,
    AgX,
    Neutral,
}

/// The color encoding of the final output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum OutputEncoding {
    /// Linear values are written unchanged.
    Linear,
    /// Linear values are converted to sRGB.
    #[default]
    Srgb,
}

/// The filtering technique of shadow maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub enum ShadowMapKind {
    /// A single depth comparison.
    Basic,
    /// Percentage-closer filtering.
    #[default]
    Pcf,
    /// Softer percentage-closer filtering.
    PcfSoft,
    /// Variance shadow maps with a separable blur.
    Vsm,
}

/// Shadow map settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShadowMapSettings {
    /// Master switch for the shadow pass.
    pub enabled: bool,
    /// If `true`, shadow maps are re-rendered every frame.
    pub auto_update: bool,
    /// Requests a single shadow update when `auto_update` is off. Cleared after use.
    #[serde(skip)]
    pub needs_update: bool,
    /// The filtering technique.
    pub kind: ShadowMapKind,
}

impl Default for ShadowMapSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_update: true,
            needs_update: false,
            kind: ShadowMapKind::Pcf,
        }
    }
}

/// A collection of global settings that affect the rendering process.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Sort render lists before drawing.
    pub sort_objects: bool,
    /// Clear the target at the start of every `render`.
    pub auto_clear: bool,
    /// Include the color buffer in automatic clears.
    pub auto_clear_color: bool,
    /// Include the depth buffer in automatic clears.
    pub auto_clear_depth: bool,
    /// Include the stencil buffer in automatic clears.
    pub auto_clear_stencil: bool,
    /// The clear color (linear).
    pub clear_color: Color,
    /// The clear alpha.
    pub clear_alpha: f32,
    /// Device pixels per logical pixel, applied to viewport and scissor.
    pub pixel_ratio: f32,
    /// The requested shader precision. Downgraded if the device lacks support.
    pub precision: Precision,
    /// The tone-mapping operator.
    pub tone_mapping: ToneMapping,
    /// Exposure fed to the tone-mapping operator.
    pub tone_mapping_exposure: f32,
    /// The output color encoding.
    pub output_encoding: OutputEncoding,
    /// Write logarithmic depth from fragment shaders.
    pub logarithmic_depth_buffer: bool,
    /// Query compile and link status after building every program.
    pub check_shader_errors: bool,
    /// Reset per-frame render counters at the start of every `render`.
    pub info_auto_reset: bool,
    /// Honor per-material clipping planes.
    pub local_clipping_enabled: bool,
    /// Maximum number of retained diagnostics.
    pub diagnostics_capacity: usize,
    /// Shadow map settings.
    pub shadow_map: ShadowMapSettings,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            sort_objects: true,
            auto_clear: true,
            auto_clear_color: true,
            auto_clear_depth: true,
            auto_clear_stencil: true,
            clear_color: Color::BLACK,
            clear_alpha: 1.0,
            pixel_ratio: 1.0,
            precision: Precision::High,
            tone_mapping: ToneMapping::None,
            tone_mapping_exposure: 1.0,
            output_encoding: OutputEncoding::Srgb,
            logarithmic_depth_buffer: false,
            check_shader_errors: true,
            info_auto_reset: true,
            local_clipping_enabled: false,
            diagnostics_capacity: 256,
            shadow_map: ShadowMapSettings::default(),
        }
    }
}

impl RendererSettings {
    /// Parses settings from RON text and validates them.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let settings: Self = ron::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks value ranges that the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0) {
            return Err(ConfigError::Invalid {
                field: "pixel_ratio",
                reason: format!("must be a positive number, got {}", self.pixel_ratio),
            });
        }
        if !(0.0..=1.0).contains(&self.clear_alpha) {
            return Err(ConfigError::Invalid {
                field: "clear_alpha",
                reason: format!("must be within [0, 1], got {}", self.clear_alpha),
            });
        }
        if self.tone_mapping_exposure < 0.0 {
            return Err(ConfigError::Invalid {
                field: "tone_mapping_exposure",
                reason: "must not be negative".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ron_yields_defaults() {
        let settings = RendererSettings::from_ron_str("()").unwrap();
        assert_eq!(settings, RendererSettings::default());
    }

    #[test]
    fn test_partial_ron_overrides() {
        let settings = RendererSettings::from_ron_str(
            "(pixel_ratio: 2.0, tone_mapping: AcesFilmic, precision: medium, \
             clear_color: (r: 0.1, g: 0.2, b: 0.3), shadow_map: (enabled: true, kind: Vsm))",
        )
        .unwrap();
        assert_eq!(settings.pixel_ratio, 2.0);
        assert_eq!(settings.tone_mapping, ToneMapping::AcesFilmic);
        assert_eq!(settings.precision, Precision::Medium);
        assert_eq!(settings.clear_color, Color::rgb(0.1, 0.2, 0.3));
        assert!(settings.shadow_map.enabled);
        assert!(settings.shadow_map.auto_update);
        assert_eq!(settings.shadow_map.kind, ShadowMapKind::Vsm);
        assert!(settings.sort_objects);
    }

    #[test]
    fn test_invalid_pixel_ratio_rejected() {
        let err = RendererSettings::from_ron_str("(pixel_ratio: 0.0)").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "pixel_ratio",
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_ron_is_parse_error() {
        let err = RendererSettings::from_ron_str("(pixel_ratio: )").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
