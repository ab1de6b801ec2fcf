//! Scene, tessellation and export settings.
//!
//! Every field has a default, so a JSON document only needs the values it
//! wants to change:
//!
//! ```
//! use cadcam_core::SceneConfig;
//!
//! let config = SceneConfig::from_json(r#"{"kernel": {"default_segments": 64}}"#).unwrap();
//! assert_eq!(config.kernel.default_segments, 64);
//! assert_eq!(config.history_limit, 100);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::geometry::Shading;

/// Geometry kernel tessellation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Radial segments used when a sphere or cylinder does not specify any.
    pub default_segments: u32,
    /// Upper bound on requested segments, bounding triangle count.
    pub max_segments: u32,
    /// Normal generation mode.
    pub shading: Shading,
    /// Profiles whose enclosed area is at or below this are degenerate.
    pub area_epsilon: f32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            default_segments: 32,
            max_segments: 1024,
            shading: Shading::Flat,
            area_epsilon: 1e-9,
        }
    }
}

/// STL flavour written by the export adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StlEncoding {
    #[default]
    Binary,
    Ascii,
}

/// Export adapter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub stl_encoding: StlEncoding,
    /// Largest fraction of zero-area facets that may be skipped before the
    /// export is refused.
    pub degenerate_tolerance: f32,
    /// Facets with area at or below this are skipped.
    pub degenerate_area_epsilon: f32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            stl_encoding: StlEncoding::Binary,
            degenerate_tolerance: 0.05,
            degenerate_area_epsilon: 1e-12,
        }
    }
}

/// Top-level settings for a [`SceneManager`](crate::SceneManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub kernel: KernelConfig,
    pub export: ExportConfig,
    /// Undo records kept per scene; older ones are dropped.
    pub history_limit: usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            kernel: KernelConfig::default(),
            export: ExportConfig::default(),
            history_limit: 100,
        }
    }
}

impl SceneConfig {
    /// Parse a JSON document, filling unspecified fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] for malformed JSON, unknown enum values
    /// or settings that can never work (for example `max_segments < 3`).
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| CoreError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that can never work.
    ///
    /// Run by [`from_json`](Self::from_json) and by
    /// [`SceneManager::new`](crate::SceneManager::new).
    pub fn validate(&self) -> CoreResult<()> {
        let fail = |message: &str| {
            Err(CoreError::Config {
                message: message.to_string(),
            })
        };
        if self.kernel.max_segments < 3 {
            return fail("kernel.max_segments must be at least 3");
        }
        if !(3..=self.kernel.max_segments).contains(&self.kernel.default_segments) {
            return fail("kernel.default_segments must lie in 3..=max_segments");
        }
        if !(0.0..=1.0).contains(&self.export.degenerate_tolerance) {
            return fail("export.degenerate_tolerance must be a fraction in [0, 1]");
        }
        let is_epsilon = |v: f32| v.is_finite() && v >= 0.0;
        if !is_epsilon(self.kernel.area_epsilon) {
            return fail("kernel.area_epsilon must be finite and non-negative");
        }
        if !is_epsilon(self.export.degenerate_area_epsilon) {
            return fail("export.degenerate_area_epsilon must be finite and non-negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SceneConfig::default();
        assert_eq!(config.kernel.default_segments, 32);
        assert_eq!(config.kernel.shading, Shading::Flat);
        assert_eq!(config.export.stl_encoding, StlEncoding::Binary);
        assert_eq!(config.history_limit, 100);
    }

    #[test]
    fn test_partial_json() {
        let config = SceneConfig::from_json(
            r#"{"kernel": {"shading": "smooth"}, "export": {"stl_encoding": "ascii"}}"#,
        )
        .unwrap();
        assert_eq!(config.kernel.shading, Shading::Smooth);
        assert_eq!(config.kernel.default_segments, 32);
        assert_eq!(config.export.stl_encoding, StlEncoding::Ascii);
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(matches!(
            SceneConfig::from_json(r#"{"export": {"stl_encoding": "step"}}"#),
            Err(CoreError::Config { .. })
        ));
        assert!(matches!(
            SceneConfig::from_json(r#"{"kernel": {"default_segments": 2}}"#),
            Err(CoreError::Config { .. })
        ));
        assert!(SceneConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_validate_catches_code_built_config() {
        assert!(SceneConfig::default().validate().is_ok());

        let mut config = SceneConfig::default();
        config.export.degenerate_tolerance = f32::NAN;
        assert!(matches!(config.validate(), Err(CoreError::Config { .. })));

        let mut config = SceneConfig::default();
        config.kernel.area_epsilon = -1.0;
        assert!(config.validate().is_err());

        let mut config = SceneConfig::default();
        config.export.degenerate_area_epsilon = f32::INFINITY;
        assert!(config.validate().is_err());
    }
}
