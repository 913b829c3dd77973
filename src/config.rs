//! Viewer configuration surface.
//!
//! [`ViewerConfig`] holds every option the upstream UI may set. It can be
//! built in code, or read from a JSON document with [`ViewerConfig::from_json`]
//! / [`ViewerConfig::load`]. Missing fields fall back to their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Scene background.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackgroundMode {
    #[default]
    Dark,
    Light,
    Transparent,
}

impl BackgroundMode {
    pub fn clear_colour(self) -> wgpu::Color {
        match self {
            Self::Dark => wgpu::Color {
                r: 0.08,
                g: 0.09,
                b: 0.11,
                a: 1.0,
            },
            Self::Light => wgpu::Color {
                r: 0.93,
                g: 0.94,
                b: 0.95,
                a: 1.0,
            },
            Self::Transparent => wgpu::Color::TRANSPARENT,
        }
    }

    /// The next mode when the user cycles through backgrounds.
    pub fn next(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Transparent,
            Self::Transparent => Self::Dark,
        }
    }
}

/// Discrete sensitivity levels the user can switch between at runtime.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensitivityPreset {
    Low,
    #[default]
    Normal,
    High,
}

/// Multipliers applied uniformly to rotate, zoom and pan speed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SensitivityPresets {
    pub low: f32,
    pub normal: f32,
    pub high: f32,
}

impl Default for SensitivityPresets {
    fn default() -> Self {
        Self {
            low: 0.5,
            normal: 1.0,
            high: 2.0,
        }
    }
}

impl SensitivityPresets {
    pub fn multiplier(&self, preset: SensitivityPreset) -> f32 {
        match preset {
            SensitivityPreset::Low => self.low,
            SensitivityPreset::Normal => self.normal,
            SensitivityPreset::High => self.high,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    /// Largest bounding-box dimension of every normalized asset.
    pub target_size: f32,
    /// Flat fallback material colour (linear RGBA).
    pub default_color: [f32; 4],
    /// Lower-case extensions the caller allows to be loaded.
    pub supported_extensions: Vec<String>,
    pub sensitivity_presets: SensitivityPresets,
    pub sensitivity: SensitivityPreset,
    pub auto_rotate: bool,
    pub grid_visible: bool,
    pub background_mode: BackgroundMode,
    /// How many archives deep a bundle may nest other archives.
    pub max_archive_depth: usize,
    /// How long extracted bundle entries outlive the load that produced them.
    pub scratch_grace_millis: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            target_size: 5.0,
            default_color: [0.8, 0.8, 0.8, 1.0],
            supported_extensions: ["stl", "obj", "glb", "gltf", "zip"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            sensitivity_presets: SensitivityPresets::default(),
            sensitivity: SensitivityPreset::Normal,
            auto_rotate: false,
            grid_visible: true,
            background_mode: BackgroundMode::Dark,
            max_archive_depth: 4,
            scratch_grace_millis: 2000,
        }
    }
}

impl ViewerConfig {
    pub fn from_json(value: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the config at `path`, or returns the defaults when the file is absent.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_json(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.target_size.is_finite() && self.target_size > 0.0) {
            anyhow::bail!("target_size must be a positive number, got {}", self.target_size);
        }
        if self.supported_extensions.is_empty() {
            anyhow::bail!("supported_extensions must not be empty");
        }
        Ok(())
    }

    pub fn is_extension_allowed(&self, extension: &str) -> bool {
        self.supported_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }

    pub fn sensitivity_multiplier(&self) -> f32 {
        self.sensitivity_presets.multiplier(self.sensitivity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ViewerConfig::from_json(r#"{ "target_size": 2.0, "auto_rotate": true }"#)
            .expect("valid config");
        assert_eq!(config.target_size, 2.0);
        assert!(config.auto_rotate);
        assert!(config.grid_visible);
        assert_eq!(config.max_archive_depth, 4);
        assert!(config.is_extension_allowed("STL"));
    }

    #[test]
    fn rejects_non_positive_target_size() {
        assert!(ViewerConfig::from_json(r#"{ "target_size": 0.0 }"#).is_err());
    }

    #[test]
    fn presets_resolve_multipliers() {
        let mut config = ViewerConfig::default();
        config.sensitivity = SensitivityPreset::High;
        assert_eq!(config.sensitivity_multiplier(), 2.0);
        assert_eq!(BackgroundMode::Transparent.next(), BackgroundMode::Dark);
    }
}
