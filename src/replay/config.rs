// Replay configuration
//
// Loaded from TOML; every key is optional and falls back to `ReplayConfig::default()`.

use crate::codec::DEFAULT_LEGACY_THRESHOLD;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Knobs for a replay run
///
/// # Example
/// ```
/// use gltrace::replay::ReplayConfig;
///
/// let config = ReplayConfig::default();
/// assert_eq!(config.legacy_threshold, 5);
/// assert!(config.max_frames.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplayConfig {
    /// Traces at or below this version store opaque arguments as bare blobs
    ///
    /// Default: 5
    pub legacy_threshold: u32,

    /// Stop after this many frame boundaries
    pub max_frames: Option<u64>,

    /// Skip calls the schema marks as free of side effects (queries, getters)
    ///
    /// Calls whose return value registers a handle are never skipped.
    pub skip_side_effect_free: bool,

    /// Persistent shader cache; linking is short-circuited on a hit
    pub shader_cache: Option<PathBuf>,

    /// Keep per-draw parameters in the report
    pub collect_draw_params: bool,

    /// Redirect binds of the default framebuffer to an offscreen one
    pub force_offscreen: bool,

    /// First id the headless driver hands out
    ///
    /// Non-zero values make remapping visible in tests and logs.
    pub driver_id_base: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            legacy_threshold: DEFAULT_LEGACY_THRESHOLD,
            max_frames: None,
            skip_side_effect_free: false,
            shader_cache: None,
            collect_draw_params: false,
            force_offscreen: false,
            driver_id_base: 1,
        }
    }
}

impl ReplayConfig {
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read replay config: {}", path.as_ref().display())
        })?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid replay config: {}", path.as_ref().display()))?;
        config
            .validate()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Invalid replay config: {}", path.as_ref().display()))?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.driver_id_base == 0 {
            return Err("driver_id_base must be non-zero; id 0 means 'no object'".to_string());
        }
        if self.max_frames == Some(0) {
            return Err("max_frames must be at least 1 when set".to_string());
        }
        Ok(())
    }
}
