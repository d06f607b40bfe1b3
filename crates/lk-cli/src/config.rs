//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use lk_core::{DeviceId, DeviceLog, LightDarkCycle, MergeConfig, Phase, VolumeInterpolator, VolumeKind};
use serde::{Deserialize, Serialize};

use crate::commands::util::{parse_datetime, parse_time_of_day};

/// One phase of the light/dark schedule, in `HH:MM[:SS]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseEntry {
    pub phase: Phase,
    pub start: String,
    pub end: String,
}

/// One manual volume reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeEntry {
    pub kind: VolumeKind,
    pub timestamp: String,
    pub device: DeviceId,
    #[serde(default)]
    pub left: Option<f64>,
    #[serde(default)]
    pub right: Option<f64>,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Milliseconds added to the gap between merged sessions.
    pub merge_clock_pad_ms: i64,

    /// Light/dark schedule; empty when not configured.
    #[serde(default)]
    pub light_dark: Vec<PhaseEntry>,

    /// Volume readings; empty when not configured.
    #[serde(default)]
    pub volumes: Vec<VolumeEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            merge_clock_pad_ms: MergeConfig::default().clock_pad_ms,
            light_dark: Vec::new(),
            volumes: Vec::new(),
        }
    }
}

/// Shared collaborators built once from the config, so every log refers to
/// the same instances.
#[derive(Debug, Clone, Default)]
pub struct Collaborators {
    pub volume: Option<Arc<VolumeInterpolator>>,
    pub light_dark: Option<Arc<LightDarkCycle>>,
}

impl Collaborators {
    /// Attaches whichever collaborators are configured.
    pub fn attach(&self, log: DeviceLog) -> DeviceLog {
        let log = match &self.volume {
            Some(volume) => log.with_volume(Arc::clone(volume)),
            None => log,
        };
        match &self.light_dark {
            Some(cycle) => log.with_light_dark(Arc::clone(cycle)),
            None => log,
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (LICK_*)
        figment = figment.merge(Env::prefixed("LICK_"));

        figment.extract()
    }

    pub const fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            clock_pad_ms: self.merge_clock_pad_ms,
        }
    }

    /// Builds the validated light/dark schedule, if one is configured.
    pub fn light_dark_cycle(&self) -> Result<Option<LightDarkCycle>> {
        if self.light_dark.is_empty() {
            return Ok(None);
        }

        let mut cycle = LightDarkCycle::new();
        for (idx, entry) in self.light_dark.iter().enumerate() {
            let start = parse_time_of_day(&entry.start)
                .with_context(|| format!("invalid start in light_dark entry {}", idx + 1))?;
            let end = parse_time_of_day(&entry.end)
                .with_context(|| format!("invalid end in light_dark entry {}", idx + 1))?;
            cycle
                .add_phase(entry.phase, start, end)
                .with_context(|| format!("invalid light_dark entry {}", idx + 1))?;
        }
        cycle.validate().context("invalid light/dark schedule")?;
        Ok(Some(cycle))
    }

    /// Builds the volume readings, if any are configured.
    pub fn volume_data(&self) -> Result<Option<VolumeInterpolator>> {
        if self.volumes.is_empty() {
            return Ok(None);
        }

        let mut volume = VolumeInterpolator::new();
        for (idx, entry) in self.volumes.iter().enumerate() {
            let timestamp = parse_datetime(&entry.timestamp)
                .with_context(|| format!("invalid timestamp in volumes entry {}", idx + 1))?;
            volume
                .add(entry.kind, timestamp, entry.device, entry.left, entry.right)
                .with_context(|| format!("invalid volumes entry {}", idx + 1))?;
        }
        Ok(Some(volume))
    }

    /// Builds the shared collaborators for attaching to logs.
    pub fn collaborators(&self) -> Result<Collaborators> {
        Ok(Collaborators {
            volume: self.volume_data()?.map(Arc::new),
            light_dark: self.light_dark_cycle()?.map(Arc::new),
        })
    }
}

/// Returns the platform-specific config directory for lick.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("lick"))
}
