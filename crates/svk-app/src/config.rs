// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use svk_core::LogLevel;
use svk_render::{FormatPreference, PresentModePreference, RenderSettings, ResizePolicy};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum PresentModeCfg {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
    FifoRelaxed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatCfg {
    #[default]
    Bgra8Srgb,
    Bgra8Unorm,
    Rgba8Srgb,
    Rgba8Unorm,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderCfg {
    pub present_mode: PresentModeCfg,
    pub preferred_format: FormatCfg,
    pub frames_in_flight: usize,
    /// 0 recreates on every resize event.
    pub resize_debounce_frames: u64,
    /// 0 waits without bound.
    pub acquire_timeout_ms: u64,
    pub clear_color: [f32; 4],
    /// Unset: on in debug builds only.
    pub validation: Option<bool>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            present_mode: PresentModeCfg::Fifo,
            preferred_format: FormatCfg::Bgra8Srgb,
            frames_in_flight: 2,
            resize_debounce_frames: 10,
            acquire_timeout_ms: 0,
            clear_color: [0.1, 0.2, 0.3, 1.0],
            validation: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogCfg {
    pub level: Option<LogLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppCfg {
    pub render: RenderCfg,
    pub log: LogCfg,
}

impl RenderCfg {
    pub fn to_settings(&self) -> RenderSettings {
        let defaults = RenderSettings::default();
        RenderSettings {
            present_mode: match self.present_mode {
                PresentModeCfg::Fifo => PresentModePreference::Fifo,
                PresentModeCfg::Mailbox => PresentModePreference::Mailbox,
                PresentModeCfg::Immediate => PresentModePreference::Immediate,
                PresentModeCfg::FifoRelaxed => PresentModePreference::FifoRelaxed,
            },
            preferred_format: match self.preferred_format {
                FormatCfg::Bgra8Srgb => FormatPreference::Bgra8Srgb,
                FormatCfg::Bgra8Unorm => FormatPreference::Bgra8Unorm,
                FormatCfg::Rgba8Srgb => FormatPreference::Rgba8Srgb,
                FormatCfg::Rgba8Unorm => FormatPreference::Rgba8Unorm,
            },
            frames_in_flight: self.frames_in_flight,
            resize_policy: ResizePolicy::from_frames(self.resize_debounce_frames),
            acquire_timeout: (self.acquire_timeout_ms > 0)
                .then(|| Duration::from_millis(self.acquire_timeout_ms)),
            clear_color: self.clear_color,
            validation: self.validation.unwrap_or(defaults.validation),
        }
    }
}

pub fn parse_cfg(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str(text)
}

/// A missing file yields defaults; an unreadable or malformed one is an error.
pub fn load_cfg(path: &Path) -> Result<AppCfg> {
    match fs::read_to_string(path) {
        Ok(text) => parse_cfg(&text).with_context(|| format!("parse {}", path.display())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(AppCfg::default()),
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}
