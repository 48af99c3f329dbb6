use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::invoker::Transport;
use crate::locator::OutputLayout;
use crate::{Error, Result};

pub const DEFAULT_LOG_FILE: &str = "tile_processing.log";

/// Parameters forwarded to the tiling tool on every invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingParams {
    pub patch_size: u32,
    pub content_threshold: f64,
    pub output_downsample: u32,
    pub borders: String,
    pub corners: String,
    pub percentage_bc: u32,
    pub k_const: u32,
    pub minimum_segmentsize: u32,
}

impl Default for TilingParams {
    fn default() -> Self {
        Self {
            patch_size: 512,
            content_threshold: 0.4,
            output_downsample: 4,
            borders: "0000".to_string(),
            corners: "1010".to_string(),
            percentage_bc: 1,
            k_const: 1000,
            minimum_segmentsize: 1000,
        }
    }
}

impl TilingParams {
    /// Tool arguments up to (not including) `--output <dir> <image>`.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--patch-size".to_string(),
            self.patch_size.to_string(),
            "--content-threshold".to_string(),
            self.content_threshold.to_string(),
            "--output-downsample".to_string(),
            self.output_downsample.to_string(),
            "--borders".to_string(),
            self.borders.clone(),
            "--corners".to_string(),
            self.corners.clone(),
            "--percentage-bc".to_string(),
            self.percentage_bc.to_string(),
            "--k-const".to_string(),
            self.k_const.to_string(),
            "--minimum_segmentsize".to_string(),
            self.minimum_segmentsize.to_string(),
            "--save-patches".to_string(),
            "--save-tilecrossed-image".to_string(),
            "--info".to_string(),
            "verbose".to_string(),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.content_threshold) {
            return Err(Error::Validation(format!(
                "content_threshold must be within 0..1, got {}",
                self.content_threshold
            )));
        }
        let mask = Regex::new(r"^[01]{4}$").map_err(|e| Error::Validation(e.to_string()))?;
        for (field, value) in [("borders", &self.borders), ("corners", &self.corners)] {
            if !mask.is_match(value) {
                return Err(Error::Validation(format!(
                    "{} must be four 0/1 digits, got {:?}",
                    field, value
                )));
            }
        }
        for (field, value) in [
            ("patch_size", self.patch_size),
            ("output_downsample", self.output_downsample),
        ] {
            if value == 0 {
                return Err(Error::Validation(format!("{} must be positive", field)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub layout: OutputLayout,
    /// Upper bound on concurrent tool invocations; `None` means one per CPU.
    pub max_workers: Option<usize>,
    pub log_file: Option<String>,
    /// Per-invocation timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Start from an empty archive instead of appending to an existing one.
    pub fresh_archive: bool,
    /// Treat any failed task as a failed run.
    pub strict: bool,
    pub tiling: TilingParams,
    pub transport: Transport,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let path = expand_tilde(&path.to_string_lossy());
        let config: Self = toml::from_str(&fs::read_to_string(&path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.tiling.validate()?;
        if self.max_workers == Some(0) {
            return Err(Error::Validation("max_workers must be at least 1".to_string()));
        }
        if self.timeout_secs == Some(0) {
            return Err(Error::Validation("timeout_secs must be at least 1".to_string()));
        }
        self.transport.validate()
    }

    /// Pool size: the configured cap, never above available parallelism.
    pub fn effective_workers(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.max_workers.unwrap_or(cpus).min(cpus).max(1)
    }

    pub fn log_path(&self) -> PathBuf {
        expand_tilde(self.log_file.as_deref().unwrap_or(DEFAULT_LOG_FILE))
    }

    pub fn timeout(&self) -> Option<std::time::Duration> {
        self.timeout_secs.map(std::time::Duration::from_secs)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
