use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::alarm::AlarmConfig;
use crate::app_dirs::AppDirs;
use crate::stats::DEFAULT_RATE_WINDOW;

pub const DEFAULT_UPSTREAM_ADDR: &str = "127.0.0.1:8181";
pub const DEFAULT_TICK_RATE_MS: u64 = 100;
/// Below this the runner would spin on an empty channel
pub const MIN_TICK_RATE_MS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub upstream_addr: String,
    pub rate_window: usize,
    pub tick_rate_ms: u64,
    pub alarm: AlarmConfig,
    pub export_dir: Option<PathBuf>,
    pub record_history: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_addr: DEFAULT_UPSTREAM_ADDR.to_string(),
            rate_window: DEFAULT_RATE_WINDOW,
            tick_rate_ms: DEFAULT_TICK_RATE_MS,
            alarm: AlarmConfig::default(),
            export_dir: None,
            record_history: true,
        }
    }
}

impl Config {
    /// Clamp values a hand-edited file may have pushed out of range
    pub fn normalized(mut self) -> Self {
        self.tick_rate_ms = self.tick_rate_ms.max(MIN_TICK_RATE_MS);
        self.rate_window = self.rate_window.max(2);
        self
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            path: AppDirs::config_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg.normalized(),
                Err(e) => log::warn!("ignoring unreadable config {}: {e}", self.path.display()),
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).unwrap_or_default();
        fs::write(&self.path, data)
    }
}
