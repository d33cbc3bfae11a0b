use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::core::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_path: PathBuf,

    // Store access
    pub lock_timeout_ms: u64,                   // Bounded lock attempt
    pub scratch_high_water: usize,              // Release encoder scratch above this

    // Collection cache
    pub collection_cache_size: usize,
    pub collection_cache_growth_threshold: usize, // Replacements between memory requests
    pub cache_memory_budget: usize,             // Max slots the cache manager hands out
    pub cache_growth_factor: f64,

    pub progress_step_percent: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),

            lock_timeout_ms: 2000,
            scratch_high_water: 512_000,

            collection_cache_size: 64,
            collection_cache_growth_threshold: 1000,
            cache_memory_budget: 4096,
            cache_growth_factor: 1.25,

            progress_step_percent: 5,
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn snapshot_path(&self, name: &str) -> PathBuf {
        self.storage_path.join(format!("{}.dbx", name))
    }
}
