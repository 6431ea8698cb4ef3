use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Gateway-wide configuration. The core reads no configuration files
/// (§6); the only environment override is `DB_PATH`. Everything else is
/// a compiled-in default, matching spec.md's "no schema migration
/// framework, no config files" posture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub bm25: Bm25Config,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub call_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            bm25: Bm25Config::default(),
            loader: LoaderConfig::default(),
            call_timeout_ms: 30_000,
        }
    }
}

impl GatewayConfig {
    /// Build config from the process environment, per §6: `DB_PATH`
    /// overrides the default database location; nothing else is read
    /// from the environment.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(path) = std::env::var("DB_PATH") {
            cfg.store.db_path = PathBuf::from(path);
        }
        cfg
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".awesome-plugin")
        .join("data.db")
}

/// BM25 saturation/length-normalization parameters (§4.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bm25Config {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Tool Loader policy parameters (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub max_layer2: usize,
    pub score_floor: f64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_layer2: 15,
            score_floor: 0.0,
        }
    }
}
