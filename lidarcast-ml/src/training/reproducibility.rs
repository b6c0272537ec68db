//! Reproducibility tracking: environment snapshots, seed management.

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Snapshot of the training environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub tool_version: String,
    pub system_info: String,
    pub platform: String,
    pub timestamp: DateTime<Utc>,
    /// SHA-256 of the effective configuration.
    pub config_hash: String,
    /// SHA-256 over the `LIDARCAST_*` environment variables.
    pub env_vars_hash: String,
}

impl EnvironmentSnapshot {
    pub fn capture<C: Serialize>(config: &C) -> Self {
        Self {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            system_info: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            platform: std::env::consts::OS.to_string(),
            timestamp: Utc::now(),
            config_hash: hash_config(config),
            env_vars_hash: Self::compute_env_vars_hash(),
        }
    }

    fn compute_env_vars_hash() -> String {
        let mut vars: Vec<(String, String)> = std::env::vars()
            .filter(|(k, _)| k.starts_with("LIDARCAST_"))
            .collect();
        vars.sort();
        let mut hasher = Sha256::new();
        for (key, value) in &vars {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

/// SHA-256 of the JSON form of a configuration value.
pub fn hash_config<C: Serialize>(config: &C) -> String {
    let json = serde_json::to_vec(config).unwrap_or_default();
    format!("{:x}", Sha256::digest(&json))
}

/// Derives independent, stable seeds for named components from one global
/// seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedManager {
    pub global_seed: u64,
    pub component_seeds: HashMap<String, u64>,
}

impl SeedManager {
    pub fn new(global_seed: u64) -> Self {
        Self {
            global_seed,
            component_seeds: HashMap::new(),
        }
    }

    pub fn get_seed(&mut self, component: &str) -> u64 {
        let global = self.global_seed;
        *self
            .component_seeds
            .entry(component.to_string())
            .or_insert_with(|| derive_seed(global, component))
    }

    /// Seeded generator for `component`.
    pub fn rng(&mut self, component: &str) -> StdRng {
        StdRng::seed_from_u64(self.get_seed(component))
    }
}

fn derive_seed(global: u64, component: &str) -> u64 {
    let digest = Sha256::new()
        .chain_update(global.to_le_bytes())
        .chain_update(component.as_bytes())
        .finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
