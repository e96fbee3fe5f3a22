use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub url: String,
    /// Bounded per-operation timeout; on expiry the call degrades to a miss
    pub op_timeout_ms: u64,
    /// Time-to-live for volatile version mirrors
    pub version_ttl_secs: u64,
    /// Minimum perceptual similarity for a fuzzy cache hit
    pub similarity_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub originals_path: PathBuf,
    pub processed_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://./imgcache.db".to_string(),
                max_connections: Some(10),
            },
            cache: CacheConfig {
                url: "redis://127.0.0.1:6379".to_string(),
                op_timeout_ms: 500,
                version_ttl_secs: 604_800, // one week
                similarity_threshold: 0.97,
            },
            storage: StorageConfig {
                originals_path: PathBuf::from("./data/images/originals"),
                processed_path: PathBuf::from("./data/images/processed"),
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(&config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::create_dir_all(&default_config.storage.originals_path)?;
            std::fs::create_dir_all(&default_config.storage.processed_path)?;
            std::fs::write(&config_file, contents)?;
            Ok(default_config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.database.url, config.database.url);
        assert_eq!(parsed.cache.version_ttl_secs, 604_800);
        assert_eq!(parsed.cache.similarity_threshold, 0.97);
    }
}
