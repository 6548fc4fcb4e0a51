// Configuration Service
// Engine settings from environment variables, plus file-backed storage
// for API keys and overrides (with version backup)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Runtime settings consumed by the analysis pipeline.
///
/// Every field can be overridden through a `CONTEXTDIFF_`-prefixed
/// environment variable; `Default` carries the shipped values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // Model
    pub default_model: String,
    pub premium_model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub model_timeout_secs: u64,

    // Retry
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,

    // Pipeline
    pub short_circuit_threshold: f64,
    pub chunk_threshold_chars: usize,
    pub max_chunk_chars: usize,
    pub max_text_chars: usize,
    pub max_concurrent_chunks: usize,
    pub safety_threshold: u8,
    pub request_timeout_secs: u64,

    // Cache
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,

    // Rate limiting
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub burst: u32,
    pub bucket_idle_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-4o-mini".to_string(),
            premium_model: "gpt-4o".to_string(),
            max_tokens: 1500,
            temperature: 0.0,
            model_timeout_secs: 25,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
            short_circuit_threshold: 0.99,
            chunk_threshold_chars: 8000,
            max_chunk_chars: 3000,
            max_text_chars: 50_000,
            max_concurrent_chunks: 10,
            safety_threshold: 50,
            request_timeout_secs: 120,
            cache_ttl_secs: 3600,
            cache_capacity: 1000,
            requests_per_window: 60,
            window_secs: 60,
            burst: 10,
            bucket_idle_secs: 300,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

impl EngineConfig {
    /// Load settings from `CONTEXTDIFF_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            default_model: env::var("CONTEXTDIFF_DEFAULT_MODEL").unwrap_or(d.default_model),
            premium_model: env::var("CONTEXTDIFF_PREMIUM_MODEL").unwrap_or(d.premium_model),
            max_tokens: env_parse("CONTEXTDIFF_MAX_TOKENS", d.max_tokens),
            temperature: env_parse("CONTEXTDIFF_TEMPERATURE", d.temperature),
            model_timeout_secs: env_parse("CONTEXTDIFF_MODEL_TIMEOUT_SECS", d.model_timeout_secs),
            retry_max_attempts: env_parse("CONTEXTDIFF_RETRY_MAX_ATTEMPTS", d.retry_max_attempts),
            retry_base_delay_ms: env_parse("CONTEXTDIFF_RETRY_BASE_DELAY_MS", d.retry_base_delay_ms),
            retry_max_delay_ms: env_parse("CONTEXTDIFF_RETRY_MAX_DELAY_MS", d.retry_max_delay_ms),
            short_circuit_threshold: env_parse(
                "CONTEXTDIFF_SHORT_CIRCUIT_THRESHOLD",
                d.short_circuit_threshold,
            ),
            chunk_threshold_chars: env_parse(
                "CONTEXTDIFF_CHUNK_THRESHOLD_CHARS",
                d.chunk_threshold_chars,
            ),
            max_chunk_chars: env_parse("CONTEXTDIFF_MAX_CHUNK_CHARS", d.max_chunk_chars),
            max_text_chars: env_parse("CONTEXTDIFF_MAX_TEXT_CHARS", d.max_text_chars),
            max_concurrent_chunks: env_parse(
                "CONTEXTDIFF_MAX_CONCURRENT_CHUNKS",
                d.max_concurrent_chunks,
            ),
            safety_threshold: env_parse("CONTEXTDIFF_SAFETY_THRESHOLD", d.safety_threshold),
            request_timeout_secs: env_parse(
                "CONTEXTDIFF_REQUEST_TIMEOUT_SECS",
                d.request_timeout_secs,
            ),
            cache_ttl_secs: env_parse("CONTEXTDIFF_CACHE_TTL_SECS", d.cache_ttl_secs),
            cache_capacity: env_parse("CONTEXTDIFF_CACHE_CAPACITY", d.cache_capacity),
            requests_per_window: env_parse(
                "CONTEXTDIFF_RATE_LIMIT_PER_MINUTE",
                d.requests_per_window,
            ),
            window_secs: env_parse("CONTEXTDIFF_RATE_LIMIT_WINDOW_SECS", d.window_secs),
            burst: env_parse("CONTEXTDIFF_RATE_LIMIT_BURST", d.burst),
            bucket_idle_secs: env_parse("CONTEXTDIFF_BUCKET_IDLE_SECS", d.bucket_idle_secs),
        }
    }
}

// ============ File-backed configuration ============

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub provider_base_url: Option<String>,
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self {
            config_dir,
            config_file,
        }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("contextdiff"))
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), String> {
        fs::create_dir_all(&self.config_dir)
            .map_err(|e| format!("Failed to create config dir: {}", e))
    }

    /// Load configuration from file
    pub fn load(&self) -> Result<AppConfig, String> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| format!("Failed to read config: {}", e))?;

        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), String> {
        self.ensure_dir()?;

        // Create backup if file exists
        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(&self.config_file, content).map_err(|e| format!("Failed to write config: {}", e))
    }

    /// Create a backup of current config
    fn create_backup(&self) -> Result<(), String> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)
            .map_err(|e| format!("Failed to create backup dir: {}", e))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file)
            .map_err(|e| format!("Failed to create backup: {}", e))?;

        // Keep only last 10 backups
        self.cleanup_old_backups(&backup_dir, 10)?;

        Ok(())
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &PathBuf, keep: usize) -> Result<(), String> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(|e| format!("Failed to read backup dir: {}", e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // Sort by modification time (oldest first)
        entries.sort_by_key(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    /// Get provider API key from config file
    pub fn get_api_key(&self, provider: &str) -> Result<Option<String>, String> {
        let config = self.load()?;
        Ok(config.api_keys.get(provider).cloned())
    }

    /// Store provider API key in config file
    pub fn set_api_key(&self, provider: &str, key: &str) -> Result<(), String> {
        let mut config = self.load()?;
        config.api_keys.insert(provider.to_string(), key.to_string());
        self.save(&config)
    }

    /// Delete provider API key from config file
    pub fn delete_api_key(&self, provider: &str) -> Result<(), String> {
        let mut config = self.load()?;
        config.api_keys.remove(provider);
        self.save(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.default_model, "gpt-4o-mini");
        assert_eq!(config.cache_ttl_secs, 3600);
        assert_eq!(config.max_concurrent_chunks, 10);
        assert!(config.short_circuit_threshold > 0.9);
    }

    #[test]
    fn test_env_parse_fallback() {
        // Unset variable falls back
        assert_eq!(env_parse::<u32>("CONTEXTDIFF_TEST_UNSET_VAR", 7), 7);
    }

    #[test]
    fn test_app_config_serialization() {
        let mut config = AppConfig::default();
        config.version = "1.0.0".to_string();
        config
            .api_keys
            .insert("openai".to_string(), "sk-test".to_string());

        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.version, "1.0.0");
        assert_eq!(parsed.api_keys.get("openai").map(String::as_str), Some("sk-test"));
    }
}
