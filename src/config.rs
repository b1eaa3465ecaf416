use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{AppError, AppResult};
use crate::uploader::retry::RetryConfig;

pub const DEFAULT_MCURL: &str = "https://materialscommons.org/api";

/// Options for one bulk upload call.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub parallel: bool,
    pub verbose: bool,
    pub size_limit_megabytes: u64,
    pub max_workers: usize,
    pub retry: RetryConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            verbose: false,
            size_limit_megabytes: 500,
            max_workers: 10,
            retry: RetryConfig::default(),
        }
    }
}

impl UploadConfig {
    pub fn size_limit_bytes(&self) -> u64 {
        self.size_limit_megabytes.saturating_mul(1024 * 1024)
    }
}

/// On-disk configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mcurl: String,
    pub apikey: String,
    pub parallel: bool,
    pub verbose: bool,
    pub size_limit_megabytes: u64,
    pub max_workers: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mcurl: DEFAULT_MCURL.to_string(),
            apikey: String::new(),
            parallel: true,
            verbose: false,
            size_limit_megabytes: 500,
            max_workers: 10,
            max_retries: 3,
            retry_base_delay_ms: 0,
            log_level: "info".to_string(),
        }
    }
}

impl From<&Config> for UploadConfig {
    fn from(config: &Config) -> Self {
        let retry = RetryConfig {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            ..RetryConfig::default()
        };

        UploadConfig {
            parallel: config.parallel,
            verbose: config.verbose,
            size_limit_megabytes: config.size_limit_megabytes,
            max_workers: config.max_workers,
            retry,
        }
    }
}

fn get_config_path() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join("materials-commons");

    fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("config.json"))
}

/// Load the user's config, creating a default one on first run.
pub fn load_config() -> AppResult<Config> {
    let config_path = get_config_path()?;
    let mut config = load_config_from(&config_path)?;

    apply_overrides(
        &mut config,
        std::env::var("MC_API_URL").ok(),
        std::env::var("MC_API_KEY").ok(),
    );
    validate_config(&config)?;

    Ok(config)
}

pub fn load_config_from(config_path: &Path) -> AppResult<Config> {
    if config_path.exists() {
        let config_str = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_str).unwrap_or_else(|e| {
            log::warn!("Failed to parse config file: {}. Using defaults.", e);
            Config::default()
        });

        validate_config(&config)?;

        Ok(config)
    } else {
        let default_config = Config::default();
        save_config_to(&default_config, config_path)?;
        Ok(default_config)
    }
}

pub fn save_config(config: &Config) -> AppResult<()> {
    validate_config(config)?;
    save_config_to(config, &get_config_path()?)
}

pub fn save_config_to(config: &Config, config_path: &Path) -> AppResult<()> {
    if config_path.exists() {
        let backup_path = config_path.with_extension("json.bak");
        if let Err(e) = fs::copy(config_path, &backup_path) {
            log::warn!("Failed to create config backup: {}", e);
        }
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(config_path, config_str)?;

    log::info!("Configuration saved to {}", config_path.display());
    Ok(())
}

/// Environment values win over the stored URL and key.
pub fn apply_overrides(config: &mut Config, mcurl: Option<String>, apikey: Option<String>) {
    if let Some(url) = mcurl.filter(|u| !u.trim().is_empty()) {
        log::debug!("Using API URL from environment: {}", url);
        config.mcurl = url.trim().to_string();
    }

    if let Some(key) = apikey.filter(|k| !k.trim().is_empty()) {
        config.apikey = key.trim().to_string();
    }
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    validate_upload_config(&UploadConfig::from(config))?;

    let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(AppError::validation("log_level", "Must be a valid log level"));
    }

    Ok(())
}

pub fn validate_upload_config(config: &UploadConfig) -> AppResult<()> {
    if config.max_workers == 0 || config.max_workers > 64 {
        return Err(AppError::validation("max_workers", "Must be between 1 and 64"));
    }

    if config.retry.max_retries > 10 {
        return Err(AppError::validation("max_retries", "Must be 10 or fewer"));
    }

    if config.size_limit_megabytes == 0 {
        return Err(AppError::validation(
            "size_limit_megabytes",
            "Must be greater than 0",
        ));
    }

    Ok(())
}
