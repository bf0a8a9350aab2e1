use std::path::PathBuf;

use crate::app_config::AppConfig;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files — useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup — no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<bool>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let access_token = require("ADGRAB_ACCESS_TOKEN")?;
    let api_base_url = lookup("ADGRAB_API_BASE_URL").ok();
    let out_dir = PathBuf::from(or_default("ADGRAB_OUT_DIR", "./output"));
    let log_level = or_default("ADGRAB_LOG_LEVEL", "info");

    let request_timeout_secs = parse_u64("ADGRAB_REQUEST_TIMEOUT_SECS", "60")?;
    let user_agent = or_default("ADGRAB_USER_AGENT", "adgrab/0.1 (ad-archive-collection)");

    let api_rate_limit = parse_usize("ADGRAB_API_RATE_LIMIT", "25")?;
    let api_rate_window_secs = parse_u64("ADGRAB_API_RATE_WINDOW_SECS", "60")?;
    let media_rate_limit = parse_usize("ADGRAB_MEDIA_RATE_LIMIT", "5")?;
    let media_rate_window_secs = parse_u64("ADGRAB_MEDIA_RATE_WINDOW_SECS", "1")?;

    let max_retries = parse_u32("ADGRAB_MAX_RETRIES", "3")?;
    let backoff_base_ms = parse_u64("ADGRAB_BACKOFF_BASE_MS", "1000")?;

    let download_workers = parse_usize("ADGRAB_DOWNLOAD_WORKERS", "4")?;
    let max_inflight_records = parse_usize("ADGRAB_MAX_INFLIGHT_RECORDS", "16")?;
    let drain_timeout_secs = parse_u64("ADGRAB_DRAIN_TIMEOUT_SECS", "30")?;

    let ocr_enabled = parse_bool("ADGRAB_OCR_ENABLED", "false")?;
    let persist_dedup_index = parse_bool("ADGRAB_PERSIST_DEDUP_INDEX", "false")?;

    Ok(AppConfig {
        access_token,
        api_base_url,
        out_dir,
        log_level,
        request_timeout_secs,
        user_agent,
        api_rate_limit,
        api_rate_window_secs,
        media_rate_limit,
        media_rate_window_secs,
        max_retries,
        backoff_base_ms,
        download_workers,
        max_inflight_records,
        drain_timeout_secs,
        ocr_enabled,
        persist_dedup_index,
    })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
