use std::collections::HashMap;
use std::env::VarError;
use std::path::PathBuf;

use super::*;

fn lookup_from_map<'a>(
    map: &'a HashMap<&'a str, &'a str>,
) -> impl Fn(&str) -> Result<String, VarError> + 'a {
    move |key| {
        map.get(key)
            .map(|v| (*v).to_string())
            .ok_or(VarError::NotPresent)
    }
}

/// Returns a map with all required env vars populated with valid defaults.
fn full_env<'a>() -> HashMap<&'a str, &'a str> {
    let mut m = HashMap::new();
    m.insert("ADGRAB_ACCESS_TOKEN", "test-token");
    m
}

#[test]
fn build_app_config_fails_without_access_token() {
    let map: HashMap<&str, &str> = HashMap::new();
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "ADGRAB_ACCESS_TOKEN"),
        "expected MissingEnvVar(ADGRAB_ACCESS_TOKEN), got: {result:?}"
    );
}

#[test]
fn build_app_config_defaults() {
    let map = full_env();
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.access_token, "test-token");
    assert!(cfg.api_base_url.is_none());
    assert_eq!(cfg.out_dir, PathBuf::from("./output"));
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.request_timeout_secs, 60);
    assert_eq!(cfg.api_rate_limit, 25);
    assert_eq!(cfg.api_rate_window_secs, 60);
    assert_eq!(cfg.media_rate_limit, 5);
    assert_eq!(cfg.media_rate_window_secs, 1);
    assert_eq!(cfg.max_retries, 3);
    assert_eq!(cfg.backoff_base_ms, 1000);
    assert_eq!(cfg.download_workers, 4);
    assert_eq!(cfg.max_inflight_records, 16);
    assert_eq!(cfg.drain_timeout_secs, 30);
    assert!(!cfg.ocr_enabled);
    assert!(!cfg.persist_dedup_index);
}

#[test]
fn build_app_config_overrides() {
    let mut map = full_env();
    map.insert("ADGRAB_API_BASE_URL", "http://localhost:9000");
    map.insert("ADGRAB_OUT_DIR", "/tmp/adgrab-out");
    map.insert("ADGRAB_DOWNLOAD_WORKERS", "8");
    map.insert("ADGRAB_MAX_RETRIES", "5");
    map.insert("ADGRAB_OCR_ENABLED", "true");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.api_base_url.as_deref(), Some("http://localhost:9000"));
    assert_eq!(cfg.out_dir, PathBuf::from("/tmp/adgrab-out"));
    assert_eq!(cfg.download_workers, 8);
    assert_eq!(cfg.max_retries, 5);
    assert!(cfg.ocr_enabled);
}

#[test]
fn build_app_config_invalid_workers() {
    let mut map = full_env();
    map.insert("ADGRAB_DOWNLOAD_WORKERS", "not-a-number");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "ADGRAB_DOWNLOAD_WORKERS"),
        "expected InvalidEnvVar(ADGRAB_DOWNLOAD_WORKERS), got: {result:?}"
    );
}

#[test]
fn build_app_config_invalid_bool() {
    let mut map = full_env();
    map.insert("ADGRAB_OCR_ENABLED", "yes");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "ADGRAB_OCR_ENABLED"),
        "expected InvalidEnvVar(ADGRAB_OCR_ENABLED), got: {result:?}"
    );
}

#[test]
fn debug_redacts_access_token() {
    let map = full_env();
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    let rendered = format!("{cfg:?}");
    assert!(!rendered.contains("test-token"));
    assert!(rendered.contains("[redacted]"));
}
