//! Application configuration.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ENPDF2ZHMD_HOME, ENPDF2ZHMD_API_KEY)
//! 2. Config file (<home>/config.json)
//! 3. Built-in defaults
//!
//! Settings are a hierarchical JSON tree addressed by dot-separated keys
//! (`api.model`, `conversion.keep_temp_files`, ...). Defaults are deep-merged
//! under the loaded file so every known key always resolves.
//!
//! A pipeline run never reads the live config: it takes a [`RunOptions`]
//! snapshot at start and keeps it for its whole duration.

pub mod paths;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::domain::BundleKind;
use crate::persist;

/// Environment variable overriding `api.key`
pub const API_KEY_ENV: &str = "ENPDF2ZHMD_API_KEY";

/// Default extractor executable
pub const DEFAULT_EXTRACTOR_COMMAND: &str = "marker_single";

/// Default backend call timeout (10 minutes)
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Built-in default settings tree
pub fn default_values() -> Value {
    json!({
        "api": {
            "url": "https://api.tu-zi.com",
            "key": "",
            "model": "claude-3-7-sonnet-thinking",
            "timeout_secs": DEFAULT_TIMEOUT_SECS
        },
        "conversion": {
            "output_format": "archive",
            "keep_temp_files": false,
            "output_dir": null
        },
        "marker": {
            "command": DEFAULT_EXTRACTOR_COMMAND,
            "force_ocr": false,
            "extract_images": true
        }
    })
}

/// Persisted key-value configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backing file; `None` for in-memory configs
    path: Option<PathBuf>,

    /// Merged settings tree
    values: Value,
}

impl Default for Config {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Config {
    /// Defaults only, never persisted
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: default_values(),
        }
    }

    /// Load from the default location (<home>/config.json)
    pub fn load_default() -> Result<Self> {
        Self::load(&paths::config_file()?)
    }

    /// Load from `path`.
    ///
    /// A missing file is created with defaults. An unreadable or corrupt file
    /// is reported and replaced by defaults in memory (the file is left as-is
    /// until the next `set`).
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self {
            path: Some(path.to_path_buf()),
            values: default_values(),
        };

        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, writing defaults");
            config.save()?;
            return Ok(config);
        }

        match read_file(path) {
            Ok(value) => merge(&mut config.values, value),
            Err(e) => warn!(error = %e, "Falling back to default configuration"),
        }

        Ok(config)
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The whole settings tree
    pub fn values(&self) -> &Value {
        &self.values
    }

    /// Look up a dot-separated key
    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.values, |node, part| node.as_object()?.get(part))
    }

    /// String value, or `default` when absent or not a string
    pub fn get_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).and_then(Value::as_str).unwrap_or(default)
    }

    /// Boolean value, or `default` when absent or not a bool
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Unsigned value, or `default` when absent or not a number
    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    /// Set a dot-separated key, creating intermediate tables, and persist.
    ///
    /// For file-backed configs the file is re-read under the lock first, so
    /// keys written by other instances since `load` are kept.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            anyhow::bail!("Invalid config key: '{}'", key);
        }

        let Some(path) = self.path.clone() else {
            return insert_key(&mut self.values, &parts, value);
        };

        let _lock = persist::lock_exclusive(&path)?;
        if path.exists() {
            match read_file(&path) {
                Ok(current) => {
                    let mut values = default_values();
                    merge(&mut values, current);
                    self.values = values;
                }
                Err(e) => warn!(error = %e, "Overwriting unreadable config file"),
            }
        }

        insert_key(&mut self.values, &parts, value)?;
        persist::write_json_atomic(&path, &self.values)
    }

    /// Persist to the backing file (no-op for in-memory configs)
    pub fn save(&self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let _lock = persist::lock_exclusive(path)?;
        persist::write_json_atomic(path, &self.values)
    }

    /// Immutable snapshot of everything a pipeline run needs
    pub fn run_options(&self) -> RunOptions {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| self.get_str("api.key", "").to_string());

        let output_format = parse_output_format(self.get_str("conversion.output_format", "archive"))
            .unwrap_or_else(|| {
                warn!(
                    value = self.get_str("conversion.output_format", ""),
                    "Unknown output format, using archive"
                );
                BundleKind::Archive
            });

        let output_dir = self
            .get("conversion.output_dir")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        RunOptions {
            extractor: ExtractorOptions {
                command: self
                    .get_str("marker.command", DEFAULT_EXTRACTOR_COMMAND)
                    .to_string(),
                force_ocr: self.get_bool("marker.force_ocr", false),
                extract_images: self.get_bool("marker.extract_images", true),
            },
            backend: BackendSettings {
                url: self.get_str("api.url", "").trim_end_matches('/').to_string(),
                api_key,
                model: self.get_str("api.model", "").to_string(),
                timeout: Duration::from_secs(
                    self.get_u64("api.timeout_secs", DEFAULT_TIMEOUT_SECS),
                ),
            },
            output_format,
            keep_temp_files: self.get_bool("conversion.keep_temp_files", false),
            output_dir,
        }
    }
}

/// Parse an output format name; `zip` is accepted as a legacy alias
pub fn parse_output_format(s: &str) -> Option<BundleKind> {
    match s.trim().to_lowercase().as_str() {
        "archive" | "zip" => Some(BundleKind::Archive),
        "directory" | "dir" | "folder" => Some(BundleKind::Directory),
        _ => None,
    }
}

/// Extractor invocation flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorOptions {
    /// Executable name or path
    pub command: String,

    /// Pass `--force_ocr`
    pub force_ocr: bool,

    /// When false, pass `--disable_image_extraction`
    pub extract_images: bool,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            command: DEFAULT_EXTRACTOR_COMMAND.to_string(),
            force_ocr: false,
            extract_images: true,
        }
    }
}

/// Translation backend connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct BackendSettings {
    /// Base URL, without trailing slash
    pub url: String,

    /// Bearer credential
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// Total call timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSettings")
            .field("url", &self.url)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Configuration snapshot for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub extractor: ExtractorOptions,
    pub backend: BackendSettings,
    pub output_format: BundleKind,
    pub keep_temp_files: bool,

    /// Explicit bundle destination; defaults to the documents folder
    pub output_dir: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Config::in_memory().run_options()
    }
}

fn read_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn insert_key(values: &mut Value, parts: &[&str], value: Value) -> Result<()> {
    let (last, parents) = parts.split_last().context("Config key cannot be empty")?;

    let mut node = values;
    for part in parents {
        node = ensure_object(node)
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(node).insert(last.to_string(), value);
    Ok(())
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

/// Deep-merge `loaded` over `base`: tables merge recursively, leaves replace
fn merge(base: &mut Value, loaded: Value) {
    match (base, loaded) {
        (Value::Object(base_map), Value::Object(loaded_map)) => {
            for (key, value) in loaded_map {
                let both_tables =
                    value.is_object() && base_map.get(&key).map_or(false, Value::is_object);

                match base_map.get_mut(&key) {
                    Some(existing) if both_tables => merge(existing, value),
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, loaded) => *base = loaded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_resolve() {
        let config = Config::in_memory();

        assert_eq!(config.get_str("api.url", ""), "https://api.tu-zi.com");
        assert_eq!(config.get_str("conversion.output_format", ""), "archive");
        assert!(!config.get_bool("conversion.keep_temp_files", true));
        assert!(!config.get_bool("marker.force_ocr", true));
        assert!(config.get_bool("marker.extract_images", false));
        assert_eq!(config.get_u64("api.timeout_secs", 0), 600);
        assert!(config.get("api.nonexistent").is_none());
        assert!(config.get("api.url.deeper").is_none());
    }

    #[test]
    fn test_load_creates_file_with_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");

        let config = Config::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.values(), &default_values());
    }

    #[test]
    fn test_load_merges_partial_file_over_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"api": {"model": "gpt-4o"}, "ui": {"theme": "dark"}}"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.get_str("api.model", ""), "gpt-4o");
        // Sibling default survives the merge
        assert_eq!(config.get_str("api.url", ""), "https://api.tu-zi.com");
        // Unknown keys are kept
        assert_eq!(config.get_str("ui.theme", ""), "dark");
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.values(), &default_values());
    }

    #[test]
    fn test_set_persists_and_creates_tables() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");

        let mut config = Config::load(&path).unwrap();
        config.set("conversion.keep_temp_files", json!(true)).unwrap();
        config.set("extra.nested.flag", json!("on")).unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert!(reloaded.get_bool("conversion.keep_temp_files", false));
        assert_eq!(reloaded.get_str("extra.nested.flag", ""), "on");
    }

    #[test]
    fn test_set_keeps_keys_written_by_another_instance() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");

        let mut a = Config::load(&path).unwrap();
        let mut b = Config::load(&path).unwrap();
        a.set("api.model", json!("gpt-4o")).unwrap();
        b.set("conversion.keep_temp_files", json!(true)).unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.get_str("api.model", ""), "gpt-4o");
        assert!(reloaded.get_bool("conversion.keep_temp_files", false));
        // The later writer also sees the earlier one's key
        assert_eq!(b.get_str("api.model", ""), "gpt-4o");
    }

    #[test]
    fn test_set_rejects_empty_segments() {
        let mut config = Config::in_memory();
        assert!(config.set("api..key", json!("x")).is_err());
        assert!(config.set("", json!("x")).is_err());
    }

    #[test]
    fn test_run_options_snapshot() {
        let mut config = Config::in_memory();
        config.set("marker.force_ocr", json!(true)).unwrap();
        config.set("marker.extract_images", json!(false)).unwrap();
        config.set("conversion.output_format", json!("zip")).unwrap();
        config.set("conversion.output_dir", json!("/tmp/out")).unwrap();
        config.set("api.url", json!("https://example.com/")).unwrap();

        let opts = config.run_options();
        assert!(opts.extractor.force_ocr);
        assert!(!opts.extractor.extract_images);
        assert_eq!(opts.output_format, BundleKind::Archive);
        assert_eq!(opts.output_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(opts.backend.url, "https://example.com");
        assert_eq!(opts.backend.timeout, Duration::from_secs(600));

        // Snapshot is detached from later edits
        config.set("marker.force_ocr", json!(false)).unwrap();
        assert!(opts.extractor.force_ocr);
    }

    #[test]
    fn test_parse_output_format() {
        assert_eq!(parse_output_format("archive"), Some(BundleKind::Archive));
        assert_eq!(parse_output_format("ZIP"), Some(BundleKind::Archive));
        assert_eq!(parse_output_format("directory"), Some(BundleKind::Directory));
        assert_eq!(parse_output_format("tarball"), None);
    }

    #[test]
    fn test_backend_settings_debug_redacts_key() {
        let mut opts = RunOptions::default();
        opts.backend.api_key = "sk-secret".to_string();
        let rendered = format!("{:?}", opts.backend);
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
