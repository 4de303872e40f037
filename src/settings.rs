//! Settings resolution and persistence.
//!
//! Handles:
//! - Backend resolution (URL, function name) from env, settings file, defaults
//! - API key storage (OS keychain via keyring crate + env var)
//! - Raster/transport tuning (JPEG quality, request timeout)
//!
//! Priority for every field: environment (after `.env.local`/`.env` are
//! loaded) → OS keychain (API key only) → settings file → built-in default.

use crate::raster::DEFAULT_JPEG_QUALITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const KEYRING_SERVICE: &str = "lyric-scan";
pub const KEYRING_USER: &str = "recognition-backend";

pub const ENV_BACKEND_URL: &str = "LYRIC_SCAN_BACKEND_URL";
pub const ENV_FUNCTION: &str = "LYRIC_SCAN_FUNCTION";
pub const ENV_API_KEY: &str = "LYRIC_SCAN_API_KEY";
pub const ENV_JPEG_QUALITY: &str = "LYRIC_SCAN_JPEG_QUALITY";
pub const ENV_TIMEOUT_SECS: &str = "LYRIC_SCAN_TIMEOUT_SECS";

pub const DEFAULT_FUNCTION: &str = "ocr-image";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("no recognition backend URL configured (set LYRIC_SCAN_BACKEND_URL or run `settings set backend_url <url>`)")]
    MissingBackendUrl,
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
    #[error("unknown settings field: {0}")]
    UnknownField(String),
    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("failed to write settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// What is persisted on disk. Every field is optional; missing ones fall
/// through to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jpeg_quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl SettingsFile {
    /// Set one field from its string form, as typed on the command line.
    pub fn set_field(&mut self, field: &str, value: &str) -> Result<(), SettingsError> {
        let invalid = || SettingsError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        };
        match field {
            "backend_url" => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    return Err(invalid());
                }
                self.backend_url = Some(value.trim_end_matches('/').to_string());
            }
            "function" => {
                if value.is_empty() || value.contains('/') {
                    return Err(invalid());
                }
                self.function = Some(value.to_string());
            }
            "jpeg_quality" => {
                let q: u8 = value.parse().map_err(|_| invalid())?;
                if !(1..=100).contains(&q) {
                    return Err(invalid());
                }
                self.jpeg_quality = Some(q);
            }
            "timeout_secs" => {
                let t: u64 = value.parse().map_err(|_| invalid())?;
                if t == 0 {
                    return Err(invalid());
                }
                self.timeout_secs = Some(t);
            }
            other => return Err(SettingsError::UnknownField(other.to_string())),
        }
        Ok(())
    }
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backend_url: Option<String>,
    pub function: String,
    pub api_key: Option<String>,
    pub jpeg_quality: u8,
    pub timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: None,
            function: DEFAULT_FUNCTION.to_string(),
            api_key: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Merge the sources. `lookup` reads a variable; `keychain_key` is the
    /// stored API key, if any.
    pub fn from_sources(
        lookup: impl Fn(&str) -> Option<String>,
        keychain_key: Option<String>,
        file: &SettingsFile,
    ) -> Self {
        let env = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Settings::default();

        let backend_url = env(ENV_BACKEND_URL)
            .or_else(|| file.backend_url.clone())
            .map(|u| u.trim_end_matches('/').to_string());
        let function = env(ENV_FUNCTION)
            .or_else(|| file.function.clone())
            .unwrap_or(defaults.function);
        let api_key = env(ENV_API_KEY).or(keychain_key);

        // An out-of-range value falls through to the next source.
        let valid_quality = |q: &u8| (1..=100).contains(q);
        let jpeg_quality = env(ENV_JPEG_QUALITY)
            .and_then(|q| parse_logged::<u8>(ENV_JPEG_QUALITY, &q))
            .filter(valid_quality)
            .or(file.jpeg_quality.filter(valid_quality))
            .unwrap_or(defaults.jpeg_quality);
        let timeout = env(ENV_TIMEOUT_SECS)
            .and_then(|t| parse_logged::<u64>(ENV_TIMEOUT_SECS, &t))
            .filter(|t| *t > 0)
            .or(file.timeout_secs.filter(|t| *t > 0))
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        Self {
            backend_url,
            function,
            api_key,
            jpeg_quality,
            timeout,
        }
    }

    /// `{backend_url}/functions/v1/{function}`.
    pub fn function_endpoint(&self) -> Result<String, SettingsError> {
        let base = self
            .backend_url
            .as_deref()
            .ok_or(SettingsError::MissingBackendUrl)?;
        Ok(format!("{}/functions/v1/{}", base, self.function))
    }
}

fn parse_logged<T: std::str::FromStr>(name: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("[SETTINGS] Ignoring unparseable {}={}", name, raw);
            None
        }
    }
}

// ── Disk ───────────────────────────────────────────────────────────

/// Directory where settings are stored.
fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lyric-scan")
}

/// Full path to the settings file.
pub fn settings_path() -> PathBuf {
    config_dir().join(SETTINGS_FILE)
}

/// Load the settings file. Missing or invalid files yield defaults.
pub fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            log::warn!("[SETTINGS] Ignoring invalid {}: {}", path.display(), e);
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}

/// Persist the settings file, creating its directory if needed.
pub fn save_settings_file(path: &Path, file: &SettingsFile) -> Result<(), SettingsError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(file)?;
    std::fs::write(path, json)?;
    log::info!("[SETTINGS] Saved {}", path.display());
    Ok(())
}

// ── Keychain ───────────────────────────────────────────────────────

/// Read the API key from the OS keychain, if one is stored.
pub fn keychain_api_key() -> Option<String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER).ok()?;
    match entry.get_password() {
        Ok(key) if !key.is_empty() => {
            log::info!("[SETTINGS] Loaded API key from OS keychain");
            Some(key)
        }
        Ok(_) | Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            log::warn!("[SETTINGS] Keychain lookup failed: {}", e);
            None
        }
    }
}

/// Save the API key to the OS keychain.
pub fn save_api_key(api_key: &str) -> Result<(), SettingsError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    entry.set_password(api_key)?;
    log::info!("[SETTINGS] API key saved to OS keychain");
    Ok(())
}

/// Resolve settings from the process environment, keychain and the
/// default settings file.
pub fn resolve_settings() -> Settings {
    let file = load_settings_file(&settings_path());
    let env_key_set = std::env::var(ENV_API_KEY)
        .map(|k| !k.is_empty())
        .unwrap_or(false);
    let keychain = if env_key_set {
        None
    } else {
        keychain_api_key()
    };
    Settings::from_sources(|name| std::env::var(name).ok(), keychain, &file)
}
