//! Configuration file management for rcm.
//!
//! Provides a TOML-based config file at `~/.config/rcm/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default. Secrets
//! (API keys) are read from the environment only and never written out.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use rcm_core::config::{DEFAULT_MODEL_ID, DEFAULT_REQUEST_TIMEOUT_MS};
use rcm_core::{ExecutionMode, HarnessConfig};
use rcm_db::config::{DATABASE_URL_ENV, DbConfig};

pub const MODE_ENV: &str = "RCM_MODE";
/// Boolean switch kept for deployments that predate `RCM_MODE`.
pub const LEGACY_DEVELOPMENT_ENV: &str = "DEVELOPMENT_MODE";
pub const RECORDER_ENV: &str = "RCM_RECORDER";
pub const INFERENCE_ENDPOINT_ENV: &str = "RCM_INFERENCE_ENDPOINT";
pub const MODEL_ID_ENV: &str = "RCM_MODEL_ID";
pub const REQUEST_TIMEOUT_ENV: &str = "RCM_REQUEST_TIMEOUT_MS";
pub const INFERENCE_API_KEY_ENV: &str = "RCM_INFERENCE_API_KEY";
pub const CLEARINGHOUSE_URL_ENV: &str = "RCM_CLEARINGHOUSE_URL";
pub const CLEARINGHOUSE_KEY_ENV: &str = "RCM_CLEARINGHOUSE_KEY";

pub const DEFAULT_CLEARINGHOUSE_URL: &str = "https://api.claim.md";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub inference: InferenceSection,
    #[serde(default)]
    pub clearinghouse: ClearinghouseSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RuntimeSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ExecutionMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorder: Option<RecorderKind>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InferenceSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ClearinghouseSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

/// Where run lifecycle events go. Chosen independently of the execution
/// mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderKind {
    #[default]
    Postgres,
    Log,
}

impl fmt::Display for RecorderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Postgres => "postgres",
            Self::Log => "log",
        })
    }
}

impl FromStr for RecorderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "db" => Ok(Self::Postgres),
            "log" => Ok(Self::Log),
            other => bail!("invalid recorder {other:?} (expected \"postgres\" or \"log\")"),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the rcm config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/rcm` or `~/.config/rcm`,
/// also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("rcm");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("rcm")
}

/// Return the path to the rcm config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values given on the command line. `None` defers to the rest of the
/// chain.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub database_url: Option<String>,
    pub mode: Option<ExecutionMode>,
    pub recorder: Option<RecorderKind>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct RcmConfig {
    pub db_config: DbConfig,
    pub harness: HarnessConfig,
    pub recorder: RecorderKind,
    pub inference_endpoint: Option<String>,
    pub inference_api_key: Option<String>,
    pub clearinghouse_url: String,
    pub clearinghouse_key: Option<String>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Mode from `RCM_MODE`, falling back to the legacy `DEVELOPMENT_MODE`
/// boolean.
fn mode_from_env() -> Result<Option<ExecutionMode>> {
    if let Some(raw) = env_var(MODE_ENV) {
        let mode = raw
            .parse::<ExecutionMode>()
            .with_context(|| format!("{MODE_ENV} is not a valid mode"))?;
        return Ok(Some(mode));
    }
    Ok(env_var(LEGACY_DEVELOPMENT_ENV).map(|raw| {
        if raw.trim().eq_ignore_ascii_case("true") {
            ExecutionMode::Development
        } else {
            ExecutionMode::Production
        }
    }))
}

impl RcmConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let file = load_config().ok().unwrap_or_default();
        Self::resolve_with(cli, file)
    }

    fn resolve_with(cli: &CliOverrides, file: ConfigFile) -> Result<Self> {
        let db_url = cli
            .database_url
            .clone()
            .or_else(|| env_var(DATABASE_URL_ENV))
            .or_else(|| Some(file.database.url).filter(|u| !u.is_empty()))
            .unwrap_or_else(|| DbConfig::DEFAULT_URL.to_string());

        let mode = match cli.mode {
            Some(mode) => mode,
            None => mode_from_env()?
                .or(file.runtime.mode)
                .unwrap_or_default(),
        };

        let recorder = match cli.recorder {
            Some(recorder) => recorder,
            None => match env_var(RECORDER_ENV) {
                Some(raw) => raw
                    .parse::<RecorderKind>()
                    .with_context(|| format!("{RECORDER_ENV} is invalid"))?,
                None => file.runtime.recorder.unwrap_or_default(),
            },
        };

        let model_id = env_var(MODEL_ID_ENV)
            .or(file.inference.model_id)
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());

        let request_timeout_ms = match env_var(REQUEST_TIMEOUT_ENV) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{REQUEST_TIMEOUT_ENV} must be a number of milliseconds"))?,
            None => file
                .inference
                .request_timeout_ms
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        };

        let harness = HarnessConfig::new(mode, model_id, request_timeout_ms)
            .context("invalid harness configuration")?;

        Ok(Self {
            db_config: DbConfig::new(db_url),
            harness,
            recorder,
            inference_endpoint: env_var(INFERENCE_ENDPOINT_ENV).or(file.inference.endpoint),
            inference_api_key: env_var(INFERENCE_API_KEY_ENV),
            clearinghouse_url: env_var(CLEARINGHOUSE_URL_ENV)
                .or(file.clearinghouse.api_url)
                .unwrap_or_else(|| DEFAULT_CLEARINGHOUSE_URL.to_string()),
            clearinghouse_key: env_var(CLEARINGHOUSE_KEY_ENV),
        })
    }

    pub fn mode(&self) -> ExecutionMode {
        self.harness.mode()
    }

    /// Whether any configured component needs a database connection.
    pub fn needs_database(&self) -> bool {
        self.recorder == RecorderKind::Postgres || self.mode() == ExecutionMode::Production
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ENV: [&str; 10] = [
        DATABASE_URL_ENV,
        MODE_ENV,
        LEGACY_DEVELOPMENT_ENV,
        RECORDER_ENV,
        INFERENCE_ENDPOINT_ENV,
        MODEL_ID_ENV,
        REQUEST_TIMEOUT_ENV,
        INFERENCE_API_KEY_ENV,
        CLEARINGHOUSE_URL_ENV,
        CLEARINGHOUSE_KEY_ENV,
    ];

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        let guard = crate::test_util::lock_env();
        for name in ALL_ENV {
            unsafe { std::env::remove_var(name) };
        }
        guard
    }

    fn file_config() -> ConfigFile {
        toml::from_str(
            r#"
[database]
url = "postgresql://file:5432/filedb"

[runtime]
mode = "development"
recorder = "log"

[inference]
endpoint = "https://inference.internal"
model_id = "file-model"
request_timeout_ms = 5000

[clearinghouse]
api_url = "https://clearinghouse.internal"
"#,
        )
        .unwrap()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let _lock = lock_env();

        let config = RcmConfig::resolve_with(&CliOverrides::default(), ConfigFile::default()).unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(config.mode(), ExecutionMode::Production);
        assert_eq!(config.recorder, RecorderKind::Postgres);
        assert_eq!(config.harness.inference_model_id(), DEFAULT_MODEL_ID);
        assert_eq!(config.harness.request_timeout_ms(), DEFAULT_REQUEST_TIMEOUT_MS);
        assert_eq!(config.clearinghouse_url, DEFAULT_CLEARINGHOUSE_URL);
        assert!(config.inference_endpoint.is_none());
    }

    #[test]
    fn config_file_values_are_used() {
        let _lock = lock_env();

        let config = RcmConfig::resolve_with(&CliOverrides::default(), file_config()).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://file:5432/filedb");
        assert_eq!(config.mode(), ExecutionMode::Development);
        assert_eq!(config.recorder, RecorderKind::Log);
        assert_eq!(config.harness.inference_model_id(), "file-model");
        assert_eq!(config.harness.request_timeout_ms(), 5000);
        assert_eq!(config.inference_endpoint.as_deref(), Some("https://inference.internal"));
        assert_eq!(config.clearinghouse_url, "https://clearinghouse.internal");
        assert!(!config.needs_database());
    }

    #[test]
    fn env_overrides_config_file() {
        let _lock = lock_env();
        unsafe { std::env::set_var(DATABASE_URL_ENV, "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var(MODE_ENV, "production") };
        unsafe { std::env::set_var(RECORDER_ENV, "postgres") };
        unsafe { std::env::set_var(REQUEST_TIMEOUT_ENV, "750") };
        unsafe { std::env::set_var(INFERENCE_API_KEY_ENV, "secret") };

        let config = RcmConfig::resolve_with(&CliOverrides::default(), file_config()).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        assert_eq!(config.mode(), ExecutionMode::Production);
        assert_eq!(config.recorder, RecorderKind::Postgres);
        assert_eq!(config.harness.request_timeout_ms(), 750);
        assert_eq!(config.inference_api_key.as_deref(), Some("secret"));

        for name in ALL_ENV {
            unsafe { std::env::remove_var(name) };
        }
    }

    #[test]
    fn cli_flags_override_everything() {
        let _lock = lock_env();
        unsafe { std::env::set_var(DATABASE_URL_ENV, "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var(MODE_ENV, "production") };

        let cli = CliOverrides {
            database_url: Some("postgresql://cli:5432/clidb".into()),
            mode: Some(ExecutionMode::Development),
            recorder: Some(RecorderKind::Log),
        };
        let config = RcmConfig::resolve_with(&cli, file_config()).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");
        assert_eq!(config.mode(), ExecutionMode::Development);
        assert_eq!(config.recorder, RecorderKind::Log);

        for name in ALL_ENV {
            unsafe { std::env::remove_var(name) };
        }
    }

    #[test]
    fn legacy_development_flag_is_honoured() {
        let _lock = lock_env();
        unsafe { std::env::set_var(LEGACY_DEVELOPMENT_ENV, "true") };

        let config = RcmConfig::resolve_with(&CliOverrides::default(), ConfigFile::default()).unwrap();
        assert_eq!(config.mode(), ExecutionMode::Development);
        // Development with the durable recorder still needs the database.
        assert!(config.needs_database());

        unsafe { std::env::remove_var(LEGACY_DEVELOPMENT_ENV) };
    }

    #[test]
    fn invalid_values_are_errors() {
        let _lock = lock_env();

        unsafe { std::env::set_var(MODE_ENV, "staging") };
        let err = RcmConfig::resolve_with(&CliOverrides::default(), ConfigFile::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("RCM_MODE"), "{err:#}");
        unsafe { std::env::remove_var(MODE_ENV) };

        unsafe { std::env::set_var(REQUEST_TIMEOUT_ENV, "0") };
        let err = RcmConfig::resolve_with(&CliOverrides::default(), ConfigFile::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("greater than zero"), "{err:#}");
        unsafe { std::env::remove_var(REQUEST_TIMEOUT_ENV) };
    }

    #[test]
    fn recorder_kind_parses() {
        assert_eq!("postgres".parse::<RecorderKind>().unwrap(), RecorderKind::Postgres);
        assert_eq!("LOG".parse::<RecorderKind>().unwrap(), RecorderKind::Log);
        assert!("kafka".parse::<RecorderKind>().is_err());
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let _lock = lock_env();
        let tmp = tempfile::TempDir::new().unwrap();
        let orig_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe { std::env::set_var("XDG_CONFIG_HOME", tmp.path()) };

        let original = ConfigFile {
            database: DatabaseSection {
                url: "postgresql://testhost:5432/testdb".to_string(),
            },
            runtime: RuntimeSection {
                mode: Some(ExecutionMode::Development),
                recorder: None,
            },
            ..ConfigFile::default()
        };
        let saved = save_config(&original);
        let loaded = load_config();
        let path = config_path();

        match orig_xdg {
            Some(x) => unsafe { std::env::set_var("XDG_CONFIG_HOME", x) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }

        saved.unwrap();
        let loaded = loaded.unwrap();
        assert_eq!(loaded.database.url, original.database.url);
        assert_eq!(loaded.runtime.mode, Some(ExecutionMode::Development));
        assert!(loaded.runtime.recorder.is_none());
        assert!(path.starts_with(tmp.path()));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = std::fs::metadata(&path).unwrap();
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("rcm/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
