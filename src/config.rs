//! Service configuration.
//!
//! Values come from built-in defaults, then an optional `files_manager.toml`
//! in the working directory, then `FILES_MANAGER_`-prefixed environment
//! variables (`FILES_MANAGER_PORT`, `FILES_MANAGER_FOLDER_PATH`, ...).
//! Each layer overrides the one before it. A value that fails to parse or
//! validate is an error; nothing falls back silently.

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_FILE: &str = "files_manager";
const ENV_PREFIX: &str = "FILES_MANAGER";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub host: String,
    pub port: u16,
    /// Root directory for uploaded blobs and their thumbnails.
    pub folder_path: String,
    /// Where `users.json` / `files.json` are kept. In-memory when unset.
    pub data_dir: Option<String>,
    pub session_ttl_secs: u64,
    /// Jobs processed at once by the worker.
    pub worker_concurrency: usize,
    /// Deliveries allowed per job before it is dead-lettered.
    pub job_max_attempts: u32,
    pub bcrypt_cost: u32,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            folder_path: "/tmp/files_manager".to_string(),
            data_dir: None,
            session_ttl_secs: 86_400,
            worker_concurrency: 4,
            job_max_attempts: 1,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `files_manager.toml` (optional) with
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with(env: Environment) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let settings = config::Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("folder_path", defaults.folder_path)?
            .set_default("session_ttl_secs", defaults.session_ttl_secs as i64)?
            .set_default("worker_concurrency", defaults.worker_concurrency as i64)?
            .set_default("job_max_attempts", i64::from(defaults.job_max_attempts))?
            .set_default("bcrypt_cost", i64::from(defaults.bcrypt_cost))?
            .set_default("log_level", defaults.log_level)?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(env.try_parsing(true))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_ttl_secs == 0 {
            return Err(ConfigError::Message(
                "session_ttl_secs must be greater than 0".into(),
            ));
        }

        if self.worker_concurrency == 0 {
            return Err(ConfigError::Message(
                "worker_concurrency must be greater than 0".into(),
            ));
        }

        if self.job_max_attempts == 0 {
            return Err(ConfigError::Message(
                "job_max_attempts must be greater than 0".into(),
            ));
        }

        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::Message(
                "bcrypt_cost must be between 4 and 31".into(),
            ));
        }

        if self.folder_path.trim().is_empty() {
            return Err(ConfigError::Message("folder_path cannot be empty".into()));
        }

        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .as_deref()
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
    }
}
