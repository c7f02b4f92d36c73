use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials;
use crate::omdb;

pub const CONFIG_FILE: &str = "movielist.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] figment::Error),
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// HMAC key for session tokens.
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    /// Origins allowed to call the API from a browser. Empty allows any.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub omdb: OmdbSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OmdbSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_omdb_base_url")]
    pub base_url: String,
    /// Timeout for a single provider request.
    #[serde(default = "default_omdb_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_owned()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("movielist.db")
}

fn default_bcrypt_cost() -> u32 {
    credentials::DEFAULT_COST
}

fn default_omdb_base_url() -> String {
    omdb::DEFAULT_BASE_URL.to_owned()
}

fn default_omdb_timeout_secs() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bind: default_bind(),
            database_path: default_database_path(),
            jwt_secret: String::new(),
            bcrypt_cost: default_bcrypt_cost(),
            allowed_origins: Vec::new(),
            omdb: OmdbSettings::default(),
        }
    }
}

impl Default for OmdbSettings {
    fn default() -> Self {
        OmdbSettings {
            api_key: String::new(),
            base_url: default_omdb_base_url(),
            timeout_secs: default_omdb_timeout_secs(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let settings: Settings = figment().extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::Missing("jwt_secret"));
        }
        if self.omdb.api_key.is_empty() {
            return Err(ConfigError::Missing("omdb.api_key"));
        }
        Ok(())
    }
}

fn figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(CONFIG_FILE))
        .merge(env_provider())
}

/// `MOVIELIST_OMDB_API_KEY` maps to `omdb.api_key`; underscores elsewhere
/// belong to the key name.
fn env_provider() -> Env {
    Env::prefixed("MOVIELIST_").map(|key| {
        let key = key.as_str().to_ascii_lowercase();
        key.replacen("omdb_", "omdb.", 1).into()
    })
}
