//! Layered settings: built-in defaults, then an optional TOML file, then
//! `CB__SECTION__KEY` environment variables.

use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Placeholders shipped in sample `.env` files; treated as "not configured".
const PLACEHOLDER_URL: &str = "your_supabase_url_here";
const PLACEHOLDER_KEY: &str = "your_supabase_anon_key_here";

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub identity: IdentitySettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
    /// Directory of front-end assets served at `/`, if any.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

/// Where the local tier lives when no hosted store is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    /// Flat JSON file next to the server.
    Server,
    /// Device-local key/value storage.
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Auto,
    Remote,
    File,
    Kv,
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct StorageSettings {
    pub context: Context,
    pub backend: Backend,
    pub data_file: PathBuf,
    pub kv_url: String,
    pub max_posts: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoteSettings {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<SecretString>,
}

impl RemoteSettings {
    /// URL and key, when both are present and not sample placeholders.
    pub fn credentials(&self) -> Option<(&str, &SecretString)> {
        let url = self.url.as_deref().map(str::trim)?;
        let key = self.api_key.as_ref()?;
        let key_text = key.expose_secret().trim();
        if url.is_empty() || url == PLACEHOLDER_URL || key_text.is_empty() || key_text == PLACEHOLDER_KEY {
            return None;
        }
        Some((url, key))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct IdentitySettings {
    /// Salt for derived creator ids. A random one is used when unset, so
    /// derived ids then only stay stable for the life of the process.
    #[serde(default)]
    pub salt: Option<String>,
}

impl Settings {
    /// Reads `community-board.toml` (or the file named by `CB_CONFIG`) and
    /// the environment on top of the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var("CB_CONFIG").unwrap_or_else(|_| "community-board".into());
        Self::builder()?
            .add_source(File::with_name(&file).required(false))
            .add_source(Environment::with_prefix("CB").separator("__"))
            .build()?
            .try_deserialize()
    }

    #[cfg(test)]
    pub(crate) fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8000)?
            .set_default("server.api_prefix", "/api")?
            .set_default("storage.context", "server")?
            .set_default("storage.backend", "auto")?
            .set_default("storage.data_file", "data/posts.json")?
            .set_default("storage.kv_url", "sqlite://data/community.db")?
            .set_default("storage.max_posts", cb_core::DEFAULT_MAX_POSTS as u64)
    }
}
