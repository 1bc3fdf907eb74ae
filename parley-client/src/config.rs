use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::error::Result;

/// Backend locations and local paths. Loaded from an optional TOML file; every field has a
/// default so an empty file (or none at all) is valid.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// REST base, e.g. `http://localhost:5000/api`.
    pub api_url: Url,
    /// Socket.IO origin, e.g. `http://localhost:5000`.
    pub socket_url: Url,
    pub media: MediaConfig,
    pub session_file: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaConfig {
    /// Unsigned upload endpoint of the media host.
    pub upload_url: Url,
    pub upload_preset: String,
}

const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_SOCKET_URL: &str = "http://localhost:5000";
const DEFAULT_UPLOAD_URL: &str = "https://api.cloudinary.com/v1_1/parley/auto/upload";

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("default api url is valid"),
            socket_url: Url::parse(DEFAULT_SOCKET_URL).expect("default socket url is valid"),
            media: MediaConfig::default(),
            session_file: default_session_file(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            upload_url: Url::parse(DEFAULT_UPLOAD_URL).expect("default upload url is valid"),
            upload_preset: "parley".to_owned(),
        }
    }
}

fn default_session_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parley")
        .join("session.json")
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reads `path` if given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                let config = Self::from_toml(&text)?;
                tracing::debug!(path = %path.display(), "loaded config");
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }
}
