use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 6455;
pub const DEFAULT_GATEWAY_LABEL: &str = "ipfs";
/// Maximum upload size in bytes (500 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 500 * 1024 * 1024;

/// Everything the service needs to run
#[derive(Debug, Clone)]
pub struct Config {
    /// address for the HTTP and WebSocket server to listen on
    pub listen_addr: SocketAddr,
    /// directory holding uploaded files, temp uploads and the sqlite database
    pub store_path: PathBuf,
    /// hex pubkeys allowed to publish events and upload content
    pub posters: HashSet<String>,
    /// label between the cid and the host in content URLs,
    ///  i.e. `{cid}.{gateway_label}.{host}`
    pub gateway_label: String,
    pub max_upload_bytes: usize,

    // misc
    pub log_level: tracing::Level,
}

impl Config {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            store_path: store_path.into(),
            posters: HashSet::new(),
            gateway_label: DEFAULT_GATEWAY_LABEL.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            log_level: tracing::Level::INFO,
        }
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.store_path.join("augury.sqlite")
    }
}

/// On-disk configuration, every field optional. TOML, or JSON when the
/// file ends in `.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub port: Option<u16>,
    pub listen_addr: Option<SocketAddr>,
    #[serde(alias = "store_path")]
    pub store: Option<PathBuf>,
    pub posters: Vec<String>,
    pub gateway_label: Option<String>,
    #[serde(alias = "logLevel")]
    pub log_level: Option<String>,
    pub max_upload_bytes: Option<usize>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Ok(serde_json::from_str(&text)?)
        } else {
            Ok(toml::from_str(&text)?)
        }
    }

    /// Resolve into a [`Config`]. Relative store paths are taken from `cwd`.
    pub fn into_config(self, cwd: &Path) -> Result<Config, ConfigError> {
        let store = self.store.ok_or(ConfigError::MissingStore)?;
        let store = if store.is_absolute() {
            store
        } else {
            cwd.join(store)
        };

        let mut config = Config::new(store);
        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(port) = self.port {
            config.listen_addr.set_port(port);
        }
        for poster in self.posters {
            if !is_pubkey(&poster) {
                return Err(ConfigError::InvalidPoster(poster));
            }
            config.posters.insert(poster);
        }
        if let Some(label) = self.gateway_label {
            config.gateway_label = label;
        }
        if let Some(level) = self.log_level {
            config.log_level = tracing::Level::from_str(&level)
                .map_err(|_| ConfigError::InvalidLogLevel(level))?;
        }
        if let Some(max) = self.max_upload_bytes {
            config.max_upload_bytes = max;
        }
        Ok(config)
    }
}

fn is_pubkey(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("a store path must be given either in the configuration or as argument")]
    MissingStore,
    #[error("poster is not a hex public key: {0}")]
    InvalidPoster(String),
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
}
