//! Layered server configuration: built-in defaults, then the JSON config
//! file, then environment variables and CLI flags.

use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use lib_sheetcast::ingestors::SheetsConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Config file looked up when `--config-path` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "server_sheet.conf";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Polls a Google Sheet and streams value changes to WebSocket clients", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "SHEET_PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "SHEET_BIND_ADDRESS", help = "Address to bind the listener to.")]
    pub bind_address: Option<IpAddr>,

    #[clap(long, env = "SHEET_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "SHEET_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "SHEET_LOG_LEVEL", help = "Logging level or filter directive (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "SHEET_REFRESH_INTERVAL_SECONDS", help = "Seconds between refresh cycles.")]
    pub refresh_interval_seconds: Option<u64>,

    #[clap(long, env = "SHEET_SPREADSHEET_ID", help = "Identifier of the spreadsheet to poll.")]
    pub spreadsheet_id: Option<String>,

    #[clap(long, env = "SHEET_RANGE", help = "A1-notation range holding name/value rows.")]
    pub sheet_range: Option<String>,

    #[clap(long, env = "SHEET_API_BASE", help = "Root URL of the Sheets v4 API.")]
    pub sheets_api_base: Option<String>,

    #[clap(long, env = "SHEET_API_KEY", hide_env_values = true, help = "API key for the Sheets API.")]
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    #[clap(long, env = "SHEET_ACCESS_TOKEN", hide_env_values = true, help = "OAuth bearer token for the Sheets API.")]
    #[serde(skip_serializing)]
    pub access_token: Option<String>,

    #[clap(long, env = "SHEET_CREDENTIALS_PATH", help = "Service-account key file used to mint bearer tokens.")]
    pub credentials_path: Option<PathBuf>,

    #[clap(long, env = "SHEET_FETCH_TIMEOUT_SECONDS", help = "Timeout in seconds for one fetch request.")]
    pub fetch_timeout_seconds: Option<u64>,

    #[clap(long, env = "SHEET_FETCH_MAX_RETRIES", help = "Retries for transient fetch failures.")]
    pub fetch_max_retries: Option<u32>,

    #[clap(long, env = "SHEET_CHANNEL_CAPACITY", help = "Frames queued per client before new ones are dropped.")]
    pub channel_capacity: Option<usize>,

    #[clap(long, env = "TLS_CERT_PATH", help = "Path to the TLS certificate file.")]
    pub tls_cert_path: Option<PathBuf>,

    #[clap(long, env = "TLS_KEY_PATH", help = "Path to the TLS private key file.")]
    pub tls_key_path: Option<PathBuf>,
}

impl Config {
    pub fn defaults() -> Self {
        Self {
            port: Some(8080),
            bind_address: Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            refresh_interval_seconds: Some(30),
            sheet_range: Some(lib_sheetcast::ingestors::sheets_polling::DEFAULT_RANGE.to_string()),
            sheets_api_base: Some(lib_sheetcast::ingestors::sheets_polling::DEFAULT_API_BASE.to_string()),
            fetch_timeout_seconds: Some(10),
            fetch_max_retries: Some(3),
            channel_capacity: Some(32),
            ..Default::default()
        }
    }

    /// Values set in `other` win over values set in `self`.
    pub fn merge(self, other: Config) -> Self {
        Self {
            port: other.port.or(self.port),
            bind_address: other.bind_address.or(self.bind_address),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            refresh_interval_seconds: other.refresh_interval_seconds.or(self.refresh_interval_seconds),
            spreadsheet_id: other.spreadsheet_id.or(self.spreadsheet_id),
            sheet_range: other.sheet_range.or(self.sheet_range),
            sheets_api_base: other.sheets_api_base.or(self.sheets_api_base),
            api_key: other.api_key.or(self.api_key),
            access_token: other.access_token.or(self.access_token),
            credentials_path: other.credentials_path.or(self.credentials_path),
            fetch_timeout_seconds: other.fetch_timeout_seconds.or(self.fetch_timeout_seconds),
            fetch_max_retries: other.fetch_max_retries.or(self.fetch_max_retries),
            channel_capacity: other.channel_capacity.or(self.channel_capacity),
            tls_cert_path: other.tls_cert_path.or(self.tls_cert_path),
            tls_key_path: other.tls_key_path.or(self.tls_key_path),
        }
    }

    /// Turns the merged layers into concrete settings.
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let defaults = Config::defaults();

        let spreadsheet_id = self
            .spreadsheet_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigError::Missing("spreadsheet_id"))?;

        let refresh_interval_seconds = self
            .refresh_interval_seconds
            .or(defaults.refresh_interval_seconds)
            .unwrap_or(30);
        if refresh_interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "refresh_interval_seconds",
                reason: "must be at least 1".to_string(),
            });
        }

        let channel_capacity = self.channel_capacity.or(defaults.channel_capacity).unwrap_or(32);
        if channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "channel_capacity",
                reason: "must be at least 1".to_string(),
            });
        }

        let tls = match (self.tls_cert_path, self.tls_key_path) {
            (Some(cert), Some(key)) => Some(TlsPaths { cert, key }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    field: "tls_cert_path/tls_key_path",
                    reason: "both or neither must be set".to_string(),
                });
            }
        };

        let ip = self
            .bind_address
            .or(defaults.bind_address)
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let port = self.port.or(defaults.port).unwrap_or(8080);

        let mut sheets = SheetsConfig::new(spreadsheet_id);
        if let Some(range) = self.sheet_range {
            sheets.range = range;
        }
        if let Some(base) = self.sheets_api_base {
            sheets.api_base = base;
        }
        sheets.api_key = self.api_key;
        sheets.access_token = self.access_token;
        sheets.credentials_path = self.credentials_path;
        if let Some(secs) = self.fetch_timeout_seconds {
            sheets.timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(retries) = self.fetch_max_retries {
            sheets.max_retries = retries;
        }

        sheets.validate().map_err(|e| ConfigError::Invalid {
            field: "sheets",
            reason: e.to_string(),
        })?;

        Ok(Settings {
            addr: SocketAddr::new(ip, port),
            config_path: self.config_path,
            log_dir: self.log_dir.or(defaults.log_dir).unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: self.log_level.or(defaults.log_level).unwrap_or_else(|| "info".to_string()),
            refresh_interval: Duration::from_secs(refresh_interval_seconds),
            channel_capacity,
            sheets,
            tls,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Effective configuration after layering and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub addr: SocketAddr,
    pub config_path: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub refresh_interval: Duration,
    pub channel_capacity: usize,
    pub sheets: SheetsConfig,
    pub tls: Option<TlsPaths>,
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings
    Listen: {} ({})
    Config file: {}
    Refresh interval: {}s
    Spreadsheet: {} [{}]
    API base: {}
    API key: {}
    Access token: {}
    Service account: {}
    Channel capacity: {}
    Log dir: {}
    Log level: {}
",
            self.addr,
            if self.tls.is_some() { "wss" } else { "ws" },
            self.config_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.refresh_interval.as_secs(),
            self.sheets.spreadsheet_id,
            self.sheets.range,
            self.sheets.api_base,
            if self.sheets.api_key.is_some() { "set" } else { "unset" },
            if self.sheets.access_token.is_some() { "set" } else { "unset" },
            self.sheets
                .credentials_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.channel_capacity,
            self.log_dir.display(),
            self.log_level,
        )
    }
}

/// Loads settings from `cli` (already holding env and flag values) layered
/// over the config file and the defaults.
pub fn load_from(cli: Config) -> Result<Settings, ConfigError> {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();

    if config_file_path.exists() {
        let config_str = fs::read_to_string(&config_file_path).map_err(|source| ConfigError::Io {
            path: config_file_path.clone(),
            source,
        })?;
        let file_config: Config = serde_json::from_str(&config_str).map_err(|source| ConfigError::Parse {
            path: config_file_path.clone(),
            source,
        })?;
        current_config = current_config.merge(file_config);
        current_config.config_path = Some(config_file_path);
    }

    current_config.merge(cli).resolve()
}

/// Parses CLI flags and environment variables, then layers them over the
/// config file and the defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_from(Config::parse())
}
