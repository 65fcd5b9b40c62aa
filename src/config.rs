use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
    #[error("{0} must be greater than 0")]
    Zero(&'static str),
}

/// Server configuration loaded from `STAYBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Requests served concurrently before new ones queue.
    pub max_in_flight: usize,
    pub request_timeout_secs: u64,
    /// WAL appends since the last compaction that trigger a new one.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub apartments_url: Option<String>,
    pub users_url: Option<String>,
    /// JSON seed for the in-memory directory.
    pub directory_seed: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            max_in_flight: 256,
            request_timeout_secs: 30,
            compact_threshold: 1000,
            metrics_port: None,
            apartments_url: None,
            users_url: None,
            directory_seed: None,
        }
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn non_zero<T: PartialEq + Default>(key: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::Zero(key));
    }
    Ok(value)
}

impl ServerConfig {
    /// | Env var                          | Default     |
    /// |----------------------------------|-------------|
    /// | `STAYBOOK_BIND`                  | `0.0.0.0`   |
    /// | `STAYBOOK_PORT`                  | `8080`      |
    /// | `STAYBOOK_DATA_DIR`              | `./data`    |
    /// | `STAYBOOK_MAX_IN_FLIGHT`         | `256`       |
    /// | `STAYBOOK_REQUEST_TIMEOUT_SECS`  | `30`        |
    /// | `STAYBOOK_COMPACT_THRESHOLD`     | `1000`      |
    /// | `STAYBOOK_METRICS_PORT`          | unset       |
    /// | `STAYBOOK_APARTMENTS_URL`        | unset       |
    /// | `STAYBOOK_USERS_URL`             | unset       |
    /// | `STAYBOOK_DIRECTORY_SEED`        | unset       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            bind: parsed(&lookup, "STAYBOOK_BIND")?.unwrap_or(defaults.bind),
            port: parsed(&lookup, "STAYBOOK_PORT")?.unwrap_or(defaults.port),
            data_dir: non_empty("STAYBOOK_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            max_in_flight: non_zero(
                "STAYBOOK_MAX_IN_FLIGHT",
                parsed(&lookup, "STAYBOOK_MAX_IN_FLIGHT")?.unwrap_or(defaults.max_in_flight),
            )?,
            request_timeout_secs: non_zero(
                "STAYBOOK_REQUEST_TIMEOUT_SECS",
                parsed(&lookup, "STAYBOOK_REQUEST_TIMEOUT_SECS")?.unwrap_or(defaults.request_timeout_secs),
            )?,
            compact_threshold: non_zero(
                "STAYBOOK_COMPACT_THRESHOLD",
                parsed(&lookup, "STAYBOOK_COMPACT_THRESHOLD")?.unwrap_or(defaults.compact_threshold),
            )?,
            metrics_port: parsed(&lookup, "STAYBOOK_METRICS_PORT")?,
            apartments_url: non_empty("STAYBOOK_APARTMENTS_URL"),
            users_url: non_empty("STAYBOOK_USERS_URL"),
            directory_seed: non_empty("STAYBOOK_DIRECTORY_SEED").map(PathBuf::from),
        })
    }

    /// Both service URLs, when the remote directory is configured.
    pub fn remote_directory(&self) -> Option<(&str, &str)> {
        Some((self.apartments_url.as_deref()?, self.users_url.as_deref()?))
    }
}
