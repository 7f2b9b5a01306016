//! Source configuration
//!
//! Handles:
//! - the flat key/value settings of one inventory source
//! - numeric and boolean parsing with fail-fast errors
//! - validation of credential pairing and mapping file
//! - typed credential / proxy / role settings handed to the connector

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const ACCESS_KEY: &str = "accessKey";
pub const SECRET_KEY: &str = "secretKey";
pub const SECRET_KEY_STORAGE_PATH: &str = "secretKeyStoragePath";
pub const ENDPOINT: &str = "endpoint";
pub const REGION: &str = "region";
pub const FILTER_PARAMS: &str = "filter";
pub const MAPPING_PARAMS: &str = "mappingParams";
pub const MAPPING_FILE: &str = "mappingFile";
pub const REFRESH_INTERVAL: &str = "refreshInterval";
pub const USE_DEFAULT_MAPPING: &str = "useDefaultMapping";
pub const RUNNING_ONLY: &str = "runningOnly";
pub const SYNCHRONOUS_LOAD: &str = "synchronousLoad";
pub const PAGE_RESULTS: &str = "pageResults";
pub const HTTP_PROXY_HOST: &str = "httpProxyHost";
pub const HTTP_PROXY_PORT: &str = "httpProxyPort";
pub const HTTP_PROXY_USER: &str = "httpProxyUser";
pub const HTTP_PROXY_PASS: &str = "httpProxyPass";
pub const ASSUME_ROLE_ARN: &str = "assumeRoleArn";
pub const EXTERNAL_ID: &str = "externalId";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("secretKey is required for use with accessKey")]
    MissingSecretKey,
    #[error("{key} value is not a valid number: {value}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("pageResults must be greater than zero")]
    InvalidPageSize,
    #[error("mapping file not found: {0}")]
    MappingFileNotFound(PathBuf),
    #[error("failed to read mapping file {path}: {source}")]
    MappingFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceConfig {
    pub access_key: Option<String>,
    #[serde(skip_serializing)] // Never serialize secrets
    pub secret_key: Option<String>,
    pub secret_key_storage_path: Option<String>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub filter: Option<String>,
    pub mapping_params: Option<String>,
    pub mapping_file: Option<PathBuf>,
    /// Seconds; negative means every call refreshes.
    pub refresh_interval: i64,
    pub use_default_mapping: bool,
    pub running_only: bool,
    pub synchronous_load: bool,
    pub page_results: u32,
    pub http_proxy_host: Option<String>,
    pub http_proxy_port: u16,
    pub http_proxy_user: Option<String>,
    #[serde(skip_serializing)]
    pub http_proxy_pass: Option<String>,
    pub assume_role_arn: Option<String>,
    pub external_id: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            access_key: None,
            secret_key: None,
            secret_key_storage_path: None,
            endpoint: None,
            region: None,
            filter: None,
            mapping_params: None,
            mapping_file: None,
            refresh_interval: 30,
            use_default_mapping: true,
            running_only: false,
            synchronous_load: false,
            page_results: 100,
            http_proxy_host: None,
            http_proxy_port: 80,
            http_proxy_user: None,
            http_proxy_pass: None,
            assume_role_arn: None,
            external_id: None,
        }
    }
}

impl SourceConfig {
    /// Builds a configuration from flat properties. Blank values count as unset.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            props
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let flag = |key: &str, default: bool| get(key).map_or(default, |v| v.eq_ignore_ascii_case("true"));

        let defaults = Self::default();
        let config = Self {
            access_key: get(ACCESS_KEY),
            secret_key: get(SECRET_KEY),
            secret_key_storage_path: get(SECRET_KEY_STORAGE_PATH),
            endpoint: get(ENDPOINT),
            region: get(REGION),
            filter: get(FILTER_PARAMS),
            mapping_params: get(MAPPING_PARAMS),
            mapping_file: get(MAPPING_FILE).map(PathBuf::from),
            refresh_interval: parse_number(REFRESH_INTERVAL, get(REFRESH_INTERVAL), defaults.refresh_interval)?,
            use_default_mapping: flag(USE_DEFAULT_MAPPING, defaults.use_default_mapping),
            running_only: flag(RUNNING_ONLY, defaults.running_only),
            synchronous_load: flag(SYNCHRONOUS_LOAD, defaults.synchronous_load),
            page_results: parse_number(PAGE_RESULTS, get(PAGE_RESULTS), defaults.page_results)?,
            http_proxy_host: get(HTTP_PROXY_HOST),
            http_proxy_port: parse_number(HTTP_PROXY_PORT, get(HTTP_PROXY_PORT), defaults.http_proxy_port)?,
            http_proxy_user: get(HTTP_PROXY_USER),
            http_proxy_pass: get(HTTP_PROXY_PASS),
            assume_role_arn: get(ASSUME_ROLE_ARN),
            external_id: get(EXTERNAL_ID),
        };
        debug!(endpoint = ?config.endpoint, refresh = config.refresh_interval, "parsed source properties");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_key.is_some() && self.secret_key.is_none() && self.secret_key_storage_path.is_none() {
            return Err(ConfigError::MissingSecretKey);
        }
        if self.page_results == 0 {
            return Err(ConfigError::InvalidPageSize);
        }
        if let Some(path) = &self.mapping_file {
            if !path.is_file() {
                return Err(ConfigError::MappingFileNotFound(path.clone()));
            }
        }
        Ok(())
    }

    /// `None` when the cache is always stale (negative interval).
    pub fn refresh_window(&self) -> Option<Duration> {
        u64::try_from(self.refresh_interval).ok().map(Duration::from_secs)
    }

    /// Background refresh is used unless loading is forced synchronous or the
    /// interval leaves no window to serve a stale set from.
    pub fn asynchronous_refresh(&self) -> bool {
        !self.synchronous_load && self.refresh_interval > 0
    }

    pub fn credentials(&self) -> Credentials {
        match (&self.access_key, &self.secret_key_storage_path, &self.secret_key) {
            (Some(access_key), Some(storage_path), _) => Credentials::KeyStorage {
                access_key: access_key.clone(),
                storage_path: storage_path.clone(),
            },
            (Some(access_key), None, Some(secret_key)) => Credentials::Static {
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
            },
            _ => Credentials::Ambient,
        }
    }

    pub fn proxy(&self) -> Option<ProxySettings> {
        self.http_proxy_host.as_ref().map(|host| ProxySettings {
            host: host.clone(),
            port: self.http_proxy_port,
            user: self.http_proxy_user.clone(),
            password: self.http_proxy_pass.clone(),
        })
    }

    pub fn role_assumption(&self) -> Option<RoleAssumption> {
        self.assume_role_arn.as_ref().map(|arn| RoleAssumption {
            role_arn: arn.clone(),
            external_id: self.external_id.clone(),
        })
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            credentials: self.credentials(),
            proxy: self.proxy(),
            role: self.role_assumption(),
            region: self.region.clone(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidNumber { key, value }),
    }
}

/// How the connector should authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Static { access_key: String, secret_key: String },
    /// Secret read from key storage at `storage_path`.
    KeyStorage { access_key: String, storage_path: String },
    /// Environment, profile or instance role.
    Ambient,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Static { access_key, .. } => f
                .debug_struct("Static")
                .field("access_key", access_key)
                .field("secret_key", &"***")
                .finish(),
            Credentials::KeyStorage { access_key, storage_path } => f
                .debug_struct("KeyStorage")
                .field("access_key", access_key)
                .field("storage_path", storage_path)
                .finish(),
            Credentials::Ambient => f.write_str("Ambient"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for ProxySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxySettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssumption {
    pub role_arn: String,
    pub external_id: Option<String>,
}

/// Everything a connector needs to open clients for a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub credentials: Credentials,
    pub proxy: Option<ProxySettings>,
    pub role: Option<RoleAssumption>,
    pub region: Option<String>,
}
