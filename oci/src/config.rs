//! Provider configuration
//!
//! Each setting is taken from the provider block first, then from its
//! environment variable, then from a profile in the OCI CLI config file
//! (`~/.oci/config` or `OCI_CONFIG_FILE`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tfplug::types::{AttributePath, DynamicValue};
use thiserror::Error;
use tracing::debug;

use crate::api::{ApiError, AuthError, Client, ClientConfig, RequestSigner, RetryConfig};

pub const ENV_TENANCY_OCID: &str = "OCI_TENANCY_OCID";
pub const ENV_USER_OCID: &str = "OCI_USER_OCID";
pub const ENV_FINGERPRINT: &str = "OCI_FINGERPRINT";
pub const ENV_PRIVATE_KEY: &str = "OCI_PRIVATE_KEY";
pub const ENV_PRIVATE_KEY_PATH: &str = "OCI_PRIVATE_KEY_PATH";
pub const ENV_REGION: &str = "OCI_REGION";
pub const ENV_CONFIG_FILE: &str = "OCI_CONFIG_FILE";
pub const ENV_CONFIG_FILE_PROFILE: &str = "OCI_CONFIG_FILE_PROFILE";
pub const ENV_ENDPOINT_OVERRIDE: &str = "OCI_ENDPOINT_OVERRIDE";

const DEFAULT_PROFILE: &str = "DEFAULT";
const DEFAULT_RETRY_DURATION_SECONDS: u64 = 600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{attribute} is required (set it in the provider block, {env}, or the OCI config file)")]
    Missing {
        attribute: &'static str,
        env: &'static str,
    },

    #[error("either private_key or private_key_path is required (or OCI_PRIVATE_KEY, OCI_PRIVATE_KEY_PATH, or key_file in the OCI config file)")]
    MissingKey,

    #[error("failed to read OCI config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("profile [{profile}] not found in {path}")]
    ProfileNotFound { profile: String, path: PathBuf },

    #[error("failed to read private key {path}: {source}")]
    KeyFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("failed to build API client: {0}")]
    Client(#[from] ApiError),
}

/// Values as written in the provider block; `None` when unset.
#[derive(Debug, Clone, Default)]
pub struct RawProviderConfig {
    pub tenancy_ocid: Option<String>,
    pub user_ocid: Option<String>,
    pub fingerprint: Option<String>,
    pub private_key: Option<String>,
    pub private_key_path: Option<String>,
    pub region: Option<String>,
    pub config_file_profile: Option<String>,
    pub retry_duration_seconds: Option<u64>,
    pub disable_auto_retries: Option<bool>,
}

impl RawProviderConfig {
    pub fn from_config(config: &DynamicValue) -> Self {
        let string = |name: &str| {
            config
                .get_string(&AttributePath::new(name))
                .ok()
                .filter(|s| !s.is_empty())
        };
        Self {
            tenancy_ocid: string("tenancy_ocid"),
            user_ocid: string("user_ocid"),
            fingerprint: string("fingerprint"),
            private_key: string("private_key"),
            private_key_path: string("private_key_path"),
            region: string("region"),
            config_file_profile: string("config_file_profile"),
            retry_duration_seconds: config
                .get_number(&AttributePath::new("retry_duration_seconds"))
                .ok()
                .map(|n| n.max(0.0) as u64),
            disable_auto_retries: config
                .get_bool(&AttributePath::new("disable_auto_retries"))
                .ok(),
        }
    }
}

/// Fully resolved settings, ready to build a [`Client`].
#[derive(Clone)]
pub struct ProviderConfig {
    pub tenancy_ocid: String,
    pub user_ocid: String,
    pub fingerprint: String,
    pub private_key_pem: String,
    pub region: String,
    pub endpoint_override: Option<String>,
    pub retry_duration: Duration,
    pub disable_auto_retries: bool,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("tenancy_ocid", &self.tenancy_ocid)
            .field("user_ocid", &self.user_ocid)
            .field("fingerprint", &self.fingerprint)
            .field("region", &self.region)
            .field("endpoint_override", &self.endpoint_override)
            .field("retry_duration", &self.retry_duration)
            .field("disable_auto_retries", &self.disable_auto_retries)
            .finish_non_exhaustive()
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

/// Parse the sections of an OCI CLI config file. Keys before the first
/// section header are ignored.
fn parse_config_file(contents: &str) -> HashMap<String, HashMap<String, String>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current: Option<String> = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        if let (Some(section), Some((key, value))) = (&current, line.split_once('=')) {
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    sections
}

fn load_profile(
    path: &Path,
    profile: &str,
    explicit: bool,
) -> Result<HashMap<String, String>, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
            debug!(path = %path.display(), "no OCI config file");
            return Ok(HashMap::new());
        }
        Err(source) => {
            return Err(ConfigError::ConfigFile {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut sections = parse_config_file(&contents);
    match sections.remove(profile) {
        Some(values) => {
            debug!(path = %path.display(), profile, "using OCI config file profile");
            Ok(values)
        }
        None if explicit => Err(ConfigError::ProfileNotFound {
            profile: profile.to_string(),
            path: path.to_path_buf(),
        }),
        None => Ok(HashMap::new()),
    }
}

fn config_file_path() -> PathBuf {
    match env(ENV_CONFIG_FILE) {
        Some(path) => expand_home(&path),
        None => dirs::home_dir()
            .unwrap_or_default()
            .join(".oci")
            .join("config"),
    }
}

impl ProviderConfig {
    pub fn resolve(raw: RawProviderConfig) -> Result<Self, ConfigError> {
        let profile_name = raw
            .config_file_profile
            .clone()
            .or_else(|| env(ENV_CONFIG_FILE_PROFILE));
        let explicit = profile_name.is_some();
        let profile = load_profile(
            &config_file_path(),
            profile_name.as_deref().unwrap_or(DEFAULT_PROFILE),
            explicit,
        )?;

        let pick = |value: &Option<String>,
                    env_name: &'static str,
                    profile_key: &str,
                    attribute: &'static str|
         -> Result<String, ConfigError> {
            value
                .clone()
                .or_else(|| env(env_name))
                .or_else(|| profile.get(profile_key).cloned())
                .ok_or(ConfigError::Missing {
                    attribute,
                    env: env_name,
                })
        };

        let tenancy_ocid = pick(&raw.tenancy_ocid, ENV_TENANCY_OCID, "tenancy", "tenancy_ocid")?;
        let user_ocid = pick(&raw.user_ocid, ENV_USER_OCID, "user", "user_ocid")?;
        let fingerprint = pick(&raw.fingerprint, ENV_FINGERPRINT, "fingerprint", "fingerprint")?;
        let region = pick(&raw.region, ENV_REGION, "region", "region")?;

        let private_key_pem = match raw.private_key.clone().or_else(|| env(ENV_PRIVATE_KEY)) {
            Some(pem) => pem,
            None => {
                let path = raw
                    .private_key_path
                    .clone()
                    .or_else(|| env(ENV_PRIVATE_KEY_PATH))
                    .or_else(|| profile.get("key_file").cloned())
                    .ok_or(ConfigError::MissingKey)?;
                let path = expand_home(&path);
                std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::KeyFile { path, source })?
            }
        };

        Ok(Self {
            tenancy_ocid,
            user_ocid,
            fingerprint,
            private_key_pem,
            region,
            endpoint_override: env(ENV_ENDPOINT_OVERRIDE),
            retry_duration: Duration::from_secs(
                raw.retry_duration_seconds
                    .unwrap_or(DEFAULT_RETRY_DURATION_SECONDS),
            ),
            disable_auto_retries: raw.disable_auto_retries.unwrap_or(false),
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            region: self.region.clone(),
            endpoint_override: self.endpoint_override.clone(),
            retry: RetryConfig {
                enabled: !self.disable_auto_retries,
                retry_duration: self.retry_duration,
                ..RetryConfig::default()
            },
        }
    }

    pub fn build_client(&self) -> Result<Client, ConfigError> {
        let signer = RequestSigner::new(
            &self.tenancy_ocid,
            &self.user_ocid,
            &self.fingerprint,
            &self.private_key_pem,
        )?;
        Ok(Client::new(signer, self.client_config())?)
    }
}
