use chrono::Duration;
use oauth1_provider::{ProviderConfig, SignatureMethodKind};
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{name} is not a valid socket address: {value:?}")]
    InvalidAddress { name: &'static str, value: String },

    #[error("{name} must be a whole number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Process settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub provider: ProviderConfig,
    pub sweep_interval: std::time::Duration,
    pub seed_file: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_url = var("DATABASE_URL").unwrap_or_else(|| "sqlite:oauth.db".to_string());

        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_addr = bind_addr
            .parse::<SocketAddr>()
            .map_err(|_| SettingsError::InvalidAddress {
                name: "BIND_ADDR",
                value: bind_addr.clone(),
            })?;

        let host = var("OAUTH_HOST").unwrap_or_else(|| "http://localhost:3000".to_string());
        let host = Url::parse(&host).map_err(|source| SettingsError::InvalidUrl {
            name: "OAUTH_HOST",
            source,
        })?;

        let mut provider = ProviderConfig::new(host);

        if let Some(realm) = var("OAUTH_REALM") {
            provider = provider.with_realm(realm);
        }

        if let Some(methods) = var("OAUTH_SIGNATURE_METHODS") {
            let methods = split_list(&methods)
                .map(|name| name.parse::<SignatureMethodKind>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|message| SettingsError::Invalid {
                    name: "OAUTH_SIGNATURE_METHODS",
                    message,
                })?;
            if methods.is_empty() {
                return Err(SettingsError::Invalid {
                    name: "OAUTH_SIGNATURE_METHODS",
                    message: "at least one method must be enabled".to_string(),
                });
            }
            provider = provider.with_signature_methods(methods);
        }

        if let Some(hosts) = var("OAUTH_BLACKLISTED_HOSTNAMES") {
            provider = provider.with_callback_denylist(split_list(&hosts).map(String::from).collect());
        }

        if let Some(length) = number(&var, "OAUTH_MAX_URL_LENGTH")? {
            let length = usize::try_from(length).map_err(|_| SettingsError::InvalidNumber {
                name: "OAUTH_MAX_URL_LENGTH",
                value: length.to_string(),
            })?;
            provider = provider.with_max_url_length(length);
        }

        if let Some(value) = number(&var, "OAUTH_TIMESTAMP_THRESHOLD")? {
            provider =
                provider.with_timestamp_threshold(seconds("OAUTH_TIMESTAMP_THRESHOLD", value)?);
        }

        if let Some(value) = number(&var, "OAUTH_REQUEST_TOKEN_LIFETIME")? {
            provider = provider
                .with_request_token_lifetime(lifetime("OAUTH_REQUEST_TOKEN_LIFETIME", value)?);
        }

        if let Some(value) = number(&var, "OAUTH_ACCESS_TOKEN_LIFETIME")? {
            provider = provider
                .with_access_token_lifetime(lifetime("OAUTH_ACCESS_TOKEN_LIFETIME", value)?);
        }

        let sweep_interval = std::time::Duration::from_secs(
            number(&var, "OAUTH_SWEEP_INTERVAL")?.unwrap_or(300).max(1),
        );

        Ok(Self {
            database_url,
            bind_addr,
            provider,
            sweep_interval,
            seed_file: var("OAUTH_SEED_FILE").map(PathBuf::from),
        })
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn number(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<u64>, SettingsError> {
    var(name)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| SettingsError::InvalidNumber { name, value })
        })
        .transpose()
}

fn seconds(name: &'static str, value: u64) -> Result<Duration, SettingsError> {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| SettingsError::InvalidNumber {
            name,
            value: value.to_string(),
        })
}

/// Zero means tokens never expire.
fn lifetime(name: &'static str, value: u64) -> Result<Option<Duration>, SettingsError> {
    if value == 0 {
        return Ok(None);
    }
    seconds(name, value).map(Some)
}
