//! Runtime configuration: API endpoint, timeout, external links.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::event::ClientSettings;
use crate::REQUEST_TIMEOUT;

pub const PRODUCTION_API_BASE_URL: &str = "https://api.sala.pro/api";
pub const DEVELOPMENT_API_PORT: u16 = 5000;
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub const ENV_API_BASE_URL: &str = "SALA_API_BASE_URL";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "SALA_REQUEST_TIMEOUT_MS";
pub const ENV_PHONE_PATTERN: &str = "SALA_PHONE_PATTERN";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid timeout '{value}': {reason}")]
    InvalidTimeout { value: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalLink {
    Faq,
    Tutorial,
    Rules,
    Terms,
    Privacy,
}

impl ExternalLink {
    pub const ALL: [ExternalLink; 5] = [
        ExternalLink::Faq,
        ExternalLink::Tutorial,
        ExternalLink::Rules,
        ExternalLink::Terms,
        ExternalLink::Privacy,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ExternalLink::Faq => "FAQ",
            ExternalLink::Tutorial => "Tutoriel vidéo",
            ExternalLink::Rules => "Règles du livreur",
            ExternalLink::Terms => "Conditions générales",
            ExternalLink::Privacy => "Politique de confidentialité",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    pub faq: Url,
    pub tutorial: Url,
    pub rules: Url,
    pub terms: Url,
    pub privacy: Url,
}

impl Links {
    pub fn url(&self, link: ExternalLink) -> &Url {
        match link {
            ExternalLink::Faq => &self.faq,
            ExternalLink::Tutorial => &self.tutorial,
            ExternalLink::Rules => &self.rules,
            ExternalLink::Terms => &self.terms,
            ExternalLink::Privacy => &self.privacy,
        }
    }
}

impl Default for Links {
    fn default() -> Self {
        // Literals below are well-formed; `Url::parse` cannot fail on them.
        let parse = |s: &str| Url::parse(s).unwrap_or_else(|_| unreachable!("static link {s}"));
        Self {
            faq: parse("https://sala.pro/faq-livreur"),
            tutorial: parse("https://youtube.com/"),
            rules: parse("https://sala.pro/regles-livreur"),
            terms: parse("https://sala.pro/cgu"),
            privacy: parse("https://sala.pro/privacy-policy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_base_url: Url,
    pub request_timeout: Duration,
    pub phone_pattern: Option<String>,
    pub links: Links,
}

impl Config {
    pub fn production() -> Self {
        Self {
            api_base_url: Url::parse(PRODUCTION_API_BASE_URL)
                .unwrap_or_else(|_| unreachable!("production base URL is well-formed")),
            request_timeout: REQUEST_TIMEOUT,
            phone_pattern: None,
            links: Links::default(),
        }
    }

    /// Local API server, e.g. `development("192.168.1.20")`.
    pub fn development(host: &str) -> Result<Self, ConfigError> {
        let base = format!("http://{host}:{DEVELOPMENT_API_PORT}/api");
        Ok(Self {
            api_base_url: parse_base_url(&base)?,
            ..Self::production()
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.api_base_url = parse_base_url(url)?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() || timeout > MAX_REQUEST_TIMEOUT {
            return Err(ConfigError::InvalidTimeout {
                value: format!("{}ms", timeout.as_millis()),
                reason: format!("must be between 1ms and {}s", MAX_REQUEST_TIMEOUT.as_secs()),
            });
        }
        self.request_timeout = timeout;
        Ok(self)
    }

    /// Production defaults overridden by `SALA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::production();

        if let Some(url) = lookup(ENV_API_BASE_URL) {
            config = config.with_base_url(&url)?;
        }

        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            let ms: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidTimeout {
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            config = config.with_timeout(Duration::from_millis(ms))?;
        }

        config.phone_pattern = lookup(ENV_PHONE_PATTERN).filter(|p| !p.trim().is_empty());

        Ok(config)
    }

    /// The part of the configuration the core needs, sent with `Event::ClientConfigured`.
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            phone_pattern: self.phone_pattern.clone(),
            links: self.links.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::production()
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: "base URL cannot carry a query or fragment".to_string(),
        });
    }
    Ok(url)
}
