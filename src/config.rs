//! Konfiguration
//!
//! Liest die Telnyx-Zugangsdaten aus der Umgebung. Eine optionale `.env`
//! Datei im Arbeitsverzeichnis wird vorher geladen.

use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

// ============================================================================
// DEFAULTS
// ============================================================================

pub const API_KEY_VAR: &str = "TELNYX_API_KEY";
pub const SIP_CONNECTION_ID_VAR: &str = "TELNYX_SIP_CONNECTION_ID";
pub const API_URL_VAR: &str = "TELNYX_API_URL";
pub const RTC_URL_VAR: &str = "TELNYX_RTC_URL";
pub const SIP_DOMAIN_VAR: &str = "TELNYX_SIP_DOMAIN";
pub const STUN_URL_VAR: &str = "TELNYX_STUN_URL";

pub const DEFAULT_API_URL: &str = "https://api.telnyx.com";
pub const DEFAULT_RTC_URL: &str = "wss://rtc.telnyx.com";
pub const DEFAULT_SIP_DOMAIN: &str = "sip.telnyx.com";
pub const DEFAULT_STUN_URL: &str = "stun:stun.telnyx.com:3478";

// ============================================================================
// CONFIG
// ============================================================================

/// Laufzeit-Konfiguration der App
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// API Key für die Telnyx REST API (Bearer Token)
    pub api_key: String,
    /// ID der SIP Connection, für die Credentials erzeugt werden
    pub sip_connection_id: String,
    /// Basis-URL der REST API (ohne `/v2`)
    pub api_url: String,
    /// WebSocket-URL des RTC Signaling-Servers
    pub rtc_url: String,
    /// Domain für SIP-Adressen (`sip:<nummer>@<domain>`)
    pub sip_domain: String,
    pub stun_url: String,
}

impl Config {
    /// Lädt `.env` (falls vorhanden) und liest danach die Prozess-Umgebung
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {:?}", path),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("Failed to load .env file: {}", e),
        }

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Baut die Konfiguration aus einer beliebigen Lookup-Funktion
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let optional = |name: &str, default: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let config = Self {
            api_key: required(API_KEY_VAR)?,
            sip_connection_id: required(SIP_CONNECTION_ID_VAR)?,
            api_url: optional(API_URL_VAR, DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
            rtc_url: optional(RTC_URL_VAR, DEFAULT_RTC_URL),
            sip_domain: optional(SIP_DOMAIN_VAR, DEFAULT_SIP_DOMAIN),
            stun_url: optional(STUN_URL_VAR, DEFAULT_STUN_URL),
        };

        url::Url::parse(&config.api_url).map_err(|e| ConfigError::Invalid {
            name: API_URL_VAR,
            reason: e.to_string(),
        })?;
        url::Url::parse(&config.rtc_url).map_err(|e| ConfigError::Invalid {
            name: RTC_URL_VAR,
            reason: e.to_string(),
        })?;

        Ok(config)
    }
}

// API Key nicht ins Log schreiben
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("sip_connection_id", &self.sip_connection_id)
            .field("api_url", &self.api_url)
            .field("rtc_url", &self.rtc_url)
            .field("sip_domain", &self.sip_domain)
            .field("stun_url", &self.stun_url)
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
