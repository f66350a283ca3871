//! Server configuration.
//!
//! Read from an optional TOML file (`calshare.toml`, or the path in
//! `CALSHARE_CONFIG`) with `CALSHARE__`-prefixed environment variables layered
//! on top, e.g. `CALSHARE__TOKEN__SECRET` or `CALSHARE__MAIL__API_KEY`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::constants::MIN_TOKEN_SECRET_LEN;
use crate::error::{CalShareError, CalShareResult};

static DEFAULT_CONFIG_FILE: &str = "calshare.toml";

fn default_bind() -> String {
    "127.0.0.1:4096".to_string()
}

fn default_database() -> PathBuf {
    PathBuf::from("calshare.db")
}

fn default_client_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_access_ttl() -> String {
    "1h".to_string()
}

fn default_refresh_ttl() -> String {
    "30d".to_string()
}

fn default_invite_ttl() -> String {
    "7d".to_string()
}

fn default_mail_api_url() -> String {
    "https://api.brevo.com/v3/smtp/email".to_string()
}

fn default_geo_url() -> String {
    "http://ip-api.com/json".to_string()
}

fn default_holiday_url() -> String {
    "https://date.nager.at/api/v3".to_string()
}

fn default_country() -> String {
    "US".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// SQLite database file, or `:memory:`.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Base URL of the web client; invitation links point here.
    #[serde(default = "default_client_url")]
    pub client_url: String,

    pub token: TokenConfig,

    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub holidays: HolidayConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub secret: String,

    #[serde(default = "default_access_ttl")]
    pub access_ttl: String,

    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl: String,

    /// Lifetime of invitation and email confirmation links.
    #[serde(default = "default_invite_ttl")]
    pub invite_ttl: String,
}

impl TokenConfig {
    pub fn access_ttl(&self) -> CalShareResult<Duration> {
        parse_duration("token.access_ttl", &self.access_ttl)
    }

    pub fn refresh_ttl(&self) -> CalShareResult<Duration> {
        parse_duration("token.refresh_ttl", &self.refresh_ttl)
    }

    pub fn invite_ttl(&self) -> CalShareResult<Duration> {
        parse_duration("token.invite_ttl", &self.invite_ttl)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_mail_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub sender_email: String,

    pub sender_name: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        MailConfig {
            api_url: default_mail_api_url(),
            api_key: String::new(),
            sender_email: String::new(),
            sender_name: None,
        }
    }
}

impl MailConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.sender_email.trim().is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HolidayConfig {
    /// IP geolocation endpoint; the client IP is appended as a path segment.
    #[serde(default = "default_geo_url")]
    pub geo_url: String,

    /// Public holiday API base (`{base}/PublicHolidays/{year}/{country}`).
    #[serde(default = "default_holiday_url")]
    pub holiday_url: String,

    /// Country used when the client IP cannot be geolocated.
    #[serde(default = "default_country")]
    pub default_country: String,
}

impl Default for HolidayConfig {
    fn default() -> Self {
        HolidayConfig {
            geo_url: default_geo_url(),
            holiday_url: default_holiday_url(),
            default_country: default_country(),
        }
    }
}

fn parse_duration(key: &str, value: &str) -> CalShareResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| CalShareError::Config(format!("Invalid duration for {key} '{value}': {e}")))
}

impl ServerConfig {
    /// Path of the config file: `$CALSHARE_CONFIG`, else `./calshare.toml`.
    pub fn config_path() -> PathBuf {
        std::env::var_os("CALSHARE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn load() -> CalShareResult<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> CalShareResult<Self> {
        let config: ServerConfig = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(
                Environment::with_prefix("CALSHARE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| CalShareError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalShareError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without consulting files or the environment.
    pub fn from_toml(content: &str) -> CalShareResult<Self> {
        let config: ServerConfig = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .map_err(|e| CalShareError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalShareError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CalShareResult<()> {
        if self.token.secret.len() < MIN_TOKEN_SECRET_LEN {
            return Err(CalShareError::Config(format!(
                "token.secret must be at least {MIN_TOKEN_SECRET_LEN} bytes"
            )));
        }
        self.token.access_ttl()?;
        self.token.refresh_ttl()?;
        self.token.invite_ttl()?;
        Ok(())
    }
}
