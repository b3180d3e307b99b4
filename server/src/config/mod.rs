use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::{create_security_headers_layer, SecurityHeaders};

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/guestlist";
const DEFAULT_UPLOAD_URL: &str = "http://localhost:3001/uploads";

#[derive(Debug, Error)]
#[error("invalid value '{value}' for {key}: {reason}")]
pub struct ConfigError {
    key: &'static str,
    value: String,
    reason: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub events_page_size: i64,
    pub expiration_interval: Duration,
    pub expiration_scan_limit: i64,
    pub connectivity_interval: Duration,
    pub connectivity_timeout: Duration,
    pub upload_dir: PathBuf,
    pub public_upload_url: String,
    pub max_image_bytes: usize,
    pub cors_allowed_origins: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            database_max_connections: 5,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            events_page_size: 10,
            expiration_interval: Duration::from_secs(60 * 60),
            expiration_scan_limit: 500,
            connectivity_interval: Duration::from_secs(30),
            connectivity_timeout: Duration::from_secs(5),
            upload_dir: PathBuf::from("./uploads"),
            public_upload_url: DEFAULT_UPLOAD_URL.to_string(),
            max_image_bytes: 5 * 1024 * 1024,
            cors_allowed_origins: cors::DEFAULT_ALLOWED_ORIGINS.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: parse_var(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            bind_addr: parse_var("BIND_ADDR", defaults.bind_addr)?,
            events_page_size: positive(
                parse_var("EVENTS_PAGE_SIZE", defaults.events_page_size)?,
                "EVENTS_PAGE_SIZE",
            )?,
            expiration_interval: Duration::from_secs(positive(
                parse_var("EXPIRATION_INTERVAL_SECS", defaults.expiration_interval.as_secs())?,
                "EXPIRATION_INTERVAL_SECS",
            )?),
            expiration_scan_limit: positive(
                parse_var("EXPIRATION_SCAN_LIMIT", defaults.expiration_scan_limit)?,
                "EXPIRATION_SCAN_LIMIT",
            )?,
            connectivity_interval: Duration::from_secs(positive(
                parse_var("CONNECTIVITY_INTERVAL_SECS", defaults.connectivity_interval.as_secs())?,
                "CONNECTIVITY_INTERVAL_SECS",
            )?),
            connectivity_timeout: Duration::from_secs(positive(
                parse_var("CONNECTIVITY_TIMEOUT_SECS", defaults.connectivity_timeout.as_secs())?,
                "CONNECTIVITY_TIMEOUT_SECS",
            )?),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            public_upload_url: env::var("PUBLIC_UPLOAD_URL").unwrap_or(defaults.public_upload_url),
            max_image_bytes: parse_var("MAX_IMAGE_BYTES", defaults.max_image_bytes)?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or(defaults.cors_allowed_origins),
        })
    }

    /// Request body limit: one image plus room for the text fields.
    pub fn body_limit(&self) -> usize {
        self.max_image_bytes + 1024 * 1024
    }
}

fn parse_var<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };

    let parsed = value.trim().parse::<T>();
    match parsed {
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(ConfigError {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn positive<T>(value: T, key: &'static str) -> Result<T, ConfigError>
where
    T: PartialOrd + Default + ToString,
{
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        })
    }
}
