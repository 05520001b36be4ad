//! Application configuration
//!
//! Values are merged in this order, later sources win:
//! - built-in defaults (`AppConfig::default()`)
//! - optional TOML file
//! - `IMMUNE_*` environment variables, `__` separates sections
//!   (`IMMUNE_REDIS__URL`, `IMMUNE_TELEGRAM__ADMIN_ID`)
//! - the short legacy names kept for deployments (`TELEGRAM_BOT_TOKEN`, `REDIS_URL`, ...)

use std::net::SocketAddr;
use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Default values grouped the same way as the config sections
pub mod defaults {
    pub const HTTP_ADDR: &str = "0.0.0.0:8080";
    pub const STATUS_HTTP_ADDR: &str = "0.0.0.0:9090";
    pub const QR_URL_PATTERN: &str = "https://immune.example.com/certs/{code}";
    pub const KEY_PREFIX: &str = "immune";
    pub const SQLITE_PATH: &str = "immune.sqlite";
    pub const LOG_LEVEL: &str = "debug";

    pub mod invites {
        pub const CODE_LEN: usize = 4;
        pub const PER_USER: usize = 1;
        pub const PER_ADMIN: usize = 10;
        pub const ADMIN_QR_GENERATIONS: u32 = 10_000;
        pub const USER_QR_GENERATIONS: u32 = 1;
    }
}

/// Legacy environment variable names mapped onto config keys
const LEGACY_ENV: &[(&str, &str)] = &[
    ("TELEGRAM_BOT_TOKEN", "telegram.token"),
    ("TELEGRAM_WEBHOOK_URL", "telegram.webhook_url"),
    ("TELEGRAM_LISTEN_ADDR", "telegram.listen_addr"),
    ("REDIS_URL", "redis.url"),
    ("LOG_LEVEL", "log.level"),
    ("QR_URL_PATTERN", "qr.url_pattern"),
    ("HTTP_ADDR", "http.addr"),
    ("STATUS_HTTP_ADDR", "status_http.addr"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub status_http: HttpConfig,
    pub telegram: TelegramConfig,
    pub qr: QrConfig,
    pub redis: RedisConfig,
    pub storage: StorageConfig,
    pub invites: InvitesConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(serialize_with = "serialize_secret")]
    pub token: SecretString,
    /// Public URL Telegram should post updates to; polling is used when unset
    pub webhook_url: Option<String>,
    /// Local address the webhook listener binds to
    pub listen_addr: Option<SocketAddr>,
    /// Telegram user id of the administrator
    pub admin_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrConfig {
    /// URL encoded into the QR image, `{code}` is replaced with the certificate code
    pub url_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// In-process cache is used when unset
    pub url: Option<String>,
    pub key_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StorageKind {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: StorageKind,
    pub sqlite_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitesConfig {
    /// Master code that activates any user without an inviting owner
    pub unique_code: Option<String>,
    pub code_len: usize,
    pub per_user: usize,
    pub per_admin: usize,
    pub admin_qr_generations: u32,
    pub user_qr_generations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    /// Plain output without colors, for log collectors
    pub raw: bool,
}

fn serialize_secret<S: serde::Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn parse_addr(addr: &str) -> SocketAddr {
    addr.parse().unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                addr: parse_addr(defaults::HTTP_ADDR),
            },
            status_http: HttpConfig {
                addr: parse_addr(defaults::STATUS_HTTP_ADDR),
            },
            telegram: TelegramConfig {
                token: SecretString::from(String::new()),
                webhook_url: None,
                listen_addr: None,
                admin_id: None,
            },
            qr: QrConfig {
                url_pattern: defaults::QR_URL_PATTERN.to_string(),
            },
            redis: RedisConfig {
                url: None,
                key_prefix: defaults::KEY_PREFIX.to_string(),
            },
            storage: StorageConfig {
                kind: StorageKind::Memory,
                sqlite_path: defaults::SQLITE_PATH.to_string(),
            },
            invites: InvitesConfig {
                unique_code: None,
                code_len: defaults::invites::CODE_LEN,
                per_user: defaults::invites::PER_USER,
                per_admin: defaults::invites::PER_ADMIN,
                admin_qr_generations: defaults::invites::ADMIN_QR_GENERATIONS,
                user_qr_generations: defaults::invites::USER_QR_GENERATIONS,
            },
            log: LogConfig {
                level: defaults::LOG_LEVEL.to_string(),
                raw: false,
            },
        }
    }
}

impl AppConfig {
    /// Builds the figment with every configuration source merged
    ///
    /// # Arguments
    /// * `path` - TOML file; skipped silently when it does not exist
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        let legacy = Env::raw()
            .only(&LEGACY_ENV.iter().map(|(name, _)| *name).collect::<Vec<_>>())
            .map(|name| {
                let key = LEGACY_ENV
                    .iter()
                    .find(|(legacy, _)| name.as_str().eq_ignore_ascii_case(legacy))
                    .map_or(name.as_str(), |(_, key)| *key);
                key.into()
            });

        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("IMMUNE_").split("__"))
            .merge(legacy)
    }

    /// Loads and validates the configuration
    ///
    /// # Returns
    /// * `Ok(AppConfig)` - merged configuration
    /// * `Err(AppError::Config)` - a source failed to parse or validation failed
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let config: AppConfig = Self::figment(path)
            .extract()
            .map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.telegram.token.expose_secret().trim().is_empty() {
            return Err(AppError::Config("telegram.token is required".into()));
        }
        if self.qr.url_pattern.trim().is_empty() {
            return Err(AppError::Config("qr.url_pattern is required".into()));
        }
        if !self.qr.url_pattern.contains("{code}") {
            log::warn!("qr.url_pattern has no {{code}} placeholder, every QR will encode the same URL");
        }
        if self.invites.code_len == 0 {
            return Err(AppError::Config("invites.code_len must be positive".into()));
        }
        if self.telegram.webhook_url.is_some() != self.telegram.listen_addr.is_some() {
            return Err(AppError::Config(
                "telegram.webhook_url and telegram.listen_addr must be set together".into(),
            ));
        }
        if let Some(raw) = &self.telegram.webhook_url {
            url::Url::parse(raw).map_err(|e| AppError::Config(format!("telegram.webhook_url: {e}")))?;
        }
        Ok(())
    }
}
