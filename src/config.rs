//! Configuration management for the agency workspace server.
//!
//! Configuration is read from environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `DEV_MODE` - Optional. Skips session checks when `true`. Defaults to `false`.
//! - `JWT_SECRET` - Required unless `DEV_MODE=true`. Signs session tokens.
//! - `JWT_TTL_DAYS` - Optional. Session lifetime. Defaults to `30`.
//! - `AUTH_ALLOWED_EMAILS` - Optional. Comma separated allow-list; empty allows anyone.
//! - `MAGIC_LINK_TTL_MINUTES` - Optional. Sign-in link lifetime. Defaults to `15`.
//! - `PUBLIC_URL` - Optional. Base URL used in sign-in links. Defaults to `http://localhost:3000`.
//! - `ROW_STORE` - Optional. `memory`, `sqlite` or `supabase`. Defaults to `sqlite`.
//! - `SQLITE_PATH` - Optional. Database file for the sqlite store. Defaults to `./data/workspace.db`.
//! - `SUPABASE_URL` / `SUPABASE_SERVICE_ROLE_KEY` - Required for the supabase store.
//! - `BOARD_MOVE_PERSISTENCE` - Optional. `resequence` or `column_only`. Defaults to `resequence`.
//! - `BOARD_VIEW_IDLE_MINUTES` - Optional. Idle time before a loaded board view is dropped. Defaults to `30`.
//! - `GOOGLE_API_KEY` - Optional. Enables the website audit endpoint.
//! - `AUDIT_MODEL` - Optional. Defaults to `gemini-1.5-flash`.
//! - `AUDIT_MAX_CHARS` - Optional. Page text budget sent to the model. Defaults to `10000`.
//! - `AUDIT_FETCH_TIMEOUT_SECS` - Optional. Timeout for fetching the audited page. Defaults to `30`.

use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::board::MovePersistence;
use crate::store::RowStoreType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Session and sign-in configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for session JWTs
    pub jwt_secret: Option<String>,

    /// Session lifetime in days
    pub jwt_ttl_days: i64,

    /// Lower-cased emails allowed to sign in (empty = anyone)
    pub allowed_emails: Vec<String>,

    /// How long a magic link stays valid
    pub magic_link_ttl: Duration,

    /// Base URL embedded in sign-in links
    pub public_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_ttl_days: 30,
            allowed_emails: Vec::new(),
            magic_link_ttl: Duration::from_secs(15 * 60),
            public_url: "http://localhost:3000".to_string(),
        }
    }
}

impl AuthConfig {
    /// Whether `email` (already normalized) may request a sign-in link.
    pub fn email_allowed(&self, email: &str) -> bool {
        self.allowed_emails.is_empty() || self.allowed_emails.iter().any(|e| e == email)
    }
}

/// Row store backend configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: RowStoreType,

    /// SQLite database file (sqlite backend)
    pub sqlite_path: PathBuf,

    /// Supabase project URL (supabase backend)
    pub supabase_url: Option<String>,

    /// Supabase service role key (supabase backend)
    pub supabase_service_role_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: RowStoreType::Memory,
            sqlite_path: PathBuf::from("./data/workspace.db"),
            supabase_url: None,
            supabase_service_role_key: None,
        }
    }
}

/// Website audit configuration.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Google generative language API key
    pub google_api_key: Option<String>,

    /// Model used for the audit prompt
    pub model: String,

    /// Character budget for extracted page text
    pub max_chars: usize,

    /// Timeout for fetching the audited page
    pub fetch_timeout: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            google_api_key: None,
            model: "gemini-1.5-flash".to_string(),
            max_chars: 10_000,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl AuditConfig {
    pub fn is_enabled(&self) -> bool {
        self.google_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Disable session checks (local development only)
    pub dev_mode: bool,

    pub auth: AuthConfig,

    pub store: StoreConfig,

    /// How cross-column moves are written to the row store
    pub move_persistence: MovePersistence,

    /// Idle time after which a loaded board view is discarded
    pub board_view_idle: Duration,

    pub audit: AuditConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `JWT_SECRET` is not set outside dev mode,
    /// or if the supabase store is selected without credentials.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_or("HOST", "127.0.0.1");
        let port = parse_env("PORT", "3000")?;
        let dev_mode = parse_bool(&env_or("DEV_MODE", "false"));

        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty());
        if jwt_secret.is_none() && !dev_mode {
            return Err(ConfigError::MissingEnvVar("JWT_SECRET".to_string()));
        }

        let auth = AuthConfig {
            jwt_secret,
            jwt_ttl_days: in_range("JWT_TTL_DAYS", parse_env("JWT_TTL_DAYS", "30")?, JWT_TTL_DAYS)?,
            allowed_emails: parse_email_list(&env_or("AUTH_ALLOWED_EMAILS", "")),
            magic_link_ttl: minutes(in_range(
                "MAGIC_LINK_TTL_MINUTES",
                parse_env("MAGIC_LINK_TTL_MINUTES", "15")?,
                TTL_MINUTES,
            )?),
            public_url: env_or("PUBLIC_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
        };

        let store = StoreConfig {
            backend: RowStoreType::from_str(&env_or("ROW_STORE", "sqlite")),
            sqlite_path: PathBuf::from(env_or("SQLITE_PATH", "./data/workspace.db")),
            supabase_url: std::env::var("SUPABASE_URL").ok(),
            supabase_service_role_key: std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok(),
        };
        if store.backend == RowStoreType::Supabase {
            if store.supabase_url.is_none() {
                return Err(ConfigError::MissingEnvVar("SUPABASE_URL".to_string()));
            }
            if store.supabase_service_role_key.is_none() {
                return Err(ConfigError::MissingEnvVar(
                    "SUPABASE_SERVICE_ROLE_KEY".to_string(),
                ));
            }
        }

        let move_persistence_raw = env_or("BOARD_MOVE_PERSISTENCE", "resequence");
        let move_persistence = MovePersistence::parse(&move_persistence_raw).ok_or_else(|| {
            ConfigError::InvalidValue("BOARD_MOVE_PERSISTENCE".to_string(), move_persistence_raw)
        })?;
        let board_view_idle = minutes(in_range(
            "BOARD_VIEW_IDLE_MINUTES",
            parse_env("BOARD_VIEW_IDLE_MINUTES", "30")?,
            TTL_MINUTES,
        )?);

        let audit = AuditConfig {
            google_api_key: std::env::var("GOOGLE_API_KEY").ok(),
            model: env_or("AUDIT_MODEL", "gemini-1.5-flash"),
            max_chars: parse_env("AUDIT_MAX_CHARS", "10000")?,
            fetch_timeout: Duration::from_secs(in_range(
                "AUDIT_FETCH_TIMEOUT_SECS",
                parse_env("AUDIT_FETCH_TIMEOUT_SECS", "30")?,
                1..=600,
            )?),
        };

        Ok(Self {
            host,
            port,
            dev_mode,
            auth,
            store,
            move_persistence,
            board_view_idle,
            audit,
        })
    }

    /// Create a config with an in-memory store and a fixed secret (useful for testing).
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            dev_mode: false,
            auth: AuthConfig {
                jwt_secret: Some(jwt_secret.into()),
                ..AuthConfig::default()
            },
            store: StoreConfig::default(),
            move_persistence: MovePersistence::default(),
            board_view_idle: minutes(30),
            audit: AuditConfig::default(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_or(key, default)
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

/// Accepted session lifetimes, in days.
pub const JWT_TTL_DAYS: RangeInclusive<i64> = 1..=3650;

/// Accepted minute-based lifetimes (magic links, idle board views).
const TTL_MINUTES: RangeInclusive<u64> = 1..=1440;

fn in_range<T>(key: &str, value: T, range: RangeInclusive<T>) -> Result<T, ConfigError>
where
    T: PartialOrd + Display,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("{} is outside {}..={}", value, range.start(), range.end()),
        ))
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value * 60)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Parse a comma separated email list into normalized entries.
pub fn parse_email_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
