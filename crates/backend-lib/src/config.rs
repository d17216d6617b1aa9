// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
//!
//! Settings are layered: compiled-in defaults, then a TOML file, then
//! `TALENT_AUTH_*` environment variables. Nested keys use a double
//! underscore, e.g. `TALENT_AUTH_AUTH__MAX_ATTEMPTS=10`.
use anyhow::{bail, Result};
use chrono::Duration;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "talent-auth.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TALENT_AUTH_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Signs access/refresh credentials and reset tokens
    pub secret_key: String,
    /// Base URL used to build reset links
    pub frontend_url: String,
    /// Sender address for outgoing mail
    pub mail_from: String,
    /// scrypt `log_n` for new password hashes
    pub password_hash_cost: u8,
    pub auth: AuthSettings,
    pub password_requirements: PasswordRequirements,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Reverse proxies whose `X-Forwarded-For` / `X-Real-IP` headers are
    /// believed. Empty means the peer address is always the client.
    pub trusted_proxies: Vec<IpAddr>,
}

/// Knobs of the authentication core, handed to each component's constructor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Failed logins before an identifier is locked
    pub max_attempts: u32,
    /// Lockout window; each failure restarts it
    pub lockout_duration_secs: u64,
    pub reset_token_lifetime_secs: u64,
    pub access_lifetime_secs: u64,
    pub refresh_lifetime_secs: u64,
    /// Cookie sessions idle longer than this are flushed
    pub session_idle_timeout_secs: u64,
}

/// Password complexity requirements
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordRequirements {
    /// Minimum password length
    pub min_length: usize,
    /// Require uppercase letters
    pub require_uppercase: bool,
    /// Require lowercase letters
    pub require_lowercase: bool,
    /// Require digits
    pub require_digit: bool,
    /// Require special characters
    pub require_special: bool,
}

/// Per-client request throttling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            log_level: "info".to_string(),
            secret_key: "insecure-development-secret-change-me-0123456789".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            mail_from: "noreply@talent.local".to_string(),
            password_hash_cost: 15,
            auth: AuthSettings::default(),
            password_requirements: PasswordRequirements::default(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            trusted_proxies: Vec::new(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_duration_secs: 15 * 60,
            reset_token_lifetime_secs: 24 * 60 * 60,
            access_lifetime_secs: 60 * 60,
            refresh_lifetime_secs: 7 * 24 * 60 * 60,
            session_idle_timeout_secs: 24 * 60 * 60,
        }
    }
}

impl Default for PasswordRequirements {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: false,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 100,
        }
    }
}

/// Longest duration any knob can express (a century)
const MAX_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_SECS) as i64)
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        secs(self.window_secs)
    }
}

impl AuthSettings {
    pub fn lockout_duration(&self) -> Duration {
        secs(self.lockout_duration_secs)
    }

    pub fn reset_token_lifetime(&self) -> Duration {
        secs(self.reset_token_lifetime_secs)
    }

    pub fn access_lifetime(&self) -> Duration {
        secs(self.access_lifetime_secs)
    }

    pub fn refresh_lifetime(&self) -> Duration {
        secs(self.refresh_lifetime_secs)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        secs(self.session_idle_timeout_secs)
    }
}

impl Settings {
    /// Load from `talent-auth.toml` and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific TOML file and the environment. A missing file is
    /// not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings: Settings = Self::figment(path.as_ref()).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Reject settings the core cannot run with
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            bail!("invalid log level: {}", self.log_level);
        }
        if self.secret_key.len() < 32 {
            bail!("secret_key must be at least 32 bytes");
        }
        if !(1..=20).contains(&self.password_hash_cost) {
            bail!("password_hash_cost must be between 1 and 20");
        }

        let auth = &self.auth;
        if auth.max_attempts == 0 {
            bail!("auth.max_attempts must be positive");
        }
        if auth.lockout_duration_secs == 0
            || auth.reset_token_lifetime_secs == 0
            || auth.access_lifetime_secs == 0
            || auth.refresh_lifetime_secs == 0
            || auth.session_idle_timeout_secs == 0
        {
            bail!("auth durations must be positive");
        }
        if auth.refresh_lifetime_secs < auth.access_lifetime_secs {
            bail!("auth.refresh_lifetime_secs must not be shorter than the access lifetime");
        }

        if self.password_requirements.min_length < 6 {
            bail!("password_requirements.min_length must be at least 6");
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0 {
            bail!("rate_limit values must be positive");
        }
        Ok(())
    }

    /// `host:port` for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
