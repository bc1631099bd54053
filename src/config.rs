//! Service configuration read from environment variables

use crate::convert::ConvertOptions;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_LOG_LEVEL: &str = "INFO";
const DEFAULT_MAX_FILE_SIZE_MB: usize = 50;
const DEFAULT_MAX_PAGES: usize = 300;
const DEFAULT_RATE_LIMIT: &str = "2/minute";
const BYTES_PER_MB: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Invalid rate limit '{0}': expected forms like \"2/minute\", \"10 per hour\" \
         or \"5/30 seconds\""
    )]
    InvalidRateLimit(String),
}

/// What happened when looking for a `.env` file.
///
/// Loading runs before the logger exists, so the outcome is kept and
/// reported through [`DotenvStatus::log`] once logging is set up.
#[derive(Debug)]
pub enum DotenvStatus {
    Loaded(PathBuf),
    NotFound,
    Failed(String),
}

impl DotenvStatus {
    fn from_result(result: Result<PathBuf, dotenvy::Error>) -> Self {
        match result {
            Ok(path) => DotenvStatus::Loaded(path),
            Err(e) if e.not_found() => DotenvStatus::NotFound,
            Err(e) => DotenvStatus::Failed(e.to_string()),
        }
    }

    pub fn log(&self) {
        match self {
            DotenvStatus::Loaded(path) => log::debug!("Loaded environment from {}", path.display()),
            DotenvStatus::NotFound => {}
            DotenvStatus::Failed(e) => log::warn!("Failed to load .env file: {}", e),
        }
    }
}

/// Load `.env` from the working directory or its parents.
///
/// Variables already set in the process environment win over the file.
pub fn load_dotenv() -> DotenvStatus {
    DotenvStatus::from_result(dotenvy::dotenv())
}

/// Load a specific env file, with the same precedence as [`load_dotenv`]
pub fn load_dotenv_from(path: &Path) -> DotenvStatus {
    DotenvStatus::from_result(dotenvy::from_path(path).map(|_| path.to_path_buf()))
}

/// `tracing` filter directive for `LOG_LEVEL`.
///
/// Accepts Python-style level names, so `WARNING` and `CRITICAL` map to
/// `warn` and `error`. Read before [`ServiceConfig::from_env`] so that its
/// warnings are already captured.
pub fn log_filter_from_env() -> String {
    let level = std::env::var("LOG_LEVEL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}

/// Deployment environment (`APP_ENV`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEnv {
    Local,
    Production,
    Other(String),
}

impl AppEnv {
    /// `APP_ENV`, defaulting to local
    pub fn from_env() -> Self {
        std::env::var("APP_ENV")
            .map(|v| AppEnv::parse(&v))
            .unwrap_or(AppEnv::Local)
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "local" | "dev" | "development" => AppEnv::Local,
            "prod" | "production" => AppEnv::Production,
            other => AppEnv::Other(other.to_string()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, AppEnv::Local)
    }
}

impl fmt::Display for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppEnv::Local => f.write_str("local"),
            AppEnv::Production => f.write_str("production"),
            AppEnv::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl RateUnit {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "second" | "seconds" => Some(RateUnit::Second),
            "m" | "min" | "minute" | "minutes" => Some(RateUnit::Minute),
            "h" | "hour" | "hours" => Some(RateUnit::Hour),
            "d" | "day" | "days" => Some(RateUnit::Day),
            _ => None,
        }
    }

    fn seconds(self) -> u64 {
        match self {
            RateUnit::Second => 1,
            RateUnit::Minute => 60,
            RateUnit::Hour => 3600,
            RateUnit::Day => 86400,
        }
    }

    fn name(self) -> &'static str {
        match self {
            RateUnit::Second => "second",
            RateUnit::Minute => "minute",
            RateUnit::Hour => "hour",
            RateUnit::Day => "day",
        }
    }
}

/// Allowed requests per client per window, e.g. `2/minute`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub requests: u32,
    pub periods: u32,
    pub unit: RateUnit,
}

impl RateLimit {
    pub fn new(requests: u32, periods: u32, unit: RateUnit) -> Self {
        Self {
            requests,
            periods,
            unit,
        }
    }

    /// Length of one counting window
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.unit.seconds() * u64::from(self.periods))
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(2, 1, RateUnit::Minute)
    }
}

impl FromStr for RateLimit {
    type Err = ConfigError;

    /// Accepts `N/unit`, `N per unit` and `N/M unit` (units singular or plural)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidRateLimit(s.to_string());
        let lowered = s.trim().to_ascii_lowercase();

        let (count, period) = lowered
            .split_once('/')
            .or_else(|| lowered.split_once(" per "))
            .ok_or_else(invalid)?;

        let requests: u32 = count.trim().parse().map_err(|_| invalid())?;
        let period = period.trim();
        let (periods, unit) = match period.split_once(char::is_whitespace) {
            Some((n, unit)) => (n.trim().parse().map_err(|_| invalid())?, unit),
            None => (1, period),
        };
        let unit = RateUnit::parse(unit).ok_or_else(invalid)?;

        if requests == 0 || periods == 0 {
            return Err(invalid());
        }
        Ok(Self::new(requests, periods, unit))
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per {} {}", self.requests, self.periods, self.unit.name())?;
        if self.periods > 1 {
            f.write_str("s")?;
        }
        Ok(())
    }
}

/// Everything the service reads from its environment
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub env: AppEnv,
    pub host: String,
    pub port: u16,
    /// Accepted for compatibility; the server never reloads itself
    pub reload: bool,
    pub workers: usize,
    pub log_level: String,
    pub max_file_size_mb: usize,
    pub max_pages: usize,
    pub rate_limit: RateLimit,
    /// Take the client address from `X-Forwarded-For` when present
    pub trust_proxy_headers: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            env: AppEnv::Local,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            reload: false,
            workers: ConvertOptions::default().workers,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            max_pages: DEFAULT_MAX_PAGES,
            rate_limit: RateLimit::default(),
            trust_proxy_headers: true,
        }
    }
}

impl ServiceConfig {
    /// Read the configuration from the process environment.
    ///
    /// Malformed or zero numeric values are logged and replaced by their
    /// defaults; a malformed `RATE_LIMIT` is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let rate_limit = std::env::var("RATE_LIMIT")
            .unwrap_or_else(|_| DEFAULT_RATE_LIMIT.to_string())
            .parse()?;

        let config = Self {
            env: AppEnv::from_env(),
            host: std::env::var("APP_HOST")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.host),
            port: env_number("APP_PORT", defaults.port),
            reload: env_flag("APP_RELOAD", defaults.reload),
            workers: env_number("MAX_WORKERS", defaults.workers),
            log_level: std::env::var("LOG_LEVEL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.log_level),
            max_file_size_mb: env_file_size_mb(defaults.max_file_size_mb),
            max_pages: env_number("MAX_PAGES", defaults.max_pages),
            rate_limit,
            trust_proxy_headers: env_flag(
                "TRUST_PROXY_HEADERS",
                defaults.trust_proxy_headers,
            ),
        };

        if config.reload {
            log::debug!("APP_RELOAD is set but hot reload is not supported; ignoring");
        }

        Ok(config)
    }

    /// Upload limit in bytes, saturating for limits set by hand
    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb.saturating_mul(BYTES_PER_MB)
    }

    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            max_pages: self.max_pages,
            workers: self.workers,
        }
    }
}

/// Parse a positive number from the environment, falling back to `default`
fn env_number<T>(name: &str, default: T) -> T
where
    T: FromStr + Default + PartialEq + fmt::Display,
{
    let Ok(value) = std::env::var(name) else {
        return default;
    };
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed != T::default() => parsed,
        Ok(_) => {
            log::warn!("Invalid {} value (must be > 0), using default {}", name, default);
            default
        }
        Err(_) => {
            log::warn!(
                "Failed to parse {}='{}', using default {}",
                name,
                value,
                default
            );
            default
        }
    }
}

/// `MAX_FILE_SIZE_MB`, rejecting values whose byte count overflows `usize`
fn env_file_size_mb(default: usize) -> usize {
    let mb = env_number("MAX_FILE_SIZE_MB", default);
    if mb.checked_mul(BYTES_PER_MB).is_none() {
        log::warn!(
            "MAX_FILE_SIZE_MB={} is too large to express in bytes, using default {}",
            mb,
            default
        );
        return default;
    }
    mb
}

fn env_flag(name: &str, default: bool) -> bool {
    let Ok(value) = std::env::var(name) else {
        return default;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            log::warn!("Failed to parse {}='{}', using default {}", name, value, default);
            default
        }
    }
}
