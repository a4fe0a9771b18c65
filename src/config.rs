//! Process configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

/// Placeholder key shipped in development images.
pub const DEFAULT_API_KEY: &str = "change-me-in-production";

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Key callers must present in `X-API-Key`.
    pub api_key: String,
    /// Idle lifetime of a registered session.
    pub session_ttl: Duration,
    /// Registry capacity.
    pub max_sessions: usize,
    /// Listen port for the REST surface.
    pub port: u16,
    /// Per-hop deadline for upstream exchanges.
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY.to_string(),
            session_ttl: Duration::from_secs(3600),
            max_sessions: 100,
            port: 8000,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    ///
    /// Unparsable values are logged and replaced with the default rather than
    /// aborting startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            api_key: std::env::var("API_KEY").unwrap_or(defaults.api_key),
            session_ttl: Duration::from_secs(env_parse("SESSION_TTL", 3600)),
            max_sessions: env_parse("MAX_SESSIONS", defaults.max_sessions),
            port: env_parse("PORT", defaults.port),
            request_timeout: Duration::from_secs(env_parse("REQUEST_TIMEOUT", 30)),
        };
        if config.api_key == DEFAULT_API_KEY {
            tracing::warn!("API_KEY is unset, using the development placeholder");
        }
        config
    }

    /// Sweep interval for the registry: TTL/10, floored at 10 seconds.
    pub fn sweep_interval(&self) -> Duration {
        (self.session_ttl / 10).max(Duration::from_secs(10))
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(%key, value = %raw, "unparsable env value, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.max_sessions, 100);
        assert_eq!(config.port, 8000);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn sweep_interval_floors_at_ten_seconds() {
        let mut config = Config::default();
        assert_eq!(config.sweep_interval(), Duration::from_secs(360));

        config.session_ttl = Duration::from_secs(30);
        assert_eq!(config.sweep_interval(), Duration::from_secs(10));
    }
}
