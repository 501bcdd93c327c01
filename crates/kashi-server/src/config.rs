// crates/kashi-server/src/config.rs
//! Environment-driven configuration, read once at startup.

use std::time::Duration;

/// Default port for the server.
const DEFAULT_PORT: u16 = 8787;

/// Hard ceiling on long-poll timeouts, whatever the client asks for.
pub const MAX_LONGPOLL_SECS: u64 = 30;

/// Hard ceiling on `limit` for change queries.
pub const MAX_CHANGES_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Shared application-identity secret every caller must present.
    pub app_secret: String,
    /// HMAC secret for bearer identity tokens.
    pub identity_secret: String,
    /// When set, a bearer token equal to this value bypasses JWT verification
    /// and authenticates as the `x-dev-user` header (or "dev-user").
    pub dev_bypass_token: Option<String>,
    /// Worker slots in this process.
    pub workers: usize,
    pub gen_endpoint: String,
    pub gen_api_key: String,
    pub gen_timeout: Duration,
    /// Retention window for job metadata, results, and the recent index.
    pub retention: Duration,
    /// Recent-index cardinality cap per user.
    pub recent_cap: usize,
    /// Notification debounce window.
    pub debounce: Duration,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("KASHI_PORT")
            .ok()
            .or_else(|| std::env::var("PORT").ok())
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let app_secret = std::env::var("KASHI_APP_SECRET").unwrap_or_else(|_| {
            tracing::warn!("KASHI_APP_SECRET not set; using development default");
            "dev-app-secret".to_string()
        });

        Self {
            port,
            app_secret,
            identity_secret: std::env::var("KASHI_IDENTITY_SECRET")
                .unwrap_or_else(|_| "dev-identity-secret".to_string()),
            dev_bypass_token: std::env::var("KASHI_DEV_BYPASS_TOKEN").ok(),
            workers: env_or("KASHI_WORKERS", 2),
            gen_endpoint: std::env::var("KASHI_GEN_URL")
                .unwrap_or_else(|_| "http://localhost:9400/v1/generate".to_string()),
            gen_api_key: std::env::var("KASHI_GEN_API_KEY").unwrap_or_default(),
            gen_timeout: Duration::from_secs(env_or("KASHI_GEN_TIMEOUT_SECS", 240)),
            retention: Duration::from_secs(env_or("KASHI_RETENTION_HOURS", 24u64) * 3600),
            recent_cap: env_or("KASHI_RECENT_CAP", 500),
            debounce: Duration::from_millis(env_or("KASHI_DEBOUNCE_MS", 25)),
        }
    }

    /// Dev-routes are available exactly when a bypass token is configured.
    pub fn dev_routes_enabled(&self) -> bool {
        self.dev_bypass_token.is_some()
    }

    /// Configuration for tests: dev bypass on, tight debounce.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            app_secret: "test-app-secret".to_string(),
            identity_secret: "test-identity-secret".to_string(),
            dev_bypass_token: Some("test-bypass".to_string()),
            workers: 1,
            gen_endpoint: "http://localhost:0/unused".to_string(),
            gen_api_key: String::new(),
            gen_timeout: Duration::from_secs(5),
            retention: Duration::from_secs(86_400),
            recent_cap: 500,
            debounce: Duration::from_millis(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::for_tests();
        assert!(config.dev_routes_enabled());
        assert_eq!(config.recent_cap, 500);
    }
}
