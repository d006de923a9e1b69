use std::net::IpAddr;

use anyhow::Context;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Postgres connection string. Without one the service keeps its catalog in memory.
    pub database_url: Option<String>,
    pub server_port: u16,
    pub payment_gateway_url: Option<String>,
    pub late_fees_enabled: bool,
    pub rate_limit_per_minute: u32,
    /// Peers whose `X-Forwarded-For` header is believed when keying the rate limiter.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            server_port: 8080,
            payment_gateway_url: None,
            late_fees_enabled: true,
            rate_limit_per_minute: 120,
            trusted_proxies: Vec::new(),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables, applying defaults where appropriate.
    ///
    /// # Errors
    /// Returns an error if a boolean, numeric or IP address variable is set but cannot be parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let server_port = match non_empty_var("SERVER_PORT") {
            Some(v) => v.parse().context("SERVER_PORT must be a port number")?,
            None => defaults.server_port,
        };
        let late_fees_enabled = match non_empty_var("LATE_FEES_ENABLED") {
            Some(v) => v
                .parse()
                .context("LATE_FEES_ENABLED must be `true` or `false`")?,
            None => defaults.late_fees_enabled,
        };
        let rate_limit_per_minute = non_empty_var("RATE_LIMIT_PER_MINUTE")
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.rate_limit_per_minute);
        let trusted_proxies = match non_empty_var("TRUSTED_PROXIES") {
            Some(v) => v
                .split(',')
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(|ip| {
                    ip.parse()
                        .with_context(|| format!("TRUSTED_PROXIES entry `{ip}` is not an IP address"))
                })
                .collect::<anyhow::Result<_>>()?,
            None => defaults.trusted_proxies,
        };

        Ok(Self {
            database_url: non_empty_var("DATABASE_URL"),
            server_port,
            payment_gateway_url: non_empty_var("PAYMENT_GATEWAY_URL"),
            late_fees_enabled,
            rate_limit_per_minute,
            trusted_proxies,
        })
    }
}
