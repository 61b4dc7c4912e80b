//! config.rs - Tunables for the seller resolver
//!
//! Defaults match production behaviour; every value can be overridden with a
//! `SELLER_RESOLVER_*` environment variable, a command-line flag, or a
//! `with_*` builder.

use clap::Parser;
use log::warn;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://www.walmart.com/orchestra/pdp/graphql/GetAllSellerOffers";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub endpoint: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Cached offers are served while strictly younger than this.
    pub cache_ttl: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    /// Backoff multiplier is `2^min(blocks, backoff_cap_exponent)`.
    pub backoff_cap_exponent: u32,
    /// Minimum gap between two "show all sellers" activations.
    pub activation_cooldown: Duration,
    pub dom_wait_attempts: u32,
    pub dom_wait_interval: Duration,
    /// Seller name the marketplace uses for its own offers.
    pub platform_seller_name: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(10),
            cache_ttl: Duration::from_secs(30),
            jitter_min: Duration::from_millis(250),
            jitter_max: Duration::from_millis(1250),
            backoff_min: Duration::from_secs(60),
            backoff_max: Duration::from_secs(90),
            backoff_cap_exponent: 4,
            activation_cooldown: Duration::from_secs(5),
            dom_wait_attempts: 10,
            dom_wait_interval: Duration::from_millis(300),
            platform_seller_name: "Walmart.com".to_string(),
        }
    }
}

/// Command-line / environment overrides for `ResolverConfig`.
///
/// Every field falls back to its `SELLER_RESOLVER_*` variable, then to the
/// built-in default.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "seller-resolver")]
pub struct ResolverOverrides {
    /// Offers query endpoint
    #[arg(long, env = "SELLER_RESOLVER_ENDPOINT")]
    pub endpoint: Option<String>,

    /// User agent sent with remote queries
    #[arg(long, env = "SELLER_RESOLVER_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Seller name the marketplace uses for its own offers
    #[arg(long, env = "SELLER_RESOLVER_PLATFORM_SELLER")]
    pub platform_seller: Option<String>,

    /// HTTP timeout in milliseconds
    #[arg(long, env = "SELLER_RESOLVER_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Seller cache lifetime in seconds
    #[arg(long, env = "SELLER_RESOLVER_CACHE_TTL_SECS")]
    pub cache_ttl_secs: Option<u64>,

    /// Cap on the backoff doubling exponent
    #[arg(long, env = "SELLER_RESOLVER_BACKOFF_CAP_EXPONENT")]
    pub backoff_cap_exponent: Option<u32>,
}

impl ResolverOverrides {
    /// Overrides taken from `SELLER_RESOLVER_*` variables only.
    pub fn from_env() -> Self {
        match Self::try_parse_from(["seller-resolver"]) {
            Ok(overrides) => overrides,
            Err(e) => {
                warn!("Ignoring SELLER_RESOLVER_* overrides: {}", e);
                Self::default()
            }
        }
    }
}

impl ResolverConfig {
    /// Defaults, overridden by any `SELLER_RESOLVER_*` variables present.
    pub fn from_env() -> Self {
        Self::default().with_overrides(&ResolverOverrides::from_env())
    }

    pub fn with_overrides(mut self, overrides: &ResolverOverrides) -> Self {
        if let Some(endpoint) = &overrides.endpoint {
            self.endpoint = endpoint.clone();
        }
        if let Some(agent) = &overrides.user_agent {
            self.user_agent = agent.clone();
        }
        if let Some(name) = &overrides.platform_seller {
            self.platform_seller_name = name.clone();
        }
        if let Some(ms) = overrides.timeout_ms {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = overrides.cache_ttl_secs {
            self.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(cap) = overrides.backoff_cap_exponent {
            self.backoff_cap_exponent = cap;
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_jitter(mut self, min: Duration, max: Duration) -> Self {
        self.jitter_min = min;
        self.jitter_max = max.max(min);
        self
    }

    pub fn with_backoff_window(mut self, min: Duration, max: Duration) -> Self {
        self.backoff_min = min;
        self.backoff_max = max.max(min);
        self
    }

    pub fn with_dom_wait(mut self, attempts: u32, interval: Duration) -> Self {
        self.dom_wait_attempts = attempts;
        self.dom_wait_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.backoff_cap_exponent, 4);
        assert_eq!(config.activation_cooldown, Duration::from_secs(5));
        assert!(config.jitter_min < config.jitter_max);
    }

    #[test]
    fn test_builders_keep_windows_ordered() {
        let config = ResolverConfig::default()
            .with_jitter(Duration::from_millis(500), Duration::from_millis(100))
            .with_backoff_window(Duration::from_secs(5), Duration::from_secs(1));

        assert_eq!(config.jitter_max, Duration::from_millis(500));
        assert_eq!(config.backoff_max, Duration::from_secs(5));
    }

    #[test]
    fn test_from_env_reads_ttl() {
        std::env::set_var("SELLER_RESOLVER_CACHE_TTL_SECS", "45");
        let config = ResolverConfig::from_env();
        std::env::remove_var("SELLER_RESOLVER_CACHE_TTL_SECS");

        assert_eq!(config.cache_ttl, Duration::from_secs(45));
    }

    #[test]
    fn test_flags_override_defaults() {
        let overrides = ResolverOverrides::try_parse_from([
            "seller-resolver",
            "--endpoint",
            "http://localhost:9000/offers",
            "--timeout-ms",
            "2500",
            "--backoff-cap-exponent",
            "2",
        ])
        .unwrap();
        let config = ResolverConfig::default().with_overrides(&overrides);

        assert_eq!(config.endpoint, "http://localhost:9000/offers");
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.backoff_cap_exponent, 2);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let parsed = ResolverOverrides::try_parse_from(["seller-resolver", "--timeout-ms", "soon"]);
        assert!(parsed.is_err());
    }
}
