//! Environment-driven configuration for the book generator service

use std::env;
use std::time::Duration;

const INTERVAL_MS: &str = "BOOKGEN_INTERVAL_MS";
const CACHE_TTL_MS: &str = "BOOKGEN_CACHE_TTL_MS";
const REFRESH_MARGIN_MS: &str = "BOOKGEN_REFRESH_MARGIN_MS";
const BROADCAST_CAPACITY: &str = "BOOKGEN_BROADCAST_CAPACITY";

/// Generator tuning knobs.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Pause between generation passes.
    pub interval: Duration,
    /// Book cache entry lifetime.
    pub cache_ttl: Duration,
    /// Entries this close to expiry are rewritten even when unchanged.
    pub refresh_margin: Duration,
    /// Ticker broadcast channel capacity.
    pub broadcast_capacity: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            cache_ttl: Duration::from_secs(30),
            refresh_margin: Duration::from_secs(5),
            broadcast_capacity: 1024,
        }
    }
}

impl GeneratorConfig {
    pub fn from_env() -> GeneratorConfig {
        match Self::try_from_env() {
            Ok(config) => config,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn try_from_env() -> Result<GeneratorConfig, String> {
        let mut config = GeneratorConfig::default();

        if let Ok(value) = env::var(INTERVAL_MS) {
            let ms: u64 = value
                .parse()
                .map_err(|_| format!("failed to parse {}: {}", INTERVAL_MS, value))?;
            config.interval = Duration::from_millis(ms);
        }

        if let Ok(value) = env::var(CACHE_TTL_MS) {
            let ms: u64 = value
                .parse()
                .map_err(|_| format!("failed to parse {}: {}", CACHE_TTL_MS, value))?;
            config.cache_ttl = Duration::from_millis(ms);
        }

        if let Ok(value) = env::var(REFRESH_MARGIN_MS) {
            let ms: u64 = value
                .parse()
                .map_err(|_| format!("failed to parse {}: {}", REFRESH_MARGIN_MS, value))?;
            config.refresh_margin = Duration::from_millis(ms);
        }

        if let Ok(value) = env::var(BROADCAST_CAPACITY) {
            config.broadcast_capacity = value
                .parse()
                .map_err(|_| format!("failed to parse {}: {}", BROADCAST_CAPACITY, value))?;
        }

        Ok(config)
    }
}
