//! Environment-driven configuration for the matcher service

use std::env;
use std::time::Duration;

use crate::matcher::MatcherSettings;

const WORKERS: &str = "MATCHER_WORKERS";
const ROUND_INTERVAL_MS: &str = "MATCHER_ROUND_INTERVAL_MS";
const FULL_PASS_EVERY: &str = "MATCHER_FULL_PASS_EVERY";
const POST_QUEUE_DEPTH: &str = "MATCHER_POST_QUEUE_DEPTH";
const MAX_MATCHES_PER_ROUND: &str = "MATCHER_MAX_MATCHES_PER_ROUND";
const DEBUG_PACING: &str = "MATCHER_DEBUG_PACING";

/// Scheduler and matcher tuning knobs.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Number of pooled worker partitions per round.
    pub workers: usize,
    /// Pause between rounds.
    pub round_interval: Duration,
    /// Every Nth round processes all active markets instead of only the
    /// dirty set. 0 disables dirty-only rounds entirely.
    pub full_pass_every: u64,
    /// Maximum post-processing tasks in flight.
    pub post_queue_depth: usize,
    /// Per-market match cap per round.
    pub max_matches_per_round: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            round_interval: Duration::from_secs(1),
            full_pass_every: 10,
            post_queue_depth: 32,
            max_matches_per_round: 200,
        }
    }
}

impl MatcherConfig {
    pub fn from_env() -> MatcherConfig {
        match Self::try_from_env() {
            Ok(config) => config,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn try_from_env() -> Result<MatcherConfig, String> {
        let mut config = MatcherConfig::default();

        if let Ok(value) = env::var(WORKERS) {
            config.workers = value
                .parse()
                .map_err(|_| format!("failed to parse {}: {}", WORKERS, value))?;
        }

        let debug_pacing = env::var(DEBUG_PACING)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_pacing {
            config.round_interval = Duration::from_secs(5);
        }

        if let Ok(value) = env::var(ROUND_INTERVAL_MS) {
            let ms: u64 = value
                .parse()
                .map_err(|_| format!("failed to parse {}: {}", ROUND_INTERVAL_MS, value))?;
            config.round_interval = Duration::from_millis(ms);
        }

        if let Ok(value) = env::var(FULL_PASS_EVERY) {
            config.full_pass_every = value
                .parse()
                .map_err(|_| format!("failed to parse {}: {}", FULL_PASS_EVERY, value))?;
        }

        if let Ok(value) = env::var(POST_QUEUE_DEPTH) {
            config.post_queue_depth = value
                .parse()
                .map_err(|_| format!("failed to parse {}: {}", POST_QUEUE_DEPTH, value))?;
        }

        if let Ok(value) = env::var(MAX_MATCHES_PER_ROUND) {
            config.max_matches_per_round = value
                .parse()
                .map_err(|_| format!("failed to parse {}: {}", MAX_MATCHES_PER_ROUND, value))?;
        }

        Ok(config)
    }

    /// Matcher settings derived from this configuration.
    pub fn matcher_settings(&self) -> MatcherSettings {
        MatcherSettings {
            max_matches_per_round: self.max_matches_per_round,
            ..MatcherSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MatcherConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.full_pass_every, 10);
        assert_eq!(config.round_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_settings_derivation() {
        let config = MatcherConfig {
            max_matches_per_round: 7,
            ..MatcherConfig::default()
        };
        assert_eq!(config.matcher_settings().max_matches_per_round, 7);
    }
}
