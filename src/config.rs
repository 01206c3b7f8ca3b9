// src/config.rs
use anyhow::{bail, Result};
use log::info;
use std::env;
use std::fmt;
use std::str::FromStr;

/// Longest session, in seconds, still treated as a pass-by detection.
pub const DEFAULT_SESSION_LIMIT_SECS: i64 = 600;
/// Farthest apart, in meters, two detections may be and still pair.
pub const DEFAULT_DETECTION_DISTANCE_METERS: f64 = 100.0;
/// Largest gap, in seconds, between the primary times of two paired detections.
pub const DEFAULT_DETECTION_TIME_SECS: i64 = 60;
/// Minimum NPMI for an identifier pair to survive the threshold filter.
pub const DEFAULT_MIN_NPMI: f64 = 0.5;
/// Width of an occupancy time bin (15 minutes).
pub const DEFAULT_OCCUPANCY_INTERVAL_SECS: i64 = 900;

/// Epoch values above this are read as milliseconds. 10^10 seconds is in the
/// year 2286, while 10^10 milliseconds is in April 1970, so no realistic
/// seconds value crosses it. Each finer unit moves the cutoff up by 10^3.
pub const EPOCH_MILLIS_CUTOFF: i64 = 10_000_000_000;
/// Above this an epoch column is read as microseconds.
pub const EPOCH_MICROS_CUTOFF: i64 = 10_000_000_000_000;
/// Above this an epoch column is read as nanoseconds, the integer form of a
/// 64-bit datetime.
pub const EPOCH_NANOS_CUTOFF: i64 = 10_000_000_000_000_000;
pub const MILLIS_PER_SECOND: i64 = 1_000;
pub const MICROS_PER_SECOND: i64 = 1_000_000;
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// WGS84 equatorial radius used by the haversine filter.
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

/// Rows per multi-row INSERT when loading the external join store. Ten
/// parameters per row keeps each statement well under PostgreSQL's 65535 limit.
pub const INSERT_BATCH_SIZE: usize = 1000;

/// Which range-join algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrategy {
    /// Full pairwise time-difference matrix; memory grows with n·m.
    InMemory,
    /// Temporary PostgreSQL tables joined with an indexed BETWEEN predicate.
    Postgres,
}

impl JoinStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinStrategy::InMemory => "in-memory",
            JoinStrategy::Postgres => "postgres",
        }
    }
}

impl FromStr for JoinStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "in-memory" | "inmemory" | "memory" => Ok(JoinStrategy::InMemory),
            "postgres" | "external" | "sql" => Ok(JoinStrategy::Postgres),
            other => bail!(
                "Unknown join strategy '{}': expected 'in-memory' or 'postgres'",
                other
            ),
        }
    }
}

impl fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds and switches for one matching run.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    pub session_limit: i64,
    pub detection_distance: f64,
    pub detection_time: i64,
    pub min_npmi: f64,
    pub run_npmi: bool,
    pub join_strategy: JoinStrategy,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            session_limit: DEFAULT_SESSION_LIMIT_SECS,
            detection_distance: DEFAULT_DETECTION_DISTANCE_METERS,
            detection_time: DEFAULT_DETECTION_TIME_SECS,
            min_npmi: DEFAULT_MIN_NPMI,
            run_npmi: false,
            join_strategy: JoinStrategy::InMemory,
        }
    }
}

impl MatchingConfig {
    /// Create configuration from environment variables, falling back to the
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// As [`MatchingConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        fn parsed<T: FromStr>(value: Option<String>, default: T) -> T {
            value.and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        Self {
            session_limit: parsed(lookup("SESSION_LIMIT_SECS"), DEFAULT_SESSION_LIMIT_SECS),
            detection_distance: parsed(lookup("DETECTION_DISTANCE_METERS"), DEFAULT_DETECTION_DISTANCE_METERS),
            detection_time: parsed(lookup("DETECTION_TIME_SECS"), DEFAULT_DETECTION_TIME_SECS),
            min_npmi: parsed(lookup("MIN_NPMI"), DEFAULT_MIN_NPMI),
            run_npmi: parsed(lookup("RUN_NPMI"), false),
            join_strategy: parsed(lookup("JOIN_STRATEGY"), JoinStrategy::InMemory),
        }
    }

    pub fn log_config(&self) {
        info!("⚙️  Matching configuration:");
        info!("   Session limit: {}s", self.session_limit);
        info!("   Detection distance: {}m", self.detection_distance);
        info!("   Detection time window: ±{}s", self.detection_time);
        info!("   Join strategy: {}", self.join_strategy);
        if self.run_npmi {
            info!("   NPMI scoring ENABLED (min NPMI: {})", self.min_npmi);
        } else {
            info!("   NPMI scoring DISABLED - returning unscored candidate pairs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = MatchingConfig::default();
        assert_eq!(config.session_limit, 600);
        assert_eq!(config.detection_distance, 100.0);
        assert_eq!(config.detection_time, 60);
        assert_eq!(config.min_npmi, 0.5);
        assert!(!config.run_npmi);
        assert_eq!(config.join_strategy, JoinStrategy::InMemory);
    }

    #[test]
    fn test_env_config() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SESSION_LIMIT_SECS", "300"),
            ("DETECTION_DISTANCE_METERS", "250.5"),
            ("DETECTION_TIME_SECS", "not-a-number"),
            ("MIN_NPMI", "0.7"),
            ("RUN_NPMI", "true"),
            ("JOIN_STRATEGY", "postgres"),
        ]);

        let config = MatchingConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.session_limit, 300);
        assert_eq!(config.detection_distance, 250.5);
        assert_eq!(config.detection_time, DEFAULT_DETECTION_TIME_SECS);
        assert_eq!(config.min_npmi, 0.7);
        assert!(config.run_npmi);
        assert_eq!(config.join_strategy, JoinStrategy::Postgres);

        let empty = MatchingConfig::from_lookup(|_| None);
        assert_eq!(empty, MatchingConfig::default());
    }

    #[test]
    fn test_join_strategy_parsing() {
        assert_eq!("in-memory".parse::<JoinStrategy>().unwrap(), JoinStrategy::InMemory);
        assert_eq!("External".parse::<JoinStrategy>().unwrap(), JoinStrategy::Postgres);
        assert!("spark".parse::<JoinStrategy>().is_err());
    }
}
