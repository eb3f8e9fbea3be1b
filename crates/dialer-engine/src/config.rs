//! # Dialer Engine Configuration
//!
//! Engine-wide settings: timer intervals, throughput ceiling, ratio controller
//! tuning, lead scoring weights, storage and event channel sizing. Settings
//! that vary per campaign (ratio bounds, retry policy, calling hours) live in
//! [`CampaignSettings`](crate::campaign::CampaignSettings) instead.
//!
//! Configuration can be built in code or loaded from TOML:
//!
//! ```
//! use rvoip_dialer_engine::config::DialerConfig;
//!
//! let config = DialerConfig::from_toml_str(r#"
//!     [general]
//!     max_calls_per_second = 25.0
//!
//!     [ratio]
//!     max_step = 0.2
//! "#).expect("valid configuration");
//!
//! assert_eq!(config.general.max_calls_per_second, 25.0);
//! assert_eq!(config.ratio.noise_threshold, 0.1);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DialerError, Result};

/// Top-level dialer engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DialerConfig {
    /// Timer intervals, throughput and shutdown settings
    pub general: GeneralConfig,

    /// Ratio controller tuning
    pub ratio: RatioConfig,

    /// Lead scoring and dial queue prioritization weights
    pub scoring: ScoringConfig,

    /// Persistent store settings
    pub database: DatabaseConfig,

    /// Outbound event channel sizing
    pub events: EventConfig,
}

/// General engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Queue processor tick interval in milliseconds
    pub queue_tick_interval_ms: u64,

    /// Ratio controller tick interval in milliseconds
    pub ratio_tick_interval_ms: u64,

    /// Cleanup sweep interval in seconds
    pub cleanup_interval_secs: u64,

    /// Global throughput ceiling in call launches per second
    pub max_calls_per_second: f64,

    /// How long `stop` waits for in-flight calls before force-completing them
    pub stop_grace_period_secs: u64,

    /// How long completed calls are remembered so a duplicate completion
    /// report stays a no-op
    pub completed_call_retention_secs: u64,
}

/// Ratio controller tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatioConfig {
    /// Rolling look-back window of call history
    pub lookback_window_secs: u64,

    /// Largest change of the ratio in a single adjustment
    pub max_step: f64,

    /// Adjustments at or below this magnitude are not committed
    pub noise_threshold: f64,

    /// Number of ticks on each side of the trend comparison
    pub trend_ticks: usize,

    /// Abandonment rate above which the ratio is pulled down
    pub target_abandonment_rate: f64,

    /// Strength of the abandonment penalty
    pub abandonment_weight: f64,

    /// Talk time at which the talk-time factor is neutral
    pub reference_talk_time_secs: f64,

    /// Strength of the answer-rate trend term
    pub trend_weight: f64,
}

/// Lead scoring and prioritization weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Upper bound of the interaction recency contribution
    pub interaction_max_points: f64,
    /// Days over which the interaction contribution decays to zero
    pub interaction_decay_days: f64,
    /// Upper bound of the sale recency contribution
    pub sale_max_points: f64,
    /// Days over which the sale contribution decays to zero
    pub sale_decay_days: f64,
    /// Tier bonus for silver customers
    pub silver_bonus: f64,
    /// Tier bonus for gold customers
    pub gold_bonus: f64,
    /// Tier bonus for platinum customers
    pub platinum_bonus: f64,
    /// Total score clip
    pub max_score: f64,

    /// Prioritizer weight of the time-of-day fit
    pub time_of_day_weight: f64,
    /// Prioritizer weight of the day-of-week fit
    pub day_of_week_weight: f64,
    /// Prioritizer weight of the normalized score
    pub score_weight: f64,
    /// Prioritizer weight of the proximity term
    pub proximity_weight: f64,
    /// Distance at which proximity reaches zero
    pub proximity_max_km: f64,
}

/// Persistent store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite:dialer.db` or `sqlite::memory:`
    pub database_url: String,

    /// Connection pool size
    pub max_connections: u32,

    /// Timeout applied to every outbound store call
    pub query_timeout_secs: u64,

    /// Retries of a transient store failure before it is surfaced
    pub max_retries: u32,

    /// First retry delay; doubled on each attempt
    pub retry_base_delay_ms: u64,

    /// Retry delay cap
    pub retry_max_delay_ms: u64,
}

/// Outbound event channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Broadcast channel capacity; slow subscribers lag beyond this
    pub channel_capacity: usize,

    /// Number of recent events kept in memory
    pub history_size: usize,
}

impl DialerConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: DialerConfig = toml::from_str(s)
            .map_err(|e| DialerError::configuration(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DialerError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Validate the configuration, reporting the first violated constraint
    pub fn validate(&self) -> Result<()> {
        let g = &self.general;
        if g.queue_tick_interval_ms == 0 {
            return Err(DialerError::configuration("queue_tick_interval_ms must be greater than 0"));
        }
        if g.ratio_tick_interval_ms == 0 {
            return Err(DialerError::configuration("ratio_tick_interval_ms must be greater than 0"));
        }
        if g.cleanup_interval_secs == 0 {
            return Err(DialerError::configuration("cleanup_interval_secs must be greater than 0"));
        }
        if !(g.max_calls_per_second > 0.0) {
            return Err(DialerError::configuration("max_calls_per_second must be greater than 0"));
        }

        let r = &self.ratio;
        if r.lookback_window_secs == 0 {
            return Err(DialerError::configuration("lookback_window_secs must be greater than 0"));
        }
        if !(r.max_step > 0.0) {
            return Err(DialerError::configuration("max_step must be greater than 0"));
        }
        if r.noise_threshold < 0.0 {
            return Err(DialerError::configuration("noise_threshold cannot be negative"));
        }
        if r.trend_ticks == 0 {
            return Err(DialerError::configuration("trend_ticks must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&r.target_abandonment_rate) {
            return Err(DialerError::configuration("target_abandonment_rate must be within [0, 1]"));
        }
        if !(r.reference_talk_time_secs > 0.0) {
            return Err(DialerError::configuration("reference_talk_time_secs must be greater than 0"));
        }

        let s = &self.scoring;
        if !(s.max_score > 0.0) {
            return Err(DialerError::configuration("max_score must be greater than 0"));
        }
        if s.interaction_decay_days <= 0.0 || s.sale_decay_days <= 0.0 {
            return Err(DialerError::configuration("score decay periods must be greater than 0"));
        }
        if s.proximity_max_km <= 0.0 {
            return Err(DialerError::configuration("proximity_max_km must be greater than 0"));
        }

        if self.database.database_url.is_empty() {
            return Err(DialerError::configuration("database_url cannot be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(DialerError::configuration("max_connections must be greater than 0"));
        }
        if self.database.query_timeout_secs == 0 {
            return Err(DialerError::configuration("query_timeout_secs must be greater than 0"));
        }

        if self.events.channel_capacity == 0 {
            return Err(DialerError::configuration("channel_capacity must be greater than 0"));
        }

        Ok(())
    }
}

impl GeneralConfig {
    pub fn queue_tick_interval(&self) -> Duration {
        Duration::from_millis(self.queue_tick_interval_ms)
    }

    pub fn ratio_tick_interval(&self) -> Duration {
        Duration::from_millis(self.ratio_tick_interval_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_secs(self.stop_grace_period_secs)
    }

    /// Most calls a single queue tick may launch
    ///
    /// Derived from the calls-per-second ceiling and the tick interval, never
    /// below one so a slow tick still makes progress.
    pub fn launch_ceiling_per_tick(&self) -> usize {
        let per_tick = self.max_calls_per_second * (self.queue_tick_interval_ms as f64 / 1000.0);
        (per_tick.ceil() as usize).max(1)
    }
}

impl DatabaseConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            queue_tick_interval_ms: 1000,
            ratio_tick_interval_ms: 5000,
            cleanup_interval_secs: 60,
            max_calls_per_second: 10.0,
            stop_grace_period_secs: 30,
            completed_call_retention_secs: 600, // 10 minutes
        }
    }
}

impl Default for RatioConfig {
    fn default() -> Self {
        Self {
            lookback_window_secs: 60,
            max_step: 0.3,
            noise_threshold: 0.1,
            trend_ticks: 3,
            target_abandonment_rate: 0.03,
            abandonment_weight: 0.5,
            reference_talk_time_secs: 180.0,
            trend_weight: 0.5,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            interaction_max_points: 30.0,
            interaction_decay_days: 90.0,
            sale_max_points: 40.0,
            sale_decay_days: 365.0,
            silver_bonus: 10.0,
            gold_bonus: 20.0,
            platinum_bonus: 30.0,
            max_score: 100.0,
            time_of_day_weight: 0.3,
            day_of_week_weight: 0.2,
            score_weight: 0.4,
            proximity_weight: 0.1,
            proximity_max_km: 500.0,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 5,
            query_timeout_secs: 15,
            max_retries: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 2000,
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            history_size: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        DialerConfig::default().validate().expect("defaults should validate");
    }

    #[test]
    fn test_launch_ceiling() {
        let mut general = GeneralConfig::default();
        assert_eq!(general.launch_ceiling_per_tick(), 10);

        general.queue_tick_interval_ms = 250;
        general.max_calls_per_second = 10.0;
        assert_eq!(general.launch_ceiling_per_tick(), 3);

        general.max_calls_per_second = 0.5;
        assert_eq!(general.launch_ceiling_per_tick(), 1);
    }

    #[test]
    fn test_validation_rejects_zero_interval() {
        let mut config = DialerConfig::default();
        config.general.queue_tick_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DialerError::Configuration(_)));
    }

    #[test]
    fn test_validation_rejects_bad_rate() {
        let mut config = DialerConfig::default();
        config.ratio.target_abandonment_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = DialerConfig::from_toml_str(
            r#"
            [database]
            query_timeout_secs = 20
            "#,
        )
        .unwrap();
        assert_eq!(config.database.query_timeout_secs, 20);
        assert_eq!(config.database.max_retries, 3);
        assert_eq!(config.general.queue_tick_interval_ms, 1000);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(DialerConfig::from_toml_str("general = 5").is_err());
    }
}
