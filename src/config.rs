//! Configuration
//!
//! Typed settings for every part of the cache subsystem, with defaults,
//! validation, and a YAML loader.
//!
//! # File format
//!
//! ```yaml
//! tiers:
//!   eviction_order: insertion_time
//!   hot:  { capacity: 500,   ttl: 1h }
//!   warm: { capacity: 2000,  ttl: 24h }
//!   cold: { capacity: 10000, ttl: 7d }
//! query_cache:
//!   capacity: 1000
//!   ttl: 60s
//! write_behind:
//!   max_batch_size: 50
//!   flush_interval: 5s
//!   max_attempts: 5
//! facade:
//!   load_timeout: 2s
//!   single_flight: true
//! sweep_interval: 60s
//! ```
//!
//! Every section and field is optional; missing values take their defaults.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{EvictionOrder, TierLimits};
use crate::error::{Error, Result};

// =============================================================================
// Settings
// =============================================================================

/// Tier capacities, TTLs and eviction order.
#[derive(Debug, Clone, PartialEq)]
pub struct TierSettings {
    pub hot: TierLimits,
    pub warm: TierLimits,
    pub cold: TierLimits,
    pub eviction_order: EvictionOrder,
}

impl Default for TierSettings {
    fn default() -> Self {
        Self {
            hot: TierLimits::hot(),
            warm: TierLimits::warm(),
            cold: TierLimits::cold(),
            eviction_order: EvictionOrder::InsertionTime,
        }
    }
}

/// Query result cache settings.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCacheConfig {
    /// Whether read-only queries are cached at all
    pub enabled: bool,
    /// Maximum number of cached results
    pub capacity: usize,
    /// Lifetime of a cached result
    pub ttl: Duration,
    /// Fraction of entries evicted when the cache is full
    pub eviction_fraction: f64,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1_000,
            ttl: Duration::from_secs(60),
            eviction_fraction: 0.10,
        }
    }
}

/// Write-behind queue settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBehindConfig {
    /// Records taken per flush; reaching it triggers an immediate flush
    pub max_batch_size: usize,
    /// Timer-driven flush interval
    pub flush_interval: Duration,
    /// Failed flush attempts before a record is dead-lettered
    pub max_attempts: u32,
}

impl Default for WriteBehindConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            flush_interval: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

/// Read-through orchestration settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FacadeConfig {
    /// Deadline for a single backing-store load
    pub load_timeout: Duration,
    /// Coalesce concurrent misses for the same key into one load
    pub single_flight: bool,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(2),
            single_flight: true,
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StrataConfig {
    pub tiers: TierSettings,
    pub query_cache: QueryCacheConfig,
    pub write_behind: WriteBehindConfig,
    pub facade: FacadeConfig,
    /// Interval between TTL sweeps
    pub sweep_interval: Duration,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            tiers: TierSettings::default(),
            query_cache: QueryCacheConfig::default(),
            write_behind: WriteBehindConfig::default(),
            facade: FacadeConfig::default(),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl StrataConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, limits) in [
            ("hot", &self.tiers.hot),
            ("warm", &self.tiers.warm),
            ("cold", &self.tiers.cold),
        ] {
            if limits.capacity == 0 {
                return Err(Error::Config(format!("{} tier capacity must be > 0", name)));
            }
            if limits.ttl.is_zero() {
                return Err(Error::Config(format!("{} tier ttl must be > 0", name)));
            }
        }

        if self.query_cache.capacity == 0 {
            return Err(Error::Config("query cache capacity must be > 0".into()));
        }
        if self.query_cache.ttl.is_zero() {
            return Err(Error::Config("query cache ttl must be > 0".into()));
        }
        let fraction = self.query_cache.eviction_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(Error::Config(format!(
                "query cache eviction fraction must be in (0, 1], got {}",
                fraction
            )));
        }

        if self.write_behind.max_batch_size == 0 {
            return Err(Error::Config("write-behind max_batch_size must be > 0".into()));
        }
        if self.write_behind.flush_interval.is_zero() {
            return Err(Error::Config("write-behind flush_interval must be > 0".into()));
        }
        if self.write_behind.max_attempts == 0 {
            return Err(Error::Config("write-behind max_attempts must be > 0".into()));
        }

        if self.facade.load_timeout.is_zero() {
            return Err(Error::Config("load_timeout must be > 0".into()));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::Config("sweep_interval must be > 0".into()));
        }

        Ok(())
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(yaml)?;
        let config = file.into_config()?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }
}

// =============================================================================
// File Representation
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    tiers: TiersFile,
    query_cache: QueryCacheFile,
    write_behind: WriteBehindFile,
    facade: FacadeFile,
    sweep_interval: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TiersFile {
    eviction_order: Option<EvictionOrder>,
    hot: TierFile,
    warm: TierFile,
    cold: TierFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TierFile {
    capacity: Option<usize>,
    ttl: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct QueryCacheFile {
    enabled: Option<bool>,
    capacity: Option<usize>,
    ttl: Option<String>,
    eviction_fraction: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct WriteBehindFile {
    max_batch_size: Option<usize>,
    flush_interval: Option<String>,
    max_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FacadeFile {
    load_timeout: Option<String>,
    single_flight: Option<bool>,
}

impl TierFile {
    fn apply(self, defaults: TierLimits) -> Result<TierLimits> {
        Ok(TierLimits {
            capacity: self.capacity.unwrap_or(defaults.capacity),
            ttl: optional_duration(self.ttl, defaults.ttl)?,
        })
    }
}

impl ConfigFile {
    fn into_config(self) -> Result<StrataConfig> {
        let defaults = StrataConfig::default();

        Ok(StrataConfig {
            tiers: TierSettings {
                hot: self.tiers.hot.apply(defaults.tiers.hot)?,
                warm: self.tiers.warm.apply(defaults.tiers.warm)?,
                cold: self.tiers.cold.apply(defaults.tiers.cold)?,
                eviction_order: self
                    .tiers
                    .eviction_order
                    .unwrap_or(defaults.tiers.eviction_order),
            },
            query_cache: QueryCacheConfig {
                enabled: self
                    .query_cache
                    .enabled
                    .unwrap_or(defaults.query_cache.enabled),
                capacity: self
                    .query_cache
                    .capacity
                    .unwrap_or(defaults.query_cache.capacity),
                ttl: optional_duration(self.query_cache.ttl, defaults.query_cache.ttl)?,
                eviction_fraction: self
                    .query_cache
                    .eviction_fraction
                    .unwrap_or(defaults.query_cache.eviction_fraction),
            },
            write_behind: WriteBehindConfig {
                max_batch_size: self
                    .write_behind
                    .max_batch_size
                    .unwrap_or(defaults.write_behind.max_batch_size),
                flush_interval: optional_duration(
                    self.write_behind.flush_interval,
                    defaults.write_behind.flush_interval,
                )?,
                max_attempts: self
                    .write_behind
                    .max_attempts
                    .unwrap_or(defaults.write_behind.max_attempts),
            },
            facade: FacadeConfig {
                load_timeout: optional_duration(
                    self.facade.load_timeout,
                    defaults.facade.load_timeout,
                )?,
                single_flight: self
                    .facade
                    .single_flight
                    .unwrap_or(defaults.facade.single_flight),
            },
            sweep_interval: optional_duration(self.sweep_interval, defaults.sweep_interval)?,
        })
    }
}

fn optional_duration(value: Option<String>, default: Duration) -> Result<Duration> {
    match value {
        Some(s) => parse_duration(&s),
        None => Ok(default),
    }
}

// =============================================================================
// Duration Parsing
// =============================================================================

/// Parse a duration string like "30s", "5m", "1h", "7d" or "1h30m".
///
/// A trailing bare number is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::DurationParse("empty duration string".to_string()));
    }

    let mut total_secs: u64 = 0;
    let mut num_buf = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            num_buf.push(c);
            continue;
        }

        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        num_buf.clear();

        let multiplier = match c {
            'd' | 'D' => 86_400,
            'h' | 'H' => 3_600,
            'm' | 'M' => 60,
            's' | 'S' => 1,
            _ => {
                return Err(Error::DurationParse(format!(
                    "unknown duration unit: {}",
                    c
                )))
            }
        };

        total_secs = total_secs.saturating_add(num.saturating_mul(multiplier));
    }

    if !num_buf.is_empty() {
        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        total_secs = total_secs.saturating_add(num);
    }

    if total_secs == 0 {
        return Err(Error::DurationParse(
            "duration must be greater than 0".to_string(),
        ));
    }

    Ok(Duration::from_secs(total_secs))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_config_is_valid() {
        let config = StrataConfig::default();
        config.validate().unwrap();
        assert_eq!(config.write_behind.flush_interval, Duration::from_secs(5));
        assert_eq!(config.tiers.eviction_order, EvictionOrder::InsertionTime);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = StrataConfig::default();
        config.tiers.warm.capacity = 0;
        assert_matches!(config.validate(), Err(Error::Config(msg)) if msg.contains("warm"));
    }

    #[test]
    fn test_validate_rejects_bad_eviction_fraction() {
        let mut config = StrataConfig::default();
        config.query_cache.eviction_fraction = 0.0;
        assert_matches!(config.validate(), Err(Error::Config(_)));

        config.query_cache.eviction_fraction = 1.5;
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = StrataConfig::default();
        config.write_behind.max_batch_size = 0;
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_from_yaml_overrides_selected_fields() {
        let yaml = r#"
tiers:
  eviction_order: last_access
  hot: { capacity: 8, ttl: 2h }
query_cache:
  ttl: 5s
write_behind:
  max_batch_size: 10
  max_attempts: 3
facade:
  single_flight: false
sweep_interval: 30s
"#;
        let config = StrataConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.tiers.eviction_order, EvictionOrder::LastAccess);
        assert_eq!(config.tiers.hot, TierLimits::new(8, Duration::from_secs(7200)));
        assert_eq!(config.tiers.warm, TierLimits::warm());
        assert_eq!(config.query_cache.ttl, Duration::from_secs(5));
        assert_eq!(config.query_cache.capacity, 1_000);
        assert_eq!(config.write_behind.max_batch_size, 10);
        assert_eq!(config.write_behind.max_attempts, 3);
        assert!(!config.facade.single_flight);
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_from_yaml_empty_document_gives_defaults() {
        let config = StrataConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, StrataConfig::default());
    }

    #[test]
    fn test_from_yaml_rejects_unknown_fields() {
        assert_matches!(
            StrataConfig::from_yaml_str("tiers:\n  lukewarm: {}\n"),
            Err(Error::ConfigFile(_))
        );
    }

    #[test]
    fn test_from_yaml_rejects_bad_duration() {
        assert_matches!(
            StrataConfig::from_yaml_str("sweep_interval: 10x\n"),
            Err(Error::DurationParse(_))
        );
    }

    #[test]
    fn test_from_yaml_runs_validation() {
        assert_matches!(
            StrataConfig::from_yaml_str("write_behind:\n  max_batch_size: 0\n"),
            Err(Error::Config(_))
        );
    }

    #[test]
    fn test_from_file_missing() {
        assert_matches!(
            StrataConfig::from_file("/nonexistent/strata.yaml"),
            Err(Error::Io(_))
        );
    }

    // =========================================================================
    // parse_duration Tests
    // =========================================================================

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604_800));
        assert_eq!(parse_duration("24H").unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_parse_duration_combined() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1d12h").unwrap(), Duration::from_secs(129_600));
    }

    #[test]
    fn test_parse_duration_raw_seconds() {
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration(" 2m ").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("10x").is_err());
    }
}
