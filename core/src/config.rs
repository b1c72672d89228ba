use crate::error::{AnalyticsError, AnalyticsResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ── Risk thresholds ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub medium:   f64,
    pub high:     f64,
    pub critical: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self { medium: 0.4, high: 0.7, critical: 0.9 }
    }
}

impl RiskThresholds {
    /// Thresholds must be finite, inside [0,1] and strictly increasing.
    pub fn validate(&self) -> AnalyticsResult<()> {
        let all = [self.medium, self.high, self.critical];
        if all.iter().any(|t| !t.is_finite() || !(0.0..=1.0).contains(t)) {
            return Err(AnalyticsError::invalid(
                "risk_thresholds",
                format!("thresholds must lie in [0,1], got {all:?}"),
            ));
        }
        if !(self.medium < self.high && self.high < self.critical) {
            return Err(AnalyticsError::invalid(
                "risk_thresholds",
                format!(
                    "expected medium < high < critical, got {} / {} / {}",
                    self.medium, self.high, self.critical
                ),
            ));
        }
        Ok(())
    }
}

// ── Cache TTLs ─────────────────────────────────────────────────────

/// Combined absolute + sliding expiration. Whichever elapses first
/// evicts the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlPolicy {
    pub absolute: Duration,
    pub sliding:  Duration,
}

impl TtlPolicy {
    /// Absolute expiration of `minutes`, sliding expiration of half that.
    pub fn minutes(minutes: u64) -> Self {
        let absolute = Duration::from_secs(minutes * 60);
        Self { absolute, sliding: absolute / 2 }
    }
}

// ── Snapshot ───────────────────────────────────────────────────────

/// Everything the engine reads from configuration, captured once per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSnapshot {
    pub dormancy_threshold_days: i64,
    pub churn_cache_minutes:     u64,
    pub analytics_cache_minutes: u64,
    pub query_cache_minutes:     u64,
    pub risk_thresholds:         RiskThresholds,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            dormancy_threshold_days: 90,
            churn_cache_minutes:     60,
            analytics_cache_minutes: 120,
            query_cache_minutes:     15,
            risk_thresholds:         RiskThresholds::default(),
        }
    }
}

impl ConfigSnapshot {
    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> AnalyticsResult<()> {
        if self.dormancy_threshold_days <= 0 {
            return Err(AnalyticsError::invalid(
                "dormancy_threshold_days",
                format!("must be positive, got {}", self.dormancy_threshold_days),
            ));
        }
        self.risk_thresholds.validate()
    }

    pub fn churn_ttl(&self) -> TtlPolicy {
        TtlPolicy::minutes(self.churn_cache_minutes)
    }

    pub fn analytics_ttl(&self) -> TtlPolicy {
        TtlPolicy::minutes(self.analytics_cache_minutes)
    }

    pub fn query_ttl(&self) -> TtlPolicy {
        TtlPolicy::minutes(self.query_cache_minutes)
    }

    /// Compact encoding of every value that changes computed results.
    /// Folded into cache keys so a config change never serves entries
    /// computed under the previous config.
    pub fn fingerprint(&self) -> String {
        let r = &self.risk_thresholds;
        format!(
            "t{}-r{}/{}/{}",
            self.dormancy_threshold_days, r.medium, r.high, r.critical
        )
    }
}

// ── Providers ──────────────────────────────────────────────────────

/// Source of configuration. Called on every engine operation; providers
/// must not hold a snapshot across configuration changes.
pub trait ConfigProvider: Send + Sync {
    fn snapshot(&self) -> AnalyticsResult<ConfigSnapshot>;
}

/// A fixed snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticConfig {
    snapshot: ConfigSnapshot,
}

impl StaticConfig {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self { snapshot }
    }
}

impl ConfigProvider for StaticConfig {
    fn snapshot(&self) -> AnalyticsResult<ConfigSnapshot> {
        Ok(self.snapshot.clone())
    }
}

/// Reads a JSON config file on every call. Missing keys take defaults.
#[derive(Debug, Clone)]
pub struct JsonFileConfig {
    path: PathBuf,
}

impl JsonFileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load `{data_dir}/config/analytics.json`.
    pub fn in_data_dir(data_dir: &str) -> Self {
        Self::new(format!("{data_dir}/config/analytics.json"))
    }

    fn load(&self) -> anyhow::Result<ConfigSnapshot> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", self.path.display()))?;
        let snapshot: ConfigSnapshot = serde_json::from_str(&content)?;
        Ok(snapshot)
    }
}

impl ConfigProvider for JsonFileConfig {
    fn snapshot(&self) -> AnalyticsResult<ConfigSnapshot> {
        self.load()
            .map_err(|e| AnalyticsError::Config(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_are_valid() {
        assert!(ConfigSnapshot::default_test().validate().is_ok());
    }

    #[test]
    fn non_increasing_thresholds_rejected() {
        let mut cfg = ConfigSnapshot::default_test();
        cfg.risk_thresholds = RiskThresholds { medium: 0.7, high: 0.7, critical: 0.9 };
        let err = cfg.validate().unwrap_err();
        assert!(err.is_invalid_argument(), "{err}");

        cfg.risk_thresholds = RiskThresholds { medium: 0.4, high: 0.95, critical: 0.9 };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn out_of_range_thresholds_rejected() {
        let t = RiskThresholds { medium: -0.1, high: 0.5, critical: 0.9 };
        assert!(t.validate().is_err());
        let t = RiskThresholds { medium: 0.1, high: 0.5, critical: f64::NAN };
        assert!(t.validate().is_err());
    }

    #[test]
    fn non_positive_dormancy_threshold_rejected() {
        let cfg = ConfigSnapshot { dormancy_threshold_days: 0, ..ConfigSnapshot::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn ttl_sliding_is_half_of_absolute() {
        let ttl = TtlPolicy::minutes(120);
        assert_eq!(ttl.absolute, Duration::from_secs(7200));
        assert_eq!(ttl.sliding, Duration::from_secs(3600));
    }

    #[test]
    fn fingerprint_tracks_threshold_changes() {
        let a = ConfigSnapshot::default_test();
        let b = ConfigSnapshot { dormancy_threshold_days: 60, ..a.clone() };
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn partial_json_takes_defaults() {
        let cfg: ConfigSnapshot =
            serde_json::from_str(r#"{ "dormancy_threshold_days": 120 }"#).unwrap();
        assert_eq!(cfg.dormancy_threshold_days, 120);
        assert_eq!(cfg.analytics_cache_minutes, 120);
        assert_eq!(cfg.risk_thresholds, RiskThresholds::default());
    }
}
