//! Threshold alerting with per-asset cooldowns.
//!
//! The AlertManager classifies each fusion result, suppresses alerts while an
//! asset's cooldown is running, and keeps a bounded most-recent-first log.
//! Cooldowns and the log are process-wide: they survive session restarts and
//! asset switches until explicitly cleared.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::AlertConfig;
use crate::types::{Alert, AlertLevel, AssetId, FusionResult};

/// Classifies fusion results into alerts and enforces cooldowns.
pub struct AlertManager {
    /// Thresholds and cooldowns.
    config: AlertConfig,

    /// Next time each asset may alert again.
    cooldowns: DashMap<AssetId, DateTime<Utc>>,

    /// Alert log, most recent first.
    log: RwLock<VecDeque<Alert>>,
}

impl AlertManager {
    /// Create a new alert manager.
    pub fn new(config: AlertConfig) -> Self {
        let capacity = config.log_capacity;
        Self {
            config,
            cooldowns: DashMap::new(),
            log: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Alert level for a fused risk, if any.
    ///
    /// Thresholds are inclusive; critical is checked first.
    pub fn classify(&self, fused_risk: f64) -> Option<AlertLevel> {
        if fused_risk >= self.config.critical_threshold {
            Some(AlertLevel::Critical)
        } else if fused_risk >= self.config.warning_threshold {
            Some(AlertLevel::Warning)
        } else {
            None
        }
    }

    /// Evaluate a fusion result at `now`, emitting at most one alert.
    pub fn evaluate(
        &self,
        asset_id: &AssetId,
        result: &FusionResult,
        now: DateTime<Utc>,
    ) -> Option<Alert> {
        // The entry lock spans check and insert so one cooldown admits one alert
        let level = match self.cooldowns.entry(asset_id.clone()) {
            Entry::Occupied(mut slot) => {
                let until = *slot.get();
                if now < until {
                    debug!(
                        asset_id = %asset_id,
                        fused_risk = result.fused_risk,
                        cooldown_until = %until,
                        "Alert suppressed by cooldown"
                    );
                    return None;
                }
                let level = self.classify(result.fused_risk)?;
                slot.insert(self.cooldown_end(level, now));
                level
            }
            Entry::Vacant(slot) => {
                let level = self.classify(result.fused_risk)?;
                slot.insert(self.cooldown_end(level, now));
                level
            }
        };

        let alert = Alert {
            id: format!("{}-{}", asset_id, now.timestamp_millis()),
            asset_id: asset_id.clone(),
            level,
            message: describe(asset_id, level, result),
            timestamp: now,
        };

        {
            let mut log = self.log.write();
            log.push_front(alert.clone());
            log.truncate(self.config.log_capacity);
        }

        info!(
            asset_id = %asset_id,
            level = %level,
            fused_risk = result.fused_risk,
            "Alert raised"
        );

        Some(alert)
    }

    fn cooldown_end(&self, level: AlertLevel, now: DateTime<Utc>) -> DateTime<Utc> {
        let cooldown = match level {
            AlertLevel::Critical => self.config.critical_cooldown,
            AlertLevel::Warning => self.config.warning_cooldown,
        };
        chrono::Duration::from_std(cooldown)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// End of the asset's running cooldown, if one was set.
    pub fn cooldown_until(&self, asset_id: &AssetId) -> Option<DateTime<Utc>> {
        self.cooldowns.get(asset_id).map(|until| *until)
    }

    /// Snapshot of the alert log, most recent first.
    pub fn recent_alerts(&self) -> Vec<Alert> {
        self.log.read().iter().cloned().collect()
    }

    /// Logged alerts for one asset, most recent first.
    pub fn alerts_for(&self, asset_id: &AssetId) -> Vec<Alert> {
        self.log
            .read()
            .iter()
            .filter(|alert| &alert.asset_id == asset_id)
            .cloned()
            .collect()
    }

    /// Forget all cooldowns.
    pub fn clear_cooldowns(&self) {
        self.cooldowns.clear();
    }

    /// Empty the alert log.
    pub fn clear_log(&self) {
        self.log.write().clear();
    }

    /// Forget cooldowns and empty the log.
    pub fn clear(&self) {
        self.clear_cooldowns();
        self.clear_log();
    }
}

fn describe(asset_id: &AssetId, level: AlertLevel, result: &FusionResult) -> String {
    let headline = match level {
        AlertLevel::Critical => "Critical failure risk",
        AlertLevel::Warning => "Elevated failure risk",
    };
    format!(
        "{} on {}: fused risk {:.1}% (LSTM {:.1}%, RF {:.1}%, anomaly {:.2})",
        headline,
        asset_id,
        result.fused_risk * 100.0,
        result.lstm_failure_prob * 100.0,
        result.rf_failure_prob * 100.0,
        result.ae_scaled_score
    )
}
