use super::{Outcome, Schedule, Statistics};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use treasury_db::{filter::DateTimeFilter, AuditEntryWhere};

/// Overrides the configured retention when present in `SystemConfig`.
pub const RETENTION_DAYS_SETTING: &str = "audit-retention-days";

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(flatten)]
    pub schedule: Schedule,
    #[serde(with = "humantime_serde", default = "default_retention")]
    pub retention: Duration,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_retention() -> Duration {
    DAY * 365
}

fn default_batch_size() -> i64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            retention: default_retention(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Audit database error: {0}")]
    AuditDb(#[from] treasury_db::Error),
    #[error("setting audit-retention-days is not a whole number of days: {0}")]
    RetentionSetting(serde_json::Error),
    #[error("retention of {} reaches past the earliest timestamp: {source}", humantime::format_duration(*.retention))]
    RetentionOutOfRange {
        retention: Duration,
        source: jiff::Error,
    },
}

/// Deletes audit entries older than the retention period.
pub struct Pruner {
    store: treasury_db::Store,
    config: Config,
}

impl Pruner {
    pub fn new(store: treasury_db::Store, config: Config) -> Self {
        Self { store, config }
    }

    #[tracing::instrument(skip(self, cancellation_token))]
    pub async fn prune(&self, cancellation_token: CancellationToken) -> Result<Outcome, Error> {
        self.store.reload_settings().await?;
        let days = self
            .store
            .settings()
            .get_as::<u64>(RETENTION_DAYS_SETTING)
            .map_err(Error::RetentionSetting)?;
        let retention = effective_retention(self.config.retention, days);
        let cutoff = cutoff(jiff::Timestamp::now(), retention)?;
        tracing::debug!(%cutoff, "pruning audit entries");
        let batch_size = self.config.batch_size.max(1);
        let mut stats = Statistics::default();
        loop {
            if cancellation_token.is_cancelled() {
                return Ok(Outcome::Canceled(stats));
            }
            let removed = self
                .store
                .audit_entry()
                .delete_many(older_than(cutoff), Some(batch_size))
                .await?;
            stats.record_batch(removed);
            if (removed as i64) < batch_size {
                return Ok(Outcome::Completed(stats));
            }
        }
    }
}

fn effective_retention(configured: Duration, days: Option<u64>) -> Duration {
    days.map_or(configured, |days| DAY * days.min(u32::MAX as u64) as u32)
}

fn cutoff(now: jiff::Timestamp, retention: Duration) -> Result<jiff::Timestamp, Error> {
    now.checked_sub(retention)
        .map_err(|source| Error::RetentionOutOfRange { retention, source })
}

fn older_than(cutoff: jiff::Timestamp) -> AuditEntryWhere {
    AuditEntryWhere {
        timestamp: Some(DateTimeFilter::before(cutoff)),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_setting_overrides_configured_retention() {
        let configured = Duration::from_secs(3600);
        assert_eq!(effective_retention(configured, None), configured);
        assert_eq!(effective_retention(configured, Some(30)), DAY * 30);
        assert_eq!(effective_retention(configured, Some(0)), Duration::ZERO);
    }

    #[test]
    fn cutoffs_count_back_from_now() {
        let now = jiff::Timestamp::from_second(10 * 24 * 60 * 60).expect("valid timestamp");
        let cutoff = cutoff(now, DAY * 3).expect("in range");
        assert_eq!(cutoff.as_second(), 7 * 24 * 60 * 60);
        assert!(matches!(
            super::cutoff(jiff::Timestamp::MIN, DAY),
            Err(Error::RetentionOutOfRange { .. })
        ));
    }

    #[test]
    fn only_entries_before_the_cutoff_are_selected() {
        let filter = older_than(jiff::Timestamp::UNIX_EPOCH);
        let timestamp = filter.timestamp.expect("timestamp filter");
        assert_eq!(timestamp.lt, Some(jiff::Timestamp::UNIX_EPOCH));
        assert!(filter.action.is_none());
    }

    #[test]
    fn retention_defaults_to_a_year() {
        let config: Config = toml::from_str("run = true").expect("valid retention config");
        assert!(config.schedule.run);
        assert_eq!(config.retention, DAY * 365);
        assert_eq!(config.batch_size, 1000);
    }
}
