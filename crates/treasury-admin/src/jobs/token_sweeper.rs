use super::{Outcome, Schedule, Statistics};
use tokio_util::sync::CancellationToken;

#[derive(Clone, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(flatten)]
    pub schedule: Schedule,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_batch_size() -> i64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Token database error: {0}")]
    TokenDb(#[from] treasury_db::Error),
}

/// Removes tokens that have expired or been blacklisted.
pub struct Sweeper {
    store: treasury_db::Store,
    config: Config,
}

impl Sweeper {
    pub fn new(store: treasury_db::Store, config: Config) -> Self {
        Self { store, config }
    }

    #[tracing::instrument(skip(self, cancellation_token))]
    pub async fn sweep(&self, cancellation_token: CancellationToken) -> Result<Outcome, Error> {
        let now = jiff::Timestamp::now();
        let batch_size = self.config.batch_size.max(1);
        let mut stats = Statistics::default();
        loop {
            if cancellation_token.is_cancelled() {
                return Ok(Outcome::Canceled(stats));
            }
            let removed = self.store.token().delete_stale(now, batch_size).await?;
            stats.record_batch(removed);
            if is_last_batch(removed, batch_size) {
                return Ok(Outcome::Completed(stats));
            }
        }
    }
}

fn is_last_batch(removed: usize, batch_size: i64) -> bool {
    (removed as i64) < batch_size
}
