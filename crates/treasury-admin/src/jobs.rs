use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

mod audit_retention;
mod token_sweeper;

pub fn create(config: Config, store: treasury_db::Store) -> Jobs {
    Jobs {
        config: Arc::new(config),
        store,
    }
}

pub struct Jobs {
    config: Arc<Config>,
    store: treasury_db::Store,
}

impl Jobs {
    /// Runs every job until `cancellation_token` is cancelled.
    pub async fn run(&self, cancellation_token: CancellationToken) {
        tokio::join!(
            self.run_token_sweeper(cancellation_token.clone()),
            self.run_audit_retention(cancellation_token),
        );
    }

    #[tracing::instrument(skip_all)]
    async fn run_token_sweeper(&self, cancellation_token: CancellationToken) {
        let sweeper =
            token_sweeper::Sweeper::new(self.store.clone(), self.config.token_sweeper.clone());
        supervise(
            "token sweeper",
            &self.config.token_sweeper.schedule,
            &cancellation_token,
            || sweeper.sweep(cancellation_token.clone()),
        )
        .await
    }

    #[tracing::instrument(skip_all)]
    async fn run_audit_retention(&self, cancellation_token: CancellationToken) {
        let pruner =
            audit_retention::Pruner::new(self.store.clone(), self.config.audit_retention.clone());
        supervise(
            "audit retention",
            &self.config.audit_retention.schedule,
            &cancellation_token,
            || pruner.prune(cancellation_token.clone()),
        )
        .await
    }
}

/// Repeats `pass` per `schedule`: straight away while passes keep finding
/// work, after `sleep` once one finds none and after `error-sleep` when one
/// fails.
async fn supervise<F, Fut, E>(
    job: &'static str,
    schedule: &Schedule,
    cancellation_token: &CancellationToken,
    mut pass: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Outcome, E>>,
    E: std::fmt::Debug,
{
    loop {
        if schedule.run {
            match pass().await {
                Ok(Outcome::Completed(stats)) => {
                    tracing::info!("{job} statistics: {stats:?}");
                    if stats.removed == 0 {
                        pause(cancellation_token, schedule.sleep).await;
                    }
                }
                Ok(Outcome::Canceled(stats)) => {
                    tracing::info!("{job} statistics: {stats:?}");
                    break;
                }
                Err(err) => {
                    tracing::error!("{job} error: {err:?}");
                    pause(cancellation_token, schedule.error_sleep).await;
                }
            }
        } else {
            pause(cancellation_token, schedule.error_sleep).await;
        }
        if cancellation_token.is_cancelled() {
            break;
        }
    }
}

async fn pause(cancellation_token: &CancellationToken, duration: Duration) {
    tokio::select! {
        _ = cancellation_token.cancelled() => (),
        _ = sleep(duration) => ()
    }
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Schedule {
    pub run: bool,
    #[serde(with = "humantime_serde")]
    pub sleep: Duration,
    #[serde(with = "humantime_serde")]
    pub error_sleep: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            run: false,
            sleep: Duration::from_secs(5 * 60),
            error_sleep: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub token_sweeper: token_sweeper::Config,
    #[serde(default)]
    pub audit_retention: audit_retention::Config,
}

pub enum Outcome {
    Completed(Statistics),
    Canceled(Statistics),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub(super) batches: usize,
    pub(super) removed: usize,
}

impl Statistics {
    fn record_batch(&mut self, removed: usize) {
        self.batches += 1;
        self.removed += removed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn schedule() -> Schedule {
        Schedule {
            run: true,
            sleep: Duration::from_secs(3600),
            error_sleep: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn supervise_repeats_busy_passes_and_stops_when_canceled() {
        let cancellation_token = CancellationToken::new();
        let passes = AtomicUsize::new(0);
        let counter = &passes;
        supervise("test", &schedule(), &cancellation_token, move || async move {
            let pass = counter.fetch_add(1, Ordering::SeqCst);
            let mut stats = Statistics::default();
            stats.record_batch(10);
            if pass < 2 {
                Ok::<_, ()>(Outcome::Completed(stats))
            } else {
                Ok(Outcome::Canceled(stats))
            }
        })
        .await;
        assert_eq!(passes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn idle_and_failing_passes_wake_up_on_cancellation() {
        let cancellation_token = CancellationToken::new();
        let passes = AtomicUsize::new(0);
        let canceller = cancellation_token.clone();
        tokio::time::timeout(
            Duration::from_secs(5),
            supervise("test", &schedule(), &cancellation_token, || {
                passes.fetch_add(1, Ordering::SeqCst);
                canceller.cancel();
                async { Err::<Outcome, _>("database unavailable") }
            }),
        )
        .await
        .expect("supervise stops once canceled");
        assert_eq!(passes.load(Ordering::SeqCst), 1);

        let idle = CancellationToken::new();
        idle.cancel();
        let disabled = Schedule::default();
        tokio::time::timeout(
            Duration::from_secs(5),
            supervise("test", &disabled, &idle, || async {
                Ok::<_, ()>(Outcome::Completed(Statistics::default()))
            }),
        )
        .await
        .expect("disabled jobs stop once canceled");
    }

    #[test]
    fn jobs_default_to_not_running() {
        let config: Config = toml::from_str("").expect("empty jobs config");
        assert!(!config.token_sweeper.schedule.run);
        assert!(!config.audit_retention.schedule.run);
        assert_eq!(config.token_sweeper.schedule, Schedule::default());
    }
}
