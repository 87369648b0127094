use crate::{logger::Logger, Error, KnownErrorKind, Store};
use diesel_async::{scoped_futures::ScopedBoxFuture, AsyncPgConnection};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionOptions {
    /// Database default when unset.
    pub isolation_level: Option<IsolationLevel>,
    /// Longest wait for a pooled connection before giving up.
    #[serde(with = "humantime_serde")]
    pub max_wait: Duration,
    /// Longest the whole transaction may run before it is rolled back.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            isolation_level: None,
            max_wait: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
        }
    }
}

impl TransactionOptions {
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An open transaction. Delegates taken from it run on its connection and
/// commit or roll back with it.
pub struct Transaction<'r> {
    pub(crate) conn: &'r mut AsyncPgConnection,
    pub(crate) log: Arc<Logger>,
    /// Set by writes to `SystemConfig`; the settings cache is reloaded once
    /// the transaction commits.
    pub(crate) settings_changed: Arc<AtomicBool>,
}

impl Store {
    /// Runs `callback` inside one database transaction, committing when it
    /// returns `Ok` and rolling back otherwise. Settings written through
    /// `tx.system_config().set(..)` reach [`Store::settings`] after commit.
    ///
    /// ```ignore
    /// let (user, token) = store
    ///     .transaction(TransactionOptions::default(), |mut tx| {
    ///         async move {
    ///             let user = tx.user().create(user).await?;
    ///             let token = tx.token().create(token_for(&user)).await?;
    ///             Ok((user, token))
    ///         }
    ///         .scope_boxed()
    ///     })
    ///     .await?;
    /// ```
    #[tracing::instrument(skip_all, fields(isolation_level = ?options.isolation_level))]
    pub async fn transaction<'a, R, F>(&'a self, options: TransactionOptions, callback: F) -> Result<R, Error>
    where
        F: for<'r> FnOnce(Transaction<'r>) -> ScopedBoxFuture<'a, 'r, Result<R, Error>> + Send + 'a,
        R: Send + 'a,
    {
        let mut conn = match tokio::time::timeout(options.max_wait, self.connection()).await {
            Ok(conn) => conn.map_err(|err| self.log.failed(err))?,
            Err(_) => {
                return Err(Error::known(
                    KnownErrorKind::TransactionApi,
                    None,
                    format!(
                        "unable to start a transaction within {}",
                        humantime::format_duration(options.max_wait)
                    ),
                ))
            }
        };
        let log = Arc::clone(&self.log);
        let settings_changed = Arc::new(AtomicBool::new(false));
        let changed = Arc::clone(&settings_changed);
        let mut builder = conn.build_transaction();
        builder = match options.isolation_level {
            Some(IsolationLevel::ReadCommitted) => builder.read_committed(),
            Some(IsolationLevel::RepeatableRead) => builder.repeatable_read(),
            Some(IsolationLevel::Serializable) => builder.serializable(),
            None => builder,
        };
        let run = builder.run(move |conn| {
            callback(Transaction {
                conn,
                log,
                settings_changed,
            })
        });
        let outcome = tokio::time::timeout(options.timeout, run).await;
        match outcome {
            Ok(Ok(committed)) => {
                drop(conn);
                if changed.load(Ordering::Acquire) {
                    if let Err(err) = self.reload_settings().await {
                        self.log
                            .warn(format!("settings cache is stale after commit: {err}"));
                    }
                }
                Ok(committed)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                // The transaction is still open on the server. Closing the
                // connection instead of returning it to the pool aborts it.
                drop(conn.into_inner());
                self.log.warn(format!(
                    "transaction rolled back after exceeding its timeout of {}",
                    humantime::format_duration(options.timeout)
                ));
                Err(Error::known(
                    KnownErrorKind::TransactionApi,
                    None,
                    "transaction already closed: the timeout for this transaction was exceeded",
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bound_waiting_and_running() {
        let options = TransactionOptions::default();
        assert_eq!(options.max_wait, Duration::from_secs(2));
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.isolation_level, None);
        let options = options
            .max_wait(Duration::from_millis(50))
            .timeout(Duration::from_secs(1))
            .isolation_level(IsolationLevel::RepeatableRead);
        assert_eq!(options.max_wait, Duration::from_millis(50));
        assert_eq!(options.timeout, Duration::from_secs(1));
    }

    #[test]
    fn options_read_human_durations() {
        let options: TransactionOptions = serde_json::from_value(serde_json::json!({
            "isolationLevel": "Serializable",
            "maxWait": "500ms",
        }))
        .expect("valid options");
        assert_eq!(options.isolation_level, Some(IsolationLevel::Serializable));
        assert_eq!(options.max_wait, Duration::from_millis(500));
        assert_eq!(options.timeout, Duration::from_secs(5));
    }
}
