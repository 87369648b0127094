use diesel_async::{
    pooled_connection::{
        mobc::{Builder, Pool},
        AsyncDieselConnectionManager,
    },
    AsyncPgConnection,
};
use std::{sync::Arc, time::Duration};

pub mod aggregate;
#[macro_use]
mod delegate;
pub mod entities;
pub mod error;
pub mod filter;
pub mod logger;
pub mod models;
pub mod query;
pub mod raw;
mod schema;
pub mod settings;
mod sql_functions;
#[cfg(test)]
mod tests;
pub mod transaction;
pub mod value;

pub use diesel_async::scoped_futures::{ScopedBoxFuture, ScopedFutureExt};
pub use entities::*;
pub use error::{Error, KnownErrorKind, KnownRequestError};
pub use logger::{LogDefinition, LogEmit, LogEvent, LogLevel};
pub use transaction::{IsolationLevel, Transaction, TransactionOptions};

/// Handle on the treasury database. Cheap to clone; clones share the pool,
/// the logger and the settings cache.
#[derive(Clone, Debug)]
pub struct Store {
    pool: Pool<AsyncPgConnection>,
    log: Arc<logger::Logger>,
    settings: Arc<settings::Settings>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    db_url: String,
    max_open: u64,
    max_idle: u64,
    #[serde(with = "humantime_serde", default)]
    max_lifetime: Option<Duration>,
    #[serde(with = "humantime_serde", default)]
    max_idle_lifetime: Option<Duration>,
    #[serde(with = "humantime_serde")]
    timeout_for_get: Duration,
    #[serde(default)]
    log: Vec<LogDefinition>,
}

impl Config {
    pub fn from_url(db_url: impl Into<String>) -> Self {
        Self {
            db_url: db_url.into(),
            max_open: 10,
            max_idle: 2,
            max_lifetime: None,
            max_idle_lifetime: None,
            timeout_for_get: Duration::from_secs(5),
            log: Vec::new(),
        }
    }

    pub fn with_log(mut self, log: Vec<LogDefinition>) -> Self {
        self.log = log;
        self
    }

    /// Replaces the database URL with `TREASURY_DATABASE_URL` or, failing
    /// that, `DATABASE_URL` when either is set (a `.env` file counts).
    pub fn apply_env(&mut self) {
        dotenvy::dotenv().ok();
        if let Ok(db_url) =
            std::env::var("TREASURY_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL"))
        {
            self.db_url = db_url;
        }
    }
}

pub async fn create(config: &Config) -> Result<Store, Error> {
    let store = Store {
        pool: create_pool(config),
        log: Arc::new(logger::Logger::new(&config.log)),
        settings: Arc::new(settings::Settings::new()),
    };
    store.reload_settings().await.map_err(|err| {
        store
            .log
            .failed(Error::Initialization(format!("loading system settings: {err}")))
    })?;
    store.log.info(format!(
        "store ready with {} system settings",
        store.settings.snapshot().len()
    ));
    Ok(store)
}

fn create_pool(config: &Config) -> mobc::Pool<AsyncDieselConnectionManager<AsyncPgConnection>> {
    let builder = Builder::new()
        .max_open(config.max_open)
        .max_idle(config.max_idle)
        .max_lifetime(
            config
                .max_lifetime
                .map(|v| v.max(Duration::from_secs(3600))),
        )
        .max_idle_lifetime(
            config
                .max_idle_lifetime
                .map(|v| v.max(Duration::from_secs(900))),
        )
        .get_timeout(Some(config.timeout_for_get.max(Duration::from_secs(5))));
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&config.db_url);
    builder.build(manager)
}

impl Store {
    pub(crate) async fn connection(
        &self,
    ) -> Result<mobc::Connection<AsyncDieselConnectionManager<AsyncPgConnection>>, Error> {
        self.pool.get().await.map_err(Into::into)
    }

    /// Cached `SystemConfig` values, as of the last reload or `set`.
    pub fn settings(&self) -> &settings::Settings {
        &self.settings
    }

    #[tracing::instrument(skip(self))]
    pub async fn reload_settings(&self) -> Result<(), Error> {
        let rows = self.system_config().find_many(Default::default()).await?;
        self.settings.populate(rows);
        Ok(())
    }

    /// Receives every log event configured with `emit = "event"`.
    pub fn subscribe_logs(&self) -> tokio::sync::broadcast::Receiver<LogEvent> {
        self.log.subscribe()
    }
}
