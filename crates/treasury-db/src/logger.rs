use crate::Error;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, time::Duration};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Query,
    Warn,
    Error,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEmit {
    #[default]
    Stdout,
    Event,
}

/// One `[[database.log]]` entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogDefinition {
    pub level: LogLevel,
    #[serde(default)]
    pub emit: LogEmit,
}

impl LogDefinition {
    pub fn stdout(level: LogLevel) -> Self {
        Self {
            level,
            emit: LogEmit::Stdout,
        }
    }

    pub fn event(level: LogLevel) -> Self {
        Self {
            level,
            emit: LogEmit::Event,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub timestamp: jiff::Timestamp,
    pub message: String,
    /// Set on `query` events only.
    #[serde(with = "humantime_serde")]
    pub duration: Option<Duration>,
    pub target: &'static str,
}

#[derive(Debug)]
pub struct Logger {
    stdout: BTreeSet<LogLevel>,
    events: BTreeSet<LogLevel>,
    sender: broadcast::Sender<LogEvent>,
}

impl Logger {
    pub fn new(definitions: &[LogDefinition]) -> Self {
        let mut stdout = BTreeSet::new();
        let mut events = BTreeSet::new();
        for definition in definitions {
            match definition.emit {
                LogEmit::Stdout => stdout.insert(definition.level),
                LogEmit::Event => events.insert(definition.level),
            };
        }
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            stdout,
            events,
            sender,
        }
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        self.stdout.contains(&level) || self.events.contains(&level)
    }

    /// Rendering a statement is only worth it when someone will see it.
    pub(crate) fn renders_queries(&self) -> bool {
        self.enabled(LogLevel::Query)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn query(&self, sql: Option<String>, elapsed: Duration) {
        let Some(sql) = sql else {
            return;
        };
        if self.stdout.contains(&LogLevel::Query) {
            tracing::debug!(target: "treasury_db::query", duration = ?elapsed, "{sql}");
        }
        self.publish(LogLevel::Query, "treasury_db::query", sql, Some(elapsed));
    }

    pub(crate) fn info(&self, message: impl Into<String>) {
        let message = message.into();
        if self.stdout.contains(&LogLevel::Info) {
            tracing::info!(target: "treasury_db", "{message}");
        }
        self.publish(LogLevel::Info, "treasury_db", message, None);
    }

    pub(crate) fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        if self.stdout.contains(&LogLevel::Warn) {
            tracing::warn!(target: "treasury_db", "{message}");
        }
        self.publish(LogLevel::Warn, "treasury_db", message, None);
    }

    /// Passes `err` through, reporting it at `error` level when it is an
    /// unknown request or initialization failure.
    pub(crate) fn failed(&self, err: Error) -> Error {
        if matches!(err, Error::UnknownRequest(_) | Error::Initialization(_)) {
            let message = err.to_string();
            if self.stdout.contains(&LogLevel::Error) {
                tracing::error!(target: "treasury_db", "{message}");
            }
            self.publish(LogLevel::Error, "treasury_db", message, None);
        }
        err
    }

    fn publish(
        &self,
        level: LogLevel,
        target: &'static str,
        message: String,
        duration: Option<Duration>,
    ) {
        if !self.events.contains(&level) {
            return;
        }
        // No receivers is not an error.
        self.sender
            .send(LogEvent {
                level,
                timestamp: jiff::Timestamp::now(),
                message,
                duration,
                target,
            })
            .ok();
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(&[])
    }
}
