//! Named log channels and the sinks that receive formatted text.
//!
//! Every channel can be enabled independently at four levels. The delegate
//! only ever talks to a [`LogSink`]; which backend finally receives the text
//! is the sink's business. [`TracingSink`] forwards to `tracing` (one target
//! per channel), [`MemorySink`] keeps records in memory.

use std::error::Error;
use std::fmt;
use std::sync::Mutex;

/// A named logging destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Every call on every wrapped resource except result cursors.
    Audit,
    /// Connection open/close/abort events.
    Connection,
    /// Calls made on result cursors.
    ResultSet,
    /// Collected result sets rendered as text tables.
    ResultSetTable,
    /// SQL text only, before execution.
    SqlOnly,
    /// SQL text with elapsed time, after execution.
    SqlTiming,
    /// Internal diagnostics of sqlspy itself.
    Debug,
}

impl Channel {
    /// All channels, in declaration order.
    pub const ALL: [Channel; 7] = [
        Channel::Audit,
        Channel::Connection,
        Channel::ResultSet,
        Channel::ResultSetTable,
        Channel::SqlOnly,
        Channel::SqlTiming,
        Channel::Debug,
    ];

    /// The `tracing` target this channel logs under.
    pub fn target(self) -> &'static str {
        match self {
            Channel::Audit => "sqlspy.audit",
            Channel::Connection => "sqlspy.connection",
            Channel::ResultSet => "sqlspy.resultset",
            Channel::ResultSetTable => "sqlspy.resultsettable",
            Channel::SqlOnly => "sqlspy.sqlonly",
            Channel::SqlTiming => "sqlspy.sqltiming",
            Channel::Debug => "sqlspy.debug",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target())
    }
}

/// Severity of a written message, from most to least severe.
///
/// The ordering follows verbosity: `Error < Warn < Info < Debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        };
        f.write_str(name)
    }
}

/// A snapshot of which levels a channel currently accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnabledLevels {
    pub error: bool,
    pub warn: bool,
    pub info: bool,
    pub debug: bool,
}

impl EnabledLevels {
    /// Probe all four levels of `channel` on `sink`.
    pub fn probe<S: LogSink + ?Sized>(sink: &S, channel: Channel) -> Self {
        Self {
            error: sink.is_enabled(channel, Level::Error),
            warn: sink.is_enabled(channel, Level::Warn),
            info: sink.is_enabled(channel, Level::Info),
            debug: sink.is_enabled(channel, Level::Debug),
        }
    }

    /// Every level up to and including `max` is enabled.
    pub fn up_to(max: Level) -> Self {
        Self {
            error: true,
            warn: max >= Level::Warn,
            info: max >= Level::Info,
            debug: max >= Level::Debug,
        }
    }

    /// Nothing is enabled.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Destination for formatted log text.
///
/// Implementations must write each call's `message` as one unit: concurrent
/// writers may interleave whole messages but never characters of them.
pub trait LogSink: Send + Sync {
    /// Whether `channel` currently accepts messages at `level`.
    fn is_enabled(&self, channel: Channel, level: Level) -> bool;

    /// Write one message, optionally carrying the error that caused it.
    fn write(
        &self,
        channel: Channel,
        level: Level,
        message: &str,
        error: Option<&(dyn Error + 'static)>,
    );
}

/// Expand `$inner!(target, ...)` with the literal target of `$channel`.
///
/// `tracing` callsites need constant targets, so the channel is matched here
/// instead of passing [`Channel::target`] through.
macro_rules! with_target {
    ($channel:expr, $inner:ident ! ( $($args:tt)* )) => {
        match $channel {
            Channel::Audit => $inner!("sqlspy.audit", $($args)*),
            Channel::Connection => $inner!("sqlspy.connection", $($args)*),
            Channel::ResultSet => $inner!("sqlspy.resultset", $($args)*),
            Channel::ResultSetTable => $inner!("sqlspy.resultsettable", $($args)*),
            Channel::SqlOnly => $inner!("sqlspy.sqlonly", $($args)*),
            Channel::SqlTiming => $inner!("sqlspy.sqltiming", $($args)*),
            Channel::Debug => $inner!("sqlspy.debug", $($args)*),
        }
    };
}

macro_rules! enabled_at_level {
    ($target:expr, $level:expr) => {
        match $level {
            Level::Error => tracing::enabled!(target: $target, tracing::Level::ERROR),
            Level::Warn => tracing::enabled!(target: $target, tracing::Level::WARN),
            Level::Info => tracing::enabled!(target: $target, tracing::Level::INFO),
            Level::Debug => tracing::enabled!(target: $target, tracing::Level::DEBUG),
        }
    };
}

macro_rules! emit_at_level {
    ($target:expr, $level:expr, $message:expr, $error:expr) => {
        match $level {
            Level::Error => tracing::error!(target: $target, error = $error, "{}", $message),
            Level::Warn => tracing::warn!(target: $target, error = $error, "{}", $message),
            Level::Info => tracing::info!(target: $target, error = $error, "{}", $message),
            Level::Debug => tracing::debug!(target: $target, error = $error, "{}", $message),
        }
    };
}

/// A sink that emits every message as a `tracing` event.
///
/// Channel enablement is whatever the installed subscriber says for the
/// channel's target, e.g. `RUST_LOG=sqlspy.sqltiming=info,sqlspy.connection=debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Create a new tracing sink.
    pub fn new() -> Self {
        Self
    }
}

impl LogSink for TracingSink {
    fn is_enabled(&self, channel: Channel, level: Level) -> bool {
        with_target!(channel, enabled_at_level!(level))
    }

    fn write(
        &self,
        channel: Channel,
        level: Level,
        message: &str,
        error: Option<&(dyn Error + 'static)>,
    ) {
        let error = error.map(tracing::field::display);
        with_target!(channel, emit_at_level!(level, message, error))
    }
}

/// One message captured by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub channel: Channel,
    pub level: Level,
    pub message: String,
    /// Display text of the attached error, if any.
    pub error: Option<String>,
}

/// An in-memory sink with per-channel level filters.
///
/// All channels start disabled; enable them with [`MemorySink::with_channel`]
/// or [`MemorySink::with_all`].
#[derive(Debug, Default)]
pub struct MemorySink {
    max_levels: [Option<Level>; 7],
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    /// Create a sink with every channel disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable `channel` at `max` and every more severe level.
    pub fn with_channel(mut self, channel: Channel, max: Level) -> Self {
        self.max_levels[channel.index()] = Some(max);
        self
    }

    /// Enable every channel at `max` and every more severe level.
    pub fn with_all(mut self, max: Level) -> Self {
        self.max_levels = [Some(max); 7];
        self
    }

    /// Snapshot of everything written so far.
    pub fn records(&self) -> Vec<Record> {
        self.lock().clone()
    }

    /// Remove and return everything written so far.
    pub fn take(&self) -> Vec<Record> {
        std::mem::take(&mut *self.lock())
    }

    /// Records written to one channel.
    pub fn channel_records(&self, channel: Channel) -> Vec<Record> {
        self.lock()
            .iter()
            .filter(|r| r.channel == channel)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LogSink for MemorySink {
    fn is_enabled(&self, channel: Channel, level: Level) -> bool {
        self.max_levels[channel.index()].is_some_and(|max| level <= max)
    }

    fn write(
        &self,
        channel: Channel,
        level: Level,
        message: &str,
        error: Option<&(dyn Error + 'static)>,
    ) {
        let record = Record {
            channel,
            level,
            message: message.to_string(),
            error: error.map(|e| e.to_string()),
        };
        self.lock().push(record);
    }
}

impl<S: LogSink + ?Sized> LogSink for std::sync::Arc<S> {
    fn is_enabled(&self, channel: Channel, level: Level) -> bool {
        (**self).is_enabled(channel, level)
    }

    fn write(
        &self,
        channel: Channel,
        level: Level,
        message: &str,
        error: Option<&(dyn Error + 'static)>,
    ) {
        (**self).write(channel, level, message, error)
    }
}
