//! Turning spy events into text on the log channels.
//!
//! [`SpyLogDelegate`] is the seam between the interception layer and the
//! logging side: spied clients report what happened, the delegate decides
//! whether and how it is written. [`ChannelDelegate`] is the standard
//! implementation; it writes to a [`LogSink`], by default [`TracingSink`].
//!
//! Which output appears is controlled entirely by channel levels:
//!
//! | channel | error | info | debug |
//! |---|---|---|---|
//! | `sqlspy.sqlonly` | failed statements | statements | statements with caller |
//! | `sqlspy.sqltiming` | slow/failed statements | timed statements | timed statements with caller |
//! | `sqlspy.audit` | failures | every call | every call with caller |
//! | `sqlspy.connection` | | open/close/abort | same, with caller and open list |
//! | `sqlspy.resultsettable` | | result tables | |

use crate::channel::{Channel, EnabledLevels, Level, LogSink, TracingSink};
use crate::config::SpyConfig;
use crate::event::{ClassType, SpyEvent, SpyId};
use crate::filter::SqlFilter;
use crate::pipeline::SqlPipeline;
use crate::registry::ConnectionRegistry;
use crate::severity::{Thresholds, select_severity};
use crate::stack::{BacktraceSource, StackLocator, StackSource};
use crate::table::{ResultSetCollector, render_table};
use std::error::Error;
use std::sync::Arc;


/// Method name prefix of generated-key retrieval, never timed.
pub const GENERATED_KEYS_METHOD: &str = "generated_keys";

/// Receives everything a spied resource reports.
///
/// Implementations must not panic and must not fail: they run inside the
/// application's database calls.
pub trait SpyLogDelegate: Send + Sync {
    /// Whether any of the audit, connection, result-set, sql-only or
    /// sql-timing channels accepts errors.
    fn is_logging_enabled(&self) -> bool;

    /// A wrapped call failed.
    fn exception_occurred(
        &self,
        spy: SpyId,
        method_call: &str,
        error: &(dyn Error + 'static),
        sql: Option<&str>,
        exec_time_ms: Option<u64>,
    );

    /// A wrapped call returned normally.
    fn method_returned(&self, spy: SpyId, method_call: &str, return_text: &str);

    /// A spy was created.
    fn constructor_returned(&self, spy: SpyId, info: &str);

    /// SQL is about to be executed.
    fn sql_occurred(&self, spy: SpyId, method_call: &str, sql: &str);

    /// SQL finished executing after `exec_time_ms`.
    fn sql_timing_occurred(&self, spy: SpyId, exec_time_ms: u64, method_call: &str, sql: &str);

    fn connection_opened(&self, spy: SpyId, exec_time_ms: Option<u64>);

    fn connection_closed(&self, spy: SpyId, exec_time_ms: Option<u64>);

    fn connection_aborted(&self, spy: SpyId, exec_time_ms: Option<u64>);

    /// Whether result rows should be collected at all.
    fn is_result_set_collection_enabled(&self) -> bool;

    /// Whether values the application never read should be filled in too.
    fn is_result_set_collection_enabled_with_unread_value_fill_in(&self) -> bool;

    /// A result set was read to its end.
    fn result_set_collected(&self, collector: &mut ResultSetCollector);

    /// Internal diagnostics.
    fn debug(&self, msg: &str);

    /// Route `event` to the matching method.
    fn handle(&self, event: SpyEvent<'_>) {
        match event {
            SpyEvent::ExceptionOccurred {
                spy,
                method_call,
                error,
                sql,
                exec_time_ms,
            } => self.exception_occurred(spy, method_call, error, sql, exec_time_ms),
            SpyEvent::MethodReturned {
                spy,
                method_call,
                return_text,
            } => self.method_returned(spy, method_call, return_text),
            SpyEvent::ConstructorReturned { spy, info } => self.constructor_returned(spy, info),
            SpyEvent::SqlOccurred {
                spy,
                method_call,
                sql,
            } => self.sql_occurred(spy, method_call, sql),
            SpyEvent::SqlTimingOccurred {
                spy,
                exec_time_ms,
                method_call,
                sql,
            } => self.sql_timing_occurred(spy, exec_time_ms, method_call, sql),
            SpyEvent::ConnectionOpened { spy, exec_time_ms } => {
                self.connection_opened(spy, exec_time_ms)
            }
            SpyEvent::ConnectionClosed { spy, exec_time_ms } => {
                self.connection_closed(spy, exec_time_ms)
            }
            SpyEvent::ConnectionAborted { spy, exec_time_ms } => {
                self.connection_aborted(spy, exec_time_ms)
            }
            SpyEvent::ResultSetCollected { collector } => self.result_set_collected(collector),
        }
    }
}

/// The standard delegate: formats events and writes them to channels.
pub struct ChannelDelegate<S = TracingSink> {
    config: Arc<SpyConfig>,
    sink: S,
    registry: Arc<ConnectionRegistry>,
    stack: Arc<dyn StackSource>,
    pipeline: SqlPipeline,
    filter: SqlFilter,
    thresholds: Thresholds,
    locator: StackLocator,
}

impl ChannelDelegate<TracingSink> {
    /// A delegate writing to `tracing`, with its own registry.
    pub fn tracing(config: SpyConfig) -> Self {
        Self::new(config, TracingSink, Arc::new(ConnectionRegistry::new()))
    }
}

impl<S: LogSink> ChannelDelegate<S> {
    /// Create a delegate writing to `sink`.
    ///
    /// `registry` is only read, to list open connections in debug output.
    /// Call stacks are captured with [`BacktraceSource`].
    pub fn new(config: SpyConfig, sink: S, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            pipeline: SqlPipeline::from_config(&config),
            filter: config.filter(),
            thresholds: config.thresholds(),
            locator: config.locator(),
            config: Arc::new(config),
            sink,
            registry,
            stack: Arc::new(BacktraceSource),
        }
    }

    /// Replace the call stack source.
    pub fn with_stack_source(mut self, source: impl StackSource + 'static) -> Self {
        self.stack = Arc::new(source);
        self
    }

    pub fn config(&self) -> &SpyConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    fn debug_info(&self) -> String {
        self.locator.locate(&self.stack.frames())
    }

    fn process_sql(&self, sql: &str) -> String {
        self.pipeline.process(Some(sql)).unwrap_or_default()
    }

    fn enabled(&self, channel: Channel, level: Level) -> bool {
        self.sink.is_enabled(channel, level)
    }

    fn write(&self, channel: Channel, level: Level, message: &str) {
        if self.enabled(channel, level) {
            self.sink.write(channel, level, message, None);
        }
    }

    fn write_error(&self, channel: Channel, message: &str, error: &(dyn Error + 'static)) {
        if self.enabled(channel, Level::Error) {
            self.sink.write(channel, Level::Error, message, Some(error));
        }
    }

    fn connection_event(&self, spy: SpyId, what: &str) {
        let channel = Channel::Connection;
        if self.enabled(channel, Level::Debug) {
            let message = format!("{}. Connection {what} {}", spy.number(), self.debug_info());
            self.write(channel, Level::Info, &message);
            self.write(channel, Level::Debug, &self.registry.dump());
        } else {
            self.write(channel, Level::Info, &format!("{}. Connection {what}", spy.number()));
        }
    }
}

impl<S: LogSink> SpyLogDelegate for ChannelDelegate<S> {
    fn is_logging_enabled(&self) -> bool {
        [
            Channel::Audit,
            Channel::Connection,
            Channel::ResultSet,
            Channel::SqlOnly,
            Channel::SqlTiming,
        ]
        .into_iter()
        .any(|channel| self.enabled(channel, Level::Error))
    }

    fn exception_occurred(
        &self,
        spy: SpyId,
        method_call: &str,
        error: &(dyn Error + 'static),
        sql: Option<&str>,
        exec_time_ms: Option<u64>,
    ) {
        let conn = spy.number();
        let header = format!("{conn}. {}.{method_call}", spy.class_type);

        let Some(sql) = sql else {
            for channel in [Channel::Audit, Channel::SqlOnly, Channel::SqlTiming] {
                self.write_error(channel, &header, error);
            }
            return;
        };

        let sql = self.process_sql(sql);
        let elapsed = exec_time_ms.map_or_else(|| "-1".to_string(), |t| t.to_string());
        let only_debug = self.enabled(Channel::SqlOnly, Level::Debug);
        let timing_debug = self.enabled(Channel::SqlTiming, Level::Debug);
        let info = if only_debug || timing_debug {
            self.debug_info()
        } else {
            String::new()
        };

        self.write_error(Channel::Audit, &format!("{header} {sql}"), error);

        let message = if only_debug {
            format!("{info}\n{conn}. {sql}")
        } else {
            format!("{header} {sql}")
        };
        self.write_error(Channel::SqlOnly, &message, error);

        let message = if timing_debug {
            format!("{info}\n{conn}. {sql} {{FAILED after {elapsed} msec}}")
        } else {
            format!("{header} FAILED! {sql} {{FAILED after {elapsed} msec}}")
        };
        self.write_error(Channel::SqlTiming, &message, error);
    }

    fn method_returned(&self, spy: SpyId, method_call: &str, return_text: &str) {
        let channel = if spy.class_type == ClassType::ResultSet {
            Channel::ResultSet
        } else {
            Channel::Audit
        };
        if !self.enabled(channel, Level::Info) {
            return;
        }

        let header = format!(
            "{}. {}.{method_call} returned {return_text}",
            spy.number(),
            spy.class_type
        );
        if self.enabled(channel, Level::Debug) {
            self.write(channel, Level::Debug, &format!("{header} {}", self.debug_info()));
        } else {
            self.write(channel, Level::Info, &header);
        }
    }

    fn constructor_returned(&self, spy: SpyId, info: &str) {
        if self.enabled(Channel::Audit, Level::Debug) {
            let message = format!("{}. {} created {info}", spy.number(), spy.class_type);
            self.write(Channel::Audit, Level::Debug, &message);
        }
    }

    fn sql_occurred(&self, spy: SpyId, _method_call: &str, sql: &str) {
        if !self.filter.passes(Some(sql)) {
            return;
        }
        let channel = Channel::SqlOnly;
        if self.enabled(channel, Level::Debug) {
            let message = format!(
                "{}\n{}. {}",
                self.debug_info(),
                spy.number(),
                self.process_sql(sql)
            );
            self.write(channel, Level::Debug, &message);
        } else if self.enabled(channel, Level::Info) {
            self.write(channel, Level::Info, &self.process_sql(sql));
        }
    }

    fn sql_timing_occurred(&self, spy: SpyId, exec_time_ms: u64, method_call: &str, sql: &str) {
        let channel = Channel::SqlTiming;
        if method_call.starts_with(GENERATED_KEYS_METHOD) || !self.filter.passes(Some(sql)) {
            return;
        }

        let enabled = EnabledLevels::probe(&self.sink, channel);
        let Some(level) = select_severity(exec_time_ms, &self.thresholds, enabled).level() else {
            return;
        };

        let mut message = format!(
            "{}. executed in {exec_time_ms} ms | {method_call}",
            spy.number()
        );
        if enabled.debug {
            message.push_str(" |");
            message.push_str(&self.debug_info());
        }
        message.push('\n');
        message.push_str(&self.process_sql(sql));

        self.write(channel, level, &message);
    }

    fn connection_opened(&self, spy: SpyId, _exec_time_ms: Option<u64>) {
        self.connection_event(spy, "opened");
    }

    fn connection_closed(&self, spy: SpyId, _exec_time_ms: Option<u64>) {
        self.connection_event(spy, "closed");
    }

    fn connection_aborted(&self, spy: SpyId, _exec_time_ms: Option<u64>) {
        self.connection_event(spy, "aborted");
    }

    fn is_result_set_collection_enabled(&self) -> bool {
        self.enabled(Channel::ResultSetTable, Level::Info)
    }

    fn is_result_set_collection_enabled_with_unread_value_fill_in(&self) -> bool {
        self.enabled(Channel::ResultSetTable, Level::Debug)
    }

    fn result_set_collected(&self, collector: &mut ResultSetCollector) {
        let table = render_table(collector);
        self.write(Channel::ResultSetTable, Level::Info, &table);
    }

    fn debug(&self, msg: &str) {
        self.write(Channel::Debug, Level::Debug, msg);
    }
}

impl<D: SpyLogDelegate + ?Sized> SpyLogDelegate for Arc<D> {
    fn is_logging_enabled(&self) -> bool {
        (**self).is_logging_enabled()
    }

    fn exception_occurred(
        &self,
        spy: SpyId,
        method_call: &str,
        error: &(dyn Error + 'static),
        sql: Option<&str>,
        exec_time_ms: Option<u64>,
    ) {
        (**self).exception_occurred(spy, method_call, error, sql, exec_time_ms)
    }

    fn method_returned(&self, spy: SpyId, method_call: &str, return_text: &str) {
        (**self).method_returned(spy, method_call, return_text)
    }

    fn constructor_returned(&self, spy: SpyId, info: &str) {
        (**self).constructor_returned(spy, info)
    }

    fn sql_occurred(&self, spy: SpyId, method_call: &str, sql: &str) {
        (**self).sql_occurred(spy, method_call, sql)
    }

    fn sql_timing_occurred(&self, spy: SpyId, exec_time_ms: u64, method_call: &str, sql: &str) {
        (**self).sql_timing_occurred(spy, exec_time_ms, method_call, sql)
    }

    fn connection_opened(&self, spy: SpyId, exec_time_ms: Option<u64>) {
        (**self).connection_opened(spy, exec_time_ms)
    }

    fn connection_closed(&self, spy: SpyId, exec_time_ms: Option<u64>) {
        (**self).connection_closed(spy, exec_time_ms)
    }

    fn connection_aborted(&self, spy: SpyId, exec_time_ms: Option<u64>) {
        (**self).connection_aborted(spy, exec_time_ms)
    }

    fn is_result_set_collection_enabled(&self) -> bool {
        (**self).is_result_set_collection_enabled()
    }

    fn is_result_set_collection_enabled_with_unread_value_fill_in(&self) -> bool {
        (**self).is_result_set_collection_enabled_with_unread_value_fill_in()
    }

    fn result_set_collected(&self, collector: &mut ResultSetCollector) {
        (**self).result_set_collected(collector)
    }

    fn debug(&self, msg: &str) {
        (**self).debug(msg)
    }
}
