//! # sqlspy
//!
//! SQL spying for Postgres clients: wrap a client once and every statement it
//! runs is written to `tracing` with its parameters filled in, its timing,
//! and optionally the returned rows as a table.
//!
//! ## Channels
//!
//! Output goes to seven `tracing` targets, each switched on and off with the
//! usual level filters:
//!
//! - `sqlspy.sqlonly`: statements with parameters substituted
//! - `sqlspy.sqltiming`: statements with execution time, escalated to
//!   warn/error past the configured thresholds
//! - `sqlspy.audit`: every wrapped call and its return value
//! - `sqlspy.connection`: connections opened, closed and aborted
//! - `sqlspy.resultset`: result set calls
//! - `sqlspy.resultsettable`: returned rows rendered as a text table
//! - `sqlspy.debug`: internal diagnostics
//!
//! When none of the first five accepts errors, clients are wrapped in
//! pass-through mode and nothing is formatted.
//!
//! ## Usage
//!
//! ```ignore
//! use sqlspy::{GenericClient, SpyConfig, SpyContext};
//!
//! tracing_subscriber::fmt()
//!     .with_env_filter("sqlspy.sqltiming=info,sqlspy.connection=info")
//!     .init();
//!
//! let ctx = SpyContext::from_config(SpyConfig::from_env()?);
//! let client = ctx.wrap(client);
//!
//! // sqlspy.sqltiming: 1. executed in 3 ms | query
//! //                   [sqlspy] select * from users where id = 42
//! let rows = client.query("select * from users where id = $1", &[&42_i64]).await?;
//! ```
//!
//! ## Configuration
//!
//! [`SpyConfig`] is read from `sqlspy.*` properties, `SQLSPY_*` environment
//! variables, or a TOML document; see the [`config`] module.

pub mod channel;
pub mod client;
pub mod config;
pub mod delegate;
pub mod error;
pub mod event;
pub mod filter;
pub mod format;
pub mod intercept;
pub mod pipeline;
pub mod registry;
pub mod severity;
pub mod stack;
pub mod table;
pub mod value;

pub use channel::{Channel, Level, LogSink, MemorySink, Record, TracingSink};
pub use client::GenericClient;
pub use config::SpyConfig;
pub use delegate::{ChannelDelegate, GENERATED_KEYS_METHOD, SpyLogDelegate};
pub use error::{SpyError, SpyResult};
pub use event::{ClassType, SpyEvent, SpyId};
pub use filter::SqlFilter;
pub use format::{BasicFormatter, DdlFormatter, Highlighter, SqlFormatter};
pub use intercept::{SpyClient, SpyContext};
pub use pipeline::SqlPipeline;
pub use registry::{ConnectionRegistry, ConnectionState};
pub use severity::{Severity, Thresholds, select_severity};
pub use stack::{BacktraceSource, FixedStack, StackFrame, StackLocator, StackSource};
pub use table::{ResultSetCollector, render_table};
pub use value::{DefaultDialect, Dialect, SqlValue, dump_sql};

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::SpyPool;
