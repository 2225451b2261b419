//! Spied clients: forward every call and report it to the delegate.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlspy::{GenericClient, SpyConfig, SpyContext};
//! use tokio_postgres::NoTls;
//!
//! let ctx = SpyContext::from_config(SpyConfig::from_env()?);
//! let client = ctx
//!     .connect(async {
//!         let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
//!         tokio::spawn(connection);
//!         Ok::<_, tokio_postgres::Error>(client)
//!     })
//!     .await?;
//!
//! // Logged on `sqlspy.sqlonly` / `sqlspy.sqltiming` as
//! // `select * from users where id = 7`.
//! let rows = client.query("select * from users where id = $1", &[&7_i64]).await?;
//! ```

use crate::channel::{LogSink, TracingSink};
use crate::client::GenericClient;
use crate::config::SpyConfig;
use crate::delegate::{ChannelDelegate, SpyLogDelegate};
use crate::error::SpyResult;
use crate::event::{ClassType, SpyId};
use crate::registry::ConnectionRegistry;
use crate::table::ResultSetCollector;
use crate::value::{DefaultDialect, Dialect, SqlValue, dump_sql};
use std::error::Error;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

#[cfg(test)]
mod tests;

/// Everything a spied client needs, shared by all of them.
#[derive(Clone)]
pub struct SpyContext {
    delegate: Arc<dyn SpyLogDelegate>,
    registry: Arc<ConnectionRegistry>,
    dialect: Arc<dyn Dialect>,
}

impl SpyContext {
    pub fn new(
        delegate: Arc<dyn SpyLogDelegate>,
        registry: Arc<ConnectionRegistry>,
        dialect: Arc<dyn Dialect>,
    ) -> Self {
        Self {
            delegate,
            registry,
            dialect,
        }
    }

    /// A context logging through `tracing` with the default dialect.
    pub fn from_config(config: SpyConfig) -> Self {
        Self::with_sink(config, TracingSink)
    }

    /// A context writing to `sink` with the default dialect.
    pub fn with_sink<S: LogSink + 'static>(config: SpyConfig, sink: S) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dialect = Arc::new(DefaultDialect::new(config.boolean_as_true_false));
        let delegate = ChannelDelegate::new(config, sink, Arc::clone(&registry));
        Self::new(Arc::new(delegate), registry, dialect)
    }

    /// Use `dialect` to render parameters.
    pub fn with_dialect(mut self, dialect: impl Dialect + 'static) -> Self {
        self.dialect = Arc::new(dialect);
        self
    }

    pub fn delegate(&self) -> &Arc<dyn SpyLogDelegate> {
        &self.delegate
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Await `connect` and wrap the client it yields.
    ///
    /// A failure is reported against the data source and returned as is.
    /// When no spy channel is enabled the client is wrapped in pass-through
    /// mode: no number is issued and nothing is reported.
    pub async fn connect<C, E, F>(&self, connect: F) -> Result<SpyClient<C>, E>
    where
        C: GenericClient,
        E: Error + 'static,
        F: Future<Output = Result<C, E>>,
    {
        let started = Instant::now();
        match connect.await {
            Ok(client) => Ok(self.open(client, Some(elapsed_ms(started)))),
            Err(err) => {
                self.delegate.exception_occurred(
                    SpyId::data_source(),
                    "connect()",
                    &err,
                    None,
                    Some(elapsed_ms(started)),
                );
                Err(err)
            }
        }
    }

    /// Wrap a client that is already connected.
    pub fn wrap<C: GenericClient>(&self, client: C) -> SpyClient<C> {
        self.open(client, None)
    }

    /// Spy on `client` as part of connection `number` without owning it.
    ///
    /// Meant for transactions and other resources borrowed from a spied
    /// connection: they report under its number, and dropping them neither
    /// closes the connection nor reports it closed.
    pub fn attach<C: GenericClient>(&self, number: Option<u64>, client: C) -> SpyClient<C> {
        SpyClient {
            inner: client,
            ctx: self.clone(),
            number,
            owns_connection: false,
        }
    }

    fn open<C: GenericClient>(&self, client: C, exec_time_ms: Option<u64>) -> SpyClient<C> {
        if !self.delegate.is_logging_enabled() {
            return self.attach(None, client);
        }

        let number = self.registry.issue_number();
        self.registry.mark_open(number);
        let spy = SpyId::new(ClassType::Connection, Some(number));
        self.delegate
            .constructor_returned(spy, std::any::type_name::<C>());
        self.delegate.connection_opened(spy, exec_time_ms);

        SpyClient {
            inner: client,
            ctx: self.clone(),
            number: Some(number),
            owns_connection: true,
        }
    }
}

impl std::fmt::Debug for SpyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpyContext")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// One intercepted statement.
struct Call {
    method: &'static str,
    class_type: ClassType,
    sql: String,
}

/// A client whose every call is reported to the delegate.
///
/// Implements [`GenericClient`] itself, so it can be passed wherever the
/// wrapped client could.
pub struct SpyClient<C> {
    inner: C,
    ctx: SpyContext,
    number: Option<u64>,
    owns_connection: bool,
}

impl<C> SpyClient<C> {
    /// The connection number, `None` in pass-through mode.
    pub fn connection_number(&self) -> Option<u64> {
        self.number
    }

    /// Whether calls on this client are reported.
    pub fn is_spied(&self) -> bool {
        self.number.is_some()
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    pub fn context(&self) -> &SpyContext {
        &self.ctx
    }

    /// Close the connection and report it closed.
    pub fn close(mut self) {
        self.finish(false);
    }

    /// Drop the connection and report it aborted.
    pub fn abort(mut self) {
        self.finish(true);
    }

    fn finish(&mut self, aborted: bool) {
        if !std::mem::take(&mut self.owns_connection) {
            return;
        }
        let Some(number) = self.number else {
            return;
        };
        let spy = SpyId::new(ClassType::Connection, Some(number));
        if aborted {
            self.ctx.registry.mark_aborted(number);
            self.ctx.delegate.connection_aborted(spy, None);
        } else {
            self.ctx.registry.mark_closed(number);
            self.ctx.delegate.connection_closed(spy, None);
        }
    }

    fn spy(&self, class_type: ClassType) -> Option<SpyId> {
        self.number.map(|n| SpyId::new(class_type, Some(n)))
    }

    fn statement(&self, method: &'static str, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Call {
        let dialect = self.ctx.dialect();
        let formatted: Vec<String> = params.iter().map(|p| dialect.format_opaque(*p)).collect();
        Call {
            method,
            class_type: class_type_for(params.len()),
            sql: dump_sql(sql, &formatted),
        }
    }

    fn statement_with_values(&self, method: &'static str, sql: &str, values: &[SqlValue]) -> Call {
        let dialect = self.ctx.dialect();
        let formatted: Vec<String> = values.iter().map(|v| dialect.format_parameter(v)).collect();
        Call {
            method,
            class_type: class_type_for(values.len()),
            sql: dump_sql(sql, &formatted),
        }
    }

    /// Report `call` around `fut`: the SQL before, then timing and return
    /// value, or the failure.
    async fn observe<T, Fut, D>(&self, call: Option<Call>, fut: Fut, describe: D) -> SpyResult<T>
    where
        Fut: Future<Output = SpyResult<T>>,
        D: FnOnce(&T) -> String,
    {
        let Some(call) = call else {
            return fut.await;
        };
        let Some(spy) = self.spy(call.class_type) else {
            return fut.await;
        };

        let delegate = &self.ctx.delegate;
        delegate.sql_occurred(spy, call.method, &call.sql);

        let started = Instant::now();
        let result = fut.await;
        let elapsed = elapsed_ms(started);

        match &result {
            Ok(value) => {
                delegate.sql_timing_occurred(spy, elapsed, call.method, &call.sql);
                delegate.method_returned(spy, call.method, &describe(value));
            }
            Err(err) => {
                delegate.exception_occurred(spy, call.method, err, Some(&call.sql), Some(elapsed));
            }
        }
        result
    }

    /// Render returned rows on the result-set table channel.
    ///
    /// Column names are read from the rows, so an empty result renders no table.
    fn collect(&self, rows: &[Row]) {
        if self.number.is_none() || rows.is_empty() {
            return;
        }
        let delegate = &self.ctx.delegate;
        if !delegate.is_result_set_collection_enabled() {
            return;
        }
        let mut collector = ResultSetCollector::from_rows(rows);
        delegate.result_set_collected(&mut collector);
    }
}

impl<C: GenericClient> SpyClient<C> {
    /// Like [`GenericClient::query`], with parameters dumped as SQL literals.
    pub async fn query_values(&self, sql: &str, values: &[SqlValue]) -> SpyResult<Vec<Row>> {
        let call = self.is_spied().then(|| self.statement_with_values("query", sql, values));
        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        let rows = self
            .observe(call, self.inner.query(sql, &params), |rows| format!("{} rows", rows.len()))
            .await?;
        self.collect(&rows);
        Ok(rows)
    }

    /// Like [`GenericClient::execute`], with parameters dumped as SQL literals.
    pub async fn execute_values(&self, sql: &str, values: &[SqlValue]) -> SpyResult<u64> {
        let call = self.is_spied().then(|| self.statement_with_values("execute", sql, values));
        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        self.observe(call, self.inner.execute(sql, &params), u64::to_string)
            .await
    }
}

fn class_type_for(param_count: usize) -> ClassType {
    if param_count == 0 {
        ClassType::Statement
    } else {
        ClassType::PreparedStatement
    }
}

impl<C: GenericClient> GenericClient for SpyClient<C> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SpyResult<Vec<Row>> {
        let call = self.is_spied().then(|| self.statement("query", sql, params));
        let rows = self
            .observe(call, self.inner.query(sql, params), |rows| format!("{} rows", rows.len()))
            .await?;
        self.collect(&rows);
        Ok(rows)
    }

    async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SpyResult<Row> {
        let call = self.is_spied().then(|| self.statement("query_one", sql, params));
        let row = self
            .observe(call, self.inner.query_one(sql, params), |_| "1 row".to_string())
            .await?;
        self.collect(std::slice::from_ref(&row));
        Ok(row)
    }

    async fn query_opt(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SpyResult<Option<Row>> {
        let call = self.is_spied().then(|| self.statement("query_opt", sql, params));
        let row = self
            .observe(call, self.inner.query_opt(sql, params), |row| {
                if row.is_some() { "1 row" } else { "no row" }.to_string()
            })
            .await?;
        if let Some(row) = &row {
            self.collect(std::slice::from_ref(row));
        }
        Ok(row)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> SpyResult<u64> {
        let call = self.is_spied().then(|| self.statement("execute", sql, params));
        self.observe(call, self.inner.execute(sql, params), u64::to_string)
            .await
    }

    async fn batch_execute(&self, sql: &str) -> SpyResult<()> {
        let call = self.is_spied().then(|| self.statement("batch_execute", sql, &[]));
        self.observe(call, self.inner.batch_execute(sql), |_| "()".to_string())
            .await
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        self.inner.cancel_token()
    }
}

impl<C> Drop for SpyClient<C> {
    fn drop(&mut self) {
        self.finish(false);
    }
}

impl<C: std::fmt::Debug> std::fmt::Debug for SpyClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpyClient")
            .field("inner", &self.inner)
            .field("number", &self.number)
            .finish_non_exhaustive()
    }
}
