use super::*;
use crate::channel::{Channel, Level, MemorySink};
use crate::error::SpyError;
use std::sync::Mutex;

// ── Shared DummyClient for tests ──

#[derive(Default)]
struct DummyClient {
    calls: Mutex<Vec<String>>,
}

impl DummyClient {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, sql: &str) {
        self.calls.lock().unwrap().push(sql.to_string());
    }
}

impl GenericClient for DummyClient {
    async fn query(&self, sql: &str, _: &[&(dyn ToSql + Sync)]) -> SpyResult<Vec<Row>> {
        self.record(sql);
        Ok(vec![])
    }
    async fn query_one(&self, sql: &str, _: &[&(dyn ToSql + Sync)]) -> SpyResult<Row> {
        self.record(sql);
        Err(SpyError::not_found("no rows"))
    }
    async fn query_opt(&self, sql: &str, _: &[&(dyn ToSql + Sync)]) -> SpyResult<Option<Row>> {
        self.record(sql);
        Ok(None)
    }
    async fn execute(&self, sql: &str, _: &[&(dyn ToSql + Sync)]) -> SpyResult<u64> {
        self.record(sql);
        if sql.contains("missing") {
            Err(SpyError::Other("relation \"missing\" does not exist".to_string()))
        } else {
            Ok(3)
        }
    }
}

#[derive(Debug)]
struct Refused;

impl std::fmt::Display for Refused {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("connection refused")
    }
}

impl Error for Refused {}

fn context(sink: &Arc<MemorySink>) -> SpyContext {
    SpyContext::with_sink(SpyConfig::raw(), Arc::clone(sink))
}

async fn connected(ctx: &SpyContext) -> SpyClient<DummyClient> {
    ctx.connect(async { Ok::<_, Refused>(DummyClient::default()) })
        .await
        .unwrap()
}

fn messages(sink: &MemorySink, channel: Channel) -> Vec<String> {
    sink.channel_records(channel)
        .into_iter()
        .map(|r| r.message)
        .collect()
}

// ── Connection lifecycle ──

#[tokio::test]
async fn test_connect_issues_number_and_reports_open() {
    let sink = Arc::new(MemorySink::new().with_channel(Channel::Connection, Level::Info));
    let ctx = context(&sink);

    let client = connected(&ctx).await;
    assert_eq!(client.connection_number(), Some(1));
    assert!(client.is_spied());
    assert_eq!(ctx.registry().open_connections(), vec![1]);
    assert_eq!(messages(&sink, Channel::Connection), vec!["1. Connection opened"]);

    let second = connected(&ctx).await;
    assert_eq!(second.connection_number(), Some(2));
}

#[tokio::test]
async fn test_drop_reports_close() {
    let sink = Arc::new(MemorySink::new().with_channel(Channel::Connection, Level::Info));
    let ctx = context(&sink);

    let client = connected(&ctx).await;
    drop(client);

    assert!(ctx.registry().open_connections().is_empty());
    assert_eq!(
        messages(&sink, Channel::Connection),
        vec!["1. Connection opened", "1. Connection closed"]
    );
}

#[tokio::test]
async fn test_close_and_abort_report_once() {
    let sink = Arc::new(MemorySink::new().with_channel(Channel::Connection, Level::Info));
    let ctx = context(&sink);

    let first = connected(&ctx).await;
    let second = connected(&ctx).await;
    first.close();
    second.abort();

    assert_eq!(
        messages(&sink, Channel::Connection),
        vec![
            "1. Connection opened",
            "2. Connection opened",
            "1. Connection closed",
            "2. Connection aborted",
        ]
    );
    assert_eq!(
        ctx.registry().state(2),
        Some(crate::registry::ConnectionState::Aborted)
    );
    assert_eq!(
        ctx.registry().state(1),
        Some(crate::registry::ConnectionState::Closed)
    );
    assert_eq!(ctx.registry().tracked(), 1);
}

#[tokio::test]
async fn test_connect_failure_is_reported_and_returned() {
    let sink = Arc::new(MemorySink::new().with_channel(Channel::Audit, Level::Info));
    let ctx = context(&sink);

    let result = ctx
        .connect(async { Err::<DummyClient, _>(Refused) })
        .await;
    let err = result.err().expect("connect should fail");
    assert_eq!(err.to_string(), "connection refused");

    let audit = sink.channel_records(Channel::Audit);
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].level, Level::Error);
    assert_eq!(audit[0].message, "-. DataSource.connect()");
    assert_eq!(audit[0].error.as_deref(), Some("connection refused"));
    assert!(ctx.registry().open_connections().is_empty());
}

#[tokio::test]
async fn test_disabled_logging_passes_through() {
    let sink = Arc::new(MemorySink::new().with_channel(Channel::ResultSetTable, Level::Info));
    let ctx = context(&sink);

    let client = connected(&ctx).await;
    assert!(!client.is_spied());
    assert_eq!(client.connection_number(), None);

    client.execute("update t set x = 1", &[]).await.unwrap();
    drop(client);

    assert!(sink.records().is_empty());
    assert!(ctx.registry().open_connections().is_empty());
    // No number was ever issued.
    assert_eq!(ctx.registry().issue_number(), 1);
}

#[tokio::test]
async fn test_attached_clients_do_not_close_the_connection() {
    let sink = Arc::new(MemorySink::new().with_all(Level::Info));
    let ctx = context(&sink);

    let client = connected(&ctx).await;
    let attached = ctx.attach(client.connection_number(), DummyClient::default());
    attached.execute("delete from t", &[]).await.unwrap();
    drop(attached);

    assert_eq!(ctx.registry().open_connections(), vec![1]);
    assert_eq!(messages(&sink, Channel::SqlOnly), vec!["[sqlspy] delete from t"]);
    assert_eq!(
        messages(&sink, Channel::Audit),
        vec!["1. Statement.execute returned 3"]
    );
    drop(client);
}

// ── Statements ──

#[tokio::test]
async fn test_execute_reports_sql_timing_and_return() {
    let sink = Arc::new(MemorySink::new().with_all(Level::Info));
    let ctx = context(&sink);
    let client = connected(&ctx).await;

    let affected = client.execute("update t set x = $1", &[&5_i32]).await.unwrap();
    assert_eq!(affected, 3);
    assert_eq!(client.inner().calls(), vec!["update t set x = $1"]);

    assert_eq!(
        messages(&sink, Channel::SqlOnly),
        vec!["[sqlspy] update t set x = 5"]
    );

    let timing = messages(&sink, Channel::SqlTiming);
    assert_eq!(timing.len(), 1);
    assert!(timing[0].starts_with("1. executed in "));
    assert!(timing[0].ends_with(" ms | execute\n[sqlspy] update t set x = 5"));

    let audit = messages(&sink, Channel::Audit);
    assert_eq!(audit, vec!["1. PreparedStatement.execute returned 3"]);
}

#[tokio::test]
async fn test_statements_without_params_are_plain_statements() {
    let sink = Arc::new(MemorySink::new().with_channel(Channel::Audit, Level::Info));
    let ctx = context(&sink);
    let client = connected(&ctx).await;

    client.query("select 1", &[]).await.unwrap();
    client.query_opt("select 2", &[]).await.unwrap();

    assert_eq!(
        messages(&sink, Channel::Audit),
        vec![
            "1. Statement.query returned 0 rows",
            "1. Statement.query_opt returned no row"
        ]
    );
}

#[tokio::test]
async fn test_failures_are_reported_and_returned_unchanged() {
    let sink = Arc::new(MemorySink::new().with_all(Level::Info));
    let ctx = context(&sink);
    let client = connected(&ctx).await;

    let err = client
        .execute("delete from missing", &[])
        .await
        .unwrap_err();
    assert!(matches!(&err, SpyError::Other(msg) if msg == "relation \"missing\" does not exist"));

    let timing = sink.channel_records(Channel::SqlTiming);
    assert_eq!(timing.len(), 1);
    assert_eq!(timing[0].level, Level::Error);
    assert!(timing[0]
        .message
        .starts_with("1. Statement.execute FAILED! [sqlspy] delete from missing {FAILED after "));
    assert_eq!(
        timing[0].error.as_deref(),
        Some("relation \"missing\" does not exist")
    );

    // Only the pre-execution dump reaches sql-only, plus the failure.
    let only = messages(&sink, Channel::SqlOnly);
    assert_eq!(
        only,
        vec![
            "[sqlspy] delete from missing",
            "1. Statement.execute [sqlspy] delete from missing"
        ]
    );
}

#[tokio::test]
async fn test_empty_results_render_no_table() {
    let sink = Arc::new(
        MemorySink::new()
            .with_channel(Channel::ResultSetTable, Level::Info)
            .with_channel(Channel::Audit, Level::Info),
    );
    let ctx = context(&sink);
    let client = connected(&ctx).await;

    let rows = client.query("select id from users where false", &[]).await.unwrap();
    assert!(rows.is_empty());
    client.query_opt("select id from users where false", &[]).await.unwrap();

    assert!(sink.channel_records(Channel::ResultSetTable).is_empty());
    assert_eq!(
        messages(&sink, Channel::Audit),
        vec![
            "1. Statement.query returned 0 rows",
            "1. Statement.query_opt returned no row"
        ]
    );
}

#[tokio::test]
async fn test_query_one_not_found_is_reported() {
    let sink = Arc::new(MemorySink::new().with_channel(Channel::Audit, Level::Info));
    let ctx = context(&sink);
    let client = connected(&ctx).await;

    let err = client.query_one("select 1", &[]).await.unwrap_err();
    assert!(err.is_not_found());

    let audit = sink.channel_records(Channel::Audit);
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].message, "1. Statement.query_one [sqlspy] select 1");
}

#[tokio::test]
async fn test_values_are_dumped_as_literals() {
    let sink = Arc::new(MemorySink::new().with_channel(Channel::SqlOnly, Level::Info));
    let ctx = context(&sink);
    let client = connected(&ctx).await;

    client
        .query_values(
            "select * from users where name = $1 and active = $2 and note = $3",
            &[
                SqlValue::from("O'Brien"),
                SqlValue::Bool(true),
                SqlValue::Null,
            ],
        )
        .await
        .unwrap();
    client
        .execute_values("delete from users where id = $1", &[SqlValue::Int(9)])
        .await
        .unwrap();

    assert_eq!(
        messages(&sink, Channel::SqlOnly),
        vec![
            "[sqlspy] select * from users where name = 'O''Brien' and active = 1 and note = NULL",
            "[sqlspy] delete from users where id = 9",
        ]
    );
}

#[tokio::test]
async fn test_typed_params_are_dumped_as_literals() {
    let sink = Arc::new(MemorySink::new().with_channel(Channel::SqlOnly, Level::Info));
    let ctx = context(&sink);
    let client = connected(&ctx).await;

    let ts = chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
        .unwrap()
        .and_hms_milli_opt(7, 5, 1, 42)
        .unwrap();
    client
        .query(
            "select * from users where name = $1 and active = $2 and at = $3",
            &[&"O'Brien", &true, &ts],
        )
        .await
        .unwrap();

    assert_eq!(
        messages(&sink, Channel::SqlOnly),
        vec![
            "[sqlspy] select * from users where name = 'O''Brien' and active = 1 and at = '2024-03-09 07:05:01.042'"
        ]
    );
}

#[tokio::test]
async fn test_boolean_style_follows_config() {
    let sink = Arc::new(MemorySink::new().with_channel(Channel::SqlOnly, Level::Info));
    let ctx = SpyContext::with_sink(
        SpyConfig::raw().with_boolean_as_true_false(true),
        Arc::clone(&sink),
    );
    let client = connected(&ctx).await;

    client
        .execute_values("update t set flag = $1", &[SqlValue::Bool(false)])
        .await
        .unwrap();
    assert_eq!(
        messages(&sink, Channel::SqlOnly),
        vec!["[sqlspy] update t set flag = false"]
    );
}

#[tokio::test]
async fn test_custom_dialect_renders_parameters() {
    struct Shouting;
    impl Dialect for Shouting {
        fn format_parameter(&self, value: &SqlValue) -> String {
            match value {
                SqlValue::Text(s) => format!("'{}'", s.to_uppercase()),
                other => other.to_string(),
            }
        }
    }

    let sink = Arc::new(MemorySink::new().with_channel(Channel::SqlOnly, Level::Info));
    let ctx = context(&sink).with_dialect(Shouting);
    let client = connected(&ctx).await;

    client
        .execute_values("insert into t values ($1)", &[SqlValue::from("hi")])
        .await
        .unwrap();
    assert_eq!(
        messages(&sink, Channel::SqlOnly),
        vec!["[sqlspy] insert into t values ('HI')"]
    );
}

#[tokio::test]
async fn test_batch_execute_uses_client_default() {
    let sink = Arc::new(MemorySink::new().with_channel(Channel::SqlTiming, Level::Info));
    let ctx = context(&sink);
    let client = connected(&ctx).await;

    let err = client.batch_execute("create table t (id int)").await.unwrap_err();
    assert!(matches!(err, SpyError::Other(_)));

    let timing = sink.channel_records(Channel::SqlTiming);
    assert_eq!(timing.len(), 1);
    assert_eq!(timing[0].level, Level::Error);
}

#[tokio::test]
async fn test_spy_client_is_a_generic_client() {
    async fn count<C: GenericClient>(client: &C) -> SpyResult<usize> {
        Ok(client.query("select 1", &[]).await?.len())
    }

    let sink = Arc::new(MemorySink::new().with_channel(Channel::SqlOnly, Level::Info));
    let ctx = context(&sink);
    let client = connected(&ctx).await;

    assert_eq!(count(&client).await.unwrap(), 0);
    assert_eq!(messages(&sink, Channel::SqlOnly), vec!["[sqlspy] select 1"]);
}
