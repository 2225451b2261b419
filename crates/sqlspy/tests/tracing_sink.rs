//! End to end through `tracing`: a spied client, the default sink, and an
//! `EnvFilter` choosing which channels are on.

use sqlspy::{GenericClient, SpyConfig, SpyContext, SpyError, SpyResult};
use std::sync::{Arc, Mutex};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

#[derive(Clone, Debug)]
struct Captured {
    level: Level,
    target: String,
    message: String,
    error: Option<String>,
}

#[derive(Clone, Default)]
struct CaptureLayer {
    events: Arc<Mutex<Vec<Captured>>>,
}

impl CaptureLayer {
    fn for_target(&self, target: &str) -> Vec<Captured> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.target == target)
            .cloned()
            .collect()
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    error: Option<String>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "error" => self.error = Some(format!("{value:?}")),
            _ => {}
        }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        self.events.lock().unwrap().push(Captured {
            level: *metadata.level(),
            target: metadata.target().to_owned(),
            message: visitor.message,
            error: visitor.error,
        });
    }
}

struct DummyClient;

impl GenericClient for DummyClient {
    async fn query(&self, _: &str, _: &[&(dyn ToSql + Sync)]) -> SpyResult<Vec<Row>> {
        Ok(vec![])
    }
    async fn query_one(&self, _: &str, _: &[&(dyn ToSql + Sync)]) -> SpyResult<Row> {
        Err(SpyError::not_found("no rows"))
    }
    async fn query_opt(&self, _: &str, _: &[&(dyn ToSql + Sync)]) -> SpyResult<Option<Row>> {
        Ok(None)
    }
    async fn execute(&self, _: &str, _: &[&(dyn ToSql + Sync)]) -> SpyResult<u64> {
        Ok(1)
    }
}

#[tokio::test(flavor = "current_thread")]
async fn channels_follow_the_env_filter() {
    let capture = CaptureLayer::default();
    let filter = EnvFilter::new("sqlspy.sqlonly=info,sqlspy.sqltiming=warn,sqlspy.connection=info");
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(capture.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let config = SpyConfig::raw().with_warn_threshold_ms(0);
    let ctx = SpyContext::from_config(config);
    let client = ctx.wrap(DummyClient);
    assert_eq!(client.connection_number(), Some(1));

    client
        .execute("update users set name = $1 where id = $2", &[&"Ann", &7_i64])
        .await
        .unwrap();
    let err = client.query_one("select 1", &[]).await.unwrap_err();
    assert!(err.is_not_found());
    drop(client);

    let connection: Vec<_> = capture
        .for_target("sqlspy.connection")
        .into_iter()
        .map(|e| (e.level, e.message))
        .collect();
    assert_eq!(
        connection,
        vec![
            (Level::INFO, "1. Connection opened".to_string()),
            (Level::INFO, "1. Connection closed".to_string()),
        ]
    );

    let sql_only = capture.for_target("sqlspy.sqlonly");
    assert_eq!(sql_only[0].level, Level::INFO);
    assert_eq!(
        sql_only[0].message,
        "[sqlspy] update users set name = 'Ann' where id = 7"
    );
    let failure = sql_only.last().unwrap();
    assert_eq!(failure.level, Level::ERROR);
    assert_eq!(failure.message, "1. Statement.query_one [sqlspy] select 1");
    assert_eq!(failure.error.as_deref(), Some("Not found: no rows"));

    // Every statement passes the zero warn threshold.
    let timing = capture.for_target("sqlspy.sqltiming");
    assert_eq!(timing.len(), 2);
    assert_eq!(timing[0].level, Level::WARN);
    assert!(timing[0].message.starts_with("1. executed in "));
    assert_eq!(timing[1].level, Level::ERROR);

    // Audit is off entirely.
    assert!(capture.for_target("sqlspy.audit").is_empty());
}
