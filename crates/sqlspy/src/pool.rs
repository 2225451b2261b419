//! Spied connections from a `deadpool_postgres` pool.

use crate::error::{SpyError, SpyResult};
use crate::intercept::{SpyClient, SpyContext};
use deadpool_postgres::{Object, Pool};

/// A pool whose checked-out connections are spied.
///
/// Every [`SpyPool::get`] is reported as a connection open, and returning
/// the object to the pool as a close.
///
/// # Example
///
/// ```ignore
/// let manager = deadpool_postgres::Manager::new(url.parse()?, tokio_postgres::NoTls);
/// let pool = deadpool_postgres::Pool::builder(manager).max_size(16).build()?;
/// let pool = SpyPool::new(pool, SpyContext::from_config(config));
/// let client = pool.get().await?;
/// client.execute("update users set active = false", &[]).await?;
/// ```
#[derive(Clone)]
pub struct SpyPool {
    pool: Pool,
    ctx: SpyContext,
}

impl SpyPool {
    pub fn new(pool: Pool, ctx: SpyContext) -> Self {
        Self { pool, ctx }
    }

    /// Check out a connection.
    ///
    /// A checkout failure is reported against the data source before it is
    /// returned.
    pub async fn get(&self) -> SpyResult<SpyClient<Object>> {
        self.ctx
            .connect(self.pool.get())
            .await
            .map_err(SpyError::from)
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn context(&self) -> &SpyContext {
        &self.ctx
    }
}

impl std::fmt::Debug for SpyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpyPool")
            .field("status", &self.pool.status())
            .field("ctx", &self.ctx)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Channel, Level, MemorySink};
    use crate::config::SpyConfig;
    use deadpool_postgres::{Manager, ManagerConfig, RecyclingMethod};
    use std::sync::Arc;
    use tokio_postgres::NoTls;

    #[tokio::test]
    async fn test_checkout_failure_is_reported() {
        let pg_config: tokio_postgres::Config =
            "postgres://nobody@127.0.0.1:1/none".parse().unwrap();
        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager).max_size(1).build().unwrap();
        let sink = Arc::new(MemorySink::new().with_channel(Channel::Audit, Level::Error));
        let pool = SpyPool::new(pool, SpyContext::with_sink(SpyConfig::raw(), Arc::clone(&sink)));

        let err = pool.get().await.err().expect("checkout should fail");
        assert!(matches!(err, SpyError::Pool(_)));

        let audit = sink.channel_records(Channel::Audit);
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].message, "-. DataSource.connect()");
    }
}
