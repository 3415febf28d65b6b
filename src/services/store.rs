use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::models::work_item::{StatusUpdate, WorkItem, WorkKind};

/// Document store holding work items.
///
/// There is no claim step: an item is taken simply by being returned from
/// `find_pending`, so two workers over the same store can process the same item.
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    /// Pending items of `kind`, in the store's natural order, at most `limit` of them.
    /// Pure read.
    async fn find_pending(
        &self,
        kind: WorkKind,
        scope: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WorkItem>, StoreError>;

    /// Persist a terminal transition and its status-named timestamp.
    async fn update_status(&self, id: Uuid, update: &StatusUpdate) -> Result<(), StoreError>;

    /// Connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Release the underlying connection.
    async fn close(&self) {}
}

/// Postgres-backed store over the `work_items` table.
pub struct PgWorkItemStore {
    pool: PgPool,
}

impl PgWorkItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl WorkItemStore for PgWorkItemStore {
    async fn find_pending(
        &self,
        kind: WorkKind,
        scope: Option<&str>,
        limit: u32,
    ) -> Result<Vec<WorkItem>, StoreError> {
        let items = queries::find_pending(&self.pool, kind, scope, i64::from(limit)).await?;
        tracing::debug!(count = items.len(), kind = %kind, "Selected pending items");
        Ok(items)
    }

    async fn update_status(&self, id: Uuid, update: &StatusUpdate) -> Result<(), StoreError> {
        let touched = queries::update_status(&self.pool, id, update).await?;
        if touched == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Closed work item store connections");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Work item {0} not found")]
    NotFound(Uuid),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => StoreError::Unavailable(e.to_string()),
            other => StoreError::Database(other),
        }
    }
}
