use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::model_config::ModelConfig;
use crate::models::work_item::{ItemOutput, StatusUpdate, WorkItem, WorkKind, WorkStatus};

const ITEM_COLUMNS: &str =
    "id, kind, input, status, dataset_id, result, error, created_at, completed_at, error_at";

fn decode_err<E>(e: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(e))
}

fn item_from_row(row: &PgRow) -> Result<WorkItem, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let result: Option<serde_json::Value> = row.try_get("result")?;

    Ok(WorkItem {
        id: row.try_get("id")?,
        kind: WorkKind::from_str(&kind).map_err(decode_err)?,
        input: row.try_get("input")?,
        status: WorkStatus::from_str(&status).map_err(decode_err)?,
        dataset_id: row.try_get("dataset_id")?,
        result: result
            .map(serde_json::from_value::<ItemOutput>)
            .transpose()
            .map_err(decode_err)?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        error_at: row.try_get("error_at")?,
    })
}

/// Insert a new pending work item (producer side).
pub async fn insert_pending(
    pool: &PgPool,
    kind: WorkKind,
    input: &str,
    dataset_id: Option<&str>,
) -> Result<WorkItem, sqlx::Error> {
    let sql = format!(
        "INSERT INTO work_items (kind, input, dataset_id) VALUES ($1, $2, $3) RETURNING {}",
        ITEM_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(kind.to_string())
        .bind(input)
        .bind(dataset_id)
        .fetch_one(pool)
        .await?;

    item_from_row(&row)
}

/// Get a work item by ID
pub async fn get_item(pool: &PgPool, id: Uuid) -> Result<Option<WorkItem>, sqlx::Error> {
    let sql = format!("SELECT {} FROM work_items WHERE id = $1", ITEM_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;

    row.as_ref().map(item_from_row).transpose()
}

/// Pending items of one kind, oldest first, optionally scoped to a dataset.
pub async fn find_pending(
    pool: &PgPool,
    kind: WorkKind,
    dataset_id: Option<&str>,
    limit: i64,
) -> Result<Vec<WorkItem>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}
        FROM work_items
        WHERE status = 'pending'
          AND kind = $1
          AND ($2::TEXT IS NULL OR dataset_id = $2)
        ORDER BY created_at ASC
        LIMIT $3
        "#,
        ITEM_COLUMNS
    );

    let rows = sqlx::query(&sql)
        .bind(kind.to_string())
        .bind(dataset_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    rows.iter().map(item_from_row).collect()
}

/// Write a terminal transition. Returns the number of rows touched.
pub async fn update_status(
    pool: &PgPool,
    id: Uuid,
    update: &StatusUpdate,
) -> Result<u64, sqlx::Error> {
    let result = match update {
        StatusUpdate::Completed(output) => {
            let output = serde_json::to_value(output).map_err(decode_err)?;
            sqlx::query(
                r#"
                UPDATE work_items
                SET status = 'completed',
                    result = $2,
                    error = NULL,
                    error_at = NULL,
                    completed_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(output)
            .execute(pool)
            .await?
        }
        StatusUpdate::Failed(message) => {
            sqlx::query(
                r#"
                UPDATE work_items
                SET status = 'error',
                    error = $2,
                    result = NULL,
                    completed_at = NULL,
                    error_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(message)
            .execute(pool)
            .await?
        }
    };

    Ok(result.rows_affected())
}

/// Number of pending items of one kind.
pub async fn count_pending(pool: &PgPool, kind: WorkKind) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS pending FROM work_items WHERE status = 'pending' AND kind = $1")
        .bind(kind.to_string())
        .fetch_one(pool)
        .await?;

    row.try_get("pending")
}

/// Model configuration for `kind`: the row named `config_id`, or the kind's default row.
pub async fn get_model_config(
    pool: &PgPool,
    kind: WorkKind,
    config_id: Option<&str>,
) -> Result<Option<ModelConfig>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, kind, model_name, use_gpu, batch_size, is_default
        FROM model_configs
        WHERE kind = $1
          AND (($2::TEXT IS NULL AND is_default) OR id = $2)
        "#,
    )
    .bind(kind.to_string())
    .bind(config_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        let kind: String = row.try_get("kind")?;
        Ok(ModelConfig {
            id: row.try_get("id")?,
            kind: WorkKind::from_str(&kind).map_err(decode_err)?,
            model_name: row.try_get("model_name")?,
            use_gpu: row.try_get("use_gpu")?,
            batch_size: row.try_get("batch_size")?,
            is_default: row.try_get("is_default")?,
        })
    })
    .transpose()
}
