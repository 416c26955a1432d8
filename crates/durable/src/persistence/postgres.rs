//! PostgreSQL implementation of TaskStore
//!
//! Production persistence using PostgreSQL with:
//! - Atomic task claiming with SKIP LOCKED
//! - Conditional status updates as the transition guard
//! - Embedded migrations

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::store::*;
use super::task::{Task, TaskStatus};

const TASK_COLUMNS: &str =
    "id, object_id, status, input, output, error, created_at, started_at, completed_at";

/// PostgreSQL implementation of TaskStore
///
/// Safe to share between several worker pools, in this or other processes:
/// `claim_next` locks the selected row with `FOR UPDATE SKIP LOCKED` and
/// flips its status in the same statement.
///
/// # Example
///
/// ```ignore
/// use noscope_durable::PostgresTaskStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/noscope").await?;
/// let store = PostgresTaskStore::new(pool);
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresTaskStore {
    pool: PgPool,
}

impl PostgresTaskStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and build a store
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(|e| {
            error!("Failed to connect to database: {}", e);
            StoreError::Database(e.to_string())
        })?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                StoreError::Database(e.to_string())
            })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Resolve why a conditional update matched no row
    async fn transition_failure(&self, id: Uuid, to: TaskStatus) -> StoreError {
        let current = sqlx::query("SELECT status FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await;

        match current {
            Ok(Some(row)) => match decode_status(&row) {
                Ok(from) => {
                    let err = StoreError::InvalidTransition {
                        task_id: id,
                        from,
                        to,
                    };
                    error!(task_id = %id, "Rejected task transition: {}", err);
                    err
                }
                Err(e) => e,
            },
            Ok(None) => StoreError::NotFound(id),
            Err(e) => StoreError::Database(e.to_string()),
        }
    }
}

fn decode_status(row: &PgRow) -> Result<TaskStatus, StoreError> {
    let status: String = row
        .try_get("status")
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    status
        .parse()
        .map_err(|_| StoreError::Serialization(format!("unknown status in database: {status}")))
}

fn row_to_task(row: &PgRow) -> Result<Task, StoreError> {
    let ser = |e: sqlx::Error| StoreError::Serialization(e.to_string());
    Ok(Task {
        id: row.try_get("id").map_err(ser)?,
        object_id: row.try_get("object_id").map_err(ser)?,
        status: decode_status(row)?,
        input: row.try_get("input").map_err(ser)?,
        output: row.try_get("output").map_err(ser)?,
        error: row.try_get("error").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
        started_at: row.try_get("started_at").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
    })
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    #[instrument(skip(self, new_task), fields(object_id = %new_task.object_id))]
    async fn create(&self, new_task: NewTask) -> Result<Task, StoreError> {
        new_task.validate()?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tasks (id, object_id, status, input, created_at)
            VALUES ($1, $2, 'pending', $3, NOW())
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(Uuid::now_v7())
        .bind(&new_task.object_id)
        .bind(&new_task.input)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create task: {}", e);
            StoreError::Database(e.to_string())
        })?;

        let task = row_to_task(&row)?;
        debug!(task_id = %task.id, "created task");
        Ok(task)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Task, StoreError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to get task: {}", e);
                StoreError::Database(e.to_string())
            })?
            .ok_or(StoreError::NotFound(id))?;

        row_to_task(&row)
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        filter: &TaskFilter,
        pagination: Pagination,
    ) -> Result<TaskPage, StoreError> {
        let status = filter.status.map(|s| s.as_str());

        let rows = sqlx::query(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE ($1::TEXT IS NULL OR object_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC, id ASC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(&filter.object_id)
        .bind(status)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to list tasks: {}", e);
            StoreError::Database(e.to_string())
        })?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM tasks
            WHERE ($1::TEXT IS NULL OR object_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
            "#,
        )
        .bind(&filter.object_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to count tasks: {}", e);
            StoreError::Database(e.to_string())
        })?;

        let tasks = rows.iter().map(row_to_task).collect::<Result<Vec<_>, _>>()?;
        Ok(TaskPage {
            tasks,
            total: total.max(0) as u64,
        })
    }

    #[instrument(skip(self))]
    async fn claim_next(&self) -> Result<Option<Task>, StoreError> {
        // Select and flip in one statement; SKIP LOCKED lets concurrent
        // claimers move on to the next row instead of blocking
        let row = sqlx::query(
            r#"
            WITH next AS (
                SELECT id
                FROM tasks
                WHERE status = 'pending'
                ORDER BY created_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE tasks t
            SET status = 'processing',
                started_at = NOW()
            FROM next
            WHERE t.id = next.id
            RETURNING t.id, t.object_id, t.status, t.input, t.output, t.error,
                      t.created_at, t.started_at, t.completed_at
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to claim task: {}", e);
            StoreError::Database(e.to_string())
        })?;

        match row {
            Some(row) => {
                let task = row_to_task(&row)?;
                debug!(task_id = %task.id, "claimed task");
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, output))]
    async fn complete(&self, id: Uuid, output: serde_json::Value) -> Result<Task, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET status = 'completed',
                output = $2,
                completed_at = GREATEST(NOW(), started_at)
            WHERE id = $1 AND status = 'processing'
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&output)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to complete task: {}", e);
            StoreError::Database(e.to_string())
        })?;

        match row {
            Some(row) => row_to_task(&row),
            None => Err(self.transition_failure(id, TaskStatus::Completed).await),
        }
    }

    #[instrument(skip(self))]
    async fn fail(&self, id: Uuid, error: &str) -> Result<Task, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET status = 'failed',
                error = $2,
                completed_at = GREATEST(NOW(), started_at)
            WHERE id = $1 AND status = 'processing'
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fail task: {}", e);
            StoreError::Database(e.to_string())
        })?;

        match row {
            Some(row) => row_to_task(&row),
            None => Err(self.transition_failure(id, TaskStatus::Failed).await),
        }
    }
}
