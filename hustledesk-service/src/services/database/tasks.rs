use super::{db_error, Database};
use crate::dtos::tasks::CreateTaskRequest;
use crate::models::Task;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

const TASK_COLUMNS: &str = "task_id, org_id, outlet_id, title, description, assigned_to, \
    due_date, completed_utc, created_by, created_utc";

impl Database {
    /// Open tasks first by due date; completed ones only when asked for.
    #[instrument(skip(self))]
    pub async fn list_tasks(
        &self,
        org_id: Uuid,
        assigned_to: Option<&str>,
        include_completed: bool,
    ) -> Result<Vec<Task>, AppError> {
        sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS} FROM tasks
            WHERE org_id = $1
              AND ($2::text IS NULL OR assigned_to = $2)
              AND ($3 OR completed_utc IS NULL)
            ORDER BY completed_utc NULLS FIRST, due_date NULLS LAST, created_utc DESC
            "#
        ))
        .bind(org_id)
        .bind(assigned_to)
        .bind(include_completed)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list tasks", e))
    }

    pub async fn get_task(&self, org_id: Uuid, task_id: Uuid) -> Result<Option<Task>, AppError> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE org_id = $1 AND task_id = $2"
        ))
        .bind(org_id)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get task", e))
    }

    #[instrument(skip(self, input))]
    pub async fn create_task(
        &self,
        org_id: Uuid,
        input: &CreateTaskRequest,
        created_by: &str,
    ) -> Result<Task, AppError> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks (task_id, org_id, outlet_id, title, description, assigned_to,
                               due_date, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(input.outlet_id)
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(&input.assigned_to)
        .bind(input.due_date)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create task", e))?;

        info!(task_id = %task.task_id, "Task created");
        Ok(task)
    }

    /// Stamp completion; completing twice keeps the first timestamp.
    #[instrument(skip(self))]
    pub async fn complete_task(&self, org_id: Uuid, task_id: Uuid) -> Result<Option<Task>, AppError> {
        sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks SET completed_utc = COALESCE(completed_utc, NOW())
            WHERE org_id = $1 AND task_id = $2
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(org_id)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to complete task", e))
    }
}
