// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::repository::{RepositoryError, WorkflowRepository, LATEST_VERSION};
use crate::domain::workflow::{
    Action, ActionState, ActionStatusReport, Workflow, WorkflowContext, WorkflowData,
    WorkflowEventRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgRow};
use sqlx::Row;

pub struct PostgresWorkflowRepository {
    pool: PgPool,
}

impl PostgresWorkflowRepository {
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn context_from_row(row: &PgRow) -> Result<WorkflowContext, RepositoryError> {
        let state: String = row.try_get("current_action_state")?;
        let index: i64 = row.try_get("current_action_index")?;
        let total: i64 = row.try_get("total_number_of_actions")?;
        Ok(WorkflowContext {
            workflow_id: row.try_get("workflow_id")?,
            current_worker: row.try_get("current_worker")?,
            current_task: row.try_get("current_task_name")?,
            current_action: row.try_get("current_action_name")?,
            current_action_index: index as usize,
            current_action_state: state
                .parse::<ActionState>()
                .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
            total_number_of_actions: total as usize,
        })
    }

    fn data_from_row(workflow_id: &str, row: &PgRow) -> Result<WorkflowData, RepositoryError> {
        Ok(WorkflowData {
            workflow_id: workflow_id.to_string(),
            version: row.try_get("version")?,
            metadata: row.try_get("metadata")?,
            data: row.try_get("data")?,
        })
    }
}

#[async_trait]
impl WorkflowRepository for PostgresWorkflowRepository {
    async fn create_workflow(
        &self,
        workflow: &Workflow,
        worker_ids: &[String],
    ) -> Result<(), RepositoryError> {
        let actions_json = serde_json::to_value(&workflow.actions)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workflow (id, actions, created_at)
            VALUES ($1, $2, NOW())
            "#,
        )
        .bind(&workflow.id)
        .bind(&actions_json)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert workflow: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO workflow_state (workflow_id, current_action_index, current_action_state, total_number_of_actions, updated_at)
            VALUES ($1, 0, $2, $3, NOW())
            "#,
        )
        .bind(&workflow.id)
        .bind(ActionState::Pending.as_str())
        .bind(workflow.actions.len() as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert workflow state: {}", e)))?;

        for worker_id in worker_ids {
            sqlx::query(
                r#"
                INSERT INTO workflow_worker_map (workflow_id, worker_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(&workflow.id)
            .bind(worker_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, RepositoryError> {
        let actions = self.get_workflow_actions(workflow_id).await?;
        Ok(Workflow::new(workflow_id, actions))
    }

    async fn get_workflow_context(
        &self,
        workflow_id: &str,
    ) -> Result<WorkflowContext, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT workflow_id, current_worker, current_task_name, current_action_name,
                   current_action_index, current_action_state, total_number_of_actions
            FROM workflow_state
            WHERE workflow_id = $1
            "#,
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("workflow {}", workflow_id)))?;

        Self::context_from_row(&row)
    }

    async fn update_workflow_state(&self, context: &WorkflowContext) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        write_state(&mut *tx, context).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_workflow_event(
        &self,
        report: &ActionStatusReport,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        write_event(&mut *conn, report, at).await
    }

    async fn record_action_status(
        &self,
        context: &WorkflowContext,
        report: &ActionStatusReport,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        // Dropping `tx` on an early return rolls back the cursor update
        let mut tx = self.pool.begin().await?;
        write_state(&mut *tx, context).await?;
        write_event(&mut *tx, report, at).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_workflow_actions(&self, workflow_id: &str) -> Result<Vec<Action>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT actions
            FROM workflow
            WHERE id = $1
            "#,
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("workflow {}", workflow_id)))?;

        let actions_json: serde_json::Value = row.try_get("actions")?;
        Ok(serde_json::from_value(actions_json)?)
    }

    async fn list_workflow_events(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<WorkflowEventRecord>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT workflow_id, worker_id, task_name, action_name, execution_time, message, status, created_at
            FROM workflow_event
            WHERE workflow_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.try_get("status")?;
            events.push(WorkflowEventRecord {
                workflow_id: row.try_get("workflow_id")?,
                worker_id: row.try_get("worker_id")?,
                task_name: row.try_get("task_name")?,
                action_name: row.try_get("action_name")?,
                action_status: status
                    .parse::<ActionState>()
                    .map_err(|e| RepositoryError::Serialization(e.to_string()))?,
                seconds: row.try_get("execution_time")?,
                message: row.try_get("message")?,
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(events)
    }

    async fn get_workflows_for_worker(
        &self,
        worker_id: &str,
    ) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT m.workflow_id
            FROM workflow_worker_map m
            JOIN workflow w ON w.id = m.workflow_id
            WHERE m.worker_id = $1
            ORDER BY w.created_at ASC
            "#,
        )
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get("workflow_id").map_err(RepositoryError::from))
            .collect()
    }

    async fn get_workflow_data(
        &self,
        workflow_id: &str,
        version: i32,
    ) -> Result<WorkflowData, RepositoryError> {
        let row = if version == LATEST_VERSION {
            sqlx::query(
                r#"
                SELECT version, metadata, data
                FROM workflow_data
                WHERE workflow_id = $1
                ORDER BY version DESC
                LIMIT 1
                "#,
            )
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                SELECT version, metadata, data
                FROM workflow_data
                WHERE workflow_id = $1 AND version = $2
                "#,
            )
            .bind(workflow_id)
            .bind(version)
            .fetch_optional(&self.pool)
            .await?
        };

        let row = row.ok_or_else(|| {
            RepositoryError::NotFound(format!("workflow {} data version {}", workflow_id, version))
        })?;
        Self::data_from_row(workflow_id, &row)
    }

    async fn get_workflow_data_version(&self, workflow_id: &str) -> Result<i32, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(MAX(version), 0) AS version
            FROM workflow_data
            WHERE workflow_id = $1
            "#,
        )
        .bind(workflow_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("version")?)
    }

    async fn insert_workflow_data(
        &self,
        workflow_id: &str,
        metadata: &[u8],
        data: &[u8],
    ) -> Result<i32, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the workflow serializes concurrent version allocation
        sqlx::query("SELECT id FROM workflow WHERE id = $1 FOR UPDATE")
            .bind(workflow_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("workflow {}", workflow_id)))?;

        let row = sqlx::query(
            r#"
            INSERT INTO workflow_data (workflow_id, version, metadata, data, created_at)
            SELECT $1, COALESCE(MAX(version), 0) + 1, $2, $3, NOW()
            FROM workflow_data
            WHERE workflow_id = $1
            RETURNING version
            "#,
        )
        .bind(workflow_id)
        .bind(metadata)
        .bind(data)
        .fetch_one(&mut *tx)
        .await?;
        let version: i32 = row.try_get("version")?;

        tx.commit().await?;
        Ok(version)
    }
}

async fn write_state(
    conn: &mut PgConnection,
    context: &WorkflowContext,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_state
        SET current_worker = $2,
            current_task_name = $3,
            current_action_name = $4,
            current_action_index = $5,
            current_action_state = $6,
            updated_at = NOW()
        WHERE workflow_id = $1
        "#,
    )
    .bind(&context.workflow_id)
    .bind(&context.current_worker)
    .bind(&context.current_task)
    .bind(&context.current_action)
    .bind(context.current_action_index as i64)
    .bind(context.current_action_state.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound(format!(
            "workflow {}",
            context.workflow_id
        )));
    }
    Ok(())
}

async fn write_event(
    conn: &mut PgConnection,
    report: &ActionStatusReport,
    at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_event (workflow_id, worker_id, task_name, action_name, execution_time, message, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&report.workflow_id)
    .bind(&report.worker_id)
    .bind(&report.task_name)
    .bind(&report.action_name)
    .bind(report.seconds)
    .bind(&report.message)
    .bind(report.action_status.as_str())
    .bind(at)
    .execute(&mut *conn)
    .await
    .map_err(|e| RepositoryError::Database(format!("Failed to insert workflow event: {}", e)))?;

    Ok(())
}
