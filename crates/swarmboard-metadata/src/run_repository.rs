use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{query, Row, SqlitePool};
use swarmboard_core::{
    CoreError, CoreResult, RunConfig, RunId, RunMetrics, RunRecord, RunStatus,
};

const RUN_COLUMNS: &str = r#"
    id,
    name,
    status,
    start_time,
    end_time,
    target_url,
    users,
    spawn_rate,
    duration,
    avg_response_time,
    requests_per_second,
    error_rate,
    total_requests,
    total_failures
"#;

/// SQLite-backed run store.
pub struct SqliteRunRepository {
    pool: SqlitePool,
}

impl SqliteRunRepository {
    /// Creates a new repository backed by the provided pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn map_row(row: SqliteRow) -> CoreResult<RunRecord> {
        let id: i64 = row.get("id");
        let status: String = row.get("status");
        let status = RunStatus::from_str(&status)
            .map_err(|_| CoreError::persistence(format!("unknown run status `{status}`")))?;
        let start_time: String = row.get("start_time");
        let end_time: Option<String> = row.get("end_time");
        let users: i64 = row.get("users");
        let duration: i64 = row.get("duration");

        let config = RunConfig {
            name: row.get("name"),
            target_url: row.get("target_url"),
            users: u32::try_from(users)
                .map_err(|_| CoreError::persistence("users stored out of range"))?,
            spawn_rate: row.get("spawn_rate"),
            duration_secs: u64::try_from(duration)
                .map_err(|_| CoreError::persistence("duration stored negative value"))?,
        };

        let total_requests: Option<i64> = row.get("total_requests");
        let metrics = match total_requests {
            Some(total_requests) => {
                let total_failures: Option<i64> = row.get("total_failures");
                let avg_response_time: Option<f64> = row.get("avg_response_time");
                let requests_per_second: Option<f64> = row.get("requests_per_second");
                let error_rate: Option<f64> = row.get("error_rate");
                Some(RunMetrics {
                    avg_response_time: avg_response_time.unwrap_or_default(),
                    requests_per_second: requests_per_second.unwrap_or_default(),
                    error_rate: error_rate.unwrap_or_default(),
                    total_requests: u64::try_from(total_requests).map_err(|_| {
                        CoreError::persistence("total_requests stored negative value")
                    })?,
                    total_failures: u64::try_from(total_failures.unwrap_or_default()).map_err(
                        |_| CoreError::persistence("total_failures stored negative value"),
                    )?,
                })
            }
            None => None,
        };

        Ok(RunRecord {
            id: RunId::new(id),
            status,
            start_time: parse_timestamp("start_time", &start_time)?,
            end_time: end_time
                .as_deref()
                .map(|value| parse_timestamp("end_time", value))
                .transpose()?,
            config,
            metrics,
        })
    }
}

#[async_trait::async_trait]
impl swarmboard_core::RunRepository for SqliteRunRepository {
    async fn insert(&self, config: &RunConfig, start_time: DateTime<Utc>) -> CoreResult<RunRecord> {
        let duration = i64::try_from(config.duration_secs)
            .map_err(|_| CoreError::validation("duration exceeds 63-bit range"))?;

        let result = query(
            r#"
            INSERT INTO runs (name, status, start_time, target_url, users, spawn_rate, duration)
            VALUES (?1, 'running', ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&config.name)
        .bind(format_timestamp(start_time))
        .bind(&config.target_url)
        .bind(i64::from(config.users))
        .bind(config.spawn_rate)
        .bind(duration)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(RunRecord {
            id: RunId::new(result.last_insert_rowid()),
            status: RunStatus::Running,
            start_time,
            end_time: None,
            config: config.clone(),
            metrics: None,
        })
    }

    async fn update_terminal(
        &self,
        run_id: RunId,
        status: RunStatus,
        end_time: DateTime<Utc>,
        metrics: Option<&RunMetrics>,
    ) -> CoreResult<bool> {
        if !status.is_terminal() {
            return Err(CoreError::validation(format!(
                "`{}` is not a terminal status",
                status.as_str()
            )));
        }

        let total_requests = metrics
            .map(|m| i64::try_from(m.total_requests))
            .transpose()
            .map_err(|_| CoreError::validation("total_requests exceeds 63-bit range"))?;
        let total_failures = metrics
            .map(|m| i64::try_from(m.total_failures))
            .transpose()
            .map_err(|_| CoreError::validation("total_failures exceeds 63-bit range"))?;

        // The status guard makes this the single check-and-set for run termination.
        let result = query(
            r#"
            UPDATE runs
               SET status = ?2,
                   end_time = ?3,
                   avg_response_time = ?4,
                   requests_per_second = ?5,
                   error_rate = ?6,
                   total_requests = ?7,
                   total_failures = ?8
             WHERE id = ?1
               AND status = 'running'
            "#,
        )
        .bind(run_id.get())
        .bind(status.as_str())
        .bind(format_timestamp(end_time))
        .bind(metrics.map(|m| m.avg_response_time))
        .bind(metrics.map(|m| m.requests_per_second))
        .bind(metrics.map(|m| m.error_rate))
        .bind(total_requests)
        .bind(total_failures)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let updated = result.rows_affected() == 1;
        if !updated {
            tracing::debug!(run_id = %run_id, status = status.as_str(), "terminal update matched no running row");
        }
        Ok(updated)
    }

    async fn get_running(&self) -> CoreResult<Option<RunRecord>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM runs WHERE status = 'running' ORDER BY start_time DESC, id DESC LIMIT 1"
        );
        let row = query(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(Self::map_row).transpose()
    }

    async fn get(&self, run_id: RunId) -> CoreResult<Option<RunRecord>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1");
        let row = query(&sql)
            .bind(run_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(Self::map_row).transpose()
    }

    async fn list_all(&self) -> CoreResult<Vec<RunRecord>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY start_time DESC, id DESC");
        let rows = query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(Self::map_row).collect()
    }
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(column: &str, value: &str) -> CoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| CoreError::persistence(format!("invalid {column}: {err}")))
}

fn map_sqlx_error(err: sqlx::Error) -> CoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            if message.contains("UNIQUE constraint failed") {
                CoreError::conflict("another run is already in progress")
            } else if message.contains("CHECK constraint failed") {
                CoreError::persistence(format!("check constraint failed: {message}"))
            } else {
                CoreError::persistence(message)
            }
        }
        other => CoreError::persistence(other.to_string()),
    }
}
