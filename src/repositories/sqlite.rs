//! SQLite-backed record store. Params are kept as a JSON text column in the
//! external layout produced by [`Record::to_params`].

use super::RecordRepository;
use crate::{
    errors::{AttachmentError, AttachmentResult},
    models::{Record, UploadOptions},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(FromRow, Debug)]
struct RecordRow {
    id: String,
    version: i64,
    params: String,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
    #[allow(dead_code)]
    updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SqliteRecordRepository {
    pub db: Arc<SqlitePool>,
    options: Arc<UploadOptions>,
}

impl SqliteRecordRepository {
    pub fn new(db: Arc<SqlitePool>, options: Arc<UploadOptions>) -> Self {
        Self { db, options }
    }

    /// Apply the embedded schema. Statements are idempotent.
    pub async fn migrate(&self) -> AttachmentResult<()> {
        let statements = INIT_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} migration statements...", statements.len());
        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    fn decode(&self, row: RecordRow) -> AttachmentResult<Record> {
        let params: Map<String, Value> = serde_json::from_str(&row.params)?;
        Record::from_params(row.id, row.version, params, &self.options)
    }

    fn encode(&self, record: &Record) -> AttachmentResult<String> {
        Ok(serde_json::to_string(&record.to_params(&self.options, false))?)
    }
}

#[async_trait]
impl RecordRepository for SqliteRecordRepository {
    async fn find(&self, id: &str) -> AttachmentResult<Option<Record>> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT id, version, params, created_at, updated_at FROM records WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        row.map(|row| self.decode(row)).transpose()
    }

    async fn insert(&self, record: &Record) -> AttachmentResult<Record> {
        let now = Utc::now();
        let params = self.encode(record)?;

        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            INSERT INTO records (id, version, params, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, version, params, created_at, updated_at
            "#,
        )
        .bind(&record.id)
        .bind(record.version)
        .bind(&params)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AttachmentError::Conflict(record.id.clone())
            } else {
                AttachmentError::Sqlx(err)
            }
        })?;

        self.decode(row)
    }

    async fn update(&self, record: &Record) -> AttachmentResult<Record> {
        let params = self.encode(record)?;

        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            UPDATE records
            SET params = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            RETURNING id, version, params, created_at, updated_at
            "#,
        )
        .bind(&params)
        .bind(Utc::now())
        .bind(&record.id)
        .bind(record.version)
        .fetch_optional(&*self.db)
        .await?;

        match row {
            Some(row) => self.decode(row),
            None => {
                let exists: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM records WHERE id = ?")
                        .bind(&record.id)
                        .fetch_optional(&*self.db)
                        .await?;
                Err(match exists {
                    Some(_) => AttachmentError::Conflict(record.id.clone()),
                    None => AttachmentError::RecordNotFound(record.id.clone()),
                })
            }
        }
    }

    async fn delete(&self, id: &str) -> AttachmentResult<()> {
        let result = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AttachmentError::RecordNotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
