//! The engine's only view of the database.
//!
//! [`SqlxAdapter`] is the production implementation over `sqlx::AnyPool`;
//! tests substitute their own [`DbAdapter`].

use std::collections::HashMap;

use async_trait::async_trait;

use crate::codegen::Dialect;
use crate::error::{Error, Result};

/// A result row with every value rendered as text, or `None` for SQL NULL.
/// Only introspection reads rows; the engine itself never does.
pub type Row = HashMap<String, Option<String>>;

#[async_trait]
pub trait DbAdapter: Send + Sync {
    /// Cheap connectivity probe.
    async fn ping(&self) -> Result<()>;

    /// Run a read-only query and collect the rows.
    async fn query(&self, sql: &str) -> Result<Vec<Row>>;

    /// Execute the statements atomically: begin, run each in order, commit
    /// on success, roll back and surface the error on any failure.
    async fn transaction(&self, statements: &[String]) -> Result<()>;

    /// Release the connection.
    async fn disconnect(&self);
}

/// Guess the dialect from a database URL, the way `sqlx::Any` itself routes
/// connections.
pub fn infer_dialect_from_url(url: &str) -> Option<Dialect> {
    if url.starts_with("postgres") {
        Some(Dialect::Postgres)
    } else if url.starts_with("mysql") || url.starts_with("mariadb") {
        Some(Dialect::Mysql)
    } else if url.starts_with("sqlite") || url.ends_with(".db") || url.starts_with("file:") {
        Some(Dialect::Sqlite)
    } else {
        None
    }
}

/// Production adapter over `sqlx::AnyPool`.
pub struct SqlxAdapter {
    pool: sqlx::AnyPool,
}

impl SqlxAdapter {
    /// Connect to a database URL with the required `Any` driver installed.
    pub async fn connect(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();
        if infer_dialect_from_url(url).is_none() {
            return Err(Error::Adapter(format!("unsupported database URL: {}", url)));
        }
        let pool = sqlx::AnyPool::connect(url)
            .await
            .map_err(|e| Error::Adapter(format!("failed to connect: {}", e)))?;
        Ok(SqlxAdapter { pool })
    }
}

#[async_trait]
impl DbAdapter for SqlxAdapter {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| Error::Adapter(format!("connectivity probe failed: {}", e)))
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Adapter(format!("query failed: {}", e)))?;
        Ok(rows.iter().map(row_to_map).collect())
    }

    async fn transaction(&self, statements: &[String]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Adapter(format!("failed to begin transaction: {}", e)))?;
        for statement in statements {
            if let Err(e) = sqlx::query(statement).execute(&mut *tx).await {
                // Dropping the transaction rolls it back.
                return Err(Error::Adapter(format!(
                    "statement failed: {}: {}",
                    first_line(statement),
                    e
                )));
            }
        }
        tx.commit()
            .await
            .map_err(|e| Error::Adapter(format!("failed to commit transaction: {}", e)))
    }

    async fn disconnect(&self) {
        self.pool.close().await;
    }
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or(statement)
}

fn row_to_map(row: &sqlx::any::AnyRow) -> Row {
    use sqlx::{Column, Row as _};
    row.columns()
        .iter()
        .map(|column| {
            let idx = column.ordinal();
            let value = row
                .try_get::<String, _>(idx)
                .ok()
                .or_else(|| row.try_get::<i64, _>(idx).ok().map(|v| v.to_string()))
                .or_else(|| row.try_get::<bool, _>(idx).ok().map(|v| v.to_string()))
                .or_else(|| row.try_get::<f64, _>(idx).ok().map(|v| v.to_string()));
            (column.name().to_string(), value)
        })
        .collect()
}
