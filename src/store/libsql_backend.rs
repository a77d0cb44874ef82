//! libSQL backend: async `ExpressionStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::expressions::{Expression, ExpressionStatus, Outcome};
use crate::store::migrations;
use crate::store::traits::ExpressionStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<f64>` to libsql Value.
fn opt_real(v: Option<f64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Real(v),
        None => libsql::Value::Null,
    }
}

/// Map a libsql Row to an Expression.
///
/// Column order matches EXPRESSION_COLUMNS:
/// 0:id, 1:owner, 2:expr, 3:status, 4:result, 5:created_at
fn row_to_expression(row: &libsql::Row) -> Result<Expression, libsql::Error> {
    let status_str: String = row.get(3)?;
    let created_str: String = row.get(5)?;

    let status = status_str.parse().unwrap_or_else(|e| {
        warn!(error = %e, "Unknown status in expressions row, treating as error");
        ExpressionStatus::Error
    });

    Ok(Expression {
        id: row.get(0)?,
        owner: row.get(1)?,
        text: row.get(2)?,
        status,
        // Result is only meaningful once done, whatever the column holds.
        result: match status {
            ExpressionStatus::Done => row.get::<f64>(4).ok(),
            _ => None,
        },
        created_at: parse_datetime(&created_str),
    })
}

async fn collect_expressions(
    mut rows: libsql::Rows,
    op: &str,
) -> Result<Vec<Expression>, DatabaseError> {
    let mut expressions = Vec::new();
    loop {
        match rows.next().await {
            Ok(Some(row)) => match row_to_expression(&row) {
                Ok(expr) => expressions.push(expr),
                Err(e) => warn!("{op}: skipping expression row: {e}"),
            },
            Ok(None) => break,
            Err(e) => return Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }
    Ok(expressions)
}

// ── Trait implementation ────────────────────────────────────────────

const EXPRESSION_COLUMNS: &str = "id, owner, expr, status, result, created_at";

#[async_trait]
impl ExpressionStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn insert_expression(&self, expr: &Expression) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let created_at = expr.created_at.to_rfc3339();
        conn.execute(
            "INSERT INTO expressions (id, owner, expr, status, result, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                expr.id.clone(),
                expr.owner.clone(),
                expr.text.clone(),
                expr.status.as_str(),
                opt_real(expr.result),
                created_at,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_expression: {e}")))?;

        debug!(expr_id = %expr.id, owner = %expr.owner, "Expression inserted into DB");
        Ok(())
    }

    async fn get_expression(
        &self,
        owner: &str,
        id: &str,
    ) -> Result<Option<Expression>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {EXPRESSION_COLUMNS} FROM expressions WHERE id = ?1 AND owner = ?2"),
                params![id, owner],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_expression: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let expr = row_to_expression(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_expression row parse: {e}")))?;
                Ok(Some(expr))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_expression: {e}"))),
        }
    }

    async fn list_expressions(&self, owner: &str) -> Result<Vec<Expression>, DatabaseError> {
        let conn = self.conn();
        let rows = conn
            .query(
                &format!(
                    "SELECT {EXPRESSION_COLUMNS} FROM expressions WHERE owner = ?1 ORDER BY created_at ASC, rowid ASC"
                ),
                params![owner],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_expressions: {e}")))?;

        collect_expressions(rows, "list_expressions").await
    }

    async fn finish_expression(
        &self,
        owner: &str,
        id: &str,
        outcome: Outcome,
    ) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        let updated = conn
            .execute(
                "UPDATE expressions SET status = ?1, result = ?2, updated_at = ?3
                 WHERE id = ?4 AND owner = ?5 AND status = ?6",
                params![
                    outcome.status().as_str(),
                    opt_real(outcome.result()),
                    now,
                    id,
                    owner,
                    ExpressionStatus::Pending.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("finish_expression: {e}")))?;

        debug!(expr_id = %id, status = %outcome.status(), updated, "Expression finish applied");
        Ok(updated > 0)
    }

    async fn list_pending(&self) -> Result<Vec<Expression>, DatabaseError> {
        let conn = self.conn();
        let rows = conn
            .query(
                &format!(
                    "SELECT {EXPRESSION_COLUMNS} FROM expressions WHERE status = ?1 ORDER BY created_at ASC, rowid ASC"
                ),
                params![ExpressionStatus::Pending.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_pending: {e}")))?;

        collect_expressions(rows, "list_pending").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn insert_and_get() {
        let db = test_db().await;
        let expr = Expression::new("alice", "1 + 1");
        db.insert_expression(&expr).await.unwrap();

        let fetched = db.get_expression("alice", &expr.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, expr.id);
        assert_eq!(fetched.owner, "alice");
        assert_eq!(fetched.text, "1 + 1");
        assert_eq!(fetched.status, ExpressionStatus::Pending);
        assert_eq!(fetched.result, None);
    }

    #[tokio::test]
    async fn get_is_scoped_to_owner() {
        let db = test_db().await;
        let expr = Expression::new("alice", "1 + 1");
        db.insert_expression(&expr).await.unwrap();

        assert!(db.get_expression("bob", &expr.id).await.unwrap().is_none());
        assert!(db.list_expressions("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_not_found() {
        let db = test_db().await;
        assert!(db.get_expression("alice", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_returns_owner_expressions_in_order() {
        let db = test_db().await;
        let first = Expression::new("alice", "1");
        let second = Expression::new("alice", "2");
        let other = Expression::new("bob", "3");
        for e in [&first, &second, &other] {
            db.insert_expression(e).await.unwrap();
        }

        let listed = db.list_expressions("alice").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
    }

    #[tokio::test]
    async fn finish_done_stores_result() {
        let db = test_db().await;
        let expr = Expression::new("alice", "2 * 3");
        db.insert_expression(&expr).await.unwrap();

        assert!(db.finish_expression("alice", &expr.id, Outcome::Done(6.0)).await.unwrap());

        let fetched = db.get_expression("alice", &expr.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ExpressionStatus::Done);
        assert_eq!(fetched.result, Some(6.0));
    }

    #[tokio::test]
    async fn finish_error_leaves_result_unset() {
        let db = test_db().await;
        let expr = Expression::new("alice", "1 / (1 - 1)");
        db.insert_expression(&expr).await.unwrap();

        assert!(db.finish_expression("alice", &expr.id, Outcome::Error).await.unwrap());

        let fetched = db.get_expression("alice", &expr.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ExpressionStatus::Error);
        assert_eq!(fetched.result, None);
    }

    #[tokio::test]
    async fn finish_is_single_shot() {
        let db = test_db().await;
        let expr = Expression::new("alice", "1 + 1");
        db.insert_expression(&expr).await.unwrap();

        assert!(db.finish_expression("alice", &expr.id, Outcome::Done(2.0)).await.unwrap());
        assert!(!db.finish_expression("alice", &expr.id, Outcome::Error).await.unwrap());
        assert!(!db.finish_expression("alice", &expr.id, Outcome::Done(9.0)).await.unwrap());

        let fetched = db.get_expression("alice", &expr.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ExpressionStatus::Done);
        assert_eq!(fetched.result, Some(2.0));
    }

    #[tokio::test]
    async fn finish_requires_matching_owner() {
        let db = test_db().await;
        let expr = Expression::new("alice", "1 + 1");
        db.insert_expression(&expr).await.unwrap();

        assert!(!db.finish_expression("bob", &expr.id, Outcome::Done(2.0)).await.unwrap());
        let fetched = db.get_expression("alice", &expr.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ExpressionStatus::Pending);
    }

    #[tokio::test]
    async fn list_pending_spans_owners() {
        let db = test_db().await;
        let a = Expression::new("alice", "1");
        let b = Expression::new("bob", "2");
        let c = Expression::new("bob", "3");
        for e in [&a, &b, &c] {
            db.insert_expression(e).await.unwrap();
        }
        db.finish_expression("bob", &b.id, Outcome::Done(2.0)).await.unwrap();

        let pending = db.list_pending().await.unwrap();
        let ids: Vec<_> = pending.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![a.id.clone(), c.id.clone()]);
    }

    #[tokio::test]
    async fn open_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("dir").join("calc.db");
        let db = LibSqlBackend::new_local(&db_path).await.unwrap();
        assert!(db_path.exists());
        drop(db);
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("calc.db");
        let expr = Expression::new("alice", "4 - 1");
        {
            let db = LibSqlBackend::new_local(&db_path).await.unwrap();
            db.insert_expression(&expr).await.unwrap();
        }

        let db = LibSqlBackend::new_local(&db_path).await.unwrap();
        let fetched = db.get_expression("alice", &expr.id).await.unwrap().unwrap();
        assert_eq!(fetched.text, "4 - 1");
    }
}
