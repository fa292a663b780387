// SQLite BulkOperationStore Implementation

use crate::error::{corrupt, map_sqlx_error};
use async_trait::async_trait;
use realty_core::domain::{BulkId, BulkItems, BulkKind, BulkOperation};
use realty_core::error::Result;
use realty_core::port::BulkOperationStore;
use sqlx::SqlitePool;

pub struct SqliteBulkOperationStore {
    pool: SqlitePool,
}

impl SqliteBulkOperationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BulkOperationStore for SqliteBulkOperationStore {
    async fn save_bulk_operation(&self, operation: &BulkOperation) -> Result<()> {
        let items = serde_json::to_string(&operation.items)?;
        sqlx::query(
            r#"
            INSERT INTO bulk_operations (id, kind, created_at, items)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET items = excluded.items
            "#,
        )
        .bind(&operation.id)
        .bind(operation.kind.as_str())
        .bind(operation.created_at)
        .bind(items)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn load_bulk_operation(&self, id: &BulkId) -> Result<Option<BulkOperation>> {
        let row = sqlx::query_as::<_, BulkRow>(
            "SELECT id, kind, created_at, items FROM bulk_operations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(BulkRow::into_operation).transpose()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BulkRow {
    id: String,
    kind: String,
    created_at: i64,
    items: String,
}

impl BulkRow {
    fn into_operation(self) -> Result<BulkOperation> {
        let kind: BulkKind = self
            .kind
            .parse()
            .map_err(|e| corrupt("bulk_operations", &self.id, e))?;
        let items: BulkItems = serde_json::from_str(&self.items)
            .map_err(|e| corrupt("bulk_operations", &self.id, e))?;

        Ok(BulkOperation {
            id: self.id,
            kind,
            created_at: self.created_at,
            items,
        })
    }
}
