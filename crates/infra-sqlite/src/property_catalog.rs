// SQLite PropertyCatalog Implementation

use crate::error::{corrupt, map_sqlx_error};
use async_trait::async_trait;
use realty_core::domain::Property;
use realty_core::error::{AppError, Result};
use realty_core::port::{PropertyCatalog, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqlitePropertyCatalog {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqlitePropertyCatalog {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Insert or replace a listing snapshot
    pub async fn upsert_property(&self, property: &Property) -> Result<()> {
        let attributes = serde_json::to_string(&property.attributes)?;
        sqlx::query(
            r#"
            INSERT INTO properties (id, reference, title, price, attributes, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                reference = excluded.reference,
                title = excluded.title,
                price = excluded.price,
                attributes = excluded.attributes,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&property.id)
        .bind(&property.reference)
        .bind(&property.title)
        .bind(property.price)
        .bind(attributes)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

#[async_trait]
impl PropertyCatalog for SqlitePropertyCatalog {
    async fn get_property(&self, id: &str) -> Result<Option<Property>> {
        let row = sqlx::query_as::<_, PropertyRow>(
            "SELECT id, reference, title, price, attributes FROM properties WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(PropertyRow::into_property).transpose()
    }

    async fn update_price(&self, id: &str, new_price: f64) -> Result<()> {
        let result = sqlx::query("UPDATE properties SET price = ?, updated_at = ? WHERE id = ?")
            .bind(new_price)
            .bind(self.time_provider.now_millis())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Property {} not found", id)));
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PropertyRow {
    id: String,
    reference: String,
    title: String,
    price: f64,
    attributes: String,
}

impl PropertyRow {
    fn into_property(self) -> Result<Property> {
        let attributes = serde_json::from_str(&self.attributes)
            .map_err(|e| corrupt("properties", &self.id, e))?;
        Ok(Property {
            id: self.id,
            reference: self.reference,
            title: self.title,
            price: self.price,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use realty_core::port::time_provider::ManualClock;

    async fn setup_test_db() -> SqlitePropertyCatalog {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqlitePropertyCatalog::new(pool, Arc::new(ManualClock::new(1_000)))
    }

    fn flat() -> Property {
        Property {
            id: "p1".into(),
            reference: "REF-001".into(),
            title: "Two-bedroom flat".into(),
            price: 250_000.0,
            attributes: serde_json::json!({"bedrooms": 2, "city": "Valencia"}),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let catalog = setup_test_db().await;
        catalog.upsert_property(&flat()).await.unwrap();

        let found = catalog.get_property("p1").await.unwrap().unwrap();
        assert_eq!(found, flat());
        assert!(catalog.get_property("p2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_price() {
        let catalog = setup_test_db().await;
        catalog.upsert_property(&flat()).await.unwrap();

        catalog.update_price("p1", 240_000.0).await.unwrap();
        assert_eq!(
            catalog.get_property("p1").await.unwrap().unwrap().price,
            240_000.0
        );

        assert!(matches!(
            catalog.update_price("missing", 1.0).await,
            Err(AppError::NotFound(_))
        ));
    }
}
