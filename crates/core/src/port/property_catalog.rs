// Property Catalog Port
//
// Property CRUD lives elsewhere; the publication core only reads listing
// snapshots and applies bulk price changes.

use crate::domain::Property;
use crate::error::Result;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PropertyCatalog: Send + Sync {
    /// Current listing data, `None` if the property does not exist
    async fn get_property(&self, id: &str) -> Result<Option<Property>>;

    /// Overwrite the asking price
    async fn update_price(&self, id: &str, new_price: f64) -> Result<()>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryPropertyCatalog {
        properties: Mutex<HashMap<String, Property>>,
        failing_updates: Mutex<HashSet<String>>,
    }

    impl InMemoryPropertyCatalog {
        pub fn new() -> Self {
            Self::default()
        }

        /// Catalog pre-filled with `ids`, each priced at `price`
        pub fn with_properties(ids: &[&str], price: f64) -> Self {
            let catalog = Self::new();
            for id in ids {
                catalog.insert(Property {
                    id: id.to_string(),
                    reference: format!("REF-{}", id),
                    title: format!("Property {}", id),
                    price,
                    attributes: serde_json::json!({}),
                });
            }
            catalog
        }

        pub fn insert(&self, property: Property) {
            self.properties
                .lock()
                .unwrap()
                .insert(property.id.clone(), property);
        }

        /// Make `update_price` fail for one property
        pub fn fail_updates_for(&self, id: &str) {
            self.failing_updates.lock().unwrap().insert(id.to_string());
        }

        pub fn price_of(&self, id: &str) -> Option<f64> {
            self.properties.lock().unwrap().get(id).map(|p| p.price)
        }
    }

    #[async_trait]
    impl PropertyCatalog for InMemoryPropertyCatalog {
        async fn get_property(&self, id: &str) -> Result<Option<Property>> {
            Ok(self.properties.lock().unwrap().get(id).cloned())
        }

        async fn update_price(&self, id: &str, new_price: f64) -> Result<()> {
            if self.failing_updates.lock().unwrap().contains(id) {
                return Err(AppError::Database(format!("price update rejected for {}", id)));
            }
            let mut properties = self.properties.lock().unwrap();
            let property = properties
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("Property {} not found", id)))?;
            property.price = new_price;
            Ok(())
        }
    }
}
