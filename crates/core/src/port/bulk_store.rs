// Bulk Operation Store Port

use crate::domain::{BulkId, BulkOperation};
use crate::error::Result;
use async_trait::async_trait;

/// Persists bulk operation records. Summaries are never stored here.
#[async_trait]
pub trait BulkOperationStore: Send + Sync {
    async fn save_bulk_operation(&self, operation: &BulkOperation) -> Result<()>;

    async fn load_bulk_operation(&self, id: &BulkId) -> Result<Option<BulkOperation>>;
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryBulkStore {
        operations: Mutex<HashMap<BulkId, BulkOperation>>,
    }

    impl InMemoryBulkStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl BulkOperationStore for InMemoryBulkStore {
        async fn save_bulk_operation(&self, operation: &BulkOperation) -> Result<()> {
            self.operations
                .lock()
                .unwrap()
                .insert(operation.id.clone(), operation.clone());
            Ok(())
        }

        async fn load_bulk_operation(&self, id: &BulkId) -> Result<Option<BulkOperation>> {
            Ok(self.operations.lock().unwrap().get(id).cloned())
        }
    }
}
