use std::sync::Arc;

use common::storage::StrategyStores;
use object_store::ObjectStore;
use object_store::path::Path;

use super::{StoreError, StoreResult};

/// Key of a binary object in its strategy store.
pub fn object_key(object_id: &str) -> Path {
    Path::from(format!("objects/{object_id}"))
}

/// Key of the stored metadata copy of a unit.
pub fn unit_backup_key(unit_id: &str) -> Path {
    Path::from(format!("units/{unit_id}.json"))
}

/// Key of the stored metadata copy of an object group.
pub fn object_group_backup_key(object_group_id: &str) -> Path {
    Path::from(format!("objectgroups/{object_group_id}.json"))
}

/// Binary storage, one object store per storage strategy.
#[derive(Clone)]
pub struct BinaryStore {
    stores: Arc<StrategyStores>,
}

impl std::fmt::Debug for BinaryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut strategies: Vec<_> = self.stores.keys().collect();
        strategies.sort();
        f.debug_struct("BinaryStore")
            .field("strategies", &strategies)
            .finish()
    }
}

impl BinaryStore {
    pub fn new(stores: StrategyStores) -> Self {
        Self {
            stores: Arc::new(stores),
        }
    }

    pub fn strategy(&self, strategy_id: &str) -> StoreResult<Arc<dyn ObjectStore>> {
        self.stores
            .get(strategy_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownStrategy(strategy_id.to_string()))
    }

    /// Delete if exists.
    pub async fn delete(&self, strategy_id: &str, key: &Path) -> StoreResult<()> {
        let store = self.strategy(strategy_id)?;
        match store.delete(key).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => {
                tracing::debug!(strategy_id = %strategy_id, key = %key, "Binary already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::PutPayload;
    use object_store::local::LocalFileSystem;
    use object_store::memory::InMemory;

    fn stores() -> StrategyStores {
        let mut stores = StrategyStores::new();
        stores.insert(
            "default".to_string(),
            Arc::new(InMemory::new()) as Arc<dyn ObjectStore>,
        );
        stores
    }

    #[tokio::test]
    async fn test_delete_removes_object() {
        let binaries = BinaryStore::new(stores());
        let store = binaries.strategy("default").unwrap();
        let key = object_key("obj-1");
        store
            .put(&key, PutPayload::from_static(b"payload"))
            .await
            .unwrap();

        binaries.delete("default", &key).await.unwrap();

        assert!(matches!(
            store.head(&key).await,
            Err(object_store::Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_object_is_ok() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut stores = StrategyStores::new();
        stores.insert(
            "local".to_string(),
            Arc::new(LocalFileSystem::new_with_prefix(dir.path()).unwrap()) as Arc<dyn ObjectStore>,
        );
        let binaries = BinaryStore::new(stores);

        binaries
            .delete("local", &object_key("never-stored"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_strategy() {
        let binaries = BinaryStore::new(stores());
        let result = binaries.delete("offsite", &object_key("obj-1")).await;
        assert!(matches!(result, Err(StoreError::UnknownStrategy(s)) if s == "offsite"));
    }

    #[test]
    fn test_keys() {
        assert_eq!(object_key("o1").as_ref(), "objects/o1");
        assert_eq!(unit_backup_key("u1").as_ref(), "units/u1.json");
        assert_eq!(
            object_group_backup_key("g1").as_ref(),
            "objectgroups/g1.json"
        );
    }
}
