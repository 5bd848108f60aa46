//! Configured backends and the single current Assetstore.
//!
//! Every read of the `current` flag goes through the registry's read fence and
//! every change to it through the write fence, so no caller ever observes zero
//! or two current Assetstores while the set is non-empty.

use assetstore_core::{
    Assetstore, AssetstoreId, AssetstoreUpdate, Capacity, File, FileFilter, NewAssetstore,
};
use assetstore_error::{
    AssetstoreError, AssetstoreResult, ConflictError, NotFoundError, ValidationError,
};
use assetstore_interface::{AssetstoreAdapter, MetadataStore};
use assetstore_storage::AdapterFactory;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Tracks configured Assetstores and hands out their adapters.
///
/// # Example
///
/// ```rust
/// use assetstore::{AssetstoreRegistry, InMemoryMetadataStore};
/// use assetstore_core::{AssetstoreConfig, AssetstoreSettings, FilesystemConfig, NewAssetstore};
/// use assetstore_storage::AdapterFactory;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = AssetstoreRegistry::new(
///     Arc::new(InMemoryMetadataStore::new()),
///     AdapterFactory::new(AssetstoreSettings::default()),
/// );
/// let config = AssetstoreConfig::Filesystem(FilesystemConfig::new("/tmp/assetstore"));
/// let store = registry.create(NewAssetstore::new("Local", config)).await?;
/// assert!(store.current);
/// # Ok(())
/// # }
/// ```
pub struct AssetstoreRegistry {
    metadata: Arc<dyn MetadataStore>,
    factory: AdapterFactory,
    fence: RwLock<()>,
    adapters: RwLock<HashMap<AssetstoreId, Arc<dyn AssetstoreAdapter>>>,
}

impl AssetstoreRegistry {
    /// Registry over a metadata store, building adapters with `factory`.
    pub fn new(metadata: Arc<dyn MetadataStore>, factory: AdapterFactory) -> Self {
        Self {
            metadata,
            factory,
            fence: RwLock::new(()),
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Metadata store holding the records.
    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// Factory adapters are built with.
    pub fn factory(&self) -> &AdapterFactory {
        &self.factory
    }

    /// Validate and save a new Assetstore.
    ///
    /// The first Assetstore created becomes current whatever the request says.
    #[instrument(skip(self, request), fields(name = %request.name, kind = %request.config.kind()))]
    pub async fn create(&self, request: NewAssetstore) -> AssetstoreResult<Assetstore> {
        check_name(&request.name)?;
        if self
            .metadata
            .find_assetstore_by_name(&request.name)
            .await?
            .is_some()
        {
            return Err(duplicate_name(&request.name).into());
        }
        self.factory.validate(&request.config).await?;

        let _fence = self.fence.write().await;
        let mut store = Assetstore::new(request.name, request.config);
        store.current = request.current || self.metadata.list_assetstores().await?.is_empty();
        self.metadata.insert_assetstore(&store).await?;
        if store.current {
            self.metadata.clear_current_except(store.id).await?;
        }

        info!(id = %store.id, current = store.current, "Created assetstore");
        Ok(store)
    }

    /// Rename, reconfigure or promote an Assetstore.
    ///
    /// The resulting configuration is validated again, whatever changed. The
    /// backend type cannot change, and the current flag can only be moved by
    /// making another Assetstore current.
    #[instrument(skip(self, update), fields(id = %id))]
    pub async fn update(
        &self,
        id: AssetstoreId,
        update: AssetstoreUpdate,
    ) -> AssetstoreResult<Assetstore> {
        let existing = self.load(id).await?;
        if let Some(name) = &update.name {
            check_name(name)?;
        }
        if let Some(config) = &update.config
            && config.kind() != existing.kind()
        {
            return Err(ValidationError::field(
                "type",
                format!(
                    "The type of an assetstore cannot change from {} to {}.",
                    existing.kind(),
                    config.kind()
                ),
            )
            .into());
        }
        self.factory
            .validate(update.config.as_ref().unwrap_or(&existing.config))
            .await?;

        // Reload under the fence: the current flag may have moved meanwhile.
        let store = {
            let _fence = self.fence.write().await;
            let mut store = self.metadata.load_assetstore(id).await?;
            if update.current == Some(false) && store.current {
                return Err(ValidationError::field(
                    "current",
                    "Make another assetstore current instead of clearing the flag.",
                )
                .into());
            }
            if let Some(name) = update.name {
                if let Some(other) = self.metadata.find_assetstore_by_name(&name).await?
                    && other.id != id
                {
                    return Err(duplicate_name(&name).into());
                }
                store.name = name;
            }
            if let Some(config) = update.config {
                store.config = config;
            }
            self.metadata.update_assetstore(&store).await?;
            if update.current == Some(true) && !store.current {
                self.promote(id).await?;
                store.current = true;
            }
            store
        };
        self.invalidate(id).await;

        info!(name = %store.name, "Updated assetstore");
        Ok(store)
    }

    /// Load one Assetstore.
    pub async fn load(&self, id: AssetstoreId) -> AssetstoreResult<Assetstore> {
        let _fence = self.fence.read().await;
        self.metadata.load_assetstore(id).await
    }

    /// Every Assetstore, oldest first, with best-effort capacity.
    #[instrument(skip(self))]
    pub async fn list(&self) -> AssetstoreResult<Vec<Assetstore>> {
        let mut stores = {
            let _fence = self.fence.read().await;
            self.metadata.list_assetstores().await?
        };
        for store in &mut stores {
            self.add_computed_info(store).await;
        }
        debug!(count = stores.len(), "Listed assetstores");
        Ok(stores)
    }

    /// The current Assetstore.
    pub async fn current(&self) -> AssetstoreResult<Assetstore> {
        let _fence = self.fence.read().await;
        self.metadata
            .list_assetstores()
            .await?
            .into_iter()
            .find(|store| store.current)
            .ok_or_else(|| NotFoundError::new("No current assetstore is set.").into())
    }

    /// The given Assetstore, or the current one.
    pub async fn resolve(&self, id: Option<AssetstoreId>) -> AssetstoreResult<Assetstore> {
        match id {
            Some(id) => self.load(id).await,
            None => self.current().await,
        }
    }

    /// Make an Assetstore the current one.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn set_current(&self, id: AssetstoreId) -> AssetstoreResult<Assetstore> {
        let _fence = self.fence.write().await;
        let mut store = self.metadata.load_assetstore(id).await?;
        self.promote(id).await?;
        store.current = true;
        info!(name = %store.name, "Set current assetstore");
        Ok(store)
    }

    /// Remove an Assetstore that no File references.
    ///
    /// Deleting the current Assetstore promotes the oldest remaining one. No
    /// backend is contacted.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete(&self, id: AssetstoreId) -> AssetstoreResult<()> {
        {
            let _fence = self.fence.write().await;
            let store = self.metadata.load_assetstore(id).await?;
            let files = self
                .metadata
                .count_files(&FileFilter::default().assetstore(id))
                .await?;
            if files > 0 {
                return Err(ConflictError::new(
                    "You may not delete an assetstore that contains files.",
                )
                .into());
            }

            self.metadata.remove_assetstore(id).await?;
            if store.current
                && let Some(next) = self.metadata.list_assetstores().await?.into_iter().next()
            {
                self.promote(next.id).await?;
                info!(name = %next.name, "Promoted assetstore to current");
            }
            info!(name = %store.name, "Deleted assetstore");
        }
        self.invalidate(id).await;
        Ok(())
    }

    /// Files stored in an Assetstore.
    pub async fn files(&self, id: AssetstoreId) -> AssetstoreResult<Vec<File>> {
        self.metadata
            .list_files(&FileFilter::default().assetstore(id))
            .await
    }

    /// Fill in best-effort capacity.
    ///
    /// Both fields are left unknown when the adapter cannot be built, fails
    /// or does not answer within the probe timeout.
    pub async fn add_computed_info(&self, store: &mut Assetstore) {
        let timeout = self.factory.settings().probe.timeout();
        let capacity = match self.adapter(store).await {
            Ok(adapter) => match tokio::time::timeout(timeout, adapter.capacity_info()).await {
                Ok(Ok(capacity)) => capacity,
                Ok(Err(e)) => {
                    warn!(assetstore = %store.name, error = %e, "Capacity probe failed");
                    Capacity::unknown()
                }
                Err(_) => {
                    warn!(assetstore = %store.name, "Capacity probe timed out");
                    Capacity::unknown()
                }
            },
            Err(e) => {
                warn!(assetstore = %store.name, error = %e, "Unable to build adapter");
                Capacity::unknown()
            }
        };
        store.capacity = capacity;
    }

    /// Cached adapter for an Assetstore.
    pub async fn adapter(
        &self,
        store: &Assetstore,
    ) -> AssetstoreResult<Arc<dyn AssetstoreAdapter>> {
        if let Some(adapter) = self.adapters.read().await.get(&store.id) {
            return Ok(adapter.clone());
        }

        let mut adapters = self.adapters.write().await;
        if let Some(adapter) = adapters.get(&store.id) {
            return Ok(adapter.clone());
        }
        let adapter = self.factory.adapter(store).await?;
        adapters.insert(store.id, adapter.clone());
        debug!(assetstore = %store.name, "Cached adapter");
        Ok(adapter)
    }

    /// Cached adapter for an Assetstore id.
    pub async fn adapter_for(
        &self,
        id: AssetstoreId,
    ) -> AssetstoreResult<Arc<dyn AssetstoreAdapter>> {
        let store = self.load(id).await?;
        self.adapter(&store).await
    }

    /// Adapter for an Assetstore whose backend answers a probe.
    pub async fn require_adapter(
        &self,
        store: &Assetstore,
    ) -> AssetstoreResult<Arc<dyn AssetstoreAdapter>> {
        let adapter = self.adapter(store).await?;
        adapter.ping().await?;
        Ok(adapter)
    }

    // Callers hold the write fence.
    async fn promote(&self, id: AssetstoreId) -> AssetstoreResult<()> {
        self.metadata.set_current_flag(id, true).await?;
        self.metadata.clear_current_except(id).await
    }

    async fn invalidate(&self, id: AssetstoreId) {
        if self.adapters.write().await.remove(&id).is_some() {
            debug!(id = %id, "Dropped cached adapter");
        }
    }
}

fn check_name(name: &str) -> AssetstoreResult<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::field("name", "Name must not be empty.").into());
    }
    Ok(())
}

fn duplicate_name(name: &str) -> AssetstoreError {
    ConflictError::new(format!("An assetstore named {} already exists.", name)).into()
}
