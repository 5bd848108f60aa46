//! Builds the adapter matching an Assetstore's type.

use crate::document_store::{
    DocumentStoreAdapter, DocumentStoreConnector, MongoDocumentStoreConnector,
};
use crate::filesystem::FilesystemAdapter;
use crate::object_store::{HttpObjectStoreConnector, ObjectStoreAdapter, ObjectStoreConnector};
use assetstore_core::{Assetstore, AssetstoreConfig, AssetstoreSettings};
use assetstore_error::AssetstoreResult;
use assetstore_interface::AssetstoreAdapter;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Creates adapters and validates backend configuration.
///
/// Object stores are reached through an [`ObjectStoreConnector`] (S3 over
/// HTTP by default) and document stores through a [`DocumentStoreConnector`]
/// (MongoDB by default).
#[derive(Clone)]
pub struct AdapterFactory {
    settings: AssetstoreSettings,
    object_connector: Arc<dyn ObjectStoreConnector>,
    document_connector: Arc<dyn DocumentStoreConnector>,
}

impl AdapterFactory {
    /// Factory with the default connectors.
    pub fn new(settings: AssetstoreSettings) -> Self {
        let document_connector = MongoDocumentStoreConnector::new(settings.probe.timeout());
        Self {
            settings,
            object_connector: Arc::new(HttpObjectStoreConnector::new()),
            document_connector: Arc::new(document_connector),
        }
    }

    /// Use another object-store connector.
    pub fn with_object_connector(mut self, connector: Arc<dyn ObjectStoreConnector>) -> Self {
        self.object_connector = connector;
        self
    }

    /// Use another document-store connector.
    pub fn with_document_connector(mut self, connector: Arc<dyn DocumentStoreConnector>) -> Self {
        self.document_connector = connector;
        self
    }

    /// Settings adapters are built with.
    pub fn settings(&self) -> &AssetstoreSettings {
        &self.settings
    }

    /// Adapter for an Assetstore.
    #[instrument(skip(self, assetstore), fields(assetstore = %assetstore.name, kind = %assetstore.kind()))]
    pub async fn adapter(&self, assetstore: &Assetstore) -> AssetstoreResult<Arc<dyn AssetstoreAdapter>> {
        let probe = self.settings.probe.clone();
        let adapter: Arc<dyn AssetstoreAdapter> = match &assetstore.config {
            AssetstoreConfig::Filesystem(_) => Arc::new(FilesystemAdapter::new(
                assetstore.clone(),
                self.settings.filesystem.chunk_size,
                probe,
            )?),
            AssetstoreConfig::ObjectStore(config) => {
                let client = self
                    .object_connector
                    .connect(config, &self.settings.object_store)
                    .await?;
                Arc::new(ObjectStoreAdapter::new(
                    assetstore.clone(),
                    client,
                    self.settings.object_store.clone(),
                    probe,
                )?)
            }
            AssetstoreConfig::DocumentStore(config) => {
                let collection = self.document_connector.connect(config).await?;
                Arc::new(DocumentStoreAdapter::new(
                    assetstore.clone(),
                    collection,
                    self.settings.document_store.chunk_size,
                    probe,
                )?)
            }
        };
        debug!("Built adapter");
        Ok(adapter)
    }

    /// Validate a configuration before it is saved.
    #[instrument(skip(self, config), fields(kind = %config.kind()))]
    pub async fn validate(&self, config: &AssetstoreConfig) -> AssetstoreResult<()> {
        match config {
            AssetstoreConfig::Filesystem(config) => FilesystemAdapter::validate(config).await,
            AssetstoreConfig::ObjectStore(config) => {
                ObjectStoreAdapter::check_config(config, &self.settings.object_store)?;
                let client = self
                    .object_connector
                    .connect(config, &self.settings.object_store)
                    .await?;
                ObjectStoreAdapter::validate(config, &self.settings.object_store, client.as_ref())
                    .await
            }
            AssetstoreConfig::DocumentStore(config) => {
                DocumentStoreAdapter::validate(config)?;
                let collection = self.document_connector.connect(config).await?;
                collection.ping().await
            }
        }
    }
}
