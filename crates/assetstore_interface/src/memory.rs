//! In-memory implementation of MetadataStore for testing and embedding.
//!
//! Records live in HashMaps protected by RwLocks. All data is lost when the
//! store is dropped.

use crate::MetadataStore;
use assetstore_core::{
    Assetstore, AssetstoreId, File, FileFilter, FileId, Folder, FolderId, FolderParent, Item,
    ItemId, User, UserId,
};
use assetstore_error::{AssetstoreResult, ConflictError, NotFoundError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory metadata store.
///
/// # Example
/// ```
/// use assetstore_interface::InMemoryMetadataStore;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryMetadataStore::new();
///     let (user, public, _private) = store.create_user("admin").await.unwrap();
///     assert_eq!(user.login, "admin");
///     assert_eq!(public.name, "Public");
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadataStore {
    assetstores: Arc<RwLock<HashMap<AssetstoreId, Assetstore>>>,
    files: Arc<RwLock<HashMap<FileId, File>>>,
    users: Arc<RwLock<HashMap<UserId, User>>>,
    folders: Arc<RwLock<HashMap<FolderId, Folder>>>,
    items: Arc<RwLock<HashMap<ItemId, Item>>>,
}

impl InMemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a user with its "Public" and "Private" top-level folders.
    pub async fn create_user(&self, login: &str) -> AssetstoreResult<(User, Folder, Folder)> {
        let user = User {
            id: UserId::new(),
            login: login.to_string(),
        };
        self.insert_user(&user).await?;
        let public = Folder::new("Public", FolderParent::User(user.id));
        let private = Folder::new("Private", FolderParent::User(user.id));
        self.insert_folder(&public).await?;
        self.insert_folder(&private).await?;
        debug!(login, "Created user with default folders");
        Ok((user, public, private))
    }

    /// Number of file records.
    pub async fn file_count(&self) -> usize {
        self.files.read().await.len()
    }
}

fn missing(kind: &str, id: impl std::fmt::Display) -> NotFoundError {
    NotFoundError::new(format!("{} not found: {}", kind, id))
}

fn oldest_first<T, K: Ord>(mut records: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    records.sort_by_key(|r| key(r));
    records
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn insert_assetstore(&self, store: &Assetstore) -> AssetstoreResult<()> {
        let mut stores = self.assetstores.write().await;
        if stores.values().any(|s| s.name == store.name) {
            return Err(ConflictError::new(format!(
                "An assetstore named {} already exists.",
                store.name
            ))
            .into());
        }
        stores.insert(store.id, store.clone());
        Ok(())
    }

    async fn update_assetstore(&self, store: &Assetstore) -> AssetstoreResult<()> {
        let mut stores = self.assetstores.write().await;
        match stores.get_mut(&store.id) {
            Some(existing) => {
                *existing = store.clone();
                Ok(())
            }
            None => Err(missing("Assetstore", store.id).into()),
        }
    }

    async fn load_assetstore(&self, id: AssetstoreId) -> AssetstoreResult<Assetstore> {
        self.assetstores
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| missing("Assetstore", id).into())
    }

    async fn find_assetstore_by_name(&self, name: &str) -> AssetstoreResult<Option<Assetstore>> {
        Ok(self
            .assetstores
            .read()
            .await
            .values()
            .find(|s| s.name == name)
            .cloned())
    }

    async fn list_assetstores(&self) -> AssetstoreResult<Vec<Assetstore>> {
        let stores: Vec<Assetstore> = self.assetstores.read().await.values().cloned().collect();
        Ok(oldest_first(stores, |s| s.created))
    }

    async fn remove_assetstore(&self, id: AssetstoreId) -> AssetstoreResult<()> {
        self.assetstores
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| missing("Assetstore", id).into())
    }

    async fn set_current_flag(&self, id: AssetstoreId, current: bool) -> AssetstoreResult<()> {
        let mut stores = self.assetstores.write().await;
        match stores.get_mut(&id) {
            Some(store) => {
                store.current = current;
                Ok(())
            }
            None => Err(missing("Assetstore", id).into()),
        }
    }

    async fn clear_current_except(&self, id: AssetstoreId) -> AssetstoreResult<()> {
        let mut stores = self.assetstores.write().await;
        for store in stores.values_mut().filter(|s| s.id != id) {
            store.current = false;
        }
        Ok(())
    }

    async fn save_file(&self, file: &File) -> AssetstoreResult<()> {
        self.files.write().await.insert(file.id, file.clone());
        Ok(())
    }

    async fn load_file(&self, id: FileId) -> AssetstoreResult<File> {
        self.files
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| missing("File", id).into())
    }

    async fn remove_file(&self, id: FileId) -> AssetstoreResult<()> {
        self.files
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| missing("File", id).into())
    }

    async fn list_files(&self, filter: &FileFilter) -> AssetstoreResult<Vec<File>> {
        let files: Vec<File> = self
            .files
            .read()
            .await
            .values()
            .filter(|f| filter.matches(f))
            .cloned()
            .collect();
        Ok(oldest_first(files, |f| f.created))
    }

    async fn count_files(&self, filter: &FileFilter) -> AssetstoreResult<u64> {
        Ok(self
            .files
            .read()
            .await
            .values()
            .filter(|f| filter.matches(f))
            .count() as u64)
    }

    async fn insert_user(&self, user: &User) -> AssetstoreResult<()> {
        self.users.write().await.insert(user.id, user.clone());
        Ok(())
    }

    async fn load_user(&self, id: UserId) -> AssetstoreResult<User> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| missing("User", id).into())
    }

    async fn insert_folder(&self, folder: &Folder) -> AssetstoreResult<()> {
        self.folders.write().await.insert(folder.id, folder.clone());
        Ok(())
    }

    async fn load_folder(&self, id: FolderId) -> AssetstoreResult<Folder> {
        self.folders
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| missing("Folder", id).into())
    }

    async fn find_child_folder(
        &self,
        parent: FolderParent,
        name: &str,
    ) -> AssetstoreResult<Option<Folder>> {
        Ok(self
            .folders
            .read()
            .await
            .values()
            .find(|f| f.parent == parent && f.name == name)
            .cloned())
    }

    async fn list_child_folders(&self, parent: FolderParent) -> AssetstoreResult<Vec<Folder>> {
        let mut folders: Vec<Folder> = self
            .folders
            .read()
            .await
            .values()
            .filter(|f| f.parent == parent)
            .cloned()
            .collect();
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(folders)
    }

    async fn insert_item(&self, item: &Item) -> AssetstoreResult<()> {
        self.items.write().await.insert(item.id, item.clone());
        Ok(())
    }

    async fn update_item(&self, item: &Item) -> AssetstoreResult<()> {
        let mut items = self.items.write().await;
        match items.get_mut(&item.id) {
            Some(existing) => {
                *existing = item.clone();
                Ok(())
            }
            None => Err(missing("Item", item.id).into()),
        }
    }

    async fn load_item(&self, id: ItemId) -> AssetstoreResult<Item> {
        self.items
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| missing("Item", id).into())
    }

    async fn find_item(&self, folder_id: FolderId, name: &str) -> AssetstoreResult<Option<Item>> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .find(|i| i.folder_id == folder_id && i.name == name)
            .cloned())
    }

    async fn list_items(&self, folder_id: FolderId) -> AssetstoreResult<Vec<Item>> {
        let mut items: Vec<Item> = self
            .items
            .read()
            .await
            .values()
            .filter(|i| i.folder_id == folder_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn find_file_in_item(
        &self,
        item_id: ItemId,
        name: &str,
    ) -> AssetstoreResult<Option<File>> {
        Ok(self
            .files
            .read()
            .await
            .values()
            .find(|f| f.item_id == Some(item_id) && f.name == name)
            .cloned())
    }
}
