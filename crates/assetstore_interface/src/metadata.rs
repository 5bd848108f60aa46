//! Metadata store contract.
//!
//! The metadata store persists Assetstore, File and hierarchy records. It is
//! an external collaborator; the engines only need the operations below.

use assetstore_core::{
    Assetstore, AssetstoreId, File, FileFilter, FileId, Folder, FolderId, FolderParent, Item,
    ItemId, User, UserId,
};
use assetstore_error::AssetstoreResult;
use async_trait::async_trait;

/// Persistence for assetstore, file and hierarchy records.
///
/// Every write is atomic per record. Implementations report missing records
/// on `load_*`, `update_*` and `remove_*` with a `NotFoundError`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a new Assetstore record.
    async fn insert_assetstore(&self, store: &Assetstore) -> AssetstoreResult<()>;

    /// Overwrite an existing Assetstore record.
    async fn update_assetstore(&self, store: &Assetstore) -> AssetstoreResult<()>;

    /// Load an Assetstore by id.
    async fn load_assetstore(&self, id: AssetstoreId) -> AssetstoreResult<Assetstore>;

    /// Find an Assetstore by its unique name.
    async fn find_assetstore_by_name(&self, name: &str) -> AssetstoreResult<Option<Assetstore>>;

    /// All Assetstores, oldest first.
    async fn list_assetstores(&self) -> AssetstoreResult<Vec<Assetstore>>;

    /// Remove an Assetstore record.
    async fn remove_assetstore(&self, id: AssetstoreId) -> AssetstoreResult<()>;

    /// Set the `current` flag of one Assetstore.
    async fn set_current_flag(&self, id: AssetstoreId, current: bool) -> AssetstoreResult<()>;

    /// Clear the `current` flag on every Assetstore except `id`.
    async fn clear_current_except(&self, id: AssetstoreId) -> AssetstoreResult<()>;

    /// Insert or overwrite a File record.
    async fn save_file(&self, file: &File) -> AssetstoreResult<()>;

    /// Load a File by id.
    async fn load_file(&self, id: FileId) -> AssetstoreResult<File>;

    /// Remove a File record.
    async fn remove_file(&self, id: FileId) -> AssetstoreResult<()>;

    /// Files matching a filter, oldest first.
    async fn list_files(&self, filter: &FileFilter) -> AssetstoreResult<Vec<File>>;

    /// Number of files matching a filter.
    async fn count_files(&self, filter: &FileFilter) -> AssetstoreResult<u64>;

    /// Insert a user.
    async fn insert_user(&self, user: &User) -> AssetstoreResult<()>;

    /// Load a user by id.
    async fn load_user(&self, id: UserId) -> AssetstoreResult<User>;

    /// Insert a folder.
    async fn insert_folder(&self, folder: &Folder) -> AssetstoreResult<()>;

    /// Load a folder by id.
    async fn load_folder(&self, id: FolderId) -> AssetstoreResult<Folder>;

    /// Find a child folder by name.
    async fn find_child_folder(
        &self,
        parent: FolderParent,
        name: &str,
    ) -> AssetstoreResult<Option<Folder>>;

    /// Folders directly under a parent.
    async fn list_child_folders(&self, parent: FolderParent) -> AssetstoreResult<Vec<Folder>>;

    /// Insert an item.
    async fn insert_item(&self, item: &Item) -> AssetstoreResult<()>;

    /// Overwrite an existing item.
    async fn update_item(&self, item: &Item) -> AssetstoreResult<()>;

    /// Load an item by id.
    async fn load_item(&self, id: ItemId) -> AssetstoreResult<Item>;

    /// Find an item in a folder by name.
    async fn find_item(&self, folder_id: FolderId, name: &str) -> AssetstoreResult<Option<Item>>;

    /// Items directly in a folder.
    async fn list_items(&self, folder_id: FolderId) -> AssetstoreResult<Vec<Item>>;

    /// Find a file in an item by name.
    async fn find_file_in_item(&self, item_id: ItemId, name: &str)
    -> AssetstoreResult<Option<File>>;
}
