//! Minimal model of the external folder/item/user hierarchy.

use crate::{FolderId, ItemId, UserId};
use serde::{Deserialize, Serialize};

/// An account that owns top-level folders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identifier
    pub id: UserId,
    /// Login name
    pub login: String,
}

/// Parent of a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum FolderParent {
    /// Nested folder
    Folder(FolderId),
    /// Top-level folder of a user
    User(UserId),
}

/// A named container of folders and items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    /// Identifier
    pub id: FolderId,
    /// Name, unique among siblings
    pub name: String,
    /// Owner
    pub parent: FolderParent,
}

impl Folder {
    /// Create a folder with a fresh id.
    pub fn new(name: impl Into<String>, parent: FolderParent) -> Self {
        Self {
            id: FolderId::new(),
            name: name.into(),
            parent,
        }
    }
}

/// A named group of files inside a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Identifier
    pub id: ItemId,
    /// Name, unique within the folder
    pub name: String,
    /// Owning folder
    pub folder_id: FolderId,
    /// Total bytes of the files it holds
    #[serde(default)]
    pub size: u64,
}

impl Item {
    /// Create an empty item with a fresh id.
    pub fn new(name: impl Into<String>, folder_id: FolderId) -> Self {
        Self {
            id: ItemId::new(),
            name: name.into(),
            folder_id,
            size: 0,
        }
    }
}

/// Where an import places what it discovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ImportDestination {
    /// Folder receiving the imported tree
    Folder(FolderId),
    /// Always rejected; files need a folder above them
    User(UserId),
}

/// Where a finished upload lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum UploadParent {
    /// A new item named after the file is created in the folder
    Folder(FolderId),
    /// The file is added to an existing item
    Item(ItemId),
}
