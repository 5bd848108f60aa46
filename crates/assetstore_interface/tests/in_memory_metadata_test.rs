//! Tests for the in-memory metadata store.

use assetstore_core::{
    Assetstore, AssetstoreConfig, BackendRef, File, FileFilter, FilesystemConfig, Folder,
    FolderParent, Item,
};
use assetstore_interface::{InMemoryMetadataStore, MetadataStore};

fn fs_store(name: &str) -> Assetstore {
    Assetstore::new(
        name,
        AssetstoreConfig::Filesystem(FilesystemConfig::new("/tmp/assetstore")),
    )
}

#[tokio::test]
async fn test_duplicate_assetstore_name_conflicts() {
    let repo = InMemoryMetadataStore::new();
    repo.insert_assetstore(&fs_store("main")).await.unwrap();

    let err = repo.insert_assetstore(&fs_store("main")).await.unwrap_err();
    assert!(format!("{}", err).contains("already exists"));
}

#[tokio::test]
async fn test_clear_current_except_leaves_one() {
    let repo = InMemoryMetadataStore::new();
    let a = fs_store("a");
    let b = fs_store("b");
    repo.insert_assetstore(&a).await.unwrap();
    repo.insert_assetstore(&b).await.unwrap();

    repo.set_current_flag(a.id, true).await.unwrap();
    repo.set_current_flag(b.id, true).await.unwrap();
    repo.clear_current_except(b.id).await.unwrap();

    let current: Vec<_> = repo
        .list_assetstores()
        .await
        .unwrap()
        .into_iter()
        .filter(|s| s.current)
        .collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].id, b.id);
}

#[tokio::test]
async fn test_file_filters() {
    let repo = InMemoryMetadataStore::new();
    let store = fs_store("main");
    let path = BackendRef::Path {
        path: "ab/cd/abcd".into(),
    };

    let mut imported = File::new("imported.txt", 3, store.id, path.clone());
    imported.imported = true;
    let uploaded = File::new("uploaded.txt", 3, store.id, path.clone());
    let elsewhere = File::new("other.txt", 0, fs_store("other").id, BackendRef::Empty);

    for file in [&imported, &uploaded, &elsewhere] {
        repo.save_file(file).await.unwrap();
    }

    let in_store = FileFilter::default().assetstore(store.id);
    assert_eq!(repo.count_files(&in_store).await.unwrap(), 2);
    assert_eq!(
        repo.count_files(&in_store.clone().imported(true))
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        repo.count_files(&FileFilter::default().backend(path))
            .await
            .unwrap(),
        2
    );

    repo.remove_file(uploaded.id).await.unwrap();
    assert!(repo.load_file(uploaded.id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_hierarchy_lookups() {
    let repo = InMemoryMetadataStore::new();
    let (user, public, private) = repo.create_user("admin").await.unwrap();

    let children = repo
        .list_child_folders(FolderParent::User(user.id))
        .await
        .unwrap();
    assert_eq!(children, vec![private.clone(), public.clone()]);

    let nested = Folder::new("nested", FolderParent::Folder(public.id));
    repo.insert_folder(&nested).await.unwrap();
    let found = repo
        .find_child_folder(FolderParent::Folder(public.id), "nested")
        .await
        .unwrap();
    assert_eq!(found, Some(nested.clone()));

    let mut item = Item::new("item", nested.id);
    repo.insert_item(&item).await.unwrap();
    item.size = 42;
    repo.update_item(&item).await.unwrap();
    assert_eq!(repo.load_item(item.id).await.unwrap().size, 42);
    assert_eq!(
        repo.find_item(nested.id, "item").await.unwrap().map(|i| i.id),
        Some(item.id)
    );

    let store = fs_store("main");
    let mut file = File::new("a.txt", 0, store.id, BackendRef::Empty);
    file.item_id = Some(item.id);
    repo.save_file(&file).await.unwrap();
    assert_eq!(
        repo.find_file_in_item(item.id, "a.txt")
            .await
            .unwrap()
            .map(|f| f.id),
        Some(file.id)
    );
    assert!(
        repo.find_file_in_item(item.id, "b.txt")
            .await
            .unwrap()
            .is_none()
    );
}
