//! Tests for importing existing backend data.

mod test_utils;

use assetstore::{
    ImportOptionsBuilder, Importer, MetadataStore, NoProgress, RecordingProgress,
};
use assetstore_core::{BackendRef, FolderId, FolderParent, ImportDestination};
use futures::TryStreamExt;
use std::path::Path;
use std::sync::Arc;
use test_utils::Harness;
use tokio_util::sync::CancellationToken;

fn options(path: &Path, destination: FolderId) -> ImportOptionsBuilder {
    let mut builder = ImportOptionsBuilder::default();
    builder
        .path(path.display().to_string())
        .destination(ImportDestination::Folder(destination));
    builder
}

/// `source/{hello.txt, world.txt, sub/deep.txt}`
fn write_tree(root: &Path) {
    std::fs::create_dir_all(root.join("sub")).unwrap();
    std::fs::write(root.join("hello.txt"), b"hello").unwrap();
    std::fs::write(root.join("world.txt"), b"world!").unwrap();
    std::fs::write(root.join("sub").join("deep.txt"), b"deep").unwrap();
}

#[tokio::test]
async fn test_reimport_never_duplicates() {
    let harness = Harness::new();
    let store = harness.filesystem("Local").await;
    let (_, dest, _) = harness.metadata.create_user("admin").await.unwrap();
    let source = harness.root("source");
    write_tree(&source);
    let importer = Importer::new(harness.registry.clone());

    let only_hello = options(&source, dest.id).include("hello.*").build().unwrap();
    let records: Vec<_> = importer
        .import(
            store.id,
            only_hello,
            Arc::new(NoProgress),
            CancellationToken::new(),
        )
        .try_collect()
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    let hello = &records[0].file;
    assert!(hello.imported);
    assert_eq!(hello.size, 5);
    assert_eq!(
        hello.backend,
        BackendRef::Path {
            path: source.join("hello.txt")
        }
    );
    assert_eq!(harness.read(hello.id).await, b"hello");

    let progress = Arc::new(RecordingProgress::new());
    let count = importer
        .import_all(
            store.id,
            options(&source, dest.id).build().unwrap(),
            progress.clone(),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(count, 3);
    assert_eq!(progress.last().unwrap().current, 3);

    let items = harness.metadata.list_items(dest.id).await.unwrap();
    let mut names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
    names.sort();
    assert_eq!(names, ["hello.txt", "world.txt"]);

    // The earlier record was refreshed in place
    let hello_item = items.iter().find(|i| i.name == "hello.txt").unwrap();
    let refreshed = harness
        .metadata
        .find_file_in_item(hello_item.id, "hello.txt")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.id, hello.id);
    assert_eq!(hello_item.size, 5);

    let folders = harness
        .metadata
        .list_child_folders(FolderParent::Folder(dest.id))
        .await
        .unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].name, "sub");
    let deep = harness.metadata.list_items(folders[0].id).await.unwrap();
    assert_eq!(deep.len(), 1);
    assert_eq!(deep[0].name, "deep.txt");
    assert_eq!(deep[0].size, 4);

    assert_eq!(harness.registry.files(store.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_include_and_exclude() {
    let harness = Harness::new();
    let store = harness.filesystem("Local").await;
    let (_, dest, _) = harness.metadata.create_user("admin").await.unwrap();
    let source = harness.root("source");
    write_tree(&source);

    let filtered = options(&source, dest.id)
        .include(".*\\.txt")
        .exclude("(hello|deep)")
        .build()
        .unwrap();
    let count = Importer::new(harness.registry.clone())
        .import_all(store.id, filtered, Arc::new(NoProgress), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(count, 1);
    let items = harness.metadata.list_items(dest.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "world.txt");
}

#[tokio::test]
async fn test_single_file_becomes_item() {
    let harness = Harness::new();
    let store = harness.filesystem("Local").await;
    let (_, dest, _) = harness.metadata.create_user("admin").await.unwrap();
    let source = harness.root("source");
    write_tree(&source);

    let records: Vec<_> = Importer::new(harness.registry.clone())
        .import(
            store.id,
            options(&source.join("world.txt"), dest.id).build().unwrap(),
            Arc::new(NoProgress),
            CancellationToken::new(),
        )
        .try_collect()
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    let items = harness.metadata.list_items(dest.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "world.txt");
    assert_eq!(records[0].file.item_id, Some(items[0].id));
    assert_eq!(records[0].file.name, "world.txt");
}

#[tokio::test]
async fn test_missing_path_and_user_destination() {
    let harness = Harness::new();
    let store = harness.filesystem("Local").await;
    let (user, dest, _) = harness.metadata.create_user("admin").await.unwrap();
    let importer = Importer::new(harness.registry.clone());

    let missing = harness.root("nowhere");
    let err = importer
        .import_all(
            store.id,
            options(&missing, dest.id).build().unwrap(),
            Arc::new(NoProgress),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains(&format!("Not found: {}.", missing.display())));

    let mut to_user = options(&missing, dest.id);
    to_user.destination(ImportDestination::User(user.id));
    let err = importer
        .import_all(
            store.id,
            to_user.build().unwrap(),
            Arc::new(NoProgress),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("destinationType"));
    assert!(
        err.to_string()
            .contains("Files cannot be imported directly underneath a user.")
    );
}

#[tokio::test]
async fn test_leaf_folders_as_items() {
    let harness = Harness::new();
    let store = harness.filesystem("Local").await;
    let (_, dest, _) = harness.metadata.create_user("admin").await.unwrap();
    let source = harness.root("photos");
    std::fs::create_dir_all(source.join("album")).unwrap();
    std::fs::write(source.join("album").join("a.jpg"), b"aaa").unwrap();
    std::fs::write(source.join("album").join("b.jpg"), b"bb").unwrap();
    std::fs::write(source.join("cover.jpg"), b"c").unwrap();
    let importer = Importer::new(harness.registry.clone());

    let grouped = options(&source, dest.id)
        .leaf_folders_as_items(true)
        .build()
        .unwrap();
    let count = importer
        .import_all(store.id, grouped, Arc::new(NoProgress), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(count, 3);

    let items = harness.metadata.list_items(dest.id).await.unwrap();
    let album = items.iter().find(|i| i.name == "album").unwrap();
    assert_eq!(album.size, 5);
    assert!(items.iter().any(|i| i.name == "cover.jpg"));
    assert!(
        harness
            .metadata
            .list_child_folders(FolderParent::Folder(dest.id))
            .await
            .unwrap()
            .is_empty()
    );

    // A leaf root becomes one item named after it
    let leaf_root = options(&source.join("album"), dest.id)
        .leaf_folders_as_items(true)
        .build()
        .unwrap();
    importer
        .import_all(store.id, leaf_root, Arc::new(NoProgress), CancellationToken::new())
        .await
        .unwrap();
    let items = harness.metadata.list_items(dest.id).await.unwrap();
    assert_eq!(items.iter().filter(|i| i.name == "album").count(), 1);
    assert_eq!(harness.registry.files(store.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_names_are_sanitized() {
    let harness = Harness::new();
    let store = harness.filesystem("Local").await;
    let (_, dest, _) = harness.metadata.create_user("admin").await.unwrap();
    let source = harness.root("source");
    std::fs::create_dir_all(source.join(" Space \n ")).unwrap();
    std::fs::write(source.join(" Space \n ").join(" \n hello.txt "), b"hi").unwrap();

    Importer::new(harness.registry.clone())
        .import_all(
            store.id,
            options(&source, dest.id).build().unwrap(),
            Arc::new(NoProgress),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let folder = harness
        .metadata
        .find_child_folder(FolderParent::Folder(dest.id), "_Space___")
        .await
        .unwrap()
        .unwrap();
    let item = harness
        .metadata
        .find_item(folder.id, "___hello.txt_")
        .await
        .unwrap()
        .unwrap();
    assert!(
        harness
            .metadata
            .find_file_in_item(item.id, "___hello.txt_")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_object_store_import_of_whole_bucket() {
    let harness = Harness::new();
    let (_, dest, _) = harness.metadata.create_user("admin").await.unwrap();
    harness.objects.create_bucket("imports").await;
    harness.objects.put("imports", "foo/bar/test", &b"test"[..]).await.unwrap();
    harness.objects.put("imports", "foo/bar/", &b""[..]).await.unwrap();
    harness.objects.put("imports", "foo/empty", &b""[..]).await.unwrap();
    let store = harness.object_store("S3", "imports").await;

    let mut whole = ImportOptionsBuilder::default();
    whole
        .path("")
        .destination(ImportDestination::Folder(dest.id));
    let records: Vec<_> = Importer::new(harness.registry.clone())
        .import(
            store.id,
            whole.build().unwrap(),
            Arc::new(NoProgress),
            CancellationToken::new(),
        )
        .try_collect()
        .await
        .unwrap();
    let mut paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, ["foo/bar/test", "foo/empty"]);

    let foo = harness
        .metadata
        .find_child_folder(FolderParent::Folder(dest.id), "foo")
        .await
        .unwrap()
        .unwrap();
    let bar = harness
        .metadata
        .find_child_folder(FolderParent::Folder(foo.id), "bar")
        .await
        .unwrap()
        .unwrap();
    let item = harness.metadata.find_item(bar.id, "test").await.unwrap().unwrap();
    let file = harness
        .metadata
        .find_file_in_item(item.id, "test")
        .await
        .unwrap()
        .unwrap();
    assert!(file.imported);
    assert_eq!(harness.read(file.id).await, b"test");

    // Zero-byte keys keep their key reference
    let empty = records.iter().find(|r| r.path == "foo/empty").unwrap();
    assert_eq!(empty.file.size, 0);
    assert!(matches!(empty.file.backend, BackendRef::ObjectKey { .. }));
}

#[tokio::test]
async fn test_document_store_cannot_import() {
    let harness = Harness::new();
    let store = harness.document_store("Docs", "assetstore_test").await;
    let (_, dest, _) = harness.metadata.create_user("admin").await.unwrap();

    let err = Importer::new(harness.registry.clone())
        .import_all(
            store.id,
            options(Path::new("/"), dest.id).build().unwrap(),
            Arc::new(NoProgress),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("does not support importing"));
}

#[tokio::test]
async fn test_cancelled_import_stops_before_binding() {
    let harness = Harness::new();
    let store = harness.filesystem("Local").await;
    let (_, dest, _) = harness.metadata.create_user("admin").await.unwrap();
    let source = harness.root("source");
    write_tree(&source);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = Importer::new(harness.registry.clone())
        .import_all(
            store.id,
            options(&source, dest.id).build().unwrap(),
            Arc::new(NoProgress),
            cancel,
        )
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), Some("cancelled"));
    assert!(harness.registry.files(store.id).await.unwrap().is_empty());
}
