//! Tests for moving files between Assetstores.

mod test_utils;

use assetstore::{
    FileMover, InMemoryObjectStore, MetadataStore, MoveDecision, NoProgress, ProgressReporter,
    RecordingProgress,
};
use assetstore_core::{Assetstore, BackendRef, File};
use std::sync::Arc;
use test_utils::{Harness, sha512_hex};
use tokio_util::sync::CancellationToken;

/// Makes the next bucket call fail once every byte has been copied.
struct FailAfterCopy(InMemoryObjectStore);

impl ProgressReporter for FailAfterCopy {
    fn update(&self, current: u64, total: u64, _message: &str) {
        if total > 0 && current == total {
            self.0.fail_next(1);
        }
    }
}

fn mover(harness: &Harness) -> FileMover {
    FileMover::new(harness.uploads.clone())
}

#[tokio::test]
async fn test_move_to_same_store_is_a_no_op() {
    let harness = Harness::new();
    let store = harness.filesystem("Local").await;
    let file = harness.upload("a.txt", b"abc", store.id).await;

    let progress = RecordingProgress::new();
    let moved = mover(&harness)
        .move_file(file.id, store.id, &progress, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(moved, file);
    assert!(progress.updates().is_empty());
}

#[tokio::test]
async fn test_move_round_trip_between_backends() {
    let harness = Harness::new();
    let local = harness.filesystem("Local").await;
    let s3 = harness.object_store("S3", "bucket").await;
    let data: Vec<u8> = (0..23u8).collect();
    let file = harness.upload("data.bin", &data, local.id).await;
    let original_backend = file.backend.clone();
    let BackendRef::Path { path } = &original_backend else {
        panic!("filesystem files carry a path");
    };
    let on_disk = harness.root("Local").join(path);

    let progress = RecordingProgress::new();
    let moved = mover(&harness)
        .move_file(file.id, s3.id, &progress, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(moved.id, file.id);
    assert_eq!(moved.assetstore_id, s3.id);
    assert!(matches!(moved.backend, BackendRef::ObjectKey { .. }));
    assert_eq!(moved.sha512.as_deref(), Some(sha512_hex(&data).as_str()));
    assert_eq!(harness.read(file.id).await, data);
    assert!(!on_disk.exists());

    let last = progress.last().unwrap();
    assert_eq!(last.current, 23);
    assert_eq!(last.total, 23);
    let updates = progress.updates();
    assert!(updates.windows(2).all(|w| w[0].current <= w[1].current));

    let back = mover(&harness)
        .move_file(file.id, local.id, &NoProgress, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(back.assetstore_id, local.id);
    assert_eq!(back.backend, original_backend);
    assert!(on_disk.exists());
    assert!(harness.objects.keys("bucket").await.is_empty());
    assert_eq!(harness.read(file.id).await, data);
}

#[tokio::test]
async fn test_hook_can_veto_a_move() {
    let harness = Harness::new();
    let local = harness.filesystem("Local").await;
    let docs = harness.document_store("Docs", "assetstore_test").await;
    let file = harness.upload("secret.txt", b"classified", local.id).await;

    let veto = Arc::new(|_: &File, destination: &Assetstore| {
        if destination.name == "Docs" {
            MoveDecision::Deny("retention policy".to_string())
        } else {
            MoveDecision::Allow
        }
    });
    let err = mover(&harness)
        .with_hook(veto)
        .move_file(file.id, docs.id, &NoProgress, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(
        err.to_string()
            .contains("File secret.txt could not be moved to assetstore Docs: retention policy")
    );
    assert_eq!(
        harness.metadata.load_file(file.id).await.unwrap().assetstore_id,
        local.id
    );
}

#[tokio::test]
async fn test_move_empty_file() {
    let harness = Harness::new();
    let local = harness.filesystem("Local").await;
    let docs = harness.document_store("Docs", "assetstore_test").await;
    let file = harness.upload("empty.txt", b"", local.id).await;

    let progress = RecordingProgress::new();
    let moved = mover(&harness)
        .move_file(file.id, docs.id, &progress, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(moved.assetstore_id, docs.id);
    assert_eq!(moved.backend, BackendRef::Empty);
    assert_eq!(moved.size, 0);
    let last = progress.last().unwrap();
    assert_eq!((last.current, last.total), (0, 0));
}

#[tokio::test]
async fn test_moving_imported_file_keeps_source_bytes() {
    let harness = Harness::new();
    let s3 = harness.object_store("S3", "bucket").await;
    let local = harness.filesystem("Local").await;
    harness
        .objects
        .put("bucket", "external/photo.jpg", &b"jpegdata"[..])
        .await
        .unwrap();
    let mut file = File::new(
        "photo.jpg",
        8,
        s3.id,
        BackendRef::ObjectKey {
            key: "external/photo.jpg".to_string(),
            relpath: Some("/bucket/external/photo.jpg".to_string()),
        },
    );
    file.imported = true;
    harness.metadata.save_file(&file).await.unwrap();

    let moved = mover(&harness)
        .move_file(file.id, local.id, &NoProgress, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!moved.imported);
    assert_eq!(moved.assetstore_id, local.id);
    assert_eq!(harness.read(file.id).await, b"jpegdata");
    assert_eq!(
        harness.objects.get("bucket", "external/photo.jpg").await,
        Some(b"jpegdata".to_vec())
    );
}

#[tokio::test]
async fn test_cancelled_move_leaves_file_in_place() {
    let harness = Harness::new();
    let local = harness.filesystem("Local").await;
    let docs = harness.document_store("Docs", "assetstore_test").await;
    let file = harness.upload("big.bin", &[7u8; 40], local.id).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = mover(&harness)
        .move_file(file.id, docs.id, &NoProgress, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), Some("cancelled"));

    let unchanged = harness.metadata.load_file(file.id).await.unwrap();
    assert_eq!(unchanged, file);
    assert_eq!(harness.documents.chunk_count("assetstore_test").await, 0);
    assert_eq!(harness.read(file.id).await, vec![7u8; 40]);
}

#[tokio::test]
async fn test_unreachable_destination() {
    let harness = Harness::new();
    let local = harness.filesystem("Local").await;
    let docs = harness.document_store("Docs", "assetstore_test").await;
    let file = harness.upload("a.txt", b"abc", local.id).await;
    harness.documents.set_available(false);

    let err = mover(&harness)
        .move_file(file.id, docs.id, &NoProgress, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_backend_unavailable());
    assert_eq!(harness.metadata.load_file(file.id).await.unwrap(), file);
}

#[tokio::test]
async fn test_failed_finalize_discards_destination_upload() {
    let harness = Harness::new();
    let local = harness.filesystem("Local").await;
    let s3 = harness.object_store("S3", "bucket").await;
    let data: Vec<u8> = (0..20u8).collect();
    let file = harness.upload("data.bin", &data, local.id).await;

    let err = mover(&harness)
        .move_file(
            file.id,
            s3.id,
            &FailAfterCopy(harness.objects.clone()),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(err.is_backend_unavailable());

    assert_eq!(harness.metadata.load_file(file.id).await.unwrap(), file);
    assert_eq!(harness.objects.pending_multiparts().await, 0);
    assert!(harness.objects.keys("bucket").await.is_empty());
    assert_eq!(harness.read(file.id).await, data);
}
