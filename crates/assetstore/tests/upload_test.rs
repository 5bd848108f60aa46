//! Tests for the chunked upload engine.

mod test_utils;

use assetstore::{MetadataStore, UploadRequest, UploadStart};
use assetstore_core::{
    BackendRef, ChunkPayload, Continuation, OffsetReply, PartRequest, UploadParent, UploadState,
};
use assetstore::UploadService;
use bytes::Bytes;
use std::time::Duration;
use test_utils::{Harness, sha512_hex};

fn chunk(data: &[u8]) -> ChunkPayload {
    ChunkPayload::Bytes(Bytes::copy_from_slice(data))
}

#[tokio::test]
async fn test_chunked_upload_records_size_and_checksum() {
    let harness = Harness::new();
    let store = harness.filesystem("Local").await;

    let session = harness
        .uploads
        .initiate(UploadRequest::new("hello.txt", 10).mime_type("text/plain"))
        .await
        .unwrap()
        .session()
        .unwrap();
    assert_eq!(*session.state(), UploadState::Receiving);
    assert_eq!(*session.assetstore_id(), store.id);

    let id = *session.id();
    harness.uploads.write_chunk(id, 0, chunk(b"hello")).await.unwrap();
    assert_eq!(
        harness.uploads.request_offset(id).await.unwrap(),
        OffsetReply::Received(5)
    );
    harness.uploads.write_chunk(id, 5, chunk(b"world")).await.unwrap();

    let finalized = harness.uploads.finalize(id).await.unwrap();
    assert!(finalized.finalize_request.is_none());
    let file = finalized.file;
    assert_eq!(file.size, 10);
    assert_eq!(file.sha512.as_deref(), Some(sha512_hex(b"helloworld").as_str()));
    assert_eq!(file.mime_type.as_deref(), Some("text/plain"));
    assert_eq!(harness.read(file.id).await, b"helloworld");
    assert_eq!(
        *harness.uploads.session(id).await.unwrap().state(),
        UploadState::Complete
    );
}

#[tokio::test]
async fn test_write_checks_offset_and_size() {
    let harness = Harness::new();
    harness.filesystem("Local").await;
    let session = harness
        .uploads
        .initiate(UploadRequest::new("a.bin", 8))
        .await
        .unwrap()
        .session()
        .unwrap();
    let id = *session.id();

    let err = harness
        .uploads
        .write_chunk(id, 3, chunk(b"abc"))
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), Some("wrong_offset"));

    let err = harness
        .uploads
        .write_chunk(id, 0, chunk(b"123456789"))
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), Some("chunk_exceeds_size"));

    // Rejected chunks leave the session untouched
    let session = harness.uploads.session(id).await.unwrap();
    assert_eq!(*session.received(), 0);
    assert_eq!(*session.state(), UploadState::Receiving);

    harness.uploads.write_chunk(id, 0, chunk(b"abcd")).await.unwrap();
    let err = harness.uploads.finalize(id).await.unwrap_err();
    assert_eq!(err.reason_code(), Some("upload_incomplete"));
    assert_eq!(
        *harness.uploads.session(id).await.unwrap().state(),
        UploadState::Receiving
    );

    harness.uploads.write_chunk(id, 4, chunk(b"efgh")).await.unwrap();
    let file = harness.uploads.finalize(id).await.unwrap().file;
    assert_eq!(harness.read(file.id).await, b"abcdefgh");
}

#[tokio::test]
async fn test_zero_byte_upload_completes_immediately() {
    let harness = Harness::new();
    let store = harness.filesystem("Local").await;

    let start = harness
        .uploads
        .initiate(UploadRequest::new("empty.txt", 0))
        .await
        .unwrap();
    let UploadStart::Complete(file) = start else {
        panic!("zero-byte upload should complete at once");
    };
    assert_eq!(file.size, 0);
    assert_eq!(file.backend, BackendRef::Empty);
    assert_eq!(file.sha512.as_deref(), Some(sha512_hex(b"").as_str()));
    assert_eq!(file.assetstore_id, store.id);
    assert!(harness.read(file.id).await.is_empty());
}

#[tokio::test]
async fn test_cancel_closes_the_session() {
    let harness = Harness::new();
    let store = harness.filesystem("Local").await;
    let session = harness
        .uploads
        .initiate(UploadRequest::new("a.bin", 6))
        .await
        .unwrap()
        .session()
        .unwrap();
    let id = *session.id();
    harness.uploads.write_chunk(id, 0, chunk(b"abc")).await.unwrap();

    harness.uploads.cancel(id).await.unwrap();
    assert_eq!(
        *harness.uploads.session(id).await.unwrap().state(),
        UploadState::Cancelled
    );
    let Continuation::Filesystem { temp_path } = session.continuation() else {
        panic!("filesystem uploads use a temp file");
    };
    assert!(!temp_path.exists());

    let err = harness
        .uploads
        .write_chunk(id, 3, chunk(b"def"))
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), Some("invalid_state"));
    let err = harness.uploads.cancel(id).await.unwrap_err();
    assert_eq!(err.reason_code(), Some("invalid_state"));
    assert!(harness.registry.files(store.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_finalize_twice_is_rejected() {
    let harness = Harness::new();
    let store = harness.filesystem("Local").await;
    let session = harness
        .uploads
        .initiate(UploadRequest::new("a.bin", 3))
        .await
        .unwrap()
        .session()
        .unwrap();
    let id = *session.id();
    harness.uploads.write_chunk(id, 0, chunk(b"abc")).await.unwrap();
    harness.uploads.finalize(id).await.unwrap();

    let err = harness.uploads.finalize(id).await.unwrap_err();
    assert_eq!(err.reason_code(), Some("invalid_state"));
    assert_eq!(harness.registry.files(store.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_parent_folder_and_item_sizes() {
    let harness = Harness::new();
    let store = harness.filesystem("Local").await;
    let (_, folder, _) = harness.metadata.create_user("admin").await.unwrap();

    let file = harness
        .uploads
        .upload_from_reader(
            UploadRequest::new("notes.txt", 4).parent(UploadParent::Folder(folder.id)),
            &b"abcd"[..],
        )
        .await
        .unwrap();
    let item_id = file.item_id.unwrap();
    let item = harness.metadata.load_item(item_id).await.unwrap();
    assert_eq!(item.name, "notes.txt");
    assert_eq!(item.folder_id, folder.id);
    assert_eq!(item.size, 4);

    let second = harness
        .uploads
        .upload_from_reader(
            UploadRequest::new("more.txt", 3)
                .parent(UploadParent::Item(item_id))
                .assetstore(store.id),
            &b"xyz"[..],
        )
        .await
        .unwrap();
    assert_eq!(second.item_id, Some(item_id));
    assert_eq!(harness.metadata.load_item(item_id).await.unwrap().size, 7);
    assert_eq!(harness.metadata.list_items(folder.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_round_trip_on_every_backend() {
    let harness = Harness::new();
    let data: Vec<u8> = (0..37u8).collect();

    let stores = vec![
        harness.filesystem("Local").await,
        harness.object_store("S3", "bucket").await,
        harness.document_store("Docs", "assetstore_test").await,
    ];
    for store in stores {
        let file = harness.upload("data.bin", &data, store.id).await;
        assert_eq!(file.size, 37);
        assert_eq!(file.assetstore_id, store.id);
        assert_eq!(file.sha512.as_deref(), Some(sha512_hex(&data).as_str()));
        assert_eq!(harness.read(file.id).await, data, "{}", store.name);
    }

    // 37 bytes in 4 byte chunks
    assert_eq!(harness.documents.chunk_count("assetstore_test").await, 10);
    assert_eq!(harness.objects.pending_multiparts().await, 0);
    assert_eq!(harness.objects.keys("bucket").await.len(), 1);
}

#[tokio::test]
async fn test_direct_single_put_is_confirmed_by_the_store() {
    let harness = Harness::new();
    let store = harness.object_store("S3", "bucket").await;
    let session = harness
        .uploads
        .initiate(UploadRequest::new("small.txt", 6).assetstore(store.id))
        .await
        .unwrap()
        .session()
        .unwrap();
    let direct = session.direct().clone().unwrap();
    assert!(!direct.chunked);
    assert!(direct.request.url.contains("bucket"));
    let Continuation::ObjectStore(cont) = session.continuation() else {
        panic!("object store uploads carry an object continuation");
    };
    assert!(cont.key.starts_with("assets/"));

    let id = *session.id();
    assert!(matches!(
        harness.uploads.request_offset(id).await.unwrap(),
        OffsetReply::Request(_)
    ));

    // Nothing stored yet
    let err = harness.uploads.finalize(id).await.unwrap_err();
    assert_eq!(err.reason_code(), Some("upload_incomplete"));

    harness.objects.put("bucket", &cont.key, &b"direct"[..]).await.unwrap();
    let file = harness.uploads.finalize(id).await.unwrap().file;
    assert_eq!(file.size, 6);
    assert_eq!(file.sha512, None);
    assert_eq!(
        file.backend,
        BackendRef::ObjectKey {
            key: cont.key.clone(),
            relpath: Some(format!("/bucket/{}", cont.key)),
        }
    );
    assert_eq!(harness.read(file.id).await, b"direct");
}

#[tokio::test]
async fn test_chunked_direct_upload_has_no_offset() {
    let harness = Harness::new();
    let store = harness.object_store("S3", "bucket").await;
    let session = harness
        .uploads
        .initiate(UploadRequest::new("big.bin", 20).assetstore(store.id))
        .await
        .unwrap()
        .session()
        .unwrap();
    assert!(session.direct().as_ref().unwrap().chunked);

    let err = harness
        .uploads
        .request_offset(*session.id())
        .await
        .unwrap_err();
    assert!(
        err.to_string()
            .contains("You should not call requestOffset on a chunked direct-to-object upload.")
    );

    let reply = harness
        .uploads
        .write_chunk(
            *session.id(),
            0,
            ChunkPayload::Part(PartRequest {
                part_number: 1,
                upload_id: "mp-1".to_string(),
                size: Some(8),
            }),
        )
        .await
        .unwrap()
        .unwrap();
    assert!(reply.url.contains("partNumber=1"));
    assert_eq!(*harness.uploads.session(*session.id()).await.unwrap().received(), 8);

    harness.uploads.cancel(*session.id()).await.unwrap();
}

#[tokio::test]
async fn test_part_request_rejected_for_single_put() {
    let harness = Harness::new();
    let store = harness.object_store("S3", "bucket").await;
    let session = harness
        .uploads
        .initiate(UploadRequest::new("small.txt", 6).assetstore(store.id))
        .await
        .unwrap()
        .session()
        .unwrap();
    let err = harness
        .uploads
        .write_chunk(
            *session.id(),
            0,
            ChunkPayload::part_from_json(r#"{"partNumber": 1, "s3UploadId": "x", "size": 6}"#)
                .unwrap(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("chunk"));

    // A validation failure does not poison the session
    let session = harness.uploads.session(*session.id()).await.unwrap();
    assert_eq!(*session.state(), UploadState::Receiving);
}

#[tokio::test]
async fn test_replace_contents_releases_old_bytes() {
    let harness = Harness::new();
    let store = harness.object_store("S3", "bucket").await;
    let original = harness.upload("doc.txt", b"first version", store.id).await;
    let old_keys = harness.objects.keys("bucket").await;
    assert_eq!(old_keys.len(), 1);

    let session = harness
        .uploads
        .replace_contents(original.id, 6, Some(store.id))
        .await
        .unwrap()
        .session()
        .unwrap();
    assert_eq!(*session.file_id(), Some(original.id));
    harness
        .uploads
        .write_chunk(*session.id(), 0, chunk(b"second"))
        .await
        .unwrap();
    let replaced = harness.uploads.finalize(*session.id()).await.unwrap().file;

    assert_eq!(replaced.id, original.id);
    assert_eq!(replaced.name, "doc.txt");
    assert_eq!(replaced.size, 6);
    assert_eq!(harness.read(original.id).await, b"second");
    let keys = harness.objects.keys("bucket").await;
    assert_eq!(keys.len(), 1);
    assert_ne!(keys, old_keys);
    assert_eq!(harness.registry.files(store.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unavailable_backend_rejects_initiate() {
    let harness = Harness::new();
    let store = harness.document_store("Docs", "assetstore_test").await;
    harness.documents.set_available(false);

    let err = harness
        .uploads
        .initiate(UploadRequest::new("a.bin", 4).assetstore(store.id))
        .await
        .unwrap_err();
    assert!(err.is_backend_unavailable());
}

#[tokio::test]
async fn test_backend_failure_moves_session_to_error() {
    let harness = Harness::new();
    let store = harness.document_store("Docs", "assetstore_test").await;
    let session = harness
        .uploads
        .initiate(UploadRequest::new("a.bin", 8).assetstore(store.id))
        .await
        .unwrap()
        .session()
        .unwrap();
    let id = *session.id();
    harness.uploads.write_chunk(id, 0, chunk(b"abcd")).await.unwrap();

    harness.documents.set_available(false);
    assert!(harness.uploads.write_chunk(id, 4, chunk(b"efgh")).await.is_err());
    assert_eq!(
        *harness.uploads.session(id).await.unwrap().state(),
        UploadState::Error
    );
    let err = harness.uploads.finalize(id).await.unwrap_err();
    assert_eq!(err.reason_code(), Some("invalid_state"));

    harness.documents.set_available(true);
    harness.uploads.cancel(id).await.unwrap();
    assert_eq!(harness.documents.chunk_count("assetstore_test").await, 0);
}

#[tokio::test]
async fn test_short_reader_cancels_the_upload() {
    let harness = Harness::new();
    let store = harness.filesystem("Local").await;

    let err = harness
        .uploads
        .upload_from_reader(UploadRequest::new("short.bin", 10), &b"12345"[..])
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), Some("upload_incomplete"));
    assert!(harness.registry.files(store.id).await.unwrap().is_empty());

    let leftovers = std::fs::read_dir(harness.root("Local").join("temp"))
        .unwrap()
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_concurrent_writer_gets_busy() {
    let harness = Harness::new();
    let store = harness.document_store("Docs", "assetstore_test").await;
    let session = harness
        .uploads
        .initiate(UploadRequest::new("a.bin", 8).assetstore(store.id))
        .await
        .unwrap()
        .session()
        .unwrap();
    let id = *session.id();

    harness.documents.set_write_latency(Duration::from_millis(300));
    let uploads = harness.uploads.clone();
    let first = tokio::spawn(async move { uploads.write_chunk(id, 0, chunk(b"abcd")).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = harness
        .uploads
        .write_chunk(id, 0, chunk(b"abcd"))
        .await
        .unwrap_err();
    assert_eq!(err.reason_code(), Some("upload_busy"));
    let err = harness.uploads.request_offset(id).await.unwrap_err();
    assert_eq!(err.reason_code(), Some("upload_busy"));

    first.await.unwrap().unwrap();
    harness.documents.set_write_latency(Duration::ZERO);
    harness.uploads.write_chunk(id, 4, chunk(b"efgh")).await.unwrap();
    let file = harness.uploads.finalize(id).await.unwrap().file;
    assert_eq!(harness.read(file.id).await, b"abcdefgh");
}

#[tokio::test]
async fn test_sizes_around_the_chunk_boundary_on_every_backend() {
    let harness = Harness::new();
    let stores = vec![
        harness.filesystem("Local").await,
        harness.object_store("S3", "bucket").await,
        harness.document_store("Docs", "assetstore_test").await,
    ];
    // Chunk sizes are 5, 8 and 4 bytes
    for size in [1usize, 4, 5, 8, 9, 17] {
        let data: Vec<u8> = (0..size as u8).map(|b| b.wrapping_mul(7)).collect();
        for store in &stores {
            let file = harness.upload("data.bin", &data, store.id).await;
            assert_eq!(file.size, size as u64);
            assert_eq!(file.sha512.as_deref(), Some(sha512_hex(&data).as_str()));
            assert_eq!(harness.read(file.id).await, data, "{} / {size}", store.name);
        }
    }
    assert_eq!(harness.objects.pending_multiparts().await, 0);
}

#[tokio::test]
async fn test_uneven_client_chunks_are_reassembled() {
    let harness = Harness::new();
    let stores = vec![
        harness.filesystem("Local").await,
        harness.document_store("Docs", "assetstore_test").await,
    ];
    let data = b"the quick brown fox";
    for store in stores {
        let session = harness
            .uploads
            .initiate(UploadRequest::new("fox.txt", data.len() as u64).assetstore(store.id))
            .await
            .unwrap()
            .session()
            .unwrap();
        let id = *session.id();
        let mut offset = 0;
        for piece in [&data[..1], &data[1..7], &data[7..10], &data[10..]] {
            harness
                .uploads
                .write_chunk(id, offset, chunk(piece))
                .await
                .unwrap();
            offset += piece.len() as u64;
        }
        let file = harness.uploads.finalize(id).await.unwrap().file;
        assert_eq!(harness.read(file.id).await, data, "{}", store.name);
    }
    // 19 bytes in 4 byte documents
    assert_eq!(harness.documents.chunk_count("assetstore_test").await, 5);
}

#[tokio::test]
async fn test_closed_sessions_are_dropped_after_retention() {
    let harness = Harness::new();
    harness.filesystem("Local").await;
    let uploads = UploadService::new(harness.registry.clone())
        .with_closed_retention(Duration::from_millis(250));

    let done = uploads
        .initiate(UploadRequest::new("a.bin", 3))
        .await
        .unwrap()
        .session()
        .unwrap();
    let done = *done.id();
    uploads.write_chunk(done, 0, chunk(b"abc")).await.unwrap();
    uploads.finalize(done).await.unwrap();

    // Inside the window a late write is a state error
    let err = uploads.write_chunk(done, 3, chunk(b"d")).await.unwrap_err();
    assert_eq!(err.reason_code(), Some("invalid_state"));

    let open = uploads
        .initiate(UploadRequest::new("b.bin", 3))
        .await
        .unwrap()
        .session()
        .unwrap();
    assert_eq!(uploads.tracked_sessions().await, 2);

    tokio::time::sleep(Duration::from_millis(350)).await;
    uploads
        .initiate(UploadRequest::new("c.bin", 3))
        .await
        .unwrap();
    assert_eq!(uploads.tracked_sessions().await, 2);
    let err = uploads.session(done).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(
        *uploads.session(*open.id()).await.unwrap().state(),
        UploadState::Receiving
    );
}

#[tokio::test]
async fn test_parts_without_a_size_finalize_at_the_declared_size() {
    let harness = Harness::new();
    let store = harness.object_store("S3", "bucket").await;
    let session = harness
        .uploads
        .initiate(UploadRequest::new("big.bin", 20).assetstore(store.id))
        .await
        .unwrap()
        .session()
        .unwrap();
    let id = *session.id();

    for number in 1..=3 {
        let raw = format!(r#"{{"partNumber": {}, "s3UploadId": "mp-1"}}"#, number);
        let reply = harness
            .uploads
            .write_chunk(id, 0, ChunkPayload::part_from_json(&raw).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(reply.url.contains(&format!("partNumber={}", number)));
    }
    assert_eq!(*harness.uploads.session(id).await.unwrap().received(), 0);

    let finalized = harness.uploads.finalize(id).await.unwrap();
    assert_eq!(finalized.file.size, 20);
    let request = finalized.finalize_request.unwrap();
    assert!(request.url.contains("uploadId=mp-1"));
}
