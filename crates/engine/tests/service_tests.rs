//! End-to-end tests for the upload service facade.

mod common;

use bytes::Bytes;
use common::{build_service, chunk_req, seeded_bytes};
use stitch_engine::{ChunkOutcome, EngineError};

#[tokio::test]
async fn test_three_chunk_upload_produces_exact_file() {
    let (temp, service) = build_service().await;

    let r0 = service
        .receive_chunk(chunk_req("s1", 0, 3, "out.bin", Bytes::from_static(b"AAA")))
        .await
        .unwrap();
    assert_eq!(r0, ChunkOutcome::Accepted);

    let r1 = service
        .receive_chunk(chunk_req("s1", 1, 3, "out.bin", Bytes::from_static(b"BB")))
        .await
        .unwrap();
    assert_eq!(r1, ChunkOutcome::Accepted);

    let r2 = service
        .receive_chunk(chunk_req("s1", 2, 3, "out.bin", Bytes::from_static(b"C")))
        .await
        .unwrap();
    let path = match r2 {
        ChunkOutcome::Merged(path) => path,
        other => panic!("expected merge on final chunk, got {other:?}"),
    };

    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"AAABBC");

    // Completed listing sees the file with its exact size
    let files = service.list_completed_files().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "out.bin");
    assert_eq!(files[0].size, 6);

    // Temp area purged, session no longer partial, completion poll positive
    assert!(!temp.path().join("temp").join("s1").exists());
    assert!(service.list_partial_uploads().await.unwrap().is_empty());
    assert!(service.merge_status("out.bin").await.unwrap().merged);
}

#[tokio::test]
async fn test_merge_concatenates_out_of_order_arrivals() {
    let (_temp, service) = build_service().await;

    // Arrival order differs from index order; only the final index triggers
    let payloads = [
        seeded_bytes(1, 10),
        seeded_bytes(2, 70_000),
        seeded_bytes(3, 1),
        seeded_bytes(4, 3),
    ];
    for index in [1u32, 0, 2] {
        let req = chunk_req("s2", index, 4, "data.bin", payloads[index as usize].clone());
        assert_eq!(service.receive_chunk(req).await.unwrap(), ChunkOutcome::Accepted);
    }
    let outcome = service
        .receive_chunk(chunk_req("s2", 3, 4, "data.bin", payloads[3].clone()))
        .await
        .unwrap();

    let path = match outcome {
        ChunkOutcome::Merged(path) => path,
        other => panic!("expected merge, got {other:?}"),
    };

    let mut expected = Vec::new();
    for payload in &payloads {
        expected.extend_from_slice(payload);
    }
    assert_eq!(tokio::fs::read(&path).await.unwrap(), expected);
}

#[tokio::test]
async fn test_single_chunk_upload_merges_immediately() {
    let (_temp, service) = build_service().await;

    let outcome = service
        .receive_chunk(chunk_req("solo", 0, 1, "one.bin", Bytes::from_static(b"hi")))
        .await
        .unwrap();

    match outcome {
        ChunkOutcome::Merged(path) => {
            assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hi");
        }
        other => panic!("expected merge, got {other:?}"),
    }
}

#[tokio::test]
async fn test_next_chunk_unknown_session_starts_from_zero() {
    let (_temp, service) = build_service().await;
    assert_eq!(service.next_chunk("never-seen").await.unwrap(), 0);
}

#[tokio::test]
async fn test_next_chunk_advances_and_reports_first_hole() {
    let (_temp, service) = build_service().await;

    service
        .receive_chunk(chunk_req("s3", 0, 5, "f.bin", Bytes::from_static(b"a")))
        .await
        .unwrap();
    assert_eq!(service.next_chunk("s3").await.unwrap(), 1);

    service
        .receive_chunk(chunk_req("s3", 1, 5, "f.bin", Bytes::from_static(b"b")))
        .await
        .unwrap();
    assert_eq!(service.next_chunk("s3").await.unwrap(), 2);

    // Chunk 3 arrives before chunk 2: the resume point is the hole
    service
        .receive_chunk(chunk_req("s3", 3, 5, "f.bin", Bytes::from_static(b"d")))
        .await
        .unwrap();
    assert_eq!(service.next_chunk("s3").await.unwrap(), 2);
}

#[tokio::test]
async fn test_resent_chunk_replaces_payload() {
    let (_temp, service) = build_service().await;

    service
        .receive_chunk(chunk_req("s4", 0, 3, "out.bin", Bytes::from_static(b"XXX")))
        .await
        .unwrap();
    // Retry of the same index before merge overwrites the stored payload
    service
        .receive_chunk(chunk_req("s4", 0, 3, "out.bin", Bytes::from_static(b"AAA")))
        .await
        .unwrap();
    service
        .receive_chunk(chunk_req("s4", 1, 3, "out.bin", Bytes::from_static(b"BB")))
        .await
        .unwrap();

    let outcome = service
        .receive_chunk(chunk_req("s4", 2, 3, "out.bin", Bytes::from_static(b"C")))
        .await
        .unwrap();
    let path = match outcome {
        ChunkOutcome::Merged(path) => path,
        other => panic!("expected merge, got {other:?}"),
    };
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"AAABBC");
}

#[tokio::test]
async fn test_missing_middle_chunk_fails_merge_then_resumes() {
    let (_temp, service) = build_service().await;

    service
        .receive_chunk(chunk_req("s5", 0, 3, "out.bin", Bytes::from_static(b"AAA")))
        .await
        .unwrap();

    // Chunk 1 never arrives; the final chunk triggers a failing merge
    let err = service
        .receive_chunk(chunk_req("s5", 2, 3, "out.bin", Bytes::from_static(b"C")))
        .await
        .unwrap_err();
    match err {
        EngineError::MissingChunk(1) => assert!(err.is_resumable()),
        other => panic!("expected MissingChunk(1), got {other:?}"),
    }

    // No file appeared under the final name and nothing was consumed
    assert!(!service.merge_status("out.bin").await.unwrap().merged);
    assert!(service.list_completed_files().await.unwrap().is_empty());
    assert_eq!(service.next_chunk("s5").await.unwrap(), 1);

    // Fill the hole, then re-send the final chunk to re-trigger
    service
        .receive_chunk(chunk_req("s5", 1, 3, "out.bin", Bytes::from_static(b"BB")))
        .await
        .unwrap();
    let outcome = service
        .receive_chunk(chunk_req("s5", 2, 3, "out.bin", Bytes::from_static(b"C")))
        .await
        .unwrap();

    let path = match outcome {
        ChunkOutcome::Merged(path) => path,
        other => panic!("expected merge, got {other:?}"),
    };
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"AAABBC");
    assert!(service.merge_status("out.bin").await.unwrap().merged);
}

#[tokio::test]
async fn test_progress_and_partial_listing() {
    let (_temp, service) = build_service().await;

    let mut req = chunk_req("s6", 0, 2, "movie.mkv", Bytes::from_static(b"AAA"));
    req.declared_size = Some(6);
    service.receive_chunk(req).await.unwrap();

    let progress = service.progress("s6").await.unwrap();
    assert_eq!(progress.uploaded_bytes, 3);
    assert_eq!(progress.percent, 50);
    assert_eq!(progress.chunk_count, 1);

    let partials = service.list_partial_uploads().await.unwrap();
    assert_eq!(partials.len(), 1);
    assert_eq!(partials[0].session_id.as_str(), "s6");
    assert_eq!(partials[0].name, "movie.mkv");
    assert_eq!(partials[0].total_size, Some(6));
    assert_eq!(partials[0].uploaded_size, 3);
    assert_eq!(partials[0].percent, 50);
    assert_eq!(partials[0].chunk_count, 1);
}

#[tokio::test]
async fn test_progress_without_declared_size_reports_zero_percent() {
    let (_temp, service) = build_service().await;

    service
        .receive_chunk(chunk_req("s7", 0, 2, "f.bin", Bytes::from_static(b"abc")))
        .await
        .unwrap();

    let progress = service.progress("s7").await.unwrap();
    assert_eq!(progress.uploaded_bytes, 3);
    assert_eq!(progress.percent, 0);
}

#[tokio::test]
async fn test_invalid_requests_rejected_before_mutation() {
    let (_temp, service) = build_service().await;

    // Index out of range
    let err = service
        .receive_chunk(chunk_req("v1", 3, 3, "f.bin", Bytes::from_static(b"x")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Request(_)), "got {err:?}");

    // Zero total chunks
    let err = service
        .receive_chunk(chunk_req("v1", 0, 0, "f.bin", Bytes::from_static(b"x")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Request(_)), "got {err:?}");

    // Traversal in the session id and in the filename
    let err = service
        .receive_chunk(chunk_req("../v1", 0, 3, "f.bin", Bytes::from_static(b"x")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Request(_)), "got {err:?}");

    let err = service
        .receive_chunk(chunk_req("v1", 0, 3, "../f.bin", Bytes::from_static(b"x")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Request(_)), "got {err:?}");

    // Nothing was stored by any rejected request
    assert!(service.list_partial_uploads().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_inconsistent_declarations_rejected() {
    let (_temp, service) = build_service().await;

    service
        .receive_chunk(chunk_req("s8", 0, 3, "out.bin", Bytes::from_static(b"a")))
        .await
        .unwrap();

    let err = service
        .receive_chunk(chunk_req("s8", 1, 4, "out.bin", Bytes::from_static(b"b")))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            EngineError::Request(stitch_core::Error::TotalChunksMismatch { declared: 3, got: 4 })
        ),
        "got {err:?}"
    );

    let err = service
        .receive_chunk(chunk_req("s8", 1, 3, "other.bin", Bytes::from_static(b"b")))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            EngineError::Request(stitch_core::Error::FilenameMismatch { .. })
        ),
        "got {err:?}"
    );

    // The session still only holds the one chunk that passed validation
    assert_eq!(service.next_chunk("s8").await.unwrap(), 1);
}

#[tokio::test]
async fn test_merge_status_unknown_file_is_not_merged() {
    let (_temp, service) = build_service().await;
    assert!(!service.merge_status("nothing.bin").await.unwrap().merged);
}

#[tokio::test]
async fn test_purge_session_clears_partial_upload() {
    let (temp, service) = build_service().await;

    service
        .receive_chunk(chunk_req("s9", 0, 3, "f.bin", Bytes::from_static(b"abc")))
        .await
        .unwrap();
    assert_eq!(service.list_partial_uploads().await.unwrap().len(), 1);

    service.purge_session("s9").await.unwrap();
    assert!(service.list_partial_uploads().await.unwrap().is_empty());
    assert!(!temp.path().join("temp").join("s9").exists());

    // Idempotent
    service.purge_session("s9").await.unwrap();
}
