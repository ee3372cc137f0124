//! End-to-end saga tests: upload grant → confirm → (simulated worker) →
//! catalog/search convergence → deletion cleanup.

mod helpers;

use cadenza_core::events::EventPayload;
use cadenza_core::models::MediaStatus;
use helpers::try_test_app;
use uuid::Uuid;

#[tokio::test]
async fn init_then_double_confirm_emits_one_event() {
    let _guard = helpers::test_lock().await;
    let Some(app) = try_test_app().await else { return };

    let song_id = app.create_song("Uploadable", "Someone", None).await;

    let response = app
        .server
        .post("/api/media/upload/init")
        .json(&serde_json::json!({
            "songId": song_id,
            "fileName": "track.flac",
            "contentType": "audio/flac",
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let upload_id: Uuid = body["uploadId"].as_str().unwrap().parse().unwrap();
    let storage_key = body["storageKey"].as_str().unwrap().to_string();
    assert!(body["uploadUrl"].as_str().unwrap().contains(&storage_key));

    // Null category lands in the date-partitioned audio namespace, with
    // the upload id as the random component.
    assert!(storage_key.starts_with("audio/"));
    assert!(storage_key.ends_with(&format!("/{}.flac", upload_id)));

    // Simulate the client's direct PUT.
    let scratch = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(scratch.path(), b"flac-bytes").unwrap();
    app.storage
        .upload_file(&app.config.raw_bucket, &storage_key, scratch.path(), "audio/flac")
        .await
        .unwrap();

    for _ in 0..2 {
        let response = app
            .server
            .post("/api/media/upload/confirm")
            .json(&serde_json::json!({ "uploadId": upload_id }))
            .await;
        response.assert_status_ok();
    }

    // Exactly one event despite the duplicate confirm.
    assert_eq!(app.outbox_count_for_song("MediaUploaded", song_id).await, 1);

    let media_file = app
        .services
        .media_files
        .get(upload_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(media_file.status, MediaStatus::Uploaded);
    assert_eq!(media_file.file_size, 10);
}

#[tokio::test]
async fn confirm_of_unknown_upload_is_not_found() {
    let _guard = helpers::test_lock().await;
    let Some(app) = try_test_app().await else { return };

    let response = app
        .server
        .post("/api/media/upload/confirm")
        .json(&serde_json::json!({ "uploadId": Uuid::new_v4() }))
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn round_trip_reaches_ready_and_is_idempotent() {
    let _guard = helpers::test_lock().await;
    let Some(app) = try_test_app().await else { return };

    let song_id = app.create_song("Draft Title", "Draft Artist", None).await;

    let response = app
        .server
        .post("/api/media/upload/init")
        .json(&serde_json::json!({
            "songId": song_id,
            "fileName": "track.mp3",
            "contentType": "audio/mpeg",
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let upload_id: Uuid = body["uploadId"].as_str().unwrap().parse().unwrap();

    app.server
        .post("/api/media/upload/confirm")
        .json(&serde_json::json!({ "uploadId": upload_id }))
        .await
        .assert_status_ok();

    // The uploaded event moves song and file into the informational
    // processing phase.
    app.drain_outbox().await;
    let song: serde_json::Value = app.server.get(&format!("/api/songs/{}", song_id)).await.json();
    assert_eq!(song["status"], "processing");

    // Simulate a successful worker run.
    let processed = EventPayload::MediaProcessed {
        song_id,
        hls_key: format!("hls/{}/index.m3u8", song_id),
        duration_seconds: 180.5,
        title: Some("Extracted Title".to_string()),
        artist: None,
        album: Some("Extracted Album".to_string()),
        cover_key: None,
    };
    app.services.publisher.publish(processed.clone()).await.unwrap();
    app.drain_outbox().await;

    let song: serde_json::Value = app.server.get(&format!("/api/songs/{}", song_id)).await.json();
    assert_eq!(song["status"], "ready");
    assert_eq!(song["hlsKey"], format!("hls/{}/index.m3u8", song_id));
    assert_eq!(song["durationSeconds"], 180.5);
    // Extracted values win; absent ones keep the draft values.
    assert_eq!(song["title"], "Extracted Title");
    assert_eq!(song["artist"], "Draft Artist");
    assert_eq!(song["album"], "Extracted Album");

    let media_file = app
        .services
        .media_files
        .get(upload_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(media_file.status, MediaStatus::Ready);

    let docs = app.search.documents();
    let doc = &docs[&song_id.to_string()];
    assert_eq!(doc.title, "Extracted Title");
    // The indexer falls back to a placeholder for absent metadata.
    assert_eq!(doc.artist, "Unknown");

    // Redelivery of the same event leaves the state identical.
    app.services.publisher.publish(processed).await.unwrap();
    app.drain_outbox().await;
    let after: serde_json::Value = app.server.get(&format!("/api/songs/{}", song_id)).await.json();
    assert_eq!(song, after);
}

#[tokio::test]
async fn absent_metadata_keeps_existing_cover() {
    let _guard = helpers::test_lock().await;
    let Some(app) = try_test_app().await else { return };

    let song_id = app
        .create_song("Covered", "Someone", Some("covers/original.png"))
        .await;

    app.services
        .publisher
        .publish(EventPayload::MediaProcessed {
            song_id,
            hls_key: format!("hls/{}/index.m3u8", song_id),
            duration_seconds: 95.0,
            title: None,
            artist: None,
            album: None,
            cover_key: None,
        })
        .await
        .unwrap();
    app.drain_outbox().await;

    let song: serde_json::Value = app.server.get(&format!("/api/songs/{}", song_id)).await.json();
    assert_eq!(song["status"], "ready");
    assert_eq!(song["title"], "Covered");
    assert_eq!(song["coverKey"], "covers/original.png");
}

#[tokio::test]
async fn processed_event_for_missing_song_is_dropped() {
    let _guard = helpers::test_lock().await;
    let Some(app) = try_test_app().await else { return };

    let song_id = Uuid::new_v4();
    app.services
        .publisher
        .publish(EventPayload::MediaProcessed {
            song_id,
            hls_key: format!("hls/{}/index.m3u8", song_id),
            duration_seconds: 10.0,
            title: None,
            artist: None,
            album: None,
            cover_key: None,
        })
        .await
        .unwrap();
    app.drain_outbox().await;

    // The catalog dropped the event; the indexer still upserted its
    // denormalized document, and the delivery is not retried.
    let row = sqlx::query_scalar::<_, String>(
        "SELECT status FROM outbox_events WHERE event_type = 'MediaProcessed' AND payload->>'song_id' = $1",
    )
    .bind(song_id.to_string())
    .fetch_one(&app.services.state.pool)
    .await
    .unwrap();
    assert_eq!(row, "delivered");
}

#[tokio::test]
async fn deletion_cleanup_is_idempotent() {
    let _guard = helpers::test_lock().await;
    let Some(app) = try_test_app().await else { return };

    let song_id = app.create_song("Doomed", "Someone", None).await;

    // Upload and confirm a raw file so cleanup has something to remove.
    let response = app
        .server
        .post("/api/media/upload/init")
        .json(&serde_json::json!({
            "songId": song_id,
            "fileName": "doomed.mp3",
            "contentType": "audio/mpeg",
        }))
        .await;
    let body: serde_json::Value = response.json();
    let upload_id: Uuid = body["uploadId"].as_str().unwrap().parse().unwrap();
    let storage_key = body["storageKey"].as_str().unwrap().to_string();

    let scratch = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(scratch.path(), b"mp3").unwrap();
    app.storage
        .upload_file(&app.config.raw_bucket, &storage_key, scratch.path(), "audio/mpeg")
        .await
        .unwrap();
    app.server
        .post("/api/media/upload/confirm")
        .json(&serde_json::json!({ "uploadId": upload_id }))
        .await
        .assert_status_ok();
    app.drain_outbox().await;

    // Index it, then delete the song.
    app.services
        .publisher
        .publish(EventPayload::MediaProcessed {
            song_id,
            hls_key: format!("hls/{}/index.m3u8", song_id),
            duration_seconds: 33.0,
            title: None,
            artist: None,
            album: None,
            cover_key: None,
        })
        .await
        .unwrap();
    app.drain_outbox().await;
    assert!(app.search.documents().contains_key(&song_id.to_string()));

    app.server
        .delete(&format!("/api/songs/{}", song_id))
        .await
        .assert_status_ok();
    assert_eq!(app.outbox_count_for_song("SongDeleted", song_id).await, 1);

    app.drain_outbox().await;

    app.server
        .get(&format!("/api/songs/{}", song_id))
        .await
        .assert_status_not_found();
    assert!(app
        .services
        .media_files
        .list_by_song(song_id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        app.storage
            .content_length(&app.config.raw_bucket, &storage_key)
            .await
            .unwrap(),
        None
    );
    assert!(!app.search.documents().contains_key(&song_id.to_string()));

    // Redelivery after full cleanup: nothing left to delete anywhere,
    // still no error.
    app.services
        .publisher
        .publish(EventPayload::SongDeleted { song_id })
        .await
        .unwrap();
    app.drain_outbox().await;
}

#[tokio::test]
async fn deleting_song_with_no_artifacts_completes() {
    let _guard = helpers::test_lock().await;
    let Some(app) = try_test_app().await else { return };

    let song_id = app.create_song("Bare", "Nobody", None).await;
    app.server
        .delete(&format!("/api/songs/{}", song_id))
        .await
        .assert_status_ok();
    app.drain_outbox().await;

    let row = sqlx::query_scalar::<_, String>(
        "SELECT status FROM outbox_events WHERE event_type = 'SongDeleted' AND payload->>'song_id' = $1",
    )
    .bind(song_id.to_string())
    .fetch_one(&app.services.state.pool)
    .await
    .unwrap();
    assert_eq!(row, "delivered");
}
