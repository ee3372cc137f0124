//! Relay-level tests: live drain loop, and the dead-letter path that
//! turns an exhausted upload delivery into a visible processing failure.

mod helpers;

use async_trait::async_trait;
use cadenza_api::setup::ProcessingFailurePublisher;
use cadenza_core::events::{EventEnvelope, EventKind};
use cadenza_core::models::MediaStatus;
use cadenza_core::HandlerError;
use cadenza_relay::{
    process_next, DeadLetterHandler, EventHandler, EventRelay, HandlerRegistry, RelayConfig,
};
use helpers::try_test_app;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn relay_delivers_published_events() {
    let _guard = helpers::test_lock().await;
    let Some(app) = try_test_app().await else { return };

    let relay = EventRelay::start(
        app.services.outbox.clone(),
        app.registry.clone(),
        RelayConfig {
            max_workers: 2,
            poll_interval_ms: 50,
            max_attempts: 5,
            reap_interval_secs: 0,
            delivering_grace_secs: 300,
        },
        None,
        None,
    );

    let song_id = app.create_song("Relayed", "Someone", None).await;
    app.server
        .delete(&format!("/api/songs/{}", song_id))
        .await
        .assert_status_ok();

    let mut status = String::new();
    for _ in 0..100 {
        status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM outbox_events WHERE event_type = 'SongDeleted' AND payload->>'song_id' = $1",
        )
        .bind(song_id.to_string())
        .fetch_one(&app.services.state.pool)
        .await
        .unwrap();
        if status == "delivered" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    relay.shutdown().await;
    assert_eq!(status, "delivered");
}

struct AlwaysFailing;

#[async_trait]
impl EventHandler for AlwaysFailing {
    fn name(&self) -> &'static str {
        "always-failing"
    }

    fn subscriptions(&self) -> &'static [EventKind] {
        &[EventKind::MediaUploaded]
    }

    async fn handle(&self, _envelope: &EventEnvelope) -> Result<(), HandlerError> {
        Err(HandlerError::transient(anyhow::anyhow!(
            "transcoder unavailable"
        )))
    }
}

#[tokio::test]
async fn exhausted_upload_delivery_marks_files_failed() {
    let _guard = helpers::test_lock().await;
    let Some(app) = try_test_app().await else { return };

    let song_id = app.create_song("Unlucky", "Someone", None).await;
    let response = app
        .server
        .post("/api/media/upload/init")
        .json(&serde_json::json!({
            "songId": song_id,
            "fileName": "broken.mp3",
            "contentType": "audio/mpeg",
        }))
        .await;
    let body: serde_json::Value = response.json();
    let upload_id: Uuid = body["uploadId"].as_str().unwrap().parse().unwrap();
    app.server
        .post("/api/media/upload/confirm")
        .json(&serde_json::json!({ "uploadId": upload_id }))
        .await
        .assert_status_ok();

    // One allowed attempt, a worker that always fails: the delivery is
    // dead-lettered and the hook publishes the failure event.
    let mut failing = HandlerRegistry::new();
    failing.subscribe(Arc::new(AlwaysFailing));
    let failing = Arc::new(failing);
    let hook: Arc<dyn DeadLetterHandler> = Arc::new(ProcessingFailurePublisher::new(
        app.services.publisher.clone(),
    ));
    assert!(process_next(&app.services.outbox, &failing, 1, Some(hook))
        .await
        .unwrap());

    let uploaded_status = sqlx::query_scalar::<_, String>(
        "SELECT status FROM outbox_events WHERE event_type = 'MediaUploaded' AND payload->>'song_id' = $1",
    )
    .bind(song_id.to_string())
    .fetch_one(&app.services.state.pool)
    .await
    .unwrap();
    assert_eq!(uploaded_status, "dead");
    assert_eq!(
        app.outbox_count_for_song("MediaProcessingFailed", song_id)
            .await,
        1
    );

    // Delivering the failure event through the normal consumers marks the
    // song's files terminally failed.
    app.drain_outbox().await;
    let media_file = app
        .services
        .media_files
        .get(upload_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(media_file.status, MediaStatus::Failed);
}
