mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{RecordingConsumer, Reply, TestServer, init_tracing, media_playlist, segment_body};
use hls_pull::{
    ConsumerError, ExitReason, HlsPluginConfig, HlsPullError, IngestSettings, PublishRequest,
    Rendition, SessionManager,
};
use tokio_util::sync::CancellationToken;

fn plugin_config(enable_write: bool, path: &std::path::Path) -> HlsPluginConfig {
    HlsPluginConfig {
        enable_write,
        path: path.to_path_buf(),
        ingest: IngestSettings {
            request_timeout_ms: 2_000,
            retry_delay_ms: 5,
            stale_delay_ms: 5,
            min_refresh_interval_ms: 5,
            ..IngestSettings::default()
        },
        ..HlsPluginConfig::default()
    }
}

fn request(
    server: &TestServer,
    stream_path: &str,
    with_audio: bool,
    consumer: Arc<RecordingConsumer>,
    cancel: CancellationToken,
) -> PublishRequest {
    PublishRequest {
        stream_path: stream_path.to_string(),
        video: server.template("/room/video.m3u8"),
        audio: with_audio.then(|| server.template("/room/audio.m3u8")),
        consumer,
        cancel,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn script_room(server: &TestServer) {
    server.script(
        "/room/video.m3u8",
        vec![Reply::Playlist(media_playlist(5, &["v5.ts", "v6.ts"]))],
    );
    server.script(
        "/room/audio.m3u8",
        vec![Reply::Playlist(media_playlist(5, &["a5.ts"]))],
    );
}

#[tokio::test]
async fn test_publish_snapshot_and_close() {
    init_tracing();
    let server = TestServer::new().await;
    script_room(&server);
    let dir = tempfile::tempdir().unwrap();
    let manager = SessionManager::start(plugin_config(false, dir.path())).unwrap();

    let cancel = CancellationToken::new();
    let consumer = Arc::new(RecordingConsumer::new(cancel.clone()));
    let session = manager
        .publish(request(&server, "live/room", true, Arc::clone(&consumer), cancel))
        .unwrap();
    assert!(manager.registry().contains("live/room"));

    wait_until(|| {
        manager.registry().snapshot().first().is_some_and(|info| {
            info.video.as_ref().is_some_and(|v| v.ts_count == 2)
                && info.audio.as_ref().is_some_and(|a| a.ts_count == 1)
        })
    })
    .await;
    let infos = manager.registry().snapshot();
    assert_eq!(infos.len(), 1);
    let info = &infos[0];
    assert_eq!(info.stream_path, "live/room");
    assert_eq!(info.video.as_ref().unwrap().ts_count, 2);
    assert_eq!(info.audio.as_ref().unwrap().ts_count, 1);
    assert_eq!(info.ts_info.buffer_length, 3);

    let json = serde_json::to_value(info).unwrap();
    assert_eq!(json["StreamPath"], "live/room");
    assert_eq!(json["Video"]["TSCount"], 2);

    let reasons = manager.close("live/room").await.unwrap();
    assert_eq!(reasons.len(), 2);
    assert!(reasons.iter().all(|(_, reason)| *reason == ExitReason::Cancelled));
    assert!(session.is_closed());
    assert!(manager.registry().is_empty());
    assert!(consumer.is_closed());
    assert!(manager.close("live/room").await.is_none());
}

#[tokio::test]
async fn test_duplicate_publish_is_rejected() {
    init_tracing();
    let server = TestServer::new().await;
    script_room(&server);
    let dir = tempfile::tempdir().unwrap();
    let manager = SessionManager::start(plugin_config(false, dir.path())).unwrap();

    let cancel = CancellationToken::new();
    let consumer = Arc::new(RecordingConsumer::new(cancel.clone()));
    manager
        .publish(request(&server, "live/dup", false, Arc::clone(&consumer), cancel))
        .unwrap();

    let other_cancel = CancellationToken::new();
    let other = Arc::new(RecordingConsumer::new(other_cancel.clone()));
    let err = manager
        .publish(request(&server, "live/dup", false, other, other_cancel))
        .err()
        .unwrap();
    assert!(matches!(err, HlsPullError::AlreadyPublishing(path) if path == "live/dup"));

    // The live session keeps running.
    wait_until(|| consumer.feed_count() == 2).await;
    manager.shutdown().await;
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn test_consumer_failure_tears_down_session() {
    init_tracing();
    let server = TestServer::new().await;
    script_room(&server);
    let dir = tempfile::tempdir().unwrap();
    let manager = SessionManager::start(plugin_config(false, dir.path())).unwrap();

    let cancel = CancellationToken::new();
    let consumer = Arc::new(RecordingConsumer::failing_at(cancel.clone(), 1));
    let session = manager
        .publish(request(&server, "live/broken", true, Arc::clone(&consumer), cancel))
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), session.closed())
        .await
        .unwrap();
    assert!(!manager.registry().contains("live/broken"));

    let reasons = session.exit_reasons();
    assert_eq!(reasons.len(), 2);
    assert!(reasons.iter().any(|(_, reason)| matches!(
        reason,
        ExitReason::ConsumerTerminated(ConsumerError::Decode(_))
    )));
    assert!(consumer.is_closed());
    assert_eq!(consumer.feed_count(), 1);
}

#[tokio::test]
async fn test_enable_write_persists_segments() {
    init_tracing();
    let server = TestServer::new().await;
    script_room(&server);
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("hls");
    let manager = SessionManager::start(plugin_config(true, &base)).unwrap();
    assert!(base.is_dir());

    let cancel = CancellationToken::new();
    let consumer = Arc::new(RecordingConsumer::new(cancel.clone()));
    let session = manager
        .publish(request(&server, "live/saved", false, Arc::clone(&consumer), cancel))
        .unwrap();
    assert!(session.save_switch().is_active());

    wait_until(|| consumer.feed_count() == 2).await;
    let saved = tokio::fs::read(base.join("live/saved/video/v6.ts")).await.unwrap();
    assert_eq!(saved, segment_body("v6.ts"));

    let reasons = manager.close("live/saved").await.unwrap();
    assert_eq!(reasons, vec![(Rendition::Video, ExitReason::Cancelled)]);
}

#[tokio::test]
async fn test_start_creates_base_dir_without_enable_write() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("hls");
    let _manager = SessionManager::start(plugin_config(false, &base)).unwrap();
    // On-demand saves need the directory as much as enable_write does.
    assert!(base.is_dir());
}

#[tokio::test]
async fn test_begin_save_toggles_persistence() {
    init_tracing();
    let server = TestServer::new().await;
    script_room(&server);
    let dir = tempfile::tempdir().unwrap();
    let manager = SessionManager::start(plugin_config(false, dir.path())).unwrap();

    let cancel = CancellationToken::new();
    let consumer = Arc::new(RecordingConsumer::new(cancel.clone()));
    let session = manager
        .publish(request(&server, "live/toggle", false, consumer, cancel))
        .unwrap();

    assert!(!session.save_switch().is_active());
    let guard = session.begin_save();
    assert!(session.save_switch().is_active());
    drop(guard);
    assert!(!session.save_switch().is_active());

    session.cancel();
    tokio::time::timeout(Duration::from_secs(5), session.closed())
        .await
        .unwrap();
}
