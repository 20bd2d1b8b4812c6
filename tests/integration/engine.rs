//! Controller lifecycle integration tests

use crate::helpers::*;
use platyplaty::session::{
    EMPTY_PLAYLIST_MESSAGE, NO_PLAYABLE_MESSAGE, START_FAILED_MESSAGE,
};
use platyplaty::{Error, SessionError, StartupOutcome};
use tempfile::TempDir;

#[tokio::test]
async fn test_start_without_renderer_binary() {
    let dir = TempDir::new().unwrap();
    let presets = preset_files(dir.path(), &["a.milk"]);
    let (app, sink) = test_app(&dir, presets, None);

    match app.start().await {
        Err(Error::Session(SessionError::RendererNotFound(path))) => {
            assert_eq!(path, dir.path().join("no-such-renderer"));
        }
        other => panic!("Expected RendererNotFound, got {:?}", other),
    }
    assert!(!app.is_ready());
    assert!(sink.contains(START_FAILED_MESSAGE));
    // A start failure is not a preset failure.
    assert!(app.playlist().lock().broken_indices().is_empty());
    assert!(app.registry().is_empty());

    app.shutdown().await;
}

#[tokio::test]
async fn test_status_needs_running_renderer() {
    let dir = TempDir::new().unwrap();
    let (app, _sink) = test_app(&dir, Vec::new(), None);

    assert!(matches!(
        app.renderer_status().await,
        Err(Error::Session(SessionError::NotRunning))
    ));
    app.shutdown().await;
}

#[tokio::test]
async fn test_autoplay_refuses_empty_playlist() {
    let dir = TempDir::new().unwrap();
    let (app, sink) = test_app(&dir, Vec::new(), None);

    assert!(!app.toggle_autoplay().await);
    assert!(!app.autoplay().is_enabled());
    assert!(sink.contains(EMPTY_PLAYLIST_MESSAGE));

    app.shutdown().await;
}

#[tokio::test]
async fn test_autoplay_refuses_missing_presets() {
    let dir = TempDir::new().unwrap();
    let presets = preset_files(dir.path(), &["missing-a.milk", "missing-b.milk"]);
    let (app, sink) = test_app(&dir, presets, None);

    assert!(!app.toggle_autoplay().await);
    assert!(sink.contains(NO_PLAYABLE_MESSAGE));
    assert_eq!(app.playlist().lock().broken_indices().len(), 2);

    app.shutdown().await;
}

#[tokio::test]
async fn test_quit_key_ends_wait_for_shutdown() {
    let dir = TempDir::new().unwrap();
    let (app, _sink) = test_app(&dir, Vec::new(), None);

    app.handle_key("q");
    tokio::time::timeout(WAIT, app.wait_for_shutdown())
        .await
        .expect("quit key did not shut down");
    assert!(app.shutdown_signal().is_triggered());
}

/// Missing and refused entries are skipped and marked; the first one that
/// loads wins, then the window is shown fullscreen.
#[tokio::test]
async fn test_startup_sequence() {
    let renderer = mock_renderer();
    let dir = TempDir::new().unwrap();
    let presets = preset_files(dir.path(), &["missing.milk", "reject.milk", "good.milk"]);
    let good = std::fs::canonicalize(&presets[2]).unwrap();
    let sink = std::sync::Arc::new(platyplaty::session::MemoryStatusSink::new());
    let app = platyplaty::Platyplaty::builder()
        .socket_path(dir.path().join("renderer.sock"))
        .renderer_binary(renderer)
        .playlist(presets)
        .fullscreen(true)
        .status_sink(sink.clone())
        .build()
        .unwrap();

    assert_eq!(app.start().await.unwrap(), StartupOutcome::Preset(2));
    assert!(app.is_ready());
    {
        let playlist = app.playlist().lock();
        assert_eq!(playlist.playing(), Some(2));
        assert!(playlist.is_broken(0));
        assert!(playlist.is_broken(1));
    }

    let status = app.renderer_status().await.unwrap();
    assert_eq!(status["preset"], good.to_str().unwrap());
    assert_eq!(status["window_visible"], true);
    assert_eq!(status["fullscreen"], true);

    app.shutdown().await;
    assert!(!app.is_ready());
}

#[tokio::test]
async fn test_startup_falls_back_to_idle() {
    let renderer = mock_renderer();
    let dir = TempDir::new().unwrap();
    let presets = preset_files(dir.path(), &["reject.milk"]);
    let (app, _sink) = test_app(&dir, presets, Some(renderer));

    assert_eq!(app.start().await.unwrap(), StartupOutcome::Idle);
    let status = app.renderer_status().await.unwrap();
    assert_eq!(status["preset"], "idle://");
    assert_eq!(status["fullscreen"], false);

    app.shutdown().await;
}

/// After a crash the next play restarts the renderer.
#[tokio::test]
async fn test_play_after_crash_restarts() {
    let renderer = mock_renderer();
    let dir = TempDir::new().unwrap();
    let presets = preset_files(dir.path(), &["a.milk", "crash.milk"]);
    let (app, sink) = test_app(&dir, presets, Some(renderer));

    assert_eq!(app.start().await.unwrap(), StartupOutcome::Preset(0));

    let err = app.play(1).await.unwrap_err();
    assert!(matches!(err, Error::Session(ref e) if e.is_connection_fatal()));

    let report = tokio::time::timeout(WAIT, app.next_crash())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.broken, vec![1]);
    assert!(!app.is_ready());
    assert!(sink.contains(platyplaty::session::CRASH_MESSAGE));

    app.play(0).await.unwrap();
    assert!(app.is_ready());
    assert_eq!(app.renderer_status().await.unwrap()["loads"], 1);

    app.shutdown().await;
}
