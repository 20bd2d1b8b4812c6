//! Session lifecycle against the stand-in renderer

use crate::helpers::*;
use platyplaty_session::{
    Command, Preset, SessionError, StartupStage, TransitionType, START_FAILED_MESSAGE,
};

/// The first `LOAD PRESET` spawns and initialises the renderer.
#[tokio::test]
async fn test_first_load_starts_renderer() {
    let mut h = Harness::new(Renderer::Plain, &["a.milk"]);
    assert!(!h.is_ready());

    h.play(0).await.unwrap();
    assert!(h.is_ready());

    let status = h.renderer_status().await;
    assert_eq!(status["initialized"], true);
    assert_eq!(status["audio_source"], "test.monitor");
    assert_eq!(status["preset"], h.preset(0).to_str().unwrap());
    assert_eq!(status["loads"], 1);

    h.shutdown().await;
}

/// Commands other than `LOAD PRESET` never start a renderer.
#[tokio::test]
async fn test_other_commands_need_running_renderer() {
    let mut h = Harness::new(Renderer::Plain, &["a.milk"]);

    let err = h.queue.request(Command::show_window()).await.unwrap_err();
    assert!(matches!(err, SessionError::NotRunning));
    assert!(!h.is_ready());
    assert!(!h.config.socket_path.exists());

    h.shutdown().await;
}

#[tokio::test]
async fn test_idle_and_window_commands() {
    let mut h = Harness::new(Renderer::Plain, &[]);

    let idle = Command::load_preset(&Preset::Idle, TransitionType::Soft);
    h.queue.request(idle).await.unwrap();
    h.queue.request(Command::show_window()).await.unwrap();
    h.queue.request(Command::set_fullscreen(true)).await.unwrap();

    let status = h.renderer_status().await;
    assert_eq!(status["preset"], "idle://");
    assert_eq!(status["window_visible"], true);
    assert_eq!(status["fullscreen"], true);

    h.shutdown().await;
}

/// A refusal is an application error: the renderer keeps running.
#[tokio::test]
async fn test_refused_load_keeps_session() {
    let mut h = Harness::new(Renderer::Plain, &["a.milk", "reject.milk"]);
    h.play(0).await.unwrap();
    let pid = h.renderer_status().await["pid"].clone();

    let err = h.load(h.preset(1)).await.unwrap_err();
    match err {
        SessionError::Renderer { command, message } => {
            assert_eq!(command, "LOAD PRESET");
            assert!(message.contains("reject.milk"));
        }
        other => panic!("Expected a renderer error, got {:?}", other),
    }

    assert!(h.is_ready());
    assert!(h.registry.is_empty());
    assert_eq!(h.renderer_status().await["pid"], pid);
    assert!(h.crashes.try_recv().is_err());

    h.shutdown().await;
}

#[tokio::test]
async fn test_exit_before_ready_fails_start() {
    let mut h = Harness::new(Renderer::ExitBeforeReady, &["a.milk"]);

    match h.play(0).await {
        Err(SessionError::Startup {
            stage: StartupStage::Handshake,
            exit_code,
            ..
        }) => assert_eq!(exit_code, Some(3)),
        other => panic!("Expected a handshake failure, got {:?}", other),
    }

    assert!(!h.is_ready());
    assert!(h.status.contains(START_FAILED_MESSAGE));
    assert!(h.registry.is_empty());
    assert!(h.playlist.lock().broken_indices().is_empty());

    h.shutdown().await;
}

/// Non-event stderr output reaches the status sink unchanged.
#[tokio::test]
async fn test_stderr_passthrough() {
    let mut h = Harness::new(Renderer::Noisy, &["a.milk"]);
    h.play(0).await.unwrap();

    let status = h.status.clone();
    eventually("renderer noise", || status.output().contains(NOISE)).await;

    h.shutdown().await;
}

/// Shutdown sends `QUIT`, waits for the renderer to exit and lets it
/// clean up its socket.
#[tokio::test]
async fn test_graceful_shutdown() {
    let mut h = Harness::new(Renderer::Plain, &["a.milk"]);
    h.play(0).await.unwrap();
    assert!(h.config.socket_path.exists());

    h.shutdown().await;

    assert!(!h.is_ready());
    assert!(!h.config.socket_path.exists());
    assert!(h.crashes.try_recv().is_err());
    assert!(h.queue.request(Command::get_status()).await.is_err());
}
