//! Renderer-window key presses

use crate::helpers::*;
use std::time::Duration;

/// A key reported while `LOAD PRESET` is in flight runs once, after the load.
#[tokio::test]
async fn test_key_during_pending_command_is_replayed() {
    let mut h = Harness::new(Renderer::SlowKey, &["slow.milk", "b.milk"]);

    // The renderer reports SLOW_KEY ("n") while loading slow.milk.
    h.play(0).await.unwrap();

    let b = h.preset(1).to_str().unwrap().to_string();
    let status = h.wait_for_status(|s| s["preset"] == b.as_str()).await;
    assert_eq!(status["loads"], 2);
    assert_eq!(h.playlist.lock().playing(), Some(1));

    // Nothing else was queued behind it.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.renderer_status().await["loads"], 2);

    h.shutdown().await;
}

#[tokio::test]
async fn test_navigation_keys() {
    let mut h = Harness::new(Renderer::Plain, &["a.milk", "b.milk"]);
    h.play(0).await.unwrap();

    h.router.handle_key("x");
    h.router.handle_key("n");
    let b = h.preset(1).to_str().unwrap().to_string();
    h.wait_for_status(|s| s["preset"] == b.as_str()).await;

    // No loop: next at the end stays put.
    h.router.handle_key("n");
    h.router.handle_key("p");
    let a = h.preset(0).to_str().unwrap().to_string();
    let status = h.wait_for_status(|s| s["preset"] == a.as_str()).await;
    assert_eq!(status["loads"], 3);
    assert_eq!(h.playlist.lock().playing(), Some(0));

    h.shutdown().await;
}

/// Navigation does nothing until a renderer is up.
#[tokio::test]
async fn test_keys_ignored_before_ready() {
    let mut h = Harness::new(Renderer::Plain, &["a.milk", "b.milk"]);
    h.playlist.lock().set_playing(Some(0));

    h.router.handle_key("n");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!h.is_ready());
    assert_eq!(h.playlist.lock().playing(), Some(0));
    assert!(!h.config.socket_path.exists());

    h.shutdown().await;
}

#[tokio::test]
async fn test_quit_key_requests_shutdown() {
    let mut h = Harness::new(Renderer::Plain, &["a.milk"]);
    h.play(0).await.unwrap();

    h.router.handle_key("q");
    tokio::time::timeout(WAIT, h.shutdown.wait())
        .await
        .expect("quit key did not request shutdown");
    h.join().await;

    assert!(!h.is_ready());
    assert!(!h.config.socket_path.exists());
}
