//! Crash detection, quarantine and respawn

use crate::helpers::*;
use platyplaty_session::{Preset, SessionError, CRASH_MESSAGE};
use std::time::Duration;

/// A renderer that dies mid-load takes its preset down with it: the preset
/// is quarantined, autoplay stops and the next load starts a new renderer.
#[tokio::test]
async fn test_crash_quarantines_preset_and_respawns() {
    let mut h = Harness::new(Renderer::Plain, &["a.milk", "crash.milk", "c.milk"]);

    assert!(h.autoplay.start().await);
    assert_eq!(h.playlist.lock().playing(), Some(0));
    let first_pid = h.renderer_status().await["pid"].clone();

    let err = h.play(1).await.unwrap_err();
    assert!(err.is_connection_fatal(), "unexpected error {:?}", err);

    let report = h.crashes.recv().await.unwrap();
    assert_eq!(report.preset, Some(Preset::file(h.preset(1))));
    assert_eq!(report.broken, vec![1]);
    assert!(report.autoplay_stopped);

    assert!(!h.is_ready());
    assert!(!h.autoplay.is_enabled());
    assert!(h.registry.is_bad(h.preset(1)));
    assert!(h.playlist.lock().is_broken(1));
    assert!(h.status.contains(CRASH_MESSAGE));

    // The crashed renderer left a stale socket behind; the restart copes.
    h.play(2).await.unwrap();
    assert!(h.is_ready());
    let status = h.renderer_status().await;
    assert_ne!(status["pid"], first_pid);
    assert_eq!(status["loads"], 1);
    assert_eq!(status["initialized"], true);

    h.shutdown().await;
}

/// After a crash autoplay walks past the quarantined preset, restarting
/// the renderer for the next one.
#[tokio::test]
async fn test_autoplay_skips_quarantined_preset() {
    let mut h = Harness::new(Renderer::Plain, &["a.milk", "crash.milk", "c.milk"]);
    h.play(0).await.unwrap();
    assert!(h.play(1).await.is_err());
    h.crashes.recv().await.unwrap();

    h.playlist.lock().set_playing(Some(0));
    assert!(h.autoplay.start().await);
    h.autoplay.advance().await.unwrap();

    assert_eq!(h.playlist.lock().playing(), Some(2));
    let status = h.renderer_status().await;
    assert_eq!(status["preset"], h.preset(2).to_str().unwrap());

    h.shutdown().await;
}

/// A renderer that announces QUIT before exiting asks the application to
/// shut down; its exit is not a crash.
#[tokio::test]
async fn test_renderer_quit_is_not_a_crash() {
    let mut h = Harness::new(Renderer::Plain, &["quit.milk"]);

    h.play(0).await.unwrap();

    tokio::time::timeout(WAIT, h.shutdown.wait())
        .await
        .expect("renderer QUIT did not request shutdown");
    h.join().await;

    assert!(h.crashes.try_recv().is_err());
    assert!(h.registry.is_empty());
    assert!(h.playlist.lock().broken_indices().is_empty());
    assert!(!h.status.contains(CRASH_MESSAGE));
    assert!(!h.is_ready());
}

/// A renderer whose answers no longer line up with the requests is treated
/// like one that died: the preset is quarantined and a fresh renderer is
/// started for the next load.
#[tokio::test]
async fn test_protocol_desync_quarantines_preset() {
    let mut h = Harness::new(
        Renderer::Plain,
        &["a.milk", "wrongid.milk", "garbage.milk", "d.milk"],
    );
    h.play(0).await.unwrap();
    let first_pid = h.renderer_status().await["pid"].clone();

    match h.play(1).await {
        Err(SessionError::ResponseIdMismatch { .. }) => {}
        other => panic!("Expected ResponseIdMismatch, got {:?}", other),
    }
    let report = tokio::time::timeout(WAIT, h.crashes.recv())
        .await
        .expect("no crash report for id mismatch")
        .unwrap();
    assert_eq!(report.preset, Some(Preset::file(h.preset(1))));
    assert_eq!(report.broken, vec![1]);
    assert!(h.registry.is_bad(h.preset(1)));
    assert!(!h.is_ready());
    assert!(h.status.contains(CRASH_MESSAGE));

    match h.play(2).await {
        Err(SessionError::InvalidResponse(_)) => {}
        other => panic!("Expected InvalidResponse, got {:?}", other),
    }
    let report = tokio::time::timeout(WAIT, h.crashes.recv())
        .await
        .expect("no crash report for non-JSON response")
        .unwrap();
    assert_eq!(report.preset, Some(Preset::file(h.preset(2))));
    assert_eq!(report.broken, vec![2]);
    assert!(h.registry.is_bad(h.preset(2)));

    h.play(3).await.unwrap();
    assert!(h.is_ready());
    let status = h.renderer_status().await;
    assert_ne!(status["pid"], first_pid);
    assert_eq!(status["loads"], 1);

    h.shutdown().await;
}

/// A crash caused by an autoplay tick cancels the timer: no further
/// LOAD PRESET goes out, so no new renderer is started behind the user's back.
#[tokio::test]
async fn test_crash_cancels_running_autoplay_timer() {
    let mut h = Harness::with_preset_duration(
        Renderer::Plain,
        &["a.milk", "b.milk", "crash.milk", "d.milk"],
        1,
    );
    assert!(h.autoplay.start().await);
    assert_eq!(h.playlist.lock().playing(), Some(0));

    // Second tick lands on crash.milk
    let report = tokio::time::timeout(Duration::from_secs(10), h.crashes.recv())
        .await
        .expect("autoplay never reached the crashing preset")
        .unwrap();
    assert_eq!(report.preset, Some(Preset::file(h.preset(2))));
    assert!(report.autoplay_stopped);
    assert!(!h.autoplay.is_enabled());

    // A live timer would have loaded d.milk within this window
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(!h.is_ready());
    assert_eq!(h.playlist.lock().playing(), Some(2));
    assert!(!h.registry.is_bad(h.preset(3)));
    assert!(h.crashes.try_recv().is_err());

    h.shutdown().await;
}
