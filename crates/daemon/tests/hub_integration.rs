//! End-to-end integration tests for the terminal hub.
//!
//! These tests exercise the full path with real shells: spawn through the
//! coordinator, output fan-out to subscribed viewers, scrollback replay,
//! automatic restart after exit, and the viewer protocol boundary.

use std::time::Duration;

use daemon::session::{TerminalHub, RESTART_DELAY};
use protocol::{ClientEvent, ServerEvent};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn test_hub() -> TerminalHub {
    TerminalHub::new(Some("/bin/sh".to_string()))
}

/// Drains output chunks until the needle appears, collecting everything
/// seen along the way.
async fn wait_for(rx: &mut mpsc::Receiver<Vec<u8>>, needle: &str) -> Option<String> {
    let mut seen = String::new();
    for _ in 0..100 {
        match timeout(Duration::from_millis(100), rx.recv()).await {
            Ok(Some(chunk)) => {
                seen.push_str(&String::from_utf8_lossy(&chunk));
                if seen.contains(needle) {
                    return Some(seen);
                }
            }
            Ok(None) => return None,
            Err(_) => {}
        }
    }
    None
}

// =============================================================================
// Session Lifecycle
// =============================================================================

#[tokio::test]
async fn test_ensure_and_echo_roundtrip() {
    let hub = test_hub();
    let workspace = TempDir::new().unwrap();
    let workspace_id = workspace.path().to_string_lossy().to_string();

    let mut rx = hub.subscribe(&workspace_id, "viewer-1").await;
    hub.ensure_terminal(&workspace_id).await.unwrap();

    hub.send_input(&workspace_id, b"echo integration_marker\n".to_vec());

    assert!(wait_for(&mut rx, "integration_marker").await.is_some());
}

#[tokio::test]
async fn test_shell_runs_in_workspace_directory() {
    let hub = test_hub();
    let workspace = TempDir::new().unwrap();
    // Canonicalize so the shell's pwd output matches the key byte for byte.
    let workspace_id = workspace
        .path()
        .canonicalize()
        .unwrap()
        .to_string_lossy()
        .to_string();

    let mut rx = hub.subscribe(&workspace_id, "viewer-1").await;
    hub.ensure_terminal(&workspace_id).await.unwrap();

    hub.send_input(&workspace_id, b"pwd\n".to_vec());

    let seen = wait_for(&mut rx, &workspace_id).await;
    assert!(seen.is_some(), "shell should report the workspace as cwd");
}

#[tokio::test]
async fn test_ensure_missing_directory_still_succeeds() {
    let hub = test_hub();
    // Nonexistent workspace dir falls back to home rather than failing.
    hub.ensure_terminal("/no/such/workspace/dir").await.unwrap();
}

#[tokio::test]
async fn test_list_sessions_reports_created_workspaces() {
    let hub = test_hub();
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    let id_a = a.path().to_string_lossy().to_string();
    let id_b = b.path().to_string_lossy().to_string();

    hub.ensure_terminal(&id_a).await.unwrap();
    hub.ensure_terminal(&id_b).await.unwrap();

    let sessions = hub.list_sessions().await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s.running));
    assert!(sessions.iter().any(|s| s.workspace_id == id_a));
    assert!(sessions.iter().any(|s| s.workspace_id == id_b));
}

// =============================================================================
// Scrollback
// =============================================================================

#[tokio::test]
async fn test_scrollback_replay_for_late_joiner() {
    let hub = test_hub();
    let workspace = TempDir::new().unwrap();
    let workspace_id = workspace.path().to_string_lossy().to_string();

    let mut rx = hub.subscribe(&workspace_id, "early").await;
    hub.ensure_terminal(&workspace_id).await.unwrap();

    hub.send_input(&workspace_id, b"echo history_line\n".to_vec());
    assert!(wait_for(&mut rx, "history_line").await.is_some());

    // A late joiner sees nothing on its live stream until new output, but
    // can pull the history.
    let scrollback = hub.get_scrollback(&workspace_id).await.unwrap();
    let text = String::from_utf8_lossy(&scrollback);
    assert!(text.contains("history_line"));
}

#[tokio::test]
async fn test_scrollback_unknown_workspace_is_empty() {
    let hub = test_hub();
    let scrollback = hub.get_scrollback("/never/created").await.unwrap();
    assert!(scrollback.is_empty());
}

// =============================================================================
// Restart and Reset
// =============================================================================

#[tokio::test]
async fn test_exit_notice_and_automatic_restart() {
    let hub = test_hub();
    let workspace = TempDir::new().unwrap();
    let workspace_id = workspace.path().to_string_lossy().to_string();

    let mut rx = hub.subscribe(&workspace_id, "viewer-1").await;
    hub.ensure_terminal(&workspace_id).await.unwrap();

    hub.send_input(&workspace_id, b"exit 7\n".to_vec());

    // The synthetic notice lands in the stream with the exit status.
    assert!(wait_for(&mut rx, "exited with status 7").await.is_some());

    // After the restart delay a fresh shell answers. Input sent before the
    // respawn lands is dropped, so keep prodding until the shell replies.
    tokio::time::sleep(RESTART_DELAY).await;
    let mut revived = false;
    for _ in 0..20 {
        hub.send_input(&workspace_id, b"echo back_alive\n".to_vec());
        if wait_for(&mut rx, "back_alive").await.is_some() {
            revived = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(revived, "shell did not come back after restart");

    // Scrollback kept the pre-exit notice.
    let scrollback = hub.get_scrollback(&workspace_id).await.unwrap();
    assert!(String::from_utf8_lossy(&scrollback).contains("exited with status 7"));
}

#[tokio::test]
async fn test_reset_replaces_shell_and_keeps_scrollback() {
    let hub = test_hub();
    let workspace = TempDir::new().unwrap();
    let workspace_id = workspace.path().to_string_lossy().to_string();

    let mut rx = hub.subscribe(&workspace_id, "viewer-1").await;
    hub.ensure_terminal(&workspace_id).await.unwrap();

    hub.send_input(&workspace_id, b"echo before_reset\n".to_vec());
    assert!(wait_for(&mut rx, "before_reset").await.is_some());

    hub.reset(&workspace_id).await.unwrap();

    hub.send_input(&workspace_id, b"echo after_reset\n".to_vec());
    assert!(wait_for(&mut rx, "after_reset").await.is_some());

    let scrollback = hub.get_scrollback(&workspace_id).await.unwrap();
    let text = String::from_utf8_lossy(&scrollback);
    assert!(text.contains("before_reset"));
    assert!(text.contains("after_reset"));
}

#[tokio::test]
async fn test_reset_creates_session_when_absent() {
    let hub = test_hub();
    let workspace = TempDir::new().unwrap();
    let workspace_id = workspace.path().to_string_lossy().to_string();

    hub.reset(&workspace_id).await.unwrap();

    let sessions = hub.list_sessions().await.unwrap();
    assert!(sessions.iter().any(|s| s.workspace_id == workspace_id && s.running));
}

// =============================================================================
// Fire-and-forget Semantics
// =============================================================================

#[tokio::test]
async fn test_input_and_resize_on_unknown_workspace() {
    let hub = test_hub();

    // Neither call errors nor spawns anything.
    hub.send_input("/never/created", b"ls\n".to_vec());
    hub.resize("/never/created", 50, 200);

    let sessions = hub.list_sessions().await.unwrap();
    assert!(sessions.is_empty());
}

// =============================================================================
// Viewer Switching (protocol boundary)
// =============================================================================

#[tokio::test]
async fn test_viewer_switches_workspace() {
    let hub = test_hub();
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    let id_a = a.path().to_string_lossy().to_string();
    let id_b = b.path().to_string_lossy().to_string();
    let viewer = TerminalHub::new_viewer_id();

    let mut rx_a = hub.subscribe(&id_a, &viewer).await;
    hub.ensure_terminal(&id_a).await.unwrap();
    hub.send_input(&id_a, b"echo in_workspace_a\n".to_vec());
    assert!(wait_for(&mut rx_a, "in_workspace_a").await.is_some());

    // Switch: unsubscribe, tell the viewer to clear, subscribe and replay.
    hub.unsubscribe(&id_a, &viewer).await;
    let clear = ServerEvent::Clear.to_json().unwrap();
    assert_eq!(clear, r#"{"type":"clear"}"#);

    let mut rx_b = hub.subscribe(&id_b, &viewer).await;
    hub.ensure_terminal(&id_b).await.unwrap();
    let replay = hub.get_scrollback(&id_b).await.unwrap();
    let replay_event = ServerEvent::output(&replay);
    assert!(replay_event.to_json().is_ok());

    // Input arrives via the wire format and is routed after decoding.
    let event = ClientEvent::input(b"echo in_workspace_b\n");
    let decoded = event.decode_data().unwrap().unwrap();
    hub.send_input(&id_b, decoded);
    assert!(wait_for(&mut rx_b, "in_workspace_b").await.is_some());

    // The old topic no longer reaches this viewer. Anything still buffered
    // predates the unsubscribe; nothing published afterwards shows up.
    hub.send_input(&id_a, b"echo still_in_a\n".to_vec());
    let mut leftover = String::new();
    loop {
        match timeout(Duration::from_millis(200), rx_a.recv()).await {
            Ok(Some(chunk)) => leftover.push_str(&String::from_utf8_lossy(&chunk)),
            Ok(None) | Err(_) => break,
        }
    }
    assert!(!leftover.contains("still_in_a"));
}
