//! # Termplex Daemon Library
//!
//! This crate manages concurrent, long-lived PTY shell sessions, one per
//! filesystem workspace, and streams their output to any number of remote
//! viewers.
//!
//! ## Overview
//!
//! The daemon owns a set of PTY-backed shells and provides:
//!
//! - **Workspace sessions**: one shell per workspace path, created on
//!   demand and restarted automatically when it exits
//! - **Scrollback**: a bounded per-session output tail for late-joining
//!   viewers
//! - **Output fan-out**: per-workspace publish/subscribe delivery to
//!   viewers, in order, without backpressure on the shell
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                   Session Coordinator                      │
//! │   (single task; sole owner of all session state)           │
//! ├────────────────────────────────────────────────────────────┤
//! │                                                            │
//! │  workspace → ┌─────────────┐ ┌────────────┐ ┌──────────┐  │
//! │              │ PtyProcess  │ │ Scrollback │ │ geometry │  │
//! │              └─────────────┘ └────────────┘ └──────────┘  │
//! │                                                            │
//! ├────────────────────────────────────────────────────────────┤
//! │              Topic Registry (output fan-out)               │
//! │        viewer ⇄ subscribe / unsubscribe / receive          │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Viewer commands and PTY process events travel over the same command
//! channel into the coordinator, which handles them one at a time; this
//! serialization is what makes the design race-free without fine-grained
//! locking.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::TerminalHub;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let hub = TerminalHub::new(None);
//!
//!     let viewer = TerminalHub::new_viewer_id();
//!     let mut output = hub.subscribe("/home/me/project", &viewer).await;
//!
//!     hub.ensure_terminal("/home/me/project").await?;
//!     let history = hub.get_scrollback("/home/me/project").await?;
//!
//!     hub.send_input("/home/me/project", b"ls\n".to_vec());
//!     while let Some(chunk) = output.recv().await {
//!         // forward chunk to the viewer
//!         let _ = chunk;
//!     }
//!     let _ = history;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`session`]: PTY wrapper, scrollback, coordinator, and fan-out

pub mod config;
pub mod session;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export session types for convenience
pub use session::{
    PtyEvent, PtyProcess, ScrollbackBuffer, SessionError, SessionInfo, TerminalHub, TopicRegistry,
    ViewerId, ViewerStats, WorkspaceId, DEFAULT_COLS, DEFAULT_ROWS, RESTART_DELAY,
    SCROLLBACK_MAX_BYTES, SCROLLBACK_RETAIN_BYTES,
};
