//! Terminal session management.
//!
//! One PTY-backed shell per workspace path, coordinated by a single actor
//! task, with bounded scrollback and per-workspace output fan-out to any
//! number of viewers.

pub mod broadcast;
pub mod coordinator;
pub mod pty;
pub mod scrollback;

pub use broadcast::{TopicRegistry, ViewerId, ViewerStats};
pub use coordinator::{SessionInfo, TerminalHub, DEFAULT_COLS, DEFAULT_ROWS, RESTART_DELAY};
pub use pty::{PtyEvent, PtyProcess, SessionError, WorkspaceId};
pub use scrollback::{ScrollbackBuffer, SCROLLBACK_MAX_BYTES, SCROLLBACK_RETAIN_BYTES};
