//! Session registry and coordinator.
//!
//! The coordinator is the single serialization point for all session state.
//! It runs as one tokio task draining a command channel; viewer commands and
//! PTY process events arrive on the same channel and are handled one at a
//! time, so no two mutations of any session ever race. Nothing outside this
//! task holds a writable reference to a session or its process handle.
//!
//! Shells that exit mid-session are restarted after a short delay. Every
//! spawned handle is tagged with a per-session generation counter; a restart
//! timer only fires if its generation is still current, so a manual reset
//! issued during the restart window can never end up with two live shells.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::broadcast::TopicRegistry;
use super::pty::{PtyEvent, PtyProcess, SessionError, WorkspaceId};
use super::scrollback::ScrollbackBuffer;

/// Delay before respawning an exited shell. Keeps a shell that dies on
/// startup from spinning in a tight restart loop.
pub const RESTART_DELAY: Duration = Duration::from_millis(500);

/// Default terminal geometry for new sessions.
pub const DEFAULT_ROWS: u16 = 24;
/// Default terminal geometry for new sessions.
pub const DEFAULT_COLS: u16 = 80;

/// Snapshot of one session's state, as reported by `list_sessions`.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// The workspace path keying this session.
    pub workspace_id: WorkspaceId,
    /// Whether a live shell handle currently exists.
    pub running: bool,
    /// Process ID of the shell, if one is live.
    pub pid: Option<u32>,
    /// Current terminal rows.
    pub rows: u16,
    /// Current terminal columns.
    pub cols: u16,
    /// Bytes of retained scrollback.
    pub scrollback_len: usize,
}

/// Commands processed by the coordinator, one at a time.
///
/// Process exits arrive here as data (`ProcessEvent`), interleaved with
/// viewer commands, rather than as faults.
enum Command {
    EnsureTerminal {
        workspace_id: WorkspaceId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    SendInput {
        workspace_id: WorkspaceId,
        data: Vec<u8>,
    },
    Resize {
        workspace_id: WorkspaceId,
        rows: u16,
        cols: u16,
    },
    Reset {
        workspace_id: WorkspaceId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    GetScrollback {
        workspace_id: WorkspaceId,
        reply: oneshot::Sender<Bytes>,
    },
    ListSessions {
        reply: oneshot::Sender<Vec<SessionInfo>>,
    },
    /// Output or exit from a spawned PTY, tagged with the generation of the
    /// handle that produced it.
    ProcessEvent {
        workspace_id: WorkspaceId,
        generation: u64,
        event: PtyEvent,
    },
    /// A restart timer fired for the given handle generation.
    Restart {
        workspace_id: WorkspaceId,
        generation: u64,
    },
}

/// Per-workspace session state. Lives for the coordinator's lifetime;
/// sessions are never evicted once created.
struct SessionEntry {
    /// Live process handle, or `None` while a restart is pending.
    process: Option<PtyProcess>,
    /// Retained output tail, preserved across restarts and resets.
    scrollback: ScrollbackBuffer,
    rows: u16,
    cols: u16,
    /// Bumped on every spawn; stale process events and restart timers are
    /// recognized by comparing against this.
    generation: u64,
}

struct Coordinator {
    sessions: HashMap<WorkspaceId, SessionEntry>,
    topics: Arc<TopicRegistry>,
    shell_override: Option<String>,
    /// Geometry given to sessions created without a prior resize.
    default_rows: u16,
    default_cols: u16,
    /// Own command sender, handed to event-forwarding tasks and timers.
    tx: mpsc::UnboundedSender<Command>,
}

impl Coordinator {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd).await;
        }
        tracing::debug!("Coordinator command channel closed, stopping");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::EnsureTerminal {
                workspace_id,
                reply,
            } => {
                let result = self.ensure_terminal(&workspace_id);
                let _ = reply.send(result);
            }
            Command::SendInput { workspace_id, data } => {
                // Unknown workspace or absent handle: drop the input. A
                // slightly stale viewer must not crash anything.
                if let Some(entry) = self.sessions.get(&workspace_id) {
                    if let Some(process) = &entry.process {
                        process.write(data);
                    }
                }
            }
            Command::Resize {
                workspace_id,
                rows,
                cols,
            } => {
                let Some(entry) = self.sessions.get_mut(&workspace_id) else {
                    return;
                };
                entry.rows = rows;
                entry.cols = cols;
                if let Some(process) = &entry.process {
                    if let Err(e) = process.resize(rows, cols) {
                        tracing::warn!(workspace = %workspace_id, error = %e, "PTY resize failed");
                    }
                } else {
                    // No live handle: the stored geometry becomes the
                    // initial size of the next spawn.
                    tracing::debug!(workspace = %workspace_id, rows, cols, "Resize deferred");
                }
            }
            Command::Reset {
                workspace_id,
                reply,
            } => {
                let result = self.reset(&workspace_id).await;
                let _ = reply.send(result);
            }
            Command::GetScrollback {
                workspace_id,
                reply,
            } => {
                let snapshot = self
                    .sessions
                    .get(&workspace_id)
                    .map(|e| e.scrollback.snapshot())
                    .unwrap_or_default();
                let _ = reply.send(snapshot);
            }
            Command::ListSessions { reply } => {
                let infos = self
                    .sessions
                    .iter()
                    .map(|(id, entry)| SessionInfo {
                        workspace_id: id.clone(),
                        running: entry.process.is_some(),
                        pid: entry.process.as_ref().and_then(|p| p.pid()),
                        rows: entry.rows,
                        cols: entry.cols,
                        scrollback_len: entry.scrollback.len(),
                    })
                    .collect();
                let _ = reply.send(infos);
            }
            Command::ProcessEvent {
                workspace_id,
                generation,
                event,
            } => {
                self.process_event(&workspace_id, generation, event).await;
            }
            Command::Restart {
                workspace_id,
                generation,
            } => {
                self.restart(&workspace_id, generation).await;
            }
        }
    }

    /// Creates the session and spawns its shell if absent; idempotent while
    /// a live handle exists. An entry whose handle is absent (restart
    /// pending or previously failed) is respawned immediately, superseding
    /// any pending restart timer via the generation bump.
    fn ensure_terminal(&mut self, workspace_id: &str) -> Result<(), SessionError> {
        if let Some(entry) = self.sessions.get_mut(workspace_id) {
            if entry.process.is_some() {
                return Ok(());
            }
            let generation = entry.generation + 1;
            let process = spawn_tagged(
                workspace_id,
                entry.rows,
                entry.cols,
                self.shell_override.as_deref(),
                generation,
                &self.tx,
            )?;
            entry.generation = generation;
            entry.process = Some(process);
            tracing::info!(workspace = %workspace_id, "Respawned shell for existing session");
            return Ok(());
        }

        let process = spawn_tagged(
            workspace_id,
            self.default_rows,
            self.default_cols,
            self.shell_override.as_deref(),
            1,
            &self.tx,
        )?;
        self.sessions.insert(
            workspace_id.to_string(),
            SessionEntry {
                process: Some(process),
                scrollback: ScrollbackBuffer::new(),
                rows: self.default_rows,
                cols: self.default_cols,
                generation: 1,
            },
        );
        tracing::info!(workspace = %workspace_id, "Created terminal session");
        Ok(())
    }

    /// Unconditionally discards any existing shell and spawns a fresh one.
    /// Scrollback and geometry survive; only the OS process changes.
    async fn reset(&mut self, workspace_id: &str) -> Result<(), SessionError> {
        let Some(entry) = self.sessions.get_mut(workspace_id) else {
            return self.ensure_terminal(workspace_id);
        };

        // Bumping the generation first orphans the old handle: its pending
        // exit event and any in-flight restart timer become stale.
        let generation = entry.generation + 1;
        entry.generation = generation;

        if let Some(old) = entry.process.take() {
            if let Err(e) = old.kill().await {
                tracing::warn!(workspace = %workspace_id, error = %e, "Failed to kill shell during reset");
            }
        }

        let process = spawn_tagged(
            workspace_id,
            entry.rows,
            entry.cols,
            self.shell_override.as_deref(),
            generation,
            &self.tx,
        )?;
        entry.process = Some(process);
        tracing::info!(workspace = %workspace_id, "Session reset with fresh shell");
        Ok(())
    }

    /// Handles output and exit events from a spawned handle, ignoring
    /// anything from a superseded generation.
    async fn process_event(&mut self, workspace_id: &str, generation: u64, event: PtyEvent) {
        let Some(entry) = self.sessions.get_mut(workspace_id) else {
            return;
        };
        if generation != entry.generation {
            tracing::debug!(
                workspace = %workspace_id,
                stale = generation,
                current = entry.generation,
                "Ignoring event from superseded shell"
            );
            return;
        }

        match event {
            PtyEvent::Output(data) => {
                entry.scrollback.append(&data);
                self.topics.publish(workspace_id, &data).await;
            }
            PtyEvent::Exited(code) => {
                tracing::info!(workspace = %workspace_id, code, "Shell exited, scheduling restart");
                entry.process = None;

                let notice =
                    format!("\r\n[shell exited with status {}, restarting...]\r\n", code);
                entry.scrollback.append(notice.as_bytes());
                self.topics.publish(workspace_id, notice.as_bytes()).await;

                let tx = self.tx.clone();
                let workspace_id = workspace_id.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(RESTART_DELAY).await;
                    let _ = tx.send(Command::Restart {
                        workspace_id,
                        generation,
                    });
                });
            }
        }
    }

    /// Respawns the shell for a session whose restart timer fired, unless
    /// the timer's generation has been superseded by a reset or ensure.
    async fn restart(&mut self, workspace_id: &str, generation: u64) {
        let Some(entry) = self.sessions.get_mut(workspace_id) else {
            return;
        };
        if generation != entry.generation || entry.process.is_some() {
            tracing::debug!(workspace = %workspace_id, "Ignoring stale restart timer");
            return;
        }

        let new_generation = entry.generation + 1;
        match spawn_tagged(
            workspace_id,
            entry.rows,
            entry.cols,
            self.shell_override.as_deref(),
            new_generation,
            &self.tx,
        ) {
            Ok(process) => {
                entry.generation = new_generation;
                entry.process = Some(process);
                tracing::info!(workspace = %workspace_id, "Shell restarted");
            }
            Err(e) => {
                // Leave the handle absent; a later ensure or reset recovers.
                tracing::error!(workspace = %workspace_id, error = %e, "Shell restart failed");
                let notice = format!("\r\n[failed to restart shell: {}]\r\n", e);
                entry.scrollback.append(notice.as_bytes());
                self.topics.publish(workspace_id, notice.as_bytes()).await;
            }
        }
    }
}

/// Spawns a shell and forwards its events into the coordinator's command
/// channel, tagged with the workspace and handle generation.
fn spawn_tagged(
    workspace_id: &str,
    rows: u16,
    cols: u16,
    shell_override: Option<&str>,
    generation: u64,
    tx: &mpsc::UnboundedSender<Command>,
) -> Result<PtyProcess, SessionError> {
    let (process, mut events) = PtyProcess::spawn(workspace_id, rows, cols, shell_override)?;

    let tx = tx.clone();
    let workspace_id = workspace_id.to_string();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if tx
                .send(Command::ProcessEvent {
                    workspace_id: workspace_id.clone(),
                    generation,
                    event,
                })
                .is_err()
            {
                break;
            }
        }
    });

    Ok(process)
}

/// Handle to the session coordinator.
///
/// Cheap to clone; all methods communicate with the coordinator task via
/// message passing. Dropping every handle closes the command channel and
/// stops the coordinator.
#[derive(Clone)]
pub struct TerminalHub {
    tx: mpsc::UnboundedSender<Command>,
    topics: Arc<TopicRegistry>,
}

impl TerminalHub {
    /// Starts a coordinator task and returns a handle to it.
    ///
    /// `shell_override` forces a shell binary for every spawn; `None` uses
    /// `$SHELL` with a `/bin/sh` fallback.
    pub fn new(shell_override: Option<String>) -> Self {
        Self::with_geometry(shell_override, DEFAULT_ROWS, DEFAULT_COLS)
    }

    /// Like [`new`](Self::new), with an explicit default geometry for
    /// sessions created before any resize.
    pub fn with_geometry(shell_override: Option<String>, rows: u16, cols: u16) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let topics = Arc::new(TopicRegistry::new());

        let coordinator = Coordinator {
            sessions: HashMap::new(),
            topics: Arc::clone(&topics),
            shell_override,
            default_rows: rows,
            default_cols: cols,
            tx: tx.clone(),
        };
        tokio::spawn(coordinator.run(rx));

        Self { tx, topics }
    }

    /// Generates a fresh viewer id for subscriptions.
    pub fn new_viewer_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Ensures a session exists for the workspace, spawning its shell on
    /// first call. Idempotent while the shell is alive.
    pub async fn ensure_terminal(&self, workspace_id: &str) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::EnsureTerminal {
                workspace_id: workspace_id.to_string(),
                reply,
            })
            .map_err(|_| SessionError::CoordinatorClosed)?;
        rx.await.map_err(|_| SessionError::CoordinatorClosed)?
    }

    /// Sends input bytes to a session's shell. Fire and forget: unknown
    /// workspaces and restart windows silently swallow the input.
    pub fn send_input(&self, workspace_id: &str, data: Vec<u8>) {
        let _ = self.tx.send(Command::SendInput {
            workspace_id: workspace_id.to_string(),
            data,
        });
    }

    /// Updates a session's terminal geometry. Fire and forget; applies to
    /// the live PTY if present, otherwise to the next spawn.
    pub fn resize(&self, workspace_id: &str, rows: u16, cols: u16) {
        let _ = self.tx.send(Command::Resize {
            workspace_id: workspace_id.to_string(),
            rows,
            cols,
        });
    }

    /// Discards any existing shell for the workspace and spawns a fresh
    /// one. Scrollback is preserved; viewers wanting a clean slate must
    /// clear client-side state themselves.
    pub async fn reset(&self, workspace_id: &str) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Reset {
                workspace_id: workspace_id.to_string(),
                reply,
            })
            .map_err(|_| SessionError::CoordinatorClosed)?;
        rx.await.map_err(|_| SessionError::CoordinatorClosed)?
    }

    /// Returns the retained scrollback for a workspace; empty for unknown
    /// workspaces.
    pub async fn get_scrollback(&self, workspace_id: &str) -> Result<Bytes, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::GetScrollback {
                workspace_id: workspace_id.to_string(),
                reply,
            })
            .map_err(|_| SessionError::CoordinatorClosed)?;
        rx.await.map_err(|_| SessionError::CoordinatorClosed)
    }

    /// Lists every session the coordinator has ever created.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::ListSessions { reply })
            .map_err(|_| SessionError::CoordinatorClosed)?;
        rx.await.map_err(|_| SessionError::CoordinatorClosed)
    }

    /// Subscribes a viewer to a workspace's output stream.
    ///
    /// Only events published after this call are delivered; call
    /// [`get_scrollback`](Self::get_scrollback) to catch up on history.
    pub async fn subscribe(&self, workspace_id: &str, viewer_id: &str) -> mpsc::Receiver<Vec<u8>> {
        self.topics.subscribe(workspace_id, viewer_id).await
    }

    /// Unsubscribes a viewer. Idempotent.
    pub async fn unsubscribe(&self, workspace_id: &str, viewer_id: &str) {
        self.topics.unsubscribe(workspace_id, viewer_id).await;
    }
}
