//! PTY process wrapper.
//!
//! Spawns a shell under a pseudo-terminal rooted in a workspace directory
//! and exposes fire-and-forget input, resize, and an asynchronous event
//! stream of output chunks followed by exactly one exit event. The OS
//! process handle is owned exclusively by whoever holds the [`PtyProcess`];
//! in practice that is always the session coordinator.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

/// Workspace identifier: an absolute filesystem path used verbatim as the
/// session key. No normalization is performed.
pub type WorkspaceId = String;

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Failed to spawn the shell under a PTY.
    #[error("failed to spawn shell: {0}")]
    SpawnFailed(String),

    /// Failed to resize the PTY.
    #[error("failed to resize PTY: {0}")]
    ResizeFailed(String),

    /// Failed to kill the shell process.
    #[error("failed to kill shell: {0}")]
    KillFailed(String),

    /// The coordinator is no longer running.
    #[error("session coordinator is not running")]
    CoordinatorClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Events emitted by a spawned PTY process.
///
/// A handle's stream is a sequence of `Output` chunks terminated by exactly
/// one `Exited` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyEvent {
    /// A chunk of terminal output.
    Output(Vec<u8>),
    /// The shell process exited with the given status code.
    Exited(i32),
}

/// Buffer size for reading from the PTY.
const READ_BUFFER_SIZE: usize = 4096;

/// A shell process running under a pseudo-terminal.
///
/// Input is delivered through an unbounded channel drained by a dedicated
/// blocking writer task, so callers never block on PTY I/O. Output and the
/// final exit status arrive on the event receiver returned by [`spawn`].
///
/// [`spawn`]: PtyProcess::spawn
pub struct PtyProcess {
    /// The PTY master handle, used for resize.
    master: std::sync::Mutex<Box<dyn MasterPty + Send>>,

    /// The child process, shared with the reader task which reaps it.
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,

    /// Sender feeding the writer task.
    input_tx: mpsc::UnboundedSender<Vec<u8>>,

    /// Process ID of the shell.
    pid: Option<u32>,
}

impl PtyProcess {
    /// Spawns a shell under a PTY in the given workspace directory.
    ///
    /// The shell binary comes from `shell_override` if set, else `$SHELL`,
    /// else `/bin/sh`. If the workspace directory does not exist the child
    /// is rooted in the user's home directory (or `/`) instead of failing,
    /// since workspace directories may be transient.
    ///
    /// Returns the process handle and a receiver yielding [`PtyEvent`]s:
    /// output chunks followed by exactly one exit event.
    pub fn spawn(
        workspace_dir: &str,
        rows: u16,
        cols: u16,
        shell_override: Option<&str>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PtyEvent>), SessionError> {
        let shell = resolve_shell(shell_override);
        let cwd = resolve_workdir(workspace_dir);

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&shell);
        cmd.cwd(&cwd);

        // Controlled environment: carry over only HOME and PATH, pin the
        // terminal type and locale.
        cmd.env_clear();
        if let Ok(home) = std::env::var("HOME") {
            cmd.env("HOME", home);
        }
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }
        cmd.env("TERM", "xterm-256color");
        cmd.env("LANG", "en_US.UTF-8");
        cmd.env("LC_ALL", "en_US.UTF-8");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let pid = child.process_id();

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let child = Arc::new(Mutex::new(child));

        start_read_loop(reader, Arc::clone(&child), event_tx);
        start_write_loop(writer, input_rx);

        tracing::debug!(
            shell = %shell,
            cwd = %cwd.display(),
            pid = ?pid,
            rows = rows,
            cols = cols,
            "Spawned PTY shell"
        );

        let process = PtyProcess {
            master: std::sync::Mutex::new(pair.master),
            child,
            input_tx,
            pid,
        };

        Ok((process, event_rx))
    }

    /// Returns the process ID of the shell, if available.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Queues input bytes for delivery to the shell.
    ///
    /// Fire and forget: if the writer task has stopped because the process
    /// died, the input is silently dropped.
    pub fn write(&self, data: Vec<u8>) {
        let _ = self.input_tx.send(data);
    }

    /// Resizes the PTY to the given dimensions.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), SessionError> {
        let master = self
            .master
            .lock()
            .map_err(|_| SessionError::ResizeFailed("master lock poisoned".to_string()))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::ResizeFailed(e.to_string()))
    }

    /// Kills the shell process.
    ///
    /// The reader task observes the resulting EOF and emits the final
    /// [`PtyEvent::Exited`] on the event stream.
    pub async fn kill(&self) -> Result<(), SessionError> {
        let mut child = self.child.lock().await;
        child
            .kill()
            .map_err(|e| SessionError::KillFailed(e.to_string()))
    }
}

/// Spawns the blocking read loop that pumps PTY output into the event
/// channel and emits the final exit event.
fn start_read_loop(
    reader: Box<dyn Read + Send>,
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,
    event_tx: mpsc::UnboundedSender<PtyEvent>,
) {
    let reader = Arc::new(std::sync::Mutex::new(reader));

    tokio::spawn(async move {
        loop {
            let reader_clone = Arc::clone(&reader);

            let result = tokio::task::spawn_blocking(move || {
                let mut buffer = vec![0u8; READ_BUFFER_SIZE];
                let mut reader = reader_clone.lock().unwrap();
                match reader.read(&mut buffer) {
                    Ok(0) => Ok(None), // EOF
                    Ok(n) => {
                        buffer.truncate(n);
                        Ok(Some(buffer))
                    }
                    Err(e) => Err(e),
                }
            })
            .await;

            match result {
                Ok(Ok(Some(data))) => {
                    if event_tx.send(PtyEvent::Output(data)).is_err() {
                        // Coordinator dropped the receiver; stop pumping.
                        tracing::debug!("PTY event receiver dropped, stopping read loop");
                        return;
                    }
                }
                Ok(Ok(None)) => {
                    tracing::debug!("PTY EOF, shell exited");
                    break;
                }
                Ok(Err(e)) => {
                    // On Linux the master read fails with EIO once the
                    // child side is closed; treat it like EOF.
                    tracing::debug!(error = %e, "PTY read ended");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "PTY read task panicked");
                    break;
                }
            }
        }

        // Reap the child and report its status, exactly once per handle.
        let status = tokio::task::spawn_blocking(move || {
            let mut child = child.blocking_lock();
            child.wait()
        })
        .await;

        let code = match status {
            Ok(Ok(status)) => status.exit_code() as i32,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to reap shell process");
                -1
            }
            Err(e) => {
                tracing::error!(error = %e, "Wait task panicked");
                -1
            }
        };

        let _ = event_tx.send(PtyEvent::Exited(code));
    });
}

/// Spawns the writer task that drains queued input into the PTY.
fn start_write_loop(writer: Box<dyn Write + Send>, mut input_rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    let writer = Arc::new(std::sync::Mutex::new(writer));

    tokio::spawn(async move {
        while let Some(data) = input_rx.recv().await {
            let writer_clone = Arc::clone(&writer);
            let result = tokio::task::spawn_blocking(move || {
                let mut writer = writer_clone.lock().unwrap();
                writer.write_all(&data)?;
                writer.flush()
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "PTY write failed, stopping writer");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "PTY write task panicked");
                    break;
                }
            }
        }
    });
}

/// Resolves the shell binary to spawn.
///
/// Order of preference: explicit override, `$SHELL`, `/bin/sh`.
fn resolve_shell(shell_override: Option<&str>) -> String {
    if let Some(shell) = shell_override {
        return shell.to_string();
    }
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

/// Resolves the working directory for a spawn.
///
/// Missing workspace directories fall back to the user's home directory
/// (or `/`) instead of failing: workspaces may be transient, and a shell in
/// the wrong directory beats no shell at all.
fn resolve_workdir(workspace_dir: &str) -> PathBuf {
    let path = Path::new(workspace_dir);
    if path.is_dir() {
        return path.to_path_buf();
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
}
