//! Spawned sidecar process - stdio capture, exit watching and termination.
//!
//! The child handle itself lives in a waiter task; the supervisor only keeps
//! a `SidecarProcess`, which can ask for graceful termination (by pid), ask
//! the waiter for a forced kill, and wait (bounded) for the exit. Output lines
//! and the exit are reported into the supervisor queue tagged with the
//! process generation, so events from an older process are recognisable.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::log_buffer::LogStream;
use super::Message;

/// How long the waiter lets the output readers drain after the exit.
const READER_DRAIN: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub(crate) enum ProcessEvent {
    Output {
        generation: u64,
        stream: LogStream,
        text: String,
    },
    Exited {
        generation: u64,
        detail: String,
    },
}

pub(crate) struct SidecarProcess {
    pub generation: u64,
    pub pid: u32,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<String>>,
}

impl SidecarProcess {
    /// Spawn `program` and attach readers and the exit waiter.
    /// Dropping the returned handle kills the process.
    pub fn spawn(
        program: &Path,
        args: &[String],
        env_vars: Vec<(String, String)>,
        generation: u64,
        events: mpsc::UnboundedSender<Message>,
    ) -> std::io::Result<Self> {
        let mut cmd = TokioCommand::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        if let Some(dir) = program.parent().filter(|d| d.is_dir()) {
            cmd.current_dir(dir);
        }
        for (key, value) in &env_vars {
            cmd.env(key, value);
        }

        // Windows: hide console window
        crate::utils::apply_creation_flags(&mut cmd);

        let mut child = cmd.spawn()?;
        let pid = child.id().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "spawned process has no pid")
        })?;

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, LogStream::Stdout, generation, events.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, LogStream::Stderr, generation, events.clone()));
        }

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = watch::channel(None);

        // ── process waiter ───────────────────────────────────
        tokio::spawn(async move {
            let waited = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    if let Err(e) = child.start_kill() {
                        tracing::warn!("Failed to kill sidecar (pid {}): {}", pid, e);
                    }
                    child.wait().await
                }
            };
            let detail = match waited {
                Ok(status) => format!("Process exited with {}", status),
                Err(e) => format!("Failed to wait for process: {}", e),
            };
            tracing::info!("Sidecar pid {}: {}", pid, detail);
            // reaped: the pid may be reused from here on
            exit_tx.send_replace(Some(detail.clone()));

            // trailing output is queued ahead of the exit event
            for reader in readers {
                let _ = tokio::time::timeout(READER_DRAIN, reader).await;
            }

            let _ = events.send(Message::Process(ProcessEvent::Exited { generation, detail }));
        });

        tracing::info!("Sidecar started with pid {} ({})", pid, program.display());
        Ok(Self {
            generation,
            pid,
            kill_tx: Some(kill_tx),
            exit_rx,
        })
    }

    /// Ask the process to shut down on its own.
    /// Skipped once the child has been reaped, since the pid is then free
    /// for reuse.
    pub async fn terminate(&self) {
        if self.has_exited() {
            tracing::debug!("Sidecar (pid {}) already exited, not signalling", self.pid);
            return;
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            tracing::info!("Sending TERM to sidecar (pid {})", self.pid);
            if let Err(e) = signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
                tracing::warn!("Failed to signal sidecar (pid {}): {}", self.pid, e);
            }
        }

        #[cfg(windows)]
        {
            // no /F: lets the engine handle the close request itself
            let mut cmd = TokioCommand::new("taskkill");
            cmd.args(["/PID", &self.pid.to_string()])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
            crate::utils::apply_creation_flags(&mut cmd);
            if let Err(e) = cmd.status().await {
                tracing::warn!("taskkill failed for sidecar (pid {}): {}", self.pid, e);
            }
        }
    }

    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    /// Forceful termination, performed by the waiter that owns the child.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            tracing::warn!("Killing sidecar (pid {})", self.pid);
            let _ = tx.send(());
        }
    }

    /// Wait at most `timeout` for the exit. Returns whether the process exited.
    pub async fn wait_exit(&mut self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.exit_rx.wait_for(|exit| exit.is_some()))
            .await
            .is_ok()
    }
}

fn spawn_reader<R>(
    reader: R,
    stream: LogStream,
    generation: u64,
    events: mpsc::UnboundedSender<Message>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf)
                        .trim_end_matches(|c| c == '\r' || c == '\n')
                        .to_string();
                    tracing::debug!(target: "sidecar", "[{:?}] {}", stream, text);
                    let event = ProcessEvent::Output {
                        generation,
                        stream,
                        text,
                    };
                    if events.send(Message::Process(event)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Sidecar {:?} read failed: {}", stream, e);
                    break;
                }
            }
        }
    })
}
