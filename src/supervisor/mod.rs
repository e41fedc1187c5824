//! Sidecar supervisor - owns the lifecycle of the local engine process.
//!
//! All state changes go through a single task: control requests
//! (start/stop/shutdown) and process events (output, exit) are queued on one
//! channel and applied in order. That task is the only writer of the status,
//! the log ring and the process handle, which is what keeps "at most one
//! process" and "one notification per transition" true without further
//! locking. Reads (`status`, `logs`) never go through the queue.

pub mod error;
pub mod launch;
pub mod log_buffer;
mod process;
pub mod state_machine;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::settings::SupervisorSettings;
use crate::mode::AppMode;

pub use error::SidecarError;
pub use log_buffer::{LogBuffer, LogLine, LogStream};
pub use state_machine::{SidecarState, StateMachine};

use process::{ProcessEvent, SidecarProcess};

/// Status as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarStatus {
    pub state: SidecarState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl SidecarStatus {
    pub fn stopped() -> Self {
        Self {
            state: SidecarState::Stopped,
            detail: None,
            pid: None,
        }
    }
}

pub(crate) enum Message {
    Start {
        mode: AppMode,
        executable: Option<PathBuf>,
        reply: oneshot::Sender<Result<SidecarStatus, SidecarError>>,
    },
    Stop {
        reply: oneshot::Sender<SidecarStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<SidecarStatus>,
    },
    Process(ProcessEvent),
}

type StatusCallback = Arc<dyn Fn(&SidecarStatus) + Send + Sync>;

struct CallbackSlot {
    id: u64,
    callback: StatusCallback,
}

type SharedSlot = Arc<Mutex<Option<CallbackSlot>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Returned by `set_status_callback`; cancels that registration only.
pub struct StatusCallbackHandle {
    id: u64,
    slot: Weak<Mutex<Option<CallbackSlot>>>,
}

impl StatusCallbackHandle {
    /// Unregister, unless the callback was already replaced by a newer one.
    pub fn cancel(self) {
        if let Some(slot) = self.slot.upgrade() {
            let mut slot = lock(&slot);
            if slot.as_ref().map(|s| s.id) == Some(self.id) {
                *slot = None;
            }
        }
    }
}

/// Cloneable handle to the supervisor task.
#[derive(Clone)]
pub struct SidecarSupervisor {
    tx: mpsc::UnboundedSender<Message>,
    status_rx: watch::Receiver<SidecarStatus>,
    logs: Arc<Mutex<LogBuffer>>,
    log_tx: broadcast::Sender<LogLine>,
    callback: SharedSlot,
    next_callback_id: Arc<AtomicU64>,
}

impl SidecarSupervisor {
    /// Start the supervisor task. Must be called inside a tokio runtime.
    pub fn spawn(settings: &SupervisorSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SidecarStatus::stopped());
        let (log_tx, _) = broadcast::channel(1024);
        let logs = Arc::new(Mutex::new(LogBuffer::with_capacity(settings.log_buffer_size)));
        let callback: SharedSlot = Arc::new(Mutex::new(None));

        let task = SupervisorTask {
            rx,
            events: tx.downgrade(),
            machine: StateMachine::new(),
            status_tx,
            logs: logs.clone(),
            log_tx: log_tx.clone(),
            callback: callback.clone(),
            settings: settings.clone(),
            current: None,
            generation: 0,
        };
        tokio::spawn(task.run());
        tracing::debug!(
            "Sidecar supervisor ready (log ring of {} lines)",
            lock(&logs).capacity()
        );

        Self {
            tx,
            status_rx,
            logs,
            log_tx,
            callback,
            next_callback_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Launch the engine for `mode`. `executable` overrides the default lookup.
    ///
    /// Queued behind any in-flight request; a `stop` sent while this is
    /// pending runs right after the spawn outcome is settled.
    pub async fn start(
        &self,
        mode: AppMode,
        executable: Option<PathBuf>,
    ) -> Result<SidecarStatus, SidecarError> {
        let (reply, rx) = oneshot::channel();
        let msg = Message::Start {
            mode,
            executable,
            reply,
        };
        if self.tx.send(msg).is_err() {
            return Err(SidecarError::InvalidState("supervisor is shut down".to_string()));
        }
        rx.await
            .unwrap_or_else(|_| Err(SidecarError::InvalidState("supervisor is shut down".to_string())))
    }

    /// Stop the engine. A no-op unless it is running; always bounded by the
    /// grace period plus the kill wait.
    pub async fn stop(&self) -> SidecarStatus {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Message::Stop { reply }).is_err() {
            return self.status();
        }
        rx.await.unwrap_or_else(|_| self.status())
    }

    /// Stop the engine and end the supervisor task. Later `start` calls fail.
    pub async fn shutdown(&self) -> SidecarStatus {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Message::Shutdown { reply }).is_err() {
            return self.status();
        }
        rx.await.unwrap_or_else(|_| self.status())
    }

    pub fn status(&self) -> SidecarStatus {
        self.status_rx.borrow().clone()
    }

    /// Captured output, oldest first.
    pub fn logs(&self) -> Vec<LogLine> {
        lock(&self.logs).snapshot()
    }

    pub fn logs_since(&self, since_id: u64) -> Vec<LogLine> {
        lock(&self.logs).get_since(since_id)
    }

    /// Register the single status observer, replacing any previous one.
    pub fn set_status_callback<F>(&self, callback: F) -> StatusCallbackHandle
    where
        F: Fn(&SidecarStatus) + Send + Sync + 'static,
    {
        let id = self.next_callback_id.fetch_add(1, Ordering::Relaxed);
        *lock(&self.callback) = Some(CallbackSlot {
            id,
            callback: Arc::new(callback),
        });
        StatusCallbackHandle {
            id,
            slot: Arc::downgrade(&self.callback),
        }
    }

    /// Latest status, updated on every transition.
    pub fn subscribe_status(&self) -> watch::Receiver<SidecarStatus> {
        self.status_rx.clone()
    }

    /// Output lines as they are captured.
    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogLine> {
        self.log_tx.subscribe()
    }
}

struct SupervisorTask {
    rx: mpsc::UnboundedReceiver<Message>,
    /// Weak so the queue closes once every handle and process is gone.
    events: mpsc::WeakUnboundedSender<Message>,
    machine: StateMachine,
    status_tx: watch::Sender<SidecarStatus>,
    logs: Arc<Mutex<LogBuffer>>,
    log_tx: broadcast::Sender<LogLine>,
    callback: SharedSlot,
    settings: SupervisorSettings,
    current: Option<SidecarProcess>,
    generation: u64,
}

impl SupervisorTask {
    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                Message::Start {
                    mode,
                    executable,
                    reply,
                } => {
                    let result = self.handle_start(mode, executable);
                    let _ = reply.send(result);
                }
                Message::Stop { reply } => {
                    let status = self.handle_stop().await;
                    let _ = reply.send(status);
                }
                Message::Shutdown { reply } => {
                    let status = self.handle_stop().await;
                    let _ = reply.send(status);
                    break;
                }
                Message::Process(event) => self.handle_process_event(event),
            }
        }
        tracing::info!("Sidecar supervisor stopped");
    }

    fn handle_start(
        &mut self,
        mode: AppMode,
        executable: Option<PathBuf>,
    ) -> Result<SidecarStatus, SidecarError> {
        let state = self.machine.state;
        if !state.can_start() {
            tracing::warn!("Sidecar start rejected: already {:?}", state);
            return Err(SidecarError::AlreadyRunning(state));
        }
        if mode == AppMode::Remote {
            return Err(SidecarError::InvalidState(
                "remote mode uses a remote engine; no local sidecar to start".to_string(),
            ));
        }

        let program = launch::resolve_executable(mode, executable.as_deref())?;
        let events = self.events.upgrade().ok_or_else(|| {
            SidecarError::InvalidState("supervisor is shut down".to_string())
        })?;

        lock(&self.logs).clear();
        self.generation += 1;
        self.transition(SidecarState::Starting, None, None);

        match SidecarProcess::spawn(
            &program,
            &launch::launch_args(mode),
            launch::launch_env(mode),
            self.generation,
            events,
        ) {
            Ok(process) => {
                let pid = process.pid;
                self.current = Some(process);
                self.transition(SidecarState::Running, None, Some(pid));
                Ok(self.current_status())
            }
            Err(e) => {
                tracing::error!("Failed to spawn sidecar {}: {}", program.display(), e);
                self.transition(
                    SidecarState::Crashed,
                    Some(format!("Spawn failed: {}", e)),
                    None,
                );
                Err(SidecarError::SpawnFailed {
                    path: program,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn handle_stop(&mut self) -> SidecarStatus {
        // `starting` never outlives a single start request, so a queued
        // stop only ever sees the settled outcome
        if self.machine.state != SidecarState::Running {
            return self.current_status();
        }

        let pid = self.current.as_ref().map(|p| p.pid);
        self.transition(SidecarState::Stopping, None, pid);

        if let Some(mut process) = self.current.take() {
            process.terminate().await;
            if !process.wait_exit(self.settings.stop_grace()).await {
                tracing::warn!(
                    "Sidecar (pid {}) ignored termination for {} ms",
                    process.pid,
                    self.settings.stop_grace_ms
                );
                process.kill();
                if !process.wait_exit(self.settings.kill_wait()).await {
                    tracing::error!(
                        "Sidecar (pid {}) still not reaped after kill; giving up on it",
                        process.pid
                    );
                }
            }
        }

        lock(&self.logs).clear();
        self.transition(SidecarState::Stopped, None, None);
        self.current_status()
    }

    fn handle_process_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Output {
                generation,
                stream,
                text,
            } => {
                if !self.is_current(generation) {
                    return;
                }
                let line = lock(&self.logs).push(stream, text);
                let _ = self.log_tx.send(line);
            }
            ProcessEvent::Exited { generation, detail } => {
                if !self.is_current(generation) {
                    // already accounted for by an explicit stop
                    tracing::debug!("Ignoring exit of retired sidecar generation {}", generation);
                    return;
                }
                self.current = None;
                tracing::warn!("Sidecar exited unexpectedly: {}", detail);
                self.transition(SidecarState::Crashed, Some(detail), None);
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.current.as_ref().map(|p| p.generation) == Some(generation)
    }

    fn current_status(&self) -> SidecarStatus {
        self.status_tx.borrow().clone()
    }

    /// Apply one edge and notify exactly once.
    fn transition(&mut self, to: SidecarState, detail: Option<String>, pid: Option<u32>) {
        if let Err(e) = self.machine.transition(to) {
            tracing::error!("Sidecar supervisor bug: {}", e);
            return;
        }

        let status = SidecarStatus {
            state: to,
            detail,
            pid,
        };
        self.status_tx.send_replace(status.clone());

        let callback = lock(&self.callback).as_ref().map(|slot| slot.callback.clone());
        if let Some(callback) = callback {
            callback(&status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SupervisorSettings {
        SupervisorSettings {
            log_buffer_size: 16,
            stop_grace_ms: 200,
            kill_wait_ms: 500,
        }
    }

    #[tokio::test]
    async fn starts_stopped() {
        let sup = SidecarSupervisor::spawn(&settings());
        assert_eq!(sup.status(), SidecarStatus::stopped());
        assert!(sup.logs().is_empty());
    }

    #[tokio::test]
    async fn stop_when_stopped_is_noop() {
        let sup = SidecarSupervisor::spawn(&settings());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _handle = sup.set_status_callback(move |s| lock(&sink).push(s.state));

        let status = sup.stop().await;
        assert_eq!(status.state, SidecarState::Stopped);
        assert!(lock(&seen).is_empty());
    }

    #[tokio::test]
    async fn missing_executable_leaves_status_unchanged() {
        let sup = SidecarSupervisor::spawn(&settings());
        let err = sup
            .start(AppMode::Full, Some(PathBuf::from("/definitely/not/here/gomikrobot")))
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::NotFound(_)));
        assert_eq!(sup.status().state, SidecarState::Stopped);
    }

    #[tokio::test]
    async fn remote_mode_has_no_sidecar() {
        let sup = SidecarSupervisor::spawn(&settings());
        let err = sup.start(AppMode::Remote, None).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
        assert_eq!(sup.status().state, SidecarState::Stopped);
    }

    #[tokio::test]
    async fn shutdown_rejects_later_starts() {
        let sup = SidecarSupervisor::spawn(&settings());
        assert_eq!(sup.shutdown().await.state, SidecarState::Stopped);
        let err = sup.start(AppMode::Full, None).await.unwrap_err();
        assert!(matches!(err, SidecarError::InvalidState(_)));
        // stop after shutdown still answers
        assert_eq!(sup.stop().await.state, SidecarState::Stopped);
    }

    #[tokio::test]
    async fn callback_replacement_and_cancel() {
        let sup = SidecarSupervisor::spawn(&settings());
        let first = sup.set_status_callback(|_| {});
        let second = sup.set_status_callback(|_| {});

        // cancelling the replaced registration must not remove the newer one
        first.cancel();
        assert!(lock(&sup.callback).is_some());

        second.cancel();
        assert!(lock(&sup.callback).is_none());
    }

    #[test]
    fn status_serializes_compactly() {
        let json = serde_json::to_value(SidecarStatus::stopped()).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "stopped" }));
    }
}
