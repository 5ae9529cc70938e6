//! Driver supervisor: session state machine over one spawned driver
//! process.
//!
//! One supervisor instance drives exactly one session. `start()` spawns
//! the executable through the process channel and hands its output to a
//! single reader task: pull a line, decode it, stamp the step counter,
//! apply the transition table, notify listeners. For `confirm` and
//! `ask_question` events every registered responder is awaited before the
//! next line is pulled — a deliberate ordering guarantee, so a handler
//! inspecting the current pending prompt never sees a newer one clobber
//! it. Interactive callbacks therefore serialize against event
//! throughput; keep handlers fast.
//!
//! Terminal events (`finished`, fatal `error`), unexpected process exit,
//! and caller `stop()` all converge on the same settle-then-cleanup path:
//! the pending `start()` future is settled exactly once, cleanup runs
//! exactly once, and the process handle is released only after the future
//! is settled.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::process::Child;
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use rudder_protocol::{decode_event, encode_command, Command, Event, EventKind};
use rudder_types::{DriverConfig, DriverState, SessionId, StartOptions, StartOutcome};

use crate::channel::{ChannelWriter, DiagnosticStream, ExitReason, LineStream, ProcessChannel};
use crate::error::DriverError;
use crate::listeners::{ConfirmRequest, ListenerSet, QuestionRequest};

type StartReply = Result<StartOutcome, DriverError>;

/// Marker for an unanswered `confirm` event.
struct PendingConfirm {
    step: u64,
}

/// Marker for an unanswered `ask_question` event.
struct PendingAnswer {
    step: u64,
    question_id: Option<String>,
}

struct Inner {
    config: DriverConfig,
    session_id: SessionId,
    listeners: ListenerSet,
    state: Mutex<DriverState>,
    step: AtomicU64,
    /// A session has been launched on this instance at some point.
    ever_started: AtomicBool,
    /// A session is in flight (set on `start()`, never cleared except on
    /// spawn failure).
    active: AtomicBool,
    cleaned_up: AtomicBool,
    writer: Mutex<Option<ChannelWriter>>,
    child: AsyncMutex<Option<Child>>,
    pending_start: Mutex<Option<oneshot::Sender<StartReply>>>,
    pending_confirm: Mutex<Option<PendingConfirm>>,
    pending_answer: Mutex<Option<PendingAnswer>>,
    exit_tx: watch::Sender<bool>,
    exit_rx: watch::Receiver<bool>,
}

/// Supervisor for one driver session.
///
/// Clones share the same session; the type is cheap to clone and all
/// methods take `&self`, so it can be handed to UI code, background
/// tasks, and signal handlers alike.
#[derive(Clone)]
pub struct DriverSupervisor {
    inner: Arc<Inner>,
}

impl DriverSupervisor {
    /// Create a supervisor for the configured executable. No process is
    /// spawned until [`start`](Self::start).
    pub fn new(config: DriverConfig) -> Self {
        let session_id = SessionId::generate();
        let (exit_tx, exit_rx) = watch::channel(false);
        info!(session_id = %session_id, executable = %config.executable.display(), "driver supervisor created");
        Self {
            inner: Arc::new(Inner {
                config,
                session_id,
                listeners: ListenerSet::default(),
                state: Mutex::new(DriverState::Idle),
                step: AtomicU64::new(0),
                ever_started: AtomicBool::new(false),
                active: AtomicBool::new(false),
                cleaned_up: AtomicBool::new(false),
                writer: Mutex::new(None),
                child: AsyncMutex::new(None),
                pending_start: Mutex::new(None),
                pending_confirm: Mutex::new(None),
                pending_answer: Mutex::new(None),
                exit_tx,
                exit_rx,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    /// The generated identifier for this session.
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Current state of the session state machine.
    pub fn current_state(&self) -> DriverState {
        self.inner.current_state()
    }

    /// Step counter of the most recently observed event.
    pub fn current_step(&self) -> u64 {
        self.inner.step.load(Ordering::SeqCst)
    }

    /// Whether a session is in flight (running, paused, or waiting).
    pub fn is_running(&self) -> bool {
        self.current_state().is_active()
    }

    /// Whether the driver is blocked on a confirmation or an answer.
    pub fn is_waiting(&self) -> bool {
        self.current_state().is_waiting()
    }

    // -----------------------------------------------------------------------
    // Listener registration
    // -----------------------------------------------------------------------

    /// Register an observer for one event kind. Observers run in
    /// registration order.
    pub fn on<F>(&self, kind: EventKind, f: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner.listeners.on(kind, f);
    }

    /// Register an observer for raw stderr diagnostics.
    pub fn on_diagnostic<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.listeners.on_diagnostic(f);
    }

    /// Register an async confirm responder. The first responder to settle
    /// with `Some(approved)` answers the prompt; later values are
    /// silently ignored.
    pub fn on_confirm<F, Fut>(&self, f: F)
    where
        F: Fn(ConfirmRequest) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Option<bool>> + Send + 'static,
    {
        self.inner.listeners.on_confirm(f);
    }

    /// Register an async ask-question responder, symmetric to
    /// [`on_confirm`](Self::on_confirm).
    pub fn on_ask_question<F, Fut>(&self, f: F)
    where
        F: Fn(QuestionRequest) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Option<String>> + Send + 'static,
    {
        self.inner.listeners.on_ask_question(f);
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Spawn the driver process and work on `goal` until a terminal event
    /// arrives.
    ///
    /// Resolves with the `finished` outcome, or fails with the session's
    /// fatal error. There is no built-in timeout; callers needing one
    /// must race this future externally, and the only way to cancel it is
    /// [`stop`](Self::stop). Calling `start` while a session is in flight
    /// (or after it has terminated) fails fast with
    /// [`DriverError::InvalidState`] and does not spawn a second process.
    pub async fn start(
        &self,
        goal: &str,
        opts: StartOptions,
    ) -> Result<StartOutcome, DriverError> {
        let inner = &self.inner;
        if inner
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DriverError::InvalidState {
                operation: "start",
                state: inner.current_state(),
            });
        }

        let channel = match ProcessChannel::open(&inner.config.executable, &inner.config.env) {
            Ok(channel) => channel,
            Err(e) => {
                // Nothing was spawned; leave the instance idle so the
                // caller can retry with a different binary.
                inner.active.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let (child, writer, lines, diagnostics) = channel.split();

        inner.ever_started.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = inner.writer.lock() {
            *guard = Some(writer);
        }
        *inner.child.lock().await = Some(child);

        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = inner.pending_start.lock() {
            *pending = Some(tx);
        }

        info!(session_id = %inner.session_id, goal, "driver session starting");

        let diag_inner = Arc::clone(&self.inner);
        tokio::spawn(diagnostics_loop(diag_inner, diagnostics));

        let read_inner = Arc::clone(&self.inner);
        let goal = goal.to_string();
        tokio::spawn(read_loop(read_inner, lines, goal, opts));

        rx.await.unwrap_or(Err(DriverError::UnexpectedExit {
            status: ExitReason::Unknown,
        }))
    }

    /// Wind the session down: send `stop`, give the process the
    /// configured grace period to exit voluntarily, then force-kill it.
    /// Always followed by cleanup. No-op on a driver that never started
    /// or has already terminated.
    pub async fn stop(&self, reason: Option<&str>) -> Result<(), DriverError> {
        let inner = &self.inner;
        if !inner.ever_started.load(Ordering::SeqCst) || inner.current_state().is_terminal() {
            return Ok(());
        }

        let reason = reason.unwrap_or("stopped by caller").to_string();
        info!(session_id = %inner.session_id, reason, "stopping driver session");

        // Claim the pending start future and the terminal state up front:
        // once a stop is underway, a racing exit or late terminal event
        // must not settle the session as anything other than stopped.
        let pending = inner.pending_start.lock().ok().and_then(|mut p| p.take());
        inner.transition_if_live(DriverState::Stopped);

        inner
            .write(Command::Stop {
                reason: Some(reason.clone()),
            })
            .await;

        let mut exit_rx = inner.exit_rx.clone();
        if !*exit_rx.borrow_and_update() {
            let grace = inner.config.stop_grace();
            if tokio::time::timeout(grace, exit_rx.changed()).await.is_err() {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "grace period expired, force-killing driver process"
                );
                let mut guard = inner.child.lock().await;
                if let Some(child) = guard.as_mut() {
                    let _ = child.start_kill();
                }
            }
        }

        if let Some(tx) = pending {
            let _ = tx.send(Err(DriverError::Stopped { reason }));
        }
        inner.cleanup().await;
        Ok(())
    }

    /// Ask the driver to pause after its current step. Fire-and-forget;
    /// the state only changes once the process confirms with a
    /// `state_change` event. No-op if no process is alive.
    pub async fn pause(&self) {
        self.inner.write(Command::Pause).await;
    }

    /// Ask a paused driver to continue. Fire-and-forget, like
    /// [`pause`](Self::pause).
    pub async fn resume(&self) {
        self.inner.write(Command::Resume).await;
    }

    /// Push a fresh screenshot to the driver. Fire-and-forget; dropped if
    /// the process has already exited. Fails only on a driver that was
    /// never started.
    pub async fn send_screenshot(
        &self,
        data: &str,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<(), DriverError> {
        if !self.inner.ever_started.load(Ordering::SeqCst) {
            return Err(DriverError::InvalidState {
                operation: "send a screenshot",
                state: self.inner.current_state(),
            });
        }
        self.inner
            .write(Command::Screenshot {
                data: data.to_string(),
                width,
                height,
            })
            .await;
        Ok(())
    }

    /// Pull-style request for a `screenshot_captured` telemetry event.
    pub async fn request_screenshot(&self) {
        self.inner.write(Command::RequestScreenshot).await;
    }

    /// Pull-style request for a `video_frame` telemetry event.
    pub async fn request_video_frame(&self) {
        self.inner.write(Command::RequestVideoFrame).await;
    }

    /// Answer a pending confirmation manually. Valid only while the
    /// session is in `waiting_confirmation`.
    pub async fn respond_confirm(
        &self,
        approved: bool,
        message: Option<&str>,
    ) -> Result<(), DriverError> {
        let state = self.inner.current_state();
        if state != DriverState::WaitingConfirmation {
            return Err(DriverError::InvalidState {
                operation: "respond to a confirmation",
                state,
            });
        }
        // Taking the pending marker is what makes this response the
        // winner; a concurrent auto-response finds it empty and abstains.
        if let Some(pending) = self.inner.take_pending_confirm() {
            debug!(step = pending.step, approved, "manual confirmation response");
        }
        self.inner
            .write(Command::Confirm {
                approved,
                message: message.map(str::to_string),
            })
            .await;
        Ok(())
    }

    /// Answer a pending question manually. Valid only while the session
    /// is in `waiting_answer`. When `question_id` is `None`, the id from
    /// the pending `ask_question` event is echoed back.
    pub async fn respond_answer(
        &self,
        text: &str,
        question_id: Option<&str>,
    ) -> Result<(), DriverError> {
        let state = self.inner.current_state();
        if state != DriverState::WaitingAnswer {
            return Err(DriverError::InvalidState {
                operation: "respond to a question",
                state,
            });
        }
        let pending_id = self.inner.take_pending_answer().and_then(|p| p.question_id);
        self.inner
            .write(Command::Answer {
                text: text.to_string(),
                question_id: question_id.map(str::to_string).or(pending_id),
            })
            .await;
        Ok(())
    }
}

impl Inner {
    fn current_state(&self) -> DriverState {
        self.state.lock().map(|s| *s).unwrap_or(DriverState::Error)
    }

    /// Move to `next` unless the session has already terminated. Returns
    /// whether the transition happened.
    fn transition_if_live(&self, next: DriverState) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.is_terminal() {
            return false;
        }
        if *state != next {
            debug!(from = %*state, to = %next, "driver state transition");
            *state = next;
        }
        true
    }

    /// Settle the pending `start()` future. The first settle wins; any
    /// later attempt finds the slot empty.
    fn settle_start(&self, reply: StartReply) {
        let sender = self.pending_start.lock().ok().and_then(|mut p| p.take());
        if let Some(tx) = sender {
            let _ = tx.send(reply);
        }
    }

    fn take_pending_confirm(&self) -> Option<PendingConfirm> {
        self.pending_confirm.lock().ok().and_then(|mut p| p.take())
    }

    fn take_pending_answer(&self) -> Option<PendingAnswer> {
        self.pending_answer.lock().ok().and_then(|mut p| p.take())
    }

    /// Encode and write a command. Dropped with a debug log when no
    /// channel is open (process never spawned or already torn down).
    async fn write(&self, command: Command) {
        let writer = self.writer.lock().ok().and_then(|w| w.clone());
        let Some(writer) = writer else {
            debug!(kind = command.kind(), "command dropped, no active channel");
            return;
        };
        debug!(kind = command.kind(), "sending command");
        writer.write_line(&encode_command(&command)).await;
    }

    /// Release session resources. Runs exactly once regardless of exit
    /// path: closes the write side, drops pending interactive markers
    /// without invoking anything, and leaves the already-settled start
    /// future alone.
    async fn cleanup(&self) {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }
        let writer = self.writer.lock().ok().and_then(|mut w| w.take());
        if let Some(writer) = writer {
            writer.close().await;
        }
        self.take_pending_confirm();
        self.take_pending_answer();
        debug!(session_id = %self.session_id, "driver session cleanup complete");
    }
}

/// Forward stderr chunks verbatim to diagnostic listeners and the log.
async fn diagnostics_loop(inner: Arc<Inner>, mut diagnostics: DiagnosticStream) {
    while let Some(chunk) = diagnostics.next_chunk().await {
        debug!(stderr = chunk.trim_end(), "driver diagnostic output");
        inner.listeners.notify_diagnostic(&chunk);
    }
}

/// The single reader: one line in flight at a time, interactive listener
/// handling awaited before the next pull.
async fn read_loop(inner: Arc<Inner>, mut lines: LineStream, goal: String, opts: StartOptions) {
    while let Some(line) = lines.next_line().await {
        if handle_line(&inner, &line, &goal, &opts).await {
            break;
        }
    }

    // The output stream is done: either a terminal event was handled or
    // the process died on its own. Reap the child to learn why.
    let child = inner.child.lock().await.take();
    let status = match child {
        Some(child) => reap(child, &inner).await,
        None => ExitReason::Unknown,
    };

    // A session that reached this point without a terminal event died
    // unexpectedly. Settle-once semantics suppress this path when a
    // terminal event (or a caller stop) got there first.
    inner.transition_if_live(DriverState::Error);
    inner.settle_start(Err(DriverError::UnexpectedExit { status }));
    inner.cleanup().await;

    let _ = inner.exit_tx.send(true);
    info!(session_id = %inner.session_id, status = %status, "driver process exited");
}

/// Wait for the child to exit, escalating to a kill if it outlives the
/// configured grace period after its output closed.
async fn reap(mut child: Child, inner: &Arc<Inner>) -> ExitReason {
    let grace = inner.config.stop_grace();
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => ExitReason::from(status),
        Ok(Err(e)) => {
            warn!(error = %e, "failed to reap driver process");
            ExitReason::Unknown
        }
        Err(_) => {
            warn!("driver process outlived its output stream, killing it");
            let _ = child.start_kill();
            match child.wait().await {
                Ok(status) => ExitReason::from(status),
                Err(_) => ExitReason::Unknown,
            }
        }
    }
}

/// Decode and apply one output line. Returns `true` when the line
/// terminated the session.
async fn handle_line(inner: &Arc<Inner>, line: &str, goal: &str, opts: &StartOptions) -> bool {
    let event = match decode_event(line) {
        Ok(Some(event)) => event,
        Ok(None) => return false,
        Err(e) => {
            // Malformed lines never kill the session: report a synthetic
            // recoverable error event and keep reading.
            warn!(error = %e, line, "undecodable driver line");
            let synthetic = Event::Error {
                step: inner.step.load(Ordering::SeqCst),
                message: e.to_string(),
                code: Some("parse_error".into()),
                recoverable: true,
            };
            inner.listeners.notify(&synthetic);
            return false;
        }
    };

    inner.step.store(event.step(), Ordering::SeqCst);

    match &event {
        Event::Ready { .. } => {
            inner.listeners.notify(&event);
            if inner.current_state() == DriverState::Idle {
                let start = Command::Start {
                    session_id: inner.session_id.to_string(),
                    goal: goal.to_string(),
                    screenshot: opts.screenshot.clone(),
                    width: opts.width,
                    height: opts.height,
                    platform: inner.config.platform,
                    model: inner.config.model.clone(),
                    options: inner.config.options.clone(),
                };
                inner.write(start).await;
                debug!("driver ready, start command sent");
            } else {
                warn!(state = %inner.current_state(), "ready event outside idle ignored");
            }
            false
        }
        Event::StateChange { state, .. } => {
            inner.transition_if_live(*state);
            inner.listeners.notify(&event);
            false
        }
        Event::Confirm {
            step,
            action,
            reason,
        } => {
            if !inner.transition_if_live(DriverState::WaitingConfirmation) {
                return false;
            }
            if let Ok(mut pending) = inner.pending_confirm.lock() {
                *pending = Some(PendingConfirm { step: *step });
            }
            inner.listeners.notify(&event);

            let request = ConfirmRequest {
                step: *step,
                action: action.clone(),
                reason: reason.clone(),
            };
            let mut answered = false;
            for responder in inner.listeners.confirm_responders() {
                let Some(approved) = responder(request.clone()).await else {
                    continue;
                };
                if answered {
                    // First resolution already won; silently ignore.
                    continue;
                }
                answered = true;
                // Auto-respond only if the caller has not beaten us to it.
                if let Some(pending) = inner.take_pending_confirm() {
                    debug!(step = pending.step, approved, "auto-responding to confirmation");
                    inner
                        .write(Command::Confirm {
                            approved,
                            message: None,
                        })
                        .await;
                }
            }
            false
        }
        Event::AskQuestion {
            step,
            question,
            question_id,
        } => {
            if !inner.transition_if_live(DriverState::WaitingAnswer) {
                return false;
            }
            if let Ok(mut pending) = inner.pending_answer.lock() {
                *pending = Some(PendingAnswer {
                    step: *step,
                    question_id: question_id.clone(),
                });
            }
            inner.listeners.notify(&event);

            let request = QuestionRequest {
                step: *step,
                question: question.clone(),
                question_id: question_id.clone(),
            };
            let mut answered = false;
            for responder in inner.listeners.answer_responders() {
                let Some(text) = responder(request.clone()).await else {
                    continue;
                };
                if answered {
                    continue;
                }
                answered = true;
                if let Some(pending) = inner.take_pending_answer() {
                    debug!(step = pending.step, "auto-answering question");
                    inner
                        .write(Command::Answer {
                            text,
                            question_id: pending.question_id,
                        })
                        .await;
                }
            }
            false
        }
        Event::Finished {
            step,
            success,
            reason,
            summary,
        } => {
            if !inner.transition_if_live(DriverState::Finished) {
                return true;
            }
            inner.listeners.notify(&event);
            info!(success, reason, "driver session finished");
            inner.settle_start(Ok(StartOutcome {
                success: *success,
                reason: reason.clone(),
                summary: summary.clone(),
                step: *step,
            }));
            inner.cleanup().await;
            true
        }
        Event::Error {
            message,
            code,
            recoverable,
            ..
        } => {
            inner.listeners.notify(&event);
            if *recoverable {
                debug!(message, "recoverable driver error reported");
                return false;
            }
            if !inner.transition_if_live(DriverState::Error) {
                return true;
            }
            warn!(message, code = code.as_deref(), "unrecoverable driver error");
            inner.settle_start(Err(DriverError::Agent {
                code: code.clone().unwrap_or_else(|| "unknown".into()),
                message: message.clone(),
            }));
            inner.cleanup().await;
            true
        }
        // Passive telemetry: observers only, no state effects.
        Event::Thinking { .. }
        | Event::Action { .. }
        | Event::ScreenshotCaptured { .. }
        | Event::SessionCreated { .. }
        | Event::AudioTranscript { .. }
        | Event::VideoFrame { .. }
        | Event::SpeechStarted { .. }
        | Event::SpeechFinished { .. }
        | Event::TurnDetected { .. } => {
            inner.listeners.notify(&event);
            false
        }
    }
}
