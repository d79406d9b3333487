//! Shared start/stop/notify lifecycle for background schedulers.
//!
//! A [`LifecycleCore`] owns:
//! - one mutex guarding the scheduler's mutable state together with its
//!   notification buffer ([`SharedState`])
//! - at most one loop thread, ticking at a fixed interval until stopped
//!
//! Notifications are either buffered (while suppressed) or printed to stdout.
//! Printing always happens after the state lock has been released.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default period between loop ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default bounded wait for the loop to exit on `stop`.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Pending notifications plus the suppress flag.
#[derive(Debug, Default)]
struct NotificationBuffer {
    pending: Vec<String>,
    suppressed: bool,
}

#[derive(Debug)]
struct Guarded<S> {
    state: S,
    notices: NotificationBuffer,
}

/// Scheduler state and notification buffer behind a single mutex.
#[derive(Debug)]
pub struct SharedState<S> {
    inner: Mutex<Guarded<S>>,
}

impl<S> SharedState<S> {
    /// Wraps `state` with an empty, unsuppressed notification buffer.
    #[must_use]
    pub fn new(state: S) -> Self {
        Self {
            inner: Mutex::new(Guarded {
                state,
                notices: NotificationBuffer::default(),
            }),
        }
    }

    /// Runs `f` with exclusive access to the state. No notifications.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard.state)
    }

    /// Runs `f` with exclusive access to the state and emits every message
    /// it pushed to the outbox, in order.
    ///
    /// While suppressed the messages are buffered inside the same critical
    /// section; otherwise they are printed once the lock is released.
    pub fn mutate_and_notify<R>(&self, f: impl FnOnce(&mut S, &mut Vec<String>) -> R) -> R {
        let mut outbox = Vec::new();
        let (result, to_print) = {
            let mut guard = self.inner.lock();
            let result = f(&mut guard.state, &mut outbox);
            if guard.notices.suppressed {
                guard.notices.pending.append(&mut outbox);
            }
            (result, outbox)
        };
        print_notifications(&to_print);
        result
    }

    /// Emits a single notification.
    pub fn emit_notification(&self, message: impl Into<String>) {
        let message = message.into();
        self.mutate_and_notify(|_, outbox| outbox.push(message));
    }

    /// Toggles buffering of notifications.
    pub fn suppress_notifications(&self, value: bool) {
        self.inner.lock().notices.suppressed = value;
    }

    /// Whether notifications are currently buffered.
    #[must_use]
    pub fn notifications_suppressed(&self) -> bool {
        self.inner.lock().notices.suppressed
    }

    /// Drains buffered notifications in FIFO order.
    pub fn pop_notifications(&self) -> Vec<String> {
        std::mem::take(&mut self.inner.lock().notices.pending)
    }
}

fn print_notifications(messages: &[String]) {
    if messages.is_empty() {
        return;
    }
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for message in messages {
        debug!(target: "fisching::notify", "{message}");
        let _ = writeln!(out, "\n🔔 {message}");
    }
    let _ = out.flush();
}

/// Handles of a running loop thread.
#[derive(Debug)]
struct Worker {
    handle: JoinHandle<()>,
    stop_tx: Sender<()>,
    /// Disconnects when the loop thread exits.
    exited_rx: Receiver<()>,
}

/// Start/stop/notify lifecycle shared by the encounter schedulers.
#[derive(Debug)]
pub struct LifecycleCore<S> {
    name: &'static str,
    shared: Arc<SharedState<S>>,
    worker: Mutex<Option<Worker>>,
    tick_interval: Duration,
    stop_timeout: Duration,
}

impl<S: Send + 'static> LifecycleCore<S> {
    /// Creates a stopped lifecycle around `state` with default timing.
    #[must_use]
    pub fn new(name: &'static str, state: S) -> Self {
        Self {
            name,
            shared: Arc::new(SharedState::new(state)),
            worker: Mutex::new(None),
            tick_interval: DEFAULT_TICK_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Overrides the loop period and the stop wait.
    #[must_use]
    pub fn with_timing(mut self, tick_interval: Duration, stop_timeout: Duration) -> Self {
        self.tick_interval = tick_interval;
        self.stop_timeout = stop_timeout;
        self
    }

    /// The guarded state.
    #[must_use]
    pub fn shared(&self) -> &Arc<SharedState<S>> {
        &self.shared
    }

    /// Whether a loop thread is currently attached.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Spawns the loop thread running `tick` once per interval.
    ///
    /// No-op when `enabled` is false or a loop is already running.
    /// Returns whether a new loop was started.
    pub fn start<F>(&self, enabled: bool, mut tick: F) -> bool
    where
        F: FnMut(&SharedState<S>) + Send + 'static,
    {
        if !enabled {
            return false;
        }
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return false;
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (exited_tx, exited_rx) = bounded::<()>(0);
        let shared = Arc::clone(&self.shared);
        let interval = self.tick_interval;

        let spawned = thread::Builder::new()
            .name(format!("fisching-{}", self.name))
            .spawn(move || {
                let _exited = exited_tx;
                loop {
                    tick(&shared);
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {},
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            });

        match spawned {
            Ok(handle) => {
                *worker = Some(Worker {
                    handle,
                    stop_tx,
                    exited_rx,
                });
                info!("{} loop started ({:?} ticks)", self.name, interval);
                true
            },
            Err(e) => {
                warn!("Failed to spawn {} loop: {e}", self.name);
                false
            },
        }
    }

    /// Signals the loop to exit and waits up to the stop timeout.
    ///
    /// Always detaches the loop handle, so a later `start` can succeed.
    /// Calling it twice, or before `start`, is a no-op.
    pub fn stop(&self) {
        let Some(Worker {
            handle,
            stop_tx,
            exited_rx,
        }) = self.worker.lock().take()
        else {
            return;
        };

        let _ = stop_tx.try_send(());
        drop(stop_tx);

        match exited_rx.recv_timeout(self.stop_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "{} loop did not exit within {:?}, detaching",
                    self.name, self.stop_timeout
                );
            },
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("{} loop panicked", self.name);
                }
                info!("{} loop stopped", self.name);
            },
        }
    }
}

impl<S> Drop for LifecycleCore<S> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.stop_tx.try_send(());
        }
    }
}
