//! Shutdown state and termination signals
//!
//! - `ShutdownState` is the one-way "shutting down" flag read by every request
//! - `ShutdownController` flips it and tells the listener to stop accepting
//! - `ShutdownSignal` is what the listener waits on
//! - `termination_signals()` turns SIGTERM/SIGINT into a stream

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Process-wide shutdown flag
///
/// Starts false. Once set it never goes back; there is no way to clear it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownState {
    shutting_down: Arc<AtomicBool>,
}

impl ShutdownState {
    /// Create a new shutdown state (initially accepting requests)
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Set the flag. Returns true only for the call that performed the transition.
    fn mark(&self) -> bool {
        !self.shutting_down.swap(true, Ordering::SeqCst)
    }
}

/// Receiver side of the drain trigger
///
/// Handed to the listener as its graceful-shutdown future.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for shutdown signal
    pub async fn wait(&mut self) {
        while !*self.receiver.borrow() {
            if self.receiver.changed().await.is_err() {
                // Sender dropped, treat as shutdown
                break;
            }
        }
    }

    /// Check if shutdown was signaled (non-blocking)
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Sole writer of the shutdown flag
///
/// Not `Clone`: whoever owns it owns the transition.
pub struct ShutdownController {
    state: ShutdownState,
    sender: watch::Sender<bool>,
}

impl ShutdownController {
    /// Flip the flag and notify the listener
    ///
    /// Idempotent. Returns true for the first call only; later calls
    /// neither re-notify nor touch the flag.
    pub fn trigger(&self) -> bool {
        if !self.state.mark() {
            return false;
        }
        let _ = self.sender.send(true);
        info!("Shutdown flag set, listener notified");
        true
    }

    /// Read handle on the flag, for the request pipeline
    pub fn state(&self) -> ShutdownState {
        self.state.clone()
    }

    /// Another receiver for the drain trigger
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Create a new shutdown controller/signal pair
///
/// Returns (controller, signal) where:
/// - controller: Owned by the coordinator, flips the flag
/// - signal: Passed to the listener to stop accepting connections
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (
        ShutdownController {
            state: ShutdownState::new(),
            sender,
        },
        ShutdownSignal { receiver },
    )
}

/// Stream of termination signals (SIGTERM and SIGINT)
///
/// Yields the signal name each time one arrives. Handlers are registered
/// up front, so a failure to register is reported before serving starts.
#[cfg(unix)]
pub fn termination_signals() -> std::io::Result<BoxStream<'static, &'static str>> {
    use tokio::signal::unix::{signal, SignalKind};

    let sigterm = signal(SignalKind::terminate())?;
    let sigint = signal(SignalKind::interrupt())?;

    let signals = stream::unfold((sigterm, sigint), |(mut sigterm, mut sigint)| async move {
        let name = tokio::select! {
            Some(()) = sigterm.recv() => "SIGTERM",
            Some(()) = sigint.recv() => "SIGINT",
            else => return None,
        };
        Some((name, (sigterm, sigint)))
    });

    Ok(signals.boxed())
}

/// Stream of Ctrl+C events (Windows)
#[cfg(not(unix))]
pub fn termination_signals() -> std::io::Result<BoxStream<'static, &'static str>> {
    let signals = stream::unfold((), |()| async move {
        tokio::signal::ctrl_c().await.ok()?;
        Some(("CTRL_C", ()))
    });

    Ok(signals.boxed())
}
