//! Graceful shutdown coordination
//!
//! RUNNING -> DRAINING -> TERMINATED, one way.
//!
//! - RUNNING: the listener accepts connections and the shutdown flag is clear.
//! - First termination signal: set the flag, tell the listener to stop
//!   accepting, arm the deadline. Now DRAINING.
//! - DRAINING ends exactly once, on whichever comes first:
//!   - the listener reports every connection closed -> `Drained` (exit 0)
//!   - the deadline fires -> `DeadlineExceeded` (exit 1), open connections are abandoned
//! - Further signals while DRAINING are logged and ignored. They neither
//!   extend the deadline nor notify the listener again.

use futures::{Stream, StreamExt};
use std::future::IntoFuture;
use std::time::Duration;
use tracing::{error, info, warn};

use super::shutdown::{ShutdownController, ShutdownSignal, ShutdownState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Draining,
    Terminated,
}

/// How the process left DRAINING (or RUNNING, if the listener died)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Every connection closed before the deadline
    Drained,
    /// The deadline fired with connections still open
    DeadlineExceeded,
    /// The listener stopped on its own
    ServerFailed,
}

impl Termination {
    pub fn exit_code(&self) -> u8 {
        match self {
            Termination::Drained => 0,
            Termination::DeadlineExceeded | Termination::ServerFailed => 1,
        }
    }
}

pub struct ShutdownCoordinator {
    controller: ShutdownController,
    deadline: Duration,
    phase: Phase,
}

impl ShutdownCoordinator {
    pub fn new(controller: ShutdownController, deadline: Duration) -> Self {
        ShutdownCoordinator {
            controller,
            deadline,
            phase: Phase::Running,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Read handle on the shutdown flag
    pub fn state(&self) -> ShutdownState {
        self.controller.state()
    }

    /// Future the listener should use as its graceful-shutdown trigger
    pub fn drain_signal(&self) -> ShutdownSignal {
        self.controller.subscribe()
    }

    /// Drive the lifecycle to TERMINATED
    ///
    /// `server` must stop accepting once `drain_signal()` fires and resolve
    /// when its last connection closes. It is dropped, abandoning whatever
    /// is still open, if the deadline fires first.
    pub async fn run<S, F>(&mut self, signals: S, server: F) -> Termination
    where
        S: Stream<Item = &'static str> + Unpin,
        F: IntoFuture<Output = std::io::Result<()>>,
    {
        let mut signals = signals.fuse();
        let server = server.into_future();
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => {
                match result {
                    Ok(()) => error!("Server stopped without a shutdown signal"),
                    Err(e) => error!(error = %e, "Server failed"),
                }
                return self.terminate(Termination::ServerFailed);
            }
            Some(signal) = signals.next() => {
                self.begin_drain(signal);
            }
        }

        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                result = &mut server => {
                    break match result {
                        Ok(()) => {
                            info!("All connections closed, shutdown complete");
                            Termination::Drained
                        }
                        Err(e) => {
                            error!(error = %e, "Server failed while draining");
                            Termination::ServerFailed
                        }
                    };
                }
                _ = &mut deadline => {
                    error!(
                        timeout_secs = self.deadline.as_secs_f64(),
                        "Could not close connections in time, forcefully shutting down"
                    );
                    break Termination::DeadlineExceeded;
                }
                Some(signal) = signals.next() => {
                    warn!(signal = signal, "Shutdown already in progress, ignoring signal");
                }
            }
        };

        self.terminate(outcome)
    }

    fn begin_drain(&mut self, signal: &'static str) {
        info!(
            signal = signal,
            timeout_secs = self.deadline.as_secs_f64(),
            "Termination signal received, starting graceful shutdown"
        );
        self.controller.trigger();
        self.phase = Phase::Draining;
    }

    fn terminate(&mut self, outcome: Termination) -> Termination {
        self.phase = Phase::Terminated;
        info!(
            outcome = ?outcome,
            exit_code = outcome.exit_code(),
            "Process terminating"
        );
        outcome
    }
}
