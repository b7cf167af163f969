//! Termination signal handling
//!
//! SIGTERM (sent by Docker/Kubernetes) and SIGINT (Ctrl+C) are treated the
//! same way: each delivery is forwarded to the coordinator, which decides
//! whether it starts a shutdown or is a duplicate.

use crate::lifecycle::coordinator::LifecycleCoordinator;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Recognized termination signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminationSignal {
    #[serde(rename = "SIGTERM")]
    Terminate,
    #[serde(rename = "SIGINT")]
    Interrupt,
}

impl TerminationSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationSignal::Terminate => "SIGTERM",
            TerminationSignal::Interrupt => "SIGINT",
        }
    }
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stream of signal deliveries
///
/// `recv` yields `None` once the stream can deliver nothing more.
#[async_trait]
pub trait SignalSource: Send {
    async fn recv(&mut self) -> Option<()>;
}

#[cfg(unix)]
#[async_trait]
impl SignalSource for tokio::signal::unix::Signal {
    async fn recv(&mut self) -> Option<()> {
        tokio::signal::unix::Signal::recv(self).await
    }
}

/// Ctrl+C as a signal stream (non-unix)
#[cfg(not(unix))]
struct CtrlC;

#[cfg(not(unix))]
#[async_trait]
impl SignalSource for CtrlC {
    async fn recv(&mut self) -> Option<()> {
        tokio::signal::ctrl_c().await.ok()
    }
}

type BoxedSource = Box<dyn SignalSource>;

/// Registered termination signal streams
///
/// Registration happens up front so a failure surfaces at startup instead of
/// on the first delivery. A stream that closes is dropped; the listener
/// keeps serving the other one.
pub struct SignalListener {
    sigterm: Option<BoxedSource>,
    sigint: Option<BoxedSource>,
}

impl SignalListener {
    /// Register SIGTERM and SIGINT handlers
    #[cfg(unix)]
    pub fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self::from_sources(
            Box::new(signal(SignalKind::terminate())?),
            Box::new(signal(SignalKind::interrupt())?),
        ))
    }

    /// Register the Ctrl+C handler; there is no SIGTERM here
    #[cfg(not(unix))]
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            sigterm: None,
            sigint: Some(Box::new(CtrlC)),
        })
    }

    /// Listen on arbitrary streams standing in for SIGTERM and SIGINT
    pub fn from_sources(sigterm: Box<dyn SignalSource>, sigint: Box<dyn SignalSource>) -> Self {
        Self {
            sigterm: Some(sigterm),
            sigint: Some(sigint),
        }
    }

    /// Wait for the next SIGTERM or SIGINT
    ///
    /// Returns `None` once both streams have closed.
    pub async fn recv(&mut self) -> Option<TerminationSignal> {
        loop {
            let sigterm_open = self.sigterm.is_some();
            let sigint_open = self.sigint.is_some();
            if !sigterm_open && !sigint_open {
                return None;
            }

            let closed = tokio::select! {
                received = next_delivery(&mut self.sigterm), if sigterm_open => match received {
                    Some(()) => return Some(TerminationSignal::Terminate),
                    None => TerminationSignal::Terminate,
                },
                received = next_delivery(&mut self.sigint), if sigint_open => match received {
                    Some(()) => return Some(TerminationSignal::Interrupt),
                    None => TerminationSignal::Interrupt,
                },
            };

            warn!(signal = %closed, "Signal stream closed, no longer listening for it");
            match closed {
                TerminationSignal::Terminate => self.sigterm = None,
                TerminationSignal::Interrupt => self.sigint = None,
            }
        }
    }
}

async fn next_delivery(source: &mut Option<BoxedSource>) -> Option<()> {
    match source {
        Some(source) => source.recv().await,
        None => std::future::pending().await,
    }
}

/// Forward every received signal to the coordinator until it stops
///
/// Runs for the life of the process. Duplicate signals reach the coordinator
/// too; it treats them as no-ops. If every signal stream closes, forwarding
/// ends without touching the coordinator.
pub async fn forward_signals(mut listener: SignalListener, coordinator: LifecycleCoordinator) {
    loop {
        tokio::select! {
            received = listener.recv() => match received {
                Some(signal) => {
                    info!(signal = %signal, "Received termination signal");
                    coordinator.on_termination_signal(signal);
                }
                None => {
                    warn!("All signal streams closed, termination signals will not be handled");
                    break;
                }
            },
            _ = coordinator.wait_stopped() => break,
        }
    }
}
