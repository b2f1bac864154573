//! One-shot session cancellation.
//!
//! A [`StopTrigger`] stays in the registry; its [`StopSignal`] moves into the
//! pull task. Firing consumes the trigger, so a session can be stopped at most
//! once. The shared [`StopFlag`] travels with every queued packet so the
//! multiplexer can discard packets of a session stopped after they were queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

/// Create a connected trigger/signal pair.
pub fn stop_signal() -> (StopTrigger, StopSignal) {
    let flag = StopFlag(Arc::new(AtomicBool::new(false)));
    let (tx, rx) = oneshot::channel();
    (
        StopTrigger {
            flag: flag.clone(),
            tx,
        },
        StopSignal {
            flag,
            rx,
            received: false,
        },
    )
}

/// Sending half, owned by the registry entry.
#[derive(Debug)]
pub struct StopTrigger {
    flag: StopFlag,
    tx: oneshot::Sender<()>,
}

impl StopTrigger {
    /// Deliver the stop. A pull task that already exited is not an error.
    pub fn fire(self) {
        self.flag.0.store(true, Ordering::Release);
        let _ = self.tx.send(());
    }
}

/// Receiving half, owned by the pull task.
#[derive(Debug)]
pub struct StopSignal {
    flag: StopFlag,
    rx: oneshot::Receiver<()>,
    received: bool,
}

impl StopSignal {
    /// Resolves once the session is stopped, or its trigger is dropped.
    /// Safe to await again after it resolved.
    pub async fn stopped(&mut self) {
        if self.received {
            return;
        }
        let _ = (&mut self.rx).await;
        self.received = true;
    }

    pub fn flag(&self) -> StopFlag {
        self.flag.clone()
    }
}

/// Shared "this session was stopped" marker.
#[derive(Debug, Clone)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
