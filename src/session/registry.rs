//! Session registry.
//!
//! # Responsibilities
//! - Map each active stream id to its stop trigger and task handle
//! - Start sessions, replacing any live session with the same id
//! - Stop one session or all of them
//!
//! # Design Decisions
//! - The map sits behind a mutex that is never held across an await
//! - Entries carry a generation so a finishing task only removes its own
//!   entry, never the one that replaced it
//! - Stopping removes the entry before firing, so a trigger fires at most once

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::session::cancel::{stop_signal, StopTrigger};
use crate::session::command::PlayRequest;
use crate::session::pull::{self, PullContext, PullOutcome};

struct SessionEntry {
    generation: u64,
    trigger: StopTrigger,
    task: Option<JoinHandle<PullOutcome>>,
}

struct RegistryInner {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    next_generation: AtomicU64,
    context: Arc<PullContext>,
}

/// Registry of the sessions of one client connection. Cheap to clone.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

/// Handle to a stopped or replaced session's task.
#[derive(Debug)]
pub struct SessionTask(Option<JoinHandle<PullOutcome>>);

impl SessionTask {
    /// Wait for the task to finish. `None` if the task had already been
    /// detached or panicked.
    pub async fn join(self) -> Option<PullOutcome> {
        match self.0 {
            Some(handle) => handle.await.ok(),
            None => None,
        }
    }
}

impl SessionRegistry {
    pub fn new(context: PullContext) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                context: Arc::new(context),
            }),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.inner
            .sessions
            .lock()
            .expect("session registry mutex poisoned")
    }

    /// Start a session, stopping any live session with the same id first.
    ///
    /// Returns the replaced session's task, if there was one.
    pub fn start(&self, request: PlayRequest) -> Option<SessionTask> {
        let stream_id = request.stream_id.clone();
        let replaced = self.stop(&stream_id);
        if replaced.is_some() {
            tracing::debug!(session_id = %stream_id, "Replacing live session");
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (trigger, signal) = stop_signal();
        self.sessions().insert(
            stream_id.clone(),
            SessionEntry {
                generation,
                trigger,
                task: None,
            },
        );
        metrics::record_session_started();

        let registry = self.clone();
        let context = self.inner.context.clone();
        let task_id = stream_id.clone();
        let task = tokio::spawn(async move {
            let outcome = pull::run(context, request, signal).await;
            registry.release(&task_id, generation, outcome);
            outcome
        });

        // The task may already have finished and released its entry; then the
        // handle is simply dropped.
        if let Some(entry) = self
            .sessions()
            .get_mut(&stream_id)
            .filter(|entry| entry.generation == generation)
        {
            entry.task = Some(task);
        }

        replaced
    }

    /// Stop a session. Unknown ids are a no-op.
    pub fn stop(&self, stream_id: &str) -> Option<SessionTask> {
        let entry = self.sessions().remove(stream_id)?;
        tracing::info!(session_id = %stream_id, "Stopping session");
        entry.trigger.fire();
        Some(SessionTask(entry.task))
    }

    /// Stop every session, leaving the registry empty.
    pub fn stop_all(&self) -> Vec<SessionTask> {
        let drained: Vec<_> = self.sessions().drain().collect();
        if !drained.is_empty() {
            tracing::info!(sessions = drained.len(), "Stopping all sessions");
        }
        drained
            .into_iter()
            .map(|(_, entry)| {
                entry.trigger.fire();
                SessionTask(entry.task)
            })
            .collect()
    }

    /// Whether a session with this id is currently registered.
    pub fn is_active(&self, stream_id: &str) -> bool {
        self.sessions().contains_key(stream_id)
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    /// Called by a finished task: drop its entry unless it was replaced.
    fn release(&self, stream_id: &str, generation: u64, outcome: PullOutcome) {
        let mut sessions = self.sessions();
        if sessions
            .get(stream_id)
            .is_some_and(|entry| entry.generation == generation)
        {
            sessions.remove(stream_id);
        }
        drop(sessions);
        metrics::record_session_ended(outcome.as_str());
    }
}
