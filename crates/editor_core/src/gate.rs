//! Single in-flight operation per session.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    error::EditorError,
    events::{EditorEvent, Operation},
};

#[derive(Debug, Clone)]
pub struct WorkGate {
    busy: Arc<AtomicBool>,
    events: broadcast::Sender<EditorEvent>,
}

impl WorkGate {
    pub fn new(events: broadcast::Sender<EditorEvent>) -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Released when the guard drops.
    pub fn try_begin(&self, operation: Operation) -> Result<WorkGuard, EditorError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EditorError::Busy)?;
        debug!(%operation, "operation started");
        let _ = self.events.send(EditorEvent::WorkingChanged(true));
        Ok(WorkGuard {
            busy: self.busy.clone(),
            events: self.events.clone(),
            operation,
        })
    }
}

#[must_use = "the gate reopens as soon as the guard is dropped"]
pub struct WorkGuard {
    busy: Arc<AtomicBool>,
    events: broadcast::Sender<EditorEvent>,
    operation: Operation,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        debug!(operation = %self.operation, "operation settled");
        let _ = self.events.send(EditorEvent::WorkingChanged(false));
    }
}
