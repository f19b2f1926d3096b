//! Thread boundary between a graph run and its caller.
//!
//! The engine reports progress as [`RunEvent`]s through an [`EventSink`].
//! A background run ([`Engine::spawn`](crate::pipeline::Engine::spawn))
//! sends them over a crossbeam channel held by a [`RunHandle`].

use crate::pipeline::error::PipelineError;
use crate::pipeline::executor::RunReport;
use crate::pipeline::graph::Graph;
use crate::pipeline::id::NodeId;
use crate::types::Outputs;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Progress notifications emitted during a run.
///
/// Every run emits `RunStarted` first and exactly one of `RunFinished` or
/// `RunFailed` last.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    RunStarted,

    NodeStarted {
        id: NodeId,
    },

    /// A node produced outputs, either by executing or from its cache.
    NodeCompleted {
        id: NodeId,
        outputs: Outputs,
        cached: bool,
    },

    NodeFailed {
        id: NodeId,
        message: String,
    },

    RunFinished,

    RunFailed {
        message: String,
    },
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::RunFinished | RunEvent::RunFailed { .. })
    }
}

/// Receives run events. Must not block for long; the run waits on it.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

impl EventSink for Sender<RunEvent> {
    fn emit(&self, event: RunEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.send(event);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: RunEvent) {}
}

/// Adapts a closure into an [`EventSink`].
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(RunEvent) + Send + Sync,
{
    fn emit(&self, event: RunEvent) {
        (self.0)(event)
    }
}

/// Records events in memory.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<RunEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Drain recorded events.
    pub fn take(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: RunEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Cooperative cancellation flag, checked by the engine before each node.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Caller-side handle of a run executing on its own thread.
pub struct RunHandle {
    events: Receiver<RunEvent>,
    cancel: CancelToken,
    worker: JoinHandle<(Graph, RunReport)>,
}

impl RunHandle {
    pub(crate) fn new(
        events: Receiver<RunEvent>,
        cancel: CancelToken,
        worker: JoinHandle<(Graph, RunReport)>,
    ) -> Self {
        Self {
            events,
            cancel,
            worker,
        }
    }

    pub fn events(&self) -> &Receiver<RunEvent> {
        &self.events
    }

    /// Ask the run to stop before its next node.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Drain all pending events without blocking.
    pub fn drain(&self) -> Vec<RunEvent> {
        self.events.try_iter().collect()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the run and take back the graph with its updated state.
    pub fn join(self) -> Result<(Graph, RunReport), PipelineError> {
        self.worker.join().map_err(|_| PipelineError::WorkerPanicked)
    }
}
