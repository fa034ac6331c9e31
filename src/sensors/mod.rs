//! Concrete motion sources driven by tokio tasks.
//!
//! Each `listen` spawns one producer task on the current runtime; the task
//! pushes `SourceEvent`s tagged with its listener handle into the session's
//! channel. `unlisten` aborts the task, and anything it already queued is
//! discarded by the acquisition layer because the handle no longer matches.

pub mod replay;
pub mod simulated;
pub mod termux;

use crate::acquisition::{ListenerHandle, MotionSource, SourceEvent};
use crate::error::{AcqResult, AcquisitionError};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

pub use replay::{load_trace, TimedEvent};
pub use simulated::Profile;

/// What a `TaskSource` produces once listening.
#[derive(Clone, Debug)]
pub enum Feed {
    Simulated(Profile),
    Termux { period_ms: u64 },
    Replay(Arc<Vec<TimedEvent>>),
}

impl Feed {
    fn is_supported(&self) -> bool {
        match self {
            Feed::Termux { .. } => termux::is_available(),
            Feed::Simulated(_) | Feed::Replay(_) => true,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Feed::Simulated(_) => "simulated",
            Feed::Termux { .. } => "termux",
            Feed::Replay(_) => "replay",
        }
    }

    fn spawn(&self, listener: ListenerHandle, tx: Sender<SourceEvent>) -> AcqResult<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AcquisitionError::SourceFailed(format!("no async runtime: {}", e)))?;
        let handle = match self.clone() {
            Feed::Simulated(profile) => runtime.spawn(simulated::run(profile, listener, tx)),
            Feed::Termux { period_ms } => runtime.spawn(termux::run(period_ms, listener, tx)),
            Feed::Replay(trace) => runtime.spawn(replay::run(trace, listener, tx)),
        };
        Ok(handle)
    }
}

/// Push one event, dropping it when the consumer is behind.
/// Returns false once the receiving side is gone.
pub(crate) fn forward(tx: &Sender<SourceEvent>, event: SourceEvent) -> bool {
    match tx.try_send(event) {
        Ok(_) => true,
        Err(TrySendError::Full(_)) => true,
        Err(TrySendError::Closed(_)) => false,
    }
}

pub struct TaskSource {
    feed: Feed,
    tx: Sender<SourceEvent>,
    supported: bool,
    next_id: u64,
    active: Option<(ListenerHandle, JoinHandle<()>)>,
}

impl TaskSource {
    pub fn new(feed: Feed, tx: Sender<SourceEvent>) -> Self {
        let supported = feed.is_supported();
        Self {
            feed,
            tx,
            supported,
            next_id: 0,
            active: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.feed.label()
    }
}

impl MotionSource for TaskSource {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn listen(&mut self) -> AcqResult<ListenerHandle> {
        if let Some((old, task)) = self.active.take() {
            task.abort();
            log::debug!("[ACQ] Replacing {} listener {}", self.feed.label(), old.id());
        }
        self.next_id += 1;
        let listener = ListenerHandle::new(self.next_id);
        let task = self.feed.spawn(listener, self.tx.clone())?;
        self.active = Some((listener, task));
        Ok(listener)
    }

    fn unlisten(&mut self, handle: ListenerHandle) {
        match self.active.take() {
            Some((listener, task)) if listener == handle => task.abort(),
            other => self.active = other,
        }
    }
}

impl Drop for TaskSource {
    fn drop(&mut self) {
        if let Some((_, task)) = self.active.take() {
            task.abort();
        }
    }
}
