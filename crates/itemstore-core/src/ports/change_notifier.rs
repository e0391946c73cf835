//! Change notification port
//!
//! The controller reports every structural change to its list through a
//! closed set of events. Delivery is synchronous, on the caller's task,
//! in the order the changes were made. Listeners must not call back into
//! the controller's mutating operations from inside `notify`.
//!
//! ## Design Notes
//!
//! - `notify` is not async: events are delivered in the same turn as the
//!   change that produced them.
//! - Any `Fn(&ChangeEvent) + Send + Sync` closure is a notifier.
//! - [`ChannelNotifier`] hands events to a consumer on another task while
//!   preserving their order.

use std::ops::Range;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{OperationKind, RecordId, StoreError};

// ============================================================================
// ChangeEvent
// ============================================================================

/// Structural change to a controller's list
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// The list was cleared and will be refetched from the start
    FullReload,
    /// Records were appended at `range`
    ItemsAppended { range: Range<usize> },
    ItemInserted { index: usize },
    ItemUpdated { index: usize },
    ItemRemoved { index: usize },
    /// A fetch failed; the list is unchanged
    FetchFailed { error: StoreError },
    LoadingStateChanged { loading: bool },
    InsertFailed {
        record_id: Option<RecordId>,
        error: StoreError,
    },
    UpdateFailed {
        record_id: Option<RecordId>,
        error: StoreError,
    },
    DeleteFailed {
        record_id: Option<RecordId>,
        error: StoreError,
    },
    /// A mutation hit a connectivity failure and was queued for retry
    OperationDeferred {
        kind: OperationKind,
        record_id: Option<RecordId>,
    },
}

impl ChangeEvent {
    /// Terminal failure event for a mutation of the given kind
    pub fn mutation_failed(
        kind: OperationKind,
        record_id: Option<RecordId>,
        error: StoreError,
    ) -> Self {
        match kind {
            OperationKind::Insert => ChangeEvent::InsertFailed { record_id, error },
            OperationKind::Update => ChangeEvent::UpdateFailed { record_id, error },
            OperationKind::Delete => ChangeEvent::DeleteFailed { record_id, error },
        }
    }

    /// Stable snake_case name of the event
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::FullReload => "full_reload",
            ChangeEvent::ItemsAppended { .. } => "items_appended",
            ChangeEvent::ItemInserted { .. } => "item_inserted",
            ChangeEvent::ItemUpdated { .. } => "item_updated",
            ChangeEvent::ItemRemoved { .. } => "item_removed",
            ChangeEvent::FetchFailed { .. } => "fetch_failed",
            ChangeEvent::LoadingStateChanged { .. } => "loading_state_changed",
            ChangeEvent::InsertFailed { .. } => "insert_failed",
            ChangeEvent::UpdateFailed { .. } => "update_failed",
            ChangeEvent::DeleteFailed { .. } => "delete_failed",
            ChangeEvent::OperationDeferred { .. } => "operation_deferred",
        }
    }
}

// ============================================================================
// ChangeNotifier trait
// ============================================================================

/// Port trait for consumers of controller changes
pub trait ChangeNotifier: Send + Sync {
    /// Delivers one event
    fn notify(&self, event: &ChangeEvent);
}

impl<F> ChangeNotifier for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn notify(&self, event: &ChangeEvent) {
        self(event);
    }
}

// ============================================================================
// Implementations
// ============================================================================

/// Fan-out to every registered listener, in registration order
#[derive(Default)]
pub struct NotifierHub {
    listeners: RwLock<Vec<Arc<dyn ChangeNotifier>>>,
}

impl NotifierHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn ChangeNotifier>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChangeNotifier for NotifierHub {
    fn notify(&self, event: &ChangeEvent) {
        // Snapshot so a listener may register another one without deadlocking
        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.notify(event);
        }
    }
}

/// Records every event it receives
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<ChangeEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Kinds of the recorded events, in order
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(ChangeEvent::kind)
            .collect()
    }

    /// Removes and returns the recorded events
    pub fn take(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChangeNotifier for EventLog {
    fn notify(&self, event: &ChangeEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Forwards events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

impl ChannelNotifier {
    /// Creates the notifier and the receiving end for the consumer task
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChangeEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ChangeNotifier for ChannelNotifier {
    fn notify(&self, event: &ChangeEvent) {
        if self.sender.send(event.clone()).is_err() {
            debug!(event = event.kind(), "Change event receiver dropped");
        }
    }
}
