//! Items controller use case
//!
//! Owns the authoritative ordered list of records shown by one consumer,
//! pages it in from a [`DataStore`], mediates insert/update/delete and
//! reports every structural change through a [`ChangeNotifier`].
//!
//! ## Design Notes
//!
//! - All methods take `&self`; list state sits behind a mutex that is never
//!   held across an `.await`. `invalidate()` can therefore run while a
//!   fetch is outstanding.
//! - At most one fetch is in flight. A second `request_next_page()` while
//!   loading is coalesced into the outstanding one.
//! - Every `invalidate()` bumps a generation counter. Completions carrying
//!   an older generation are dropped without touching the list or
//!   emitting events.
//! - Events are collected under the lock and delivered after it is
//!   released, in the order the changes were made.

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{
    compare_values, BatchCursor, ConnectionPolicies, FetchOptions, NoConnectionPolicy,
    OperationKind, Record, StoreError,
};
use crate::ports::{ChangeEvent, ChangeNotifier, DataStore};

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a successful `request_next_page()` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// A batch arrived; `range` holds the newly appended indices (possibly
    /// empty when every record was already loaded)
    Appended { range: Range<usize>, has_more: bool },
    /// A fetch was already in flight; no backend call was issued
    Coalesced,
    /// Nothing left to fetch; no backend call, no notification
    FullyLoaded,
    /// The list was invalidated while the fetch was in flight
    Discarded,
}

/// Result of a successful mutation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Persisted and applied to the list at `index`
    Applied { index: usize },
    /// Persisted; the record is not in the loaded part of the list
    Persisted,
    /// Backend unreachable; queued for `retry_pending()`
    Deferred,
    /// Persisted, but the list was invalidated meanwhile
    Discarded,
}

/// Coarse controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Loading,
    /// Last fetch failed; the list keeps its previous contents
    Error,
}

/// Mutation waiting for connectivity
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    pub kind: OperationKind,
    pub record: Record,
}

/// Integrator callback deciding what to do with a mutation that failed for
/// lack of connectivity
pub type NoConnectionHandler =
    Arc<dyn Fn(OperationKind, &Record) -> NoConnectionPolicy + Send + Sync>;

// ============================================================================
// List state
// ============================================================================

struct ListState {
    options: FetchOptions,
    items: Vec<Record>,
    cursor: BatchCursor,
    loading: bool,
    last_error: Option<StoreError>,
    generation: u64,
    pending: VecDeque<PendingOperation>,
}

impl ListState {
    fn index_of(&self, record: &Record) -> Option<usize> {
        self.items.iter().position(|r| r.same_identity(record))
    }
}

fn order_value<'a>(record: &'a Record, attr: &str) -> &'a Value {
    record.get(attr).unwrap_or(&Value::Null)
}

/// Position for `record` among `items` sorted ascending by `attr`
///
/// Lands after any run of equal values, so ties keep arrival order. Records
/// without the attribute, or lists without one, append.
fn insertion_index(items: &[Record], record: &Record, order_attribute: Option<&str>) -> usize {
    let Some(attr) = order_attribute else {
        return items.len();
    };
    let Some(value) = record.get(attr) else {
        return items.len();
    };
    items
        .iter()
        .position(|r| compare_values(order_value(r, attr), value).is_gt())
        .unwrap_or(items.len())
}

/// Replace the item at `old`, moving it if its order value no longer fits
///
/// With `open_ended` set, more records follow the loaded ones; a record that
/// would move past the last loaded item leaves the list instead, and `None`
/// is returned.
fn replace_item(
    items: &mut Vec<Record>,
    old: usize,
    record: Record,
    order_attribute: Option<&str>,
    open_ended: bool,
    events: &mut Vec<ChangeEvent>,
) -> Option<usize> {
    let fits = match order_attribute {
        None => true,
        Some(attr) => {
            let value = order_value(&record, attr);
            let after_prev =
                old == 0 || !compare_values(order_value(&items[old - 1], attr), value).is_gt();
            let before_next = old + 1 >= items.len()
                || !compare_values(value, order_value(&items[old + 1], attr)).is_gt();
            after_prev && before_next
        }
    };
    if fits {
        items[old] = record;
        events.push(ChangeEvent::ItemUpdated { index: old });
        return Some(old);
    }

    items.remove(old);
    events.push(ChangeEvent::ItemRemoved { index: old });
    let new = insertion_index(items, &record, order_attribute);
    if open_ended && new == items.len() {
        return None;
    }
    items.insert(new, record);
    events.push(ChangeEvent::ItemInserted { index: new });
    Some(new)
}

// ============================================================================
// ItemsController
// ============================================================================

/// Authoritative list of records for one consumer
pub struct ItemsController {
    store: Arc<dyn DataStore>,
    notifier: Arc<dyn ChangeNotifier>,
    policies: ConnectionPolicies,
    no_connection_handler: Option<NoConnectionHandler>,
    state: Mutex<ListState>,
}

impl ItemsController {
    /// Creates a controller with an empty list positioned at the start of
    /// `options`
    ///
    /// # Arguments
    ///
    /// * `store` - Backend to fetch from and persist to; may be shared
    /// * `options` - Filter, sort and paging for this list
    /// * `notifier` - Receiver of structural change events
    pub fn new(
        store: Arc<dyn DataStore>,
        options: FetchOptions,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        let cursor = BatchCursor::start(&options);
        Self {
            store,
            notifier,
            policies: ConnectionPolicies::default(),
            no_connection_handler: None,
            state: Mutex::new(ListState {
                options,
                items: Vec::new(),
                cursor,
                loading: false,
                last_error: None,
                generation: 0,
                pending: VecDeque::new(),
            }),
        }
    }

    /// Sets the static per-operation no-connection policies
    pub fn with_connection_policies(mut self, policies: ConnectionPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Installs a callback that decides the no-connection policy per
    /// operation, overriding the static policies
    pub fn set_no_connection_handler<F>(&mut self, handler: F)
    where
        F: Fn(OperationKind, &Record) -> NoConnectionPolicy + Send + Sync + 'static,
    {
        self.no_connection_handler = Some(Arc::new(handler));
    }

    fn lock(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_all(&self, events: &[ChangeEvent]) {
        for event in events {
            self.notifier.notify(event);
        }
    }

    // ------------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------------

    /// Snapshot of the loaded records
    pub fn items(&self) -> Vec<Record> {
        self.lock().items.clone()
    }

    pub fn item(&self, index: usize) -> Option<Record> {
        self.lock().items.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.lock().cursor.has_more()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn last_error(&self) -> Option<StoreError> {
        self.lock().last_error.clone()
    }

    pub fn state(&self) -> ControllerState {
        let state = self.lock();
        if state.loading {
            ControllerState::Loading
        } else if state.last_error.is_some() {
            ControllerState::Error
        } else {
            ControllerState::Idle
        }
    }

    pub fn cursor(&self) -> BatchCursor {
        self.lock().cursor.clone()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn options(&self) -> FetchOptions {
        self.lock().options.clone()
    }

    /// Mutations waiting for connectivity, oldest first
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.lock().pending.iter().cloned().collect()
    }

    // ------------------------------------------------------------------------
    // Paging
    // ------------------------------------------------------------------------

    /// Fetches the next batch and appends it to the list
    ///
    /// Records whose identifier is already loaded are skipped, so a
    /// re-delivered page never duplicates items. On failure the list and
    /// cursor are left as they were; calling again retries the same page.
    ///
    /// # Errors
    ///
    /// Returns the store's error after emitting `FetchFailed`.
    pub async fn request_next_page(&self) -> Result<PageOutcome, StoreError> {
        let (options, cursor, generation) = {
            let mut state = self.lock();
            if state.loading {
                debug!("Fetch already in flight, coalescing request");
                return Ok(PageOutcome::Coalesced);
            }
            if !state.cursor.has_more() {
                return Ok(PageOutcome::FullyLoaded);
            }
            state.loading = true;
            (state.options.clone(), state.cursor.clone(), state.generation)
        };
        self.notifier
            .notify(&ChangeEvent::LoadingStateChanged { loading: true });
        debug!(generation, position = ?cursor.position(), "Requesting next page");

        let result = self.store.fetch(&options, &cursor).await;

        let mut events = Vec::new();
        let outcome = {
            let mut state = self.lock();
            if state.generation != generation {
                debug!(
                    generation,
                    current = state.generation,
                    "Dropping stale fetch completion"
                );
                return Ok(PageOutcome::Discarded);
            }
            state.loading = false;

            match result {
                Ok(batch) => {
                    let start = state.items.len();
                    let received = batch.records.len();
                    for record in batch.records {
                        if state.index_of(&record).is_none() {
                            state.items.push(record);
                        }
                    }
                    let end = state.items.len();
                    state.cursor = batch.cursor;
                    state.last_error = None;
                    let has_more = state.cursor.has_more();

                    info!(
                        received,
                        appended = end - start,
                        total = end,
                        has_more,
                        "Page loaded"
                    );
                    if end > start {
                        events.push(ChangeEvent::ItemsAppended { range: start..end });
                    }
                    Ok(PageOutcome::Appended {
                        range: start..end,
                        has_more,
                    })
                }
                Err(error) => {
                    warn!(error = %error, "Fetch failed, keeping loaded items");
                    state.last_error = Some(error.clone());
                    events.push(ChangeEvent::FetchFailed {
                        error: error.clone(),
                    });
                    Err(error)
                }
            }
        };
        events.push(ChangeEvent::LoadingStateChanged { loading: false });
        self.emit_all(&events);
        outcome
    }

    /// Clears the list and cursor; the next fetch starts from the beginning
    ///
    /// An in-flight fetch is not cancelled, its result is dropped on arrival.
    pub fn invalidate(&self) {
        let was_loading = {
            let mut state = self.lock();
            state.generation += 1;
            state.items.clear();
            let options = state.options.clone();
            state.cursor.reset(&options);
            state.last_error = None;
            let was_loading = state.loading;
            state.loading = false;
            info!(generation = state.generation, "List invalidated");
            was_loading
        };
        if was_loading {
            self.notifier
                .notify(&ChangeEvent::LoadingStateChanged { loading: false });
        }
        self.notifier.notify(&ChangeEvent::FullReload);
    }

    /// Replaces the fetch options (filter, sort, paging) and invalidates
    pub fn set_options(&self, options: FetchOptions) {
        self.lock().options = options;
        self.invalidate();
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Persists a new record and inserts it into the list
    ///
    /// With an order attribute the record lands at its sorted position,
    /// otherwise it is appended.
    pub async fn insert_item(&self, record: Record) -> Result<MutationOutcome, StoreError> {
        self.mutate(OperationKind::Insert, record).await
    }

    /// Persists changes to a record and updates it in the list
    pub async fn update_item(&self, record: Record) -> Result<MutationOutcome, StoreError> {
        self.require_identity(OperationKind::Update, &record)?;
        self.mutate(OperationKind::Update, record).await
    }

    /// Removes a record from the store and from the list
    pub async fn delete_item(&self, record: Record) -> Result<MutationOutcome, StoreError> {
        self.require_identity(OperationKind::Delete, &record)?;
        self.mutate(OperationKind::Delete, record).await
    }

    /// Replays queued mutations in order
    ///
    /// Stops at the first one that still cannot reach the backend; it and
    /// everything after it stay queued. Returns how many succeeded.
    pub async fn retry_pending(&self) -> usize {
        let mut queue = std::mem::take(&mut self.lock().pending);
        if queue.is_empty() {
            return 0;
        }
        info!(queued = queue.len(), "Retrying deferred operations");

        let mut succeeded = 0;
        while let Some(op) = queue.pop_front() {
            let generation = self.generation();
            match self.execute(op.kind, &op.record).await {
                Ok(saved) => {
                    succeeded += 1;
                    self.apply_saved(op.kind, saved.unwrap_or(op.record), generation);
                }
                Err(error) if error.is_retryable() => {
                    debug!(
                        remaining = queue.len() + 1,
                        "Backend still unreachable, keeping operations queued"
                    );
                    queue.push_front(op);
                    break;
                }
                Err(error) => {
                    warn!(kind = %op.kind, error = %error, "Deferred operation failed");
                    self.notifier.notify(&ChangeEvent::mutation_failed(
                        op.kind,
                        op.record.id().cloned(),
                        error,
                    ));
                }
            }
        }

        if !queue.is_empty() {
            // Survivors go ahead of anything deferred while retrying
            let mut state = self.lock();
            while let Some(op) = queue.pop_back() {
                state.pending.push_front(op);
            }
        }
        succeeded
    }

    fn require_identity(&self, kind: OperationKind, record: &Record) -> Result<(), StoreError> {
        if record.id().is_some() {
            return Ok(());
        }
        let error =
            StoreError::ValidationRejected(format!("cannot {kind} a record without an identifier"));
        self.notifier
            .notify(&ChangeEvent::mutation_failed(kind, None, error.clone()));
        Err(error)
    }

    async fn execute(
        &self,
        kind: OperationKind,
        record: &Record,
    ) -> Result<Option<Record>, StoreError> {
        match kind {
            OperationKind::Insert => self.store.insert(record).await.map(Some),
            OperationKind::Update => self.store.update(record).await.map(Some),
            OperationKind::Delete => self.store.delete(record).await.map(|()| None),
        }
    }

    async fn mutate(
        &self,
        kind: OperationKind,
        record: Record,
    ) -> Result<MutationOutcome, StoreError> {
        let generation = self.generation();
        debug!(%kind, record_id = ?record.id(), "Submitting mutation");
        match self.execute(kind, &record).await {
            Ok(saved) => Ok(self.apply_saved(kind, saved.unwrap_or(record), generation)),
            Err(error) => self.handle_failure(kind, record, error),
        }
    }

    fn no_connection_policy(&self, kind: OperationKind, record: &Record) -> NoConnectionPolicy {
        match &self.no_connection_handler {
            Some(handler) => handler(kind, record),
            None => self.policies.for_kind(kind),
        }
    }

    fn handle_failure(
        &self,
        kind: OperationKind,
        record: Record,
        error: StoreError,
    ) -> Result<MutationOutcome, StoreError> {
        let record_id = record.id().cloned();
        if error.is_retryable()
            && self.no_connection_policy(kind, &record) == NoConnectionPolicy::RetryLater
        {
            self.lock()
                .pending
                .push_back(PendingOperation { kind, record });
            info!(%kind, record_id = ?record_id, "Backend unreachable, operation deferred");
            self.notifier
                .notify(&ChangeEvent::OperationDeferred { kind, record_id });
            return Ok(MutationOutcome::Deferred);
        }

        warn!(%kind, record_id = ?record_id, error = %error, "Mutation failed");
        self.notifier
            .notify(&ChangeEvent::mutation_failed(kind, record_id, error.clone()));
        Err(error)
    }

    /// Apply a persisted mutation to the list unless it was invalidated since
    /// `generation`
    fn apply_saved(&self, kind: OperationKind, record: Record, generation: u64) -> MutationOutcome {
        let mut events = Vec::new();
        let outcome = {
            let mut state = self.lock();
            if state.generation != generation {
                debug!(%kind, "Mutation completed after invalidation, list left untouched");
                return MutationOutcome::Discarded;
            }
            let order_attribute = state.options.order_attribute.clone();
            let order_attribute = order_attribute.as_deref();
            // Unloaded records follow the loaded ones in the backend
            let open_ended = state.cursor.has_more();
            let existing = state.index_of(&record);

            match (kind, existing) {
                (OperationKind::Insert, None) => {
                    let index = insertion_index(&state.items, &record, order_attribute);
                    let loaded = state.items.len();
                    if order_attribute.is_some() && open_ended && index == loaded {
                        debug!("Inserted record sorts after the loaded page, left to paging");
                        MutationOutcome::Persisted
                    } else {
                        state.items.insert(index, record);
                        if index < loaded {
                            state.cursor.shift_offset(1);
                        }
                        events.push(ChangeEvent::ItemInserted { index });
                        MutationOutcome::Applied { index }
                    }
                }
                // Insert already delivered by a concurrent fetch
                (OperationKind::Insert, Some(old)) | (OperationKind::Update, Some(old)) => {
                    match replace_item(
                        &mut state.items,
                        old,
                        record,
                        order_attribute,
                        open_ended,
                        &mut events,
                    ) {
                        Some(index) => MutationOutcome::Applied { index },
                        None => {
                            state.cursor.shift_offset(-1);
                            MutationOutcome::Persisted
                        }
                    }
                }
                (OperationKind::Delete, Some(index)) => {
                    state.items.remove(index);
                    state.cursor.shift_offset(-1);
                    events.push(ChangeEvent::ItemRemoved { index });
                    MutationOutcome::Applied { index }
                }
                (OperationKind::Update, None) | (OperationKind::Delete, None) => {
                    MutationOutcome::Persisted
                }
            }
        };
        self.emit_all(&events);
        outcome
    }
}
