//! Component F: the correlation registry (spec.md §4.F).
//!
//! Maps a correlation id to a pending async handle. Only the conductor
//! thread ever mutates an entry; callers only read through an
//! [`AsyncHandle`] (see `conductor.rs`) whose validity is checked against
//! this registry on every poll, the ownership model spec.md's design notes
//! call "correlation ids as ownership keys".

use crate::resources::{Counter, ExclusivePublication, Image, Publication, Subscription};
use std::collections::HashMap;

/// What kind of resource a pending handle will resolve to. `Close` entries
/// exist only to track the in-flight `REMOVE_*` acknowledgement; nothing
/// currently blocks on it resolving, but the table entry still occupies a
/// correlation id until it is cleared by the registry holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Publication,
    ExclusivePublication,
    Subscription,
    Counter,
    Close,
}

/// The part of an async-add request the conductor needs to remember once
/// the driver replies, beyond what the `ON_*_READY` event itself carries —
/// spec.md §3's "user_data" field of a correlation registry entry.
/// `ON_SUBSCRIPTION_READY`, in particular, does not echo back `stream_id`,
/// so the conductor must have stashed it here at request time.
#[derive(Debug, Clone)]
pub enum RequestContext {
    Publication { stream_id: i32 },
    ExclusivePublication { stream_id: i32 },
    Subscription { stream_id: i32 },
    Counter,
    Close,
}

/// Terminal or pending state of a registry entry. Transitions are one-way:
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, PartialEq)]
pub enum HandleState {
    Pending,
    Ready,
    Errored { error_code: i32, error_message: String },
    TimedOut,
    Closed,
}

impl HandleState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HandleState::Pending)
    }
}

/// The materialized resource a `Ready` handle resolved to, if any. `Close`
/// handles and anything that didn't reach `Ready` carry `None`.
#[derive(Clone)]
pub enum ResolvedResource {
    Publication(Publication),
    ExclusivePublication(ExclusivePublication),
    Subscription(Subscription),
    Counter(Counter),
}

/// One entry in the correlation registry.
pub struct PendingHandle {
    pub correlation_id: i64,
    pub kind: HandleKind,
    pub state: HandleState,
    pub deadline_ns: i64,
    pub resolved: Option<ResolvedResource>,
    pub context: RequestContext,
    /// Set once a `Ready`/terminal state has been delivered to a poller, so
    /// a second poll reports "nothing new" instead of re-delivering the
    /// resource (spec.md §4.I: "subsequent polls return 0").
    pub delivered: bool,
}

impl PendingHandle {
    pub fn new(correlation_id: i64, kind: HandleKind, deadline_ns: i64, context: RequestContext) -> Self {
        Self {
            correlation_id,
            kind,
            state: HandleState::Pending,
            deadline_ns,
            resolved: None,
            context,
            delivered: false,
        }
    }
}

/// Keyed store of in-flight and just-resolved handles.
///
/// Cardinality is expected to stay in the hundreds (spec.md §4.F), so a
/// plain `HashMap` is the right tool; there is no need for the open-
/// addressed/intrusive map spec.md mentions as an alternative at that scale.
#[derive(Default)]
pub struct CorrelationRegistry {
    entries: HashMap<i64, PendingHandle>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: PendingHandle) {
        self.entries.insert(handle.correlation_id, handle);
    }

    pub fn get(&self, correlation_id: i64) -> Option<&PendingHandle> {
        self.entries.get(&correlation_id)
    }

    pub fn get_mut(&mut self, correlation_id: i64) -> Option<&mut PendingHandle> {
        self.entries.get_mut(&correlation_id)
    }

    pub fn remove(&mut self, correlation_id: i64) -> Option<PendingHandle> {
        self.entries.remove(&correlation_id)
    }

    /// Transitions every still-`Pending` handle whose deadline has passed to
    /// `TimedOut`, invoking `f` once per handle transitioned (spec.md §4.I
    /// step 2, P6).
    pub fn for_each_expired<F>(&mut self, now_ns: i64, mut f: F)
    where
        F: FnMut(&PendingHandle),
    {
        for handle in self.entries.values_mut() {
            if matches!(handle.state, HandleState::Pending) && handle.deadline_ns <= now_ns {
                handle.state = HandleState::TimedOut;
                f(handle);
            }
        }
    }

    /// Forces every entry to `Closed`, for conductor shutdown (spec.md
    /// §4.I's `on_close`: "marks outstanding handles Closed").
    pub fn close_all(&mut self) {
        for handle in self.entries.values_mut() {
            handle.state = HandleState::Closed;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
