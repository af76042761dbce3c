use std::sync::mpsc::Sender;
use std::sync::Arc;

use fnv::{FnvHashMap, FnvHashSet};
use parking_lot::Mutex;

use crate::entry::EntryId;
use crate::key::{Key, Value};

/// `input_id` values above this are reserved for the engine's own bookkeeping and must never be
/// passed to `TaskContext::request`.
pub const MAX_INPUT_ID: u32 = u32::MAX - 16;

/// A handle identifying one activation of a rule. Opaque outside the engine; used only to
/// correlate messages sent back to the coordinator with the `TaskInfo` record they belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

/// The Task contract exposed by a rule's computation: three callbacks invoked by the engine, in
/// the order `start -> (provide_value * k) -> inputs_available -> complete`.
///
/// Implementations run on whatever thread the execution queue chose for them; the engine
/// guarantees that at most one of these callbacks is active for a given task at any instant, so
/// `&mut self` is sound even though the `Task` is shared with the coordinator by `Box` alone.
pub trait Task: Send {
    /// Task entry point. Typically issues the task's initial `request`s via `ctx`.
    fn start(&mut self, ctx: &TaskContext);

    /// One delivery per prior `request`, in the order inputs complete (not in request order).
    fn provide_value(&mut self, ctx: &TaskContext, input_id: u32, key: &Key, value: &Value);

    /// Delivered exactly once, after every input requested during `start`/`provide_value` has
    /// been provided. The task may now perform its actual computation and call `ctx.complete`.
    fn inputs_available(&mut self, ctx: &TaskContext);
}

/// Messages a running task's callbacks send back to the coordinator. `request` and `must_follow`
/// may only be called synchronously from within `start`/`provide_value`; `discovered_dependency`
/// and `complete` are safe to call from any thread, including after the callback that triggered
/// the work has returned.
#[derive(Debug)]
pub enum Message {
    Request { task_id: TaskId, key: Key, input_id: u32 },
    MustFollow { task_id: TaskId, key: Key },
    DiscoveredDependency { task_id: TaskId, key: Key },
    Complete { task_id: TaskId, value: Value },
    /// Sent by the coordinator itself, never by `TaskContext`: pushed onto the same channel right
    /// after a dispatched `start` or `provide_value` callback returns, so that requests issued
    /// synchronously within that callback are already visible (same-channel FIFO ordering) by the
    /// time the coordinator checks whether the task has gone quiescent and owes an
    /// `inputs_available` delivery.
    CallbackReturned { task_id: TaskId },
}

/// The task-side operations a running task uses to talk back to the engine, bound to one
/// activation. Cheap to clone: cloning duplicates
/// only the channel handle, so a task may stash a clone and use it from a future or a spawned
/// thread after the callback that created it has returned.
#[derive(Clone)]
pub struct TaskContext {
    task_id: TaskId,
    tx: Sender<Message>,
}

impl TaskContext {
    pub(crate) fn new(task_id: TaskId, tx: Sender<Message>) -> Self {
        TaskContext { task_id, tx }
    }

    /// Declare that this task requires the value of `key`, tagged with `input_id` so the
    /// eventual `provide_value` delivery can be correlated back to this request.
    ///
    /// Requesting the same `input_id` twice for one task, or using an `input_id` above
    /// `MAX_INPUT_ID`, is a programmer error; like the reference engine this is specified to
    /// assert rather than to be recoverable.
    pub fn request(&self, key: Key, input_id: u32) {
        assert!(
            input_id <= MAX_INPUT_ID,
            "input_id {input_id} exceeds the reserved maximum {MAX_INPUT_ID}"
        );
        let _ = self.tx.send(Message::Request { task_id: self.task_id, key, input_id });
    }

    /// Declare an ordering-only dependency: this task must not complete until `key`'s
    /// computation has completed, but no value is delivered for it.
    pub fn must_follow(&self, key: Key) {
        let _ = self.tx.send(Message::MustFollow { task_id: self.task_id, key });
    }

    /// Declare a post-hoc input dependency discovered during execution. Only valid after
    /// `inputs_available` has been delivered; the caller must serialize its own calls to this
    /// method for a single task, but may call it from any thread.
    pub fn discovered_dependency(&self, key: Key) {
        let _ = self.tx.send(Message::DiscoveredDependency { task_id: self.task_id, key });
    }

    /// Finish the task, supplying its output. Thread-safe; may be called at most once.
    pub fn complete(&self, value: Value) {
        let _ = self.tx.send(Message::Complete { task_id: self.task_id, value });
    }
}

/// The engine's record of an active computation: created when the scanner decides a rule must
/// run, destroyed when the task completes and its value has been recorded.
///
/// `task` is behind a `Mutex` rather than a bare `Box`: dispatching a callback clones the `Arc`
/// and locks it on the worker thread the queue picked. A second callback for the same task
/// dispatched while the first is still running simply blocks on the same lock, which is what
/// gives "only one callback active for that task at that moment" without the coordinator having
/// to track per-task busy flags itself.
pub struct TaskInfo {
    pub task: Arc<Mutex<Box<dyn Task>>>,
    pub rule_id: EntryId,
    /// `input_id -> key` for every outstanding or delivered request, used to validate
    /// `provide_value` deliveries and reject duplicate `input_id`s.
    pub requested: FnvHashMap<u32, Key>,
    /// Requested keys in call order, for the ordered dependency list built at completion.
    pub requested_order: Vec<Key>,
    /// Count of requests made that have not yet had a matching `provide_value` delivered.
    pub outstanding: usize,
    /// Count of `must_follow` targets that have not yet completed.
    pub must_follow_outstanding: usize,
    pub must_follow: Vec<Key>,
    /// Discovered dependencies in call order, for the ordered concatenation required by
    /// "dependency-list freshness".
    pub discovered: Vec<Key>,
    discovered_seen: FnvHashSet<Key>,
    pub inputs_available_sent: bool,
    /// Set once `start`'s dispatched callback has returned. Guards quiescence checks triggered by
    /// a `must_follow` target completing: until `start` itself has returned, the task may still be
    /// about to issue more requests or must-follows that would make an early quiescence check
    /// wrong.
    pub started: bool,
}

impl TaskInfo {
    pub fn new(task: Box<dyn Task>, rule_id: EntryId) -> Self {
        TaskInfo {
            task: Arc::new(Mutex::new(task)),
            rule_id,
            requested: FnvHashMap::default(),
            requested_order: Vec::new(),
            outstanding: 0,
            must_follow_outstanding: 0,
            must_follow: Vec::new(),
            discovered: Vec::new(),
            discovered_seen: FnvHashSet::default(),
            inputs_available_sent: false,
            started: false,
        }
    }

    /// Record a discovered dependency, returning `false` if it had already been recorded this
    /// activation (discovered dependencies are deduplicated, unlike requested ones which are a
    /// programmer error to duplicate).
    pub fn record_discovered(&mut self, key: Key) -> bool {
        if self.discovered_seen.insert(key.clone()) {
            self.discovered.push(key);
            true
        } else {
            false
        }
    }

    /// True once every request and `must_follow` issued so far has been satisfied. `start` or
    /// `provide_value` may still issue more before returning; the coordinator only checks this
    /// after a callback has run to completion.
    pub fn is_quiescent(&self) -> bool {
        self.outstanding == 0 && self.must_follow_outstanding == 0
    }
}
