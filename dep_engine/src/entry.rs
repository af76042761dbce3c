use std::sync::Arc;

use crate::key::{Key, Value};
use crate::rule::Rule;
use crate::task::TaskId;

/// A handle into the coordinator-owned rule table: the node index of a `petgraph` graph whose
/// nodes are `RuleInfo` records. Rules and tasks never hold pointers to each other directly —
/// only integer handles into tables the coordinator owns — so the graph can be mutated (a rule
/// dropped, a rule added dynamically mid-scan) without invalidating anything a task is holding.
pub type EntryId = petgraph::stable_graph::NodeIndex<u32>;

/// A rule's state within the current build. At most one non-terminal state applies to a rule at
/// any instant within a build; the state is reset to `NeedsToRun` (or recomputed fresh) at the
/// start of the next build that actually visits the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    /// Never computed, or explicitly invalidated; needs a task and has not been scanned.
    NeedsToRun,
    /// The scanner is currently walking this rule's recorded dependency list.
    IsScanning,
    /// The scanner found a stale (or invalid) prior result; needs a task.
    NeedsToRunAfterScan,
    /// A task has been created and dispatched via `start`, but has not yet reached
    /// `inputs_available`.
    InProgressScanning,
    /// The task's inputs have all been delivered and it is performing its own computation.
    InProgressComputing,
    /// `computed_at` equals the current iteration: the rule's value is final for this build.
    IsComplete,
}

/// The engine's per-rule mutable record.
pub struct RuleInfo {
    pub rule: Arc<dyn Rule>,
    pub value: Option<Value>,
    /// Iteration at which `value` was produced (by running the rule's task).
    pub built_at: u64,
    /// Iteration at which `value` was last confirmed current, whether by reuse or fresh
    /// computation.
    pub computed_at: u64,
    /// The ordered list of keys this rule depended on during its most recorded build: the
    /// concatenation of requested and discovered dependencies, in request/discovery order, with
    /// duplicates forbidden.
    pub dependencies: Vec<Key>,
    pub state: RuleState,
    pub task: Option<TaskId>,
    /// The iteration during which `state` was last meaningfully set by the scanner or the
    /// obtain path. Distinguishes "decided `NeedsToRun` earlier this build, don't redo the work"
    /// from "defaulted to `NeedsToRun` because this rule has never been examined" — the latter
    /// must fall through to a real decision rather than short-circuiting.
    pub last_examined: u64,
    /// Whether this rule's record has been consulted against the attached database yet. The
    /// persistence bridge reads a rule's persisted record lazily, the first time a build
    /// considers it — this flag makes that a one-shot operation per rule per engine
    /// lifetime rather than per build.
    pub db_loaded: bool,
}

impl RuleInfo {
    pub fn new(rule: Arc<dyn Rule>) -> Self {
        RuleInfo {
            rule,
            value: None,
            built_at: 0,
            computed_at: 0,
            dependencies: Vec::new(),
            state: RuleState::NeedsToRun,
            task: None,
            last_examined: 0,
            db_loaded: false,
        }
    }

    /// Restore a rule's record from a persisted result, so that a rebuild in a fresh process
    /// with the same database can still reuse it without recomputation.
    pub fn load_persisted(&mut self, value: Value, built_at: u64, computed_at: u64, dependencies: Vec<Key>) {
        self.value = Some(value);
        self.built_at = built_at;
        self.computed_at = computed_at;
        self.dependencies = dependencies;
        self.db_loaded = true;
    }

    pub fn is_current(&self, iteration: u64) -> bool {
        self.computed_at == iteration
    }
}
