use std::sync::Arc;

use crate::executor_queue::ExecutionQueue;
use crate::key::Key;
use crate::rule::Rule;

/// Callbacks the embedder must supply to an `Engine`.
///
/// Every method is invoked from the coordinator thread (inside `Engine::build`), never
/// concurrently with another `Delegate` call, so implementations do not need their own
/// synchronization for state they only touch from here.
pub trait Delegate: Send + Sync {
    /// Resolve a rule for a key that has no eagerly-registered rule. Mandatory for any build that
    /// demands a dynamic key; the returned rule's `key()` must equal `key`. The result is cached
    /// in the rule registry before it is used, so this is called at most once per key per engine
    /// lifetime.
    fn lookup_rule(&self, key: &Key) -> Option<Arc<dyn Rule>>;

    /// A dependency cycle was detected among rules active in the current build. `chain` lists the
    /// offending rules in the order the cycle detector's DFS discovered them, from the
    /// newly-added edge back to the in-progress ancestor it closes a loop with.
    fn cycle_detected(&self, chain: &[Key]);

    /// A fatal, non-cycle error occurred (lookup failure, database I/O error). The current build
    /// is being abandoned; the engine itself remains usable for a subsequent `build` call.
    fn error(&self, message: &str);

    /// Construct the parallel executor used to run this engine's tasks.
    fn create_execution_queue(&self) -> Arc<dyn ExecutionQueue>;
}
