use crate::key::{Key, Value};
use crate::task::Task;

/// The static description of how to compute a key's value and judge its continued validity.
///
/// A `Rule` is registered once (eagerly via `Engine::add_rule`, or dynamically via
/// `Delegate::lookup_rule`) and then reused across every build for the life of the engine: it is
/// a factory, not a computation. Each activation gets a fresh `Task` from `create_task`.
pub trait Rule: Send + Sync {
    /// The key this rule computes. Must be stable for the lifetime of the rule.
    fn key(&self) -> &Key;

    /// Produce a fresh `Task` for one computation of this rule.
    fn create_task(&self) -> Box<dyn Task>;

    /// Decide whether a previously computed value may still be reused even though none of this
    /// rule's recorded dependencies were found stale by the scanner.
    ///
    /// The default always accepts the prior value. Rules that must force a rebuild on every
    /// build regardless of their dependencies (an external clock, an environment probe) return
    /// `false` unconditionally.
    fn is_result_valid(&self, prior_value: &Value) -> bool {
        let _ = prior_value;
        true
    }
}
