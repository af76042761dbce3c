use petgraph::stable_graph::StableGraph;

use crate::entry::{EntryId, RuleInfo, RuleState};
use crate::error::EngineError;
use crate::key::Key;

/// The result of scanning a rule: whether its recorded value is still current, or whether it
/// needs a task. Scanning never itself creates a `TaskInfo` — see the module docs below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Fresh,
    Stale,
}

/// What `scan` needs from its caller: mutable access to the rule table, and a way to resolve a
/// dependency key to an `EntryId`, registering a fresh (and, if a database is attached, lazily
/// loaded) `RuleInfo` the first time a build sees that key.
///
/// Implemented by `Engine` itself. Splitting this out as a narrow trait (rather than handing
/// `scan` the whole `Engine`) is what lets the function recurse into a dependency's dependencies
/// without the borrow checker seeing two live mutable borrows of the same `Engine`: each call
/// only ever holds one `&mut dyn EntryResolver` at a time, reborrowed for each step.
pub trait EntryResolver {
    fn graph_mut(&mut self) -> &mut StableGraph<RuleInfo, ()>;
    fn ensure_entry(&mut self, key: &Key) -> Result<EntryId, EngineError>;
}

/// The read-only traversal that decides whether a rule is still current.
///
/// This function embodies the engine's single hardest invariant, "no speculative execution": a
/// rule named in another rule's recorded dependency list must never have its task started merely
/// because `scan` walked past it. `scan` only ever *reads* `RuleInfo` state and the prior
/// dependency list, recursing into a dependency's own prior dependencies to decide whether *it*
/// looks stale — and if a dependency turns out to need a task, `scan` records that fact
/// (`NeedsToRunAfterScan`) and returns `Stale` without creating one. The task is created later,
/// lazily, only if some task's callback actually calls `request` for that exact key (see
/// `Engine::obtain`). A dependency that no longer gets requested this build — because an earlier
/// sibling input changed and the requesting task takes a different path — is therefore never
/// run.
pub fn scan(
    id: EntryId,
    resolver: &mut dyn EntryResolver,
    iteration: u64,
) -> Result<ScanOutcome, EngineError> {
    {
        let info = &resolver.graph_mut()[id];
        if info.is_current(iteration) {
            return Ok(ScanOutcome::Fresh);
        }
        if info.last_examined == iteration {
            match info.state {
                RuleState::NeedsToRun | RuleState::NeedsToRunAfterScan => return Ok(ScanOutcome::Stale),
                RuleState::IsScanning => {
                    log::warn!(
                        "cyclic prior dependency list encountered while scanning; treating as stale"
                    );
                    return Ok(ScanOutcome::Stale);
                }
                _ => {}
            }
        }
    }

    // First time this rule is examined in the current iteration: any `task` handle is left over
    // from an earlier build (completed or aborted) and no longer corresponds to anything live.
    resolver.graph_mut()[id].task = None;

    if resolver.graph_mut()[id].value.is_none() {
        let info = &mut resolver.graph_mut()[id];
        info.state = RuleState::NeedsToRun;
        info.last_examined = iteration;
        return Ok(ScanOutcome::Stale);
    }

    let valid = {
        let info = &resolver.graph_mut()[id];
        info.rule.is_result_valid(info.value.as_ref().expect("checked above"))
    };
    if !valid {
        let info = &mut resolver.graph_mut()[id];
        info.state = RuleState::NeedsToRunAfterScan;
        info.last_examined = iteration;
        return Ok(ScanOutcome::Stale);
    }

    let (built_at, deps) = {
        let info = &mut resolver.graph_mut()[id];
        info.state = RuleState::IsScanning;
        info.last_examined = iteration;
        (info.built_at, info.dependencies.clone())
    };

    for dep_key in &deps {
        let dep_id = resolver.ensure_entry(dep_key)?;
        let outcome = scan(dep_id, resolver, iteration)?;
        let dep_is_stale = match outcome {
            ScanOutcome::Stale => true,
            ScanOutcome::Fresh => resolver.graph_mut()[dep_id].built_at > built_at,
        };
        if dep_is_stale {
            let info = &mut resolver.graph_mut()[id];
            info.state = RuleState::NeedsToRunAfterScan;
            info.last_examined = iteration;
            return Ok(ScanOutcome::Stale);
        }
    }

    let info = &mut resolver.graph_mut()[id];
    info.computed_at = iteration;
    info.state = RuleState::IsComplete;
    info.last_examined = iteration;
    Ok(ScanOutcome::Fresh)
}
