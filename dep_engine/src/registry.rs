use std::sync::Arc;

use fnv::FnvHashMap;

use crate::delegate::Delegate;
use crate::error::EngineError;
use crate::key::Key;
use crate::rule::Rule;

/// The mapping from a `Key` to the `Rule` that computes it.
///
/// Rules registered eagerly via `Engine::add_rule` and rules resolved dynamically via
/// `Delegate::lookup_rule` live in the same table: once a dynamic lookup resolves a key, it is
/// cached here exactly like an eager registration, so it is never looked up twice for the same key
/// over the life of the engine.
#[derive(Default)]
pub struct RuleRegistry {
    rules: FnvHashMap<Key, Arc<dyn Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule eagerly. Duplicate registration for a key already present is a
    /// configuration error surfaced to the caller, not a fatal one.
    pub fn add_rule(&mut self, rule: Arc<dyn Rule>) -> Result<(), EngineError> {
        if self.rules.contains_key(rule.key()) {
            return Err(EngineError::DuplicateRule(rule.key().clone()));
        }
        self.rules.insert(rule.key().clone(), rule);
        Ok(())
    }

    /// Return the rule for `key`, consulting `delegate.lookup_rule` and caching the result if no
    /// rule was registered eagerly. Fails with `RuleLookupFailed` if the delegate cannot resolve
    /// it either: failure to resolve a key to a rule is a fatal engine error, not a recoverable one.
    pub fn get_or_lookup(
        &mut self,
        key: &Key,
        delegate: &dyn Delegate,
    ) -> Result<Arc<dyn Rule>, EngineError> {
        if let Some(rule) = self.rules.get(key) {
            return Ok(rule.clone());
        }
        let rule = delegate
            .lookup_rule(key)
            .ok_or_else(|| EngineError::RuleLookupFailed(key.clone()))?;
        assert_eq!(
            rule.key(),
            key,
            "Delegate::lookup_rule returned a rule for a different key than the one demanded"
        );
        self.rules.insert(key.clone(), rule.clone());
        Ok(rule)
    }
}
