use std::fmt;

use crate::key::Key;

/// The engine's error taxonomy.
///
/// No `thiserror`/`anyhow` here: error enums stay small and enumerable, with a hand-written
/// `Display` impl, rather than routed through a generic error-context crate.
#[derive(Debug)]
pub enum EngineError {
    /// The delegate's `lookup_rule` could not produce a rule for a demanded key.
    RuleLookupFailed(Key),
    /// A rule was registered under a key that already has a rule.
    DuplicateRule(Key),
    /// A dependency cycle was detected among rules active in the current build.
    Cycle(Vec<Key>),
    /// The persistence bridge's underlying database returned an I/O error.
    Database(String),
    /// `Engine::attach_db` was called with a schema version that does not match the stored one,
    /// and `recreate_unmatched_version` was not set.
    SchemaMismatch { expected: u32, found: u32 },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::RuleLookupFailed(key) => {
                write!(f, "no rule registered for key {key:?}, and lookup_rule did not resolve it")
            }
            EngineError::DuplicateRule(key) => {
                write!(f, "a rule is already registered for key {key:?}")
            }
            EngineError::Cycle(chain) => {
                write!(f, "dependency cycle detected: {chain:?}")
            }
            EngineError::Database(message) => write!(f, "database error: {message}"),
            EngineError::SchemaMismatch { expected, found } => write!(
                f,
                "database schema version mismatch: engine expected {expected}, found {found}"
            ),
        }
    }
}

impl std::error::Error for EngineError {}
