use crate::key::{Key, Value};

/// A persisted rule result, as read back from the database at the start of a build that first
/// considers that rule.
#[derive(Debug, Clone)]
pub struct RuleRecord {
    pub value: Value,
    pub built_at: u64,
    pub computed_at: u64,
    pub dependencies: Vec<Key>,
}

/// The persistence bridge's contract with an external store.
///
/// The engine treats the database as an opaque key -> record store and demands only atomic
/// per-key writes and sequential consistency of reads with respect to prior writes by the same
/// engine; it never interprets the storage format itself. `dep_engine_lmdb` is a reference
/// implementation.
pub trait Database: Send + Sync {
    fn lookup_rule_result(&self, key: &Key) -> Result<Option<RuleRecord>, String>;

    /// Atomic per-key write.
    fn set_rule_result(
        &self,
        key: &Key,
        value: &Value,
        built_at: u64,
        computed_at: u64,
        dependencies: &[Key],
    ) -> Result<(), String>;

    fn get_current_iteration(&self) -> Result<u64, String>;

    fn set_current_iteration(&self, iteration: u64) -> Result<(), String>;

    /// The schema version this store was created with, if it has ever been written to.
    fn schema_version(&self) -> Result<Option<u32>, String>;

    /// Record the schema version, or rewrite the store fresh under a new one. Called only once,
    /// by `Engine::attach_db`.
    fn set_schema_version(&self, version: u32) -> Result<(), String>;
}
