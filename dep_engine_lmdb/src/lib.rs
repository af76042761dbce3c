// Licensed under the Apache License, Version 2.0 (see LICENSE).

#![deny(warnings)]
#![deny(
    clippy::all,
    clippy::default_trait_access,
    clippy::expl_impl_clone_on_copy,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding
)]
#![allow(clippy::match_ref_pats)]
#![allow(
    clippy::len_without_is_empty,
    clippy::redundant_field_names,
    clippy::too_many_arguments
)]
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]
#![allow(clippy::mutex_atomic)]

//! An LMDB-backed implementation of `dep_engine::Database`.
//!
//! One `Environment` holds two sub-databases: `rules`, keyed by a rule's raw key bytes and
//! storing its encoded `RuleRecord`, and `meta`, a handful of fixed keys holding the schema
//! version and current iteration counter. Unlike a content-addressed store, results here are
//! mutable (a rule's record is overwritten every time it completes), so there is no sharding and
//! no lease/GC machinery: just one environment and straightforward read/write transactions.

use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use dep_engine::{Database, Key, RuleRecord, Value};
use lmdb::{Database as LmdbDb, DatabaseFlags, Environment, EnvironmentFlags, Transaction, WriteFlags};

const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";
const CURRENT_ITERATION_KEY: &[u8] = b"current_iteration";

/// An LMDB environment holding the persisted rule table and a small metadata table.
pub struct LmdbDatabase {
    env: Environment,
    rules_db: LmdbDb,
    meta_db: LmdbDb,
}

impl LmdbDatabase {
    pub fn new(path: &Path, max_size: usize) -> Result<Self, String> {
        std::fs::create_dir_all(path)
            .map_err(|e| format!("Error creating directory {path:?}: {e}"))?;
        let env = Environment::new()
            // Matches the reference persistence layer: this is a local, single-writer cache, so
            // losing the last few transactions on a crash is an acceptable trade for not forcing
            // fsync on every write, and NO_TLS keeps read transactions from leaking per-thread.
            .set_flags(EnvironmentFlags::NO_SYNC | EnvironmentFlags::NO_TLS)
            .set_max_dbs(2)
            .set_map_size(max_size)
            .open(path)
            .map_err(|e| format!("Error opening database at {path:?}: {e}"))?;
        let rules_db = env
            .create_db(Some("rules"), DatabaseFlags::empty())
            .map_err(|e| format!("Error creating/opening rules database at {path:?}: {e}"))?;
        let meta_db = env
            .create_db(Some("meta"), DatabaseFlags::empty())
            .map_err(|e| format!("Error creating/opening meta database at {path:?}: {e}"))?;
        Ok(LmdbDatabase { env, rules_db, meta_db })
    }

    fn read_u32_meta(&self, key: &[u8]) -> Result<Option<u32>, String> {
        let txn = self
            .env
            .begin_ro_txn()
            .map_err(|e| format!("Error beginning read transaction: {e}"))?;
        match txn.get(self.meta_db, &key) {
            Ok(bytes) if bytes.len() == 4 => {
                let mut buf = [0_u8; 4];
                buf.copy_from_slice(bytes);
                Ok(Some(u32::from_le_bytes(buf)))
            }
            Ok(bytes) => Err(format!(
                "corrupt metadata record for {key:?}: expected 4 bytes, found {}",
                bytes.len()
            )),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(format!("Error reading metadata {key:?}: {e}")),
        }
    }

    fn read_u64_meta(&self, key: &[u8]) -> Result<Option<u64>, String> {
        let txn = self
            .env
            .begin_ro_txn()
            .map_err(|e| format!("Error beginning read transaction: {e}"))?;
        match txn.get(self.meta_db, &key) {
            Ok(bytes) if bytes.len() == 8 => {
                let mut buf = [0_u8; 8];
                buf.copy_from_slice(bytes);
                Ok(Some(u64::from_le_bytes(buf)))
            }
            Ok(bytes) => Err(format!(
                "corrupt metadata record for {key:?}: expected 8 bytes, found {}",
                bytes.len()
            )),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(format!("Error reading metadata {key:?}: {e}")),
        }
    }
}

impl Database for LmdbDatabase {
    fn lookup_rule_result(&self, key: &Key) -> Result<Option<RuleRecord>, String> {
        let txn = self
            .env
            .begin_ro_txn()
            .map_err(|e| format!("Error beginning read transaction: {e}"))?;
        match txn.get(self.rules_db, &key.as_bytes()) {
            Ok(bytes) => decode_record(bytes).map(Some),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(format!("Error reading rule result for {key:?}: {e}")),
        }
    }

    fn set_rule_result(
        &self,
        key: &Key,
        value: &Value,
        built_at: u64,
        computed_at: u64,
        dependencies: &[Key],
    ) -> Result<(), String> {
        let encoded = encode_record(value, built_at, computed_at, dependencies);
        let mut txn = self
            .env
            .begin_rw_txn()
            .map_err(|e| format!("Error beginning write transaction: {e}"))?;
        txn.put(self.rules_db, &key.as_bytes(), &encoded, WriteFlags::empty())
            .map_err(|e| format!("Error writing rule result for {key:?}: {e}"))?;
        txn.commit()
            .map_err(|e| format!("Error committing rule result for {key:?}: {e}"))
    }

    fn get_current_iteration(&self) -> Result<u64, String> {
        Ok(self.read_u64_meta(CURRENT_ITERATION_KEY)?.unwrap_or(0))
    }

    fn set_current_iteration(&self, iteration: u64) -> Result<(), String> {
        let mut txn = self
            .env
            .begin_rw_txn()
            .map_err(|e| format!("Error beginning write transaction: {e}"))?;
        txn.put(
            self.meta_db,
            &CURRENT_ITERATION_KEY,
            &iteration.to_le_bytes(),
            WriteFlags::empty(),
        )
        .map_err(|e| format!("Error writing current iteration: {e}"))?;
        txn.commit()
            .map_err(|e| format!("Error committing current iteration: {e}"))
    }

    fn schema_version(&self) -> Result<Option<u32>, String> {
        self.read_u32_meta(SCHEMA_VERSION_KEY)
    }

    fn set_schema_version(&self, version: u32) -> Result<(), String> {
        let existing = self.schema_version()?;
        let mut txn = self
            .env
            .begin_rw_txn()
            .map_err(|e| format!("Error beginning write transaction: {e}"))?;
        if existing != Some(version) {
            log::info!("recreating rule store under schema version {version} (was {existing:?})");
            txn.clear_db(self.rules_db)
                .map_err(|e| format!("Error clearing rule store: {e}"))?;
            txn.put(
                self.meta_db,
                &CURRENT_ITERATION_KEY,
                &0_u64.to_le_bytes(),
                WriteFlags::empty(),
            )
            .map_err(|e| format!("Error resetting current iteration: {e}"))?;
        }
        txn.put(
            self.meta_db,
            &SCHEMA_VERSION_KEY,
            &version.to_le_bytes(),
            WriteFlags::empty(),
        )
        .map_err(|e| format!("Error writing schema version: {e}"))?;
        txn.commit()
            .map_err(|e| format!("Error committing schema version: {e}"))
    }
}

/// `[built_at: u64 LE][computed_at: u64 LE][value_len: u32 LE][value bytes]`
/// `[dep_count: u32 LE]([dep_len: u32 LE][dep bytes])*`
fn encode_record(value: &Value, built_at: u64, computed_at: u64, dependencies: &[Key]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(24 + value.as_bytes().len());
    buf.write_u64::<LittleEndian>(built_at).expect("writes to a Vec never fail");
    buf.write_u64::<LittleEndian>(computed_at).expect("writes to a Vec never fail");
    buf.write_u32::<LittleEndian>(value.as_bytes().len() as u32)
        .expect("writes to a Vec never fail");
    buf.extend_from_slice(value.as_bytes());
    buf.write_u32::<LittleEndian>(dependencies.len() as u32)
        .expect("writes to a Vec never fail");
    for dep in dependencies {
        buf.write_u32::<LittleEndian>(dep.as_bytes().len() as u32)
            .expect("writes to a Vec never fail");
        buf.extend_from_slice(dep.as_bytes());
    }
    buf
}

fn decode_record(mut bytes: &[u8]) -> Result<RuleRecord, String> {
    let corrupt = || "corrupt rule record: truncated".to_string();
    let built_at = bytes.read_u64::<LittleEndian>().map_err(|_| corrupt())?;
    let computed_at = bytes.read_u64::<LittleEndian>().map_err(|_| corrupt())?;
    let value = read_length_prefixed(&mut bytes).map_err(|_| corrupt())?;
    let dep_count = bytes.read_u32::<LittleEndian>().map_err(|_| corrupt())? as usize;
    let mut dependencies = Vec::with_capacity(dep_count);
    for _ in 0..dep_count {
        dependencies.push(Key::from(read_length_prefixed(&mut bytes).map_err(|_| corrupt())?));
    }
    Ok(RuleRecord { value: Value::from(value), built_at, computed_at, dependencies })
}

fn read_length_prefixed(bytes: &mut &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let len = bytes.read_u32::<LittleEndian>()? as usize;
    if bytes.len() < len {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated"));
    }
    let (head, tail) = bytes.split_at(len);
    *bytes = tail;
    Ok(head.to_vec())
}
