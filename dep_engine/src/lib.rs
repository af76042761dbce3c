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

//! A general-purpose incremental dependency engine.
//!
//! Clients describe a computation as a set of `Rule`s, each producing the `Value` for one `Key`.
//! `Engine::build` computes the value of a requested key, running only the rules whose recorded
//! dependencies actually changed since the previous build, and memoizes everything in an
//! attached `Database` so that a later process can pick up from where this one left off.
//!
//! The moving parts, roughly bottom-up:
//!
//! - [`key`]: the `Key`/`Value` byte-string types.
//! - [`rule`] and [`task`]: the client-facing contract — a `Rule` produces a `Task`, which talks
//!   back to the engine through a `TaskContext`.
//! - [`delegate`]: the engine-facing contract a client implements once per `Engine`.
//! - [`entry`]: `RuleInfo`, the engine's own bookkeeping record for one rule.
//! - [`cycle`]: the active-wait graph used to detect a dependency cycle before it deadlocks.
//! - [`scanner`]: the read-only traversal that decides whether a recorded result is still fresh.
//! - [`registry`]: the `Key -> Rule` table, including dynamic lookups.
//! - [`executor_queue`]: the trait a task-dispatch backend implements (`task_executor` is the
//!   reference implementation).
//! - [`db`]: the trait a persistence backend implements (`dep_engine_lmdb` is the reference
//!   implementation).
//! - [`engine`]: `Engine`, which ties all of the above into the build coordinator.

mod cycle;
mod db;
mod delegate;
mod engine;
mod entry;
mod error;
mod executor_queue;
mod key;
mod registry;
mod rule;
mod scanner;
mod task;

pub use db::{Database, RuleRecord};
pub use delegate::Delegate;
pub use engine::Engine;
pub use error::EngineError;
pub use executor_queue::ExecutionQueue;
pub use key::{Key, Value};
pub use rule::Rule;
pub use task::{Message, Task, TaskContext, TaskId, MAX_INPUT_ID};
