use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use fnv::FnvHashMap;
use parking_lot::Mutex;
use petgraph::stable_graph::StableGraph;

use crate::cycle::ActiveWaitGraph;
use crate::db::Database;
use crate::delegate::Delegate;
use crate::entry::{EntryId, RuleInfo, RuleState};
use crate::error::EngineError;
use crate::executor_queue::ExecutionQueue;
use crate::key::{Key, Value};
use crate::registry::RuleRegistry;
use crate::rule::Rule;
use crate::scanner::{scan, EntryResolver};
use crate::task::{Message, TaskId, TaskInfo};

/// The attached persistence backend together with the schema version it was opened under.
struct DbHandle {
    db: Arc<dyn Database>,
    schema_version: u32,
}

/// State that survives across `build` calls for the life of an `Engine`: the rule registry, the
/// `RuleInfo` graph, the database handle, and the iteration counter. Everything specific to one
/// in-progress build (the `TaskInfo` table, the active-wait graph, the completion channel) lives
/// only in `BuildRun`, which borrows this.
struct Inner {
    registry: RuleRegistry,
    graph: StableGraph<RuleInfo, ()>,
    nodes: FnvHashMap<Key, EntryId>,
    db: Option<DbHandle>,
    /// The iteration number of the last build that ran to completion. `build` uses
    /// `iteration + 1` for its own attempt and only commits it here (and to the database) if that
    /// attempt succeeds so an aborted build does not advance the counter.
    iteration: u64,
}

impl Inner {
    /// Return the `EntryId` for `key`, creating (and, if a database is attached, loading) a fresh
    /// `RuleInfo` the first time any build considers this key.
    fn ensure_entry(&mut self, key: &Key, delegate: &dyn Delegate) -> Result<EntryId, EngineError> {
        if let Some(&id) = self.nodes.get(key) {
            return Ok(id);
        }
        let rule = self.registry.get_or_lookup(key, delegate)?;
        let mut info = RuleInfo::new(rule);
        if let Some(handle) = &self.db {
            if let Some(record) = handle
                .db
                .lookup_rule_result(key)
                .map_err(EngineError::Database)?
            {
                info.load_persisted(record.value, record.built_at, record.computed_at, record.dependencies);
            } else {
                info.db_loaded = true;
            }
        }
        let id = self.graph.add_node(info);
        self.nodes.insert(key.clone(), id);
        Ok(id)
    }
}

/// Narrow view of `Inner` handed to `scan`: lets the scanner recurse into a dependency's own
/// prior dependency list without the borrow checker seeing two live `&mut Engine` borrows (see
/// `scanner::EntryResolver`'s doc comment for why this split exists).
struct ScanResolver<'a> {
    inner: &'a mut Inner,
    delegate: &'a dyn Delegate,
}

impl EntryResolver for ScanResolver<'_> {
    fn graph_mut(&mut self) -> &mut StableGraph<RuleInfo, ()> {
        &mut self.inner.graph
    }

    fn ensure_entry(&mut self, key: &Key) -> Result<EntryId, EngineError> {
        self.inner.ensure_entry(key, self.delegate)
    }
}

/// The dependency engine: computes the value of named keys by running client-supplied rules,
/// memoizing results in a persistent database, and recomputing only those values whose inputs
/// have changed since the previous run.
///
/// `Engine::new` plays the role of the external interface's `create`; there is no explicit
/// `destroy` (see `DESIGN.md`'s note on this) — dropping the `Engine` releases everything, the
/// idiomatic Rust equivalent.
pub struct Engine {
    delegate: Arc<dyn Delegate>,
    inner: Mutex<Inner>,
}

impl Engine {
    pub fn new(delegate: Arc<dyn Delegate>) -> Self {
        Engine {
            delegate,
            inner: Mutex::new(Inner {
                registry: RuleRegistry::new(),
                graph: StableGraph::new(),
                nodes: FnvHashMap::default(),
                db: None,
                iteration: 0,
            }),
        }
    }

    /// Register a rule eagerly. Returns `DuplicateRule` if a rule is already registered for
    /// its key.
    pub fn add_rule(&self, rule: Arc<dyn Rule>) -> Result<(), EngineError> {
        self.inner.lock().registry.add_rule(rule)
    }

    /// Attach a persistent database. If the store already has results under a
    /// different schema version, either rewrites it fresh (`recreate_unmatched_version`) or fails
    /// with `SchemaMismatch`. Restores the in-memory iteration counter from the store so that a
    /// new `Engine` attached to the same database continues numbering from where the last one
    /// left off.
    pub fn attach_db(
        &self,
        db: Arc<dyn Database>,
        schema_version: u32,
        recreate_unmatched_version: bool,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();
        if let Some(existing) = &inner.db {
            if existing.schema_version != schema_version {
                log::warn!(
                    "replacing attached database (opened at schema version {}) with one opened at version {schema_version}",
                    existing.schema_version
                );
            }
        }
        let stored_version = db.schema_version().map_err(EngineError::Database)?;
        match stored_version {
            Some(found) if found != schema_version => {
                if !recreate_unmatched_version {
                    return Err(EngineError::SchemaMismatch { expected: schema_version, found });
                }
                log::warn!(
                    "database schema version {found} does not match engine's {schema_version}; recreating"
                );
            }
            _ => {}
        }
        db.set_schema_version(schema_version).map_err(EngineError::Database)?;
        let iteration = db.get_current_iteration().map_err(EngineError::Database)?;
        inner.iteration = iteration;
        inner.db = Some(DbHandle { db, schema_version });
        Ok(())
    }

    /// Run (or re-run) the dependency engine against `target`, returning its current value.
    /// Blocks the calling thread until the build completes, fails, or a cycle is detected.
    pub fn build(&self, target: Key) -> Result<Value, EngineError> {
        let mut inner = self.inner.lock();
        let queue = self.delegate.create_execution_queue();
        let iteration = inner.iteration + 1;
        let (tx, rx) = mpsc::channel();

        let result = {
            let mut run = BuildRun {
                inner: &mut inner,
                delegate: self.delegate.as_ref(),
                queue: queue.as_ref(),
                iteration,
                tasks: FnvHashMap::default(),
                next_task_id: 0,
                wait_graph: ActiveWaitGraph::new(),
                waiting: FnvHashMap::default(),
                must_follow_waiting: FnvHashMap::default(),
                tx,
                rx,
            };
            run.execute(&target)
        };

        match &result {
            Ok(_) => {
                inner.iteration = iteration;
                if let Some(handle) = &inner.db {
                    if let Err(e) = handle.db.set_current_iteration(iteration) {
                        self.delegate.error(&e);
                        return Err(EngineError::Database(e));
                    }
                }
            }
            Err(EngineError::Cycle(chain)) => {
                self.delegate.cycle_detected(chain);
            }
            Err(other) => {
                self.delegate.error(&other.to_string());
            }
        }
        result
    }
}

/// Transient, per-build coordinator state: the execution driver and the request-handling
/// half of the dependency scanner that decides, lazily, when a stale rule's task actually
/// gets created.
struct BuildRun<'a> {
    inner: &'a mut Inner,
    delegate: &'a dyn Delegate,
    queue: &'a dyn ExecutionQueue,
    iteration: u64,
    tasks: FnvHashMap<TaskId, TaskInfo>,
    next_task_id: u64,
    wait_graph: ActiveWaitGraph,
    /// Requesters (`task_id`, `input_id`) waiting for the entry's value to become available.
    waiting: FnvHashMap<EntryId, Vec<(TaskId, u32)>>,
    /// Tasks whose `must_follow` on this entry has not yet been satisfied.
    must_follow_waiting: FnvHashMap<EntryId, Vec<TaskId>>,
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

impl BuildRun<'_> {
    /// The execution driver's main loop: obtain the target, then drain completion events
    /// until it is current.
    fn execute(&mut self, target: &Key) -> Result<Value, EngineError> {
        let target_id = self.obtain(target)?;
        loop {
            if self.inner.graph[target_id].is_current(self.iteration) {
                return Ok(self
                    .inner
                    .graph[target_id]
                    .value
                    .clone()
                    .expect("a current RuleInfo always carries a value"));
            }
            let msg = self
                .rx
                .recv()
                .expect("the channel cannot disconnect while any TaskContext clone is still reachable from a live task");
            self.handle_message(msg)?;
        }
    }

    /// Ensure `key` has been scanned this iteration and, if the scanner found it stale, that its
    /// task has been started. This is the only place a task is ever created: either `key` is the
    /// direct build target (called from `execute`), or some running task actually `request`ed or
    /// `must_follow`ed it (called from `handle_message`). A key that merely appears in another
    /// rule's recorded dependency list, but is never requested this build, is never passed here —
    /// that is the "no speculative execution" invariant.
    fn obtain(&mut self, key: &Key) -> Result<EntryId, EngineError> {
        let id = self.inner.ensure_entry(key, self.delegate)?;
        if self.inner.graph[id].last_examined != self.iteration {
            let mut resolver = ScanResolver { inner: &mut *self.inner, delegate: self.delegate };
            scan(id, &mut resolver, self.iteration)?;
        }
        let info = &self.inner.graph[id];
        let needs_task =
            matches!(info.state, RuleState::NeedsToRun | RuleState::NeedsToRunAfterScan) && info.task.is_none();
        if needs_task {
            self.start_task(id)?;
        }
        Ok(id)
    }

    fn start_task(&mut self, id: EntryId) -> Result<(), EngineError> {
        let rule = self.inner.graph[id].rule.clone();
        let task = rule.create_task();
        let task_id = TaskId(self.next_task_id);
        self.next_task_id += 1;

        self.tasks.insert(task_id, TaskInfo::new(task, id));
        {
            let info = &mut self.inner.graph[id];
            info.state = RuleState::InProgressScanning;
            info.task = Some(task_id);
        }
        self.dispatch_start(task_id);
        Ok(())
    }

    fn dispatch_start(&self, task_id: TaskId) {
        let task_info = &self.tasks[&task_id];
        let task_arc = task_info.task.clone();
        let ctx = crate::task::TaskContext::new(task_id, self.tx.clone());
        let callback_tx = self.tx.clone();
        self.queue.dispatch(Box::new(move || {
            task_arc.lock().start(&ctx);
            let _ = callback_tx.send(Message::CallbackReturned { task_id });
        }));
    }

    fn dispatch_provide_value(&self, task_id: TaskId, input_id: u32, key: Key, value: Value) {
        let task_info = &self.tasks[&task_id];
        let task_arc = task_info.task.clone();
        let ctx = crate::task::TaskContext::new(task_id, self.tx.clone());
        let callback_tx = self.tx.clone();
        self.queue.dispatch(Box::new(move || {
            task_arc.lock().provide_value(&ctx, input_id, &key, &value);
            let _ = callback_tx.send(Message::CallbackReturned { task_id });
        }));
    }

    fn dispatch_inputs_available(&mut self, task_id: TaskId) {
        {
            let task_info = self.tasks.get_mut(&task_id).expect("task disappeared before inputs_available");
            task_info.inputs_available_sent = true;
        }
        if let Some(info) = self.tasks.get(&task_id) {
            let rule_id = info.rule_id;
            self.inner.graph[rule_id].state = RuleState::InProgressComputing;
        }
        let task_info = &self.tasks[&task_id];
        let task_arc = task_info.task.clone();
        let ctx = crate::task::TaskContext::new(task_id, self.tx.clone());
        self.queue.dispatch(Box::new(move || {
            task_arc.lock().inputs_available(&ctx);
        }));
    }

    /// After a must-follow completion or a callback's return, check whether a task has gone
    /// quiescent and is now owed its `inputs_available` delivery.
    fn maybe_send_inputs_available(&mut self, task_id: TaskId) {
        let ready = matches!(self.tasks.get(&task_id), Some(info) if info.started && info.is_quiescent() && !info.inputs_available_sent);
        if ready {
            self.dispatch_inputs_available(task_id);
        }
    }

    fn handle_message(&mut self, msg: Message) -> Result<(), EngineError> {
        match msg {
            Message::Request { task_id, key, input_id } => self.handle_request(task_id, key, input_id),
            Message::MustFollow { task_id, key } => self.handle_must_follow(task_id, key),
            Message::DiscoveredDependency { task_id, key } => {
                if let Some(info) = self.tasks.get_mut(&task_id) {
                    info.record_discovered(key);
                }
                Ok(())
            }
            Message::Complete { task_id, value } => self.handle_complete(task_id, value),
            Message::CallbackReturned { task_id } => {
                if let Some(info) = self.tasks.get_mut(&task_id) {
                    info.started = true;
                }
                self.maybe_send_inputs_available(task_id);
                Ok(())
            }
        }
    }

    fn handle_request(&mut self, task_id: TaskId, key: Key, input_id: u32) -> Result<(), EngineError> {
        let requester_entry = match self.tasks.get(&task_id) {
            Some(info) => info.rule_id,
            None => return Ok(()), // task already completed/abandoned; stale message, ignore
        };
        {
            let info = self.tasks.get(&task_id).unwrap();
            assert!(
                !info.requested.contains_key(&input_id),
                "input_id {input_id} requested twice by the same task"
            );
        }

        let resolved_id = self.obtain(&key)?;

        {
            let info = self.tasks.get_mut(&task_id).unwrap();
            info.requested.insert(input_id, key.clone());
            info.requested_order.push(key.clone());
        }

        if self.inner.graph[resolved_id].is_current(self.iteration) {
            // Already current this build (e.g. a shared dependency another requester already
            // completed, or a dependency the scanner itself confirmed fresh): deliver straight
            // away without ever touching `outstanding`, since no later `handle_complete` waiter
            // pass will run for this entry to bring the count back down.
            let value = self.inner.graph[resolved_id]
                .value
                .clone()
                .expect("a current entry always carries a value");
            self.dispatch_provide_value(task_id, input_id, key, value);
        } else {
            if let Err(chain) = self.wait_graph.try_add_edge(requester_entry, resolved_id) {
                return Err(EngineError::Cycle(self.chain_to_keys(&chain)));
            }
            if let Some(info) = self.tasks.get_mut(&task_id) {
                info.outstanding += 1;
            }
            self.waiting.entry(resolved_id).or_default().push((task_id, input_id));
        }
        Ok(())
    }

    fn handle_must_follow(&mut self, task_id: TaskId, key: Key) -> Result<(), EngineError> {
        let requester_entry = match self.tasks.get(&task_id) {
            Some(info) => info.rule_id,
            None => return Ok(()),
        };
        let resolved_id = self.obtain(&key)?;

        if self.inner.graph[resolved_id].is_current(self.iteration) {
            // Already complete: the ordering constraint is trivially satisfied.
            return Ok(());
        }

        if let Err(chain) = self.wait_graph.try_add_edge(requester_entry, resolved_id) {
            return Err(EngineError::Cycle(self.chain_to_keys(&chain)));
        }
        if let Some(info) = self.tasks.get_mut(&task_id) {
            info.must_follow.push(key);
            info.must_follow_outstanding += 1;
        }
        self.must_follow_waiting.entry(resolved_id).or_default().push(task_id);
        Ok(())
    }

    fn handle_complete(&mut self, task_id: TaskId, value: Value) -> Result<(), EngineError> {
        let Some(task_info) = self.tasks.remove(&task_id) else {
            return Ok(()); // duplicate/stale completion; `complete` is documented "at most once"
        };
        let entry_id = task_info.rule_id;
        let key = self.inner.graph[entry_id].rule.key().clone();

        let dependencies = Self::merge_dependencies(task_info.requested_order, task_info.discovered);

        {
            let info = &mut self.inner.graph[entry_id];
            info.value = Some(value.clone());
            info.built_at = self.iteration;
            info.computed_at = self.iteration;
            info.dependencies = dependencies.clone();
            info.state = RuleState::IsComplete;
            info.task = None;
            info.last_examined = self.iteration;
        }

        if let Some(handle) = &self.inner.db {
            handle
                .db
                .set_rule_result(&key, &value, self.iteration, self.iteration, &dependencies)
                .map_err(EngineError::Database)?;
        }

        self.wait_graph.remove_node(entry_id);

        for (waiter_id, input_id) in self.waiting.remove(&entry_id).unwrap_or_default() {
            if let Some(info) = self.tasks.get_mut(&waiter_id) {
                info.outstanding = info.outstanding.saturating_sub(1);
            }
            self.dispatch_provide_value(waiter_id, input_id, key.clone(), value.clone());
        }

        for waiter_id in self.must_follow_waiting.remove(&entry_id).unwrap_or_default() {
            if let Some(info) = self.tasks.get_mut(&waiter_id) {
                info.must_follow_outstanding = info.must_follow_outstanding.saturating_sub(1);
            }
            self.maybe_send_inputs_available(waiter_id);
        }

        Ok(())
    }

    /// `R.dependencies`: the ordered, de-duplicated concatenation of requested and
    /// discovered keys, in the order they were issued. Requested keys are already unique (a
    /// repeated `input_id` is a programmer error caught earlier); de-duplication here guards
    /// against a key being both requested and later rediscovered.
    fn merge_dependencies(requested: Vec<Key>, discovered: Vec<Key>) -> Vec<Key> {
        let mut seen = fnv::FnvHashSet::default();
        let mut out = Vec::with_capacity(requested.len() + discovered.len());
        for key in requested.into_iter().chain(discovered) {
            if seen.insert(key.clone()) {
                out.push(key);
            }
        }
        out
    }

    fn chain_to_keys(&self, chain: &[EntryId]) -> Vec<Key> {
        chain.iter().map(|&id| self.inner.graph[id].rule.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::task::{Task, TaskContext};

    struct QueueIsDirectCall;
    impl ExecutionQueue for QueueIsDirectCall {
        fn dispatch(&self, job: Box<dyn FnOnce() + Send>) {
            job();
        }
    }

    struct TestDelegate {
        rules: StdMutex<FnvHashMap<Key, Arc<dyn Rule>>>,
        cycles: StdMutex<Vec<Vec<Key>>>,
        errors: StdMutex<Vec<String>>,
    }

    impl TestDelegate {
        fn new() -> Arc<Self> {
            Arc::new(TestDelegate {
                rules: StdMutex::new(FnvHashMap::default()),
                cycles: StdMutex::new(Vec::new()),
                errors: StdMutex::new(Vec::new()),
            })
        }
    }

    impl Delegate for TestDelegate {
        fn lookup_rule(&self, key: &Key) -> Option<Arc<dyn Rule>> {
            self.rules.lock().unwrap().get(key).cloned()
        }
        fn cycle_detected(&self, chain: &[Key]) {
            self.cycles.lock().unwrap().push(chain.to_vec());
        }
        fn error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
        fn create_execution_queue(&self) -> Arc<dyn ExecutionQueue> {
            Arc::new(QueueIsDirectCall)
        }
    }

    /// A rule with no inputs that always returns the same fixed value, counting its executions.
    struct ConstRule {
        key: Key,
        value: Value,
        runs: Arc<AtomicU32>,
        always_rebuild: bool,
    }

    struct ConstTask {
        value: Value,
        runs: Arc<AtomicU32>,
    }

    impl Task for ConstTask {
        fn start(&mut self, ctx: &TaskContext) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            ctx.complete(self.value.clone());
        }
        fn provide_value(&mut self, _ctx: &TaskContext, _input_id: u32, _key: &Key, _value: &Value) {
            unreachable!("ConstRule has no inputs")
        }
        fn inputs_available(&mut self, _ctx: &TaskContext) {
            unreachable!("ConstRule completes in start")
        }
    }

    impl Rule for ConstRule {
        fn key(&self) -> &Key {
            &self.key
        }
        fn create_task(&self) -> Box<dyn Task> {
            Box::new(ConstTask { value: self.value.clone(), runs: self.runs.clone() })
        }
        fn is_result_valid(&self, _prior_value: &Value) -> bool {
            !self.always_rebuild
        }
    }

    /// Multiplies the values of two requested keys together (ASCII-decimal encoded).
    struct ProductRule {
        key: Key,
        left: Key,
        right: Key,
        runs: Arc<AtomicU32>,
    }

    struct ProductTask {
        left: Key,
        right: Key,
        runs: Arc<AtomicU32>,
        left_value: Option<i64>,
        right_value: Option<i64>,
    }

    fn parse(value: &Value) -> i64 {
        std::str::from_utf8(value.as_bytes()).unwrap().parse().unwrap()
    }

    impl Task for ProductTask {
        fn start(&mut self, ctx: &TaskContext) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            ctx.request(self.left.clone(), 0);
            ctx.request(self.right.clone(), 1);
        }
        fn provide_value(&mut self, _ctx: &TaskContext, input_id: u32, _key: &Key, value: &Value) {
            match input_id {
                0 => self.left_value = Some(parse(value)),
                1 => self.right_value = Some(parse(value)),
                _ => unreachable!(),
            }
        }
        fn inputs_available(&mut self, ctx: &TaskContext) {
            let product = self.left_value.unwrap() * self.right_value.unwrap();
            ctx.complete(Value::from(product.to_string().into_bytes()));
        }
    }

    impl Rule for ProductRule {
        fn key(&self) -> &Key {
            &self.key
        }
        fn create_task(&self) -> Box<dyn Task> {
            Box::new(ProductTask {
                left: self.left.clone(),
                right: self.right.clone(),
                runs: self.runs.clone(),
                left_value: None,
                right_value: None,
            })
        }
    }

    #[test]
    fn linear_dependency_builds_and_is_idempotent() {
        // A=[]->2, B=[]->3, C=[A,B]->A*B: a linear diamond of dependencies.
        let delegate = TestDelegate::new();
        let engine = Engine::new(delegate);

        let a_runs = Arc::new(AtomicU32::new(0));
        let b_runs = Arc::new(AtomicU32::new(0));
        let c_runs = Arc::new(AtomicU32::new(0));

        engine
            .add_rule(Arc::new(ConstRule {
                key: Key::from("A"),
                value: Value::from("2"),
                runs: a_runs.clone(),
                always_rebuild: false,
            }))
            .unwrap();
        engine
            .add_rule(Arc::new(ConstRule {
                key: Key::from("B"),
                value: Value::from("3"),
                runs: b_runs.clone(),
                always_rebuild: false,
            }))
            .unwrap();
        engine
            .add_rule(Arc::new(ProductRule {
                key: Key::from("C"),
                left: Key::from("A"),
                right: Key::from("B"),
                runs: c_runs.clone(),
            }))
            .unwrap();

        let result = engine.build(Key::from("C")).unwrap();
        assert_eq!(result.as_bytes(), b"6");
        assert_eq!(a_runs.load(Ordering::SeqCst), 1);
        assert_eq!(b_runs.load(Ordering::SeqCst), 1);
        assert_eq!(c_runs.load(Ordering::SeqCst), 1);

        let second = engine.build(Key::from("C")).unwrap();
        assert_eq!(second.as_bytes(), b"6");
        assert_eq!(a_runs.load(Ordering::SeqCst), 1, "A must not re-run on an unchanged rebuild");
        assert_eq!(b_runs.load(Ordering::SeqCst), 1, "B must not re-run on an unchanged rebuild");
        assert_eq!(c_runs.load(Ordering::SeqCst), 1, "C must not re-run on an unchanged rebuild");
    }

    /// Rule `A=[B]`, `B=[A]`: requesting either should report a cycle rather than hang.
    struct CycleRule {
        key: Key,
        requests: Key,
    }
    struct CycleTask {
        requests: Key,
    }
    impl Task for CycleTask {
        fn start(&mut self, ctx: &TaskContext) {
            ctx.request(self.requests.clone(), 0);
        }
        fn provide_value(&mut self, _ctx: &TaskContext, _input_id: u32, _key: &Key, _value: &Value) {
            unreachable!("cycle must be detected before any value is delivered")
        }
        fn inputs_available(&mut self, _ctx: &TaskContext) {
            unreachable!("cycle must be detected before inputs_available")
        }
    }
    impl Rule for CycleRule {
        fn key(&self) -> &Key {
            &self.key
        }
        fn create_task(&self) -> Box<dyn Task> {
            Box::new(CycleTask { requests: self.requests.clone() })
        }
    }

    #[test]
    fn cycle_is_detected_and_reported() {
        let delegate = TestDelegate::new();
        let engine = Engine::new(delegate.clone());
        engine
            .add_rule(Arc::new(CycleRule { key: Key::from("A"), requests: Key::from("B") }))
            .unwrap();
        engine
            .add_rule(Arc::new(CycleRule { key: Key::from("B"), requests: Key::from("A") }))
            .unwrap();

        let err = engine.build(Key::from("A")).unwrap_err();
        assert!(matches!(err, EngineError::Cycle(_)));
        let cycles = delegate.cycles.lock().unwrap();
        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].contains(&Key::from("A")));
        assert!(cycles[0].contains(&Key::from("B")));
    }
}
