use fnv::{FnvHashMap, FnvHashSet};

use crate::entry::EntryId;

/// The transient "who is waiting on whom" graph the coordinator maintains for the duration of a
/// build. Distinct from `RuleInfo::dependencies` (the persisted, last-successful-build
/// dependency list): this graph only ever holds edges for rules that are currently in progress,
/// and is cleared at the start of every build.
///
/// An edge `from -> to` means the rule at `from` has an outstanding request (or `must_follow`) on
/// the rule at `to` that has not yet completed this build. `must_follow` edges participate in
/// cycle detection exactly like `request` edges: an ordering-only wait can deadlock just as
/// surely as a value dependency, so it must be caught the same way (see `DESIGN.md`).
///
/// A fresh graph is constructed per build (see `BuildRun::execute`'s caller); there is no
/// carry-over state to clear between builds.
#[derive(Default)]
pub struct ActiveWaitGraph {
    edges: FnvHashMap<EntryId, Vec<EntryId>>,
}

impl ActiveWaitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove_node(&mut self, id: EntryId) {
        self.edges.remove(&id);
        for targets in self.edges.values_mut() {
            targets.retain(|&t| t != id);
        }
    }

    /// Try to add the wait edge `from -> to`. If doing so would close a cycle (`to` can already
    /// reach `from`), the edge is not added and the offending chain is returned instead, in DFS
    /// discovery order starting from `from`.
    pub fn try_add_edge(&mut self, from: EntryId, to: EntryId) -> Result<(), Vec<EntryId>> {
        if from == to {
            return Err(vec![from, to]);
        }
        if let Some(path) = self.find_path(to, from) {
            let mut chain = vec![from];
            chain.extend(path);
            return Err(chain);
        }
        self.edges.entry(from).or_default().push(to);
        Ok(())
    }

    /// DFS from `start` looking for `goal`; on success returns the path `start ..= goal`.
    fn find_path(&self, start: EntryId, goal: EntryId) -> Option<Vec<EntryId>> {
        let mut visited = FnvHashSet::default();
        let mut parent: FnvHashMap<EntryId, EntryId> = FnvHashMap::default();
        let mut stack = vec![start];
        visited.insert(start);

        while let Some(node) = stack.pop() {
            if node == goal {
                let mut path = vec![node];
                let mut cur = node;
                while let Some(&p) = parent.get(&cur) {
                    path.push(p);
                    cur = p;
                }
                path.reverse();
                return Some(path);
            }
            if let Some(children) = self.edges.get(&node) {
                for &child in children {
                    if visited.insert(child) {
                        parent.insert(child, node);
                        stack.push(child);
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use petgraph::stable_graph::StableGraph;

    use super::*;

    fn ids(n: usize) -> (StableGraph<(), ()>, Vec<EntryId>) {
        let mut g = StableGraph::new();
        let ids = (0..n).map(|_| g.add_node(())).collect();
        (g, ids)
    }

    #[test]
    fn direct_cycle_detected() {
        let (_g, ids) = ids(2);
        let mut graph = ActiveWaitGraph::new();
        graph.try_add_edge(ids[0], ids[1]).unwrap();
        let err = graph.try_add_edge(ids[1], ids[0]).unwrap_err();
        assert_eq!(err, vec![ids[1], ids[0]]);
    }

    #[test]
    fn indirect_cycle_detected() {
        let (_g, ids) = ids(3);
        let mut graph = ActiveWaitGraph::new();
        graph.try_add_edge(ids[0], ids[1]).unwrap();
        graph.try_add_edge(ids[1], ids[2]).unwrap();
        let err = graph.try_add_edge(ids[2], ids[0]).unwrap_err();
        assert_eq!(err, vec![ids[2], ids[0], ids[1], ids[2]]);
    }

    #[test]
    fn unrelated_edges_are_fine() {
        let (_g, ids) = ids(4);
        let mut graph = ActiveWaitGraph::new();
        graph.try_add_edge(ids[0], ids[1]).unwrap();
        graph.try_add_edge(ids[2], ids[3]).unwrap();
        assert!(graph.try_add_edge(ids[1], ids[3]).is_ok());
    }
}
