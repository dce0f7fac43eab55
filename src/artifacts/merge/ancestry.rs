//! Best common ancestor search
//!
//! A best common ancestor of X and Y is a common ancestor that is not an
//! ancestor of any other common ancestor. The search runs in two phases:
//!
//! 1. Paint down from both commits, newest first. A commit reached from both
//!    sides is a candidate; everything below a candidate is marked stale.
//! 2. Drop candidates reachable from another candidate.
//!
//! Criss-cross histories can leave several best ancestors. They are ordered
//! newest first (ties broken by id) and [`merge_base`] takes the first.
//!
//! Build with the `debug_merge` feature to trace every painting step.

use crate::areas::database::Database;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use bitflags::bitflags;
use chrono::{DateTime, FixedOffset};
use std::cell::RefCell;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

macro_rules! trace_merge {
    ($($arg:tt)*) => {
        #[cfg(feature = "debug_merge")]
        {
            tracing::trace!($($arg)*);
        }
    };
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct Paint: u8 {
        const SOURCE = 0b0001;
        const TARGET = 0b0010;
        const BOTH = Self::SOURCE.bits() | Self::TARGET.bits();
        const STALE = 0b0100;
        const RESULT = 0b1000;
    }
}

/// Parents and commit time of one commit
#[derive(Debug, Clone)]
pub struct CommitNode {
    pub parents: Vec<ObjectId>,
    pub timestamp: DateTime<FixedOffset>,
}

/// Read access to the commit graph
pub trait CommitGraph {
    fn commit_node(&self, oid: &ObjectId) -> anyhow::Result<CommitNode>;
}

impl CommitGraph for Database {
    fn commit_node(&self, oid: &ObjectId) -> anyhow::Result<CommitNode> {
        let commit = self
            .parse_object_as_commit(oid)?
            .with_context(|| format!("{oid} is not a commit"))?;

        Ok(CommitNode {
            parents: commit.parents().to_vec(),
            timestamp: commit.timestamp(),
        })
    }
}

/// Memoizing walker over a [`CommitGraph`]
pub struct AncestorFinder<'g, G: CommitGraph + ?Sized> {
    graph: &'g G,
    nodes: RefCell<HashMap<ObjectId, CommitNode>>,
}

impl<'g, G: CommitGraph + ?Sized> AncestorFinder<'g, G> {
    pub fn new(graph: &'g G) -> Self {
        AncestorFinder {
            graph,
            nodes: RefCell::new(HashMap::new()),
        }
    }

    fn node(&self, oid: &ObjectId) -> anyhow::Result<CommitNode> {
        if let Some(node) = self.nodes.borrow().get(oid) {
            return Ok(node.clone());
        }

        let node = self.graph.commit_node(oid)?;
        self.nodes.borrow_mut().insert(*oid, node.clone());
        Ok(node)
    }

    /// Candidates visited from both sides that nothing stale reached
    fn paint_down(&self, source: &ObjectId, target: &ObjectId) -> anyhow::Result<Vec<ObjectId>> {
        if source == target {
            return Ok(vec![*source]);
        }

        let mut paint: HashMap<ObjectId, Paint> = HashMap::new();
        let mut queue = BinaryHeap::new();

        for (oid, side) in [(source, Paint::SOURCE), (target, Paint::TARGET)] {
            paint.insert(*oid, side);
            queue.push((self.node(oid)?.timestamp, *oid));
        }

        while let Some((_, oid)) = queue.pop() {
            let mut flags = paint.get(&oid).copied().unwrap_or(Paint::empty())
                & (Paint::BOTH | Paint::STALE);

            trace_merge!(commit = %oid, paint = ?flags, "painting");

            if flags == Paint::BOTH {
                paint.entry(oid).and_modify(|state| *state |= Paint::RESULT);
                flags |= Paint::STALE;
            }

            for parent in self.node(&oid)?.parents {
                let state = paint.entry(parent).or_insert(Paint::empty());
                if state.contains(flags) {
                    continue;
                }
                *state |= flags;
                queue.push((self.node(&parent)?.timestamp, parent));
            }
        }

        let mut candidates = paint
            .into_iter()
            .filter(|(_, state)| state.contains(Paint::RESULT) && !state.contains(Paint::STALE))
            .map(|(oid, _)| oid)
            .collect::<Vec<_>>();
        candidates.sort();

        trace_merge!(candidates = ?candidates, "common ancestors");
        Ok(candidates)
    }

    /// Whether `ancestor` is reachable from `descendant` through parent links
    pub fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> anyhow::Result<bool> {
        let mut seen = HashSet::from([*descendant]);
        let mut pending = VecDeque::from([*descendant]);

        while let Some(oid) = pending.pop_front() {
            if oid == *ancestor {
                return Ok(true);
            }
            for parent in self.node(&oid)?.parents {
                if seen.insert(parent) {
                    pending.push_back(parent);
                }
            }
        }

        Ok(false)
    }

    /// All best common ancestors, newest first
    pub fn best_common_ancestors(
        &self,
        source: &ObjectId,
        target: &ObjectId,
    ) -> anyhow::Result<Vec<ObjectId>> {
        let candidates = self.paint_down(source, target)?;

        let mut best = Vec::new();
        for candidate in &candidates {
            let mut redundant = false;
            for other in candidates.iter().filter(|other| *other != candidate) {
                if self.is_ancestor(candidate, other)? {
                    redundant = true;
                    break;
                }
            }
            if !redundant {
                best.push(*candidate);
            }
        }

        let mut dated = best
            .into_iter()
            .map(|oid| Ok((self.node(&oid)?.timestamp, oid)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        dated.sort_by(|(a_time, a_oid), (b_time, b_oid)| b_time.cmp(a_time).then(a_oid.cmp(b_oid)));

        trace_merge!(best = ?dated, "best common ancestors");
        Ok(dated.into_iter().map(|(_, oid)| oid).collect())
    }
}

/// The merge base of two commits, `None` for unrelated histories
pub fn merge_base<G: CommitGraph + ?Sized>(
    graph: &G,
    source: &ObjectId,
    target: &ObjectId,
) -> anyhow::Result<Option<ObjectId>> {
    Ok(AncestorFinder::new(graph)
        .best_common_ancestors(source, target)?
        .into_iter()
        .next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    /// Commits named by a short label, one hour apart in insertion order
    #[derive(Default)]
    struct MemoryGraph {
        nodes: HashMap<ObjectId, CommitNode>,
    }

    impl MemoryGraph {
        fn commit(&mut self, name: &str, parents: &[&str]) -> &mut Self {
            let timestamp = FixedOffset::east_opt(0)
                .unwrap()
                .timestamp_opt(1_640_995_200 + self.nodes.len() as i64 * 3600, 0)
                .unwrap();
            self.nodes.insert(
                oid(name),
                CommitNode {
                    parents: parents.iter().map(|parent| oid(parent)).collect(),
                    timestamp,
                },
            );
            self
        }
    }

    impl CommitGraph for MemoryGraph {
        fn commit_node(&self, oid: &ObjectId) -> anyhow::Result<CommitNode> {
            self.nodes
                .get(oid)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("unknown commit {oid}"))
        }
    }

    fn oid(name: &str) -> ObjectId {
        let mut hex = name
            .bytes()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        hex.extend(std::iter::repeat_n('0', 40usize.saturating_sub(hex.len())));
        hex.truncate(40);
        ObjectId::try_parse(hex).unwrap()
    }

    #[fixture]
    fn criss_cross() -> MemoryGraph {
        //     A
        //    / \
        //   B   C
        //   |\ /|
        //   | X |
        //   |/ \|
        //   D   E
        //   |   |
        //   F   G
        let mut graph = MemoryGraph::default();
        graph
            .commit("A", &[])
            .commit("B", &["A"])
            .commit("C", &["A"])
            .commit("D", &["B", "C"])
            .commit("E", &["C", "B"])
            .commit("F", &["D"])
            .commit("G", &["E"]);
        graph
    }

    #[rstest]
    #[case("B", "D", Some("B"))]
    #[case("D", "B", Some("B"))]
    #[case("F", "F", Some("F"))]
    #[case("B", "C", Some("A"))]
    fn finds_the_closest_shared_commit(
        #[case] source: &str,
        #[case] target: &str,
        #[case] expected: Option<&str>,
    ) {
        let mut graph = MemoryGraph::default();
        graph
            .commit("A", &[])
            .commit("B", &["A"])
            .commit("C", &["A"])
            .commit("D", &["B"])
            .commit("F", &["D"]);

        assert_eq!(
            merge_base(&graph, &oid(source), &oid(target)).unwrap(),
            expected.map(oid)
        );
    }

    #[rstest]
    fn criss_cross_histories_have_two_best_ancestors(criss_cross: MemoryGraph) {
        let finder = AncestorFinder::new(&criss_cross);

        let best = finder.best_common_ancestors(&oid("F"), &oid("G")).unwrap();

        assert_eq!(best, vec![oid("C"), oid("B")]);
        assert_eq!(
            merge_base(&criss_cross, &oid("F"), &oid("G")).unwrap(),
            Some(oid("C"))
        );
    }

    #[test]
    fn unrelated_histories_have_no_base() {
        let mut graph = MemoryGraph::default();
        graph.commit("A", &[]).commit("Z", &[]);

        assert_eq!(merge_base(&graph, &oid("A"), &oid("Z")).unwrap(), None);
    }

    #[rstest]
    fn ancestry_follows_every_parent(criss_cross: MemoryGraph) {
        let finder = AncestorFinder::new(&criss_cross);

        assert!(finder.is_ancestor(&oid("C"), &oid("F")).unwrap());
        assert!(!finder.is_ancestor(&oid("F"), &oid("C")).unwrap());
    }
}
