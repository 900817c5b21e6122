// 🔍 Node Matcher - group equivalent nodes across networks
//
// Greedy and order-sensitive: a node joins the first group holding ANY
// member it matches, so under a non-transitive predicate a group is not
// guaranteed to be pairwise consistent. Positive outcomes are memoized per
// pair; a non-match is not stored, since grouping never retests it.

use crate::column_type::{Cell, Value};
use crate::error::{MergeError, MergeResult};
use crate::mapping::MatchingColumns;
use crate::network::{EntityId, EntitySpec, GraphId, GraphStore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

// ============================================================================
// EQUIVALENCE PREDICATE
// ============================================================================

/// A node as seen by a predicate: its graph and its id in that graph.
pub struct NodeRef<'a, G> {
    pub graph: &'a G,
    pub graph_id: GraphId,
    pub node: EntityId,
}

impl<G> Clone for NodeRef<'_, G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G> Copy for NodeRef<'_, G> {}

impl<G> NodeRef<'_, G> {
    pub fn spec(&self) -> EntitySpec {
        EntitySpec::new(self.graph_id, self.node)
    }
}

/// Decides whether two nodes denote the same entity.
///
/// An error aborts the whole merge.
pub trait EquivalencePredicate<G> {
    fn matches(&self, a: NodeRef<'_, G>, b: NodeRef<'_, G>) -> MergeResult<bool>;
}

impl<G, F> EquivalencePredicate<G> for F
where
    F: Fn(NodeRef<'_, G>, NodeRef<'_, G>) -> MergeResult<bool>,
{
    fn matches(&self, a: NodeRef<'_, G>, b: NodeRef<'_, G>) -> MergeResult<bool> {
        self(a, b)
    }
}

// ============================================================================
// COLUMN MATCHER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Same text
    #[default]
    Exact,

    /// Same text ignoring case
    CaseInsensitive,

    /// Numbers within `epsilon` of each other; non-numbers compare as text
    NumericTolerance { epsilon: f64 },
}

impl MatchStrategy {
    pub fn values_match(&self, a: &Value, b: &Value) -> bool {
        match self {
            MatchStrategy::Exact => a.to_string() == b.to_string(),
            MatchStrategy::CaseInsensitive => {
                a.to_string().to_lowercase() == b.to_string().to_lowercase()
            }
            MatchStrategy::NumericTolerance { epsilon } => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x - y).abs() <= *epsilon,
                _ => a.to_string() == b.to_string(),
            },
        }
    }

    /// Cells match when any pair of their values matches.
    pub fn cells_match(&self, a: &Cell, b: &Cell) -> bool {
        a.values()
            .iter()
            .any(|x| b.values().iter().any(|y| self.values_match(x, y)))
    }
}

/// Compares the configured matching column of each node's graph.
#[derive(Debug, Clone)]
pub struct ColumnMatcher {
    pub columns: MatchingColumns,
    pub strategy: MatchStrategy,
}

impl ColumnMatcher {
    pub fn new(columns: MatchingColumns, strategy: MatchStrategy) -> Self {
        ColumnMatcher { columns, strategy }
    }

    fn cell<'a, G: GraphStore>(&self, node: &NodeRef<'a, G>) -> MergeResult<Option<&'a Cell>> {
        let column = self
            .columns
            .get(node.graph_id)
            .ok_or(MergeError::MissingMatchingColumn(node.graph_id))?;
        if !node.graph.contains(node.node) {
            return Err(MergeError::UnknownEntity {
                graph: node.graph_id,
                entity: node.node,
            });
        }
        Ok(node.graph.get(node.node, column))
    }
}

impl<G: GraphStore> EquivalencePredicate<G> for ColumnMatcher {
    fn matches(&self, a: NodeRef<'_, G>, b: NodeRef<'_, G>) -> MergeResult<bool> {
        let left = self.cell(&a)?;
        let right = self.cell(&b)?;
        Ok(match (left, right) {
            (Some(x), Some(y)) => self.strategy.cells_match(x, y),
            _ => false,
        })
    }
}

// ============================================================================
// MATCH MEMO
// ============================================================================

/// Symmetric cache of pairs known to match.
///
/// Only positive outcomes are kept, so the memo grows with the number of
/// matches rather than the number of comparisons.
#[derive(Debug, Clone, Default)]
pub struct MatchMemo {
    matched: HashSet<(EntitySpec, EntitySpec)>,
}

impl MatchMemo {
    fn key(a: EntitySpec, b: EntitySpec) -> (EntitySpec, EntitySpec) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// `Some(true)` for a remembered match, `None` when the pair is untested
    /// or did not match.
    pub fn get(&self, a: EntitySpec, b: EntitySpec) -> Option<bool> {
        self.matched.contains(&Self::key(a, b)).then_some(true)
    }

    pub fn insert(&mut self, a: EntitySpec, b: EntitySpec) {
        self.matched.insert(Self::key(a, b));
    }

    /// Every entity already known to match `a`.
    pub fn partners(&self, a: EntitySpec) -> Vec<EntitySpec> {
        let mut partners: Vec<EntitySpec> = self
            .matched
            .iter()
            .filter_map(|(x, y)| match (*x == a, *y == a) {
                (true, _) => Some(*y),
                (_, true) => Some(*x),
                _ => None,
            })
            .collect();
        partners.sort();
        partners
    }

    pub fn len(&self) -> usize {
        self.matched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }
}

// ============================================================================
// GROUPING
// ============================================================================

pub type Group = Vec<EntitySpec>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grouping {
    /// Matched entities, in group creation order
    pub groups: Vec<Group>,

    /// Entities that matched nothing
    pub unmatched: Vec<EntitySpec>,
}

impl Grouping {
    pub fn group_of(&self, spec: EntitySpec) -> Option<&Group> {
        self.groups.iter().find(|g| g.contains(&spec))
    }

    pub fn is_unmatched(&self, spec: EntitySpec) -> bool {
        self.unmatched.contains(&spec)
    }
}

// ============================================================================
// NODE MATCHER
// ============================================================================

pub struct NodeMatcher<'p, P: ?Sized> {
    predicate: &'p P,
    memo: MatchMemo,
    within_network: bool,
}

impl<'p, P: ?Sized> NodeMatcher<'p, P> {
    pub fn new(predicate: &'p P) -> Self {
        NodeMatcher {
            predicate,
            memo: MatchMemo::default(),
            within_network: false,
        }
    }

    /// Builder: also match nodes of the first network against each other
    pub fn within_network(mut self, enabled: bool) -> Self {
        self.within_network = enabled;
        self
    }

    pub fn memo(&self) -> &MatchMemo {
        &self.memo
    }

    pub fn into_memo(self) -> MatchMemo {
        self.memo
    }

    /// Cached outcome only: true for the same entity or a remembered match.
    pub fn is_known_match(&self, a: EntitySpec, b: EntitySpec) -> bool {
        a == b || self.memo.get(a, b) == Some(true)
    }

    /// Memoized pairwise test.
    pub fn is_match<G>(&mut self, sources: &[G], a: EntitySpec, b: EntitySpec) -> MergeResult<bool>
    where
        P: EquivalencePredicate<G>,
    {
        if a == b {
            return Ok(true);
        }
        if self.memo.get(a, b).is_some() {
            return Ok(true);
        }

        let left = node_ref(sources, a)?;
        let right = node_ref(sources, b)?;
        let matched = self.predicate.matches(left, right)?;
        if matched {
            self.memo.insert(a, b);
        }
        Ok(matched)
    }

    /// Partition every node of every source into groups and an unmatched
    /// pool, processing the sources in order.
    pub fn group<G: GraphStore>(&mut self, sources: &[G]) -> MergeResult<Grouping>
    where
        P: EquivalencePredicate<G>,
    {
        let mut grouping = Grouping::default();

        for (i, graph) in sources.iter().enumerate() {
            let graph_id = GraphId(i);
            for node in graph.nodes() {
                let spec = EntitySpec::new(graph_id, node);
                if i == 0 && !self.within_network {
                    grouping.unmatched.push(spec);
                } else {
                    self.place(sources, &mut grouping, spec)?;
                }
            }
        }

        debug!(
            groups = grouping.groups.len(),
            unmatched = grouping.unmatched.len(),
            matched_pairs = self.memo.len(),
            "nodes grouped"
        );
        Ok(grouping)
    }

    fn place<G>(
        &mut self,
        sources: &[G],
        grouping: &mut Grouping,
        spec: EntitySpec,
    ) -> MergeResult<()>
    where
        P: EquivalencePredicate<G>,
    {
        // First group holding any matching member wins.
        for g in 0..grouping.groups.len() {
            for m in 0..grouping.groups[g].len() {
                let member = grouping.groups[g][m];
                if self.is_match(sources, spec, member)? {
                    grouping.groups[g].push(spec);
                    return Ok(());
                }
            }
        }

        // Newest pool entry first.
        for i in (0..grouping.unmatched.len()).rev() {
            let candidate = grouping.unmatched[i];
            if self.is_match(sources, spec, candidate)? {
                grouping.unmatched.remove(i);
                grouping.groups.push(vec![candidate, spec]);
                return Ok(());
            }
        }

        grouping.unmatched.push(spec);
        Ok(())
    }
}

fn node_ref<G>(sources: &[G], spec: EntitySpec) -> MergeResult<NodeRef<'_, G>> {
    let graph = sources.get(spec.graph.0).ok_or(MergeError::UnknownGraph(spec.graph))?;
    Ok(NodeRef {
        graph,
        graph_id: spec.graph,
        node: spec.entity,
    })
}

// ============================================================================
// TESTS
// ============================================================================
