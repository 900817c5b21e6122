// 🔗 Edge Merge - fold corresponding source edges into target edges
// Runs after node merging: an edge can only contribute once both of its
// endpoints have a target node. Attributes use the shared merge rule.

use crate::attribute_merge::{AttributeMerger, MergeSource};
use crate::error::MergeResult;
use crate::mapping::AttributeMapping;
use crate::network::{EntityId, EntitySpec, GraphId, GraphStore};
use crate::node_merge::{IdentityMap, Operation};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Source edges that become one target edge between two target nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeGroup {
    pub members: Vec<EntitySpec>,
    pub source: EntityId,
    pub target: EntityId,
    pub directed: bool,
}

impl EdgeGroup {
    /// Number of distinct source networks contributing to this group.
    pub fn network_count(&self) -> usize {
        self.members
            .iter()
            .map(|m| m.graph)
            .collect::<BTreeSet<GraphId>>()
            .len()
    }
}

/// Decides which source edges correspond to each other.
pub trait EdgeCorrespondence<G> {
    fn correspond(&self, sources: &[G], nodes: &IdentityMap) -> MergeResult<Vec<EdgeGroup>>;
}

/// Edges correspond when they join the same pair of target nodes with the
/// same directedness. Undirected pairs are compared without orientation.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointCorrespondence;

impl<G: GraphStore> EdgeCorrespondence<G> for EndpointCorrespondence {
    fn correspond(&self, sources: &[G], nodes: &IdentityMap) -> MergeResult<Vec<EdgeGroup>> {
        let mut groups: Vec<EdgeGroup> = Vec::new();
        let mut index: HashMap<(EntityId, EntityId, bool), usize> = HashMap::new();

        for (i, graph) in sources.iter().enumerate() {
            let graph_id = GraphId(i);
            for edge in graph.edges() {
                let Some(ends) = graph.endpoints(edge) else {
                    continue;
                };
                let source = nodes.get(EntitySpec::new(graph_id, ends.source));
                let target = nodes.get(EntitySpec::new(graph_id, ends.target));
                let (Some(mut source), Some(mut target)) = (source, target) else {
                    continue;
                };
                if !ends.directed && target < source {
                    std::mem::swap(&mut source, &mut target);
                }

                let spec = EntitySpec::new(graph_id, edge);
                let key = (source, target, ends.directed);
                match index.get(&key) {
                    Some(&g) => groups[g].members.push(spec),
                    None => {
                        index.insert(key, groups.len());
                        groups.push(EdgeGroup {
                            members: vec![spec],
                            source,
                            target,
                            directed: ends.directed,
                        });
                    }
                }
            }
        }
        Ok(groups)
    }
}

pub struct EdgeMerger<'a> {
    mapping: &'a AttributeMapping,
}

impl<'a> EdgeMerger<'a> {
    pub fn new(mapping: &'a AttributeMapping) -> Self {
        EdgeMerger { mapping }
    }

    /// Whether an edge group survives `operation`.
    pub fn keeps(operation: Operation, group: &EdgeGroup, graph_count: usize) -> bool {
        match operation {
            Operation::Union => true,
            Operation::Intersection => group.network_count() >= graph_count,
            Operation::Difference => group.members.iter().all(|m| m.graph == GraphId(0)),
        }
    }

    /// Create one target edge per surviving group and merge its attributes.
    pub fn apply<G: GraphStore>(
        &self,
        operation: Operation,
        groups: &[EdgeGroup],
        sources: &[G],
        target: &mut G,
        merger: &mut AttributeMerger<'_>,
    ) -> MergeResult<IdentityMap> {
        let mut identity = IdentityMap::new();
        let mut created = 0;

        for group in groups {
            if !Self::keeps(operation, group, sources.len()) {
                continue;
            }
            let edge = target.add_edge(group.source, group.target, group.directed)?;
            created += 1;

            for attribute in self.mapping.attributes() {
                let inputs: Vec<MergeSource> = group
                    .members
                    .iter()
                    .filter_map(|spec| {
                        attribute
                            .source_column(spec.graph)
                            .map(|column| MergeSource::new(*spec, column))
                    })
                    .collect();
                if !inputs.is_empty() {
                    merger.merge_attribute(sources, &inputs, target, edge, &attribute.name, None);
                }
            }

            for member in &group.members {
                identity.insert(*member, edge)?;
            }
        }

        debug!(%operation, candidates = groups.len(), created, "edges merged");
        Ok(identity)
    }
}

// ============================================================================
// TESTS
// ============================================================================
