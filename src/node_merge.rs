// ⚙️ Set-Operation Engine - decide which merged nodes exist
//
//   UNION        → every group and every unmatched node
//   INTERSECTION → groups with a member count of at least the network count
//   DIFFERENCE   → unmatched nodes of the first network only
//
// Each created target node gets its attributes merged from every member
// and one identity entry per member.

use crate::attribute_merge::{AttributeMerger, MergeSource};
use crate::column_type::{Cell, PlainType};
use crate::error::{MergeError, MergeResult};
use crate::mapping::{AttributeMapping, MatchingColumns};
use crate::matcher::{Group, Grouping};
use crate::network::{EntityId, EntitySpec, GraphId, GraphStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

// ============================================================================
// OPERATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Union,
    Intersection,
    Difference,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Union => "union",
            Operation::Intersection => "intersection",
            Operation::Difference => "difference",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "union" => Ok(Operation::Union),
            "intersection" => Ok(Operation::Intersection),
            "difference" => Ok(Operation::Difference),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

// ============================================================================
// IDENTITY MAP
// ============================================================================

/// Source entity → the single target entity it was folded into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityMap {
    targets: HashMap<EntitySpec, EntityId>,
    order: Vec<EntitySpec>,
    by_target: HashMap<EntityId, Vec<EntitySpec>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `source` was folded into `target`. A source maps to at
    /// most one target.
    pub fn insert(&mut self, source: EntitySpec, target: EntityId) -> MergeResult<()> {
        if let Some(existing) = self.targets.get(&source) {
            return Err(MergeError::AlreadyMapped {
                graph: source.graph,
                entity: source.entity,
                target: *existing,
            });
        }
        self.targets.insert(source, target);
        self.order.push(source);
        self.by_target.entry(target).or_default().push(source);
        Ok(())
    }

    pub fn get(&self, source: EntitySpec) -> Option<EntityId> {
        self.targets.get(&source).copied()
    }

    pub fn contains(&self, source: EntitySpec) -> bool {
        self.targets.contains_key(&source)
    }

    /// Every source folded into `target`, in insertion order.
    pub fn sources_of(&self, target: EntityId) -> Vec<EntitySpec> {
        self.by_target.get(&target).cloned().unwrap_or_default()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (EntitySpec, EntityId)> + '_ {
        self.order.iter().map(move |s| (*s, self.targets[s]))
    }

    /// Number of distinct target entities.
    pub fn target_count(&self) -> usize {
        self.by_target.len()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ============================================================================
// NODE MERGER
// ============================================================================

pub struct NodeMerger<'a> {
    mapping: &'a AttributeMapping,
    matching: &'a MatchingColumns,
    match_column: Option<&'a str>,
    count_column: Option<&'a str>,
}

impl<'a> NodeMerger<'a> {
    pub fn new(mapping: &'a AttributeMapping, matching: &'a MatchingColumns) -> Self {
        NodeMerger {
            mapping,
            matching,
            match_column: None,
            count_column: None,
        }
    }

    /// Builder: write the first member's matching value into this column
    pub fn with_match_column(mut self, column: Option<&'a str>) -> Self {
        self.match_column = column;
        self
    }

    /// Builder: write the number of merged source nodes into this column
    pub fn with_count_column(mut self, column: Option<&'a str>) -> Self {
        self.count_column = column;
        self
    }

    /// Groups that become target nodes under `operation`, in creation order.
    pub fn select(operation: Operation, grouping: &Grouping, graph_count: usize) -> Vec<Group> {
        match operation {
            Operation::Union => grouping
                .groups
                .iter()
                .cloned()
                .chain(grouping.unmatched.iter().map(|s| vec![*s]))
                .collect(),
            Operation::Intersection => grouping
                .groups
                .iter()
                .cloned()
                .chain(grouping.unmatched.iter().map(|s| vec![*s]))
                .filter(|g| g.len() >= graph_count)
                .collect(),
            Operation::Difference => grouping
                .unmatched
                .iter()
                .filter(|s| s.graph == GraphId(0))
                .map(|s| vec![*s])
                .collect(),
        }
    }

    /// Create the target nodes for `operation` and merge their attributes.
    pub fn apply<G: GraphStore>(
        &self,
        operation: Operation,
        grouping: &Grouping,
        sources: &[G],
        target: &mut G,
        merger: &mut AttributeMerger<'_>,
    ) -> MergeResult<IdentityMap> {
        let selected = Self::select(operation, grouping, sources.len());
        debug!(
            %operation,
            groups = grouping.groups.len(),
            unmatched = grouping.unmatched.len(),
            selected = selected.len(),
            "applying set operation"
        );

        let mut identity = IdentityMap::new();
        for group in &selected {
            let node = target.add_node();
            self.merge_group(group, sources, target, node, merger)?;
            for member in group {
                identity.insert(*member, node)?;
            }
        }
        Ok(identity)
    }

    /// Fill `node` from every member of `group`.
    pub fn merge_group<G: GraphStore>(
        &self,
        group: &[EntitySpec],
        sources: &[G],
        target: &mut G,
        node: EntityId,
        merger: &mut AttributeMerger<'_>,
    ) -> MergeResult<()> {
        let Some(first) = group.first() else {
            return Ok(());
        };

        if let Some(count) = self.count_column {
            match i32::try_from(group.len()) {
                Ok(n) => target.set(node, count, Cell::scalar(n))?,
                Err(_) => warn!(node = %node, len = group.len(), "group too large to count"),
            }
        }

        if let Some(column) = self.match_column {
            let graph = sources
                .get(first.graph.0)
                .ok_or(MergeError::UnknownGraph(first.graph))?;
            let key = self
                .matching
                .get(first.graph)
                .ok_or(MergeError::MissingMatchingColumn(first.graph))?;
            match graph.get(first.entity, key).map(|c| c.to_scalar(PlainType::String)) {
                Some(Ok(value)) => target.set(node, column, Cell::Scalar(value))?,
                Some(Err(e)) => warn!(source = %first, "match value not copied: {}", e),
                None => {}
            }
        }

        for attribute in self.mapping.attributes() {
            let inputs: Vec<MergeSource> = group
                .iter()
                .filter_map(|spec| {
                    attribute
                        .source_column(spec.graph)
                        .map(|column| MergeSource::new(*spec, column))
                })
                .collect();
            if inputs.is_empty() {
                continue;
            }
            merger.merge_attribute(sources, &inputs, target, node, &attribute.name, None);
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
