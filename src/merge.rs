// 🧬 Network Merge - one run from source networks to a merged target
//
// validate → create target columns → group nodes → set operation →
// edge correspondence → edge merge. Validation happens before the target
// is touched; after that only a predicate failure can abort the run.

use crate::attribute_merge::AttributeMerger;
use crate::column_type::ColumnType;
use crate::conflict::{ConflictRecord, ConflictSink};
use crate::edge_merge::{EdgeCorrespondence, EdgeMerger, EndpointCorrespondence};
use crate::error::{MergeError, MergeResult};
use crate::mapping::{AttributeMapping, MatchingColumns};
use crate::matcher::{EquivalencePredicate, NodeMatcher};
use crate::network::{GraphStore, TableKind};
use crate::node_merge::{IdentityMap, NodeMerger, Operation};
use tracing::{debug, info};

// ============================================================================
// REPORT
// ============================================================================

/// Everything a caller needs to know about a finished run.
#[derive(Debug, Clone)]
pub struct MergeReport {
    pub operation: Operation,
    pub node_map: IdentityMap,
    pub edge_map: IdentityMap,
    pub conflicts: Vec<ConflictRecord>,

    /// Groups of two or more matched nodes
    pub groups: usize,

    /// Nodes left in the unmatched pool
    pub unmatched: usize,

    pub nodes: usize,
    pub edges: usize,
}

impl MergeReport {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

// ============================================================================
// NETWORK MERGE
// ============================================================================

#[derive(Debug, Clone)]
pub struct NetworkMerge {
    operation: Operation,
    node_mapping: AttributeMapping,
    edge_mapping: AttributeMapping,
    matching: MatchingColumns,
    match_column: Option<String>,
    count_column: Option<String>,
    within_network: bool,
}

impl NetworkMerge {
    pub fn new(
        operation: Operation,
        node_mapping: AttributeMapping,
        matching: MatchingColumns,
    ) -> Self {
        NetworkMerge {
            operation,
            node_mapping,
            edge_mapping: AttributeMapping::new(),
            matching,
            match_column: None,
            count_column: None,
            within_network: false,
        }
    }

    /// Builder: merge edge attributes with this mapping
    pub fn with_edge_mapping(mut self, mapping: AttributeMapping) -> Self {
        self.edge_mapping = mapping;
        self
    }

    /// Builder: record the value each merged node was matched on
    pub fn with_match_column(mut self, column: impl Into<String>) -> Self {
        self.match_column = Some(column.into());
        self
    }

    /// Builder: record how many source nodes each merged node stands for
    pub fn with_count_column(mut self, column: impl Into<String>) -> Self {
        self.count_column = Some(column.into());
        self
    }

    /// Builder: also match nodes of the first network against each other
    pub fn within_network(mut self, enabled: bool) -> Self {
        self.within_network = enabled;
        self
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn node_mapping(&self) -> &AttributeMapping {
        &self.node_mapping
    }

    pub fn edge_mapping(&self) -> &AttributeMapping {
        &self.edge_mapping
    }

    /// Columns the run creates in the target, with their tables and types.
    pub fn target_columns(&self) -> Vec<(TableKind, String, ColumnType)> {
        let mut columns: Vec<(TableKind, String, ColumnType)> = self
            .node_mapping
            .attributes()
            .iter()
            .map(|a| (TableKind::Node, a.name.clone(), a.column_type))
            .collect();
        if let Some(count) = &self.count_column {
            columns.push((TableKind::Node, count.clone(), ColumnType::INTEGER));
        }
        if let Some(column) = &self.match_column {
            columns.push((TableKind::Node, column.clone(), ColumnType::STRING));
        }
        columns.extend(
            self.edge_mapping
                .attributes()
                .iter()
                .map(|a| (TableKind::Edge, a.name.clone(), a.column_type)),
        );
        columns
    }

    /// Check the configuration against the sources and the target without
    /// mutating anything.
    pub fn validate<G: GraphStore>(&self, sources: &[G], target: &G) -> MergeResult<()> {
        if sources.is_empty() {
            return Err(MergeError::NoSources);
        }
        self.matching.validate(sources)?;
        self.node_mapping.validate(sources, TableKind::Node)?;
        self.edge_mapping.validate(sources, TableKind::Edge)?;

        let columns = self.target_columns();
        for (i, (table, name, ty)) in columns.iter().enumerate() {
            if columns[..i].iter().any(|(t, n, _)| t == table && n == name) {
                return Err(MergeError::DuplicateColumn(name.clone()));
            }
            match target.column_type(*table, name) {
                Some(existing) if existing != *ty => {
                    return Err(MergeError::ColumnTypeClash {
                        column: name.clone(),
                        existing,
                        requested: *ty,
                    })
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Merge `sources` into `target`, pairing edges by their mapped
    /// endpoints.
    pub fn run<G, P>(
        &self,
        sources: &[G],
        target: &mut G,
        predicate: &P,
        sink: Option<&mut dyn ConflictSink>,
    ) -> MergeResult<MergeReport>
    where
        G: GraphStore,
        P: EquivalencePredicate<G> + ?Sized,
    {
        self.run_with(sources, target, predicate, &EndpointCorrespondence, sink)
    }

    /// Merge with a caller-supplied edge correspondence.
    pub fn run_with<G, P, E>(
        &self,
        sources: &[G],
        target: &mut G,
        predicate: &P,
        correspondence: &E,
        sink: Option<&mut dyn ConflictSink>,
    ) -> MergeResult<MergeReport>
    where
        G: GraphStore,
        P: EquivalencePredicate<G> + ?Sized,
        E: EdgeCorrespondence<G> + ?Sized,
    {
        self.validate(sources, target)?;

        for (table, name, ty) in self.target_columns() {
            target.create_column(table, &name, ty)?;
        }

        let mut matcher = NodeMatcher::new(predicate).within_network(self.within_network);
        let grouping = matcher.group(sources)?;

        let mut merger = match sink {
            Some(sink) => AttributeMerger::with_sink(sink),
            None => AttributeMerger::new(),
        };

        let node_map = NodeMerger::new(&self.node_mapping, &self.matching)
            .with_match_column(self.match_column.as_deref())
            .with_count_column(self.count_column.as_deref())
            .apply(self.operation, &grouping, sources, target, &mut merger)?;

        let edge_groups = correspondence.correspond(sources, &node_map)?;
        debug!(candidates = edge_groups.len(), "edge correspondence built");
        let edge_map = EdgeMerger::new(&self.edge_mapping).apply(
            self.operation,
            &edge_groups,
            sources,
            target,
            &mut merger,
        )?;

        let report = MergeReport {
            operation: self.operation,
            node_map,
            edge_map,
            conflicts: merger.into_conflicts(),
            groups: grouping.groups.len(),
            unmatched: grouping.unmatched.len(),
            nodes: target.node_count(),
            edges: target.edge_count(),
        };

        info!(
            operation = %self.operation,
            networks = sources.len(),
            groups = report.groups,
            unmatched = report.unmatched,
            nodes = report.nodes,
            edges = report.edges,
            conflicts = report.conflicts.len(),
            "merge complete"
        );
        Ok(report)
    }
}

// ============================================================================
// TESTS
// ============================================================================
