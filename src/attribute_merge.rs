// 🔀 Attribute Merge Engine - fold many source cells into one target cell
//
// The rule is dispatched on the TARGET column type:
//   String target  → copy into an empty cell, equal is a no-op, else conflict
//   Scalar target  → same, after coercing the source to the target type
//   List target    → set union, insertion order kept, never a conflict
//
// Node and edge merging share this rule; they differ only in how the
// source list is built and whether a count column is maintained.

use crate::column_type::{Cell, ColumnType, PlainType, Value};
use crate::conflict::{ConflictRecord, ConflictSink};
use crate::network::{EntityId, EntitySpec, GraphStore};
use tracing::{debug, warn};

/// One contributing source cell: an entity and the column to read it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSource {
    pub entity: EntitySpec,
    pub column: String,
}

impl MergeSource {
    pub fn new(entity: EntitySpec, column: impl Into<String>) -> Self {
        MergeSource {
            entity,
            column: column.into(),
        }
    }
}

/// What happened to one source cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The source cell was absent
    Skipped,
    /// The target cell was empty and took the source value
    Copied,
    /// The target already held the same value(s)
    Unchanged,
    /// New list elements were added
    Extended,
    /// The values disagreed; a conflict was recorded
    Conflict,
    /// The source value could not be converted; nothing was written
    Abandoned,
    /// Target graph, entity or column missing; nothing was done
    Ignored,
}

// ============================================================================
// ATTRIBUTE MERGER
// ============================================================================

/// Applies the merge rule and routes conflicts.
///
/// Conflicts are pushed to the optional sink as soon as they are found and
/// also kept, in order, for the caller's report.
pub struct AttributeMerger<'s> {
    sink: Option<&'s mut dyn ConflictSink>,
    conflicts: Vec<ConflictRecord>,
}

impl<'s> AttributeMerger<'s> {
    pub fn new() -> Self {
        AttributeMerger {
            sink: None,
            conflicts: Vec::new(),
        }
    }

    pub fn with_sink(sink: &'s mut dyn ConflictSink) -> Self {
        AttributeMerger {
            sink: Some(sink),
            conflicts: Vec::new(),
        }
    }

    pub fn conflicts(&self) -> &[ConflictRecord] {
        &self.conflicts
    }

    pub fn into_conflicts(self) -> Vec<ConflictRecord> {
        self.conflicts
    }

    /// Merge every input, in order, into `target_column` of `target_entity`.
    pub fn merge_attribute<G: GraphStore>(
        &mut self,
        sources: &[G],
        inputs: &[MergeSource],
        target: &mut G,
        target_entity: EntityId,
        target_column: &str,
        count_column: Option<&str>,
    ) -> Vec<MergeOutcome> {
        inputs
            .iter()
            .map(|input| {
                self.merge_one(sources, input, target, target_entity, target_column, count_column)
            })
            .collect()
    }

    /// Merge a single source cell into the target cell.
    pub fn merge_one<G: GraphStore>(
        &mut self,
        sources: &[G],
        input: &MergeSource,
        target: &mut G,
        target_entity: EntityId,
        target_column: &str,
        count_column: Option<&str>,
    ) -> MergeOutcome {
        let Some(kind) = target.kind_of(target_entity) else {
            warn!(entity = %target_entity, "merge skipped: target entity not found");
            return MergeOutcome::Ignored;
        };
        let Some(target_type) = target.column_type(kind, target_column) else {
            warn!(column = target_column, "merge skipped: target column not found");
            return MergeOutcome::Ignored;
        };
        let Some(source_graph) = sources.get(input.entity.graph.0) else {
            warn!(source = %input.entity, "merge skipped: source network not found");
            return MergeOutcome::Ignored;
        };

        let source_cell = source_graph.get(input.entity.entity, &input.column).cloned();

        let outcome = match target_type {
            ColumnType::Scalar(plain) => self.merge_scalar(
                input,
                source_cell,
                plain,
                target,
                target_entity,
                target_column,
                count_column,
            ),
            ColumnType::List(plain) => merge_list(
                input,
                source_cell,
                plain,
                target,
                target_entity,
                target_column,
                count_column,
            ),
        };

        debug!(
            source = %input.entity,
            column = %input.column,
            target_entity = %target_entity,
            target_column,
            ?outcome,
            "attribute merged"
        );
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn merge_scalar<G: GraphStore>(
        &mut self,
        input: &MergeSource,
        source_cell: Option<Cell>,
        plain: PlainType,
        target: &mut G,
        target_entity: EntityId,
        target_column: &str,
        count_column: Option<&str>,
    ) -> MergeOutcome {
        let Some(source_cell) = source_cell else {
            if plain != PlainType::String {
                // Scalar sources are expected to be populated.
                debug!(source = %input.entity, column = %input.column, "missing source value");
            }
            return MergeOutcome::Skipped;
        };

        let value = match source_cell.to_scalar(plain) {
            Ok(v) => v,
            Err(e) => {
                warn!(source = %input.entity, column = %input.column, "merge abandoned: {}", e);
                return MergeOutcome::Abandoned;
            }
        };

        let extant = target.get(target_entity, target_column).cloned();
        let empty = match &extant {
            None => true,
            Some(Cell::Scalar(Value::String(s))) => plain == PlainType::String && s.is_empty(),
            Some(_) => false,
        };

        if empty {
            if !write(target, target_entity, target_column, Cell::Scalar(value)) {
                return MergeOutcome::Abandoned;
            }
            if let Some(count) = count_column {
                write(target, target_entity, count, Cell::scalar(1));
            }
            return MergeOutcome::Copied;
        }

        if extant.as_ref().and_then(Cell::as_scalar) == Some(&value) {
            return MergeOutcome::Unchanged;
        }

        let record = ConflictRecord::new(input.entity, &input.column, target_entity, target_column);
        self.record(record);
        MergeOutcome::Conflict
    }

    fn record(&mut self, record: ConflictRecord) {
        if let Some(sink) = self.sink.as_mut() {
            sink.add_conflict(&record);
        }
        self.conflicts.push(record);
    }
}

impl Default for AttributeMerger<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_list<G: GraphStore>(
    input: &MergeSource,
    source_cell: Option<Cell>,
    plain: PlainType,
    target: &mut G,
    target_entity: EntityId,
    target_column: &str,
    count_column: Option<&str>,
) -> MergeOutcome {
    let Some(source_cell) = source_cell else {
        return MergeOutcome::Skipped;
    };

    let incoming = match source_cell.to_elements(plain) {
        Ok(values) => values,
        Err(e) => {
            warn!(source = %input.entity, column = %input.column, "merge abandoned: {}", e);
            return MergeOutcome::Abandoned;
        }
    };

    let mut list: Vec<Value> = match target.get(target_entity, target_column) {
        Some(Cell::List(existing)) => existing.clone(),
        _ => Vec::new(),
    };
    let before = list.len();

    for value in incoming {
        if !list.contains(&value) {
            list.push(value);
        }
    }

    if list.is_empty() {
        return MergeOutcome::Skipped;
    }

    let len = list.len();
    if !write(target, target_entity, target_column, Cell::List(list)) {
        return MergeOutcome::Abandoned;
    }
    if let Some(count) = count_column {
        match i32::try_from(len) {
            Ok(n) => {
                write(target, target_entity, count, Cell::scalar(n));
            }
            Err(_) => {
                warn!(entity = %target_entity, column = count, len, "list too long to count")
            }
        }
    }

    if len == before {
        MergeOutcome::Unchanged
    } else if before == 0 {
        MergeOutcome::Copied
    } else {
        MergeOutcome::Extended
    }
}

fn write<G: GraphStore>(target: &mut G, entity: EntityId, column: &str, cell: Cell) -> bool {
    match target.set(entity, column, cell) {
        Ok(()) => true,
        Err(e) => {
            warn!(entity = %entity, column, "write failed: {}", e);
            false
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictCollector;
    use crate::network::{GraphId, Network, TableKind};
    use pretty_assertions::assert_eq;

    /// One source graph per value, each with a single node holding `column`.
    fn sources(
        column: &str,
        ty: ColumnType,
        cells: Vec<Option<Cell>>,
    ) -> (Vec<Network>, Vec<MergeSource>) {
        let mut nets = Vec::new();
        let mut inputs = Vec::new();
        for (i, cell) in cells.into_iter().enumerate() {
            let mut net = Network::new(format!("g{}", i)).with_node_column(column, ty);
            let node = net.add_node();
            if let Some(cell) = cell {
                net.set(node, column, cell).unwrap();
            }
            inputs.push(MergeSource::new(EntitySpec::new(GraphId(i), node), column));
            nets.push(net);
        }
        (nets, inputs)
    }

    fn target(column: &str, ty: ColumnType) -> (Network, EntityId) {
        let mut net = Network::new("merged")
            .with_node_column(column, ty)
            .with_node_column("count", ColumnType::INTEGER);
        let node = net.add_node();
        (net, node)
    }

    #[test]
    fn test_string_copy_then_equal() {
        let (nets, inputs) = sources(
            "color",
            ColumnType::STRING,
            vec![
                Some(Cell::scalar("Red")),
                Some(Cell::scalar("Red")),
            ],
        );
        let (mut merged, node) = target("color", ColumnType::STRING);
        let mut merger = AttributeMerger::new();

        let outcomes = merger.merge_attribute(&nets, &inputs, &mut merged, node, "color", None);

        assert_eq!(outcomes, vec![MergeOutcome::Copied, MergeOutcome::Unchanged]);
        assert_eq!(merged.get(node, "color"), Some(&Cell::scalar("Red")));
        assert!(merger.conflicts().is_empty());
    }

    #[test]
    fn test_string_conflict_keeps_first_value() {
        let (nets, inputs) = sources(
            "color",
            ColumnType::STRING,
            vec![
                Some(Cell::scalar("Y")),
                Some(Cell::scalar("X")),
            ],
        );
        let (mut merged, node) = target("color", ColumnType::STRING);
        let mut collector = ConflictCollector::new();
        let mut merger = AttributeMerger::with_sink(&mut collector);

        merger.merge_attribute(&nets, &inputs, &mut merged, node, "color", None);
        let conflicts = merger.into_conflicts();

        assert_eq!(merged.get(node, "color"), Some(&Cell::scalar("Y")));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].source, inputs[1].entity);
        assert_eq!(conflicts[0].target, node);
        assert_eq!(conflicts[0].target_column, "color");
        assert_eq!(collector.records(), conflicts.as_slice());
    }

    #[test]
    fn test_string_absent_source_is_noop() {
        let (nets, inputs) = sources("color", ColumnType::STRING, vec![None]);
        let (mut merged, node) = target("color", ColumnType::STRING);
        let mut merger = AttributeMerger::new();

        let outcomes =
            merger.merge_attribute(&nets, &inputs, &mut merged, node, "color", Some("count"));

        assert_eq!(outcomes, vec![MergeOutcome::Skipped]);
        assert_eq!(merged.get(node, "color"), None);
        assert_eq!(merged.get(node, "count"), None);
    }

    #[test]
    fn test_empty_string_target_counts_as_empty() {
        let (nets, inputs) = sources("color", ColumnType::STRING, vec![Some(Cell::scalar("Red"))]);
        let (mut merged, node) = target("color", ColumnType::STRING);
        merged.set(node, "color", Cell::scalar("")).unwrap();
        let mut merger = AttributeMerger::new();

        merger.merge_attribute(&nets, &inputs, &mut merged, node, "color", None);

        assert_eq!(merged.get(node, "color"), Some(&Cell::scalar("Red")));
    }

    #[test]
    fn test_scalar_merge_is_idempotent() {
        let (nets, inputs) = sources("score", ColumnType::INTEGER, vec![Some(Cell::scalar(5))]);
        let (mut merged, node) = target("score", ColumnType::INTEGER);
        let mut merger = AttributeMerger::new();

        let first =
            merger.merge_attribute(&nets, &inputs, &mut merged, node, "score", Some("count"));
        let second =
            merger.merge_attribute(&nets, &inputs, &mut merged, node, "score", Some("count"));

        assert_eq!(first, vec![MergeOutcome::Copied]);
        assert_eq!(second, vec![MergeOutcome::Unchanged]);
        assert!(merger.conflicts().is_empty());
        assert_eq!(merged.get(node, "count"), Some(&Cell::scalar(1)));
    }

    #[test]
    fn test_scalar_coerced_to_target_type() {
        let (nets, inputs) = sources("score", ColumnType::INTEGER, vec![Some(Cell::scalar(3))]);
        let (mut merged, node) = target("score", ColumnType::Scalar(PlainType::Double));
        let mut merger = AttributeMerger::new();

        merger.merge_attribute(&nets, &inputs, &mut merged, node, "score", None);

        assert_eq!(merged.get(node, "score"), Some(&Cell::scalar(3.0)));
    }

    #[test]
    fn test_double_equality_has_no_tolerance() {
        let (nets, inputs) = sources(
            "w", ColumnType::Scalar(PlainType::Double),
            vec![
                Some(Cell::scalar(0.3)),
                Some(Cell::scalar(0.1 + 0.2)),
            ],
        );
        let (mut merged, node) = target("w", ColumnType::Scalar(PlainType::Double));
        let mut merger = AttributeMerger::new();

        let outcomes = merger.merge_attribute(&nets, &inputs, &mut merged, node, "w", None);

        assert_eq!(outcomes, vec![MergeOutcome::Copied, MergeOutcome::Conflict]);
    }

    #[test]
    fn test_nan_scalar_merge_is_idempotent() {
        let ty = ColumnType::Scalar(PlainType::Double);
        let (nets, inputs) = sources("w", ty, vec![Some(Cell::scalar(f64::NAN))]);
        let (mut merged, node) = target("w", ty);
        let mut merger = AttributeMerger::new();

        let first = merger.merge_attribute(&nets, &inputs, &mut merged, node, "w", None);
        let second = merger.merge_attribute(&nets, &inputs, &mut merged, node, "w", None);

        assert_eq!(first, vec![MergeOutcome::Copied]);
        assert_eq!(second, vec![MergeOutcome::Unchanged]);
        assert!(merger.conflicts().is_empty());
    }

    #[test]
    fn test_nan_list_elements_deduplicate() {
        let ty = ColumnType::List(PlainType::Double);
        let (nets, inputs) = sources("ws", ty, vec![Some(Cell::list([f64::NAN]))]);
        let (mut merged, node) = target("ws", ty);
        let mut merger = AttributeMerger::new();

        for _ in 0..3 {
            merger.merge_attribute(&nets, &inputs, &mut merged, node, "ws", Some("count"));
        }

        assert_eq!(merged.get(node, "ws").map(|c| c.values().len()), Some(1));
        assert_eq!(merged.get(node, "count"), Some(&Cell::scalar(1)));
    }

    #[test]
    fn test_signed_zeros_are_distinct_list_elements() {
        let ty = ColumnType::List(PlainType::Double);
        let (nets, inputs) = sources(
            "ws",
            ty,
            vec![Some(Cell::list([0.0])), Some(Cell::list([-0.0, 0.0]))],
        );
        let (mut merged, node) = target("ws", ty);
        let mut merger = AttributeMerger::new();

        merger.merge_attribute(&nets, &inputs, &mut merged, node, "ws", Some("count"));

        assert_eq!(merged.get(node, "count"), Some(&Cell::scalar(2)));
    }

    #[test]
    fn test_coercion_failure_abandons_cell() {
        let (nets, inputs) = sources(
            "score",
            ColumnType::STRING,
            vec![
                Some(Cell::scalar("high")),
                Some(Cell::scalar("7")),
            ],
        );
        let (mut merged, node) = target("score", ColumnType::INTEGER);
        let mut merger = AttributeMerger::new();

        let outcomes = merger.merge_attribute(&nets, &inputs, &mut merged, node, "score", None);

        assert_eq!(outcomes, vec![MergeOutcome::Abandoned, MergeOutcome::Copied]);
        assert_eq!(merged.get(node, "score"), Some(&Cell::scalar(7)));
    }

    #[test]
    fn test_list_union_preserves_first_insertion_order() {
        let ty = ColumnType::List(PlainType::String);
        let (nets, inputs) = sources(
            "tags",
            ty,
            vec![
                Some(Cell::list(["A", "B"])),
                Some(Cell::list(["B", "C"])),
            ],
        );
        let (mut merged, node) = target("tags", ty);
        let mut merger = AttributeMerger::new();

        let outcomes =
            merger.merge_attribute(&nets, &inputs, &mut merged, node, "tags", Some("count"));

        assert_eq!(outcomes, vec![MergeOutcome::Copied, MergeOutcome::Extended]);
        assert_eq!(merged.get(node, "tags"), Some(&Cell::list(["A", "B", "C"])));
        assert_eq!(merged.get(node, "count"), Some(&Cell::scalar(3)));
        assert!(merger.conflicts().is_empty());
    }

    #[test]
    fn test_scalar_sources_into_list() {
        let (nets, inputs) = sources(
            "score",
            ColumnType::INTEGER,
            vec![
                Some(Cell::scalar(1)),
                Some(Cell::scalar(2)),
                Some(Cell::scalar(1)),
                None,
            ],
        );
        let (mut merged, node) = target("scores", ColumnType::List(PlainType::Long));
        let mut merger = AttributeMerger::new();

        let outcomes = merger.merge_attribute(&nets, &inputs, &mut merged, node, "scores", None);

        assert_eq!(
            outcomes,
            vec![
                MergeOutcome::Copied,
                MergeOutcome::Extended,
                MergeOutcome::Unchanged,
                MergeOutcome::Skipped,
            ]
        );
        assert_eq!(merged.get(node, "scores"), Some(&Cell::list([1i64, 2])));
    }

    #[test]
    fn test_empty_source_list_writes_nothing() {
        let ty = ColumnType::List(PlainType::String);
        let (nets, inputs) = sources("tags", ty, vec![Some(Cell::List(Vec::new()))]);
        let (mut merged, node) = target("tags", ty);
        let mut merger = AttributeMerger::new();

        merger.merge_attribute(&nets, &inputs, &mut merged, node, "tags", Some("count"));

        assert_eq!(merged.get(node, "tags"), None);
        assert_eq!(merged.get(node, "count"), None);
    }

    #[test]
    fn test_missing_target_column_is_ignored() {
        let (nets, inputs) = sources("color", ColumnType::STRING, vec![Some(Cell::scalar("Red"))]);
        let (mut merged, node) = target("color", ColumnType::STRING);
        let mut merger = AttributeMerger::new();

        let outcomes = merger.merge_attribute(&nets, &inputs, &mut merged, node, "shade", None);
        assert_eq!(outcomes, vec![MergeOutcome::Ignored]);

        let outcomes =
            merger.merge_attribute(&nets, &inputs, &mut merged, EntityId(999), "color", None);
        assert_eq!(outcomes, vec![MergeOutcome::Ignored]);
        assert_eq!(merged.column_type(TableKind::Node, "shade"), None);
    }
}
