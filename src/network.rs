// 🕸️ Network storage - the graph/table seam used by the merge engine
// `GraphStore` is what the engine reads from and writes to; `Network` is the
// in-memory implementation used by the CLI and the tests.

use crate::column_type::{Cell, ColumnType};
use crate::error::{MergeError, MergeResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Position of a source graph in the ordered source list of one merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphId(pub usize);

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node or edge id, unique inside one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One node or edge inside a specific source graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntitySpec {
    pub graph: GraphId,
    pub entity: EntityId,
}

impl EntitySpec {
    pub fn new(graph: GraphId, entity: EntityId) -> Self {
        EntitySpec { graph, entity }
    }
}

impl fmt::Display for EntitySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.graph, self.entity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableKind {
    Node,
    Edge,
}

/// Endpoints of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoints {
    pub source: EntityId,
    pub target: EntityId,
    pub directed: bool,
}

// ============================================================================
// STORAGE INTERFACE
// ============================================================================

/// Row/column storage for one graph.
///
/// Node and edge attributes live in separate tables; `get` and `set` pick
/// the table from the kind of entity they are given.
pub trait GraphStore {
    fn name(&self) -> &str;

    fn nodes(&self) -> Vec<EntityId>;

    fn edges(&self) -> Vec<EntityId>;

    fn add_node(&mut self) -> EntityId;

    fn add_edge(
        &mut self,
        source: EntityId,
        target: EntityId,
        directed: bool,
    ) -> MergeResult<EntityId>;

    fn endpoints(&self, edge: EntityId) -> Option<Endpoints>;

    /// Table the entity belongs to, `None` if unknown.
    fn kind_of(&self, entity: EntityId) -> Option<TableKind>;

    fn contains(&self, entity: EntityId) -> bool {
        self.kind_of(entity).is_some()
    }

    /// Columns of a table in creation order.
    fn columns(&self, table: TableKind) -> Vec<(String, ColumnType)>;

    fn column_type(&self, table: TableKind, column: &str) -> Option<ColumnType>;

    fn create_column(&mut self, table: TableKind, column: &str, ty: ColumnType) -> MergeResult<()>;

    fn get(&self, entity: EntityId, column: &str) -> Option<&Cell>;

    fn set(&mut self, entity: EntityId, column: &str, cell: Cell) -> MergeResult<()>;

    fn node_count(&self) -> usize {
        self.nodes().len()
    }

    fn edge_count(&self) -> usize {
        self.edges().len()
    }
}

// ============================================================================
// IN-MEMORY NETWORK
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Table {
    columns: Vec<(String, ColumnType)>,
    rows: HashMap<EntityId, HashMap<String, Cell>>,
}

impl Table {
    fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, ty)| *ty)
    }
}

/// Arena-style in-memory graph: ids are handed out sequentially and never
/// reused.
#[derive(Debug, Clone)]
pub struct Network {
    name: String,
    next_id: u64,
    nodes: Vec<EntityId>,
    edges: Vec<(EntityId, Endpoints)>,
    node_table: Table,
    edge_table: Table,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Network {
            name: name.into(),
            next_id: 1,
            nodes: Vec::new(),
            edges: Vec::new(),
            node_table: Table::default(),
            edge_table: Table::default(),
        }
    }

    fn next(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    fn table(&self, kind: TableKind) -> &Table {
        match kind {
            TableKind::Node => &self.node_table,
            TableKind::Edge => &self.edge_table,
        }
    }

    fn table_mut(&mut self, kind: TableKind) -> &mut Table {
        match kind {
            TableKind::Node => &mut self.node_table,
            TableKind::Edge => &mut self.edge_table,
        }
    }

    /// Builder: declare a node column
    pub fn with_node_column(mut self, column: &str, ty: ColumnType) -> Self {
        // A fresh network has no clashing columns.
        let _ = self.create_column(TableKind::Node, column, ty);
        self
    }

    /// Builder: declare an edge column
    pub fn with_edge_column(mut self, column: &str, ty: ColumnType) -> Self {
        let _ = self.create_column(TableKind::Edge, column, ty);
        self
    }

    /// Add a node and fill the given cells in one go.
    pub fn add_node_with<I, C>(&mut self, cells: I) -> MergeResult<EntityId>
    where
        I: IntoIterator<Item = (C, Cell)>,
        C: AsRef<str>,
    {
        let node = self.add_node();
        for (column, cell) in cells {
            self.set(node, column.as_ref(), cell)?;
        }
        Ok(node)
    }

    /// Find the first node whose `column` holds `cell`.
    pub fn find_node(&self, column: &str, cell: &Cell) -> Option<EntityId> {
        self.nodes
            .iter()
            .copied()
            .find(|n| self.get(*n, column) == Some(cell))
    }
}

impl GraphStore for Network {
    fn name(&self) -> &str {
        &self.name
    }

    fn nodes(&self) -> Vec<EntityId> {
        self.nodes.clone()
    }

    fn edges(&self) -> Vec<EntityId> {
        self.edges.iter().map(|(id, _)| *id).collect()
    }

    fn add_node(&mut self) -> EntityId {
        let id = self.next();
        self.nodes.push(id);
        id
    }

    fn add_edge(
        &mut self,
        source: EntityId,
        target: EntityId,
        directed: bool,
    ) -> MergeResult<EntityId> {
        for endpoint in [source, target] {
            if self.kind_of(endpoint) != Some(TableKind::Node) {
                return Err(MergeError::NoSuchEntity(endpoint));
            }
        }
        let id = self.next();
        self.edges.push((id, Endpoints { source, target, directed }));
        Ok(id)
    }

    fn endpoints(&self, edge: EntityId) -> Option<Endpoints> {
        // Ids are handed out in increasing order, so `edges` stays sorted.
        self.edges
            .binary_search_by_key(&edge, |(id, _)| *id)
            .ok()
            .map(|i| self.edges[i].1)
    }

    fn kind_of(&self, entity: EntityId) -> Option<TableKind> {
        if self.nodes.binary_search(&entity).is_ok() {
            Some(TableKind::Node)
        } else if self.edges.binary_search_by_key(&entity, |(id, _)| *id).is_ok() {
            Some(TableKind::Edge)
        } else {
            None
        }
    }

    fn columns(&self, table: TableKind) -> Vec<(String, ColumnType)> {
        self.table(table).columns.clone()
    }

    fn column_type(&self, table: TableKind, column: &str) -> Option<ColumnType> {
        self.table(table).column_type(column)
    }

    fn create_column(&mut self, table: TableKind, column: &str, ty: ColumnType) -> MergeResult<()> {
        let t = self.table_mut(table);
        match t.column_type(column) {
            Some(existing) if existing == ty => Ok(()),
            Some(existing) => Err(MergeError::ColumnTypeClash {
                column: column.to_string(),
                existing,
                requested: ty,
            }),
            None => {
                t.columns.push((column.to_string(), ty));
                Ok(())
            }
        }
    }

    fn get(&self, entity: EntityId, column: &str) -> Option<&Cell> {
        let kind = self.kind_of(entity)?;
        self.table(kind).rows.get(&entity)?.get(column)
    }

    fn set(&mut self, entity: EntityId, column: &str, cell: Cell) -> MergeResult<()> {
        let kind = self.kind_of(entity).ok_or(MergeError::NoSuchEntity(entity))?;
        let table = self.table_mut(kind);
        let expected = table
            .column_type(column)
            .ok_or_else(|| MergeError::NoSuchColumn(column.to_string()))?;
        if !cell.fits(expected) {
            return Err(MergeError::CellTypeMismatch {
                column: column.to_string(),
                expected,
            });
        }
        table
            .rows
            .entry(entity)
            .or_default()
            .insert(column.to_string(), cell);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_type::PlainType;

    #[test]
    fn test_ids_are_sequential_across_nodes_and_edges() {
        let mut net = Network::new("g");
        let a = net.add_node();
        let b = net.add_node();
        let e = net.add_edge(a, b, true).unwrap();
        let c = net.add_node();

        assert_eq!((a, b, e, c), (EntityId(1), EntityId(2), EntityId(3), EntityId(4)));
        assert_eq!(net.kind_of(c), Some(TableKind::Node));
        assert_eq!(net.kind_of(e), Some(TableKind::Edge));
        assert_eq!(net.kind_of(EntityId(99)), None);
    }

    #[test]
    fn test_set_and_get() {
        let mut net = Network::new("g").with_node_column("name", ColumnType::STRING);
        let n = net.add_node_with([("name", Cell::scalar("TP53"))]).unwrap();

        assert_eq!(net.get(n, "name"), Some(&Cell::scalar("TP53")));
        assert_eq!(net.get(n, "missing"), None);
        assert_eq!(net.find_node("name", &Cell::scalar("TP53")), Some(n));
    }

    #[test]
    fn test_set_rejects_wrong_type() {
        let mut net =
            Network::new("g").with_node_column("score", ColumnType::Scalar(PlainType::Double));
        let n = net.add_node();
        let err = net.set(n, "score", Cell::scalar("high")).unwrap_err();
        assert!(matches!(err, MergeError::CellTypeMismatch { .. }));
    }

    #[test]
    fn test_set_unknown_column() {
        let mut net = Network::new("g");
        let n = net.add_node();
        assert!(matches!(
            net.set(n, "nope", Cell::scalar(1)),
            Err(MergeError::NoSuchColumn(_))
        ));
    }

    #[test]
    fn test_node_and_edge_tables_are_separate() {
        let mut net = Network::new("g")
            .with_node_column("weight", ColumnType::Scalar(PlainType::Integer))
            .with_edge_column("weight", ColumnType::Scalar(PlainType::Double));
        let a = net.add_node();
        let b = net.add_node();
        let e = net.add_edge(a, b, false).unwrap();

        net.set(a, "weight", Cell::scalar(3)).unwrap();
        net.set(e, "weight", Cell::scalar(0.5)).unwrap();

        assert_eq!(net.get(e, "weight"), Some(&Cell::scalar(0.5)));
        assert_eq!(
            net.endpoints(e),
            Some(Endpoints { source: a, target: b, directed: false })
        );
    }

    #[test]
    fn test_create_column_clash() {
        let mut net = Network::new("g").with_node_column("x", ColumnType::STRING);
        assert!(net.create_column(TableKind::Node, "x", ColumnType::STRING).is_ok());
        assert!(matches!(
            net.create_column(TableKind::Node, "x", ColumnType::INTEGER),
            Err(MergeError::ColumnTypeClash { .. })
        ));
    }

    #[test]
    fn test_add_edge_requires_nodes() {
        let mut net = Network::new("g");
        let a = net.add_node();
        assert!(net.add_edge(a, EntityId(42), true).is_err());
    }

    #[test]
    fn test_endpoints_lookup_among_interleaved_ids() {
        let mut net = Network::new("g");
        let hub = net.add_node();
        let mut edges = Vec::new();
        for i in 0..500 {
            let leaf = net.add_node();
            let edge = net.add_edge(hub, leaf, i % 2 == 0).unwrap();
            edges.push((edge, leaf));
        }

        for (i, (edge, leaf)) in edges.iter().enumerate() {
            let ends = net.endpoints(*edge).unwrap();
            assert_eq!(ends.source, hub);
            assert_eq!(ends.target, *leaf);
            assert_eq!(ends.directed, i % 2 == 0);
        }
        assert_eq!(net.endpoints(hub), None);
        assert_eq!(net.endpoints(EntityId(100_000)), None);
    }
}
