// 🗺️ Attribute Mapping - which source columns fold into which merged column
// Read-only configuration for the merge engine. Each merged attribute names
// its type and, per source graph, the original column feeding it.

use crate::column_type::ColumnType;
use crate::error::{MergeError, MergeResult};
use crate::network::{GraphId, GraphStore, TableKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// MERGED ATTRIBUTE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedAttribute {
    /// Column name in the target graph
    pub name: String,

    /// Type of the target column
    pub column_type: ColumnType,

    /// Original column per contributing graph; absent graphs do not contribute
    pub sources: BTreeMap<GraphId, String>,
}

impl MergedAttribute {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        MergedAttribute {
            name: name.into(),
            column_type,
            sources: BTreeMap::new(),
        }
    }

    /// Builder: let `graph` contribute its column `column`
    pub fn from_graph(mut self, graph: GraphId, column: impl Into<String>) -> Self {
        self.sources.insert(graph, column.into());
        self
    }

    pub fn source_column(&self, graph: GraphId) -> Option<&str> {
        self.sources.get(&graph).map(String::as_str)
    }
}

// ============================================================================
// ATTRIBUTE MAPPING
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeMapping {
    attributes: Vec<MergedAttribute>,
}

impl AttributeMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a merged attribute
    pub fn with(mut self, attribute: MergedAttribute) -> Self {
        self.push(attribute);
        self
    }

    /// Add or replace the merged attribute with the same name.
    pub fn push(&mut self, attribute: MergedAttribute) {
        match self.attributes.iter_mut().find(|a| a.name == attribute.name) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    /// Parse a compact record `colA,colB,...,merged,Type` with one source
    /// column per graph (empty = graph does not contribute).
    pub fn push_record(&mut self, record: &str, graph_count: usize) -> MergeResult<()> {
        let invalid = |reason: String| MergeError::InvalidRecord {
            record: record.to_string(),
            reason,
        };

        let fields: Vec<&str> = record.split(',').map(str::trim).collect();
        if fields.len() != graph_count + 2 {
            return Err(invalid(format!(
                "expected {} fields for {} networks, found {}",
                graph_count + 2,
                graph_count,
                fields.len()
            )));
        }

        let name = fields[graph_count];
        if name.is_empty() {
            return Err(invalid("merged column name is empty".to_string()));
        }
        let column_type: ColumnType = fields[graph_count + 1].parse().map_err(invalid)?;

        let mut attribute = MergedAttribute::new(name, column_type);
        for (i, column) in fields[..graph_count].iter().enumerate() {
            if !column.is_empty() {
                attribute = attribute.from_graph(GraphId(i), *column);
            }
        }
        self.push(attribute);
        Ok(())
    }

    /// Default mapping: every column of every graph becomes a merged
    /// attribute of the same name, typed to fit all of its sources.
    pub fn suggest<G: GraphStore>(sources: &[G], table: TableKind) -> Self {
        let mut mapping = AttributeMapping::new();
        let mut seen: Vec<(String, Vec<(GraphId, ColumnType)>)> = Vec::new();

        for (i, graph) in sources.iter().enumerate() {
            for (column, ty) in graph.columns(table) {
                match seen.iter_mut().find(|(name, _)| *name == column) {
                    Some((_, contributors)) => contributors.push((GraphId(i), ty)),
                    None => seen.push((column, vec![(GraphId(i), ty)])),
                }
            }
        }

        for (name, contributors) in seen {
            let ty = ColumnType::compatible_type(contributors.iter().map(|(_, t)| *t));
            let mut attribute = MergedAttribute::new(name.clone(), ty);
            for (graph, _) in contributors {
                attribute = attribute.from_graph(graph, name.clone());
            }
            mapping.push(attribute);
        }
        mapping
    }

    pub fn attributes(&self) -> &[MergedAttribute] {
        &self.attributes
    }

    pub fn get(&self, name: &str) -> Option<&MergedAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Check every reference against the sources: graphs must exist, source
    /// columns must exist in the given table, and their types must convert
    /// to the merged type.
    pub fn validate<G: GraphStore>(&self, sources: &[G], table: TableKind) -> MergeResult<()> {
        let mut names: Vec<&str> = Vec::new();
        for attribute in &self.attributes {
            if names.contains(&attribute.name.as_str()) {
                return Err(MergeError::DuplicateColumn(attribute.name.clone()));
            }
            names.push(&attribute.name);

            for (graph, column) in &attribute.sources {
                let source = sources.get(graph.0).ok_or(MergeError::UnknownGraph(*graph))?;
                let from = source
                    .column_type(table, column)
                    .ok_or_else(|| MergeError::UnknownColumn {
                        graph: *graph,
                        column: column.clone(),
                    })?;
                if !from.can_convert_to(attribute.column_type) {
                    return Err(MergeError::IncompatibleTypes {
                        column: column.clone(),
                        merged: attribute.name.clone(),
                        from,
                        to: attribute.column_type,
                    });
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// MATCHING COLUMNS
// ============================================================================

/// Per-graph column used to decide node correspondence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchingColumns {
    columns: BTreeMap<GraphId, String>,
}

impl MatchingColumns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same column name in the first `graph_count` graphs.
    pub fn uniform(column: &str, graph_count: usize) -> Self {
        let mut columns = MatchingColumns::new();
        for i in 0..graph_count {
            columns.set(GraphId(i), column);
        }
        columns
    }

    pub fn with(mut self, graph: GraphId, column: impl Into<String>) -> Self {
        self.set(graph, column);
        self
    }

    pub fn set(&mut self, graph: GraphId, column: impl Into<String>) {
        self.columns.insert(graph, column.into());
    }

    pub fn get(&self, graph: GraphId) -> Option<&str> {
        self.columns.get(&graph).map(String::as_str)
    }

    /// Every source graph needs a matching column that exists in its node
    /// table.
    pub fn validate<G: GraphStore>(&self, sources: &[G]) -> MergeResult<()> {
        for (i, source) in sources.iter().enumerate() {
            let graph = GraphId(i);
            let column = self.get(graph).ok_or(MergeError::MissingMatchingColumn(graph))?;
            if source.column_type(TableKind::Node, column).is_none() {
                return Err(MergeError::UnknownColumn {
                    graph,
                    column: column.to_string(),
                });
            }
        }
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
    use crate::network::Network;

    fn networks() -> Vec<Network> {
        vec![
            Network::new("a")
                .with_node_column("name", ColumnType::STRING)
                .with_node_column("score", ColumnType::INTEGER),
            Network::new("b")
                .with_node_column("name", ColumnType::STRING)
                .with_node_column("score", ColumnType::Scalar(PlainType::Double))
                .with_node_column("tags", ColumnType::List(PlainType::String)),
        ]
    }

    #[test]
    fn test_push_record() {
        let mut mapping = AttributeMapping::new();
        mapping.push_record("score,rating,score,Double", 2).unwrap();

        let attr = mapping.get("score").unwrap();
        assert_eq!(attr.column_type, ColumnType::Scalar(PlainType::Double));
        assert_eq!(attr.source_column(GraphId(0)), Some("score"));
        assert_eq!(attr.source_column(GraphId(1)), Some("rating"));
    }

    #[test]
    fn test_push_record_skips_empty_columns() {
        let mut mapping = AttributeMapping::new();
        mapping.push_record(",tags,tags,List<String>", 2).unwrap();
        let attr = mapping.get("tags").unwrap();
        assert_eq!(attr.source_column(GraphId(0)), None);
        assert_eq!(attr.source_column(GraphId(1)), Some("tags"));
    }

    #[test]
    fn test_push_record_wrong_field_count() {
        let mut mapping = AttributeMapping::new();
        let err = mapping.push_record("a,b,merged,String", 3).unwrap_err();
        assert!(matches!(err, MergeError::InvalidRecord { .. }));
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_push_replaces_same_name() {
        let mapping = AttributeMapping::new()
            .with(MergedAttribute::new("x", ColumnType::STRING))
            .with(MergedAttribute::new("x", ColumnType::INTEGER));
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("x").unwrap().column_type, ColumnType::INTEGER);
    }

    #[test]
    fn test_suggest_uses_compatible_types() {
        let mapping = AttributeMapping::suggest(&networks(), TableKind::Node);

        assert_eq!(mapping.len(), 3);
        let score = mapping.get("score").unwrap();
        assert_eq!(score.column_type, ColumnType::Scalar(PlainType::Double));
        assert_eq!(score.sources.len(), 2);
        let tags = mapping.get("tags").unwrap();
        assert_eq!(tags.source_column(GraphId(0)), None);
        assert!(mapping.validate(&networks(), TableKind::Node).is_ok());
    }

    #[test]
    fn test_validate_rejects_narrowing() {
        let mapping = AttributeMapping::new().with(
            MergedAttribute::new("score", ColumnType::INTEGER)
                .from_graph(GraphId(0), "score")
                .from_graph(GraphId(1), "score"),
        );
        let err = mapping.validate(&networks(), TableKind::Node).unwrap_err();
        assert!(matches!(err, MergeError::IncompatibleTypes { .. }));
    }

    #[test]
    fn test_validate_rejects_unknown_graph_and_column() {
        let mapping = AttributeMapping::new()
            .with(MergedAttribute::new("name", ColumnType::STRING).from_graph(GraphId(5), "name"));
        assert!(matches!(
            mapping.validate(&networks(), TableKind::Node),
            Err(MergeError::UnknownGraph(GraphId(5)))
        ));

        let mapping = AttributeMapping::new()
            .with(MergedAttribute::new("name", ColumnType::STRING).from_graph(GraphId(0), "label"));
        assert!(matches!(
            mapping.validate(&networks(), TableKind::Node),
            Err(MergeError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_matching_columns_validate() {
        let nets = networks();
        assert!(MatchingColumns::uniform("name", 2).validate(&nets).is_ok());

        let partial = MatchingColumns::new().with(GraphId(0), "name");
        assert!(matches!(
            partial.validate(&nets),
            Err(MergeError::MissingMatchingColumn(GraphId(1)))
        ));

        let wrong = MatchingColumns::uniform("label", 2);
        assert!(matches!(wrong.validate(&nets), Err(MergeError::UnknownColumn { .. })));
    }
}
