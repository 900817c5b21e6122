// Error types for the merge engine

use crate::column_type::ColumnType;
use crate::network::{EntityId, GraphId};
use thiserror::Error;

/// Result type for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors raised by the merge engine.
///
/// Everything except `Predicate` is an invalid-configuration or
/// caller-contract error and is raised before the target graph is touched.
#[derive(Debug, Error)]
pub enum MergeError {
    /// No source graphs were supplied.
    #[error("at least one source network is required")]
    NoSources,

    /// A graph takes part in matching but has no matching column configured.
    #[error("no matching column configured for network {0}")]
    MissingMatchingColumn(GraphId),

    /// A configured column does not exist in the graph it refers to.
    #[error("column '{column}' not found in network {graph}")]
    UnknownColumn { graph: GraphId, column: String },

    /// A graph index outside the source list.
    #[error("network {0} is not part of this merge")]
    UnknownGraph(GraphId),

    /// A store was asked for an entity it does not hold.
    #[error("entity {0} does not exist")]
    NoSuchEntity(EntityId),

    /// A store was asked to write a column it does not declare.
    #[error("column '{0}' does not exist")]
    NoSuchColumn(String),

    /// An entity id that does not belong to the graph it was looked up in.
    #[error("entity {entity} not found in network {graph}")]
    UnknownEntity { graph: GraphId, entity: EntityId },

    /// A source column cannot be folded into its merged column.
    #[error("cannot merge '{column}' ({from}) into '{merged}' ({to})")]
    IncompatibleTypes {
        column: String,
        merged: String,
        from: ColumnType,
        to: ColumnType,
    },

    /// A column already exists with another type.
    #[error("column '{column}' already exists as {existing}, requested {requested}")]
    ColumnTypeClash {
        column: String,
        existing: ColumnType,
        requested: ColumnType,
    },

    /// A cell value does not fit the column it is written to.
    #[error("value for column '{column}' does not fit type {expected}")]
    CellTypeMismatch { column: String, expected: ColumnType },

    /// A source entity was already folded into a target entity.
    #[error("entity {entity} of network {graph} is already mapped to target {target}")]
    AlreadyMapped {
        graph: GraphId,
        entity: EntityId,
        target: EntityId,
    },

    /// The same column name is used for two different roles.
    #[error("column '{0}' is used more than once in the merge configuration")]
    DuplicateColumn(String),

    /// A compact column-merge record could not be parsed.
    #[error("invalid column merge record '{record}': {reason}")]
    InvalidRecord { record: String, reason: String },

    /// The equivalence predicate failed; aborts the run.
    #[error("equivalence test failed: {0}")]
    Predicate(String),
}

/// A single value could not be converted to the requested type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert {value} to {target}")]
pub struct CoercionError {
    pub value: String,
    pub target: ColumnType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_type::PlainType;

    #[test]
    fn test_error_messages() {
        let err = MergeError::MissingMatchingColumn(GraphId(2));
        assert_eq!(err.to_string(), "no matching column configured for network #2");

        let err = MergeError::IncompatibleTypes {
            column: "score".to_string(),
            merged: "score".to_string(),
            from: ColumnType::Scalar(PlainType::Double),
            to: ColumnType::Scalar(PlainType::Integer),
        };
        assert_eq!(
            err.to_string(),
            "cannot merge 'score' (Double) into 'score' (Integer)"
        );
    }

    #[test]
    fn test_coercion_error_message() {
        let err = CoercionError {
            value: "abc".to_string(),
            target: ColumnType::List(PlainType::Long),
        };
        assert_eq!(err.to_string(), "cannot convert abc to List<Long>");
    }
}
