// Network Merge - Core Library
// Merges several attributed networks into one: match nodes, apply a set
// operation, fold attributes, record conflicts.

pub mod column_type;
pub mod error;
pub mod network;
pub mod conflict;
pub mod mapping;
pub mod attribute_merge; // Shared node/edge merge rule
pub mod matcher;         // Node grouping
pub mod node_merge;      // UNION / INTERSECTION / DIFFERENCE
pub mod edge_merge;
pub mod merge;           // Run orchestration
pub mod config;          // JSON merge jobs
pub mod io;              // CSV + SQLite

// Re-export commonly used types
pub use column_type::{Cell, ColumnType, PlainType, Value};
pub use error::{CoercionError, MergeError, MergeResult};
pub use network::{Endpoints, EntityId, EntitySpec, GraphId, GraphStore, Network, TableKind};
pub use conflict::{ConflictCollector, ConflictRecord, ConflictSink};
pub use mapping::{AttributeMapping, MatchingColumns, MergedAttribute};
pub use attribute_merge::{AttributeMerger, MergeOutcome, MergeSource};
pub use matcher::{
    ColumnMatcher, EquivalencePredicate, Group, Grouping, MatchMemo, MatchStrategy, NodeMatcher,
    NodeRef,
};
pub use node_merge::{IdentityMap, NodeMerger, Operation};
pub use edge_merge::{EdgeCorrespondence, EdgeGroup, EdgeMerger, EndpointCorrespondence};
pub use merge::{MergeReport, NetworkMerge};
pub use config::{AttributeSpec, MergeJob, NetworkSource};
pub use io::{
    count_runs, export_csv, load_network, load_sources, read_edges, read_nodes, save_run,
    setup_database,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
