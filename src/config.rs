// ⚙️ Merge Job - JSON description of one merge run
//
// A job names the input networks (CSV files), the set operation, how nodes
// are matched and which columns fold into which merged columns. Paths are
// relative to the job file.

use crate::column_type::ColumnType;
use crate::mapping::{AttributeMapping, MatchingColumns, MergedAttribute};
use crate::matcher::{ColumnMatcher, MatchStrategy};
use crate::merge::NetworkMerge;
use crate::network::{GraphId, GraphStore, TableKind};
use crate::node_merge::Operation;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn default_target_name() -> String {
    "merged".to_string()
}

/// One input network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSource {
    pub name: String,

    /// Node table (CSV)
    pub nodes: PathBuf,

    /// Edge table (CSV), optional
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edges: Option<PathBuf>,

    /// Node column used to decide correspondence
    pub matching_column: String,
}

/// A merged column and the source column each network feeds into it,
/// keyed by network name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub column_type: ColumnType,

    pub sources: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeJob {
    pub operation: Operation,

    pub networks: Vec<NetworkSource>,

    #[serde(default)]
    pub match_strategy: MatchStrategy,

    #[serde(default)]
    pub node_attributes: Vec<AttributeSpec>,

    #[serde(default)]
    pub edge_attributes: Vec<AttributeSpec>,

    /// Compact node column records, `colA,colB,...,merged,Type`
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub node_records: Vec<String>,

    /// Start from the suggested mapping (every column, compatible type);
    /// explicit attributes override suggestions of the same name.
    #[serde(default)]
    pub suggest_attributes: bool,

    #[serde(default)]
    pub match_column: Option<String>,

    #[serde(default)]
    pub count_column: Option<String>,

    #[serde(default)]
    pub within_network: bool,

    #[serde(default = "default_target_name")]
    pub target_name: String,

    /// Directory relative paths resolve against
    #[serde(skip)]
    base_dir: PathBuf,
}

impl MergeJob {
    /// Read and check a job file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read merge job: {}", path.display()))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_json(&text, base_dir)
            .with_context(|| format!("Invalid merge job: {}", path.display()))
    }

    pub fn from_json(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut job: MergeJob =
            serde_json::from_str(text).context("Failed to parse merge job JSON")?;
        job.base_dir = base_dir.into();
        job.check()?;
        Ok(job)
    }

    fn check(&self) -> Result<()> {
        if self.networks.is_empty() {
            bail!("merge job lists no networks");
        }
        for (i, network) in self.networks.iter().enumerate() {
            if network.name.trim().is_empty() {
                bail!("network #{} has no name", i);
            }
            if self.networks[..i].iter().any(|n| n.name == network.name) {
                bail!("network name '{}' is used twice", network.name);
            }
        }
        Ok(())
    }

    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Graph index of a network, by name.
    pub fn graph_id(&self, name: &str) -> Option<GraphId> {
        self.networks.iter().position(|n| n.name == name).map(GraphId)
    }

    pub fn matching_columns(&self) -> MatchingColumns {
        let mut columns = MatchingColumns::new();
        for (i, network) in self.networks.iter().enumerate() {
            columns.set(GraphId(i), network.matching_column.clone());
        }
        columns
    }

    pub fn predicate(&self) -> ColumnMatcher {
        ColumnMatcher::new(self.matching_columns(), self.match_strategy.clone())
    }

    fn attribute(&self, spec: &AttributeSpec) -> Result<MergedAttribute> {
        let mut attribute = MergedAttribute::new(spec.name.clone(), spec.column_type);
        for (network, column) in &spec.sources {
            let graph = self.graph_id(network).with_context(|| {
                format!("attribute '{}' refers to unknown network '{}'", spec.name, network)
            })?;
            attribute = attribute.from_graph(graph, column.clone());
        }
        Ok(attribute)
    }

    fn mapping<G: GraphStore>(
        &self,
        sources: &[G],
        table: TableKind,
        specs: &[AttributeSpec],
        records: &[String],
    ) -> Result<AttributeMapping> {
        let mut mapping = if self.suggest_attributes {
            AttributeMapping::suggest(sources, table)
        } else {
            AttributeMapping::new()
        };
        for record in records {
            mapping.push_record(record, self.networks.len())?;
        }
        for spec in specs {
            mapping.push(self.attribute(spec)?);
        }
        Ok(mapping)
    }

    pub fn node_mapping<G: GraphStore>(&self, sources: &[G]) -> Result<AttributeMapping> {
        self.mapping(sources, TableKind::Node, &self.node_attributes, &self.node_records)
    }

    pub fn edge_mapping<G: GraphStore>(&self, sources: &[G]) -> Result<AttributeMapping> {
        self.mapping(sources, TableKind::Edge, &self.edge_attributes, &[])
    }

    /// Turn the job into a ready-to-run merge over the loaded `sources`.
    pub fn resolve<G: GraphStore>(&self, sources: &[G]) -> Result<NetworkMerge> {
        let mut merge = NetworkMerge::new(
            self.operation,
            self.node_mapping(sources)?,
            self.matching_columns(),
        )
        .with_edge_mapping(self.edge_mapping(sources)?)
        .within_network(self.within_network);
        if let Some(column) = &self.match_column {
            merge = merge.with_match_column(column.clone());
        }
        if let Some(column) = &self.count_column {
            merge = merge.with_count_column(column.clone());
        }
        Ok(merge)
    }

    /// Stable hash of the job content, used to tag stored runs.
    pub fn fingerprint(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hasher = Sha256::new();
        hasher.update(canonical);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
