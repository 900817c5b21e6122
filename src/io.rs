// 📂 I/O - CSV networks in, CSV + SQLite results out
//
// CSV layout
//   nodes: first column is the node key; headers may carry a type as
//          `name:Type` (default String); list elements are separated by `|`;
//          an empty cell is null
//   edges: `source`, `target` (node keys), optional `directed:Boolean`
//          (default true), then attribute columns
//
// SQLite keeps one row per run plus the merged nodes, edges and conflicts.

use crate::column_type::{Cell, ColumnType, PlainType, Value};
use crate::config::{MergeJob, NetworkSource};
use crate::merge::MergeReport;
use crate::network::{EntityId, GraphStore, Network, TableKind};
use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const LIST_SEPARATOR: char = '|';

// ============================================================================
// CELLS & HEADERS
// ============================================================================

/// Split `name:Type` into its parts. A bare name is a String column.
pub fn parse_header(header: &str) -> Result<(String, ColumnType)> {
    let header = header.trim();
    let (name, ty) = match header.rsplit_once(':') {
        Some((name, ty)) => {
            let ty: ColumnType = ty
                .parse()
                .map_err(|e: String| anyhow!(e))
                .with_context(|| format!("Invalid column header '{}'", header))?;
            (name.trim(), ty)
        }
        None => (header, ColumnType::STRING),
    };
    if name.is_empty() {
        bail!("Empty column name in header '{}'", header);
    }
    Ok((name.to_string(), ty))
}

/// Parse one CSV cell; empty text is null.
pub fn parse_cell(text: &str, ty: ColumnType) -> Result<Option<Cell>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let cell = match ty {
        ColumnType::Scalar(p) => Cell::Scalar(Value::parse(text, p)?),
        ColumnType::List(p) => Cell::List(
            text.split(LIST_SEPARATOR)
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| Value::parse(part, p))
                .collect::<Result<Vec<_>, _>>()?,
        ),
    };
    Ok(Some(cell))
}

pub fn format_cell(cell: Option<&Cell>) -> String {
    match cell {
        None => String::new(),
        Some(Cell::Scalar(v)) => v.to_string(),
        Some(Cell::List(vs)) => vs
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(&LIST_SEPARATOR.to_string()),
    }
}

fn headers_of(record: &StringRecord) -> Result<Vec<(String, ColumnType)>> {
    record.iter().map(parse_header).collect()
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// Read a node table into `network`, returning node key → node id.
pub fn read_nodes<R: Read>(network: &mut Network, reader: R) -> Result<HashMap<String, EntityId>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(reader);
    let columns = headers_of(rdr.headers().context("Failed to read node header")?)?;
    if columns.is_empty() {
        bail!("Node table has no columns");
    }
    for (name, ty) in &columns {
        network.create_column(TableKind::Node, name, *ty)?;
    }

    let mut keys = HashMap::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse node line {}", line + 2))?;
        let key = record.get(0).unwrap_or("").trim().to_string();
        if key.is_empty() {
            bail!("Node line {} has an empty key", line + 2);
        }
        if keys.contains_key(&key) {
            bail!("Duplicate node key '{}' on line {}", key, line + 2);
        }

        let node = network.add_node();
        for ((name, ty), text) in columns.iter().zip(record.iter()) {
            let cell = parse_cell(text, *ty)
                .with_context(|| format!("Bad value for '{}' on node line {}", name, line + 2))?;
            if let Some(cell) = cell {
                network.set(node, name, cell)?;
            }
        }
        keys.insert(key, node);
    }

    debug!(network = network.name(), nodes = keys.len(), "node table loaded");
    Ok(keys)
}

/// Read an edge table into `network`; endpoints are looked up in `keys`.
pub fn read_edges<R: Read>(
    network: &mut Network,
    reader: R,
    keys: &HashMap<String, EntityId>,
) -> Result<usize> {
    let mut rdr = ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(reader);
    let columns = headers_of(rdr.headers().context("Failed to read edge header")?)?;

    let named = |i: usize, expected: &str| {
        columns
            .get(i)
            .map(|(name, _)| name.eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    };
    if !named(0, "source") || !named(1, "target") {
        bail!("Edge table must start with 'source' and 'target' columns");
    }
    let directed_at = columns.iter().position(|(name, _)| name.eq_ignore_ascii_case("directed"));
    for (i, (name, ty)) in columns.iter().enumerate().skip(2) {
        if Some(i) != directed_at {
            network.create_column(TableKind::Edge, name, *ty)?;
        }
    }

    let endpoint = |record: &StringRecord, i: usize, line: usize| -> Result<EntityId> {
        let key = record.get(i).unwrap_or("").trim();
        keys.get(key)
            .copied()
            .ok_or_else(|| anyhow!("Unknown node '{}' on edge line {}", key, line + 2))
    };

    let mut count = 0;
    for (line, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse edge line {}", line + 2))?;
        let source = endpoint(&record, 0, line)?;
        let target = endpoint(&record, 1, line)?;
        let directed = match directed_at.and_then(|i| record.get(i)) {
            Some(text) if !text.trim().is_empty() => match Value::parse(text, PlainType::Boolean)? {
                Value::Boolean(b) => b,
                _ => true,
            },
            _ => true,
        };

        let edge = network.add_edge(source, target, directed)?;
        for (i, ((name, ty), text)) in columns.iter().zip(record.iter()).enumerate().skip(2) {
            if Some(i) == directed_at {
                continue;
            }
            let cell = parse_cell(text, *ty)
                .with_context(|| format!("Bad value for '{}' on edge line {}", name, line + 2))?;
            if let Some(cell) = cell {
                network.set(edge, name, cell)?;
            }
        }
        count += 1;
    }

    debug!(network = network.name(), edges = count, "edge table loaded");
    Ok(count)
}

/// Load one network of a job from its CSV files.
pub fn load_network(job: &MergeJob, source: &NetworkSource) -> Result<Network> {
    let mut network = Network::new(source.name.clone());

    let path = job.resolve_path(&source.nodes);
    let file = File::open(&path)
        .with_context(|| format!("Failed to open node table: {}", path.display()))?;
    let keys = read_nodes(&mut network, file).with_context(|| format!("In {}", path.display()))?;

    if let Some(edges) = &source.edges {
        let path = job.resolve_path(edges);
        let file = File::open(&path)
            .with_context(|| format!("Failed to open edge table: {}", path.display()))?;
        read_edges(&mut network, file, &keys).with_context(|| format!("In {}", path.display()))?;
    }
    Ok(network)
}

/// Load every network of a job, in job order.
pub fn load_sources(job: &MergeJob) -> Result<Vec<Network>> {
    job.networks.iter().map(|source| load_network(job, source)).collect()
}

// ============================================================================
// CSV EXPORT
// ============================================================================

fn typed_header(name: &str, ty: ColumnType) -> String {
    format!("{}:{}", name, ty)
}

/// Nodes keyed by their id, so exported edges can refer to them.
pub fn write_nodes<W: Write>(network: &Network, writer: W) -> Result<()> {
    let columns = network.columns(TableKind::Node);
    let mut wtr = WriterBuilder::new().from_writer(writer);

    let mut header = vec![typed_header("id", ColumnType::Scalar(PlainType::Long))];
    header.extend(columns.iter().map(|(name, ty)| typed_header(name, *ty)));
    wtr.write_record(&header)?;

    for node in network.nodes() {
        let mut row = vec![node.to_string()];
        row.extend(columns.iter().map(|(name, _)| format_cell(network.get(node, name))));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_edges<W: Write>(network: &Network, writer: W) -> Result<()> {
    let columns = network.columns(TableKind::Edge);
    let mut wtr = WriterBuilder::new().from_writer(writer);

    let mut header = vec![
        "source".to_string(),
        "target".to_string(),
        typed_header("directed", ColumnType::Scalar(PlainType::Boolean)),
    ];
    header.extend(columns.iter().map(|(name, ty)| typed_header(name, *ty)));
    wtr.write_record(&header)?;

    for edge in network.edges() {
        let Some(ends) = network.endpoints(edge) else {
            continue;
        };
        let mut row = vec![
            ends.source.to_string(),
            ends.target.to_string(),
            ends.directed.to_string(),
        ];
        row.extend(columns.iter().map(|(name, _)| format_cell(network.get(edge, name))));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write `<name>_nodes.csv` and `<name>_edges.csv` into `dir`.
pub fn export_csv(network: &Network, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let nodes_path = dir.join(format!("{}_nodes.csv", network.name()));
    let file = File::create(&nodes_path)
        .with_context(|| format!("Failed to create {}", nodes_path.display()))?;
    write_nodes(network, file)?;

    let edges_path = dir.join(format!("{}_edges.csv", network.name()));
    let file = File::create(&edges_path)
        .with_context(|| format!("Failed to create {}", edges_path.display()))?;
    write_edges(network, file)?;

    info!(nodes = %nodes_path.display(), edges = %edges_path.display(), "merged network exported");
    Ok((nodes_path, edges_path))
}

// ============================================================================
// SQLITE EXPORT
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS merge_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            job_hash TEXT NOT NULL,
            operation TEXT NOT NULL,
            network_name TEXT NOT NULL,
            node_count INTEGER NOT NULL,
            edge_count INTEGER NOT NULL,
            conflict_count INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS merged_nodes (
            run_id TEXT NOT NULL REFERENCES merge_runs(run_id),
            node_id INTEGER NOT NULL,
            attributes TEXT NOT NULL,
            sources TEXT NOT NULL,
            PRIMARY KEY (run_id, node_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS merged_edges (
            run_id TEXT NOT NULL REFERENCES merge_runs(run_id),
            edge_id INTEGER NOT NULL,
            source_id INTEGER NOT NULL,
            target_id INTEGER NOT NULL,
            directed INTEGER NOT NULL,
            attributes TEXT NOT NULL,
            PRIMARY KEY (run_id, edge_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL REFERENCES merge_runs(run_id),
            source_graph INTEGER NOT NULL,
            source_entity INTEGER NOT NULL,
            source_column TEXT NOT NULL,
            target_entity INTEGER NOT NULL,
            target_column TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_merge_runs_job ON merge_runs(job_hash)",
        [],
    )?;

    Ok(())
}

/// Attribute cells of one entity as a JSON object (nulls omitted).
fn attributes_json(network: &Network, entity: EntityId, table: TableKind) -> Result<String> {
    let mut object = serde_json::Map::new();
    for (name, _) in network.columns(table) {
        if let Some(cell) = network.get(entity, &name) {
            object.insert(name, serde_json::to_value(cell)?);
        }
    }
    Ok(serde_json::Value::Object(object).to_string())
}

/// Store a finished run; returns its run id.
pub fn save_run(
    conn: &mut Connection,
    job_hash: &str,
    network: &Network,
    report: &MergeReport,
) -> Result<String> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO merge_runs (
            run_id, job_hash, operation, network_name,
            node_count, edge_count, conflict_count, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            run_id,
            job_hash,
            report.operation.as_str(),
            network.name(),
            report.nodes as i64,
            report.edges as i64,
            report.conflicts.len() as i64,
            Utc::now().to_rfc3339(),
        ],
    )?;

    for node in network.nodes() {
        let sources: Vec<String> = report
            .node_map
            .sources_of(node)
            .iter()
            .map(|s| s.to_string())
            .collect();
        tx.execute(
            "INSERT INTO merged_nodes (run_id, node_id, attributes, sources)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                run_id,
                node.0 as i64,
                attributes_json(network, node, TableKind::Node)?,
                serde_json::to_string(&sources)?,
            ],
        )?;
    }

    for edge in network.edges() {
        let Some(ends) = network.endpoints(edge) else {
            continue;
        };
        tx.execute(
            "INSERT INTO merged_edges (run_id, edge_id, source_id, target_id, directed, attributes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                edge.0 as i64,
                ends.source.0 as i64,
                ends.target.0 as i64,
                ends.directed,
                attributes_json(network, edge, TableKind::Edge)?,
            ],
        )?;
    }

    for conflict in &report.conflicts {
        tx.execute(
            "INSERT INTO conflicts (
                run_id, source_graph, source_entity, source_column, target_entity, target_column
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                conflict.source.graph.0 as i64,
                conflict.source.entity.0 as i64,
                conflict.source_column,
                conflict.target.0 as i64,
                conflict.target_column,
            ],
        )?;
    }

    tx.commit()?;
    info!(run_id = %run_id, nodes = report.nodes, edges = report.edges, "merge run stored");
    Ok(run_id)
}

pub fn count_runs(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM merge_runs", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictCollector;
    use std::io::Cursor;

    const NODES: &str = "name,score:Double,aliases:List<String>,essential:Boolean\n\
                         BRCA1,0.9,RNF53|BRCC1,true\n\
                         TP53,,P53,\n\
                         EGFR,0.4,,false\n";

    const EDGES: &str = "source,target,directed:Boolean,evidence\n\
                         BRCA1,TP53,false,experimental\n\
                         TP53,EGFR,,\n";

    fn load() -> Network {
        let mut net = Network::new("string");
        let keys = read_nodes(&mut net, Cursor::new(NODES)).unwrap();
        read_edges(&mut net, Cursor::new(EDGES), &keys).unwrap();
        net
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header("name").unwrap(), ("name".to_string(), ColumnType::STRING));
        assert_eq!(
            parse_header(" tags:List<String> ").unwrap(),
            ("tags".to_string(), ColumnType::List(PlainType::String))
        );
        assert!(parse_header("score:Decimal").is_err());
        assert!(parse_header(":Double").is_err());
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell("", ColumnType::INTEGER).unwrap(), None);
        assert_eq!(parse_cell(" 42 ", ColumnType::INTEGER).unwrap(), Some(Cell::scalar(42)));
        assert_eq!(
            parse_cell("a| b |", ColumnType::List(PlainType::String)).unwrap(),
            Some(Cell::list(["a", "b"]))
        );
        assert!(parse_cell("forty", ColumnType::INTEGER).is_err());
    }

    #[test]
    fn test_read_network() {
        let net = load();

        assert_eq!(net.node_count(), 3);
        assert_eq!(net.edge_count(), 2);
        let brca1 = net.find_node("name", &Cell::scalar("BRCA1")).unwrap();
        assert_eq!(net.get(brca1, "aliases"), Some(&Cell::list(["RNF53", "BRCC1"])));
        assert_eq!(net.get(brca1, "essential"), Some(&Cell::scalar(true)));

        let tp53 = net.find_node("name", &Cell::scalar("TP53")).unwrap();
        assert_eq!(net.get(tp53, "score"), None);

        let edges = net.edges();
        assert!(!net.endpoints(edges[0]).unwrap().directed);
        assert!(net.endpoints(edges[1]).unwrap().directed);
        assert_eq!(net.get(edges[1], "evidence"), None);
        assert_eq!(net.column_type(TableKind::Edge, "directed"), None);
    }

    #[test]
    fn test_read_edges_unknown_node() {
        let mut net = Network::new("g");
        let keys = read_nodes(&mut net, Cursor::new("name\nA\n")).unwrap();
        let err = read_edges(&mut net, Cursor::new("source,target\nA,B\n"), &keys).unwrap_err();
        assert!(err.to_string().contains("Unknown node 'B'"));
    }

    #[test]
    fn test_duplicate_node_key() {
        let mut net = Network::new("g");
        let err = read_nodes(&mut net, Cursor::new("name\nA\nA\n")).unwrap_err();
        assert!(err.to_string().contains("Duplicate node key"));
    }

    #[test]
    fn test_export_reimports() {
        let net = load();
        let dir = tempfile::tempdir().unwrap();

        let (nodes_path, edges_path) = export_csv(&net, dir.path()).unwrap();

        let mut again = Network::new("again");
        let keys = read_nodes(&mut again, File::open(&nodes_path).unwrap()).unwrap();
        read_edges(&mut again, File::open(&edges_path).unwrap(), &keys).unwrap();

        assert_eq!(again.node_count(), 3);
        assert_eq!(again.edge_count(), 2);
        let brca1 = again.find_node("name", &Cell::scalar("BRCA1")).unwrap();
        assert_eq!(again.get(brca1, "aliases"), Some(&Cell::list(["RNF53", "BRCC1"])));
        assert_eq!(again.get(brca1, "score"), Some(&Cell::scalar(0.9)));
    }

    #[test]
    fn test_load_sources_from_job_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_nodes.csv"), NODES).unwrap();
        std::fs::write(dir.path().join("a_edges.csv"), EDGES).unwrap();
        std::fs::write(dir.path().join("b_nodes.csv"), "gene,score:Double\nbrca1,0.7\n").unwrap();
        let job_path = dir.path().join("job.json");
        std::fs::write(
            &job_path,
            r#"{ "operation": "union", "networks": [
                { "name": "a", "nodes": "a_nodes.csv", "edges": "a_edges.csv",
                  "matching_column": "name" },
                { "name": "b", "nodes": "b_nodes.csv", "matching_column": "gene" }
            ] }"#,
        )
        .unwrap();

        let job = MergeJob::load(&job_path).unwrap();
        let sources = load_sources(&job).unwrap();

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].edge_count(), 2);
        assert_eq!(sources[1].node_count(), 1);
    }

    #[test]
    fn test_save_run() {
        let a = load();
        let mut b = Network::new("biogrid");
        read_nodes(&mut b, Cursor::new("name,score:Double\nBRCA1,0.5\n")).unwrap();
        let sources = vec![a, b];

        let job = MergeJob::from_json(
            r#"{ "operation": "union", "suggest_attributes": true, "networks": [
                { "name": "string", "nodes": "a.csv", "matching_column": "name" },
                { "name": "biogrid", "nodes": "b.csv", "matching_column": "name" }
            ] }"#,
            ".",
        )
        .unwrap();
        let mut merged = Network::new("merged");
        let mut collector = ConflictCollector::new();
        let report = job
            .resolve(&sources)
            .unwrap()
            .run(&sources, &mut merged, &job.predicate(), Some(&mut collector))
            .unwrap();

        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let run_id = save_run(&mut conn, &job.fingerprint().unwrap(), &merged, &report).unwrap();

        assert_eq!(count_runs(&conn).unwrap(), 1);
        let nodes: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM merged_nodes WHERE run_id = ?1",
                [&run_id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(nodes, 3);
        let conflicts: i64 = conn
            .query_row("SELECT COUNT(*) FROM conflicts WHERE run_id = ?1", [&run_id], |r| r.get(0))
            .unwrap();
        assert_eq!(conflicts, 1);
        let sources_json: String = conn
            .query_row(
                "SELECT sources FROM merged_nodes WHERE run_id = ?1 ORDER BY node_id LIMIT 1",
                [&run_id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(sources_json, r##"["#0:1","#1:1"]"##);
    }
}
