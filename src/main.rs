use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use network_merge::{
    export_csv, load_sources, save_run, setup_database, AttributeMapping, ColumnType,
    ConflictCollector, GraphStore, MergeJob, Network, TableKind,
};

fn cli() -> Command {
    Command::new("network-merge")
        .version(network_merge::VERSION)
        .about("Merge attributed networks by union, intersection or difference.")
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .global(true)
                .help("Log level (trace, debug, info, warn, error); RUST_LOG wins when set"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("run")
                .about("Run a merge job")
                .arg(Arg::new("job").value_name("JOB").required(true).help("Merge job file (JSON)"))
                .arg(
                    Arg::new("out")
                        .long("out")
                        .value_name("DIR")
                        .help("Directory for the merged node and edge CSV files"),
                )
                .arg(
                    Arg::new("sqlite")
                        .long("sqlite")
                        .value_name("FILE")
                        .help("SQLite database to record the run in"),
                ),
        )
        .subcommand(
            Command::new("columns")
                .about("List each network's columns and the suggested merged types")
                .arg(
                    Arg::new("job")
                        .value_name("JOB")
                        .required(true)
                        .help("Merge job file (JSON)"),
                ),
        )
}

fn init_logging(matches: &ArgMatches) {
    let level = matches.get_one::<String>("log-level").map(String::as_str).unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(&matches);

    match matches.subcommand() {
        Some(("run", sub)) => run(sub),
        Some(("columns", sub)) => columns(sub),
        _ => Ok(()),
    }
}

fn job_path(matches: &ArgMatches) -> Result<&Path> {
    matches
        .get_one::<String>("job")
        .map(Path::new)
        .context("Missing merge job path")
}

fn run(matches: &ArgMatches) -> Result<()> {
    println!("🔀 Network Merge v{}", network_merge::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load job and networks
    let job = MergeJob::load(job_path(matches)?)?;
    let sources = load_sources(&job)?;
    println!("\n📂 Loaded {} networks ({})", sources.len(), job.operation);
    for network in &sources {
        println!(
            "   {:<20} {:>8} nodes {:>8} edges",
            network.name(),
            network.node_count(),
            network.edge_count()
        );
    }

    // 2. Merge
    let merge = job.resolve(&sources)?;
    let mut merged = Network::new(job.target_name.clone());
    let mut conflicts = ConflictCollector::new();
    let report = merge
        .run(&sources, &mut merged, &job.predicate(), Some(&mut conflicts))
        .context("Merge failed")?;

    println!("\n✓ {} groups, {} unmatched", report.groups, report.unmatched);
    println!(
        "✓ Merged network '{}': {} nodes, {} edges",
        merged.name(),
        report.nodes,
        report.edges
    );
    if conflicts.is_empty() {
        println!("✓ No conflicts");
    } else {
        println!("⚠️  {} conflicts (first value kept):", conflicts.len());
        for conflict in conflicts.records().iter().take(20) {
            println!(
                "   {} '{}' → target {} '{}'",
                conflict.source, conflict.source_column, conflict.target, conflict.target_column
            );
        }
        if conflicts.len() > 20 {
            println!("   ... and {} more", conflicts.len() - 20);
        }
    }

    // 3. Outputs
    if let Some(dir) = matches.get_one::<String>("out") {
        let (nodes, edges) = export_csv(&merged, &PathBuf::from(dir))?;
        println!("\n💾 Wrote {} and {}", nodes.display(), edges.display());
    }

    if let Some(db) = matches.get_one::<String>("sqlite") {
        let mut conn =
            Connection::open(db).with_context(|| format!("Failed to open database: {}", db))?;
        setup_database(&conn)?;
        let run_id = save_run(&mut conn, &job.fingerprint()?, &merged, &report)?;
        println!("\n🗄️  Recorded run {} in {}", run_id, db);
    }

    Ok(())
}

fn columns(matches: &ArgMatches) -> Result<()> {
    let job = MergeJob::load(job_path(matches)?)?;
    let sources = load_sources(&job)?;

    for (table, label) in [(TableKind::Node, "Node"), (TableKind::Edge, "Edge")] {
        println!("\n📋 {} columns", label);
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for network in &sources {
            let columns: Vec<String> = network
                .columns(table)
                .into_iter()
                .map(|(name, ty)| format!("{}:{}", name, ty))
                .collect();
            println!("   {:<20} {}", network.name(), columns.join(", "));
        }

        println!("\n   Suggested merged columns:");
        for attribute in AttributeMapping::suggest(&sources, table).attributes() {
            let alternatives: Vec<String> = attribute
                .column_type
                .convertible_types()
                .into_iter()
                .filter(|t| *t != attribute.column_type && *t != ColumnType::STRING)
                .map(|t| t.to_string())
                .collect();
            println!(
                "   {:<20} {:<16} from {} network(s){}",
                attribute.name,
                attribute.column_type.to_string(),
                attribute.sources.len(),
                if alternatives.is_empty() {
                    String::new()
                } else {
                    format!("  (also: {})", alternatives.join(", "))
                }
            );
        }
    }

    Ok(())
}
