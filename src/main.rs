use anyhow::Context;
use clap::{Parser, Subcommand};
use ctxgraph::types::ChangeKind;
use ctxgraph::{Engine, Settings};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ctxgraph", version, about = "Layered context retrieval over a project knowledge graph")]
struct Cli {
    /// Project root (defaults to the current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Explicit settings file instead of <root>/.contextengine/settings.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the project and build the graph and vector index.
    Index,
    /// Retrieve a context bundle for an utterance.
    Query {
        utterance: String,
        /// Token budget for the bundle.
        #[arg(long)]
        budget: Option<usize>,
    },
    /// Notify the engine of one file change and re-index it.
    Touch {
        path: String,
        /// One of created, modified, deleted.
        #[arg(long, default_value = "modified")]
        kind: String,
    },
    /// Print graph and index statistics.
    Stats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(&root),
    }
    .context("failed to load settings")?;

    ctxgraph::logging::init_with_config(&settings.logging);

    match cli.command {
        Command::Index => {
            let engine = Engine::initialize(&root, settings)?;
            let report = engine.init_report();
            println!(
                "Indexed {} files ({} skipped, {} scanned) in {}ms",
                report.scan.files.len(),
                report.scan.skipped,
                report.scan.total_scanned,
                report.analysis_time_ms
            );
            for error in &report.errors {
                eprintln!("warning: {error}");
            }
            engine.shutdown()?;
        }
        Command::Query { utterance, budget } => {
            let engine = Engine::initialize(&root, settings)?;
            let bundle = match budget {
                Some(budget) => engine.query(&utterance, budget)?,
                None => engine.query_default(&utterance)?,
            };
            println!("{}", bundle.text);
            if bundle.truncated {
                eprintln!(
                    "truncated: {}",
                    bundle.truncation_reason.as_deref().unwrap_or("unknown")
                );
            }
            engine.shutdown()?;
        }
        Command::Touch { path, kind } => {
            let kind = match kind.as_str() {
                "created" => ChangeKind::Created,
                "modified" => ChangeKind::Modified,
                "deleted" => ChangeKind::Deleted,
                other => anyhow::bail!("unknown change kind '{other}'"),
            };
            let engine = Engine::initialize(&root, settings)?;
            let outcome = engine.on_file_change(&path, kind)?;
            println!(
                "{path}: +{} nodes / +{} edges, -{} nodes / -{} edges{}",
                outcome.nodes_added,
                outcome.edges_added,
                outcome.nodes_removed,
                outcome.edges_removed,
                if outcome.skipped_unchanged {
                    " (unchanged, skipped)"
                } else {
                    ""
                }
            );
            engine.shutdown()?;
        }
        Command::Stats => {
            let engine = Engine::initialize(&root, settings)?;
            let stats = engine.statistics();
            println!("Nodes:");
            for (kind, count) in &stats.nodes_by_kind {
                println!("  {kind}: {count}");
            }
            println!("Edges:");
            for (kind, count) in &stats.edges_by_kind {
                println!("  {kind}: {count}");
            }
            println!("Vector index: {} documents, {} terms", stats.doc_count, stats.vocab_size);
            engine.shutdown()?;
        }
    }
    Ok(())
}
