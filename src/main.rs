//! incbuild - Incremental include-dependency analysis for native builds.
//!
//! Usage:
//!   incbuild snapshot [PATH]     Capture a content-addressed snapshot
//!   incbuild deps <SOURCE>       Show the include graph of one source
//!   incbuild impact              Run an incremental pass
//!   incbuild --help              Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result};
use itertools::Itertools;

use incbuild_analyze::{
    ExpansionLimits, GraphBuilder, GraphOptions, IncludeGraph, IncrementalBuild, JsonFileStore, LiveFileSystem,
    SearchPaths,
};
use incbuild_core::{AnalysisConfig, PatternSet};
use incbuild_scan::{FingerprintCache, SnapshotScanner};

#[derive(Parser)]
#[command(
    name = "incbuild",
    version,
    about = "Incremental include-dependency analysis for native builds",
    long_about = "incbuild decides which C/C++ sources must be recompiled after a change.\n\n\
                  It snapshots the source tree by content hash, follows #include \
                  directives through macros, and compares against the previous pass."
)]
struct Cli {
    /// Enable diagnostic logging (RUST_LOG overrides the filter)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture a content-addressed snapshot of a directory
    Snapshot {
        /// Directory to snapshot
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Only keep paths matching this glob (repeatable)
        #[arg(long = "include")]
        include: Vec<String>,

        /// Drop paths matching this glob (repeatable)
        #[arg(long = "exclude")]
        exclude: Vec<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the include graph of one source file
    Deps {
        /// Source file
        source: PathBuf,

        /// System include directory, searched for both include forms (repeatable)
        #[arg(short = 'I', value_name = "DIR")]
        system: Vec<PathBuf>,

        /// Include directory for quoted includes only (repeatable)
        #[arg(long = "iquote", value_name = "DIR")]
        quoted: Vec<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run an incremental pass and print the sources to recompile
    Impact {
        /// Project configuration (TOML); defaults to the current directory
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Baseline file to compare against and update
        #[arg(short, long)]
        baseline: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Snapshot {
            path,
            include,
            exclude,
            format,
        } => run_snapshot(&path, &include, &exclude, format),
        Command::Deps {
            source,
            system,
            quoted,
            format,
        } => run_deps(&source, quoted, system, format),
        Command::Impact {
            config,
            baseline,
            format,
        } => run_impact(config.as_deref(), baseline, format),
    }
}

/// Install the tracing subscriber when asked for.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let from_env = std::env::var("RUST_LOG").is_ok();
    if !verbose && !from_env {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "incbuild=debug,incbuild_analyze=debug".into());
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

/// Snapshot a directory and print its entries.
fn run_snapshot(path: &Path, include: &[String], exclude: &[String], format: OutputFormat) -> Result<()> {
    let patterns = PatternSet::new(include, exclude).context("Invalid pattern")?;

    eprintln!("Snapshotting {}...", path.display());

    let scanner = SnapshotScanner::new();
    let scan = scanner.scan(path).context("Snapshot failed")?;
    let tree = scan.tree.filter(&patterns);

    match format {
        OutputFormat::Text => {
            let files = tree.regular_files().count();
            println!();
            println!("{}", "─".repeat(70));
            println!(" {} - {}", tree.path(), format_size(tree.total_size()));
            println!(" {} files, {} entries", files, tree.len());
            println!(" Captured in {:.2}s", scan.duration.as_secs_f64());
            println!("{}", "─".repeat(70));
            println!();

            for entry in tree
                .descendants()
                .iter()
                .sorted_by(|a, b| a.path().cmp(b.path()))
            {
                let fingerprint = entry
                    .fingerprint()
                    .map(|f| f.short())
                    .unwrap_or_else(|| "-".repeat(8));
                let marker = if entry.is_directory() { "/" } else { "" };
                println!(
                    " {}  {:>10}  {}{}",
                    fingerprint,
                    format_size(entry.size()),
                    entry.relative_path().path_string(),
                    marker
                );
            }

            if !scan.warnings.is_empty() {
                println!();
                println!("{} warning(s) during snapshot", scan.warnings.len());
                for warning in &scan.warnings {
                    println!("   {}: {}", warning.path.display(), warning.message);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&*tree)?);
        }
    }

    Ok(())
}

/// Build and print the include graph of one source.
fn run_deps(source: &Path, quoted: Vec<PathBuf>, system: Vec<PathBuf>, format: OutputFormat) -> Result<()> {
    let source = source.canonicalize().context("Invalid source path")?;
    let options = GraphOptions {
        search_paths: SearchPaths::new(quoted, system),
        limits: ExpansionLimits::default(),
    };
    let builder = GraphBuilder::new(options, Arc::new(LiveFileSystem), Arc::new(FingerprintCache::new()));
    let graph = builder.build_graph(&source).context("Include graph failed")?;

    match format {
        OutputFormat::Text => print_graph(&graph),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&graph)?),
    }

    Ok(())
}

fn print_graph(graph: &IncludeGraph) {
    println!();
    println!("{}", "─".repeat(70));
    println!(" {}", graph.source);
    println!(
        " {} headers, {} unresolved{}",
        graph.headers().count(),
        graph.unresolved.len(),
        if graph.has_cycle() { ", include cycle" } else { "" }
    );
    println!("{}", "─".repeat(70));
    println!();

    for record in &graph.includes {
        let target = if record.resolution.candidates.is_empty() {
            "(unresolved)".to_string()
        } else {
            record.resolution.candidates.iter().map(|c| c.display()).join(" | ")
        };
        println!(" {}:{}  {} -> {}", record.including_file, record.line, record.resolution.token, target);
        if !record.resolution.macros_used.is_empty() {
            println!(
                "   via {}",
                record.resolution.macros_used.iter().map(|m| m.name()).join(", ")
            );
        }
        for reason in &record.resolution.unresolved {
            println!("   ! {reason}");
        }
    }

    println!();
    for (path, fingerprint) in &graph.nodes {
        if graph.unresolved.contains(path) {
            continue;
        }
        println!(" {}  {}", fingerprint.short(), path);
    }
}

/// Run one incremental pass and update the stored baseline.
fn run_impact(config_path: Option<&Path>, baseline: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let config = match config_path {
        Some(path) => AnalysisConfig::load(path).context("Failed to load configuration")?,
        None => AnalysisConfig::new("."),
    };
    let store_path = baseline
        .or_else(|| config.baseline_path.clone())
        .unwrap_or_else(|| config.root.join(".incbuild").join("baseline.json"));
    tracing::debug!(root = %config.root.display(), baseline = %store_path.display(), "impact pass configured");
    let store = JsonFileStore::new(store_path);

    let build = IncrementalBuild::new(config).context("Invalid configuration")?;
    let previous = store.load_baseline().context("Failed to read baseline")?;
    if previous.is_none() {
        eprintln!("No baseline at {}, analyzing every source", store.path().display());
    }

    let outcome = build.run(previous.as_ref()).context("Incremental pass failed")?;
    store
        .save_baseline(&outcome.baseline)
        .context("Failed to write baseline")?;

    match format {
        OutputFormat::Text => {
            for (source, reasons) in &outcome.recompile.reasons {
                println!("{}  ({})", source, reasons.iter().join(", "));
            }
            eprintln!(
                "{} to recompile, {} graphs rebuilt, {} reused",
                outcome.recompile.len(),
                outcome.rebuilt,
                outcome.reused
            );
            for failure in &outcome.failures {
                eprintln!("warning: {}: {}", failure.source.display(), failure.reason);
            }
        }
        OutputFormat::Json => {
            let report = serde_json::json!({
                "recompile": outcome.recompile,
                "failures": outcome.failures,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
