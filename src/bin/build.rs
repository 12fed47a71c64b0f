//! CDIF Graph Schema Build CLI
//!
//! Builds the flattened JSON-LD graph schema from the CDIF building blocks.
//!
//! Usage:
//!   cdif-graph-schema --bb-dir ../metadataBuildingBlocks/_sources
//!   cdif-graph-schema --check -o CDIF-graph-schema-2026.json
//!   cdif-graph-schema --help

use std::path::PathBuf;

use anyhow::{bail, Context};
use cdif_graph_schema::{
    build, check_drift, write_artifact, BuildConfig, BuildReport, DriftStatus, OutputFormat,
    Profile, UnresolvedPolicy,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cdif-graph-schema")]
#[command(about = "Build the CDIF flattened JSON-LD graph schema from building-block fragments")]
struct Cli {
    /// Building-block `_sources` directory (default: config, $CDIF_BB_DIR, or a conventional location)
    #[arg(long)]
    bb_dir: Option<PathBuf>,

    /// Where to write the artifact
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Explicit configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bound on nested fragment inlinings
    #[arg(long)]
    max_depth: Option<usize>,

    /// Fail instead of writing when references are left unresolved
    #[arg(long)]
    strict: bool,

    /// Write compact JSON instead of four-space indented
    #[arg(long)]
    compact: bool,

    /// Also write a JSON build report
    #[arg(long)]
    report: Option<PathBuf>,

    /// Compare a fresh build with the artifact on disk and write nothing
    #[arg(long)]
    check: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `false` when a drift check found the artifact out of date
fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = BuildConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = cli.bb_dir {
        config.source.bb_dir = Some(dir);
    }
    if let Some(path) = cli.output {
        config.output.path = path;
    }
    if let Some(depth) = cli.max_depth {
        config.resolution.max_depth = depth;
    }
    if cli.strict {
        config.resolution.unresolved = UnresolvedPolicy::Deny;
    }
    if cli.compact {
        config.output.format = OutputFormat::Compact;
    }
    if cli.report.is_some() {
        config.output.report = cli.report;
    }

    let Some(bb_dir) = config.bb_dir() else {
        bail!("no building-block directory found; pass --bb-dir or set CDIF_BB_DIR");
    };

    println!("🔨 CDIF Graph Schema Build\n");
    println!("📂 Building blocks: {}", bb_dir.display());

    let profile = Profile::cdif();
    let output = build(&profile, &bb_dir, &config.build_options())?;
    println!(
        "   {} definitions, {} dispatch entries, {} fragments loaded",
        output.summary.type_count, output.summary.dispatch_count, output.summary.fragments_loaded
    );

    if cli.check {
        return Ok(match check_drift(&output, &config.output.path)? {
            DriftStatus::UpToDate => {
                println!("\n✅ {} is up to date", config.output.path.display());
                true
            }
            DriftStatus::Missing => {
                eprintln!("\n⚠️  {} does not exist", config.output.path.display());
                false
            }
            DriftStatus::Drifted { diff, changed_lines } => {
                print!("{}", diff);
                eprintln!(
                    "\n⚠️  {} is out of date ({} changed lines)",
                    config.output.path.display(),
                    changed_lines
                );
                false
            }
        });
    }

    write_artifact(&output, &config.output.path)?;
    println!("\n💾 Wrote {} ({})", config.output.path.display(), output.checksum);

    if let Some(report_path) = &config.output.report {
        BuildReport::new(&profile, &bb_dir, &config.output.path, &output)?.write(report_path)?;
        println!("📝 Report: {}", report_path.display());
    }

    println!("\n{}", output.diagnostics.format_summary());

    Ok(true)
}
