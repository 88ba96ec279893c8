use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use layoutmap_core::debuginfo::dwarf;
use layoutmap_core::families::{FamilyLayout, RuntimeFamily};
use layoutmap_core::index::TypeIndex;
use layoutmap_core::resolver::{ResolutionOutcome, Resolver};
use layoutmap_core::{driver, Layout, LayoutResult};
use layoutmap_utils::{info, init_logging, warn, LogLevel, LoggingConfig};

/// Resolve managed-runtime struct offsets from DWARF debug info.
#[derive(Parser, Debug)]
#[command(name = "layoutmap")]
#[command(version)]
#[command(about = "Resolve managed-runtime struct offsets from DWARF debug info", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Resolve a layout and print its canonical JSON
    Resolve
    {
        /// Runtime family (python, ruby)
        family: RuntimeFamily,
        /// Version tag recorded in the layout, e.g. 3.9.5
        version: String,
        /// Shared library with debug info
        library: PathBuf,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the family's typed layout instead of the flat field table
        #[arg(long, default_value_t = false)]
        typed: bool,
    },
    /// Resolve a layout and compare it with a stored artifact
    Check
    {
        family: RuntimeFamily,
        version: String,
        library: PathBuf,
        /// Canonical layout JSON to compare against
        artifact: PathBuf,
    },
    /// Show the outcome of every field, including failures
    Explain
    {
        family: RuntimeFamily,
        version: String,
        library: PathBuf,
    },
    /// List the fields a family's catalog requests
    Fields
    {
        family: RuntimeFamily,
    },
}

/// Exit status when `check` finds differences.
const EXIT_MISMATCH: i32 = 2;

fn main()
{
    let cli = Cli::parse();

    let config = match LoggingConfig::from_env() {
        Ok(config) => config.with_level(cli.log_level),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };
    let _guard = match init_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    match run_command(cli.command) {
        Ok(true) => {}
        Ok(false) => process::exit(EXIT_MISMATCH),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// Returns `false` when a check found differences.
fn run_command(command: Commands) -> LayoutResult<bool>
{
    match command {
        Commands::Resolve {
            family,
            version,
            library,
            output,
            typed,
        } => {
            let layout = driver::resolve_path(family, &version, &library)?;
            let json = if typed {
                FamilyLayout::from_layout(&layout)?.to_json()?
            } else {
                layout.to_canonical_json()?
            };
            emit(&json, output.as_deref())?;
            Ok(true)
        }
        Commands::Check {
            family,
            version,
            library,
            artifact,
        } => {
            let expected = Layout::read_artifact(&artifact)?;
            let layout = driver::resolve_path(family, &version, &library)?;
            Ok(report_differences(&layout, &expected, &artifact))
        }
        Commands::Explain {
            family,
            version,
            library,
        } => {
            let info = dwarf::load_path(&library)?;
            let index = TypeIndex::build(&info)?;
            let outcomes = Resolver::new(&index).outcomes(family.field_spec(), &version);
            let failed = outcomes.iter().filter(|(_, outcome)| outcome.is_failed()).count();
            for (key, outcome) in &outcomes {
                let marker = match outcome {
                    ResolutionOutcome::Resolved(_) => ' ',
                    ResolutionOutcome::Absent => '-',
                    ResolutionOutcome::Failed(_) => '!',
                };
                let key = key.to_string();
                println!("{marker} {key:<48} {outcome}");
            }
            info!("{family} {version}: {} fields, {failed} failing", outcomes.len());
            Ok(failed == 0)
        }
        Commands::Fields { family } => {
            for request in family.field_spec().requests() {
                println!("{request}");
            }
            Ok(true)
        }
    }
}

fn emit(json: &str, output: Option<&Path>) -> LayoutResult<()>
{
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!("wrote {}", path.display());
        }
        None => print!("{json}"),
    }
    Ok(())
}

fn report_differences(layout: &Layout, expected: &Layout, artifact: &Path) -> bool
{
    let comparison = layout.compare_artifact(expected);
    if comparison.is_match() {
        println!("{} {} matches {}", layout.family(), layout.version(), artifact.display());
        return true;
    }

    if let Some((family, version)) = &comparison.mismatched_tag {
        warn!(
            "artifact {} is tagged {family} {version}, resolved {} {}",
            artifact.display(),
            layout.family(),
            layout.version()
        );
        println!(
            "{} {} does not match {}: artifact is for {family} {version}",
            layout.family(),
            layout.version(),
            artifact.display()
        );
    }

    let differences = &comparison.differences;
    if !differences.is_empty() {
        println!(
            "{} {} differs from {} in {} field(s) (resolved != stored):",
            layout.family(),
            layout.version(),
            artifact.display(),
            differences.len()
        );
        for difference in differences {
            println!("  {difference}");
        }
    }
    false
}
