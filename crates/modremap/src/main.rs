// modremap CLI entry point
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use modremap::{remap, RemapConfig};

#[derive(Parser)]
#[command(name = "modremap", version, about = "Remap module archives between symbol namespaces")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Remap an archive and run the archive post-processing steps
    Remap {
        /// Input archive
        input: PathBuf,
        /// Output archive
        output: PathBuf,
        /// Tiny v1 mapping file
        #[arg(long)]
        mappings: PathBuf,
        /// Optional secondary mapping export to merge in
        #[arg(long)]
        secondary_mappings: Option<PathBuf>,
        /// Source namespace of the input archive
        #[arg(long, default_value = "named")]
        from: String,
        /// Target namespace of the output archive
        #[arg(long, default_value = "intermediary")]
        to: String,
        /// Classpath entry consulted for cross-archive symbol resolution
        #[arg(long = "classpath")]
        classpath: Vec<PathBuf>,
        /// Resolve overlapping mapping entries by precedence instead of failing
        #[arg(long)]
        ignore_conflicts: bool,
        /// Canonical reference-map resource name for mixin configs
        #[arg(long)]
        refmap_name: Option<String>,
        /// Record bundled dependency paths in the output descriptor
        #[arg(long)]
        nest_jars: bool,
        /// Artifact-relative path of a bundled dependency archive
        #[arg(long = "nested-jar")]
        nested_jars: Vec<PathBuf>,
        /// Skip access rule processing entirely
        #[arg(long)]
        skip_access_rules: bool,
        /// Convert legacy access rules to the access-widener format
        #[arg(long)]
        convert_access_rules: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Remap {
            input,
            output,
            mappings,
            secondary_mappings,
            from,
            to,
            classpath,
            ignore_conflicts,
            refmap_name,
            nest_jars,
            nested_jars,
            skip_access_rules,
            convert_access_rules,
        } => {
            let mut config = RemapConfig::new(mappings).with_namespaces(from, to);
            config.secondary_mappings = secondary_mappings;
            config.classpath = classpath;
            config.ignore_mapping_conflicts = ignore_conflicts;
            config.refmap_name = refmap_name;
            config.nested_jars = nested_jars;

            let summary = remap(
                &input,
                &output,
                nest_jars,
                skip_access_rules,
                convert_access_rules,
                &config,
            )
            .with_context(|| format!("remapping {} failed", input.display()))?;

            println!("Remapped {} -> {}", input.display(), output.display());
            if summary.access_rules_applied {
                println!("  access rules remapped");
            }
            if summary.reference_maps_relocated {
                println!("  mixin reference maps relocated");
            }
            if summary.nested_jars_added {
                println!("  nested jar paths recorded");
            }
            for warning in &summary.warnings {
                println!("  warning: {warning}");
            }
        }
    }

    Ok(())
}
