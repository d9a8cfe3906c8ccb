use std::path::{Path, PathBuf};

use clap::Parser;
use cmdtree_core::CommandTree;
use tracing::debug;

mod definition;

use definition::{DefinitionError, TreeDefinition};

#[derive(Debug, Parser)]
#[command(name = "cmdtree", version)]
#[command(about = "Run an argument vector against a YAML-defined command tree")]
struct Cli {
    /// Command-tree definition file (YAML).
    #[arg(long, short = 'd')]
    definition: PathBuf,
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "warn")]
    log_level: String,
    /// Arguments for the defined tree; put them after `--`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    // Diagnostics go to stderr; stdout carries command output and
    // completion candidates.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    let mut tree = match load_tree(&cli.definition) {
        Ok(tree) => tree,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    // The tree reports its own failures on stderr.
    if let Err(err) = tree.execute(&cli.args) {
        debug!(error = %err, "Execution failed");
        std::process::exit(1);
    }
}

fn load_tree(path: &Path) -> Result<CommandTree, DefinitionError> {
    let definition = TreeDefinition::load(path)?;
    debug!(path = %path.display(), "Loaded definition");
    definition.build()
}
