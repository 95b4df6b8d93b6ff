use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "specforge")]
#[command(about = "Incremental code generation from application specifications", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Enable verbose debug output")]
    verbose: bool,

    #[arg(long, global = true, help = "Configuration file (defaults to specforge.yml)")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Generate code for a specification")]
    Generate {
        #[arg(help = "Specification JSON file")]
        spec: PathBuf,

        #[arg(long, default_value = "default", help = "Workspace whose last session is diffed against")]
        workspace: String,

        #[arg(long, default_value = "generated", help = "Directory the generated files are written to")]
        out: PathBuf,

        #[arg(long, help = "Show the planned tasks without generating anything")]
        dry_run: bool,
    },

    #[command(about = "Print the fingerprint of a specification or one of its pages")]
    Fingerprint {
        #[arg(help = "Specification JSON file")]
        spec: PathBuf,

        #[arg(long, help = "Page id to fingerprint instead of the whole specification")]
        page: Option<String>,
    },

    #[command(about = "List entity changes since the last generated session")]
    Changes {
        #[arg(help = "Specification JSON file")]
        spec: PathBuf,

        #[arg(long, default_value = "default")]
        workspace: String,
    },

    #[command(about = "Print the file tree of the last generated session")]
    Tree {
        #[arg(long, default_value = "default")]
        workspace: String,
    },

    #[command(about = "Remove cached generation results")]
    ClearCache,
}

/// Verbose raises everything to debug; otherwise RUST_LOG applies, falling
/// back to warnings only.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli::Config {
        verbose: cli.verbose,
        config_path: cli.config,
    };

    match cli.command {
        Commands::Generate {
            spec,
            workspace,
            out,
            dry_run,
        } => {
            cli::generate(&spec, &workspace, &out, dry_run, &config).await?;
        }
        Commands::Fingerprint { spec, page } => {
            cli::fingerprint(&spec, page.as_deref())?;
        }
        Commands::Changes { spec, workspace } => {
            cli::changes(&spec, &workspace, &config)?;
        }
        Commands::Tree { workspace } => {
            cli::tree(&workspace, &config)?;
        }
        Commands::ClearCache => {
            cli::clear_cache(&config)?;
        }
    }

    Ok(())
}
