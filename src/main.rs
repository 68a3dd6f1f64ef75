//! `utc`: provision the UTC model and export its static inference graph.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utc::commands::{self, DEFAULT_PATH};
use utc::export::ExportOutcome;

#[derive(Parser)]
#[command(name = "utc")]
#[command(about = "Download the UTC model and export it for inference", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Fetch the UTC resources into a directory and export the static graph
    Download {
        /// Directory holding the resources and the exported `static/` artifact
        #[arg(long, default_value = DEFAULT_PATH)]
        path: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "utc=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Download { path }) => match commands::download::run(&path)? {
            ExportOutcome::Exported(prefix) => tracing::debug!("exported {:?}", prefix),
            ExportOutcome::Skipped(prefix) => tracing::debug!("kept existing {:?}", prefix),
        },
        None => {}
    }

    Ok(())
}
