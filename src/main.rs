//! Topic Fetcher binary entry point

use tracing::debug;
use tracing_subscriber::EnvFilter;

use topic_fetcher::cli::{handle_download, handle_status, Cli, Commands};

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("topic_fetcher={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.log_level());
    debug!("Starting topicdl");

    match cli.command {
        Commands::Download(args) => handle_download(&cli.global, args).await?,
        Commands::Status(args) => handle_status(&cli.global, args).await?,
    }
    Ok(())
}
