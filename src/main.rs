mod cli;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => mediabox::api::run(args.address).await?,
        Commands::Watch(args) => {
            let config = mediabox::config::Config::load()?;
            mediabox::client::watch(&args.base_url, args.task_id, &config.client).await?;
        }
    }

    Ok(())
}
