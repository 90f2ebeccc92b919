use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "mediabox")]
#[command(about = "MediaBox CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server and task executor
    Server(ServerArgs),
    /// Follow a submitted task until it reaches a terminal state
    Watch(WatchArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides the config file)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct WatchArgs {
    /// Task id returned by a submission endpoint
    pub task_id: Uuid,

    /// Base URL of a running MediaBox server
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub base_url: String,
}
