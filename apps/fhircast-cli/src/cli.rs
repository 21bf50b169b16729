use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fhircast")]
#[command(about = "FHIRcast client: follow a hub session and publish context changes")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to <config dir>/fhircast/config.json)
    #[arg(short, long, global = true, env = "FHIRCAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Hub to use instead of the configured default
    #[arg(long, global = true)]
    pub hub: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured hubs
    Hubs,
    /// Subscribe and print received events until interrupted
    Listen(ListenArgs),
    /// Publish one event to the hub
    Publish(PublishArgs),
}

#[derive(clap::Args)]
pub struct ListenArgs {
    /// Topic to subscribe to, when the token endpoint does not provide one
    #[arg(short, long)]
    pub topic: Option<String>,
}

#[derive(clap::Args)]
pub struct PublishArgs {
    /// Event type, e.g. patient-open
    #[arg(short, long, required_unless_present = "file")]
    pub event: Option<String>,

    /// Context entry as key=<resource json>; repeatable
    #[arg(short = 'x', long = "context")]
    pub context: Vec<String>,

    /// Read the whole message from a JSON file instead
    #[arg(short, long, conflicts_with_all = ["event", "context"])]
    pub file: Option<PathBuf>,

    /// Topic to publish to, when the token endpoint does not provide one
    #[arg(short, long)]
    pub topic: Option<String>,
}
