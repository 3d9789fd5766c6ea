pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::types::ResourceType;

#[derive(Parser)]
#[command(name = "ops-realtime")]
#[command(about = "Realtime mirror and notification engine for the catering ops dashboard")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Sync all resources from Postgres and serve the HTTP API")]
    Serve {
        #[arg(long, help = "Port to listen on (defaults to API_PORT)")]
        port: Option<u16>,
    },

    #[command(about = "Sync resources and print notifications as they arrive")]
    Watch {
        #[arg(long = "resource", value_name = "RESOURCE", help = "Resource to sync (repeatable, defaults to all)")]
        resources: Vec<ResourceType>,
    },

    #[command(about = "Install the change notification triggers into the database")]
    InstallTriggers,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Serve { port } => commands::serve::handle(port, output_format).await,
        Commands::Watch { resources } => commands::watch::handle(resources, output_format).await,
        Commands::InstallTriggers => commands::triggers::handle(output_format).await,
    }
}
