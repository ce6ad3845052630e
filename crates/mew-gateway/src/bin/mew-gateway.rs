//! `mew-gateway` CLI: run a gateway, run an MCP bridge participant, or validate a space file
//! without starting anything (§6.6).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mew_gateway::{config::SpaceConfig, gateway::serve};

#[derive(Parser)]
#[command(name = "mew-gateway", version, about = "Gateway for the Multi-Entity Workspace protocol")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway, serving one space over WebSocket + HTTP.
    Serve(serve::ServeArgs),
    /// Run a standalone MCP bridge participant against a running gateway.
    Bridge(BridgeArgs),
    /// Parse and validate a space definition without starting a server.
    Validate(ValidateArgs),
}

#[derive(clap::Args)]
struct BridgeArgs {
    /// Gateway WebSocket URL, including the auth token if required (e.g. `ws://host/ws?token=...`).
    #[arg(long)]
    gateway_url: String,
    /// Command to spawn as the MCP server subprocess.
    #[arg(long)]
    command: String,
    /// Arguments passed to the spawned command.
    #[arg(long = "arg")]
    args: Vec<String>,
}

#[derive(clap::Args)]
struct ValidateArgs {
    /// Path to the space definition (YAML or JSON).
    path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            if let Err(error) = serve::run(args).await {
                serve::log_startup_error(&error);
                return Err(error);
            }
            Ok(())
        }
        Command::Bridge(args) => {
            mew_gateway::bridge::run(mew_gateway::bridge::BridgeConfig {
                gateway_url: args.gateway_url,
                command: args.command,
                args: args.args,
                env: Default::default(),
            })
            .await
        }
        Command::Validate(args) => {
            let config = SpaceConfig::from_file(&args.path)
                .with_context(|| format!("space config at {} is invalid", args.path.display()))?;
            println!(
                "space '{}' is valid: {} participant(s), {} token(s)",
                config.definition().name,
                config.definition().participants.len(),
                config.definition().tokens.len()
            );
            Ok(())
        }
    }
}
