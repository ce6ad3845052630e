use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mew_bench::{BenchClient, describe_event};
use serde_json::Value;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, subscriber};

#[derive(Parser)]
#[command(author, version, about = "Utility MEW participant for testing a gateway")]
struct Cli {
    /// Gateway WebSocket URL, including the auth token if required.
    #[arg(long, default_value = "ws://127.0.0.1:8765/ws")]
    url: String,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connects, prints the welcome payload, and exits.
    Info {
        /// Print the welcome payload as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Sends one envelope and exits without waiting for a reply.
    Send {
        /// Envelope kind, e.g. `chat`.
        #[arg(long)]
        kind: String,

        /// Recipient participant ids; omit for a broadcast.
        #[arg(long = "to")]
        to: Vec<String>,

        /// JSON payload (inline, or `@path` to read from a file).
        #[arg(long = "payload-json", default_value = "{}")]
        payload_json: String,
    },
    /// Sends one envelope and prints the correlated reply.
    Request {
        #[arg(long)]
        kind: String,

        #[arg(long = "to")]
        to: Vec<String>,

        #[arg(long = "payload-json", default_value = "{}")]
        payload_json: String,

        /// Pretty-print the reply.
        #[arg(long)]
        pretty: bool,
    },
    /// Calls a tool exposed by another participant via `mcp/request`.
    CallTool {
        /// Participant id to call (typically an MCP bridge).
        #[arg(long)]
        to: String,

        /// Tool name.
        #[arg(long)]
        name: String,

        /// JSON object passed as tool arguments.
        #[arg(long = "args-json", default_value = "{}")]
        args_json: String,

        #[arg(long)]
        pretty: bool,
    },
    /// Streams envelopes and stream frames until interrupted.
    Watch {
        /// Print events as JSON where possible.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Command::Info { json } => {
            let client = BenchClient::connect(&cli.url).await?;
            print_welcome(client.welcome(), json)?;
        }
        Command::Send { kind, to, payload_json } => {
            let client = BenchClient::connect(&cli.url).await?;
            let payload = parse_json_arg(&payload_json)?;
            let id = client.send(&kind, to, payload).await?;
            println!("sent envelope {id}");
        }
        Command::Request { kind, to, payload_json, pretty } => {
            let client = BenchClient::connect(&cli.url).await?;
            let payload = parse_json_arg(&payload_json)?;
            let reply = client.request(&kind, to, payload).await?;
            print_value(&serde_json::to_value(&reply)?, pretty)?;
        }
        Command::CallTool { to, name, args_json, pretty } => {
            let client = BenchClient::connect(&cli.url).await?;
            let arguments = parse_json_arg(&args_json)?;
            let result = client.call_tool(&to, &name, arguments).await?;
            print_value(&result, pretty)?;
        }
        Command::Watch { json } => {
            let client = BenchClient::connect(&cli.url).await?;
            print_welcome(client.welcome(), json)?;
            let mut receiver = client.subscribe();
            info!("watching events; press Ctrl+C to exit");

            loop {
                tokio::select! {
                    res = receiver.recv() => match res {
                        Ok(event) => println!("{}", describe_event(&event)),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            eprintln!("skipped {skipped} events (channel lag)");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            println!("event stream closed");
                            break;
                        }
                    },
                    _ = signal::ctrl_c() => {
                        println!("received Ctrl+C, stopping watch");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    let _ = subscriber::set_global_default(subscriber);
    Ok(())
}

fn print_welcome(welcome: &mew_bench::WelcomeInfo, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(welcome)?);
    } else {
        println!("connected as {}", welcome.you);
    }
    Ok(())
}

fn print_value(value: &Value, pretty: bool) -> Result<()> {
    if pretty {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}

fn parse_json_arg(raw: &str) -> Result<Value> {
    if let Some(path) = raw.strip_prefix('@') {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
        serde_json::from_str(&content).with_context(|| format!("invalid JSON in file {path}"))
    } else {
        serde_json::from_str(raw).context("invalid JSON argument")
    }
}
