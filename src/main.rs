//! Line Chat - Entry Point
//!
//! Runs either the chat server or the terminal client, chosen by the
//! single positional mode argument.

use std::process::ExitCode;

use clap::{CommandFactory, Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use line_chat::client::DISCONNECTED;
use line_chat::{run_client, AppError, ChatConfig, ChatServer};

/// Multithreaded line chat over TCP
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Run as `server` or `client`
    #[arg(value_enum, ignore_case = true)]
    mode: Option<Mode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Server,
    Client,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=line_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("line_chat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ChatConfig::default();

    match cli.mode {
        None => {
            // No mode given: show usage and stop
            if let Err(e) = Cli::command().print_help() {
                debug!("Failed to print usage: {}", e);
            }
            println!();
            ExitCode::SUCCESS
        }
        Some(Mode::Server) => match serve(&config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Server exception: {}", e);
                ExitCode::FAILURE
            }
        },
        Some(Mode::Client) => {
            let status = match run_client(&config).await {
                Ok(exit) => {
                    debug!("Client finished: {:?}", exit);
                    0
                }
                Err(AppError::Connect { source, .. }) => {
                    println!("Could not connect to server: {}", source);
                    1
                }
                Err(e) => {
                    println!("{}", DISCONNECTED);
                    error!("Client error: {}", e);
                    1
                }
            };
            // The stdin reader thread would keep the runtime alive until Enter
            std::process::exit(status);
        }
    }
}

async fn serve(config: &ChatConfig) -> Result<(), AppError> {
    let server = ChatServer::bind(config).await?;

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C");
            ctrl_c.cancel();
        }
    });

    server.run(shutdown).await
}
