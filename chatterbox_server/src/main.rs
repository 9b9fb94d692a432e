// CLI entry point for the chat server.
//
// Starts a standalone server and blocks until the listener stops. There is no
// signal handling: SIGINT/SIGTERM end the process and the session threads go
// with it.
//
// Usage:
//   chatterbox-server <PORT> [--bind <ADDR>] [--config <FILE>]
//
// The config file is JSON with any subset of the `ServerConfig` fields. The
// positional port and `--bind` override whatever the file says. Log output is
// controlled with `RUST_LOG` (default `info`).

use std::path::PathBuf;

use chatterbox_server::{ServerConfig, start_server};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "chatterbox-server")]
#[command(about = "Multi-user text chat server")]
struct Args {
    /// TCP port to listen on (0 picks a free one).
    port: u16,

    /// Address to bind (default: all interfaces).
    #[arg(long)]
    bind: Option<String>,

    /// JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match ServerConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{e}");
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };
    config.port = args.port;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    let (handle, addr) = match start_server(config) {
        Ok(result) => result,
        Err(e) => {
            error!("failed to start server: {e}");
            std::process::exit(1);
        }
    };

    info!(%addr, "accepting connections");
    handle.wait();
}
