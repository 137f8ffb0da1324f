//! Affix echo server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ TokioNetwork ──▶ (affix N) ──▶ ... ──▶ (affix 1) ──▶ echo task
//!                  sentinel         bottom                  top
//!
//!     listen:  top.listen_for_connection → ... → sentinel binds
//!     accept:  top copies its whole chain → accept through the copy
//!              → socket bound to the copy, one private chain per connection
//!     echo:    socket.recv / socket.send re-enter the copy, layer by layer
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use affix_stack::affix::AffixRegistry;
use affix_stack::lifecycle::{signals, startup, Shutdown};
use affix_stack::net::TokioNetwork;
use affix_stack::observability::logging;
use affix_stack::server::EchoServer;

#[derive(Parser)]
#[command(name = "affix-echo")]
#[command(about = "Echo server behind a configurable affix stack", long_about = None)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override stack.affixes, e.g. "(TraceAffix,edge)(StatsAffix)".
    #[arg(short, long)]
    stack: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let registry = AffixRegistry::with_builtin();

    let (mut config, source) = startup::load_or_default(args.config.as_deref(), &registry)?;
    logging::init(&config.observability.log_level);
    tracing::info!(source = %source, "Configuration loaded");

    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(stack) = args.stack {
        registry.check(&stack)?;
        config.stack.affixes = stack;
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        udp_bind_address = ?config.listener.udp_bind_address,
        max_connections = config.listener.max_connections,
        log_level = %config.observability.log_level,
        "affix-echo v0.1.0 starting"
    );

    let stack = startup::assemble_stack(&config, &registry, Arc::new(TokioNetwork::new()))?;
    let server = EchoServer::bind(config, &stack).await?;
    tracing::info!(address = %server.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());
    server.run(shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
