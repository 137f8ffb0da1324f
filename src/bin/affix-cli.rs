use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use affix_stack::affix::{AffixRegistry, AffixStack};
use affix_stack::net::{NetworkApi, NullNetwork, TokioNetwork};
use affix_stack::observability::logging;

#[derive(Parser)]
#[command(name = "affix-cli")]
#[command(about = "Talk to a service through an affix stack", long_about = None)]
struct Cli {
    /// Stack description, top first.
    #[arg(short, long, default_value = "")]
    stack: String,

    /// Log level when RUST_LOG is unset.
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, send a line, print the reply
    Send {
        addr: SocketAddr,
        message: String,
        /// Seconds to wait for a reply
        #[arg(short, long, default_value_t = 5)]
        timeout: u64,
    },
    /// Send a datagram from a listening port and print the reply
    Datagram {
        addr: SocketAddr,
        message: String,
        #[arg(short, long, default_value_t = 5)]
        timeout: u64,
    },
    /// Resolve a host name through the stack
    Resolve { name: String },
    /// Print the stack's diagnostic string and advertisement
    Advertise,
    /// List the affixes this build knows
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let registry = AffixRegistry::with_builtin();
    let build = |network: Arc<dyn NetworkApi>| registry.build(&cli.stack, network);

    match cli.command {
        Commands::Send { addr, message, timeout } => {
            let stack = build(Arc::new(TokioNetwork::new()))?;
            let socket = stack.open_connection(addr, None).await?;
            socket.send(message.as_bytes()).await?;

            let mut reply = Vec::new();
            while reply.len() < message.len() {
                let chunk = tokio::time::timeout(Duration::from_secs(timeout), socket.recv(4096)).await??;
                if chunk.is_empty() {
                    break;
                }
                reply.extend_from_slice(&chunk);
            }
            socket.close().await?;
            println!("{}", String::from_utf8_lossy(&reply));
        }
        Commands::Datagram { addr, message, timeout } => {
            let stack = build(Arc::new(TokioNetwork::new()))?;
            let local: SocketAddr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }.parse()?;
            let listener = stack.listen_for_messages(local).await?;
            let local = listener.local_addr()?;

            stack.send_message(addr, Some(local), message.as_bytes()).await?;
            let reply = tokio::time::timeout(Duration::from_secs(timeout), listener.recv_message()).await??;
            listener.close().await?;
            println!("{} from {}", String::from_utf8_lossy(&reply.payload), reply.remote);
        }
        Commands::Resolve { name } => {
            let stack = build(Arc::new(TokioNetwork::new()))?;
            println!("{}", stack.resolve_name(&name).await?);
        }
        Commands::Advertise => {
            let stack: AffixStack = build(Arc::new(NullNetwork))?;
            println!("stack:         {}", stack);
            println!("depth:         {}", stack.depth());
            println!("advertisement: {}", stack.advertisement());
        }
        Commands::List => {
            for name in registry.names() {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
