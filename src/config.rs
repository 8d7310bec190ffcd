use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand};

use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::transport::ListenAddr;
use crate::writer::WriterConfig;

/// Runtime configuration for the `nodewire` binary.
///
/// Every option can also be set through its environment variable, and a
/// `.env` file in the working directory is loaded first.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "nodewire",
    version,
    about = "Storage node RPC server with typed method dispatch"
)]
pub struct CliArgs {
    /// Address to listen on: `tcp://host:port` or `unix:///path/to.sock`.
    ///
    /// Environment variable: `NODEWIRE_LISTEN`
    #[arg(long, env = "NODEWIRE_LISTEN", default_value_t = String::from("tcp://127.0.0.1:9000"))]
    pub listen: String,

    /// Calls allowed in flight per connection. Further calls are refused
    /// with a `Busy` fault until one finishes.
    ///
    /// Environment variable: `NODEWIRE_MAX_CONCURRENT_CALLS`
    #[arg(long, env = "NODEWIRE_MAX_CONCURRENT_CALLS", default_value_t = 256)]
    pub max_concurrent_calls: usize,

    /// Frames queued on a connection before senders wait for the writer.
    ///
    /// Environment variable: `NODEWIRE_MAX_PENDING_FRAMES`
    #[arg(long, env = "NODEWIRE_MAX_PENDING_FRAMES", default_value_t = 1024)]
    pub max_pending_frames: usize,

    /// Capacity of the per-connection writer channel.
    ///
    /// Environment variable: `NODEWIRE_CHANNEL_CAPACITY`
    #[arg(long, env = "NODEWIRE_CHANNEL_CAPACITY", default_value_t = 1024)]
    pub channel_capacity: usize,

    /// How long a sender waits for writer backpressure to clear.
    ///
    /// Environment variable: `NODEWIRE_BACKPRESSURE_TIMEOUT_MS`
    #[arg(long, env = "NODEWIRE_BACKPRESSURE_TIMEOUT_MS", default_value_t = 5000)]
    pub backpressure_timeout_ms: u64,

    /// Deadline for calls that arrive without one. 0 disables it.
    ///
    /// Environment variable: `NODEWIRE_DEFAULT_TIMEOUT_MS`
    #[arg(long, env = "NODEWIRE_DEFAULT_TIMEOUT_MS", default_value_t = 0)]
    pub default_timeout_ms: u64,

    /// Largest accepted frame payload.
    ///
    /// Environment variable: `NODEWIRE_MAX_PAYLOAD_BYTES`
    #[arg(long, env = "NODEWIRE_MAX_PAYLOAD_BYTES", default_value_t = DEFAULT_MAX_PAYLOAD_SIZE)]
    pub max_payload_bytes: u32,

    /// Namespaces created at startup, comma separated.
    ///
    /// Environment variable: `NODEWIRE_NAMESPACES`
    #[arg(
        long,
        env = "NODEWIRE_NAMESPACES",
        value_delimiter = ',',
        default_value = "default"
    )]
    pub namespaces: Vec<String>,

    /// Emit logs as JSON lines.
    ///
    /// Environment variable: `NODEWIRE_LOG_JSON`
    #[arg(long, env = "NODEWIRE_LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Serve the node methods (default).
    Serve,
    /// Print the method table as JSON and exit.
    Schema,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: ListenAddr,
    pub max_concurrent_calls: usize,
    pub writer: WriterConfig,
    pub default_timeout: Option<Duration>,
    pub max_payload_size: u32,
    pub namespaces: Vec<String>,
    pub log_json: bool,
    pub command: Command,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let listen: ListenAddr = args.listen.parse()?;

        if args.max_concurrent_calls == 0 {
            bail!("NODEWIRE_MAX_CONCURRENT_CALLS must be greater than 0");
        }

        if args.max_pending_frames == 0 {
            bail!("NODEWIRE_MAX_PENDING_FRAMES must be greater than 0");
        }

        if args.channel_capacity == 0 {
            bail!("NODEWIRE_CHANNEL_CAPACITY must be greater than 0");
        }

        if args.backpressure_timeout_ms == 0 {
            bail!("NODEWIRE_BACKPRESSURE_TIMEOUT_MS must be greater than 0");
        }

        if args.max_payload_bytes == 0 {
            bail!("NODEWIRE_MAX_PAYLOAD_BYTES must be greater than 0");
        }

        let namespaces: Vec<String> = args
            .namespaces
            .into_iter()
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty())
            .collect();

        let default_timeout =
            (args.default_timeout_ms > 0).then(|| Duration::from_millis(args.default_timeout_ms));

        Ok(Self {
            listen,
            max_concurrent_calls: args.max_concurrent_calls,
            writer: WriterConfig {
                max_pending_frames: args.max_pending_frames,
                channel_capacity: args.channel_capacity,
                backpressure_timeout: Duration::from_millis(args.backpressure_timeout_ms),
            },
            default_timeout,
            max_payload_size: args.max_payload_bytes,
            namespaces,
            log_json: args.log_json,
            command: args.command.unwrap_or(Command::Serve),
        })
    }
}
