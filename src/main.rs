use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;

use perfwarden::config::WardenConfig;
use perfwarden::orchestrator::invocation::{
    AdvancedTestRequest, BasicTestRequest, LatencyTestRequest,
};
use perfwarden::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(
    name = "perfwarden",
    about = "Remote-controlled iperf3 and ping testing over HTTP",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML config file (overrides the standard locations)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (HTTP API + static frontend)
    Serve {
        /// Bind address, overriding the configured one
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run an advanced throughput test once and print the raw output
    Test {
        /// Target server address
        server_ip: String,

        /// Protocol selector; "UDP" switches to datagram mode
        #[arg(long)]
        protocol: Option<String>,

        /// Test duration in seconds
        #[arg(long)]
        time: Option<String>,

        /// Bandwidth limit (e.g. "100M")
        #[arg(long)]
        bandwidth: Option<String>,

        /// MSS/MTU override
        #[arg(long)]
        mtu: Option<String>,

        /// Read/write buffer length
        #[arg(long)]
        buffer_length: Option<String>,

        /// Number of parallel streams
        #[arg(long)]
        parallel: Option<String>,

        /// Reverse the test direction (server sends)
        #[arg(long)]
        reverse: bool,

        /// Socket window size (e.g. "256K")
        #[arg(long)]
        window_size: Option<String>,
    },

    /// Run a preset throughput test once and print the raw output
    BasicTest {
        /// Target server address
        server_ip: String,

        /// Preset: "TCP" (default) or "UDP"
        #[arg(long, default_value = "TCP")]
        kind: String,

        /// Reverse the test direction (server sends)
        #[arg(long)]
        reverse: bool,
    },

    /// Run a latency test once and print the raw output
    Ping {
        /// Target address
        target: String,

        /// Duration used to derive the probe count (default 5 probes)
        #[arg(long)]
        duration: Option<f64>,
    },
}

/// The exact reverse spelling the request builders honor.
fn reverse_value(reverse: bool) -> Option<Value> {
    reverse.then(|| Value::String("true".to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => WardenConfig::load(path)?,
        None => WardenConfig::load_or_default(),
    };

    // Initialize tracing; RUST_LOG wins over the configured level.  Logs go
    // to stderr so one-shot subcommands keep stdout for raw tool output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.http.listen_address = bind;
            }
            tracing::info!(bind = %config.http.listen_address, "starting perfwarden daemon");
            perfwarden::serve(config).await?;
        }
        Commands::Test {
            server_ip,
            protocol,
            time,
            bandwidth,
            mtu,
            buffer_length,
            parallel,
            reverse,
            window_size,
        } => {
            let orchestrator = Orchestrator::new(config.tools.clone());
            let request = AdvancedTestRequest {
                server_ip: Some(server_ip),
                protocol,
                time,
                bandwidth,
                mtu,
                buffer_length,
                parallel,
                reverse: reverse_value(reverse),
                window_size,
            };
            let result = orchestrator.run_advanced(&request).await?;
            print!("{}", result.raw);
            exit_like_the_tool(result.exit_code);
        }
        Commands::BasicTest {
            server_ip,
            kind,
            reverse,
        } => {
            let orchestrator = Orchestrator::new(config.tools.clone());
            let request = BasicTestRequest {
                server_ip: Some(server_ip),
                kind: Some(kind),
                reverse: reverse_value(reverse),
            };
            let result = orchestrator.run_basic(&request).await?;
            print!("{}", result.raw);
            exit_like_the_tool(result.exit_code);
        }
        Commands::Ping { target, duration } => {
            let orchestrator = Orchestrator::new(config.tools.clone());
            let request = LatencyTestRequest {
                server_ip: Some(target),
                duration: duration.map(Value::from),
            };
            let result = orchestrator.run_latency(&request).await?;
            print!("{}", result.raw);
            exit_like_the_tool(result.exit_code);
        }
    }

    Ok(())
}

/// Mirror the measurement tool's exit code so shell pipelines can see
/// failures; a signal death maps to the shell convention of 1.
fn exit_like_the_tool(code: Option<i32>) {
    match code {
        Some(0) => {}
        Some(code) => std::process::exit(code),
        None => std::process::exit(1),
    }
}
