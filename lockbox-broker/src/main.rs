use clap::Parser;
use lockbox_broker::{telemetry, Config};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "lockboxd", about = "Local secrets-broker daemon")]
struct BrokerArgs {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "/etc/lockbox/lockbox.toml")]
    config: PathBuf,
    /// Override the configured socket path
    #[arg(long)]
    socket: Option<PathBuf>,
    /// Verbose startup output
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = real_main().await {
        eprintln!("lockboxd exited with error: {err:#}");
        process::exit(1);
    }
}

async fn real_main() -> anyhow::Result<()> {
    let args = BrokerArgs::parse();
    telemetry::init()?;

    let mut config = Config::from_path(&args.config)?;
    if let Some(socket) = args.socket {
        config.server.socket = socket;
    }
    if args.verbose {
        println!(
            "config loaded (socket={}, stores={}, routes={})",
            config.server.socket.display(),
            config.stores.len(),
            config.routes.len()
        );
    }

    lockbox_broker::run(config).await
}
