use clap::Parser;
use log::info;
use server::network::{Server, SessionConfig};
use shared::{DISCONNECT_GRACE_SECS, SERVER_PORT, TICK_INTERVAL_MS};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = SERVER_PORT)]
    port: u16,

    /// Milliseconds between simulation ticks
    #[arg(short, long, default_value_t = TICK_INTERVAL_MS)]
    tick_ms: u64,

    /// Seconds a disconnected game keeps running before it is ended
    #[arg(short, long, default_value_t = DISCONNECT_GRACE_SECS)]
    grace_secs: u64,

    /// Fixed RNG seed for reproducible games
    #[arg(short, long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = SessionConfig {
        tick_interval: Duration::from_millis(args.tick_ms.max(1)),
        disconnect_grace: Duration::from_secs(args.grace_secs),
        seed: args.seed,
    };

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::new(&address, config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
