mod config;
mod context;
mod coordinator;
mod server;
mod session;

#[cfg(test)]
mod tests;

use clap::Parser;
use config::Config;
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Parser)]
#[command(name = "shardgate", about = "Sharding proxy for prepared statements")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.example.toml")]
    config: String,
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_path(&args.config)?;
    server::run(config).await?;
    Ok(())
}
