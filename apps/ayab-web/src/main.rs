use anyhow::{Context, Result};
use ayab_web::config::{Config, ConfigOverrides};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Bridges HTTP requests to the AYAB knitting daemon.
#[derive(Parser, Debug)]
#[command(name = "ayab-web")]
struct Args {
    /// Address to listen on (overrides AYAB_WEB_BIND_ADDR).
    #[arg(long)]
    bind: Option<String>,
    /// Daemon host (overrides AYAB_DAEMON_HOST).
    #[arg(long)]
    daemon_host: Option<String>,
    /// Daemon port (overrides AYAB_DAEMON_PORT).
    #[arg(long)]
    daemon_port: Option<u16>,
    /// Mount point for forwarded paths (overrides AYAB_WEB_MOUNT_PATH).
    #[arg(long)]
    mount: Option<String>,
}

impl From<Args> for ConfigOverrides {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: args.bind,
            daemon_host: args.daemon_host,
            daemon_port: args.daemon_port,
            mount_path: args.mount,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env()
        .context("failed to load bridge configuration")?
        .with_overrides(args.into())
        .context("invalid command-line override")?;

    init_tracing(&config);
    ayab_web::serve(config).await
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}
