use clap::Parser;
use ferrous_forward_domain::config::CliOverrides;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod bootstrap;
mod di;
mod server;

#[derive(Parser)]
#[command(name = "ferrous-forward")]
#[command(version)]
#[command(about = "Ferrous Forward - DNS forwarder with health-checked upstream pools")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// DNS server port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Bind address
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cli_overrides = CliOverrides {
        dns_port: cli.port,
        bind_address: cli.bind,
        log_level: cli.log_level,
    };

    let config = bootstrap::load_config(cli.config.as_deref(), cli_overrides)?;
    bootstrap::init_logging(&config.logging);

    info!("Starting Ferrous Forward v{}", env!("CARGO_PKG_VERSION"));
    bootstrap::log_config_summary(&config);

    let shutdown = CancellationToken::new();
    let services = di::DnsServices::new(&config)?;
    let background = services.start_background_tasks(&shutdown);

    let bind_ip: IpAddr = config.server.bind_address.parse()?;
    let dns_addr = SocketAddr::new(bind_ip, config.server.dns_port);

    let mut server = tokio::spawn(server::start_dns_server(
        dns_addr,
        services.handler.clone(),
        Duration::from_secs(config.server.tcp_idle_timeout_secs),
        shutdown.clone(),
    ));

    let mut exit = Ok(());
    let signalled = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
            true
        }
        result = &mut server => {
            exit = match result {
                Ok(result) => result,
                Err(e) => Err(e.into()),
            };
            false
        }
    };

    shutdown.cancel();
    if signalled {
        if let Ok(Err(e)) = server.await {
            error!(error = %e, "DNS server error");
        }
    }

    for task in background {
        let _ = task.await;
    }

    services.log_shutdown_summary();
    info!("Server shutdown complete");
    exit
}
