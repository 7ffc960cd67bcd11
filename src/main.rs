use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use chatbridge::{api, cli, config, telemetry, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let mut cfg = config::load()?;

    telemetry::init(cfg.log_format)?;

    let result = match args.command {
        Some(cli::Commands::Serve { port, upstream_url }) => {
            if let Some(port) = port {
                cfg.port = port;
            }
            if let Some(url) = upstream_url {
                config::validate_upstream_url(&url)?;
                cfg.upstream_url = url;
            }
            run_server(cfg).await
        }
        Some(cli::Commands::Models) => print_models(cfg),
        None => run_server(cfg).await,
    };

    telemetry::shutdown();

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: config::Config) -> anyhow::Result<()> {
    let port = cfg.port;
    let state = Arc::new(AppState::from_config(cfg)?);

    tracing::info!(
        upstream = %state.upstream.endpoint(),
        models = state.models.known_models().count(),
        default_model = %state.models.default_model(),
        timeout = ?state.config.upstream_timeout,
        "Upstream configured"
    );

    let app = api::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("chatbridge listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("chatbridge stopped");
    Ok(())
}

fn print_models(cfg: config::Config) -> anyhow::Result<()> {
    let state = AppState::from_config(cfg)?;
    println!("{:<24} {:<28}", "CLIENT MODEL", "BACKEND MODEL");
    for (client, backend) in state.models.entries() {
        println!("{:<24} {:<28}", client, backend);
    }
    println!("{:<24} {:<28}", "(anything else)", state.models.default_model());
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
