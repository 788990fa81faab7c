use api::{build_app, init_database, init_inference_provider, init_search_provider, init_services};
use config::{ApiConfig, LoggingConfig};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Environment first, YAML file as fallback
    let config = match ApiConfig::from_env() {
        Ok(config) => config,
        Err(env_error) => ApiConfig::load().unwrap_or_else(|e| {
            eprintln!("Failed to load configuration from environment: {env_error}");
            eprintln!("Failed to load configuration file: {e}");
            std::process::exit(1);
        }),
    };

    init_tracing(&config.logging);

    let database = init_database(&config.database).await?;
    let inference_provider = init_inference_provider(&config.model)?;
    let search_provider = init_search_provider(&config.search)?;
    let services = init_services(database, inference_provider, search_provider, &config);

    tracing::info!(
        daily_limit = config.quota.limit,
        max_steps = config.chat.max_steps,
        "Chat services initialized"
    );

    let app = build_app(services);

    let bind_address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully");
    Ok(())
}

fn init_tracing(logging_config: &LoggingConfig) {
    let filter = logging_config.filter_directives();

    match logging_config.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .init();
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}
