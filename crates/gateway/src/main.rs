use tenantry_gateway::config::GatewayConfig;
use tenantry_gateway::http::{self, AppState};

fn exit_startup(err: impl std::fmt::Display) -> ! {
    eprintln!("STARTUP_ERROR {}", err);
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = GatewayConfig::load().unwrap_or_else(|err| exit_startup(err));

    let pool = match tenantry_store::connect(&config.db_url, config.pool_settings()).await {
        Ok(pool) => pool,
        Err(err) => exit_startup(format!("ERR_DB_UNAVAILABLE {}", err)),
    };

    let bind_addr = config.bind_addr;
    let state = AppState::new(config, pool.clone()).unwrap_or_else(|err| exit_startup(err));

    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(_) => exit_startup("ERR_BIND_FAILED failed to bind gateway listener"),
    };

    tracing::info!(bind_addr = %bind_addr, "tenantry-gateway listening");

    let served = axum::serve(listener, http::app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await;

    pool.close().await;

    if let Err(err) = served {
        eprintln!("SERVER_ERROR ERR_SERVER_FAILED {}", err);
        std::process::exit(1);
    }
}
