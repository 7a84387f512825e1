use relay::{config, routes, state};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    // A missing .env file is the normal case in deployment.
    let _ = dotenvy::dotenv();

    let config = config::RelayConfig::from_env().expect("invalid relay configuration");
    let bind = config.bind;
    tracing::info!(
        static_dir = %config.static_dir.display(),
        queue_capacity = config.queue_capacity,
        "relay configured"
    );

    let state = state::AppState::new(config);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .expect("failed to bind");

    tracing::info!(%bind, "relay listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
