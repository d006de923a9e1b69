use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use axum::http::HeaderValue;
use axum::http::header::STRICT_TRANSPORT_SECURITY;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use library_catalog::{
    AppState, Config, LibraryService, build_rate_limiter, build_router,
    clock::SystemClock,
    payment::HttpPaymentGateway,
    rate_limit::spawn_pruning,
    store::{LibraryStore, MemoryStore, PgStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,library_catalog=debug,sqlx=warn".into()),
        )
        .json()
        .init();

    info!("Starting library catalog v{}", env!("CARGO_PKG_VERSION"));

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let store: Arc<dyn LibraryStore> = match &config.database_url {
        Some(url) => {
            let db = connect_with_retry(url)
                .await
                .map_err(|e| anyhow!("Failed to connect to PostgreSQL after retries: {e}"))?;

            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&db)
                .await
                .map_err(|e| anyhow!("Migration failed: {e}"))?;
            info!("Database migrations completed successfully");

            Arc::new(PgStore::new(db))
        }
        None => {
            warn!("DATABASE_URL not set; catalog is kept in memory and lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let mut library = LibraryService::new(store, Arc::new(SystemClock))
        .with_late_fees_enabled(config.late_fees_enabled);
    match &config.payment_gateway_url {
        Some(url) => {
            library = library.with_payment_gateway(Arc::new(HttpPaymentGateway::new(url)?));
            info!(gateway = %url, "late fee payments enabled");
        }
        None => warn!("PAYMENT_GATEWAY_URL not set; late fee payments are disabled"),
    }

    let rate_limiter = build_rate_limiter(config.rate_limit_per_minute);
    spawn_pruning(rate_limiter.clone(), Duration::from_secs(60));
    if !config.trusted_proxies.is_empty() {
        info!(proxies = ?config.trusted_proxies, "trusting X-Forwarded-For from proxies");
    }

    let state = Arc::new(AppState {
        library,
        config: config.clone(),
        rate_limiter,
    });

    let hsts_value: HeaderValue =
        HeaderValue::from_static("max-age=63072000; includeSubDomains; preload");

    let app = build_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            tower_http::set_header::SetResponseHeaderLayer::if_not_present(
                STRICT_TRANSPORT_SECURITY,
                hsts_value,
            ),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow!("Server error: {e}"))?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn connect_with_retry(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let mut delay = Duration::from_millis(500);
    let max_attempts = 30;
    let mut attempt = 1;

    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                info!("Connected to PostgreSQL on attempt {attempt}");
                return Ok(pool);
            }
            Err(e) if attempt >= max_attempts => {
                error!("All connection attempts failed");
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "Database connection failed (attempt {}/{}): {e}; retrying in {:?}",
                    attempt, max_attempts, delay
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(5));
                attempt += 1;
            }
        }
    }
}

// Graceful shutdown on Ctrl+C (SIGINT) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }

    info!("Shutdown signal received, closing server...");
}
