use std::{net::SocketAddr, sync::Arc};

use axum::{routing::get, Router};
use tokio::signal;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::{error, info};

use alhaja_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);
    let cfg = Arc::new(cfg);

    // Make sure checkout always has a shipping configuration to resolve
    let shipping = api::services::ShippingSettingsService::new(db_arc.clone());
    if let Err(e) = shipping.seed_defaults().await {
        error!("Failed seeding shipping settings: {}", e);
    }

    // Init events + automation forwarder
    let (event_sender, event_rx) = api::events::create_event_channel(cfg.event_channel_capacity);
    let forwarder = api::webhooks::automation::forwarder_from_config(&cfg)?;
    if forwarder.is_some() {
        info!("Automation webhook delivery enabled");
    } else {
        info!("Automation webhook URLs not configured; outbound notifications disabled");
    }
    tokio::spawn(api::events::process_events(event_rx, forwarder));

    // Compose shared app state
    let app_state = api::AppState::new(db_arc, cfg.clone(), Some(Arc::new(event_sender)))?;

    // Build CORS layer from config
    if !cfg.has_cors_allowed_origins() && cfg.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
    }
    let cors_layer = api::build_cors_layer(&cfg).map_err(|e| {
        error!("Rejecting startup over CORS configuration: {}", e);
        e
    })?;

    // Build router: status/health + full v1 API + Swagger UI
    let app = Router::<api::AppState>::new()
        .route("/", get(|| async { "alhaja-api up" }))
        .route("/status", get(api::api_status))
        .route("/health", get(api::health_check))
        .nest("/api/v1", api::api_v1_routes())
        .merge(api::openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(app_state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    info!("alhaja-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
