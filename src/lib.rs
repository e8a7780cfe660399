pub mod api;
pub mod app_state;
pub mod clock;
pub mod config;
pub mod events;
pub mod license;
pub mod manifest;
pub mod proxy;
pub mod sweeper;
pub mod token;

use axum::Router;
use axum::extract::Extension;
use axum::routing::{get, post};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

//
// Re-export
//
pub use api::log_request_errors;
pub use app_state::AppState;
pub use config::Config;
pub use events::{Event, EventKind, EventLog};
pub use proxy::Upstream;
pub use sweeper::{SweepReport, Sweeper};
pub use token::{
    CredentialKind, DeliveryRecord, DeliveryStore, GateError, NodePool, SessionRecord,
    SessionStore, ValidDelivery,
};

/// All routes, wired to `state`
pub fn router(state: AppState) -> Router {
    // CORS layer, also answers license pre-flight requests
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/login", post(api::login))
        .route("/logout", post(api::logout))
        .route("/gate/{content_id}", get(api::gate))
        .route("/delivery/{credential}/manifest", get(api::serve_manifest))
        .route("/delivery/{credential}/seg/{*path}", get(api::serve_segment))
        .route("/license", post(api::license))
        .route("/health", get(api::health))
        .route("/log", get(api::log))
        .route("/session/{credential}", get(api::session_info))
        .layer(axum::middleware::from_fn(api::log_request_errors))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(state))
}

/// Serve on an already bound listener until `state.shutdown` is cancelled
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    Ok(())
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let state = AppState::new(&config)?;

    let addr = format!("0.0.0.0:{}", config.listen_on_port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {addr}");

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    serve(listener, state).await
}
