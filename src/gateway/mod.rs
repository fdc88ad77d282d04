pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request},
    middleware::{Next, from_fn},
    response::Response,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::core_types::UserId;
use state::AppState;
use types::{Actor, ApiError};

pub const ACTOR_HEADER: &str = "x-user-id";

/// Parse the acting user from `x-user-id`
pub fn extract_actor(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let raw = headers
        .get(ACTOR_HEADER)
        .ok_or_else(|| ApiError::missing_actor("Missing x-user-id header"))?
        .to_str()
        .map_err(|_| ApiError::missing_actor("Invalid x-user-id header"))?;

    match raw.trim().parse::<UserId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::missing_actor("Invalid x-user-id format")),
    }
}

/// Inject [`Actor`] into request extensions. Authentication happens upstream;
/// this only makes the acting user explicit for every state change.
async fn actor_middleware(mut request: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let actor = extract_actor(request.headers())?;
    request.extensions_mut().insert(Actor(actor));
    Ok(next.run(request).await)
}

/// Full application router
pub fn router(state: Arc<AppState>) -> Router {
    let transfer_routes = Router::new()
        .route(
            "/",
            post(handlers::create_transfer).get(handlers::list_transfers),
        )
        .route(
            "/{transfer_id}",
            get(handlers::get_transfer).put(handlers::update_transfer),
        )
        .route("/{transfer_id}/approve", post(handlers::approve_transfer))
        .route("/{transfer_id}/reject", post(handlers::reject_transfer))
        .route("/{transfer_id}/deliver", post(handlers::deliver_transfer))
        .route("/{transfer_id}/items", get(handlers::get_transfer_items))
        .layer(from_fn(actor_middleware));

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .nest("/api/v1/transfers", transfer_routes)
        .with_state(state)
        // OpenAPI / Swagger UI (stateless, added after with_state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Start HTTP Gateway server
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {}: {} (port {} may already be in use)",
            addr,
            e,
            port
        )
    })?;

    tracing::info!("Gateway listening on http://{}", addr);
    tracing::info!("API Docs: http://{}/docs", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
