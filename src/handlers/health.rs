use crate::error::HealthResponse;
use crate::routes;
use crate::state::AppState;
use axum::{extract::State, Json};

/// GET /health handler - Health check endpoint
///
/// Reports process status and the number of routes compiled from the
/// endpoint configuration. The gateway holds no connections of its own,
/// so there is nothing else to probe.
#[utoipa::path(
    get,
    path = routes::HEALTH,
    responses(
        (status = 200, description = "Gateway is serving", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        routes: state.routes.len(),
    })
}
