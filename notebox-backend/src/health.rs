use axum::extract::State;
use axum::Json;
use notebox_shared::api::Health;

use crate::db;
use crate::notes::WebError;
use crate::SharedState;

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is up and the database answers", body = Health),
        (status = 500, description = "Database is unreachable")
    )
)]
pub async fn health(State(state): State<SharedState>) -> Result<Json<Health>, WebError> {
    let note_count = db::count_notes(&state.conn).await?;
    Ok(Json(Health {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        note_count,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
