// Route table and middleware
use crate::infrastructure::http_response::panic_response;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    get_control, get_cooling_settings, health_check, historical_data, sensor_data, update_control,
    update_cooling_settings, update_sensor_data,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Routes are served at the root and again under `/api`, where the
/// dashboard looks for them.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/sensordata", get(sensor_data))
        .route("/update", post(update_sensor_data))
        .route("/control", post(update_control))
        .route("/getcontrol", get(get_control))
        .route("/historicaldata", get(historical_data))
        .route("/cooling-settings", get(get_cooling_settings).post(update_cooling_settings));

    Router::new()
        .route("/healthz", get(health_check))
        .merge(api.clone())
        .nest("/api", api)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
