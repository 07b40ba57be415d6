use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine::commands::submit;
use crate::engine::lifecycle::{Action, DriverSnapshot};
use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::models::trip::TripStatus;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/driver/state", get(get_state))
        .route("/driver/availability", put(set_availability))
        .route("/driver/offer/accept", post(accept_offer))
        .route("/driver/offer/decline", post(decline_offer))
        .route("/driver/trip/status", post(update_trip_status))
        .route("/driver/location", post(update_location))
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub online: bool,
}

#[derive(Deserialize)]
pub struct TripStatusRequest {
    pub status: TripStatus,
    #[serde(default)]
    pub pin: Option<String>,
}

async fn get_state(State(state): State<Arc<AppState>>) -> Json<DriverSnapshot> {
    Json(state.current_snapshot())
}

async fn set_availability(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AvailabilityRequest>,
) -> Result<Json<DriverSnapshot>, AppError> {
    let action = if payload.online {
        Action::GoOnline
    } else {
        Action::GoOffline
    };
    Ok(Json(submit(&state, action).await?))
}

async fn accept_offer(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DriverSnapshot>, AppError> {
    Ok(Json(submit(&state, Action::Accept).await?))
}

async fn decline_offer(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DriverSnapshot>, AppError> {
    Ok(Json(submit(&state, Action::Decline).await?))
}

async fn update_trip_status(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TripStatusRequest>,
) -> Result<Json<DriverSnapshot>, AppError> {
    let action = Action::AdvanceTrip {
        status: payload.status,
        pin: payload.pin,
    };
    Ok(Json(submit(&state, action).await?))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GeoPoint>,
) -> Result<Json<DriverSnapshot>, AppError> {
    if !payload.is_valid() {
        return Err(AppError::BadRequest(format!(
            "invalid coordinates: {}, {}",
            payload.lat, payload.lng
        )));
    }
    Ok(Json(submit(&state, Action::LocationChanged(payload)).await?))
}
