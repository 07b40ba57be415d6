use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::commands::submit;
use crate::engine::lifecycle::Action;
use crate::error::AppError;
use crate::models::driver::DriverProfile;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/session", get(get_session).post(sign_in).delete(sign_out))
}

#[derive(Deserialize)]
pub struct SignInRequest {
    pub token: String,
    pub profile: DriverProfile,
}

#[derive(Serialize)]
pub struct SessionView {
    pub signed_in: bool,
    pub profile: Option<DriverProfile>,
    pub online: bool,
}

fn view(state: &AppState) -> SessionView {
    let data = state.session.snapshot();
    SessionView {
        signed_in: data.token.is_some(),
        profile: data.profile,
        online: state.current_snapshot().online,
    }
}

async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(view(&state))
}

async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignInRequest>,
) -> Result<Json<SessionView>, AppError> {
    if payload.token.trim().is_empty() {
        return Err(AppError::BadRequest("token cannot be empty".to_string()));
    }
    if payload.profile.id.trim().is_empty() {
        return Err(AppError::BadRequest("profile id cannot be empty".to_string()));
    }

    info!(driver_id = %payload.profile.id, "driver signed in");
    state.session.sign_in(payload.token, payload.profile)?;
    Ok(Json(view(&state)))
}

async fn sign_out(State(state): State<Arc<AppState>>) -> Result<Json<SessionView>, AppError> {
    submit(&state, Action::GoOffline).await?;
    state.session.sign_out()?;

    info!("driver signed out");
    Ok(Json(view(&state)))
}
