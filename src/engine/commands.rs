use tokio::sync::oneshot;

use crate::engine::lifecycle::{Action, DriverSnapshot};
use crate::error::AppError;
use crate::state::AppState;

/// A user-initiated action plus the channel its outcome goes back on.
pub struct Command {
    pub action: Action,
    pub reply: oneshot::Sender<Result<DriverSnapshot, AppError>>,
}

pub async fn submit(state: &AppState, action: Action) -> Result<DriverSnapshot, AppError> {
    let (reply, outcome) = oneshot::channel();

    state
        .command_tx
        .send(Command { action, reply })
        .await
        .map_err(|err| AppError::Internal(format!("driver runtime unavailable: {err}")))?;

    outcome
        .await
        .map_err(|err| AppError::Internal(format!("driver runtime dropped command: {err}")))?
}
