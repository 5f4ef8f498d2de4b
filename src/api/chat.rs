use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde_json::Value;
use tracing::{Instrument, debug, info_span};
use uuid::Uuid;

use super::AppState;
use crate::error::{ApiError, ValidationError};

/// POST {chat path}
///
/// Accepts `{ "prompt": "..." }` or `{ "message": "...", "system": "..." }`
/// and answers with the upstream body or `{ "reply": "..." }`, depending on
/// the configured response shape.
pub async fn relay_chat(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let span = info_span!("chat", request_id = %Uuid::new_v4());

    async move {
        let Json(body) = payload.map_err(|rejection| {
            debug!(error = %rejection, "Rejected chat body");
            ValidationError::InvalidBody
        })?;

        let relayed = state.chat.handle(&body).await?;
        Ok::<_, ApiError>(Json(relayed))
    }
    .instrument(span)
    .await
}
