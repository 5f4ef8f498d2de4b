use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde_json::{Value, json};
use tracing::{Instrument, debug, info_span};
use uuid::Uuid;

use super::AppState;
use crate::error::ContactError;

/// POST /send
pub async fn send_contact(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ContactError> {
    let span = info_span!("contact", request_id = %Uuid::new_v4());

    async move {
        let Json(body) = payload.map_err(|rejection| {
            debug!(error = %rejection, "Rejected contact body");
            ContactError::Invalid {
                fields: vec!["body"],
            }
        })?;

        state.contact.handle(&body).await?;
        Ok::<_, ContactError>(Json(json!({ "success": true })))
    }
    .instrument(span)
    .await
}
