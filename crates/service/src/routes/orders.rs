//! Order lookup route.

use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use tracing::instrument;

use crate::error::Result;
use crate::state::AppState;

/// Return one order as JSON.
///
/// Responds 404 with `{"error":"Order not found"}` when the order is neither
/// cached nor stored.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(uid): Path<String>) -> Result<Response> {
    let order = state.orders().get_order_by_uid(&uid).await?;
    Ok(Json(order.as_ref()).into_response())
}
