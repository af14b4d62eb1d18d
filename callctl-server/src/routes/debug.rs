//! Debug endpoints, mounted only with `debug_routes`

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use callctl_core::webhook::VAPI_CALL_ID_COLUMN;
use callctl_core::{Filter, Query, Row, Table};

use crate::error::ApiError;
use crate::server::AppState;

/// GET /debug/calls/{vapi_call_id} - stored call row for a platform call id
async fn get_call(
    State(state): State<Arc<AppState>>,
    Path(vapi_call_id): Path<String>,
) -> Result<Json<Row>, ApiError> {
    let query = Query::new()
        .filter(Filter::eq(VAPI_CALL_ID_COLUMN, vapi_call_id.clone())?)
        .limit(1);

    state
        .store
        .select(Table::Calls, &query)
        .await?
        .into_iter()
        .next()
        .map(Json)
        .ok_or(ApiError::NotFound {
            resource: "call",
            id: vapi_call_id,
        })
}

/// Debug routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/debug/calls/{vapi_call_id}", get(get_call))
}
