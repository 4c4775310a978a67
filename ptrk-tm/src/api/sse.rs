//! Server-Sent Events stream of engine events

use crate::AppState;
use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Only stream events for this project
    pub project_id: Option<Uuid>,
}

/// GET /api/events
///
/// Streams template updates, clones, recalculation results and component
/// progress changes, with a heartbeat every 15 seconds.
pub async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    ptrk_common::sse::create_event_sse_stream("ptrk-tm", state.engine.events(), query.project_id)
}
