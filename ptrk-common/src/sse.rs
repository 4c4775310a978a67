//! Server-Sent Events (SSE) utilities
//!
//! Streams [`EngineEvent`]s to HTTP clients with a periodic heartbeat.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::EventBus;

/// Create an SSE stream of engine events
///
/// When `project_filter` is set only that project's events are forwarded.
/// Lagging clients skip the dropped events and keep streaming.
pub fn create_event_sse_stream(
    service_name: &'static str,
    bus: &EventBus,
    project_filter: Option<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} engine events", service_name);
    let mut rx = bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if project_filter.is_some_and(|p| p != event.project_id()) {
                        continue;
                    }
                    match serde_json::to_string(&event) {
                        Ok(data) => {
                            yield Ok(Event::default().event(event.event_type()).data(data));
                        }
                        Err(e) => warn!("SSE: failed to serialize {}: {}", event.event_type(), e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("SSE: client lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => {
                    info!("SSE: {} event bus closed", service_name);
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
