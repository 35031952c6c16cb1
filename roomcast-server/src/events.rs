//! `GET /events`: the SSE stream of `StatusEvent`s, fed by the
//! [`crate::egress::HttpEgress`] the composition root registers with the
//! coordinator.

use std::convert::Infallible;

use async_stream::stream;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::Stream;

use crate::dto::StatusEventDto;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(events_stream))
}

#[utoipa::path(get, path = "/events", tag = "events",
    responses((status = 200, description = "Server-sent stream of status events", content_type = "text/event-stream")))]
pub async fn events_stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.status_tx.subscribe();
    let stream = stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let payload = StatusEventDto::from(&event);
                    if let Ok(json) = serde_json::to_string(&payload) {
                        yield Ok(Event::default().event("status").data(json));
                    }
                }
                // A slow subscriber that lagged past the channel capacity
                // just resumes from the next event; it never terminates the
                // stream.
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}
