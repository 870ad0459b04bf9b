//! Live triage record stream.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use tokio::sync::broadcast;
use utoipa::OpenApi;

use crate::api::SharedState;
use crate::error::Result;

pub fn router() -> Router<SharedState> {
    Router::new().route("/stream", get(triage_stream))
}

/// Stream triage records via Server-Sent Events.
///
/// Every processed webhook emits one `triage.finished` event carrying the
/// terminal status, fingerprint and issue reference. A client that falls
/// behind receives a `lagged` event and should refetch from the
/// fingerprints listing.
#[utoipa::path(
    get,
    path = "/stream",
    context_path = "/api/v1/triage",
    tag = "triage",
    responses(
        (status = 200, description = "SSE stream of triage records")
    )
)]
async fn triage_stream(
    State(state): State<SharedState>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data(r#"{"status":"ok"}"#));

        loop {
            match rx.recv().await {
                Ok(record) => {
                    let data = serde_json::to_string(&record).unwrap_or_default();
                    yield Ok(Event::default().event("triage.finished").data(data));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    yield Ok(Event::default()
                        .event("lagged")
                        .data(format!(r#"{{"missed":{n}}}"#)));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    ))
}

#[derive(OpenApi)]
#[openapi(paths(triage_stream))]
pub struct StreamApiDoc;
