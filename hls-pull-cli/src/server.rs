//! HTTP status endpoints of the live sessions.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use futures::Stream;
use hls_pull::SessionRegistry;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, info};

const LIST_INTERVAL: Duration = Duration::from_secs(1);

pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/hls/list", get(list_sessions))
        .route("/hls/save", get(save_session))
        .with_state(registry)
}

/// Pushes the status of every live session once per second.
async fn list_sessions(
    State(registry): State<Arc<SessionRegistry>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    debug!("Status listener connected");
    let stream = IntervalStream::new(tokio::time::interval(LIST_INTERVAL))
        .map(move |_| Event::default().json_data(registry.snapshot()));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct SaveQuery {
    #[serde(rename = "streamPath")]
    stream_path: String,
}

/// Saves the session's segments while the response body stays open.
async fn save_session(
    State(registry): State<Arc<SessionRegistry>>,
    Query(query): Query<SaveQuery>,
) -> Response {
    let Some(session) = registry.get(&query.stream_path) else {
        return (StatusCode::NOT_FOUND, "no such stream").into_response();
    };

    let guard = session.begin_save();
    info!(stream_path = %query.stream_path, "Saving segments on request");

    // Dropping the body (client gone) or the session closing releases the guard.
    let body = futures::stream::once(async move {
        let _guard = guard;
        session.cancelled().await;
        Ok::<_, Infallible>(Bytes::from_static(b"session closed\n"))
    });
    Body::from_stream(body).into_response()
}
