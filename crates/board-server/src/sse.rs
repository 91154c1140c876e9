//! Server-Sent Events endpoint for change notifications

use crate::server::SharedState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use board_core::Timestamp;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tracing::debug;

/// Messages pushed to connected observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Connected { message: String },
    /// Something committed; re-poll with this watermark
    Dt { dt: Timestamp },
}

impl Notification {
    fn event_name(&self) -> &'static str {
        match self {
            Notification::Connected { .. } => "connected",
            Notification::Dt { .. } => "dt",
        }
    }

    fn into_event(self) -> Option<Event> {
        let json = serde_json::to_string(&self).ok()?;
        Some(Event::default().event(self.event_name()).data(json))
    }
}

/// SSE handler - registers an observer and streams watermarks to it
pub async fn sse_handler(
    State(app): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut subscription = app.board.notifier().subscribe();

    let stream = async_stream::stream! {
        let hello = Notification::Connected {
            message: "Connected to task board".to_string(),
        };
        if let Some(event) = hello.into_event() {
            yield Ok(event);
        }

        // The subscription is dropped, and unregistered, with the stream.
        while let Some(dt) = subscription.recv().await {
            if let Some(event) = (Notification::Dt { dt }).into_event() {
                yield Ok(event);
            }
        }
        debug!(subscriber = subscription.id(), "Event stream closed");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
