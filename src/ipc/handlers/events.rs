//! GET /api/events - one-way push of sidecar status transitions and output.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream};
use std::convert::Infallible;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use super::super::IPCServer;
use crate::supervisor::{LogLine, SidecarStatus};

pub const STATUS_EVENT: &str = "sidecar.statusChanged";
pub const LOG_EVENT: &str = "sidecar.log";

struct Subscription {
    status_rx: broadcast::Receiver<SidecarStatus>,
    logs_rx: broadcast::Receiver<LogLine>,
    shutdown: CancellationToken,
    /// Current status goes out first so a new subscriber need not poll.
    initial: Option<SidecarStatus>,
}

fn to_event<T: serde::Serialize>(name: &str, data: &T) -> Option<Event> {
    match Event::default().event(name).json_data(data) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("Dropping {} event: {}", name, e);
            None
        }
    }
}

async fn next_event(sub: &mut Subscription) -> Option<Event> {
    if let Some(status) = sub.initial.take() {
        if let Some(event) = to_event(STATUS_EVENT, &status) {
            return Some(event);
        }
    }

    loop {
        let event = tokio::select! {
            _ = sub.shutdown.cancelled() => return None,
            received = sub.status_rx.recv() => match received {
                Ok(status) => to_event(STATUS_EVENT, &status),
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("Event subscriber lagged, {} status events skipped", n);
                    None
                }
                Err(RecvError::Closed) => return None,
            },
            received = sub.logs_rx.recv() => match received {
                Ok(line) => to_event(LOG_EVENT, &line),
                Err(RecvError::Lagged(n)) => {
                    tracing::debug!("Event subscriber lagged, {} log lines skipped", n);
                    None
                }
                Err(RecvError::Closed) => return None,
            },
        };
        if let Some(event) = event {
            return Some(event);
        }
    }
}

pub async fn stream(
    State(state): State<IPCServer>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = Subscription {
        status_rx: state.subscribe_status(),
        logs_rx: state.supervisor.subscribe_logs(),
        shutdown: state.shutdown_token(),
        initial: Some(state.supervisor.status()),
    };

    let events = stream::unfold(subscription, |mut sub| async move {
        next_event(&mut sub).await.map(|event| (Ok::<_, Infallible>(event), sub))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
