//! HTTP request handlers

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use futures::stream::{self, Stream};
use futures::SinkExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{error, warn};

use crate::hub::EventHub;
use crate::models::deployment::{DeployEvent, Deployment};
use crate::server::state::ServerState;
use crate::telemetry::collect_metrics;
use crate::utils::version_info;

/// How often the log follower checks history for new entries
const LOG_FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "nodeup".to_string(),
        version: version.version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Deploy request parameters
#[derive(Debug, Deserialize)]
pub struct DeployParams {
    pub artifact_url: String,
    pub tag: Option<String>,
}

/// Deploy response
#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub instance_id: String,
    pub status: String,
}

/// Deploy handler: create an instance and begin background polling
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<DeployParams>,
) -> Result<impl IntoResponse, StatusCode> {
    state.activity_tracker.touch();

    if params.artifact_url.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state
        .orchestrator
        .deploy(&params.artifact_url, params.tag)
        .await
    {
        Ok(deployment) => Ok((
            StatusCode::ACCEPTED,
            Json(DeployResponse {
                instance_id: deployment.id,
                status: "deploying".to_string(),
            }),
        )),
        Err(e) => {
            error!("Deploy failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Deployment status handler
pub async fn status_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    state.activity_tracker.touch();

    match state.orchestrator.status(&id) {
        Some(deployment) => Ok(Json(deployment)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// Deployments listing response
#[derive(Debug, Serialize)]
pub struct DeploymentsResponse {
    pub deployments: Vec<Deployment>,
    pub total: usize,
}

/// Deployments listing handler
pub async fn deployments_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    state.activity_tracker.touch();

    let deployments = state.orchestrator.list();
    let total = deployments.len();

    Json(DeploymentsResponse { deployments, total })
}

/// Live event stream handler (SSE). Emits a snapshot of current state,
/// then every subsequently published event in publish order.
pub async fn events_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    state.activity_tracker.touch();

    let snapshot = state.orchestrator.status(&id).ok_or(StatusCode::NOT_FOUND)?;
    let receiver = subscribe_or_closed(state.orchestrator.hub(), &id);

    let initial = tokio_stream::once(Event::default().json_data(&DeployEvent::snapshot(snapshot)));
    let live = BroadcastStream::new(receiver).filter_map(|item| match item {
        Ok(event) => Some(Event::default().json_data(&event)),
        Err(BroadcastStreamRecvError::Lagged(count)) => {
            warn!("Event subscriber lagged by {} messages", count);
            None
        }
    });

    Ok(Sse::new(initial.chain(live)).keep_alive(KeepAlive::default()))
}

/// Live event stream handler (WebSocket). Same event shape as SSE.
pub async fn ws_events_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    state.activity_tracker.touch();

    let Some(snapshot) = state.orchestrator.status(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let receiver = subscribe_or_closed(state.orchestrator.hub(), &id);

    ws.on_upgrade(move |socket| stream_events_over_socket(socket, id, snapshot, receiver))
}

async fn stream_events_over_socket(
    mut socket: WebSocket,
    id: String,
    snapshot: Deployment,
    mut receiver: broadcast::Receiver<DeployEvent>,
) {
    if send_event(&mut socket, &DeployEvent::snapshot(snapshot))
        .await
        .is_err()
    {
        return;
    }

    loop {
        match receiver.recv().await {
            Ok(event) => {
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(count)) => {
                warn!("Socket subscriber for {} lagged by {} messages", id, count);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    let _ = socket.close().await;
}

async fn send_event(socket: &mut WebSocket, event: &DeployEvent) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    socket.send(Message::Text(text.into())).await
}

fn subscribe_or_closed(hub: &Arc<EventHub>, id: &str) -> broadcast::Receiver<DeployEvent> {
    match hub.subscribe(id) {
        Some(receiver) => receiver,
        None => {
            // Stream already closed; a receiver with no sender ends at once
            let (tx, rx) = broadcast::channel(1);
            drop(tx);
            rx
        }
    }
}

/// Log stream request parameters
#[derive(Debug, Deserialize)]
pub struct LogsParams {
    pub offset: Option<usize>,
}

/// Log stream handler (SSE): replays history from the offset, then
/// follows new entries until the stream closes
pub async fn logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Query(params): Query<LogsParams>,
) -> Result<impl IntoResponse, StatusCode> {
    state.activity_tracker.touch();

    if state.orchestrator.status(&id).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    let hub = state.orchestrator.hub().clone();
    let offset = params.offset.unwrap_or(0);

    Ok(Sse::new(log_stream(hub, id, offset)).keep_alive(KeepAlive::default()))
}

/// Only message entries are emitted; snapshots stay on the event stream
fn log_stream(
    hub: Arc<EventHub>,
    id: String,
    offset: usize,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    stream::unfold(
        (hub, id, offset, VecDeque::new()),
        |(hub, id, mut offset, mut pending)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    let item = Event::default().json_data(&event);
                    return Some((item, (hub, id, offset, pending)));
                }

                let (events, next, closed) = hub.history_from(&id, offset);
                if events.is_empty() {
                    if closed {
                        return None;
                    }
                    tokio::time::sleep(LOG_FOLLOW_INTERVAL).await;
                    continue;
                }
                offset = next;
                pending.extend(events.into_iter().filter(|event| event.message.is_some()));
            }
        },
    )
}

/// Destroy response
#[derive(Debug, Serialize)]
pub struct DestroyResponse {
    pub destroyed: bool,
    pub message: String,
}

/// Destroy handler: tears down the instance and the event stream.
/// Unknown ids acknowledge without touching the control plane.
pub async fn destroy_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    state.activity_tracker.touch();

    match state.orchestrator.destroy(&id).await {
        Ok(true) => Ok(Json(DestroyResponse {
            destroyed: true,
            message: format!("Deployment {} destroyed", id),
        })),
        Ok(false) => Ok(Json(DestroyResponse {
            destroyed: false,
            message: format!("Deployment {} not tracked; nothing to do", id),
        })),
        Err(e) => {
            error!("Destroy failed for {}: {}", id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Metrics handler
pub async fn metrics_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    state.activity_tracker.touch();

    let metrics = collect_metrics(state.orchestrator.registry(), &version_info().version);
    Json(metrics)
}
