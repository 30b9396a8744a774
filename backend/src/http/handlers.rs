//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to the monitor
//! handle, the supervisor or the repository.

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::dto::{
    AlertsQuery, AlertsResponse, AutoShutterRequest, AutoShutterResponse, CollisionsResponse,
    EventsQuery, HealthResponse, InputAges, SelectionRequest, SelectionResponse, StatusResponse,
    WindowsResponse,
};
use super::error::AppError;
use super::state::AppState;
use crate::algorithms::clearance_windows;
use crate::models::{LaserTargetId, NightId};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
///
/// Verify the service is running and the entity store is reachable.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let repository = match state.repository.health_check().await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };
    let gateway = match state.monitor.board().read().gateway {
        Some(reading) if reading.stale => "stale".to_string(),
        Some(reading) if reading.value.connected => "connected".to_string(),
        Some(_) => "disconnected".to_string(),
        None => "unknown".to_string(),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        repository,
        gateway,
    }))
}

// =============================================================================
// Live status
// =============================================================================

/// GET /v1/status
///
/// Latest verdict with the ages of the inputs it was computed from.
pub async fn get_status(State(state): State<AppState>) -> HandlerResult<StatusResponse> {
    let status = state.monitor.status();
    let snapshot = status.snapshot.as_ref();

    Ok(Json(StatusResponse {
        night: state.monitor.board().night(),
        selected_target: state.monitor.selected_target(),
        auto_shutter: state.monitor.auto_shutter(),
        evaluated_at: status.verdict.as_ref().map(|v| v.evaluated_at),
        input_ages: snapshot.map(InputAges::from_snapshot).unwrap_or_default(),
        laser_open: snapshot
            .and_then(|s| s.gateway.as_ref())
            .and_then(|g| g.value.laser_open),
        verdict: status.verdict,
    }))
}

/// GET /v1/collisions
pub async fn get_collisions(State(state): State<AppState>) -> HandlerResult<CollisionsResponse> {
    let response = match state.monitor.collisions() {
        Some(feed) => CollisionsResponse {
            active: feed.value.active,
            preview: feed.value.preview,
            fetched_at: Some(feed.stamp),
            stale: feed.stale,
        },
        None => CollisionsResponse {
            active: Vec::new(),
            preview: Vec::new(),
            fetched_at: None,
            stale: true,
        },
    };
    Ok(Json(response))
}

/// GET /v1/alerts?limit=N
///
/// Most recent alerts, oldest first.
pub async fn get_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> HandlerResult<AlertsResponse> {
    let mut alerts = state.monitor.alerts();
    let total = alerts.len();
    if let Some(limit) = query.limit {
        alerts.drain(..total.saturating_sub(limit));
    }
    Ok(Json(AlertsResponse { alerts, total }))
}

/// GET /v1/events?since=SEQ
///
/// Stream monitor events via Server-Sent Events (SSE). Logged events newer
/// than `since` are replayed first.
pub async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before reading the log so nothing falls in between.
    let mut receiver = state.monitor.subscribe();
    let replay = match query.since {
        Some(sequence) => state.monitor.events().since(sequence),
        None => Vec::new(),
    };

    let stream = async_stream::stream! {
        for logged in replay {
            let data = serde_json::to_string(&logged.event).unwrap_or_default();
            yield Ok(Event::default()
                .event(logged.event.name())
                .id(logged.sequence.to_string())
                .data(data));
        }

        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(event.name()).data(data));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream client lagging");
                    yield Ok(Event::default()
                        .event("lagged")
                        .data(skipped.to_string()));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(1))
            .text("keep-alive"),
    )
}

// =============================================================================
// Operator controls
// =============================================================================

/// PUT /v1/auto-shutter
pub async fn set_auto_shutter(
    State(state): State<AppState>,
    Json(request): Json<AutoShutterRequest>,
) -> HandlerResult<AutoShutterResponse> {
    state.monitor.set_auto_shutter(request.enabled);
    Ok(Json(AutoShutterResponse {
        enabled: state.monitor.auto_shutter(),
    }))
}

/// PUT /v1/selection
///
/// Select the laser target to monitor, switching nights first when a
/// different night is given.
pub async fn set_selection(
    State(state): State<AppState>,
    Json(request): Json<SelectionRequest>,
) -> HandlerResult<SelectionResponse> {
    let current = state.supervisor.current_night().await;
    let night_id = match (request.night_id, current) {
        (Some(requested), Some(current)) if requested == current => current,
        (Some(requested), _) => state.supervisor.start_night(requested).await?.id,
        (None, Some(current)) => current,
        (None, None) => {
            return Err(AppError::BadRequest(
                "No night is being monitored; night_id is required".to_string(),
            ))
        }
    };

    let target = state.supervisor.select_target(request.target_id).await?;
    Ok(Json(SelectionResponse { night_id, target }))
}

// =============================================================================
// Windows
// =============================================================================

/// GET /v1/nights/{night_id}/targets/{target_id}/windows
///
/// Propagation, shuttering and clearance windows of one laser target.
pub async fn get_target_windows(
    State(state): State<AppState>,
    Path((night_id, target_id)): Path<(i64, i64)>,
) -> HandlerResult<WindowsResponse> {
    let night_id = NightId::new(night_id);
    let target_id = LaserTargetId::new(target_id);

    let night = state.repository.get_night(night_id).await?;
    let target = state
        .repository
        .get_laser_target(night_id, target_id)
        .await?;
    let closures = state
        .repository
        .blanket_closures(night.start, night.end)
        .await?;

    Ok(Json(WindowsResponse {
        night_id,
        target_id,
        clearance: clearance_windows(&target.propagation_windows, &closures),
        propagation: target.propagation_windows,
        shuttering: target.shuttering_windows,
    }))
}
