//! HTTP request handlers for the dispatch service.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{GatewayError, StoreError};
use crate::gateway::{NoCompensation, ProvisionalRollback, ScheduleGateway, TaskGateway};
use crate::jobs::{NewRecord, ProvisionalRecord, ProvisionalStore, RecordStatus};
use crate::types::{CronData, QueueRegistry, TaskBlock};

/// Application state shared across handlers.
pub struct AppState {
    pub tasks: TaskGateway,
    pub schedules: ScheduleGateway,
    pub store: Arc<dyn ProvisionalStore>,
    pub queues: QueueRegistry,
}

/// Errors returned to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("record {0} not found")]
    NotFound(u64),

    #[error("Push task failed. Please retry later")]
    Dispatch(#[from] GatewayError),

    #[error("internal server error")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Dispatch(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Dispatch(cause) => warn!(cause = %cause, "Dispatch handshake failed"),
            ApiError::Internal(detail) => error!(detail = %detail, "Internal error"),
            _ => {}
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

/// Health check endpoint.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Request to analyze an uploaded file.
#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    pub path: String,
    pub file: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct SubmitTaskResponse {
    pub id: u64,
    pub status: RecordStatus,
}

/// Record the file and dispatch its analysis task.
///
/// The record is written first; if the dispatch handshake fails it is
/// rolled back and the client is asked to retry.
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitTaskRequest>,
) -> Result<(StatusCode, Json<SubmitTaskResponse>), ApiError> {
    if request.path.trim().is_empty() || request.file.trim().is_empty() {
        return Err(ApiError::BadRequest("path and file are required".to_string()));
    }

    let payload = serde_json::to_vec(&TaskBlock {
        path: request.path.clone(),
        file: request.file.clone(),
    })?;

    let id = state
        .store
        .insert_provisional_record(NewRecord {
            path: request.path,
            file: request.file,
            tags: request.tags,
        })
        .await?;

    let rollback = ProvisionalRollback::new(Arc::clone(&state.store), id);
    state
        .tasks
        .submit_task(
            payload,
            &id.to_string(),
            &state.queues.task.name,
            request.priority.unwrap_or(0),
            &rollback,
        )
        .await?;

    info!(record_id = id, "Analysis task dispatched");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitTaskResponse {
            id,
            status: RecordStatus::Pending,
        }),
    ))
}

/// Get a record's status.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<ProvisionalRecord>, ApiError> {
    state
        .store
        .get_record(id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

/// Create or update a recurring report.
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub report_id: String,
    pub cron: String,
    pub email: Vec<String>,
    pub appid: String,
    pub method: String,
    pub period: String,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub report_id: String,
    pub correlation_id: String,
}

/// Send a schedule update to the report scheduler.
pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    if request.cron.split_whitespace().count() != 5 {
        return Err(ApiError::BadRequest("wrong crontab".to_string()));
    }

    let task = serde_json::to_vec(&CronData {
        cron: request.cron,
        email: request.email,
        appid: request.appid,
        method: request.method,
        id: request.report_id.clone(),
        period: request.period,
    })?;
    let correlation_id = Uuid::new_v4().simple().to_string();

    state
        .schedules
        .submit_schedule(
            task,
            &correlation_id,
            &state.queues.schedule.name,
            &NoCompensation,
        )
        .await?;

    info!(report_id = %request.report_id, "Schedule update dispatched");

    Ok(Json(ScheduleResponse {
        report_id: request.report_id,
        correlation_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayConfig;
    use crate::jobs::MemoryStore;
    use crate::messaging::fake::FakeTransport;
    use crate::messaging::{handoff, BrokerConnection, Intake, OutboundDispatcher};
    use crate::types::{BrokerSettings, DispatchRequest, ScheduledTaskRequest};
    use pretty_assertions::assert_eq;

    struct Harness {
        state: Arc<AppState>,
        store: Arc<MemoryStore>,
        task_intake: Intake<DispatchRequest>,
        schedule_intake: Intake<ScheduledTaskRequest>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let (task_handoff, task_intake) = handoff();
        let (schedule_handoff, schedule_intake) = handoff();
        let state = Arc::new(AppState {
            tasks: TaskGateway::new(task_handoff, GatewayConfig::default()),
            schedules: ScheduleGateway::new(schedule_handoff, GatewayConfig::default()),
            store: store.clone(),
            queues: QueueRegistry::default(),
        });
        Harness {
            state,
            store,
            task_intake,
            schedule_intake,
        }
    }

    fn spawn_dispatcher<S>(transport: &FakeTransport, intake: Intake<S>)
    where
        Intake<S>: crate::messaging::TaskSource + 'static,
    {
        let connection = Arc::new(BrokerConnection::new(
            transport.clone(),
            &BrokerSettings::default(),
        ));
        let dispatcher = OutboundDispatcher::new(connection, QueueRegistry::default());
        tokio::spawn(dispatcher.run(intake));
    }

    fn task_request() -> SubmitTaskRequest {
        SubmitTaskRequest {
            path: "/a".to_string(),
            file: "b.wav".to_string(),
            tags: vec!["vip".to_string()],
            priority: Some(5),
        }
    }

    #[tokio::test]
    async fn test_submit_task_dispatches_and_keeps_record() {
        let h = harness();
        let transport = FakeTransport::new();
        spawn_dispatcher(&transport, h.task_intake);

        let (status, Json(body)) = submit_task(State(h.state.clone()), Json(task_request()))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body.status, RecordStatus::Pending);
        assert!(h.store.get_record(body.id).await.is_some());

        let published = transport.published();
        let block: TaskBlock = serde_json::from_slice(&published[0].1.body).unwrap();
        assert_eq!(
            block,
            TaskBlock {
                path: "/a".to_string(),
                file: "b.wav".to_string()
            }
        );
        assert_eq!(
            published[0].1.correlation_id.as_deref(),
            Some(body.id.to_string().as_str())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_intake_returns_503_and_rolls_back() {
        let h = harness();
        let _stalled = h.task_intake;

        let err = submit_task(State(h.state.clone()), Json(task_request()))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Dispatch(GatewayError::EnqueueTimeout)));
        assert_eq!(err.to_string(), "Push task failed. Please retry later");
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        assert!(h.store.is_empty().await);
        assert_eq!(h.store.dependent_row_count(1).await, 0);
    }

    #[tokio::test]
    async fn test_submit_task_rejects_empty_file() {
        let h = harness();
        let request = SubmitTaskRequest {
            file: " ".to_string(),
            ..task_request()
        };

        let err = submit_task(State(h.state.clone()), Json(request))
            .await
            .unwrap_err();

        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_task_not_found() {
        let h = harness();
        let err = get_task(State(h.state.clone()), Path(12)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    fn schedule_request(cron: &str) -> ScheduleRequest {
        ScheduleRequest {
            report_id: "9".to_string(),
            cron: cron.to_string(),
            email: vec!["ops@example.com".to_string()],
            appid: "app".to_string(),
            method: "PUT".to_string(),
            period: "week".to_string(),
        }
    }

    #[tokio::test]
    async fn test_update_schedule_dispatches_cron_data() {
        let h = harness();
        let transport = FakeTransport::new();
        spawn_dispatcher(&transport, h.schedule_intake);

        let Json(body) = update_schedule(State(h.state.clone()), Json(schedule_request("0 8 * * 1")))
            .await
            .unwrap();

        assert_eq!(body.report_id, "9");
        assert_eq!(body.correlation_id.len(), 32);

        let published = transport.published();
        assert_eq!(published[0].0, "cronQueue");
        let data: CronData = serde_json::from_slice(&published[0].1.body).unwrap();
        assert_eq!(data.id, "9");
        assert_eq!(data.cron, "0 8 * * 1");
    }

    #[tokio::test]
    async fn test_update_schedule_rejects_bad_cron() {
        let h = harness();
        let err = update_schedule(State(h.state.clone()), Json(schedule_request("* *")))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
