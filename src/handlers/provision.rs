use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::provision::{backbone_pop, rear_ports, tunnel, Event, EventLog, Recorder};
use crate::AppState;

use super::ApiError;

/// Workflow result plus the operator-visible event stream
#[derive(Serialize)]
pub struct WorkflowResponse<T> {
    pub run_id: Uuid,
    pub report: T,
    pub events: Vec<Event>,
}

fn completed<T>(report: T, recorder: Recorder) -> Json<WorkflowResponse<T>> {
    Json(WorkflowResponse {
        run_id: Uuid::new_v4(),
        report,
        events: recorder.take(),
    })
}

/// Provision a point of presence: rack, patch panel, surge protectors,
/// access switch and backbone router, cabled and addressed
pub async fn backbone_pop(
    State(state): State<Arc<AppState>>,
    Json(req): Json<backbone_pop::BackbonePopRequest>,
) -> Result<Json<WorkflowResponse<backbone_pop::BackbonePopReport>>, ApiError> {
    let recorder = Recorder::new();
    match backbone_pop::run(state.inventory.as_ref(), &recorder, &state.settings, req).await {
        Ok(report) => Ok(completed(report, recorder)),
        Err(err) => {
            recorder.failure(&err.to_string());
            Err(err.into())
        }
    }
}

/// Connect the rear ports of two patch panels pairwise
pub async fn rear_ports(
    State(state): State<Arc<AppState>>,
    Json(req): Json<rear_ports::RearPortConnectRequest>,
) -> Result<Json<WorkflowResponse<rear_ports::RearPortConnectReport>>, ApiError> {
    let recorder = Recorder::new();
    match rear_ports::run(state.inventory.as_ref(), &recorder, req).await {
        Ok(report) => Ok(completed(report, recorder)),
        Err(err) => {
            recorder.failure(&err.to_string());
            Err(err.into())
        }
    }
}

/// Provision a WireGuard tunnel between two nodes, including the transfer
/// network and both endpoint addresses
pub async fn tunnel(
    State(state): State<Arc<AppState>>,
    Json(req): Json<tunnel::TunnelRequest>,
) -> Result<Json<WorkflowResponse<tunnel::TunnelReport>>, ApiError> {
    let recorder = Recorder::new();
    match tunnel::run(state.inventory.as_ref(), &recorder, &state.settings, req).await {
        Ok(report) => Ok(completed(report, recorder)),
        Err(err) => {
            recorder.failure(&err.to_string());
            Err(err.into())
        }
    }
}
