// SPDX-License-Identifier: Apache-2.0
//! Command API handlers. Every route is nested under
//! `/sessions/:session_id`, which gives a single place to enforce the
//! "a session's `user_id` never changes" rule (`AppState::authorize_session`)
//! before a command is forwarded to the orchestrator.

use axum::{
    extract::{Multipart, Path, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use agentforge_plan::{DatasetHandle, Message, Plan, PlanStatus};
use agentforge_store::{typed, DocumentKind};

use crate::auth::AuthedUser;
use crate::error::GatewayError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadDatasetResponse {
    pub dataset_id: uuid::Uuid,
}

pub async fn upload_dataset(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Extension(user): Extension<AuthedUser>,
    mut multipart: Multipart,
) -> Result<Json<UploadDatasetResponse>, GatewayError> {
    state.authorize_session(&session_id, &user.user_id).await?;

    let mut filename = "upload.bin".to_string();
    let mut content_type = "application/octet-stream".to_string();
    let mut bytes = Vec::new();
    let mut found_file = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::Validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        filename = field.file_name().unwrap_or("upload.bin").to_string();
        content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
        bytes = field
            .bytes()
            .await
            .map_err(|e| GatewayError::Validation(format!("failed reading upload body: {e}")))?
            .to_vec();
        found_file = true;
    }

    if !found_file {
        return Err(GatewayError::Validation("multipart body must include a \"file\" field".to_string()));
    }

    let location = state.blob.put(&bytes).await.map_err(|e| GatewayError::Internal(e.to_string()))?;
    let now = Utc::now();
    let handle = DatasetHandle::new(filename, user.user_id.clone(), bytes.len() as u64, content_type, location, now);

    typed::put(state.store.as_ref(), DocumentKind::Dataset, &handle.dataset_id.to_string(), &session_id, &handle)
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    Ok(Json(UploadDatasetResponse { dataset_id: handle.dataset_id }))
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub team_id: String,
    pub user_request: String,
    #[serde(default)]
    pub facts: Value,
}

pub async fn create_plan(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Extension(user): Extension<AuthedUser>,
    Json(req): Json<CreatePlanRequest>,
) -> Result<Json<Plan>, GatewayError> {
    state.authorize_session(&session_id, &user.user_id).await?;
    let plan = state
        .orchestrator
        .create_plan(session_id, req.team_id, req.user_request, req.facts)
        .await?;
    Ok(Json(plan))
}

#[derive(Debug, Deserialize)]
pub struct ApprovePlanRequest {
    pub approved: bool,
}

pub async fn approve_plan(
    State(state): State<AppState>,
    Path((session_id, plan_id)): Path<(String, String)>,
    Extension(user): Extension<AuthedUser>,
    Json(req): Json<ApprovePlanRequest>,
) -> Result<Json<Plan>, GatewayError> {
    state.authorize_session(&session_id, &user.user_id).await?;
    let plan = if req.approved {
        state.orchestrator.approve_plan(plan_id).await?
    } else {
        state.orchestrator.cancel(plan_id).await?
    };
    Ok(Json(plan))
}

#[derive(Debug, Deserialize)]
pub struct ClarifyRequest {
    pub reply: String,
}

pub async fn clarify_plan(
    State(state): State<AppState>,
    Path((session_id, plan_id)): Path<(String, String)>,
    Extension(user): Extension<AuthedUser>,
    Json(req): Json<ClarifyRequest>,
) -> Result<Json<Plan>, GatewayError> {
    state.authorize_session(&session_id, &user.user_id).await?;
    let plan = state.orchestrator.clarify(plan_id, req.reply).await?;
    Ok(Json(plan))
}

pub async fn cancel_plan(
    State(state): State<AppState>,
    Path((session_id, plan_id)): Path<(String, String)>,
    Extension(user): Extension<AuthedUser>,
) -> Result<Json<Plan>, GatewayError> {
    state.authorize_session(&session_id, &user.user_id).await?;
    let plan = state.orchestrator.cancel(plan_id).await?;
    Ok(Json(plan))
}

#[derive(Debug, Serialize)]
pub struct PlanDetail {
    #[serde(flatten)]
    pub plan: Plan,
    /// The most recent entries of the session's transcript that belong to
    /// this plan. Bounded so a long-running plan's response body doesn't
    /// grow unbounded.
    pub transcript_tail: Vec<Message>,
}

const TRANSCRIPT_TAIL_LEN: usize = 50;

pub async fn get_plan(
    State(state): State<AppState>,
    Path((session_id, plan_id)): Path<(String, String)>,
    Extension(user): Extension<AuthedUser>,
) -> Result<Json<PlanDetail>, GatewayError> {
    state.authorize_session(&session_id, &user.user_id).await?;

    let plan: Plan = typed::get_required(state.store.as_ref(), DocumentKind::Plan, &plan_id, &session_id)
        .await
        .map_err(|e| GatewayError::PlanNotFound(e.to_string()))?;

    let mut messages: Vec<Message> = typed::list(state.store.as_ref(), DocumentKind::Message, &session_id, None)
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?
        .into_iter()
        .filter(|m: &Message| m.plan_id.as_deref() == Some(plan_id.as_str()))
        .collect();
    messages.sort_by_key(|m| m.timestamp);
    let tail_start = messages.len().saturating_sub(TRANSCRIPT_TAIL_LEN);
    let transcript_tail = messages.split_off(tail_start);

    Ok(Json(PlanDetail { plan, transcript_tail }))
}

#[derive(Debug, Serialize)]
pub struct PlanSummary {
    pub plan_id: String,
    pub team_id: String,
    pub user_request: String,
    pub overall_status: PlanStatus,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl From<Plan> for PlanSummary {
    fn from(p: Plan) -> Self {
        Self {
            plan_id: p.plan_id,
            team_id: p.team_id,
            user_request: p.user_request,
            overall_status: p.overall_status,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Extension(user): Extension<AuthedUser>,
) -> Result<Json<Vec<PlanSummary>>, GatewayError> {
    state.authorize_session(&session_id, &user.user_id).await?;
    let plans: Vec<Plan> = typed::list(state.store.as_ref(), DocumentKind::Plan, &session_id, None)
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    let mut summaries: Vec<PlanSummary> = plans.into_iter().map(PlanSummary::from).collect();
    summaries.sort_by_key(|p| p.created_at);
    Ok(Json(summaries))
}
