use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use super::error::ApiError;
use super::extract::{ApiJson, ApiQuery};
use crate::ai::Summary;
use crate::constants::DEFAULT_THREAD_MESSAGE_LIMIT;
use crate::error::Error;
use crate::mail::types::{FetchFilter, Thread};
use crate::service::{DraftRequest, SendRequest, ThreadLoad};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    model: String,
    mailbox: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.model.clone(),
        mailbox: state.mailbox.clone(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct ThreadsQuery {
    pub limit: Option<u32>,
    #[serde(default)]
    pub important: bool,
    #[serde(default)]
    pub unread: bool,
    pub days: Option<u32>,
    pub sender: Option<String>,
}

impl ThreadsQuery {
    fn into_filter(self, state: &AppState) -> FetchFilter {
        FetchFilter {
            limit: state.fetch.clamp_limit(self.limit),
            important_only: self.important,
            unread_only: self.unread,
            days: self.days.filter(|d| *d > 0),
            sender: self
                .sender
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ThreadsResponse {
    threads: Vec<Thread>,
}

pub async fn list_threads(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ThreadsQuery>,
) -> ApiResult<ThreadsResponse> {
    let filter = query.into_filter(&state);
    tracing::debug!(?filter, "GET /threads");
    let threads = state.threads.list_threads(&filter).await?;
    Ok(Json(ThreadsResponse { threads }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ThreadQuery {
    pub limit: Option<usize>,
}

/// 404 still carries the response shape, with a null thread.
pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    ApiQuery(query): ApiQuery<ThreadQuery>,
) -> Result<Response, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_THREAD_MESSAGE_LIMIT).max(1);
    tracing::debug!(thread_id = %thread_id, limit, "GET /thread");

    match state.threads.load_thread(&thread_id, limit).await? {
        ThreadLoad::Ready(page) => Ok(Json(page).into_response()),
        ThreadLoad::Empty => {
            tracing::warn!(thread_id = %thread_id, "Thread not found");
            let body = json!({
                "thread": null,
                "messages": [],
                "totalMessages": 0,
                "error": "NotFound",
                "message": format!("thread {thread_id} not found"),
            });
            Ok((StatusCode::NOT_FOUND, Json(body)).into_response())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryBody {
    pub thread_id: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    summary: Summary,
}

fn require_thread_id(thread_id: &str) -> Result<(), ApiError> {
    if thread_id.trim().is_empty() {
        return Err(Error::InvalidRequest("threadId is required".to_string()).into());
    }
    Ok(())
}

pub async fn summary(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SummaryBody>,
) -> ApiResult<SummaryResponse> {
    tracing::debug!(thread_id = %body.thread_id, "POST /summary");
    require_thread_id(&body.thread_id)?;
    let summary = state.summaries.get_or_create(&body.thread_id).await?;
    Ok(Json(SummaryResponse { summary }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftBody {
    pub thread_id: String,
    #[serde(default)]
    pub goal: String,
    pub persona_name: Option<String>,
    pub persona_style: Option<String>,
    pub tone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DraftResponse {
    draft: String,
    summary: Summary,
}

pub async fn draft(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<DraftBody>,
) -> ApiResult<DraftResponse> {
    tracing::debug!(thread_id = %body.thread_id, tone = ?body.tone, "POST /draft");
    require_thread_id(&body.thread_id)?;

    let request = DraftRequest {
        thread_id: body.thread_id,
        goal: body.goal,
        persona_name: body.persona_name,
        persona_style: body.persona_style,
        tone: body.tone,
    };
    let draft = state.replies.generate_draft(&request).await?;
    Ok(Json(DraftResponse {
        draft: draft.draft,
        summary: draft.summary,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendBody {
    pub thread_id: Option<String>,
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub from: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    status: &'static str,
    message_id: String,
}

pub async fn send(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SendBody>,
) -> ApiResult<SendResponse> {
    tracing::debug!(to = %body.to, thread_id = ?body.thread_id, "POST /send");

    let request = SendRequest {
        thread_id: body.thread_id.filter(|id| !id.trim().is_empty()),
        to: body.to,
        subject: body.subject,
        body: body.body,
        from: body.from.filter(|f| !f.trim().is_empty()),
    };
    let message_id = state.replies.send(&request).await?;
    Ok(Json(SendResponse {
        status: "sent",
        message_id,
    }))
}
