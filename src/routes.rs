use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::json;
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use uuid::Uuid;

use crate::{
    analysis::{AnalysisError, FlyerAnalyzer, ANALYSIS_FAILED_MESSAGE},
    models::{AnalysisResult, FlyerSubmission, Preferences},
    request::AnalysisRequest,
    session::{Action, Effect, Session, SessionError, Step},
    views::{FormOptions, SessionView},
};

/// Multipart field carrying the flyer file.
pub const FLYER_FIELD: &str = "flyer";

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    pub analyzer: Arc<dyn FlyerAnalyzer>,
}

impl AppState {
    pub fn new(analyzer: Arc<dyn FlyerAnalyzer>) -> Self {
        Self { sessions: Arc::default(), analyzer }
    }

    /// Drops sessions idle for longer than `max_idle`, releasing their uploads.
    /// Sessions waiting on an analysis are kept until it resolves.
    pub fn evict_idle(&self, now: DateTime<Utc>, max_idle: chrono::Duration) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|id, session| {
            let keep = session.step() == Step::Submitting || now - session.last_active() <= max_idle;
            if !keep {
                tracing::debug!(%id, has_flyer = session.flyer().is_some(), "evicting idle session");
            }
            keep
        });
        before - sessions.len()
    }
}

/// Periodically evicts idle sessions for the life of the process.
pub fn spawn_session_sweeper(state: AppState, max_idle: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let limit = match chrono::Duration::from_std(max_idle) {
            Ok(limit) => limit,
            Err(e) => {
                tracing::error!("❌ Session idle limit {:?} is out of range, eviction disabled: {}", max_idle, e);
                return;
            }
        };
        let mut ticker = tokio::time::interval((max_idle / 4).clamp(Duration::from_secs(1), Duration::from_secs(60)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = state.evict_idle(Utc::now(), limit);
            if evicted > 0 {
                tracing::info!("🧹 Evicted {} idle session(s)", evicted);
            }
        }
    })
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session not found")]
    NotFound,
    #[error("no flyer selected")]
    NoFlyer,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Upload(#[from] MultipartError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("{}", ANALYSIS_FAILED_MESSAGE)]
    AnalysisFailed,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound | ApiError::NoFlyer => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upload(e) => e.status(),
            ApiError::Session(SessionError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            ApiError::Session(SessionError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::AnalysisFailed => StatusCode::BAD_GATEWAY,
        };
        let message = match &self {
            ApiError::Upload(e) => e.body_text(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/options", get(get_options))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/flyer", put(upload_flyer).get(get_flyer).delete(clear_flyer))
        .route("/api/sessions/:id/preferences", put(update_preferences))
        .route("/api/sessions/:id/analyze", post(analyze))
        .route("/api/sessions/:id/reset", post(reset_session))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

fn dispatch(state: &AppState, id: Uuid, action: Action) -> Result<SessionView, ApiError> {
    let mut sessions = state.sessions.write();
    let session = sessions.get_mut(&id).ok_or(ApiError::NotFound)?;
    session.dispatch(action)?;
    Ok(SessionView::new(id, session))
}

pub async fn get_options() -> Json<FormOptions> {
    Json(FormOptions::current())
}

pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let id = Uuid::new_v4();
    let session = Session::new();
    let view = SessionView::new(id, &session);
    state.sessions.write().insert(id, session);
    tracing::info!("🆕 Created session {}", id);
    (StatusCode::CREATED, Json(view))
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, ApiError> {
    let sessions = state.sessions.read();
    let session = sessions.get(&id).ok_or(ApiError::NotFound)?;
    Ok(Json(SessionView::new(id, session)))
}

pub async fn delete_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.sessions.write().remove(&id).ok_or(ApiError::NotFound)?;
    tracing::info!("🗑️ Deleted session {}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_flyer(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SessionView>, ApiError> {
    let mut flyer: Option<FlyerSubmission> = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FLYER_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or(FLYER_FIELD).to_string();
        let media_type = field.content_type().unwrap_or("application/octet-stream").to_string();
        if !FlyerSubmission::accepts_media_type(&media_type) {
            return Err(ApiError::BadRequest(format!("unsupported file type: {}", media_type)));
        }
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("uploaded file is empty".into()));
        }
        flyer = Some(FlyerSubmission::new(file_name, media_type, bytes));
    }

    let flyer = flyer.ok_or_else(|| ApiError::BadRequest(format!("missing '{}' field", FLYER_FIELD)))?;
    tracing::info!("📎 Session {} selected '{}' ({}, {} bytes)", id, flyer.file_name, flyer.media_type, flyer.size());
    Ok(Json(dispatch(&state, id, Action::SelectFlyer(flyer))?))
}

/// Serves the stored upload so the page can show a preview. The bytes are
/// client supplied, so the response is sandboxed against active content.
pub async fn get_flyer(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Response, ApiError> {
    let (media_type, bytes) = {
        let sessions = state.sessions.read();
        let session = sessions.get(&id).ok_or(ApiError::NotFound)?;
        let flyer = session.flyer().ok_or(ApiError::NoFlyer)?;
        (flyer.media_type.clone(), flyer.bytes.clone())
    };
    let headers = [
        (header::CONTENT_TYPE, media_type),
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        (header::CONTENT_SECURITY_POLICY, "sandbox".to_string()),
    ];
    Ok((headers, bytes).into_response())
}

pub async fn clear_flyer(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(dispatch(&state, id, Action::ClearFlyer)?))
}

pub async fn update_preferences(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<Preferences>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(dispatch(&state, id, Action::SetPreferences(body))?))
}

pub async fn analyze(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, ApiError> {
    let (ticket, request) = {
        let mut sessions = state.sessions.write();
        let session = sessions.get_mut(&id).ok_or(ApiError::NotFound)?;
        match session.dispatch(Action::Submit)? {
            Effect::Analyze { ticket, request } => (ticket, request),
            _ => return Ok(Json(SessionView::new(id, session))),
        }
    };

    tracing::info!("🚀 Session {} analyzing flyer (attempt {})", id, ticket);
    // Detached so a dropped connection still resolves the session.
    match tokio::spawn(run_analysis(state.clone(), id, ticket, request)).await {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!("❌ Analysis task for session {} did not finish: {}", id, e);
            resolve(&state, id, ticket, Err(AnalysisError::new(e)))
        }
    }
}

async fn run_analysis(
    state: AppState,
    id: Uuid,
    ticket: u64,
    request: AnalysisRequest,
) -> Result<Json<SessionView>, ApiError> {
    let outcome = state.analyzer.analyze(&request).await;
    drop(request);
    resolve(&state, id, ticket, outcome)
}

fn resolve(
    state: &AppState,
    id: Uuid,
    ticket: u64,
    outcome: Result<AnalysisResult, AnalysisError>,
) -> Result<Json<SessionView>, ApiError> {
    let failed = outcome.is_err();
    let (effect, view) = {
        let mut sessions = state.sessions.write();
        let session = sessions.get_mut(&id).ok_or(ApiError::NotFound)?;
        let effect = session.dispatch(Action::Resolve { ticket, outcome })?;
        (effect, SessionView::new(id, session))
    };

    match effect {
        Effect::Discarded => {
            tracing::info!("↩️ Session {} moved on before attempt {} finished", id, ticket);
            Ok(Json(view))
        }
        _ if failed => Err(ApiError::AnalysisFailed),
        _ => {
            tracing::info!("✅ Session {} analysis finished", id);
            Ok(Json(view))
        }
    }
}

pub async fn reset_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(dispatch(&state, id, Action::Reset)?))
}
