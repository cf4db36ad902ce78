use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{AvailabilityWindow, Company};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct CompanyQuery {
    pub company_id: Option<String>,
}

// GET /api/admin/status
#[derive(Serialize)]
pub struct StatusResponse {
    active_calls: usize,
    upcoming_meetings_count: i64,
    windows_count: usize,
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<StatusResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let company_id = query.company_id.as_deref().unwrap_or("default");

    let (upcoming, windows_count) = {
        let db = state.db.lock().unwrap();
        let upcoming = queries::upcoming_meeting_count(&db, company_id)?;
        let windows = queries::list_windows(&db, company_id)?;
        (upcoming, windows.len())
    };

    Ok(Json(StatusResponse {
        active_calls: state.sessions.len(),
        upcoming_meetings_count: upcoming,
        windows_count,
    }))
}

// GET /api/admin/meetings
#[derive(Deserialize)]
pub struct MeetingsQuery {
    pub company_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct MeetingResponse {
    id: String,
    company_id: String,
    prospect_name: Option<String>,
    prospect_contact: Option<String>,
    start_at: String,
    duration_minutes: i64,
    status: String,
    call_id: Option<String>,
    created_at: String,
}

pub async fn get_meetings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<MeetingsQuery>,
) -> Result<Json<Vec<MeetingResponse>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let company_id = query.company_id.as_deref().unwrap_or("default");
    let limit = query.limit.unwrap_or(50);

    let meetings = state
        .ledger
        .list(company_id, query.status.as_deref(), limit)?;

    let response: Vec<MeetingResponse> = meetings
        .into_iter()
        .map(|m| MeetingResponse {
            id: m.id,
            company_id: m.company_id,
            prospect_name: m.prospect_name,
            prospect_contact: m.prospect_contact,
            start_at: m.start_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            duration_minutes: m.duration_minutes,
            status: m.status.as_str().to_string(),
            call_id: m.call_id,
            created_at: m.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();

    Ok(Json(response))
}

// POST /api/admin/meetings/:id/cancel
pub async fn cancel_meeting(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    // Idempotent: cancelling twice (or a meeting we never had) is fine.
    state.ledger.cancel(&id)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

// POST /api/admin/meetings/clear
pub async fn clear_meetings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let company_id = query.company_id.as_deref().unwrap_or("default");

    let cleared = state.ledger.clear_all(company_id)?;
    Ok(Json(serde_json::json!({"ok": true, "cleared": cleared})))
}

// GET /api/admin/windows
pub async fn get_windows(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<Vec<AvailabilityWindow>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let company_id = query.company_id.as_deref().unwrap_or("default");

    let windows = {
        let db = state.db.lock().unwrap();
        queries::list_windows(&db, company_id)?
    };
    Ok(Json(windows))
}

// POST /api/admin/windows (replaces the whole window set)
#[derive(Deserialize)]
pub struct UpdateWindowsRequest {
    pub company_id: Option<String>,
    pub windows: Vec<WindowSpec>,
}

#[derive(Deserialize)]
pub struct WindowSpec {
    pub weekday: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

pub async fn update_windows(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpdateWindowsRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let company_id = body.company_id.as_deref().unwrap_or("default").to_string();

    let windows: Vec<AvailabilityWindow> = body
        .windows
        .into_iter()
        .enumerate()
        .map(|(position, w)| AvailabilityWindow {
            company_id: company_id.clone(),
            weekday: w.weekday,
            start: w.start,
            end: w.end,
            timezone: w.timezone.unwrap_or_else(|| "UTC".to_string()),
            position: position as i64,
        })
        .collect();

    for window in &windows {
        window
            .validate()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
    }

    {
        let mut db = state.db.lock().unwrap();
        queries::replace_windows(&mut db, &company_id, &windows)?;
    }

    Ok(Json(serde_json::json!({"ok": true, "count": windows.len()})))
}

// GET /api/admin/company
pub async fn get_company(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<CompanyQuery>,
) -> Result<Json<Company>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let company_id = query.company_id.as_deref().unwrap_or("default");

    let company = {
        let db = state.db.lock().unwrap();
        queries::get_company(&db, company_id)?.unwrap_or_else(|| Company::fallback(company_id))
    };
    Ok(Json(company))
}

// POST /api/admin/company
#[derive(Deserialize)]
pub struct UpdateCompanyRequest {
    pub company_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub agent_name: Option<String>,
    pub timezone: Option<String>,
}

pub async fn update_company(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<UpdateCompanyRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let company_id = body.company_id.as_deref().unwrap_or("default");

    let db = state.db.lock().unwrap();

    let mut company = queries::get_company(&db, company_id)
        .ok()
        .flatten()
        .unwrap_or_else(|| Company::fallback(company_id));

    if let Some(name) = body.name {
        company.name = name;
    }
    if let Some(description) = body.description {
        company.description = description;
    }
    if let Some(agent_name) = body.agent_name {
        company.agent_name = agent_name;
    }
    if let Some(timezone) = body.timezone {
        if timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(AppError::BadRequest(format!("invalid timezone: {timezone}")));
        }
        company.timezone = timezone;
    }

    queries::save_company(&db, &company)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

// POST /api/admin/calls (dial a prospect)
#[derive(Deserialize)]
pub struct StartCallRequest {
    pub to: String,
    pub company_id: Option<String>,
}

pub async fn start_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<StartCallRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let company_id = body.company_id.as_deref().unwrap_or("default");

    let webhook_url = format!(
        "{}/webhook/voice?company_id={}",
        state.config.public_base_url.trim_end_matches('/'),
        company_id
    );

    let call_sid = state
        .telephony
        .start_call(&body.to, &webhook_url)
        .await
        .map_err(|e| AppError::Telephony(e.to_string()))?;

    tracing::info!(to = %body.to, call_sid = %call_sid, "outbound call started");
    Ok(Json(serde_json::json!({"ok": true, "call_sid": call_sid})))
}
