use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::services::calendar::{generate_feed, generate_ics};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FeedQuery {
    pub company_id: Option<String>,
}

fn company_name(state: &AppState, company_id: &str) -> String {
    let db = state.db.lock().unwrap();
    queries::get_company(&db, company_id)
        .ok()
        .flatten()
        .map(|c| c.name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Outdial".to_string())
}

pub async fn calendar_feed(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> Result<Response, AppError> {
    let company_id = query.company_id.as_deref().unwrap_or("default");

    let meetings = state.ledger.list(company_id, Some("booked"), 500)?;
    let ics = generate_feed(&meetings, &company_name(&state, company_id));

    Ok((
        [(header::CONTENT_TYPE, "text/calendar; charset=utf-8")],
        ics,
    )
        .into_response())
}

pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    // Strip .ics suffix if present
    let meeting_id = raw_id.strip_suffix(".ics").unwrap_or(&raw_id);

    let meeting = state
        .ledger
        .get(meeting_id)?
        .ok_or_else(|| AppError::NotFound(format!("meeting {meeting_id}")))?;

    let ics = generate_ics(&meeting, &company_name(&state, &meeting.company_id));
    let filename = format!("meeting-{}.ics", meeting_id);

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                &format!("attachment; filename=\"{filename}\""),
            ),
        ],
        ics,
    )
        .into_response())
}
