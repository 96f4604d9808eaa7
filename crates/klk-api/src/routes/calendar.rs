//! # Calendar & Academic Terms
//!
//! Administrative calendar of exams, meetings and holidays, plus the school
//! term table. Exactly one term is active at a time: activating a term
//! deactivates the rest in the same transaction.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use klk_core::{AuditAction, EventType, NotificationType};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{Caller, Capability};
use crate::db::audit::{self, AuditEvent};
use crate::db::calendar::{self, AcademicTerm, CalendarEvent, CalendarStats, EventFields, EventFilter, TermFields};
use crate::db::notifications::{self, NewNotification};
use crate::error::AppError;
use crate::extractors::{extract_json, ClientMeta};
use crate::response::{ok, Envelope};
use crate::routes::parse_filter;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct EventQuery {
    /// `YYYY-MM`.
    pub month: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    /// `active` or `inactive`.
    pub status: Option<String>,
}

impl EventQuery {
    fn filter(&self) -> Result<EventFilter, AppError> {
        let month = match self.month.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) => Some(
                NaiveDate::parse_from_str(&format!("{m}-01"), "%Y-%m-%d")
                    .map_err(|_| AppError::BadRequest(format!("Invalid month {m:?}; expected YYYY-MM")))?,
            ),
            None => None,
        };
        let is_active = match self.status.as_deref() {
            None | Some("") | Some("all") => None,
            Some("active") => Some(true),
            Some("inactive") => Some(false),
            Some(other) => {
                return Err(AppError::BadRequest(format!("Invalid status {other:?}")));
            }
        };
        Ok(EventFilter {
            month,
            event_type: parse_filter::<EventType>(self.event_type.as_deref())?,
            is_active,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventList {
    pub events: Vec<CalendarEvent>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventSaved {
    pub message: String,
    pub event: CalendarEvent,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TermView {
    pub id: i64,
    pub term_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_active: bool,
    pub total_weeks: i64,
    pub current_week: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl TermView {
    fn new(term: AcademicTerm, today: NaiveDate) -> Self {
        Self {
            total_weeks: term.total_weeks(),
            current_week: term.current_week(today),
            id: term.id,
            term_name: term.term_name,
            start_date: term.start_date,
            end_date: term.end_date,
            is_active: term.is_active,
            updated_at: term.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TermList {
    pub terms: Vec<TermView>,
    pub active_term: Option<TermView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TermSaved {
    pub message: String,
    pub term: TermView,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/calendar/events", get(list_events).post(create_event))
        .route("/api/admin/calendar/events/:id", put(update_event))
        .route("/api/admin/calendar/stats", get(stats))
        .route("/api/admin/calendar/terms", get(list_terms).post(create_term))
        .route("/api/admin/calendar/terms/:id", put(update_term))
}

fn check_range<T: PartialOrd>(start: T, end: T) -> Result<(), AppError> {
    if end < start {
        return Err(AppError::BadRequest("End date must be after start date".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/admin/calendar/events",
    params(EventQuery),
    responses(
        (status = 200, description = "Events in start order", body = EventList),
        (status = 400, description = "Bad filter", body = crate::error::ErrorBody),
    ),
    tag = "calendar"
)]
async fn list_events(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<EventQuery>,
) -> Result<Json<Envelope<EventList>>, AppError> {
    caller.require(Capability::ManageCalendar)?;
    let filter = query.filter()?;
    let mut conn = state.pool.acquire().await?;
    Ok(ok(EventList {
        events: calendar::list_events(&mut conn, &filter).await?,
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/calendar/events",
    request_body = EventFields,
    responses(
        (status = 200, description = "Event created", body = EventSaved),
        (status = 400, description = "Missing title or dates", body = crate::error::ErrorBody),
    ),
    tag = "calendar"
)]
async fn create_event(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    body: Result<Json<EventFields>, JsonRejection>,
) -> Result<Json<Envelope<EventSaved>>, AppError> {
    caller.require(Capability::ManageCalendar)?;
    let fields = extract_json(body)?;
    let title = fields
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("title is required".into()))?;
    let (Some(start), Some(end)) = (fields.start_date, fields.end_date) else {
        return Err(AppError::BadRequest("start_date and end_date are required".into()));
    };
    check_range(start, end)?;
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    let id = calendar::insert_event(&mut tx, title, start, end, &fields, caller.user_id, now).await?;
    audit::append(
        &mut tx,
        AuditEvent {
            user_id: Some(caller.user_id),
            action: AuditAction::Create,
            model_name: "CalendarEvent",
            object_id: id,
            description: format!("Created event {title}"),
            client: &client,
        },
        now,
    )
    .await?;
    let message = format!("{title} on {}", start.format("%Y-%m-%d"));
    notifications::notify_admins(
        &mut tx,
        &NewNotification {
            notification_type: NotificationType::System,
            title: "New calendar event",
            message: &message,
            related_object_id: Some(id),
            related_object_type: Some("calendar_event"),
        },
        now,
    )
    .await?;
    let event = calendar::find_event(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::Internal("event vanished after insert".into()))?;
    tx.commit().await?;

    Ok(ok(EventSaved {
        message: "Event created successfully".into(),
        event,
    }))
}

#[utoipa::path(
    put,
    path = "/api/admin/calendar/events/{id}",
    params(("id" = i64, Path, description = "Event id")),
    request_body = EventFields,
    responses(
        (status = 200, description = "Event updated", body = EventSaved),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "calendar"
)]
async fn update_event(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    Path(id): Path<i64>,
    body: Result<Json<EventFields>, JsonRejection>,
) -> Result<Json<Envelope<EventSaved>>, AppError> {
    caller.require(Capability::ManageCalendar)?;
    let fields = extract_json(body)?;
    if matches!(&fields.title, Some(t) if t.trim().is_empty()) {
        return Err(AppError::BadRequest("title cannot be blank".into()));
    }
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    let current = calendar::find_event(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::not_found("Event"))?;
    check_range(
        fields.start_date.unwrap_or(current.start_date),
        fields.end_date.unwrap_or(current.end_date),
    )?;
    calendar::update_event(&mut tx, id, &fields, now).await?;
    audit::append(
        &mut tx,
        AuditEvent {
            user_id: Some(caller.user_id),
            action: AuditAction::Update,
            model_name: "CalendarEvent",
            object_id: id,
            description: format!("Updated event {}", current.title),
            client: &client,
        },
        now,
    )
    .await?;
    let event = calendar::find_event(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::not_found("Event"))?;
    tx.commit().await?;

    Ok(ok(EventSaved {
        message: "Event updated successfully".into(),
        event,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/calendar/stats",
    responses((status = 200, description = "Event counts", body = CalendarStats)),
    tag = "calendar"
)]
async fn stats(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Envelope<CalendarStats>>, AppError> {
    caller.require(Capability::ManageCalendar)?;
    let mut conn = state.pool.acquire().await?;
    Ok(ok(calendar::stats(&mut conn, Utc::now()).await?))
}

// ---------------------------------------------------------------------------
// Terms
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/admin/calendar/terms",
    responses((status = 200, description = "Terms, newest first", body = TermList)),
    tag = "calendar"
)]
async fn list_terms(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Envelope<TermList>>, AppError> {
    caller.require(Capability::ManageCalendar)?;
    let today = Utc::now().date_naive();
    let mut conn = state.pool.acquire().await?;
    let terms: Vec<TermView> = calendar::list_terms(&mut conn)
        .await?
        .into_iter()
        .map(|t| TermView::new(t, today))
        .collect();
    let active_term = terms.iter().find(|t| t.is_active).cloned();
    Ok(ok(TermList { terms, active_term }))
}

#[utoipa::path(
    post,
    path = "/api/admin/calendar/terms",
    request_body = TermFields,
    responses(
        (status = 200, description = "Term created", body = TermSaved),
        (status = 400, description = "Missing name or dates", body = crate::error::ErrorBody),
    ),
    tag = "calendar"
)]
async fn create_term(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    body: Result<Json<TermFields>, JsonRejection>,
) -> Result<Json<Envelope<TermSaved>>, AppError> {
    caller.require(Capability::ManageCalendar)?;
    let fields = extract_json(body)?;
    let name = fields
        .term_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::BadRequest("term_name is required".into()))?;
    let (Some(start), Some(end)) = (fields.start_date, fields.end_date) else {
        return Err(AppError::BadRequest("start_date and end_date are required".into()));
    };
    check_range(start, end)?;
    let activate = fields.is_active.unwrap_or(false);
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    let id = calendar::insert_term(&mut tx, name, start, end, activate, now).await?;
    if activate {
        calendar::deactivate_others(&mut tx, id, now).await?;
    }
    audit::append(
        &mut tx,
        AuditEvent {
            user_id: Some(caller.user_id),
            action: AuditAction::Create,
            model_name: "AcademicTerm",
            object_id: id,
            description: format!("Created term {name}"),
            client: &client,
        },
        now,
    )
    .await?;
    let term = calendar::find_term(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::Internal("term vanished after insert".into()))?;
    tx.commit().await?;

    Ok(ok(TermSaved {
        message: "Academic term created".into(),
        term: TermView::new(term, now.date_naive()),
    }))
}

#[utoipa::path(
    put,
    path = "/api/admin/calendar/terms/{id}",
    params(("id" = i64, Path, description = "Term id")),
    request_body = TermFields,
    responses(
        (status = 200, description = "Term updated", body = TermSaved),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "calendar"
)]
async fn update_term(
    State(state): State<AppState>,
    caller: Caller,
    client: ClientMeta,
    Path(id): Path<i64>,
    body: Result<Json<TermFields>, JsonRejection>,
) -> Result<Json<Envelope<TermSaved>>, AppError> {
    caller.require(Capability::ManageCalendar)?;
    let fields = extract_json(body)?;
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;
    let current = calendar::find_term(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::not_found("Term"))?;
    check_range(
        fields.start_date.unwrap_or(current.start_date),
        fields.end_date.unwrap_or(current.end_date),
    )?;
    calendar::update_term(&mut tx, id, &fields, now).await?;
    if fields.is_active == Some(true) {
        let deactivated = calendar::deactivate_others(&mut tx, id, now).await?;
        tracing::info!(term_id = id, deactivated, "academic term activated");
    }
    audit::append(
        &mut tx,
        AuditEvent {
            user_id: Some(caller.user_id),
            action: AuditAction::Update,
            model_name: "AcademicTerm",
            object_id: id,
            description: format!("Updated term {}", current.term_name),
            client: &client,
        },
        now,
    )
    .await?;
    let term = calendar::find_term(&mut tx, id)
        .await?
        .ok_or_else(|| AppError::not_found("Term"))?;
    tx.commit().await?;

    Ok(ok(TermSaved {
        message: "Academic term updated".into(),
        term: TermView::new(term, now.date_naive()),
    }))
}
