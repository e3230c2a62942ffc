pub mod store;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::shared::schema::tickets;
use crate::shared::state::AppState;
use self::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketCategory {
    Billing,
    Technical,
    Account,
    General,
}

impl TicketCategory {
    pub const ALL: [TicketCategory; 4] = [
        Self::Billing,
        Self::Technical,
        Self::Account,
        Self::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Billing => "billing",
            Self::Technical => "technical",
            Self::Account => "account",
            Self::General => "general",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "billing" => Some(Self::Billing),
            "technical" => Some(Self::Technical),
            "account" => Some(Self::Account),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TicketPriority {
    pub const ALL: [TicketPriority; 4] =
        [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable)]
pub struct Ticket {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub status: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tickets)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub status: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TicketStats {
    pub total_tickets: i64,
    pub open_tickets: i64,
    pub avg_tickets_per_day: f64,
    pub priority_breakdown: BTreeMap<String, i64>,
    pub category_breakdown: BTreeMap<String, i64>,
}

#[derive(Debug, Default, PartialEq)]
pub struct TicketChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    Resolve,
    Close,
    Apply,
}

/// "resolved" and "closed" are terminal: assigning either deletes the
/// record instead of updating it.
pub fn plan_transition(status: Option<&str>) -> StatusTransition {
    match status {
        Some("resolved") => StatusTransition::Resolve,
        Some("closed") => StatusTransition::Close,
        _ => StatusTransition::Apply,
    }
}

pub type FieldErrors = BTreeMap<String, Vec<String>>;

fn field_error(errors: &mut FieldErrors, field: &str, message: String) {
    errors.entry(field.to_string()).or_default().push(message);
}

fn required<'a>(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&'a str>,
) -> Option<&'a str> {
    match value {
        None => {
            field_error(errors, field, "This field is required.".to_string());
            None
        }
        Some(v) if v.trim().is_empty() => {
            field_error(errors, field, "This field may not be blank.".to_string());
            None
        }
        Some(v) => Some(v),
    }
}

fn valid_category(errors: &mut FieldErrors, value: &str) -> Option<TicketCategory> {
    let parsed = TicketCategory::parse(value);
    if parsed.is_none() {
        field_error(
            errors,
            "category",
            format!("\"{}\" is not a valid choice.", value),
        );
    }
    parsed
}

fn valid_priority(errors: &mut FieldErrors, value: &str) -> Option<TicketPriority> {
    let parsed = TicketPriority::parse(value);
    if parsed.is_none() {
        field_error(
            errors,
            "priority",
            format!("\"{}\" is not a valid choice.", value),
        );
    }
    parsed
}

pub fn validate_create(req: &CreateTicketRequest) -> Result<NewTicket, FieldErrors> {
    let mut errors = FieldErrors::new();

    let title = required(&mut errors, "title", req.title.as_deref());
    let description = required(&mut errors, "description", req.description.as_deref());
    let category = required(&mut errors, "category", req.category.as_deref())
        .and_then(|v| valid_category(&mut errors, v));
    let priority = required(&mut errors, "priority", req.priority.as_deref())
        .and_then(|v| valid_priority(&mut errors, v));

    match (title, description, category, priority) {
        (Some(title), Some(description), Some(category), Some(priority))
            if errors.is_empty() =>
        {
            Ok(NewTicket {
                title: title.to_string(),
                description: description.to_string(),
                category: category.as_str().to_string(),
                priority: priority.as_str().to_string(),
                status: match req.status.as_deref() {
                    Some(s) if !s.trim().is_empty() => s.to_string(),
                    _ => "open".to_string(),
                },
                comment: req.comment.clone(),
                created_at: Utc::now(),
            })
        }
        _ => Err(errors),
    }
}

/// Only fields present in the request are checked and applied.
pub fn validate_update(req: &UpdateTicketRequest) -> Result<TicketChanges, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut changes = TicketChanges::default();

    if let Some(title) = req.title.as_deref() {
        if title.trim().is_empty() {
            field_error(&mut errors, "title", "This field may not be blank.".to_string());
        } else {
            changes.title = Some(title.to_string());
        }
    }

    if let Some(description) = req.description.as_deref() {
        if description.trim().is_empty() {
            field_error(
                &mut errors,
                "description",
                "This field may not be blank.".to_string(),
            );
        } else {
            changes.description = Some(description.to_string());
        }
    }

    if let Some(category) = req.category.as_deref() {
        if let Some(parsed) = valid_category(&mut errors, category) {
            changes.category = Some(parsed.as_str().to_string());
        }
    }

    if let Some(priority) = req.priority.as_deref() {
        if let Some(parsed) = valid_priority(&mut errors, priority) {
            changes.priority = Some(parsed.as_str().to_string());
        }
    }

    if let Some(status) = req.status.as_deref() {
        if status.trim().is_empty() {
            field_error(&mut errors, "status", "This field may not be blank.".to_string());
        } else {
            changes.status = Some(status.to_string());
        }
    }

    changes.comment = req.comment.clone();

    if errors.is_empty() {
        Ok(changes)
    } else {
        Err(errors)
    }
}

fn db_conn(
    state: &AppState,
) -> Result<PooledConnection<ConnectionManager<PgConnection>>, (StatusCode, Json<Value>)> {
    state.conn.get().map_err(|e| {
        error!("DB error: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": format!("database error: {e}")})),
        )
    })
}

fn store_error(e: StoreError) -> (StatusCode, Json<Value>) {
    let status = match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Database(ref err) => {
            error!("Query error: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({"detail": e.to_string()})))
}

fn validation_error(errors: FieldErrors) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!(errors)))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Ticket>>, (StatusCode, Json<Value>)> {
    let mut conn = db_conn(&state)?;
    let tickets = store::list_tickets(&mut conn, query).map_err(store_error)?;
    Ok(Json(tickets))
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Ticket>), (StatusCode, Json<Value>)> {
    let new_ticket = validate_create(&req).map_err(validation_error)?;
    let mut conn = db_conn(&state)?;
    let ticket = store::insert_ticket(&mut conn, &new_ticket).map_err(store_error)?;
    info!("ticket {} created", ticket.id);
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut conn = db_conn(&state)?;
    store::find_ticket(&mut conn, id).map_err(store_error)?;

    match plan_transition(req.status.as_deref()) {
        StatusTransition::Resolve => {
            store::delete_ticket(&mut conn, id).map_err(store_error)?;
            info!("ticket {} resolved, record discarded", id);
            Ok(Json(json!({"deleted": true, "message": "resolved"})))
        }
        StatusTransition::Close => {
            store::persist_closing_comment(&mut conn, id, req.comment.clone().unwrap_or_default())
                .map_err(store_error)?;
            store::delete_ticket(&mut conn, id).map_err(store_error)?;
            info!("ticket {} closed, record discarded", id);
            Ok(Json(json!({"deleted": true, "message": "closed"})))
        }
        StatusTransition::Apply => {
            let changes = validate_update(&req).map_err(validation_error)?;
            let ticket = store::apply_partial_update(&mut conn, id, changes).map_err(store_error)?;
            let body = serde_json::to_value(&ticket).map_err(|e| {
                error!("Serialization error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"detail": "serialization error"})),
                )
            })?;
            Ok(Json(body))
        }
    }
}

pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut conn = db_conn(&state)?;
    store::delete_ticket(&mut conn, id).map_err(store_error)?;
    info!("ticket {} deleted", id);
    Ok(Json(json!({"deleted": true})))
}

pub async fn get_ticket_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TicketStats>, (StatusCode, Json<Value>)> {
    let mut conn = db_conn(&state)?;
    let stats = store::ticket_stats(&mut conn).map_err(store_error)?;
    Ok(Json(stats))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/stats", get(get_ticket_stats))
        .route("/api/tickets/:id", patch(update_ticket).delete(delete_ticket))
}
