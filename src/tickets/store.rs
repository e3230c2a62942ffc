//! Diesel query layer for tickets.
//!
//! Missing-identifier lookups surface as `StoreError::NotFound` here so
//! handlers never see a bare diesel error for an absent row.

use std::collections::BTreeMap;

use diesel::prelude::*;
use log::info;
use thiserror::Error;

use super::{ListQuery, NewTicket, Ticket, TicketChanges, TicketStats};
use crate::shared::schema::tickets;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ticket {0} not found")]
    NotFound(i32),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

pub fn insert_ticket(conn: &mut PgConnection, new: &NewTicket) -> Result<Ticket, StoreError> {
    Ok(diesel::insert_into(tickets::table)
        .values(new)
        .get_result(conn)?)
}

pub fn find_ticket(conn: &mut PgConnection, ticket_id: i32) -> Result<Ticket, StoreError> {
    tickets::table
        .filter(tickets::id.eq(ticket_id))
        .first::<Ticket>(conn)
        .optional()?
        .ok_or(StoreError::NotFound(ticket_id))
}

pub fn list_tickets(conn: &mut PgConnection, query: ListQuery) -> Result<Vec<Ticket>, StoreError> {
    let mut q = tickets::table.into_boxed();

    if let Some(category) = query.category.filter(|v| !v.is_empty()) {
        q = q.filter(tickets::category.eq(category));
    }

    if let Some(priority) = query.priority.filter(|v| !v.is_empty()) {
        q = q.filter(tickets::priority.eq(priority));
    }

    if let Some(status) = query.status.filter(|v| !v.is_empty()) {
        q = q.filter(tickets::status.eq(status));
    }

    if let Some(search) = query.search.filter(|v| !v.is_empty()) {
        let pattern = format!("%{search}%");
        q = q.filter(
            tickets::title
                .ilike(pattern.clone())
                .or(tickets::description.ilike(pattern)),
        );
    }

    Ok(q.order(tickets::id.desc()).load(conn)?)
}

pub fn apply_partial_update(
    conn: &mut PgConnection,
    ticket_id: i32,
    changes: TicketChanges,
) -> Result<Ticket, StoreError> {
    if let Some(title) = changes.title {
        diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
            .set(tickets::title.eq(title))
            .execute(conn)?;
    }

    if let Some(description) = changes.description {
        diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
            .set(tickets::description.eq(description))
            .execute(conn)?;
    }

    if let Some(category) = changes.category {
        diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
            .set(tickets::category.eq(category))
            .execute(conn)?;
    }

    if let Some(priority) = changes.priority {
        diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
            .set(tickets::priority.eq(priority))
            .execute(conn)?;
    }

    if let Some(status) = changes.status {
        diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
            .set(tickets::status.eq(status))
            .execute(conn)?;
    }

    if let Some(comment) = changes.comment {
        diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
            .set(tickets::comment.eq(Some(comment)))
            .execute(conn)?;
    }

    find_ticket(conn, ticket_id)
}

/// Durable write, logged so the persistence of the closing comment is
/// observable before the row is discarded.
pub fn persist_closing_comment(
    conn: &mut PgConnection,
    ticket_id: i32,
    comment: String,
) -> Result<(), StoreError> {
    let updated = diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
        .set(tickets::comment.eq(Some(comment)))
        .execute(conn)?;
    if updated == 0 {
        return Err(StoreError::NotFound(ticket_id));
    }
    info!("ticket {}: closing comment persisted", ticket_id);
    Ok(())
}

pub fn delete_ticket(conn: &mut PgConnection, ticket_id: i32) -> Result<(), StoreError> {
    let deleted =
        diesel::delete(tickets::table.filter(tickets::id.eq(ticket_id))).execute(conn)?;
    if deleted == 0 {
        return Err(StoreError::NotFound(ticket_id));
    }
    Ok(())
}

#[derive(QueryableByName)]
struct DayCount {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    n: i64,
}

#[derive(QueryableByName)]
struct LabelCount {
    #[diesel(sql_type = diesel::sql_types::Text)]
    label: String,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    n: i64,
}

pub fn ticket_stats(conn: &mut PgConnection) -> Result<TicketStats, StoreError> {
    let total_tickets: i64 = tickets::table.count().get_result(conn)?;
    let open_tickets: i64 = tickets::table
        .filter(tickets::status.eq("open"))
        .count()
        .get_result(conn)?;

    let day_counts: Vec<DayCount> =
        diesel::sql_query("SELECT COUNT(*) AS n FROM tickets GROUP BY created_at::date")
            .load(conn)?;
    let counts: Vec<i64> = day_counts.iter().map(|d| d.n).collect();

    Ok(TicketStats {
        total_tickets,
        open_tickets,
        avg_tickets_per_day: average_per_day(&counts),
        priority_breakdown: label_counts(
            conn,
            "SELECT priority AS label, COUNT(*) AS n FROM tickets GROUP BY priority",
        )?,
        category_breakdown: label_counts(
            conn,
            "SELECT category AS label, COUNT(*) AS n FROM tickets GROUP BY category",
        )?,
    })
}

fn label_counts(conn: &mut PgConnection, sql: &str) -> Result<BTreeMap<String, i64>, StoreError> {
    let rows: Vec<LabelCount> = diesel::sql_query(sql).load(conn)?;
    Ok(rows.into_iter().map(|r| (r.label, r.n)).collect())
}

/// Days with no tickets are absent from the grouping and do not count
/// against the average.
pub fn average_per_day(counts: &[i64]) -> f64 {
    if counts.is_empty() {
        return 0.0;
    }
    counts.iter().sum::<i64>() as f64 / counts.len() as f64
}
