//! Advisory category/priority suggestions for free-text ticket descriptions.
//!
//! Purely advisory: never mutates stored tickets, and every failure mode
//! collapses to "no suggestion".

use axum::{extract::State, routing::post, Json, Router};
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::llm::LLMProvider;
use crate::shared::state::AppState;
use crate::tickets::{TicketCategory, TicketPriority};

pub const CLASSIFY_PROMPT: &str = "Classify support ticket.\nReturn ONLY JSON:\n{\n \"category\": billing|technical|account|general,\n \"priority\": low|medium|high|critical\n}";

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("hardcoded pattern compiles"));

/// Greedy match from the first `{` to the last `}` in the reply.
pub fn extract_json(text: &str) -> Option<&str> {
    JSON_OBJECT.find(text).map(|m| m.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketSuggestion {
    pub category: TicketCategory,
    pub priority: TicketPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyOutcome {
    Suggestion(TicketSuggestion),
    NoSuggestion,
}

pub async fn classify_description(
    provider: &dyn LLMProvider,
    description: &str,
) -> ClassifyOutcome {
    let prompt = format!("{}\n{}", CLASSIFY_PROMPT, description);
    match provider.generate(&prompt).await {
        Ok(text) => parse_suggestion(&text),
        Err(e) => {
            warn!("classification call failed: {}", e);
            ClassifyOutcome::NoSuggestion
        }
    }
}

/// A reply without a parseable JSON object yields no suggestion; a parsed
/// object with an out-of-set value falls back to the default for that field.
pub fn parse_suggestion(raw: &str) -> ClassifyOutcome {
    let Some(json_str) = extract_json(raw) else {
        warn!("no JSON object in classification response");
        return ClassifyOutcome::NoSuggestion;
    };
    let data: Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        Err(e) => {
            warn!("unparseable classification response: {}", e);
            return ClassifyOutcome::NoSuggestion;
        }
    };

    let category = data["category"]
        .as_str()
        .and_then(TicketCategory::parse)
        .unwrap_or(TicketCategory::General);
    let priority = data["priority"]
        .as_str()
        .and_then(TicketPriority::parse)
        .unwrap_or(TicketPriority::Low);

    ClassifyOutcome::Suggestion(TicketSuggestion { category, priority })
}

pub fn suggestion_response(outcome: ClassifyOutcome) -> Value {
    match outcome {
        ClassifyOutcome::Suggestion(s) => json!({
            "suggested_category": s.category.as_str(),
            "suggested_priority": s.priority.as_str(),
        }),
        ClassifyOutcome::NoSuggestion => json!({
            "suggested_category": null,
            "suggested_priority": null,
        }),
    }
}

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    #[serde(default)]
    pub description: String,
}

pub async fn classify_ticket(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClassifyRequest>,
) -> Json<Value> {
    let outcome = classify_description(state.llm_provider.as_ref(), &req.description).await;
    Json(suggestion_response(outcome))
}

pub fn configure_classify_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/tickets/classify", post(classify_ticket))
}
