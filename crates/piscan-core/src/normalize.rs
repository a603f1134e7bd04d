//! Coercion of backend payloads into strict result shapes.
//!
//! Every function here is total: a malformed or partial payload degrades to
//! a conservative value (an invalid result, an empty history, zeroed stats)
//! and never returns an error. Duplicate-scan semantics are decided in
//! [`normalize`] and nowhere else.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::time::TimeNormalizer;
use crate::types::{HistoryEntry, TicketHistoryItem, ValidationStats};

/// Machine-readable codes carried in [`ValidationResult::error_code`].
pub mod codes {
    /// The ticket was consumed by an earlier validation.
    pub const DUPLICATE_SCAN: &str = "DUPLICATE_SCAN";
    /// Backend synonym for [`DUPLICATE_SCAN`].
    pub const ALREADY_VALIDATED: &str = "ALREADY_VALIDATED";
    /// The scanned code failed the local format check.
    pub const INVALID_FORMAT: &str = "INVALID_FORMAT";
    /// The validator could not be reached.
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
}

/// Message used when the backend sends none.
pub const DEFAULT_MESSAGE: &str = "Validation completed";
/// Message for a duplicate scan when the backend sends none.
pub const DUPLICATE_MESSAGE: &str = "This ticket has already been used";
/// Message for a code rejected by the format check.
pub const INVALID_FORMAT_MESSAGE: &str = "Invalid QR code format.";
/// Message for a cycle whose request never produced a payload.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error during validation.";

/// The verdict for one scan cycle.
///
/// Built once per cycle and replaced wholesale on the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// The ticket may be admitted. Never set together with `is_duplicate`.
    pub valid: bool,
    /// Operator-facing text.
    pub message: String,
    /// Seat as the backend formats it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_formatted: Option<String>,
    /// Ticket holder, when the backend knows one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    /// Backend timestamp of the verdict, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Technical detail behind a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable failure code, see [`codes`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// The ticket was already validated earlier.
    pub is_duplicate: bool,
}

/// How a result should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// Admit.
    Valid,
    /// Refused by the validator.
    Invalid,
    /// Already used.
    Duplicate,
    /// Refused locally before any request.
    FormatRejected,
    /// No verdict could be obtained.
    NetworkError,
}

impl ValidationResult {
    /// Result for a code that failed the local format check.
    #[must_use]
    pub fn format_rejected(reason: impl ToString) -> Self {
        Self {
            valid: false,
            message: INVALID_FORMAT_MESSAGE.to_string(),
            error: Some(reason.to_string()),
            error_code: Some(codes::INVALID_FORMAT.to_string()),
            ..Self::default()
        }
    }

    /// Result for a cycle whose request failed in transport.
    #[must_use]
    pub fn network_failure(reason: impl ToString) -> Self {
        Self {
            valid: false,
            message: NETWORK_ERROR_MESSAGE.to_string(),
            error: Some(reason.to_string()),
            error_code: Some(codes::NETWORK_ERROR.to_string()),
            ..Self::default()
        }
    }

    /// Classifies the result for rendering.
    #[must_use]
    pub fn kind(&self) -> ResultKind {
        if self.is_duplicate {
            return ResultKind::Duplicate;
        }
        if self.valid {
            return ResultKind::Valid;
        }
        match self.error_code.as_deref() {
            Some(codes::INVALID_FORMAT) => ResultKind::FormatRejected,
            Some(codes::NETWORK_ERROR) => ResultKind::NetworkError,
            _ => ResultKind::Invalid,
        }
    }
}

/// Coerces an arbitrary validator payload into a [`ValidationResult`].
#[must_use]
pub fn normalize(raw: &Value) -> ValidationResult {
    let mut result = ValidationResult {
        valid: truthy(raw.get("valid")),
        message: text(raw.get("message")).unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
        seat_formatted: text(raw.get("seatFormatted")),
        customer_name: text(raw.get("customerName")),
        timestamp: text(raw.get("timestamp")),
        error: text(raw.get("error")),
        error_code: text(raw.get("errorCode")),
        is_duplicate: truthy(raw.get("isDuplicate")),
    };

    let duplicate_code = matches!(
        result.error_code.as_deref(),
        Some(codes::DUPLICATE_SCAN | codes::ALREADY_VALIDATED)
    );
    if duplicate_code || result.is_duplicate {
        result.valid = false;
        result.is_duplicate = true;
        if text(raw.get("message")).is_none() {
            result.message = DUPLICATE_MESSAGE.to_string();
        }
        result.error = Some(codes::DUPLICATE_SCAN.to_string());
        result.error_code = Some(codes::DUPLICATE_SCAN.to_string());
    }

    result
}

/// Turns a `GET /history` payload into display items.
///
/// Anything other than `{ success: true, history: [...] }` yields an empty list.
#[must_use]
pub fn transform_history(raw: &Value, times: &TimeNormalizer) -> Vec<TicketHistoryItem> {
    if !truthy(raw.get("success")) {
        return Vec::new();
    }
    let Some(entries) = raw.get("history").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .map(history_entry)
        .map(|entry| history_item(entry, times))
        .collect()
}

/// Reads one history record, tolerating missing or mistyped fields.
#[must_use]
pub fn history_entry(raw: &Value) -> HistoryEntry {
    HistoryEntry {
        ticket_number: text(raw.get("ticketNumber")),
        customer_email: text(raw.get("customerEmail")),
        seat_number: text(raw.get("seatNumber")),
        seat_formatted: text(raw.get("seatFormatted")),
        zone_name: text(raw.get("zoneName")),
        validated_by: text(raw.get("validatedBy")),
        validated_at: text(raw.get("validatedAt")),
    }
}

fn history_item(entry: HistoryEntry, times: &TimeNormalizer) -> TicketHistoryItem {
    let ticket_id = entry.ticket_number.unwrap_or_default();
    let validated_at = entry.validated_at.unwrap_or_default();
    let validated_by = entry.validated_by.unwrap_or_default();

    TicketHistoryItem {
        id: ticket_id.clone(),
        ticket_id,
        customer_name: entry
            .customer_email
            .unwrap_or_else(|| "Unknown".to_string()),
        seat: entry.seat_number.unwrap_or_default(),
        seat_formatted: entry.seat_formatted,
        zone: entry.zone_name.unwrap_or_default(),
        valid: true,
        validated_at_relative: times.relative(&validated_at),
        message: format!("Validated by {validated_by}"),
        validated_at,
        validated_by,
    }
}

/// Turns a `GET /stats` payload into counters, zeroed when unusable.
#[must_use]
pub fn transform_stats(raw: &Value) -> ValidationStats {
    if !truthy(raw.get("success")) {
        return ValidationStats::default();
    }
    let Some(data) = raw.get("data").filter(|data| data.is_object()) else {
        return ValidationStats::default();
    };

    ValidationStats {
        total_scans: count(data.get("totalScans")),
        valid_tickets: count(data.get("validTickets")),
        invalid_tickets: count(data.get("invalidTickets")),
        success_rate: data
            .get("successRate")
            .and_then(Value::as_f64)
            .filter(|rate| rate.is_finite())
            .unwrap_or(0.0),
    }
}

/// Loose truthiness: absent, `null`, `false`, `0`, `NaN` and `""` are false.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

/// Stringifies a truthy value; falsy values become `None`.
fn text(value: Option<&Value>) -> Option<String> {
    if !truthy(value) {
        return None;
    }
    value.map(stringify)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => stringify(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn count(value: Option<&Value>) -> u64 {
    value
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0)
}
