//! Shared types: camera events, wire payloads and history records.
//!
//! Session state lives in [`crate::scanner`]; the normalized validation
//! result lives in [`crate::normalize`].

use serde::{Deserialize, Serialize};

/// A decoded-code payload delivered by the camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawScanEvent {
    /// The decoded string, exactly as the camera produced it.
    #[serde(default)]
    pub data: String,
}

impl RawScanEvent {
    /// Wraps a decoded string.
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}

/// Body of `POST /validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    /// The scanned code, untrimmed.
    pub code: String,

    /// Identifier of the scanning station.
    pub validated_by: String,
}

/// A past validation as the backend reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Ticket identifier.
    pub ticket_number: Option<String>,
    /// Purchaser, shown as the customer.
    pub customer_email: Option<String>,
    /// Raw seat label.
    pub seat_number: Option<String>,
    /// Seat as the backend formats it.
    pub seat_formatted: Option<String>,
    /// Venue zone of the seat.
    pub zone_name: Option<String>,
    /// Station that validated the ticket.
    pub validated_by: Option<String>,
    /// UTC timestamp, with or without an offset.
    pub validated_at: Option<String>,
}

/// A history entry prepared for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketHistoryItem {
    /// List key; same as `ticket_id`.
    pub id: String,
    /// Ticket identifier, empty when the backend omitted it.
    pub ticket_id: String,
    /// Customer email, or `"Unknown"`.
    pub customer_name: String,
    /// Raw seat label.
    pub seat: String,
    /// Seat as the backend formats it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_formatted: Option<String>,
    /// Venue zone of the seat.
    pub zone: String,
    /// Every entry in the history has been validated, so this is always `true`.
    pub valid: bool,
    /// Backend timestamp, kept verbatim.
    pub validated_at: String,
    /// "Just now", "5m ago", ...
    pub validated_at_relative: String,
    /// Station that validated the ticket.
    pub validated_by: String,
    /// `"Validated by <station>"`.
    pub message: String,
}

/// Aggregate counters from `GET /stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    /// Validations recorded by the backend.
    pub total_scans: u64,
    /// Of those, admitted.
    pub valid_tickets: u64,
    /// Of those, refused.
    pub invalid_tickets: u64,
    /// Percentage, 0 to 100.
    pub success_rate: f64,
}

/// Outcome of the liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// The health endpoint answered with a success status.
    Connected,
    /// Anything else, including transport failure.
    Disconnected,
}

impl ConnectionStatus {
    /// Label shown to the operator.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
        }
    }
}
