//! Plain-text rendering of results, history and stats.

use std::fmt::Write as _;

use piscan_core::{
    ConnectionStatus, ResultKind, ResultTime, ScanSessionState, TicketHistoryItem,
    ValidationResult, ValidationStats,
};

fn tag(kind: ResultKind) -> &'static str {
    match kind {
        ResultKind::Valid => "VALID",
        ResultKind::Invalid => "INVALID",
        ResultKind::Duplicate => "DUPLICATE",
        ResultKind::FormatRejected => "BAD FORMAT",
        ResultKind::NetworkError => "NETWORK",
    }
}

/// Hint for what the operator should do next.
fn next_step(result: &ValidationResult) -> &'static str {
    if result.valid {
        "Scan Next Ticket"
    } else if result.is_duplicate {
        "Scan Different Ticket"
    } else {
        "Try Again"
    }
}

/// Result card for one scan cycle.
pub fn result_card(result: &ValidationResult, time: Option<&ResultTime>) -> String {
    let kind = result.kind();
    let headline = if result.valid {
        "Ticket Valid"
    } else {
        "Ticket Invalid"
    };

    let mut out = format!("[{}] {headline}\n", tag(kind));
    match kind {
        ResultKind::Valid => out.push_str("  This ticket is valid and can be used for entry.\n"),
        ResultKind::Duplicate => out.push_str("  This ticket has already been used\n"),
        _ => {}
    }
    if kind != ResultKind::Valid && kind != ResultKind::Duplicate {
        let _ = writeln!(out, "  {}", result.message);
    }
    if let Some(customer) = &result.customer_name {
        let _ = writeln!(out, "  Customer: {customer}");
    }
    if let Some(seat) = &result.seat_formatted {
        let _ = writeln!(out, "  Seat: {seat}");
    }
    if let Some(time) = time {
        let _ = writeln!(out, "  Scanned: {} ({})", time.display, time.relative);
    }
    let _ = write!(out, "  > {} (press Enter)", next_step(result));
    out
}

/// Running session counters.
pub fn counters(state: &ScanSessionState) -> String {
    format!(
        "Scans: {}  Valid: {}",
        state.scan_count, state.success_count
    )
}

/// History as an aligned table.
pub fn history_table(items: &[TicketHistoryItem]) -> String {
    if items.is_empty() {
        return "No validated tickets yet.".to_string();
    }

    let rows: Vec<[&str; 5]> = items
        .iter()
        .map(|item| {
            [
                item.ticket_id.as_str(),
                item.customer_name.as_str(),
                item.seat_formatted.as_deref().unwrap_or(&item.seat),
                item.zone.as_str(),
                item.validated_at_relative.as_str(),
            ]
        })
        .collect();
    let header = ["TICKET", "CUSTOMER", "SEAT", "ZONE", "WHEN"];

    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for row in std::iter::once(&header).chain(&rows) {
        let line = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out.truncate(out.trim_end().len());
    out
}

/// Aggregate counters from the validator.
pub fn stats_summary(stats: &ValidationStats) -> String {
    format!(
        "Total scans:     {}\nValid tickets:   {}\nInvalid tickets: {}\nSuccess rate:    {:.1}%",
        stats.total_scans, stats.valid_tickets, stats.invalid_tickets, stats.success_rate
    )
}

/// One-line connection status.
pub fn health_line(base_url: &str, status: ConnectionStatus) -> String {
    format!("{base_url}: {}", status.label())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_card() {
        let result = ValidationResult {
            valid: true,
            message: "Welcome".into(),
            customer_name: Some("J. Doe".into()),
            seat_formatted: Some("Row 4, Seat 4".into()),
            ..ValidationResult::default()
        };
        let time = ResultTime {
            display: "Jan 15, 2024, 2:30 PM".into(),
            relative: "Just now".into(),
        };
        let card = result_card(&result, Some(&time));

        assert!(card.starts_with("[VALID] Ticket Valid\n"));
        assert!(card.contains("Customer: J. Doe"));
        assert!(card.contains("Seat: Row 4, Seat 4"));
        assert!(card.contains("Scanned: Jan 15, 2024, 2:30 PM (Just now)"));
        assert!(card.ends_with("Scan Next Ticket (press Enter)"));
        assert!(!card.contains("Welcome"));
    }

    #[test]
    fn test_failure_cards_are_distinct() {
        let duplicate = ValidationResult {
            is_duplicate: true,
            message: "This ticket has already been used".into(),
            ..ValidationResult::default()
        };
        let network = ValidationResult::network_failure("timed out");
        let format = ValidationResult::format_rejected("too short");

        let duplicate = result_card(&duplicate, None);
        let network = result_card(&network, None);
        let format = result_card(&format, None);

        assert!(duplicate.starts_with("[DUPLICATE]"));
        assert!(duplicate.contains("Scan Different Ticket"));
        assert!(network.starts_with("[NETWORK]"));
        assert!(network.contains("Network error during validation."));
        assert!(format.starts_with("[BAD FORMAT]"));
        assert!(format.contains("Try Again"));
    }

    #[test]
    fn test_history_table_alignment() {
        let item = |id: &str, customer: &str| TicketHistoryItem {
            id: id.into(),
            ticket_id: id.into(),
            customer_name: customer.into(),
            seat: "A4".into(),
            seat_formatted: None,
            zone: "Floor".into(),
            valid: true,
            validated_at: "2024-01-15T14:30:00Z".into(),
            validated_at_relative: "5m ago".into(),
            validated_by: "gate-7".into(),
            message: "Validated by gate-7".into(),
        };
        let table = history_table(&[
            item("TCK-1", "a@example.com"),
            item("TCK-0002", "Unknown"),
        ]);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("TICKET    CUSTOMER"));
        assert!(lines[1].starts_with("TCK-1     a@example.com  A4"));
        assert!(lines[2].ends_with("5m ago"));
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(history_table(&[]), "No validated tickets yet.");
    }

    #[test]
    fn test_stats_and_counters() {
        let stats = ValidationStats {
            total_scans: 120,
            valid_tickets: 114,
            invalid_tickets: 6,
            success_rate: 95.0,
        };
        assert!(stats_summary(&stats).ends_with("Success rate:    95.0%"));

        let state = ScanSessionState {
            scan_count: 3,
            success_count: 2,
            ..ScanSessionState::default()
        };
        assert_eq!(counters(&state), "Scans: 3  Valid: 2");
        assert_eq!(
            health_line("http://localhost:3002", ConnectionStatus::Connected),
            "http://localhost:3002: Connected"
        );
    }
}
