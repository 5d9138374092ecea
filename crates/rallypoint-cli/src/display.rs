//! Terminal rendering of a map snapshot.
//!
//! Markers are grouped by category in map order, one card per marker.

use chrono::{DateTime, Utc};
use rallypoint_core::{Category, CategoryFilter, MapMarker};
use rallypoint_sync::{FetchError, PositionSource, Snapshot};

const MAX_MESSAGE_CHARS: usize = 70;

// ── Public API ──

/// Print the filtered marker set, with `now` driving the elapsed-time labels.
pub fn print_snapshot(snapshot: &Snapshot, filter: CategoryFilter, now: DateTime<Utc>) {
    println!(
        "=== Live map @ {} ===",
        snapshot.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  {:<12} {:.5}, {:.5} ({})",
        "position",
        snapshot.position.latitude,
        snapshot.position.longitude,
        source_label(snapshot.position_source),
    );
    if snapshot.permission_denied {
        println!("  {:<12} location permission denied, showing last known position", "warning");
    }
    print_feed_errors(&snapshot.errors);
    if !snapshot.rejected.is_empty() {
        println!("  {:<12} {} record(s) dropped", "rejected", snapshot.rejected.len());
    }
    println!();

    let mut shown = 0;
    for category in Category::ALL {
        if !filter.matches_category(category) {
            continue;
        }
        let markers: Vec<&MapMarker> = snapshot
            .markers
            .iter()
            .filter(|m| m.category() == category)
            .collect();
        if markers.is_empty() {
            continue;
        }
        shown += markers.len();
        print_section(category, &markers, now);
    }

    if shown == 0 {
        println!("No markers for filter '{filter}'.");
    }
}

/// One line per cycle for `watch`.
pub fn print_cycle_line(cycle: u64, snapshot: &Snapshot, filter: CategoryFilter) {
    let counts: Vec<String> = Category::ALL
        .iter()
        .filter(|c| filter.matches_category(**c))
        .map(|c| {
            let n = snapshot.markers.iter().filter(|m| m.category() == *c).count();
            format!("{c}={n}")
        })
        .collect();
    let failed: Vec<&str> = snapshot.errors.iter().map(|e| e.feed().as_str()).collect();

    print!(
        "[{}] cycle {cycle}: {}",
        snapshot.fetched_at.format("%H:%M:%S"),
        counts.join(" ")
    );
    if !failed.is_empty() {
        print!("  (unavailable: {})", failed.join(", "));
    }
    println!();
}

// ── Section rendering ──

fn print_section(category: Category, markers: &[&MapMarker], now: DateTime<Utc>) {
    println!("{} ({})", section_title(category), markers.len());
    for marker in markers {
        println!(
            "  {:<16} {:.5}, {:.5}",
            marker.key().to_string(),
            marker.latitude(),
            marker.longitude()
        );
        if let Some(message) = marker.message() {
            println!("    {}", truncate(message, MAX_MESSAGE_CHARS));
        }
        if let Some(user) = marker.user() {
            let name = display_name(&user.name);
            match &user.health_condition {
                Some(health) if !health.trim().is_empty() => {
                    println!("    {name} · {}", health.trim())
                }
                _ => println!("    {name}"),
            }
        }
        if let Some(minutes) = marker.minutes_elapsed(now) {
            println!("    {}", elapsed_label(minutes));
        }
    }
    println!();
}

fn print_feed_errors(errors: &[FetchError]) {
    for err in errors {
        println!("  {:<12} {}", "unavailable", err);
    }
}

fn section_title(category: Category) -> &'static str {
    match category {
        Category::Help => "Help calls",
        Category::Safe => "Safe",
        Category::Area => "Assembly areas",
        Category::Address => "Registered address",
    }
}

fn source_label(source: PositionSource) -> &'static str {
    match source {
        PositionSource::Live => "live",
        PositionSource::Cached => "last known",
        PositionSource::Default => "default",
    }
}

fn display_name(name: &str) -> &str {
    match name.trim() {
        "" => "(unnamed)",
        trimmed => trimmed,
    }
}

fn elapsed_label(minutes: i64) -> String {
    match minutes {
        m if m < 0 => "reported in the future (clock skew?)".to_string(),
        0 => "just now".to_string(),
        1 => "1 minute ago".to_string(),
        m if m < 60 => format!("{m} minutes ago"),
        m => format!("{}h {}m ago", m / 60, m % 60),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let short: String = text.chars().take(max_chars - 3).collect();
    format!("{short}...")
}
