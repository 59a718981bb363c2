use chrono::{DateTime, TimeZone, Utc};

fn utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

/// Relative path for a saved snapshot, grouped by window and day.
/// e.g. "HEATMAP/2026-02-18/20260218T093000000Z_000042.jpg"
pub fn snapshot_key(window: &str, captured_at_ms: i64, seq: u64) -> String {
    let dt = utc(captured_at_ms);
    format!(
        "{window}/{date}/{ts}_{seq:06}.jpg",
        window = sanitize(window),
        date = dt.format("%Y-%m-%d"),
        ts = dt.format("%Y%m%dT%H%M%S%3fZ"),
    )
}

/// Keep window titles usable as a single path component.
fn sanitize(window: &str) -> String {
    let cleaned: String = window
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "window".into()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        // 2025-02-18T09:30:00.000Z
        let key = snapshot_key("HEATMAP", 1739871000000, 42);
        assert_eq!(key, "HEATMAP/2025-02-18/20250218T093000000Z_000042.jpg");
    }

    #[test]
    fn window_titles_are_path_safe() {
        let key = snapshot_key("../motion heat", 1739871000000, 1);
        assert!(key.starts_with("___motion_heat/"), "{key}");
        assert!(snapshot_key("", 1739871000000, 1).starts_with("window/"));
    }
}
