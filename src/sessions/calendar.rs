use chrono::{DateTime, Utc};

use super::Session;

const CALENDAR_TEMPLATE_URL: &str = "https://calendar.google.com/calendar/render";
const LOCATION: &str = "Online";

/// UTC basic format expected by the calendar template endpoint
fn format_calendar_date(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Build an "add to calendar" deep link for a session.
///
/// Only formats a string; nothing is fetched. Returns `None` when the session has
/// no usable start or end time.
pub fn build_calendar_url(session: &Session, course_id: &str) -> Option<String> {
    let (start, end) = session.time_bounds()?;

    let mut details = format!("Live session for course {}", course_id);
    if let Some(description) = session.description.as_deref().filter(|d| !d.trim().is_empty()) {
        details.push_str("\n\n");
        details.push_str(description);
    }

    Some(format!(
        "{}?action=TEMPLATE&text={}&dates={}/{}&details={}&location={}",
        CALENDAR_TEMPLATE_URL,
        urlencoding::encode(&session.title),
        format_calendar_date(start),
        format_calendar_date(end),
        urlencoding::encode(&details),
        urlencoding::encode(LOCATION),
    ))
}
