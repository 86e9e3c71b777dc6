use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::Session;

/// Lead time before the start during which joining is already offered
pub const PRE_JOIN_LEAD_MINUTES: i64 = 5;

/// Start/end of a session relative to one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub in_live_window: bool,
    /// Informational; a session in its pre-join window is still classified as upcoming
    pub in_pre_join_window: bool,
}

impl TimeWindow {
    /// Returns `None` when the session has no usable start or end time
    pub fn normalize(session: &Session, now: DateTime<Utc>) -> Option<Self> {
        let (start, end) = session.time_bounds()?;
        let in_pre_join_window = match start.checked_sub_signed(Duration::minutes(PRE_JOIN_LEAD_MINUTES)) {
            Some(pre_join) => pre_join <= now && now < start,
            None => now < start,
        };

        Some(Self {
            start,
            end,
            in_live_window: start <= now && now <= end,
            in_pre_join_window,
        })
    }
}
