use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Time remaining until a target instant, split into calendar units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    /// Clamped at zero once `target` has passed
    pub fn until(target: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let diff = (target - now).num_milliseconds().max(0);

        Self {
            days: diff / MS_PER_DAY,
            hours: (diff % MS_PER_DAY) / MS_PER_HOUR,
            minutes: (diff % MS_PER_HOUR) / MS_PER_MINUTE,
            seconds: (diff % MS_PER_MINUTE) / MS_PER_SECOND,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Coarsest non-zero pair, e.g. "2d 3h", "4h 10m" or "9m 30s"
    pub fn to_short_string(&self) -> String {
        if self.days > 0 {
            format!("{}d {}h", self.days, self.hours)
        } else if self.hours > 0 {
            format!("{}h {}m", self.hours, self.minutes)
        } else {
            format!("{}m {}s", self.minutes, self.seconds)
        }
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_short_string())
    }
}
