use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;

use super::calendar::build_calendar_url;
use super::countdown::Countdown;
use super::display::{describe_state, DisplayCopy};
use super::window::TimeWindow;
use super::Session;

/// How far ahead an upcoming session is surfaced
pub const UPCOMING_HORIZON_HOURS: i64 = 48;
/// How long an ended session stays surfaced
pub const RECENT_HORIZON_HOURS: i64 = 24;

/// Display mode of the surfaced session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceState {
    Live,
    Upcoming,
    Recent,
}

impl RelevanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Upcoming => "upcoming",
            Self::Recent => "recent",
        }
    }
}

impl fmt::Display for RelevanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one session worth showing right now
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceResult<'a> {
    pub session: &'a Session,
    pub state: RelevanceState,
    pub window: TimeWindow,
}

/// Pick at most one session, first non-empty tier wins: live, then upcoming, then recent.
///
/// Sessions without a usable start never match. Live ties keep input order, upcoming
/// prefers the soonest start and recent the latest end (input order on equal times).
pub fn select_relevant(sessions: &[Session], now: DateTime<Utc>) -> Option<RelevanceResult<'_>> {
    let windows: Vec<(&Session, TimeWindow)> = sessions
        .iter()
        .filter_map(|s| TimeWindow::normalize(s, now).map(|w| (s, w)))
        .collect();

    fn result(
        (session, window): (&Session, TimeWindow),
        state: RelevanceState,
    ) -> RelevanceResult<'_> {
        RelevanceResult {
            session,
            state,
            window,
        }
    }

    if let Some(live) = windows.iter().find(|(_, w)| w.in_live_window) {
        return Some(result(*live, RelevanceState::Live));
    }

    let upcoming_limit = now
        .checked_add_signed(Duration::hours(UPCOMING_HORIZON_HOURS))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let upcoming = windows
        .iter()
        .filter(|(_, w)| w.start > now && w.start <= upcoming_limit)
        .min_by_key(|(_, w)| w.start);
    if let Some(upcoming) = upcoming {
        return Some(result(*upcoming, RelevanceState::Upcoming));
    }

    let recent_limit = now
        .checked_sub_signed(Duration::hours(RECENT_HORIZON_HOURS))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    windows
        .iter()
        .filter(|(_, w)| w.end < now && w.end >= recent_limit)
        .min_by_key(|(_, w)| Reverse(w.end))
        .map(|recent| result(*recent, RelevanceState::Recent))
}

/// Everything the panel needs for one tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub session: Session,
    pub state: RelevanceState,
    pub window: TimeWindow,
    /// Until start when upcoming, until end when live
    pub countdown: Option<Countdown>,
    pub display: DisplayCopy,
    pub calendar_url: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

/// Pure per-tick pipeline: select, count down, describe, link.
pub fn evaluate(sessions: &[Session], course_id: &str, now: DateTime<Utc>) -> Option<Evaluation> {
    let selected = select_relevant(sessions, now)?;

    let countdown = match selected.state {
        RelevanceState::Upcoming => Some(Countdown::until(selected.window.start, now)),
        RelevanceState::Live => Some(Countdown::until(selected.window.end, now)),
        RelevanceState::Recent => None,
    };
    let display = describe_state(selected.state, selected.session, countdown.as_ref());

    Some(Evaluation {
        session: selected.session.clone(),
        state: selected.state,
        window: selected.window,
        countdown,
        display,
        calendar_url: build_calendar_url(selected.session, course_id),
        evaluated_at: now,
    })
}
