use chrono::{DateTime, Utc};

use super::{Session, SessionStatus};

/// Tabs of the course session list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionTab {
    #[default]
    Upcoming,
    Live,
    Recordings,
    Past,
}

impl SessionTab {
    pub const ALL: [SessionTab; 4] = [
        SessionTab::Upcoming,
        SessionTab::Live,
        SessionTab::Recordings,
        SessionTab::Past,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Upcoming => "Upcoming",
            Self::Live => "Live",
            Self::Recordings => "Recordings",
            Self::Past => "Past",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Upcoming => Self::Live,
            Self::Live => Self::Recordings,
            Self::Recordings => Self::Past,
            Self::Past => Self::Upcoming,
        }
    }

    pub fn previous(self) -> Self {
        match self {
            Self::Upcoming => Self::Past,
            Self::Live => Self::Upcoming,
            Self::Recordings => Self::Live,
            Self::Past => Self::Recordings,
        }
    }

    /// Whether a session belongs on this tab. Based on the platform-reported status,
    /// with the scheduled time as a fallback for stale statuses.
    pub fn contains(&self, session: &Session, now: DateTime<Utc>) -> bool {
        let starts_later = session.scheduled_time.is_some_and(|t| t > now);
        let started = session.scheduled_time.is_some_and(|t| t < now);

        match self {
            Self::Upcoming => session.status == SessionStatus::Scheduled && starts_later,
            Self::Live => session.status == SessionStatus::Live,
            Self::Recordings => {
                session.status == SessionStatus::Ended && session.recording_url.is_some()
            }
            Self::Past => {
                matches!(session.status, SessionStatus::Ended | SessionStatus::Cancelled) || started
            }
        }
    }

    /// Sessions on this tab matching `query`, in input order
    pub fn filter<'a>(
        &self,
        sessions: &'a [Session],
        query: &str,
        now: DateTime<Utc>,
    ) -> Vec<&'a Session> {
        sessions
            .iter()
            .filter(|s| matches_search(s, query) && self.contains(s, now))
            .collect()
    }
}

/// Case-insensitive match on title or description; an empty query matches everything
pub fn matches_search(session: &Session, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    session.title.to_lowercase().contains(&query)
        || session
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(&query))
}

/// Badge text for a session's platform status
pub fn status_label(session: &Session) -> &'static str {
    match session.status {
        SessionStatus::Live => "LIVE NOW",
        SessionStatus::Scheduled => "Scheduled",
        SessionStatus::Ended if session.recording_url.is_some() => "Recording Available",
        SessionStatus::Ended => "Ended",
        SessionStatus::Cancelled => "Cancelled",
        SessionStatus::Unknown => "Unknown",
    }
}

/// Per-tab session counts for the tab bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TabCounts {
    pub upcoming: usize,
    pub live: usize,
    pub recordings: usize,
    pub past: usize,
}

impl TabCounts {
    pub fn tally(sessions: &[Session], now: DateTime<Utc>) -> Self {
        let count = |tab: SessionTab| sessions.iter().filter(|s| tab.contains(s, now)).count();
        Self {
            upcoming: count(SessionTab::Upcoming),
            live: count(SessionTab::Live),
            recordings: count(SessionTab::Recordings),
            past: count(SessionTab::Past),
        }
    }

    pub fn get(&self, tab: SessionTab) -> usize {
        match tab {
            SessionTab::Upcoming => self.upcoming,
            SessionTab::Live => self.live,
            SessionTab::Recordings => self.recordings,
            SessionTab::Past => self.past,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap()
    }

    fn session(id: &str, status: SessionStatus, offset: Duration) -> Session {
        let mut s = Session::new(id, format!("Lesson {id}")).starting_at(now() + offset);
        s.status = status;
        s
    }

    fn ids(sessions: Vec<&Session>) -> Vec<&str> {
        sessions.into_iter().map(|s| s.id.as_str()).collect()
    }

    fn fixture() -> Vec<Session> {
        let mut recorded = session("recorded", SessionStatus::Ended, Duration::days(-3));
        recorded.recording_url = Some("https://cdn.example/r.mp4".to_string());
        vec![
            session("next", SessionStatus::Scheduled, Duration::hours(4)),
            session("on-air", SessionStatus::Live, Duration::minutes(-20)),
            recorded,
            session("plain-ended", SessionStatus::Ended, Duration::days(-1)),
            session("cancelled", SessionStatus::Cancelled, Duration::days(2)),
            // never started but its slot is in the past
            session("stale", SessionStatus::Scheduled, Duration::hours(-5)),
        ]
    }

    #[test]
    fn test_tab_membership() {
        let sessions = fixture();
        assert_eq!(ids(SessionTab::Upcoming.filter(&sessions, "", now())), ["next"]);
        assert_eq!(ids(SessionTab::Live.filter(&sessions, "", now())), ["on-air"]);
        assert_eq!(ids(SessionTab::Recordings.filter(&sessions, "", now())), ["recorded"]);
        assert_eq!(
            ids(SessionTab::Past.filter(&sessions, "", now())),
            ["on-air", "recorded", "plain-ended", "cancelled", "stale"]
        );
    }

    #[test]
    fn test_search_title_and_description() {
        let mut sessions = fixture();
        sessions[0].description = Some("Covers QUADRATIC equations".to_string());

        assert_eq!(ids(SessionTab::Upcoming.filter(&sessions, "quadratic", now())), ["next"]);
        assert_eq!(ids(SessionTab::Upcoming.filter(&sessions, "LESSON NEXT", now())), ["next"]);
        assert!(SessionTab::Upcoming.filter(&sessions, "biology", now()).is_empty());
    }

    #[test]
    fn test_missing_time_is_not_upcoming() {
        let s = Session::new("x", "No time");
        assert!(!SessionTab::Upcoming.contains(&s, now()));
        assert!(!SessionTab::Past.contains(&s, now()));
    }

    #[test]
    fn test_status_labels() {
        let sessions = fixture();
        let labels: Vec<&str> = sessions.iter().map(status_label).collect();
        assert_eq!(
            labels,
            ["Scheduled", "LIVE NOW", "Recording Available", "Ended", "Cancelled", "Scheduled"]
        );
    }

    #[test]
    fn test_tab_counts() {
        let counts = TabCounts::tally(&fixture(), now());
        assert_eq!(counts, TabCounts { upcoming: 1, live: 1, recordings: 1, past: 5 });
        assert_eq!(counts.get(SessionTab::Past), 5);
    }

    #[test]
    fn test_tab_cycle() {
        let mut tab = SessionTab::default();
        for _ in 0..SessionTab::ALL.len() {
            tab = tab.next();
        }
        assert_eq!(tab, SessionTab::Upcoming);
        assert_eq!(SessionTab::Upcoming.previous(), SessionTab::Past);
    }
}
