use serde::Serialize;

use super::countdown::Countdown;
use super::relevance::RelevanceState;
use super::Session;

/// User-facing copy for the relevance panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayCopy {
    pub title: String,
    pub message: String,
    pub action_label: String,
}

/// Copy for a surfaced session
pub fn describe_state(
    state: RelevanceState,
    session: &Session,
    countdown: Option<&Countdown>,
) -> DisplayCopy {
    match state {
        RelevanceState::Live => DisplayCopy {
            title: "Live now".to_string(),
            message: format!("\"{}\" is in progress. Join the class now.", session.title),
            action_label: "Join session".to_string(),
        },
        RelevanceState::Upcoming => {
            let starts_in = countdown
                .map(|c| format!("starts in {}", c))
                .unwrap_or_else(|| "starts soon".to_string());
            DisplayCopy {
                title: "Upcoming live session".to_string(),
                message: format!("\"{}\" {}.", session.title, starts_in),
                action_label: "Add to calendar".to_string(),
            }
        }
        RelevanceState::Recent => {
            let action_label = if session.recording_url.is_some() {
                "Watch recording"
            } else {
                "View session"
            };
            DisplayCopy {
                title: "Recently ended".to_string(),
                message: format!("\"{}\" has ended.", session.title),
                action_label: action_label.to_string(),
            }
        }
    }
}
