use chrono::{DateTime, Utc};
use crossterm::event::KeyEvent;

use crate::sessions::Session;

/// Actions that can be dispatched through the application
#[derive(Debug, Clone)]
pub enum Action {
    /// A key was pressed
    KeyPress(KeyEvent),
    /// Clock tick carrying the current time
    Tick(DateTime<Utc>),
    /// Sessions were fetched for the course
    SessionsLoaded(Vec<Session>),
    /// An error occurred
    Error(String),
    /// Request to quit the application
    Quit,
    /// Fetch the session list again
    Refresh,
    /// Copy a calendar link to the clipboard
    CopyCalendarLink(String),
}
