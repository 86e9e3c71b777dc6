use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Frame,
};
use tracing::{debug, info};

use crate::actions::Action;
use crate::sessions::{
    build_calendar_url, evaluate, status_label, Evaluation, RelevanceState, Session, SessionStatus,
    SessionTab, TabCounts,
};

/// Theme colors
pub struct Theme {
    pub fg: Color,
    pub accent: Color,
    pub dim: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            fg: Color::Rgb(220, 220, 220),
            accent: Color::Rgb(66, 133, 244),
            dim: Color::Rgb(100, 100, 100),
            success: Color::Rgb(80, 200, 120),
            warning: Color::Rgb(255, 193, 7),
            error: Color::Rgb(220, 53, 69),
        }
    }
}

/// Input mode for the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Searching,
}

/// Main application state
pub struct App {
    /// Course whose sessions are shown
    pub course_id: String,
    /// Sessions as last fetched; never modified between fetches
    pub sessions: Vec<Session>,
    /// Time of the last tick
    pub now: DateTime<Utc>,
    /// Relevant session at `now`, if any
    pub evaluation: Option<Evaluation>,
    /// Active list tab
    pub tab: SessionTab,
    /// Search applied to the list
    pub query: String,
    /// Query to restore when a search is cancelled
    saved_query: String,
    /// Currently selected row of the filtered list
    pub list_state: ListState,
    /// Current message to display (info or error)
    pub status_message: Option<String>,
    /// Whether a fetch is in flight
    pub loading: bool,
    pub theme: Theme,
    pub input_mode: InputMode,
    /// Pending action queue
    pub pending_actions: Vec<Action>,
}

impl App {
    pub fn new(course_id: String, now: DateTime<Utc>) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            course_id,
            sessions: Vec::new(),
            now,
            evaluation: None,
            tab: SessionTab::default(),
            query: String::new(),
            saved_query: String::new(),
            list_state,
            status_message: None,
            loading: true,
            theme: Theme::default(),
            input_mode: InputMode::Normal,
            pending_actions: Vec::new(),
        }
    }

    /// Sessions visible on the active tab
    pub fn visible_sessions(&self) -> Vec<&Session> {
        self.tab.filter(&self.sessions, &self.query, self.now)
    }

    /// Get the currently selected session
    pub fn selected_session(&self) -> Option<&Session> {
        let visible = self.visible_sessions();
        self.list_state.selected().and_then(|i| visible.get(i).copied())
    }

    /// Take pending actions (drains the queue)
    pub fn take_pending_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending_actions)
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        match action {
            Action::KeyPress(key) => self.handle_key(key),
            Action::Tick(now) => {
                self.now = now;
                self.reevaluate();
                self.clamp_selection();
                Ok(false)
            }
            Action::SessionsLoaded(sessions) => {
                info!(count = sessions.len(), course = %self.course_id, "sessions loaded");
                self.sessions = sessions;
                self.loading = false;
                self.reevaluate();
                self.clamp_selection();
                Ok(false)
            }
            Action::Error(msg) => {
                self.loading = false;
                self.status_message = Some(msg);
                Ok(false)
            }
            Action::Quit => Ok(true),
            _ => Ok(false),
        }
    }

    fn reevaluate(&mut self) {
        let previous = self.evaluation.as_ref().map(|e| (e.session.id.clone(), e.state));
        self.evaluation = evaluate(&self.sessions, &self.course_id, self.now);
        let current = self.evaluation.as_ref().map(|e| (e.session.id.clone(), e.state));
        if previous != current {
            debug!(?previous, ?current, "relevant session changed");
        }
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_sessions().len();
        match self.list_state.selected() {
            Some(selected) if len > 0 && selected >= len => self.list_state.select(Some(len - 1)),
            None if len > 0 => self.list_state.select(Some(0)),
            _ => {}
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        // Clear message on any key press
        if self.status_message.is_some() && self.input_mode == InputMode::Normal {
            self.status_message = None;
        }

        match self.input_mode {
            InputMode::Normal => self.handle_normal_key(key),
            InputMode::Searching => self.handle_search_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true);
            }
            KeyCode::Char('j') | KeyCode::Down => self.next_session(),
            KeyCode::Char('k') | KeyCode::Up => self.previous_session(),
            KeyCode::Tab => self.switch_tab(self.tab.next()),
            KeyCode::BackTab => self.switch_tab(self.tab.previous()),
            KeyCode::Char('/') => {
                self.saved_query = self.query.clone();
                self.input_mode = InputMode::Searching;
            }
            KeyCode::Char('c') => {
                match self.evaluation.as_ref().and_then(|e| e.calendar_url.clone()) {
                    Some(url) => self.pending_actions.push(Action::CopyCalendarLink(url)),
                    None => self.status_message = Some("No relevant session to add".to_string()),
                }
            }
            KeyCode::Char('C') => {
                let url = self
                    .selected_session()
                    .and_then(|s| build_calendar_url(s, &self.course_id));
                match url {
                    Some(url) => self.pending_actions.push(Action::CopyCalendarLink(url)),
                    None => self.status_message = Some("Selected session has no start time".to_string()),
                }
            }
            KeyCode::Char('r') => {
                self.loading = true;
                self.pending_actions.push(Action::Refresh);
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Enter => {
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Esc => {
                self.query = std::mem::take(&mut self.saved_query);
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Char(c) => {
                self.query.push(c);
            }
            KeyCode::Backspace => {
                self.query.pop();
            }
            _ => {}
        }
        self.list_state.select(Some(0));
        self.clamp_selection();
        Ok(false)
    }

    fn switch_tab(&mut self, tab: SessionTab) {
        self.tab = tab;
        self.list_state.select(Some(0));
    }

    fn next_session(&mut self) {
        let len = self.visible_sessions().len();
        if len == 0 {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.list_state.select(Some(i));
    }

    fn previous_session(&mut self) {
        let len = self.visible_sessions().len();
        if len == 0 {
            return;
        }
        let i = match self.list_state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.list_state.select(Some(i));
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Length(7), // Relevance panel
                Constraint::Length(3), // Tabs
                Constraint::Min(0),    // List + details
                Constraint::Length(3), // Footer/status
            ])
            .split(frame.area());

        self.render_header(frame, chunks[0]);
        self.render_relevance(frame, chunks[1]);
        self.render_tabs(frame, chunks[2]);
        self.render_main(frame, chunks[3]);
        self.render_footer(frame, chunks[4]);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let title = Paragraph::new(Line::from(vec![
            Span::styled(
                " SessionBeacon ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("│ Course {} │ {}", self.course_id, format_local(self.now, "%a %d %b %H:%M:%S")),
                Style::default().fg(self.theme.dim),
            ),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(title, area);
    }

    fn state_color(&self, state: RelevanceState) -> Color {
        match state {
            RelevanceState::Live => self.theme.error,
            RelevanceState::Upcoming => self.theme.accent,
            RelevanceState::Recent => self.theme.success,
        }
    }

    fn render_relevance(&self, frame: &mut Frame, area: Rect) {
        let (title, border, content) = match &self.evaluation {
            Some(eval) => {
                let color = self.state_color(eval.state);
                let mut lines = vec![
                    Line::from(vec![
                        Span::styled(
                            format!(" {} ", eval.state.as_str().to_uppercase()),
                            Style::default().fg(Color::Black).bg(color).add_modifier(Modifier::BOLD),
                        ),
                        Span::raw(" "),
                        Span::styled(eval.display.message.clone(), Style::default().fg(self.theme.fg)),
                    ]),
                    Line::from(vec![
                        Span::styled("When: ", Style::default().fg(self.theme.dim)),
                        Span::styled(
                            format!(
                                "{} - {}",
                                format_local(eval.window.start, "%a %d %b %H:%M"),
                                format_local(eval.window.end, "%H:%M"),
                            ),
                            Style::default().fg(self.theme.fg),
                        ),
                    ]),
                ];
                if let Some(countdown) = &eval.countdown {
                    let label = match eval.state {
                        RelevanceState::Live => "Ends in: ",
                        _ => "Starts in: ",
                    };
                    lines.push(Line::from(vec![
                        Span::styled(label, Style::default().fg(self.theme.dim)),
                        Span::styled(
                            if countdown.is_zero() {
                                "now".to_string()
                            } else {
                                format!(
                                    "{}d {:02}h {:02}m {:02}s",
                                    countdown.days, countdown.hours, countdown.minutes, countdown.seconds
                                )
                            },
                            Style::default().fg(color).add_modifier(Modifier::BOLD),
                        ),
                    ]));
                }
                if eval.window.in_pre_join_window {
                    lines.push(Line::from(Span::styled(
                        "Doors are open: you can join a few minutes early",
                        Style::default().fg(self.theme.warning),
                    )));
                }
                lines.push(Line::from(Span::styled(
                    format!("{} │ c: copy calendar link", eval.display.action_label),
                    Style::default().fg(self.theme.dim),
                )));
                (format!(" {} ", eval.display.title), color, lines)
            }
            None => {
                let message = if self.loading {
                    "Loading sessions..."
                } else {
                    "No live, upcoming or recent sessions for this course."
                };
                (
                    " Live Sessions ".to_string(),
                    self.theme.dim,
                    vec![Line::from(Span::styled(message, Style::default().fg(self.theme.dim)))],
                )
            }
        };

        let panel = Paragraph::new(content).wrap(Wrap { trim: true }).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border)),
        );
        frame.render_widget(panel, area);
    }

    fn render_tabs(&self, frame: &mut Frame, area: Rect) {
        let counts = TabCounts::tally(&self.sessions, self.now);
        let titles: Vec<Line> = SessionTab::ALL
            .iter()
            .map(|tab| Line::from(format!("{} ({})", tab.label(), counts.get(*tab))))
            .collect();
        let selected = SessionTab::ALL.iter().position(|t| *t == self.tab).unwrap_or(0);

        let tabs = Tabs::new(titles)
            .select(selected)
            .style(Style::default().fg(self.theme.dim))
            .highlight_style(
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            )
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            );
        frame.render_widget(tabs, area);
    }

    fn render_main(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(40), // Session list
                Constraint::Percentage(60), // Detail pane
            ])
            .split(area);

        self.render_session_list(frame, chunks[0]);
        self.render_detail_pane(frame, chunks[1]);
    }

    fn status_color(&self, session: &Session) -> Color {
        match session.status {
            SessionStatus::Live => self.theme.error,
            SessionStatus::Scheduled => self.theme.accent,
            SessionStatus::Ended if session.recording_url.is_some() => self.theme.success,
            SessionStatus::Cancelled => self.theme.warning,
            SessionStatus::Ended | SessionStatus::Unknown => self.theme.dim,
        }
    }

    fn render_session_list(&mut self, frame: &mut Frame, area: Rect) {
        let visible = self.visible_sessions();
        let items: Vec<ListItem> = if visible.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  No sessions on this tab.",
                Style::default().fg(self.theme.dim),
            )))]
        } else {
            visible
                .iter()
                .map(|session| {
                    let when = session
                        .scheduled_time
                        .map(|t| format_local(t, "%d %b %H:%M"))
                        .unwrap_or_else(|| "--".to_string());
                    ListItem::new(Line::from(vec![
                        Span::styled("● ", Style::default().fg(self.status_color(session))),
                        Span::styled(format!("{} ", when), Style::default().fg(self.theme.dim)),
                        Span::styled(session.title.clone(), Style::default().fg(self.theme.fg)),
                    ]))
                })
                .collect()
        };

        let title = if self.query.is_empty() {
            " Sessions ".to_string()
        } else {
            format!(" Sessions matching '{}' ", self.query)
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .title(title)
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(50, 50, 50))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");

        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn render_detail_pane(&self, frame: &mut Frame, area: Rect) {
        let field = |label: &'static str, value: String| {
            Line::from(vec![
                Span::styled(label, Style::default().fg(self.theme.dim)),
                Span::styled(value, Style::default().fg(self.theme.fg)),
            ])
        };

        let content = if let Some(session) = self.selected_session() {
            let mut lines = vec![
                field("Title: ", session.title.clone()),
                Line::from(vec![
                    Span::styled("Status: ", Style::default().fg(self.theme.dim)),
                    Span::styled(status_label(session), Style::default().fg(self.status_color(session))),
                ]),
                field(
                    "Starts: ",
                    session
                        .scheduled_time
                        .map(|t| format_local(t, "%A %d %B %Y %H:%M"))
                        .unwrap_or_else(|| "not scheduled".to_string()),
                ),
                field("Duration: ", format!("{} minutes", session.effective_duration())),
            ];
            if let Some(url) = &session.meeting_url {
                lines.push(field("Meeting: ", url.clone()));
            }
            if let Some(url) = &session.recording_url {
                lines.push(field("Recording: ", url.clone()));
            }
            if let Some(description) = &session.description {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    description.clone(),
                    Style::default().fg(self.theme.fg),
                )));
            }
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Press 'C' to copy this session's calendar link",
                Style::default().fg(self.theme.dim),
            )));
            lines
        } else {
            vec![Line::from(Span::styled(
                "No session selected",
                Style::default().fg(self.theme.dim),
            ))]
        };

        let detail = Paragraph::new(content).wrap(Wrap { trim: false }).block(
            Block::default()
                .title(" Details ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(detail, area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let content = if self.input_mode == InputMode::Searching {
            Line::from(Span::styled(
                format!(" Search: {}_  (Enter: apply │ Esc: cancel)", self.query),
                Style::default().fg(self.theme.accent),
            ))
        } else if let Some(ref msg) = self.status_message {
            let style = if msg.contains("copied") {
                Style::default().fg(self.theme.success)
            } else {
                Style::default().fg(self.theme.error)
            };
            Line::from(Span::styled(format!(" {} ", msg), style))
        } else {
            Line::from(Span::styled(
                " q: Quit │ j/k: Navigate │ Tab: Switch tab │ /: Search │ c/C: Copy calendar link │ r: Refresh ",
                Style::default().fg(self.theme.dim),
            ))
        };

        let footer = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(footer, area);
    }
}

fn format_local(t: DateTime<Utc>, fmt: &str) -> String {
    t.with_timezone(&Local).format(fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use crossterm::event::KeyEventKind;
    use ratatui::{backend::TestBackend, Terminal};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 14, 0, 0).unwrap()
    }

    fn key(code: KeyCode) -> Action {
        Action::KeyPress(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn sessions() -> Vec<Session> {
        let mut live = Session::new("live", "Cell biology").starting_at(now() - Duration::minutes(15));
        live.status = SessionStatus::Live;
        vec![
            Session::new("next", "Genetics").starting_at(now() + Duration::hours(3)),
            Session::new("later", "Evolution").starting_at(now() + Duration::days(5)),
            live,
        ]
    }

    fn loaded_app() -> App {
        let mut app = App::new("bio101".to_string(), now());
        app.handle_action(Action::SessionsLoaded(sessions())).unwrap();
        app
    }

    #[test]
    fn test_load_evaluates() {
        let app = loaded_app();
        assert!(!app.loading);
        let eval = app.evaluation.as_ref().unwrap();
        assert_eq!(eval.session.id, "live");
        assert_eq!(eval.state, RelevanceState::Live);
    }

    #[test]
    fn test_tick_reclassifies() {
        let mut app = loaded_app();
        // the live session has ended and the next one is in three hours
        app.handle_action(Action::Tick(now() + Duration::hours(1))).unwrap();
        let eval = app.evaluation.as_ref().unwrap();
        assert_eq!(eval.session.id, "next");
        assert_eq!(eval.state, RelevanceState::Upcoming);
        assert_eq!(eval.countdown.unwrap().hours, 2);
        assert_eq!(app.sessions.len(), 3);
    }

    #[test]
    fn test_tab_navigation_and_selection() {
        let mut app = loaded_app();
        assert_eq!(app.selected_session().unwrap().id, "next");

        app.handle_action(key(KeyCode::Char('j'))).unwrap();
        assert_eq!(app.selected_session().unwrap().id, "later");
        app.handle_action(key(KeyCode::Char('j'))).unwrap();
        assert_eq!(app.selected_session().unwrap().id, "next");

        app.handle_action(key(KeyCode::Tab)).unwrap();
        assert_eq!(app.tab, SessionTab::Live);
        assert_eq!(app.selected_session().unwrap().id, "live");

        app.handle_action(key(KeyCode::BackTab)).unwrap();
        app.handle_action(key(KeyCode::BackTab)).unwrap();
        assert_eq!(app.tab, SessionTab::Past);
    }

    #[test]
    fn test_search_and_cancel() {
        let mut app = loaded_app();
        app.handle_action(key(KeyCode::Char('/'))).unwrap();
        assert_eq!(app.input_mode, InputMode::Searching);
        for c in "evo".chars() {
            app.handle_action(key(KeyCode::Char(c))).unwrap();
        }
        assert_eq!(app.visible_sessions().len(), 1);
        app.handle_action(key(KeyCode::Enter)).unwrap();
        assert_eq!(app.query, "evo");
        assert_eq!(app.selected_session().unwrap().id, "later");

        app.handle_action(key(KeyCode::Char('/'))).unwrap();
        app.handle_action(key(KeyCode::Char('x'))).unwrap();
        app.handle_action(key(KeyCode::Esc)).unwrap();
        assert_eq!(app.query, "evo");
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn test_copy_and_refresh_are_queued() {
        let mut app = loaded_app();
        app.handle_action(key(KeyCode::Char('c'))).unwrap();
        app.handle_action(key(KeyCode::Char('r'))).unwrap();

        let pending = app.take_pending_actions();
        assert_eq!(pending.len(), 2);
        assert!(matches!(&pending[0], Action::CopyCalendarLink(url) if url.contains("action=TEMPLATE")));
        assert!(matches!(pending[1], Action::Refresh));
        assert!(app.loading);
        assert!(app.take_pending_actions().is_empty());
    }

    #[test]
    fn test_copy_without_relevant_session() {
        let mut app = App::new("bio101".to_string(), now());
        app.handle_action(Action::SessionsLoaded(Vec::new())).unwrap();
        app.handle_action(key(KeyCode::Char('c'))).unwrap();
        assert!(app.take_pending_actions().is_empty());
        assert!(app.status_message.is_some());
    }

    #[test]
    fn test_quit_keys() {
        let mut app = loaded_app();
        assert!(app.handle_action(key(KeyCode::Char('q'))).unwrap());
        let ctrl_c = KeyEvent::new_with_kind(KeyCode::Char('c'), KeyModifiers::CONTROL, KeyEventKind::Press);
        assert!(app.handle_action(Action::KeyPress(ctrl_c)).unwrap());
        assert!(app.handle_action(Action::Quit).unwrap());
    }

    #[test]
    fn test_error_stops_loading() {
        let mut app = App::new("bio101".to_string(), now());
        app.handle_action(Action::Error("Network error".to_string())).unwrap();
        assert!(!app.loading);
        assert_eq!(app.status_message.as_deref(), Some("Network error"));
    }

    #[test]
    fn test_render_shows_panel() {
        let mut app = loaded_app();
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|f| app.render(f)).unwrap();

        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(text.contains("Live now"));
        assert!(text.contains("Upcoming (2)"));
        assert!(text.contains("Genetics"));
    }
}
