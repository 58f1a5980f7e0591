use std::{io, sync::Arc, thread, time::Duration};

use anyhow::{anyhow, Context, Result};
use chrono::{Duration as Days, Local};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Frame, Terminal,
};
use srtgo_core::{
    models::{
        Account, Carrier, PassengerCategory, PassengerOptionSet, ReservationParameters,
        StationSelection, MAX_PASSENGERS,
    },
    progress::{ProgressEvent, ProgressReceiver},
    rail::{KakaoNotifier, Notifier},
    ReservationSessionRunner, RunnerOptions, SessionError, SessionPhase, SettingsRepository,
};
use tokio::{spawn, sync::mpsc, task};
use tracing::{error, info, warn};

use crate::{
    prompt::{PromptKind, PromptModal},
    Clients,
};

const TICK_RATE: Duration = Duration::from_millis(250);
const MAX_LOG_LINES: usize = 500;

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    success: Color,
    warning: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            success: Color::Green,
            warning: Color::Yellow,
            danger: Color::Red,
        }
    }
}

/// Editable rows of the reservation form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Departure,
    Arrival,
    Date,
    Hour,
    Adults,
    Discount(PassengerCategory),
    Seat,
    AutoPay,
}

fn category_label(category: PassengerCategory) -> &'static str {
    match category {
        PassengerCategory::Child => "Children",
        PassengerCategory::Senior => "Seniors",
        PassengerCategory::Disability1To3 => "Disability 1-3",
        PassengerCategory::Disability4To6 => "Disability 4-6",
    }
}

/// Checkbox list over a carrier's station catalog.
#[derive(Debug, Clone)]
struct StationPicker {
    carrier: Carrier,
    catalog: &'static [&'static str],
    checked: Vec<bool>,
    cursor: usize,
}

impl StationPicker {
    fn new(carrier: Carrier, catalog: &'static [&'static str], selection: &StationSelection) -> Self {
        let checked = catalog
            .iter()
            .map(|station| selection.stations.iter().any(|chosen| chosen == station))
            .collect();
        Self {
            carrier,
            catalog,
            checked,
            cursor: 0,
        }
    }

    fn selection(&self) -> StationSelection {
        StationSelection {
            carrier: self.carrier,
            stations: self
                .catalog
                .iter()
                .zip(&self.checked)
                .filter(|(_, checked)| **checked)
                .map(|(station, _)| station.to_string())
                .collect(),
        }
    }
}

/// Toggles for the discounted passenger categories and the KTX-only filter.
#[derive(Debug, Clone)]
struct OptionPicker {
    options: PassengerOptionSet,
    cursor: usize,
}

impl OptionPicker {
    const ROWS: usize = PassengerCategory::ALL.len() + 1;

    fn toggle(&mut self) {
        match PassengerCategory::ALL.get(self.cursor) {
            Some(category) => {
                if !self.options.categories.remove(category) {
                    self.options.categories.insert(*category);
                }
            }
            None => self.options.ktx_only = !self.options.ktx_only,
        }
    }
}

enum Modal {
    Prompt(PromptModal),
    Stations(StationPicker),
    Options(OptionPicker),
}

enum AppEvent {
    Input(Event),
    Tick,
    LoginFinished {
        carrier: Carrier,
        result: Result<Account>,
    },
}

/// Terminal front end for the reservation runner.
pub struct SrtGoApp {
    settings: SettingsRepository,
    clients: Clients,
    runner_options: RunnerOptions,
    runner: ReservationSessionRunner,
    dry_run: bool,
    carrier: Carrier,
    params: ReservationParameters,
    catalog: &'static [&'static str],
    stations: StationSelection,
    options: PassengerOptionSet,
    account: Option<Account>,
    progress: Option<ProgressReceiver>,
    log: Vec<ProgressEvent>,
    cursor: usize,
    modal: Option<Modal>,
    pending_login: bool,
    status: String,
    should_quit: bool,
    event_tx: Option<mpsc::Sender<AppEvent>>,
    theme: Theme,
}

impl SrtGoApp {
    pub fn new(
        settings: SettingsRepository,
        clients: Clients,
        runner_options: RunnerOptions,
        dry_run: bool,
    ) -> Self {
        let carrier = Carrier::Srt;
        let runner = build_runner(&settings, &clients, &runner_options, carrier);
        let (catalog, stations) = settings.load_stations(carrier);
        let mut app = Self {
            params: settings.load_reservation_parameters(carrier),
            account: settings.load_account(carrier),
            options: settings.load_options(),
            settings,
            clients,
            runner_options,
            runner,
            dry_run,
            carrier,
            catalog,
            stations,
            progress: None,
            log: Vec::new(),
            cursor: 0,
            modal: None,
            pending_login: false,
            status: "Ready".to_string(),
            should_quit: false,
            event_tx: None,
            theme: Theme::default(),
        };
        app.refresh_notifier();
        app
    }

    pub async fn run(&mut self) -> Result<()> {
        self.status = format!(
            "Credentials in {} store{}",
            self.settings.store().backend_name(),
            if self.dry_run { " • dry run" } else { "" }
        );

        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx.clone());
        self.event_tx = Some(event_tx);

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.should_quit {
                break;
            }

            let keep_running = if let Some(mut progress) = self.progress.take() {
                tokio::select! {
                    maybe_event = event_rx.recv() => {
                        // A start handled below installs its own receiver.
                        self.progress = Some(progress);
                        self.process_app_event(maybe_event)
                    }
                    maybe_progress = progress.recv() => {
                        if let Some(event) = maybe_progress {
                            self.push_progress(event);
                            self.progress = Some(progress);
                        }
                        true
                    }
                }
            } else {
                let maybe_event = event_rx.recv().await;
                self.process_app_event(maybe_event)
            };

            if !keep_running || self.should_quit {
                break;
            }
        }

        self.runner.stop();
        restore_terminal(&mut terminal)?;
        self.event_tx = None;
        Ok(())
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(event)) => {
                if let Err(err) = self.handle_input(event) {
                    self.status = format!("Error: {err}");
                }
                true
            }
            Some(AppEvent::Tick) => {
                self.handle_tick();
                true
            }
            Some(AppEvent::LoginFinished { carrier, result }) => {
                self.pending_login = false;
                match result {
                    Ok(account) => {
                        info!(%carrier, "login verified and saved");
                        self.status = format!("{carrier} login {} verified and saved", account.id);
                        if carrier == self.carrier {
                            self.account = Some(account);
                        }
                    }
                    Err(err) => {
                        warn!(%carrier, "login check failed: {err:#}");
                        self.status = format!("{carrier} login failed: {err:#}");
                    }
                }
                true
            }
            None => false,
        }
    }

    fn handle_tick(&mut self) {
        let drained = self
            .progress
            .as_mut()
            .map(|progress| progress.drain())
            .unwrap_or_default();
        for event in drained {
            self.push_progress(event);
        }
    }

    fn push_progress(&mut self, event: ProgressEvent) {
        if event.phase.is_terminal() {
            self.status = format!("Session {}: {}", event.phase, event.message);
        }
        self.log.push(event);
        self.trim_log();
    }

    fn trim_log(&mut self) {
        if self.log.len() > MAX_LOG_LINES {
            let excess = self.log.len() - MAX_LOG_LINES;
            self.log.drain(..excess);
        }
    }

    fn handle_input(&mut self, event: Event) -> Result<()> {
        let Event::Key(key) = event else {
            return Ok(());
        };
        if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return Ok(());
        }
        match self.modal.take() {
            Some(Modal::Prompt(prompt)) => self.handle_prompt_key(prompt, key),
            Some(Modal::Stations(picker)) => self.handle_station_key(picker, key),
            Some(Modal::Options(picker)) => self.handle_option_key(picker, key),
            None => self.handle_form_key(key),
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) -> Result<()> {
        let fields = self.fields();
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => {
                self.cursor = self.cursor.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.cursor = (self.cursor + 1).min(fields.len().saturating_sub(1));
            }
            KeyCode::Left | KeyCode::Char('-') | KeyCode::Char('h') => {
                if let Some(field) = fields.get(self.cursor) {
                    self.adjust(*field, -1);
                }
            }
            KeyCode::Right | KeyCode::Char('+') | KeyCode::Char('=') | KeyCode::Char('l') => {
                if let Some(field) = fields.get(self.cursor) {
                    self.adjust(*field, 1);
                }
            }
            KeyCode::Tab => self.switch_carrier()?,
            KeyCode::Enter | KeyCode::Char('r') => self.start_session(),
            KeyCode::Char('s') => {
                if self.runner.is_running() {
                    self.runner.stop();
                    self.status = "Stopping after the current step…".to_string();
                } else {
                    self.status = "No session is running".to_string();
                }
            }
            KeyCode::Char('a') => {
                let id = self
                    .account
                    .as_ref()
                    .map(|account| account.id.clone())
                    .unwrap_or_default();
                self.modal = Some(Modal::Prompt(PromptModal::login(self.carrier, &id)));
            }
            KeyCode::Char('D') => {
                self.settings
                    .delete_account(self.carrier)
                    .with_context(|| format!("failed to delete {} login", self.carrier))?;
                self.account = None;
                self.status = format!("Deleted saved {} login", self.carrier);
            }
            KeyCode::Char('n') => {
                let token = self.settings.load_notification_token().unwrap_or_default();
                self.modal = Some(Modal::Prompt(PromptModal::notification_token(&token)));
            }
            KeyCode::Char('e') => {
                self.modal = Some(Modal::Stations(StationPicker::new(
                    self.carrier,
                    self.catalog,
                    &self.stations,
                )));
            }
            KeyCode::Char('o') => {
                self.modal = Some(Modal::Options(OptionPicker {
                    options: self.options.clone(),
                    cursor: 0,
                }));
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_prompt_key(&mut self, mut prompt: PromptModal, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => {
                self.status = "Cancelled".to_string();
                return Ok(());
            }
            KeyCode::Enter => return self.submit_prompt(prompt),
            KeyCode::Tab | KeyCode::Down => prompt.cycle_focus(1),
            KeyCode::BackTab | KeyCode::Up => prompt.cycle_focus(-1),
            KeyCode::Left => prompt.focused().move_cursor(-1),
            KeyCode::Right => prompt.focused().move_cursor(1),
            KeyCode::Home => prompt.focused().move_home(),
            KeyCode::End => prompt.focused().move_end(),
            KeyCode::Backspace => prompt.focused().backspace(),
            KeyCode::Delete => prompt.focused().delete(),
            KeyCode::Char(ch) => {
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT {
                    prompt.focused().insert(ch);
                }
            }
            _ => {}
        }
        self.modal = Some(Modal::Prompt(prompt));
        Ok(())
    }

    fn submit_prompt(&mut self, prompt: PromptModal) -> Result<()> {
        match prompt.kind {
            PromptKind::Login(carrier) => {
                let id = prompt.value(0).trim().to_string();
                let password = prompt.value(1).to_string();
                if id.is_empty() || password.is_empty() {
                    self.status = "Enter both login id and password".to_string();
                    self.modal = Some(Modal::Prompt(prompt));
                    return Ok(());
                }
                self.start_login_check(carrier, id, password);
            }
            PromptKind::NotificationToken => {
                let token = prompt.value(0).trim();
                self.settings
                    .save_notification_token(token)
                    .context("failed to save notification token")?;
                self.refresh_notifier();
                self.status = if token.is_empty() {
                    "KakaoTalk notifications disabled".to_string()
                } else {
                    "KakaoTalk notifications enabled".to_string()
                };
            }
        }
        Ok(())
    }

    fn start_login_check(&mut self, carrier: Carrier, id: String, password: String) {
        if self.pending_login {
            self.status = "A login check is already running".to_string();
            return;
        }
        let Some(sender) = self.event_tx.clone() else {
            self.status = "Internal error: event channel unavailable".to_string();
            error!("event_channel_missing");
            return;
        };

        self.pending_login = true;
        self.status = format!("Checking {carrier} login {id}…");
        let settings = self.settings.clone();
        let client = self.clients.get(carrier);
        spawn(async move {
            let joined = task::spawn_blocking(move || {
                settings.verify_and_save_account(client.as_ref(), carrier, &id, &password)
            })
            .await;
            let result = match joined {
                Ok(result) => result.map_err(anyhow::Error::from),
                Err(err) => Err(anyhow!("login check task failed: {err}")),
            };
            let _ = sender
                .send(AppEvent::LoginFinished { carrier, result })
                .await;
        });
    }

    fn handle_station_key(&mut self, mut picker: StationPicker, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => {
                self.status = "Station selection unchanged".to_string();
                return Ok(());
            }
            KeyCode::Up | KeyCode::Char('k') => picker.cursor = picker.cursor.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                picker.cursor = (picker.cursor + 1).min(picker.catalog.len().saturating_sub(1));
            }
            KeyCode::Char(' ') => {
                if let Some(checked) = picker.checked.get_mut(picker.cursor) {
                    *checked = !*checked;
                }
            }
            KeyCode::Enter => {
                let selection = picker.selection();
                match self.settings.save_stations(&selection) {
                    Ok(()) => {
                        self.status = format!("Saved {} stations", selection.stations.len());
                        self.stations = selection;
                        return Ok(());
                    }
                    Err(err) => self.status = format!("Not saved: {err}"),
                }
            }
            _ => {}
        }
        self.modal = Some(Modal::Stations(picker));
        Ok(())
    }

    fn handle_option_key(&mut self, mut picker: OptionPicker, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Esc => {
                self.status = "Passenger options unchanged".to_string();
                return Ok(());
            }
            KeyCode::Up | KeyCode::Char('k') => picker.cursor = picker.cursor.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                picker.cursor = (picker.cursor + 1).min(OptionPicker::ROWS - 1);
            }
            KeyCode::Char(' ') => picker.toggle(),
            KeyCode::Enter => {
                self.settings
                    .save_options(&picker.options)
                    .context("failed to save passenger options")?;
                for category in PassengerCategory::ALL {
                    if !picker.options.enables(category) {
                        *self.params.passengers.get_mut(category) = 0;
                    }
                }
                self.options = picker.options;
                self.cursor = self.cursor.min(self.fields().len().saturating_sub(1));
                self.status = "Saved passenger options".to_string();
                return Ok(());
            }
            _ => {}
        }
        self.modal = Some(Modal::Options(picker));
        Ok(())
    }

    fn fields(&self) -> Vec<Field> {
        let mut fields = vec![
            Field::Departure,
            Field::Arrival,
            Field::Date,
            Field::Hour,
            Field::Adults,
        ];
        fields.extend(
            PassengerCategory::ALL
                .into_iter()
                .filter(|category| self.options.enables(*category))
                .map(Field::Discount),
        );
        fields.push(Field::Seat);
        fields.push(Field::AutoPay);
        fields
    }

    fn adjust(&mut self, field: Field, delta: i32) {
        let params = &mut self.params;
        match field {
            Field::Departure => {
                params.departure = cycle_station(&self.stations, &params.departure, delta);
            }
            Field::Arrival => {
                params.arrival = cycle_station(&self.stations, &params.arrival, delta);
            }
            Field::Date => {
                let today = Local::now().date_naive();
                params.date = (params.date + Days::days(i64::from(delta))).max(today);
            }
            Field::Hour => {
                params.hour = (i32::from(params.hour) + delta).rem_euclid(24) as u8;
            }
            Field::Adults => params.passengers.adult = step_count(params.passengers.adult, delta),
            Field::Discount(category) => {
                let count = params.passengers.get_mut(category);
                *count = step_count(*count, delta);
            }
            Field::Seat => {
                params.seat = if delta > 0 {
                    params.seat.next()
                } else {
                    params.seat.next().next().next()
                };
            }
            Field::AutoPay => params.auto_pay = !params.auto_pay,
        }
    }

    fn switch_carrier(&mut self) -> Result<()> {
        if self.runner.is_running() {
            self.status = "Stop the running session before switching carriers".to_string();
            return Ok(());
        }
        let carrier = self.carrier.toggled();
        self.runner = build_runner(&self.settings, &self.clients, &self.runner_options, carrier);
        self.refresh_notifier();
        let (catalog, stations) = self.settings.load_stations(carrier);
        self.carrier = carrier;
        self.catalog = catalog;
        self.stations = stations;
        self.params = self.settings.load_reservation_parameters(carrier);
        self.account = self.settings.load_account(carrier);
        self.progress = None;
        self.log.clear();
        self.status = format!("Switched to {carrier}");
        Ok(())
    }

    fn start_session(&mut self) {
        if self.runner.is_running() {
            self.status = "A session is already running; press s to stop it".to_string();
            return;
        }
        match self.runner.start(self.carrier, self.params.clone()) {
            Ok(receiver) => {
                self.log.clear();
                self.progress = Some(receiver);
                self.status = format!("Searching {}", self.params.describe());
            }
            Err(SessionError::Validation(err)) => {
                self.status = format!("Check the form: {err}");
            }
            Err(err @ SessionError::CredentialsRequired(_)) => {
                self.progress = None;
                self.log = self.runner.log();
                self.status = format!("{err}; press a to log in");
            }
            Err(err) => {
                error!("failed to start session: {err}");
                self.status = format!("Could not start: {err}");
            }
        }
    }

    fn refresh_notifier(&mut self) {
        let notifier = self
            .settings
            .load_notification_token()
            .map(|token| Arc::new(KakaoNotifier::new(token)) as Arc<dyn Notifier>);
        self.runner.set_notifier(notifier);
    }

    fn draw(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(4),
            ])
            .split(frame.size());
        self.render_header(frame, chunks[0]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(44), Constraint::Min(20)])
            .split(chunks[1]);
        self.render_form(frame, body[0]);
        self.render_log(frame, body[1]);
        self.render_status(frame, chunks[2]);

        match &self.modal {
            Some(Modal::Prompt(prompt)) => self.render_prompt(frame, prompt),
            Some(Modal::Stations(picker)) => self.render_station_picker(frame, picker),
            Some(Modal::Options(picker)) => self.render_option_picker(frame, picker),
            None => {}
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let phase = self.runner.phase();
        let phase_color = match phase {
            SessionPhase::Completed => self.theme.success,
            SessionPhase::Failed => self.theme.danger,
            SessionPhase::Cancelled => self.theme.warning,
            SessionPhase::Idle => self.theme.muted,
            _ => self.theme.accent,
        };
        let mut title = vec![
            Span::styled("SRTGo", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" · "),
            Span::styled(phase.label(), Style::default().fg(phase_color)),
        ];
        if self.dry_run {
            title.push(Span::styled(" · dry run", Style::default().fg(self.theme.warning)));
        }

        let selected = Carrier::ALL
            .iter()
            .position(|carrier| *carrier == self.carrier)
            .unwrap_or(0);
        let tabs = Tabs::new(Carrier::ALL.iter().map(|carrier| carrier.as_str()).collect::<Vec<_>>())
            .select(selected)
            .block(Block::default().borders(Borders::ALL).title(Line::from(title)))
            .highlight_style(
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            );
        frame.render_widget(tabs, area);
    }

    fn render_form(&self, frame: &mut Frame, area: Rect) {
        let fields = self.fields();
        let params = &self.params;
        let items: Vec<ListItem> = fields
            .iter()
            .enumerate()
            .map(|(index, field)| {
                let (label, value) = match field {
                    Field::Departure => ("Departure", params.departure.clone()),
                    Field::Arrival => ("Arrival", params.arrival.clone()),
                    Field::Date => ("Date", params.date.format("%Y-%m-%d (%a)").to_string()),
                    Field::Hour => ("From", format!("{:02}:00", params.hour)),
                    Field::Adults => ("Adults", params.passengers.adult.to_string()),
                    Field::Discount(category) => (
                        category_label(*category),
                        params.passengers.get(*category).to_string(),
                    ),
                    Field::Seat => ("Seat", params.seat.to_string()),
                    Field::AutoPay => (
                        "Auto-pay",
                        if params.auto_pay { "on" } else { "off" }.to_string(),
                    ),
                };
                let marker = if index == self.cursor {
                    Span::styled(
                        "▶ ",
                        Style::default()
                            .fg(self.theme.accent)
                            .add_modifier(Modifier::BOLD),
                    )
                } else {
                    Span::raw("  ")
                };
                ListItem::new(Line::from(vec![
                    marker,
                    Span::styled(format!("{label:<15}"), Style::default().fg(self.theme.muted)),
                    Span::styled(
                        value,
                        Style::default()
                            .fg(self.theme.primary_fg)
                            .add_modifier(Modifier::BOLD),
                    ),
                ]))
            })
            .collect();

        let total = params.passengers.total();
        let account = match &self.account {
            Some(account) if account.verified => format!("{} ✓", account.id),
            Some(account) => account.id.clone(),
            None => "not logged in".to_string(),
        };
        let title = format!(
            "{} · {account} · {total}/{MAX_PASSENGERS} pax",
            self.carrier
        );

        let mut list_state = ListState::default();
        list_state.select(Some(self.cursor.min(fields.len().saturating_sub(1))));
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().bg(self.theme.selection_bg));
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_log(&self, frame: &mut Frame, area: Rect) {
        let height = area.height.saturating_sub(2) as usize;
        let start = self.log.len().saturating_sub(height);
        let lines: Vec<Line> = self.log[start..]
            .iter()
            .map(|event| {
                let color = match event.phase {
                    SessionPhase::Completed => self.theme.success,
                    SessionPhase::Failed => self.theme.danger,
                    SessionPhase::Cancelled => self.theme.warning,
                    _ => self.theme.primary_fg,
                };
                Line::from(Span::styled(event.display_line(), Style::default().fg(color)))
            })
            .collect();
        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let help = Line::from(vec![
            Span::styled("↑↓", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" field  "),
            Span::styled("←→", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" change  "),
            Span::styled("Tab", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" carrier  "),
            Span::styled("r", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" start  "),
            Span::styled("s", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" stop  "),
            Span::styled("a", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" login  "),
            Span::styled("e", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" stations  "),
            Span::styled("o", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" options  "),
            Span::styled("n", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" notify  "),
            Span::styled("q", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" quit"),
        ]);
        let paragraph = Paragraph::new(vec![Line::from(self.status.clone()), help])
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_prompt(&self, frame: &mut Frame, prompt: &PromptModal) {
        let height = (prompt.inputs.len() as u16 * 2 + 4).min(frame.size().height);
        let area = centered(frame.size(), 60, height);
        frame.render_widget(Clear, area);

        let mut lines = Vec::new();
        for (index, input) in prompt.inputs.iter().enumerate() {
            let style = if index == prompt.focus {
                Style::default().fg(self.theme.accent)
            } else {
                Style::default().fg(self.theme.muted)
            };
            lines.push(Line::from(Span::styled(input.label, style)));
            lines.push(Line::from(vec![
                Span::styled("> ", Style::default().fg(self.theme.accent)),
                Span::raw(input.display()),
            ]));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" save  "),
            Span::styled("Tab", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" next field  "),
            Span::styled("Esc", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" cancel"),
        ]));

        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(prompt.title()));
        frame.render_widget(paragraph, area);

        if let Some(input) = prompt.inputs.get(prompt.focus) {
            let cursor_x =
                (area.x + 3 + input.cursor as u16).min(area.x + area.width.saturating_sub(2));
            let cursor_y = area.y + 2 + prompt.focus as u16 * 2;
            frame.set_cursor(cursor_x, cursor_y);
        }
    }

    fn render_station_picker(&self, frame: &mut Frame, picker: &StationPicker) {
        let height = (picker.catalog.len() as u16 + 2).min(frame.size().height.saturating_sub(2));
        let area = centered(frame.size(), 32, height);
        frame.render_widget(Clear, area);

        let items: Vec<ListItem> = picker
            .catalog
            .iter()
            .zip(&picker.checked)
            .map(|(station, checked)| {
                let mark = if *checked { "[x] " } else { "[ ] " };
                ListItem::new(format!("{mark}{station}"))
            })
            .collect();
        let mut list_state = ListState::default();
        list_state.select(Some(picker.cursor));
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("{} stations · Space toggle · Enter save", picker.carrier)),
            )
            .highlight_style(Style::default().bg(self.theme.selection_bg));
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_option_picker(&self, frame: &mut Frame, picker: &OptionPicker) {
        let area = centered(frame.size(), 40, OptionPicker::ROWS as u16 + 2);
        frame.render_widget(Clear, area);

        let mut rows: Vec<(String, bool)> = PassengerCategory::ALL
            .into_iter()
            .map(|category| {
                (
                    category_label(category).to_string(),
                    picker.options.enables(category),
                )
            })
            .collect();
        rows.push(("KTX trains only".to_string(), picker.options.ktx_only));
        let items: Vec<ListItem> = rows
            .into_iter()
            .map(|(label, on)| ListItem::new(format!("{} {label}", if on { "[x]" } else { "[ ]" })))
            .collect();

        let mut list_state = ListState::default();
        list_state.select(Some(picker.cursor));
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Passenger options")
                    .title_alignment(Alignment::Center),
            )
            .highlight_style(Style::default().bg(self.theme.selection_bg));
        frame.render_stateful_widget(list, area, &mut list_state);
    }
}

fn build_runner(
    settings: &SettingsRepository,
    clients: &Clients,
    options: &RunnerOptions,
    carrier: Carrier,
) -> ReservationSessionRunner {
    ReservationSessionRunner::new(settings.clone(), clients.get(carrier))
        .with_options(options.clone())
}

/// Next station in the saved selection; the first one when `current` is not part of it.
fn cycle_station(selection: &StationSelection, current: &str, delta: i32) -> String {
    let stations = &selection.stations;
    if stations.is_empty() {
        return current.to_string();
    }
    let next = match stations.iter().position(|station| station == current) {
        Some(index) => (index as i32 + delta).rem_euclid(stations.len() as i32) as usize,
        None => 0,
    };
    stations[next].clone()
}

fn step_count(count: u8, delta: i32) -> u8 {
    (i32::from(count) + delta).clamp(0, MAX_PASSENGERS as i32) as u8
}

fn centered(frame_area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(frame_area.width.saturating_sub(4)).max(24);
    let height = height.min(frame_area.height);
    let x = frame_area.x + frame_area.width.saturating_sub(width) / 2;
    let y = frame_area.y + frame_area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width.min(frame_area.width), height)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}
