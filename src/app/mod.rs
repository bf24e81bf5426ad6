//! Interactive dashboard
//!
//! Owns the furnace store, the tick scheduler and the terminal. Keyboard
//! input, scheduler ticks and the render interval are multiplexed on one
//! task, so the store is only ever touched from here.

use anyhow::{Context, Result};
use crossterm::{
    cursor::{Hide, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal as RatatuiTerminal};
use std::io::{self, Stdout};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::auth::StaticIdentity;
use crate::colors::{StatusPalette, ThemeMode};
use crate::config::{Config, ThemeConfig};
use crate::error::FurnaceError;
use crate::furnace::{FurnaceId, InputField};
use crate::keybindings::{Action, KeybindingManager};
use crate::persistence::{SELECTED_TAB_KEY, THEME_KEY};
use crate::presentation::PresentationSink;
use crate::scheduler::TickScheduler;
use crate::store::FurnaceStore;
use crate::ui::dashboard::{self, DashboardView, InputMode, Selection};

/// Redraw rate when something changed
const FRAME_INTERVAL: Duration = Duration::from_millis(50);

/// How long one blocking input poll may wait
const INPUT_POLL: Duration = Duration::from_millis(20);

type Backend = CrosstermBackend<Stdout>;

pub struct App {
    store: FurnaceStore<DashboardView>,
    scheduler: TickScheduler,
    ticks: UnboundedReceiver<FurnaceId>,
    identity: StaticIdentity,
    keybindings: KeybindingManager,
    theme: ThemeConfig,
    palette: StatusPalette,
    selected: FurnaceId,
    focus: InputField,
    mode: InputMode,
    should_quit: bool,
    dirty: bool,
}

impl App {
    /// Wrap a loaded store
    ///
    /// `identity` must be the handle the store's persistence reads, so that
    /// switching operators from the dashboard changes the storage key.
    ///
    /// Must be called inside a tokio runtime: furnaces that were running when
    /// the state was saved are caught up and get their tick sources here.
    #[must_use]
    pub fn new(store: FurnaceStore<DashboardView>, identity: StaticIdentity, config: &Config) -> Self {
        let (scheduler, ticks) = TickScheduler::new(config.tick_interval());

        let selected = store
            .preference(SELECTED_TAB_KEY)
            .and_then(|tab| tab.parse::<FurnaceId>().ok())
            .unwrap_or(FurnaceId::Rp2);
        let mode = store
            .preference(THEME_KEY)
            .and_then(|theme| ThemeMode::parse(&theme))
            .unwrap_or(config.theme.mode);

        let mut app = Self {
            store,
            scheduler,
            ticks,
            identity,
            keybindings: KeybindingManager::from_config(&config.keybindings),
            theme: config.theme.clone(),
            palette: StatusPalette::from_theme(&config.theme, mode),
            selected,
            focus: InputField::SheetLength,
            mode: InputMode::Normal,
            should_quit: false,
            dirty: true,
        };
        app.resume_timers();
        app
    }

    #[must_use]
    pub fn store(&self) -> &FurnaceStore<DashboardView> {
        &self.store
    }

    #[must_use]
    pub fn selected(&self) -> FurnaceId {
        self.selected
    }

    #[must_use]
    pub fn focus(&self) -> InputField {
        self.focus
    }

    #[must_use]
    pub fn mode(&self) -> &InputMode {
        &self.mode
    }

    #[must_use]
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    #[must_use]
    pub fn palette(&self) -> &StatusPalette {
        &self.palette
    }

    #[must_use]
    pub fn is_ticking(&self, id: FurnaceId) -> bool {
        self.scheduler.is_active(id)
    }

    /// Sign in as `user` and load their furnaces, or sign out when the name
    /// is blank
    ///
    /// Signing out keeps the current table on screen; it is just no longer
    /// saved.
    pub fn switch_user(&mut self, user: &str) {
        let user = user.trim();
        if user.is_empty() {
            self.identity.sign_out();
            info!("Operator signed out");
            self.store
                .sink_mut()
                .notice("Выход выполнен, данные не сохраняются");
        } else {
            self.identity.sign_in(user);
            let restored = self.store.reload();
            info!("Operator {} signed in, {} furnace(s) restored", user, restored);
            self.resume_timers();
        }
        self.dirty = true;
    }

    /// Run the dashboard until the operator quits
    ///
    /// # Errors
    /// Returns an error if terminal setup, drawing or teardown fails
    pub async fn run(&mut self) -> Result<()> {
        enable_raw_mode().context(
            "Failed to enable raw mode. Ensure you're running in a proper terminal emulator.",
        )?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, Hide).context("Failed to enter alternate screen")?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal =
            RatatuiTerminal::new(backend).context("Failed to create terminal backend")?;

        info!("Dashboard started");
        let result = self.event_loop(&mut terminal).await;

        // Restore the terminal even if the loop failed
        let restore = vec![
            disable_raw_mode().context("Failed to disable raw mode"),
            execute!(terminal.backend_mut(), LeaveAlternateScreen, Show)
                .context("Failed to leave alternate screen"),
            terminal.show_cursor().context("Failed to show cursor"),
        ];
        self.scheduler.shutdown();

        info!("Dashboard shutdown complete");
        combine_teardown(result, restore)
    }

    async fn event_loop(&mut self, terminal: &mut RatatuiTerminal<Backend>) -> Result<()> {
        let mut render_interval = interval(FRAME_INTERVAL);
        render_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.should_quit {
            tokio::select! {
                Ok(Ok(has_event)) = tokio::task::spawn_blocking(|| event::poll(INPUT_POLL)) => {
                    if has_event {
                        match event::read() {
                            Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => {
                                self.handle_key(key);
                            }
                            Ok(Event::Resize(_, _)) => self.dirty = true,
                            _ => {}
                        }
                    }
                }

                Some(id) = self.ticks.recv() => {
                    self.on_tick(id);
                }

                _ = render_interval.tick() => {
                    if self.dirty {
                        let user = self.store.current_user();
                        let selection = Selection {
                            furnace: self.selected,
                            focus: self.focus,
                            mode: &self.mode,
                            user: user.as_deref(),
                        };
                        let view = self.store.sink();
                        let palette = &self.palette;
                        terminal.draw(|f| dashboard::render(f, view, selection, palette))?;
                        self.dirty = false;
                    }
                }
            }
        }
        Ok(())
    }

    /// Catch up furnaces that kept running while nobody was watching and
    /// give them tick sources
    fn resume_timers(&mut self) {
        for id in FurnaceId::ALL {
            if self.store.needs_tick(id) {
                let outcome = self.store.tick(id);
                debug!("Furnace {} resumed: {:?}", id, outcome);
            }
        }
        self.scheduler.sync(&self.store);
    }

    /// Apply one scheduler tick
    pub fn on_tick(&mut self, id: FurnaceId) {
        self.store.tick(id);
        self.scheduler.sync(&self.store);
        self.dirty = true;
    }

    /// Route a key press according to the current mode
    pub fn handle_key(&mut self, key: KeyEvent) {
        self.dirty = true;

        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        match std::mem::take(&mut self.mode) {
            InputMode::Normal => {
                self.store.sink_mut().clear_notice();
                if let Some(action) = self.keybindings.get_action(key.code, key.modifiers) {
                    self.perform(action);
                }
            }
            InputMode::Editing { field, mut buffer } => match key.code {
                KeyCode::Enter => {
                    // Rejections are already shown as a notice
                    let _ = self.store.set_input(self.selected, field, &buffer);
                }
                KeyCode::Esc => {}
                KeyCode::Backspace => {
                    buffer.pop();
                    self.mode = InputMode::Editing { field, buffer };
                }
                KeyCode::Char(c) => {
                    buffer.push(c);
                    self.mode = InputMode::Editing { field, buffer };
                }
                _ => self.mode = InputMode::Editing { field, buffer },
            },
            InputMode::ConfirmReset => {
                let confirmed = matches!(key.code, KeyCode::Char('y' | 'Y' | 'д' | 'Д'));
                self.store.reset(self.selected, confirmed);
            }
            InputMode::AdminPrompt { mut buffer } => match key.code {
                KeyCode::Enter => {
                    let _ = self.store.clear_journal(self.selected, Some(&buffer));
                }
                KeyCode::Esc => {
                    let _ = self.store.clear_journal(self.selected, None);
                }
                KeyCode::Backspace => {
                    buffer.pop();
                    self.mode = InputMode::AdminPrompt { buffer };
                }
                KeyCode::Char(c) => {
                    buffer.push(c);
                    self.mode = InputMode::AdminPrompt { buffer };
                }
                _ => self.mode = InputMode::AdminPrompt { buffer },
            },
            InputMode::UserPrompt { mut buffer } => match key.code {
                KeyCode::Enter => self.switch_user(&buffer),
                KeyCode::Esc => {}
                KeyCode::Backspace => {
                    buffer.pop();
                    self.mode = InputMode::UserPrompt { buffer };
                }
                KeyCode::Char(c) => {
                    buffer.push(c);
                    self.mode = InputMode::UserPrompt { buffer };
                }
                _ => self.mode = InputMode::UserPrompt { buffer },
            },
            InputMode::Report => {
                let action = self.keybindings.get_action(key.code, key.modifiers);
                match (key.code, action) {
                    (_, Some(Action::Quit)) => self.should_quit = true,
                    (KeyCode::Esc, _) | (_, Some(Action::ToggleReport)) => {}
                    _ => self.mode = InputMode::Report,
                }
            }
        }

        self.scheduler.sync(&self.store);
    }

    fn perform(&mut self, action: Action) {
        let id = self.selected;
        match action {
            Action::Quit => self.should_quit = true,
            Action::NextFurnace => self.select(step(id, 1)),
            Action::PrevFurnace => self.select(step(id, FurnaceId::ALL.len() - 1)),
            Action::SelectFurnace(index) => {
                if let Some(next) = FurnaceId::ALL.get(index) {
                    self.select(*next);
                }
            }
            Action::NextField => self.focus = step_field(self.focus, 1),
            Action::PrevField => self.focus = step_field(self.focus, InputField::ALL.len() - 1),
            Action::EditField => {
                let record = self.store.record(id);
                if record.controls().inputs_enabled {
                    self.mode = InputMode::Editing {
                        field: self.focus,
                        buffer: record.input_value(self.focus),
                    };
                } else {
                    let message = FurnaceError::InputsLocked(id).to_string();
                    self.store.sink_mut().notice(&message);
                }
            }
            Action::StartProcess => {
                let _ = self.store.start_process(id);
            }
            Action::StartDowntime => {
                let _ = self.store.start_downtime(id);
            }
            Action::EndDowntime => {
                let _ = self.store.end_downtime(id);
            }
            Action::ResetFields => self.mode = InputMode::ConfirmReset,
            Action::ClearJournal => {
                self.mode = InputMode::AdminPrompt {
                    buffer: String::new(),
                };
            }
            Action::ToggleReport => self.mode = InputMode::Report,
            Action::ToggleTheme => {
                let mode = self.palette.mode.toggled();
                self.palette = StatusPalette::from_theme(&self.theme, mode);
                self.store.set_preference(THEME_KEY, mode.as_str());
                debug!("Theme switched to {}", mode);
            }
            Action::SwitchUser => {
                self.mode = InputMode::UserPrompt {
                    buffer: String::new(),
                };
            }
        }
    }

    fn select(&mut self, id: FurnaceId) {
        if self.selected != id {
            self.selected = id;
            self.store.set_preference(SELECTED_TAB_KEY, id.as_str());
        }
    }
}

/// The loop's own error wins; restore failures behind it are only logged
fn combine_teardown(result: Result<()>, restore: Vec<Result<()>>) -> Result<()> {
    let mut failures = restore.into_iter().filter_map(Result::err);
    match result {
        Err(e) => {
            for failure in failures {
                warn!("Terminal restore failed: {:#}", failure);
            }
            Err(e)
        }
        Ok(()) => match failures.next() {
            Some(first) => {
                for failure in failures {
                    warn!("Terminal restore failed: {:#}", failure);
                }
                Err(first)
            }
            None => Ok(()),
        },
    }
}

fn step(id: FurnaceId, by: usize) -> FurnaceId {
    let all = FurnaceId::ALL;
    all[(id.index() + by) % all.len()]
}

fn step_field(field: InputField, by: usize) -> InputField {
    let all = InputField::ALL;
    let current = all.iter().position(|f| *f == field).unwrap_or_default();
    all[(current + by) % all.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{IdentityProvider, SharedSecret, StaticIdentity};
    use crate::clock::ManualClock;
    use crate::journal::JournalMessage;
    use crate::persistence::{KeyValueStore, MemoryStore, Persistence};

    fn app_with(clock: &ManualClock, kv: &MemoryStore, identity: &StaticIdentity) -> App {
        let config = Config::default();
        let store = FurnaceStore::new(
            config.furnace_settings(),
            Box::new(clock.clone()),
            Persistence::new(Box::new(kv.clone()), Box::new(identity.clone())),
            Box::new(SharedSecret::new("admin")),
            DashboardView::new(),
        );
        App::new(store, identity.clone(), &config)
    }

    fn app(clock: &ManualClock) -> App {
        let identity = StaticIdentity::new(Some("op".to_string()));
        app_with(clock, &MemoryStore::new(), &identity)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn edit(app: &mut App, field: InputField, value: &str) {
        while app.focus() != field {
            press(app, KeyCode::Down);
        }
        press(app, KeyCode::Enter);
        for _ in 0..8 {
            press(app, KeyCode::Backspace);
        }
        type_text(app, value);
        press(app, KeyCode::Enter);
    }

    #[tokio::test]
    async fn test_navigation_wraps() {
        let clock = ManualClock::default();
        let mut app = app(&clock);
        assert_eq!(app.selected(), FurnaceId::Rp2);
        press(&mut app, KeyCode::Left);
        assert_eq!(app.selected(), FurnaceId::Rp4);
        press(&mut app, KeyCode::Right);
        assert_eq!(app.selected(), FurnaceId::Rp2);
        press(&mut app, KeyCode::Char('3'));
        assert_eq!(app.selected(), FurnaceId::Rp4);
        press(&mut app, KeyCode::Up);
        assert_eq!(app.focus(), InputField::SheetsInCard);
    }

    #[tokio::test]
    async fn test_edit_and_start_from_keyboard() {
        let clock = ManualClock::default();
        let mut app = app(&clock);

        edit(&mut app, InputField::SheetLength, "800");
        edit(&mut app, InputField::SheetThickness, "10");
        edit(&mut app, InputField::HeatingTime, "2");
        edit(&mut app, InputField::CardNumber, "K-3");
        edit(&mut app, InputField::SheetsInCard, "2");
        press(&mut app, KeyCode::Char('s'));

        let record = app.store().record(FurnaceId::Rp2);
        assert!(record.is_process_started);
        assert_eq!(record.card_number, "K-3");
        assert_eq!(record.heating_duration, 15);

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.mode(), &InputMode::Normal);
        assert!(app.store().sink().current_notice().is_some());
    }

    #[tokio::test]
    async fn test_reset_needs_confirmation() {
        let clock = ManualClock::default();
        let mut app = app(&clock);
        edit(&mut app, InputField::CardNumber, "K-1");

        press(&mut app, KeyCode::Char('r'));
        assert_eq!(app.mode(), &InputMode::ConfirmReset);
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.store().record(FurnaceId::Rp2).card_number, "K-1");

        press(&mut app, KeyCode::Char('r'));
        press(&mut app, KeyCode::Char('y'));
        assert_eq!(app.store().record(FurnaceId::Rp2).card_number, "");
    }

    #[tokio::test]
    async fn test_admin_prompt_clears_journal() {
        let clock = ManualClock::default();
        let mut app = app(&clock);
        edit(&mut app, InputField::SheetLength, "800");
        edit(&mut app, InputField::SheetThickness, "10");
        edit(&mut app, InputField::HeatingTime, "2");
        edit(&mut app, InputField::CardNumber, "K-3");
        edit(&mut app, InputField::SheetsInCard, "2");
        press(&mut app, KeyCode::Char('s'));
        let journal = &app.store().record(FurnaceId::Rp2).journal;
        assert_eq!(journal.entries()[0].message, JournalMessage::ProcessStarted);

        app.handle_key(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::CONTROL));
        type_text(&mut app, "wrong");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.store().record(FurnaceId::Rp2).journal.len(), 1);

        app.handle_key(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::CONTROL));
        type_text(&mut app, "admin");
        press(&mut app, KeyCode::Enter);
        assert!(app.store().record(FurnaceId::Rp2).journal.is_empty());
        assert_eq!(
            app.store().sink().current_notice(),
            Some("Журнал успешно очищен!")
        );
    }

    #[tokio::test]
    async fn test_ctrl_c_quits_from_any_mode() {
        let clock = ManualClock::default();
        let mut app = app(&clock);
        press(&mut app, KeyCode::Char('p'));
        assert_eq!(app.mode(), &InputMode::Report);
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit());
    }

    #[tokio::test]
    async fn test_selected_furnace_is_restored() {
        let clock = ManualClock::default();
        let kv = MemoryStore::new();
        let identity = StaticIdentity::new(Some("op".to_string()));

        let mut first = app_with(&clock, &kv, &identity);
        press(&mut first, KeyCode::Char('3'));
        assert_eq!(kv.get(SELECTED_TAB_KEY).unwrap().as_deref(), Some("rp4"));

        let second = app_with(&clock, &kv, &identity);
        assert_eq!(second.selected(), FurnaceId::Rp4);

        kv.set(SELECTED_TAB_KEY, "rp9").unwrap();
        assert_eq!(app_with(&clock, &kv, &identity).selected(), FurnaceId::Rp2);
    }

    #[tokio::test]
    async fn test_theme_toggle_is_persisted() {
        let clock = ManualClock::default();
        let kv = MemoryStore::new();
        let identity = StaticIdentity::new(Some("op".to_string()));

        let mut first = app_with(&clock, &kv, &identity);
        assert_eq!(first.palette().mode, ThemeMode::Light);
        press(&mut first, KeyCode::Char('t'));
        assert_eq!(first.palette().mode, ThemeMode::Dark);
        assert_eq!(kv.get(THEME_KEY).unwrap().as_deref(), Some("dark"));

        let second = app_with(&clock, &kv, &identity);
        assert_eq!(second.palette().mode, ThemeMode::Dark);
        assert_eq!(second.palette(), &StatusPalette::from_theme(&ThemeConfig::default(), ThemeMode::Dark));
    }

    #[tokio::test]
    async fn test_switch_user_reloads_and_rearms_timers() {
        let clock = ManualClock::default();
        let kv = MemoryStore::new();
        let identity = StaticIdentity::new(Some("alice".to_string()));
        let mut app = app_with(&clock, &kv, &identity);

        edit(&mut app, InputField::SheetLength, "800");
        edit(&mut app, InputField::SheetThickness, "10");
        edit(&mut app, InputField::HeatingTime, "2");
        edit(&mut app, InputField::CardNumber, "K-3");
        edit(&mut app, InputField::SheetsInCard, "2");
        press(&mut app, KeyCode::Char('s'));
        assert!(app.is_ticking(FurnaceId::Rp2));

        press(&mut app, KeyCode::Char('u'));
        type_text(&mut app, "bob");
        press(&mut app, KeyCode::Enter);
        assert_eq!(identity.current_user().as_deref(), Some("bob"));
        assert!(!app.store().record(FurnaceId::Rp2).is_process_started);
        assert!(!app.is_ticking(FurnaceId::Rp2));

        clock.advance_secs(5);
        press(&mut app, KeyCode::Char('u'));
        type_text(&mut app, "alice");
        press(&mut app, KeyCode::Enter);
        let record = app.store().record(FurnaceId::Rp2);
        assert!(record.is_process_started);
        assert_eq!(record.card_number, "K-3");
        assert!(app.is_ticking(FurnaceId::Rp2));
        assert_eq!(app.store().heating_time_left(FurnaceId::Rp2), 10);
    }

    #[tokio::test]
    async fn test_blank_user_signs_out_and_keeps_table() {
        let clock = ManualClock::default();
        let kv = MemoryStore::new();
        let identity = StaticIdentity::new(Some("op".to_string()));
        let mut app = app_with(&clock, &kv, &identity);
        edit(&mut app, InputField::CardNumber, "K-8");

        press(&mut app, KeyCode::Char('u'));
        press(&mut app, KeyCode::Enter);
        assert_eq!(identity.current_user(), None);
        assert_eq!(app.store().record(FurnaceId::Rp2).card_number, "K-8");

        edit(&mut app, InputField::CardNumber, "K-9");
        let saved = kv.get("furnaceData_op").unwrap().unwrap();
        assert!(saved.contains("K-8"));
        assert!(!saved.contains("K-9"));
    }

    #[test]
    fn test_teardown_keeps_loop_error_and_reports_restore_failure() {
        let loop_failed = combine_teardown(
            Err(anyhow::anyhow!("draw failed")),
            vec![Err(anyhow::anyhow!("raw mode")), Ok(())],
        );
        assert_eq!(loop_failed.unwrap_err().to_string(), "draw failed");

        let restore_failed = combine_teardown(
            Ok(()),
            vec![Ok(()), Err(anyhow::anyhow!("alternate screen")), Err(anyhow::anyhow!("cursor"))],
        );
        assert_eq!(restore_failed.unwrap_err().to_string(), "alternate screen");

        assert!(combine_teardown(Ok(()), vec![Ok(()), Ok(())]).is_ok());
    }
}
