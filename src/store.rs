//! Furnace store
//!
//! The store is the single owner of the furnace table for a session. Every
//! operator action and every tick goes through it; after each mutation it
//! snapshots the table to persistence and pushes the changed state to the
//! presentation sink.

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::auth::CredentialCheck;
use crate::clock::Clock;
use crate::error::FurnaceError;
use crate::furnace::heating::{self, TickOutcome};
use crate::furnace::{
    downtime, FurnaceId, FurnaceRecord, FurnaceSettings, FurnaceStatus, FurnaceTable, InputField,
};
use crate::journal::{self, ClearOutcome, FurnaceStats};
use crate::persistence::Persistence;
use crate::presentation::{
    format_hhmmss, format_journal_line, format_mmss, report_heading, PresentationSink, Report,
    ReportSection,
};

pub struct FurnaceStore<S: PresentationSink> {
    records: FurnaceTable,
    settings: FurnaceSettings,
    clock: Box<dyn Clock>,
    persistence: Persistence,
    credentials: Box<dyn CredentialCheck>,
    sink: S,
}

impl<S: PresentationSink> FurnaceStore<S> {
    /// Create a store with every furnace at its defaults
    ///
    /// Nothing is loaded yet; call [`FurnaceStore::load`] once the identity is
    /// known.
    pub fn new(
        settings: FurnaceSettings,
        clock: Box<dyn Clock>,
        persistence: Persistence,
        credentials: Box<dyn CredentialCheck>,
        sink: S,
    ) -> Self {
        let mut store = Self {
            records: FurnaceTable::new(settings.default_sheet_length_mm),
            settings,
            clock,
            persistence,
            credentials,
            sink,
        };
        store.refresh_all();
        store
    }

    /// Restore the signed-in user's saved state over the current table
    ///
    /// Returns the number of furnaces restored. Timers resume from the stored
    /// timestamps on the next tick.
    pub fn load(&mut self) -> usize {
        let restored = self.persistence.load();
        let count = restored.len();
        for (id, record) in restored {
            self.records.replace(id, record);
        }

        if let Some(user) = self.persistence.current_user() {
            info!("Restored {} furnace record(s) for {}", count, user);
        }
        self.refresh_all();
        count
    }

    /// Identity changed: drop the in-memory table and load the new user's
    pub fn reload(&mut self) -> usize {
        self.records = FurnaceTable::new(self.settings.default_sheet_length_mm);
        self.load()
    }

    /// Give a freshly registered user a clean table, journals included
    pub fn register_new_user(&mut self) {
        self.records = FurnaceTable::new(self.settings.default_sheet_length_mm);
        info!("Initialized furnace state for new user");
        self.save();
        self.refresh_all();
    }

    /// Remove the user's saved state and start over with defaults
    ///
    /// # Errors
    /// Returns an error if the storage entry cannot be removed
    pub fn clear_all_user_data(&mut self) -> Result<()> {
        if self.persistence.remove()? {
            info!("Removed all saved furnace data for current user");
        }
        self.records = FurnaceTable::new(self.settings.default_sheet_length_mm);
        self.refresh_all();
        Ok(())
    }

    #[must_use]
    pub fn record(&self, id: FurnaceId) -> &FurnaceRecord {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = (FurnaceId, &FurnaceRecord)> {
        self.records.iter()
    }

    #[must_use]
    pub fn settings(&self) -> &FurnaceSettings {
        &self.settings
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    #[must_use]
    pub fn preference(&self, key: &str) -> Option<String> {
        self.persistence.preference(key)
    }

    pub fn set_preference(&mut self, key: &str, value: &str) {
        self.persistence.set_preference(key, value);
    }

    #[must_use]
    pub fn current_user(&self) -> Option<String> {
        self.persistence.current_user()
    }

    /// Edit an operator parameter
    ///
    /// # Errors
    /// [`FurnaceError::InputsLocked`] while the process runs
    pub fn set_input(&mut self, id: FurnaceId, field: InputField, raw: &str) -> Result<(), FurnaceError> {
        let settings = self.settings;
        let result = self.record_mut(id).apply_input(id, field, raw, &settings);
        match result {
            Ok(()) => {
                debug!("Furnace {}: {:?} set to {:?}", id, field, raw);
                self.commit(id, false);
                Ok(())
            }
            Err(e) => self.reject(e),
        }
    }

    /// Start the heating process
    ///
    /// # Errors
    /// [`FurnaceError::NotReady`] or [`FurnaceError::AlreadyStarted`]
    pub fn start_process(&mut self, id: FurnaceId) -> Result<(), FurnaceError> {
        let now = self.clock.now();
        let window = self.settings.dedup_window_ms;
        match heating::start(id, self.record_mut(id), now, window) {
            Ok(()) => {
                let record = self.record(id);
                info!(
                    "Furnace {}: process started, card {}, {} s per sheet, {} sheet(s)",
                    id,
                    record.card_number,
                    record.heating_duration,
                    record.remaining_sheets
                );
                self.commit(id, true);
                Ok(())
            }
            Err(e) => self.reject(e),
        }
    }

    /// Open a downtime
    ///
    /// # Errors
    /// [`FurnaceError::NotStarted`] or [`FurnaceError::AlreadyInDowntime`]
    pub fn start_downtime(&mut self, id: FurnaceId) -> Result<(), FurnaceError> {
        let now = self.clock.now();
        let window = self.settings.dedup_window_ms;
        match downtime::start(id, self.record_mut(id), now, window) {
            Ok(()) => {
                info!("Furnace {}: downtime started", id);
                self.commit(id, true);
                Ok(())
            }
            Err(e) => self.reject(e),
        }
    }

    /// Close the open downtime
    ///
    /// # Errors
    /// [`FurnaceError::NotInDowntime`]
    pub fn end_downtime(&mut self, id: FurnaceId) -> Result<(), FurnaceError> {
        let now = self.clock.now();
        let window = self.settings.dedup_window_ms;
        match downtime::end(id, self.record_mut(id), now, window) {
            Ok(()) => {
                info!(
                    "Furnace {}: downtime ended, heating paused {} ms this cycle",
                    id,
                    self.record(id).pause_total
                );
                self.commit(id, true);
                Ok(())
            }
            Err(e) => self.reject(e),
        }
    }

    /// Deliver one scheduler tick to a furnace
    ///
    /// Heating furnaces advance their cycle; a furnace in downtime only has
    /// its downtime clock and statistics refreshed.
    pub fn tick(&mut self, id: FurnaceId) -> TickOutcome {
        let now = self.clock.now();
        let window = self.settings.dedup_window_ms;
        let outcome = heating::on_tick(self.record_mut(id), now, window);

        match outcome {
            TickOutcome::SheetDispensed { remaining, next_cycle } => {
                info!(
                    "Furnace {}: sheet dispensed, {} left{}",
                    id,
                    remaining,
                    if next_cycle { "" } else { ", card finished" }
                );
                self.commit(id, true);
            }
            TickOutcome::Exhausted => {
                info!("Furnace {}: heating cycle ended with no sheets left", id);
                self.commit(id, false);
            }
            TickOutcome::Counting { .. } | TickOutcome::Idle => self.refresh(id),
        }
        outcome
    }

    /// Return a furnace to its defaults, keeping its journal
    ///
    /// Without operator confirmation nothing happens. Returns whether the
    /// reset took place.
    pub fn reset(&mut self, id: FurnaceId, confirmed: bool) -> bool {
        if !confirmed {
            debug!("Furnace {}: reset not confirmed", id);
            return false;
        }
        let default_length = self.settings.default_sheet_length_mm;
        self.record_mut(id).reset_live_state(default_length);
        info!("Furnace {}: fields reset", id);
        self.commit(id, false);
        true
    }

    /// Empty a furnace journal after checking the administrator secret
    ///
    /// # Errors
    /// [`FurnaceError::AdminAuthFailed`] when the secret is rejected
    pub fn clear_journal(
        &mut self,
        id: FurnaceId,
        supplied_secret: Option<&str>,
    ) -> Result<ClearOutcome, FurnaceError> {
        let record = self.records.get_mut(id);
        match journal::clear(&mut record.journal, supplied_secret, self.credentials.as_ref()) {
            Ok(ClearOutcome::Cleared { removed }) => {
                info!("Furnace {}: journal cleared ({} entries)", id, removed);
                self.commit(id, true);
                self.sink.notice("Журнал успешно очищен!");
                Ok(ClearOutcome::Cleared { removed })
            }
            Ok(ClearOutcome::Cancelled) => Ok(ClearOutcome::Cancelled),
            Err(e) => {
                warn!("Furnace {}: journal clear refused: {}", id, e);
                self.sink.notice("Неверный пароль администратора!");
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn stats(&self, id: FurnaceId) -> FurnaceStats {
        let record = self.record(id);
        let open = if record.is_downtime {
            record.downtime_start
        } else {
            None
        };
        record.journal.stats(open, self.clock.now_ms())
    }

    #[must_use]
    pub fn heating_time_left(&self, id: FurnaceId) -> u32 {
        heating::time_left(self.record(id), self.clock.now_ms())
    }

    #[must_use]
    pub fn downtime_elapsed_secs(&self, id: FurnaceId) -> u64 {
        downtime::elapsed_secs(self.record(id), self.clock.now_ms())
    }

    #[must_use]
    pub fn status(&self, id: FurnaceId) -> FurnaceStatus {
        self.record(id).status()
    }

    /// Whether the furnace needs a tick source: a heating cycle to count
    /// down or a downtime clock to show
    #[must_use]
    pub fn needs_tick(&self, id: FurnaceId) -> bool {
        let record = self.record(id);
        record.is_process_started && (record.is_downtime || heating::is_cycle_active(record))
    }

    /// Journals of every furnace under their headings
    #[must_use]
    pub fn report(&self) -> Report {
        Report {
            sections: self
                .records
                .iter()
                .map(|(id, record)| ReportSection {
                    furnace: id,
                    heading: report_heading(id),
                    lines: journal_lines(record),
                })
                .collect(),
        }
    }

    fn record_mut(&mut self, id: FurnaceId) -> &mut FurnaceRecord {
        self.records.get_mut(id)
    }

    fn reject<T>(&mut self, e: FurnaceError) -> Result<T, FurnaceError> {
        debug!("Rejected: {}", e);
        self.sink.notice(&e.to_string());
        Err(e)
    }

    /// Persist, then show the new state
    fn commit(&mut self, id: FurnaceId, journal_changed: bool) {
        self.save();
        self.refresh(id);
        if journal_changed {
            self.refresh_journal(id);
            let report = self.report();
            self.sink.report(&report);
        }
    }

    fn save(&self) {
        match self.persistence.save(&self.records, self.clock.now_ms()) {
            Ok(true) => {}
            Ok(false) => debug!("No user signed in, furnace state not saved"),
            Err(e) => warn!("Failed to save furnace state: {:#}", e),
        }
    }

    fn refresh(&mut self, id: FurnaceId) {
        let now_ms = self.clock.now_ms();
        let stats = self.stats(id);
        let record = self.records.get(id);
        let heating = format_mmss(heating::time_left(record, now_ms));
        let downtime = format_hhmmss(downtime::elapsed_secs(record, now_ms));

        self.sink.fields(id, record);
        self.sink.heating_timer(id, &heating);
        self.sink.downtime_timer(id, &downtime);
        self.sink.status(id, record.status());
        self.sink.controls(id, record.controls());
        self.sink.stats(id, stats);
    }

    fn refresh_journal(&mut self, id: FurnaceId) {
        let lines = journal_lines(self.records.get(id));
        self.sink.journal(id, &lines);
    }

    fn refresh_all(&mut self) {
        for id in FurnaceId::ALL {
            self.refresh(id);
            self.refresh_journal(id);
        }
        let report = self.report();
        self.sink.report(&report);
    }
}

fn journal_lines(record: &FurnaceRecord) -> Vec<String> {
    record.journal.iter().map(format_journal_line).collect()
}
