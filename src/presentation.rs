//! Presentation sink
//!
//! The store pushes every visible change through a [`PresentationSink`]. The
//! terminal dashboard is one implementation; [`NullSink`] discards everything
//! for headless use.

use chrono::{Local, TimeZone};
use std::fmt;

use crate::furnace::{ControlState, FurnaceId, FurnaceRecord, FurnaceStatus};
use crate::journal::{FurnaceStats, JournalEntry};

const JOURNAL_TIME_FORMAT: &str = "%d.%m.%Y, %H:%M:%S";

/// Receiver of display updates
///
/// Every method has an empty default so a sink only implements what it shows.
#[allow(unused_variables)]
pub trait PresentationSink {
    /// Parameter values and counters of a furnace
    fn fields(&mut self, id: FurnaceId, record: &FurnaceRecord) {}

    /// Heating countdown, `MM:SS`
    fn heating_timer(&mut self, id: FurnaceId, text: &str) {}

    /// Downtime clock, `HH:MM:SS`
    fn downtime_timer(&mut self, id: FurnaceId, text: &str) {}

    fn status(&mut self, id: FurnaceId, status: FurnaceStatus) {}

    fn controls(&mut self, id: FurnaceId, controls: ControlState) {}

    fn stats(&mut self, id: FurnaceId, stats: FurnaceStats) {}

    /// Formatted journal of one furnace, oldest first
    fn journal(&mut self, id: FurnaceId, lines: &[String]) {}

    /// Combined journal of every furnace
    fn report(&mut self, report: &Report) {}

    /// One-off message for the operator
    fn notice(&mut self, text: &str) {}
}

/// Sink that shows nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl PresentationSink for NullSink {}

/// Journal of one furnace inside a [`Report`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    pub furnace: FurnaceId,
    pub heading: String,
    pub lines: Vec<String>,
}

/// Journals of all furnaces, in furnace order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Report {
    pub sections: Vec<ReportSection>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}", section.heading)?;
            for line in &section.lines {
                writeln!(f, "{line}")?;
            }
        }
        Ok(())
    }
}

/// `MM:SS`; minutes keep growing past 99
#[must_use]
pub fn format_mmss(total_secs: u32) -> String {
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// `HH:MM:SS`
#[must_use]
pub fn format_hhmmss(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Journal line in the operator's local time zone
#[must_use]
pub fn format_journal_line(entry: &JournalEntry) -> String {
    format_journal_line_in(entry, &Local)
}

/// `<dd.mm.yyyy, HH:MM:SS> - <message>[ (Карточка: <card>)]`
#[must_use]
pub fn format_journal_line_in<Tz>(entry: &JournalEntry, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let time = entry
        .timestamp
        .with_timezone(tz)
        .format(JOURNAL_TIME_FORMAT);
    match entry.card_number.as_deref() {
        Some(card) if !card.is_empty() => {
            format!("{time} - {} (Карточка: {card})", entry.message)
        }
        _ => format!("{time} - {}", entry.message),
    }
}

/// Heading used for a furnace in the report
#[must_use]
pub fn report_heading(id: FurnaceId) -> String {
    format!("Печь {}", id.label())
}
