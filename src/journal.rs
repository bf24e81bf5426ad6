//! Per-furnace event journal
//!
//! The journal is append-only: entries are only ever pushed, and the whole
//! log can be emptied through [`clear`] once an administrator secret checks
//! out. Statistics are derived by replaying it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::CredentialCheck;
use crate::error::FurnaceError;

/// Identical entries closer together than this are treated as one
pub const DEDUP_WINDOW_MS: i64 = 1500;

const MS_PER_MINUTE: i64 = 60_000;

/// Kind of journal event
///
/// The Russian aliases accept journals written by the older browser client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JournalMessage {
    #[serde(alias = "Запуск процесса")]
    ProcessStarted,
    #[serde(alias = "Выдан лист")]
    SheetDispensed,
    #[serde(alias = "Начало простоя")]
    DowntimeStarted,
    #[serde(alias = "Завершение простоя")]
    DowntimeEnded,
}

impl JournalMessage {
    /// Operator-facing text
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            JournalMessage::ProcessStarted => "Запуск процесса",
            JournalMessage::SheetDispensed => "Выдан лист",
            JournalMessage::DowntimeStarted => "Начало простоя",
            JournalMessage::DowntimeEnded => "Завершение простоя",
        }
    }
}

impl fmt::Display for JournalMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub message: JournalMessage,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub is_downtime_start: Option<bool>,
}

impl JournalEntry {
    fn same_event(&self, message: JournalMessage, card: Option<&str>, downtime: Option<bool>) -> bool {
        self.message == message
            && self.card_number.as_deref() == card
            && self.is_downtime_start == downtime
    }
}

/// Totals replayed from a journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FurnaceStats {
    pub total_sheets: usize,
    pub total_downtime_minutes: i64,
}

/// Result of an administrator clear request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared { removed: usize },
    Cancelled,
}

/// Ordered list of journal entries, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    /// Append an entry unless it repeats the last one
    ///
    /// Only the last entry is compared: same message, card and downtime flag
    /// within `window_ms` of `now` is dropped. Returns whether an entry was
    /// added.
    pub fn append(
        &mut self,
        now: DateTime<Utc>,
        message: JournalMessage,
        card_number: Option<String>,
        is_downtime_start: Option<bool>,
        window_ms: i64,
    ) -> bool {
        if let Some(last) = self.entries.last() {
            let gap = (now - last.timestamp).num_milliseconds().abs();
            if gap < window_ms
                && last.same_event(message, card_number.as_deref(), is_downtime_start)
            {
                return false;
            }
        }

        self.entries.push(JournalEntry {
            timestamp: now,
            message,
            card_number,
            is_downtime_start,
        });
        true
    }

    #[must_use]
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &JournalEntry> {
        self.entries.iter()
    }

    /// Replay the journal into totals
    ///
    /// `open_downtime_start` is the start of a downtime that is still
    /// running; it counts up to `now_ms`.
    #[must_use]
    pub fn stats(&self, open_downtime_start: Option<i64>, now_ms: i64) -> FurnaceStats {
        let mut stats = FurnaceStats::default();
        let mut pending_start: Option<i64> = None;

        for entry in &self.entries {
            match entry.message {
                JournalMessage::SheetDispensed => stats.total_sheets += 1,
                JournalMessage::DowntimeStarted => {
                    pending_start = Some(entry.timestamp.timestamp_millis());
                }
                JournalMessage::DowntimeEnded => {
                    if let Some(start) = pending_start.take() {
                        let end = entry.timestamp.timestamp_millis();
                        stats.total_downtime_minutes += (end - start).div_euclid(MS_PER_MINUTE);
                    }
                }
                JournalMessage::ProcessStarted => {}
            }
        }

        if let Some(start) = open_downtime_start {
            stats.total_downtime_minutes += (now_ms - start).div_euclid(MS_PER_MINUTE).max(0);
        }

        stats
    }

    fn take_all(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }
}

impl<'a> IntoIterator for &'a Journal {
    type Item = &'a JournalEntry;
    type IntoIter = std::slice::Iter<'a, JournalEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Empty a journal after checking the administrator secret
///
/// `supplied` is `None` when the operator dismissed the prompt; that is a
/// silent no-op.
///
/// # Errors
/// Returns [`FurnaceError::AdminAuthFailed`] when the secret is rejected; the
/// journal is left untouched.
pub fn clear(
    journal: &mut Journal,
    supplied: Option<&str>,
    credentials: &dyn CredentialCheck,
) -> Result<ClearOutcome, FurnaceError> {
    let Some(secret) = supplied else {
        return Ok(ClearOutcome::Cancelled);
    };
    if !credentials.verify(secret) {
        return Err(FurnaceError::AdminAuthFailed);
    }
    Ok(ClearOutcome::Cleared {
        removed: journal.take_all(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SharedSecret;
    use chrono::{Duration, TimeZone};

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_704_067_200_000 + ms).unwrap()
    }

    fn card() -> Option<String> {
        Some("K-1".to_string())
    }

    #[test]
    fn test_dedup_within_window() {
        let mut journal = Journal::default();
        assert!(journal.append(at(0), JournalMessage::SheetDispensed, card(), None, DEDUP_WINDOW_MS));
        assert!(!journal.append(at(1400), JournalMessage::SheetDispensed, card(), None, DEDUP_WINDOW_MS));
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn test_no_dedup_outside_window() {
        let mut journal = Journal::default();
        journal.append(at(0), JournalMessage::SheetDispensed, card(), None, DEDUP_WINDOW_MS);
        journal.append(at(1600), JournalMessage::SheetDispensed, card(), None, DEDUP_WINDOW_MS);
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn test_dedup_only_checks_last_entry() {
        let mut journal = Journal::default();
        journal.append(at(0), JournalMessage::DowntimeStarted, None, Some(true), DEDUP_WINDOW_MS);
        journal.append(at(100), JournalMessage::DowntimeEnded, None, Some(false), DEDUP_WINDOW_MS);
        journal.append(at(200), JournalMessage::DowntimeStarted, None, Some(true), DEDUP_WINDOW_MS);
        assert_eq!(journal.len(), 3);
    }

    #[test]
    fn test_different_card_is_not_a_duplicate() {
        let mut journal = Journal::default();
        journal.append(at(0), JournalMessage::ProcessStarted, card(), None, DEDUP_WINDOW_MS);
        journal.append(at(10), JournalMessage::ProcessStarted, Some("K-2".into()), None, DEDUP_WINDOW_MS);
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn test_stats_paired_downtime() {
        let mut journal = Journal::default();
        journal.append(at(0), JournalMessage::DowntimeStarted, None, Some(true), DEDUP_WINDOW_MS);
        journal.append(at(300_000), JournalMessage::DowntimeEnded, None, Some(false), DEDUP_WINDOW_MS);

        let stats = journal.stats(None, at(400_000).timestamp_millis());
        assert_eq!(stats.total_downtime_minutes, 5);
        assert_eq!(stats.total_sheets, 0);
    }

    #[test]
    fn test_stats_counts_sheets_and_open_downtime() {
        let mut journal = Journal::default();
        journal.append(at(0), JournalMessage::ProcessStarted, card(), None, DEDUP_WINDOW_MS);
        journal.append(at(15_000), JournalMessage::SheetDispensed, card(), None, DEDUP_WINDOW_MS);
        journal.append(at(30_000), JournalMessage::SheetDispensed, card(), None, DEDUP_WINDOW_MS);
        journal.append(at(40_000), JournalMessage::DowntimeStarted, None, Some(true), DEDUP_WINDOW_MS);

        let now = at(40_000) + Duration::minutes(3) + Duration::seconds(59);
        let stats = journal.stats(Some(at(40_000).timestamp_millis()), now.timestamp_millis());
        assert_eq!(stats.total_sheets, 2);
        // the open start is not double counted
        assert_eq!(stats.total_downtime_minutes, 3);
    }

    #[test]
    fn test_stats_unmatched_end_is_ignored() {
        let mut journal = Journal::default();
        journal.append(at(0), JournalMessage::DowntimeEnded, None, Some(false), DEDUP_WINDOW_MS);
        assert_eq!(journal.stats(None, at(600_000).timestamp_millis()).total_downtime_minutes, 0);
    }

    #[test]
    fn test_clear_requires_secret() {
        let secret = SharedSecret::new("letmein");
        let mut journal = Journal::default();
        journal.append(at(0), JournalMessage::ProcessStarted, card(), None, DEDUP_WINDOW_MS);

        assert_eq!(clear(&mut journal, None, &secret), Ok(ClearOutcome::Cancelled));
        assert_eq!(
            clear(&mut journal, Some("wrong"), &secret),
            Err(FurnaceError::AdminAuthFailed)
        );
        assert_eq!(journal.len(), 1);

        assert_eq!(
            clear(&mut journal, Some("letmein"), &secret),
            Ok(ClearOutcome::Cleared { removed: 1 })
        );
        assert!(journal.is_empty());
    }

    #[test]
    fn test_reads_legacy_entries() {
        let json = r#"[{"timestamp":"2024-01-01T08:00:00.000Z","message":"Выдан лист","cardNumber":"K-9","isDowntimeStart":null}]"#;
        let journal: Journal = serde_json::from_str(json).unwrap();
        assert_eq!(journal.entries()[0].message, JournalMessage::SheetDispensed);
        assert_eq!(journal.entries()[0].card_number.as_deref(), Some("K-9"));
    }
}
