//! Heating cycle timer
//!
//! A cycle is one sheet's heating interval. Its progress is never stored as a
//! countdown: time left is always recomputed from `heating_start`, the closed
//! pauses in `pause_total` and any pause still open, so a restart after a long
//! gap picks up exactly where wall-clock time says it should.

use chrono::{DateTime, Utc};

use super::{FurnaceId, FurnaceRecord};
use crate::error::FurnaceError;
use crate::journal::JournalMessage;

const SECONDS_PER_MINUTE: f64 = 60.0;
const MS_PER_SECOND: i64 = 1000;

/// What a tick did to a furnace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No heating cycle is counting (not started, in downtime, or finished)
    Idle,
    /// The cycle is still running
    Counting { seconds_left: u32 },
    /// A sheet left the furnace; `next_cycle` says whether another one began
    SheetDispensed { remaining: u32, next_cycle: bool },
    /// The cycle expired with no sheets left on the card
    Exhausted,
}

/// Heating time for one sheet, in seconds
///
/// `round(thickness * factor / sheets_in_furnace * 60)`; undefined for an
/// empty furnace.
#[must_use]
pub fn compute_duration(thickness: u32, factor: f64, sheets_in_furnace: u32) -> Option<u32> {
    if sheets_in_furnace == 0 {
        return None;
    }
    let minutes = f64::from(thickness) * factor / f64::from(sheets_in_furnace);
    let seconds = (minutes * SECONDS_PER_MINUTE).round();
    if !seconds.is_finite() || seconds < 0.0 {
        return Some(0);
    }
    if seconds >= f64::from(u32::MAX) {
        return Some(u32::MAX);
    }
    Some(seconds as u32)
}

/// Start the process and its first heating cycle
///
/// # Errors
/// [`FurnaceError::AlreadyStarted`] if running, [`FurnaceError::NotReady`] if
/// a parameter is missing. The record is unchanged on error.
pub fn start(
    id: FurnaceId,
    record: &mut FurnaceRecord,
    now: DateTime<Utc>,
    dedup_window_ms: i64,
) -> Result<(), FurnaceError> {
    if record.is_process_started {
        return Err(FurnaceError::AlreadyStarted(id));
    }
    if !record.is_ready_to_start() {
        return Err(FurnaceError::NotReady(id));
    }

    record.is_process_started = true;
    begin_cycle(record, now.timestamp_millis());
    let card = Some(record.card_number.clone());
    record.journal.append(
        now,
        JournalMessage::ProcessStarted,
        card,
        None,
        dedup_window_ms,
    );
    Ok(())
}

/// Whether a cycle is running or paused
#[must_use]
pub fn is_cycle_active(record: &FurnaceRecord) -> bool {
    record.heating_start.is_some()
}

/// Seconds until the current sheet is done; 0 when no cycle runs
#[must_use]
pub fn time_left(record: &FurnaceRecord, now_ms: i64) -> u32 {
    let Some(start) = record.heating_start else {
        return 0;
    };
    let open_pause = record.pause_start.map_or(0, |p| (now_ms - p).max(0));
    let elapsed_ms = (now_ms - start - record.pause_total - open_pause).max(0);
    let elapsed = elapsed_ms.div_euclid(MS_PER_SECOND);

    let left = i64::from(record.heating_duration) - elapsed;
    u32::try_from(left.max(0)).unwrap_or(0)
}

/// Advance the heating clock by one poll
///
/// When the current cycle has run out outside downtime, one sheet is taken
/// off the card and logged, and a new cycle starts if the card still has
/// sheets. Once the card is exhausted the cycle ends and further ticks are
/// idle.
pub fn on_tick(record: &mut FurnaceRecord, now: DateTime<Utc>, dedup_window_ms: i64) -> TickOutcome {
    if !record.is_process_started || record.is_downtime || !is_cycle_active(record) {
        return TickOutcome::Idle;
    }

    let now_ms = now.timestamp_millis();
    let seconds_left = time_left(record, now_ms);
    if seconds_left > 0 {
        return TickOutcome::Counting { seconds_left };
    }

    if record.remaining_sheets == 0 {
        end_cycle(record);
        return TickOutcome::Exhausted;
    }

    record.remaining_sheets -= 1;
    let card = Some(record.card_number.clone());
    record.journal.append(
        now,
        JournalMessage::SheetDispensed,
        card,
        None,
        dedup_window_ms,
    );

    let next_cycle = record.remaining_sheets > 0 && begin_cycle(record, now_ms);
    if !next_cycle {
        end_cycle(record);
    }
    TickOutcome::SheetDispensed {
        remaining: record.remaining_sheets,
        next_cycle,
    }
}

/// Open a fresh cycle at `now_ms` with a duration recomputed from the
/// current parameters. Returns false if no duration can be computed.
fn begin_cycle(record: &mut FurnaceRecord, now_ms: i64) -> bool {
    let Some(duration) = compute_duration(
        record.sheet_thickness,
        record.heating_time,
        record.sheets_in_furnace,
    ) else {
        return false;
    };

    record.heating_duration = duration;
    record.heating_start = Some(now_ms);
    record.pause_total = 0;
    record.pause_start = None;
    true
}

fn end_cycle(record: &mut FurnaceRecord) {
    record.heating_start = None;
    record.pause_total = 0;
    record.pause_start = None;
}
