//! Downtime tracking
//!
//! Downtime freezes the heating clock: the pause opened here is folded into
//! `pause_total` when downtime ends, so the interrupted cycle resumes with the
//! same time left. The downtime display clock (`downtime_start`) is kept
//! separately from that bookkeeping.

use chrono::{DateTime, Utc};

use super::{FurnaceId, FurnaceRecord};
use crate::error::FurnaceError;
use crate::journal::JournalMessage;

/// Open a downtime
///
/// # Errors
/// [`FurnaceError::NotStarted`] without a running process,
/// [`FurnaceError::AlreadyInDowntime`] if one is open.
pub fn start(
    id: FurnaceId,
    record: &mut FurnaceRecord,
    now: DateTime<Utc>,
    dedup_window_ms: i64,
) -> Result<(), FurnaceError> {
    if !record.is_process_started {
        return Err(FurnaceError::NotStarted(id));
    }
    if record.is_downtime {
        return Err(FurnaceError::AlreadyInDowntime(id));
    }

    let now_ms = now.timestamp_millis();
    record.is_downtime = true;
    record.downtime_start = Some(now_ms);
    if record.pause_start.is_none() {
        record.pause_start = Some(now_ms);
    }
    record.journal.append(
        now,
        JournalMessage::DowntimeStarted,
        None,
        Some(true),
        dedup_window_ms,
    );
    Ok(())
}

/// Close the open downtime and give the heating clock its paused time back
///
/// # Errors
/// [`FurnaceError::NotInDowntime`] when no downtime is open.
pub fn end(
    id: FurnaceId,
    record: &mut FurnaceRecord,
    now: DateTime<Utc>,
    dedup_window_ms: i64,
) -> Result<(), FurnaceError> {
    if !record.is_downtime {
        return Err(FurnaceError::NotInDowntime(id));
    }

    let now_ms = now.timestamp_millis();
    record.is_downtime = false;
    if let Some(paused_at) = record.pause_start.take() {
        record.pause_total += (now_ms - paused_at).max(0);
    }
    record.downtime_start = None;
    record.journal.append(
        now,
        JournalMessage::DowntimeEnded,
        None,
        Some(false),
        dedup_window_ms,
    );
    Ok(())
}

/// Whole seconds since the open downtime began; 0 outside downtime
#[must_use]
pub fn elapsed_secs(record: &FurnaceRecord, now_ms: i64) -> u64 {
    match (record.is_downtime, record.downtime_start) {
        (true, Some(start)) => u64::try_from((now_ms - start).div_euclid(1000)).unwrap_or(0),
        _ => 0,
    }
}
