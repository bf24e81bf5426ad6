//! Property-based invariant tests for the furnace model.
//!
//! 1. Every sheet on a card is dispensed exactly once, whatever the cycle length.
//! 2. Journal deduplication only drops repeats closer than the window to the
//!    last kept entry.
//! 3. Time left never exceeds the cycle length and never grows while time moves
//!    forward.
//! 4. Form parsing never panics and reads plain integers back unchanged.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use furnace_control::auth::{SharedSecret, StaticIdentity};
use furnace_control::clock::ManualClock;
use furnace_control::furnace::{
    heating, parse_float_input, parse_int_input, FurnaceId, FurnaceSettings, InputField,
};
use furnace_control::journal::{Journal, JournalMessage, DEDUP_WINDOW_MS};
use furnace_control::persistence::{MemoryStore, Persistence};
use furnace_control::presentation::NullSink;
use furnace_control::store::FurnaceStore;

// ── Helpers ─────────────────────────────────────────────────────────────

const T0_MS: i64 = 1_704_067_200_000;

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(T0_MS + ms).unwrap()
}

fn started_store(clock: &ManualClock, thickness: u32, factor: u32, sheets: u32) -> FurnaceStore<NullSink> {
    let mut store = FurnaceStore::new(
        FurnaceSettings::default(),
        Box::new(clock.clone()),
        Persistence::new(
            Box::new(MemoryStore::new()),
            Box::new(StaticIdentity::new(None)),
        ),
        Box::new(SharedSecret::new("admin")),
        NullSink,
    );
    let id = FurnaceId::Rp2;
    for (field, raw) in [
        (InputField::SheetLength, "800".to_string()),
        (InputField::SheetThickness, thickness.to_string()),
        (InputField::HeatingTime, factor.to_string()),
        (InputField::CardNumber, "K-1".to_string()),
        (InputField::SheetsInCard, sheets.to_string()),
    ] {
        store.set_input(id, field, &raw).unwrap();
    }
    store.start_process(id).unwrap();
    store
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Every sheet is dispensed exactly once
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_sheet_dispensed_once(
        // at least 2 s per sheet so consecutive sheets fall outside the dedup window
        thickness in 3u32..=40,
        factor in 1u32..=5,
        sheets in 1u32..=12,
        extra_ticks in 0usize..5,
    ) {
        let clock = ManualClock::default();
        let mut store = started_store(&clock, thickness, factor, sheets);
        let id = FurnaceId::Rp2;
        let duration = u64::from(store.record(id).heating_duration);
        prop_assert!(duration > 0);

        let mut previous = store.record(id).remaining_sheets;
        for _ in 0..(sheets as usize + extra_ticks) {
            clock.advance_secs(duration);
            store.tick(id);
            let remaining = store.record(id).remaining_sheets;
            prop_assert!(remaining <= previous, "remaining went up: {} -> {}", previous, remaining);
            prop_assert!(previous - remaining <= 1, "more than one sheet per cycle");
            previous = remaining;
        }

        prop_assert_eq!(store.record(id).remaining_sheets, 0);
        prop_assert_eq!(store.stats(id).total_sheets, sheets as usize);
        prop_assert!(!store.needs_tick(id));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Deduplication compares against the last kept entry
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn dedup_drops_only_close_repeats(gaps in prop::collection::vec(0i64..4000, 1..40)) {
        let mut journal = Journal::default();
        let mut now = 0i64;
        let mut last_kept: Option<i64> = None;
        let mut expected = 0usize;

        for gap in gaps {
            now += gap;
            let keep = last_kept.map_or(true, |last| now - last >= DEDUP_WINDOW_MS);
            if keep {
                last_kept = Some(now);
                expected += 1;
            }
            let added = journal.append(
                at(now),
                JournalMessage::SheetDispensed,
                Some("K-1".to_string()),
                None,
                DEDUP_WINDOW_MS,
            );
            prop_assert_eq!(added, keep);
        }

        prop_assert_eq!(journal.len(), expected);
    }

    #[test]
    fn different_events_are_never_merged(gap in 0i64..DEDUP_WINDOW_MS) {
        let mut journal = Journal::default();
        journal.append(at(0), JournalMessage::SheetDispensed, Some("K-1".to_string()), None, DEDUP_WINDOW_MS);
        journal.append(at(gap), JournalMessage::SheetDispensed, Some("K-2".to_string()), None, DEDUP_WINDOW_MS);
        journal.append(at(gap), JournalMessage::DowntimeStarted, None, Some(true), DEDUP_WINDOW_MS);
        prop_assert_eq!(journal.len(), 3);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Time left is bounded and monotone
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn time_left_bounded_and_monotone(
        thickness in 1u32..=40,
        factor in 1u32..=5,
        steps in prop::collection::vec(0u64..5000, 1..30),
    ) {
        let clock = ManualClock::default();
        let store = started_store(&clock, thickness, factor, 3);
        let record = store.record(FurnaceId::Rp2).clone();
        let duration = record.heating_duration;

        let mut now_ms = T0_MS;
        let mut previous = heating::time_left(&record, now_ms);
        prop_assert_eq!(previous, duration);
        for step in steps {
            now_ms += i64::try_from(step).unwrap();
            let left = heating::time_left(&record, now_ms);
            prop_assert!(left <= duration);
            prop_assert!(left <= previous);
            previous = left;
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Form parsing
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn parse_never_panics(raw in ".{0,24}") {
        let _ = parse_int_input(&raw);
        let value = parse_float_input(&raw);
        prop_assert!(value >= 0.0 && value.is_finite());
    }

    #[test]
    fn plain_integers_read_back(n in any::<u32>()) {
        prop_assert_eq!(parse_int_input(&n.to_string()), n);
        prop_assert_eq!(parse_int_input(&format!("  {n}мм")), n);
    }
}
