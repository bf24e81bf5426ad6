//! Furnace records
//!
//! One [`FurnaceRecord`] per furnace holds the operator parameters, the live
//! heating/downtime timestamps and the journal. The timer logic lives in the
//! [`heating`] and [`downtime`] submodules and works directly on a record.
//!
//! Timestamps are stored as milliseconds since the Unix epoch so the
//! persisted form stays compatible with existing saved state.

pub mod downtime;
pub mod heating;

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FurnaceError;
use crate::journal::Journal;

/// Usable furnace length in millimetres
pub const FURNACE_LENGTH_MM: u32 = 65_000;

/// Sheet length a fresh or reset record starts with
pub const DEFAULT_SHEET_LENGTH_MM: u32 = 800;

/// Identifier of one of the fixed furnaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FurnaceId {
    Rp2,
    Rp3,
    Rp4,
}

impl FurnaceId {
    /// Every furnace, in display order
    pub const ALL: [FurnaceId; 3] = [FurnaceId::Rp2, FurnaceId::Rp3, FurnaceId::Rp4];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FurnaceId::Rp2 => "rp2",
            FurnaceId::Rp3 => "rp3",
            FurnaceId::Rp4 => "rp4",
        }
    }

    /// Operator-facing label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            FurnaceId::Rp2 => "РП-2",
            FurnaceId::Rp3 => "РП-3",
            FurnaceId::Rp4 => "РП-4",
        }
    }

    /// Position in [`FurnaceId::ALL`]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            FurnaceId::Rp2 => 0,
            FurnaceId::Rp3 => 1,
            FurnaceId::Rp4 => 2,
        }
    }
}

impl fmt::Display for FurnaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FurnaceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rp2" | "рп-2" => Ok(FurnaceId::Rp2),
            "rp3" | "рп-3" => Ok(FurnaceId::Rp3),
            "rp4" | "рп-4" => Ok(FurnaceId::Rp4),
            other => Err(format!("unknown furnace '{other}' (expected rp2, rp3 or rp4)")),
        }
    }
}

/// Indicator state of a furnace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FurnaceStatus {
    #[default]
    Inactive,
    Active,
    Downtime,
}

impl FurnaceStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FurnaceStatus::Inactive => "inactive",
            FurnaceStatus::Active => "active",
            FurnaceStatus::Downtime => "downtime",
        }
    }
}

impl fmt::Display for FurnaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-editable parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputField {
    SheetLength,
    SheetThickness,
    HeatingTime,
    SheetsInFurnace,
    CardNumber,
    SheetsInCard,
}

impl InputField {
    /// Every field, in form order
    pub const ALL: [InputField; 6] = [
        InputField::SheetLength,
        InputField::SheetThickness,
        InputField::HeatingTime,
        InputField::SheetsInFurnace,
        InputField::CardNumber,
        InputField::SheetsInCard,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            InputField::SheetLength => "Длина листа, мм",
            InputField::SheetThickness => "Толщина листа, мм",
            InputField::HeatingTime => "Время нагрева, мин",
            InputField::SheetsInFurnace => "Листов в печи",
            InputField::CardNumber => "Номер карточки",
            InputField::SheetsInCard => "Листов в карточке",
        }
    }
}

/// Which operator controls are currently usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ControlState {
    pub inputs_enabled: bool,
    pub start_enabled: bool,
    pub downtime_start_enabled: bool,
    pub downtime_end_enabled: bool,
}

/// Fixed parameters shared by all furnaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FurnaceSettings {
    pub furnace_length_mm: u32,
    pub default_sheet_length_mm: u32,
    /// Identical journal entries closer than this are dropped
    pub dedup_window_ms: i64,
}

impl Default for FurnaceSettings {
    fn default() -> Self {
        Self {
            furnace_length_mm: FURNACE_LENGTH_MM,
            default_sheet_length_mm: DEFAULT_SHEET_LENGTH_MM,
            dedup_window_ms: crate::journal::DEDUP_WINDOW_MS,
        }
    }
}

/// Configuration, live timer state and journal of one furnace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FurnaceRecord {
    #[serde(deserialize_with = "lenient_u32")]
    pub sheet_length: u32,
    #[serde(deserialize_with = "lenient_u32")]
    pub sheet_thickness: u32,
    /// Heating minutes factor per millimetre of thickness
    #[serde(deserialize_with = "lenient_f64")]
    pub heating_time: f64,
    #[serde(deserialize_with = "lenient_u32")]
    pub sheets_in_furnace: u32,
    pub sheets_manual: bool,
    #[serde(deserialize_with = "lenient_string")]
    pub card_number: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub sheets_in_card: u32,
    #[serde(deserialize_with = "lenient_u32")]
    pub remaining_sheets: u32,
    pub is_process_started: bool,
    pub is_downtime: bool,
    /// Length of the current heating cycle in seconds
    #[serde(deserialize_with = "lenient_u32")]
    pub heating_duration: u32,
    pub heating_start: Option<i64>,
    /// Milliseconds of closed pauses inside the current cycle
    pub pause_total: i64,
    pub pause_start: Option<i64>,
    pub downtime_start: Option<i64>,
    pub journal: Journal,
}

impl FurnaceRecord {
    #[must_use]
    pub fn new(default_sheet_length: u32) -> Self {
        Self {
            sheet_length: default_sheet_length,
            sheet_thickness: 0,
            heating_time: 0.0,
            sheets_in_furnace: 0,
            sheets_manual: false,
            card_number: String::new(),
            sheets_in_card: 0,
            remaining_sheets: 0,
            is_process_started: false,
            is_downtime: false,
            heating_duration: 0,
            heating_start: None,
            pause_total: 0,
            pause_start: None,
            downtime_start: None,
            journal: Journal::default(),
        }
    }

    /// All parameters present and positive
    #[must_use]
    pub fn is_ready_to_start(&self) -> bool {
        self.sheet_length > 0
            && self.sheet_thickness > 0
            && self.heating_time > 0.0
            && self.sheets_in_furnace > 0
            && !self.card_number.trim().is_empty()
            && self.sheets_in_card > 0
    }

    #[must_use]
    pub fn status(&self) -> FurnaceStatus {
        if !self.is_process_started {
            FurnaceStatus::Inactive
        } else if self.is_downtime {
            FurnaceStatus::Downtime
        } else {
            FurnaceStatus::Active
        }
    }

    #[must_use]
    pub fn controls(&self) -> ControlState {
        let started = self.is_process_started;
        ControlState {
            inputs_enabled: !started,
            start_enabled: !started && self.is_ready_to_start(),
            downtime_start_enabled: started && !self.is_downtime,
            downtime_end_enabled: started && self.is_downtime,
        }
    }

    /// Current text value of an input, as the form shows it
    #[must_use]
    pub fn input_value(&self, field: InputField) -> String {
        let number = |n: u32| if n == 0 { String::new() } else { n.to_string() };
        match field {
            InputField::SheetLength => number(self.sheet_length),
            InputField::SheetThickness => number(self.sheet_thickness),
            InputField::HeatingTime => {
                if self.heating_time > 0.0 {
                    self.heating_time.to_string()
                } else {
                    String::new()
                }
            }
            InputField::SheetsInFurnace => number(self.sheets_in_furnace),
            InputField::CardNumber => self.card_number.clone(),
            InputField::SheetsInCard => number(self.sheets_in_card),
        }
    }

    /// Apply raw operator text to an input field
    ///
    /// Numbers are coerced (see [`parse_int_input`]); editing the sheet
    /// length re-derives the sheet count, editing the sheet count pins it.
    ///
    /// # Errors
    /// Returns [`FurnaceError::InputsLocked`] while the process runs.
    pub fn apply_input(
        &mut self,
        id: FurnaceId,
        field: InputField,
        raw: &str,
        settings: &FurnaceSettings,
    ) -> Result<(), FurnaceError> {
        if self.is_process_started {
            return Err(FurnaceError::InputsLocked(id));
        }

        match field {
            InputField::SheetLength => {
                self.sheet_length = parse_int_input(raw);
                self.sheets_manual = false;
                self.recalculate_sheets_in_furnace(settings.furnace_length_mm);
            }
            InputField::SheetThickness => self.sheet_thickness = parse_int_input(raw),
            InputField::HeatingTime => self.heating_time = parse_float_input(raw),
            InputField::SheetsInFurnace => {
                self.sheets_in_furnace = parse_int_input(raw);
                self.sheets_manual = true;
            }
            InputField::CardNumber => self.card_number = raw.to_string(),
            InputField::SheetsInCard => {
                self.sheets_in_card = parse_int_input(raw);
                self.remaining_sheets = self.sheets_in_card;
            }
        }
        Ok(())
    }

    /// Derive the sheet count from the furnace length unless it was set by hand
    pub fn recalculate_sheets_in_furnace(&mut self, furnace_length: u32) {
        if self.sheets_manual {
            return;
        }
        self.sheets_in_furnace = if self.sheet_length == 0 {
            0
        } else {
            furnace_length / self.sheet_length
        };
    }

    /// Return every field except the journal to its initial value
    pub fn reset_live_state(&mut self, default_sheet_length: u32) {
        let journal = std::mem::take(&mut self.journal);
        *self = Self::new(default_sheet_length);
        self.journal = journal;
    }
}

impl Default for FurnaceRecord {
    fn default() -> Self {
        Self::new(DEFAULT_SHEET_LENGTH_MM)
    }
}

/// One record per furnace, indexed by [`FurnaceId`]
#[derive(Debug, Clone, PartialEq)]
pub struct FurnaceTable {
    records: [FurnaceRecord; 3],
}

impl FurnaceTable {
    /// Every furnace at its defaults
    #[must_use]
    pub fn new(default_sheet_length: u32) -> Self {
        Self {
            records: FurnaceId::ALL.map(|_| FurnaceRecord::new(default_sheet_length)),
        }
    }

    #[must_use]
    pub fn get(&self, id: FurnaceId) -> &FurnaceRecord {
        &self.records[id.index()]
    }

    pub fn get_mut(&mut self, id: FurnaceId) -> &mut FurnaceRecord {
        &mut self.records[id.index()]
    }

    pub fn replace(&mut self, id: FurnaceId, record: FurnaceRecord) {
        self.records[id.index()] = record;
    }

    pub fn iter(&self) -> impl Iterator<Item = (FurnaceId, &FurnaceRecord)> {
        FurnaceId::ALL.into_iter().zip(self.records.iter())
    }
}

impl Default for FurnaceTable {
    fn default() -> Self {
        Self::new(DEFAULT_SHEET_LENGTH_MM)
    }
}

/// Parse an integer field the way a browser form does
///
/// Leading whitespace is skipped and the longest run of digits after an
/// optional sign is used; anything else yields 0. Negative values clamp to 0.
#[must_use]
pub fn parse_int_input(raw: &str) -> u32 {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 || negative {
        return 0;
    }
    digits[..end].parse::<u64>().map_or(u32::MAX, |n| {
        u32::try_from(n).unwrap_or(u32::MAX)
    })
}

/// Parse a decimal field the way a browser form does
///
/// Accepts both `.` and `,` as the decimal separator. Non-finite, negative
/// or unparsable input yields 0.
#[must_use]
pub fn parse_float_input(raw: &str) -> f64 {
    let s = raw.trim_start().replace(',', ".");
    let candidate: String = s
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E'))
        .collect();

    // Longest prefix that parses, so "2.5мин" and "1e" still read as numbers
    let value = (1..=candidate.len())
        .rev()
        .find_map(|end| candidate[..end].parse::<f64>().ok())
        .unwrap_or(0.0);

    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Stored numbers may be JSON numbers, numeric strings or null
#[derive(Deserialize)]
#[serde(untagged)]
enum LenientNumber {
    Number(f64),
    Text(String),
}

fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<LenientNumber>::deserialize(deserializer)?;
    let number = match value {
        Some(LenientNumber::Number(v)) => v,
        Some(LenientNumber::Text(text)) => parse_float_input(&text),
        None => 0.0,
    };
    Ok(if number.is_finite() && number > 0.0 { number } else { 0.0 })
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = lenient_number(deserializer)?;
    Ok(if v >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        v.floor() as u32
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_number(deserializer)
}

/// Card numbers saved as null or as a bare number
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<LenientNumber>::deserialize(deserializer)?;
    Ok(match value {
        Some(LenientNumber::Text(text)) => text,
        Some(LenientNumber::Number(v)) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        Some(LenientNumber::Number(v)) => v.to_string(),
        None => String::new(),
    })
}
