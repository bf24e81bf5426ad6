use anyhow::{bail, Context, Result};
use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ThemeConfig;
use crate::furnace::FurnaceStatus;

/// 24-bit true color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrueColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl TrueColor {
    /// Create a new true color from RGB values
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (the leading `#` is optional)
    ///
    /// # Errors
    /// Returns an error if the string is not six hex digits
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            bail!("Invalid hex color '{hex}'");
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).with_context(|| format!("Invalid hex color '{hex}'"))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl fmt::Display for TrueColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<TrueColor> for Color {
    fn from(c: TrueColor) -> Self {
        Color::Rgb(c.r, c.g, c.b)
    }
}

/// Light or dark dashboard background
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
        }
    }

    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }

    /// Parse a stored value; anything unknown is `None`
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "light" => Some(ThemeMode::Light),
            "dark" => Some(ThemeMode::Dark),
            _ => None,
        }
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dashboard colors, one per furnace status plus chrome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPalette {
    pub mode: ThemeMode,
    pub inactive: TrueColor,
    pub active: TrueColor,
    pub downtime: TrueColor,
    pub accent: TrueColor,
    pub text: TrueColor,
    pub background: TrueColor,
}

impl StatusPalette {
    /// Build from the theme config for one mode, keeping the default for any
    /// color that does not parse
    #[must_use]
    pub fn from_theme(theme: &ThemeConfig, mode: ThemeMode) -> Self {
        let defaults = Self::for_mode(mode);
        let pick = |hex: &str, fallback: TrueColor| {
            TrueColor::from_hex(hex).unwrap_or_else(|e| {
                tracing::warn!("{:#}, using {}", e, fallback);
                fallback
            })
        };
        let (text, background) = match mode {
            ThemeMode::Light => (&theme.light_text, &theme.light_background),
            ThemeMode::Dark => (&theme.dark_text, &theme.dark_background),
        };
        Self {
            mode,
            inactive: pick(&theme.inactive, defaults.inactive),
            active: pick(&theme.active, defaults.active),
            downtime: pick(&theme.downtime, defaults.downtime),
            accent: pick(&theme.accent, defaults.accent),
            text: pick(text, defaults.text),
            background: pick(background, defaults.background),
        }
    }

    /// Built-in colors for a mode
    #[must_use]
    pub fn for_mode(mode: ThemeMode) -> Self {
        let (text, background) = match mode {
            ThemeMode::Light => (TrueColor::new(0x33, 0x33, 0x33), TrueColor::new(0xF5, 0xF5, 0xF5)),
            ThemeMode::Dark => (TrueColor::new(0xC0, 0xB0, 0xB0), TrueColor::new(0x1E, 0x1E, 0x1E)),
        };
        Self {
            mode,
            inactive: TrueColor::new(0x88, 0x88, 0x88), // #888888 - idle gray
            active: TrueColor::new(0x4C, 0xAF, 0x50),   // #4CAF50 - running green
            downtime: TrueColor::new(0xF4, 0x43, 0x36), // #F44336 - downtime red
            accent: TrueColor::new(0xDD, 0x66, 0x66),   // #DD6666 - cool red
            text,
            background,
        }
    }

    #[must_use]
    pub fn for_status(&self, status: FurnaceStatus) -> TrueColor {
        match status {
            FurnaceStatus::Inactive => self.inactive,
            FurnaceStatus::Active => self.active,
            FurnaceStatus::Downtime => self.downtime,
        }
    }
}

impl Default for StatusPalette {
    fn default() -> Self {
        Self::for_mode(ThemeMode::default())
    }
}
