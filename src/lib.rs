//! Furnace Control - heating furnace operator console
//!
//! Tracks three heating furnaces (РП-2, РП-3, РП-4): operator parameters,
//! the per-sheet heating countdown, downtimes, and a persistent event journal
//! with derived statistics.
//!
//! # Modules
//!
//! - [`furnace`]: furnace records, heating cycle and downtime logic
//! - [`journal`]: event journal, deduplication and statistics
//! - [`store`]: the per-session owner of all furnace state
//! - [`scheduler`]: per-furnace tick sources
//! - [`persistence`]: per-user key-value snapshots
//! - [`auth`]: operator identity and administrator credential checks
//! - [`presentation`]: display sink trait and formatting helpers
//! - [`app`], [`ui`]: the interactive terminal dashboard
//! - [`config`], [`keybindings`], [`colors`]: user configuration

pub mod app;
pub mod auth;
pub mod clock;
pub mod colors;
pub mod config;
pub mod error;
pub mod furnace;
pub mod journal;
pub mod keybindings;
pub mod persistence;
pub mod presentation;
pub mod scheduler;
pub mod store;
pub mod ui;

pub use error::FurnaceError;
pub use furnace::{FurnaceId, FurnaceRecord, FurnaceStatus, InputField};
pub use journal::{Journal, JournalEntry, JournalMessage};
pub use store::FurnaceStore;
