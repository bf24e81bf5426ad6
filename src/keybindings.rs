use crossterm::event::{KeyCode, KeyModifiers};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::config::KeyBindings;

/// Maps key presses to dashboard actions
#[derive(Debug, Clone)]
pub struct KeybindingManager {
    bindings: HashMap<KeyBinding, Action>,
}

/// Key binding definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyBinding {
    pub key: String,
    pub modifiers: Vec<String>,
}

/// Actions that can be triggered by keybindings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Quit,

    // Navigation
    NextFurnace,
    PrevFurnace,
    SelectFurnace(usize),
    NextField,
    PrevField,

    // Furnace operations
    EditField,
    StartProcess,
    StartDowntime,
    EndDowntime,
    ResetFields,
    ClearJournal,

    ToggleReport,
    ToggleTheme,
    SwitchUser,
}

impl KeybindingManager {
    /// Create new keybinding manager with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&KeyBindings::default())
    }

    /// Build from the configured key combinations
    ///
    /// Combinations that do not parse are logged and skipped. `1`..`3` always
    /// select a furnace directly and Ctrl+C always quits.
    #[must_use]
    pub fn from_config(keys: &KeyBindings) -> Self {
        let mut manager = Self {
            bindings: HashMap::new(),
        };

        manager.add_binding("1", &[], Action::SelectFurnace(0));
        manager.add_binding("2", &[], Action::SelectFurnace(1));
        manager.add_binding("3", &[], Action::SelectFurnace(2));
        manager.add_binding("c", &["Ctrl"], Action::Quit);

        for (combo, action) in [
            (&keys.quit, Action::Quit),
            (&keys.next_furnace, Action::NextFurnace),
            (&keys.prev_furnace, Action::PrevFurnace),
            (&keys.next_field, Action::NextField),
            (&keys.prev_field, Action::PrevField),
            (&keys.edit_field, Action::EditField),
            (&keys.start_process, Action::StartProcess),
            (&keys.start_downtime, Action::StartDowntime),
            (&keys.end_downtime, Action::EndDowntime),
            (&keys.reset, Action::ResetFields),
            (&keys.clear_journal, Action::ClearJournal),
            (&keys.toggle_report, Action::ToggleReport),
            (&keys.toggle_theme, Action::ToggleTheme),
            (&keys.switch_user, Action::SwitchUser),
        ] {
            if let Err(e) = manager.add_binding_from_string(combo, action) {
                warn!("Ignoring key binding {:?} for {:?}: {}", combo, action, e);
            }
        }
        manager
    }

    /// Add a keybinding
    pub fn add_binding(&mut self, key: &str, modifiers: &[&str], action: Action) {
        let binding = KeyBinding {
            key: key.to_string(),
            modifiers: modifiers
                .iter()
                .map(std::string::ToString::to_string)
                .collect(),
        };
        self.bindings.insert(binding, action);
    }

    /// Parse and add a keybinding from a config string like "s" or "Ctrl+X"
    ///
    /// # Errors
    /// Returns an error if the combination string is empty or has no key
    pub fn add_binding_from_string(&mut self, combo: &str, action: Action) -> Result<(), String> {
        if combo.trim().is_empty() {
            return Err("Empty key combination".to_string());
        }

        let parts: Vec<&str> = combo.split('+').map(str::trim).collect();
        let Some((key, modifiers)) = parts.split_last() else {
            return Err("Invalid key combination format".to_string());
        };
        if key.is_empty() {
            return Err("Missing key in combination".to_string());
        }

        // Fixed order so lookups built in get_action match
        let mut normalized_mods: Vec<&str> = Vec::new();
        for wanted in ["Ctrl", "Shift", "Alt"] {
            let present = modifiers.iter().any(|m| {
                let m = m.to_lowercase();
                match wanted {
                    "Ctrl" => m == "ctrl" || m == "control",
                    "Shift" => m == "shift",
                    _ => m == "alt",
                }
            });
            if present {
                normalized_mods.push(wanted);
            }
        }

        let key_lower = key.to_lowercase();
        let normalized_key = match key_lower.as_str() {
            "tab" => "Tab".to_string(),
            "enter" | "return" => "Enter".to_string(),
            "esc" | "escape" => "Esc".to_string(),
            "up" => "Up".to_string(),
            "down" => "Down".to_string(),
            "left" => "Left".to_string(),
            "right" => "Right".to_string(),
            "space" => " ".to_string(),
            k if k.chars().count() == 1 => {
                // Shift is carried by the character itself
                normalized_mods.retain(|m| *m != "Shift");
                k.to_string()
            }
            _ => return Err(format!("Unknown key '{key}'")),
        };

        self.add_binding(&normalized_key, &normalized_mods, action);
        Ok(())
    }

    /// Get action for key event
    ///
    /// Character keys are matched case-insensitively. Shift is ignored for
    /// characters since it is already reflected in the character itself.
    #[must_use]
    pub fn get_action(&self, code: KeyCode, modifiers: KeyModifiers) -> Option<Action> {
        let is_char = matches!(code, KeyCode::Char(_));
        let key_str = match code {
            KeyCode::Char(c) => c.to_lowercase().to_string(),
            KeyCode::Tab => "Tab".to_string(),
            KeyCode::Enter => "Enter".to_string(),
            KeyCode::Esc => "Esc".to_string(),
            KeyCode::Up => "Up".to_string(),
            KeyCode::Down => "Down".to_string(),
            KeyCode::Left => "Left".to_string(),
            KeyCode::Right => "Right".to_string(),
            _ => return None,
        };

        let mut mod_vec = Vec::new();
        if modifiers.contains(KeyModifiers::CONTROL) {
            mod_vec.push("Ctrl".to_string());
        }
        if modifiers.contains(KeyModifiers::SHIFT) && !is_char {
            mod_vec.push("Shift".to_string());
        }
        if modifiers.contains(KeyModifiers::ALT) {
            mod_vec.push("Alt".to_string());
        }

        let binding = KeyBinding {
            key: key_str,
            modifiers: mod_vec,
        };

        self.bindings.get(&binding).copied()
    }
}

impl Default for KeybindingManager {
    fn default() -> Self {
        Self::new()
    }
}
