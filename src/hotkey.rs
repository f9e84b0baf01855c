//! Global hotkey handling
//!
//! Every configured binding maps to one `ControlEvent` pushed into the
//! controller channel. Binding strings look like "Super+Shift+H" or "Alt+F9";
//! Super is Cmd on macOS.

use anyhow::{anyhow, Result};
use crossbeam_channel::Sender;
use global_hotkey::{
    hotkey::{Code, HotKey, Modifiers},
    GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
};
use tracing::{info, warn};

use crate::config::HotkeyConfig;
use crate::shared::ControlEvent;

/// Parses a hotkey string like "F9", "Super+Shift+H", "Alt+F1" into a HotKey
pub fn parse_hotkey(hotkey_str: &str) -> Result<HotKey> {
    let mut modifiers = Modifiers::empty();
    let mut key_code: Option<Code> = None;

    for part in hotkey_str.split('+').map(|s| s.trim()) {
        match part.to_uppercase().as_str() {
            "CTRL" | "CONTROL" => modifiers |= Modifiers::CONTROL,
            "SHIFT" => modifiers |= Modifiers::SHIFT,
            "ALT" | "OPTION" => modifiers |= Modifiers::ALT,
            "WIN" | "SUPER" | "META" | "CMD" => modifiers |= Modifiers::SUPER,
            other => key_code = Some(parse_key_code(other)?),
        }
    }

    let code = key_code.ok_or_else(|| anyhow!("No key code found in '{}'", hotkey_str))?;
    Ok(HotKey::new(Some(modifiers), code))
}

/// Parse a key code string into a Code enum
fn parse_key_code(key: &str) -> Result<Code> {
    // Single letters and digits
    if key.len() == 1 {
        let c = key.chars().next().unwrap_or_default();
        if let Some(code) = letter_or_digit_code(c) {
            return Ok(code);
        }
    }

    let code = match key {
        "F1" => Code::F1,
        "F2" => Code::F2,
        "F3" => Code::F3,
        "F4" => Code::F4,
        "F5" => Code::F5,
        "F6" => Code::F6,
        "F7" => Code::F7,
        "F8" => Code::F8,
        "F9" => Code::F9,
        "F10" => Code::F10,
        "F11" => Code::F11,
        "F12" => Code::F12,
        "=" | "EQUAL" | "PLUS" => Code::Equal,
        "-" | "MINUS" => Code::Minus,
        "SPACE" => Code::Space,
        "ENTER" | "RETURN" => Code::Enter,
        "TAB" => Code::Tab,
        "ESCAPE" | "ESC" => Code::Escape,
        "BACKSPACE" => Code::Backspace,
        "DELETE" | "DEL" => Code::Delete,
        "HOME" => Code::Home,
        "END" => Code::End,
        "PAGEUP" | "PGUP" => Code::PageUp,
        "PAGEDOWN" | "PGDN" => Code::PageDown,
        "UP" => Code::ArrowUp,
        "DOWN" => Code::ArrowDown,
        "LEFT" => Code::ArrowLeft,
        "RIGHT" => Code::ArrowRight,
        _ => return Err(anyhow!("Unknown key code: {}", key)),
    };

    Ok(code)
}

fn letter_or_digit_code(c: char) -> Option<Code> {
    let code = match c {
        'A' => Code::KeyA,
        'B' => Code::KeyB,
        'C' => Code::KeyC,
        'D' => Code::KeyD,
        'E' => Code::KeyE,
        'F' => Code::KeyF,
        'G' => Code::KeyG,
        'H' => Code::KeyH,
        'I' => Code::KeyI,
        'J' => Code::KeyJ,
        'K' => Code::KeyK,
        'L' => Code::KeyL,
        'M' => Code::KeyM,
        'N' => Code::KeyN,
        'O' => Code::KeyO,
        'P' => Code::KeyP,
        'Q' => Code::KeyQ,
        'R' => Code::KeyR,
        'S' => Code::KeyS,
        'T' => Code::KeyT,
        'U' => Code::KeyU,
        'V' => Code::KeyV,
        'W' => Code::KeyW,
        'X' => Code::KeyX,
        'Y' => Code::KeyY,
        'Z' => Code::KeyZ,
        '0' => Code::Digit0,
        '1' => Code::Digit1,
        '2' => Code::Digit2,
        '3' => Code::Digit3,
        '4' => Code::Digit4,
        '5' => Code::Digit5,
        '6' => Code::Digit6,
        '7' => Code::Digit7,
        '8' => Code::Digit8,
        '9' => Code::Digit9,
        _ => return None,
    };
    Some(code)
}

/// Build the (binding string, event) table from config
fn binding_table(config: &HotkeyConfig) -> Vec<(String, ControlEvent)> {
    vec![
        (config.toggle_visibility.clone(), ControlEvent::ToggleVisibility),
        (config.increase_opacity.clone(), ControlEvent::IncreaseOpacity),
        (config.decrease_opacity.clone(), ControlEvent::DecreaseOpacity),
        (config.increase_scale.clone(), ControlEvent::IncreaseScale),
        (config.decrease_scale.clone(), ControlEvent::DecreaseScale),
        (
            config.toggle_presentation.clone(),
            ControlEvent::TogglePresentationMode,
        ),
        (config.quit.clone(), ControlEvent::Quit),
    ]
}

/// Manages global hotkeys for the application
pub struct HotkeyManager {
    manager: GlobalHotKeyManager,
    registered: Vec<(HotKey, ControlEvent)>,
    events_tx: Sender<ControlEvent>,
}

impl HotkeyManager {
    /// Create a manager and register every parseable binding from config.
    /// Bindings that fail to parse or register are logged and skipped; the
    /// application continues with the rest.
    pub fn new(config: &HotkeyConfig, events_tx: Sender<ControlEvent>) -> Result<Self> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| anyhow!("Failed to create hotkey manager: {:?}", e))?;

        let mut registered = Vec::new();
        for (binding, event) in binding_table(config) {
            let hotkey = match parse_hotkey(&binding) {
                Ok(hotkey) => hotkey,
                Err(e) => {
                    warn!("Skipping hotkey '{}': {}", binding, e);
                    continue;
                }
            };
            if let Err(e) = manager.register(hotkey) {
                warn!("Failed to register hotkey '{}': {:?}", binding, e);
                continue;
            }
            info!("Registered hotkey {} -> {:?}", binding, event);
            registered.push((hotkey, event));
        }

        Ok(Self {
            manager,
            registered,
            events_tx,
        })
    }

    /// Drain pending hotkey presses into the controller channel
    pub fn poll_events(&self) {
        while let Ok(event) = GlobalHotKeyEvent::receiver().try_recv() {
            // Key-up events also arrive here; only presses act
            if event.state != HotKeyState::Pressed {
                continue;
            }
            if let Some((_, control_event)) = self
                .registered
                .iter()
                .find(|(hotkey, _)| hotkey.id() == event.id)
            {
                let _ = self.events_tx.send(control_event.clone());
            }
        }
    }
}

impl Drop for HotkeyManager {
    fn drop(&mut self) {
        for (hotkey, _) in self.registered.drain(..) {
            let _ = self.manager.unregister(hotkey);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_key() {
        let hotkey = parse_hotkey("F9").unwrap();
        assert!(hotkey.id() > 0);
    }

    #[test]
    fn test_parse_with_modifiers() {
        let hotkey = parse_hotkey("Super+Shift+H").unwrap();
        assert!(hotkey.id() > 0);
    }

    #[test]
    fn test_parse_cmd_alias() {
        // Cmd and Super are the same modifier
        assert_eq!(
            parse_hotkey("Cmd+Shift+P").unwrap().id(),
            parse_hotkey("Super+Shift+P").unwrap().id()
        );
    }

    #[test]
    fn test_parse_symbol_keys() {
        assert!(parse_hotkey("Super+Shift+=").is_ok());
        assert!(parse_hotkey("Super+Shift+-").is_ok());
        assert!(parse_hotkey("Super+Shift+Up").is_ok());
    }

    #[test]
    fn test_parse_invalid_key() {
        assert!(parse_hotkey("InvalidKey").is_err());
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_hotkey("").is_err());
    }

    #[test]
    fn test_default_bindings_all_parse() {
        for (binding, _) in binding_table(&HotkeyConfig::default()) {
            assert!(parse_hotkey(&binding).is_ok(), "binding: {}", binding);
        }
    }
}
