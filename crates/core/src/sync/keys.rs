//! Keyboard bridge from display windows to the controller.

use serde::{Deserialize, Serialize};

const MODIFIER_KEYS: [&str; 12] = [
    "Shift",
    "ShiftLeft",
    "ShiftRight",
    "Control",
    "ControlLeft",
    "ControlRight",
    "Alt",
    "AltLeft",
    "AltRight",
    "Meta",
    "MetaLeft",
    "MetaRight",
];

/// A key press in normalized form, ready to send as `CMD_KEY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCommand {
    pub code: String,
    pub key: String,
}

/// Normalize a raw key event.
///
/// Returns `None` for modifier-only presses and for presses aimed at an
/// editable field. Numpad Enter becomes `Enter`, every space variant becomes
/// `Space`, and a single letter becomes `Key` plus the uppercase letter.
pub fn normalize_key(code: &str, key: &str, target_editable: bool) -> Option<KeyCommand> {
    if target_editable {
        return None;
    }
    if MODIFIER_KEYS.contains(&code) || MODIFIER_KEYS.contains(&key) {
        return None;
    }
    if code.is_empty() && key.is_empty() {
        return None;
    }

    let code = match code {
        "NumpadEnter" => "Enter".to_string(),
        "Space" | "Spacebar" => "Space".to_string(),
        _ if key == " " || key == "Spacebar" || key == "\u{3000}" => "Space".to_string(),
        _ => match single_letter(code).or_else(|| single_letter(key)) {
            Some(letter) => format!("Key{}", letter.to_ascii_uppercase()),
            None if code.is_empty() => key.to_string(),
            None => code.to_string(),
        },
    };
    let key = match code.as_str() {
        "Enter" => "Enter".to_string(),
        "Space" => " ".to_string(),
        _ => key.to_string(),
    };
    Some(KeyCommand { code, key })
}

fn single_letter(value: &str) -> Option<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_ascii_alphabetic() => Some(letter),
        _ => None,
    }
}
