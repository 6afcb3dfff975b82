//! HID event and report types for the keyboard

use serde::{Deserialize, Serialize};

/// Number of usage slots in a boot-protocol keyboard report
pub const REPORT_KEY_SLOTS: usize = 6;

/// Size of a boot-protocol keyboard report on the wire
pub const KEYBOARD_REPORT_LEN: usize = 8;

/// Keyboard event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEventType {
    /// Key pressed down
    Down,
    /// Key released
    Up,
}

/// Keyboard modifier flags as reported by the browser
///
/// Only the left-hand modifiers are represented in the HID byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardModifiers {
    /// Control
    #[serde(default)]
    pub ctrl: bool,
    /// Shift
    #[serde(default)]
    pub shift: bool,
    /// Alt / Option
    #[serde(default)]
    pub alt: bool,
    /// Meta (Windows/Command/Super key)
    #[serde(default)]
    pub meta: bool,
}

impl KeyboardModifiers {
    pub const LEFT_CTRL: u8 = 0x01;
    pub const LEFT_SHIFT: u8 = 0x02;
    pub const LEFT_ALT: u8 = 0x04;
    pub const LEFT_META: u8 = 0x08;

    /// Convert to USB HID modifier byte
    pub fn to_hid_byte(&self) -> u8 {
        let mut byte = 0u8;
        if self.ctrl {
            byte |= Self::LEFT_CTRL;
        }
        if self.shift {
            byte |= Self::LEFT_SHIFT;
        }
        if self.alt {
            byte |= Self::LEFT_ALT;
        }
        if self.meta {
            byte |= Self::LEFT_META;
        }
        byte
    }

    /// Create from USB HID modifier byte (right-hand bits are ignored)
    pub fn from_hid_byte(byte: u8) -> Self {
        Self {
            ctrl: byte & Self::LEFT_CTRL != 0,
            shift: byte & Self::LEFT_SHIFT != 0,
            alt: byte & Self::LEFT_ALT != 0,
            meta: byte & Self::LEFT_META != 0,
        }
    }
}

/// Keyboard event as sent by the browser page
///
/// ```json
/// {"type":"down","code":"KeyA","ctrl":false,"shift":true,"alt":false,"meta":false}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardEvent {
    /// Event type (down/up)
    #[serde(rename = "type")]
    pub event_type: KeyEventType,
    /// Browser key identifier (`KeyboardEvent.code`)
    #[serde(default)]
    pub code: String,
    /// Modifier keys state
    #[serde(flatten)]
    pub modifiers: KeyboardModifiers,
}

impl KeyboardEvent {
    /// Create a key down event
    pub fn key_down(code: impl Into<String>, modifiers: KeyboardModifiers) -> Self {
        Self {
            event_type: KeyEventType::Down,
            code: code.into(),
            modifiers,
        }
    }

    /// Create a key up event
    pub fn key_up(code: impl Into<String>, modifiers: KeyboardModifiers) -> Self {
        Self {
            event_type: KeyEventType::Up,
            code: code.into(),
            modifiers,
        }
    }

    /// Decode an event from a raw JSON frame
    pub fn from_json(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }
}

/// USB HID boot keyboard report (8 bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardReport {
    /// Modifier byte
    pub modifiers: u8,
    /// Reserved byte
    pub reserved: u8,
    /// Key codes (up to 6 simultaneous keys)
    pub keys: [u8; REPORT_KEY_SLOTS],
}

impl KeyboardReport {
    /// Report for held keys under the given modifier mask
    pub fn press(modifiers: u8, keys: [u8; REPORT_KEY_SLOTS]) -> Self {
        Self {
            modifiers,
            reserved: 0,
            keys,
        }
    }

    /// All keys and modifiers released
    pub fn release() -> Self {
        Self::default()
    }

    /// Whether this is the all-zero release report
    pub fn is_release(&self) -> bool {
        *self == Self::release()
    }

    /// Convert to bytes for USB HID
    pub fn to_bytes(&self) -> [u8; KEYBOARD_REPORT_LEN] {
        let mut data = [0u8; KEYBOARD_REPORT_LEN];
        data[0] = self.modifiers;
        data[1] = self.reserved;
        data[2..].copy_from_slice(&self.keys);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_conversion() {
        assert_eq!(KeyboardModifiers::default().to_hid_byte(), 0x00);

        let singles = [
            KeyboardModifiers { ctrl: true, ..Default::default() },
            KeyboardModifiers { shift: true, ..Default::default() },
            KeyboardModifiers { alt: true, ..Default::default() },
            KeyboardModifiers { meta: true, ..Default::default() },
        ];
        let bits: Vec<u8> = singles.iter().map(|m| m.to_hid_byte()).collect();
        assert_eq!(bits, vec![0x01, 0x02, 0x04, 0x08]);
        for bit in &bits {
            assert_eq!(bit.count_ones(), 1);
        }

        let all = KeyboardModifiers {
            ctrl: true,
            shift: true,
            alt: true,
            meta: true,
        };
        assert_eq!(all.to_hid_byte(), bits.iter().fold(0, |acc, b| acc | b));
        assert_eq!(all.to_hid_byte(), 0x0F);

        let mods = KeyboardModifiers::from_hid_byte(0x03);
        assert!(mods.ctrl);
        assert!(mods.shift);
        assert!(!mods.alt);
        assert_eq!(mods.to_hid_byte(), 0x03);
    }

    #[test]
    fn test_right_hand_bits_ignored() {
        let mods = KeyboardModifiers::from_hid_byte(0xF0);
        assert_eq!(mods, KeyboardModifiers::default());
    }

    #[test]
    fn test_event_decoding_defaults() {
        let event = KeyboardEvent::from_json(br#"{"type":"down","code":"Digit0","shift":true}"#)
            .expect("decodes");
        assert_eq!(event.event_type, KeyEventType::Down);
        assert_eq!(event.code, "Digit0");
        assert_eq!(
            event.modifiers,
            KeyboardModifiers { shift: true, ..Default::default() }
        );

        let event = KeyboardEvent::from_json(br#"{"type":"up"}"#).expect("decodes");
        assert_eq!(event, KeyboardEvent::key_up("", KeyboardModifiers::default()));
    }

    #[test]
    fn test_event_decoding_rejects_bad_shapes() {
        let frames: [&[u8]; 6] = [
            b"not json",
            br#"[1,2,3]"#,
            br#"{"code":"KeyA"}"#,
            br#"{"type":"press","code":"KeyA"}"#,
            br#"{"type":"down","code":42}"#,
            br#"{"type":"down","code":"KeyA","ctrl":"yes"}"#,
        ];
        for raw in frames {
            assert!(KeyboardEvent::from_json(raw).is_err(), "{:?}", raw);
        }
    }

    #[test]
    fn test_keyboard_report() {
        let report = KeyboardReport::press(0x02, [0x27, 0, 0, 0, 0, 0]);
        assert_eq!(report.to_bytes(), [0x02, 0x00, 0x27, 0, 0, 0, 0, 0]);
        assert!(!report.is_release());

        let release = KeyboardReport::release();
        assert_eq!(release.to_bytes(), [0u8; KEYBOARD_REPORT_LEN]);
        assert!(release.is_release());
    }
}
