//! Browser key identifier to USB HID usage code mapping
//!
//! Key identifiers are the layout-independent `KeyboardEvent.code` strings
//! ("KeyA", "Digit1", "Space", ...). The table follows a US layout.
//! Reference: USB HID Usage Tables 1.12, Section 10 (Keyboard/Keypad Page)

/// USB HID key codes (Usage Page 0x07)
pub mod usb {
    // Letters A-Z (0x04 - 0x1D)
    pub const KEY_A: u8 = 0x04;
    pub const KEY_Z: u8 = 0x1D;

    // Numbers 1-9, 0 (0x1E - 0x27)
    pub const KEY_1: u8 = 0x1E;
    pub const KEY_9: u8 = 0x26;
    pub const KEY_0: u8 = 0x27;

    // Control keys
    pub const KEY_ENTER: u8 = 0x28;
    pub const KEY_ESCAPE: u8 = 0x29;
    pub const KEY_BACKSPACE: u8 = 0x2A;
    pub const KEY_TAB: u8 = 0x2B;
    pub const KEY_SPACE: u8 = 0x2C;

    // Punctuation
    pub const KEY_MINUS: u8 = 0x2D;
    pub const KEY_EQUAL: u8 = 0x2E;
    pub const KEY_LEFT_BRACKET: u8 = 0x2F;
    pub const KEY_RIGHT_BRACKET: u8 = 0x30;
    pub const KEY_BACKSLASH: u8 = 0x31;
    pub const KEY_SEMICOLON: u8 = 0x33;
    pub const KEY_APOSTROPHE: u8 = 0x34;
    pub const KEY_GRAVE: u8 = 0x35;
    pub const KEY_COMMA: u8 = 0x36;
    pub const KEY_PERIOD: u8 = 0x37;
    pub const KEY_SLASH: u8 = 0x38;
}

const LETTER_PREFIX: &str = "Key";
const DIGIT_PREFIX: &str = "Digit";

/// Named keys matched verbatim after the letter and digit rules
static NAMED_KEYS: &[(&str, u8)] = &[
    ("Space", usb::KEY_SPACE),
    ("Enter", usb::KEY_ENTER),
    ("Backspace", usb::KEY_BACKSPACE),
    ("Tab", usb::KEY_TAB),
    ("Escape", usb::KEY_ESCAPE),
    ("Minus", usb::KEY_MINUS),
    ("Equal", usb::KEY_EQUAL),
    ("BracketLeft", usb::KEY_LEFT_BRACKET),
    ("BracketRight", usb::KEY_RIGHT_BRACKET),
    ("Backslash", usb::KEY_BACKSLASH),
    ("Semicolon", usb::KEY_SEMICOLON),
    ("Quote", usb::KEY_APOSTROPHE),
    ("Comma", usb::KEY_COMMA),
    ("Period", usb::KEY_PERIOD),
    ("Slash", usb::KEY_SLASH),
    ("Backquote", usb::KEY_GRAVE),
];

/// Convert a browser key identifier to a USB HID usage code
///
/// Returns `None` for anything not in the table, including "Key"/"Digit"
/// identifiers whose suffix is not a single `A`-`Z` / `0`-`9` character.
/// Never returns `Some(0)`.
pub fn lookup(code: &str) -> Option<u8> {
    letter_usage(code)
        .or_else(|| digit_usage(code))
        .or_else(|| named_usage(code))
}

fn letter_usage(code: &str) -> Option<u8> {
    let suffix = code.strip_prefix(LETTER_PREFIX)?.as_bytes();
    match suffix {
        [c @ b'A'..=b'Z'] => Some(usb::KEY_A + (c - b'A')),
        _ => None,
    }
}

fn digit_usage(code: &str) -> Option<u8> {
    let suffix = code.strip_prefix(DIGIT_PREFIX)?.as_bytes();
    match suffix {
        // 0 follows 9 in the usage table
        [b'0'] => Some(usb::KEY_0),
        [c @ b'1'..=b'9'] => Some(usb::KEY_1 + (c - b'1')),
        _ => None,
    }
}

fn named_usage(code: &str) -> Option<u8> {
    NAMED_KEYS
        .iter()
        .find(|(name, _)| *name == code)
        .map(|&(_, usage)| usage)
}
