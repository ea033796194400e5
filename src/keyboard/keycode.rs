//! Key code constants
//!
//! Symbolic key codes exchanged with the input engine. Values follow the
//! Android virtual key code space so that engines written against it
//! can consume them unchanged.

// ============================================================================
// Modifier Keys
// ============================================================================

pub const KEYCODE_ALT_LEFT: i32 = 57;
pub const KEYCODE_ALT_RIGHT: i32 = 58;
pub const KEYCODE_SHIFT_LEFT: i32 = 59;
pub const KEYCODE_SHIFT_RIGHT: i32 = 60;
pub const KEYCODE_SYM: i32 = 63;
pub const KEYCODE_CTRL_LEFT: i32 = 113;
pub const KEYCODE_CTRL_RIGHT: i32 = 114;
pub const KEYCODE_META_LEFT: i32 = 117;
pub const KEYCODE_META_RIGHT: i32 = 118;
/// Function key (consumed by the engine, never treated as a modifier here)
pub const KEYCODE_FUNCTION: i32 = 119;

// ============================================================================
// Printing Keys
// ============================================================================

pub const KEYCODE_0: i32 = 7;
pub const KEYCODE_9: i32 = 16;
pub const KEYCODE_A: i32 = 29;
pub const KEYCODE_Z: i32 = 54;
pub const KEYCODE_COMMA: i32 = 55;
pub const KEYCODE_PERIOD: i32 = 56;
pub const KEYCODE_TAB: i32 = 61;
pub const KEYCODE_SPACE: i32 = 62;
pub const KEYCODE_ENTER: i32 = 66;
pub const KEYCODE_DEL: i32 = 67;
pub const KEYCODE_GRAVE: i32 = 68;
pub const KEYCODE_MINUS: i32 = 69;
pub const KEYCODE_EQUALS: i32 = 70;
pub const KEYCODE_LEFT_BRACKET: i32 = 71;
pub const KEYCODE_RIGHT_BRACKET: i32 = 72;
pub const KEYCODE_BACKSLASH: i32 = 73;
pub const KEYCODE_SEMICOLON: i32 = 74;
pub const KEYCODE_APOSTROPHE: i32 = 75;
pub const KEYCODE_SLASH: i32 = 76;
pub const KEYCODE_AT: i32 = 77;
pub const KEYCODE_PLUS: i32 = 81;

// ============================================================================
// Navigation / Editing Keys
// ============================================================================

pub const KEYCODE_DPAD_UP: i32 = 19;
pub const KEYCODE_DPAD_DOWN: i32 = 20;
pub const KEYCODE_DPAD_LEFT: i32 = 21;
pub const KEYCODE_DPAD_RIGHT: i32 = 22;
pub const KEYCODE_PAGE_UP: i32 = 92;
pub const KEYCODE_PAGE_DOWN: i32 = 93;
pub const KEYCODE_ESCAPE: i32 = 111;
pub const KEYCODE_FORWARD_DEL: i32 = 112;
pub const KEYCODE_MOVE_HOME: i32 = 122;
pub const KEYCODE_MOVE_END: i32 = 123;
pub const KEYCODE_INSERT: i32 = 124;
pub const KEYCODE_F1: i32 = 131;
pub const KEYCODE_F12: i32 = 142;

/// Named keys (besides letters, digits and F-keys, handled in `code_of`)
const NAMED_KEYS: &[(&str, i32)] = &[
    ("Alt_L", KEYCODE_ALT_LEFT),
    ("Alt_R", KEYCODE_ALT_RIGHT),
    ("Shift_L", KEYCODE_SHIFT_LEFT),
    ("Shift_R", KEYCODE_SHIFT_RIGHT),
    ("Control_L", KEYCODE_CTRL_LEFT),
    ("Control_R", KEYCODE_CTRL_RIGHT),
    ("Meta_L", KEYCODE_META_LEFT),
    ("Meta_R", KEYCODE_META_RIGHT),
    ("Sym", KEYCODE_SYM),
    ("function", KEYCODE_FUNCTION),
    ("comma", KEYCODE_COMMA),
    ("period", KEYCODE_PERIOD),
    ("Tab", KEYCODE_TAB),
    ("space", KEYCODE_SPACE),
    ("Return", KEYCODE_ENTER),
    ("BackSpace", KEYCODE_DEL),
    ("grave", KEYCODE_GRAVE),
    ("minus", KEYCODE_MINUS),
    ("equal", KEYCODE_EQUALS),
    ("bracketleft", KEYCODE_LEFT_BRACKET),
    ("bracketright", KEYCODE_RIGHT_BRACKET),
    ("backslash", KEYCODE_BACKSLASH),
    ("semicolon", KEYCODE_SEMICOLON),
    ("apostrophe", KEYCODE_APOSTROPHE),
    ("slash", KEYCODE_SLASH),
    ("at", KEYCODE_AT),
    ("plus", KEYCODE_PLUS),
    ("Up", KEYCODE_DPAD_UP),
    ("Down", KEYCODE_DPAD_DOWN),
    ("Left", KEYCODE_DPAD_LEFT),
    ("Right", KEYCODE_DPAD_RIGHT),
    ("Page_Up", KEYCODE_PAGE_UP),
    ("Page_Down", KEYCODE_PAGE_DOWN),
    ("Escape", KEYCODE_ESCAPE),
    ("Delete", KEYCODE_FORWARD_DEL),
    ("Home", KEYCODE_MOVE_HOME),
    ("End", KEYCODE_MOVE_END),
    ("Insert", KEYCODE_INSERT),
];

/// Printable characters with a dedicated key code (unshifted, shifted)
const PRINTING_KEYS: &[(i32, char, char)] = &[
    (KEYCODE_COMMA, ',', '<'),
    (KEYCODE_PERIOD, '.', '>'),
    (KEYCODE_SPACE, ' ', ' '),
    (KEYCODE_GRAVE, '`', '~'),
    (KEYCODE_MINUS, '-', '_'),
    (KEYCODE_EQUALS, '=', '+'),
    (KEYCODE_LEFT_BRACKET, '[', '{'),
    (KEYCODE_RIGHT_BRACKET, ']', '}'),
    (KEYCODE_BACKSLASH, '\\', '|'),
    (KEYCODE_SEMICOLON, ';', ':'),
    (KEYCODE_APOSTROPHE, '\'', '"'),
    (KEYCODE_SLASH, '/', '?'),
    (KEYCODE_AT, '@', '@'),
    (KEYCODE_PLUS, '+', '+'),
];

const SHIFTED_DIGITS: [char; 10] = [')', '!', '@', '#', '$', '%', '^', '&', '*', '('];

/// Look up a key code by name.
///
/// Accepts key names (`"BackSpace"`), single letters/digits (`"q"`, `"1"`),
/// single punctuation characters (`","`) and F-keys (`"F5"`).
pub fn code_of(name: &str) -> Option<i32> {
    if let Some(&(_, code)) = NAMED_KEYS.iter().find(|(n, _)| *n == name) {
        return Some(code);
    }

    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return code_of_char(c);
    }

    if let Some(n) = name.strip_prefix('F').and_then(|n| n.parse::<i32>().ok()) {
        if (1..=12).contains(&n) {
            return Some(KEYCODE_F1 + n - 1);
        }
    }

    None
}

/// Key code producing `c` without modifiers
pub fn code_of_char(c: char) -> Option<i32> {
    match c {
        'a'..='z' => Some(KEYCODE_A + (c as i32 - 'a' as i32)),
        '0'..='9' => Some(KEYCODE_0 + (c as i32 - '0' as i32)),
        _ => PRINTING_KEYS
            .iter()
            .find(|(_, plain, _)| *plain == c)
            .map(|&(code, _, _)| code),
    }
}

/// Canonical name of a key code
pub fn name_of(code: i32) -> Option<String> {
    if let Some(c) = char_of(code) {
        return Some(c.to_string());
    }
    if (KEYCODE_F1..=KEYCODE_F12).contains(&code) {
        return Some(format!("F{}", code - KEYCODE_F1 + 1));
    }
    NAMED_KEYS
        .iter()
        .find(|&&(_, c)| c == code)
        .map(|(n, _)| n.to_string())
}

/// Character produced by a printing key without modifiers
pub fn char_of(code: i32) -> Option<char> {
    match code {
        KEYCODE_A..=KEYCODE_Z => char::from_u32(('a' as i32 + code - KEYCODE_A) as u32),
        KEYCODE_0..=KEYCODE_9 => char::from_u32(('0' as i32 + code - KEYCODE_0) as u32),
        _ => PRINTING_KEYS
            .iter()
            .find(|&&(c, _, _)| c == code)
            .map(|&(_, plain, _)| plain),
    }
}

/// Character produced by a printing key with Shift held
pub fn shifted_char_of(code: i32) -> Option<char> {
    match code {
        KEYCODE_A..=KEYCODE_Z => char_of(code).map(|c| c.to_ascii_uppercase()),
        KEYCODE_0..=KEYCODE_9 => Some(SHIFTED_DIGITS[(code - KEYCODE_0) as usize]),
        _ => PRINTING_KEYS
            .iter()
            .find(|&&(c, _, _)| c == code)
            .map(|&(_, _, shifted)| shifted),
    }
}

/// Label shown on a key for `code`
pub fn display_label(code: i32) -> String {
    match code {
        KEYCODE_A..=KEYCODE_Z => char_of(code).map(String::from).unwrap_or_default(),
        _ => char_of(code)
            .map(String::from)
            .or_else(|| name_of(code))
            .unwrap_or_default(),
    }
}

/// Whether `code` is a modifier handled by the keyboard itself.
///
/// The Function key is excluded: the engine consumes it.
pub fn is_modifier(code: i32) -> bool {
    matches!(
        code,
        KEYCODE_SHIFT_LEFT
            | KEYCODE_SHIFT_RIGHT
            | KEYCODE_CTRL_LEFT
            | KEYCODE_CTRL_RIGHT
            | KEYCODE_ALT_LEFT
            | KEYCODE_ALT_RIGHT
            | KEYCODE_META_LEFT
            | KEYCODE_META_RIGHT
            | KEYCODE_SYM
    )
}

/// Whether a key code lies in the standard (engine-independent) range
pub fn is_std_key(code: i32) -> bool {
    code > 0 && code <= KEYCODE_F12
}
