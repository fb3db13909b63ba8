//! Key identifier canonicalization
//!
//! Different capture paths report the same physical key under different
//! spellings: `NumPad5`, `Kp5`, `KP_5` and `VK_NUMPAD5` are all the numeric
//! pad 5. Counts are only comparable once every spelling is folded into one
//! identifier, so canonicalization runs before anything is written and
//! before heatmap normalization.
//!
//! Canonical names follow the web `KeyboardEvent.code` naming (`KeyA`,
//! `Digit1`, `Numpad5`, `ShiftLeft`, ...). Identifiers not found in the table
//! pass through trimmed but otherwise unchanged.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Canonical identifiers recognized case-insensitively as themselves.
const CANONICAL: &[&str] = &[
    "AltLeft",
    "AltRight",
    "ArrowDown",
    "ArrowLeft",
    "ArrowRight",
    "ArrowUp",
    "Backquote",
    "Backslash",
    "Backspace",
    "BracketLeft",
    "BracketRight",
    "CapsLock",
    "Comma",
    "ControlLeft",
    "ControlRight",
    "Delete",
    "End",
    "Enter",
    "Equal",
    "Escape",
    "Fn",
    "Home",
    "Insert",
    "MetaLeft",
    "MetaRight",
    "Minus",
    "NumLock",
    "NumpadAdd",
    "NumpadDecimal",
    "NumpadDivide",
    "NumpadEnter",
    "NumpadEqual",
    "NumpadMultiply",
    "NumpadSubtract",
    "PageDown",
    "PageUp",
    "Pause",
    "Period",
    "PrintScreen",
    "Quote",
    "ScrollLock",
    "Semicolon",
    "ShiftLeft",
    "ShiftRight",
    "Slash",
    "Space",
    "Tab",
];

/// Alternate spellings, matched case-insensitively.
const ALIASES: &[(&str, &str)] = &[
    // Enter / editing
    ("Return", "Enter"),
    ("KpReturn", "NumpadEnter"),
    ("KP_Enter", "NumpadEnter"),
    ("Back", "Backspace"),
    ("BackSpace", "Backspace"),
    ("Del", "Delete"),
    ("KpDelete", "NumpadDecimal"),
    ("Esc", "Escape"),
    ("Spacebar", "Space"),
    ("Capital", "CapsLock"),
    ("Snapshot", "PrintScreen"),
    ("Scroll", "ScrollLock"),
    ("Prior", "PageUp"),
    ("Next", "PageDown"),
    // Arrows
    ("Up", "ArrowUp"),
    ("Down", "ArrowDown"),
    ("Left", "ArrowLeft"),
    ("Right", "ArrowRight"),
    ("UpArrow", "ArrowUp"),
    ("DownArrow", "ArrowDown"),
    ("LeftArrow", "ArrowLeft"),
    ("RightArrow", "ArrowRight"),
    // Modifiers
    ("Shift", "ShiftLeft"),
    ("ShiftKey", "ShiftLeft"),
    ("LShiftKey", "ShiftLeft"),
    ("RShiftKey", "ShiftRight"),
    ("LeftShift", "ShiftLeft"),
    ("RightShift", "ShiftRight"),
    ("Control", "ControlLeft"),
    ("ControlKey", "ControlLeft"),
    ("LControlKey", "ControlLeft"),
    ("RControlKey", "ControlRight"),
    ("LeftControl", "ControlLeft"),
    ("RightControl", "ControlRight"),
    ("Alt", "AltLeft"),
    ("Menu", "AltLeft"),
    ("LMenu", "AltLeft"),
    ("RMenu", "AltRight"),
    ("AltGr", "AltRight"),
    ("LeftAlt", "AltLeft"),
    ("RightAlt", "AltRight"),
    ("LWin", "MetaLeft"),
    ("RWin", "MetaRight"),
    ("Meta", "MetaLeft"),
    ("Function", "Fn"),
    // Punctuation
    ("Oemcomma", "Comma"),
    ("OemPeriod", "Period"),
    ("Dot", "Period"),
    ("OemMinus", "Minus"),
    ("Oemplus", "Equal"),
    ("OemQuestion", "Slash"),
    ("Oem2", "Slash"),
    ("Oem1", "Semicolon"),
    ("OemSemicolon", "Semicolon"),
    ("SemiColon", "Semicolon"),
    ("Oemtilde", "Backquote"),
    ("Oem3", "Backquote"),
    ("BackQuote", "Backquote"),
    ("OemOpenBrackets", "BracketLeft"),
    ("Oem4", "BracketLeft"),
    ("LeftBracket", "BracketLeft"),
    ("Oem6", "BracketRight"),
    ("OemCloseBrackets", "BracketRight"),
    ("RightBracket", "BracketRight"),
    ("Oem5", "Backslash"),
    ("OemPipe", "Backslash"),
    ("IntlBackslash", "Backslash"),
    ("Oem7", "Quote"),
    ("OemQuotes", "Quote"),
    // Numeric pad operators
    ("Add", "NumpadAdd"),
    ("KpPlus", "NumpadAdd"),
    ("KP_Add", "NumpadAdd"),
    ("Subtract", "NumpadSubtract"),
    ("KpMinus", "NumpadSubtract"),
    ("KP_Subtract", "NumpadSubtract"),
    ("Multiply", "NumpadMultiply"),
    ("KpMultiply", "NumpadMultiply"),
    ("KP_Multiply", "NumpadMultiply"),
    ("Divide", "NumpadDivide"),
    ("KpDivide", "NumpadDivide"),
    ("KP_Divide", "NumpadDivide"),
    ("Decimal", "NumpadDecimal"),
    ("KP_Decimal", "NumpadDecimal"),
    ("NumLk", "NumLock"),
];

fn table() -> &'static HashMap<String, String> {
    static TABLE: OnceLock<HashMap<String, String>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut map = HashMap::with_capacity(CANONICAL.len() + ALIASES.len() + 128);

        for &name in CANONICAL {
            map.insert(name.to_ascii_lowercase(), name.to_string());
        }
        for &(alias, canonical) in ALIASES {
            map.insert(alias.to_ascii_lowercase(), canonical.to_string());
        }

        for c in 'a'..='z' {
            let canonical = format!("Key{}", c.to_ascii_uppercase());
            map.insert(c.to_string(), canonical.clone());
            map.insert(format!("vk_{c}"), canonical.clone());
            map.insert(canonical.to_ascii_lowercase(), canonical);
        }

        for d in 0..=9 {
            let digit = format!("Digit{d}");
            map.insert(d.to_string(), digit.clone());
            map.insert(format!("d{d}"), digit.clone());
            map.insert(digit.to_ascii_lowercase(), digit);

            let pad = format!("Numpad{d}");
            map.insert(format!("num{d}"), pad.clone());
            map.insert(format!("kp{d}"), pad.clone());
            map.insert(format!("kp_{d}"), pad.clone());
            map.insert(format!("vk_numpad{d}"), pad.clone());
            map.insert(pad.to_ascii_lowercase(), pad);
        }

        for f in 1..=24 {
            let name = format!("F{f}");
            map.insert(format!("vk_f{f}"), name.clone());
            map.insert(name.to_ascii_lowercase(), name);
        }

        map
    })
}

/// Map a raw key identifier to its canonical spelling.
pub fn canonical_key(raw: &str) -> Cow<'_, str> {
    if raw == " " {
        return Cow::Borrowed("Space");
    }

    let trimmed = raw.trim();
    match table().get(&trimmed.to_ascii_lowercase()) {
        Some(canonical) if canonical == trimmed => Cow::Borrowed(trimmed),
        Some(canonical) => Cow::Owned(canonical.clone()),
        None => Cow::Borrowed(trimmed),
    }
}

/// Fold a raw count map into canonical identifiers, summing aliases.
///
/// Empty identifiers are dropped.
pub fn canonicalize_counts<'a, I>(counts: I) -> BTreeMap<String, i64>
where
    I: IntoIterator<Item = (&'a String, &'a i64)>,
{
    let mut out = BTreeMap::new();
    for (raw, count) in counts {
        let key = canonical_key(raw);
        if key.is_empty() {
            continue;
        }
        *out.entry(key.into_owned()).or_insert(0) += *count;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numpad_spellings_fold_together() {
        for raw in ["NumPad5", "numpad5", "Num5", "Kp5", "KP_5", "VK_NUMPAD5", "Numpad5"] {
            assert_eq!(canonical_key(raw), "Numpad5", "spelling {raw}");
        }
        assert_eq!(canonical_key("KpReturn"), "NumpadEnter");
        assert_eq!(canonical_key("Decimal"), "NumpadDecimal");
        assert_eq!(canonical_key("Add"), "NumpadAdd");
    }

    #[test]
    fn test_common_aliases() {
        assert_eq!(canonical_key("Return"), "Enter");
        assert_eq!(canonical_key(" "), "Space");
        assert_eq!(canonical_key("Spacebar"), "Space");
        assert_eq!(canonical_key("Back"), "Backspace");
        assert_eq!(canonical_key("LShiftKey"), "ShiftLeft");
        assert_eq!(canonical_key("a"), "KeyA");
        assert_eq!(canonical_key("D7"), "Digit7");
        assert_eq!(canonical_key("f11"), "F11");
        assert_eq!(canonical_key("Oemcomma"), "Comma");
    }

    #[test]
    fn test_canonical_and_unknown_pass_through() {
        assert!(matches!(canonical_key("KeyA"), Cow::Borrowed("KeyA")));
        assert!(matches!(canonical_key("Spacebar"), Cow::Owned(_)));
        assert_eq!(canonical_key("  MediaPlayPause "), "MediaPlayPause");
        assert_eq!(canonical_key("Unknown(171)"), "Unknown(171)");
    }

    #[test]
    fn test_canonicalize_counts_merges_aliases() {
        let mut raw = HashMap::new();
        raw.insert("NumPad1".to_string(), 4);
        raw.insert("Kp1".to_string(), 6);
        raw.insert("Return".to_string(), 2);
        raw.insert("Enter".to_string(), 3);
        raw.insert("".to_string(), 9);

        let merged = canonicalize_counts(&raw);
        assert_eq!(merged.get("Numpad1"), Some(&10));
        assert_eq!(merged.get("Enter"), Some(&5));
        assert_eq!(merged.len(), 2);
    }
}
