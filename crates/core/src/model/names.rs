//! Display names for string entities.

/// Turn decoded string text into an entity name.
///
/// The text is escaped so the name stays on one line and can be pasted into C
/// source: backslash and the common control characters get short escapes,
/// other control or non-printable characters become `\xNN`, `\uNNNN` or
/// `\UNNNNNNNN`, and double quotes are backslash-escaped. The result is wrapped
/// in double quotes and wide strings get an `L` prefix.
pub fn entity_name_from_string(text: &str, wide: bool) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '"' => escaped.push_str("\\\""),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                escaped.push_str(&format!("\\x{:02x}", c as u32));
            }
            c if (c as u32) < 0x80 => escaped.push(c),
            c if (c as u32) <= 0xff => escaped.push_str(&format!("\\x{:02x}", c as u32)),
            c if (c as u32) <= 0xffff => escaped.push_str(&format!("\\u{:04x}", c as u32)),
            c => escaped.push_str(&format!("\\U{:08x}", c as u32)),
        }
    }

    if wide {
        format!("L\"{escaped}\"")
    } else {
        format!("\"{escaped}\"")
    }
}
