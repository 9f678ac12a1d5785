//! Backslash-escape decoding for string literal bodies.

/// Decode `\NNN` (octal), `\xHH` and the named escapes in `text`.
///
/// Decoding is a single left-to-right pass, so an escaped backslash is never
/// re-read as the start of another escape. Unknown escapes are kept verbatim.
pub fn decode_escapes(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.peek().copied() {
            Some('n') => {
                chars.next();
                out.push('\n');
            }
            Some('r') => {
                chars.next();
                out.push('\r');
            }
            Some('t') => {
                chars.next();
                out.push('\t');
            }
            Some(q @ ('"' | '\'' | '\\')) => {
                chars.next();
                out.push(q);
            }
            Some('x') => {
                let mut lookahead = chars.clone();
                lookahead.next();
                let hex: String = lookahead.by_ref().take(2).collect();
                match (hex.len(), u8::from_str_radix(&hex, 16)) {
                    (2, Ok(byte)) => {
                        out.push(char::from(byte));
                        chars = lookahead;
                    }
                    _ => out.push('\\'),
                }
            }
            Some(d) if d.is_digit(8) => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 3 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(v) => {
                            value = value * 8 + v;
                            digits += 1;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            _ => out.push('\\'),
        }
    }

    out
}
