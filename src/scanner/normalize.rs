//! Backslash-escape decoding used before rule matching.
//!
//! Turns literal escapes such as `\x41` or `\n` into the characters they
//! represent so trivially obfuscated payloads still hit the rules.

use std::borrow::Cow;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("truncated \\{escape} escape at byte {offset}")]
    Truncated { escape: char, offset: usize },

    #[error("invalid code point U+{0:X}")]
    InvalidCodePoint(u32),

    #[error("trailing backslash")]
    TrailingBackslash,
}

/// Decode escapes, falling back to the original text on any error
pub fn normalize(text: &str) -> Cow<'_, str> {
    if !text.contains('\\') {
        return Cow::Borrowed(text);
    }
    match decode_escapes(text) {
        Ok(decoded) => Cow::Owned(decoded),
        Err(e) => {
            debug!("Escape decoding failed, scanning raw text: {}", e);
            Cow::Borrowed(text)
        }
    }
}

/// Strict decoder. Unknown escapes are kept verbatim.
pub fn decode_escapes(text: &str) -> Result<String, NormalizeError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        let Some((_, esc)) = chars.next() else {
            return Err(NormalizeError::TrailingBackslash);
        };

        match esc {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\u{0B}'),
            'x' | 'u' | 'U' => {
                let width = match esc {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut code = 0u32;
                for _ in 0..width {
                    let digit = chars
                        .next_if(|(_, d)| d.is_ascii_hexdigit())
                        .and_then(|(_, d)| d.to_digit(16))
                        .ok_or(NormalizeError::Truncated { escape: esc, offset })?;
                    code = code * 16 + digit;
                }
                if (0xD800..=0xDFFF).contains(&code) {
                    // lone surrogate halves decode to the replacement character
                    out.push(char::REPLACEMENT_CHARACTER);
                } else {
                    out.push(char::from_u32(code).ok_or(NormalizeError::InvalidCodePoint(code))?);
                }
            }
            '0'..='7' => {
                let mut code = esc.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.next_if(|(_, d)| matches!(*d, '0'..='7')) {
                        Some((_, d)) => code = code * 8 + d.to_digit(8).unwrap_or(0),
                        None => break,
                    }
                }
                out.push(char::from_u32(code).ok_or(NormalizeError::InvalidCodePoint(code))?);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_borrowed() {
        assert!(matches!(normalize("no escapes here"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_hex_and_simple_escapes() {
        assert_eq!(decode_escapes(r"\x63\x75\x72\x6c").unwrap(), "curl");
        assert_eq!(decode_escapes(r"a\nb\tc").unwrap(), "a\nb\tc");
        assert_eq!(decode_escapes(r"say \'hi\'").unwrap(), "say 'hi'");
    }

    #[test]
    fn test_unicode_and_octal() {
        assert_eq!(decode_escapes(r"\u0041\U00000042").unwrap(), "AB");
        assert_eq!(decode_escapes(r"\101\0").unwrap(), "A\0");
    }

    #[test]
    fn test_unknown_escape_kept() {
        assert_eq!(decode_escapes(r"\d+ and \s").unwrap(), r"\d+ and \s");
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(decode_escapes("ab\\\ncd").unwrap(), "abcd");
    }

    #[test]
    fn test_malformed_escapes_fail() {
        assert!(matches!(decode_escapes(r"\xZZ"), Err(NormalizeError::Truncated { .. })));
        assert!(matches!(decode_escapes(r"\u12"), Err(NormalizeError::Truncated { .. })));
        assert_eq!(decode_escapes("end\\"), Err(NormalizeError::TrailingBackslash));
        assert_eq!(
            decode_escapes(r"\UFFFFFFFF"),
            Err(NormalizeError::InvalidCodePoint(0xFFFF_FFFF))
        );
    }

    #[test]
    fn test_surrogate_escape_becomes_replacement_char() {
        assert_eq!(decode_escapes(r"\ud800x").unwrap(), "\u{FFFD}x");
        assert_eq!(decode_escapes(r"\uDFFF\x41").unwrap(), "\u{FFFD}A");
    }

    #[test]
    fn test_normalize_falls_back_on_error() {
        let raw = r"C:\x files \n";
        assert_eq!(normalize(raw), raw);
    }

    #[test]
    fn test_non_ascii_preserved() {
        assert_eq!(normalize(r"café\n"), "café\n");
    }
}
