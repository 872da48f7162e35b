//! Backslash escapes in string and regex literals.
//!
//! The same decoder serves `-v` assignments, command-line `var=value`
//! operands and `-F`, which POSIX says are processed like string literals.

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeMode {
    /// `"..."` literals: every escape is decoded
    String,
    /// `/.../` literals: only escapes that mean a single character are
    /// decoded; the rest are left for the regex compiler
    Regex,
}

const REGEX_META: &str = r".[]()*+?{}|^$\-/";
const REGEX_CLASS_LETTERS: &str = "sSwWdDbByB<>`'";

/// Decode the body of a literal (without its delimiters)
pub fn unescape(raw: &str, mode: EscapeMode) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(next) = chars.next() else {
            // trailing backslash stands for itself
            out.push('\\');
            break;
        };
        let decoded = match next {
            'a' => Some('\x07'),
            'b' => Some('\x08'),
            'f' => Some('\x0C'),
            'n' => Some('\n'),
            'r' => Some('\r'),
            't' => Some('\t'),
            'v' => Some('\x0B'),
            '/' => Some('/'),
            '"' => Some('"'),
            '0'..='7' => {
                let mut value = next.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                Some(char::from_u32(value & 0xff).unwrap_or('\u{FFFD}'))
            }
            'x' | 'u' => {
                let max = if next == 'x' { 2 } else { 8 };
                let mut value = 0u32;
                let mut digits = 0;
                while digits < max {
                    match chars.peek().and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            value = value.wrapping_mul(16).wrapping_add(d);
                            digits += 1;
                            chars.next();
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    Some(next)
                } else {
                    Some(char::from_u32(value).unwrap_or('\u{FFFD}'))
                }
            }
            '\\' if mode == EscapeMode::String => Some('\\'),
            _ => None,
        };

        match (decoded, mode) {
            (Some(c), EscapeMode::String) => out.push(c),
            (Some(c), EscapeMode::Regex) => {
                if c != '/' && REGEX_META.contains(c) {
                    out.push('\\');
                }
                out.push(c);
            }
            (None, EscapeMode::String) => {
                warn!(target: "awk::lexer", "escape sequence `\\{}' treated as plain `{}'", next, next);
                out.push(next);
            }
            (None, EscapeMode::Regex) => {
                if !REGEX_META.contains(next)
                    && !REGEX_CLASS_LETTERS.contains(next)
                    && next != '\\'
                    && next.is_ascii_alphanumeric()
                {
                    warn!(target: "awk::lexer", "regex escape sequence `\\{}' treated as plain `{}'", next, next);
                }
                out.push('\\');
                out.push(next);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_escapes() {
        assert_eq!(unescape(r"a\tb\nc", EscapeMode::String), "a\tb\nc");
        assert_eq!(unescape(r#"\"q\" \\ \/"#, EscapeMode::String), "\"q\" \\ /");
        assert_eq!(unescape(r"\a\b\f\r\v", EscapeMode::String), "\x07\x08\x0C\r\x0B");
    }

    #[test]
    fn test_octal_and_hex() {
        assert_eq!(unescape(r"\101\60", EscapeMode::String), "A0");
        assert_eq!(unescape(r"\1018", EscapeMode::String), "A8");
        assert_eq!(unescape(r"\x41\x4a", EscapeMode::String), "AJ");
        assert_eq!(unescape(r"\x414", EscapeMode::String), "A4");
        assert_eq!(unescape(r"\xg", EscapeMode::String), "xg");
        assert_eq!(unescape(r"é", EscapeMode::String), "é");
    }

    #[test]
    fn test_unknown_escape_yields_char() {
        assert_eq!(unescape(r"\q\.", EscapeMode::String), "q.");
        assert_eq!(unescape("end\\", EscapeMode::String), "end\\");
    }

    #[test]
    fn test_regex_mode_keeps_regex_escapes() {
        assert_eq!(unescape(r"a\.b", EscapeMode::Regex), r"a\.b");
        assert_eq!(unescape(r"\\", EscapeMode::Regex), r"\\");
        assert_eq!(unescape(r"a\/b", EscapeMode::Regex), "a/b");
        assert_eq!(unescape(r#"\""#, EscapeMode::Regex), "\"");
        assert_eq!(unescape(r"\s+\y", EscapeMode::Regex), r"\s+\y");
    }

    #[test]
    fn test_regex_mode_decodes_characters() {
        assert_eq!(unescape(r"a\tb", EscapeMode::Regex), "a\tb");
        // \x2e is '.', which must stay literal
        assert_eq!(unescape(r"\x2e", EscapeMode::Regex), r"\.");
        assert_eq!(unescape(r"\x41", EscapeMode::Regex), "A");
    }
}
