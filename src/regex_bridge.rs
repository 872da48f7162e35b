//! POSIX extended regular expressions on top of the `regex` crate.
//!
//! AWK patterns are translated to the crate's syntax before compiling:
//! bracket expressions follow POSIX rules (a leading `]` is literal, no
//! escapes needed for `[`), a `{` that does not start an interval is a
//! literal, and the GNU word-boundary escapes are mapped.

use std::collections::HashMap;
use std::rc::Rc;

use regex::Regex;
use tracing::trace;

use crate::error::Result;

/// Dynamic patterns kept before the cache is flushed
const CACHE_LIMIT: usize = 256;

/// Compile an ERE
pub fn compile(ere: &str) -> Result<Regex> {
    Ok(Regex::new(&translate(ere))?)
}

/// Rewrite a POSIX ERE into `regex` crate syntax
pub fn translate(ere: &str) -> String {
    let chars: Vec<char> = ere.chars().collect();
    let mut out = String::with_capacity(ere.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                i += 1;
                match chars.get(i) {
                    None => out.push_str(r"\\"),
                    Some(&c) => push_escape(&mut out, c),
                }
                i += 1;
            }
            '[' => match bracket_end(&chars, i) {
                Some(end) => {
                    translate_bracket(&chars[i..=end], &mut out);
                    i = end + 1;
                }
                None => {
                    out.push_str(r"\[");
                    i += 1;
                }
            },
            '{' => match interval_end(&chars, i) {
                Some(end) if i > 0 => {
                    out.extend(&chars[i..=end]);
                    i = end + 1;
                }
                _ => {
                    out.push_str(r"\{");
                    i += 1;
                }
            },
            '}' => {
                out.push_str(r"\}");
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn push_escape(out: &mut String, c: char) {
    match c {
        'y' => out.push_str(r"\b"),
        '<' => out.push_str(r"\b{start}"),
        '>' => out.push_str(r"\b{end}"),
        '`' => out.push_str(r"\A"),
        '\'' => out.push_str(r"\z"),
        's' | 'S' | 'w' | 'W' | 'd' | 'D' | 'b' | 'B' | 'n' | 't' | 'r' | 'f' | 'v' | 'a' => {
            out.push('\\');
            out.push(c);
        }
        c if c.is_ascii_punctuation() => {
            out.push('\\');
            out.push(c);
        }
        c => push_literal(out, c),
    }
}

fn push_literal(out: &mut String, c: char) {
    if regex_syntax_meta(c) {
        out.push('\\');
    }
    out.push(c);
}

fn regex_syntax_meta(c: char) -> bool {
    matches!(
        c,
        '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '#'
            | '&' | '-' | '~'
    )
}

/// Index of the `]` closing the bracket expression opened at `start`
fn bracket_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if chars.get(i) == Some(&'^') {
        i += 1;
    }
    // a leading ']' is a literal member
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            ']' => return Some(i),
            '[' if matches!(chars.get(i + 1), Some(':' | '.' | '=')) => {
                let delim = chars[i + 1];
                let mut j = i + 2;
                while j + 1 < chars.len() && !(chars[j] == delim && chars[j + 1] == ']') {
                    j += 1;
                }
                if j + 1 >= chars.len() {
                    return None;
                }
                i = j + 2;
            }
            '\\' => i += 2,
            _ => i += 1,
        }
    }
    None
}

/// Translate one complete bracket expression `[...]`
fn translate_bracket(chars: &[char], out: &mut String) {
    out.push('[');
    let last = chars.len() - 1;
    let mut i = 1;
    if chars.get(i) == Some(&'^') {
        out.push('^');
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        out.push_str(r"\]");
        i += 1;
    }
    while i < last {
        let c = chars[i];
        match c {
            '[' if matches!(chars.get(i + 1), Some(':')) => {
                // copy [:class:] through
                let mut j = i + 2;
                while j + 1 < last && !(chars[j] == ':' && chars[j + 1] == ']') {
                    j += 1;
                }
                out.extend(&chars[i..=j + 1]);
                i = j + 2;
                continue;
            }
            '[' if matches!(chars.get(i + 1), Some('.' | '=')) => {
                // collating element or equivalence class: use its character
                let delim = chars[i + 1];
                let mut j = i + 2;
                while j + 1 < last && !(chars[j] == delim && chars[j + 1] == ']') {
                    push_literal(out, chars[j]);
                    j += 1;
                }
                i = j + 2;
                continue;
            }
            '\\' if i + 1 < last => {
                let next = chars[i + 1];
                match next {
                    's' | 'S' | 'w' | 'W' | 'd' | 'D' | 'n' | 't' | 'r' | 'f' | 'v' | 'a' => {
                        out.push('\\');
                        out.push(next);
                    }
                    _ => push_literal(out, next),
                }
                i += 2;
                continue;
            }
            '-' if i + 1 < last && chars[i + 1] == '-' => out.push_str(r"\-"),
            '[' | '&' | '~' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out.push(']');
}

/// Index of the `}` closing an interval `{n}`, `{n,}` or `{n,m}` at `start`
fn interval_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    let digits_start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    if chars.get(i) == Some(&',') {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    (chars.get(i) == Some(&'}')).then_some(i)
}

/// Find the first match at or after byte offset `pos`
#[inline]
pub fn find_at(re: &Regex, haystack: &str, pos: usize) -> Option<(usize, usize)> {
    re.find_at(haystack, pos).map(|m| (m.start(), m.end()))
}

#[inline]
pub fn is_match(re: &Regex, haystack: &str) -> bool {
    re.is_match(haystack)
}

/// Find a field or record separator at or after `pos`.
///
/// Empty matches never separate anything, so they are skipped and the
/// search resumes one character further on.
pub fn find_separator(re: &Regex, haystack: &str, mut pos: usize) -> Option<(usize, usize)> {
    while pos <= haystack.len() {
        let m = re.find_at(haystack, pos)?;
        if m.start() < m.end() {
            return Some((m.start(), m.end()));
        }
        let step = haystack[m.start()..].chars().next()?.len_utf8();
        pos = m.start() + step;
    }
    None
}

/// Cache of compiled dynamic patterns keyed by their source text
#[derive(Debug, Default)]
pub struct RegexCache {
    compiled: HashMap<String, Rc<Regex>>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, pattern: &str) -> Result<Rc<Regex>> {
        if let Some(re) = self.compiled.get(pattern) {
            return Ok(Rc::clone(re));
        }
        if self.compiled.len() >= CACHE_LIMIT {
            trace!(target: "awk::vm", "flushing regex cache");
            self.compiled.clear();
        }
        let re = Rc::new(compile(pattern)?);
        self.compiled.insert(pattern.to_string(), Rc::clone(&re));
        Ok(re)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(ere: &str, s: &str) -> bool {
        compile(ere).unwrap().is_match(s)
    }

    #[test]
    fn test_plain_patterns() {
        assert!(matches("ab+c", "xabbbc"));
        assert!(matches("^a|b$", "cab"));
        assert!(!matches("^a$", "ba"));
    }

    #[test]
    fn test_bracket_expressions() {
        assert_eq!(translate("[]a]"), r"[\]a]");
        assert!(matches("[]a]", "]"));
        assert!(matches("[^]a]", "b"));
        assert!(!matches("[^]a]", "]"));
        assert!(matches("[[:digit:]]+", "abc123"));
        assert!(matches("[a[]", "["));
        assert!(matches("[&~]", "~"));
        assert!(matches("[a-c]", "b"));
    }

    #[test]
    fn test_literal_braces() {
        assert!(matches("a{2}", "aa"));
        assert!(!matches("^a{2}$", "a"));
        assert!(matches("{", "{"));
        assert!(matches("a{x", "a{x"));
        assert!(matches("}", "}"));
    }

    #[test]
    fn test_escapes() {
        assert!(matches(r"a\.b", "a.b"));
        assert!(!matches(r"a\.b", "axb"));
        assert!(matches(r"\yfoo\y", "a foo b"));
        assert!(matches(r"\<foo\>", "a foo b"));
        assert!(matches("a\\", "a\\"));
    }

    #[test]
    fn test_find_separator_skips_empty() {
        let re = compile("x*").unwrap();
        assert_eq!(find_separator(&re, "abxxc", 0), Some((2, 4)));
        assert_eq!(find_separator(&re, "abc", 0), None);
    }

    #[test]
    fn test_cache_reuses_compiled() {
        let mut cache = RegexCache::new();
        let a = cache.get("a+").unwrap();
        let b = cache.get("a+").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert!(cache.get("(").is_err());
    }
}
