//! Record splitting and field storage.

use std::rc::Rc;

use regex::Regex;

use crate::error::Result;
use crate::regex_bridge::{self, RegexCache};
use crate::value::{AwkStr, Value};

/// How a record (or a `split()` argument) is cut into fields
#[derive(Debug, Clone)]
pub enum Splitter {
    /// FS = " ": runs of blanks and newlines, ignoring leading and trailing ones
    Blank,
    /// A single literal character
    Char(char),
    /// FS = "": every character is a field
    Empty,
    Regex(Rc<Regex>),
}

impl Splitter {
    /// Build the splitter for a field separator value.
    ///
    /// In paragraph mode (RS = "") a newline separates fields whatever FS is.
    pub fn from_fs(fs: &str, paragraph: bool, cache: &mut RegexCache) -> Result<Self> {
        let mut chars = fs.chars();
        let splitter = match (chars.next(), chars.next()) {
            (Some(' '), None) => return Ok(Splitter::Blank),
            (None, _) => return Ok(Splitter::Empty),
            (Some(c), None) if !paragraph || c == '\n' => Splitter::Char(c),
            (Some(c), None) => Splitter::Regex(cache.get(&format!("{}|\n", ere_literal(c)))?),
            _ if paragraph => Splitter::Regex(cache.get(&format!("({})|\n", fs))?),
            _ => Splitter::Regex(cache.get(fs)?),
        };
        Ok(splitter)
    }

    /// Splitter for the third argument of `split()`
    pub fn from_value(fs: &Value, cache: &mut RegexCache) -> Result<Self> {
        match fs {
            Value::Regex(re) => Ok(Splitter::Regex(Rc::clone(re))),
            other => Self::from_fs(&other.as_str(), false, cache),
        }
    }

    /// Split `s`, appending the pieces to `out`
    pub fn split_into(&self, s: &str, out: &mut Vec<Value>) {
        if s.is_empty() {
            return;
        }
        match self {
            Splitter::Blank => out.extend(
                s.split([' ', '\t', '\n'])
                    .filter(|f| !f.is_empty())
                    .map(Value::from_string),
            ),
            Splitter::Char(c) => out.extend(s.split(*c).map(Value::from_string)),
            Splitter::Empty => out.extend(s.chars().map(|c| Value::from_string(String::from(c)))),
            Splitter::Regex(re) => {
                let mut start = 0;
                let mut pos = 0;
                while let Some((m_start, m_end)) = regex_bridge::find_separator(re, s, pos) {
                    out.push(Value::from_string(&s[start..m_start]));
                    start = m_end;
                    pos = m_end;
                    if pos >= s.len() {
                        break;
                    }
                }
                out.push(Value::from_string(&s[start..]));
            }
        }
    }
}

/// A character as a literal ERE
fn ere_literal(c: char) -> String {
    if c.is_ascii_punctuation() {
        format!("\\{}", c)
    } else {
        c.to_string()
    }
}

/// The current record and its fields
#[derive(Debug, Default)]
pub struct Fields {
    record: Value,
    /// `$1` onwards
    fields: Vec<Value>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `$0` and re-split it
    pub fn set_record(&mut self, text: AwkStr, splitter: &Splitter) {
        self.fields.clear();
        splitter.split_into(&text, &mut self.fields);
        self.record = Value::from_string(text);
    }

    pub fn nf(&self) -> usize {
        self.fields.len()
    }

    /// `$i`; fields past NF are uninitialized
    pub fn get(&self, i: usize) -> Value {
        if i == 0 {
            return self.record.clone();
        }
        self.fields.get(i - 1).cloned().unwrap_or_default()
    }

    /// Assign `$i` for i >= 1, growing the record if needed and rebuilding
    /// `$0` with `ofs`
    pub fn set_field(&mut self, i: usize, value: Value, ofs: &str) {
        debug_assert!(i > 0);
        if i > self.fields.len() {
            self.fields.resize(i, Value::Uninitialized);
        }
        self.fields[i - 1] = value;
        self.rebuild(ofs);
    }

    /// Assign NF: truncate or pad with uninitialized fields, then rebuild `$0`
    pub fn set_nf(&mut self, nf: usize, ofs: &str) {
        self.fields.resize(nf, Value::Uninitialized);
        self.rebuild(ofs);
    }

    fn rebuild(&mut self, ofs: &str) {
        let mut text = String::new();
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                text.push_str(ofs);
            }
            text.push_str(&field.as_str());
        }
        self.record = Value::from_string(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(s: &str, splitter: &Splitter) -> Vec<String> {
        let mut out = Vec::new();
        splitter.split_into(s, &mut out);
        out.iter().map(|v| v.as_str().into_owned()).collect()
    }

    #[test]
    fn test_blank_splitting() {
        assert_eq!(split("  a b\t\tc \n", &Splitter::Blank), ["a", "b", "c"]);
        assert!(split("   ", &Splitter::Blank).is_empty());
    }

    #[test]
    fn test_char_splitting_keeps_empty_fields() {
        assert_eq!(split("a::b:", &Splitter::Char(':')), ["a", "", "b", ""]);
        assert!(split("", &Splitter::Char(':')).is_empty());
    }

    #[test]
    fn test_regex_splitting() {
        let mut cache = RegexCache::new();
        let splitter = Splitter::from_fs("[,;]+", false, &mut cache).unwrap();
        assert_eq!(split("a,;b;c", &splitter), ["a", "b", "c"]);
        assert_eq!(split(",a", &splitter), ["", "a"]);
        assert_eq!(split("a,", &splitter), ["a", ""]);
    }

    #[test]
    fn test_empty_fs_splits_characters() {
        assert_eq!(split("héj", &Splitter::Empty), ["h", "é", "j"]);
    }

    #[test]
    fn test_paragraph_mode_adds_newline() {
        let mut cache = RegexCache::new();
        let splitter = Splitter::from_fs(":", true, &mut cache).unwrap();
        assert_eq!(split("a:b\nc", &splitter), ["a", "b", "c"]);
        let splitter = Splitter::from_fs(".", true, &mut cache).unwrap();
        assert_eq!(split("a.b\nc", &splitter), ["a", "b", "c"]);
    }

    #[test]
    fn test_field_assignment_rebuilds_record() {
        let mut fields = Fields::new();
        fields.set_record(AwkStr::from("a b c"), &Splitter::Blank);
        assert_eq!(fields.nf(), 3);
        fields.set_field(2, Value::str("X"), "-");
        assert_eq!(fields.get(0).as_str(), "a-X-c");
        fields.set_field(5, Value::str("e"), "-");
        assert_eq!(fields.nf(), 5);
        assert_eq!(fields.get(0).as_str(), "a-X-c--e");
        fields.set_nf(2, ",");
        assert_eq!(fields.get(0).as_str(), "a,X");
        assert!(matches!(fields.get(9), Value::Uninitialized));
    }

    #[test]
    fn test_padding_fields_are_uninitialized() {
        let mut fields = Fields::new();
        fields.set_record(AwkStr::from("a b"), &Splitter::Blank);
        fields.set_field(4, Value::str("d"), " ");
        assert!(matches!(fields.get(3), Value::Uninitialized));
        fields.set_nf(6, " ");
        assert!(matches!(fields.get(6), Value::Uninitialized));
        assert_eq!(fields.get(0).as_str(), "a b  d  ");
    }

    #[test]
    fn test_fields_are_numeric_strings() {
        let mut fields = Fields::new();
        fields.set_record(AwkStr::from("10 abc"), &Splitter::Blank);
        assert!(matches!(fields.get(1), Value::NumericString(_, n) if n == 10.0));
        assert!(matches!(fields.get(2), Value::String(_)));
    }
}
