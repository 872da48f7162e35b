use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::lexer::Builtin;
use crate::program::special;
use crate::value::Value;

use super::format::sprintf;
use super::io::{shell, Encoding};
use super::Interpreter;

impl<'a> Interpreter<'a> {
    /// Call a builtin whose arguments have been evaluated. `split`, `sub`
    /// and `gsub` have their own instructions and never come through here.
    pub(super) fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: Vec<Value>,
        out: &mut dyn Write,
    ) -> Result<Value> {
        let num = |i: usize| args.get(i).map_or(0.0, Value::to_number);

        let result = match builtin {
            Builtin::Atan2 => Value::Number(num(0).atan2(num(1))),
            Builtin::Cos => Value::Number(num(0).cos()),
            Builtin::Sin => Value::Number(num(0).sin()),
            Builtin::Exp => Value::Number(num(0).exp()),
            Builtin::Log => Value::Number(num(0).ln()),
            Builtin::Sqrt => Value::Number(num(0).sqrt()),
            Builtin::Int => Value::Number(num(0).trunc()),
            Builtin::Rand => Value::Number(self.rng.rand()),
            Builtin::Srand => Value::Number(self.rng.srand(args.first().map(Value::to_number))),

            Builtin::Length => match args.first() {
                Some(Value::Map(map) | Value::Undecided(map)) => Value::Number(map.borrow().len() as f64),
                Some(v) => Value::Number(v.as_str_with(&self.convfmt).chars().count() as f64),
                None => Value::Number(self.fields.get(0).as_str().chars().count() as f64),
            },
            Builtin::Substr => {
                let s = self.string_arg(&args, 0);
                let length = args.get(2).map(Value::to_number);
                Value::str(substr(&s, num(1), length))
            }
            Builtin::Index => {
                let s = self.string_arg(&args, 0);
                let t = self.string_arg(&args, 1);
                Value::Number(index(&s, &t) as f64)
            }
            Builtin::Match => {
                let s = self.string_arg(&args, 0);
                let re = match args.get(1) {
                    Some(pattern) => self.regex_of(pattern)?,
                    None => return Err(Error::runtime("match: missing regex")),
                };
                let (start, length) = match re.find(&s) {
                    Some(m) => (
                        s[..m.start()].chars().count() + 1,
                        m.as_str().chars().count() as f64,
                    ),
                    None => (0, -1.0),
                };
                self.globals[special::RSTART] = Value::Number(start as f64);
                self.globals[special::RLENGTH] = Value::Number(length);
                Value::Number(start as f64)
            }
            Builtin::Sprintf => match args.split_first() {
                Some((format, rest)) => {
                    let format = format.as_str_with(&self.convfmt).into_owned();
                    Value::str(sprintf(&format, rest, &self.convfmt))
                }
                None => Value::str(""),
            },
            // bytes above 0x7f are not letters in byte mode
            Builtin::Tolower => {
                let s = self.string_arg(&args, 0);
                Value::str(match self.encoding {
                    Encoding::Utf8 => s.to_lowercase(),
                    Encoding::Bytes => s.to_ascii_lowercase(),
                })
            }
            Builtin::Toupper => {
                let s = self.string_arg(&args, 0);
                Value::str(match self.encoding {
                    Encoding::Utf8 => s.to_uppercase(),
                    Encoding::Bytes => s.to_ascii_uppercase(),
                })
            }

            Builtin::Close => {
                let name = self.string_arg(&args, 0);
                let status = match self.streams.close(&name) {
                    Some(Ok(status)) => status,
                    Some(Err(e)) => {
                        debug!(target: "awk::io", name = %name, error = %e, "close failed");
                        -1
                    }
                    None => -1,
                };
                Value::Number(f64::from(status))
            }
            Builtin::Fflush => {
                let name = self.string_arg(&args, 0);
                if name.is_empty() {
                    out.flush()?;
                    self.streams.flush_all()?;
                    Value::Number(0.0)
                } else if name == "/dev/stdout" {
                    out.flush()?;
                    Value::Number(0.0)
                } else if self.streams.flush(&name)? {
                    Value::Number(0.0)
                } else {
                    Value::Number(-1.0)
                }
            }
            Builtin::System => {
                let command = self.string_arg(&args, 0);
                out.flush()?;
                self.streams.flush_all()?;
                debug!(target: "awk::io", command = %command, "system");
                let status = shell(&command, self.encoding)
                    .status()
                    .map(|s| s.code().unwrap_or(-1))
                    .unwrap_or(-1);
                Value::Number(f64::from(status))
            }

            Builtin::And => Value::Number((to_uint(num(0)) & to_uint(num(1))) as f64),
            Builtin::Or => Value::Number((to_uint(num(0)) | to_uint(num(1))) as f64),
            Builtin::Xor => Value::Number((to_uint(num(0)) ^ to_uint(num(1))) as f64),
            Builtin::Lshift => {
                let shifted = to_uint(num(0)).checked_shl(num(1) as u32).unwrap_or(0);
                Value::Number(shifted as f64)
            }
            Builtin::Rshift => {
                let shifted = to_uint(num(0)).checked_shr(num(1) as u32).unwrap_or(0);
                Value::Number(shifted as f64)
            }

            Builtin::Split | Builtin::Sub | Builtin::Gsub => {
                return Err(Error::runtime(format!("{}: bad call", builtin.name())));
            }
        };
        Ok(result)
    }

    fn string_arg(&self, args: &[Value], i: usize) -> String {
        args.get(i)
            .map(|v| v.as_str_with(&self.convfmt).into_owned())
            .unwrap_or_default()
    }
}

fn to_uint(n: f64) -> u64 {
    n.trunc() as u64
}

/// `substr(s, m [, n])`: characters at positions m through m+n-1, with the
/// positions rounded and clamped to the string
pub(super) fn substr(s: &str, m: f64, n: Option<f64>) -> String {
    let len = s.chars().count() as f64;
    let start = m.round_ties_even();
    let end = match n {
        Some(n) => start + n.round_ties_even(),
        None => f64::INFINITY,
    };
    let start = if start.is_nan() { 1.0 } else { start.max(1.0) };
    let end = if end.is_nan() { start } else { end.min(len + 1.0) };
    if end <= start {
        return String::new();
    }
    s.chars()
        .skip(start as usize - 1)
        .take((end - start) as usize)
        .collect()
}

/// 1-based character position of `t` in `s`, 0 when absent
pub(super) fn index(s: &str, t: &str) -> usize {
    if t.is_empty() {
        return 0;
    }
    s.find(t).map_or(0, |i| s[..i].chars().count() + 1)
}

/// Replace the first (or every) match of `re` in `text`.
///
/// Returns the new text and the number of replacements, or `None` when
/// nothing matched. An empty match right after the previous match is not
/// replaced.
pub(super) fn substitute(re: &Regex, text: &str, repl: &str, global: bool) -> Option<(String, usize)> {
    let mut out = String::with_capacity(text.len());
    let mut count = 0;
    let mut pos = 0;
    let mut copied = 0;
    let mut last_end = None;

    while pos <= text.len() {
        let Some(m) = re.find_at(text, pos) else {
            break;
        };
        let (start, end) = (m.start(), m.end());
        if start == end && last_end == Some(start) {
            match text[start..].chars().next() {
                Some(c) => {
                    pos = start + c.len_utf8();
                    continue;
                }
                None => break,
            }
        }

        out.push_str(&text[copied..start]);
        expand_replacement(repl, &text[start..end], &mut out);
        count += 1;
        copied = end;
        last_end = Some(end);
        if !global {
            break;
        }

        if start == end {
            match text[end..].chars().next() {
                Some(c) => {
                    out.push(c);
                    copied = end + c.len_utf8();
                    pos = copied;
                }
                None => break,
            }
        } else {
            pos = end;
        }
    }

    if count == 0 {
        return None;
    }
    out.push_str(&text[copied..]);
    Some((out, count))
}

/// Append `repl` with `&` standing for the matched text.
///
/// `\&` is a literal ampersand, `\\&` a backslash followed by the match and
/// `\\\&` a literal `\&`. Other backslashes are kept as they are.
fn expand_replacement(repl: &str, matched: &str, out: &mut String) {
    let mut rest = repl;
    while let Some(c) = rest.chars().next() {
        if let Some(tail) = rest.strip_prefix(r"\\\&") {
            out.push_str(r"\&");
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix(r"\\&") {
            out.push('\\');
            out.push_str(matched);
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix(r"\&") {
            out.push('&');
            rest = tail;
        } else if c == '&' {
            out.push_str(matched);
            rest = &rest[1..];
        } else {
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
}

/// Generator behind `rand()` and `srand()`
#[derive(Debug)]
pub struct Rng {
    seed: f64,
    state: u64,
}

impl Rng {
    /// A generator seeded with 0, so runs are reproducible until `srand()`
    pub fn new() -> Self {
        let mut rng = Rng { seed: 0.0, state: 0 };
        rng.reseed(0.0);
        rng
    }

    fn reseed(&mut self, seed: f64) {
        self.seed = seed;
        self.state = splitmix(seed.to_bits());
        if self.state == 0 {
            self.state = 0x9e37_79b9_7f4a_7c15;
        }
    }

    /// Uniform value in [0, 1)
    pub fn rand(&mut self) -> f64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Reseed with `seed`, or the time of day; returns the previous seed
    pub fn srand(&mut self, seed: Option<f64>) -> f64 {
        let previous = self.seed;
        let seed = seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0.0, |d| d.as_secs() as f64)
        });
        self.reseed(seed);
        previous
    }
}

fn splitmix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
