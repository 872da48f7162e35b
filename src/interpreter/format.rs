//! `printf`-style formatting and number to string conversion.

use crate::value::Value;

/// Convert a number to its string form (CONVFMT/OFMT semantics)
///
/// Integral values print as integers regardless of the format.
pub fn format_number(n: f64, fmt: &str) -> String {
    if n.fract() == 0.0 && n.abs() < 1e16 {
        if n == 0.0 && n.is_sign_negative() {
            return "-0".to_string();
        }
        return format!("{}", n as i64);
    }
    if fmt == "%.6g" {
        return format_g(n, 6, false, false);
    }
    sprintf(fmt, &[Value::Number(n)], "%.6g")
}

/// Parsed flags of one conversion specification
#[derive(Debug, Default, Clone, Copy)]
struct Spec {
    left: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
}

impl Spec {
    fn sign(&self, negative: bool) -> &'static str {
        if negative {
            "-"
        } else if self.plus {
            "+"
        } else if self.space {
            " "
        } else {
            ""
        }
    }

    /// Pad `body` (which follows `prefix`) to the field width
    fn pad(&self, prefix: &str, body: &str, zero_ok: bool) -> String {
        let len = prefix.chars().count() + body.chars().count();
        if len >= self.width {
            return format!("{}{}", prefix, body);
        }
        let fill = self.width - len;
        if self.left {
            format!("{}{}{}", prefix, body, " ".repeat(fill))
        } else if self.zero && zero_ok {
            format!("{}{}{}", prefix, "0".repeat(fill), body)
        } else {
            format!("{}{}{}", " ".repeat(fill), prefix, body)
        }
    }
}

/// Format `args` according to `fmt`, C `printf` style
///
/// Supports the flags `-+ #0`, `*` widths and precisions, and the
/// conversions `d i o u x X c s e E f F g G %`. Missing arguments are
/// empty/zero; an unknown conversion is copied to the output unchanged.
pub fn sprintf(fmt: &str, args: &[Value], convfmt: &str) -> String {
    let mut out = String::with_capacity(fmt.len() + 16);
    let chars: Vec<char> = fmt.chars().collect();
    let mut args = args.iter();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '%' {
            out.push(c);
            i += 1;
            continue;
        }
        let start = i;
        i += 1;
        if chars.get(i) == Some(&'%') {
            out.push('%');
            i += 1;
            continue;
        }

        let mut spec = Spec::default();
        while let Some(&f) = chars.get(i) {
            match f {
                '-' => spec.left = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '#' => spec.alt = true,
                '0' => spec.zero = true,
                _ => break,
            }
            i += 1;
        }

        if chars.get(i) == Some(&'*') {
            i += 1;
            let w = args.next().map_or(0.0, Value::to_number) as i64;
            if w < 0 {
                spec.left = true;
            }
            spec.width = w.unsigned_abs() as usize;
        } else {
            spec.width = read_digits(&chars, &mut i).unwrap_or(0);
        }

        if chars.get(i) == Some(&'.') {
            i += 1;
            if chars.get(i) == Some(&'*') {
                i += 1;
                let p = args.next().map_or(0.0, Value::to_number) as i64;
                spec.precision = (p >= 0).then_some(p as usize);
            } else {
                spec.precision = Some(read_digits(&chars, &mut i).unwrap_or(0));
            }
        }

        // length modifiers mean nothing here
        while matches!(chars.get(i), Some('h' | 'l' | 'L' | 'q' | 'j' | 'z' | 't')) {
            i += 1;
        }

        let Some(&conv) = chars.get(i) else {
            out.extend(&chars[start..]);
            break;
        };
        i += 1;

        let arg = match conv {
            'd' | 'i' | 'o' | 'u' | 'x' | 'X' | 'c' | 's' | 'e' | 'E' | 'f' | 'F' | 'g' | 'G' => {
                args.next().unwrap_or(&Value::Uninitialized)
            }
            _ => {
                out.extend(&chars[start..i]);
                continue;
            }
        };

        let formatted = match conv {
            'd' | 'i' => format_signed(arg.to_number(), &spec),
            'o' | 'u' | 'x' | 'X' => format_unsigned(arg.to_number(), conv, &spec),
            'c' => {
                let ch = match arg {
                    Value::String(s) => s.chars().next().map(String::from).unwrap_or_default(),
                    other => char::from_u32(other.to_number() as u32)
                        .map(String::from)
                        .unwrap_or_default(),
                };
                spec.pad("", &ch, false)
            }
            's' => {
                let s = arg.as_str_with(convfmt);
                let body: String = match spec.precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s.into_owned(),
                };
                spec.pad("", &body, false)
            }
            _ => format_float(arg.to_number(), conv, &spec),
        };
        out.push_str(&formatted);
    }
    out
}

fn read_digits(chars: &[char], i: &mut usize) -> Option<usize> {
    let start = *i;
    while chars.get(*i).is_some_and(char::is_ascii_digit) {
        *i += 1;
    }
    chars[start..*i].iter().collect::<String>().parse().ok()
}

fn non_finite(n: f64, upper: bool, spec: &Spec) -> String {
    let body = match (n.is_nan(), upper) {
        (true, false) => "nan",
        (true, true) => "NAN",
        (false, false) => "inf",
        (false, true) => "INF",
    };
    spec.pad(spec.sign(n.is_sign_negative()), body, false)
}

fn format_signed(n: f64, spec: &Spec) -> String {
    if !n.is_finite() {
        return non_finite(n, false, spec);
    }
    let v = n.trunc() as i128;
    let mut digits = v.unsigned_abs().to_string();
    if let Some(p) = spec.precision {
        if p == 0 && v == 0 {
            digits.clear();
        } else if digits.len() < p {
            digits = format!("{}{}", "0".repeat(p - digits.len()), digits);
        }
    }
    spec.pad(spec.sign(v < 0), &digits, spec.precision.is_none())
}

fn format_unsigned(n: f64, conv: char, spec: &Spec) -> String {
    if !n.is_finite() {
        return non_finite(n, conv == 'X', spec);
    }
    let v = if n < 0.0 { n as i64 as u64 } else { n as u64 };
    let mut digits = match conv {
        'o' => format!("{:o}", v),
        'x' => format!("{:x}", v),
        'X' => format!("{:X}", v),
        _ => v.to_string(),
    };
    if let Some(p) = spec.precision {
        if p == 0 && v == 0 {
            digits.clear();
        } else if digits.len() < p {
            digits = format!("{}{}", "0".repeat(p - digits.len()), digits);
        }
    }
    let prefix = match conv {
        'o' if spec.alt && !digits.starts_with('0') => "0",
        'x' if spec.alt && v != 0 => "0x",
        'X' if spec.alt && v != 0 => "0X",
        _ => "",
    };
    spec.pad(prefix, &digits, spec.precision.is_none())
}

fn format_float(n: f64, conv: char, spec: &Spec) -> String {
    let upper = conv.is_ascii_uppercase();
    if !n.is_finite() {
        return non_finite(n, upper, spec);
    }
    let prec = spec.precision.unwrap_or(6);
    let abs = n.abs();
    let mut body = match conv {
        'f' | 'F' => format!("{:.*}", prec, abs),
        'e' | 'E' => format_e(abs, prec, upper),
        _ => format_g(abs, prec, spec.alt, upper),
    };
    if spec.alt && prec == 0 && matches!(conv, 'f' | 'F') {
        body.push('.');
    }
    spec.pad(spec.sign(n.is_sign_negative()), &body, true)
}

/// `%e`: mantissa with `prec` decimals and an exponent of at least two digits
fn format_e(n: f64, prec: usize, upper: bool) -> String {
    let raw = format!("{:.*e}", prec, n);
    let (mantissa, exp) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    let e = if upper { 'E' } else { 'e' };
    format!("{}{}{}{:02}", mantissa, e, sign, exp.abs())
}

/// `%g`: shortest of `%e` and `%f` with `prec` significant digits
pub(crate) fn format_g(n: f64, prec: usize, alt: bool, upper: bool) -> String {
    if !n.is_finite() {
        return non_finite(n, upper, &Spec::default());
    }
    let p = prec.max(1);
    let sci = format!("{:.*e}", p - 1, n);
    let exp: i32 = sci
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);

    if exp < -4 || exp >= p as i32 {
        let formatted = format_e(n, p - 1, upper);
        if alt {
            return formatted;
        }
        let split = formatted.find(['e', 'E']).unwrap_or(formatted.len());
        let (mantissa, exponent) = formatted.split_at(split);
        format!("{}{}", strip_zeros(mantissa), exponent)
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        let formatted = format!("{:.*}", decimals, n);
        if alt {
            formatted
        } else {
            strip_zeros(&formatted).to_string()
        }
    }
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
