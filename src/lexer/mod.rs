//! Scanner: AWK source text to [`Token`]s.
//!
//! Newlines are tokens because they end statements. Whether `/` divides or
//! opens a regex literal depends on the previous token, so the scanner keeps
//! that one bit of state. A name directly followed by `(` is scanned as a
//! [`TokenKind::FuncName`], since AWK forbids a space between a user
//! function name and its argument list in calls.

mod escape;
mod tokens;

pub use escape::{unescape, EscapeMode};
pub use tokens::{keyword_to_token, Builtin, Token, TokenKind};

use tracing::debug;

use crate::error::{Error, Result};

pub struct Lexer<'a> {
    source: &'a str,
    /// Byte offset of the next unread character
    pos: usize,
    line: usize,
    column: usize,
    /// The previous token ends an operand, so `/` divides
    after_operand: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
            after_operand: false,
        }
    }

    /// Scan the whole source; the last token is always `Eof`
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::with_capacity(self.source.len() / 3 + 1);
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        debug!(target: "awk::lexer", tokens = tokens.len(), "scanned program");
        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_trivia();
        let (line, column) = (self.line, self.column);
        let Some(c) = self.bump() else {
            return Ok(Token::new(TokenKind::Eof, line, column));
        };

        let kind = match c {
            '\n' => TokenKind::Newline,
            '"' => TokenKind::String(unescape(&self.literal_body('"', line, column)?, EscapeMode::String)),
            '/' if !self.after_operand => {
                TokenKind::Regex(unescape(&self.literal_body('/', line, column)?, EscapeMode::Regex))
            }
            '.' if self.peek().is_some_and(|d| d.is_ascii_digit()) => self.number(self.pos - 1, line, column)?,
            '0'..='9' => self.number(self.pos - 1, line, column)?,
            'a'..='z' | 'A'..='Z' | '_' => self.word(self.pos - 1),
            _ => match self.operator(c) {
                Some(kind) => kind,
                None => return Err(Error::lexer(unexpected(c), line, column)),
            },
        };

        self.after_operand = kind.produces_value();
        Ok(Token::new(kind, line, column))
    }

    // ===== cursor =====

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consume `c` if it is next
    fn eat(&mut self, c: char) -> bool {
        let found = self.peek() == Some(c);
        if found {
            self.bump();
        }
        found
    }

    /// Consume characters while `pred` holds
    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }

    /// `with` if `next` follows (consuming it), else `without`
    fn then(&mut self, next: char, with: TokenKind, without: TokenKind) -> TokenKind {
        if self.eat(next) { with } else { without }
    }

    /// Blanks, comments and backslash-newline continuations
    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            if rest.starts_with([' ', '\t', '\r']) {
                self.bump();
            } else if rest.starts_with("\\\n") || rest.starts_with("\\\r\n") {
                self.eat_while(|c| c != '\n');
                self.bump();
            } else if rest.starts_with('#') {
                self.eat_while(|c| c != '\n');
            } else {
                return;
            }
        }
    }

    // ===== token classes =====

    fn operator(&mut self, c: char) -> Option<TokenKind> {
        use TokenKind::*;

        Some(match c {
            '+' if self.eat('+') => Increment,
            '+' => self.then('=', PlusAssign, Plus),
            '-' if self.eat('-') => Decrement,
            '-' => self.then('=', MinusAssign, Minus),
            // `**` and `**=` are spellings of `^` and `^=`
            '*' if self.eat('*') => self.then('=', CaretAssign, Caret),
            '*' => self.then('=', StarAssign, Star),
            '/' => self.then('=', SlashAssign, Slash),
            '%' => self.then('=', PercentAssign, Percent),
            '^' => self.then('=', CaretAssign, Caret),
            '=' => self.then('=', Equal, Assign),
            '<' => self.then('=', LessEqual, Less),
            '>' if self.eat('>') => Append,
            '>' => self.then('=', GreaterEqual, Greater),
            '!' if self.eat('~') => NotMatch,
            '!' => self.then('=', NotEqual, Not),
            '~' => Match,
            '&' if self.eat('&') => And,
            '|' => self.then('|', Or, Pipe),
            '$' => Dollar,
            '?' => Question,
            ':' => Colon,
            '(' => LeftParen,
            ')' => RightParen,
            '{' => LeftBrace,
            '}' => RightBrace,
            '[' => LeftBracket,
            ']' => RightBracket,
            ';' => Semicolon,
            ',' => Comma,
            _ => return None,
        })
    }

    /// Raw text of a `"..."` or `/.../` literal whose opening `delim` was
    /// just consumed. Escape pairs are kept for [`unescape`]; a
    /// backslash-newline joins the next line.
    fn literal_body(&mut self, delim: char, line: usize, column: usize) -> Result<String> {
        let mut raw = String::new();
        loop {
            match self.bump() {
                Some(c) if c == delim => return Ok(raw),
                Some('\\') => match self.bump() {
                    Some('\n') => {}
                    Some(c) => {
                        raw.push('\\');
                        raw.push(c);
                    }
                    None => break,
                },
                Some('\n') | None => break,
                Some(c) => raw.push(c),
            }
        }
        let what = if delim == '"' { "string" } else { "regex" };
        Err(Error::lexer(format!("unterminated {}", what), line, column))
    }

    /// Decimal number starting at byte `start`: digits, an optional
    /// fraction, and an exponent only when digits follow the `e`
    fn number(&mut self, start: usize, line: usize, column: usize) -> Result<TokenKind> {
        self.eat_while(|c| c.is_ascii_digit());
        if self.eat('.') {
            self.eat_while(|c| c.is_ascii_digit());
        }
        if self.rest().starts_with(['e', 'E']) {
            let exponent = self.rest()[1..].trim_start_matches(['+', '-']);
            let signs = self.rest().len() - 1 - exponent.len();
            if signs <= 1 && exponent.starts_with(|c: char| c.is_ascii_digit()) {
                for _ in 0..=signs {
                    self.bump();
                }
                self.eat_while(|c| c.is_ascii_digit());
            }
        }
        let text = &self.source[start..self.pos];
        text.parse()
            .map(TokenKind::Number)
            .map_err(|_| Error::lexer(format!("invalid number '{}'", text), line, column))
    }

    /// Keyword, builtin, function name (when `(` follows at once) or
    /// variable name starting at byte `start`
    fn word(&mut self, start: usize) -> TokenKind {
        self.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let name = &self.source[start..self.pos];
        if let Some(keyword) = keyword_to_token(name) {
            keyword
        } else if let Some(builtin) = Builtin::from_name(name) {
            TokenKind::Builtin(builtin)
        } else if self.peek() == Some('(') {
            TokenKind::FuncName(name.to_string())
        } else {
            TokenKind::Identifier(name.to_string())
        }
    }
}

fn unexpected(c: char) -> String {
    match c {
        '&' => "unexpected '&', did you mean '&&'?".to_string(),
        '\\' => "backslash not last character on line".to_string(),
        '\0' => "NUL character in program text".to_string(),
        _ => format!("unexpected character '{}'", c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut kinds: Vec<_> = Lexer::new(source).tokenize().unwrap().into_iter().map(|t| t.kind).collect();
        assert_eq!(kinds.pop(), Some(Eof));
        kinds
    }

    fn ident(name: &str) -> TokenKind {
        Identifier(name.to_string())
    }

    #[test]
    fn test_operators_take_longest_match() {
        assert_eq!(
            kinds("a++ b-- c+=1 d>>e f!~g h||i"),
            [
                ident("a"), Increment, ident("b"), Decrement, ident("c"), PlusAssign, Number(1.0),
                ident("d"), Append, ident("e"), ident("f"), NotMatch, ident("g"), ident("h"), Or, ident("i"),
            ]
        );
        assert_eq!(kinds("x<=y != z"), [ident("x"), LessEqual, ident("y"), NotEqual, ident("z")]);
        assert_eq!(kinds("cmd | getline"), [ident("cmd"), Pipe, Getline]);
    }

    #[test]
    fn test_power_spellings() {
        assert_eq!(kinds("a ** 2"), [ident("a"), Caret, Number(2.0)]);
        assert_eq!(kinds("a **= 3"), [ident("a"), CaretAssign, Number(3.0)]);
        assert_eq!(kinds("a ^= 3"), [ident("a"), CaretAssign, Number(3.0)]);
        assert_eq!(kinds("a * *b"), [ident("a"), Star, Star, ident("b")]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42 .5 3. 1e3 2.5E-2"), [Number(42.0), Number(0.5), Number(3.0), Number(1000.0), Number(0.025)]);
    }

    #[test]
    fn test_exponent_needs_digits() {
        assert_eq!(kinds("1e x"), [Number(1.0), ident("e"), ident("x")]);
        assert_eq!(kinds("2e+"), [Number(2.0), ident("e"), Plus]);
        assert_eq!(kinds("3e+-4"), [Number(3.0), ident("e"), Plus, Minus, Number(4.0)]);
    }

    #[test]
    fn test_word_classes() {
        assert_eq!(
            kinds("foo(1) bar (2) substr(x) func BEGIN"),
            [
                FuncName("foo".into()), LeftParen, Number(1.0), RightParen,
                ident("bar"), LeftParen, Number(2.0), RightParen,
                Builtin(super::Builtin::Substr), LeftParen, ident("x"), RightParen,
                Function, Begin,
            ]
        );
    }

    #[test]
    fn test_slash_after_operand_divides() {
        assert_eq!(kinds("x / 2"), [ident("x"), Slash, Number(2.0)]);
        assert_eq!(kinds("length / 2"), [Builtin(super::Builtin::Length), Slash, Number(2.0)]);
        assert_eq!(kinds("(a) /= 2"), [LeftParen, ident("a"), RightParen, SlashAssign, Number(2.0)]);
        assert_eq!(kinds("$1/2"), [Dollar, Number(1.0), Slash, Number(2.0)]);
    }

    #[test]
    fn test_slash_elsewhere_opens_regex() {
        assert_eq!(kinds("/pat/"), [Regex("pat".into())]);
        assert_eq!(kinds("x ~ /a=b/"), [ident("x"), Match, Regex("a=b".into())]);
        assert_eq!(kinds("/=/"), [Regex("=".into())]);
        assert_eq!(kinds(r"/a\/b\.c/"), [Regex(r"a/b\.c".into())]);
    }

    #[test]
    fn test_strings_are_unescaped() {
        assert_eq!(kinds(r#""hello" "tab\there" "q\"""#), [String("hello".into()), String("tab\there".into()), String("q\"".into())]);
        assert_eq!(kinds("\"ab\\\ncd\""), [String("abcd".into())]);
        assert_eq!(kinds("\"caf\u{e9}\""), [String("caf\u{e9}".into())]);
    }

    #[test]
    fn test_newlines_comments_and_continuations() {
        assert_eq!(kinds("a \\\n b # note\nc"), [ident("a"), ident("b"), Newline, ident("c")]);
        assert_eq!(kinds("a \\\r\n b"), [ident("a"), ident("b")]);
        assert!(kinds("# only a comment").is_empty());
    }

    #[test]
    fn test_locations() {
        let tokens = Lexer::new("a\n  bb c\n\"s\"").tokenize().unwrap();
        let at: Vec<_> = tokens.iter().map(|t| (t.location.line, t.location.column)).collect();
        assert_eq!(at, [(1, 1), (1, 2), (2, 3), (2, 6), (2, 7), (3, 1), (3, 4)]);
    }

    #[test]
    fn test_fatal_scan_errors() {
        let message = |source: &str| Lexer::new(source).tokenize().unwrap_err().to_string();
        assert!(message("\"abc").contains("unterminated string"));
        assert!(message("\"ab\ncd\"").contains("unterminated string"));
        assert!(message("/abc\n/").contains("unterminated regex"));
        assert!(message("a \\ b").contains("backslash"));
        assert!(message("a & b").contains("&&"));
        assert!(message("a\0b").contains("NUL"));
        assert!(message("a @ b").contains("'@'"));
    }
}
