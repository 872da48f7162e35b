use crate::error::SourceLocation;

/// All token types in AWK
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    String(String),
    /// Regex literal, escapes already processed into ERE syntax
    Regex(String),

    // Identifiers and keywords
    Identifier(String),
    /// User function name directly followed by `(`
    FuncName(String),
    Builtin(Builtin),
    Begin,
    End,
    If,
    Else,
    While,
    For,
    Do,
    Break,
    Continue,
    Function,
    Return,
    Delete,
    Exit,
    Next,
    Nextfile,
    Getline,
    Print,
    Printf,
    In,

    // Operators - Arithmetic
    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %
    Caret,   // ^ or **

    // Operators - Comparison
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=
    Equal,        // ==
    NotEqual,     // !=

    // Operators - Logical
    And, // &&
    Or,  // ||
    Not, // !

    // Operators - Regex
    Match,    // ~
    NotMatch, // !~

    // Operators - Assignment
    Assign,        // =
    PlusAssign,    // +=
    MinusAssign,   // -=
    StarAssign,    // *=
    SlashAssign,   // /=
    PercentAssign, // %=
    CaretAssign,   // ^= or **=

    // Operators - Increment/Decrement
    Increment, // ++
    Decrement, // --

    // Special operators
    Dollar,   // $ (field access)
    Question, // ?
    Colon,    // :
    Pipe,     // |
    Append,   // >>

    // Delimiters
    LeftParen,    // (
    RightParen,   // )
    LeftBrace,    // {
    RightBrace,   // }
    LeftBracket,  // [
    RightBracket, // ]
    Semicolon,    // ;
    Comma,        // ,
    Newline,      // \n (significant in AWK)

    // End of file
    Eof,
}

impl TokenKind {
    /// Check if this token is a keyword
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Begin
                | TokenKind::End
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Do
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Function
                | TokenKind::Return
                | TokenKind::Delete
                | TokenKind::Exit
                | TokenKind::Next
                | TokenKind::Nextfile
                | TokenKind::Getline
                | TokenKind::Print
                | TokenKind::Printf
                | TokenKind::In
        )
    }

    /// Check if this token can start an operand of an implicit concatenation
    pub fn starts_concatenation(&self) -> bool {
        matches!(
            self,
            TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::Regex(_)
                | TokenKind::Identifier(_)
                | TokenKind::FuncName(_)
                | TokenKind::Builtin(_)
                | TokenKind::LeftParen
                | TokenKind::Dollar
                | TokenKind::Not
                | TokenKind::Getline
                | TokenKind::Increment
                | TokenKind::Decrement
        )
    }

    /// Check if this token produces a value (for regex vs division disambiguation)
    pub fn produces_value(&self) -> bool {
        matches!(
            self,
            TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::Identifier(_)
                | TokenKind::Builtin(_)
                | TokenKind::Getline
                | TokenKind::RightParen
                | TokenKind::RightBracket
                | TokenKind::Increment
                | TokenKind::Decrement
        )
    }

    /// Tokens that end a simple statement
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::RightBrace | TokenKind::Eof
        )
    }
}

/// A token with its location in the source
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
}

impl Token {
    pub fn new(kind: TokenKind, line: usize, column: usize) -> Self {
        Self {
            kind,
            location: SourceLocation::new(line, column),
        }
    }
}

/// Built-in functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Atan2,
    Cos,
    Sin,
    Exp,
    Log,
    Sqrt,
    Int,
    Rand,
    Srand,
    Length,
    Substr,
    Index,
    Match,
    Split,
    Sub,
    Gsub,
    Sprintf,
    Tolower,
    Toupper,
    Close,
    Fflush,
    System,
    And,
    Or,
    Xor,
    Lshift,
    Rshift,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "atan2" => Builtin::Atan2,
            "cos" => Builtin::Cos,
            "sin" => Builtin::Sin,
            "exp" => Builtin::Exp,
            "log" => Builtin::Log,
            "sqrt" => Builtin::Sqrt,
            "int" => Builtin::Int,
            "rand" => Builtin::Rand,
            "srand" => Builtin::Srand,
            "length" => Builtin::Length,
            "substr" => Builtin::Substr,
            "index" => Builtin::Index,
            "match" => Builtin::Match,
            "split" => Builtin::Split,
            "sub" => Builtin::Sub,
            "gsub" => Builtin::Gsub,
            "sprintf" => Builtin::Sprintf,
            "tolower" => Builtin::Tolower,
            "toupper" => Builtin::Toupper,
            "close" => Builtin::Close,
            "fflush" => Builtin::Fflush,
            "system" => Builtin::System,
            "and" => Builtin::And,
            "or" => Builtin::Or,
            "xor" => Builtin::Xor,
            "lshift" => Builtin::Lshift,
            "rshift" => Builtin::Rshift,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Atan2 => "atan2",
            Builtin::Cos => "cos",
            Builtin::Sin => "sin",
            Builtin::Exp => "exp",
            Builtin::Log => "log",
            Builtin::Sqrt => "sqrt",
            Builtin::Int => "int",
            Builtin::Rand => "rand",
            Builtin::Srand => "srand",
            Builtin::Length => "length",
            Builtin::Substr => "substr",
            Builtin::Index => "index",
            Builtin::Match => "match",
            Builtin::Split => "split",
            Builtin::Sub => "sub",
            Builtin::Gsub => "gsub",
            Builtin::Sprintf => "sprintf",
            Builtin::Tolower => "tolower",
            Builtin::Toupper => "toupper",
            Builtin::Close => "close",
            Builtin::Fflush => "fflush",
            Builtin::System => "system",
            Builtin::And => "and",
            Builtin::Or => "or",
            Builtin::Xor => "xor",
            Builtin::Lshift => "lshift",
            Builtin::Rshift => "rshift",
        }
    }

    /// Accepted argument counts as (min, max); `None` means unbounded
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            Builtin::Rand => (0, Some(0)),
            Builtin::Cos
            | Builtin::Sin
            | Builtin::Exp
            | Builtin::Log
            | Builtin::Sqrt
            | Builtin::Int
            | Builtin::Tolower
            | Builtin::Toupper
            | Builtin::Close
            | Builtin::System => (1, Some(1)),
            Builtin::Atan2 | Builtin::Match | Builtin::Index | Builtin::Lshift | Builtin::Rshift => {
                (2, Some(2))
            }
            Builtin::And | Builtin::Or | Builtin::Xor => (2, None),
            Builtin::Sub | Builtin::Gsub | Builtin::Split | Builtin::Substr => (2, Some(3)),
            Builtin::Srand | Builtin::Length | Builtin::Fflush => (0, Some(1)),
            Builtin::Sprintf => (1, None),
        }
    }
}

/// Map keyword strings to token kinds
pub fn keyword_to_token(s: &str) -> Option<TokenKind> {
    match s {
        "BEGIN" => Some(TokenKind::Begin),
        "END" => Some(TokenKind::End),
        "if" => Some(TokenKind::If),
        "else" => Some(TokenKind::Else),
        "while" => Some(TokenKind::While),
        "for" => Some(TokenKind::For),
        "do" => Some(TokenKind::Do),
        "break" => Some(TokenKind::Break),
        "continue" => Some(TokenKind::Continue),
        "function" | "func" => Some(TokenKind::Function),
        "return" => Some(TokenKind::Return),
        "delete" => Some(TokenKind::Delete),
        "exit" => Some(TokenKind::Exit),
        "next" => Some(TokenKind::Next),
        "nextfile" => Some(TokenKind::Nextfile),
        "getline" => Some(TokenKind::Getline),
        "print" => Some(TokenKind::Print),
        "printf" => Some(TokenKind::Printf),
        "in" => Some(TokenKind::In),
        _ => None,
    }
}
