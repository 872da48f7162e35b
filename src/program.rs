//! Compiled program representation: bytecode, literal pool and symbol tables.

use std::fmt;
use std::rc::Rc;

use regex::Regex;

use crate::error::SourceLocation;
use crate::lexer::Builtin;
use crate::value::AwkStr;

/// Global slots of the special variables, in the order they are created
pub mod special {
    pub const ARGC: usize = 0;
    pub const ARGV: usize = 1;
    pub const CONVFMT: usize = 2;
    pub const ENVIRON: usize = 3;
    pub const FILENAME: usize = 4;
    pub const FNR: usize = 5;
    pub const FS: usize = 6;
    pub const NF: usize = 7;
    pub const NR: usize = 8;
    pub const OFMT: usize = 9;
    pub const OFS: usize = 10;
    pub const ORS: usize = 11;
    pub const RLENGTH: usize = 12;
    pub const RS: usize = 13;
    pub const RSTART: usize = 14;
    pub const SUBSEP: usize = 15;

    pub const NAMES: [&str; 16] = [
        "ARGC", "ARGV", "CONVFMT", "ENVIRON", "FILENAME", "FNR", "FS", "NF", "NR", "OFMT", "OFS",
        "ORS", "RLENGTH", "RS", "RSTART", "SUBSEP",
    ];
}

/// What a variable has been inferred to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Unknown,
    Scalar,
    Map,
}

/// Variable address: a global slot or a frame-relative local
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    Global(usize),
    Local(usize),
}

/// Assignment target. Operands (field index, subscript) sit on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lvalue {
    Var(Var),
    /// `$expr`, index on the stack
    Field,
    /// `name[expr]`, subscript on the stack
    Elem(Var),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// Output redirection of `print`/`printf`; the target is on top of the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    None,
    File,
    Append,
    Pipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetlineSource {
    /// Current input (ARGV files or stdin)
    Main,
    /// `getline < file`: file name on top, target operands below it
    File,
    /// `cmd | getline`: target operands on top, command below them
    Pipe,
}

/// One VM instruction. Jump targets are absolute instruction indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    PushLiteral(usize),
    PushUninit,
    LoadVar(Var),
    /// Bare variable passed to a function: pushes arrays by reference
    PushArg(Var),
    LoadField,
    LoadElem(Var),
    /// Join the top n values with SUBSEP
    Subscript(usize),
    In(Var),
    Delete(Var),
    DeleteAll(Var),

    Arith(ArithOp),
    Neg,
    Plus,
    Not,
    Concat,
    Compare(CmpOp),
    Match,
    NotMatch,
    /// `$0 ~ literal`
    MatchRecord(usize),
    /// Short-circuit: if the top is false, replace it with 0 and jump
    AndJump(usize),
    /// Short-circuit: if the top is true, replace it with 1 and jump
    OrJump(usize),
    ToBool,
    Jump(usize),
    JumpIfFalse(usize),
    JumpIfTrue(usize),
    Pop,
    PopN(usize),

    Assign(Lvalue),
    AugAssign(ArithOp, Lvalue),
    PreIncr(Lvalue, i8),
    PostIncr(Lvalue, i8),

    Print { argc: usize, redirect: Redirect },
    Printf { argc: usize, redirect: Redirect },
    Getline { source: GetlineSource, target: Option<Lvalue> },
    CallBuiltin(Builtin, usize),
    /// sub/gsub; stack holds regex, replacement, then the target operands
    Sub { global: bool, target: Lvalue },
    /// split(s, map [, fs])
    Split { map: Var, has_fs: bool },

    Call { func: usize, argc: usize },
    /// Function prologue: pad missing parameters
    Enter(usize),
    Return,

    Next,
    NextFile,
    Exit(bool),
    /// End of a BEGIN/main/END region
    Quit,

    /// Jump to `target` (the end pattern) if the range is already active
    RangeEnter { id: usize, target: usize },
    /// Pop the start pattern; false skips the rule
    RangeStart { id: usize, skip: usize },
    /// Pop the end pattern and update the range state
    RangeEnd { id: usize },

    /// Push the map and a cursor for `for (k in a)`
    IterInit(Var),
    /// Store the next key into `var`, or jump to `exit`
    IterNext { var: Var, exit: usize },
}

#[derive(Debug, Clone)]
pub enum Literal {
    Number(f64),
    String(AwkStr),
    Regex(Rc<Regex>),
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: VarKind,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// Parameter names; extra parameters double as locals
    pub params: Vec<String>,
    pub kinds: Vec<VarKind>,
    pub entry: usize,
}

impl Function {
    pub fn nparams(&self) -> usize {
        self.params.len()
    }
}

/// A compiled AWK program ready to run
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub code: Vec<Op>,
    /// Source position of each instruction
    pub positions: Vec<SourceLocation>,
    pub literals: Vec<Literal>,
    pub globals: Vec<Symbol>,
    pub functions: Vec<Function>,
    pub begin: Option<usize>,
    pub main: Option<usize>,
    pub end: Option<usize>,
    /// Number of range patterns
    pub range_count: usize,
}

impl Program {
    /// True when records must be read (main rules or END rules exist)
    pub fn reads_input(&self) -> bool {
        self.main.is_some() || self.end.is_some()
    }

    pub fn position(&self, ip: usize) -> SourceLocation {
        self.positions.get(ip).copied().unwrap_or_default()
    }

    pub fn global_slot(&self, name: &str) -> Option<usize> {
        self.globals.iter().position(|g| g.name == name)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let region = |start: Option<usize>| start.map_or("-".to_string(), |s| s.to_string());
        writeln!(
            f,
            "; begin {} main {} end {}",
            region(self.begin),
            region(self.main),
            region(self.end)
        )?;
        for func in &self.functions {
            writeln!(f, "; function {}({}) @{}", func.name, func.params.join(", "), func.entry)?;
        }
        for (ip, op) in self.code.iter().enumerate() {
            write!(f, "{:>5}  {:?}", ip, op)?;
            match op {
                Op::PushLiteral(i) | Op::MatchRecord(i) => match self.literals.get(*i) {
                    Some(Literal::Number(n)) => write!(f, "  ; {}", n)?,
                    Some(Literal::String(s)) => write!(f, "  ; {:?}", s)?,
                    Some(Literal::Regex(re)) => write!(f, "  ; /{}/", re.as_str())?,
                    None => {}
                },
                Op::LoadVar(Var::Global(g)) | Op::LoadElem(Var::Global(g)) => {
                    if let Some(sym) = self.globals.get(*g) {
                        write!(f, "  ; {}", sym.name)?;
                    }
                }
                _ => {}
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
