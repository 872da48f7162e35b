//! Single-pass compiler from tokens to VM bytecode.
//!
//! Expressions are parsed by precedence climbing (`expr.rs`), statements by
//! recursive descent (`stmt.rs`); both emit code directly, with no syntax
//! tree in between. Diagnostics are collected and parsing resumes at the next
//! statement, so one run reports every error it can find.

mod expr;
mod stmt;
mod symbols;

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::{Error, Result, SourceLocation};
use crate::lexer::{Token, TokenKind};
use crate::program::{Literal, Op, Program, Redirect, Var, VarKind};
use crate::regex_bridge;
use crate::value::AwkStr;

use symbols::Symbols;

/// Which kind of code is being compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Begin,
    Main,
    End,
    Function,
}

#[derive(Debug, Clone, Copy)]
enum Region {
    Begin = 0,
    Main = 1,
    End = 2,
}

/// Linked chain of rule bodies of one region
#[derive(Debug, Default)]
struct Chain {
    head: Option<usize>,
    /// Pending jump at the end of the last body
    tail: Option<usize>,
}

/// Pending `break`/`continue` jumps of the innermost loop
#[derive(Debug, Default)]
struct LoopContext {
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

/// AWK compiler producing a [`Program`]
pub struct Compiler {
    tokens: Vec<Token>,
    pos: usize,
    last_location: SourceLocation,

    code: Vec<Op>,
    positions: Vec<SourceLocation>,
    literals: Vec<Literal>,
    number_literals: HashMap<u64, usize>,
    string_literals: HashMap<String, usize>,
    regex_literals: HashMap<String, usize>,

    symbols: Symbols,
    errors: Vec<Error>,
    loops: Vec<LoopContext>,
    context: Context,
    chains: [Chain; 3],
    range_count: usize,

    /// Parsing print arguments: `>` and `|` end the expression list
    print_ctx: bool,
    /// Parenthesis/bracket depth inside print arguments
    nesting: usize,
}

impl Compiler {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            last_location: SourceLocation::new(1, 1),
            code: Vec::new(),
            positions: Vec::new(),
            literals: Vec::new(),
            number_literals: HashMap::new(),
            string_literals: HashMap::new(),
            regex_literals: HashMap::new(),
            symbols: Symbols::new(),
            errors: Vec::new(),
            loops: Vec::new(),
            context: Context::Main,
            chains: Default::default(),
            range_count: 0,
            print_ctx: false,
            nesting: 0,
        }
    }

    /// Compile the whole token stream
    pub fn compile(mut self) -> Result<Program> {
        self.skip_terminators();
        while !self.check(&TokenKind::Eof) {
            if let Err(e) = self.item() {
                self.errors.push(e);
                self.recover_item();
            }
            self.skip_terminators();
        }
        self.finish()
    }

    // ===== token cursor =====

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .or_else(|| self.tokens.last())
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn location(&self) -> SourceLocation {
        self.tokens
            .get(self.pos)
            .map(|t| t.location)
            .unwrap_or(self.last_location)
    }

    fn advance(&mut self) -> TokenKind {
        match self.tokens.get(self.pos) {
            Some(token) => {
                let kind = token.kind.clone();
                self.last_location = token.location;
                if !matches!(kind, TokenKind::Eof) {
                    self.pos += 1;
                }
                kind
            }
            None => TokenKind::Eof,
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        let loc = self.location();
        Error::parser(message, loc.line, loc.column)
    }

    fn unexpected(&self, expected: &str) -> Error {
        self.error(format!("expected {}, found {}", expected, describe(self.peek())))
    }

    fn skip_newlines(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    fn skip_terminators(&mut self) {
        while matches!(self.peek(), TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }

    /// Skip the rest of a broken top-level item, including any block
    fn recover_item(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                TokenKind::Eof => break,
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        break;
                    }
                }
                TokenKind::Newline if depth == 0 => break,
                _ => {}
            }
            self.advance();
        }
    }

    /// Skip to the end of a broken statement
    fn recover_statement(&mut self) {
        loop {
            match self.peek() {
                TokenKind::Eof | TokenKind::RightBrace => break,
                TokenKind::Newline | TokenKind::Semicolon => {
                    self.advance();
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ===== emission =====

    fn emit(&mut self, op: Op) -> usize {
        self.code.push(op);
        self.positions.push(self.last_location);
        self.code.len() - 1
    }

    fn here(&self) -> usize {
        self.code.len()
    }

    /// Point the jump at `at` to `target`
    fn patch(&mut self, at: usize, target: usize) {
        match &mut self.code[at] {
            Op::Jump(t)
            | Op::JumpIfFalse(t)
            | Op::JumpIfTrue(t)
            | Op::AndJump(t)
            | Op::OrJump(t)
            | Op::RangeEnter { target: t, .. }
            | Op::RangeStart { skip: t, .. }
            | Op::IterNext { exit: t, .. } => *t = target,
            _ => {}
        }
    }

    fn number_literal(&mut self, n: f64) -> usize {
        if let Some(&idx) = self.number_literals.get(&n.to_bits()) {
            return idx;
        }
        let idx = self.literals.len();
        self.literals.push(Literal::Number(n));
        self.number_literals.insert(n.to_bits(), idx);
        idx
    }

    fn string_literal(&mut self, s: String) -> usize {
        if let Some(&idx) = self.string_literals.get(&s) {
            return idx;
        }
        let idx = self.literals.len();
        self.literals.push(Literal::String(AwkStr::from(s.as_str())));
        self.string_literals.insert(s, idx);
        idx
    }

    fn regex_literal(&mut self, source: String) -> Result<usize> {
        if let Some(&idx) = self.regex_literals.get(&source) {
            return Ok(idx);
        }
        let re = regex_bridge::compile(&source)
            .map_err(|e| self.error(format!("invalid regex /{}/: {}", source, e)))?;
        let idx = self.literals.len();
        self.literals.push(Literal::Regex(Rc::new(re)));
        self.regex_literals.insert(source, idx);
        Ok(idx)
    }

    fn resolve(&mut self, name: &str, kind: VarKind) -> Result<Var> {
        let var = self.symbols.resolve(name).map_err(|m| self.error(m))?;
        if kind != VarKind::Unknown {
            self.symbols.mark(var, kind).map_err(|m| self.error(m))?;
        }
        Ok(var)
    }

    // ===== program structure =====

    fn item(&mut self) -> Result<()> {
        self.print_ctx = false;
        self.nesting = 0;
        match self.peek() {
            TokenKind::Function => self.function_definition(),
            TokenKind::Begin => {
                self.advance();
                self.region_action(Region::Begin, Context::Begin)
            }
            TokenKind::End => {
                self.advance();
                self.region_action(Region::End, Context::End)
            }
            _ => self.pattern_rule(),
        }
    }

    fn open_region(&mut self, region: Region) {
        let here = self.here();
        let chain = &mut self.chains[region as usize];
        let tail = chain.tail.take();
        if chain.head.is_none() {
            chain.head = Some(here);
        }
        if let Some(tail) = tail {
            self.patch(tail, here);
        }
    }

    /// Emit the jump to the next body of the region; returns its index
    fn close_region(&mut self, region: Region) -> usize {
        let jump = self.emit(Op::Jump(0));
        self.chains[region as usize].tail = Some(jump);
        jump
    }

    fn region_action(&mut self, region: Region, context: Context) -> Result<()> {
        if !self.check(&TokenKind::LeftBrace) {
            return Err(self.unexpected("`{' after BEGIN or END"));
        }
        self.context = context;
        self.open_region(region);
        self.block()?;
        self.close_region(region);
        Ok(())
    }

    /// Whether the pattern starting here is a range `p1, p2`
    fn is_range_pattern(&self) -> bool {
        let mut depth = 0usize;
        for token in &self.tokens[self.pos..] {
            match token.kind {
                TokenKind::LeftParen | TokenKind::LeftBracket => depth += 1,
                TokenKind::RightParen | TokenKind::RightBracket => depth = depth.saturating_sub(1),
                TokenKind::Comma if depth == 0 => return true,
                TokenKind::LeftBrace
                | TokenKind::Newline
                | TokenKind::Semicolon
                | TokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    fn pattern_rule(&mut self) -> Result<()> {
        self.context = Context::Main;
        self.open_region(Region::Main);
        let mut skips = Vec::new();

        if !self.check(&TokenKind::LeftBrace) {
            if self.is_range_pattern() {
                let id = self.range_count;
                self.range_count += 1;
                let enter = self.emit(Op::RangeEnter { id, target: 0 });
                self.expr_value(0)?;
                skips.push(self.emit(Op::RangeStart { id, skip: 0 }));
                self.expect(&TokenKind::Comma, "`,'")?;
                self.skip_newlines();
                let end_test = self.here();
                self.patch(enter, end_test);
                self.expr_value(0)?;
                self.emit(Op::RangeEnd { id });
            } else {
                self.expr_value(0)?;
                skips.push(self.emit(Op::JumpIfFalse(0)));
            }
        }

        if self.check(&TokenKind::LeftBrace) {
            self.block()?;
        } else {
            self.emit(Op::Print {
                argc: 0,
                redirect: Redirect::None,
            });
        }
        let next_rule = self.close_region(Region::Main);
        for skip in skips {
            self.patch(skip, next_rule);
        }
        Ok(())
    }

    fn function_definition(&mut self) -> Result<()> {
        self.advance();
        let name = match self.advance() {
            TokenKind::FuncName(name) | TokenKind::Identifier(name) => name,
            other => {
                return Err(self.error(format!(
                    "expected function name, found {}",
                    describe(&other)
                )));
            }
        };
        let id = self.symbols.function_id(&name).map_err(|m| self.error(m))?;

        self.expect(&TokenKind::LeftParen, "`('")?;
        let mut params = Vec::new();
        self.skip_newlines();
        while let TokenKind::Identifier(param) = self.peek().clone() {
            self.advance();
            params.push(param);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.expect(&TokenKind::RightParen, "`)'")?;
        self.skip_newlines();

        let entry = self.here();
        self.symbols
            .enter_function(id, params, entry)
            .map_err(|m| self.error(m))?;
        self.context = Context::Function;
        self.emit(Op::Enter(id));
        let body = self.block();
        self.emit(Op::PushUninit);
        self.emit(Op::Return);
        self.symbols.leave_function();
        body
    }

    fn finish(mut self) -> Result<Program> {
        for info in self.symbols.functions() {
            for &(argc, loc) in &info.calls {
                let message = match info.entry {
                    None => format!("calling undefined function `{}'", info.name),
                    Some(_) if argc > info.params.len() => format!(
                        "function `{}' called with {} args, accepts only {}",
                        info.name,
                        argc,
                        info.params.len()
                    ),
                    Some(_) => continue,
                };
                self.errors.push(Error::parser(message, loc.line, loc.column));
            }
        }
        if !self.errors.is_empty() {
            return Err(Error::Compile {
                errors: std::mem::take(&mut self.errors),
            });
        }

        let mut heads = [None; 3];
        for (i, chain) in self.chains.iter().enumerate() {
            if let Some(tail) = chain.tail {
                self.code[tail] = Op::Quit;
            }
            heads[i] = chain.head;
        }

        let (globals, functions) = self.symbols.into_tables();
        let program = Program {
            code: self.code,
            positions: self.positions,
            literals: self.literals,
            globals,
            functions,
            begin: heads[Region::Begin as usize],
            main: heads[Region::Main as usize],
            end: heads[Region::End as usize],
            range_count: self.range_count,
        };
        debug!(
            target: "awk::compiler",
            ops = program.code.len(),
            literals = program.literals.len(),
            globals = program.globals.len(),
            functions = program.functions.len(),
            "compiled program"
        );
        trace!(target: "awk::compiler", "\n{}", program);
        Ok(program)
    }
}

/// Human-readable token description for diagnostics
fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(n) => format!("number {}", n),
        TokenKind::String(s) => format!("string \"{}\"", s.escape_default()),
        TokenKind::Regex(r) => format!("regex /{}/", r),
        TokenKind::Identifier(name) | TokenKind::FuncName(name) => format!("`{}'", name),
        TokenKind::Builtin(b) => format!("`{}'", b.name()),
        TokenKind::Newline => "newline".to_string(),
        TokenKind::Eof => "end of program".to_string(),
        other => format!("{:?}", other),
    }
}
