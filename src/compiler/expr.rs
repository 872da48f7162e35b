//! Expression parsing by precedence climbing.
//!
//! Each parse function emits the code for its operand and reports the
//! operand's [`Operand`] shape, which is what the caller needs to know to
//! turn a load into an assignment target or a regex literal into a regex
//! operand.

use crate::error::Result;
use crate::lexer::{Builtin, TokenKind};
use crate::program::{ArithOp, CmpOp, GetlineSource, Lvalue, Op, Var, VarKind};

use super::Compiler;

/// Shape of the value an expression left on the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Operand {
    Value,
    /// A variable, field or element load that can become an assignment target
    Lvalue,
    /// A bare regex literal, compiled as `$0 ~ re` unless the context wants
    /// the regex itself
    Regex(usize),
    /// `(a, b, ...)` with that many values pushed; valid only before `in`
    /// or as a print list
    Group(usize),
}

const BP_ASSIGN: u8 = 50;
const BP_TERNARY: u8 = 60;
const BP_OR: u8 = 70;
const BP_AND: u8 = 80;
const BP_IN: u8 = 90;
const BP_MATCH: u8 = 100;
const BP_COMPARE: u8 = 110;
pub(super) const BP_PIPE: u8 = 120;
const BP_CONCAT: u8 = 130;
const BP_ADD: u8 = 140;
const BP_MUL: u8 = 150;
const BP_UNARY: u8 = 160;
const BP_POW: u8 = 170;
const BP_INCR: u8 = 180;
const BP_FIELD: u8 = 190;

impl Compiler {
    /// Parse an expression that must produce a single value
    pub(super) fn expr_value(&mut self, rbp: u8) -> Result<Operand> {
        match self.expr_bp(rbp)? {
            Operand::Group(_) => Err(self.error("parenthesized list without `in'")),
            other => Ok(other),
        }
    }

    pub(super) fn expr_bp(&mut self, rbp: u8) -> Result<Operand> {
        let mut left = self.nud()?;
        while self.lbp(left) > rbp {
            left = self.led(left)?;
        }
        Ok(left)
    }

    /// A regex literal operand stands for the regex, not for `$0 ~ re`
    pub(super) fn regex_operand(&mut self, shape: Operand) {
        if let Operand::Regex(lit) = shape {
            if self.code.last() == Some(&Op::MatchRecord(lit)) {
                if let Some(op) = self.code.last_mut() {
                    *op = Op::PushLiteral(lit);
                }
            }
        }
    }

    /// Parse an expression used as a regex (right of `~`, regex arguments)
    pub(super) fn regex_expr(&mut self, rbp: u8) -> Result<()> {
        let shape = self.expr_value(rbp)?;
        self.regex_operand(shape);
        Ok(())
    }

    /// Turn the load just emitted into an assignment target
    pub(super) fn take_lvalue(&mut self, shape: Operand) -> Result<Lvalue> {
        if shape != Operand::Lvalue {
            return Err(self.error("bad lvalue"));
        }
        let lvalue = match self.code.last() {
            Some(Op::LoadVar(var)) => Lvalue::Var(*var),
            Some(Op::LoadField) => Lvalue::Field,
            Some(Op::LoadElem(var)) => Lvalue::Elem(*var),
            _ => return Err(self.error("bad lvalue")),
        };
        self.code.pop();
        self.positions.pop();
        Ok(lvalue)
    }

    /// Push `$0` as a field reference (index 0)
    pub(super) fn emit_record_index(&mut self) {
        let zero = self.number_literal(0.0);
        self.emit(Op::PushLiteral(zero));
    }

    fn lbp(&self, left: Operand) -> u8 {
        let top_level_print = self.print_ctx && self.nesting == 0;
        match self.peek() {
            TokenKind::Assign
            | TokenKind::PlusAssign
            | TokenKind::MinusAssign
            | TokenKind::StarAssign
            | TokenKind::SlashAssign
            | TokenKind::PercentAssign
            | TokenKind::CaretAssign => BP_ASSIGN,
            TokenKind::Question => BP_TERNARY,
            TokenKind::Or => BP_OR,
            TokenKind::And => BP_AND,
            TokenKind::In => BP_IN,
            TokenKind::Match | TokenKind::NotMatch => BP_MATCH,
            TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Equal
            | TokenKind::NotEqual
            | TokenKind::GreaterEqual => BP_COMPARE,
            TokenKind::Greater if top_level_print => 0,
            TokenKind::Greater => BP_COMPARE,
            TokenKind::Pipe if self.peek_at(1) == &TokenKind::Getline => BP_PIPE,
            TokenKind::Pipe if top_level_print => 0,
            TokenKind::Pipe => BP_PIPE,
            TokenKind::Plus | TokenKind::Minus => BP_ADD,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => BP_MUL,
            TokenKind::Caret => BP_POW,
            TokenKind::Increment | TokenKind::Decrement if left == Operand::Lvalue => BP_INCR,
            kind if kind.starts_concatenation() => BP_CONCAT,
            _ => 0,
        }
    }

    fn nud(&mut self) -> Result<Operand> {
        let start = self.location();
        let token = self.advance();
        match token {
            TokenKind::Number(n) => {
                let lit = self.number_literal(n);
                self.emit(Op::PushLiteral(lit));
                Ok(Operand::Value)
            }
            TokenKind::String(s) => {
                let lit = self.string_literal(s);
                self.emit(Op::PushLiteral(lit));
                Ok(Operand::Value)
            }
            TokenKind::Regex(source) => {
                let lit = self.regex_literal(source)?;
                self.emit(Op::MatchRecord(lit));
                Ok(Operand::Regex(lit))
            }
            TokenKind::Dollar => {
                self.expr_value(BP_FIELD)?;
                self.emit(Op::LoadField);
                Ok(Operand::Lvalue)
            }
            TokenKind::Not => {
                self.expr_value(BP_UNARY)?;
                self.emit(Op::Not);
                Ok(Operand::Value)
            }
            TokenKind::Minus => {
                self.expr_value(BP_UNARY)?;
                self.emit(Op::Neg);
                Ok(Operand::Value)
            }
            TokenKind::Plus => {
                self.expr_value(BP_UNARY)?;
                self.emit(Op::Plus);
                Ok(Operand::Value)
            }
            TokenKind::Increment | TokenKind::Decrement => {
                let delta = if token == TokenKind::Increment { 1 } else { -1 };
                let shape = self.expr_value(BP_INCR)?;
                let target = self.take_lvalue(shape)?;
                self.emit(Op::PreIncr(target, delta));
                Ok(Operand::Value)
            }
            TokenKind::LeftParen => self.grouping(),
            TokenKind::Identifier(name) => self.variable(&name),
            TokenKind::FuncName(name) => self.user_call(&name, start),
            TokenKind::Builtin(builtin) => self.builtin_call(builtin),
            TokenKind::Getline => {
                let target = self.getline_target()?;
                if self.eat(&TokenKind::Less) {
                    self.expr_value(BP_CONCAT)?;
                    self.emit(Op::Getline {
                        source: GetlineSource::File,
                        target,
                    });
                } else {
                    self.emit(Op::Getline {
                        source: GetlineSource::Main,
                        target,
                    });
                }
                Ok(Operand::Value)
            }
            other => {
                let loc = self.last_location;
                Err(crate::error::Error::parser(
                    format!("unexpected {}", super::describe(&other)),
                    loc.line,
                    loc.column,
                ))
            }
        }
    }

    fn led(&mut self, left: Operand) -> Result<Operand> {
        if let Operand::Group(count) = left {
            if !self.check(&TokenKind::In) {
                return Err(self.error("parenthesized list without `in'"));
            }
            self.advance();
            if count > 1 {
                self.emit(Op::Subscript(count));
            }
            return self.in_array();
        }

        // implicit concatenation consumes no operator token
        let concatenates = match self.peek() {
            TokenKind::Increment | TokenKind::Decrement => left != Operand::Lvalue,
            kind => kind.starts_concatenation(),
        };
        if concatenates {
            self.expr_value(BP_CONCAT)?;
            self.emit(Op::Concat);
            return Ok(Operand::Value);
        }

        let token = self.advance();
        match token {
            TokenKind::Assign => {
                let target = self.take_lvalue(left)?;
                self.skip_newlines();
                self.expr_value(BP_ASSIGN - 1)?;
                self.emit(Op::Assign(target));
            }
            TokenKind::PlusAssign
            | TokenKind::MinusAssign
            | TokenKind::StarAssign
            | TokenKind::SlashAssign
            | TokenKind::PercentAssign
            | TokenKind::CaretAssign => {
                let op = match token {
                    TokenKind::PlusAssign => ArithOp::Add,
                    TokenKind::MinusAssign => ArithOp::Sub,
                    TokenKind::StarAssign => ArithOp::Mul,
                    TokenKind::SlashAssign => ArithOp::Div,
                    TokenKind::PercentAssign => ArithOp::Mod,
                    _ => ArithOp::Pow,
                };
                let target = self.take_lvalue(left)?;
                self.skip_newlines();
                self.expr_value(BP_ASSIGN - 1)?;
                self.emit(Op::AugAssign(op, target));
            }
            TokenKind::Question => {
                let to_else = self.emit(Op::JumpIfFalse(0));
                self.skip_newlines();
                self.expr_value(0)?;
                self.skip_newlines();
                self.expect(&TokenKind::Colon, "`:'")?;
                self.skip_newlines();
                let to_end = self.emit(Op::Jump(0));
                let else_start = self.here();
                self.patch(to_else, else_start);
                self.expr_value(BP_TERNARY - 1)?;
                let end = self.here();
                self.patch(to_end, end);
            }
            TokenKind::Or | TokenKind::And => {
                let (bp, jump) = if token == TokenKind::Or {
                    (BP_OR, Op::OrJump(0))
                } else {
                    (BP_AND, Op::AndJump(0))
                };
                let short = self.emit(jump);
                self.skip_newlines();
                self.expr_value(bp)?;
                self.emit(Op::ToBool);
                let end = self.here();
                self.patch(short, end);
            }
            TokenKind::In => return self.in_array(),
            TokenKind::Match | TokenKind::NotMatch => {
                self.regex_expr(BP_MATCH)?;
                self.emit(if token == TokenKind::Match {
                    Op::Match
                } else {
                    Op::NotMatch
                });
            }
            TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Equal
            | TokenKind::NotEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => {
                let op = match token {
                    TokenKind::Less => CmpOp::Lt,
                    TokenKind::LessEqual => CmpOp::Le,
                    TokenKind::Equal => CmpOp::Eq,
                    TokenKind::NotEqual => CmpOp::Ne,
                    TokenKind::Greater => CmpOp::Gt,
                    _ => CmpOp::Ge,
                };
                self.expr_value(BP_COMPARE)?;
                self.emit(Op::Compare(op));
            }
            TokenKind::Pipe => {
                self.expect(&TokenKind::Getline, "`getline' after `|'")?;
                let target = self.getline_target()?;
                self.emit(Op::Getline {
                    source: GetlineSource::Pipe,
                    target,
                });
            }
            TokenKind::Plus | TokenKind::Minus => {
                self.expr_value(BP_ADD)?;
                self.emit(Op::Arith(if token == TokenKind::Plus {
                    ArithOp::Add
                } else {
                    ArithOp::Sub
                }));
            }
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => {
                self.expr_value(BP_MUL)?;
                self.emit(Op::Arith(match token {
                    TokenKind::Star => ArithOp::Mul,
                    TokenKind::Slash => ArithOp::Div,
                    _ => ArithOp::Mod,
                }));
            }
            TokenKind::Caret => {
                self.expr_value(BP_POW - 1)?;
                self.emit(Op::Arith(ArithOp::Pow));
            }
            TokenKind::Increment | TokenKind::Decrement => {
                let delta = if token == TokenKind::Increment { 1 } else { -1 };
                let target = self.take_lvalue(left)?;
                self.emit(Op::PostIncr(target, delta));
            }
            other => {
                return Err(self.error(format!("unexpected {}", super::describe(&other))));
            }
        }
        Ok(Operand::Value)
    }

    /// `subscript in array`, after the `in` keyword
    fn in_array(&mut self) -> Result<Operand> {
        let TokenKind::Identifier(name) = self.advance() else {
            return Err(self.error("expected array name after `in'"));
        };
        let var = self.resolve(&name, VarKind::Map)?;
        self.emit(Op::In(var));
        Ok(Operand::Value)
    }

    /// `( expr )` or `( expr, expr, ... )`
    fn grouping(&mut self) -> Result<Operand> {
        self.nesting += 1;
        let mut count = 1;
        self.skip_newlines();
        self.expr_value(0)?;
        while self.eat(&TokenKind::Comma) {
            self.skip_newlines();
            self.expr_value(0)?;
            count += 1;
        }
        self.skip_newlines();
        self.expect(&TokenKind::RightParen, "`)'")?;
        self.nesting -= 1;
        Ok(if count == 1 {
            Operand::Value
        } else {
            Operand::Group(count)
        })
    }

    /// Comma-separated subscripts after `[`, joined with SUBSEP when more
    /// than one
    pub(super) fn subscripts(&mut self) -> Result<()> {
        self.nesting += 1;
        let mut count = 0;
        loop {
            self.skip_newlines();
            self.expr_value(0)?;
            count += 1;
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.skip_newlines();
        self.expect(&TokenKind::RightBracket, "`]'")?;
        self.nesting -= 1;
        if count > 1 {
            self.emit(Op::Subscript(count));
        }
        Ok(())
    }

    fn variable(&mut self, name: &str) -> Result<Operand> {
        if self.eat(&TokenKind::LeftBracket) {
            self.subscripts()?;
            let var = self.resolve(name, VarKind::Map)?;
            self.emit(Op::LoadElem(var));
        } else {
            let var = self.resolve(name, VarKind::Scalar)?;
            self.emit(Op::LoadVar(var));
        }
        Ok(Operand::Lvalue)
    }

    /// Optional lvalue after `getline`
    fn getline_target(&mut self) -> Result<Option<Lvalue>> {
        if !matches!(self.peek(), TokenKind::Identifier(_) | TokenKind::Dollar) {
            return Ok(None);
        }
        let shape = self.expr_value(BP_FIELD)?;
        self.take_lvalue(shape).map(Some)
    }

    /// A bare variable as a call argument is passed without deciding whether
    /// it is a scalar or an array
    fn bare_argument(&mut self) -> Result<Option<Var>> {
        let TokenKind::Identifier(name) = self.peek().clone() else {
            return Ok(None);
        };
        if !matches!(self.peek_at(1), TokenKind::Comma | TokenKind::RightParen) {
            return Ok(None);
        }
        self.advance();
        self.resolve(&name, VarKind::Unknown).map(Some)
    }

    fn user_call(&mut self, name: &str, start: crate::error::SourceLocation) -> Result<Operand> {
        let id = self.symbols.function_id(name).map_err(|m| self.error(m))?;
        self.expect(&TokenKind::LeftParen, "`('")?;
        self.nesting += 1;
        let mut argc = 0;
        self.skip_newlines();
        if !self.check(&TokenKind::RightParen) {
            loop {
                self.skip_newlines();
                match self.bare_argument()? {
                    Some(var) => {
                        self.emit(Op::PushArg(var));
                    }
                    None => {
                        self.expr_value(0)?;
                    }
                }
                argc += 1;
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.skip_newlines();
        self.expect(&TokenKind::RightParen, "`)'")?;
        self.nesting -= 1;
        self.symbols.note_call(id, argc, start);
        self.emit(Op::Call { func: id, argc });
        Ok(Operand::Value)
    }

    fn builtin_call(&mut self, builtin: Builtin) -> Result<Operand> {
        if !self.check(&TokenKind::LeftParen) {
            if builtin == Builtin::Length {
                self.emit_record_index();
                self.emit(Op::LoadField);
                self.emit(Op::CallBuiltin(Builtin::Length, 1));
                return Ok(Operand::Value);
            }
            return Err(self.unexpected(&format!("`(' after `{}'", builtin.name())));
        }
        self.advance();
        self.nesting += 1;
        self.skip_newlines();

        match builtin {
            Builtin::Split => {
                self.expr_value(0)?;
                self.expect(&TokenKind::Comma, "`,'")?;
                self.skip_newlines();
                let TokenKind::Identifier(name) = self.advance() else {
                    return Err(self.error("split: second argument must be an array name"));
                };
                let map = self.resolve(&name, VarKind::Map)?;
                let has_fs = self.eat(&TokenKind::Comma);
                if has_fs {
                    self.skip_newlines();
                    self.regex_expr(0)?;
                }
                self.close_call()?;
                self.emit(Op::Split { map, has_fs });
            }
            Builtin::Sub | Builtin::Gsub => {
                self.regex_expr(0)?;
                self.expect(&TokenKind::Comma, "`,'")?;
                self.skip_newlines();
                self.expr_value(0)?;
                let target = if self.eat(&TokenKind::Comma) {
                    self.skip_newlines();
                    let shape = self.expr_value(0)?;
                    self.take_lvalue(shape)?
                } else {
                    self.emit_record_index();
                    Lvalue::Field
                };
                self.close_call()?;
                self.emit(Op::Sub {
                    global: builtin == Builtin::Gsub,
                    target,
                });
            }
            Builtin::Match => {
                self.expr_value(0)?;
                self.expect(&TokenKind::Comma, "`,'")?;
                self.skip_newlines();
                self.regex_expr(0)?;
                self.close_call()?;
                self.emit(Op::CallBuiltin(Builtin::Match, 2));
            }
            Builtin::Length => {
                if self.check(&TokenKind::RightParen) {
                    self.emit_record_index();
                    self.emit(Op::LoadField);
                } else if let Some(var) = self.bare_argument()? {
                    self.emit(Op::PushArg(var));
                } else {
                    self.expr_value(0)?;
                }
                self.close_call()?;
                self.emit(Op::CallBuiltin(Builtin::Length, 1));
            }
            _ => {
                let mut argc = 0;
                if !self.check(&TokenKind::RightParen) {
                    loop {
                        self.skip_newlines();
                        self.expr_value(0)?;
                        argc += 1;
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let (min, max) = builtin.arity();
                if argc < min || max.is_some_and(|max| argc > max) {
                    return Err(self.error(format!(
                        "{}: wrong number of arguments ({})",
                        builtin.name(),
                        argc
                    )));
                }
                self.close_call()?;
                self.emit(Op::CallBuiltin(builtin, argc));
            }
        }
        Ok(Operand::Value)
    }

    fn close_call(&mut self) -> Result<()> {
        self.skip_newlines();
        self.expect(&TokenKind::RightParen, "`)'")?;
        self.nesting -= 1;
        Ok(())
    }
}
