//! Statement compilation.

use crate::error::Result;
use crate::lexer::TokenKind;
use crate::program::{Op, Redirect, VarKind};

use super::expr::{Operand, BP_PIPE};
use super::{Compiler, Context, LoopContext};

impl Compiler {
    /// `{ statement* }`. Broken statements are recorded and skipped.
    pub(super) fn block(&mut self) -> Result<()> {
        self.expect(&TokenKind::LeftBrace, "`{'")?;
        loop {
            self.skip_terminators();
            match self.peek() {
                TokenKind::RightBrace => {
                    self.advance();
                    return Ok(());
                }
                TokenKind::Eof => return Err(self.unexpected("`}'")),
                _ => {
                    if let Err(e) = self.statement() {
                        self.errors.push(e);
                        self.recover_statement();
                    }
                }
            }
        }
    }

    fn statement(&mut self) -> Result<()> {
        self.print_ctx = false;
        self.nesting = 0;
        match self.peek() {
            TokenKind::LeftBrace => self.block(),
            TokenKind::If => self.if_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::Do => self.do_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Semicolon => {
                self.advance();
                Ok(())
            }
            _ => {
                self.simple_statement()?;
                self.end_simple_statement()
            }
        }
    }

    /// A statement body after `if (...)`, `else`, `while (...)` and friends
    fn body(&mut self) -> Result<()> {
        self.skip_newlines();
        if self.eat(&TokenKind::Semicolon) {
            return Ok(());
        }
        self.statement()
    }

    fn end_simple_statement(&mut self) -> Result<()> {
        match self.peek() {
            TokenKind::Newline | TokenKind::Semicolon => {
                self.advance();
                Ok(())
            }
            TokenKind::RightBrace | TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected("newline or `;'")),
        }
    }

    fn condition(&mut self) -> Result<()> {
        self.expect(&TokenKind::LeftParen, "`('")?;
        self.skip_newlines();
        self.expr_value(0)?;
        self.skip_newlines();
        self.expect(&TokenKind::RightParen, "`)'")
    }

    fn if_statement(&mut self) -> Result<()> {
        self.advance();
        self.condition()?;
        let to_else = self.emit(Op::JumpIfFalse(0));
        self.body()?;

        // `else` may follow after newlines or a `;`
        let save = self.pos;
        while matches!(self.peek(), TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
        if self.eat(&TokenKind::Else) {
            let to_end = self.emit(Op::Jump(0));
            let else_start = self.here();
            self.patch(to_else, else_start);
            self.body()?;
            let end = self.here();
            self.patch(to_end, end);
        } else {
            self.pos = save;
            let end = self.here();
            self.patch(to_else, end);
        }
        Ok(())
    }

    /// Compile a loop body and resolve its `break`/`continue` jumps
    fn loop_body(&mut self, continue_target: Option<usize>) -> Result<LoopContext> {
        self.loops.push(LoopContext::default());
        let result = self.body();
        let mut ctx = self.loops.pop().unwrap_or_default();
        result?;
        if let Some(target) = continue_target {
            for at in ctx.continues.drain(..) {
                self.patch(at, target);
            }
        }
        Ok(ctx)
    }

    fn patch_breaks(&mut self, ctx: &LoopContext, target: usize) {
        for &at in &ctx.breaks {
            self.patch(at, target);
        }
    }

    fn while_statement(&mut self) -> Result<()> {
        self.advance();
        let top = self.here();
        self.condition()?;
        let exit = self.emit(Op::JumpIfFalse(0));
        let ctx = self.loop_body(Some(top))?;
        self.emit(Op::Jump(top));
        let end = self.here();
        self.patch(exit, end);
        self.patch_breaks(&ctx, end);
        Ok(())
    }

    fn do_statement(&mut self) -> Result<()> {
        self.advance();
        let top = self.here();
        let ctx = self.loop_body(None)?;
        self.skip_terminators();
        self.expect(&TokenKind::While, "`while' after `do' body")?;
        let test = self.here();
        for &at in &ctx.continues {
            self.patch(at, test);
        }
        self.condition()?;
        self.emit(Op::JumpIfTrue(top));
        let end = self.here();
        self.patch_breaks(&ctx, end);
        self.end_simple_statement()
    }

    /// `for (name in array)` is recognized by its exact token shape
    fn is_for_in(&self) -> bool {
        matches!(
            (self.peek_at(1), self.peek_at(2), self.peek_at(3), self.peek_at(4)),
            (
                TokenKind::Identifier(_),
                TokenKind::In,
                TokenKind::Identifier(_),
                TokenKind::RightParen
            )
        )
    }

    fn for_statement(&mut self) -> Result<()> {
        self.advance();
        if self.check(&TokenKind::LeftParen) && self.is_for_in() {
            return self.for_in_statement();
        }
        self.expect(&TokenKind::LeftParen, "`('")?;

        // init
        self.skip_newlines();
        if !self.check(&TokenKind::Semicolon) {
            self.simple_statement()?;
        }
        self.expect(&TokenKind::Semicolon, "`;'")?;

        // condition
        self.skip_newlines();
        let cond = self.here();
        let exit = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            self.expr_value(0)?;
            Some(self.emit(Op::JumpIfFalse(0)))
        };
        self.skip_newlines();
        self.expect(&TokenKind::Semicolon, "`;'")?;
        let to_body = self.emit(Op::Jump(0));

        // increment, placed before the body and jumped to after it
        self.skip_newlines();
        let incr = self.here();
        if !self.check(&TokenKind::RightParen) {
            self.simple_statement()?;
        }
        self.emit(Op::Jump(cond));
        self.skip_newlines();
        self.expect(&TokenKind::RightParen, "`)'")?;

        let body = self.here();
        self.patch(to_body, body);
        let ctx = self.loop_body(Some(incr))?;
        self.emit(Op::Jump(incr));
        let end = self.here();
        if let Some(exit) = exit {
            self.patch(exit, end);
        }
        self.patch_breaks(&ctx, end);
        Ok(())
    }

    fn for_in_statement(&mut self) -> Result<()> {
        self.advance();
        let TokenKind::Identifier(key) = self.advance() else {
            return Err(self.unexpected("loop variable"));
        };
        self.advance();
        let TokenKind::Identifier(array) = self.advance() else {
            return Err(self.unexpected("array name"));
        };
        self.advance();

        let key = self.resolve(&key, VarKind::Scalar)?;
        let array = self.resolve(&array, VarKind::Map)?;
        self.emit(Op::IterInit(array));
        let top = self.emit(Op::IterNext { var: key, exit: 0 });
        let ctx = self.loop_body(Some(top))?;
        self.emit(Op::Jump(top));
        let end = self.here();
        self.patch(top, end);
        self.patch_breaks(&ctx, end);
        self.emit(Op::PopN(2));
        Ok(())
    }

    /// Statements that end at a terminator: also the init and increment
    /// clauses of `for`
    fn simple_statement(&mut self) -> Result<()> {
        match self.peek() {
            TokenKind::Print | TokenKind::Printf => self.print_statement(),
            TokenKind::Break | TokenKind::Continue => {
                let is_break = self.advance() == TokenKind::Break;
                let jump = self.emit(Op::Jump(0));
                let Some(ctx) = self.loops.last_mut() else {
                    let what = if is_break { "break" } else { "continue" };
                    return Err(self.error(format!("`{}' is not allowed outside a loop", what)));
                };
                if is_break {
                    ctx.breaks.push(jump);
                } else {
                    ctx.continues.push(jump);
                }
                Ok(())
            }
            TokenKind::Next | TokenKind::Nextfile => {
                let token = self.advance();
                if self.context != Context::Main {
                    return Err(self.error(format!(
                        "`{}' used in BEGIN, END or function",
                        if token == TokenKind::Next { "next" } else { "nextfile" }
                    )));
                }
                self.emit(if token == TokenKind::Next {
                    Op::Next
                } else {
                    Op::NextFile
                });
                Ok(())
            }
            TokenKind::Exit => {
                self.advance();
                let has_status = !self.peek().is_terminator();
                if has_status {
                    self.expr_value(0)?;
                }
                self.emit(Op::Exit(has_status));
                Ok(())
            }
            TokenKind::Return => {
                self.advance();
                if !self.symbols.in_function() {
                    return Err(self.error("`return' used outside function context"));
                }
                if self.peek().is_terminator() {
                    self.emit(Op::PushUninit);
                } else {
                    self.expr_value(0)?;
                }
                self.emit(Op::Return);
                Ok(())
            }
            TokenKind::Delete => self.delete_statement(),
            _ => {
                self.expr_value(0)?;
                self.emit(Op::Pop);
                Ok(())
            }
        }
    }

    fn delete_statement(&mut self) -> Result<()> {
        self.advance();
        let TokenKind::Identifier(name) = self.advance() else {
            return Err(self.error("expected array name after `delete'"));
        };
        let var = self.resolve(&name, VarKind::Map)?;
        if self.eat(&TokenKind::LeftBracket) {
            self.subscripts()?;
            self.emit(Op::Delete(var));
        } else {
            self.emit(Op::DeleteAll(var));
        }
        Ok(())
    }

    fn print_statement(&mut self) -> Result<()> {
        let is_printf = self.advance() == TokenKind::Printf;
        self.print_ctx = true;
        self.nesting = 0;

        let mut argc = 0;
        if !self.peek().is_terminator()
            && !matches!(self.peek(), TokenKind::Greater | TokenKind::Append | TokenKind::Pipe)
        {
            match self.expr_bp(0)? {
                Operand::Group(n) => argc = n,
                _ => argc = 1,
            }
            while self.eat(&TokenKind::Comma) {
                self.skip_newlines();
                self.expr_value(0)?;
                argc += 1;
            }
        }
        if is_printf && argc == 0 {
            return Err(self.error("printf: no format"));
        }

        let redirect = match self.peek() {
            TokenKind::Greater => Redirect::File,
            TokenKind::Append => Redirect::Append,
            TokenKind::Pipe => Redirect::Pipe,
            _ => Redirect::None,
        };
        if redirect != Redirect::None {
            self.advance();
            self.print_ctx = false;
            self.expr_value(BP_PIPE)?;
        }
        self.print_ctx = false;

        self.emit(if is_printf {
            Op::Printf { argc, redirect }
        } else {
            Op::Print { argc, redirect }
        });
        Ok(())
    }
}
