//! The bytecode interpreter loop.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use regex::Regex;
use tracing::trace;

use crate::error::{Error, Result};
use crate::program::{
    special, ArithOp, CmpOp, GetlineSource, Literal, Lvalue, Op, Redirect, Var, VarKind,
};
use crate::regex_bridge;
use crate::value::{compare_values, AwkMap, AwkStr, MapRef, Value};

use super::fields::Splitter;
use super::format::format_number;
use super::io::{InputMode, OutputMode};
use super::{builtins, Interpreter, RangeState};

/// Deepest allowed chain of user function calls
const MAX_CALL_DEPTH: usize = 100_000;

/// How execution of a region ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Control {
    Done,
    Next,
    NextFile,
    Exit,
}

/// Activation record of a user function call
#[derive(Debug, Clone, Copy)]
pub(super) struct Frame {
    func: usize,
    return_ip: usize,
    /// Stack index of the first parameter
    base: usize,
    argc: usize,
}

/// An assignment target with its operands already evaluated
pub(super) enum Place {
    Var(Var),
    Field(usize),
    Elem(MapRef, AwkStr),
}

fn underflow() -> Error {
    Error::runtime("stack underflow")
}

impl<'a> Interpreter<'a> {
    /// Run from `start` until the region quits or control leaves it
    pub(super) fn execute(&mut self, start: usize, out: &mut dyn Write) -> Result<Control> {
        let mut ip = start;
        loop {
            let at = ip;
            match self.step(&mut ip, out) {
                Ok(None) => {}
                Ok(Some(control)) => return Ok(control),
                Err(e) => return Err(e.located(self.program.position(at))),
            }
        }
    }

    fn step(&mut self, ip: &mut usize, out: &mut dyn Write) -> Result<Option<Control>> {
        let program = self.program;
        let op = *program
            .code
            .get(*ip)
            .ok_or_else(|| Error::runtime(format!("jump out of range: {}", ip)))?;
        *ip += 1;

        match op {
            Op::PushLiteral(i) => {
                let value = self.literal(i)?;
                self.push(value);
            }
            Op::PushUninit => self.push(Value::Uninitialized),
            Op::LoadVar(var) => {
                let value = self.load_scalar(var)?;
                self.push(value);
            }
            Op::PushArg(var) => {
                let slot = self.slot_mut(var)?;
                if let Value::Uninitialized = slot {
                    *slot = Value::new_undecided();
                }
                let value = slot.clone();
                self.push(value);
            }
            Op::LoadField => {
                let index = self.pop_field_index()?;
                let value = self.fields.get(index);
                self.push(value);
            }
            Op::LoadElem(var) => {
                let key = self.pop_key()?;
                let map = self.map_of(var)?;
                let value = map.borrow_mut().entry(&key).clone();
                self.push(value);
            }
            Op::Subscript(n) => {
                let parts = self.pop_n(n)?;
                let key = self.join_subscript(&parts);
                self.push(Value::str(key));
            }
            Op::In(var) => {
                let key = self.pop_key()?;
                let found = self.map_of(var)?.borrow().contains_key(&key);
                self.push(Value::Number(found as u8 as f64));
            }
            Op::Delete(var) => {
                let key = self.pop_key()?;
                self.map_of(var)?.borrow_mut().remove(&key);
            }
            Op::DeleteAll(var) => self.map_of(var)?.borrow_mut().clear(),

            Op::Arith(op) => {
                let r = self.pop()?.to_number();
                let l = self.pop()?.to_number();
                self.push(Value::Number(arith(op, l, r)?));
            }
            Op::Neg => {
                let n = self.pop()?.to_number();
                self.push(Value::Number(-n));
            }
            Op::Plus => {
                let n = self.pop()?.to_number();
                self.push(Value::Number(n));
            }
            Op::Not => {
                let truthy = self.pop()?.is_truthy();
                self.push(Value::Number(!truthy as u8 as f64));
            }
            Op::Concat => {
                let r = self.pop()?;
                let l = self.pop()?;
                let mut s = l.into_awkstr(&self.convfmt);
                s.make_mut().push_str(&r.as_str_with(&self.convfmt));
                self.push(Value::String(s));
            }
            Op::Compare(op) => {
                let r = self.pop()?;
                let l = self.pop()?;
                let ord = compare_values(&l, &r, &self.convfmt);
                let result = match op {
                    CmpOp::Lt => ord.is_lt(),
                    CmpOp::Le => ord.is_le(),
                    CmpOp::Gt => ord.is_gt(),
                    CmpOp::Ge => ord.is_ge(),
                    CmpOp::Eq => ord.is_eq(),
                    CmpOp::Ne => ord.is_ne(),
                };
                self.push(Value::Number(result as u8 as f64));
            }
            Op::Match | Op::NotMatch => {
                let re = self.pop()?;
                let s = self.pop()?;
                let re = self.regex_of(&re)?;
                let matched = regex_bridge::is_match(&re, &s.as_str_with(&self.convfmt));
                self.push(Value::Number((matched == (op == Op::Match)) as u8 as f64));
            }
            Op::MatchRecord(lit) => {
                let Some(Literal::Regex(re)) = program.literals.get(lit) else {
                    return Err(Error::runtime("bad regex literal"));
                };
                let record = self.fields.get(0);
                let matched = regex_bridge::is_match(re, &record.as_str());
                self.push(Value::Number(matched as u8 as f64));
            }
            Op::AndJump(target) | Op::OrJump(target) => {
                let top = self.stack.last_mut().ok_or_else(underflow)?;
                let truthy = top.is_truthy();
                if let Op::AndJump(_) = op {
                    if !truthy {
                        *top = Value::Number(0.0);
                        *ip = target;
                        return Ok(None);
                    }
                } else if truthy {
                    *top = Value::Number(1.0);
                    *ip = target;
                    return Ok(None);
                }
                self.stack.pop();
            }
            Op::ToBool => {
                let truthy = self.pop()?.is_truthy();
                self.push(Value::Number(truthy as u8 as f64));
            }
            Op::Jump(target) => *ip = target,
            Op::JumpIfFalse(target) => {
                if !self.pop()?.is_truthy() {
                    *ip = target;
                }
            }
            Op::JumpIfTrue(target) => {
                if self.pop()?.is_truthy() {
                    *ip = target;
                }
            }
            Op::Pop => {
                self.pop()?;
            }
            Op::PopN(n) => {
                let len = self.stack.len().checked_sub(n).ok_or_else(underflow)?;
                self.stack.truncate(len);
            }

            Op::Assign(target) => {
                let value = self.pop()?;
                let place = self.pop_place(target)?;
                self.write_place(place, value.clone())?;
                self.push(value);
            }
            Op::AugAssign(op, target) => {
                let rhs = self.pop()?.to_number();
                let place = self.pop_place(target)?;
                let current = self.read_place(&place)?.to_number();
                let result = Value::Number(arith(op, current, rhs)?);
                self.write_place(place, result.clone())?;
                self.push(result);
            }
            Op::PreIncr(target, delta) | Op::PostIncr(target, delta) => {
                let place = self.pop_place(target)?;
                let old = self.read_place(&place)?.to_number();
                let new = old + f64::from(delta);
                self.write_place(place, Value::Number(new))?;
                let result = if let Op::PreIncr(..) = op { new } else { old };
                self.push(Value::Number(result));
            }

            Op::Print { argc, redirect } => {
                let target = self.pop_target(redirect)?;
                let args = self.pop_n(argc)?;
                let mut line = String::new();
                if argc == 0 {
                    line.push_str(&self.fields.get(0).as_str());
                } else {
                    let ofs = self.globals[special::OFS].as_str_with(&self.convfmt);
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            line.push_str(&ofs);
                        }
                        match arg {
                            Value::Number(n) => line.push_str(&format_number(*n, &self.ofmt)),
                            other => line.push_str(&other.as_str_with(&self.convfmt)),
                        }
                    }
                }
                line.push_str(&self.globals[special::ORS].as_str_with(&self.convfmt));
                self.write_output(redirect, target, &line, out)?;
            }
            Op::Printf { argc, redirect } => {
                let target = self.pop_target(redirect)?;
                let args = self.pop_n(argc)?;
                let Some((format, rest)) = args.split_first() else {
                    return Err(Error::runtime("printf: no format"));
                };
                let text = super::format::sprintf(&format.as_str_with(&self.convfmt), rest, &self.convfmt);
                self.write_output(redirect, target, &text, out)?;
            }
            Op::Getline { source, target } => {
                let result = self.getline(source, target, out)?;
                self.push(Value::Number(result));
            }
            Op::CallBuiltin(builtin, argc) => {
                let args = self.pop_n(argc)?;
                let value = self.call_builtin(builtin, args, out)?;
                self.push(value);
            }
            Op::Sub { global, target } => {
                let place = self.pop_place(target)?;
                let repl = self.pop()?;
                let repl = repl.as_str_with(&self.convfmt).into_owned();
                let ere = self.pop()?;
                let re = self.regex_of(&ere)?;
                let current = self.read_place(&place)?;
                let text = current.as_str_with(&self.convfmt).into_owned();
                let count = match builtins::substitute(&re, &text, &repl, global) {
                    Some((replaced, count)) => {
                        self.write_place(place, Value::str(replaced))?;
                        count
                    }
                    None => 0,
                };
                self.push(Value::Number(count as f64));
            }
            Op::Split { map, has_fs } => {
                let splitter = if has_fs {
                    let fs = self.pop()?;
                    Splitter::from_value(&fs, &mut self.regexes)?
                } else {
                    self.current_splitter()?
                };
                let s = self.pop()?;
                let text = s.as_str_with(&self.convfmt).into_owned();
                let mut pieces = Vec::new();
                splitter.split_into(&text, &mut pieces);
                let count = pieces.len();
                let target = self.map_of(map)?;
                let mut target = target.borrow_mut();
                target.clear();
                for (i, piece) in pieces.into_iter().enumerate() {
                    target.insert(AwkStr::from((i + 1).to_string()), piece);
                }
                drop(target);
                self.push(Value::Number(count as f64));
            }

            Op::Call { func, argc } => {
                if self.frames.len() >= MAX_CALL_DEPTH {
                    return Err(Error::runtime("function call nesting too deep"));
                }
                let function = program
                    .functions
                    .get(func)
                    .ok_or_else(|| Error::runtime("call to unknown function"))?;
                let base = self.stack.len().checked_sub(argc).ok_or_else(underflow)?;
                trace!(target: "awk::vm", function = %function.name, argc, depth = self.frames.len(), "call");
                self.frames.push(Frame {
                    func,
                    return_ip: *ip,
                    base,
                    argc,
                });
                *ip = function.entry;
            }
            Op::Enter(func) => {
                let frame = self.frames.last().copied().ok_or_else(|| Error::runtime("no call frame"))?;
                if let Some(function) = program.functions.get(func) {
                    for kind in function.kinds.iter().skip(frame.argc) {
                        self.push(match kind {
                            VarKind::Scalar => Value::Uninitialized,
                            VarKind::Map => Value::new_map(),
                            VarKind::Unknown => Value::new_undecided(),
                        });
                    }
                }
            }
            Op::Return => {
                let value = self.pop()?;
                let frame = self.frames.pop().ok_or_else(|| Error::runtime("return outside function"))?;
                self.stack.truncate(frame.base);
                self.push(value);
                *ip = frame.return_ip;
            }

            Op::Next => return Ok(Some(Control::Next)),
            Op::NextFile => return Ok(Some(Control::NextFile)),
            Op::Exit(has_status) => {
                if has_status {
                    self.exit_code = self.pop()?.to_number() as i32;
                }
                return Ok(Some(Control::Exit));
            }
            Op::Quit => return Ok(Some(Control::Done)),

            Op::RangeEnter { id, target } => {
                if self.ranges.get(id) == Some(&RangeState::On) {
                    *ip = target;
                }
            }
            Op::RangeStart { id, skip } => {
                if !self.pop()?.is_truthy() {
                    *ip = skip;
                } else if let Some(state) = self.ranges.get_mut(id) {
                    *state = RangeState::ActivatedThisRecord;
                }
            }
            Op::RangeEnd { id } => {
                let ended = self.pop()?.is_truthy();
                if let Some(state) = self.ranges.get_mut(id) {
                    *state = if ended { RangeState::Off } else { RangeState::On };
                }
            }

            Op::IterInit(var) => {
                let map = self.map_of(var)?;
                self.push(Value::Map(map));
                self.push(Value::Number(0.0));
            }
            Op::IterNext { var, exit } => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(underflow());
                }
                let cursor = self.stack[len - 1].to_number() as u64;
                let next = match &self.stack[len - 2] {
                    Value::Map(map) => map.borrow().next_key(cursor),
                    _ => None,
                };
                match next {
                    Some((seq, key)) => {
                        self.stack[len - 1] = Value::Number((seq + 1) as f64);
                        self.write_place(Place::Var(var), Value::from_string(key))?;
                    }
                    None => *ip = exit,
                }
            }
        }
        Ok(None)
    }

    // ===== stack =====

    #[inline]
    pub(super) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub(super) fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or_else(underflow)
    }

    /// Pop the top `n` values, in push order
    pub(super) fn pop_n(&mut self, n: usize) -> Result<Vec<Value>> {
        let start = self.stack.len().checked_sub(n).ok_or_else(underflow)?;
        Ok(self.stack.split_off(start))
    }

    fn join_subscript(&self, parts: &[Value]) -> String {
        let subsep = self.globals[special::SUBSEP].as_str_with(&self.convfmt);
        let mut key = String::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                key.push_str(&subsep);
            }
            key.push_str(&part.as_str_with(&self.convfmt));
        }
        key
    }

    fn pop_key(&mut self) -> Result<AwkStr> {
        let key = self.pop()?;
        Ok(key.into_awkstr(&self.convfmt))
    }

    fn pop_field_index(&mut self) -> Result<usize> {
        let n = self.pop()?.to_number();
        if n < 0.0 || n.is_nan() {
            return Err(Error::runtime(format!("attempt to access field {}", n)));
        }
        Ok(n as usize)
    }

    fn pop_target(&mut self, redirect: Redirect) -> Result<Option<String>> {
        if redirect == Redirect::None {
            return Ok(None);
        }
        let target = self.pop()?;
        Ok(Some(target.as_str_with(&self.convfmt).into_owned()))
    }

    fn literal(&self, i: usize) -> Result<Value> {
        match self.program.literals.get(i) {
            Some(Literal::Number(n)) => Ok(Value::Number(*n)),
            Some(Literal::String(s)) => Ok(Value::String(s.clone())),
            Some(Literal::Regex(re)) => Ok(Value::Regex(Rc::clone(re))),
            None => Err(Error::runtime(format!("bad literal index {}", i))),
        }
    }

    // ===== variables =====

    fn local_index(&self, i: usize) -> Result<usize> {
        let frame = self.frames.last().ok_or_else(|| Error::runtime("local variable outside function"))?;
        Ok(frame.base + i)
    }

    fn slot(&self, var: Var) -> Result<&Value> {
        match var {
            Var::Global(slot) => self.globals.get(slot),
            Var::Local(i) => self.stack.get(self.local_index(i)?),
        }
        .ok_or_else(|| Error::runtime("bad variable slot"))
    }

    fn slot_mut(&mut self, var: Var) -> Result<&mut Value> {
        match var {
            Var::Global(slot) => self.globals.get_mut(slot),
            Var::Local(i) => {
                let index = self.local_index(i)?;
                self.stack.get_mut(index)
            }
        }
        .ok_or_else(|| Error::runtime("bad variable slot"))
    }

    fn var_name(&self, var: Var) -> String {
        let name = match var {
            Var::Global(slot) => self.program.globals.get(slot).map(|g| g.name.as_str()),
            Var::Local(i) => self
                .frames
                .last()
                .and_then(|f| self.program.functions.get(f.func))
                .and_then(|func| func.params.get(i))
                .map(String::as_str),
        };
        name.unwrap_or("?").to_string()
    }

    fn load_scalar(&self, var: Var) -> Result<Value> {
        match self.slot(var)? {
            Value::Undecided(map) if map.borrow().is_empty() => Ok(Value::Uninitialized),
            Value::Map(_) | Value::Undecided(_) => Err(Error::runtime(format!(
                "attempt to use array `{}' in a scalar context",
                self.var_name(var)
            ))),
            value => Ok(value.clone()),
        }
    }

    /// The array held by `var`, creating it if the variable is still untyped
    pub(super) fn map_of(&mut self, var: Var) -> Result<MapRef> {
        let slot = self.slot_mut(var)?;
        let map = match slot {
            Value::Map(map) => Some(Rc::clone(map)),
            Value::Undecided(map) => {
                let map = Rc::clone(map);
                *slot = Value::Map(Rc::clone(&map));
                Some(map)
            }
            Value::Uninitialized => {
                let map = Rc::new(RefCell::new(AwkMap::new()));
                *slot = Value::Map(Rc::clone(&map));
                Some(map)
            }
            _ => None,
        };
        map.ok_or_else(|| {
            Error::runtime(format!(
                "attempt to use scalar `{}' as an array",
                self.var_name(var)
            ))
        })
    }

    fn store_var(&mut self, var: Var, value: Value) -> Result<()> {
        match var {
            Var::Global(slot) => self.store_global(slot, value),
            Var::Local(_) => {
                let slot = self.slot_mut(var)?;
                let is_array = match slot {
                    Value::Map(_) => true,
                    Value::Undecided(map) => !map.borrow().is_empty(),
                    _ => false,
                };
                if !is_array {
                    *slot = value;
                    return Ok(());
                }
                Err(Error::runtime(format!(
                    "can't assign to `{}'; it's an array name",
                    self.var_name(var)
                )))
            }
        }
    }

    // ===== assignment targets =====

    pub(super) fn pop_place(&mut self, target: Lvalue) -> Result<Place> {
        Ok(match target {
            Lvalue::Var(var) => Place::Var(var),
            Lvalue::Field => Place::Field(self.pop_field_index()?),
            Lvalue::Elem(var) => {
                let key = self.pop_key()?;
                Place::Elem(self.map_of(var)?, key)
            }
        })
    }

    pub(super) fn read_place(&mut self, place: &Place) -> Result<Value> {
        match place {
            Place::Var(var) => self.load_scalar(*var),
            Place::Field(i) => Ok(self.fields.get(*i)),
            Place::Elem(map, key) => Ok(map.borrow_mut().entry(key).clone()),
        }
    }

    pub(super) fn write_place(&mut self, place: Place, value: Value) -> Result<()> {
        match place {
            Place::Var(var) => self.store_var(var, value),
            Place::Field(i) => self.set_field(i, value),
            Place::Elem(map, key) => {
                map.borrow_mut().insert(key, value);
                Ok(())
            }
        }
    }

    /// Assign `$i`; fields hold strings converted with CONVFMT
    fn set_field(&mut self, i: usize, value: Value) -> Result<()> {
        let text = value.into_awkstr(&self.convfmt);
        if i == 0 {
            return self.set_record(text);
        }
        let ofs = self.globals[special::OFS].as_str_with(&self.convfmt).into_owned();
        self.fields.set_field(i, Value::from_string(text), &ofs);
        self.globals[special::NF] = Value::Number(self.fields.nf() as f64);
        Ok(())
    }

    /// Regex operand: a literal, or a dynamic pattern from its string value
    pub(super) fn regex_of(&mut self, value: &Value) -> Result<Rc<Regex>> {
        match value {
            Value::Regex(re) => Ok(Rc::clone(re)),
            other => {
                let source = other.as_str_with(&self.convfmt);
                self.regexes.get(&source)
            }
        }
    }

    // ===== input and output =====

    fn write_output(
        &mut self,
        redirect: Redirect,
        target: Option<String>,
        text: &str,
        out: &mut dyn Write,
    ) -> Result<()> {
        let (mode, name) = match (redirect, target) {
            (Redirect::File, Some(name)) => (OutputMode::Truncate, name),
            (Redirect::Append, Some(name)) => (OutputMode::Append, name),
            (Redirect::Pipe, Some(name)) => (OutputMode::Pipe, name),
            _ => return Ok(out.write_all(&self.encoding.encode(text))?),
        };
        if mode != OutputMode::Pipe && (name == "/dev/stdout" || name == "-") {
            return Ok(out.write_all(&self.encoding.encode(text))?);
        }
        if mode == OutputMode::Pipe && !self.streams.is_open(&name) {
            out.flush()?;
        }
        let writer = self
            .streams
            .output(&name, mode)
            .map_err(|e| Error::runtime(format!("can't redirect to `{}': {}", name, e)))?;
        writer.write_all(&self.encoding.encode(text))?;
        Ok(())
    }

    /// Run one getline form; returns 1, 0 at end of input, or -1 on error
    fn getline(&mut self, source: GetlineSource, target: Option<Lvalue>, out: &mut dyn Write) -> Result<f64> {
        match source {
            GetlineSource::Main => {
                let place = target.map(|lv| self.pop_place(lv)).transpose()?;
                let Some(record) = self.next_main_record()? else {
                    return Ok(0.0);
                };
                self.bump(special::NR);
                self.bump(special::FNR);
                match place {
                    Some(place) => self.write_place(place, Value::from_string(record))?,
                    None => self.set_record(record)?,
                }
                Ok(1.0)
            }
            GetlineSource::File => {
                let name = self.pop()?;
                let name = name.as_str_with(&self.convfmt).into_owned();
                let place = target.map(|lv| self.pop_place(lv)).transpose()?;
                let record = if super::is_stdin(&name) {
                    let sep = self.current_record_sep()?;
                    match self.stdin.read_record(&sep) {
                        Ok(record) => record,
                        Err(e) => {
                            trace!(target: "awk::io", error = %e, "getline from stdin failed");
                            return Ok(-1.0);
                        }
                    }
                } else {
                    match self.read_stream(&name, InputMode::File)? {
                        None if !self.streams.is_open(&name) => return Ok(-1.0),
                        record => record,
                    }
                };
                let Some(record) = record else {
                    return Ok(0.0);
                };
                match place {
                    Some(place) => self.write_place(place, Value::from_string(record))?,
                    None => self.set_record(record)?,
                }
                Ok(1.0)
            }
            GetlineSource::Pipe => {
                let place = target.map(|lv| self.pop_place(lv)).transpose()?;
                let command = self.pop()?;
                let command = command.as_str_with(&self.convfmt).into_owned();
                if !self.streams.is_open(&command) {
                    out.flush()?;
                }
                let Some(record) = self.read_stream(&command, InputMode::Pipe)? else {
                    return Ok(if self.streams.is_open(&command) { 0.0 } else { -1.0 });
                };
                self.bump(special::NR);
                match place {
                    Some(place) => self.write_place(place, Value::from_string(record))?,
                    None => self.set_record(record)?,
                }
                Ok(1.0)
            }
        }
    }

    /// Next record from a getline stream; `None` at end of input or when the
    /// stream cannot be opened (in which case it is not left open)
    fn read_stream(&mut self, name: &str, mode: InputMode) -> Result<Option<String>> {
        let sep = self.current_record_sep()?;
        match self.streams.read_record(name, mode, &sep) {
            Ok(record) => Ok(record),
            Err(e) => {
                trace!(target: "awk::io", name, error = %e, "getline failed");
                if let Some(Err(e)) = self.streams.close(name) {
                    trace!(target: "awk::io", name, error = %e, "close after failure");
                }
                Ok(None)
            }
        }
    }
}

pub(super) fn arith(op: ArithOp, l: f64, r: f64) -> Result<f64> {
    Ok(match op {
        ArithOp::Add => l + r,
        ArithOp::Sub => l - r,
        ArithOp::Mul => l * r,
        ArithOp::Div => {
            if r == 0.0 {
                return Err(Error::runtime("division by zero"));
            }
            l / r
        }
        ArithOp::Mod => {
            if r == 0.0 {
                return Err(Error::runtime("division by zero in %"));
            }
            l % r
        }
        ArithOp::Pow => l.powf(r),
    })
}
