//! Runtime: the bytecode VM and everything it drives (fields, streams,
//! formatting, builtins).

mod builtins;
mod fields;
pub mod format;
mod io;
mod vm;

use std::cell::RefCell;
use std::fs::File;
use std::io::{self as stdio, BufRead, BufReader, Write};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::lexer::{unescape, EscapeMode};
use crate::program::{special, Program, VarKind};
use crate::regex_bridge::RegexCache;
use crate::value::{AwkMap, AwkStr, MapRef, Value, DEFAULT_CONVFMT};

use builtins::Rng;
use fields::{Fields, Splitter};
use io::{RecordReader, RecordSep, Streams};
use vm::{Control, Frame};

pub use io::Encoding;

/// State of one range pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeState {
    /// Waiting for the start pattern
    Off,
    /// The start pattern matched the current record; the end pattern is
    /// tested on the same record
    ActivatedThisRecord,
    /// Active on every record until the end pattern matches
    On,
}

/// Where main input records currently come from
enum MainInput<'a> {
    Stdin,
    File(RecordReader<'a>),
}

/// The AWK runtime for one compiled program
pub struct Interpreter<'a> {
    program: &'a Program,

    globals: Vec<Value>,
    stack: Vec<Value>,
    frames: Vec<Frame>,

    fields: Fields,
    /// Splitter for the current FS, and the FS/paragraph mode it was built for
    splitter: Splitter,
    splitter_key: (String, bool),
    /// Record separator for the current RS
    record_sep: RecordSep,
    record_sep_key: String,

    /// Cached CONVFMT and OFMT
    convfmt: String,
    ofmt: String,

    ranges: Vec<RangeState>,
    regexes: RegexCache,
    streams: Streams,
    rng: Rng,

    encoding: Encoding,
    /// Standard input handed to `run`, shared by the main input and
    /// `getline < "-"`
    stdin: RecordReader<'a>,
    main_input: Option<MainInput<'a>>,
    /// Next ARGV index to examine
    arg_index: usize,
    /// Whether a file operand (or stdin) has been opened
    opened_input: bool,

    exit_code: i32,
}

impl<'a> Interpreter<'a> {
    pub fn new(program: &'a Program) -> Self {
        let mut globals: Vec<Value> = program
            .globals
            .iter()
            .map(|sym| match sym.kind {
                VarKind::Map => Value::new_map(),
                _ => Value::Uninitialized,
            })
            .collect();
        if globals.len() < special::NAMES.len() {
            globals.resize(special::NAMES.len(), Value::Uninitialized);
        }

        let mut argv = AwkMap::new();
        argv.insert(AwkStr::from("0"), Value::str("awk"));

        globals[special::ARGC] = Value::Number(1.0);
        globals[special::ARGV] = Value::Map(Rc::new(RefCell::new(argv)));
        globals[special::CONVFMT] = Value::str(DEFAULT_CONVFMT);
        globals[special::ENVIRON] = environ(Encoding::Utf8);
        globals[special::FNR] = Value::Number(0.0);
        globals[special::FS] = Value::str(" ");
        globals[special::NF] = Value::Number(0.0);
        globals[special::NR] = Value::Number(0.0);
        globals[special::OFMT] = Value::str(DEFAULT_CONVFMT);
        globals[special::OFS] = Value::str(" ");
        globals[special::ORS] = Value::str("\n");
        globals[special::RLENGTH] = Value::Number(-1.0);
        globals[special::RS] = Value::str("\n");
        globals[special::RSTART] = Value::Number(0.0);
        globals[special::SUBSEP] = Value::str("\x1c");

        Self {
            program,
            globals,
            stack: Vec::with_capacity(256),
            frames: Vec::new(),
            fields: Fields::new(),
            splitter: Splitter::Blank,
            splitter_key: (" ".to_string(), false),
            record_sep: RecordSep::Char('\n'),
            record_sep_key: "\n".to_string(),
            convfmt: DEFAULT_CONVFMT.to_string(),
            ofmt: DEFAULT_CONVFMT.to_string(),
            ranges: vec![RangeState::Off; program.range_count],
            regexes: RegexCache::new(),
            streams: Streams::new(Encoding::Utf8),
            rng: Rng::new(),
            encoding: Encoding::Utf8,
            stdin: RecordReader::new(stdio::empty(), Encoding::Utf8),
            main_input: None,
            arg_index: 1,
            opened_input: false,
            exit_code: 0,
        }
    }

    /// Choose how input, output, file names and ENVIRON are converted;
    /// call before `run`
    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
        self.streams = Streams::new(encoding);
        self.globals[special::ENVIRON] = environ(encoding);
    }

    /// Set the field separator (`-F`)
    pub fn set_fs(&mut self, fs: &str) {
        self.globals[special::FS] = Value::str(fs);
    }

    /// Assign a variable before BEGIN (`-v name=value`); escape sequences
    /// in `value` are decoded. Variables the program never mentions are
    /// ignored.
    pub fn set_variable(&mut self, name: &str, value: &str) -> Result<()> {
        match self.program.global_slot(name) {
            Some(slot) => self.store_global(slot, Value::from_string(unescape(value, EscapeMode::String))),
            None => Ok(()),
        }
    }

    /// Set ARGV (and ARGC); `args[0]` is the program name
    pub fn set_args(&mut self, args: Vec<String>) {
        let mut argv = AwkMap::new();
        let argc = args.len();
        for (i, arg) in args.into_iter().enumerate() {
            argv.insert(AwkStr::from(i.to_string()), Value::from_string(arg));
        }
        self.globals[special::ARGV] = Value::Map(Rc::new(RefCell::new(argv)));
        self.globals[special::ARGC] = Value::Number(argc as f64);
    }

    /// Run BEGIN, the main rules over the input and END; returns the exit
    /// status.
    ///
    /// `input` is standard input: it is read when ARGV names no files or
    /// names `-`.
    pub fn run<R: BufRead + 'a, W: Write>(&mut self, input: R, output: &mut W) -> Result<i32> {
        self.stdin = RecordReader::new(input, self.encoding);
        let result = self.run_program(output);
        let flushed = output.flush();
        let closed = self.streams.close_all();
        let status = result?;
        flushed?;
        closed?;
        Ok(status)
    }

    fn run_program(&mut self, out: &mut dyn Write) -> Result<i32> {
        let program = self.program;
        let mut exiting = false;

        if let Some(begin) = program.begin {
            exiting = self.run_region(begin, out)? == Control::Exit;
        }

        if !exiting && program.reads_input() {
            while let Some(record) = self.next_main_record()? {
                self.bump(special::NR);
                self.bump(special::FNR);
                self.set_record(record)?;
                let Some(main) = program.main else {
                    continue;
                };
                match self.run_region(main, out)? {
                    Control::Exit => break,
                    Control::NextFile => self.main_input = None,
                    Control::Done | Control::Next => {}
                }
            }
        }

        if let Some(end) = program.end {
            self.run_region(end, out)?;
        }
        debug!(target: "awk::vm", status = self.exit_code, "program finished");
        Ok(self.exit_code & 255)
    }

    /// Execute one BEGIN/main/END region, discarding whatever an early
    /// `next` or `exit` left on the stack
    fn run_region(&mut self, start: usize, out: &mut dyn Write) -> Result<Control> {
        let control = self.execute(start, out);
        self.stack.clear();
        self.frames.clear();
        control
    }

    fn bump(&mut self, slot: usize) {
        let n = self.globals[slot].to_number() + 1.0;
        self.globals[slot] = Value::Number(n);
    }

    fn argv(&self) -> Option<MapRef> {
        match &self.globals[special::ARGV] {
            Value::Map(map) | Value::Undecided(map) => Some(map.clone()),
            _ => None,
        }
    }

    /// Next record of the main input, moving through the ARGV operands
    pub(crate) fn next_main_record(&mut self) -> Result<Option<String>> {
        loop {
            if self.main_input.is_none() && !self.open_next_input()? {
                return Ok(None);
            }
            let sep = self.current_record_sep()?;
            let reader = match self.main_input.as_mut() {
                Some(MainInput::Stdin) => &mut self.stdin,
                Some(MainInput::File(reader)) => reader,
                None => continue,
            };
            match reader.read_record(&sep)? {
                Some(record) => return Ok(Some(record)),
                None => self.main_input = None,
            }
        }
    }

    /// Open the next file operand; false when the operands are exhausted
    fn open_next_input(&mut self) -> Result<bool> {
        let argc = self.globals[special::ARGC].to_number().max(0.0) as usize;
        while self.arg_index < argc {
            let index = self.arg_index;
            self.arg_index += 1;
            let arg = match self.argv() {
                Some(map) => map
                    .borrow()
                    .get(&index.to_string())
                    .map(|v| v.as_str_with(&self.convfmt).into_owned())
                    .unwrap_or_default(),
                None => String::new(),
            };
            if arg.is_empty() {
                continue;
            }
            if let Some((name, value)) = operand_assignment(&arg) {
                trace!(target: "awk::io", name, value, "operand assignment");
                let value = unescape(value, EscapeMode::String);
                if let Some(slot) = self.program.global_slot(name) {
                    self.store_global(slot, Value::from_string(value))?;
                }
                continue;
            }

            self.opened_input = true;
            let input = if is_stdin(&arg) {
                MainInput::Stdin
            } else {
                let file = File::open(self.encoding.os_string(&arg))
                    .map_err(|e| Error::runtime(format!("can't open file {}: {}", arg, e)))?;
                MainInput::File(RecordReader::new(BufReader::new(file), self.encoding))
            };
            debug!(target: "awk::io", file = %arg, "reading input file");
            self.globals[special::FILENAME] = Value::from_string(arg);
            self.globals[special::FNR] = Value::Number(0.0);
            self.main_input = Some(input);
            return Ok(true);
        }

        if self.opened_input {
            return Ok(false);
        }
        self.opened_input = true;
        self.globals[special::FNR] = Value::Number(0.0);
        self.main_input = Some(MainInput::Stdin);
        Ok(true)
    }

    /// Replace `$0`, splitting it with the current FS
    pub(crate) fn set_record(&mut self, text: impl Into<AwkStr>) -> Result<()> {
        self.refresh_splitter()?;
        self.fields.set_record(text.into(), &self.splitter);
        self.globals[special::NF] = Value::Number(self.fields.nf() as f64);
        Ok(())
    }

    fn refresh_splitter(&mut self) -> Result<()> {
        let paragraph = self.globals[special::RS].as_str_with(&self.convfmt).is_empty();
        let fs = self.globals[special::FS].as_str_with(&self.convfmt);
        if self.splitter_key.0 != *fs || self.splitter_key.1 != paragraph {
            let fs = fs.into_owned();
            trace!(target: "awk::vm", fs = %fs.escape_debug(), paragraph, "new field splitter");
            self.splitter = Splitter::from_fs(&fs, paragraph, &mut self.regexes)?;
            self.splitter_key = (fs, paragraph);
        }
        Ok(())
    }

    /// Splitter for the current FS
    pub(crate) fn current_splitter(&mut self) -> Result<Splitter> {
        self.refresh_splitter()?;
        Ok(self.splitter.clone())
    }

    pub(crate) fn current_record_sep(&mut self) -> Result<RecordSep> {
        let rs = self.globals[special::RS].as_str_with(&self.convfmt);
        if self.record_sep_key != *rs {
            let rs = rs.into_owned();
            let mut chars = rs.chars();
            self.record_sep = match (chars.next(), chars.next()) {
                (None, _) => RecordSep::Paragraph,
                (Some(c), None) => RecordSep::Char(c),
                _ => RecordSep::Regex(self.regexes.get(&rs)?),
            };
            self.record_sep_key = rs;
        }
        Ok(self.record_sep.clone())
    }

    /// Store into a global slot, keeping derived state in sync
    pub(crate) fn store_global(&mut self, slot: usize, value: Value) -> Result<()> {
        let is_array = match &self.globals[slot] {
            Value::Map(_) => true,
            Value::Undecided(map) => !map.borrow().is_empty(),
            _ => false,
        };
        if is_array {
            let name = self.program.globals.get(slot).map_or("?", |g| g.name.as_str());
            return Err(Error::runtime(format!("can't assign to `{}'; it's an array name", name)));
        }
        match slot {
            special::NF => {
                let n = value.to_number();
                if n < 0.0 {
                    return Err(Error::runtime(format!("NF set to negative value {}", n)));
                }
                let ofs = self.globals[special::OFS].as_str_with(&self.convfmt).into_owned();
                self.fields.set_nf(n as usize, &ofs);
                self.globals[slot] = Value::Number(n.trunc());
                return Ok(());
            }
            special::CONVFMT => self.convfmt = value.as_str_with(&self.convfmt).into_owned(),
            special::OFMT => self.ofmt = value.as_str_with(&self.convfmt).into_owned(),
            _ => {}
        }
        self.globals[slot] = value;
        Ok(())
    }
}

/// Whether a file name means standard input
pub(crate) fn is_stdin(name: &str) -> bool {
    name == "-" || name == "/dev/stdin"
}

fn environ(encoding: Encoding) -> Value {
    let mut map = AwkMap::new();
    for (key, value) in std::env::vars_os() {
        map.insert(
            AwkStr::from(encoding.decode_os(&key)),
            Value::from_string(encoding.decode_os(&value)),
        );
    }
    Value::Map(Rc::new(RefCell::new(map)))
}

/// Split a `name=value` operand when `name` is a valid identifier
fn operand_assignment(arg: &str) -> Option<(&str, &str)> {
    let (name, value) = arg.split_once('=')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, value))
}
