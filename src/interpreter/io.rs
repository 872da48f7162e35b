//! Record input and redirected output streams.

use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::rc::Rc;

use regex::Regex;
use tracing::debug;

use crate::regex_bridge;

/// How bytes from the outside world become AWK strings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    /// Input must be valid UTF-8; anything else is an error
    #[default]
    Utf8,
    /// Every byte is one character in U+0000..=U+00FF and maps back to
    /// the same byte on output
    Bytes,
}

impl Encoding {
    /// Decode raw input bytes
    pub fn decode(self, bytes: Vec<u8>) -> io::Result<String> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "invalid UTF-8 in input after byte {} (use -b to read bytes)",
                        e.utf8_error().valid_up_to()
                    ),
                )
            }),
            Encoding::Bytes => Ok(bytes.into_iter().map(char::from).collect()),
        }
    }

    /// Re-read UTF-8 text (program source, arguments) in this encoding
    pub fn widen(self, text: &str) -> String {
        match self {
            Encoding::Utf8 => text.to_string(),
            Encoding::Bytes => text.bytes().map(char::from).collect(),
        }
    }

    /// Bytes to write for `text`; in byte mode characters above U+00FF
    /// are written as UTF-8
    pub fn encode(self, text: &str) -> Cow<'_, [u8]> {
        if self == Encoding::Utf8 || text.is_ascii() {
            return Cow::Borrowed(text.as_bytes());
        }
        let mut bytes = Vec::with_capacity(text.len());
        for c in text.chars() {
            match u8::try_from(c) {
                Ok(b) => bytes.push(b),
                Err(_) => bytes.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes()),
            }
        }
        Cow::Owned(bytes)
    }

    /// File name or command line for `text`
    pub fn os_string(self, text: &str) -> OsString {
        match self {
            Encoding::Utf8 => OsString::from(text),
            Encoding::Bytes => os_from_bytes(self.encode(text).into_owned()),
        }
    }

    /// Decode an environment string
    pub fn decode_os(self, text: &OsStr) -> String {
        match (self, os_bytes(text)) {
            (Encoding::Bytes, Some(bytes)) => bytes.iter().copied().map(char::from).collect(),
            _ => text.to_string_lossy().into_owned(),
        }
    }
}

#[cfg(unix)]
fn os_from_bytes(bytes: Vec<u8>) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(bytes)
}

#[cfg(not(unix))]
fn os_from_bytes(bytes: Vec<u8>) -> OsString {
    OsString::from(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(unix)]
fn os_bytes(text: &OsStr) -> Option<&[u8]> {
    use std::os::unix::ffi::OsStrExt;
    Some(text.as_bytes())
}

#[cfg(not(unix))]
fn os_bytes(_text: &OsStr) -> Option<&[u8]> {
    None
}

/// How the input is cut into records (derived from RS)
#[derive(Debug, Clone)]
pub enum RecordSep {
    Char(char),
    /// RS = "": records are separated by blank lines
    Paragraph,
    Regex(Rc<Regex>),
}

/// Reads records from a byte stream
pub struct RecordReader<'a> {
    input: Box<dyn BufRead + 'a>,
    encoding: Encoding,
    buf: String,
    /// Bytes of `buf` already searched for a single-character separator
    scanned: usize,
    eof: bool,
}

impl<'a> RecordReader<'a> {
    pub fn new(input: impl BufRead + 'a, encoding: Encoding) -> Self {
        Self {
            input: Box::new(input),
            encoding,
            buf: String::new(),
            scanned: 0,
            eof: false,
        }
    }

    /// Append the next line of input to the buffer; false at end of input
    fn fill(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let mut bytes = Vec::new();
        if self.input.read_until(b'\n', &mut bytes)? == 0 {
            self.eof = true;
            return Ok(false);
        }
        let text = self.encoding.decode(bytes)?;
        self.buf.push_str(&text);
        Ok(true)
    }

    /// Remove `..end` from the buffer, returning `..start` as the record
    fn take(&mut self, start: usize, end: usize) -> String {
        let record = self.buf[..start].to_string();
        self.buf.drain(..end);
        self.scanned = 0;
        record
    }

    fn take_rest(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }

    /// Next record, without its terminator; `None` at end of input
    pub fn read_record(&mut self, sep: &RecordSep) -> io::Result<Option<String>> {
        match sep {
            RecordSep::Char(c) => loop {
                if let Some(i) = self.buf[self.scanned..].find(*c) {
                    let at = self.scanned + i;
                    return Ok(Some(self.take(at, at + c.len_utf8())));
                }
                self.scanned = self.buf.len();
                if !self.fill()? {
                    return Ok(self.take_rest());
                }
            },
            RecordSep::Paragraph => {
                loop {
                    let blank = self.buf.len() - self.buf.trim_start_matches('\n').len();
                    self.buf.drain(..blank);
                    if !self.buf.is_empty() || !self.fill()? {
                        break;
                    }
                }
                loop {
                    if let Some(i) = self.buf.find("\n\n") {
                        return Ok(Some(self.take(i, i + 2)));
                    }
                    if !self.fill()? {
                        let trimmed = self.buf.trim_end_matches('\n').len();
                        self.buf.truncate(trimmed);
                        return Ok(self.take_rest());
                    }
                }
            }
            RecordSep::Regex(re) => loop {
                if let Some((start, end)) = regex_bridge::find_separator(re, &self.buf, 0) {
                    // the match may still grow with more input
                    if end < self.buf.len() || self.eof {
                        return Ok(Some(self.take(start, end)));
                    }
                }
                if !self.fill()? {
                    if let Some((start, end)) = regex_bridge::find_separator(re, &self.buf, 0) {
                        return Ok(Some(self.take(start, end)));
                    }
                    return Ok(self.take_rest());
                }
            },
        }
    }
}

/// Kind of output redirection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Truncate,
    Append,
    Pipe,
}

/// Kind of getline source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    File,
    Pipe,
}

enum Stream {
    OutFile(BufWriter<File>),
    OutPipe {
        child: Child,
        stdin: Option<BufWriter<ChildStdin>>,
    },
    Stderr(StderrWriter),
    InFile(RecordReader<'static>),
    InPipe {
        child: Child,
        reader: RecordReader<'static>,
    },
}

impl Stream {
    fn writer(&mut self) -> Option<&mut dyn Write> {
        match self {
            Stream::OutFile(w) => Some(w as &mut dyn Write),
            Stream::OutPipe { stdin: Some(w), .. } => Some(w as &mut dyn Write),
            Stream::Stderr(w) => Some(w as &mut dyn Write),
            _ => None,
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }

    /// Flush and release the stream; pipes report the command's exit status
    fn close(self) -> io::Result<i32> {
        match self {
            Stream::OutFile(mut w) => w.flush().map(|_| 0),
            Stream::OutPipe { mut child, stdin } => {
                if let Some(mut w) = stdin {
                    w.flush()?;
                }
                Ok(exit_code(child.wait()?))
            }
            Stream::Stderr(mut w) => w.flush().map(|_| 0),
            Stream::InFile(_) => Ok(0),
            Stream::InPipe { mut child, reader } => {
                drop(reader);
                Ok(exit_code(child.wait()?))
            }
        }
    }
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// `sh -c command`
pub fn shell(command: &str, encoding: Encoding) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(encoding.os_string(command));
    cmd
}

/// Files and commands opened by redirections and getline, keyed by name
#[derive(Default)]
pub struct Streams {
    open: HashMap<String, Stream>,
    encoding: Encoding,
}

impl Streams {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            open: HashMap::new(),
            encoding,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.open.contains_key(name)
    }

    /// Output stream `name`, opened on first use
    pub fn output(&mut self, name: &str, mode: OutputMode) -> io::Result<&mut dyn Write> {
        if !self.open.contains_key(name) {
            let path = self.encoding.os_string(name);
            let stream = match (name, mode) {
                ("/dev/stderr", _) => Stream::Stderr(StderrWriter),
                (_, OutputMode::Pipe) => {
                    let mut child = shell(name, self.encoding).stdin(Stdio::piped()).spawn()?;
                    let stdin = child.stdin.take().map(BufWriter::new);
                    Stream::OutPipe { child, stdin }
                }
                (_, OutputMode::Append) => Stream::OutFile(BufWriter::new(
                    OpenOptions::new().append(true).create(true).open(&path)?,
                )),
                (_, OutputMode::Truncate) => Stream::OutFile(BufWriter::new(File::create(&path)?)),
            };
            debug!(target: "awk::io", name, ?mode, "opened output stream");
            self.open.insert(name.to_string(), stream);
        }
        match self.open.get_mut(name) {
            Some(stream) => stream.writer().ok_or_else(|| {
                io::Error::other(format!("`{}' is open for reading", name))
            }),
            None => Err(io::Error::other("stream vanished")),
        }
    }

    /// Read the next record from input stream `name`, opened on first use.
    /// Standard input is not a stream here; the runtime shares its own
    /// reader for `-` and `/dev/stdin`.
    pub fn read_record(
        &mut self,
        name: &str,
        mode: InputMode,
        sep: &RecordSep,
    ) -> io::Result<Option<String>> {
        if !self.open.contains_key(name) {
            let encoding = self.encoding;
            let stream = match mode {
                InputMode::File => {
                    let file = File::open(encoding.os_string(name))?;
                    Stream::InFile(RecordReader::new(BufReader::new(file), encoding))
                }
                InputMode::Pipe => {
                    let mut child = shell(name, encoding).stdout(Stdio::piped()).spawn()?;
                    let stdout = child
                        .stdout
                        .take()
                        .ok_or_else(|| io::Error::other("no pipe to command"))?;
                    Stream::InPipe {
                        child,
                        reader: RecordReader::new(BufReader::new(stdout), encoding),
                    }
                }
            };
            debug!(target: "awk::io", name, ?mode, "opened input stream");
            self.open.insert(name.to_string(), stream);
        }
        match self.open.get_mut(name) {
            Some(Stream::InFile(reader)) | Some(Stream::InPipe { reader, .. }) => reader.read_record(sep),
            _ => Err(io::Error::other(format!("`{}' is open for writing", name))),
        }
    }

    /// Close stream `name`; `None` if it was not open
    pub fn close(&mut self, name: &str) -> Option<io::Result<i32>> {
        let stream = self.open.remove(name)?;
        debug!(target: "awk::io", name, "closing stream");
        Some(stream.close())
    }

    /// Flush one output stream; false if it is not open
    pub fn flush(&mut self, name: &str) -> io::Result<bool> {
        match self.open.get_mut(name) {
            Some(stream) => stream.flush().map(|_| true),
            None => Ok(false),
        }
    }

    pub fn flush_all(&mut self) -> io::Result<()> {
        for stream in self.open.values_mut() {
            stream.flush()?;
        }
        Ok(())
    }

    /// Close everything, reporting the first failure
    pub fn close_all(&mut self) -> io::Result<()> {
        let mut result = Ok(());
        for (name, stream) in self.open.drain() {
            if let Err(e) = stream.close() {
                debug!(target: "awk::io", name, error = %e, "close failed");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

/// Unbuffered writer for `/dev/stderr`
struct StderrWriter;

impl Write for StderrWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}
