//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! The I/O layer: record readers parameterized by the record separator,
//! lazily opened named input/output streams, the shell plumbing behind
//! `system()` and pipes, and the native (host) function facade.

use std::collections::{hash_map::Entry, HashMap};
use std::ffi::CString;
use std::fs::File;
use std::io::{BufReader, Bytes, Read, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::rc::Rc;

use crate::regex::{ere_escape_char, Regex};

pub enum RecordSeparator {
    /// split on a single byte; `\n` is the default
    Char(u8),
    /// multi-character (or single multi-byte rune) separators are regexes
    Ere(Rc<Regex>),
    /// empty `RS`: records are separated by runs of blank lines
    Paragraph,
}

impl RecordSeparator {
    pub fn parse(value: &str) -> Result<Self, String> {
        if value.is_empty() {
            Ok(RecordSeparator::Paragraph)
        } else if value.len() == 1 {
            Ok(RecordSeparator::Char(value.as_bytes()[0]))
        } else if value.chars().count() == 1 {
            let escaped = ere_escape_char(value.chars().next().unwrap());
            Ok(RecordSeparator::Ere(Rc::from(Regex::new(escaped.into())?)))
        } else {
            Ok(RecordSeparator::Ere(Rc::from(Regex::new(Rc::from(value))?)))
        }
    }
}

/// A record together with the terminator text that ended it (stored into
/// `RT`). The terminator is empty when the record was ended by EOF.
pub type RecordAndTerminator = (String, String);

type ReadResult = Result<u8, String>;

macro_rules! read_iter_next {
    ($iter:expr, $ret:expr) => {
        match $iter.next() {
            Some(byte_result) => byte_result?,
            None => return $ret,
        }
    };
}

/// A source of records: a byte stream plus the separator-driven scanning
/// logic. Implementations only supply the byte iterator and a queue for
/// records buffered by regex separators.
pub trait RecordReader: Iterator<Item = ReadResult> {
    fn is_done(&self) -> bool;

    fn buffered_records(&mut self) -> &mut Vec<RecordAndTerminator>;

    fn read_next_record(
        &mut self,
        separator: &RecordSeparator,
    ) -> Result<Option<RecordAndTerminator>, String> {
        let buffered = self.buffered_records();
        if !buffered.is_empty() {
            return Ok(Some(buffered.remove(0)));
        }
        if self.is_done() {
            return Ok(None);
        }
        match separator {
            RecordSeparator::Char(sep) => {
                let into_record = |buf: Vec<u8>, terminator: &str| -> Result<
                    Option<RecordAndTerminator>,
                    String,
                > {
                    let record = String::from_utf8(buf).map_err(|e| e.to_string())?;
                    Ok(Some((record, terminator.to_string())))
                };
                let mut buf = Vec::new();
                let mut next = read_iter_next!(self, Ok(None));
                while next != *sep {
                    buf.push(next);
                    next = read_iter_next!(self, into_record(buf, ""));
                }
                into_record(buf, &(*sep as char).to_string())
            }
            RecordSeparator::Ere(re) => {
                // scan the rest of the stream in one pass and queue the split
                // records
                let mut all_bytes = Vec::new();
                #[allow(clippy::while_let_on_iterator)]
                while let Some(byte_result) = self.next() {
                    all_bytes.push(byte_result?);
                }
                if all_bytes.is_empty() {
                    return Ok(None);
                }
                let input = String::from_utf8(all_bytes).map_err(|e| e.to_string())?;
                let subject = CString::new(input.as_str())
                    .map_err(|_| "input contains a NUL byte".to_string())?;
                let mut records = Vec::new();
                let mut split_start = 0;
                for m in re.match_locations(subject) {
                    records.push((
                        input[split_start..m.start].to_string(),
                        input[m.start..m.end].to_string(),
                    ));
                    split_start = m.end;
                }
                let last = &input[split_start..];
                if !last.is_empty() {
                    records.push((last.to_string(), String::new()));
                }
                if records.is_empty() {
                    return Ok(None);
                }
                let first = records.remove(0);
                *self.buffered_records() = records;
                Ok(Some(first))
            }
            RecordSeparator::Paragraph => {
                // skip blank lines separating the previous record
                let mut line_buf = Vec::new();
                loop {
                    let next = read_iter_next!(self, Ok(None));
                    if next == b'\n' {
                        if line_buf.is_empty() {
                            continue;
                        }
                        break;
                    }
                    line_buf.push(next);
                }

                let mut record_buf = line_buf;
                let into_record = |buf: Vec<u8>, terminator: &str| -> Result<
                    Option<RecordAndTerminator>,
                    String,
                > {
                    let record = String::from_utf8(buf).map_err(|e| e.to_string())?;
                    Ok(Some((record, terminator.to_string())))
                };

                // accumulate lines until a blank line or EOF
                loop {
                    let mut line_buf = Vec::new();
                    loop {
                        match self.next() {
                            Some(byte_result) => {
                                let byte = byte_result?;
                                if byte == b'\n' {
                                    break;
                                }
                                line_buf.push(byte);
                            }
                            None => {
                                if !line_buf.is_empty() {
                                    record_buf.push(b'\n');
                                    record_buf.extend_from_slice(&line_buf);
                                }
                                return into_record(record_buf, "");
                            }
                        }
                    }
                    if line_buf.is_empty() {
                        // blank line: end of record
                        break;
                    }
                    record_buf.push(b'\n');
                    record_buf.extend_from_slice(&line_buf);
                }

                into_record(record_buf, "\n\n")
            }
        }
    }
}

/// A buffered byte stream over any reader.
pub struct ByteStream<R: Read> {
    bytes: Bytes<BufReader<R>>,
    is_done: bool,
    buffered_records: Vec<RecordAndTerminator>,
}

impl<R: Read> ByteStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            bytes: BufReader::new(reader).bytes(),
            is_done: false,
            buffered_records: Vec::new(),
        }
    }
}

impl<R: Read> Iterator for ByteStream<R> {
    type Item = ReadResult;

    fn next(&mut self) -> Option<Self::Item> {
        match self.bytes.next() {
            Some(Ok(byte)) => Some(Ok(byte)),
            Some(Err(e)) => Some(Err(e.to_string())),
            None => {
                self.is_done = true;
                None
            }
        }
    }
}

impl<R: Read> RecordReader for ByteStream<R> {
    fn is_done(&self) -> bool {
        self.is_done && self.buffered_records.is_empty()
    }

    fn buffered_records(&mut self) -> &mut Vec<RecordAndTerminator> {
        &mut self.buffered_records
    }
}

pub fn open_input_file(path: &str) -> Result<ByteStream<File>, String> {
    let file =
        File::open(path).map_err(|_| format!("could not open file '{}'", path))?;
    Ok(ByteStream::new(file))
}

/// A record reader over the standard output of a shell command.
pub struct CommandRecordReader {
    child: Child,
    stream: ByteStream<ChildStdout>,
}

impl CommandRecordReader {
    pub fn spawn(shell: &[String], command: &str) -> Result<Self, String> {
        let mut child = shell_command(shell, command)
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| format!("could not spawn '{}': {}", command, e))?;
        let stdout = child
            .stdout
            .take()
            .expect("child process has no captured stdout");
        Ok(Self {
            child,
            stream: ByteStream::new(stdout),
        })
    }
}

impl Iterator for CommandRecordReader {
    type Item = ReadResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.next()
    }
}

impl RecordReader for CommandRecordReader {
    fn is_done(&self) -> bool {
        self.stream.is_done()
    }

    fn buffered_records(&mut self) -> &mut Vec<RecordAndTerminator> {
        self.stream.buffered_records()
    }
}

impl Drop for CommandRecordReader {
    fn drop(&mut self) {
        let _ = self.child.wait();
    }
}

/// The result of one getline read attempt.
pub enum GetlineRead {
    Record(RecordAndTerminator),
    Eof,
    /// the source could not be opened; getline returns -1
    CannotOpen,
}

/// Input files opened by `getline < file`, one per name, read lazily.
#[derive(Default)]
pub struct ReadFiles {
    files: HashMap<Rc<str>, Option<ByteStream<File>>>,
}

impl ReadFiles {
    pub fn read_next_record(
        &mut self,
        filename: Rc<str>,
        separator: &RecordSeparator,
    ) -> Result<GetlineRead, String> {
        let stream = match self.files.entry(filename.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(open_input_file(&filename).ok()),
        };
        match stream {
            Some(stream) => match stream.read_next_record(separator)? {
                Some(record) => Ok(GetlineRead::Record(record)),
                None => Ok(GetlineRead::Eof),
            },
            None => Ok(GetlineRead::CannotOpen),
        }
    }

    pub fn close(&mut self, filename: &str) -> bool {
        self.files.remove(filename).is_some()
    }
}

/// Input pipes opened by `cmd | getline`, one per command string.
#[derive(Default)]
pub struct ReadPipes {
    pipes: HashMap<Rc<str>, Option<CommandRecordReader>>,
}

impl ReadPipes {
    pub fn read_next_record(
        &mut self,
        command: Rc<str>,
        shell: &[String],
        separator: &RecordSeparator,
    ) -> Result<GetlineRead, String> {
        let reader = match self.pipes.entry(command.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(CommandRecordReader::spawn(shell, &command).ok()),
        };
        match reader {
            Some(reader) => match reader.read_next_record(separator)? {
                Some(record) => Ok(GetlineRead::Record(record)),
                None => Ok(GetlineRead::Eof),
            },
            None => Ok(GetlineRead::CannotOpen),
        }
    }

    pub fn close(&mut self, command: &str) -> bool {
        self.pipes.remove(command).is_some()
    }
}

/// Output files opened by `print > file` and `print >> file`. The first
/// write under a name decides truncate-vs-append; later writes go to the
/// same open handle.
#[derive(Default)]
pub struct WriteFiles {
    files: HashMap<Rc<str>, File>,
}

impl WriteFiles {
    pub fn write(&mut self, filename: Rc<str>, contents: &str, append: bool) -> Result<(), String> {
        let file = match self.files.entry(filename.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let file = File::options()
                    .write(true)
                    .create(true)
                    .append(append)
                    .truncate(!append)
                    .open(filename.as_ref())
                    .map_err(|e| format!("could not open file '{}': {}", filename, e))?;
                e.insert(file)
            }
        };
        file.write_all(contents.as_bytes())
            .map_err(|e| format!("error writing to '{}': {}", filename, e))
    }

    pub fn flush_file(&mut self, filename: &str) -> bool {
        if let Some(file) = self.files.get_mut(filename) {
            file.flush().is_ok()
        } else {
            false
        }
    }

    pub fn flush_all(&mut self) -> bool {
        let mut success = true;
        for file in self.files.values_mut() {
            success = file.flush().is_ok() && success;
        }
        success
    }

    pub fn close(&mut self, filename: &str) -> bool {
        self.files.remove(filename).is_some()
    }
}

/// Output pipes opened by `print | cmd`, one shell child per command.
#[derive(Default)]
pub struct WritePipes {
    pipes: HashMap<Rc<str>, Child>,
}

impl WritePipes {
    pub fn write(
        &mut self,
        command: Rc<str>,
        shell: &[String],
        contents: &str,
    ) -> Result<(), String> {
        let child = match self.pipes.entry(command.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let child = shell_command(shell, &command)
                    .stdin(Stdio::piped())
                    .spawn()
                    .map_err(|e| format!("could not spawn '{}': {}", command, e))?;
                e.insert(child)
            }
        };
        child
            .stdin
            .as_mut()
            .expect("pipe child has no captured stdin")
            .write_all(contents.as_bytes())
            .map_err(|e| format!("error writing to pipe '{}': {}", command, e))
    }

    pub fn flush_file(&mut self, command: &str) -> bool {
        if let Some(child) = self.pipes.get_mut(command) {
            child
                .stdin
                .as_mut()
                .map(|stdin| stdin.flush().is_ok())
                .unwrap_or(false)
        } else {
            false
        }
    }

    pub fn flush_all(&mut self) -> bool {
        let mut success = true;
        for child in self.pipes.values_mut() {
            if let Some(stdin) = child.stdin.as_mut() {
                success = stdin.flush().is_ok() && success;
            }
        }
        success
    }

    pub fn close(&mut self, command: &str) -> bool {
        match self.pipes.remove(command) {
            Some(mut child) => {
                // dropping stdin closes the pipe so the child can exit
                drop(child.stdin.take());
                let _ = child.wait();
                true
            }
            None => false,
        }
    }
}

impl Drop for WritePipes {
    fn drop(&mut self) {
        for (_, mut child) in self.pipes.drain() {
            drop(child.stdin.take());
            let _ = child.wait();
        }
    }
}

fn shell_command(shell: &[String], command: &str) -> Command {
    let mut cmd = Command::new(&shell[0]);
    cmd.args(&shell[1..]).arg(command);
    cmd
}

/// Run a command through the configured shell with inherited standard
/// streams and return its exit code.
pub fn run_system(shell: &[String], command: &str) -> Result<i32, String> {
    let status = shell_command(shell, command)
        .status()
        .map_err(|e| format!("could not spawn '{}': {}", command, e))?;
    Ok(status.code().unwrap_or(-1))
}

/// The kinds a native function parameter can declare; arguments are coerced
/// to the declared kind before the call.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum NativeKind {
    Bool,
    Int,
    Float,
    Str,
}

#[derive(Debug, PartialEq, Clone)]
pub enum NativeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl NativeValue {
    pub fn zero(kind: NativeKind) -> Self {
        match kind {
            NativeKind::Bool => NativeValue::Bool(false),
            NativeKind::Int => NativeValue::Int(0),
            NativeKind::Float => NativeValue::Float(0.0),
            NativeKind::Str => NativeValue::Str(String::new()),
        }
    }
}

type NativeCallback = Box<dyn FnMut(Vec<NativeValue>) -> Result<NativeValue, String>>;

/// A host function callable from the program. A non-`Ok` result terminates
/// execution.
pub struct NativeFunction {
    pub name: String,
    pub params: Vec<NativeKind>,
    pub func: NativeCallback,
}

impl NativeFunction {
    pub fn new<F>(name: &str, params: Vec<NativeKind>, func: F) -> Self
    where
        F: FnMut(Vec<NativeValue>) -> Result<NativeValue, String> + 'static,
    {
        Self {
            name: name.to_string(),
            params,
            func: Box::new(func),
        }
    }
}
