//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! The virtual machine: a fetch-decode-dispatch loop over compiled code
//! blocks, a value stack, call frames for user functions, and the record
//! loop driving pattern-action execution.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ffi::CString;
use std::io::{Read, Write};
use std::rc::Rc;

use crate::ast::{ArrayScope, AugOp, SpecialVar};
use crate::program::{
    ArrayOperand, InputSource, OpCode, OutputRedirect, Pattern, Program, SubTarget,
};
use crate::regex::Regex;

use array::Array;
use format::FormatSegment;
use io::{
    open_input_file, ByteStream, GetlineRead, ReadFiles, ReadPipes, RecordReader, RecordSeparator,
    WriteFiles, WritePipes,
};
use record::{FieldSeparator, Record};
use value::{compare_values, Value};

mod array;
mod builtins;
mod format;
mod io;
mod record;
mod value;
#[cfg(test)]
mod tests;

pub use io::{NativeFunction, NativeKind, NativeValue};

const MAX_CACHED_REGEXES: usize = 100;
const MAX_CACHED_FORMATS: usize = 100;
const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// Interpreter configuration: the standard streams, `ARGV`, pre-assignments,
/// host functions, safety flags, and the shell used for `system()` and
/// pipes.
pub struct Config {
    /// standard input; `None` uses the process stdin
    pub stdin: Option<Box<dyn Read>>,
    /// standard output; `None` uses the process stdout
    pub output: Option<Box<dyn Write>>,
    /// error output; `None` uses the process stderr
    pub error: Option<Box<dyn Write>>,
    /// the program name, available as `ARGV[0]`
    pub argv0: String,
    /// input arguments, usually file names; empty means read stdin only
    pub args: Vec<String>,
    /// flat name, value pairs assigned before execution starts
    pub vars: Vec<String>,
    /// flat name, value pairs seeding `ENVIRON`; `None` uses the process
    /// environment
    pub environ: Option<Vec<String>>,
    /// host functions callable from the program
    pub funcs: Vec<NativeFunction>,
    pub no_exec: bool,
    pub no_file_writes: bool,
    pub no_file_reads: bool,
    /// the command used to run shell snippets, e.g. `["/bin/sh", "-c"]`
    pub shell_command: Vec<String>,
    /// byte indexing for `substr`/`length`/`index`/`match`/`%c` instead of
    /// character indexing
    pub bytes: bool,
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stdin: None,
            output: None,
            error: None,
            argv0: "awk".to_string(),
            args: Vec::new(),
            vars: Vec::new(),
            environ: None,
            funcs: Vec::new(),
            no_exec: false,
            no_file_writes: false,
            no_file_reads: false,
            shell_command: Vec::new(),
            bytes: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Execute a compiled program. Returns the program's exit status, or the
/// error that aborted the run.
pub fn interpret(program: &Program, config: Config) -> Result<i32, String> {
    let mut interpreter = Interpreter::new(program, config)?;
    interpreter.run()
}

/// Non-local control transfers. These are state transitions inside the VM,
/// never surfaced to the host.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Flow {
    Normal,
    Break,
    Next,
    NextFile,
    Return,
    Exit,
}

/// The mutable global state the special variables map onto.
struct GlobalEnv {
    convfmt: Rc<str>,
    ofmt: Rc<str>,
    ofs: Rc<str>,
    ors: Rc<str>,
    subsep: Rc<str>,
    fs_source: Rc<str>,
    fs: FieldSeparator,
    /// `FS` adjusted to also split on newlines, used in paragraph mode
    paragraph_fs: Option<FieldSeparator>,
    rs_source: Rc<str>,
    rs: RecordSeparator,
    nr: i64,
    fnr: i64,
    argc: i64,
    rstart: f64,
    rlength: f64,
    rt: Rc<str>,
    filename: Value,
}

impl Default for GlobalEnv {
    fn default() -> Self {
        Self {
            convfmt: Rc::from("%.6g"),
            ofmt: Rc::from("%.6g"),
            ofs: Rc::from(" "),
            ors: Rc::from("\n"),
            subsep: Rc::from("\x1c"),
            fs_source: Rc::from(" "),
            fs: FieldSeparator::Default,
            paragraph_fs: None,
            rs_source: Rc::from("\n"),
            rs: RecordSeparator::Char(b'\n'),
            nr: 0,
            fnr: 0,
            argc: 0,
            rstart: 0.0,
            rlength: -1.0,
            rt: Rc::from(""),
            filename: Value::from(""),
        }
    }
}

impl GlobalEnv {
    fn set_fs(&mut self, source: Rc<str>) -> Result<(), String> {
        self.fs = FieldSeparator::parse(&source)?;
        self.fs_source = source;
        self.paragraph_fs = None;
        Ok(())
    }

    fn set_rs(&mut self, source: Rc<str>) -> Result<(), String> {
        self.rs = RecordSeparator::parse(&source)?;
        self.rs_source = source;
        Ok(())
    }

    /// Build the paragraph-mode field separator if it will be needed.
    fn ensure_effective_fs(&mut self) -> Result<(), String> {
        if !matches!(self.rs, RecordSeparator::Paragraph) || self.paragraph_fs.is_some() {
            return Ok(());
        }
        let adjusted = match &self.fs {
            // the whitespace rule already splits on newlines
            FieldSeparator::Default => FieldSeparator::Default,
            FieldSeparator::Char(c) => {
                let pattern = format!("{}|\n", crate::regex::ere_escape_char(*c));
                FieldSeparator::Ere(Rc::from(Regex::new(pattern.into())?))
            }
            FieldSeparator::Ere(_) => {
                let pattern = format!("({})|\n", self.fs_source);
                FieldSeparator::Ere(Rc::from(Regex::new(pattern.into())?))
            }
        };
        self.paragraph_fs = Some(adjusted);
        Ok(())
    }

    /// The separator field splitting should use right now. Call
    /// `ensure_effective_fs` first.
    fn effective_fs(&self) -> &FieldSeparator {
        if matches!(self.rs, RecordSeparator::Paragraph) {
            self.paragraph_fs.as_ref().unwrap_or(&self.fs)
        } else {
            &self.fs
        }
    }
}

struct Frame {
    prev_base: usize,
    prev_arrays: Vec<usize>,
    arrays_before: usize,
}

/// How a getline result is stored.
enum GetlineAssign {
    Record,
    Global(u32),
    Local(u32),
    Special(SpecialVar),
    Field(i64),
    ArrayElement { array: usize, key: Rc<str> },
}

pub(crate) struct Interpreter<'p> {
    program: &'p Program,

    // value stack and frames
    stack: Vec<Value>,
    frame_base: usize,
    frames: Vec<Frame>,
    current_arrays: Vec<usize>,
    array_args: Vec<usize>,
    return_value: Value,
    max_call_depth: usize,

    // variables
    globals: Vec<Value>,
    arrays: Vec<Array>,
    env: GlobalEnv,
    record: Record,
    /// the field separator captured when the current record was installed;
    /// assigning `FS` only affects records read afterwards
    record_fs: FieldSeparator,

    // main input
    stdin: Option<Box<dyn RecordReader>>,
    current_input: Option<Box<dyn RecordReader>>,
    argv_index: usize,
    argv_id: usize,
    had_files: bool,
    stdin_consumed: bool,

    // outputs and named streams
    output: Box<dyn Write>,
    error_output: Box<dyn Write>,
    read_files: ReadFiles,
    read_pipes: ReadPipes,
    write_files: WriteFiles,
    write_pipes: WritePipes,
    shell: Vec<String>,

    // host functions, indexed by the program's native function ids
    natives: Vec<NativeFunction>,

    // misc state
    rng: SmallRng,
    rand_seed: f64,
    regex_cache: HashMap<Rc<str>, Rc<Regex>>,
    format_cache: HashMap<Rc<str>, Rc<Vec<FormatSegment>>>,
    in_range: Vec<bool>,
    exit_status: i32,
    no_exec: bool,
    no_file_writes: bool,
    no_file_reads: bool,
    bytes: bool,
}

macro_rules! numeric_op {
    ($self:expr, $op:tt) => {{
        let rhs = $self.pop().num();
        let lhs = $self.pop().num();
        $self.push(Value::Num(lhs $op rhs));
    }};
}

impl<'p> Interpreter<'p> {
    fn new(program: &'p Program, config: Config) -> Result<Self, String> {
        if config.vars.len() % 2 != 0 {
            return Err(format!(
                "length of vars must be a multiple of 2, not {}",
                config.vars.len()
            ));
        }
        if let Some(environ) = &config.environ {
            if environ.len() % 2 != 0 {
                return Err(format!(
                    "length of environ must be a multiple of 2, not {}",
                    environ.len()
                ));
            }
        }

        let mut arrays: Vec<Array> = program.array_names.iter().map(|_| Array::default()).collect();
        let mut array_id = |name: &str| -> usize {
            match program.array_names.iter().position(|n| n.as_ref() == name) {
                Some(id) => id,
                None => {
                    // not referenced by the program, but still needed by the
                    // interpreter itself
                    arrays.push(Array::default());
                    arrays.len() - 1
                }
            }
        };
        let argv_id = array_id("ARGV");
        let environ_id = array_id("ENVIRON");

        let natives = bind_native_functions(program, config.funcs)?;

        let shell = if config.shell_command.is_empty() {
            vec!["/bin/sh".to_string(), "-c".to_string()]
        } else {
            config.shell_command
        };

        let stdin: Box<dyn RecordReader> = match config.stdin {
            Some(reader) => Box::new(ByteStream::new(reader)),
            None => Box::new(ByteStream::new(std::io::stdin())),
        };
        let output: Box<dyn Write> = match config.output {
            Some(output) => output,
            None => Box::new(std::io::BufWriter::new(std::io::stdout())),
        };
        let error_output: Box<dyn Write> = match config.error {
            Some(error) => error,
            None => Box::new(std::io::stderr()),
        };

        let rand_seed: f64 = 1.0;
        let mut interpreter = Self {
            program,
            stack: Vec::with_capacity(100),
            frame_base: 0,
            frames: Vec::new(),
            current_arrays: Vec::new(),
            array_args: Vec::new(),
            return_value: Value::Null,
            max_call_depth: config.max_call_depth,
            globals: vec![Value::Null; program.scalar_names.len()],
            arrays,
            env: GlobalEnv::default(),
            record: Record::default(),
            record_fs: FieldSeparator::Default,
            stdin: Some(stdin),
            current_input: None,
            argv_index: 1,
            argv_id,
            had_files: false,
            stdin_consumed: false,
            output,
            error_output,
            read_files: ReadFiles::default(),
            read_pipes: ReadPipes::default(),
            write_files: WriteFiles::default(),
            write_pipes: WritePipes::default(),
            shell,
            natives,
            rng: SmallRng::seed_from_u64(rand_seed.to_bits()),
            rand_seed,
            regex_cache: HashMap::new(),
            format_cache: HashMap::new(),
            in_range: vec![false; program.actions.len()],
            exit_status: 0,
            no_exec: config.no_exec,
            no_file_writes: config.no_file_writes,
            no_file_reads: config.no_file_reads,
            bytes: config.bytes,
        };

        // ARGV, ARGC and ENVIRON
        interpreter.arrays[argv_id].set(Rc::from("0"), Value::numstr(config.argv0));
        for (i, arg) in config.args.iter().enumerate() {
            interpreter.arrays[argv_id]
                .set(Rc::from((i + 1).to_string()), Value::numstr(arg.as_str()));
        }
        interpreter.env.argc = config.args.len() as i64 + 1;
        match config.environ {
            Some(pairs) => {
                for pair in pairs.chunks(2) {
                    interpreter.arrays[environ_id]
                        .set(Rc::from(pair[0].as_str()), Value::numstr(pair[1].as_str()));
                }
            }
            None => {
                for (name, value) in std::env::vars() {
                    interpreter.arrays[environ_id]
                        .set(Rc::from(name), Value::numstr(value));
                }
            }
        }

        for pair in config.vars.chunks(2) {
            interpreter.assign_by_name(&pair[0], &pair[1])?;
        }

        Ok(interpreter)
    }

    fn run(&mut self) -> Result<i32, String> {
        let program = self.program;
        let begin_flow = self.execute_top_level(&program.begin)?;
        if program.actions.is_empty() && program.end.is_empty() {
            self.finish()?;
            return Ok(self.exit_status);
        }
        if begin_flow != Flow::Exit {
            self.run_main_loop()?;
        }
        self.execute_top_level(&program.end)?;
        self.finish()?;
        Ok(self.exit_status)
    }

    fn finish(&mut self) -> Result<(), String> {
        self.output
            .flush()
            .map_err(|e| format!("error writing to output: {}", e))
    }

    /// Run a BEGIN or END block, where record-loop transfers are invalid.
    fn execute_top_level(&mut self, code: &[OpCode]) -> Result<Flow, String> {
        match self.execute(code)? {
            Flow::Next => Err("next used in BEGIN or END".to_string()),
            Flow::NextFile => Err("nextfile used in BEGIN or END".to_string()),
            flow => Ok(flow),
        }
    }

    fn run_main_loop(&mut self) -> Result<(), String> {
        let program = self.program;
        'record_loop: while self.next_record()?.is_some() {
            for (action_index, action) in program.actions.iter().enumerate() {
                let matched = match &action.pattern {
                    Pattern::All => true,
                    Pattern::Expr(block) => match self.eval_pattern(block)? {
                        Some(value) => value,
                        None => return Ok(()),
                    },
                    Pattern::Range { start, end } => {
                        if !self.in_range[action_index] {
                            match self.eval_pattern(start)? {
                                Some(started) => self.in_range[action_index] = started,
                                None => return Ok(()),
                            }
                            let matched = self.in_range[action_index];
                            if matched {
                                match self.eval_pattern(end)? {
                                    Some(ended) => self.in_range[action_index] = !ended,
                                    None => return Ok(()),
                                }
                            }
                            matched
                        } else {
                            match self.eval_pattern(end)? {
                                Some(ended) => self.in_range[action_index] = !ended,
                                None => return Ok(()),
                            }
                            true
                        }
                    }
                };
                if !matched {
                    continue;
                }
                match &action.body {
                    None => {
                        let line = self.record.get_line().to_str(&self.env.ofmt)?;
                        let text = format!("{}{}", line, self.env.ors);
                        self.write_output(&text)?;
                    }
                    Some(body) => match self.execute(body)? {
                        Flow::Normal => {}
                        Flow::Next => continue 'record_loop,
                        Flow::NextFile => {
                            self.current_input = None;
                            continue 'record_loop;
                        }
                        Flow::Exit => return Ok(()),
                        Flow::Break | Flow::Return => {
                            unreachable!("loop transfer escaped an action body")
                        }
                    },
                }
            }
        }
        Ok(())
    }

    /// Evaluate a pattern block to its boolean. `None` means the block ran
    /// `exit`.
    fn eval_pattern(&mut self, block: &[OpCode]) -> Result<Option<bool>, String> {
        match self.execute(block)? {
            Flow::Normal => Ok(Some(self.pop().boolean())),
            Flow::Exit => Ok(None),
            _ => unreachable!("invalid control transfer in a pattern"),
        }
    }

    /// Read the next record from the main input into `$0`, advancing
    /// through `ARGV` and handling command-line assignments.
    fn next_record(&mut self) -> Result<Option<()>, String> {
        match self.read_main_record()? {
            Some(line) => {
                self.install_record(line.into(), false)?;
                Ok(Some(()))
            }
            None => Ok(None),
        }
    }

    /// Read a line from the main input, updating `NR`, `FNR` and `RT`.
    fn read_main_record(&mut self) -> Result<Option<String>, String> {
        loop {
            if self.current_input.is_none() && !self.open_next_input()? {
                return Ok(None);
            }
            let reader = self.current_input.as_mut().unwrap();
            match reader.read_next_record(&self.env.rs)? {
                Some((line, terminator)) => {
                    self.env.nr += 1;
                    self.env.fnr += 1;
                    self.env.rt = terminator.into();
                    return Ok(Some(line));
                }
                None => {
                    self.current_input = None;
                }
            }
        }
    }

    fn open_next_input(&mut self) -> Result<bool, String> {
        loop {
            if self.argv_index as i64 >= self.env.argc {
                if !self.had_files && !self.stdin_consumed {
                    self.stdin_consumed = true;
                    self.current_input = self.stdin.take();
                    self.env.fnr = 0;
                    return Ok(self.current_input.is_some());
                }
                return Ok(false);
            }
            let key = Rc::from(self.argv_index.to_string());
            self.argv_index += 1;
            if !self.arrays[self.argv_id].contains(&key) {
                continue;
            }
            let arg = self.arrays[self.argv_id]
                .index(key)
                .to_str(&self.env.convfmt)?;
            if arg.is_empty() {
                continue;
            }
            if let Some((name, value)) = parse_command_line_assignment(&arg) {
                self.assign_by_name(name, value)?;
                continue;
            }
            self.had_files = true;
            let reader: Box<dyn RecordReader> = if arg.as_ref() == "-" {
                self.stdin_consumed = true;
                match self.stdin.take() {
                    Some(stdin) => stdin,
                    None => continue,
                }
            } else {
                if self.no_file_reads {
                    return Err("can't read from file due to NoFileReads".to_string());
                }
                Box::new(open_input_file(&arg)?)
            };
            self.env.filename = Value::numstr(arg);
            self.env.fnr = 0;
            self.current_input = Some(reader);
            return Ok(true);
        }
    }

    /// Assign to a special variable or a global scalar by name. Unknown
    /// names are ignored. The value gets escape processing and numeric
    /// string status.
    fn assign_by_name(&mut self, name: &str, value: &str) -> Result<(), String> {
        let value = Value::numstr(process_escapes(value));
        if let Some(var) = SpecialVar::from_name(name) {
            return self.set_special(var, value);
        }
        if let Some(id) = self
            .program
            .scalar_names
            .iter()
            .position(|n| n.as_ref() == name)
        {
            self.globals[id] = value;
        }
        Ok(())
    }

    fn get_special(&mut self, var: SpecialVar) -> Result<Value, String> {
        let value = match var {
            SpecialVar::Argc => Value::Num(self.env.argc as f64),
            SpecialVar::Convfmt => Value::Str(self.env.convfmt.clone()),
            SpecialVar::Filename => self.env.filename.clone(),
            SpecialVar::Fnr => Value::Num(self.env.fnr as f64),
            SpecialVar::Fs => Value::Str(self.env.fs_source.clone()),
            SpecialVar::Nf => {
                let num_fields = self.num_fields()?;
                Value::Num(num_fields as f64)
            }
            SpecialVar::Nr => Value::Num(self.env.nr as f64),
            SpecialVar::Ofmt => Value::Str(self.env.ofmt.clone()),
            SpecialVar::Ofs => Value::Str(self.env.ofs.clone()),
            SpecialVar::Ors => Value::Str(self.env.ors.clone()),
            SpecialVar::Rlength => Value::Num(self.env.rlength),
            SpecialVar::Rs => Value::Str(self.env.rs_source.clone()),
            SpecialVar::Rstart => Value::Num(self.env.rstart),
            SpecialVar::Rt => Value::Str(self.env.rt.clone()),
            SpecialVar::Subsep => Value::Str(self.env.subsep.clone()),
            SpecialVar::Count => unreachable!("not a special variable"),
        };
        Ok(value)
    }

    fn set_special(&mut self, var: SpecialVar, value: Value) -> Result<(), String> {
        match var {
            SpecialVar::Argc => self.env.argc = value.num() as i64,
            SpecialVar::Convfmt => self.env.convfmt = value.to_str(&self.env.convfmt)?,
            SpecialVar::Filename => self.env.filename = value,
            SpecialVar::Fnr => self.env.fnr = value.num() as i64,
            SpecialVar::Fs => {
                let source = value.to_str(&self.env.convfmt)?;
                self.env.set_fs(source)?;
            }
            SpecialVar::Nf => {
                let num_fields = value.num() as i64;
                self.record
                    .set_num_fields(num_fields, &self.record_fs, &self.env.ofs)?;
            }
            SpecialVar::Nr => self.env.nr = value.num() as i64,
            SpecialVar::Ofmt => self.env.ofmt = value.to_str(&self.env.convfmt)?,
            SpecialVar::Ofs => self.env.ofs = value.to_str(&self.env.convfmt)?,
            SpecialVar::Ors => self.env.ors = value.to_str(&self.env.convfmt)?,
            SpecialVar::Rlength => self.env.rlength = value.num(),
            SpecialVar::Rs => {
                let source = value.to_str(&self.env.convfmt)?;
                self.env.set_rs(source)?;
            }
            SpecialVar::Rstart => self.env.rstart = value.num(),
            SpecialVar::Rt => self.env.rt = value.to_str(&self.env.convfmt)?,
            SpecialVar::Subsep => self.env.subsep = value.to_str(&self.env.convfmt)?,
            SpecialVar::Count => unreachable!("not a special variable"),
        }
        Ok(())
    }

    /// Install a new record, capturing the field separator in effect now.
    fn install_record(&mut self, line: Rc<str>, is_true_str: bool) -> Result<(), String> {
        self.env.ensure_effective_fs()?;
        self.record_fs = self.env.effective_fs().clone();
        self.record.set_line(line, is_true_str);
        Ok(())
    }

    fn num_fields(&mut self) -> Result<usize, String> {
        self.record.num_fields(&self.record_fs)
    }

    fn get_field(&mut self, index: i64) -> Result<Value, String> {
        self.record.get_field(index, &self.record_fs)
    }

    fn set_field(&mut self, index: i64, value: Rc<str>) -> Result<(), String> {
        if index == 0 {
            return self.install_record(value, true);
        }
        self.record
            .set_field(index, value, &self.record_fs, &self.env.ofs)
    }

    // stack helpers

    fn push<V: Into<Value>>(&mut self, value: V) {
        self.stack.push(value.into());
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("empty stack")
    }

    fn pop_str(&mut self) -> Result<Rc<str>, String> {
        let convfmt = self.env.convfmt.clone();
        self.pop().to_str(&convfmt)
    }

    fn pop_index(&mut self) -> i64 {
        self.pop().num() as i64
    }

    fn local(&self, index: u32) -> &Value {
        &self.stack[self.frame_base + index as usize]
    }

    fn set_local(&mut self, index: u32, value: Value) {
        let slot = self.frame_base + index as usize;
        self.stack[slot] = value;
    }

    fn resolve_array(&self, operand: ArrayOperand) -> usize {
        match operand.scope {
            ArrayScope::Global => operand.index as usize,
            ArrayScope::Local => self.current_arrays[operand.index as usize],
        }
    }

    fn compare_tops(&mut self) -> Result<Option<Ordering>, String> {
        let rhs = self.pop();
        let lhs = self.pop();
        compare_values(&lhs, &rhs, &self.env.convfmt)
    }

    fn cached_regex(&mut self, pattern: &str) -> Result<Rc<Regex>, String> {
        if let Some(re) = self.regex_cache.get(pattern) {
            return Ok(re.clone());
        }
        let re = Rc::new(Regex::new(Rc::from(pattern))?);
        if self.regex_cache.len() < MAX_CACHED_REGEXES {
            self.regex_cache.insert(Rc::from(pattern), re.clone());
        }
        Ok(re)
    }

    fn cached_format(&mut self, format: Rc<str>) -> Result<Rc<Vec<FormatSegment>>, String> {
        if let Some(segments) = self.format_cache.get(&format) {
            return Ok(segments.clone());
        }
        let segments = Rc::new(format::parse_format(&format)?);
        if self.format_cache.len() < MAX_CACHED_FORMATS {
            self.format_cache.insert(format, segments.clone());
        }
        Ok(segments)
    }

    fn record_matches(&mut self, re: &Regex) -> Result<bool, String> {
        let line = self.record.get_line().to_str(&self.env.convfmt)?;
        let subject =
            CString::new(line.as_bytes()).map_err(|_| "record contains a NUL byte".to_string())?;
        Ok(re.matches(&subject))
    }

    fn match_value(&mut self, re: &Regex) -> Result<bool, String> {
        let subject = self.pop_str()?;
        let subject = CString::new(subject.as_bytes())
            .map_err(|_| "string contains a NUL byte".to_string())?;
        Ok(re.matches(&subject))
    }

    fn write_output(&mut self, text: &str) -> Result<(), String> {
        self.output
            .write_all(text.as_bytes())
            .map_err(|e| format!("error writing to output: {}", e))
    }

    fn flush_outputs(&mut self) -> Result<(), String> {
        self.output
            .flush()
            .map_err(|e| format!("error writing to output: {}", e))?;
        let _ = self.error_output.flush();
        Ok(())
    }

    /// The fetch-decode-dispatch loop over one code block.
    fn execute(&mut self, code: &[OpCode]) -> Result<Flow, String> {
        let program = self.program;
        let mut ip = 0usize;
        while ip < code.len() {
            let instruction = code[ip];
            ip += 1;
            match instruction {
                OpCode::Num(index) => self.push(Value::Num(program.nums[index as usize])),
                OpCode::Str(index) => {
                    self.push(Value::Str(program.strs[index as usize].clone()))
                }
                OpCode::Regex(index) => {
                    let re = program.regexes[index as usize].clone();
                    let matched = self.record_matches(&re)?;
                    self.push(matched);
                }
                OpCode::Nulls(count) => {
                    for _ in 0..count {
                        self.push(Value::Null);
                    }
                }

                OpCode::Add => numeric_op!(self, +),
                OpCode::Subtract => numeric_op!(self, -),
                OpCode::Multiply => numeric_op!(self, *),
                OpCode::Divide => {
                    let rhs = self.pop().num();
                    let lhs = self.pop().num();
                    if rhs == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    self.push(Value::Num(lhs / rhs));
                }
                OpCode::Modulo => {
                    let rhs = self.pop().num();
                    let lhs = self.pop().num();
                    if rhs == 0.0 {
                        return Err("division by zero in %".to_string());
                    }
                    self.push(Value::Num(lhs % rhs));
                }
                OpCode::Power => {
                    let rhs = self.pop().num();
                    let lhs = self.pop().num();
                    self.push(Value::Num(lhs.powf(rhs)));
                }
                OpCode::Concat => {
                    let rhs = self.pop_str()?;
                    let lhs = self.pop_str()?;
                    let mut result = String::with_capacity(lhs.len() + rhs.len());
                    result.push_str(&lhs);
                    result.push_str(&rhs);
                    self.push(result);
                }
                OpCode::Equals => {
                    let ord = self.compare_tops()?;
                    self.push(ord == Some(Ordering::Equal));
                }
                OpCode::NotEquals => {
                    let ord = self.compare_tops()?;
                    self.push(ord != Some(Ordering::Equal));
                }
                OpCode::Less => {
                    let ord = self.compare_tops()?;
                    self.push(ord == Some(Ordering::Less));
                }
                OpCode::LessOrEqual => {
                    let ord = self.compare_tops()?;
                    self.push(matches!(ord, Some(Ordering::Less | Ordering::Equal)));
                }
                OpCode::Greater => {
                    let ord = self.compare_tops()?;
                    self.push(ord == Some(Ordering::Greater));
                }
                OpCode::GreaterOrEqual => {
                    let ord = self.compare_tops()?;
                    self.push(matches!(ord, Some(Ordering::Greater | Ordering::Equal)));
                }
                OpCode::Match => {
                    let pattern = self.pop_str()?;
                    let re = self.cached_regex(&pattern)?;
                    let matched = self.match_value(&re)?;
                    self.push(matched);
                }
                OpCode::NotMatch => {
                    let pattern = self.pop_str()?;
                    let re = self.cached_regex(&pattern)?;
                    let matched = self.match_value(&re)?;
                    self.push(!matched);
                }
                OpCode::MatchConst(index) => {
                    let re = program.regexes[index as usize].clone();
                    let matched = self.match_value(&re)?;
                    self.push(matched);
                }
                OpCode::NotMatchConst(index) => {
                    let re = program.regexes[index as usize].clone();
                    let matched = self.match_value(&re)?;
                    self.push(!matched);
                }

                OpCode::UnaryMinus => {
                    let value = self.pop().num();
                    self.push(Value::Num(-value));
                }
                OpCode::UnaryPlus => {
                    let value = self.pop().num();
                    self.push(Value::Num(value));
                }
                OpCode::Not => {
                    let value = self.pop().boolean();
                    self.push(!value);
                }
                OpCode::Boolean => {
                    let value = self.pop().boolean();
                    self.push(value);
                }
                OpCode::AsNumber => {
                    let value = self.pop().num();
                    self.push(Value::Num(value));
                }

                OpCode::Global(id) => {
                    let value = self.globals[id as usize].clone();
                    self.push(value);
                }
                OpCode::Local(id) => {
                    let value = self.local(id).clone();
                    self.push(value);
                }
                OpCode::Special(var) => {
                    let value = self.get_special(var)?;
                    self.push(value);
                }
                OpCode::Field => {
                    let index = self.pop_index();
                    let value = self.get_field(index)?;
                    self.push(value);
                }
                OpCode::FieldNum(index) => {
                    let value = self.get_field(index as i64)?;
                    self.push(value);
                }
                OpCode::AssignGlobal(id) => {
                    self.globals[id as usize] = self.stack.pop().expect("empty stack");
                }
                OpCode::AssignLocal(id) => {
                    let value = self.pop();
                    self.set_local(id, value);
                }
                OpCode::AssignSpecial(var) => {
                    let value = self.pop();
                    self.set_special(var, value)?;
                }
                OpCode::AssignField => {
                    let index = self.pop_index();
                    let value = self.pop_str()?;
                    self.set_field(index, value)?;
                }
                OpCode::IncrGlobal(amount, id) => {
                    let value = self.globals[id as usize].num() + amount as f64;
                    self.globals[id as usize] = Value::Num(value);
                }
                OpCode::IncrLocal(amount, id) => {
                    let value = self.local(id).num() + amount as f64;
                    self.set_local(id, Value::Num(value));
                }
                OpCode::IncrSpecial(amount, var) => {
                    let value = self.get_special(var)?.num() + amount as f64;
                    self.set_special(var, Value::Num(value))?;
                }
                OpCode::IncrField(amount) => {
                    let index = self.pop_index();
                    let value = self.get_field(index)?.num() + amount as f64;
                    let value = Value::Num(value).to_str(&self.env.convfmt)?;
                    self.set_field(index, value)?;
                }
                OpCode::AugAssignGlobal(op, id) => {
                    let rhs = self.pop().num();
                    let value = aug_assign(op, self.globals[id as usize].num(), rhs)?;
                    self.globals[id as usize] = Value::Num(value);
                }
                OpCode::AugAssignLocal(op, id) => {
                    let rhs = self.pop().num();
                    let value = aug_assign(op, self.local(id).num(), rhs)?;
                    self.set_local(id, Value::Num(value));
                }
                OpCode::AugAssignSpecial(op, var) => {
                    let rhs = self.pop().num();
                    let value = aug_assign(op, self.get_special(var)?.num(), rhs)?;
                    self.set_special(var, Value::Num(value))?;
                }
                OpCode::AugAssignField(op) => {
                    let index = self.pop_index();
                    let rhs = self.pop().num();
                    let value = aug_assign(op, self.get_field(index)?.num(), rhs)?;
                    let value = Value::Num(value).to_str(&self.env.convfmt)?;
                    self.set_field(index, value)?;
                }

                OpCode::ArrayGlobal(id) => {
                    let key = self.pop_str()?;
                    let value = self.arrays[id as usize].index(key);
                    self.push(value);
                }
                OpCode::ArrayLocal(id) => {
                    let key = self.pop_str()?;
                    let array = self.current_arrays[id as usize];
                    let value = self.arrays[array].index(key);
                    self.push(value);
                }
                OpCode::AssignArrayGlobal(id) => {
                    let key = self.pop_str()?;
                    let value = self.pop();
                    self.arrays[id as usize].set(key, value);
                }
                OpCode::AssignArrayLocal(id) => {
                    let key = self.pop_str()?;
                    let value = self.pop();
                    let array = self.current_arrays[id as usize];
                    self.arrays[array].set(key, value);
                }
                OpCode::IncrArrayGlobal(amount, id) => {
                    let key = self.pop_str()?;
                    let element = self.arrays[id as usize].get_mut(key);
                    *element = Value::Num(element.num() + amount as f64);
                }
                OpCode::IncrArrayLocal(amount, id) => {
                    let key = self.pop_str()?;
                    let array = self.current_arrays[id as usize];
                    let element = self.arrays[array].get_mut(key);
                    *element = Value::Num(element.num() + amount as f64);
                }
                OpCode::AugAssignArrayGlobal(op, id) => {
                    let key = self.pop_str()?;
                    let rhs = self.pop().num();
                    let element = self.arrays[id as usize].get_mut(key);
                    *element = Value::Num(aug_assign(op, element.num(), rhs)?);
                }
                OpCode::AugAssignArrayLocal(op, id) => {
                    let key = self.pop_str()?;
                    let rhs = self.pop().num();
                    let array = self.current_arrays[id as usize];
                    let element = self.arrays[array].get_mut(key);
                    *element = Value::Num(aug_assign(op, element.num(), rhs)?);
                }
                OpCode::InGlobal(id) => {
                    let key = self.pop_str()?;
                    let contains = self.arrays[id as usize].contains(&key);
                    self.push(contains);
                }
                OpCode::InLocal(id) => {
                    let key = self.pop_str()?;
                    let array = self.current_arrays[id as usize];
                    let contains = self.arrays[array].contains(&key);
                    self.push(contains);
                }
                OpCode::Delete(operand) => {
                    let key = self.pop_str()?;
                    let array = self.resolve_array(operand);
                    self.arrays[array].delete(&key);
                }
                OpCode::DeleteAll(operand) => {
                    let array = self.resolve_array(operand);
                    self.arrays[array].clear();
                }
                OpCode::MultiIndex(count) => {
                    let mut parts = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        parts.push(self.pop_str()?);
                    }
                    parts.reverse();
                    let key = parts
                        .iter()
                        .map(|part| part.as_ref())
                        .collect::<Vec<&str>>()
                        .join(self.env.subsep.as_ref());
                    self.push(key);
                }

                OpCode::Jump(offset) => ip = offset_ip(ip, offset),
                OpCode::JumpTrue(offset) => {
                    if self.pop().boolean() {
                        ip = offset_ip(ip, offset);
                    }
                }
                OpCode::JumpFalse(offset) => {
                    if !self.pop().boolean() {
                        ip = offset_ip(ip, offset);
                    }
                }
                OpCode::JumpEquals(offset) => {
                    if self.compare_tops()? == Some(Ordering::Equal) {
                        ip = offset_ip(ip, offset);
                    }
                }
                OpCode::JumpNotEquals(offset) => {
                    if self.compare_tops()? != Some(Ordering::Equal) {
                        ip = offset_ip(ip, offset);
                    }
                }
                OpCode::JumpLess(offset) => {
                    if self.compare_tops()? == Some(Ordering::Less) {
                        ip = offset_ip(ip, offset);
                    }
                }
                OpCode::JumpLessOrEqual(offset) => {
                    if matches!(
                        self.compare_tops()?,
                        Some(Ordering::Less | Ordering::Equal)
                    ) {
                        ip = offset_ip(ip, offset);
                    }
                }
                OpCode::JumpGreater(offset) => {
                    if self.compare_tops()? == Some(Ordering::Greater) {
                        ip = offset_ip(ip, offset);
                    }
                }
                OpCode::JumpGreaterOrEqual(offset) => {
                    if matches!(
                        self.compare_tops()?,
                        Some(Ordering::Greater | Ordering::Equal)
                    ) {
                        ip = offset_ip(ip, offset);
                    }
                }

                OpCode::ForInGlobal { var, array, offset } => {
                    let body_end = offset_ip(ip, offset);
                    let array = self.resolve_array(array);
                    let keys = self.arrays[array].keys();
                    for key in keys {
                        self.globals[var as usize] = Value::numstr(key);
                        match self.execute(&code[ip..body_end])? {
                            Flow::Normal => {}
                            Flow::Break => break,
                            other => return Ok(other),
                        }
                    }
                    ip = body_end;
                }
                OpCode::ForInLocal { var, array, offset } => {
                    let body_end = offset_ip(ip, offset);
                    let array = self.resolve_array(array);
                    let keys = self.arrays[array].keys();
                    for key in keys {
                        self.set_local(var, Value::numstr(key));
                        match self.execute(&code[ip..body_end])? {
                            Flow::Normal => {}
                            Flow::Break => break,
                            other => return Ok(other),
                        }
                    }
                    ip = body_end;
                }
                OpCode::ForInSpecial { var, array, offset } => {
                    let body_end = offset_ip(ip, offset);
                    let array = self.resolve_array(array);
                    let keys = self.arrays[array].keys();
                    for key in keys {
                        self.set_special(var, Value::numstr(key))?;
                        match self.execute(&code[ip..body_end])? {
                            Flow::Normal => {}
                            Flow::Break => break,
                            other => return Ok(other),
                        }
                    }
                    ip = body_end;
                }
                OpCode::BreakForIn => return Ok(Flow::Break),

                OpCode::ArrayArgGlobal(id) => self.array_args.push(id as usize),
                OpCode::ArrayArgLocal(id) => {
                    let array = self.current_arrays[id as usize];
                    self.array_args.push(array);
                }
                OpCode::CallUser {
                    function,
                    array_args,
                } => {
                    let function = &program.functions[function as usize];
                    if self.frames.len() >= self.max_call_depth {
                        return Err("call depth exceeded".to_string());
                    }
                    let staged_start = self.array_args.len() - array_args as usize;
                    let mut array_ids = self.array_args.split_off(staged_start);
                    let arrays_before = self.arrays.len();
                    while array_ids.len() < function.array_params {
                        self.arrays.push(Array::default());
                        array_ids.push(self.arrays.len() - 1);
                    }
                    let new_base = self.stack.len() - function.scalar_params;
                    self.frames.push(Frame {
                        prev_base: self.frame_base,
                        prev_arrays: std::mem::replace(&mut self.current_arrays, array_ids),
                        arrays_before,
                    });
                    self.frame_base = new_base;

                    let flow = self.execute(&function.body);

                    let frame = self.frames.pop().expect("missing call frame");
                    self.stack.truncate(self.frame_base);
                    self.frame_base = frame.prev_base;
                    self.current_arrays = frame.prev_arrays;
                    self.arrays.truncate(frame.arrays_before);

                    match flow? {
                        Flow::Return => {
                            let value = std::mem::take(&mut self.return_value);
                            self.push(value);
                        }
                        Flow::Normal => self.push(Value::Null),
                        flow @ (Flow::Next | Flow::NextFile | Flow::Exit) => return Ok(flow),
                        Flow::Break => unreachable!("break escaped a function body"),
                    }
                }
                OpCode::CallNative { function, argc } => {
                    self.call_native(function as usize, argc as usize)?;
                }
                OpCode::CallBuiltin { function, argc } => {
                    self.call_builtin(function, argc)?;
                }
                OpCode::CallSplitGlobal(id) => {
                    let text = self.pop_str()?;
                    let count = self.split_into(id as usize, None, &text)?;
                    self.push(Value::Num(count as f64));
                }
                OpCode::CallSplitLocal(id) => {
                    let text = self.pop_str()?;
                    let array = self.current_arrays[id as usize];
                    let count = self.split_into(array, None, &text)?;
                    self.push(Value::Num(count as f64));
                }
                OpCode::CallSplitSepGlobal(id) => {
                    let separator = self.pop_str()?;
                    let text = self.pop_str()?;
                    let separator = FieldSeparator::parse(&separator)?;
                    let count = self.split_into(id as usize, Some(separator), &text)?;
                    self.push(Value::Num(count as f64));
                }
                OpCode::CallSplitSepLocal(id) => {
                    let separator = self.pop_str()?;
                    let text = self.pop_str()?;
                    let separator = FieldSeparator::parse(&separator)?;
                    let array = self.current_arrays[id as usize];
                    let count = self.split_into(array, Some(separator), &text)?;
                    self.push(Value::Num(count as f64));
                }
                OpCode::CallSprintf(argc) => {
                    let result = self.sprintf(argc as usize)?;
                    self.push(result);
                }
                OpCode::CallSub(target) => self.call_sub(target, false)?,
                OpCode::CallGsub(target) => self.call_sub(target, true)?,

                OpCode::Print(argc, redirect) => self.do_print(argc as usize, redirect)?,
                OpCode::Printf(argc, redirect) => self.do_printf(argc as usize, redirect)?,
                OpCode::Getline(source) => {
                    let name = self.getline_name(source)?;
                    self.do_getline(source, name, GetlineAssign::Record)?;
                }
                OpCode::GetlineField(source) => {
                    let name = self.getline_name(source)?;
                    let index = self.pop_index();
                    self.do_getline(source, name, GetlineAssign::Field(index))?;
                }
                OpCode::GetlineGlobal(source, id) => {
                    let name = self.getline_name(source)?;
                    self.do_getline(source, name, GetlineAssign::Global(id))?;
                }
                OpCode::GetlineLocal(source, id) => {
                    let name = self.getline_name(source)?;
                    self.do_getline(source, name, GetlineAssign::Local(id))?;
                }
                OpCode::GetlineSpecial(source, var) => {
                    let name = self.getline_name(source)?;
                    self.do_getline(source, name, GetlineAssign::Special(var))?;
                }
                OpCode::GetlineArrayGlobal(source, id) => {
                    let name = self.getline_name(source)?;
                    let key = self.pop_str()?;
                    let assign = GetlineAssign::ArrayElement {
                        array: id as usize,
                        key,
                    };
                    self.do_getline(source, name, assign)?;
                }
                OpCode::GetlineArrayLocal(source, id) => {
                    let name = self.getline_name(source)?;
                    let key = self.pop_str()?;
                    let assign = GetlineAssign::ArrayElement {
                        array: self.current_arrays[id as usize],
                        key,
                    };
                    self.do_getline(source, name, assign)?;
                }

                OpCode::Dup => {
                    let value = self.stack.last().expect("empty stack").clone();
                    self.push(value);
                }
                OpCode::Swap => {
                    let top = self.stack.len() - 1;
                    self.stack.swap(top, top - 1);
                }
                OpCode::Rote => {
                    let third = self.stack.len() - 3;
                    let value = self.stack.remove(third);
                    self.push(value);
                }
                OpCode::Drop => {
                    self.pop();
                }
                OpCode::Return => {
                    self.return_value = self.pop();
                    return Ok(Flow::Return);
                }
                OpCode::Next => return Ok(Flow::Next),
                OpCode::NextFile => return Ok(Flow::NextFile),
                OpCode::Exit => return Ok(Flow::Exit),
                OpCode::ExitStatus => {
                    self.exit_status = self.pop().num() as i32;
                    return Ok(Flow::Exit);
                }
                OpCode::Nop => {}
            }
        }
        Ok(Flow::Normal)
    }

    /// Pop the stream name for a redirected getline.
    fn getline_name(&mut self, source: InputSource) -> Result<Option<Rc<str>>, String> {
        match source {
            InputSource::Main => Ok(None),
            InputSource::File | InputSource::Command => Ok(Some(self.pop_str()?)),
        }
    }

    fn do_getline(
        &mut self,
        source: InputSource,
        name: Option<Rc<str>>,
        assign: GetlineAssign,
    ) -> Result<(), String> {
        self.flush_outputs()?;
        let read = match source {
            InputSource::Main => match self.read_main_record()? {
                Some(line) => GetlineRead::Record((line, String::new())),
                None => GetlineRead::Eof,
            },
            InputSource::File => {
                if self.no_file_reads {
                    return Err("can't read from file due to NoFileReads".to_string());
                }
                let name = name.expect("getline from file without a name");
                self.read_files.read_next_record(name, &self.env.rs)?
            }
            InputSource::Command => {
                if self.no_exec {
                    return Err("can't run command due to NoExec".to_string());
                }
                let name = name.expect("getline from command without a name");
                self.read_pipes
                    .read_next_record(name, &self.shell, &self.env.rs)?
            }
        };
        let line = match read {
            GetlineRead::CannotOpen => {
                self.push(Value::Num(-1.0));
                return Ok(());
            }
            GetlineRead::Eof => {
                self.push(Value::Num(0.0));
                return Ok(());
            }
            GetlineRead::Record((line, terminator)) => {
                match source {
                    // the main reader has already updated NR, FNR and RT
                    InputSource::Main => {}
                    InputSource::File => self.env.rt = terminator.into(),
                    InputSource::Command => {
                        self.env.nr += 1;
                        self.env.rt = terminator.into();
                    }
                }
                line
            }
        };
        match assign {
            GetlineAssign::Record => self.install_record(line.into(), false)?,
            GetlineAssign::Global(id) => self.globals[id as usize] = Value::numstr(line),
            GetlineAssign::Local(id) => self.set_local(id, Value::numstr(line)),
            GetlineAssign::Special(var) => self.set_special(var, Value::numstr(line))?,
            GetlineAssign::Field(index) => self.set_field(index, line.into())?,
            GetlineAssign::ArrayElement { array, key } => {
                self.arrays[array].set(key, Value::numstr(line))
            }
        }
        self.push(Value::Num(1.0));
        Ok(())
    }

    fn call_native(&mut self, function: usize, argc: usize) -> Result<(), String> {
        let convfmt = self.env.convfmt.clone();
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.pop());
        }
        args.reverse();
        let native = &mut self.natives[function];
        if args.len() > native.params.len() {
            return Err(format!(
                "too many arguments in call to {}",
                native.name
            ));
        }
        let mut coerced = Vec::with_capacity(native.params.len());
        for (i, kind) in native.params.iter().enumerate() {
            let value = match args.get(i) {
                Some(value) => match kind {
                    NativeKind::Bool => NativeValue::Bool(value.boolean()),
                    NativeKind::Int => NativeValue::Int(value.num() as i64),
                    NativeKind::Float => NativeValue::Float(value.num()),
                    NativeKind::Str => NativeValue::Str(value.to_str(&convfmt)?.to_string()),
                },
                None => NativeValue::zero(*kind),
            };
            coerced.push(value);
        }
        let result = (native.func)(coerced)
            .map_err(|e| format!("error in native function {}: {}", native.name, e))?;
        let value = match result {
            NativeValue::Bool(b) => Value::from(b),
            NativeValue::Int(n) => Value::Num(n as f64),
            NativeValue::Float(n) => Value::Num(n),
            NativeValue::Str(s) => Value::from(s),
        };
        self.push(value);
        Ok(())
    }
}

fn offset_ip(ip: usize, offset: i32) -> usize {
    (ip as i64 + offset as i64) as usize
}

fn aug_assign(op: AugOp, lhs: f64, rhs: f64) -> Result<f64, String> {
    match op {
        AugOp::Add => Ok(lhs + rhs),
        AugOp::Subtract => Ok(lhs - rhs),
        AugOp::Multiply => Ok(lhs * rhs),
        AugOp::Divide => {
            if rhs == 0.0 {
                return Err("division by zero".to_string());
            }
            Ok(lhs / rhs)
        }
        AugOp::Modulo => {
            if rhs == 0.0 {
                return Err("division by zero in %".to_string());
            }
            Ok(lhs % rhs)
        }
        AugOp::Power => Ok(lhs.powf(rhs)),
    }
}

fn bind_native_functions(
    program: &Program,
    funcs: Vec<NativeFunction>,
) -> Result<Vec<NativeFunction>, String> {
    let mut by_name: HashMap<String, NativeFunction> = HashMap::new();
    for func in funcs {
        if by_name.contains_key(&func.name) {
            return Err(format!("duplicate native function: {}", func.name));
        }
        by_name.insert(func.name.clone(), func);
    }
    let mut natives = Vec::with_capacity(program.native_names.len());
    for name in &program.native_names {
        match by_name.remove(name.as_ref()) {
            Some(func) => natives.push(func),
            None => return Err(format!("native function not defined: {}", name)),
        }
    }
    Ok(natives)
}

/// `name=value`, where name is a valid identifier.
fn parse_command_line_assignment(arg: &str) -> Option<(&str, &str)> {
    let (name, value) = arg.split_once('=')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() && first != '_' {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some((name, value))
    } else {
        None
    }
}

/// Process the escape sequences of a command-line assignment value.
/// Unrecognized sequences are kept as written.
fn process_escapes(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => result.push('"'),
            Some('/') => result.push('/'),
            Some('a') => result.push('\x07'),
            Some('b') => result.push('\x08'),
            Some('f') => result.push('\x0C'),
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('v') => result.push('\x0B'),
            Some('\\') => result.push('\\'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}
