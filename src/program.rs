//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! The bytecode program artifact produced by the compiler and executed by
//! the interpreter: the opcode set, the deduplicated constant pools, and the
//! disassembler.
//!
//! Opcodes carry their operands inline and are `Copy`. Branch operands are
//! signed offsets relative to the instruction following the branch, which
//! keeps every code block position independent.

use crate::ast::{ArrayScope, AugOp, SpecialVar, VarId};
use crate::regex::Regex;
use std::fmt::Write as _;
use std::rc::Rc;

/// A resolved array operand: which scope the id indexes into.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ArrayOperand {
    pub scope: ArrayScope,
    pub index: VarId,
}

/// Built-ins dispatched through the generic `CallBuiltin` opcode. The ones
/// with specialized calling conventions (`split`, `sub`, `gsub`, `sprintf`,
/// print and getline) have dedicated opcodes instead.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BuiltinFunction {
    Atan2,
    Cos,
    Sin,
    Exp,
    Log,
    Sqrt,
    Int,
    Rand,
    Srand,
    Index,
    Length,
    Match,
    Substr,
    ToLower,
    ToUpper,
    Close,
    Fflush,
    System,
}

impl BuiltinFunction {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinFunction::Atan2 => "atan2",
            BuiltinFunction::Cos => "cos",
            BuiltinFunction::Sin => "sin",
            BuiltinFunction::Exp => "exp",
            BuiltinFunction::Log => "log",
            BuiltinFunction::Sqrt => "sqrt",
            BuiltinFunction::Int => "int",
            BuiltinFunction::Rand => "rand",
            BuiltinFunction::Srand => "srand",
            BuiltinFunction::Index => "index",
            BuiltinFunction::Length => "length",
            BuiltinFunction::Match => "match",
            BuiltinFunction::Substr => "substr",
            BuiltinFunction::ToLower => "tolower",
            BuiltinFunction::ToUpper => "toupper",
            BuiltinFunction::Close => "close",
            BuiltinFunction::Fflush => "fflush",
            BuiltinFunction::System => "system",
        }
    }
}

/// Which stream a getline opcode reads from. `File` and `Command` pop the
/// stream name from the stack.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InputSource {
    Main,
    File,
    Command,
}

impl InputSource {
    fn mnemonic(&self) -> &'static str {
        match self {
            InputSource::Main => "main",
            InputSource::File => "file",
            InputSource::Command => "cmd",
        }
    }
}

/// Output redirection carried by `Print`/`Printf`. Anything but `None` pops
/// the destination name from the stack.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OutputRedirect {
    None,
    Truncate,
    Append,
    Pipe,
}

/// The lvalue a `CallSub`/`CallGsub` writes the substituted text back to.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SubTarget {
    /// the default `$0` target
    Record,
    /// `$expr`; the field index is popped
    Field,
    Global(VarId),
    Local(VarId),
    Special(SpecialVar),
    /// the element key is popped
    ArrayGlobal(VarId),
    ArrayLocal(VarId),
}

/// The opcode set.
///
/// Stack conventions, uniform across the set:
/// - binary operations pop the right operand, then the left;
/// - `Assign*`/`AugAssign*` take the value (or the operator's right operand)
///   pushed first and the field index or array key pushed above it, and
///   never push;
/// - popped call arguments were pushed in source order;
/// - `ForIn*` runs the `offset` instructions that follow it once per key of
///   a snapshot of the array, with the key assigned to the destination
///   variable, then skips past them.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum OpCode {
    // constants
    /// push nums[n]
    Num(u32),
    /// push strs[n]
    Str(u32),
    /// push 1 if regexes[n] matches the current record, else 0
    Regex(u32),
    /// push n null values
    Nulls(u32),

    // binary operations
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Concat,
    Equals,
    NotEquals,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    /// pop pattern then subject, push match result
    Match,
    NotMatch,
    /// pop subject, match against regexes[n]
    MatchConst(u32),
    NotMatchConst(u32),

    // unary operations
    UnaryMinus,
    UnaryPlus,
    Not,
    /// normalize the top of the stack to the number 0 or 1
    Boolean,
    /// coerce the top of the stack to its numeric value
    AsNumber,

    // scalar access
    Global(VarId),
    Local(VarId),
    Special(SpecialVar),
    /// pop the field index
    Field,
    /// immediate field index
    FieldNum(u32),
    AssignGlobal(VarId),
    AssignLocal(VarId),
    AssignSpecial(SpecialVar),
    /// pop the field index, then the value
    AssignField,
    /// add the immediate amount in place; no stack effect
    IncrGlobal(i32, VarId),
    IncrLocal(i32, VarId),
    IncrSpecial(i32, SpecialVar),
    /// pop the field index
    IncrField(i32),
    AugAssignGlobal(AugOp, VarId),
    AugAssignLocal(AugOp, VarId),
    AugAssignSpecial(AugOp, SpecialVar),
    /// pop the field index, then the right operand
    AugAssignField(AugOp),

    // array access
    /// pop the key, push the element (materializing a missing key to null)
    ArrayGlobal(VarId),
    ArrayLocal(VarId),
    /// pop the key, then the value
    AssignArrayGlobal(VarId),
    AssignArrayLocal(VarId),
    /// pop the key
    IncrArrayGlobal(i32, VarId),
    IncrArrayLocal(i32, VarId),
    /// pop the key, then the right operand
    AugAssignArrayGlobal(AugOp, VarId),
    AugAssignArrayLocal(AugOp, VarId),
    /// pop the key, push the membership test without materializing
    InGlobal(VarId),
    InLocal(VarId),
    /// pop the key, remove it from the array
    Delete(ArrayOperand),
    DeleteAll(ArrayOperand),
    /// pop n keys, join them with SUBSEP, push the joined key
    MultiIndex(u32),

    // control flow
    Jump(i32),
    JumpTrue(i32),
    JumpFalse(i32),
    /// comparison fused with the branch: pop right, pop left, compare,
    /// branch on the result
    JumpEquals(i32),
    JumpNotEquals(i32),
    JumpLess(i32),
    JumpLessOrEqual(i32),
    JumpGreater(i32),
    JumpGreaterOrEqual(i32),

    // iteration
    ForInGlobal {
        var: VarId,
        array: ArrayOperand,
        offset: i32,
    },
    ForInLocal {
        var: VarId,
        array: ArrayOperand,
        offset: i32,
    },
    ForInSpecial {
        var: SpecialVar,
        array: ArrayOperand,
        offset: i32,
    },
    /// leave the innermost for-in loop
    BreakForIn,

    // calls
    /// stage the resolved array for the next `CallUser`
    ArrayArgGlobal(VarId),
    ArrayArgLocal(VarId),
    /// call functions[function]; consumes the function's scalar parameter
    /// count from the stack and `array_args` staged arrays
    CallUser {
        function: u32,
        array_args: u16,
    },
    CallNative {
        function: u32,
        argc: u16,
    },
    CallBuiltin {
        function: BuiltinFunction,
        argc: u16,
    },
    /// pop the text, split by FS into the array, push the field count
    CallSplitGlobal(VarId),
    CallSplitLocal(VarId),
    /// pop the separator, then the text
    CallSplitSepGlobal(VarId),
    CallSplitSepLocal(VarId),
    /// pop argc values (format string pushed first), push the result
    CallSprintf(u16),
    /// pop the replacement, then the pattern, then the target's own operands
    CallSub(SubTarget),
    CallGsub(SubTarget),

    // I/O
    /// pop the redirect destination if any, then argc values
    Print(u16, OutputRedirect),
    Printf(u16, OutputRedirect),
    /// read into $0; push 1/0/-1
    Getline(InputSource),
    /// pop the field index (below the stream name, if any)
    GetlineField(InputSource),
    GetlineGlobal(InputSource, VarId),
    GetlineLocal(InputSource, VarId),
    GetlineSpecial(InputSource, SpecialVar),
    /// pop the element key (below the stream name, if any)
    GetlineArrayGlobal(InputSource, VarId),
    GetlineArrayLocal(InputSource, VarId),

    // stack and meta
    Dup,
    Swap,
    /// rotate the third-from-top value to the top
    Rote,
    Drop,
    /// pop the return value and restore the caller's frame
    Return,
    Next,
    NextFile,
    Exit,
    /// pop the exit status, then exit
    ExitStatus,
    Nop,
}

#[derive(Debug, PartialEq)]
pub enum Pattern {
    /// run the action for every record
    All,
    Expr(Vec<OpCode>),
    Range {
        start: Vec<OpCode>,
        end: Vec<OpCode>,
    },
}

#[derive(Debug, PartialEq)]
pub struct Action {
    pub pattern: Pattern,
    /// a missing body prints the whole record
    pub body: Option<Vec<OpCode>>,
}

#[derive(Debug, PartialEq, Default)]
pub struct Function {
    pub name: Rc<str>,
    pub params: Vec<Rc<str>>,
    /// parallel to `params`
    pub is_array: Vec<bool>,
    pub scalar_params: usize,
    pub array_params: usize,
    pub body: Vec<OpCode>,
}

/// The complete compiled artifact: one code block per BEGIN/END, pattern,
/// action body and user function, plus the three constant pools and the name
/// tables used by the disassembler and the interpreter setup.
pub struct Program {
    pub nums: Vec<f64>,
    pub strs: Vec<Rc<str>>,
    pub regexes: Vec<Rc<Regex>>,
    pub begin: Vec<OpCode>,
    pub actions: Vec<Action>,
    pub end: Vec<OpCode>,
    pub functions: Vec<Function>,
    pub scalar_names: Vec<Rc<str>>,
    pub array_names: Vec<Rc<str>>,
    pub native_names: Vec<Rc<str>>,
}

impl Program {
    /// Write a textual listing of every code block: a four hex digit offset,
    /// the mnemonic, and resolved operand names, with branch targets printed
    /// as `0x....` offsets.
    pub fn disassemble<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let mut out = String::new();
        if !self.begin.is_empty() {
            self.disassemble_block(&mut out, "BEGIN", &self.begin, None);
        }
        for action in &self.actions {
            match &action.pattern {
                Pattern::All => {}
                Pattern::Expr(block) => {
                    self.disassemble_block(&mut out, "pattern", block, None);
                }
                Pattern::Range { start, end } => {
                    self.disassemble_block(&mut out, "start", start, None);
                    self.disassemble_block(&mut out, "stop", end, None);
                }
            }
            if let Some(body) = &action.body {
                self.disassemble_block(&mut out, "{ body }", body, None);
            }
        }
        if !self.end.is_empty() {
            self.disassemble_block(&mut out, "END", &self.end, None);
        }
        for function in &self.functions {
            let label = format!("function {}", function.name);
            self.disassemble_block(&mut out, &label, &function.body, Some(function));
        }
        writer.write_all(out.as_bytes())
    }

    fn disassemble_block(
        &self,
        out: &mut String,
        label: &str,
        code: &[OpCode],
        function: Option<&Function>,
    ) {
        writeln!(out, "        // {}", label).expect("error writing to string");
        for (offset, instruction) in code.iter().enumerate() {
            write!(out, "{:04x}    ", offset).expect("error writing to string");
            self.disassemble_instruction(out, offset, *instruction, function);
            out.push('\n');
        }
        out.push('\n');
    }

    fn disassemble_instruction(
        &self,
        out: &mut String,
        offset: usize,
        instruction: OpCode,
        function: Option<&Function>,
    ) {
        let target =
            |relative: i32| -> String { format!("0x{:04x}", offset as i64 + 1 + relative as i64) };
        let array = |operand: &ArrayOperand| -> String {
            match operand.scope {
                ArrayScope::Global => self.array_names[operand.index as usize].to_string(),
                ArrayScope::Local => local_array_name(function, operand.index),
            }
        };
        let write = |out: &mut String, args: std::fmt::Arguments| {
            out.write_fmt(args).expect("error writing to string")
        };
        match instruction {
            OpCode::Num(n) => {
                let value = self.nums[n as usize];
                if value == (value as i64) as f64 {
                    write(out, format_args!("Num {} ({})", value as i64, n));
                } else {
                    write(out, format_args!("Num {:.6} ({})", value, n));
                }
            }
            OpCode::Str(n) => write(out, format_args!("Str {:?} ({})", self.strs[n as usize], n)),
            OpCode::Regex(n) => write(
                out,
                format_args!("Regex {:?} ({})", self.regexes[n as usize].source(), n),
            ),
            OpCode::Nulls(n) => write(out, format_args!("Nulls {}", n)),
            OpCode::MatchConst(n) => write(
                out,
                format_args!("MatchConst {:?} ({})", self.regexes[n as usize].source(), n),
            ),
            OpCode::NotMatchConst(n) => write(
                out,
                format_args!(
                    "NotMatchConst {:?} ({})",
                    self.regexes[n as usize].source(),
                    n
                ),
            ),
            OpCode::Global(id) => write(
                out,
                format_args!("Global {}", self.scalar_names[id as usize]),
            ),
            OpCode::Local(id) => write(out, format_args!("Local {}", local_name(function, id))),
            OpCode::Special(var) => write(out, format_args!("Special {}", var.name())),
            OpCode::FieldNum(n) => write(out, format_args!("FieldNum {}", n)),
            OpCode::AssignGlobal(id) => write(
                out,
                format_args!("AssignGlobal {}", self.scalar_names[id as usize]),
            ),
            OpCode::AssignLocal(id) => write(
                out,
                format_args!("AssignLocal {}", local_name(function, id)),
            ),
            OpCode::AssignSpecial(var) => {
                write(out, format_args!("AssignSpecial {}", var.name()))
            }
            OpCode::IncrGlobal(amount, id) => write(
                out,
                format_args!("IncrGlobal {} {}", amount, self.scalar_names[id as usize]),
            ),
            OpCode::IncrLocal(amount, id) => write(
                out,
                format_args!("IncrLocal {} {}", amount, local_name(function, id)),
            ),
            OpCode::IncrSpecial(amount, var) => {
                write(out, format_args!("IncrSpecial {} {}", amount, var.name()))
            }
            OpCode::IncrField(amount) => write(out, format_args!("IncrField {}", amount)),
            OpCode::AugAssignGlobal(op, id) => write(
                out,
                format_args!(
                    "AugAssignGlobal {} {}",
                    aug_op_name(op),
                    self.scalar_names[id as usize]
                ),
            ),
            OpCode::AugAssignLocal(op, id) => write(
                out,
                format_args!(
                    "AugAssignLocal {} {}",
                    aug_op_name(op),
                    local_name(function, id)
                ),
            ),
            OpCode::AugAssignSpecial(op, var) => write(
                out,
                format_args!("AugAssignSpecial {} {}", aug_op_name(op), var.name()),
            ),
            OpCode::AugAssignField(op) => {
                write(out, format_args!("AugAssignField {}", aug_op_name(op)))
            }
            OpCode::ArrayGlobal(id) => write(
                out,
                format_args!("ArrayGlobal {}", self.array_names[id as usize]),
            ),
            OpCode::ArrayLocal(id) => write(
                out,
                format_args!("ArrayLocal {}", local_array_name(function, id)),
            ),
            OpCode::AssignArrayGlobal(id) => write(
                out,
                format_args!("AssignArrayGlobal {}", self.array_names[id as usize]),
            ),
            OpCode::AssignArrayLocal(id) => write(
                out,
                format_args!("AssignArrayLocal {}", local_array_name(function, id)),
            ),
            OpCode::IncrArrayGlobal(amount, id) => write(
                out,
                format_args!(
                    "IncrArrayGlobal {} {}",
                    amount, self.array_names[id as usize]
                ),
            ),
            OpCode::IncrArrayLocal(amount, id) => write(
                out,
                format_args!(
                    "IncrArrayLocal {} {}",
                    amount,
                    local_array_name(function, id)
                ),
            ),
            OpCode::AugAssignArrayGlobal(op, id) => write(
                out,
                format_args!(
                    "AugAssignArrayGlobal {} {}",
                    aug_op_name(op),
                    self.array_names[id as usize]
                ),
            ),
            OpCode::AugAssignArrayLocal(op, id) => write(
                out,
                format_args!(
                    "AugAssignArrayLocal {} {}",
                    aug_op_name(op),
                    local_array_name(function, id)
                ),
            ),
            OpCode::InGlobal(id) => write(
                out,
                format_args!("InGlobal {}", self.array_names[id as usize]),
            ),
            OpCode::InLocal(id) => write(
                out,
                format_args!("InLocal {}", local_array_name(function, id)),
            ),
            OpCode::Delete(operand) => write(out, format_args!("Delete {}", array(&operand))),
            OpCode::DeleteAll(operand) => {
                write(out, format_args!("DeleteAll {}", array(&operand)))
            }
            OpCode::MultiIndex(n) => write(out, format_args!("MultiIndex {}", n)),
            OpCode::Jump(off) => write(out, format_args!("Jump {}", target(off))),
            OpCode::JumpTrue(off) => write(out, format_args!("JumpTrue {}", target(off))),
            OpCode::JumpFalse(off) => write(out, format_args!("JumpFalse {}", target(off))),
            OpCode::JumpEquals(off) => write(out, format_args!("JumpEquals {}", target(off))),
            OpCode::JumpNotEquals(off) => {
                write(out, format_args!("JumpNotEquals {}", target(off)))
            }
            OpCode::JumpLess(off) => write(out, format_args!("JumpLess {}", target(off))),
            OpCode::JumpLessOrEqual(off) => {
                write(out, format_args!("JumpLessOrEqual {}", target(off)))
            }
            OpCode::JumpGreater(off) => write(out, format_args!("JumpGreater {}", target(off))),
            OpCode::JumpGreaterOrEqual(off) => {
                write(out, format_args!("JumpGreaterOrEqual {}", target(off)))
            }
            OpCode::ForInGlobal {
                var,
                array: operand,
                offset: off,
            } => write(
                out,
                format_args!(
                    "ForInGlobal {} {} {}",
                    self.scalar_names[var as usize],
                    array(&operand),
                    target(off)
                ),
            ),
            OpCode::ForInLocal {
                var,
                array: operand,
                offset: off,
            } => write(
                out,
                format_args!(
                    "ForInLocal {} {} {}",
                    local_name(function, var),
                    array(&operand),
                    target(off)
                ),
            ),
            OpCode::ForInSpecial {
                var,
                array: operand,
                offset: off,
            } => write(
                out,
                format_args!(
                    "ForInSpecial {} {} {}",
                    var.name(),
                    array(&operand),
                    target(off)
                ),
            ),
            OpCode::ArrayArgGlobal(id) => write(
                out,
                format_args!("ArrayArgGlobal {}", self.array_names[id as usize]),
            ),
            OpCode::ArrayArgLocal(id) => write(
                out,
                format_args!("ArrayArgLocal {}", local_array_name(function, id)),
            ),
            OpCode::CallUser {
                function: index,
                array_args,
            } => write(
                out,
                format_args!(
                    "CallUser {} {}",
                    self.functions[index as usize].name, array_args
                ),
            ),
            OpCode::CallNative {
                function: index,
                argc,
            } => write(
                out,
                format_args!(
                    "CallNative {} {}",
                    self.native_names[index as usize], argc
                ),
            ),
            OpCode::CallBuiltin {
                function: builtin,
                argc,
            } => write(
                out,
                format_args!("CallBuiltin {} {}", builtin.name(), argc),
            ),
            OpCode::CallSplitGlobal(id) => write(
                out,
                format_args!("CallSplitGlobal {}", self.array_names[id as usize]),
            ),
            OpCode::CallSplitLocal(id) => write(
                out,
                format_args!("CallSplitLocal {}", local_array_name(function, id)),
            ),
            OpCode::CallSplitSepGlobal(id) => write(
                out,
                format_args!("CallSplitSepGlobal {}", self.array_names[id as usize]),
            ),
            OpCode::CallSplitSepLocal(id) => write(
                out,
                format_args!("CallSplitSepLocal {}", local_array_name(function, id)),
            ),
            OpCode::CallSprintf(argc) => write(out, format_args!("CallSprintf {}", argc)),
            OpCode::CallSub(sub_target) => write(
                out,
                format_args!("CallSub {}", sub_target_name(self, function, sub_target)),
            ),
            OpCode::CallGsub(sub_target) => write(
                out,
                format_args!("CallGsub {}", sub_target_name(self, function, sub_target)),
            ),
            OpCode::Print(argc, redirect) => match redirect_name(redirect) {
                Some(name) => write(out, format_args!("Print {} {}", argc, name)),
                None => write(out, format_args!("Print {}", argc)),
            },
            OpCode::Printf(argc, redirect) => match redirect_name(redirect) {
                Some(name) => write(out, format_args!("Printf {} {}", argc, name)),
                None => write(out, format_args!("Printf {}", argc)),
            },
            OpCode::Getline(source) => {
                write(out, format_args!("Getline {}", source.mnemonic()))
            }
            OpCode::GetlineField(source) => {
                write(out, format_args!("GetlineField {}", source.mnemonic()))
            }
            OpCode::GetlineGlobal(source, id) => write(
                out,
                format_args!(
                    "GetlineGlobal {} {}",
                    source.mnemonic(),
                    self.scalar_names[id as usize]
                ),
            ),
            OpCode::GetlineLocal(source, id) => write(
                out,
                format_args!(
                    "GetlineLocal {} {}",
                    source.mnemonic(),
                    local_name(function, id)
                ),
            ),
            OpCode::GetlineSpecial(source, var) => write(
                out,
                format_args!("GetlineSpecial {} {}", source.mnemonic(), var.name()),
            ),
            OpCode::GetlineArrayGlobal(source, id) => write(
                out,
                format_args!(
                    "GetlineArrayGlobal {} {}",
                    source.mnemonic(),
                    self.array_names[id as usize]
                ),
            ),
            OpCode::GetlineArrayLocal(source, id) => write(
                out,
                format_args!(
                    "GetlineArrayLocal {} {}",
                    source.mnemonic(),
                    local_array_name(function, id)
                ),
            ),
            other => write(out, format_args!("{:?}", other)),
        }
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut listing = Vec::new();
        self.disassemble(&mut listing)
            .expect("error writing to vec");
        f.write_str(&String::from_utf8_lossy(&listing))
    }
}

fn aug_op_name(op: AugOp) -> &'static str {
    match op {
        AugOp::Add => "+=",
        AugOp::Subtract => "-=",
        AugOp::Multiply => "*=",
        AugOp::Divide => "/=",
        AugOp::Modulo => "%=",
        AugOp::Power => "^=",
    }
}

fn redirect_name(redirect: OutputRedirect) -> Option<&'static str> {
    match redirect {
        OutputRedirect::None => None,
        OutputRedirect::Truncate => Some(">"),
        OutputRedirect::Append => Some(">>"),
        OutputRedirect::Pipe => Some("|"),
    }
}

fn sub_target_name(program: &Program, function: Option<&Function>, target: SubTarget) -> String {
    match target {
        SubTarget::Record => "$0".to_string(),
        SubTarget::Field => "field".to_string(),
        SubTarget::Global(id) => program.scalar_names[id as usize].to_string(),
        SubTarget::Local(id) => local_name(function, id),
        SubTarget::Special(var) => var.name().to_string(),
        SubTarget::ArrayGlobal(id) => program.array_names[id as usize].to_string(),
        SubTarget::ArrayLocal(id) => local_array_name(function, id),
    }
}

fn local_name(function: Option<&Function>, index: VarId) -> String {
    let function = function.expect("local variable outside of a function");
    function
        .params
        .iter()
        .zip(&function.is_array)
        .filter(|(_, is_array)| !**is_array)
        .nth(index as usize)
        .map(|(name, _)| name.to_string())
        .expect("unexpected local variable index")
}

fn local_array_name(function: Option<&Function>, index: VarId) -> String {
    let function = function.expect("local array outside of a function");
    function
        .params
        .iter()
        .zip(&function.is_array)
        .filter(|(_, is_array)| **is_array)
        .nth(index as usize)
        .map(|(name, _)| name.to_string())
        .expect("unexpected local array index")
}
