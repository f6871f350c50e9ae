//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! The resolved abstract syntax tree the compiler consumes.
//!
//! The parser is an external collaborator: by the time a program reaches this
//! crate every name has been resolved to an index in one of the scope tables.
//! Scalars and arrays live in separate id spaces. Inside a function body,
//! local scalar indices count the scalar parameters in declaration order and
//! local array indices count the array parameters in declaration order.

use std::rc::Rc;

pub type VarId = u32;

/// The fixed set of special variables. Assignments to these have side
/// effects on the record engine and the I/O layer.
#[repr(u32)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SpecialVar {
    Argc,
    Convfmt,
    Filename,
    Fnr,
    Fs,
    Nf,
    Nr,
    Ofmt,
    Ofs,
    Ors,
    Rlength,
    Rs,
    Rstart,
    Rt,
    Subsep,

    /// the total number of special variables
    Count,
}

impl SpecialVar {
    pub fn name(&self) -> &'static str {
        match self {
            SpecialVar::Argc => "ARGC",
            SpecialVar::Convfmt => "CONVFMT",
            SpecialVar::Filename => "FILENAME",
            SpecialVar::Fnr => "FNR",
            SpecialVar::Fs => "FS",
            SpecialVar::Nf => "NF",
            SpecialVar::Nr => "NR",
            SpecialVar::Ofmt => "OFMT",
            SpecialVar::Ofs => "OFS",
            SpecialVar::Ors => "ORS",
            SpecialVar::Rlength => "RLENGTH",
            SpecialVar::Rs => "RS",
            SpecialVar::Rstart => "RSTART",
            SpecialVar::Rt => "RT",
            SpecialVar::Subsep => "SUBSEP",
            SpecialVar::Count => unreachable!("not a special variable"),
        }
    }

    pub fn from_name(name: &str) -> Option<SpecialVar> {
        let var = match name {
            "ARGC" => SpecialVar::Argc,
            "CONVFMT" => SpecialVar::Convfmt,
            "FILENAME" => SpecialVar::Filename,
            "FNR" => SpecialVar::Fnr,
            "FS" => SpecialVar::Fs,
            "NF" => SpecialVar::Nf,
            "NR" => SpecialVar::Nr,
            "OFMT" => SpecialVar::Ofmt,
            "OFS" => SpecialVar::Ofs,
            "ORS" => SpecialVar::Ors,
            "RLENGTH" => SpecialVar::Rlength,
            "RS" => SpecialVar::Rs,
            "RSTART" => SpecialVar::Rstart,
            "RT" => SpecialVar::Rt,
            "SUBSEP" => SpecialVar::Subsep,
            _ => return None,
        };
        Some(var)
    }

    pub fn from_index(index: u32) -> SpecialVar {
        assert!(index < SpecialVar::Count as u32);
        // indices are produced from the enum itself, so this is safe
        unsafe { std::mem::transmute(index) }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum VarScope {
    Global,
    Local,
    Special,
}

/// A resolved reference to a scalar variable. For `Special` scope the index
/// is the `SpecialVar` discriminant.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ScalarRef {
    pub scope: VarScope,
    pub index: VarId,
}

impl ScalarRef {
    pub fn global(index: VarId) -> Self {
        Self {
            scope: VarScope::Global,
            index,
        }
    }

    pub fn local(index: VarId) -> Self {
        Self {
            scope: VarScope::Local,
            index,
        }
    }

    pub fn special(var: SpecialVar) -> Self {
        Self {
            scope: VarScope::Special,
            index: var as u32,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ArrayScope {
    Global,
    Local,
}

/// A resolved reference to an array. Arrays have their own id space,
/// disjoint from scalars.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ArrayRef {
    pub scope: ArrayScope,
    pub index: VarId,
}

impl ArrayRef {
    pub fn global(index: VarId) -> Self {
        Self {
            scope: ArrayScope::Global,
            index,
        }
    }

    pub fn local(index: VarId) -> Self {
        Self {
            scope: ArrayScope::Local,
            index,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Concat,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equals,
    NotEquals,
}

/// Operator token carried by augmented assignments.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AugOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

/// Built-in functions without a specialized calling convention. `split`,
/// `sub`, `gsub` and `sprintf` mutate lvalues or arrays and get their own
/// expression nodes instead.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Builtin {
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

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Atan2 => "atan2",
            Builtin::Cos => "cos",
            Builtin::Sin => "sin",
            Builtin::Exp => "exp",
            Builtin::Log => "log",
            Builtin::Sqrt => "sqrt",
            Builtin::Int => "int",
            Builtin::Rand => "rand",
            Builtin::Srand => "srand",
            Builtin::Index => "index",
            Builtin::Length => "length",
            Builtin::Match => "match",
            Builtin::Substr => "substr",
            Builtin::ToLower => "tolower",
            Builtin::ToUpper => "toupper",
            Builtin::Close => "close",
            Builtin::Fflush => "fflush",
            Builtin::System => "system",
        }
    }
}

/// An assignable location.
#[derive(Debug, PartialEq, Clone)]
pub enum LValue {
    Var(ScalarRef),
    Field(Box<Expr>),
    ArrayElement { array: ArrayRef, index: Vec<Expr> },
}

/// Where `getline` reads from.
#[derive(Debug, PartialEq, Clone)]
pub enum GetlineSource {
    /// the main input stream
    Main,
    /// `getline < file`
    File(Box<Expr>),
    /// `cmd | getline`
    Command(Box<Expr>),
}

/// Where `getline` stores the record it read.
#[derive(Debug, PartialEq, Clone)]
pub enum GetlineTarget {
    Record,
    Var(ScalarRef),
    Field(Box<Expr>),
    ArrayElement { array: ArrayRef, index: Vec<Expr> },
}

/// An argument in a user function call. The parser has already checked that
/// arrays are only passed where the callee declares an array parameter.
#[derive(Debug, PartialEq, Clone)]
pub enum CallArg {
    Scalar(Expr),
    Array(ArrayRef),
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Num(f64),
    Str(Rc<str>),
    /// a regex literal in expression position matches against `$0`
    Regex(Rc<str>),
    Var(ScalarRef),
    Field(Box<Expr>),
    ArrayElement {
        array: ArrayRef,
        index: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `text ~ pattern` or `text !~ pattern`
    Match {
        negated: bool,
        text: Box<Expr>,
        pattern: Box<Expr>,
    },
    And {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Or {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Cond {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// `(i, j) in array` does not materialize the key
    InArray {
        index: Vec<Expr>,
        array: ArrayRef,
    },
    Assign {
        target: LValue,
        value: Box<Expr>,
    },
    AugAssign {
        target: LValue,
        op: AugOp,
        value: Box<Expr>,
    },
    /// `++x`, `x++`, `--x`, `x--`
    IncrDecr {
        target: LValue,
        decrement: bool,
        post: bool,
    },
    CallBuiltin {
        function: Builtin,
        args: Vec<Expr>,
    },
    /// `split(text, array [, separator])`
    Split {
        text: Box<Expr>,
        array: ArrayRef,
        separator: Option<Box<Expr>>,
    },
    /// `sub`/`gsub`; a missing target substitutes in `$0`
    Sub {
        gsub: bool,
        pattern: Box<Expr>,
        replacement: Box<Expr>,
        target: Option<LValue>,
    },
    Sprintf {
        args: Vec<Expr>,
    },
    CallUser {
        function: u32,
        args: Vec<CallArg>,
    },
    CallNative {
        function: u32,
        args: Vec<Expr>,
    },
    Getline {
        source: GetlineSource,
        target: GetlineTarget,
    },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectKind {
    /// `print > file`
    Truncate,
    /// `print >> file`
    Append,
    /// `print | command`
    Pipe,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Stmt {
    Expr(Expr),
    Print {
        args: Vec<Expr>,
        redirect: Option<(RedirectKind, Expr)>,
    },
    Printf {
        args: Vec<Expr>,
        redirect: Option<(RedirectKind, Expr)>,
    },
    If {
        cond: Expr,
        body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    DoWhile {
        body: Vec<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Vec<Stmt>,
    },
    ForIn {
        var: ScalarRef,
        array: ArrayRef,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Next,
    NextFile,
    Exit(Option<Expr>),
    Return(Option<Expr>),
    Delete {
        array: ArrayRef,
        index: Vec<Expr>,
    },
    DeleteAll(ArrayRef),
    Block(Vec<Stmt>),
}

#[derive(Debug, PartialEq, Clone)]
pub enum Pattern {
    /// no pattern; the action runs for every record
    Always,
    Expr(Expr),
    Range(Expr, Expr),
}

/// A pattern-action rule. A missing action prints the whole record.
#[derive(Debug, PartialEq, Clone)]
pub struct Rule {
    pub pattern: Pattern,
    pub action: Option<Vec<Stmt>>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub name: Rc<str>,
    pub params: Vec<Rc<str>>,
    /// parallel to `params`: true for parameters used as arrays
    pub is_array: Vec<bool>,
    pub body: Vec<Stmt>,
}

impl Function {
    pub fn scalar_param_count(&self) -> usize {
        self.is_array.iter().filter(|is_array| !**is_array).count()
    }

    pub fn array_param_count(&self) -> usize {
        self.is_array.iter().filter(|is_array| **is_array).count()
    }
}

/// A complete program with resolved names. `scalar_names` and `array_names`
/// are indexed by global id; `native_names` lists host functions referenced
/// by `CallNative` in declaration order.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Program {
    pub scalar_names: Vec<Rc<str>>,
    pub array_names: Vec<Rc<str>>,
    pub native_names: Vec<Rc<str>>,
    pub begin: Vec<Stmt>,
    pub rules: Vec<Rule>,
    pub end: Vec<Stmt>,
    pub functions: Vec<Function>,
}
