//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! The compiler lowers the resolved AST into bytecode: one code block per
//! BEGIN/END, per pattern, per action body and per user function, plus the
//! deduplicated constant pools.
//!
//! Every expression compiles to code that leaves exactly one value on the
//! stack; every statement compiles to code that leaves the stack unchanged.
//! Forward branches are emitted as zero-offset placeholders and patched once
//! their target is known; `break` and `continue` go through per-loop patch
//! lists.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{
    self, ArrayRef, ArrayScope, AugOp, BinaryOp, Builtin, CallArg, Expr, GetlineSource,
    GetlineTarget, LValue, Pattern as AstPattern, RedirectKind, ScalarRef, SpecialVar, Stmt,
    UnaryOp, VarScope,
};
use crate::program::{
    Action, ArrayOperand, BuiltinFunction, Function, InputSource, OpCode, OutputRedirect, Pattern,
    Program, SubTarget,
};
use crate::regex::Regex;

/// Compile a resolved program. Errors are setup errors: invalid regex
/// literals, or shape violations that indicate a broken parser.
pub fn compile_program(program: &ast::Program) -> Result<Program, String> {
    let mut compiler = Compiler::new(program);

    let mut begin = Vec::new();
    compiler.compile_stmts(&program.begin, &mut begin)?;

    let mut actions = Vec::new();
    for rule in &program.rules {
        let pattern = match &rule.pattern {
            AstPattern::Always => Pattern::All,
            AstPattern::Expr(expr) => {
                let mut block = Vec::new();
                compiler.compile_expr(expr, &mut block)?;
                Pattern::Expr(block)
            }
            AstPattern::Range(start_expr, end_expr) => {
                let mut start = Vec::new();
                compiler.compile_expr(start_expr, &mut start)?;
                let mut end = Vec::new();
                compiler.compile_expr(end_expr, &mut end)?;
                Pattern::Range { start, end }
            }
        };
        let body = match &rule.action {
            Some(stmts) => {
                let mut block = Vec::new();
                compiler.compile_stmts(stmts, &mut block)?;
                Some(block)
            }
            None => None,
        };
        actions.push(Action { pattern, body });
    }

    let mut end = Vec::new();
    compiler.compile_stmts(&program.end, &mut end)?;

    let mut functions = Vec::new();
    compiler.in_function = true;
    for function in &program.functions {
        let mut body = Vec::new();
        compiler.compile_stmts(&function.body, &mut body)?;
        functions.push(Function {
            name: function.name.clone(),
            params: function.params.clone(),
            is_array: function.is_array.clone(),
            scalar_params: function.scalar_param_count(),
            array_params: function.array_param_count(),
            body,
        });
    }
    compiler.in_function = false;

    Ok(Program {
        nums: compiler.nums,
        strs: compiler.strs,
        regexes: compiler.regexes,
        begin,
        actions,
        end,
        functions,
        scalar_names: program.scalar_names.clone(),
        array_names: program.array_names.clone(),
        native_names: program.native_names.clone(),
    })
}

enum LoopKind {
    /// while, do-while and C-style for: break/continue patch to offsets
    Structured,
    /// for-in: the body runs nested, break is an opcode
    ForIn,
}

struct LoopStubs {
    kind: LoopKind,
    break_stubs: Vec<usize>,
    continue_stubs: Vec<usize>,
}

impl LoopStubs {
    fn new(kind: LoopKind) -> Self {
        Self {
            kind,
            break_stubs: Vec::new(),
            continue_stubs: Vec::new(),
        }
    }
}

struct Compiler<'a> {
    ast: &'a ast::Program,
    nums: Vec<f64>,
    num_indices: HashMap<u64, u32>,
    strs: Vec<Rc<str>>,
    str_indices: HashMap<Rc<str>, u32>,
    regexes: Vec<Rc<Regex>>,
    regex_indices: HashMap<Rc<str>, u32>,
    loop_stack: Vec<LoopStubs>,
    in_function: bool,
}

/// Branch operand from the instruction at `from` to the instruction at
/// `to`, relative to the instruction following the branch.
fn branch_offset(from: usize, to: usize) -> i32 {
    to as i32 - from as i32 - 1
}

/// Patch a placeholder branch to target the current end of the block.
fn patch_to_here(instructions: &mut Vec<OpCode>, stub: usize) {
    let target = instructions.len();
    patch_jump(instructions, stub, target);
}

fn patch_jump(instructions: &mut [OpCode], stub: usize, target: usize) {
    let offset = branch_offset(stub, target);
    instructions[stub] = match instructions[stub] {
        OpCode::Jump(_) => OpCode::Jump(offset),
        OpCode::JumpTrue(_) => OpCode::JumpTrue(offset),
        OpCode::JumpFalse(_) => OpCode::JumpFalse(offset),
        OpCode::JumpEquals(_) => OpCode::JumpEquals(offset),
        OpCode::JumpNotEquals(_) => OpCode::JumpNotEquals(offset),
        OpCode::JumpLess(_) => OpCode::JumpLess(offset),
        OpCode::JumpLessOrEqual(_) => OpCode::JumpLessOrEqual(offset),
        OpCode::JumpGreater(_) => OpCode::JumpGreater(offset),
        OpCode::JumpGreaterOrEqual(_) => OpCode::JumpGreaterOrEqual(offset),
        _ => unreachable!("patched instruction is not a branch"),
    };
}

fn array_operand(array: ArrayRef) -> ArrayOperand {
    ArrayOperand {
        scope: array.scope,
        index: array.index,
    }
}

fn builtin_function(builtin: Builtin) -> BuiltinFunction {
    match builtin {
        Builtin::Atan2 => BuiltinFunction::Atan2,
        Builtin::Cos => BuiltinFunction::Cos,
        Builtin::Sin => BuiltinFunction::Sin,
        Builtin::Exp => BuiltinFunction::Exp,
        Builtin::Log => BuiltinFunction::Log,
        Builtin::Sqrt => BuiltinFunction::Sqrt,
        Builtin::Int => BuiltinFunction::Int,
        Builtin::Rand => BuiltinFunction::Rand,
        Builtin::Srand => BuiltinFunction::Srand,
        Builtin::Index => BuiltinFunction::Index,
        Builtin::Length => BuiltinFunction::Length,
        Builtin::Match => BuiltinFunction::Match,
        Builtin::Substr => BuiltinFunction::Substr,
        Builtin::ToLower => BuiltinFunction::ToLower,
        Builtin::ToUpper => BuiltinFunction::ToUpper,
        Builtin::Close => BuiltinFunction::Close,
        Builtin::Fflush => BuiltinFunction::Fflush,
        Builtin::System => BuiltinFunction::System,
    }
}

fn binary_op_code(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Subtract => OpCode::Subtract,
        BinaryOp::Multiply => OpCode::Multiply,
        BinaryOp::Divide => OpCode::Divide,
        BinaryOp::Modulo => OpCode::Modulo,
        BinaryOp::Power => OpCode::Power,
        BinaryOp::Concat => OpCode::Concat,
        BinaryOp::Less => OpCode::Less,
        BinaryOp::LessOrEqual => OpCode::LessOrEqual,
        BinaryOp::Greater => OpCode::Greater,
        BinaryOp::GreaterOrEqual => OpCode::GreaterOrEqual,
        BinaryOp::Equals => OpCode::Equals,
        BinaryOp::NotEquals => OpCode::NotEquals,
    }
}

fn aug_op_code(op: AugOp) -> OpCode {
    match op {
        AugOp::Add => OpCode::Add,
        AugOp::Subtract => OpCode::Subtract,
        AugOp::Multiply => OpCode::Multiply,
        AugOp::Divide => OpCode::Divide,
        AugOp::Modulo => OpCode::Modulo,
        AugOp::Power => OpCode::Power,
    }
}

fn invert_comparison(op: BinaryOp) -> Option<BinaryOp> {
    let inverted = match op {
        BinaryOp::Equals => BinaryOp::NotEquals,
        BinaryOp::NotEquals => BinaryOp::Equals,
        BinaryOp::Less => BinaryOp::GreaterOrEqual,
        BinaryOp::GreaterOrEqual => BinaryOp::Less,
        BinaryOp::Greater => BinaryOp::LessOrEqual,
        BinaryOp::LessOrEqual => BinaryOp::Greater,
        _ => return None,
    };
    Some(inverted)
}

fn fused_jump(op: BinaryOp, jump_if: bool) -> Option<OpCode> {
    let effective = if jump_if { op } else { invert_comparison(op)? };
    let opcode = match effective {
        BinaryOp::Equals => OpCode::JumpEquals(0),
        BinaryOp::NotEquals => OpCode::JumpNotEquals(0),
        BinaryOp::Less => OpCode::JumpLess(0),
        BinaryOp::LessOrEqual => OpCode::JumpLessOrEqual(0),
        BinaryOp::Greater => OpCode::JumpGreater(0),
        BinaryOp::GreaterOrEqual => OpCode::JumpGreaterOrEqual(0),
        _ => return None,
    };
    Some(opcode)
}

/// A field expression with a constant non-negative integer index compiles
/// to the immediate `FieldNum` form.
fn const_field_index(expr: &Expr) -> Option<u32> {
    match expr {
        Expr::Num(value)
            if *value >= 0.0 && value.fract() == 0.0 && *value <= u32::MAX as f64 =>
        {
            Some(*value as u32)
        }
        _ => None,
    }
}

impl<'a> Compiler<'a> {
    fn new(ast: &'a ast::Program) -> Self {
        Self {
            ast,
            nums: Vec::new(),
            num_indices: HashMap::new(),
            strs: Vec::new(),
            str_indices: HashMap::new(),
            regexes: Vec::new(),
            regex_indices: HashMap::new(),
            loop_stack: Vec::new(),
            in_function: false,
        }
    }

    fn intern_num(&mut self, value: f64) -> u32 {
        match self.num_indices.get(&value.to_bits()) {
            Some(index) => *index,
            None => {
                let index = self.nums.len() as u32;
                self.nums.push(value);
                self.num_indices.insert(value.to_bits(), index);
                index
            }
        }
    }

    fn intern_str(&mut self, value: &Rc<str>) -> u32 {
        match self.str_indices.get(value) {
            Some(index) => *index,
            None => {
                let index = self.strs.len() as u32;
                self.strs.push(value.clone());
                self.str_indices.insert(value.clone(), index);
                index
            }
        }
    }

    /// Intern a regex literal, compiling it eagerly so a bad literal is a
    /// setup error, deduplicated by canonical source text.
    fn intern_regex(&mut self, source: &Rc<str>) -> Result<u32, String> {
        match self.regex_indices.get(source) {
            Some(index) => Ok(*index),
            None => {
                let regex = Regex::new(source.clone())?;
                let index = self.regexes.len() as u32;
                self.regexes.push(Rc::new(regex));
                self.regex_indices.insert(source.clone(), index);
                Ok(index)
            }
        }
    }

    fn push_num(&mut self, value: f64, instructions: &mut Vec<OpCode>) {
        let index = self.intern_num(value);
        instructions.push(OpCode::Num(index));
    }

    fn compile_stmts(
        &mut self,
        stmts: &[Stmt],
        instructions: &mut Vec<OpCode>,
    ) -> Result<(), String> {
        for stmt in stmts {
            self.compile_stmt(stmt, instructions)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt, instructions: &mut Vec<OpCode>) -> Result<(), String> {
        match stmt {
            Stmt::Expr(expr) => match expr {
                Expr::Assign { target, value } => {
                    self.compile_expr(value, instructions)?;
                    self.compile_assign(target, instructions)?;
                }
                Expr::AugAssign { target, op, value } => {
                    self.compile_aug_assign_stmt(target, *op, value, instructions)?;
                }
                Expr::IncrDecr {
                    target, decrement, ..
                } => {
                    self.compile_incr_stmt(target, if *decrement { -1 } else { 1 }, instructions)?;
                }
                other => {
                    self.compile_expr(other, instructions)?;
                    instructions.push(OpCode::Drop);
                }
            },
            Stmt::Print { args, redirect } => {
                let argc = if args.is_empty() {
                    instructions.push(OpCode::FieldNum(0));
                    1
                } else {
                    for arg in args {
                        self.compile_expr(arg, instructions)?;
                    }
                    args.len() as u16
                };
                let redirect = self.compile_redirect(redirect, instructions)?;
                instructions.push(OpCode::Print(argc, redirect));
            }
            Stmt::Printf { args, redirect } => {
                for arg in args {
                    self.compile_expr(arg, instructions)?;
                }
                let redirect = self.compile_redirect(redirect, instructions)?;
                instructions.push(OpCode::Printf(args.len() as u16, redirect));
            }
            Stmt::If {
                cond,
                body,
                else_body,
            } => {
                let cond_stub = self.compile_condition_jump(cond, false, instructions)?;
                self.compile_stmts(body, instructions)?;
                if else_body.is_empty() {
                    patch_to_here(instructions, cond_stub);
                } else {
                    let else_stub = instructions.len();
                    instructions.push(OpCode::Jump(0));
                    patch_to_here(instructions, cond_stub);
                    self.compile_stmts(else_body, instructions)?;
                    patch_to_here(instructions, else_stub);
                }
            }
            Stmt::While { cond, body } => {
                self.loop_stack.push(LoopStubs::new(LoopKind::Structured));
                let cond_start = instructions.len();
                let cond_stub = self.compile_condition_jump(cond, false, instructions)?;
                self.compile_stmts(body, instructions)?;
                let back = instructions.len();
                instructions.push(OpCode::Jump(branch_offset(back, cond_start)));
                patch_to_here(instructions, cond_stub);
                let end = instructions.len();
                self.finish_loop(instructions, end, cond_start);
            }
            Stmt::DoWhile { body, cond } => {
                self.loop_stack.push(LoopStubs::new(LoopKind::Structured));
                let body_start = instructions.len();
                self.compile_stmts(body, instructions)?;
                let cond_start = instructions.len();
                let cond_stub = self.compile_condition_jump(cond, true, instructions)?;
                patch_jump(instructions, cond_stub, body_start);
                let end = instructions.len();
                self.finish_loop(instructions, end, cond_start);
            }
            Stmt::For {
                init,
                cond,
                post,
                body,
            } => {
                if let Some(init) = init {
                    self.compile_stmt(init, instructions)?;
                }
                self.loop_stack.push(LoopStubs::new(LoopKind::Structured));
                let cond_start = instructions.len();
                let cond_stub = match cond {
                    Some(cond) => Some(self.compile_condition_jump(cond, false, instructions)?),
                    None => None,
                };
                self.compile_stmts(body, instructions)?;
                // continue in a C-style for targets the post statement
                let post_start = instructions.len();
                if let Some(post) = post {
                    self.compile_stmt(post, instructions)?;
                }
                let back = instructions.len();
                instructions.push(OpCode::Jump(branch_offset(back, cond_start)));
                if let Some(stub) = cond_stub {
                    patch_to_here(instructions, stub);
                }
                let end = instructions.len();
                self.finish_loop(instructions, end, post_start);
            }
            Stmt::ForIn { var, array, body } => {
                let operand = array_operand(*array);
                let for_in_index = instructions.len();
                instructions.push(match var.scope {
                    VarScope::Global => OpCode::ForInGlobal {
                        var: var.index,
                        array: operand,
                        offset: 0,
                    },
                    VarScope::Local => OpCode::ForInLocal {
                        var: var.index,
                        array: operand,
                        offset: 0,
                    },
                    VarScope::Special => OpCode::ForInSpecial {
                        var: SpecialVar::from_index(var.index),
                        array: operand,
                        offset: 0,
                    },
                });
                self.loop_stack.push(LoopStubs::new(LoopKind::ForIn));
                self.compile_stmts(body, instructions)?;
                let end = instructions.len();
                let offset = branch_offset(for_in_index, end);
                match &mut instructions[for_in_index] {
                    OpCode::ForInGlobal { offset: slot, .. }
                    | OpCode::ForInLocal { offset: slot, .. }
                    | OpCode::ForInSpecial { offset: slot, .. } => *slot = offset,
                    _ => unreachable!("for-in placeholder was overwritten"),
                }
                self.finish_loop(instructions, end, end);
            }
            Stmt::Break => match self.loop_stack.last_mut() {
                Some(stubs) => match stubs.kind {
                    LoopKind::ForIn => instructions.push(OpCode::BreakForIn),
                    LoopKind::Structured => {
                        stubs.break_stubs.push(instructions.len());
                        instructions.push(OpCode::Jump(0));
                    }
                },
                None => return Err("break statement outside of loop".to_string()),
            },
            Stmt::Continue => match self.loop_stack.last_mut() {
                Some(stubs) => {
                    stubs.continue_stubs.push(instructions.len());
                    instructions.push(OpCode::Jump(0));
                }
                None => return Err("continue statement outside of loop".to_string()),
            },
            Stmt::Next => instructions.push(OpCode::Next),
            Stmt::NextFile => instructions.push(OpCode::NextFile),
            Stmt::Exit(expr) => match expr {
                Some(expr) => {
                    self.compile_expr(expr, instructions)?;
                    instructions.push(OpCode::ExitStatus);
                }
                None => instructions.push(OpCode::Exit),
            },
            Stmt::Return(expr) => {
                if !self.in_function {
                    return Err("return statement outside of function".to_string());
                }
                match expr {
                    Some(expr) => self.compile_expr(expr, instructions)?,
                    None => instructions.push(OpCode::Nulls(1)),
                }
                instructions.push(OpCode::Return);
            }
            Stmt::Delete { array, index } => {
                self.compile_array_key(index, instructions)?;
                instructions.push(OpCode::Delete(array_operand(*array)));
            }
            Stmt::DeleteAll(array) => {
                instructions.push(OpCode::DeleteAll(array_operand(*array)));
            }
            Stmt::Block(stmts) => self.compile_stmts(stmts, instructions)?,
        }
        Ok(())
    }

    fn finish_loop(
        &mut self,
        instructions: &mut [OpCode],
        break_target: usize,
        continue_target: usize,
    ) {
        let stubs = self.loop_stack.pop().expect("unbalanced loop stack");
        for stub in stubs.break_stubs {
            patch_jump(instructions, stub, break_target);
        }
        for stub in stubs.continue_stubs {
            patch_jump(instructions, stub, continue_target);
        }
    }

    fn compile_redirect(
        &mut self,
        redirect: &Option<(RedirectKind, Expr)>,
        instructions: &mut Vec<OpCode>,
    ) -> Result<OutputRedirect, String> {
        match redirect {
            None => Ok(OutputRedirect::None),
            Some((kind, destination)) => {
                self.compile_expr(destination, instructions)?;
                Ok(match kind {
                    RedirectKind::Truncate => OutputRedirect::Truncate,
                    RedirectKind::Append => OutputRedirect::Append,
                    RedirectKind::Pipe => OutputRedirect::Pipe,
                })
            }
        }
    }

    /// Compile a condition consumed by a branch. Comparisons fuse into the
    /// compare-and-jump opcodes. Returns the stub to patch.
    fn compile_condition_jump(
        &mut self,
        cond: &Expr,
        jump_if: bool,
        instructions: &mut Vec<OpCode>,
    ) -> Result<usize, String> {
        if let Expr::Binary { op, left, right } = cond {
            if let Some(fused) = fused_jump(*op, jump_if) {
                self.compile_expr(left, instructions)?;
                self.compile_expr(right, instructions)?;
                let stub = instructions.len();
                instructions.push(fused);
                return Ok(stub);
            }
        }
        self.compile_expr(cond, instructions)?;
        let stub = instructions.len();
        instructions.push(if jump_if {
            OpCode::JumpTrue(0)
        } else {
            OpCode::JumpFalse(0)
        });
        Ok(stub)
    }

    /// Compile index expressions into a single array key, joining multiple
    /// subscripts with `SUBSEP`.
    fn compile_array_key(
        &mut self,
        index: &[Expr],
        instructions: &mut Vec<OpCode>,
    ) -> Result<(), String> {
        for expr in index {
            self.compile_expr(expr, instructions)?;
        }
        if index.len() > 1 {
            instructions.push(OpCode::MultiIndex(index.len() as u32));
        }
        Ok(())
    }

    /// A regex-valued argument position: a regex literal is validated and
    /// interned at compile time but passed as its source text, everything
    /// else is an ordinary string expression.
    fn compile_pattern_arg(
        &mut self,
        expr: &Expr,
        instructions: &mut Vec<OpCode>,
    ) -> Result<(), String> {
        match expr {
            Expr::Regex(source) => {
                self.intern_regex(source)?;
                let index = self.intern_str(source);
                instructions.push(OpCode::Str(index));
                Ok(())
            }
            other => self.compile_expr(other, instructions),
        }
    }

    fn compile_expr(&mut self, expr: &Expr, instructions: &mut Vec<OpCode>) -> Result<(), String> {
        match expr {
            Expr::Num(value) => self.push_num(*value, instructions),
            Expr::Str(value) => {
                let index = self.intern_str(value);
                instructions.push(OpCode::Str(index));
            }
            Expr::Regex(source) => {
                let index = self.intern_regex(source)?;
                instructions.push(OpCode::Regex(index));
            }
            Expr::Var(var) => instructions.push(scalar_load(*var)),
            Expr::Field(index) => match const_field_index(index) {
                Some(field) => instructions.push(OpCode::FieldNum(field)),
                None => {
                    self.compile_expr(index, instructions)?;
                    instructions.push(OpCode::Field);
                }
            },
            Expr::ArrayElement { array, index } => {
                self.compile_array_key(index, instructions)?;
                instructions.push(match array.scope {
                    ArrayScope::Global => OpCode::ArrayGlobal(array.index),
                    ArrayScope::Local => OpCode::ArrayLocal(array.index),
                });
            }
            Expr::Unary { op, expr } => {
                self.compile_expr(expr, instructions)?;
                instructions.push(match op {
                    UnaryOp::Negate => OpCode::UnaryMinus,
                    UnaryOp::Plus => OpCode::UnaryPlus,
                    UnaryOp::Not => OpCode::Not,
                });
            }
            Expr::Binary { op, left, right } => {
                self.compile_expr(left, instructions)?;
                self.compile_expr(right, instructions)?;
                instructions.push(binary_op_code(*op));
            }
            Expr::Match {
                negated,
                text,
                pattern,
            } => {
                self.compile_expr(text, instructions)?;
                match pattern.as_ref() {
                    Expr::Regex(source) => {
                        let index = self.intern_regex(source)?;
                        instructions.push(if *negated {
                            OpCode::NotMatchConst(index)
                        } else {
                            OpCode::MatchConst(index)
                        });
                    }
                    other => {
                        self.compile_expr(other, instructions)?;
                        instructions.push(if *negated {
                            OpCode::NotMatch
                        } else {
                            OpCode::Match
                        });
                    }
                }
            }
            Expr::And { left, right } => {
                self.compile_expr(left, instructions)?;
                let false_stub = instructions.len();
                instructions.push(OpCode::JumpFalse(0));
                self.compile_expr(right, instructions)?;
                instructions.push(OpCode::Boolean);
                let end_stub = instructions.len();
                instructions.push(OpCode::Jump(0));
                patch_to_here(instructions, false_stub);
                self.push_num(0.0, instructions);
                patch_to_here(instructions, end_stub);
            }
            Expr::Or { left, right } => {
                self.compile_expr(left, instructions)?;
                let true_stub = instructions.len();
                instructions.push(OpCode::JumpTrue(0));
                self.compile_expr(right, instructions)?;
                instructions.push(OpCode::Boolean);
                let end_stub = instructions.len();
                instructions.push(OpCode::Jump(0));
                patch_to_here(instructions, true_stub);
                self.push_num(1.0, instructions);
                patch_to_here(instructions, end_stub);
            }
            Expr::Cond {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond_stub = self.compile_condition_jump(cond, false, instructions)?;
                self.compile_expr(then_expr, instructions)?;
                let end_stub = instructions.len();
                instructions.push(OpCode::Jump(0));
                patch_to_here(instructions, cond_stub);
                self.compile_expr(else_expr, instructions)?;
                patch_to_here(instructions, end_stub);
            }
            Expr::InArray { index, array } => {
                self.compile_array_key(index, instructions)?;
                instructions.push(match array.scope {
                    ArrayScope::Global => OpCode::InGlobal(array.index),
                    ArrayScope::Local => OpCode::InLocal(array.index),
                });
            }
            Expr::Assign { target, value } => {
                self.compile_expr(value, instructions)?;
                instructions.push(OpCode::Dup);
                self.compile_assign(target, instructions)?;
            }
            Expr::AugAssign { target, op, value } => {
                self.compile_aug_assign_expr(target, *op, value, instructions)?;
            }
            Expr::IncrDecr {
                target,
                decrement,
                post,
            } => {
                let amount = if *decrement { -1 } else { 1 };
                self.compile_incr_expr(target, amount, *post, instructions)?;
            }
            Expr::CallBuiltin { function, args } => {
                let argc = match function {
                    Builtin::Length if args.is_empty() => {
                        instructions.push(OpCode::FieldNum(0));
                        1
                    }
                    Builtin::Match => {
                        self.compile_expr(&args[0], instructions)?;
                        self.compile_pattern_arg(&args[1], instructions)?;
                        2
                    }
                    _ => {
                        for arg in args {
                            self.compile_expr(arg, instructions)?;
                        }
                        args.len() as u16
                    }
                };
                instructions.push(OpCode::CallBuiltin {
                    function: builtin_function(*function),
                    argc,
                });
            }
            Expr::Split {
                text,
                array,
                separator,
            } => {
                self.compile_expr(text, instructions)?;
                match separator {
                    None => instructions.push(match array.scope {
                        ArrayScope::Global => OpCode::CallSplitGlobal(array.index),
                        ArrayScope::Local => OpCode::CallSplitLocal(array.index),
                    }),
                    Some(separator) => {
                        self.compile_pattern_arg(separator, instructions)?;
                        instructions.push(match array.scope {
                            ArrayScope::Global => OpCode::CallSplitSepGlobal(array.index),
                            ArrayScope::Local => OpCode::CallSplitSepLocal(array.index),
                        });
                    }
                }
            }
            Expr::Sub {
                gsub,
                pattern,
                replacement,
                target,
            } => {
                let target = self.compile_sub_target(target, instructions)?;
                self.compile_pattern_arg(pattern, instructions)?;
                self.compile_expr(replacement, instructions)?;
                instructions.push(if *gsub {
                    OpCode::CallGsub(target)
                } else {
                    OpCode::CallSub(target)
                });
            }
            Expr::Sprintf { args } => {
                for arg in args {
                    self.compile_expr(arg, instructions)?;
                }
                instructions.push(OpCode::CallSprintf(args.len() as u16));
            }
            Expr::CallUser { function, args } => {
                self.compile_user_call(*function, args, instructions)?;
            }
            Expr::CallNative { function, args } => {
                for arg in args {
                    self.compile_expr(arg, instructions)?;
                }
                instructions.push(OpCode::CallNative {
                    function: *function,
                    argc: args.len() as u16,
                });
            }
            Expr::Getline { source, target } => {
                self.compile_getline(source, target, instructions)?;
            }
        }
        Ok(())
    }

    fn compile_user_call(
        &mut self,
        function: u32,
        args: &[CallArg],
        instructions: &mut Vec<OpCode>,
    ) -> Result<(), String> {
        let callee = self
            .ast
            .functions
            .get(function as usize)
            .ok_or_else(|| format!("call to undefined function {}", function))?;
        if args.len() > callee.params.len() {
            return Err(format!(
                "function {} called with too many arguments",
                callee.name
            ));
        }
        let mut scalars_pushed = 0;
        let mut arrays_staged = 0u16;
        for (arg, is_array) in args.iter().zip(&callee.is_array) {
            match arg {
                CallArg::Scalar(expr) => {
                    if *is_array {
                        return Err(format!(
                            "scalar passed for an array parameter of {}",
                            callee.name
                        ));
                    }
                    self.compile_expr(expr, instructions)?;
                    scalars_pushed += 1;
                }
                CallArg::Array(array) => {
                    if !*is_array {
                        return Err(format!(
                            "array passed for a scalar parameter of {}",
                            callee.name
                        ));
                    }
                    instructions.push(match array.scope {
                        ArrayScope::Global => OpCode::ArrayArgGlobal(array.index),
                        ArrayScope::Local => OpCode::ArrayArgLocal(array.index),
                    });
                    arrays_staged += 1;
                }
            }
        }
        // missing scalar arguments materialize as null
        let missing = callee.scalar_param_count() - scalars_pushed;
        if missing > 0 {
            instructions.push(OpCode::Nulls(missing as u32));
        }
        instructions.push(OpCode::CallUser {
            function,
            array_args: arrays_staged,
        });
        Ok(())
    }

    fn compile_getline(
        &mut self,
        source: &GetlineSource,
        target: &GetlineTarget,
        instructions: &mut Vec<OpCode>,
    ) -> Result<(), String> {
        // the target's own operand goes below the stream name
        match target {
            GetlineTarget::Field(index) => self.compile_expr(index, instructions)?,
            GetlineTarget::ArrayElement { index, .. } => {
                self.compile_array_key(index, instructions)?
            }
            GetlineTarget::Record | GetlineTarget::Var(_) => {}
        }
        let input_source = match source {
            GetlineSource::Main => InputSource::Main,
            GetlineSource::File(name) => {
                self.compile_expr(name, instructions)?;
                InputSource::File
            }
            GetlineSource::Command(command) => {
                self.compile_expr(command, instructions)?;
                InputSource::Command
            }
        };
        instructions.push(match target {
            GetlineTarget::Record => OpCode::Getline(input_source),
            GetlineTarget::Field(_) => OpCode::GetlineField(input_source),
            GetlineTarget::Var(var) => match var.scope {
                VarScope::Global => OpCode::GetlineGlobal(input_source, var.index),
                VarScope::Local => OpCode::GetlineLocal(input_source, var.index),
                VarScope::Special => {
                    OpCode::GetlineSpecial(input_source, SpecialVar::from_index(var.index))
                }
            },
            GetlineTarget::ArrayElement { array, .. } => match array.scope {
                ArrayScope::Global => OpCode::GetlineArrayGlobal(input_source, array.index),
                ArrayScope::Local => OpCode::GetlineArrayLocal(input_source, array.index),
            },
        });
        Ok(())
    }

    fn compile_sub_target(
        &mut self,
        target: &Option<LValue>,
        instructions: &mut Vec<OpCode>,
    ) -> Result<SubTarget, String> {
        match target {
            None => Ok(SubTarget::Record),
            Some(LValue::Var(var)) => Ok(match var.scope {
                VarScope::Global => SubTarget::Global(var.index),
                VarScope::Local => SubTarget::Local(var.index),
                VarScope::Special => SubTarget::Special(SpecialVar::from_index(var.index)),
            }),
            Some(LValue::Field(index)) => {
                self.compile_expr(index, instructions)?;
                Ok(SubTarget::Field)
            }
            Some(LValue::ArrayElement { array, index }) => {
                self.compile_array_key(index, instructions)?;
                Ok(match array.scope {
                    ArrayScope::Global => SubTarget::ArrayGlobal(array.index),
                    ArrayScope::Local => SubTarget::ArrayLocal(array.index),
                })
            }
        }
    }

    /// Store the value on top of the stack into the target.
    fn compile_assign(
        &mut self,
        target: &LValue,
        instructions: &mut Vec<OpCode>,
    ) -> Result<(), String> {
        match target {
            LValue::Var(var) => instructions.push(scalar_store(*var)),
            LValue::Field(index) => {
                self.compile_expr(index, instructions)?;
                instructions.push(OpCode::AssignField);
            }
            LValue::ArrayElement { array, index } => {
                self.compile_array_key(index, instructions)?;
                instructions.push(match array.scope {
                    ArrayScope::Global => OpCode::AssignArrayGlobal(array.index),
                    ArrayScope::Local => OpCode::AssignArrayLocal(array.index),
                });
            }
        }
        Ok(())
    }

    /// Augmented assignment in statement position: no value is left behind.
    fn compile_aug_assign_stmt(
        &mut self,
        target: &LValue,
        op: AugOp,
        value: &Expr,
        instructions: &mut Vec<OpCode>,
    ) -> Result<(), String> {
        self.compile_expr(value, instructions)?;
        match target {
            LValue::Var(var) => instructions.push(match var.scope {
                VarScope::Global => OpCode::AugAssignGlobal(op, var.index),
                VarScope::Local => OpCode::AugAssignLocal(op, var.index),
                VarScope::Special => {
                    OpCode::AugAssignSpecial(op, SpecialVar::from_index(var.index))
                }
            }),
            LValue::Field(index) => {
                self.compile_expr(index, instructions)?;
                instructions.push(OpCode::AugAssignField(op));
            }
            LValue::ArrayElement { array, index } => {
                self.compile_array_key(index, instructions)?;
                instructions.push(match array.scope {
                    ArrayScope::Global => OpCode::AugAssignArrayGlobal(op, array.index),
                    ArrayScope::Local => OpCode::AugAssignArrayLocal(op, array.index),
                });
            }
        }
        Ok(())
    }

    /// Augmented assignment in expression position: the updated value stays
    /// on the stack.
    fn compile_aug_assign_expr(
        &mut self,
        target: &LValue,
        op: AugOp,
        value: &Expr,
        instructions: &mut Vec<OpCode>,
    ) -> Result<(), String> {
        match target {
            LValue::Var(var) => {
                instructions.push(scalar_load(*var));
                self.compile_expr(value, instructions)?;
                instructions.push(aug_op_code(op));
                instructions.push(OpCode::Dup);
                instructions.push(scalar_store(*var));
            }
            LValue::Field(index) => {
                self.compile_expr(index, instructions)?;
                instructions.push(OpCode::Dup);
                instructions.push(OpCode::Field);
                self.compile_expr(value, instructions)?;
                instructions.push(aug_op_code(op));
                instructions.push(OpCode::Dup);
                instructions.push(OpCode::Rote);
                instructions.push(OpCode::AssignField);
            }
            LValue::ArrayElement { array, index } => {
                self.compile_array_key(index, instructions)?;
                instructions.push(OpCode::Dup);
                let (load, store) = match array.scope {
                    ArrayScope::Global => (
                        OpCode::ArrayGlobal(array.index),
                        OpCode::AssignArrayGlobal(array.index),
                    ),
                    ArrayScope::Local => (
                        OpCode::ArrayLocal(array.index),
                        OpCode::AssignArrayLocal(array.index),
                    ),
                };
                instructions.push(load);
                self.compile_expr(value, instructions)?;
                instructions.push(aug_op_code(op));
                instructions.push(OpCode::Dup);
                instructions.push(OpCode::Rote);
                instructions.push(store);
            }
        }
        Ok(())
    }

    fn compile_incr_stmt(
        &mut self,
        target: &LValue,
        amount: i32,
        instructions: &mut Vec<OpCode>,
    ) -> Result<(), String> {
        match target {
            LValue::Var(var) => instructions.push(scalar_incr(*var, amount)),
            LValue::Field(index) => {
                self.compile_expr(index, instructions)?;
                instructions.push(OpCode::IncrField(amount));
            }
            LValue::ArrayElement { array, index } => {
                self.compile_array_key(index, instructions)?;
                instructions.push(match array.scope {
                    ArrayScope::Global => OpCode::IncrArrayGlobal(amount, array.index),
                    ArrayScope::Local => OpCode::IncrArrayLocal(amount, array.index),
                });
            }
        }
        Ok(())
    }

    /// Pre-increments load after updating; post-increments push the numeric
    /// value of the target before updating.
    fn compile_incr_expr(
        &mut self,
        target: &LValue,
        amount: i32,
        post: bool,
        instructions: &mut Vec<OpCode>,
    ) -> Result<(), String> {
        match target {
            LValue::Var(var) => {
                if post {
                    instructions.push(scalar_load(*var));
                    instructions.push(OpCode::AsNumber);
                    instructions.push(scalar_incr(*var, amount));
                } else {
                    instructions.push(scalar_incr(*var, amount));
                    instructions.push(scalar_load(*var));
                }
            }
            LValue::Field(index) => {
                self.compile_expr(index, instructions)?;
                instructions.push(OpCode::Dup);
                if post {
                    instructions.push(OpCode::Field);
                    instructions.push(OpCode::AsNumber);
                    instructions.push(OpCode::Swap);
                    instructions.push(OpCode::IncrField(amount));
                } else {
                    instructions.push(OpCode::IncrField(amount));
                    instructions.push(OpCode::Field);
                }
            }
            LValue::ArrayElement { array, index } => {
                self.compile_array_key(index, instructions)?;
                instructions.push(OpCode::Dup);
                let (load, incr) = match array.scope {
                    ArrayScope::Global => (
                        OpCode::ArrayGlobal(array.index),
                        OpCode::IncrArrayGlobal(amount, array.index),
                    ),
                    ArrayScope::Local => (
                        OpCode::ArrayLocal(array.index),
                        OpCode::IncrArrayLocal(amount, array.index),
                    ),
                };
                if post {
                    instructions.push(load);
                    instructions.push(OpCode::AsNumber);
                    instructions.push(OpCode::Swap);
                    instructions.push(incr);
                } else {
                    instructions.push(incr);
                    instructions.push(load);
                }
            }
        }
        Ok(())
    }
}

fn scalar_load(var: ScalarRef) -> OpCode {
    match var.scope {
        VarScope::Global => OpCode::Global(var.index),
        VarScope::Local => OpCode::Local(var.index),
        VarScope::Special => OpCode::Special(SpecialVar::from_index(var.index)),
    }
}

fn scalar_store(var: ScalarRef) -> OpCode {
    match var.scope {
        VarScope::Global => OpCode::AssignGlobal(var.index),
        VarScope::Local => OpCode::AssignLocal(var.index),
        VarScope::Special => OpCode::AssignSpecial(SpecialVar::from_index(var.index)),
    }
}

fn scalar_incr(var: ScalarRef, amount: i32) -> OpCode {
    match var.scope {
        VarScope::Global => OpCode::IncrGlobal(amount, var.index),
        VarScope::Local => OpCode::IncrLocal(amount, var.index),
        VarScope::Special => OpCode::IncrSpecial(amount, SpecialVar::from_index(var.index)),
    }
}
