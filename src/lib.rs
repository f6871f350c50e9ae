//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! The core of an awk implementation: a bytecode compiler over a resolved
//! AST and a stack-based virtual machine that executes the compiled program
//! against a stream of input records.
//!
//! The lexer, parser, and command-line front-end are external collaborators;
//! their contract is the [`ast`] module. [`compiler::compile_program`] turns
//! an AST into a [`program::Program`], and [`interpreter::interpret`] runs it
//! under an [`interpreter::Config`].

pub mod ast;
pub mod compiler;
pub mod interpreter;
pub mod program;
pub mod regex;

pub use compiler::compile_program;
pub use interpreter::{interpret, Config};
