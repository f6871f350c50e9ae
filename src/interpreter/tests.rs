//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use super::*;
use crate::program::{Action, BuiltinFunction, Function};
use std::cell::RefCell;
use std::io::Cursor;

#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
struct TestResult {
    globals: Vec<Value>,
    arrays: Vec<Array>,
    output: String,
    status: i32,
}

struct Test {
    program: Program,
    input: String,
}

impl Test {
    /// A program whose BEGIN block is the given instructions, with three
    /// global scalars and two global arrays available.
    fn begin(instructions: Vec<OpCode>) -> Self {
        Self {
            program: Program {
                nums: Vec::new(),
                strs: Vec::new(),
                regexes: Vec::new(),
                begin: instructions,
                actions: Vec::new(),
                end: Vec::new(),
                functions: Vec::new(),
                scalar_names: ["a", "b", "c"].iter().map(|n| Rc::from(*n)).collect(),
                array_names: ["x", "y"].iter().map(|n| Rc::from(*n)).collect(),
                native_names: Vec::new(),
            },
            input: String::new(),
        }
    }

    fn action(instructions: Vec<OpCode>) -> Self {
        let mut test = Self::begin(Vec::new());
        test.program.actions.push(Action {
            pattern: crate::program::Pattern::All,
            body: Some(instructions),
        });
        test
    }

    fn with_nums(mut self, nums: Vec<f64>) -> Self {
        self.program.nums = nums;
        self
    }

    fn with_strs(mut self, strs: Vec<&str>) -> Self {
        self.program.strs = strs.into_iter().map(Rc::from).collect();
        self
    }

    fn with_function(mut self, function: Function) -> Self {
        self.program.functions.push(function);
        self
    }

    fn with_input(mut self, input: &str) -> Self {
        self.input = input.to_string();
        self
    }

    fn run(self) -> Result<TestResult, String> {
        let output = SharedBuffer::default();
        let config = Config {
            stdin: Some(Box::new(Cursor::new(self.input))),
            output: Some(Box::new(output.clone())),
            error: Some(Box::new(std::io::sink())),
            ..Default::default()
        };
        let mut interpreter = Interpreter::new(&self.program, config)?;
        let status = interpreter.run()?;
        let output_bytes = output.0.borrow().clone();
        Ok(TestResult {
            globals: interpreter.globals,
            arrays: interpreter.arrays,
            output: String::from_utf8(output_bytes).expect("invalid utf-8 output"),
            status,
        })
    }

    fn run_correct(self) -> TestResult {
        self.run().expect("execution generated an error")
    }
}

#[test]
fn push_constant_and_assign_global() {
    let result = Test::begin(vec![OpCode::Num(0), OpCode::AssignGlobal(0)])
        .with_nums(vec![2.5])
        .run_correct();
    assert_eq!(result.globals[0], Value::Num(2.5));
}

#[test]
fn arithmetic_operations() {
    let result = Test::begin(vec![
        OpCode::Num(0),
        OpCode::Num(1),
        OpCode::Add,
        OpCode::AssignGlobal(0),
        OpCode::Num(0),
        OpCode::Num(1),
        OpCode::Subtract,
        OpCode::AssignGlobal(1),
        OpCode::Num(0),
        OpCode::Num(1),
        OpCode::Power,
        OpCode::AssignGlobal(2),
    ])
    .with_nums(vec![7.0, 2.0])
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(9.0));
    assert_eq!(result.globals[1], Value::Num(5.0));
    assert_eq!(result.globals[2], Value::Num(49.0));
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let error = Test::begin(vec![OpCode::Num(0), OpCode::Num(1), OpCode::Divide])
        .with_nums(vec![5.0, 0.0])
        .run()
        .unwrap_err();
    assert_eq!(error, "division by zero");
}

#[test]
fn modulo_by_zero_is_a_runtime_error() {
    let error = Test::begin(vec![OpCode::Num(0), OpCode::Num(1), OpCode::Modulo])
        .with_nums(vec![5.0, 0.0])
        .run()
        .unwrap_err();
    assert_eq!(error, "division by zero in %");
}

#[test]
fn string_concatenation() {
    let result = Test::begin(vec![
        OpCode::Str(0),
        OpCode::Num(0),
        OpCode::Concat,
        OpCode::AssignGlobal(0),
    ])
    .with_nums(vec![42.0])
    .with_strs(vec!["value: "])
    .run_correct();
    assert_eq!(result.globals[0], Value::from("value: 42"));
}

#[test]
fn comparisons_are_numeric_or_lexicographic() {
    let result = Test::begin(vec![
        // 9 < 10 numerically
        OpCode::Num(0),
        OpCode::Num(1),
        OpCode::Less,
        OpCode::AssignGlobal(0),
        // "9" > "10" lexicographically
        OpCode::Str(0),
        OpCode::Str(1),
        OpCode::Greater,
        OpCode::AssignGlobal(1),
    ])
    .with_nums(vec![9.0, 10.0])
    .with_strs(vec!["9", "10"])
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(1.0));
    assert_eq!(result.globals[1], Value::Num(1.0));
}

#[test]
fn fused_comparison_jump() {
    // a = 9 < 10 ? 1 : 2, compiled with JumpGreaterOrEqual
    let result = Test::begin(vec![
        OpCode::Num(0),
        OpCode::Num(1),
        OpCode::JumpGreaterOrEqual(2),
        OpCode::Num(2),
        OpCode::Jump(1),
        OpCode::Num(3),
        OpCode::AssignGlobal(0),
    ])
    .with_nums(vec![9.0, 10.0, 1.0, 2.0])
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(1.0));
}

#[test]
fn stack_manipulation() {
    let result = Test::begin(vec![
        OpCode::Num(0),
        OpCode::Num(1),
        OpCode::Num(2),
        OpCode::Rote,
        OpCode::AssignGlobal(0),
        OpCode::Swap,
        OpCode::AssignGlobal(1),
        OpCode::Dup,
        OpCode::Drop,
        OpCode::AssignGlobal(2),
    ])
    .with_nums(vec![1.0, 2.0, 3.0])
    .run_correct();
    // [1 2 3] -> Rote -> [2 3 1]
    assert_eq!(result.globals[0], Value::Num(1.0));
    assert_eq!(result.globals[1], Value::Num(2.0));
    assert_eq!(result.globals[2], Value::Num(3.0));
}

#[test]
fn increment_global() {
    let result = Test::begin(vec![
        OpCode::IncrGlobal(1, 0),
        OpCode::IncrGlobal(1, 0),
        OpCode::IncrGlobal(-1, 1),
    ])
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(2.0));
    assert_eq!(result.globals[1], Value::Num(-1.0));
}

#[test]
fn array_assign_in_and_delete() {
    let result = Test::begin(vec![
        OpCode::Num(0),
        OpCode::Str(0),
        OpCode::AssignArrayGlobal(0),
        OpCode::Str(0),
        OpCode::InGlobal(0),
        OpCode::AssignGlobal(0),
        OpCode::Str(1),
        OpCode::InGlobal(0),
        OpCode::AssignGlobal(1),
        OpCode::Str(0),
        OpCode::Delete(ArrayOperand {
            scope: ArrayScope::Global,
            index: 0,
        }),
        OpCode::Str(0),
        OpCode::InGlobal(0),
        OpCode::AssignGlobal(2),
    ])
    .with_nums(vec![1.0])
    .with_strs(vec!["k", "missing"])
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(1.0));
    assert_eq!(result.globals[1], Value::Num(0.0));
    assert_eq!(result.globals[2], Value::Num(0.0));
}

#[test]
fn reading_an_array_element_materializes_it() {
    let result = Test::begin(vec![
        OpCode::Str(0),
        OpCode::ArrayGlobal(0),
        OpCode::Drop,
        OpCode::Str(0),
        OpCode::InGlobal(0),
        OpCode::AssignGlobal(0),
    ])
    .with_strs(vec!["k"])
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(1.0));
    assert_eq!(result.arrays[0].len(), 1);
}

#[test]
fn multi_index_joins_with_subsep() {
    let result = Test::begin(vec![
        OpCode::Str(0),
        OpCode::Str(1),
        OpCode::MultiIndex(2),
        OpCode::AssignGlobal(0),
    ])
    .with_strs(vec!["i", "j"])
    .run_correct();
    assert_eq!(result.globals[0], Value::from("i\x1cj"));
}

#[test]
fn for_in_iterates_a_snapshot() {
    // every key deletes "k1"; both snapshot keys are still visited
    let result = Test::begin(vec![
        OpCode::Num(0),
        OpCode::Str(0),
        OpCode::AssignArrayGlobal(0),
        OpCode::Num(0),
        OpCode::Str(1),
        OpCode::AssignArrayGlobal(0),
        OpCode::ForInGlobal {
            var: 1,
            array: ArrayOperand {
                scope: ArrayScope::Global,
                index: 0,
            },
            offset: 3,
        },
        OpCode::Str(0),
        OpCode::Delete(ArrayOperand {
            scope: ArrayScope::Global,
            index: 0,
        }),
        OpCode::IncrGlobal(1, 0),
    ])
    .with_nums(vec![1.0])
    .with_strs(vec!["k1", "k2"])
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(2.0));
}

#[test]
fn break_for_in_leaves_the_loop() {
    let result = Test::begin(vec![
        OpCode::Num(0),
        OpCode::Str(0),
        OpCode::AssignArrayGlobal(0),
        OpCode::Num(0),
        OpCode::Str(1),
        OpCode::AssignArrayGlobal(0),
        OpCode::ForInGlobal {
            var: 1,
            array: ArrayOperand {
                scope: ArrayScope::Global,
                index: 0,
            },
            offset: 2,
        },
        OpCode::IncrGlobal(1, 0),
        OpCode::BreakForIn,
    ])
    .with_nums(vec![1.0])
    .with_strs(vec!["k1", "k2"])
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(1.0));
}

#[test]
fn call_user_function() {
    let result = Test::begin(vec![
        OpCode::Num(0),
        OpCode::Num(1),
        OpCode::CallUser {
            function: 0,
            array_args: 0,
        },
        OpCode::AssignGlobal(0),
    ])
    .with_nums(vec![2.0, 3.0])
    .with_function(Function {
        name: Rc::from("add"),
        params: vec![Rc::from("lhs"), Rc::from("rhs")],
        is_array: vec![false, false],
        scalar_params: 2,
        array_params: 0,
        body: vec![OpCode::Local(0), OpCode::Local(1), OpCode::Add, OpCode::Return],
    })
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(5.0));
}

#[test]
fn function_without_return_yields_null() {
    let result = Test::begin(vec![
        OpCode::CallUser {
            function: 0,
            array_args: 0,
        },
        OpCode::AssignGlobal(0),
    ])
    .with_function(Function {
        name: Rc::from("noop"),
        params: Vec::new(),
        is_array: Vec::new(),
        scalar_params: 0,
        array_params: 0,
        body: Vec::new(),
    })
    .run_correct();
    assert_eq!(result.globals[0], Value::Null);
}

#[test]
fn array_arguments_share_storage_with_the_caller() {
    let result = Test::begin(vec![
        OpCode::ArrayArgGlobal(0),
        OpCode::CallUser {
            function: 0,
            array_args: 1,
        },
        OpCode::Drop,
        OpCode::Str(0),
        OpCode::InGlobal(0),
        OpCode::AssignGlobal(0),
    ])
    .with_nums(vec![1.0])
    .with_strs(vec!["k"])
    .with_function(Function {
        name: Rc::from("fill"),
        params: vec![Rc::from("arr")],
        is_array: vec![true],
        scalar_params: 0,
        array_params: 1,
        body: vec![
            OpCode::Num(0),
            OpCode::Str(0),
            OpCode::AssignArrayLocal(0),
            OpCode::Nulls(1),
            OpCode::Return,
        ],
    })
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(1.0));
}

#[test]
fn getline_reads_the_next_record() {
    let result = Test::begin(vec![
        OpCode::Getline(InputSource::Main),
        OpCode::Drop,
        OpCode::FieldNum(0),
        OpCode::AssignGlobal(0),
        OpCode::Special(SpecialVar::Nr),
        OpCode::AssignGlobal(1),
        OpCode::GetlineGlobal(InputSource::Main, 2),
        OpCode::Drop,
    ])
    .with_input("first\nsecond\n")
    .run_correct();
    assert_eq!(result.globals[0], Value::numstr("first"));
    assert_eq!(result.globals[1], Value::Num(1.0));
    assert_eq!(result.globals[2], Value::numstr("second"));
}

#[test]
fn getline_returns_zero_at_eof() {
    let result = Test::begin(vec![
        OpCode::Getline(InputSource::Main),
        OpCode::AssignGlobal(0),
    ])
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(0.0));
}

#[test]
fn getline_from_a_missing_file_returns_minus_one() {
    let result = Test::begin(vec![
        OpCode::Str(0),
        OpCode::GetlineGlobal(InputSource::File, 0),
        OpCode::AssignGlobal(1),
    ])
    .with_strs(vec!["/definitely/not/a/real/file"])
    .run_correct();
    assert_eq!(result.globals[1], Value::Num(-1.0));
}

#[test]
fn print_writes_ofs_and_ors() {
    let output = Test::begin(vec![
        OpCode::Str(0),
        OpCode::Num(0),
        OpCode::Print(2, OutputRedirect::None),
    ])
    .with_nums(vec![2.0])
    .with_strs(vec!["a"])
    .run_correct()
    .output;
    assert_eq!(output, "a 2\n");
}

#[test]
fn printf_formats_its_arguments() {
    let output = Test::begin(vec![
        OpCode::Str(0),
        OpCode::Str(1),
        OpCode::Num(0),
        OpCode::Printf(3, OutputRedirect::None),
    ])
    .with_nums(vec![3.0])
    .with_strs(vec!["%s=%05.1f|", "pi"])
    .run_correct()
    .output;
    assert_eq!(output, "pi=003.0|");
}

#[test]
fn exit_status_is_reported() {
    let result = Test::begin(vec![OpCode::Num(0), OpCode::ExitStatus])
        .with_nums(vec![3.0])
        .run_correct();
    assert_eq!(result.status, 3);
}

#[test]
fn exit_in_begin_skips_the_record_loop_but_runs_end() {
    let mut test = Test::begin(vec![OpCode::Exit]).with_input("a\nb\n");
    test.program.actions.push(Action {
        pattern: crate::program::Pattern::All,
        body: None,
    });
    test.program.end = vec![OpCode::Str(0), OpCode::Print(1, OutputRedirect::None)];
    test.program.strs = vec![Rc::from("end")];
    let result = test.run_correct();
    assert_eq!(result.output, "end\n");
}

#[test]
fn default_action_prints_the_record() {
    let mut test = Test::begin(Vec::new()).with_input("a b\nc d\n");
    test.program.actions.push(Action {
        pattern: crate::program::Pattern::All,
        body: None,
    });
    assert_eq!(test.run_correct().output, "a b\nc d\n");
}

#[test]
fn setting_nf_to_zero_clears_the_record() {
    let result = Test::action(vec![
        OpCode::Num(0),
        OpCode::AssignSpecial(SpecialVar::Nf),
        OpCode::FieldNum(0),
        OpCode::AssignGlobal(0),
    ])
    .with_nums(vec![0.0])
    .with_input("a b c\n")
    .run_correct();
    assert_eq!(result.globals[0], Value::from(""));
}

#[test]
fn negative_field_index_is_a_runtime_error() {
    let error = Test::action(vec![OpCode::Num(0), OpCode::Field, OpCode::Drop])
        .with_nums(vec![-1.0])
        .with_input("x\n")
        .run()
        .unwrap_err();
    assert!(error.contains("field index negative"));
}

#[test]
fn special_variable_defaults() {
    let result = Test::begin(vec![
        OpCode::Special(SpecialVar::Subsep),
        OpCode::AssignGlobal(0),
        OpCode::Special(SpecialVar::Convfmt),
        OpCode::AssignGlobal(1),
        OpCode::Special(SpecialVar::Rs),
        OpCode::AssignGlobal(2),
    ])
    .run_correct();
    assert_eq!(result.globals[0], Value::from("\x1c"));
    assert_eq!(result.globals[1], Value::from("%.6g"));
    assert_eq!(result.globals[2], Value::from("\n"));
}

#[test]
fn assigning_fs_takes_effect_on_the_next_record() {
    let mut test = Test::begin(Vec::new()).with_input("a:b\nc:d\n");
    test.program.nums = vec![1.0];
    test.program.strs = vec![Rc::from(":")];
    // NR == 1 { FS = ":" } then print $1 for every record
    test.program.actions.push(Action {
        pattern: crate::program::Pattern::Expr(vec![
            OpCode::Special(SpecialVar::Nr),
            OpCode::Num(0),
            OpCode::Equals,
        ]),
        body: Some(vec![OpCode::Str(0), OpCode::AssignSpecial(SpecialVar::Fs)]),
    });
    test.program.actions.push(Action {
        pattern: crate::program::Pattern::All,
        body: Some(vec![OpCode::FieldNum(1), OpCode::Print(1, OutputRedirect::None)]),
    });
    // the first record was read before FS changed
    assert_eq!(test.run_correct().output, "a:b\nc\n");
}

#[test]
fn srand_returns_the_previous_seed() {
    let result = Test::begin(vec![
        OpCode::Num(0),
        OpCode::CallBuiltin {
            function: BuiltinFunction::Srand,
            argc: 1,
        },
        OpCode::Drop,
        OpCode::Num(1),
        OpCode::CallBuiltin {
            function: BuiltinFunction::Srand,
            argc: 1,
        },
        OpCode::AssignGlobal(0),
    ])
    .with_nums(vec![5.0, 7.0])
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(5.0));
}

#[test]
fn match_sets_rstart_and_rlength() {
    let result = Test::begin(vec![
        OpCode::Str(0),
        OpCode::Str(1),
        OpCode::CallBuiltin {
            function: BuiltinFunction::Match,
            argc: 2,
        },
        OpCode::AssignGlobal(0),
        OpCode::Special(SpecialVar::Rstart),
        OpCode::AssignGlobal(1),
        OpCode::Special(SpecialVar::Rlength),
        OpCode::AssignGlobal(2),
    ])
    .with_strs(vec!["hello there", "l+o"])
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(3.0));
    assert_eq!(result.globals[1], Value::Num(3.0));
    assert_eq!(result.globals[2], Value::Num(3.0));
}

#[test]
fn failed_match_resets_rstart_and_rlength() {
    let result = Test::begin(vec![
        OpCode::Str(0),
        OpCode::Str(1),
        OpCode::CallBuiltin {
            function: BuiltinFunction::Match,
            argc: 2,
        },
        OpCode::Drop,
        OpCode::Special(SpecialVar::Rstart),
        OpCode::AssignGlobal(0),
        OpCode::Special(SpecialVar::Rlength),
        OpCode::AssignGlobal(1),
    ])
    .with_strs(vec!["hello", "z"])
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(0.0));
    assert_eq!(result.globals[1], Value::Num(-1.0));
}

#[test]
fn invalid_runtime_regex_is_a_runtime_error() {
    let error = Test::begin(vec![
        OpCode::Str(0),
        OpCode::Str(1),
        OpCode::Match,
        OpCode::Drop,
    ])
    .with_strs(vec!["x", "["])
    .run()
    .unwrap_err();
    assert!(error.contains("invalid regex"));
}

#[test]
fn split_with_separator() {
    let result = Test::begin(vec![
        OpCode::Str(0),
        OpCode::Str(1),
        OpCode::CallSplitSepGlobal(0),
        OpCode::AssignGlobal(0),
        OpCode::Str(2),
        OpCode::ArrayGlobal(0),
        OpCode::AssignGlobal(1),
    ])
    .with_strs(vec!["a:b:c", ":", "2"])
    .run_correct();
    assert_eq!(result.globals[0], Value::Num(3.0));
    assert_eq!(result.globals[1], Value::numstr("b"));
}

#[test]
fn sub_on_a_global() {
    let result = Test::begin(vec![
        OpCode::Str(0),
        OpCode::AssignGlobal(0),
        OpCode::Str(1),
        OpCode::Str(2),
        OpCode::CallSub(SubTarget::Global(0)),
        OpCode::AssignGlobal(1),
    ])
    .with_strs(vec!["hello", "l+", "&&"])
    .run_correct();
    assert_eq!(result.globals[0], Value::from("hellllo"));
    assert_eq!(result.globals[1], Value::Num(1.0));
}

#[test]
fn gsub_on_the_record_rebuilds_fields() {
    let result = Test::action(vec![
        OpCode::Str(0),
        OpCode::Str(1),
        OpCode::CallGsub(SubTarget::Record),
        OpCode::Drop,
        OpCode::FieldNum(2),
        OpCode::AssignGlobal(0),
    ])
    .with_strs(vec!["b", "X"])
    .with_input("a b c\n")
    .run_correct();
    assert_eq!(result.globals[0], Value::numstr("X"));
}

#[test]
fn call_depth_is_bounded() {
    // f() { return f() }
    let test = Test::begin(vec![
        OpCode::CallUser {
            function: 0,
            array_args: 0,
        },
        OpCode::Drop,
    ])
    .with_function(Function {
        name: Rc::from("f"),
        params: Vec::new(),
        is_array: Vec::new(),
        scalar_params: 0,
        array_params: 0,
        body: vec![
            OpCode::CallUser {
                function: 0,
                array_args: 0,
            },
            OpCode::Return,
        ],
    });
    assert_eq!(test.run().unwrap_err(), "call depth exceeded");
}
