//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! End-to-end tests: build a resolved AST the way the parser would, compile
//! it, and run it against literal input, checking the produced output.

use std::cell::RefCell;
use std::io::{Cursor, Write};
use std::rc::Rc;

use awk_core::ast::{
    ArrayRef, AugOp, BinaryOp, Builtin, CallArg, Expr, Function, GetlineSource, GetlineTarget,
    LValue, Pattern, Program, Rule, ScalarRef, SpecialVar, Stmt,
};
use awk_core::program::OpCode;
use awk_core::{compile_program, interpret, Config};

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

fn num(value: f64) -> Expr {
    Expr::Num(value)
}

fn str_lit(value: &str) -> Expr {
    Expr::Str(Rc::from(value))
}

fn global(index: u32) -> Expr {
    Expr::Var(ScalarRef::global(index))
}

fn special(var: SpecialVar) -> Expr {
    Expr::Var(ScalarRef::special(var))
}

fn field(index: Expr) -> Expr {
    Expr::Field(Box::new(index))
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn concat(left: Expr, right: Expr) -> Expr {
    binary(BinaryOp::Concat, left, right)
}

fn assign(target: LValue, value: Expr) -> Stmt {
    Stmt::Expr(Expr::Assign {
        target,
        value: Box::new(value),
    })
}

fn print(args: Vec<Expr>) -> Stmt {
    Stmt::Print {
        args,
        redirect: None,
    }
}

fn rule(pattern: Pattern, action: Vec<Stmt>) -> Rule {
    Rule {
        pattern,
        action: Some(action),
    }
}

fn names(names: &[&str]) -> Vec<Rc<str>> {
    names.iter().map(|name| Rc::from(*name)).collect()
}

fn run_config(program: &Program, input: &str, mut config: Config) -> Result<(String, i32), String> {
    let compiled = compile_program(program)?;
    let output = SharedBuffer::default();
    config.stdin = Some(Box::new(Cursor::new(input.to_string())));
    config.output = Some(Box::new(output.clone()));
    config.error = Some(Box::new(std::io::sink()));
    let status = interpret(&compiled, config)?;
    let output = String::from_utf8(output.0.borrow().clone()).expect("invalid utf-8 output");
    Ok((output, status))
}

fn run(program: &Program, input: &str) -> String {
    run_config(program, input, Config::default())
        .expect("execution generated an error")
        .0
}

// BEGIN { for (i = 1; i <= 3; i++) s = s " " i; print s }
#[test]
fn begin_loop_builds_a_string() {
    let program = Program {
        scalar_names: names(&["i", "s"]),
        begin: vec![
            Stmt::For {
                init: Some(Box::new(assign(LValue::Var(ScalarRef::global(0)), num(1.0)))),
                cond: Some(binary(BinaryOp::LessOrEqual, global(0), num(3.0))),
                post: Some(Box::new(Stmt::Expr(Expr::IncrDecr {
                    target: LValue::Var(ScalarRef::global(0)),
                    decrement: false,
                    post: true,
                }))),
                body: vec![assign(
                    LValue::Var(ScalarRef::global(1)),
                    concat(concat(global(1), str_lit(" ")), global(0)),
                )],
            },
            print(vec![global(1)]),
        ],
        ..Default::default()
    };
    assert_eq!(run(&program, ""), " 1 2 3\n");
}

// { print NF, $1, $NF }
#[test]
fn fields_and_nf() {
    let program = Program {
        rules: vec![rule(
            Pattern::Always,
            vec![print(vec![
                special(SpecialVar::Nf),
                field(num(1.0)),
                field(special(SpecialVar::Nf)),
            ])],
        )],
        ..Default::default()
    };
    assert_eq!(run(&program, "a b c\nd e\n"), "3 a c\n2 d e\n");
}

// { a[$1]++ } END { for (k in a) print k, a[k] }
#[test]
fn count_occurrences_with_an_array() {
    let program = Program {
        scalar_names: names(&["k"]),
        array_names: names(&["a"]),
        rules: vec![rule(
            Pattern::Always,
            vec![Stmt::Expr(Expr::IncrDecr {
                target: LValue::ArrayElement {
                    array: ArrayRef::global(0),
                    index: vec![field(num(1.0))],
                },
                decrement: false,
                post: true,
            })],
        )],
        end: vec![Stmt::ForIn {
            var: ScalarRef::global(0),
            array: ArrayRef::global(0),
            body: vec![print(vec![
                global(0),
                Expr::ArrayElement {
                    array: ArrayRef::global(0),
                    index: vec![global(0)],
                },
            ])],
        }],
        ..Default::default()
    };
    let output = run(&program, "x\ny\nx\n");
    let mut lines: Vec<&str> = output.lines().collect();
    lines.sort_unstable();
    assert_eq!(lines, vec!["x 2", "y 1"]);
}

// BEGIN { FS = ","; OFS = ":" } { $1 = $1; print }
#[test]
fn reassigning_a_field_rejoins_with_ofs() {
    let program = Program {
        begin: vec![
            assign(LValue::Var(ScalarRef::special(SpecialVar::Fs)), str_lit(",")),
            assign(LValue::Var(ScalarRef::special(SpecialVar::Ofs)), str_lit(":")),
        ],
        rules: vec![rule(
            Pattern::Always,
            vec![
                assign(LValue::Field(Box::new(num(1.0))), field(num(1.0))),
                print(vec![]),
            ],
        )],
        ..Default::default()
    };
    assert_eq!(run(&program, "a,b,c\n"), "a:b:c\n");
}

// BEGIN { s = "hello"; sub(/l+/, "&&", s); print s }
#[test]
fn sub_duplicates_the_match() {
    let program = Program {
        scalar_names: names(&["s"]),
        begin: vec![
            assign(LValue::Var(ScalarRef::global(0)), str_lit("hello")),
            Stmt::Expr(Expr::Sub {
                gsub: false,
                pattern: Box::new(Expr::Regex(Rc::from("l+"))),
                replacement: Box::new(str_lit("&&")),
                target: Some(LValue::Var(ScalarRef::global(0))),
            }),
            print(vec![global(0)]),
        ],
        ..Default::default()
    };
    assert_eq!(run(&program, ""), "hellllo\n");
}

// function f(a,   i) { for (i in a) s += a[i]; return s }
// BEGIN { x[1] = 2; x[2] = 3; print f(x) }
#[test]
fn function_sums_an_array_argument() {
    let program = Program {
        scalar_names: names(&["s"]),
        array_names: names(&["x"]),
        begin: vec![
            assign(
                LValue::ArrayElement {
                    array: ArrayRef::global(0),
                    index: vec![num(1.0)],
                },
                num(2.0),
            ),
            assign(
                LValue::ArrayElement {
                    array: ArrayRef::global(0),
                    index: vec![num(2.0)],
                },
                num(3.0),
            ),
            print(vec![Expr::CallUser {
                function: 0,
                args: vec![CallArg::Array(ArrayRef::global(0))],
            }]),
        ],
        functions: vec![Function {
            name: Rc::from("f"),
            params: names(&["a", "i"]),
            is_array: vec![true, false],
            body: vec![
                Stmt::ForIn {
                    var: ScalarRef::local(0),
                    array: ArrayRef::local(0),
                    body: vec![Stmt::Expr(Expr::AugAssign {
                        target: LValue::Var(ScalarRef::global(0)),
                        op: AugOp::Add,
                        value: Box::new(Expr::ArrayElement {
                            array: ArrayRef::local(0),
                            index: vec![Expr::Var(ScalarRef::local(0))],
                        }),
                    })],
                },
                Stmt::Return(Some(global(0))),
            ],
        }],
        ..Default::default()
    };
    assert_eq!(run(&program, ""), "5\n");
}

// NR == 2, NR == 3 { print $1 }
#[test]
fn range_pattern_matches_between_its_endpoints() {
    let program = Program {
        rules: vec![rule(
            Pattern::Range(
                binary(BinaryOp::Equals, special(SpecialVar::Nr), num(2.0)),
                binary(BinaryOp::Equals, special(SpecialVar::Nr), num(3.0)),
            ),
            vec![print(vec![field(num(1.0))])],
        )],
        ..Default::default()
    };
    assert_eq!(run(&program, "a\nb\nc\nd\n"), "b\nc\n");
}

// BEGIN { if (x == 0 && x == "") print "both" }
#[test]
fn uninitialized_compares_equal_to_zero_and_empty() {
    let program = Program {
        scalar_names: names(&["x"]),
        begin: vec![Stmt::If {
            cond: Expr::And {
                left: Box::new(binary(BinaryOp::Equals, global(0), num(0.0))),
                right: Box::new(binary(BinaryOp::Equals, global(0), str_lit(""))),
            },
            body: vec![print(vec![str_lit("both")])],
            else_body: vec![],
        }],
        ..Default::default()
    };
    assert_eq!(run(&program, ""), "both\n");
}

// BEGIN { x = 1 && ""; y = 0 || 2; print x, y }
#[test]
fn short_circuit_operators_produce_booleans() {
    let program = Program {
        scalar_names: names(&["x", "y"]),
        begin: vec![
            assign(
                LValue::Var(ScalarRef::global(0)),
                Expr::And {
                    left: Box::new(num(1.0)),
                    right: Box::new(str_lit("")),
                },
            ),
            assign(
                LValue::Var(ScalarRef::global(1)),
                Expr::Or {
                    left: Box::new(num(0.0)),
                    right: Box::new(num(2.0)),
                },
            ),
            print(vec![global(0), global(1)]),
        ],
        ..Default::default()
    };
    assert_eq!(run(&program, ""), "0 1\n");
}

// fields from input compare numerically, true strings lexicographically
#[test]
fn numeric_strings_from_input_compare_numerically() {
    let program = Program {
        rules: vec![rule(
            Pattern::Expr(binary(BinaryOp::Equals, field(num(1.0)), num(10.0))),
            vec![print(vec![str_lit("num")])],
        )],
        ..Default::default()
    };
    assert_eq!(run(&program, "10\nx\n"), "num\n");
}

// BEGIN { n = split("a:b:c", arr, ":"); s = arr[1]; for (i = 2; i <= n; i++)
//         s = s ":" arr[i]; print s }
#[test]
fn split_then_join_round_trips() {
    let arr = ArrayRef::global(0);
    let program = Program {
        scalar_names: names(&["n", "s", "i"]),
        array_names: names(&["arr"]),
        begin: vec![
            assign(
                LValue::Var(ScalarRef::global(0)),
                Expr::Split {
                    text: Box::new(str_lit("a:b:c")),
                    array: arr,
                    separator: Some(Box::new(str_lit(":"))),
                },
            ),
            assign(
                LValue::Var(ScalarRef::global(1)),
                Expr::ArrayElement {
                    array: arr,
                    index: vec![num(1.0)],
                },
            ),
            Stmt::For {
                init: Some(Box::new(assign(LValue::Var(ScalarRef::global(2)), num(2.0)))),
                cond: Some(binary(BinaryOp::LessOrEqual, global(2), global(0))),
                post: Some(Box::new(Stmt::Expr(Expr::IncrDecr {
                    target: LValue::Var(ScalarRef::global(2)),
                    decrement: false,
                    post: true,
                }))),
                body: vec![assign(
                    LValue::Var(ScalarRef::global(1)),
                    concat(
                        concat(global(1), str_lit(":")),
                        Expr::ArrayElement {
                            array: arr,
                            index: vec![global(2)],
                        },
                    ),
                )],
            },
            print(vec![global(1)]),
        ],
        ..Default::default()
    };
    assert_eq!(run(&program, ""), "a:b:c\n");
}

#[test]
fn exit_reports_its_status() {
    let program = Program {
        begin: vec![Stmt::Exit(Some(num(3.0)))],
        ..Default::default()
    };
    let (_, status) = run_config(&program, "", Config::default()).unwrap();
    assert_eq!(status, 3);
}

// { print; nextfile }
#[test]
fn nextfile_abandons_the_current_input() {
    let program = Program {
        rules: vec![rule(Pattern::Always, vec![print(vec![]), Stmt::NextFile])],
        ..Default::default()
    };
    assert_eq!(run(&program, "a\nb\n"), "a\n");
}

#[test]
fn recursion_at_the_depth_limit_succeeds_and_beyond_fails() {
    // function f(n) { if (n > 1) return f(n - 1); return 1 }
    let recurse = |depth: f64| Program {
        begin: vec![print(vec![Expr::CallUser {
            function: 0,
            args: vec![CallArg::Scalar(num(depth))],
        }])],
        functions: vec![Function {
            name: Rc::from("f"),
            params: names(&["n"]),
            is_array: vec![false],
            body: vec![
                Stmt::If {
                    cond: binary(BinaryOp::Greater, Expr::Var(ScalarRef::local(0)), num(1.0)),
                    body: vec![Stmt::Return(Some(Expr::CallUser {
                        function: 0,
                        args: vec![CallArg::Scalar(binary(
                            BinaryOp::Subtract,
                            Expr::Var(ScalarRef::local(0)),
                            num(1.0),
                        ))],
                    }))],
                    else_body: vec![],
                },
                Stmt::Return(Some(num(1.0))),
            ],
        }],
        ..Default::default()
    };
    let config = || Config {
        max_call_depth: 10,
        ..Default::default()
    };
    let (output, _) = run_config(&recurse(10.0), "", config()).unwrap();
    assert_eq!(output, "1\n");
    let error = run_config(&recurse(11.0), "", config()).unwrap_err();
    assert_eq!(error, "call depth exceeded");
}

#[test]
fn invalid_regex_literal_is_a_setup_error() {
    let program = Program {
        rules: vec![rule(
            Pattern::Expr(Expr::Regex(Rc::from("["))),
            vec![print(vec![])],
        )],
        ..Default::default()
    };
    assert!(compile_program(&program).is_err());
}

#[test]
fn invalid_runtime_regex_is_a_runtime_error() {
    let program = Program {
        begin: vec![Stmt::If {
            cond: Expr::Match {
                negated: false,
                text: Box::new(str_lit("x")),
                pattern: Box::new(str_lit("[")),
            },
            body: vec![print(vec![])],
            else_body: vec![],
        }],
        ..Default::default()
    };
    let error = run_config(&program, "", Config::default()).unwrap_err();
    assert!(error.contains("invalid regex"));
}

#[test]
fn division_by_zero_message() {
    let program = Program {
        begin: vec![print(vec![binary(BinaryOp::Divide, num(1.0), num(0.0))])],
        ..Default::default()
    };
    let error = run_config(&program, "", Config::default()).unwrap_err();
    assert_eq!(error, "division by zero");
}

#[test]
fn command_line_assignments_are_applied_between_files() {
    let program = Program {
        scalar_names: names(&["x"]),
        rules: vec![rule(Pattern::Always, vec![print(vec![global(0)])])],
        ..Default::default()
    };
    let config = Config {
        args: vec!["x=a\\tb".to_string()],
        ..Default::default()
    };
    let (output, _) = run_config(&program, "line\n", config).unwrap();
    assert_eq!(output, "a\tb\n");
}

#[test]
fn pre_assigned_vars_are_visible_in_begin() {
    let program = Program {
        scalar_names: names(&["y"]),
        begin: vec![print(vec![binary(BinaryOp::Add, global(0), num(1.0))])],
        ..Default::default()
    };
    let config = Config {
        vars: vec!["y".to_string(), "7".to_string()],
        ..Default::default()
    };
    let (output, _) = run_config(&program, "", config).unwrap();
    assert_eq!(output, "8\n");
}

#[test]
fn odd_length_vars_are_a_setup_error() {
    let program = Program::default();
    let compiled = compile_program(&program).unwrap();
    let config = Config {
        vars: vec!["y".to_string()],
        ..Default::default()
    };
    assert!(interpret(&compiled, config).is_err());
}

#[test]
fn paragraph_mode_splits_on_blank_lines() {
    let program = Program {
        begin: vec![assign(
            LValue::Var(ScalarRef::special(SpecialVar::Rs)),
            str_lit(""),
        )],
        rules: vec![rule(
            Pattern::Always,
            vec![print(vec![special(SpecialVar::Nf), field(num(2.0))])],
        )],
        ..Default::default()
    };
    assert_eq!(run(&program, "a b\nc\n\nd\n"), "3 b\n1 \n");
}

#[test]
fn getline_var_from_a_file() {
    let path = std::env::temp_dir().join(format!("awk_core_getline_{}.txt", std::process::id()));
    std::fs::write(&path, "first line\nsecond line\n").unwrap();
    let path_str = path.to_str().unwrap();

    // BEGIN { r = (getline line < path); print r, line }
    let program = Program {
        scalar_names: names(&["r", "line"]),
        begin: vec![
            assign(
                LValue::Var(ScalarRef::global(0)),
                Expr::Getline {
                    source: GetlineSource::File(Box::new(str_lit(path_str))),
                    target: GetlineTarget::Var(ScalarRef::global(1)),
                },
            ),
            print(vec![global(0), global(1)]),
        ],
        ..Default::default()
    };
    let result = run(&program, "");
    std::fs::remove_file(&path).unwrap();
    assert_eq!(result, "1 first line\n");
}

#[test]
fn native_functions_are_called_with_coerced_arguments() {
    use awk_core::interpreter::{NativeFunction, NativeKind, NativeValue};

    let program = Program {
        native_names: names(&["double"]),
        begin: vec![print(vec![Expr::CallNative {
            function: 0,
            args: vec![num(21.0)],
        }])],
        ..Default::default()
    };
    let config = Config {
        funcs: vec![NativeFunction::new(
            "double",
            vec![NativeKind::Float],
            |args| match &args[0] {
                NativeValue::Float(value) => Ok(NativeValue::Float(value * 2.0)),
                _ => Err("unexpected argument kind".to_string()),
            },
        )],
        ..Default::default()
    };
    let (output, _) = run_config(&program, "", config).unwrap();
    assert_eq!(output, "42\n");
}

#[test]
fn missing_native_function_is_a_setup_error() {
    let program = Program {
        native_names: names(&["absent"]),
        begin: vec![print(vec![Expr::CallNative {
            function: 0,
            args: vec![],
        }])],
        ..Default::default()
    };
    let error = run_config(&program, "", Config::default()).unwrap_err();
    assert!(error.contains("native function not defined"));
}

fn mnemonic(text: &str) -> String {
    text.split(|c: char| c == '(' || c == ' ' || c == '{')
        .next()
        .unwrap()
        .to_string()
}

/// Compiling then disassembling yields one line per instruction whose
/// mnemonics match the code blocks exactly.
#[test]
fn disassembly_mnemonics_round_trip() {
    let program = Program {
        scalar_names: names(&["i", "s"]),
        array_names: names(&["seen"]),
        begin: vec![Stmt::For {
            init: Some(Box::new(assign(LValue::Var(ScalarRef::global(0)), num(1.0)))),
            cond: Some(binary(BinaryOp::LessOrEqual, global(0), num(3.0))),
            post: Some(Box::new(Stmt::Expr(Expr::IncrDecr {
                target: LValue::Var(ScalarRef::global(0)),
                decrement: false,
                post: true,
            }))),
            body: vec![assign(
                LValue::ArrayElement {
                    array: ArrayRef::global(0),
                    index: vec![global(0)],
                },
                global(0),
            )],
        }],
        rules: vec![rule(
            Pattern::Expr(binary(BinaryOp::Greater, special(SpecialVar::Nf), num(0.0))),
            vec![print(vec![field(num(1.0)), Expr::CallBuiltin {
                function: Builtin::Length,
                args: vec![],
            }])],
        )],
        ..Default::default()
    };
    let compiled = compile_program(&program).unwrap();

    let mut listing = Vec::new();
    compiled.disassemble(&mut listing).unwrap();
    let listing = String::from_utf8(listing).unwrap();
    let disassembled: Vec<String> = listing
        .lines()
        .filter(|line| !line.trim_start().starts_with("//") && !line.is_empty())
        .map(|line| {
            let (offset, rest) = line.split_at(4);
            assert!(u32::from_str_radix(offset, 16).is_ok(), "bad offset: {}", line);
            mnemonic(rest.trim_start())
        })
        .collect();

    let mut expected = Vec::new();
    let mut collect = |block: &[OpCode]| {
        for instruction in block {
            expected.push(mnemonic(&format!("{:?}", instruction)));
        }
    };
    collect(&compiled.begin);
    for action in &compiled.actions {
        match &action.pattern {
            awk_core::program::Pattern::All => {}
            awk_core::program::Pattern::Expr(block) => collect(block),
            awk_core::program::Pattern::Range { start, end } => {
                collect(start);
                collect(end);
            }
        }
        if let Some(body) = &action.body {
            collect(body);
        }
    }
    collect(&compiled.end);
    for function in &compiled.functions {
        collect(&function.body);
    }

    assert_eq!(disassembled, expected);
}
