//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! Built-in function semantics: the generic `CallBuiltin` dispatch plus the
//! specialized implementations behind `split`, `sprintf`, `sub`/`gsub`,
//! `print` and `printf`.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::ffi::CString;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::format::apply_format;
use super::io::run_system;
use super::record::{split_record, FieldSeparator};
use super::value::Value;
use super::Interpreter;
use crate::program::{BuiltinFunction, OutputRedirect, SubTarget};
use crate::regex::Regex;

impl Interpreter<'_> {
    pub(crate) fn call_builtin(
        &mut self,
        function: BuiltinFunction,
        argc: u16,
    ) -> Result<(), String> {
        match function {
            BuiltinFunction::Atan2 => {
                let x = self.pop().num();
                let y = self.pop().num();
                self.push(Value::Num(y.atan2(x)));
            }
            BuiltinFunction::Cos => {
                let value = self.pop().num();
                self.push(Value::Num(value.cos()));
            }
            BuiltinFunction::Sin => {
                let value = self.pop().num();
                self.push(Value::Num(value.sin()));
            }
            BuiltinFunction::Exp => {
                let value = self.pop().num();
                self.push(Value::Num(value.exp()));
            }
            BuiltinFunction::Log => {
                let value = self.pop().num();
                self.push(Value::Num(value.ln()));
            }
            BuiltinFunction::Sqrt => {
                let value = self.pop().num();
                self.push(Value::Num(value.sqrt()));
            }
            BuiltinFunction::Int => {
                let value = self.pop().num();
                self.push(Value::Num(value.trunc()));
            }
            BuiltinFunction::Rand => {
                let value: f64 = self.rng.gen();
                self.push(Value::Num(value));
            }
            BuiltinFunction::Srand => {
                let previous_seed = self.rand_seed;
                let seed = if argc == 1 {
                    self.pop().num()
                } else {
                    SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|elapsed| elapsed.as_secs() as f64)
                        .unwrap_or(0.0)
                };
                self.rand_seed = seed;
                self.rng = SmallRng::seed_from_u64(seed.to_bits());
                self.push(Value::Num(previous_seed));
            }
            BuiltinFunction::Index => {
                let needle = self.pop_str()?;
                let haystack = self.pop_str()?;
                let position = match haystack.find(needle.as_ref()) {
                    Some(byte_offset) if self.bytes => byte_offset + 1,
                    Some(byte_offset) => haystack[..byte_offset].chars().count() + 1,
                    None => 0,
                };
                self.push(Value::Num(position as f64));
            }
            BuiltinFunction::Length => {
                let value = self.pop_str()?;
                let length = if self.bytes {
                    value.len()
                } else {
                    value.chars().count()
                };
                self.push(Value::Num(length as f64));
            }
            BuiltinFunction::Match => {
                let pattern = self.pop_str()?;
                let subject = self.pop_str()?;
                let re = self.cached_regex(&pattern)?;
                let cstring = CString::new(subject.as_bytes())
                    .map_err(|_| "string contains a NUL byte".to_string())?;
                match re.match_locations(cstring).next() {
                    Some(m) => {
                        let start = if self.bytes {
                            m.start + 1
                        } else {
                            subject[..m.start].chars().count() + 1
                        };
                        let length = if self.bytes {
                            m.end - m.start
                        } else {
                            subject[m.start..m.end].chars().count()
                        };
                        self.env.rstart = start as f64;
                        self.env.rlength = length as f64;
                        self.push(Value::Num(start as f64));
                    }
                    None => {
                        self.env.rstart = 0.0;
                        self.env.rlength = -1.0;
                        self.push(Value::Num(0.0));
                    }
                }
            }
            BuiltinFunction::Substr => {
                let length = if argc == 3 {
                    Some(self.pop().num())
                } else {
                    None
                };
                let start = self.pop().num();
                let subject = self.pop_str()?;
                let result = substr(&subject, start, length, self.bytes);
                self.push(result);
            }
            BuiltinFunction::ToLower => {
                let value = self.pop_str()?;
                self.push(value.to_lowercase());
            }
            BuiltinFunction::ToUpper => {
                let value = self.pop_str()?;
                self.push(value.to_uppercase());
            }
            BuiltinFunction::Close => {
                let name = self.pop_str()?;
                let mut found = self.read_files.close(&name);
                found |= self.read_pipes.close(&name);
                found |= self.write_files.close(&name);
                found |= self.write_pipes.close(&name);
                self.push(Value::Num(if found { 0.0 } else { -1.0 }));
            }
            BuiltinFunction::Fflush => {
                if argc == 0 {
                    self.flush_outputs()?;
                    let mut success = self.write_files.flush_all();
                    success &= self.write_pipes.flush_all();
                    self.push(Value::Num(if success { 0.0 } else { -1.0 }));
                } else {
                    let name = self.pop_str()?;
                    let mut found = self.write_files.flush_file(&name);
                    found |= self.write_pipes.flush_file(&name);
                    self.push(Value::Num(if found { 0.0 } else { -1.0 }));
                }
            }
            BuiltinFunction::System => {
                if self.no_exec {
                    return Err("can't call system() due to NoExec".to_string());
                }
                let command = self.pop_str()?;
                self.flush_outputs()?;
                let status = run_system(&self.shell, &command)?;
                self.push(Value::Num(status as f64));
            }
        }
        Ok(())
    }

    /// `split`: reset the array, store fields at 1-based indices, return the
    /// field count. A missing separator means the current `FS`.
    pub(crate) fn split_into(
        &mut self,
        array: usize,
        separator: Option<FieldSeparator>,
        text: &str,
    ) -> Result<usize, String> {
        let target = &mut self.arrays[array];
        target.clear();
        let separator = separator.as_ref().unwrap_or(&self.env.fs);
        split_record(text, separator, |i, field| {
            target.set(Rc::from((i + 1).to_string()), Value::numstr(field));
        })?;
        Ok(self.arrays[array].len())
    }

    pub(crate) fn sprintf(&mut self, argc: usize) -> Result<String, String> {
        let mut values = Vec::with_capacity(argc);
        for _ in 0..argc {
            values.push(self.pop());
        }
        values.reverse();
        let convfmt = self.env.convfmt.clone();
        let format = values[0].to_str(&convfmt)?;
        let segments = self.cached_format(format)?;
        apply_format(&segments, &values[1..], &convfmt, self.bytes)
    }

    /// `sub`/`gsub`: substitute in the target lvalue and push the number of
    /// substitutions. The target is written back only when something
    /// actually matched.
    pub(crate) fn call_sub(&mut self, target: SubTarget, all: bool) -> Result<(), String> {
        let replacement = self.pop_str()?;
        let pattern = self.pop_str()?;
        let re = self.cached_regex(&pattern)?;
        let convfmt = self.env.convfmt.clone();
        let count = match target {
            SubTarget::Record => {
                let current = self.record.get_line().to_str(&convfmt)?;
                let (result, count) = substitute(&re, &replacement, &current, all)?;
                if count > 0 {
                    self.set_field(0, result.into())?;
                }
                count
            }
            SubTarget::Field => {
                let index = self.pop_index();
                let current = self.get_field(index)?.to_str(&convfmt)?;
                let (result, count) = substitute(&re, &replacement, &current, all)?;
                if count > 0 {
                    self.set_field(index, result.into())?;
                }
                count
            }
            SubTarget::Global(id) => {
                let current = self.globals[id as usize].to_str(&convfmt)?;
                let (result, count) = substitute(&re, &replacement, &current, all)?;
                if count > 0 {
                    self.globals[id as usize] = Value::from(result);
                }
                count
            }
            SubTarget::Local(id) => {
                let current = self.local(id).to_str(&convfmt)?;
                let (result, count) = substitute(&re, &replacement, &current, all)?;
                if count > 0 {
                    self.set_local(id, Value::from(result));
                }
                count
            }
            SubTarget::Special(var) => {
                let current = self.get_special(var)?.to_str(&convfmt)?;
                let (result, count) = substitute(&re, &replacement, &current, all)?;
                if count > 0 {
                    self.set_special(var, Value::from(result))?;
                }
                count
            }
            SubTarget::ArrayGlobal(id) => {
                let key = self.pop_str()?;
                let current = self.arrays[id as usize].index(key.clone()).to_str(&convfmt)?;
                let (result, count) = substitute(&re, &replacement, &current, all)?;
                if count > 0 {
                    self.arrays[id as usize].set(key, Value::from(result));
                }
                count
            }
            SubTarget::ArrayLocal(id) => {
                let key = self.pop_str()?;
                let array = self.current_arrays[id as usize];
                let current = self.arrays[array].index(key.clone()).to_str(&convfmt)?;
                let (result, count) = substitute(&re, &replacement, &current, all)?;
                if count > 0 {
                    self.arrays[array].set(key, Value::from(result));
                }
                count
            }
        };
        self.push(Value::Num(count as f64));
        Ok(())
    }

    pub(crate) fn do_print(
        &mut self,
        argc: usize,
        redirect: OutputRedirect,
    ) -> Result<(), String> {
        let destination = match redirect {
            OutputRedirect::None => None,
            _ => Some(self.pop_str()?),
        };
        let mut values = Vec::with_capacity(argc);
        for _ in 0..argc {
            values.push(self.pop());
        }
        values.reverse();
        let ofmt = self.env.ofmt.clone();
        let mut text = String::new();
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                text.push_str(&self.env.ofs);
            }
            text.push_str(&value.to_str(&ofmt)?);
        }
        text.push_str(&self.env.ors);
        self.write_redirected(&text, redirect, destination)
    }

    pub(crate) fn do_printf(
        &mut self,
        argc: usize,
        redirect: OutputRedirect,
    ) -> Result<(), String> {
        let destination = match redirect {
            OutputRedirect::None => None,
            _ => Some(self.pop_str()?),
        };
        let text = self.sprintf(argc)?;
        self.write_redirected(&text, redirect, destination)
    }

    fn write_redirected(
        &mut self,
        text: &str,
        redirect: OutputRedirect,
        destination: Option<Rc<str>>,
    ) -> Result<(), String> {
        match redirect {
            OutputRedirect::None => self.write_output(text),
            OutputRedirect::Truncate | OutputRedirect::Append => {
                if self.no_file_writes {
                    return Err("can't write to file due to NoFileWrites".to_string());
                }
                let name = destination.expect("redirected print without a destination");
                self.write_files
                    .write(name, text, redirect == OutputRedirect::Append)
            }
            OutputRedirect::Pipe => {
                if self.no_exec {
                    return Err("can't write to pipe due to NoExec".to_string());
                }
                let name = destination.expect("redirected print without a destination");
                self.write_pipes.write(name, &self.shell, text)
            }
        }
    }
}

fn substr(subject: &str, start: f64, length: Option<f64>, bytes: bool) -> String {
    let unit_count = if bytes {
        subject.len()
    } else {
        subject.chars().count()
    } as i64;
    let start = start as i64;
    let end = match length {
        Some(length) => start.saturating_add(length as i64),
        None => unit_count + 1,
    };
    let from = start.max(1);
    let to = end.min(unit_count + 1);
    if to <= from {
        return String::new();
    }
    let skip = (from - 1) as usize;
    let take = (to - from) as usize;
    if bytes {
        String::from_utf8_lossy(&subject.as_bytes()[skip..skip + take]).into_owned()
    } else {
        subject.chars().skip(skip).take(take).collect()
    }
}

/// Replace the first (or all) matches of `re` in `text`. In the replacement
/// `&` stands for the matched text, `\&` is a literal ampersand and `\\` a
/// single backslash.
fn substitute(
    re: &Regex,
    replacement: &str,
    text: &str,
    all: bool,
) -> Result<(String, usize), String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut iter = replacement.chars();
    while let Some(c) = iter.next() {
        match c {
            '\\' => match iter.next() {
                Some('&') => current.push('&'),
                Some('\\') => current.push('\\'),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            '&' => parts.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    parts.push(current);

    let subject =
        CString::new(text).map_err(|_| "string contains a NUL byte".to_string())?;
    let mut result = String::with_capacity(text.len());
    let mut last_match_end = 0;
    let mut count = 0;
    for m in re.match_locations(subject) {
        result.push_str(&text[last_match_end..m.start]);
        let matched = &text[m.start..m.end];
        result.push_str(&parts[0]);
        for part in &parts[1..] {
            result.push_str(matched);
            result.push_str(part);
        }
        last_match_end = m.end;
        count += 1;
        if !all {
            break;
        }
    }
    result.push_str(&text[last_match_end..]);
    Ok((result, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regex::regex_from_str;

    fn gsub(pattern: &str, replacement: &str, text: &str) -> (String, usize) {
        let re = regex_from_str(pattern).unwrap();
        substitute(&re, replacement, text, true).unwrap()
    }

    fn sub(pattern: &str, replacement: &str, text: &str) -> (String, usize) {
        let re = regex_from_str(pattern).unwrap();
        substitute(&re, replacement, text, false).unwrap()
    }

    #[test]
    fn sub_replaces_only_the_first_match() {
        assert_eq!(sub("l", "L", "hello"), ("heLlo".to_string(), 1));
    }

    #[test]
    fn gsub_replaces_all_matches() {
        assert_eq!(gsub("l", "L", "hello"), ("heLLo".to_string(), 2));
    }

    #[test]
    fn ampersand_is_the_matched_text() {
        assert_eq!(sub("l+", "&&", "hello"), ("hellllo".to_string(), 1));
    }

    #[test]
    fn escaped_ampersand_is_literal() {
        assert_eq!(sub("l+", "\\&", "hello"), ("he&o".to_string(), 1));
    }

    #[test]
    fn escaped_backslash_in_replacement() {
        assert_eq!(sub("l+", "\\\\", "hello"), ("he\\o".to_string(), 1));
    }

    #[test]
    fn no_match_leaves_text_unchanged() {
        assert_eq!(gsub("z", "y", "hello"), ("hello".to_string(), 0));
    }

    #[test]
    fn gsub_with_empty_matches() {
        assert_eq!(gsub("x*", "-", "axa"), ("-a-a-".to_string(), 3));
    }

    #[test]
    fn substr_clamps_the_start_position() {
        assert_eq!(substr("hello", 2.0, Some(3.0), false), "ell");
        assert_eq!(substr("hello", -1.0, Some(3.0), false), "h");
        assert_eq!(substr("hello", 0.0, None, false), "hello");
        assert_eq!(substr("hello", 4.0, Some(10.0), false), "lo");
        assert_eq!(substr("hello", 6.0, None, false), "");
        assert_eq!(substr("hello", 2.0, Some(-1.0), false), "");
    }

    #[test]
    fn substr_by_runes_and_bytes() {
        assert_eq!(substr("héllo", 2.0, Some(2.0), false), "él");
        assert_eq!(substr("abc", 2.0, Some(2.0), true), "bc");
    }
}
