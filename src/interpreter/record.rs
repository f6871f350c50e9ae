//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

//! The record/field engine: the current record, its lazily split fields, and
//! the rejoin logic that keeps `$0` and the fields consistent.
//!
//! After a record change exactly one of the record string and the field list
//! is canonical: splitting happens on the first field access, rejoining
//! happens eagerly on any field or `NF` mutation.

use std::ffi::CString;
use std::rc::Rc;

use super::value::Value;
use crate::regex::Regex;

/// Hard limit on addressable field indices.
pub const MAX_FIELD_INDEX: usize = 1_000_000;

#[derive(Clone)]
pub enum FieldSeparator {
    /// the single-space default: split on runs of whitespace, ignoring
    /// leading and trailing runs
    Default,
    /// a literal one-character separator
    Char(char),
    /// everything else is a regular expression
    Ere(Rc<Regex>),
}

impl FieldSeparator {
    pub fn parse(value: &str) -> Result<Self, String> {
        if value == " " {
            Ok(FieldSeparator::Default)
        } else if value.chars().count() == 1 {
            Ok(FieldSeparator::Char(value.chars().next().unwrap()))
        } else {
            let ere = Regex::new(Rc::from(value))?;
            Ok(FieldSeparator::Ere(Rc::from(ere)))
        }
    }
}

/// Split a record into fields and call `store` once per field, in order.
pub fn split_record<S: FnMut(usize, &str)>(
    record: &str,
    separator: &FieldSeparator,
    mut store: S,
) -> Result<(), String> {
    if record.is_empty() {
        return Ok(());
    }
    match separator {
        FieldSeparator::Default => record
            .split_ascii_whitespace()
            .enumerate()
            .for_each(|(i, field)| store(i, field)),
        FieldSeparator::Char(c) => record
            .split(*c)
            .enumerate()
            .for_each(|(i, field)| store(i, field)),
        FieldSeparator::Ere(re) => {
            let subject = CString::new(record)
                .map_err(|_| "record contains a NUL byte".to_string())?;
            let mut split_start = 0;
            let mut index = 0;
            for separator_range in re.match_locations(subject) {
                store(index, &record[split_start..separator_range.start]);
                split_start = separator_range.end;
                index += 1;
            }
            store(index, &record[split_start..]);
        }
    }
    Ok(())
}

pub struct Record {
    line: Rc<str>,
    line_is_true_str: bool,
    fields: Vec<Rc<str>>,
    /// parallel to `fields`: true for fields assigned with `$i = ...`
    fields_is_true_str: Vec<bool>,
    have_fields: bool,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            line: Rc::from(""),
            line_is_true_str: false,
            fields: Vec::new(),
            fields_is_true_str: Vec::new(),
            have_fields: true,
        }
    }
}

impl Record {
    /// Install a new record. The fields are invalidated and split again on
    /// the next access.
    pub fn set_line(&mut self, line: Rc<str>, is_true_str: bool) {
        self.line = line;
        self.line_is_true_str = is_true_str;
        self.fields.clear();
        self.fields_is_true_str.clear();
        self.have_fields = false;
    }

    pub fn get_line(&self) -> Value {
        if self.line_is_true_str {
            Value::Str(self.line.clone())
        } else {
            Value::NumStr(self.line.clone())
        }
    }

    fn ensure_fields(&mut self, separator: &FieldSeparator) -> Result<(), String> {
        if self.have_fields {
            return Ok(());
        }
        self.fields.clear();
        let fields = &mut self.fields;
        split_record(&self.line, separator, |_, field| {
            fields.push(Rc::from(field));
        })?;
        self.fields_is_true_str = vec![false; self.fields.len()];
        self.have_fields = true;
        Ok(())
    }

    pub fn num_fields(&mut self, separator: &FieldSeparator) -> Result<usize, String> {
        self.ensure_fields(separator)?;
        Ok(self.fields.len())
    }

    pub fn get_field(
        &mut self,
        index: i64,
        separator: &FieldSeparator,
    ) -> Result<Value, String> {
        if index < 0 {
            return Err(format!("field index negative: {}", index));
        }
        if index == 0 {
            return Ok(self.get_line());
        }
        self.ensure_fields(separator)?;
        let index = index as usize;
        if index > self.fields.len() {
            return Ok(Value::from(""));
        }
        let field = self.fields[index - 1].clone();
        if self.fields_is_true_str[index - 1] {
            Ok(Value::Str(field))
        } else {
            Ok(Value::NumStr(field))
        }
    }

    pub fn set_field(
        &mut self,
        index: i64,
        value: Rc<str>,
        separator: &FieldSeparator,
        output_separator: &str,
    ) -> Result<(), String> {
        if index == 0 {
            self.set_line(value, true);
            return Ok(());
        }
        if index < 0 {
            return Err(format!("field index negative: {}", index));
        }
        if index as usize > MAX_FIELD_INDEX {
            return Err(format!("field index too large: {}", index));
        }
        self.ensure_fields(separator)?;
        let index = index as usize;
        while self.fields.len() < index {
            self.fields.push(Rc::from(""));
            self.fields_is_true_str.push(true);
        }
        self.fields[index - 1] = value;
        self.fields_is_true_str[index - 1] = true;
        self.rejoin(output_separator);
        Ok(())
    }

    pub fn set_num_fields(
        &mut self,
        num_fields: i64,
        separator: &FieldSeparator,
        output_separator: &str,
    ) -> Result<(), String> {
        if num_fields < 0 {
            return Err(format!("NF set to negative value: {}", num_fields));
        }
        if num_fields as usize > MAX_FIELD_INDEX {
            return Err(format!("NF set too large: {}", num_fields));
        }
        self.ensure_fields(separator)?;
        let num_fields = num_fields as usize;
        self.fields.truncate(num_fields);
        self.fields_is_true_str.truncate(num_fields);
        while self.fields.len() < num_fields {
            self.fields.push(Rc::from(""));
            self.fields_is_true_str.push(false);
        }
        self.rejoin(output_separator);
        Ok(())
    }

    fn rejoin(&mut self, output_separator: &str) {
        let mut line = String::new();
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push_str(output_separator);
            }
            line.push_str(field);
        }
        self.line = line.into();
        self.line_is_true_str = true;
    }
}
