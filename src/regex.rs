//
// Copyright (c) 2024 Hemi Labs, Inc.
//
// This file is part of the posixutils-rs project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT
//

use core::fmt;
use std::ffi::CString;
use std::fmt::Formatter;
use std::ptr;
use std::rc::Rc;

fn regex_compilation_result(
    status_integer: libc::c_int,
    regex: &libc::regex_t,
    source: &str,
) -> Result<(), String> {
    if status_integer != 0 {
        let mut error_buffer = vec![b'\0'; 128];
        let length = unsafe {
            libc::regerror(
                status_integer,
                ptr::from_ref(regex),
                error_buffer.as_mut_ptr() as *mut libc::c_char,
                error_buffer.len(),
            )
        };
        // regerror reports the needed size including the NUL terminator
        let end = length.min(error_buffer.len()).saturating_sub(1);
        let error = String::from_utf8_lossy(&error_buffer[..end]);
        Err(format!("invalid regex {:?}: {}", source, error))
    } else {
        Ok(())
    }
}

/// A compiled POSIX extended regular expression. The canonical source text
/// is kept alongside the compiled form for the constant pool, the
/// disassembler and `RT`.
pub struct Regex {
    source: Rc<str>,
    raw_regex: libc::regex_t,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegexMatch {
    pub start: usize,
    pub end: usize,
}

impl Regex {
    pub fn new(source: Rc<str>) -> Result<Self, String> {
        let pattern = CString::new(source.as_bytes())
            .map_err(|_| format!("invalid regex {:?}: contains a NUL byte", source))?;
        let mut raw = unsafe { std::mem::zeroed::<libc::regex_t>() };
        let compilation_status =
            unsafe { libc::regcomp(ptr::from_mut(&mut raw), pattern.as_ptr(), libc::REG_EXTENDED) };
        regex_compilation_result(compilation_status, &raw, &source)?;
        Ok(Self {
            source,
            raw_regex: raw,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, string: &CString) -> bool {
        let exec_status = unsafe {
            libc::regexec(
                ptr::from_ref(&self.raw_regex),
                string.as_ptr(),
                0,
                ptr::null_mut(),
                0,
            )
        };
        exec_status != libc::REG_NOMATCH
    }

    /// Iterate the non-overlapping match locations in `string`. Byte
    /// offsets. An empty match advances by one byte so the iteration always
    /// terminates.
    pub fn match_locations(&self, string: CString) -> MatchLocations {
        MatchLocations {
            regex: self,
            string,
            next_start: 0,
            last_match_end: None,
            done: false,
        }
    }
}

pub struct MatchLocations<'re> {
    regex: &'re Regex,
    string: CString,
    next_start: usize,
    last_match_end: Option<usize>,
    done: bool,
}

impl Iterator for MatchLocations<'_> {
    type Item = RegexMatch;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done || self.next_start > self.string.as_bytes().len() {
                return None;
            }
            let mut match_range = libc::regmatch_t {
                rm_so: -1,
                rm_eo: -1,
            };
            let exec_status = unsafe {
                libc::regexec(
                    ptr::from_ref(&self.regex.raw_regex),
                    self.string.as_ptr().add(self.next_start),
                    1,
                    ptr::from_mut(&mut match_range),
                    if self.next_start == 0 {
                        0
                    } else {
                        libc::REG_NOTBOL
                    },
                )
            };
            if exec_status == libc::REG_NOMATCH {
                self.done = true;
                return None;
            }
            let result = RegexMatch {
                start: self.next_start + match_range.rm_so as usize,
                end: self.next_start + match_range.rm_eo as usize,
            };
            if result.start == result.end {
                // an empty match adjacent to the previous match is not a
                // separate match
                self.next_start = result.end + 1;
                if self.last_match_end == Some(result.start) {
                    continue;
                }
            } else {
                self.next_start = result.end;
            }
            self.last_match_end = Some(result.end);
            return Some(result);
        }
    }
}

impl Drop for Regex {
    fn drop(&mut self) {
        unsafe {
            libc::regfree(ptr::from_mut(&mut self.raw_regex));
        }
    }
}

impl fmt::Debug for Regex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.source)
    }
}

impl PartialEq for Regex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

pub fn regex_from_str(source: &str) -> Result<Regex, String> {
    Regex::new(Rc::from(source))
}

/// Escape a character for use in an ERE pattern.
pub fn ere_escape_char(c: char) -> String {
    if "\\^$.|?*+()[]{}".contains(c) {
        format!("\\{}", c)
    } else {
        c.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locations(pattern: &str, string: &str) -> Vec<RegexMatch> {
        let ere = regex_from_str(pattern).expect("error compiling ere");
        ere.match_locations(CString::new(string).unwrap()).collect()
    }

    #[test]
    fn test_create_regex() {
        regex_from_str("a").expect("error compiling ere");
    }

    #[test]
    fn test_invalid_regex_is_an_error() {
        assert!(regex_from_str("[").is_err());
    }

    #[test]
    fn test_regex_matches() {
        let ere = regex_from_str("ab*c").expect("error compiling ere");
        assert!(ere.matches(&CString::new("abbbbc").unwrap()));
        assert!(!ere.matches(&CString::new("def").unwrap()));
    }

    #[test]
    fn test_regex_match_locations() {
        assert_eq!(
            locations("match", "match 12345 match2 matchmatch"),
            vec![
                RegexMatch { start: 0, end: 5 },
                RegexMatch { start: 12, end: 17 },
                RegexMatch { start: 19, end: 24 },
                RegexMatch { start: 24, end: 29 },
            ]
        );
    }

    #[test]
    fn test_empty_matches_advance() {
        assert_eq!(
            locations("x*", "axa"),
            vec![
                RegexMatch { start: 0, end: 0 },
                RegexMatch { start: 1, end: 2 },
                RegexMatch { start: 3, end: 3 },
            ]
        );
    }

    #[test]
    fn test_anchors_do_not_match_inside_the_string() {
        assert_eq!(
            locations("^a", "aa"),
            vec![RegexMatch { start: 0, end: 1 }]
        );
    }
}
