//! Text-level formula scanning.
//!
//! Formulas are rewritten as text before the final reduction: variable
//! references become literals and function calls are replaced by their
//! results, innermost first. Everything here works on a *masked* copy of
//! the formula in which string-literal contents are blanked out, so
//! identifiers, parentheses and commas inside strings are never touched.
//! Masking preserves byte offsets, so positions found in the masked text
//! index the original directly.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{FormulaError, Result};
use crate::value::Value;

/// Words the expression language reserves; never treated as variable references.
pub const RESERVED_WORDS: &[&str] = &["true", "false", "null", "undefined", "NaN", "Infinity"];

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").expect("identifier regex must compile")
    })
}

/// An identifier occurrence outside string literals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identifier<'a> {
    pub name: &'a str,
    pub start: usize,
    pub end: usize,
    /// Followed (after optional whitespace) by `(`.
    pub is_call: bool,
}

/// A function call whose arguments contain no further calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSite {
    pub name: String,
    /// Byte offset of the function name.
    pub start: usize,
    /// Byte offset of the opening parenthesis.
    pub open: usize,
    /// Byte offset of the matching closing parenthesis.
    pub close: usize,
}

/// Copy of `formula` with the contents of string literals replaced by spaces.
/// Quote characters are kept; an unterminated string is masked to the end.
pub fn mask_string_literals(formula: &str) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in formula.chars() {
        match quote {
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
                out.push(c);
            }
            Some(q) => {
                if escaped {
                    escaped = false;
                    push_blank(&mut out, c);
                } else if c == '\\' {
                    escaped = true;
                    out.push(' ');
                } else if c == q {
                    quote = None;
                    out.push(c);
                } else {
                    push_blank(&mut out, c);
                }
            }
        }
    }
    out
}

fn push_blank(out: &mut String, c: char) {
    for _ in 0..c.len_utf8() {
        out.push(' ');
    }
}

fn identifiers_in(masked: &str) -> Vec<Identifier<'_>> {
    identifier_re()
        .find_iter(masked)
        .filter(|m| {
            // `1e5` and `2abc` are not identifiers.
            !masked[..m.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c == '.' || c.is_ascii_digit())
        })
        .map(|m| Identifier {
            name: m.as_str(),
            start: m.start(),
            end: m.end(),
            is_call: masked[m.end()..].trim_start().starts_with('('),
        })
        .collect()
}

/// Names referenced as variables (not calls, not reserved words), deduplicated
/// in first-occurrence order.
pub fn extract_references(formula: &str) -> Vec<String> {
    let masked = mask_string_literals(formula);
    let mut names: Vec<String> = Vec::new();
    for ident in identifiers_in(&masked) {
        if ident.is_call || RESERVED_WORDS.contains(&ident.name) {
            continue;
        }
        if !names.iter().any(|n| n == ident.name) {
            names.push(ident.name.to_string());
        }
    }
    names
}

/// Replace every variable reference for which `lookup` yields a value with
/// that value's literal encoding. Returns the rewritten text and the names
/// that were substituted.
pub fn substitute_variables(
    formula: &str,
    mut lookup: impl FnMut(&str) -> Option<Value>,
) -> (String, Vec<String>) {
    let masked = mask_string_literals(formula);
    let mut out = String::with_capacity(formula.len());
    let mut dependencies: Vec<String> = Vec::new();
    let mut last = 0;
    for ident in identifiers_in(&masked) {
        if ident.is_call || RESERVED_WORDS.contains(&ident.name) {
            continue;
        }
        let Some(value) = lookup(ident.name) else {
            continue;
        };
        out.push_str(&formula[last..ident.start]);
        out.push_str(&literal_for_splice(&value));
        last = ident.end;
        if !dependencies.iter().any(|d| d == ident.name) {
            dependencies.push(ident.name.to_string());
        }
    }
    out.push_str(&formula[last..]);
    (out, dependencies)
}

/// Literal encoding safe to splice next to arbitrary operators: negative
/// numbers are parenthesised so `a-b` with `b = -1` stays `a-(-1)`.
pub(crate) fn literal_for_splice(value: &Value) -> String {
    let literal = value.to_literal();
    if literal.starts_with('-') {
        format!("({})", literal)
    } else {
        literal
    }
}

/// Split an argument list on top-level commas. Commas nested in `()`, `[]`,
/// `{}` or string literals do not split. Blank input yields no arguments.
pub fn split_arguments(text: &str) -> Vec<&str> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let masked = mask_string_literals(text);
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut last = 0;
    for (i, c) in masked.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(text[last..i].trim());
                last = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[last..].trim());
    parts
}

/// Find a call with no other call inside its argument list.
pub fn find_innermost_call(formula: &str) -> Result<Option<CallSite>> {
    let masked = mask_string_literals(formula);
    let calls: Vec<(Identifier<'_>, usize)> = identifiers_in(&masked)
        .into_iter()
        .filter(|ident| ident.is_call && !RESERVED_WORDS.contains(&ident.name))
        .map(|ident| {
            let open = ident.end + masked[ident.end..].find('(').unwrap_or(0);
            (ident, open)
        })
        .collect();

    for (i, (ident, open)) in calls.iter().enumerate() {
        let close = matching_paren(&masked, *open).ok_or_else(|| {
            FormulaError::parse(*open, format!("unclosed parenthesis in call to {}", ident.name))
        })?;
        let nested = calls.get(i + 1).is_some_and(|(_, next_open)| *next_open < close);
        if !nested {
            return Ok(Some(CallSite {
                name: ident.name.to_string(),
                start: ident.start,
                open: *open,
                close,
            }));
        }
    }
    Ok(None)
}

fn matching_paren(masked: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in masked[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}
