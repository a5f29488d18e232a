//! Macro Table Builder.
//!
//! Scans one translation unit and produces the ordered table of macro
//! definitions still active at end of file, each tagged with its declared
//! [`Scope`]. `#undef` events and `#include` directives are recorded alongside.
//!
//! Resilience: malformed directives are skipped and reported as warnings,
//! the scan never stops early.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::directive::{logical_lines, parse_directive, Directive, IncludeForm};
use crate::error::{IoResultExt, MacvisError, MacvisResult};
use crate::report::{Warning, WarningKind};
use crate::scope::{FileRole, Scope, ScopeRule};

/// Maximum file size to scan (10 MB).
const MAX_FILE_SIZE: u64 = 10_000_000;

/// Value of an object-like macro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MacroValue {
    Number(i64),
    Text(String),
}

impl MacroValue {
    /// Interpret a replacement list. Empty bodies have no value.
    ///
    /// Integer literals (decimal, hex, octal, with `u`/`l` suffixes) become
    /// [`MacroValue::Number`], anything else is kept verbatim.
    pub fn parse(body: &str) -> Option<Self> {
        let body = body.trim();
        if body.is_empty() {
            return None;
        }
        Some(parse_integer(body).map_or_else(|| Self::Text(body.to_string()), Self::Number))
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text),
    };
    let digits = digits.trim_end_matches(['u', 'U', 'l', 'L']);
    if digits.is_empty() {
        return None;
    }

    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<i64>().ok()?
    };

    Some(if negative { -value } else { value })
}

impl fmt::Display for MacroValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(t) => write!(f, "{}", t),
        }
    }
}

/// A single macro definition. Immutable once scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacroDefinition {
    pub name: String,
    /// Defining file
    pub file: PathBuf,
    /// 1-indexed line, 0 for configuration-injected defines
    pub line: usize,
    pub value: Option<MacroValue>,
    /// Parameters of a function-like macro
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    pub scope: Scope,
    /// Defined inside an `#if`/`#ifdef`/`#ifndef` block
    pub conditional: bool,
}

/// A recorded `#undef`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndefEvent {
    pub name: String,
    pub line: usize,
    /// Whether a definition from this unit was active and got removed
    pub removed: bool,
}

/// A recorded `#include`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncludeDirective {
    pub header: String,
    pub form: IncludeForm,
    pub line: usize,
}

/// One scanned translation unit.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationUnit {
    pub path: PathBuf,
    pub role: FileRole,
    /// Definitions active at end of file, in order of their (last) definition
    pub definitions: Vec<MacroDefinition>,
    pub undefs: Vec<UndefEvent>,
    pub includes: Vec<IncludeDirective>,
}

impl TranslationUnit {
    /// Look up an active definition.
    pub fn get(&self, name: &str) -> Option<&MacroDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    /// `#ifdef NAME` as seen at end of this unit.
    pub fn is_defined(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names of all active definitions.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.name.as_str())
    }

    /// File name component, used to match `#include` targets.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Conditional nesting: `(block id, branch index)` per open block.
type BranchPath = Vec<(usize, usize)>;

/// Two definitions sit in sibling branches of the same conditional block.
fn mutually_exclusive(a: &BranchPath, b: &BranchPath) -> bool {
    for (x, y) in a.iter().zip(b.iter()) {
        if x.0 != y.0 {
            return false;
        }
        if x.1 != y.1 {
            return true;
        }
    }
    false
}

/// Scans `source` and builds the unit's macro table.
///
/// Redefinition keeps the later definition and records a warning, unless the
/// two definitions are alternatives in sibling `#if`/`#else` branches.
pub fn build_unit(
    path: &Path,
    role: FileRole,
    source: &str,
    rule: &ScopeRule,
) -> (TranslationUnit, Vec<Warning>) {
    let mut warnings = Vec::new();
    let mut slots: Vec<Option<(MacroDefinition, BranchPath)>> = Vec::new();
    let mut active: HashMap<String, usize> = HashMap::new();
    let mut undefs = Vec::new();
    let mut includes = Vec::new();

    let mut stack: BranchPath = Vec::new();
    let mut next_block = 0usize;

    for logical in logical_lines(source) {
        let directive = match parse_directive(path, &logical) {
            Ok(Some(d)) => d,
            Ok(None) => continue,
            Err(MacvisError::MalformedDirective { line, message, .. }) => {
                warn!(file = %path.display(), line, detail = %message, "malformed directive skipped");
                warnings.push(Warning::new(
                    path,
                    Some(line),
                    WarningKind::MalformedDirective { message },
                ));
                continue;
            }
            Err(e) => {
                warnings.push(Warning::new(
                    path,
                    Some(logical.line),
                    WarningKind::MalformedDirective {
                        message: e.to_string(),
                    },
                ));
                continue;
            }
        };

        match directive {
            Directive::Define { name, params, body } => {
                let value = if params.is_some() {
                    // Function-like bodies are never expanded, keep them as text
                    (!body.is_empty()).then(|| MacroValue::Text(body))
                } else {
                    MacroValue::parse(&body)
                };
                let def = MacroDefinition {
                    scope: rule.scope_of(&name, role),
                    name: name.clone(),
                    file: path.to_path_buf(),
                    line: logical.line,
                    value,
                    params,
                    conditional: !stack.is_empty(),
                };

                if let Some(idx) = active.remove(&name) {
                    if let Some((previous, prev_path)) = slots[idx].take() {
                        if !mutually_exclusive(&prev_path, &stack) {
                            warnings.push(Warning::new(
                                path,
                                Some(logical.line),
                                WarningKind::Redefinition {
                                    name: name.clone(),
                                    previous_line: previous.line,
                                },
                            ));
                        }
                    }
                }

                active.insert(name, slots.len());
                slots.push(Some((def, stack.clone())));
            }
            Directive::Undef { name } => {
                let removed = match active.remove(&name) {
                    Some(idx) => slots[idx].take().is_some(),
                    None => false,
                };
                undefs.push(UndefEvent {
                    name,
                    line: logical.line,
                    removed,
                });
            }
            Directive::Include { header, form } => includes.push(IncludeDirective {
                header,
                form,
                line: logical.line,
            }),
            Directive::ConditionalOpen => {
                stack.push((next_block, 0));
                next_block += 1;
            }
            Directive::ConditionalBranch => {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
            }
            Directive::ConditionalClose => {
                stack.pop();
            }
            Directive::Other => {}
        }
    }

    let definitions: Vec<MacroDefinition> = slots.into_iter().flatten().map(|(d, _)| d).collect();
    debug!(
        file = %path.display(),
        definitions = definitions.len(),
        undefs = undefs.len(),
        includes = includes.len(),
        "scanned translation unit"
    );

    (
        TranslationUnit {
            path: path.to_path_buf(),
            role,
            definitions,
            undefs,
            includes,
        },
        warnings,
    )
}

/// Reads and scans one file.
///
/// A file that does not exist yields [`MacvisError::MissingFile`].
pub fn load_unit(
    path: &Path,
    role: FileRole,
    rule: &ScopeRule,
) -> MacvisResult<(TranslationUnit, Vec<Warning>)> {
    if !path.exists() {
        return Err(MacvisError::missing(path));
    }

    let meta = fs::metadata(path).with_path(path)?;
    if meta.len() > MAX_FILE_SIZE {
        warn!(file = %path.display(), size = meta.len(), "file too large, scanned as empty");
        let (unit, mut warnings) = build_unit(path, role, "", rule);
        warnings.push(Warning::new(
            path,
            None,
            WarningKind::SkippedFile {
                reason: format!("larger than {} bytes", MAX_FILE_SIZE),
            },
        ));
        return Ok((unit, warnings));
    }

    let bytes = fs::read(path).with_path(path)?;
    let source = String::from_utf8_lossy(&bytes);
    Ok(build_unit(path, role, &source, rule))
}

/// Reads and scans many files in parallel, preserving input order.
///
/// Fails with the first missing or unreadable file.
pub fn load_units(
    files: &[(PathBuf, FileRole)],
    rule: &ScopeRule,
) -> MacvisResult<Vec<(TranslationUnit, Vec<Warning>)>> {
    files
        .par_iter()
        .map(|(path, role)| load_unit(path, *role, rule))
        .collect()
}

/// Builds the synthetic unit for configuration-injected defines.
///
/// Entries are `NAME` (value 1) or `NAME=VALUE`. `defines` are internal,
/// `public_defines` public, regardless of the library's convention.
pub fn command_line_unit(
    library: &str,
    defines: &[String],
    public_defines: &[String],
) -> (TranslationUnit, Vec<Warning>) {
    let path = PathBuf::from(format!("<command-line:{}>", library));
    let mut warnings = Vec::new();
    let mut slots: Vec<Option<MacroDefinition>> = Vec::new();
    let mut active: HashMap<String, usize> = HashMap::new();

    let tagged = defines
        .iter()
        .map(|d| (d, Scope::Internal))
        .chain(public_defines.iter().map(|d| (d, Scope::Public)));

    for (raw, scope) in tagged {
        let (name, value) = match raw.split_once('=') {
            Some((n, v)) => (n.trim(), MacroValue::parse(v)),
            None => (raw.trim(), Some(MacroValue::Number(1))),
        };

        if !crate::directive::is_identifier(name) {
            warnings.push(Warning::new(
                &path,
                None,
                WarningKind::MalformedDirective {
                    message: format!("invalid define '{}'", raw),
                },
            ));
            continue;
        }

        if let Some(idx) = active.remove(name) {
            slots[idx] = None;
            warnings.push(Warning::new(
                &path,
                None,
                WarningKind::Redefinition {
                    name: name.to_string(),
                    previous_line: 0,
                },
            ));
        }

        active.insert(name.to_string(), slots.len());
        slots.push(Some(MacroDefinition {
            name: name.to_string(),
            file: path.clone(),
            line: 0,
            value,
            params: None,
            scope,
            conditional: false,
        }));
    }

    (
        TranslationUnit {
            path,
            role: FileRole::CommandLine,
            definitions: slots.into_iter().flatten().collect(),
            undefs: Vec::new(),
            includes: Vec::new(),
        },
        warnings,
    )
}
