//! Output formatting - plaintext and JSON.
//!
//! One diagnostic line per finding, a PASS/FAIL verdict per library and per
//! consumer/library pair, and an overall verdict. Reports carry no timestamps
//! or run state, so identical input renders byte-identical output.

use serde::Serialize;
use std::fmt::{self, Write};
use std::path::{Path, PathBuf};

use crate::classify::{Conflict, Library};
use crate::leak::{ConsumerAnalysis, Leak};

/// A recoverable problem noticed while scanning. Never fails a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(flatten)]
    pub kind: WarningKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningKind {
    /// `#define` / `#undef` line that could not be parsed, skipped
    MalformedDirective { message: String },
    /// A still-active macro was defined again, the later definition is kept
    Redefinition { name: String, previous_line: usize },
    /// File was not scanned (too large)
    SkippedFile { reason: String },
    /// Quoted `#include` of a consumer that matches no library
    UnresolvedInclude { header: String },
    /// `#include` that matches files of more than one library or unit
    AmbiguousInclude {
        header: String,
        candidates: Vec<PathBuf>,
    },
}

impl Warning {
    pub fn new(path: impl Into<PathBuf>, line: Option<usize>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            line,
            kind,
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedDirective { message } => write!(f, "malformed directive: {}", message),
            Self::Redefinition {
                name,
                previous_line: 0,
            } => write!(f, "redefinition of {} (previously defined by configuration)", name),
            Self::Redefinition {
                name,
                previous_line,
            } => write!(
                f,
                "redefinition of {} (previous definition at line {})",
                name, previous_line
            ),
            Self::SkippedFile { reason } => write!(f, "skipped: {}", reason),
            Self::UnresolvedInclude { header } => {
                write!(f, "unresolved include \"{}\"", header)
            }
            Self::AmbiguousInclude { header, candidates } => write!(
                f,
                "ambiguous include \"{}\" matches {}",
                header,
                candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.path.display(), line, self.kind),
            None => write!(f, "{}: {}", self.path.display(), self.kind),
        }
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    fn from_clean(clean: bool) -> Self {
        if clean {
            Self::Pass
        } else {
            Self::Fail
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// Per-library verdict: FAIL when any name has conflicting visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryVerdict {
    pub name: String,
    pub verdict: Verdict,
    pub public: Vec<String>,
    pub internal: Vec<String>,
    pub conflicts: Vec<Conflict>,
}

impl LibraryVerdict {
    pub fn from_library(library: &Library) -> Self {
        Self {
            name: library.name.clone(),
            verdict: Verdict::from_clean(library.is_consistent()),
            public: library.public.iter().cloned().collect(),
            internal: library.internal.iter().cloned().collect(),
            conflicts: library.conflicts.clone(),
        }
    }
}

/// Verdict for one consumer against one relevant library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairVerdict {
    pub library: String,
    pub verdict: Verdict,
    pub leaked: Vec<String>,
}

/// Per-consumer verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerVerdict {
    pub consumer: PathBuf,
    pub verdict: Verdict,
    /// Names the consumer observes through its inclusions
    pub visible: Vec<String>,
    pub pairs: Vec<PairVerdict>,
    pub leaks: Vec<Leak>,
}

impl ConsumerVerdict {
    pub fn from_analysis(analysis: &ConsumerAnalysis) -> Self {
        let pairs = analysis
            .relevant
            .iter()
            .map(|library| {
                let leaked: Vec<String> = analysis
                    .leaks
                    .iter()
                    .filter(|l| &l.library == library)
                    .map(|l| l.name.clone())
                    .collect();
                PairVerdict {
                    library: library.clone(),
                    verdict: Verdict::from_clean(leaked.is_empty()),
                    leaked,
                }
            })
            .collect();

        Self {
            consumer: analysis.consumer.clone(),
            verdict: Verdict::from_clean(analysis.leaks.is_empty()),
            visible: analysis.visible.keys().cloned().collect(),
            pairs,
            leaks: analysis.leaks.clone(),
        }
    }
}

/// Full result of one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub verdict: Verdict,
    pub libraries: Vec<LibraryVerdict>,
    pub consumers: Vec<ConsumerVerdict>,
    pub warnings: Vec<Warning>,
    /// Dependencies-first library order
    pub build_order: Vec<String>,
}

impl Report {
    pub fn new(
        libraries: &[Library],
        consumers: &[ConsumerAnalysis],
        warnings: Vec<Warning>,
    ) -> Self {
        let libraries: Vec<LibraryVerdict> =
            libraries.iter().map(LibraryVerdict::from_library).collect();
        let consumers: Vec<ConsumerVerdict> =
            consumers.iter().map(ConsumerVerdict::from_analysis).collect();
        let clean = libraries.iter().all(|l| l.verdict == Verdict::Pass)
            && consumers.iter().all(|c| c.verdict == Verdict::Pass);

        Self {
            verdict: Verdict::from_clean(clean),
            libraries,
            consumers,
            warnings,
            build_order: Vec::new(),
        }
    }

    pub fn with_build_order(mut self, order: Vec<String>) -> Self {
        self.build_order = order;
        self
    }

    /// No leaks and no conflicts. Warnings do not count.
    pub fn is_clean(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    /// Process exit code: 0 when clean, 1 when findings exist.
    pub fn exit_code(&self) -> i32 {
        if self.is_clean() {
            0
        } else {
            1
        }
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &Conflict> {
        self.libraries.iter().flat_map(|l| l.conflicts.iter())
    }

    pub fn leaks(&self) -> impl Iterator<Item = &Leak> {
        self.consumers.iter().flat_map(|c| c.leaks.iter())
    }

    pub fn library(&self, name: &str) -> Option<&LibraryVerdict> {
        self.libraries.iter().find(|l| l.name == name)
    }

    pub fn consumer(&self, file: &str) -> Option<&ConsumerVerdict> {
        self.consumers
            .iter()
            .find(|c| c.consumer.as_path() == Path::new(file))
    }

    /// Renders the plain-text report.
    pub fn render_plain(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = self.write_plain(&mut out);
        out
    }

    fn write_plain(&self, out: &mut String) -> fmt::Result {
        for lib in &self.libraries {
            writeln!(
                out,
                "LIBRARY {}: {} ({} public, {} internal)",
                lib.name,
                lib.verdict,
                lib.public.len(),
                lib.internal.len()
            )?;
            for conflict in &lib.conflicts {
                writeln!(out, "  conflict: {}", conflict)?;
            }
        }

        for consumer in &self.consumers {
            writeln!(out, "CONSUMER {}: {}", consumer.consumer.display(), consumer.verdict)?;
            for pair in &consumer.pairs {
                writeln!(
                    out,
                    "  {} / {}: {}",
                    consumer.consumer.display(),
                    pair.library,
                    pair.verdict
                )?;
                for leak in consumer.leaks.iter().filter(|l| l.library == pair.library) {
                    writeln!(out, "    leak: {}", leak)?;
                }
            }
        }

        for warning in &self.warnings {
            writeln!(out, "WARNING {}", warning)?;
        }

        let leaks = self.leaks().count();
        let conflicts = self.conflicts().count();
        writeln!(
            out,
            "RESULT: {} ({} {}, {} {}, {} {})",
            self.verdict,
            leaks,
            plural(leaks, "leak", "leaks"),
            conflicts,
            plural(conflicts, "conflict", "conflicts"),
            self.warnings.len(),
            plural(self.warnings.len(), "warning", "warnings"),
        )
    }

    /// Renders the JSON report.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn plural<'s>(n: usize, one: &'s str, many: &'s str) -> &'s str {
    if n == 1 {
        one
    } else {
        many
    }
}

/// Prints the report in plain text format.
pub fn print_plain(report: &Report) {
    print!("{}", report.render_plain());
}

/// Prints the report in JSON format.
///
/// Falls back to the overall verdict alone if serialization fails.
pub fn print_json(report: &Report) {
    match report.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            tracing::error!(detail = %e, "JSON serialization failed");
            println!("{{\"verdict\": \"{}\"}}", report.verdict);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::leak::{Exposure, Inclusion};
    use crate::scope::{FileRole, ScopeRule};
    use crate::table::build_unit;
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_library() -> Library {
        let rule = ScopeRule::default();
        let unit = build_unit(
            Path::new("lib.c"),
            FileRole::Source,
            "#define LIB_INTERNAL_DEBUG 1\n#define LIB_PUBLIC_VERSION_MAJOR 2\n",
            &rule,
        )
        .0;
        classify("lib", vec![unit], &rule)
    }

    fn leaking_consumer() -> ConsumerAnalysis {
        let via: BTreeSet<Exposure> = [Exposure::File {
            path: PathBuf::from("lib.c"),
        }]
        .into();
        ConsumerAnalysis {
            consumer: PathBuf::from("main.c"),
            inclusions: vec![Inclusion::Unit {
                library: "lib".to_string(),
                path: PathBuf::from("lib.c"),
            }],
            visible: BTreeMap::from([
                ("LIB_INTERNAL_DEBUG".to_string(), via.clone()),
                ("LIB_PUBLIC_VERSION_MAJOR".to_string(), via.clone()),
            ]),
            relevant: vec!["lib".to_string()],
            leaks: vec![Leak {
                consumer: PathBuf::from("main.c"),
                library: "lib".to_string(),
                name: "LIB_INTERNAL_DEBUG".to_string(),
                via: via.into_iter().collect(),
            }],
        }
    }

    #[test]
    fn test_plain_report_lines() {
        let report = Report::new(&[sample_library()], &[leaking_consumer()], Vec::new());
        assert!(!report.is_clean());
        assert_eq!(report.exit_code(), 1);

        let text = report.render_plain();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "LIBRARY lib: PASS (1 public, 1 internal)");
        assert_eq!(lines[1], "CONSUMER main.c: FAIL");
        assert_eq!(lines[2], "  main.c / lib: FAIL");
        assert_eq!(
            lines[3],
            "    leak: LIB_INTERNAL_DEBUG is INTERNAL to lib but visible to main.c via file lib.c"
        );
        assert_eq!(lines[4], "RESULT: FAIL (1 leak, 0 conflicts, 0 warnings)");
    }

    #[test]
    fn test_clean_report() {
        let report = Report::new(&[sample_library()], &[], Vec::new());
        assert!(report.is_clean());
        assert_eq!(report.exit_code(), 0);
        assert!(report.render_plain().ends_with("RESULT: PASS (0 leaks, 0 conflicts, 0 warnings)\n"));
    }

    #[test]
    fn test_warnings_do_not_fail() {
        let warnings = vec![
            Warning::new(
                "lib.c",
                Some(3),
                WarningKind::MalformedDirective {
                    message: "missing macro name".into(),
                },
            ),
            Warning::new(
                "<command-line:lib>",
                None,
                WarningKind::Redefinition {
                    name: "X".into(),
                    previous_line: 0,
                },
            ),
        ];
        let report = Report::new(&[sample_library()], &[], warnings);
        assert!(report.is_clean());
        let text = report.render_plain();
        assert!(text.contains("WARNING lib.c:3: malformed directive: missing macro name\n"));
        assert!(text.contains("WARNING <command-line:lib>: redefinition of X (previously defined by configuration)\n"));
        assert!(text.contains("2 warnings"));
    }

    #[test]
    fn test_json_shape() {
        let report = Report::new(&[sample_library()], &[leaking_consumer()], Vec::new());
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["verdict"], "FAIL");
        assert_eq!(value["libraries"][0]["verdict"], "PASS");
        assert_eq!(value["consumers"][0]["pairs"][0]["leaked"][0], "LIB_INTERNAL_DEBUG");
        assert_eq!(value["consumers"][0]["leaks"][0]["via"][0]["via"], "file");
    }

    #[test]
    fn test_warning_json_is_flat() {
        let w = Warning::new(
            "main.c",
            Some(2),
            WarningKind::UnresolvedInclude {
                header: "missing.h".into(),
            },
        );
        let value = serde_json::to_value(&w).unwrap();
        assert_eq!(value["kind"], "unresolved_include");
        assert_eq!(value["header"], "missing.h");
        assert_eq!(value["line"], 2);
    }
}
