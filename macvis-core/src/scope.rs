//! Macro scope tagging.
//!
//! Every definition carries an explicit [`Scope`]. Which scope a definition
//! gets is decided by the library's [`ScopeRule`]:
//!
//! - `prefix`: the macro name carries a public or internal marker
//! - `location`: headers are public, sources are internal
//! - `manifest`: explicit name lists

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::MacvisError;

/// File extensions treated as headers.
pub const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx", "h++", "inc", "inl"];

/// File extensions treated as compilation unit sources.
pub const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "c++", "m", "mm"];

/// Declared visibility of a macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Meant to be observed by consumers through the library's headers
    Public,
    /// Confined to the library's own compilation units
    Internal,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "PUBLIC"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Physical role of a translation unit's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileRole {
    Header,
    Source,
    /// Synthetic unit holding configuration-injected defines
    CommandLine,
}

impl FileRole {
    /// Infer the role from the file extension.
    ///
    /// Returns `None` for files that are neither headers nor sources.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if HEADER_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Header)
        } else if SOURCE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Source)
        } else {
            None
        }
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "header"),
            Self::Source => write!(f, "source"),
            Self::CommandLine => write!(f, "command-line"),
        }
    }
}

/// Name of a scope convention, as written in `macvis.toml` or on the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConventionKind {
    #[default]
    Prefix,
    Location,
    Manifest,
}

impl FromStr for ConventionKind {
    type Err = MacvisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prefix" | "marker" | "name" => Ok(Self::Prefix),
            "location" | "path" => Ok(Self::Location),
            "manifest" | "explicit" => Ok(Self::Manifest),
            _ => Err(MacvisError::invalid_argument(format!(
                "unknown scope convention '{}' (expected prefix, location or manifest)",
                s
            ))),
        }
    }
}

impl fmt::Display for ConventionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix => write!(f, "prefix"),
            Self::Location => write!(f, "location"),
            Self::Manifest => write!(f, "manifest"),
        }
    }
}

/// Resolved rule assigning a scope to each definition of one library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeRule {
    Prefix {
        public_markers: Vec<String>,
        internal_markers: Vec<String>,
        unmarked: Scope,
    },
    Location,
    Manifest {
        public: BTreeSet<String>,
        internal: BTreeSet<String>,
        unmarked: Scope,
    },
}

impl Default for ScopeRule {
    fn default() -> Self {
        Self::Prefix {
            public_markers: vec!["PUBLIC_".to_string()],
            internal_markers: vec!["INTERNAL_".to_string()],
            unmarked: Scope::Internal,
        }
    }
}

/// Position of `marker` in `name`: at the start, or right after an underscore.
fn marker_position(name: &str, marker: &str) -> Option<usize> {
    if marker.is_empty() {
        return None;
    }
    if name.starts_with(marker) {
        return Some(0);
    }
    let trimmed = marker.trim_start_matches('_');
    name.match_indices(trimmed)
        .map(|(i, _)| i)
        .find(|&i| i > 0 && name.as_bytes()[i - 1] == b'_')
}

fn earliest_marker(name: &str, markers: &[String]) -> Option<usize> {
    markers.iter().filter_map(|m| marker_position(name, m)).min()
}

impl ScopeRule {
    /// Scope of a definition named `name` found in a file with `role`.
    pub fn scope_of(&self, name: &str, role: FileRole) -> Scope {
        match self {
            Self::Prefix {
                public_markers,
                internal_markers,
                unmarked,
            } => {
                let public = earliest_marker(name, public_markers);
                let internal = earliest_marker(name, internal_markers);
                match (public, internal) {
                    (Some(p), Some(i)) if p < i => Scope::Public,
                    (Some(_), Some(_)) => Scope::Internal,
                    (Some(_), None) => Scope::Public,
                    (None, Some(_)) => Scope::Internal,
                    (None, None) => *unmarked,
                }
            }
            Self::Location => match role {
                FileRole::Header => Scope::Public,
                FileRole::Source | FileRole::CommandLine => Scope::Internal,
            },
            Self::Manifest {
                public,
                internal,
                unmarked,
            } => {
                // Listed in both: the classifier reports the conflict, treat as internal
                if internal.contains(name) {
                    Scope::Internal
                } else if public.contains(name) {
                    Scope::Public
                } else {
                    *unmarked
                }
            }
        }
    }

    /// Whether `name` is declared internal by a marker or manifest entry,
    /// as opposed to falling back to the `unmarked` scope.
    ///
    /// Include guards and other unmarked helpers in headers are not declared
    /// anything, so only explicit declarations count as a header conflict.
    pub fn declares_internal(&self, name: &str) -> bool {
        match self {
            Self::Prefix {
                public_markers,
                internal_markers,
                ..
            } => match (
                earliest_marker(name, public_markers),
                earliest_marker(name, internal_markers),
            ) {
                (Some(p), Some(i)) => i <= p,
                (None, Some(_)) => true,
                _ => false,
            },
            Self::Location => false,
            Self::Manifest { internal, .. } => internal.contains(name),
        }
    }

    /// Names a manifest lists as both public and internal.
    pub fn manifest_overlap(&self) -> Vec<String> {
        match self {
            Self::Manifest {
                public, internal, ..
            } => public.intersection(internal).cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// The convention this rule implements.
    pub fn kind(&self) -> ConventionKind {
        match self {
            Self::Prefix { .. } => ConventionKind::Prefix,
            Self::Location => ConventionKind::Location,
            Self::Manifest { .. } => ConventionKind::Manifest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_prefix_markers_after_library_prefix() {
        let rule = ScopeRule::default();
        assert_eq!(rule.scope_of("LIB_PUBLIC_VERSION_MAJOR", FileRole::Source), Scope::Public);
        assert_eq!(rule.scope_of("LIB_INTERNAL_DEBUG", FileRole::Source), Scope::Internal);
        assert_eq!(rule.scope_of("PUBLIC_API", FileRole::Source), Scope::Public);
    }

    #[test]
    fn test_prefix_marker_must_start_a_segment() {
        let rule = ScopeRule::default();
        // "NONPUBLIC_X" does not carry the PUBLIC_ marker, falls back to unmarked
        assert_eq!(rule.scope_of("NONPUBLIC_X", FileRole::Header), Scope::Internal);
        assert_eq!(rule.scope_of("DEBUG", FileRole::Header), Scope::Internal);
    }

    #[test]
    fn test_prefix_earliest_marker_wins() {
        let rule = ScopeRule::default();
        assert_eq!(rule.scope_of("PUBLIC_INTERNAL_X", FileRole::Source), Scope::Public);
        assert_eq!(rule.scope_of("LIB_INTERNAL_PUBLIC_X", FileRole::Source), Scope::Internal);
    }

    #[test]
    fn test_prefix_unmarked_public() {
        let rule = ScopeRule::Prefix {
            public_markers: vec!["API_".into()],
            internal_markers: vec!["PRIV_".into()],
            unmarked: Scope::Public,
        };
        assert_eq!(rule.scope_of("VERSION", FileRole::Source), Scope::Public);
        assert_eq!(rule.scope_of("MY_PRIV_FLAG", FileRole::Header), Scope::Internal);
    }

    #[test]
    fn test_location_rule() {
        let rule = ScopeRule::Location;
        assert_eq!(rule.scope_of("ANY", FileRole::Header), Scope::Public);
        assert_eq!(rule.scope_of("ANY", FileRole::Source), Scope::Internal);
    }

    #[test]
    fn test_manifest_rule_and_overlap() {
        let rule = ScopeRule::Manifest {
            public: ["A".to_string(), "B".to_string()].into(),
            internal: ["B".to_string(), "C".to_string()].into(),
            unmarked: Scope::Internal,
        };
        assert_eq!(rule.scope_of("A", FileRole::Source), Scope::Public);
        assert_eq!(rule.scope_of("B", FileRole::Header), Scope::Internal);
        assert_eq!(rule.scope_of("Z", FileRole::Header), Scope::Internal);
        assert_eq!(rule.manifest_overlap(), vec!["B".to_string()]);
    }

    #[test]
    fn test_declares_internal_ignores_unmarked() {
        let rule = ScopeRule::default();
        assert!(rule.declares_internal("LIB_INTERNAL_DEBUG"));
        assert!(!rule.declares_internal("LIB_H"));
        assert!(!rule.declares_internal("LIB_PUBLIC_X"));
        assert!(!ScopeRule::Location.declares_internal("LIB_INTERNAL_DEBUG"));
    }

    #[test]
    fn test_file_role_from_path() {
        assert_eq!(FileRole::from_path(&PathBuf::from("lib.h")), Some(FileRole::Header));
        assert_eq!(FileRole::from_path(&PathBuf::from("lib.HXX")), Some(FileRole::Header));
        assert_eq!(FileRole::from_path(&PathBuf::from("lib.cxx")), Some(FileRole::Source));
        assert_eq!(FileRole::from_path(&PathBuf::from("README.md")), None);
        assert_eq!(FileRole::from_path(&PathBuf::from("Makefile")), None);
    }

    #[test]
    fn test_convention_from_str() {
        assert_eq!("Location".parse::<ConventionKind>().unwrap(), ConventionKind::Location);
        assert_eq!("manifest".parse::<ConventionKind>().unwrap(), ConventionKind::Manifest);
        assert!("bogus".parse::<ConventionKind>().is_err());
    }
}
