//! Visibility Classifier.
//!
//! Partitions a library's macros into disjoint PUBLIC and INTERNAL name sets
//! and reports every name whose declared visibility contradicts itself.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::scope::{FileRole, Scope, ScopeRule};
use crate::table::TranslationUnit;

/// Why a name's visibility is contradictory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictKind {
    /// PUBLIC in some units, INTERNAL in others
    MixedScopes {
        public_in: Vec<PathBuf>,
        internal_in: Vec<PathBuf>,
    },
    /// Declared INTERNAL but defined in a header consumers include
    InternalInHeader { header: PathBuf },
    /// Listed as both public and internal in the manifest
    ManifestOverlap,
}

/// A `ConflictingVisibility` finding. Fails the owning library's check.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Conflict {
    pub name: String,
    pub library: String,
    #[serde(flatten)]
    pub kind: ConflictKind,
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConflictKind::MixedScopes {
                public_in,
                internal_in,
            } => write!(
                f,
                "{} is PUBLIC in {} but INTERNAL in {}",
                self.name,
                join_paths(public_in),
                join_paths(internal_in)
            ),
            ConflictKind::InternalInHeader { header } => write!(
                f,
                "{} is declared INTERNAL but defined in header {}",
                self.name,
                header.display()
            ),
            ConflictKind::ManifestOverlap => {
                write!(f, "{} is listed as both public and internal", self.name)
            }
        }
    }
}

/// A classified library.
#[derive(Debug, Clone)]
pub struct Library {
    pub name: String,
    pub units: Vec<TranslationUnit>,
    /// Names consumers may observe
    pub public: BTreeSet<String>,
    /// Names confined to the library, including every conflicting name
    pub internal: BTreeSet<String>,
    pub conflicts: Vec<Conflict>,
}

impl Library {
    /// `PUBLIC ∩ INTERNAL = ∅` and no conflicts were found.
    pub fn is_consistent(&self) -> bool {
        self.conflicts.is_empty() && self.public.is_disjoint(&self.internal)
    }

    /// Conflicting names, sorted and deduplicated.
    pub fn conflicting_names(&self) -> BTreeSet<&str> {
        self.conflicts.iter().map(|c| c.name.as_str()).collect()
    }

    /// Unit with the given file name (e.g. `lib.c`).
    pub fn unit_named(&self, file_name: &str) -> Option<&TranslationUnit> {
        self.units.iter().find(|u| u.file_name() == Some(file_name))
    }

    /// File names of the library's headers.
    pub fn header_names(&self) -> impl Iterator<Item = &str> {
        self.units
            .iter()
            .filter(|u| u.role == FileRole::Header)
            .filter_map(|u| u.file_name())
    }
}

/// Classifies the units of one library under `rule`.
///
/// Conflicting names are placed in the INTERNAL set only, so the returned
/// sets are always disjoint and any exposure of such a name is still a leak.
pub fn classify(name: &str, units: Vec<TranslationUnit>, rule: &ScopeRule) -> Library {
    let mut public_in: BTreeMap<&str, BTreeSet<PathBuf>> = BTreeMap::new();
    let mut internal_in: BTreeMap<&str, BTreeSet<PathBuf>> = BTreeMap::new();
    let mut conflicts = Vec::new();

    for unit in &units {
        for def in &unit.definitions {
            let bucket = match def.scope {
                Scope::Public => &mut public_in,
                Scope::Internal => &mut internal_in,
            };
            bucket
                .entry(def.name.as_str())
                .or_default()
                .insert(unit.path.clone());

            if def.scope == Scope::Internal
                && unit.role == FileRole::Header
                && rule.declares_internal(&def.name)
            {
                conflicts.push(Conflict {
                    name: def.name.clone(),
                    library: name.to_string(),
                    kind: ConflictKind::InternalInHeader {
                        header: unit.path.clone(),
                    },
                });
            }
        }
    }

    for (macro_name, publics) in &public_in {
        if let Some(internals) = internal_in.get(macro_name) {
            conflicts.push(Conflict {
                name: macro_name.to_string(),
                library: name.to_string(),
                kind: ConflictKind::MixedScopes {
                    public_in: publics.iter().cloned().collect(),
                    internal_in: internals.iter().cloned().collect(),
                },
            });
        }
    }

    for macro_name in rule.manifest_overlap() {
        conflicts.push(Conflict {
            name: macro_name,
            library: name.to_string(),
            kind: ConflictKind::ManifestOverlap,
        });
    }

    conflicts.sort();
    conflicts.dedup();

    let mut internal: BTreeSet<String> = internal_in.keys().map(|n| n.to_string()).collect();
    internal.extend(conflicts.iter().map(|c| c.name.clone()));
    let public: BTreeSet<String> = public_in
        .keys()
        .filter(|n| !internal.contains(**n))
        .map(|n| n.to_string())
        .collect();

    for conflict in &conflicts {
        warn!(library = name, name = %conflict.name, "conflicting visibility: {}", conflict);
    }
    debug!(
        library = name,
        units = units.len(),
        public = public.len(),
        internal = internal.len(),
        conflicts = conflicts.len(),
        "classified library"
    );

    Library {
        name: name.to_string(),
        units,
        public,
        internal,
        conflicts,
    }
}
