//! Cross-Unit Leak Detector.
//!
//! A consumer's visible set is the union of the PUBLIC sets of the libraries
//! it includes (and of their dependencies, transitively), plus every active
//! macro of any library unit it includes textually. A leak is any visible
//! name that a relevant library keeps INTERNAL.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::classify::Library;
use crate::directive::IncludeForm;
use crate::graph::DependencyGraph;
use crate::report::{Warning, WarningKind};
use crate::scope::FileRole;
use crate::table::{IncludeDirective, TranslationUnit};

/// Through which inclusion a consumer observes a name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum Exposure {
    /// Public surface of a library (included directly or as a dependency)
    Library { library: String },
    /// Textual inclusion of one library unit
    File { path: PathBuf },
}

impl fmt::Display for Exposure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Library { library } => write!(f, "library {}", library),
            Self::File { path } => write!(f, "file {}", path.display()),
        }
    }
}

/// A `LeakedInternalMacro` finding. Fails the consumer's check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leak {
    pub consumer: PathBuf,
    /// Library that keeps the name internal
    pub library: String,
    pub name: String,
    pub via: Vec<Exposure>,
}

impl fmt::Display for Leak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let via = self
            .via
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "{} is INTERNAL to {} but visible to {} via {}",
            self.name,
            self.library,
            self.consumer.display(),
            via
        )
    }
}

/// Something a consumer includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inclusion {
    /// A library's public headers
    Library(String),
    /// One unit of a library, included as text
    Unit { library: String, path: PathBuf },
}

impl Inclusion {
    pub fn library(&self) -> &str {
        match self {
            Self::Library(name) => name,
            Self::Unit { library, .. } => library,
        }
    }
}

/// How an include name resolved against the configured libraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(Inclusion),
    /// Matches files that lead to different inclusions
    Ambiguous(Vec<PathBuf>),
    Unresolved,
}

/// One library file an include may refer to.
#[derive(Debug, Clone)]
struct IndexedUnit {
    library: String,
    path: PathBuf,
    role: FileRole,
}

impl IndexedUnit {
    /// Headers expose the library's public surface, anything else is text.
    fn inclusion(&self) -> Inclusion {
        match self.role {
            FileRole::Header => Inclusion::Library(self.library.clone()),
            FileRole::Source | FileRole::CommandLine => Inclusion::Unit {
                library: self.library.clone(),
                path: self.path.clone(),
            },
        }
    }
}

/// Maps include names to the libraries and units they refer to.
#[derive(Debug, Clone, Default)]
pub struct IncludeIndex {
    provides: HashMap<String, String>,
    units: Vec<IndexedUnit>,
}

/// Components of an include name usable as a path suffix: everything after
/// the last `..`, without `.` components.
fn include_suffix(header: &str) -> PathBuf {
    let components: Vec<Component<'_>> = Path::new(header).components().collect();
    let start = components
        .iter()
        .rposition(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        .map_or(0, |i| i + 1);
    components[start..]
        .iter()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// Resolves when every candidate leads to the same inclusion.
fn pick<'i>(candidates: impl Iterator<Item = &'i IndexedUnit>) -> Option<Resolution> {
    let found: Vec<&IndexedUnit> = candidates.collect();
    let first = found.first()?.inclusion();
    if found.iter().all(|u| u.inclusion() == first) {
        Some(Resolution::Resolved(first))
    } else {
        Some(Resolution::Ambiguous(
            found.iter().map(|u| u.path.clone()).collect(),
        ))
    }
}

impl IncludeIndex {
    /// Indexes every scanned file of every library by its relative path.
    pub fn new(libraries: &[Library]) -> Self {
        let units = libraries
            .iter()
            .flat_map(|lib| {
                lib.units
                    .iter()
                    .filter(|u| u.role != FileRole::CommandLine)
                    .map(|u| IndexedUnit {
                        library: lib.name.clone(),
                        path: u.path.clone(),
                        role: u.role,
                    })
            })
            .collect();
        Self {
            provides: HashMap::new(),
            units,
        }
    }

    /// Adds extra include names resolving to `library`.
    pub fn with_provides<S: AsRef<str>>(mut self, library: &str, names: &[S]) -> Self {
        for name in names {
            let name = name.as_ref();
            if let Some(existing) = self.provides.get(name) {
                if existing != library {
                    debug!(include = name, kept = %existing, ignored = library, "include name provided twice");
                }
                continue;
            }
            self.provides.insert(name.to_string(), library.to_string());
        }
        self
    }

    /// Resolves one include name.
    ///
    /// Order: an explicit `provides` entry, then files whose relative path
    /// ends with the include path (`"b/util.c"` only matches `.../b/util.c`),
    /// then files with the same file name (`"vendor/lib.h"` finds `inc/lib.h`).
    /// A stage matching files of different inclusions is ambiguous.
    pub fn lookup(&self, header: &str) -> Resolution {
        if let Some(library) = self.provides.get(header) {
            return Resolution::Resolved(Inclusion::Library(library.clone()));
        }

        let suffix = include_suffix(header);
        let Some(file_name) = suffix.file_name() else {
            return Resolution::Unresolved;
        };
        if let Some(found) = pick(self.units.iter().filter(|u| u.path.ends_with(&suffix))) {
            return found;
        }

        if let Some(library) = file_name.to_str().and_then(|n| self.provides.get(n)) {
            return Resolution::Resolved(Inclusion::Library(library.clone()));
        }
        pick(
            self.units
                .iter()
                .filter(|u| u.path.file_name() == Some(file_name)),
        )
        .unwrap_or(Resolution::Unresolved)
    }

    /// Like [`IncludeIndex::lookup`], with ambiguous names left unresolved.
    pub fn resolve(&self, header: &str) -> Option<Inclusion> {
        match self.lookup(header) {
            Resolution::Resolved(inclusion) => Some(inclusion),
            Resolution::Ambiguous(_) | Resolution::Unresolved => None,
        }
    }

    /// Resolves the `#include` directives of a consumer unit.
    ///
    /// Quoted includes that match nothing produce an `UnresolvedInclude`
    /// warning, angle includes that match nothing are system headers.
    /// Ambiguous includes of either form produce an `AmbiguousInclude` warning.
    pub fn resolve_includes(&self, consumer: &TranslationUnit) -> (Vec<Inclusion>, Vec<Warning>) {
        let mut inclusions = Vec::new();
        let mut warnings = Vec::new();

        for IncludeDirective { header, form, line } in &consumer.includes {
            match (self.lookup(header), form) {
                (Resolution::Resolved(inclusion), _) => inclusions.push(inclusion),
                (Resolution::Ambiguous(candidates), _) => {
                    warn!(file = %consumer.path.display(), line, header = %header, "ambiguous include");
                    warnings.push(Warning::new(
                        &consumer.path,
                        Some(*line),
                        WarningKind::AmbiguousInclude {
                            header: header.clone(),
                            candidates,
                        },
                    ));
                }
                (Resolution::Unresolved, IncludeForm::Quoted) => {
                    warn!(file = %consumer.path.display(), line, header = %header, "unresolved include");
                    warnings.push(Warning::new(
                        &consumer.path,
                        Some(*line),
                        WarningKind::UnresolvedInclude {
                            header: header.clone(),
                        },
                    ));
                }
                (Resolution::Unresolved, IncludeForm::Angled) => {}
            }
        }

        (inclusions, warnings)
    }
}

/// Leak analysis of one consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerAnalysis {
    pub consumer: PathBuf,
    pub inclusions: Vec<Inclusion>,
    /// Visible names and how each one became visible
    pub visible: BTreeMap<String, BTreeSet<Exposure>>,
    /// Libraries checked, in configuration order
    pub relevant: Vec<String>,
    pub leaks: Vec<Leak>,
}

/// Computes the visible set of a consumer.
pub fn visible_set(
    inclusions: &[Inclusion],
    libraries: &[Library],
    graph: &DependencyGraph<'_>,
) -> BTreeMap<String, BTreeSet<Exposure>> {
    let by_name: HashMap<&str, &Library> = libraries.iter().map(|l| (l.name.as_str(), l)).collect();
    let mut visible: BTreeMap<String, BTreeSet<Exposure>> = BTreeMap::new();

    let roots = inclusions.iter().filter_map(|inc| match inc {
        Inclusion::Library(name) => Some(name.as_str()),
        Inclusion::Unit { .. } => None,
    });
    for lib_name in graph.public_closure(roots) {
        let Some(lib) = by_name.get(lib_name) else {
            continue;
        };
        for name in &lib.public {
            visible.entry(name.clone()).or_default().insert(Exposure::Library {
                library: lib.name.clone(),
            });
        }
    }

    for inclusion in inclusions {
        let Inclusion::Unit { library, path } = inclusion else {
            continue;
        };
        let unit = by_name
            .get(library.as_str())
            .and_then(|lib| lib.units.iter().find(|u| &u.path == path));
        if let Some(unit) = unit {
            for name in unit.names() {
                visible
                    .entry(name.to_string())
                    .or_default()
                    .insert(Exposure::File { path: path.clone() });
            }
        }
    }

    visible
}

/// Checks one consumer against every library relevant to it.
///
/// Relevant libraries are the included ones, their transitive dependencies,
/// and the owners of textually included units.
pub fn detect_leaks(
    consumer: &Path,
    inclusions: Vec<Inclusion>,
    libraries: &[Library],
    graph: &DependencyGraph<'_>,
) -> ConsumerAnalysis {
    let visible = visible_set(&inclusions, libraries, graph);

    let roots = inclusions.iter().filter_map(|inc| match inc {
        Inclusion::Library(name) => Some(name.as_str()),
        Inclusion::Unit { .. } => None,
    });
    let mut relevant_set: HashSet<&str> = graph.public_closure(roots).into_iter().collect();
    relevant_set.extend(inclusions.iter().map(Inclusion::library));

    let relevant: Vec<&Library> = libraries
        .iter()
        .filter(|l| relevant_set.contains(l.name.as_str()))
        .collect();

    let mut leaks = Vec::new();
    for lib in &relevant {
        for (name, via) in &visible {
            if lib.internal.contains(name) {
                warn!(
                    consumer = %consumer.display(),
                    library = %lib.name,
                    name = %name,
                    "internal macro leaked"
                );
                leaks.push(Leak {
                    consumer: consumer.to_path_buf(),
                    library: lib.name.clone(),
                    name: name.clone(),
                    via: via.iter().cloned().collect(),
                });
            }
        }
    }

    debug!(
        consumer = %consumer.display(),
        visible = visible.len(),
        relevant = relevant.len(),
        leaks = leaks.len(),
        "checked consumer"
    );

    ConsumerAnalysis {
        consumer: consumer.to_path_buf(),
        inclusions,
        visible,
        relevant: relevant.iter().map(|l| l.name.clone()).collect(),
        leaks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::scope::{FileRole, ScopeRule};
    use crate::table::build_unit;

    fn library(name: &str, files: &[(&str, &str)]) -> Library {
        let rule = ScopeRule::default();
        let units = files
            .iter()
            .map(|(path, src)| {
                let role = FileRole::from_path(Path::new(path)).unwrap();
                build_unit(Path::new(path), role, src, &rule).0
            })
            .collect();
        classify(name, units, &rule)
    }

    fn no_deps(libs: &[Library]) -> DependencyGraph<'_> {
        DependencyGraph::build(libs.iter().map(|l| (l.name.as_str(), &[][..]))).unwrap()
    }

    fn lib_source() -> &'static str {
        "#define LIB_INTERNAL_DEBUG 1\n#define LIB_PUBLIC_VERSION_MAJOR 2\n#define LIB_PUBLIC_VERSION_MINOR 5\n"
    }

    #[test]
    fn test_public_header_include_passes() {
        let libs = vec![library("lib", &[("lib.h", ""), ("lib.c", lib_source())])];
        let graph = no_deps(&libs);
        let analysis = detect_leaks(
            Path::new("main.c"),
            vec![Inclusion::Library("lib".into())],
            &libs,
            &graph,
        );
        assert_eq!(
            analysis.visible.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["LIB_PUBLIC_VERSION_MAJOR", "LIB_PUBLIC_VERSION_MINOR"]
        );
        assert!(analysis.leaks.is_empty());
        assert_eq!(analysis.relevant, vec!["lib".to_string()]);
    }

    #[test]
    fn test_textual_source_include_leaks() {
        let libs = vec![library("lib", &[("lib.h", ""), ("lib.c", lib_source())])];
        let graph = no_deps(&libs);
        let analysis = detect_leaks(
            Path::new("main.c"),
            vec![
                Inclusion::Library("lib".into()),
                Inclusion::Unit {
                    library: "lib".into(),
                    path: PathBuf::from("lib.c"),
                },
            ],
            &libs,
            &graph,
        );
        assert_eq!(analysis.leaks.len(), 1);
        let leak = &analysis.leaks[0];
        assert_eq!(leak.name, "LIB_INTERNAL_DEBUG");
        assert_eq!(leak.library, "lib");
        assert_eq!(
            leak.via,
            vec![Exposure::File {
                path: PathBuf::from("lib.c")
            }]
        );
        // Public names are seen both ways
        assert_eq!(analysis.visible["LIB_PUBLIC_VERSION_MAJOR"].len(), 2);
    }

    #[test]
    fn test_two_libraries_without_collisions_pass() {
        let libs = vec![
            library("lib1", &[("lib1.c", "#define LIB1_PUBLIC_VERSION 100\n#define LIB1_INTERNAL_DEBUG 1\n")]),
            library("lib2", &[("lib2.c", "#define LIB2_PUBLIC_VERSION 200\n#define LIB2_INTERNAL_DEBUG 1\n")]),
        ];
        let graph = no_deps(&libs);
        let analysis = detect_leaks(
            Path::new("main.c"),
            vec![Inclusion::Library("lib2".into()), Inclusion::Library("lib1".into())],
            &libs,
            &graph,
        );
        assert!(analysis.leaks.is_empty());
        assert_eq!(analysis.visible.len(), 2);
        // Configuration order, not inclusion order
        assert_eq!(analysis.relevant, vec!["lib1".to_string(), "lib2".to_string()]);
    }

    #[test]
    fn test_public_name_of_one_library_internal_to_another() {
        let one = library("one", &[("one.c", "#define PUBLIC_LEVEL 1\n")]);
        let rule = ScopeRule::Manifest {
            public: BTreeSet::new(),
            internal: ["PUBLIC_LEVEL".to_string()].into(),
            unmarked: crate::scope::Scope::Internal,
        };
        let unit = build_unit(Path::new("two.c"), FileRole::Source, "#define PUBLIC_LEVEL 2\n", &rule).0;
        let libs = vec![one, classify("two", vec![unit], &rule)];
        let graph = no_deps(&libs);

        let analysis = detect_leaks(
            Path::new("main.c"),
            vec![Inclusion::Library("one".into()), Inclusion::Library("two".into())],
            &libs,
            &graph,
        );
        assert_eq!(analysis.leaks.len(), 1);
        assert_eq!(analysis.leaks[0].library, "two");
        assert_eq!(
            analysis.leaks[0].via,
            vec![Exposure::Library {
                library: "one".into()
            }]
        );
    }

    #[test]
    fn test_dependency_surface_is_visible_and_checked() {
        let libs = vec![
            library("app", &[("app.c", "#define APP_PUBLIC_ID 1\n")]),
            library("core", &[("core.c", "#define CORE_PUBLIC_ABI 3\n#define CORE_INTERNAL_POOL 8\n")]),
        ];
        let app_deps = vec!["core".to_string()];
        let core_deps: Vec<String> = Vec::new();
        let graph = DependencyGraph::build([
            ("app", app_deps.as_slice()),
            ("core", core_deps.as_slice()),
        ])
        .unwrap();

        let analysis = detect_leaks(
            Path::new("main.c"),
            vec![Inclusion::Library("app".into())],
            &libs,
            &graph,
        );
        assert!(analysis.visible.contains_key("CORE_PUBLIC_ABI"));
        assert!(!analysis.visible.contains_key("CORE_INTERNAL_POOL"));
        assert_eq!(analysis.relevant, vec!["app".to_string(), "core".to_string()]);
        assert!(analysis.leaks.is_empty());
    }

    #[test]
    fn test_include_index_resolution() {
        let libs = vec![library("lib", &[("inc/lib.h", ""), ("src/lib.c", lib_source())])];
        let index = IncludeIndex::new(&libs).with_provides("lib", &["lib/api.h"]);

        assert_eq!(index.resolve("lib.h"), Some(Inclusion::Library("lib".into())));
        assert_eq!(index.resolve("lib/api.h"), Some(Inclusion::Library("lib".into())));
        assert_eq!(index.resolve("vendor/lib.h"), Some(Inclusion::Library("lib".into())));
        assert_eq!(
            index.resolve("lib.c"),
            Some(Inclusion::Unit {
                library: "lib".into(),
                path: PathBuf::from("src/lib.c")
            })
        );
        assert_eq!(index.resolve("other.h"), None);
    }

    #[test]
    fn test_same_file_name_resolved_by_path() {
        let libs = vec![
            library("a", &[("a/util.c", "#define A_INTERNAL_X 1\n")]),
            library("b", &[("b/util.c", "#define B_INTERNAL_Y 1\n")]),
        ];
        let index = IncludeIndex::new(&libs);
        let b_util = Inclusion::Unit {
            library: "b".into(),
            path: PathBuf::from("b/util.c"),
        };

        assert_eq!(index.resolve("b/util.c"), Some(b_util.clone()));
        assert_eq!(index.resolve("../b/util.c"), Some(b_util.clone()));
        assert_eq!(index.resolve("./b/util.c"), Some(b_util));
        assert_eq!(
            index.lookup("util.c"),
            Resolution::Ambiguous(vec![PathBuf::from("a/util.c"), PathBuf::from("b/util.c")])
        );
        assert_eq!(index.resolve("util.c"), None);
        // No path suffix matches, the file name is still ambiguous
        assert!(matches!(index.lookup("c/util.c"), Resolution::Ambiguous(_)));
    }

    #[test]
    fn test_same_header_name_in_two_libraries() {
        let libs = vec![
            library("a", &[("a/config.h", "")]),
            library("b", &[("b/config.h", "")]),
        ];
        let index = IncludeIndex::new(&libs).with_provides("b", &["config.h"]);

        assert_eq!(index.resolve("a/config.h"), Some(Inclusion::Library("a".into())));
        assert_eq!(index.resolve("b/config.h"), Some(Inclusion::Library("b".into())));
        // An explicit provides entry settles the bare name
        assert_eq!(index.resolve("config.h"), Some(Inclusion::Library("b".into())));
    }

    #[test]
    fn test_ambiguous_include_warns() {
        let libs = vec![
            library("a", &[("a/util.c", "")]),
            library("b", &[("b/util.c", "")]),
        ];
        let index = IncludeIndex::new(&libs);
        let consumer = build_unit(
            Path::new("main.c"),
            FileRole::Source,
            "#include \"util.c\"\n",
            &ScopeRule::default(),
        )
        .0;

        let (inclusions, warnings) = index.resolve_includes(&consumer);
        assert!(inclusions.is_empty());
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].to_string(),
            "main.c:1: ambiguous include \"util.c\" matches a/util.c, b/util.c"
        );
    }

    #[test]
    fn test_resolve_includes_warns_on_quoted_only() {
        let libs = vec![library("lib", &[("lib.h", "")])];
        let index = IncludeIndex::new(&libs);
        let consumer = build_unit(
            Path::new("main.c"),
            FileRole::Source,
            "#include <stdio.h>\n#include \"lib.h\"\n#include \"missing.h\"\n",
            &ScopeRule::default(),
        )
        .0;

        let (inclusions, warnings) = index.resolve_includes(&consumer);
        assert_eq!(inclusions, vec![Inclusion::Library("lib".into())]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].line, Some(3));
        assert!(matches!(
            &warnings[0].kind,
            WarningKind::UnresolvedInclude { header } if header == "missing.h"
        ));
    }
}
