//! Builder pattern API for macvis analysis.
//!
//! Provides a fluent interface for configuring and running a visibility check:
//!
//! ```rust,ignore
//! use macvis_core::prelude::*;
//!
//! let analysis = Macvis::from_dir("/path/to/project")?
//!     .convention(Some(ConventionKind::Location))
//!     .analyze()?;
//!
//! let report = analysis.report();
//! std::process::exit(report.exit_code());
//! ```

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::classify::{classify, Library};
use crate::config::{load_config, load_config_file, LibraryConfig, MacvisConfig, CONFIG_FILE};
use crate::error::MacvisError;
use crate::graph::DependencyGraph;
use crate::leak::{detect_leaks, ConsumerAnalysis, IncludeIndex, Inclusion};
use crate::report::{Report, Warning, WarningKind};
use crate::scan::gather_sources_with_excludes;
use crate::scope::{ConventionKind, FileRole, ScopeRule};
use crate::table::{command_line_unit, load_unit, load_units, TranslationUnit};

/// Builder for configuring a visibility check.
#[derive(Debug, Clone)]
pub struct Macvis {
    /// Directory configured paths are relative to
    base_dir: PathBuf,

    config: MacvisConfig,

    /// Convention for libraries that do not name their own
    convention: Option<ConventionKind>,

    /// Overrides `[defaults] scan_includes`
    scan_includes: Option<bool>,

    /// Extra directories skipped when scanning library `dirs`
    excluded_dirs: Vec<String>,
}

impl Macvis {
    /// Create a builder for an already loaded configuration.
    pub fn new(config: MacvisConfig) -> Self {
        Self {
            base_dir: PathBuf::from("."),
            config,
            convention: None,
            scan_includes: None,
            excluded_dirs: Vec::new(),
        }
    }

    /// Load `<root>/macvis.toml`. A missing manifest is a [`MacvisError::MissingFile`].
    pub fn from_dir(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config = load_config(&root)?.ok_or_else(|| MacvisError::missing(root.join(CONFIG_FILE)))?;
        Ok(Self::new(config).base_dir(root))
    }

    /// Load an explicit manifest. Paths resolve relative to its directory.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = load_config_file(path)?;
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::new(config).base_dir(base))
    }

    /// Set the directory configured paths are relative to.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Override the default scope convention.
    pub fn convention(mut self, kind: Option<ConventionKind>) -> Self {
        self.convention = kind;
        self
    }

    /// Enable or disable resolving consumers' own `#include` directives.
    pub fn scan_includes(mut self, enabled: bool) -> Self {
        self.scan_includes = Some(enabled);
        self
    }

    /// Add directories to exclude when scanning library `dirs`.
    pub fn exclude_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.excluded_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    pub fn config(&self) -> &MacvisConfig {
        &self.config
    }

    /// Run the whole pipeline.
    ///
    /// Fatal: invalid configuration, dependency cycles, missing files.
    /// Everything else ends up in the returned [`Analysis`].
    pub fn analyze(&self) -> Result<Analysis> {
        let manifest = self.base_dir.join(CONFIG_FILE);
        self.config.validate(&manifest)?;

        info!(
            libraries = self.config.libraries.len(),
            consumers = self.config.consumers.len(),
            base = %self.base_dir.display(),
            "analysis started"
        );

        // 1. Dependency graph (cycles are fatal before any file is read)
        let graph = DependencyGraph::build(
            self.config
                .libraries
                .iter()
                .map(|l| (l.name.as_str(), l.dependencies.as_slice())),
        )
        .with_context(|| format!("Invalid library dependencies in {}", manifest.display()))?;
        let build_order: Vec<String> = graph
            .build_order()?
            .into_iter()
            .map(str::to_string)
            .collect();
        debug!(order = ?build_order, "library build order");

        // 2. Scan and classify every library
        let mut warnings = Vec::new();
        let mut libraries = Vec::with_capacity(self.config.libraries.len());
        for lib_cfg in &self.config.libraries {
            let (library, lib_warnings) = self.build_library(lib_cfg)?;
            warnings.extend(lib_warnings);
            libraries.push(library);
        }

        // 3. Check every consumer
        let index = self.config.libraries.iter().fold(
            IncludeIndex::new(&libraries),
            |index, lib| index.with_provides(&lib.name, lib.provides.as_slice()),
        );
        let scan_includes = self
            .scan_includes
            .unwrap_or(self.config.defaults.scan_includes);

        let mut consumers = Vec::with_capacity(self.config.consumers.len());
        for consumer in &self.config.consumers {
            let display = normalize(&consumer.file);
            let full = self.base_dir.join(&consumer.file);
            let role = FileRole::from_path(&full).unwrap_or(FileRole::Source);
            let (mut unit, mut unit_warnings) = load_unit(&full, role, &ScopeRule::default())
                .with_context(|| format!("Failed to scan consumer {}", display.display()))?;
            relabel(&mut unit, &mut unit_warnings, &display);
            warnings.extend(unit_warnings);

            let mut inclusions: Vec<Inclusion> = consumer
                .libraries
                .iter()
                .map(|name| Inclusion::Library(name.clone()))
                .collect();

            for file in &consumer.files {
                let wanted = normalize(file);
                match find_unit(&libraries, &wanted) {
                    Some(inclusion) => inclusions.push(inclusion),
                    None => {
                        if !self.base_dir.join(file).exists() {
                            return Err(MacvisError::missing(self.base_dir.join(file)).into());
                        }
                        warnings.push(Warning::new(
                            &display,
                            None,
                            WarningKind::UnresolvedInclude {
                                header: wanted.display().to_string(),
                            },
                        ));
                    }
                }
            }

            if scan_includes {
                let (scanned, include_warnings) = index.resolve_includes(&unit);
                inclusions.extend(scanned);
                warnings.extend(include_warnings);
            }

            let mut seen = Vec::with_capacity(inclusions.len());
            for inclusion in inclusions {
                if !seen.contains(&inclusion) {
                    seen.push(inclusion);
                }
            }

            consumers.push(detect_leaks(&display, seen, &libraries, &graph));
        }

        let dependencies = graph
            .edges()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();

        let analysis = Analysis {
            libraries,
            consumers,
            dependencies,
            build_order,
            warnings,
        };
        info!(
            leaks = analysis.leak_count(),
            conflicts = analysis.conflict_count(),
            warnings = analysis.warnings.len(),
            "analysis finished"
        );
        Ok(analysis)
    }

    /// Files configured for one library: `(path on disk, display path, role)`.
    fn library_files(&self, lib: &LibraryConfig) -> Result<Vec<(PathBuf, PathBuf, FileRole)>> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        let explicit = lib
            .headers
            .iter()
            .map(|p| (p, FileRole::Header))
            .chain(lib.sources.iter().map(|p| (p, FileRole::Source)));
        for (path, role) in explicit {
            let display = normalize(path);
            if seen.insert(display.clone()) {
                files.push((self.base_dir.join(path), display, role));
            }
        }

        let excludes: Vec<&str> = self.excluded_dirs.iter().map(String::as_str).collect();
        for dir in &lib.dirs {
            let found = gather_sources_with_excludes(&self.base_dir.join(dir), &excludes)
                .with_context(|| format!("Failed to scan directory of library '{}'", lib.name))?;
            for (full, role) in found {
                let display = normalize(full.strip_prefix(&self.base_dir).unwrap_or(&full));
                if seen.insert(display.clone()) {
                    files.push((full, display, role));
                }
            }
        }

        Ok(files)
    }

    fn build_library(&self, lib: &LibraryConfig) -> Result<(Library, Vec<Warning>)> {
        let rule = lib.scope_rule(&self.config.defaults, self.convention);
        let files = self.library_files(lib)?;
        debug!(library = %lib.name, files = files.len(), convention = %rule.kind(), "scanning library");

        let to_load: Vec<(PathBuf, FileRole)> = files
            .iter()
            .map(|(full, _, role)| (full.clone(), *role))
            .collect();
        let loaded = load_units(&to_load, &rule)
            .with_context(|| format!("Failed to scan library '{}'", lib.name))?;

        let mut units = Vec::with_capacity(loaded.len() + 1);
        let mut warnings = Vec::new();
        for ((mut unit, mut unit_warnings), (_, display, _)) in loaded.into_iter().zip(&files) {
            relabel(&mut unit, &mut unit_warnings, display);
            units.push(unit);
            warnings.extend(unit_warnings);
        }

        if !lib.defines.is_empty() || !lib.public_defines.is_empty() {
            let (unit, cli_warnings) = command_line_unit(&lib.name, &lib.defines, &lib.public_defines);
            units.push(unit);
            warnings.extend(cli_warnings);
        }

        Ok((classify(&lib.name, units, &rule), warnings))
    }
}

/// Drops `.` components so `./lib.c` and `lib.c` compare equal.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Rewrites a unit (and its warnings) to report `display` instead of the on-disk path.
fn relabel(unit: &mut TranslationUnit, warnings: &mut [Warning], display: &Path) {
    for def in &mut unit.definitions {
        def.file = display.to_path_buf();
    }
    for warning in warnings.iter_mut() {
        if warning.path == unit.path {
            warning.path = display.to_path_buf();
        }
    }
    unit.path = display.to_path_buf();
}

/// Library file at `path`. A header stands for the library's public surface.
fn find_unit(libraries: &[Library], path: &Path) -> Option<Inclusion> {
    libraries.iter().find_map(|lib| {
        lib.units
            .iter()
            .find(|u| u.path == path)
            .map(|u| match u.role {
                FileRole::Header => Inclusion::Library(lib.name.clone()),
                FileRole::Source | FileRole::CommandLine => Inclusion::Unit {
                    library: lib.name.clone(),
                    path: u.path.clone(),
                },
            })
    })
}

/// Result of one analysis run.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Classified libraries, in configuration order
    pub libraries: Vec<Library>,
    /// Checked consumers, in configuration order
    pub consumers: Vec<ConsumerAnalysis>,
    /// `(library, dependency)` edges
    pub dependencies: Vec<(String, String)>,
    /// Library names, every library after all it depends on
    pub build_order: Vec<String>,
    pub warnings: Vec<Warning>,
}

impl Analysis {
    /// Renders the findings into a [`Report`].
    pub fn report(&self) -> Report {
        Report::new(&self.libraries, &self.consumers, self.warnings.clone())
            .with_build_order(self.build_order.clone())
    }

    pub fn library(&self, name: &str) -> Option<&Library> {
        self.libraries.iter().find(|l| l.name == name)
    }

    pub fn consumer(&self, file: &str) -> Option<&ConsumerAnalysis> {
        let wanted = normalize(Path::new(file));
        self.consumers.iter().find(|c| c.consumer == wanted)
    }

    pub fn leak_count(&self) -> usize {
        self.consumers.iter().map(|c| c.leaks.len()).sum()
    }

    pub fn conflict_count(&self) -> usize {
        self.libraries.iter().map(|l| l.conflicts.len()).sum()
    }

    /// No leaks and no conflicts.
    pub fn is_clean(&self) -> bool {
        self.leak_count() == 0 && self.conflict_count() == 0
    }
}
