//! Configuration loading from macvis.toml.
//!
//! The manifest declares libraries (their headers, sources and scope
//! convention) and consumers (the file and what it includes). Paths are
//! resolved relative to the directory holding the manifest.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::MacvisError;
use crate::scope::{ConventionKind, Scope, ScopeRule};

/// Default manifest file name.
pub const CONFIG_FILE: &str = "macvis.toml";

/// Main configuration structure for macvis.toml.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MacvisConfig {
    /// Defaults applied to every library.
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// Output configuration.
    pub output: Option<OutputConfig>,
    /// Libraries whose macros are classified.
    #[serde(default, rename = "library")]
    pub libraries: Vec<LibraryConfig>,
    /// Consumers checked for leaks.
    #[serde(default, rename = "consumer")]
    pub consumers: Vec<ConsumerConfig>,
}

/// `[defaults]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub convention: ConventionKind,
    #[serde(default = "default_public_markers")]
    pub public_markers: Vec<String>,
    #[serde(default = "default_internal_markers")]
    pub internal_markers: Vec<String>,
    /// Scope for names without a marker or missing from the manifest lists.
    #[serde(default = "default_unmarked")]
    pub unmarked: Scope,
    /// Resolve consumers' own `#include` directives against the libraries.
    #[serde(default = "default_true")]
    pub scan_includes: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            convention: ConventionKind::default(),
            public_markers: default_public_markers(),
            internal_markers: default_internal_markers(),
            unmarked: default_unmarked(),
            scan_includes: true,
        }
    }
}

fn default_public_markers() -> Vec<String> {
    vec!["PUBLIC_".to_string()]
}

fn default_internal_markers() -> Vec<String> {
    vec!["INTERNAL_".to_string()]
}

fn default_unmarked() -> Scope {
    Scope::Internal
}

fn default_true() -> bool {
    true
}

/// Report rendering selected by `[output] format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

/// Output format configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub format: Option<OutputFormat>,
}

/// One `[[library]]` entry.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LibraryConfig {
    pub name: String,
    #[serde(default)]
    pub headers: Vec<PathBuf>,
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    /// Directories scanned recursively for headers and sources.
    #[serde(default)]
    pub dirs: Vec<PathBuf>,
    /// Include names (e.g. `lib.h`) that resolve to this library.
    #[serde(default)]
    pub provides: Vec<String>,
    /// Per-library override of `[defaults] convention`.
    pub convention: Option<ConventionKind>,
    pub public_markers: Option<Vec<String>>,
    pub internal_markers: Option<Vec<String>>,
    pub unmarked: Option<Scope>,
    /// Manifest convention: names declared public.
    #[serde(default)]
    pub public: Vec<String>,
    /// Manifest convention: names declared internal.
    #[serde(default)]
    pub internal: Vec<String>,
    /// Libraries whose public surface this library re-exports.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Private `-D` style defines for the library's own build.
    #[serde(default)]
    pub defines: Vec<String>,
    /// `-D` style defines exported to consumers.
    #[serde(default)]
    pub public_defines: Vec<String>,
}

impl LibraryConfig {
    /// Resolve this library's scope rule against the defaults.
    ///
    /// `override_kind` (from the CLI) replaces the default convention for
    /// libraries that do not name their own.
    pub fn scope_rule(
        &self,
        defaults: &DefaultsConfig,
        override_kind: Option<ConventionKind>,
    ) -> ScopeRule {
        let kind = self
            .convention
            .or(override_kind)
            .unwrap_or(defaults.convention);
        let unmarked = self.unmarked.unwrap_or(defaults.unmarked);

        match kind {
            ConventionKind::Prefix => ScopeRule::Prefix {
                public_markers: self
                    .public_markers
                    .clone()
                    .unwrap_or_else(|| defaults.public_markers.clone()),
                internal_markers: self
                    .internal_markers
                    .clone()
                    .unwrap_or_else(|| defaults.internal_markers.clone()),
                unmarked,
            },
            ConventionKind::Location => ScopeRule::Location,
            ConventionKind::Manifest => ScopeRule::Manifest {
                public: self.public.iter().cloned().collect::<BTreeSet<_>>(),
                internal: self.internal.iter().cloned().collect::<BTreeSet<_>>(),
                unmarked,
            },
        }
    }
}

/// One `[[consumer]]` entry.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConsumerConfig {
    pub file: PathBuf,
    /// Library names whose public headers the consumer includes.
    #[serde(default)]
    pub libraries: Vec<String>,
    /// Individual files the consumer includes textually.
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl MacvisConfig {
    /// Parse a manifest from text. `path` is only used for error messages.
    pub fn from_toml(content: &str, path: &Path) -> Result<Self> {
        let cfg: MacvisConfig = toml::from_str(content)
            .map_err(|e| MacvisError::config(path, e.to_string()))
            .with_context(|| format!("Invalid {}", path.display()))?;
        cfg.validate(path)?;
        Ok(cfg)
    }

    /// Structural checks that do not need the file system.
    pub fn validate(&self, path: &Path) -> Result<(), MacvisError> {
        let mut names = HashSet::new();
        for lib in &self.libraries {
            if lib.name.trim().is_empty() {
                return Err(MacvisError::config(path, "library with an empty name"));
            }
            if !names.insert(lib.name.as_str()) {
                return Err(MacvisError::config(
                    path,
                    format!("duplicate library name '{}'", lib.name),
                ));
            }
        }

        for lib in &self.libraries {
            for dep in &lib.dependencies {
                if !names.contains(dep.as_str()) {
                    return Err(MacvisError::config(
                        path,
                        format!("library '{}' depends on unknown library '{}'", lib.name, dep),
                    ));
                }
            }
        }

        for consumer in &self.consumers {
            for name in &consumer.libraries {
                if !names.contains(name.as_str()) {
                    return Err(MacvisError::config(
                        path,
                        format!(
                            "consumer '{}' includes unknown library '{}'",
                            consumer.file.display(),
                            name
                        ),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Output format from `[output]`, if set.
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output.as_ref().and_then(|o| o.format)
    }
}

/// Loads configuration from `<root>/macvis.toml` if it exists.
pub fn load_config(root: &Path) -> Result<Option<MacvisConfig>> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(None);
    }
    load_config_file(&path).map(Some)
}

/// Loads configuration from an explicit manifest path.
pub fn load_config_file(path: &Path) -> Result<MacvisConfig> {
    if !path.exists() {
        return Err(MacvisError::missing(path).into());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    MacvisConfig::from_toml(&content, path)
}
