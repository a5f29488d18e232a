//! macvis-core: macro visibility checking for C and C++ libraries.
//!
//! Libraries declare which of their preprocessor macros are PUBLIC (meant to
//! be seen by consumers through their headers) and which are INTERNAL
//! (confined to their own compilation units). This crate scans the
//! directives of every configured file, classifies each library's macros,
//! computes what every consumer can observe, and reports any consumer that
//! sees a macro its owner keeps internal.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use macvis_core::prelude::*;
//!
//! let analysis = Macvis::from_dir("/path/to/project")?.analyze()?;
//! let report = analysis.report();
//! print_plain(&report);
//! ```
//!
//! # Pipeline
//!
//! - [`directive`] and [`table`]: Macro Table Builder
//! - [`classify`]: Visibility Classifier
//! - [`leak`]: Cross-Unit Leak Detector
//! - [`report`]: Reporter
//!
//! Around it: [`config`] (`macvis.toml`), [`scope`] (scope conventions),
//! [`graph`] (library dependencies), [`scan`] (file discovery), [`builder`]
//! (fluent driver) and [`error`] (typed errors).
//!
//! # Cargo Features
//!
//! - `dot` (default): Graphviz export of the inclusion graph
//! - `full`: Enable all optional features

pub mod builder;
pub mod classify;
pub mod config;
pub mod directive;
pub mod error;
pub mod graph;
pub mod leak;
pub mod logging;
pub mod prelude;
pub mod report;
pub mod scan;
pub mod scope;
pub mod table;

#[cfg(feature = "dot")]
pub mod visualize;

// ============================================================================
// Explicit Re-exports (avoiding glob imports for clear API surface)
// ============================================================================

// Error types
pub use error::{IoResultExt, MacvisError, MacvisResult};

// Builder API
pub use builder::{Analysis, Macvis};

// Configuration
pub use config::{
    load_config, load_config_file, ConsumerConfig, DefaultsConfig, LibraryConfig, MacvisConfig,
    OutputConfig, OutputFormat, CONFIG_FILE,
};

// Macro Table Builder
pub use directive::{logical_lines, parse_directive, Directive, IncludeForm, LogicalLine};
pub use table::{
    build_unit, command_line_unit, load_unit, load_units, IncludeDirective, MacroDefinition,
    MacroValue, TranslationUnit, UndefEvent,
};

// Scope conventions
pub use scope::{ConventionKind, FileRole, Scope, ScopeRule};

// Visibility Classifier
pub use classify::{classify, Conflict, ConflictKind, Library};

// Library dependencies
pub use graph::DependencyGraph;

// Cross-Unit Leak Detector
pub use leak::{
    detect_leaks, visible_set, ConsumerAnalysis, Exposure, IncludeIndex, Inclusion, Leak,
    Resolution,
};

// Reporting
pub use report::{
    print_json, print_plain, ConsumerVerdict, LibraryVerdict, PairVerdict, Report, Verdict,
    Warning, WarningKind,
};

// File discovery
pub use scan::{gather_sources, gather_sources_with_excludes};

// Logging
pub use logging::init_structured_logging;

#[cfg(feature = "dot")]
pub use visualize::generate_dot;
