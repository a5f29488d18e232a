//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use macvis_core::prelude::*;
//! ```
//!
//! Brings in the builder, the report and the types most callers touch.

// Error handling
pub use crate::error::{MacvisError, MacvisResult};

// Configuration
pub use crate::config::{load_config, load_config_file, MacvisConfig};

// Builder API
pub use crate::builder::{Analysis, Macvis};

// Pipeline types
pub use crate::classify::{Conflict, Library};
pub use crate::leak::{ConsumerAnalysis, Exposure, Leak};
pub use crate::scope::{ConventionKind, FileRole, Scope, ScopeRule};
pub use crate::table::{MacroDefinition, MacroValue, TranslationUnit};

// Reporting
pub use crate::report::{print_json, print_plain, Report, Verdict, Warning};

#[cfg(feature = "dot")]
pub use crate::visualize::generate_dot;
