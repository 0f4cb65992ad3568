//! Dependency declaration errors.

use compact_str::CompactString;
use thiserror::Error;

use crate::constraint::DependencyKind;

/// Errors raised while declaring dependencies and constraints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// No configuration with this name in the container.
    #[error("Configuration with name '{name}' not found")]
    UnknownConfiguration { name: CompactString },

    /// The declaration is not allowed against this configuration.
    #[error("{message}")]
    InvalidConfigurationUsage { message: String },

    /// The notation cannot be turned into a dependency.
    #[error("Cannot convert '{notation}' to a dependency: {reason}")]
    InvalidNotation { notation: String, reason: &'static str },

    /// Extending would make a configuration inherit from itself.
    #[error("Configuration '{name}' would extend itself through '{via}'")]
    CircularExtension { name: CompactString, via: CompactString },

    /// Two dependencies of different kinds were compared structurally.
    #[error("Cannot compare a {expected} with a {found}")]
    StructuralMismatch {
        expected: DependencyKind,
        found: DependencyKind,
    },
}
