//! Dependency constraint declarations.
//!
//! A small model of how a project declares version constraints on the
//! modules it consumes: named configurations that may extend each other,
//! and a handler that adds constraints to them.
//!
//! ```rust
//! use incbuild_deps::{ConfigurationContainer, DependencyConstraintHandler};
//!
//! let mut container = ConfigurationContainer::new(":app");
//! container.create("implementation");
//!
//! let mut handler = DependencyConstraintHandler::new(&mut container);
//! let added = handler.add("implementation", "org.zlib:zlib:1.3").unwrap();
//! assert_eq!(added.unwrap().version(), Some("1.3"));
//! ```

mod configuration;
mod constraint;
mod error;
mod handler;

pub use configuration::{Configuration, ConfigurationContainer, ConfigurationRef};
pub use constraint::{Dependency, DependencyConstraint, DependencyKind, ExternalModule, VersionConstraint};
pub use error::DependencyError;
pub use handler::{DependencyConstraintHandler, DependencyNotation};
