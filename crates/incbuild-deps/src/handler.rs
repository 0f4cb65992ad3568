//! Declaring dependency constraints against a configuration container.

use crate::configuration::{ConfigurationContainer, ConfigurationRef};
use crate::constraint::DependencyConstraint;
use crate::error::DependencyError;

/// What a constraint is declared from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyNotation {
    /// `group:name[:version]`.
    Coordinates(String),
    /// An already built constraint.
    Constraint(DependencyConstraint),
    /// Another configuration; declaring it makes the target inherit from it.
    Configuration(ConfigurationRef),
}

impl From<&str> for DependencyNotation {
    fn from(coordinates: &str) -> Self {
        Self::Coordinates(coordinates.to_string())
    }
}

impl From<DependencyConstraint> for DependencyNotation {
    fn from(constraint: DependencyConstraint) -> Self {
        Self::Constraint(constraint)
    }
}

impl From<ConfigurationRef> for DependencyNotation {
    fn from(reference: ConfigurationRef) -> Self {
        Self::Configuration(reference)
    }
}

/// Adds dependency constraints to the configurations of one project.
pub struct DependencyConstraintHandler<'a> {
    container: &'a mut ConfigurationContainer,
}

impl<'a> DependencyConstraintHandler<'a> {
    pub fn new(container: &'a mut ConfigurationContainer) -> Self {
        Self { container }
    }

    pub fn container(&self) -> &ConfigurationContainer {
        self.container
    }

    /// Declare `notation` on `configuration`.
    ///
    /// Returns the added constraint, or `None` when `notation` names a
    /// configuration, in which case `configuration` now extends it.
    pub fn add(
        &mut self,
        configuration: &str,
        notation: impl Into<DependencyNotation>,
    ) -> Result<Option<DependencyConstraint>, DependencyError> {
        self.add_with(configuration, notation, |_| {})
    }

    /// [`add`](Self::add), running `configure` on the new constraint before
    /// it is stored.
    pub fn add_with<F>(
        &mut self,
        configuration: &str,
        notation: impl Into<DependencyNotation>,
        configure: F,
    ) -> Result<Option<DependencyConstraint>, DependencyError>
    where
        F: FnOnce(&mut DependencyConstraint),
    {
        self.container.get_by_name(configuration)?;

        let notation = notation.into();
        if let DependencyNotation::Configuration(other) = &notation {
            if !self.container.contains(other) {
                return Err(DependencyError::InvalidConfigurationUsage {
                    message: "Currently you can only declare dependencies on configurations from the same project."
                        .to_string(),
                });
            }
            self.container.extend(configuration, &other.name)?;
            tracing::debug!(configuration, extends = %other.name, "configuration extended");
            return Ok(None);
        }

        let constraint = Self::build(notation, configure)?;
        self.container.get_mut(configuration)?.push_constraint(constraint.clone());
        tracing::debug!(configuration, constraint = %constraint, "dependency constraint added");
        Ok(Some(constraint))
    }

    /// Build a constraint without adding it anywhere.
    pub fn create(&self, notation: impl Into<DependencyNotation>) -> Result<DependencyConstraint, DependencyError> {
        Self::build(notation.into(), |_| {})
    }

    pub fn create_with<F>(
        &self,
        notation: impl Into<DependencyNotation>,
        configure: F,
    ) -> Result<DependencyConstraint, DependencyError>
    where
        F: FnOnce(&mut DependencyConstraint),
    {
        Self::build(notation.into(), configure)
    }

    fn build<F>(notation: DependencyNotation, configure: F) -> Result<DependencyConstraint, DependencyError>
    where
        F: FnOnce(&mut DependencyConstraint),
    {
        let mut constraint = match notation {
            DependencyNotation::Coordinates(text) => text.parse()?,
            DependencyNotation::Constraint(constraint) => constraint,
            DependencyNotation::Configuration(reference) => {
                return Err(DependencyError::InvalidNotation {
                    notation: format!("{}:{}", reference.project, reference.name),
                    reason: "a configuration is not a dependency constraint",
                });
            }
        };
        configure(&mut constraint);
        Ok(constraint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> ConfigurationContainer {
        let mut container = ConfigurationContainer::new(":app");
        container.create("implementation");
        container.create("api");
        container
    }

    #[test]
    fn test_add_coordinates() {
        let mut container = container();
        let mut handler = DependencyConstraintHandler::new(&mut container);
        let added = handler.add("implementation", "org.zlib:zlib:1.3").unwrap().unwrap();
        assert_eq!(added.version(), Some("1.3"));

        let config = container.get("implementation").unwrap();
        assert_eq!(config.dependency_constraints(), [added]);
    }

    #[test]
    fn test_configure_runs_before_store() {
        let mut container = container();
        let mut handler = DependencyConstraintHandler::new(&mut container);
        handler
            .add_with("api", "g:n:1.0", |c| c.version_constraint_mut().strictly("1.1"))
            .unwrap();
        let stored = &container.get("api").unwrap().dependency_constraints()[0];
        assert_eq!(stored.version(), Some("1.1"));
    }

    #[test]
    fn test_unknown_configuration() {
        let mut container = container();
        let mut handler = DependencyConstraintHandler::new(&mut container);
        assert_eq!(
            handler.add("runtime", "g:n:1"),
            Err(DependencyError::UnknownConfiguration { name: "runtime".into() })
        );
    }

    #[test]
    fn test_create_does_not_store() {
        let mut container = container();
        let handler = DependencyConstraintHandler::new(&mut container);
        let created = handler.create_with("g:n", |c| c.version_constraint_mut().reject("0.9")).unwrap();
        assert_eq!(created.version_constraint().rejected(), ["0.9"]);
        assert!(container.get("api").unwrap().dependency_constraints().is_empty());
    }

    #[test]
    fn test_create_from_configuration_is_invalid() {
        let mut container = container();
        let reference = container.reference("api");
        let handler = DependencyConstraintHandler::new(&mut container);
        assert!(matches!(
            handler.create(reference),
            Err(DependencyError::InvalidNotation { .. })
        ));
    }
}
