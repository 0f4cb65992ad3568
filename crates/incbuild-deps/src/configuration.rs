//! Named configurations of one project and their container.

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::constraint::DependencyConstraint;
use crate::error::DependencyError;

/// Names a configuration, possibly of another project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigurationRef {
    pub project: CompactString,
    pub name: CompactString,
}

/// A named bucket of dependency constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    name: CompactString,
    extends_from: Vec<CompactString>,
    dependency_constraints: Vec<DependencyConstraint>,
}

impl Configuration {
    fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            extends_from: Vec::new(),
            dependency_constraints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct parents, in declaration order.
    pub fn extends_from(&self) -> &[CompactString] {
        &self.extends_from
    }

    /// Constraints declared directly on this configuration.
    pub fn dependency_constraints(&self) -> &[DependencyConstraint] {
        &self.dependency_constraints
    }

    pub(crate) fn push_constraint(&mut self, constraint: DependencyConstraint) {
        self.dependency_constraints.push(constraint);
    }
}

/// The configurations of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationContainer {
    project: CompactString,
    configurations: IndexMap<CompactString, Configuration>,
}

impl ConfigurationContainer {
    pub fn new(project: &str) -> Self {
        Self {
            project: project.into(),
            configurations: IndexMap::new(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Create `name` if absent and return it.
    pub fn create(&mut self, name: &str) -> &mut Configuration {
        self.configurations
            .entry(CompactString::from(name))
            .or_insert_with(|| Configuration::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&Configuration> {
        self.configurations.get(name)
    }

    pub fn get_by_name(&self, name: &str) -> Result<&Configuration, DependencyError> {
        self.get(name).ok_or_else(|| DependencyError::UnknownConfiguration { name: name.into() })
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Result<&mut Configuration, DependencyError> {
        self.configurations
            .get_mut(name)
            .ok_or_else(|| DependencyError::UnknownConfiguration { name: name.into() })
    }

    /// A reference to `name` in this project.
    pub fn reference(&self, name: &str) -> ConfigurationRef {
        ConfigurationRef {
            project: self.project.clone(),
            name: name.into(),
        }
    }

    /// Whether `reference` names a configuration of this container.
    pub fn contains(&self, reference: &ConfigurationRef) -> bool {
        reference.project == self.project && self.configurations.contains_key(&reference.name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configurations.keys().map(CompactString::as_str)
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// Make `child` inherit everything declared on `parent`.
    pub fn extend(&mut self, child: &str, parent: &str) -> Result<(), DependencyError> {
        self.get_by_name(parent)?;
        if child == parent || self.hierarchy(parent).iter().any(|c| c.name() == child) {
            return Err(DependencyError::CircularExtension {
                name: child.into(),
                via: parent.into(),
            });
        }
        let config = self.get_mut(child)?;
        if !config.extends_from.iter().any(|p| p == parent) {
            config.extends_from.push(parent.into());
        }
        Ok(())
    }

    /// `name` followed by every configuration it inherits from,
    /// depth-first, each once.
    pub fn hierarchy(&self, name: &str) -> Vec<&Configuration> {
        let mut out: Vec<&Configuration> = Vec::new();
        let mut pending = vec![name];
        while let Some(next) = pending.pop() {
            let Some(config) = self.get(next) else { continue };
            if out.iter().any(|c| c.name == config.name) {
                continue;
            }
            out.push(config);
            pending.extend(config.extends_from.iter().rev().map(CompactString::as_str));
        }
        out
    }

    /// Every constraint visible through `name`, inherited ones included.
    pub fn all_dependency_constraints(&self, name: &str) -> Vec<&DependencyConstraint> {
        self.hierarchy(name)
            .into_iter()
            .flat_map(|c| c.dependency_constraints.iter())
            .collect()
    }
}
