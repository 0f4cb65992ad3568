//! Dependency values: module dependencies and dependency constraints.

use std::fmt;
use std::ptr;
use std::str::FromStr;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::DependencyError;

/// Version requirements attached to a dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionConstraint {
    preferred: Option<CompactString>,
    strict: Option<CompactString>,
    rejected: Vec<CompactString>,
}

impl VersionConstraint {
    pub fn new(preferred: Option<&str>) -> Self {
        Self {
            preferred: preferred.map(CompactString::from),
            ..Self::default()
        }
    }

    /// The version that will be selected when nothing else requires one.
    pub fn preferred(&self) -> Option<&str> {
        self.strict.as_deref().or(self.preferred.as_deref())
    }

    pub fn strict(&self) -> Option<&str> {
        self.strict.as_deref()
    }

    pub fn rejected(&self) -> &[CompactString] {
        &self.rejected
    }

    pub fn prefer(&mut self, version: &str) {
        self.preferred = Some(version.into());
        self.strict = None;
    }

    /// Require exactly `version`; replaces any preference.
    pub fn strictly(&mut self, version: &str) {
        self.strict = Some(version.into());
        self.preferred = Some(version.into());
    }

    pub fn reject(&mut self, version: &str) {
        if !self.rejected.iter().any(|r| r == version) {
            self.rejected.push(version.into());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.preferred.is_none() && self.strict.is_none() && self.rejected.is_empty()
    }
}

/// Kinds of [`Dependency`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum DependencyKind {
    Module,
    Constraint,
}

/// A dependency on an external module, `group:name:version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalModule {
    pub group: Option<CompactString>,
    pub name: CompactString,
    pub version: Option<CompactString>,
}

/// A constraint on the version of a module, without depending on it.
///
/// A value type: [`copy`](Self::copy) yields an independent instance that
/// compares content-equal to the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyConstraint {
    group: Option<CompactString>,
    name: CompactString,
    version: VersionConstraint,
}

impl DependencyConstraint {
    pub fn new(group: Option<&str>, name: &str, version: Option<&str>) -> Self {
        Self {
            group: group.map(CompactString::from),
            name: name.into(),
            version: VersionConstraint::new(version),
        }
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.preferred()
    }

    pub fn version_constraint(&self) -> &VersionConstraint {
        &self.version
    }

    pub fn version_constraint_mut(&mut self) -> &mut VersionConstraint {
        &mut self.version
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Same instance, else another constraint with equal group, name and
    /// version constraint. Never equal to a different kind of dependency.
    pub fn content_equals(&self, other: &Dependency) -> bool {
        match other {
            Dependency::Constraint(that) => ptr::eq(self, that) || self.same_fields(that),
            Dependency::Module(_) => false,
        }
    }

    /// Field-wise comparison against `other`, which must also be a
    /// constraint.
    pub fn compare_structure(&self, other: &Dependency) -> Result<bool, DependencyError> {
        match other {
            Dependency::Constraint(that) => Ok(self.same_fields(that)),
            other => Err(DependencyError::StructuralMismatch {
                expected: DependencyKind::Constraint,
                found: other.kind(),
            }),
        }
    }

    fn same_fields(&self, that: &Self) -> bool {
        self.group == that.group && self.name == that.name && self.version == that.version
    }
}

impl fmt::Display for DependencyConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group.as_deref().unwrap_or(""), self.name)?;
        if let Some(version) = self.version() {
            write!(f, ":{version}")?;
        }
        Ok(())
    }
}

/// Parses `group:name[:version]` or `name`.
impl FromStr for DependencyConstraint {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| DependencyError::InvalidNotation {
            notation: s.to_string(),
            reason,
        };
        let parts: Vec<&str> = s.trim().split(':').collect();
        let (group, name, version) = match parts.as_slice() {
            [name] => (None, *name, None),
            [group, name] => (Some(*group), *name, None),
            [group, name, version] => (Some(*group), *name, Some(*version)),
            _ => return Err(invalid("expected group:name:version")),
        };
        if name.is_empty() {
            return Err(invalid("missing module name"));
        }
        let group = group.filter(|g| !g.is_empty());
        let version = version.filter(|v| !v.is_empty());
        Ok(Self::new(group, name, version))
    }
}

/// Any declared dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dependency {
    Module(ExternalModule),
    Constraint(DependencyConstraint),
}

impl Dependency {
    pub fn kind(&self) -> DependencyKind {
        match self {
            Self::Module(_) => DependencyKind::Module,
            Self::Constraint(_) => DependencyKind::Constraint,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Module(m) => &m.name,
            Self::Constraint(c) => c.name(),
        }
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Same instance, else same kind, else field-wise equality.
    pub fn content_equals(&self, other: &Dependency) -> bool {
        if ptr::eq(self, other) {
            return true;
        }
        match (self, other) {
            (Self::Constraint(c), _) => c.content_equals(other),
            (Self::Module(a), Self::Module(b)) => a == b,
            _ => false,
        }
    }
}
