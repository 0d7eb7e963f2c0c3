//! Uniqueness Registry
//!
//! Run-scoped record of every package name, dependency name and previous
//! name seen so far, together with the file it first appeared in.
//! Collisions are checked on insertion from both directions, so the result
//! does not depend on which file is walked first.

use std::collections::HashMap;
use std::fmt;

/// Where a name was first registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// The name with its original casing
    pub name: String,
    /// Document the record lives in
    pub location: String,
    /// For previous names: the package that declared it
    pub owner: Option<String>,
}

/// A rejected registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collision {
    /// Same-kind name already registered
    Duplicate { existing: Origin },
    /// Name used by a record of the other kind
    CrossKind { existing: Origin, existing_kind: NameKind },
    /// Package name equals another package's previous name, or vice versa
    PreviousName { existing: Origin },
    /// Previous name already claimed, compared case-insensitively
    DuplicatePreviousName { existing: Origin },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Package,
    Dependency,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Package => write!(f, "package"),
            NameKind::Dependency => write!(f, "dependency"),
        }
    }
}

impl fmt::Display for Collision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collision::Duplicate { existing } => write!(
                f,
                "Name {:?} must be unique, previously occurred in {}",
                existing.name, existing.location
            ),
            Collision::CrossKind { existing, existing_kind } => write!(
                f,
                "Name {:?} is already used by a {} in {}",
                existing.name, existing_kind, existing.location
            ),
            Collision::PreviousName { existing } => match &existing.owner {
                Some(owner) => write!(
                    f,
                    "Name {:?} collides with a previous name of {:?} in {}",
                    existing.name, owner, existing.location
                ),
                None => write!(
                    f,
                    "Previous name {:?} collides with the package of that name in {}",
                    existing.name, existing.location
                ),
            },
            Collision::DuplicatePreviousName { existing } => write!(
                f,
                "Previous name {:?} is already claimed by {:?} in {}",
                existing.name,
                existing.owner.as_deref().unwrap_or("?"),
                existing.location
            ),
        }
    }
}

/// Names seen during one validation run
#[derive(Debug, Default)]
pub struct UniquenessRegistry {
    packages: HashMap<String, Origin>,
    dependencies: HashMap<String, Origin>,
    /// Keyed by lowercased name; the origin keeps the written casing
    previous_names: HashMap<String, Origin>,
}

impl UniquenessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package name. On collision the name is not recorded.
    pub fn register_package(&mut self, name: &str, location: &str) -> Result<(), Collision> {
        if let Some(existing) = self.packages.get(name) {
            return Err(Collision::Duplicate { existing: existing.clone() });
        }
        if let Some(existing) = self.dependencies.get(name) {
            return Err(Collision::CrossKind {
                existing: existing.clone(),
                existing_kind: NameKind::Dependency,
            });
        }
        if let Some(existing) = self.previous_names.get(&name.to_lowercase()) {
            if existing.name == name {
                return Err(Collision::PreviousName { existing: existing.clone() });
            }
        }
        self.packages.insert(name.to_string(), origin(name, location, None));
        Ok(())
    }

    /// Register a dependency name against both namespaces
    pub fn register_dependency(&mut self, name: &str, location: &str) -> Result<(), Collision> {
        if let Some(existing) = self.dependencies.get(name) {
            return Err(Collision::Duplicate { existing: existing.clone() });
        }
        if let Some(existing) = self.packages.get(name) {
            return Err(Collision::CrossKind {
                existing: existing.clone(),
                existing_kind: NameKind::Package,
            });
        }
        self.dependencies.insert(name.to_string(), origin(name, location, None));
        Ok(())
    }

    /// Register a previous name declared by package `owner`
    pub fn register_previous_name(
        &mut self,
        previous: &str,
        owner: &str,
        location: &str,
    ) -> Result<(), Collision> {
        let key = previous.to_lowercase();
        if let Some(existing) = self.previous_names.get(&key) {
            return Err(Collision::DuplicatePreviousName { existing: existing.clone() });
        }
        if previous != owner {
            if let Some(existing) = self.packages.get(previous) {
                return Err(Collision::PreviousName { existing: existing.clone() });
            }
        }
        self.previous_names
            .insert(key, origin(previous, location, Some(owner)));
        Ok(())
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    /// Where a package name was registered
    pub fn package_origin(&self, name: &str) -> Option<&Origin> {
        self.packages.get(name)
    }
}

fn origin(name: &str, location: &str, owner: Option<&str>) -> Origin {
    Origin {
        name: name.to_string(),
        location: location.to_string(),
        owner: owner.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_names_case_sensitive() {
        let mut registry = UniquenessRegistry::new();
        registry.register_package("SublimeLinter", "s.json").unwrap();
        assert!(registry.register_package("sublimelinter", "s.json").is_ok());

        let err = registry.register_package("SublimeLinter", "t.json").unwrap_err();
        assert!(matches!(err, Collision::Duplicate { ref existing } if existing.location == "s.json"));
        assert_eq!(registry.package_count(), 2);
    }

    #[test]
    fn test_dependency_against_packages() {
        let mut registry = UniquenessRegistry::new();
        registry.register_package("requests", "r.json").unwrap();
        let err = registry.register_dependency("requests", "dependencies.json").unwrap_err();
        assert!(matches!(err, Collision::CrossKind { existing_kind: NameKind::Package, .. }));

        registry.register_dependency("pyyaml", "dependencies.json").unwrap();
        let err = registry.register_package("pyyaml", "p.json").unwrap_err();
        assert!(matches!(err, Collision::CrossKind { existing_kind: NameKind::Dependency, .. }));
    }

    #[test]
    fn test_previous_name_collision_both_orders() {
        let mut registry = UniquenessRegistry::new();
        registry.register_previous_name("Old Name", "New Name", "n.json").unwrap();
        let err = registry.register_package("Old Name", "o.json").unwrap_err();
        assert!(matches!(err, Collision::PreviousName { .. }));
        // different casing is a distinct package name
        assert!(registry.register_package("old name", "o.json").is_ok());

        let mut registry = UniquenessRegistry::new();
        registry.register_package("Taken", "t.json").unwrap();
        let err = registry.register_previous_name("Taken", "Other", "o.json").unwrap_err();
        assert!(matches!(err, Collision::PreviousName { .. }));
    }

    #[test]
    fn test_previous_names_case_insensitive() {
        let mut registry = UniquenessRegistry::new();
        registry.register_previous_name("Foo", "Bar", "b.json").unwrap();
        let err = registry.register_previous_name("FOO", "Baz", "b.json").unwrap_err();
        assert!(matches!(err, Collision::DuplicatePreviousName { ref existing } if existing.name == "Foo"));
        assert!(err.to_string().contains("\"Bar\""));
    }

    #[test]
    fn test_own_previous_name_is_not_a_collision() {
        let mut registry = UniquenessRegistry::new();
        registry.register_package("Same", "s.json").unwrap();
        assert!(registry.register_previous_name("Same", "Same", "s.json").is_ok());
    }
}
