//! Lock keys identifying mutual-exclusion domains

/// Identifies one mutual-exclusion domain: a (resource type, resource name)
/// pair. Equality is case-sensitive exact match on both fields.
///
/// The derived ordering (resource type first, then name) is the canonical
/// global order used when multiple locks must be taken together; see
/// [`LockRegistry::acquire_pair`](crate::registry::LockRegistry::acquire_pair).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey {
    pub resource_type: String,
    pub name: String,
}

impl LockKey {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.name)
    }
}
