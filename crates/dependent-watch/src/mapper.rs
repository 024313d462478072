//! Kind identities and the REST mapping service
//!
//! A [`RestMapper`] answers two questions for a group/kind: is it served by the
//! API server, and is it cluster-scoped or namespaced. The registrar never
//! talks to the API server itself; it goes through this trait so tests can use
//! the in-memory [`StaticRestMapper`].

use crate::error::WatchError;
use kube::core::{ApiResource, GroupVersionKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// API group and kind, without a version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKind {
    /// API group (empty for the core group)
    pub group: String,
    /// Kind name
    pub kind: String,
}

impl GroupKind {
    /// Create a group/kind pair
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }

    /// Parse the `Kind.group` form used in tracking annotations.
    ///
    /// Everything after the first dot is the group, so `Deployment.apps` and
    /// `Widget.example.com` both work. A bare `Pod` is a core-group kind.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.split_once('.') {
            Some((kind, group)) => Self::new(group, kind),
            None => Self::new("", value),
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// Group, version and kind. This is the watch deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KindKey {
    /// API group (empty for the core group)
    pub group: String,
    /// API version within the group
    pub version: String,
    /// Kind name
    pub kind: String,
}

impl KindKey {
    /// Create a key from its three parts
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Build a key from an object's `apiVersion` (`group/version` or `version`) and `kind`
    #[must_use]
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        match api_version.split_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::new("", api_version, kind),
        }
    }

    /// The `apiVersion` string for this key
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Drop the version
    #[must_use]
    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(self.group.clone(), self.kind.clone())
    }
}

impl fmt::Display for KindKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

impl From<&KindKey> for GroupVersionKind {
    fn from(key: &KindKey) -> Self {
        GroupVersionKind::gvk(&key.group, &key.version, &key.kind)
    }
}

/// Whether objects of a kind live in a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Cluster-wide objects (no namespace)
    Cluster,
    /// Objects that belong to a namespace
    Namespaced,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Cluster => write!(f, "cluster"),
            Scope::Namespaced => write!(f, "namespaced"),
        }
    }
}

impl From<&kube::discovery::Scope> for Scope {
    fn from(scope: &kube::discovery::Scope) -> Self {
        match scope {
            kube::discovery::Scope::Cluster => Scope::Cluster,
            kube::discovery::Scope::Namespaced => Scope::Namespaced,
        }
    }
}

/// Result of mapping a kind: the REST resource to watch and its scope
#[derive(Debug, Clone)]
pub struct RestMapping {
    /// Kind key the mapping was found under
    pub key: KindKey,
    /// REST resource (group, version, plural) for building dynamic APIs
    pub resource: ApiResource,
    /// Cluster or namespace scope of the kind
    pub scope: Scope,
}

/// Type/REST mapping service
///
/// Implementations must be safe to share between concurrent reconciliations.
pub trait RestMapper: Send + Sync {
    /// Map a group/kind to its REST resource, trying `versions` in order.
    ///
    /// With no versions, any served version of the group/kind may be returned.
    /// Fails with [`WatchError::KindNotFound`] when nothing matches.
    fn rest_mapping(&self, group_kind: &GroupKind, versions: &[&str]) -> Result<RestMapping, WatchError>;
}

/// Snapshot of known kinds, shared by the static and discovery mappers
#[derive(Debug, Clone, Default)]
pub(crate) struct MappingTable {
    entries: BTreeMap<KindKey, RestMapping>,
}

impl MappingTable {
    pub(crate) fn insert(&mut self, mapping: RestMapping) {
        self.entries.insert(mapping.key.clone(), mapping);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn lookup(&self, group_kind: &GroupKind, versions: &[&str]) -> Result<RestMapping, WatchError> {
        let found = if versions.is_empty() {
            self.entries
                .values()
                .find(|m| m.key.group == group_kind.group && m.key.kind == group_kind.kind)
        } else {
            versions.iter().find_map(|version| {
                self.entries
                    .get(&KindKey::new(group_kind.group.clone(), *version, group_kind.kind.clone()))
            })
        };

        found.cloned().ok_or_else(|| WatchError::KindNotFound {
            group_kind: group_kind.clone(),
            searched_versions: versions.iter().map(|v| (*v).to_string()).collect(),
        })
    }
}

/// In-memory mapping service with a fixed table of kinds
///
/// Kinds can be added at any time, also after the mapper has been shared.
#[derive(Debug, Default)]
pub struct StaticRestMapper {
    table: RwLock<MappingTable>,
}

impl StaticRestMapper {
    /// Create an empty mapper. Every lookup fails until kinds are added.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind with the given scope
    pub fn add(&self, key: KindKey, scope: Scope) {
        let resource = ApiResource::from_gvk(&GroupVersionKind::from(&key));
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(RestMapping { key, resource, scope });
    }

    /// Builder-style [`add`](Self::add)
    #[must_use]
    pub fn with(self, key: KindKey, scope: Scope) -> Self {
        self.add(key, scope);
        self
    }
}

impl RestMapper for StaticRestMapper {
    fn rest_mapping(&self, group_kind: &GroupKind, versions: &[&str]) -> Result<RestMapping, WatchError> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(group_kind, versions)
    }
}
