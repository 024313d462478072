//! Notification strategy selection
//!
//! A dependent can be tied back to its owner in two ways. When Kubernetes
//! allows the dependent to carry a controller owner reference to the owner,
//! events are routed through that reference. Otherwise (cross-namespace,
//! namespaced dependent of a cluster-scoped owner, cluster-scoped dependent of
//! a namespaced owner, or a dependent that must outlive its owner) events are
//! routed through tracking annotations written on the dependent.

use crate::mapper::Scope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Annotation marking a dependent that must survive deletion of its owner
pub const RESOURCE_POLICY_ANNOTATION: &str = "helm.sh/resource-policy";

/// Value of [`RESOURCE_POLICY_ANNOTATION`] that requests retention
pub const KEEP_POLICY: &str = "keep";

/// Instance-level retention marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RetentionPolicy {
    /// Dependent is deleted together with its owner
    #[default]
    Default,
    /// Dependent survives deletion of its owner
    Keep,
}

impl RetentionPolicy {
    /// Read the policy from an object's annotations.
    ///
    /// Only the exact value `keep` counts; anything else is `Default`.
    #[must_use]
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        match annotations.get(RESOURCE_POLICY_ANNOTATION) {
            Some(value) if value == KEEP_POLICY => RetentionPolicy::Keep,
            _ => RetentionPolicy::Default,
        }
    }
}

/// How change events on a dependent kind are routed back to the owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Follow the dependent's controller owner reference
    OwnerReferenceNotify,
    /// Follow tracking annotations on the dependent
    AnnotationNotify,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::OwnerReferenceNotify => write!(f, "owner-reference"),
            Strategy::AnnotationNotify => write!(f, "annotation"),
        }
    }
}

/// Pick the strategy for a dependent.
///
/// `owner_namespace` is ignored for a cluster-scoped owner and
/// `dependent_namespace` for a cluster-scoped dependent.
#[must_use]
pub fn select_strategy(
    owner_scope: Scope,
    owner_namespace: &str,
    dependent_scope: Scope,
    dependent_namespace: &str,
    policy: RetentionPolicy,
) -> Strategy {
    if policy == RetentionPolicy::Keep {
        return Strategy::AnnotationNotify;
    }

    match (owner_scope, dependent_scope) {
        (Scope::Namespaced, Scope::Namespaced) if owner_namespace == dependent_namespace => {
            Strategy::OwnerReferenceNotify
        }
        (Scope::Cluster, Scope::Cluster) => Strategy::OwnerReferenceNotify,
        _ => Strategy::AnnotationNotify,
    }
}
