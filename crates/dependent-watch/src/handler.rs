//! Event handlers: mapping a changed dependent back to owner reconcile requests
//!
//! Each [`Strategy`] has a handler. The handler is pure data so it can be
//! compared, hashed and shipped to whichever watch implementation runs it; the
//! mapping functions here are what that implementation calls per event.

use crate::manifest::ObjectDescriptor;
use crate::mapper::{GroupKind, KindKey, Scope};
use crate::strategy::Strategy;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Annotation naming the owner of a dependent (`namespace/name`, or `name` when cluster-scoped)
pub const PRIMARY_RESOURCE_ANNOTATION: &str = "operator-sdk/primary-resource";

/// Annotation naming the owner's type (`Kind.group`)
pub const PRIMARY_RESOURCE_TYPE_ANNOTATION: &str = "operator-sdk/primary-resource-type";

/// Identifies one owner object to reconcile
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReconcileRequest {
    /// Owner namespace, empty for cluster-scoped owners
    pub namespace: String,
    /// Owner name
    pub name: String,
}

impl ReconcileRequest {
    /// Create a request
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Routing rule attached to a watch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventHandler {
    /// Enqueue owners found in the dependent's owner references
    EnqueueRequestForOwner {
        /// Group/kind an owner reference must point at
        owner_type: GroupKind,
        /// Scope of the owner kind; decides the request namespace
        owner_scope: Scope,
        /// Only follow references with `controller: true`
        only_controller: bool,
    },
    /// Enqueue the owner named by the dependent's tracking annotations
    EnqueueRequestForAnnotation {
        /// Group/kind the type annotation must name
        owner_type: GroupKind,
    },
}

impl EventHandler {
    /// Handler for `strategy`, owned by objects of `owner_type`
    #[must_use]
    pub fn for_strategy(strategy: Strategy, owner_type: GroupKind, owner_scope: Scope) -> Self {
        match strategy {
            Strategy::OwnerReferenceNotify => EventHandler::EnqueueRequestForOwner {
                owner_type,
                owner_scope,
                only_controller: true,
            },
            Strategy::AnnotationNotify => EventHandler::EnqueueRequestForAnnotation { owner_type },
        }
    }

    /// Strategy tag of this handler
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        match self {
            EventHandler::EnqueueRequestForOwner { .. } => Strategy::OwnerReferenceNotify,
            EventHandler::EnqueueRequestForAnnotation { .. } => Strategy::AnnotationNotify,
        }
    }

    /// Map one changed dependent to the owners that should be reconciled
    #[must_use]
    pub fn requests(
        &self,
        namespace: Option<&str>,
        owner_references: &[OwnerReference],
        annotations: &BTreeMap<String, String>,
    ) -> Vec<ReconcileRequest> {
        match self {
            EventHandler::EnqueueRequestForOwner {
                owner_type,
                owner_scope,
                only_controller,
            } => owner_requests(owner_type, *owner_scope, *only_controller, namespace, owner_references),
            EventHandler::EnqueueRequestForAnnotation { owner_type } => {
                annotation_request(owner_type, annotations).into_iter().collect()
            }
        }
    }
}

/// Owners referenced by a dependent through matching owner references
#[must_use]
pub fn owner_requests(
    owner_type: &GroupKind,
    owner_scope: Scope,
    only_controller: bool,
    namespace: Option<&str>,
    owner_references: &[OwnerReference],
) -> Vec<ReconcileRequest> {
    let request_namespace = match owner_scope {
        Scope::Namespaced => namespace.unwrap_or_default(),
        Scope::Cluster => "",
    };

    let mut requests: Vec<ReconcileRequest> = owner_references
        .iter()
        .filter(|r| !only_controller || r.controller == Some(true))
        .filter(|r| KindKey::from_api_version(&r.api_version, &r.kind).group_kind() == *owner_type)
        .map(|r| ReconcileRequest::new(request_namespace, r.name.clone()))
        .collect();
    requests.sort();
    requests.dedup();
    requests
}

/// Owner named by a dependent's tracking annotations, when its type matches
#[must_use]
pub fn annotation_request(owner_type: &GroupKind, annotations: &BTreeMap<String, String>) -> Option<ReconcileRequest> {
    let type_value = annotations.get(PRIMARY_RESOURCE_TYPE_ANNOTATION)?;
    if GroupKind::parse(type_value) != *owner_type {
        return None;
    }

    let primary = annotations.get(PRIMARY_RESOURCE_ANNOTATION)?;
    let request = match primary.split_once('/') {
        Some((namespace, name)) => ReconcileRequest::new(namespace, name),
        None => ReconcileRequest::new("", primary.as_str()),
    };
    if request.name.is_empty() {
        return None;
    }
    Some(request)
}

/// Write the tracking annotations for `owner` onto a dependent's annotations
pub fn set_owner_annotations(owner: &ObjectDescriptor, annotations: &mut BTreeMap<String, String>) {
    let primary = ReconcileRequest::new(owner.namespace.clone(), owner.name.clone());
    annotations.insert(PRIMARY_RESOURCE_ANNOTATION.to_string(), primary.to_string());

    let owner_type = owner.kind_key().group_kind();
    annotations.insert(
        PRIMARY_RESOURCE_TYPE_ANNOTATION.to_string(),
        format!("{}.{}", owner_type.kind, owner_type.group),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_ref(api_version: &str, kind: &str, name: &str, controller: Option<bool>) -> OwnerReference {
        OwnerReference {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: format!("uid-{name}"),
            controller,
            block_owner_deletion: None,
        }
    }

    fn deployment() -> GroupKind {
        GroupKind::new("apps", "Deployment")
    }

    #[test]
    fn test_owner_requests_controller_only() {
        let refs = vec![
            owner_ref("apps/v1", "Deployment", "not-controller", None),
            owner_ref("apps/v1", "Deployment", "controller", Some(true)),
        ];
        let requests = owner_requests(&deployment(), Scope::Namespaced, true, Some("ns"), &refs);
        assert_eq!(requests, vec![ReconcileRequest::new("ns", "controller")]);
    }

    #[test]
    fn test_owner_requests_all_owners() {
        let refs = vec![
            owner_ref("apps/v1", "Deployment", "a", None),
            owner_ref("apps/v1", "Deployment", "b", Some(false)),
        ];
        let requests = owner_requests(&deployment(), Scope::Namespaced, false, Some("ns"), &refs);
        assert_eq!(requests.len(), 2);
    }

    #[test]
    fn test_owner_requests_collapse_repeated_owners() {
        let refs = vec![
            owner_ref("apps/v1", "Deployment", "a", None),
            owner_ref("apps/v1", "Deployment", "b", None),
            owner_ref("apps/v1beta2", "Deployment", "a", None),
        ];
        let requests = owner_requests(&deployment(), Scope::Namespaced, false, Some("ns"), &refs);
        assert_eq!(
            requests,
            vec![ReconcileRequest::new("ns", "a"), ReconcileRequest::new("ns", "b")]
        );
    }

    #[test]
    fn test_owner_requests_ignores_other_types() {
        let refs = vec![
            owner_ref("apps/v1", "StatefulSet", "ss", Some(true)),
            owner_ref("example.com/v1", "Deployment", "lookalike", Some(true)),
        ];
        assert!(owner_requests(&deployment(), Scope::Namespaced, true, Some("ns"), &refs).is_empty());
    }

    #[test]
    fn test_owner_requests_version_independent() {
        let refs = vec![owner_ref("apps/v1beta2", "Deployment", "old", Some(true))];
        let requests = owner_requests(&deployment(), Scope::Namespaced, true, Some("ns"), &refs);
        assert_eq!(requests, vec![ReconcileRequest::new("ns", "old")]);
    }

    #[test]
    fn test_owner_requests_cluster_owner_has_no_namespace() {
        let owner_type = GroupKind::new("rbac.authorization.k8s.io", "ClusterRole");
        let refs = vec![owner_ref("rbac.authorization.k8s.io/v1", "ClusterRole", "cr", Some(true))];
        let requests = owner_requests(&owner_type, Scope::Cluster, true, Some("ns"), &refs);
        assert_eq!(requests, vec![ReconcileRequest::new("", "cr")]);
    }

    #[test]
    fn test_annotation_round_trip() {
        let owner = ObjectDescriptor::new("apps/v1", "Deployment", "ownerNamespace", "testDeployment");
        let mut annotations = BTreeMap::new();
        set_owner_annotations(&owner, &mut annotations);

        assert_eq!(
            annotations.get(PRIMARY_RESOURCE_ANNOTATION).map(String::as_str),
            Some("ownerNamespace/testDeployment")
        );
        assert_eq!(
            annotations.get(PRIMARY_RESOURCE_TYPE_ANNOTATION).map(String::as_str),
            Some("Deployment.apps")
        );
        assert_eq!(
            annotation_request(&deployment(), &annotations),
            Some(ReconcileRequest::new("ownerNamespace", "testDeployment"))
        );
    }

    #[test]
    fn test_annotation_request_cluster_owner() {
        let annotations = BTreeMap::from([
            (PRIMARY_RESOURCE_ANNOTATION.to_string(), "testClusterRole".to_string()),
            (
                PRIMARY_RESOURCE_TYPE_ANNOTATION.to_string(),
                "ClusterRole.rbac.authorization.k8s.io".to_string(),
            ),
        ]);
        let owner_type = GroupKind::new("rbac.authorization.k8s.io", "ClusterRole");
        assert_eq!(
            annotation_request(&owner_type, &annotations),
            Some(ReconcileRequest::new("", "testClusterRole"))
        );
    }

    #[test]
    fn test_annotation_request_type_mismatch() {
        let annotations = BTreeMap::from([
            (PRIMARY_RESOURCE_ANNOTATION.to_string(), "ns/name".to_string()),
            (PRIMARY_RESOURCE_TYPE_ANNOTATION.to_string(), "StatefulSet.apps".to_string()),
        ]);
        assert_eq!(annotation_request(&deployment(), &annotations), None);
    }

    #[test]
    fn test_annotation_request_missing_annotations() {
        let only_type = BTreeMap::from([(PRIMARY_RESOURCE_TYPE_ANNOTATION.to_string(), "Deployment.apps".to_string())]);
        assert_eq!(annotation_request(&deployment(), &only_type), None);
        assert_eq!(annotation_request(&deployment(), &BTreeMap::new()), None);
    }

    #[test]
    fn test_handler_strategy_tags() {
        let owner_handler = EventHandler::for_strategy(Strategy::OwnerReferenceNotify, deployment(), Scope::Namespaced);
        assert_eq!(owner_handler.strategy(), Strategy::OwnerReferenceNotify);
        assert!(matches!(
            owner_handler,
            EventHandler::EnqueueRequestForOwner { only_controller: true, .. }
        ));

        let annotation_handler = EventHandler::for_strategy(Strategy::AnnotationNotify, deployment(), Scope::Namespaced);
        assert_eq!(annotation_handler.strategy(), Strategy::AnnotationNotify);
    }
}
