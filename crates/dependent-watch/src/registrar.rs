//! Dependent resource watch registrar
//!
//! After each reconciliation of an owner, the rendered release manifest lists
//! the objects the release created or updated. [`DependentResourceWatcher::exec`]
//! makes sure every kind in that manifest is watched, so that outside changes to
//! those objects bring the owner back into reconciliation.
//!
//! One pass:
//! 1. decode the manifest (all-or-nothing)
//! 2. resolve the owner's scope
//! 3. for each object in manifest order, skip kinds already seen in this pass;
//!    otherwise resolve the kind, select a strategy from this object's scope,
//!    namespace and retention policy, and issue one watch
//!
//! Any error aborts the pass immediately. Watches already issued stay issued.
//! The first object of a kind decides that kind's strategy.

use crate::error::WatchError;
use crate::handler::EventHandler;
use crate::manifest::{self, ObjectDescriptor};
use crate::mapper::{RestMapper, Scope};
use crate::resolver::Resolver;
use crate::strategy::select_strategy;
use crate::watch::{WatchController, WatchRegistration, WatchRequest};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Registers watches on the kinds a release manifest depends on
#[derive(Clone)]
pub struct DependentResourceWatcher {
    controller: Arc<dyn WatchController>,
    mapper: Arc<dyn RestMapper>,
}

impl std::fmt::Debug for DependentResourceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependentResourceWatcher").finish_non_exhaustive()
    }
}

impl DependentResourceWatcher {
    /// Creates a new registrar.
    pub fn new(controller: Arc<dyn WatchController>, mapper: Arc<dyn RestMapper>) -> Self {
        Self { controller, mapper }
    }

    /// Ensure every kind in `manifest` is watched on behalf of `owner`.
    ///
    /// Returns the watches issued by this pass, one per distinct kind, in
    /// manifest order.
    ///
    /// # Errors
    ///
    /// - [`WatchError::ManifestParse`] if any document fails to decode; nothing is watched
    /// - [`WatchError::KindNotFound`] if the owner's kind, or a dependent kind, is unknown
    /// - [`WatchError::WatchRegistration`] if the controller refuses a watch
    pub fn exec(&self, owner: &ObjectDescriptor, manifest: &str) -> Result<Vec<WatchRegistration>, WatchError> {
        let dependents = manifest::decode(manifest)?;

        let mut resolver = Resolver::new(self.mapper.as_ref());
        let owner_key = owner.kind_key();
        let owner_scope = resolver.scope(&owner_key)?;
        let owner_type = owner_key.group_kind();
        let owner_namespace = match owner_scope {
            Scope::Namespaced => owner.namespace.as_str(),
            Scope::Cluster => "",
        };

        debug!(
            "Registering watches for {} {} ({} objects in manifest)",
            owner_key,
            owner.name,
            dependents.len()
        );

        let mut seen = HashSet::new();
        let mut registrations = Vec::new();
        for dependent in &dependents {
            let key = dependent.kind_key();
            if seen.contains(&key) {
                debug!("{} already watched in this pass, skipping {}", key, dependent.name);
                continue;
            }

            let mapping = resolver.mapping(&key)?.clone();
            let strategy = select_strategy(
                owner_scope,
                owner_namespace,
                mapping.scope,
                &dependent.namespace,
                dependent.retention_policy(),
            );

            seen.insert(key.clone());
            self.controller.watch(WatchRequest {
                key: key.clone(),
                resource: mapping.resource,
                scope: mapping.scope,
                handler: EventHandler::for_strategy(strategy, owner_type.clone(), owner_scope),
            })?;

            info!("Watching dependent resource {} with {} handler", key, strategy);
            registrations.push(WatchRegistration { key, strategy });
        }

        Ok(registrations)
    }
}
