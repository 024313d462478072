//! Main controller implementation.
//!
//! This module contains the `Controller` struct that ties the registrar to a
//! live cluster. It registers watches for the configured owner's release
//! manifest, then re-registers whenever a dependent change enqueues that owner.

use crate::backoff::FibonacciBackoff;
use crate::config::Config;
use crate::error::ControllerError;
use crate::watcher::KubeWatchController;
use dependent_watch::{
    DependentResourceWatcher, DiscoveryRestMapper, ObjectDescriptor, ReconcileRequest, ReleaseAnnotations, RestMapper,
    Scope, WatchError, WatchRegistration,
};
use kube::api::DynamicObject;
use kube::{Api, Client};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, warn};

/// Main controller for dependent resource watches.
pub struct Controller {
    config: Config,
    owner: ObjectDescriptor,
    mapper: Arc<DiscoveryRestMapper>,
    registrar: DependentResourceWatcher,
    requests: UnboundedReceiver<ReconcileRequest>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("owner", &self.owner)
            .field("mapper", &self.mapper)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing release watch controller");

        let kube_client = Client::try_default().await?;

        info!("Loading API discovery...");
        let mapper = Arc::new(DiscoveryRestMapper::new(kube_client.clone()).await?);
        debug!("{:?}", mapper);

        let owner = retry_kind_not_found(
            backoff_for(&config),
            || load_owner(&kube_client, mapper.as_ref(), &config),
            || mapper.refresh(),
        )
        .await?;
        info!("Owner: {} {}", owner.kind_key(), ReconcileRequest::new(owner.namespace.clone(), owner.name.clone()));
        log_release_options(&owner);

        let (tx, requests) = mpsc::unbounded_channel();
        let watches = Arc::new(KubeWatchController::new(kube_client, tx));
        let registrar = DependentResourceWatcher::new(watches, mapper.clone());

        Ok(Self {
            config,
            owner,
            mapper,
            registrar,
            requests,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Release watch controller running");

        tokio::select! {
            result = self.serve() => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping");
                Ok(())
            }
        }
    }

    async fn serve(&mut self) -> Result<(), ControllerError> {
        self.register().await?;

        while let Some(request) = self.requests.recv().await {
            let (owner_requests, pending) = drain_owner_requests(&self.owner, request, &mut self.requests);
            if owner_requests > 0 {
                info!(
                    "Dependents of {} changed ({} events), re-registering watches",
                    self.owner.name, pending
                );
                self.register().await?;
            }
        }

        warn!("All dependent watchers stopped");
        Ok(())
    }

    /// Run one registrar pass over the current manifest, retrying while kinds
    /// are missing from discovery.
    async fn register(&self) -> Result<Vec<WatchRegistration>, ControllerError> {
        let registrations = retry_kind_not_found(
            backoff_for(&self.config),
            || self.register_once(),
            || self.mapper.refresh(),
        )
        .await
        .inspect_err(|e| error!("Failed to register dependent watches: {}", e))?;

        info!("Registered {} dependent watches", registrations.len());
        Ok(registrations)
    }

    async fn register_once(&self) -> Result<Vec<WatchRegistration>, ControllerError> {
        let manifest = tokio::fs::read_to_string(&self.config.manifest_path).await?;
        Ok(self.registrar.exec(&self.owner, &manifest)?)
    }
}

fn backoff_for(config: &Config) -> FibonacciBackoff {
    FibonacciBackoff::new(config.resolve_retry_min_seconds, config.resolve_retry_max_seconds)
}

/// Run `attempt` until it stops failing with `KindNotFound`.
///
/// Before each retry the caller's `refresh` reloads discovery, after waiting
/// for the next backoff interval. Any other error is returned as is.
pub async fn retry_kind_not_found<T, A, AF, R, RF>(
    mut backoff: FibonacciBackoff,
    mut attempt: A,
    mut refresh: R,
) -> Result<T, ControllerError>
where
    A: FnMut() -> AF,
    AF: Future<Output = Result<T, ControllerError>>,
    R: FnMut() -> RF,
    RF: Future<Output = Result<(), WatchError>>,
{
    loop {
        match attempt().await {
            Err(ControllerError::Watch(e)) if e.is_kind_not_found() => {
                let delay = backoff.next_backoff();
                warn!("{}; refreshing discovery and retrying in {:?}", e, delay);
                tokio::time::sleep(delay).await;
                refresh().await?;
            }
            result => return result,
        }
    }
}

/// Drain every request already queued behind `first`.
///
/// Returns how many of them named `owner` and how many were drained in
/// total, so a burst of events leads to a single registrar pass.
pub fn drain_owner_requests(
    owner: &ObjectDescriptor,
    first: ReconcileRequest,
    requests: &mut UnboundedReceiver<ReconcileRequest>,
) -> (usize, usize) {
    let mut owner_requests = 0;
    let mut pending = 0;
    let mut next = Some(first);
    while let Some(request) = next {
        pending += 1;
        if is_owner_request(owner, &request) {
            owner_requests += 1;
        } else {
            debug!("Ignoring request for {}", request);
        }
        next = requests.try_recv().ok();
    }
    (owner_requests, pending)
}

/// Fetch the owner object so its annotations are known.
async fn load_owner(
    client: &Client,
    mapper: &DiscoveryRestMapper,
    config: &Config,
) -> Result<ObjectDescriptor, ControllerError> {
    let key = config.owner_key();
    let mapping = mapper.rest_mapping(&key.group_kind(), &[key.version.as_str()])?;

    let (api, namespace): (Api<DynamicObject>, String) = match mapping.scope {
        Scope::Namespaced => {
            if config.owner_namespace.is_empty() {
                return Err(ControllerError::InvalidConfig(format!(
                    "OWNER_NAMESPACE is required for namespaced kind {key}"
                )));
            }
            (
                Api::namespaced_with(client.clone(), &config.owner_namespace, &mapping.resource),
                config.owner_namespace.clone(),
            )
        }
        Scope::Cluster => (Api::all_with(client.clone(), &mapping.resource), String::new()),
    };

    let object = api.get(&config.owner_name).await?;
    Ok(ObjectDescriptor {
        api_version: config.owner_api_version.clone(),
        kind: config.owner_kind.clone(),
        namespace,
        name: config.owner_name.clone(),
        annotations: object.metadata.annotations.unwrap_or_default(),
    })
}

fn log_release_options(owner: &ObjectDescriptor) {
    let names = ReleaseAnnotations::new();
    info!("  Install options: {:?}", names.install_options(&owner.annotations));
    info!("  Upgrade options: {:?}", names.upgrade_options(&owner.annotations));
    info!("  Uninstall options: {:?}", names.uninstall_options(&owner.annotations));
}

/// Whether `request` names the controller's owner
pub fn is_owner_request(owner: &ObjectDescriptor, request: &ReconcileRequest) -> bool {
    request.name == owner.name && request.namespace == owner.namespace
}

#[cfg(test)]
mod tests {
    use super::*;
    use dependent_watch::{KindKey, StaticRestMapper};
    use std::cell::Cell;
    use std::future::ready;

    fn memcached() -> KindKey {
        KindKey::new("cache.example.com", "v1alpha1", "Memcached")
    }

    fn lookup_memcached(mapper: &StaticRestMapper) -> Result<Scope, ControllerError> {
        let key = memcached();
        Ok(mapper.rest_mapping(&key.group_kind(), &[key.version.as_str()])?.scope)
    }

    #[tokio::test]
    async fn test_retry_until_kind_is_discovered() {
        let mapper = StaticRestMapper::new();
        let refreshes = Cell::new(0);

        let scope = retry_kind_not_found(
            FibonacciBackoff::new(0, 0),
            || ready(lookup_memcached(&mapper)),
            || {
                refreshes.set(refreshes.get() + 1);
                // the CRD shows up on the second discovery refresh
                if refreshes.get() == 2 {
                    mapper.add(memcached(), Scope::Namespaced);
                }
                ready(Ok(()))
            },
        )
        .await
        .unwrap();

        assert_eq!(scope, Scope::Namespaced);
        assert_eq!(refreshes.get(), 2);
    }

    #[tokio::test]
    async fn test_retry_returns_other_errors_immediately() {
        let refreshes = Cell::new(0);
        let result: Result<(), ControllerError> = retry_kind_not_found(
            FibonacciBackoff::new(0, 0),
            || ready(Err(ControllerError::InvalidConfig("bad".to_string()))),
            || {
                refreshes.set(refreshes.get() + 1);
                ready(Ok(()))
            },
        )
        .await;

        assert!(matches!(result, Err(ControllerError::InvalidConfig(_))));
        assert_eq!(refreshes.get(), 0);
    }

    #[tokio::test]
    async fn test_retry_stops_when_refresh_fails() {
        let mapper = StaticRestMapper::new();
        let result = retry_kind_not_found(
            FibonacciBackoff::new(0, 0),
            || ready(lookup_memcached(&mapper)),
            || {
                ready(Err(WatchError::WatchRegistration {
                    key: memcached(),
                    reason: "discovery unavailable".to_string(),
                }))
            },
        )
        .await;

        assert!(matches!(
            result,
            Err(ControllerError::Watch(WatchError::WatchRegistration { .. }))
        ));
    }

    #[test]
    fn test_drain_coalesces_queued_requests() {
        let owner = ObjectDescriptor::new("cache.example.com/v1alpha1", "Memcached", "apps", "example");
        let (tx, mut rx) = mpsc::unbounded_channel();
        for _ in 0..4 {
            tx.send(ReconcileRequest::new("apps", "example")).unwrap();
        }
        tx.send(ReconcileRequest::new("apps", "someone-else")).unwrap();

        let first = ReconcileRequest::new("apps", "example");
        assert_eq!(drain_owner_requests(&owner, first, &mut rx), (5, 6));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drain_without_owner_request() {
        let owner = ObjectDescriptor::new("cache.example.com/v1alpha1", "Memcached", "apps", "example");
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(ReconcileRequest::new("other", "example")).unwrap();

        let first = ReconcileRequest::new("", "example");
        assert_eq!(drain_owner_requests(&owner, first, &mut rx), (0, 2));
    }

    #[test]
    fn test_is_owner_request_namespaced() {
        let owner = ObjectDescriptor::new("cache.example.com/v1alpha1", "Memcached", "apps", "example");
        assert!(is_owner_request(&owner, &ReconcileRequest::new("apps", "example")));
        assert!(!is_owner_request(&owner, &ReconcileRequest::new("other", "example")));
        assert!(!is_owner_request(&owner, &ReconcileRequest::new("apps", "example-2")));
        assert!(!is_owner_request(&owner, &ReconcileRequest::new("", "example")));
    }

    #[test]
    fn test_is_owner_request_cluster_scoped() {
        let owner = ObjectDescriptor::new("rbac.example.com/v1", "Tenant", "", "blue");
        assert!(is_owner_request(&owner, &ReconcileRequest::new("", "blue")));
        assert!(!is_owner_request(&owner, &ReconcileRequest::new("apps", "blue")));
    }
}
