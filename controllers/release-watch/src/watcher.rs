//! Kubernetes dependent watchers.
//!
//! [`KubeWatchController`] turns each [`WatchRequest`] from the registrar into a
//! cluster-wide `kube_runtime` watcher over [`DynamicObject`]s. Changed objects
//! are mapped through the request's [`EventHandler`] and the resulting
//! [`ReconcileRequest`]s are pushed onto the controller's request channel.

use dependent_watch::{EventHandler, KindKey, ReconcileRequest, WatchController, WatchError, WatchRequest};
use futures::StreamExt;
use kube::api::DynamicObject;
use kube::{Api, Client};
use kube_runtime::{WatchStreamExt, watcher};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Watch controller backed by `kube_runtime` watchers.
///
/// Holds one watcher task per (kind, handler). Repeated requests for a pair
/// that is already being watched are accepted without starting another task.
pub struct KubeWatchController {
    client: Client,
    requests: UnboundedSender<ReconcileRequest>,
    watches: Mutex<HashMap<(KindKey, EventHandler), JoinHandle<()>>>,
}

impl std::fmt::Debug for KubeWatchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeWatchController")
            .field("watches", &self.active_watches())
            .finish_non_exhaustive()
    }
}

impl KubeWatchController {
    /// Creates a new watch controller sending requests to `requests`.
    pub fn new(client: Client, requests: UnboundedSender<ReconcileRequest>) -> Self {
        Self {
            client,
            requests,
            watches: Mutex::new(HashMap::new()),
        }
    }

    /// Number of watcher tasks still running
    pub fn active_watches(&self) -> usize {
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|task| !task.is_finished())
            .count()
    }
}

impl WatchController for KubeWatchController {
    fn watch(&self, request: WatchRequest) -> Result<(), WatchError> {
        let mut watches = self.watches.lock().unwrap_or_else(PoisonError::into_inner);
        let id = (request.key.clone(), request.handler.clone());
        if watches.get(&id).is_some_and(|task| !task.is_finished()) {
            debug!("{} already watched with {} handler", request.key, request.strategy());
            return Ok(());
        }

        if self.requests.is_closed() {
            return Err(WatchError::WatchRegistration {
                key: request.key,
                reason: "request channel is closed".to_string(),
            });
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| WatchError::WatchRegistration {
            key: request.key.clone(),
            reason: e.to_string(),
        })?;

        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &request.resource);
        let task = runtime.spawn(watch_dependents(
            api,
            request.key,
            request.handler,
            self.requests.clone(),
        ));
        watches.insert(id, task);
        Ok(())
    }
}

impl Drop for KubeWatchController {
    fn drop(&mut self) {
        for task in self.watches.get_mut().unwrap_or_else(PoisonError::into_inner).values() {
            task.abort();
        }
    }
}

/// Watch one dependent kind until the request channel closes.
async fn watch_dependents(
    api: Api<DynamicObject>,
    key: KindKey,
    handler: EventHandler,
    requests: UnboundedSender<ReconcileRequest>,
) {
    info!("Starting {} watcher ({} handler)", key, handler.strategy());

    let mut stream = Box::pin(watcher(api, watcher::Config::default()).default_backoff());
    while let Some(event) = stream.next().await {
        let object = match event {
            Ok(watcher::Event::Apply(object) | watcher::Event::InitApply(object) | watcher::Event::Delete(object)) => {
                object
            }
            Ok(watcher::Event::Init) => {
                debug!("{} watcher initializing", key);
                continue;
            }
            Ok(watcher::Event::InitDone) => {
                info!("{} watcher initialization complete", key);
                continue;
            }
            Err(e) => {
                warn!("{} watcher stream error: {}", key, e);
                continue;
            }
        };

        for request in requests_for(&handler, &object) {
            debug!("{} {} changed, enqueueing {}", key, object.metadata.name.as_deref().unwrap_or("<unknown>"), request);
            if requests.send(request).is_err() {
                info!("Request channel closed, stopping {} watcher", key);
                return;
            }
        }
    }
}

/// Owners to reconcile for one changed dependent
pub fn requests_for(handler: &EventHandler, object: &DynamicObject) -> Vec<ReconcileRequest> {
    let no_annotations = BTreeMap::new();
    handler.requests(
        object.metadata.namespace.as_deref(),
        object.metadata.owner_references.as_deref().unwrap_or_default(),
        object.metadata.annotations.as_ref().unwrap_or(&no_annotations),
    )
}
