//! Watch controller capability
//!
//! The registrar decides *what* to watch; a [`WatchController`] owns the
//! actual subscriptions.

use crate::error::WatchError;
use crate::handler::EventHandler;
use crate::mapper::{KindKey, Scope};
use crate::strategy::Strategy;
use kube::core::ApiResource;

/// One request to start watching a dependent kind
#[derive(Debug, Clone)]
pub struct WatchRequest {
    /// Kind to watch
    pub key: KindKey,
    /// REST resource of the kind
    pub resource: ApiResource,
    /// Scope of the kind
    pub scope: Scope,
    /// How events are routed back to owners
    pub handler: EventHandler,
}

impl WatchRequest {
    /// Strategy tag of the request's handler
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.handler.strategy()
    }
}

/// A watch issued by one registrar pass
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchRegistration {
    /// Kind watched
    pub key: KindKey,
    /// Strategy used for the kind
    pub strategy: Strategy,
}

/// Capability to subscribe to changes of a kind
///
/// Implementations are shared between concurrent reconciliations and should
/// accept a repeated request for a kind they already watch with the same
/// handler without starting a second subscription.
pub trait WatchController: Send + Sync {
    /// Start (or confirm) a watch
    fn watch(&self, request: WatchRequest) -> Result<(), WatchError>;
}
