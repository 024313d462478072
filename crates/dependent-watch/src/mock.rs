//! Mock watch controller for unit testing
//!
//! Records every [`WatchRequest`] it receives so tests can assert on kinds,
//! order and strategies without a cluster.

use crate::error::WatchError;
use crate::mapper::KindKey;
use crate::strategy::Strategy;
use crate::watch::{WatchController, WatchRequest};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Recording mock of [`WatchController`]
#[derive(Debug, Clone, Default)]
pub struct MockWatchController {
    calls: Arc<Mutex<Vec<WatchRequest>>>,
    refused: Arc<Mutex<HashSet<KindKey>>>,
}

impl MockWatchController {
    /// Create a mock that accepts every request
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future request for `key` fail with `WatchRegistration`
    pub fn refuse(&self, key: KindKey) {
        self.refused.lock().unwrap_or_else(PoisonError::into_inner).insert(key);
    }

    /// All requests received so far, in order (refused ones included)
    #[must_use]
    pub fn calls(&self) -> Vec<WatchRequest> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// `(kind, strategy)` of every request received so far
    #[must_use]
    pub fn strategies(&self) -> Vec<(KindKey, Strategy)> {
        self.calls()
            .into_iter()
            .map(|request| {
                let strategy = request.strategy();
                (request.key, strategy)
            })
            .collect()
    }
}

impl WatchController for MockWatchController {
    fn watch(&self, request: WatchRequest) -> Result<(), WatchError> {
        let key = request.key.clone();
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(request);

        if self.refused.lock().unwrap_or_else(PoisonError::into_inner).contains(&key) {
            return Err(WatchError::WatchRegistration {
                key,
                reason: "refused by mock".to_string(),
            });
        }
        Ok(())
    }
}
