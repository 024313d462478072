//! Discovery-backed REST mapper
//!
//! Snapshots the API server's discovery document and answers lookups from
//! memory. Lookups never block on the network; call
//! [`DiscoveryRestMapper::refresh`] when a kind is reported missing, e.g. after
//! a CRD was installed.

use crate::error::WatchError;
use crate::mapper::{GroupKind, KindKey, MappingTable, RestMapper, RestMapping, Scope};
use kube::discovery::Discovery;
use kube::Client;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// REST mapper fed from Kubernetes API discovery
pub struct DiscoveryRestMapper {
    client: Client,
    table: RwLock<MappingTable>,
}

impl std::fmt::Debug for DiscoveryRestMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryRestMapper")
            .field("kinds", &self.table.read().unwrap_or_else(PoisonError::into_inner).len())
            .finish_non_exhaustive()
    }
}

impl DiscoveryRestMapper {
    /// Create a mapper and load the first discovery snapshot
    pub async fn new(client: Client) -> Result<Self, WatchError> {
        let mapper = Self {
            client,
            table: RwLock::new(MappingTable::default()),
        };
        mapper.refresh().await?;
        Ok(mapper)
    }

    /// Re-run discovery and replace the snapshot.
    ///
    /// Every served version of every group is recorded, not only the
    /// preferred one, so manifests pinned to an older version still resolve.
    pub async fn refresh(&self) -> Result<(), WatchError> {
        let discovery = Discovery::new(self.client.clone()).run().await?;

        let mut table = MappingTable::default();
        for group in discovery.groups() {
            for version in group.versions() {
                for (resource, caps) in group.versioned_resources(version) {
                    let key = KindKey::new(resource.group.clone(), resource.version.clone(), resource.kind.clone());
                    debug!("discovered {} ({})", key, resource.plural);
                    table.insert(RestMapping {
                        key,
                        resource,
                        scope: Scope::from(&caps.scope),
                    });
                }
            }
        }

        info!(kinds = table.len(), "REST mapping refreshed from discovery");
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = table;
        Ok(())
    }
}

impl RestMapper for DiscoveryRestMapper {
    fn rest_mapping(&self, group_kind: &GroupKind, versions: &[&str]) -> Result<RestMapping, WatchError> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(group_kind, versions)
    }
}
