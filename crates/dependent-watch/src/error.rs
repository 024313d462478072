//! Dependent watch errors

use crate::mapper::{GroupKind, KindKey};
use thiserror::Error;

/// Errors that can occur while establishing watches on dependent resources
#[derive(Debug, Error)]
pub enum WatchError {
    /// A manifest document (or one of its list items) could not be decoded
    #[error("failed to decode manifest document {document}: {reason}")]
    ManifestParse {
        /// Zero-based index of the offending document
        document: usize,
        /// Decoder message
        reason: String,
    },

    /// The mapping service does not know the kind in any searched version
    #[error("no matches for kind \"{}\" in group \"{}\" (searched versions: {})", group_kind.kind, group_kind.group, searched_versions.join(", "))]
    KindNotFound {
        /// Group and kind that were looked up
        group_kind: GroupKind,
        /// Versions tried, in order
        searched_versions: Vec<String>,
    },

    /// The watch controller refused a registration
    #[error("failed to watch {key}: {reason}")]
    WatchRegistration {
        /// Kind the watch was requested for
        key: KindKey,
        /// Controller message
        reason: String,
    },

    /// Kubernetes API discovery failed
    #[error("Discovery error: {0}")]
    Discovery(#[from] kube::Error),
}

impl WatchError {
    /// True when the error is a `KindNotFound`, which callers usually retry
    /// after refreshing the mapping service.
    #[must_use]
    pub fn is_kind_not_found(&self) -> bool {
        matches!(self, Self::KindNotFound { .. })
    }
}
