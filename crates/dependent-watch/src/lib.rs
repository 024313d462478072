//! Dependent Resource Watches
//!
//! Keeps a release-managing controller informed about the objects its releases
//! create. After each reconciliation the rendered manifest is handed to
//! [`DependentResourceWatcher::exec`], which makes sure every kind in it is
//! watched and that changes route back to the owning custom resource.
//!
//! # Example
//!
//! ```no_run
//! use dependent_watch::{
//!     DependentResourceWatcher, KindKey, ObjectDescriptor, Scope, StaticRestMapper, WatchController, WatchError,
//!     WatchRequest,
//! };
//! use std::sync::Arc;
//!
//! struct LogOnly;
//!
//! impl WatchController for LogOnly {
//!     fn watch(&self, request: WatchRequest) -> Result<(), WatchError> {
//!         println!("watch {} via {}", request.key, request.strategy());
//!         Ok(())
//!     }
//! }
//!
//! # fn example() -> Result<(), WatchError> {
//! let mapper = StaticRestMapper::new()
//!     .with(KindKey::new("example.com", "v1", "App"), Scope::Namespaced)
//!     .with(KindKey::new("apps", "v1", "Deployment"), Scope::Namespaced);
//! let watcher = DependentResourceWatcher::new(Arc::new(LogOnly), Arc::new(mapper));
//!
//! let owner = ObjectDescriptor::new("example.com/v1", "App", "default", "my-app");
//! let manifest = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n  namespace: default\n";
//! let registrations = watcher.exec(&owner, manifest)?;
//! assert_eq!(registrations.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Owner-reference routing**: same-scope dependents enqueue their controller owner
//! - **Annotation routing**: cross-scope and `keep` dependents carry owner annotations
//! - **Discovery**: kinds resolve through a refreshable API discovery snapshot
//! - **Release options**: install/upgrade/uninstall options read from owner annotations

pub mod discovery;
pub mod error;
pub mod handler;
pub mod manifest;
pub mod mapper;
pub mod registrar;
pub mod release_options;
pub mod resolver;
pub mod strategy;
pub mod watch;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;


pub use discovery::DiscoveryRestMapper;
pub use error::WatchError;
pub use handler::{EventHandler, ReconcileRequest, set_owner_annotations};
pub use manifest::ObjectDescriptor;
pub use mapper::{GroupKind, KindKey, RestMapper, RestMapping, Scope, StaticRestMapper};
pub use registrar::DependentResourceWatcher;
pub use release_options::{InstallOptions, ReleaseAnnotation, ReleaseAnnotations, UninstallOptions, UpgradeOptions};
pub use strategy::{RetentionPolicy, Strategy, select_strategy};
pub use watch::{WatchController, WatchRegistration, WatchRequest};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockWatchController;
