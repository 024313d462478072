//! Release action options carried as owner annotations
//!
//! An owner can tune how its release is installed, upgraded and uninstalled
//! through annotations such as
//! `helm.sdk.operatorframework.io/upgrade-force: "true"`. Every option has a
//! default annotation name under [`DEFAULT_DOMAIN`]; deployments that already
//! use other names can override them per option.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Domain of the default annotation names
pub const DEFAULT_DOMAIN: &str = "helm.sdk.operatorframework.io";

/// Every option that can be set through an owner annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReleaseAnnotation {
    /// Skip hooks on install
    InstallDisableHooks,
    /// Release description on install
    InstallDescription,
    /// Skip hooks on upgrade
    UpgradeDisableHooks,
    /// Force resource updates on upgrade
    UpgradeForce,
    /// Release description on upgrade
    UpgradeDescription,
    /// Skip hooks on uninstall
    UninstallDisableHooks,
    /// Release description on uninstall
    UninstallDescription,
}

impl ReleaseAnnotation {
    /// Annotation name used when no custom name is configured
    #[must_use]
    pub fn default_name(self) -> String {
        let suffix = match self {
            ReleaseAnnotation::InstallDisableHooks => "install-disable-hooks",
            ReleaseAnnotation::InstallDescription => "install-description",
            ReleaseAnnotation::UpgradeDisableHooks => "upgrade-disable-hooks",
            ReleaseAnnotation::UpgradeForce => "upgrade-force",
            ReleaseAnnotation::UpgradeDescription => "upgrade-description",
            ReleaseAnnotation::UninstallDisableHooks => "uninstall-disable-hooks",
            ReleaseAnnotation::UninstallDescription => "uninstall-description",
        };
        format!("{DEFAULT_DOMAIN}/{suffix}")
    }
}

/// Options for installing a release
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallOptions {
    /// Do not run install hooks
    pub disable_hooks: bool,
    /// Description recorded on the release
    pub description: Option<String>,
}

/// Options for upgrading a release
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeOptions {
    /// Do not run upgrade hooks
    pub disable_hooks: bool,
    /// Replace resources instead of patching them
    pub force: bool,
    /// Description recorded on the release
    pub description: Option<String>,
}

/// Options for uninstalling a release
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UninstallOptions {
    /// Do not run uninstall hooks
    pub disable_hooks: bool,
    /// Description recorded on the release
    pub description: Option<String>,
}

/// Parse a boolean the way Kubernetes tooling does.
///
/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Resolves option annotation names and reads options off an owner
#[derive(Debug, Clone, Default)]
pub struct ReleaseAnnotations {
    custom_names: HashMap<ReleaseAnnotation, String>,
}

impl ReleaseAnnotations {
    /// Use the default names for every option
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `annotation` from `name` instead of its default name.
    /// An empty name keeps the default.
    #[must_use]
    pub fn with_custom_name(mut self, annotation: ReleaseAnnotation, name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() {
            self.custom_names.remove(&annotation);
        } else {
            self.custom_names.insert(annotation, name);
        }
        self
    }

    /// Annotation name currently used for `annotation`
    #[must_use]
    pub fn name(&self, annotation: ReleaseAnnotation) -> String {
        self.custom_names
            .get(&annotation)
            .cloned()
            .unwrap_or_else(|| annotation.default_name())
    }

    fn value<'a>(&self, annotations: &'a BTreeMap<String, String>, annotation: ReleaseAnnotation) -> Option<&'a String> {
        annotations.get(&self.name(annotation))
    }

    fn flag(&self, annotations: &BTreeMap<String, String>, annotation: ReleaseAnnotation) -> bool {
        self.value(annotations, annotation)
            .and_then(|v| parse_bool(v))
            .unwrap_or(false)
    }

    /// Install options from owner annotations
    #[must_use]
    pub fn install_options(&self, annotations: &BTreeMap<String, String>) -> InstallOptions {
        InstallOptions {
            disable_hooks: self.flag(annotations, ReleaseAnnotation::InstallDisableHooks),
            description: self.value(annotations, ReleaseAnnotation::InstallDescription).cloned(),
        }
    }

    /// Upgrade options from owner annotations
    #[must_use]
    pub fn upgrade_options(&self, annotations: &BTreeMap<String, String>) -> UpgradeOptions {
        UpgradeOptions {
            disable_hooks: self.flag(annotations, ReleaseAnnotation::UpgradeDisableHooks),
            force: self.flag(annotations, ReleaseAnnotation::UpgradeForce),
            description: self.value(annotations, ReleaseAnnotation::UpgradeDescription).cloned(),
        }
    }

    /// Uninstall options from owner annotations
    #[must_use]
    pub fn uninstall_options(&self, annotations: &BTreeMap<String, String>) -> UninstallOptions {
        UninstallOptions {
            disable_hooks: self.flag(annotations, ReleaseAnnotation::UninstallDisableHooks),
            description: self.value(annotations, ReleaseAnnotation::UninstallDescription).cloned(),
        }
    }
}
