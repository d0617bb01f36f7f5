/// Provider catalog: the identifiers the provider is known to accept
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::types::{InstanceType, VersionTag};
use crate::error::{BindingError, ConfigurationError};

/// Managed policy that lets nodes talk to the systems-management agent
pub const SSM_MANAGED_INSTANCE_CORE: &str = "AmazonSSMManagedInstanceCore";

/// Explicit replacement for the SDK's implicit session data.
///
/// Passed into every declaration builder; nothing reads provider facts from globals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCatalog {
    pub kubernetes_versions: BTreeSet<VersionTag>,

    /// `None` accepts any non-empty shape name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_types: Option<BTreeSet<InstanceType>>,

    pub managed_policies: BTreeSet<String>,
}

/// Versions in standard or extended support when this list was last refreshed.
/// Set `provider.catalog` in the stack file to track the provider's current list.
const DEFAULT_KUBERNETES_VERSIONS: [&str; 6] = ["1.30", "1.31", "1.32", "1.33", "1.34", "1.35"];

impl Default for ProviderCatalog {
    fn default() -> Self {
        let kubernetes_versions = DEFAULT_KUBERNETES_VERSIONS
            .into_iter()
            .map(VersionTag::new)
            .collect();

        let managed_policies = [
            SSM_MANAGED_INSTANCE_CORE,
            "AmazonEKSWorkerNodePolicy",
            "AmazonEKS_CNI_Policy",
            "AmazonEC2ContainerRegistryReadOnly",
            "CloudWatchAgentServerPolicy",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            kubernetes_versions,
            instance_types: None,
            managed_policies,
        }
    }
}

impl ProviderCatalog {
    pub fn check_version(&self, version: &VersionTag) -> Result<(), ConfigurationError> {
        if self.kubernetes_versions.contains(version) {
            Ok(())
        } else {
            Err(ConfigurationError::UnknownVersion(version.to_string()))
        }
    }

    pub fn check_instance_type(&self, shape: &InstanceType) -> Result<(), ConfigurationError> {
        if shape.as_str().trim().is_empty() {
            return Err(ConfigurationError::UnknownInstanceType(shape.to_string()));
        }
        match &self.instance_types {
            Some(known) if !known.contains(shape) => {
                Err(ConfigurationError::UnknownInstanceType(shape.to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn check_policy(&self, policy_name: &str) -> Result<(), BindingError> {
        if self.managed_policies.contains(policy_name) {
            Ok(())
        } else {
            Err(BindingError::UnknownPolicy(policy_name.to_string()))
        }
    }
}
