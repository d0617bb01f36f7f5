/// Configuration management for Keel
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::declare::catalog::SSM_MANAGED_INSTANCE_CORE;
use crate::declare::cluster::ClusterSpec;
use crate::declare::nodegroup::{NodeGroupSettings, MIN_NODE_GROUP_SIZE};
use crate::declare::types::{AmiType, InstanceType, NetworkRef, Subnet, SubnetType, VersionTag};
use crate::declare::{ProviderCatalog, StackSpec};

/// Environment variable holding the gateway token
pub const TOKEN_ENV: &str = "KEEL_PROVIDER_TOKEN";

/// Main stack configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackConfig {
    /// Stack name (used for logging and output files)
    pub stack_name: String,

    /// Provider control-plane settings
    pub provider: ProviderConfig,

    /// Network the cluster is placed in
    pub network: NetworkRef,

    /// Control plane
    pub cluster: ClusterConfig,

    /// Managed node group
    pub node_group: NodeGroupConfig,
}

/// Provider gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Control-plane gateway URL
    pub endpoint: String,

    /// Provider region (e.g. "us-west-2")
    pub region: String,

    /// Gateway token (can also be set via KEEL_PROVIDER_TOKEN env var)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Overrides for the identifiers the provider accepts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<ProviderCatalog>,

    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

/// Control-plane configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Cluster name, unique within account + region
    pub name: String,

    /// Kubernetes version (e.g. "1.33")
    pub version: VersionTag,
}

/// Node group configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeGroupConfig {
    /// Node image family (e.g. "AL2_x86_64")
    pub ami_type: String,

    /// Instance shapes, in order of preference
    pub instance_types: Vec<InstanceType>,

    /// Minimum number of nodes (at least 2)
    #[serde(default = "default_min_size")]
    pub min_size: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_size: Option<u32>,

    /// Managed policies attached to the node role
    #[serde(default = "default_policies")]
    pub policies: Vec<String>,
}

fn default_operation_timeout() -> u64 {
    1800
}

fn default_poll_interval() -> u64 {
    10
}

fn default_min_size() -> u32 {
    MIN_NODE_GROUP_SIZE
}

fn default_policies() -> Vec<String> {
    vec![SSM_MANAGED_INSTANCE_CORE.to_string()]
}

impl ProviderConfig {
    /// Parse the gateway endpoint
    pub fn endpoint_url(&self) -> anyhow::Result<Url> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| anyhow::anyhow!("Invalid provider endpoint {}: {}", self.endpoint, e))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            anyhow::bail!("Provider endpoint must be http(s): {}", self.endpoint);
        }
        Ok(url)
    }

    /// Catalog to validate declarations against
    pub fn catalog(&self) -> ProviderCatalog {
        self.catalog.clone().unwrap_or_default()
    }
}

impl StackConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StackConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stack_name.is_empty() {
            anyhow::bail!("stack_name cannot be empty");
        }

        if self.cluster.name.is_empty() {
            anyhow::bail!("cluster.name cannot be empty");
        }

        if self.provider.region.is_empty() {
            anyhow::bail!("provider.region cannot be empty");
        }

        self.provider.endpoint_url()?;
        self.node_group.ami_type.parse::<AmiType>()?;

        Ok(())
    }

    /// Get the gateway token from config or environment
    pub fn get_provider_token(&self) -> anyhow::Result<String> {
        self.provider
            .token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Provider token not found. Set {} environment variable or specify in config",
                    TOKEN_ENV
                )
            })
    }

    /// Translate the file into the declaration inputs
    pub fn stack_spec(&self) -> anyhow::Result<StackSpec> {
        let ami_type: AmiType = self.node_group.ami_type.parse()?;

        let mut node_group =
            NodeGroupSettings::new(ami_type, self.node_group.instance_types.clone());
        node_group.min_size = self.node_group.min_size;
        node_group.max_size = self.node_group.max_size;
        node_group.desired_size = self.node_group.desired_size;

        Ok(StackSpec {
            cluster: ClusterSpec::new(
                self.cluster.name.clone(),
                self.network.clone(),
                self.cluster.version.clone(),
            ),
            node_group,
            policies: self.node_group.policies.clone(),
        })
    }

    /// Generate an example configuration file
    pub fn example() -> Self {
        Self {
            stack_name: "demo-stack".to_string(),
            provider: ProviderConfig {
                endpoint: "https://gateway.example.com/api".to_string(),
                region: "us-west-2".to_string(),
                token: None,
                catalog: None,
                operation_timeout_secs: default_operation_timeout(),
                poll_interval_secs: default_poll_interval(),
            },
            network: NetworkRef {
                id: "vpc-0123456789abcdef0".to_string(),
                subnets: vec![
                    Subnet {
                        id: "subnet-public-a".to_string(),
                        subnet_type: SubnetType::Public,
                    },
                    Subnet {
                        id: "subnet-public-b".to_string(),
                        subnet_type: SubnetType::Public,
                    },
                    Subnet {
                        id: "subnet-private-a".to_string(),
                        subnet_type: SubnetType::Private,
                    },
                ],
            },
            cluster: ClusterConfig {
                name: "demo".to_string(),
                version: VersionTag::new("1.33"),
            },
            node_group: NodeGroupConfig {
                ami_type: AmiType::AL2_x86_64.to_string(),
                instance_types: vec![InstanceType::new("m5.large")],
                min_size: MIN_NODE_GROUP_SIZE,
                max_size: None,
                desired_size: None,
                policies: default_policies(),
            },
        }
    }
}
