/// Managed control-plane declaration
use serde::Serialize;
use tracing::debug;

use super::catalog::ProviderCatalog;
use super::graph::{ClusterHandle, DeclarationGraph, Request};
use super::types::{ArtifactLookup, ArtifactRef, LoggingFacets, NetworkRef, SubnetType, VersionTag};
use crate::error::ConfigurationError;

/// Desired control plane
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
    /// Unique within account + region
    pub name: String,
    pub network: Option<NetworkRef>,
    pub version: VersionTag,
}

impl ClusterSpec {
    /// Capacity is owned by the node group, never by the cluster.
    pub const DEFAULT_CAPACITY: u32 = 0;

    pub const MAX_NAME_LEN: usize = 100;

    pub fn new(name: impl Into<String>, network: NetworkRef, version: VersionTag) -> Self {
        Self {
            name: name.into(),
            network: Some(network),
            version,
        }
    }

    /// Every control-plane log stream is always enabled
    pub fn logging(&self) -> LoggingFacets {
        LoggingFacets::all()
    }

    pub fn default_capacity(&self) -> u32 {
        Self::DEFAULT_CAPACITY
    }
}

/// Check a cluster name against the provider's naming rule:
/// `[A-Za-z0-9][A-Za-z0-9_-]{0,99}`.
///
/// Every other declaration is named after the cluster, and names end up as
/// path segments on the provider API.
pub fn check_cluster_name(name: &str) -> Result<(), ConfigurationError> {
    if name.is_empty() {
        return Err(ConfigurationError::MissingField("cluster.name"));
    }
    let starts_alphanumeric = name.starts_with(|c: char| c.is_ascii_alphanumeric());
    let allowed = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !starts_alphanumeric || !allowed {
        return Err(ConfigurationError::invalid(
            "cluster.name",
            format!("{:?} must match [A-Za-z0-9][A-Za-z0-9_-]*", name),
        ));
    }
    if name.len() > ClusterSpec::MAX_NAME_LEN {
        return Err(ConfigurationError::invalid(
            "cluster.name",
            format!(
                "{} characters is longer than the limit of {}",
                name.len(),
                ClusterSpec::MAX_NAME_LEN
            ),
        ));
    }
    Ok(())
}

/// Subnet placement policy shared by the cluster and its node groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubnetSelector {
    #[serde(rename = "type")]
    pub subnet_type: SubnetType,
}

impl SubnetSelector {
    pub const PUBLIC: SubnetSelector = SubnetSelector {
        subnet_type: SubnetType::Public,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcPlacement {
    pub vpc_id: String,
    pub selector: SubnetSelector,
    pub subnet_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLogging {
    pub enabled_types: LoggingFacets,
}

/// Request body for the managed control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRequest {
    pub name: String,
    pub version: VersionTag,
    pub resources_vpc_config: VpcPlacement,
    pub logging: ClusterLogging,
    pub default_capacity: u32,
    pub kubectl_layer: ArtifactRef,
}

/// Declare the control plane.
///
/// The handle is usable by dependents right away; the cluster itself is only
/// created when the driver applies the graph.
pub fn declare_cluster(
    graph: &mut DeclarationGraph,
    spec: &ClusterSpec,
    catalog: &ProviderCatalog,
    artifacts: &dyn ArtifactLookup,
) -> Result<ClusterHandle, ConfigurationError> {
    check_cluster_name(&spec.name)?;
    let network = spec
        .network
        .as_ref()
        .ok_or(ConfigurationError::MissingField("cluster.network"))?;
    catalog.check_version(&spec.version)?;

    let subnet_ids = network.public_subnets();
    if subnet_ids.is_empty() {
        return Err(ConfigurationError::NoPublicSubnet {
            network: network.id.clone(),
        });
    }

    let request = ClusterRequest {
        name: spec.name.clone(),
        version: spec.version.clone(),
        resources_vpc_config: VpcPlacement {
            vpc_id: network.id.clone(),
            selector: SubnetSelector::PUBLIC,
            subnet_ids,
        },
        logging: ClusterLogging {
            enabled_types: spec.logging(),
        },
        default_capacity: spec.default_capacity(),
        kubectl_layer: artifacts.lookup(&spec.name, &spec.version),
    };

    debug!(
        "Declaring cluster {} (version {}, {} public subnets, {} log types, layer {})",
        spec.name,
        spec.version,
        request.resources_vpc_config.subnet_ids.len(),
        request.logging.enabled_types.len(),
        request.kubectl_layer.as_str()
    );

    graph.insert(spec.name.clone(), Request::Cluster(request), &[])
}
