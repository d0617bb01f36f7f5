/// Managed node pool declaration
use serde::Serialize;
use tracing::debug;

use super::catalog::ProviderCatalog;
use super::cluster::SubnetSelector;
use super::graph::{
    ClusterHandle, DeclarationGraph, LaunchTemplateHandle, NodeGroupHandle, Request, Value,
};
use super::types::{AmiType, InstanceType};
use crate::error::ConfigurationError;

/// Smallest pool that keeps serving while a node is replaced
pub const MIN_NODE_GROUP_SIZE: u32 = 2;

/// Compute parameters of a node group, independent of any cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGroupSettings {
    pub ami_type: AmiType,
    pub instance_types: Vec<InstanceType>,
    pub min_size: u32,
    pub max_size: Option<u32>,
    pub desired_size: Option<u32>,
}

impl NodeGroupSettings {
    pub fn new(ami_type: AmiType, instance_types: Vec<InstanceType>) -> Self {
        Self {
            ami_type,
            instance_types,
            min_size: MIN_NODE_GROUP_SIZE,
            max_size: None,
            desired_size: None,
        }
    }

    /// Check the settings and compute the scaling triple
    pub fn validate(&self, catalog: &ProviderCatalog) -> Result<ScalingConfig, ConfigurationError> {
        if self.instance_types.is_empty() {
            return Err(ConfigurationError::EmptyInstanceTypes);
        }
        for shape in &self.instance_types {
            catalog.check_instance_type(shape)?;
        }
        if self.min_size < MIN_NODE_GROUP_SIZE {
            return Err(ConfigurationError::MinSizeTooSmall {
                minimum: MIN_NODE_GROUP_SIZE,
                actual: self.min_size,
            });
        }

        let max = self.max_size.unwrap_or(self.min_size);
        let desired = self.desired_size.unwrap_or(self.min_size);
        if !(self.min_size <= desired && desired <= max) {
            return Err(ConfigurationError::InvalidScaling {
                min: self.min_size,
                desired,
                max,
            });
        }

        Ok(ScalingConfig {
            min_size: self.min_size,
            max_size: max,
            desired_size: desired,
        })
    }
}

/// Desired node group bound to its cluster and launch template
#[derive(Debug, Clone, PartialEq)]
pub struct NodeGroupSpec {
    pub cluster: ClusterHandle,
    pub launch_template: LaunchTemplateHandle,
    pub settings: NodeGroupSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingConfig {
    pub min_size: u32,
    pub max_size: u32,
    pub desired_size: u32,
}

/// Launch template pinned to an explicit version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchTemplateRef {
    pub id: Value<String>,
    pub version: Value<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupRequest {
    pub nodegroup_name: String,
    pub cluster_name: Value<String>,
    pub ami_type: AmiType,
    pub instance_types: Vec<InstanceType>,
    pub scaling_config: ScalingConfig,
    pub subnets: SubnetSelector,
    pub launch_template: LaunchTemplateRef,
}

/// Name of the node group declared for a cluster
pub fn node_group_name(cluster_name: &str) -> String {
    format!("{}-managed-ng", cluster_name)
}

/// Declare the node group.
///
/// The request always carries the cluster reference, so the driver sees the
/// dependency edge even though the cluster does not exist yet.
pub fn declare_node_group(
    graph: &mut DeclarationGraph,
    spec: &NodeGroupSpec,
    catalog: &ProviderCatalog,
) -> Result<NodeGroupHandle, ConfigurationError> {
    let scaling_config = spec.settings.validate(catalog)?;

    let name = node_group_name(spec.cluster.name());
    let request = NodeGroupRequest {
        nodegroup_name: name.clone(),
        cluster_name: spec.cluster.cluster_name(),
        ami_type: spec.settings.ami_type,
        instance_types: spec.settings.instance_types.clone(),
        scaling_config,
        subnets: SubnetSelector::PUBLIC,
        launch_template: LaunchTemplateRef {
            id: spec.launch_template.template_id(),
            version: spec.launch_template.latest_version(),
        },
    };

    debug!(
        "Declaring node group {} ({} x {:?}, min {})",
        name, spec.settings.ami_type, spec.settings.instance_types, scaling_config.min_size
    );

    graph.insert(
        name,
        Request::NodeGroup(request),
        &[spec.cluster.id(), spec.launch_template.id()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::cluster::{declare_cluster, ClusterSpec};
    use crate::declare::launch::declare_launch_template;
    use crate::declare::types::{KubectlLayerLookup, NetworkRef, Subnet, SubnetType, VersionTag};

    fn seeded_graph() -> (DeclarationGraph, ClusterHandle, LaunchTemplateHandle) {
        let network = NetworkRef {
            id: "vpc-1".to_string(),
            subnets: vec![Subnet {
                id: "subnet-a".to_string(),
                subnet_type: SubnetType::Public,
            }],
        };
        let mut graph = DeclarationGraph::new();
        let catalog = ProviderCatalog::default();
        let cluster = declare_cluster(
            &mut graph,
            &ClusterSpec::new("demo", network, VersionTag::new("1.33")),
            &catalog,
            &KubectlLayerLookup,
        )
        .unwrap();
        let template = declare_launch_template(&mut graph, "demo").unwrap();
        (graph, cluster, template)
    }

    fn spec(
        cluster: &ClusterHandle,
        template: &LaunchTemplateHandle,
        settings: NodeGroupSettings,
    ) -> NodeGroupSpec {
        NodeGroupSpec {
            cluster: cluster.clone(),
            launch_template: template.clone(),
            settings,
        }
    }

    fn settings() -> NodeGroupSettings {
        NodeGroupSettings::new(AmiType::AL2_x86_64, vec![InstanceType::new("m5.large")])
    }

    #[test]
    fn test_min_size_is_preserved() {
        for min_size in [2, 3, 10] {
            let (mut graph, cluster, template) = seeded_graph();
            let mut settings = settings();
            settings.min_size = min_size;
            let handle = declare_node_group(
                &mut graph,
                &spec(&cluster, &template, settings),
                &ProviderCatalog::default(),
            )
            .unwrap();

            let Request::NodeGroup(request) = &graph.get(handle.id()).unwrap().request else {
                panic!("expected node group request");
            };
            assert_eq!(request.scaling_config.min_size, min_size);
            assert_eq!(request.scaling_config.desired_size, min_size);
            assert_eq!(request.scaling_config.max_size, min_size);
        }
    }

    #[test]
    fn test_min_size_below_two_is_rejected() {
        for min_size in [0, 1] {
            let (mut graph, cluster, template) = seeded_graph();
            let mut settings = settings();
            settings.min_size = min_size;
            let before = graph.len();

            let err = declare_node_group(
                &mut graph,
                &spec(&cluster, &template, settings),
                &ProviderCatalog::default(),
            )
            .unwrap_err();

            assert_eq!(
                err,
                ConfigurationError::MinSizeTooSmall {
                    minimum: 2,
                    actual: min_size
                }
            );
            assert_eq!(graph.len(), before);
        }
    }

    #[test]
    fn test_empty_instance_types_rejected() {
        let (mut graph, cluster, template) = seeded_graph();
        let mut settings = settings();
        settings.instance_types.clear();
        let err = declare_node_group(
            &mut graph,
            &spec(&cluster, &template, settings),
            &ProviderCatalog::default(),
        )
        .unwrap_err();
        assert_eq!(err, ConfigurationError::EmptyInstanceTypes);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_scaling_bounds() {
        let catalog = ProviderCatalog::default();
        let mut settings = settings();
        settings.max_size = Some(5);
        settings.desired_size = Some(3);
        assert_eq!(
            settings.validate(&catalog).unwrap(),
            ScalingConfig {
                min_size: 2,
                max_size: 5,
                desired_size: 3
            }
        );

        settings.desired_size = Some(6);
        assert!(matches!(
            settings.validate(&catalog),
            Err(ConfigurationError::InvalidScaling { .. })
        ));
    }

    #[test]
    fn test_request_references_cluster_and_pinned_template() {
        let (mut graph, cluster, template) = seeded_graph();
        let handle = declare_node_group(
            &mut graph,
            &spec(&cluster, &template, settings()),
            &ProviderCatalog::default(),
        )
        .unwrap();

        let declaration = graph.get(handle.id()).unwrap();
        assert_eq!(declaration.name, "demo-managed-ng");
        assert_eq!(declaration.depends_on, vec![cluster.id(), template.id()]);

        let json = &declaration.spec;
        assert_eq!(json["subnets"]["type"], "PUBLIC");
        assert_eq!(json["clusterName"]["fromOutput"]["resource"], "demo");
        assert_eq!(
            json["launchTemplate"]["version"]["fromOutput"]["attribute"],
            "latestVersion"
        );
        assert_eq!(
            json["launchTemplate"]["id"]["fromOutput"]["resource"],
            "demo-launch-template"
        );
    }
}
