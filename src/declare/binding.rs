/// Managed-policy attachment to a node group's execution identity
use serde::Serialize;
use tracing::debug;

use super::catalog::ProviderCatalog;
use super::graph::{
    DeclarationGraph, ExecutionIdentity, PolicyBindingHandle, Request, ResourceKind, Value,
};
use crate::error::{BindingError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyBindingRequest {
    pub role: Value<String>,
    pub policy_name: String,
}

/// Attach a managed policy to an execution identity.
///
/// The binding is a post-creation mutation of the role: it depends on the node
/// group, and binding the same policy twice returns the existing declaration.
pub fn bind_managed_policy(
    graph: &mut DeclarationGraph,
    identity: Option<&ExecutionIdentity>,
    policy_name: &str,
    catalog: &ProviderCatalog,
) -> Result<PolicyBindingHandle> {
    let identity = identity.ok_or_else(|| BindingError::MissingIdentity {
        policy: policy_name.to_string(),
    })?;

    let node_group = identity.node_group();
    let owns_identity = graph.get(node_group.id()).is_some_and(|decl| {
        decl.kind() == ResourceKind::NodeGroup && decl.name == node_group.name()
    });
    if !owns_identity {
        return Err(BindingError::NotAnIdentity(node_group.name().to_string()).into());
    }
    catalog.check_policy(policy_name)?;

    let name = format!("{}-{}", node_group.name(), policy_name);
    if let Some(existing) = graph.handle(&name) {
        return Ok(existing);
    }

    debug!("Binding {} to the role of {}", policy_name, node_group.name());

    let request = PolicyBindingRequest {
        role: identity.role_arn(),
        policy_name: policy_name.to_string(),
    };
    let handle = graph.insert(name, Request::PolicyBinding(request), &[node_group.id()])?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::catalog::SSM_MANAGED_INSTANCE_CORE;
    use crate::declare::cluster::{declare_cluster, ClusterSpec};
    use crate::declare::graph::NodeGroupHandle;
    use crate::declare::launch::declare_launch_template;
    use crate::declare::nodegroup::{declare_node_group, NodeGroupSettings, NodeGroupSpec};
    use crate::declare::types::{
        AmiType, InstanceType, KubectlLayerLookup, NetworkRef, Subnet, SubnetType, VersionTag,
    };
    use crate::error::Error;

    fn graph_with_node_group(cluster_name: &str) -> (DeclarationGraph, NodeGroupHandle) {
        let catalog = ProviderCatalog::default();
        let network = NetworkRef {
            id: "vpc-1".to_string(),
            subnets: vec![Subnet {
                id: "subnet-a".to_string(),
                subnet_type: SubnetType::Public,
            }],
        };
        let mut graph = DeclarationGraph::new();
        let cluster = declare_cluster(
            &mut graph,
            &ClusterSpec::new(cluster_name, network, VersionTag::new("1.33")),
            &catalog,
            &KubectlLayerLookup,
        )
        .unwrap();
        let launch_template = declare_launch_template(&mut graph, cluster_name).unwrap();
        let node_group = declare_node_group(
            &mut graph,
            &NodeGroupSpec {
                cluster,
                launch_template,
                settings: NodeGroupSettings::new(
                    AmiType::AL2_x86_64,
                    vec![InstanceType::new("m5.large")],
                ),
            },
            &catalog,
        )
        .unwrap();
        (graph, node_group)
    }

    #[test]
    fn test_bind_ssm_policy() {
        let (mut graph, node_group) = graph_with_node_group("demo");
        let identity = node_group.execution_identity();

        let handle = bind_managed_policy(
            &mut graph,
            Some(&identity),
            SSM_MANAGED_INSTANCE_CORE,
            &ProviderCatalog::default(),
        )
        .unwrap();

        let declaration = graph.get(handle.id()).unwrap();
        assert_eq!(declaration.depends_on, vec![node_group.id()]);
        assert_eq!(
            declaration.spec,
            serde_json::json!({
                "role": {"fromOutput": {"resource": "demo-managed-ng", "attribute": "roleArn"}},
                "policyName": "AmazonSSMManagedInstanceCore"
            })
        );
    }

    #[test]
    fn test_absent_identity() {
        let (mut graph, _) = graph_with_node_group("demo");
        let before = graph.len();
        let err = bind_managed_policy(
            &mut graph,
            None,
            SSM_MANAGED_INSTANCE_CORE,
            &ProviderCatalog::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Binding(BindingError::MissingIdentity { .. })));
        assert_eq!(graph.len(), before);
    }

    #[test]
    fn test_unknown_policy() {
        let (mut graph, node_group) = graph_with_node_group("demo");
        let err = bind_managed_policy(
            &mut graph,
            Some(&node_group.execution_identity()),
            "MadeUpPolicy",
            &ProviderCatalog::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Binding(BindingError::UnknownPolicy(ref policy)) if policy == "MadeUpPolicy"
        ));
    }

    #[test]
    fn test_identity_from_another_graph() {
        let (_, foreign) = graph_with_node_group("other");
        let (mut graph, _) = graph_with_node_group("demo");
        let err = bind_managed_policy(
            &mut graph,
            Some(&foreign.execution_identity()),
            SSM_MANAGED_INSTANCE_CORE,
            &ProviderCatalog::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Binding(BindingError::NotAnIdentity(ref name)) if name == "other-managed-ng"
        ));
    }

    #[test]
    fn test_binding_twice_is_idempotent() {
        let (mut graph, node_group) = graph_with_node_group("demo");
        let identity = node_group.execution_identity();
        let catalog = ProviderCatalog::default();

        let first = bind_managed_policy(
            &mut graph,
            Some(&identity),
            SSM_MANAGED_INSTANCE_CORE,
            &catalog,
        )
        .unwrap();
        let second = bind_managed_policy(
            &mut graph,
            Some(&identity),
            SSM_MANAGED_INSTANCE_CORE,
            &catalog,
        )
        .unwrap();
        assert_eq!(first, second);
        assert_eq!(graph.len(), 4);
    }
}
