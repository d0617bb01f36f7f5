/// Composes the full cluster + node group declaration graph
use tracing::info;

use super::binding::bind_managed_policy;
use super::catalog::ProviderCatalog;
use super::cluster::{declare_cluster, ClusterSpec};
use super::graph::{
    ClusterHandle, DeclarationGraph, ExecutionIdentity, LaunchTemplateHandle, NodeGroupHandle,
    PolicyBindingHandle,
};
use super::launch::declare_launch_template;
use super::nodegroup::{declare_node_group, NodeGroupSettings, NodeGroupSpec};
use super::types::ArtifactLookup;
use crate::error::Result;

/// Everything needed to declare one cluster and its node group
#[derive(Debug, Clone, PartialEq)]
pub struct StackSpec {
    pub cluster: ClusterSpec,
    pub node_group: NodeGroupSettings,
    pub policies: Vec<String>,
}

/// A fully composed stack, ready to hand to the driver
#[derive(Debug, Clone)]
pub struct StackDeclaration {
    pub graph: DeclarationGraph,
    pub cluster: ClusterHandle,
    pub launch_template: LaunchTemplateHandle,
    pub node_group: NodeGroupHandle,
    pub identity: ExecutionIdentity,
    pub bindings: Vec<PolicyBindingHandle>,
}

/// Build the declaration graph for a stack.
///
/// Composition is all-or-nothing: any configuration or binding error is
/// returned before a graph exists, so the driver never sees a partial stack.
pub fn compose(
    spec: &StackSpec,
    catalog: &ProviderCatalog,
    artifacts: &dyn ArtifactLookup,
) -> Result<StackDeclaration> {
    // Validate node group inputs up front so nothing is declared for a stack
    // that cannot be completed.
    spec.node_group.validate(catalog)?;
    for policy in &spec.policies {
        catalog.check_policy(policy)?;
    }

    let mut graph = DeclarationGraph::new();

    let cluster = declare_cluster(&mut graph, &spec.cluster, catalog, artifacts)?;
    let launch_template = declare_launch_template(&mut graph, &spec.cluster.name)?;
    let node_group = declare_node_group(
        &mut graph,
        &NodeGroupSpec {
            cluster: cluster.clone(),
            launch_template: launch_template.clone(),
            settings: spec.node_group.clone(),
        },
        catalog,
    )?;

    let identity = node_group.execution_identity();
    let mut bindings = Vec::with_capacity(spec.policies.len());
    for policy in &spec.policies {
        let binding = bind_managed_policy(&mut graph, Some(&identity), policy, catalog)?;
        if !bindings.contains(&binding) {
            bindings.push(binding);
        }
    }

    info!(
        "Composed stack {} with {} declarations",
        spec.cluster.name,
        graph.len()
    );

    Ok(StackDeclaration {
        graph,
        cluster,
        launch_template,
        node_group,
        identity,
        bindings,
    })
}
