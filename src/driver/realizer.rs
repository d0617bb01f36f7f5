/// Dependency-ordered realization of a declaration graph
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::models::LiveResource;
use super::{Change, Provider, ResourceState};
use crate::declare::graph::{
    resolve_refs, Attribute, ClusterHandle, Declaration, LaunchTemplateHandle, NodeGroupHandle,
    OutputRef, Request,
};
use crate::declare::{DeclarationGraph, ResourceKind, ResourceOutputs};
use crate::error::{BindingError, Error, ProviderError, Result};

/// Walks a graph wave by wave, moving each resource through
/// `Declared -> Diffed -> Applying -> Applied` (or `Failed`).
///
/// A resource only enters `Applying` once everything it depends on is
/// `Applied`. The first failure stops realization; nothing is retried or
/// rolled back.
pub struct Realizer<'a, P> {
    graph: &'a DeclarationGraph,
    provider: &'a P,
    states: Vec<ResourceState>,
    changes: Vec<Option<Change>>,
    outputs: HashMap<String, ResourceOutputs>,
}

impl<'a, P: Provider> Realizer<'a, P> {
    pub fn new(graph: &'a DeclarationGraph, provider: &'a P) -> Self {
        Self {
            graph,
            provider,
            states: vec![ResourceState::Declared; graph.len()],
            changes: vec![None; graph.len()],
            outputs: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn state(&self, id: crate::declare::ResourceId) -> ResourceState {
        self.states[id.index()]
    }

    #[cfg(test)]
    pub fn change(&self, id: crate::declare::ResourceId) -> Option<Change> {
        self.changes[id.index()]
    }

    fn transition(&mut self, decl: &Declaration, state: ResourceState) {
        let previous = self.states[decl.id.index()];
        self.states[decl.id.index()] = state;
        match state {
            ResourceState::Failed => {
                warn!("{} {}: {} -> {}", decl.kind(), decl.name, previous, state)
            }
            ResourceState::Applying | ResourceState::Applied => {
                info!("{} {}: {} -> {}", decl.kind(), decl.name, previous, state)
            }
            _ => debug!("{} {}: {} -> {}", decl.kind(), decl.name, previous, state),
        }
    }

    /// Compare every declaration with what the provider currently has
    pub async fn diff(&mut self) -> Result<()> {
        let graph = self.graph;
        let mut live_outputs: HashMap<String, ResourceOutputs> = HashMap::new();

        // Declarations are stored after everything they depend on.
        for decl in graph.iter() {
            let live = self.provider.describe(decl.kind(), &decl.name).await?;
            let dependency_changing = decl
                .depends_on
                .iter()
                .any(|dep| self.changes[dep.index()] != Some(Change::Unchanged));

            let change = match live {
                None => Change::Create,
                Some(LiveResource { spec, outputs, .. }) => {
                    let desired = resolve_refs(&decl.spec, &live_outputs);
                    let same = matches!(&desired, Ok(desired) if *desired == spec);
                    live_outputs.insert(decl.name.clone(), outputs.clone());
                    if same && !dependency_changing {
                        self.outputs.insert(decl.name.clone(), outputs);
                        Change::Unchanged
                    } else {
                        Change::Update
                    }
                }
            };

            debug!("{} {} needs {}", decl.kind(), decl.name, change);
            self.changes[decl.id.index()] = Some(change);
            self.transition(decl, ResourceState::Diffed);
        }

        Ok(())
    }

    /// Realize the whole graph
    pub async fn apply(&mut self) -> Result<ApplyReport> {
        if self.states.contains(&ResourceState::Declared) {
            self.diff().await?;
        }

        let graph = self.graph;
        let provider = self.provider;

        for (wave_index, wave) in graph.waves().into_iter().enumerate() {
            let mut pending: Vec<(&Declaration, serde_json::Value)> = Vec::new();

            for id in wave {
                let Some(decl) = graph.get(id) else {
                    continue;
                };
                if self.states[id.index()] == ResourceState::Applied {
                    continue;
                }
                if let Some(dep) = decl
                    .depends_on
                    .iter()
                    .find(|dep| self.states[dep.index()] != ResourceState::Applied)
                {
                    let dep_name = graph
                        .get(*dep)
                        .map(|d| d.name.clone())
                        .unwrap_or_default();
                    return Err(self.fail_unrealized(
                        decl,
                        OutputRef {
                            resource: dep_name,
                            attribute: Attribute::Name,
                        },
                    ));
                }
                if self.changes[id.index()] == Some(Change::Unchanged) {
                    self.transition(decl, ResourceState::Applied);
                    continue;
                }

                let spec = match resolve_refs(&decl.spec, &self.outputs) {
                    Ok(spec) => spec,
                    Err(missing) => return Err(self.fail_unrealized(decl, missing)),
                };
                self.transition(decl, ResourceState::Applying);
                pending.push((decl, spec));
            }

            if pending.is_empty() {
                continue;
            }
            debug!("Applying wave {} ({} resources)", wave_index, pending.len());

            let results = join_all(
                pending
                    .iter()
                    .map(|(decl, spec)| provider.apply(decl.kind(), &decl.name, spec)),
            )
            .await;

            let mut failure: Option<ProviderError> = None;
            for ((decl, _), result) in pending.iter().zip(results) {
                match result {
                    Ok(outputs) => {
                        self.outputs.insert(decl.name.clone(), outputs);
                        self.transition(decl, ResourceState::Applied);
                    }
                    Err(e) => {
                        warn!("Failed to apply {} {}: {}", decl.kind(), decl.name, e);
                        self.transition(decl, ResourceState::Failed);
                        failure.get_or_insert(e);
                    }
                }
            }
            if let Some(e) = failure {
                return Err(e.into());
            }
        }

        Ok(self.report())
    }

    /// Mark a resource failed because something it needs was never realized
    fn fail_unrealized(&mut self, decl: &Declaration, missing: OutputRef) -> Error {
        self.transition(decl, ResourceState::Failed);
        match &decl.request {
            Request::PolicyBinding(binding) => BindingError::IdentityNotRealized {
                node_group: missing.resource,
                policy: binding.policy_name.clone(),
            }
            .into(),
            _ => ProviderError::MissingOutput {
                resource: missing.resource,
                attribute: missing.attribute.as_str().to_string(),
            }
            .into(),
        }
    }

    pub fn report(&self) -> ApplyReport {
        ApplyReport {
            applied_at: Utc::now(),
            resources: self
                .graph
                .iter()
                .map(|decl| ResourceReport {
                    name: decl.name.clone(),
                    kind: decl.kind(),
                    state: self.states[decl.id.index()],
                    change: self.changes[decl.id.index()],
                    outputs: self.outputs.get(&decl.name).cloned().unwrap_or_default(),
                })
                .collect(),
        }
    }
}

/// Result of a realization run, written to `outputs.json`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub applied_at: DateTime<Utc>,
    pub resources: Vec<ResourceReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceReport {
    pub name: String,
    pub kind: ResourceKind,
    pub state: ResourceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<Change>,
    #[serde(skip_serializing_if = "ResourceOutputs::is_empty")]
    pub outputs: ResourceOutputs,
}

impl ApplyReport {
    pub fn outputs(&self, name: &str) -> Option<&ResourceOutputs> {
        self.resources
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outputs)
    }

    fn string_output(&self, resource: &str, attribute: Attribute) -> Result<String, ProviderError> {
        self.outputs(resource)
            .and_then(|outputs| outputs.get(attribute.as_str()))
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::MissingOutput {
                resource: resource.to_string(),
                attribute: attribute.as_str().to_string(),
            })
    }

    /// Realized identity of the control plane
    pub fn cluster(&self, handle: &ClusterHandle) -> Result<ClusterOutputs, ProviderError> {
        Ok(ClusterOutputs {
            name: self.string_output(handle.name(), Attribute::Name)?,
            endpoint: self.string_output(handle.name(), Attribute::Endpoint)?,
            role_arn: self.string_output(handle.name(), Attribute::RoleArn)?,
        })
    }

    pub fn launch_template(
        &self,
        handle: &LaunchTemplateHandle,
    ) -> Result<LaunchTemplateOutputs, ProviderError> {
        let latest_version = self
            .outputs(handle.name())
            .and_then(|outputs| outputs.get(Attribute::LatestVersion.as_str()))
            .and_then(|value| value.as_u64())
            .ok_or_else(|| ProviderError::MissingOutput {
                resource: handle.name().to_string(),
                attribute: Attribute::LatestVersion.as_str().to_string(),
            })?;
        Ok(LaunchTemplateOutputs {
            id: self.string_output(handle.name(), Attribute::Id)?,
            latest_version,
        })
    }

    /// Realized node group and the role its instances assume
    pub fn node_group(&self, handle: &NodeGroupHandle) -> Result<NodeGroupOutputs, ProviderError> {
        Ok(NodeGroupOutputs {
            name: self.string_output(handle.name(), Attribute::Name)?,
            role_arn: self.string_output(handle.name(), Attribute::RoleArn)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOutputs {
    pub name: String,
    pub endpoint: String,
    /// Control-plane role generated by the provider
    pub role_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchTemplateOutputs {
    pub id: String,
    pub latest_version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupOutputs {
    pub name: String,
    /// Execution identity; further policies can be bound to it
    pub role_arn: String,
}

/// Delete every declared resource, dependents first
pub async fn destroy<P: Provider>(
    graph: &DeclarationGraph,
    provider: &P,
) -> Result<Vec<String>, ProviderError> {
    let mut deleted = Vec::new();

    for id in graph.teardown_order() {
        let Some(decl) = graph.get(id) else {
            continue;
        };
        if provider.describe(decl.kind(), &decl.name).await?.is_none() {
            info!("{} {} not found, nothing to delete", decl.kind(), decl.name);
            continue;
        }

        info!("Deleting {} {}", decl.kind(), decl.name);
        provider.delete(decl.kind(), &decl.name).await?;
        deleted.push(decl.name.clone());
    }

    Ok(deleted)
}

/// Live view of one declared resource
#[derive(Debug, Clone)]
pub struct ResourceStatus {
    pub name: String,
    pub kind: ResourceKind,
    pub live: Option<LiveResource>,
}

/// Describe every declared resource
pub async fn status<P: Provider>(
    graph: &DeclarationGraph,
    provider: &P,
) -> Result<Vec<ResourceStatus>, ProviderError> {
    let mut statuses = Vec::with_capacity(graph.len());
    for decl in graph.iter() {
        statuses.push(ResourceStatus {
            name: decl.name.clone(),
            kind: decl.kind(),
            live: provider.describe(decl.kind(), &decl.name).await?,
        });
    }
    Ok(statuses)
}
