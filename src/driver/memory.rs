/// In-memory provider used for dry runs and tests
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

use super::models::LiveResource;
use super::Provider;
use crate::declare::{ResourceKind, ResourceOutputs};
use crate::error::ProviderError;

const ACCOUNT_ID: &str = "000000000000";

/// Kind of call recorded by [`InMemoryProvider`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Describe,
    Apply,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub op: CallKind,
    pub kind: ResourceKind,
    pub name: String,
}

/// Provider that keeps resources in a map.
///
/// It enforces the same existence rules as a real control plane: a node group
/// needs its cluster and launch template, a policy binding needs its role, and
/// a cluster cannot be deleted while node groups still use it.
pub struct InMemoryProvider {
    region: String,
    resources: Mutex<BTreeMap<(String, String), LiveResource>>,
    failures: Mutex<HashMap<String, ProviderError>>,
    omitted: Mutex<HashSet<(String, String)>>,
    calls: Mutex<Vec<ProviderCall>>,
    next_id: AtomicU64,
}

fn key(kind: ResourceKind, name: &str) -> (String, String) {
    (kind.as_str().to_string(), name.to_string())
}

fn not_found(what: &str, name: &str) -> ProviderError {
    ProviderError::Api {
        code: "ResourceNotFoundException".to_string(),
        message: format!("{} {} not found", what, name),
    }
}

impl InMemoryProvider {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            resources: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(HashMap::new()),
            omitted: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Make every apply or delete of `name` fail with `error`
    #[cfg(test)]
    pub async fn fail_on(&self, name: impl Into<String>, error: ProviderError) {
        self.failures.lock().await.insert(name.into(), error);
    }

    /// Drop an output attribute from what `name` reports after apply
    #[cfg(test)]
    pub async fn omit_output(&self, name: impl Into<String>, attribute: impl Into<String>) {
        self.omitted
            .lock()
            .await
            .insert((name.into(), attribute.into()));
    }

    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().await.clone()
    }

    /// Names passed to `apply`, in call order
    #[cfg(test)]
    pub async fn applied_names(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.op == CallKind::Apply)
            .map(|c| c.name.clone())
            .collect()
    }

    async fn record(&self, op: CallKind, kind: ResourceKind, name: &str) {
        self.calls.lock().await.push(ProviderCall {
            op,
            kind,
            name: name.to_string(),
        });
    }

    async fn injected_failure(&self, name: &str) -> Option<ProviderError> {
        self.failures.lock().await.get(name).cloned()
    }

    fn output_str<'r>(
        resources: &'r BTreeMap<(String, String), LiveResource>,
        kind: ResourceKind,
        name: &str,
        attribute: &str,
    ) -> Option<&'r str> {
        resources
            .get(&key(kind, name))
            .and_then(|r| r.outputs.get(attribute))
            .and_then(|v| v.as_str())
    }

    fn compute_outputs(
        &self,
        resources: &BTreeMap<(String, String), LiveResource>,
        kind: ResourceKind,
        name: &str,
        spec: &serde_json::Value,
    ) -> Result<ResourceOutputs, ProviderError> {
        let previous = resources.get(&key(kind, name));
        let mut outputs = ResourceOutputs::new();

        match kind {
            ResourceKind::Cluster => {
                outputs.insert("name".to_string(), name.into());
                outputs.insert(
                    "endpoint".to_string(),
                    format!("https://{}.{}.eks.local", name, self.region).into(),
                );
                outputs.insert(
                    "roleArn".to_string(),
                    format!("arn:aws:iam::{}:role/{}-cluster-role", ACCOUNT_ID, name).into(),
                );
            }
            ResourceKind::LaunchTemplate => {
                let (id, version) = match previous {
                    Some(live) => {
                        let id = live.outputs.get("id").cloned().unwrap_or_default();
                        let version = live
                            .outputs
                            .get("latestVersion")
                            .and_then(|v| v.as_u64())
                            .unwrap_or(1);
                        // Templates are immutable: new content means a new version.
                        let version = if live.spec == *spec { version } else { version + 1 };
                        (id, version)
                    }
                    None => (
                        format!("lt-{:017x}", self.next_id.fetch_add(1, Ordering::SeqCst)).into(),
                        1,
                    ),
                };
                outputs.insert("id".to_string(), id);
                outputs.insert("latestVersion".to_string(), version.into());
            }
            ResourceKind::NodeGroup => {
                let cluster = spec["clusterName"].as_str().unwrap_or_default();
                if !resources.contains_key(&key(ResourceKind::Cluster, cluster)) {
                    return Err(not_found("cluster", cluster));
                }
                let template_id = spec["launchTemplate"]["id"].as_str().unwrap_or_default();
                let template_known = resources
                    .iter()
                    .filter(|((k, _), _)| k == ResourceKind::LaunchTemplate.as_str())
                    .any(|(_, live)| {
                        live.outputs.get("id").and_then(|v| v.as_str()) == Some(template_id)
                    });
                if !template_known {
                    return Err(not_found("launch template", template_id));
                }
                outputs.insert("name".to_string(), name.into());
                outputs.insert(
                    "roleArn".to_string(),
                    format!("arn:aws:iam::{}:role/{}-role", ACCOUNT_ID, name).into(),
                );
            }
            ResourceKind::PolicyBinding => {
                let role = spec["role"].as_str().unwrap_or_default();
                let role_exists = resources
                    .keys()
                    .filter(|(k, _)| k == ResourceKind::NodeGroup.as_str())
                    .any(|(_, ng)| {
                        Self::output_str(resources, ResourceKind::NodeGroup, ng, "roleArn")
                            == Some(role)
                    });
                if !role_exists {
                    return Err(ProviderError::Api {
                        code: "NoSuchEntity".to_string(),
                        message: format!("role {} does not exist", role),
                    });
                }
                let policy = spec["policyName"].as_str().unwrap_or_default();
                outputs.insert(
                    "policyArn".to_string(),
                    format!("arn:aws:iam::aws:policy/{}", policy).into(),
                );
            }
        }

        Ok(outputs)
    }
}

impl Provider for InMemoryProvider {
    async fn describe(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<LiveResource>, ProviderError> {
        self.record(CallKind::Describe, kind, name).await;
        Ok(self.resources.lock().await.get(&key(kind, name)).cloned())
    }

    async fn apply(
        &self,
        kind: ResourceKind,
        name: &str,
        spec: &serde_json::Value,
    ) -> Result<ResourceOutputs, ProviderError> {
        self.record(CallKind::Apply, kind, name).await;
        if let Some(error) = self.injected_failure(name).await {
            return Err(error);
        }

        let mut resources = self.resources.lock().await;
        let mut outputs = self.compute_outputs(&resources, kind, name, spec)?;
        {
            let omitted = self.omitted.lock().await;
            outputs
                .retain(|attribute, _| !omitted.contains(&(name.to_string(), attribute.clone())));
        }

        debug!("in-memory apply {} {}", kind, name);
        resources.insert(
            key(kind, name),
            LiveResource {
                name: name.to_string(),
                spec: spec.clone(),
                outputs: outputs.clone(),
            },
        );
        Ok(outputs)
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<(), ProviderError> {
        self.record(CallKind::Delete, kind, name).await;
        if let Some(error) = self.injected_failure(name).await {
            return Err(error);
        }

        let mut resources = self.resources.lock().await;
        if kind == ResourceKind::Cluster {
            let in_use = resources
                .iter()
                .filter(|((k, _), _)| k == ResourceKind::NodeGroup.as_str())
                .any(|(_, ng)| ng.spec["clusterName"].as_str() == Some(name));
            if in_use {
                return Err(ProviderError::Api {
                    code: "ResourceInUseException".to_string(),
                    message: format!("cluster {} still has node groups", name),
                });
            }
        }
        resources.remove(&key(kind, name));
        Ok(())
    }
}
