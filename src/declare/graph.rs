/// Declaration graph: typed handles, output references and dependency edges
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;

use super::binding::PolicyBindingRequest;
use super::cluster::ClusterRequest;
use super::launch::LaunchTemplateRequest;
use super::nodegroup::NodeGroupRequest;
use crate::error::ConfigurationError;

/// JSON key marking a value that only exists once a dependency is realized
pub const OUTPUT_KEY: &str = "fromOutput";

/// Position of a declaration inside its graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(usize);

impl ResourceId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Kind of provider resource a declaration maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Cluster,
    LaunchTemplate,
    NodeGroup,
    PolicyBinding,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "cluster",
            ResourceKind::LaunchTemplate => "launch-template",
            ResourceKind::NodeGroup => "node-group",
            ResourceKind::PolicyBinding => "policy-binding",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute a realized resource exports to its dependents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Attribute {
    Name,
    Endpoint,
    RoleArn,
    Id,
    LatestVersion,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Name => "name",
            Attribute::Endpoint => "endpoint",
            Attribute::RoleArn => "roleArn",
            Attribute::Id => "id",
            Attribute::LatestVersion => "latestVersion",
        }
    }
}

/// Pointer to an attribute of another declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRef {
    pub resource: String,
    pub attribute: Attribute,
}

/// A request field known now, or only after a dependency is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<T> {
    #[allow(dead_code)]
    Literal(T),
    Output(OutputRef),
}

impl<T: Serialize> Serialize for Value<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Literal(value) => value.serialize(serializer),
            Value::Output(output) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(OUTPUT_KEY, output)?;
                map.end()
            }
        }
    }
}

/// Marker types for [`Handle`]
#[derive(Debug, Clone, Copy)]
pub struct Cluster;
#[derive(Debug, Clone, Copy)]
pub struct LaunchTemplate;
#[derive(Debug, Clone, Copy)]
pub struct NodeGroup;
#[derive(Debug, Clone, Copy)]
pub struct PolicyBinding;

/// Typed reference to a declaration that may not be realized yet
#[derive(Debug)]
pub struct Handle<K> {
    id: ResourceId,
    name: String,
    _kind: PhantomData<K>,
}

impl<K> Clone for Handle<K> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name
    }
}

impl<K> Handle<K> {
    fn new(id: ResourceId, name: String) -> Self {
        Self {
            id,
            name,
            _kind: PhantomData,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn output<T>(&self, attribute: Attribute) -> Value<T> {
        Value::Output(OutputRef {
            resource: self.name.clone(),
            attribute,
        })
    }
}

pub type ClusterHandle = Handle<Cluster>;
pub type LaunchTemplateHandle = Handle<LaunchTemplate>;
pub type NodeGroupHandle = Handle<NodeGroup>;
pub type PolicyBindingHandle = Handle<PolicyBinding>;

impl ClusterHandle {
    pub fn cluster_name(&self) -> Value<String> {
        self.output(Attribute::Name)
    }
}

impl LaunchTemplateHandle {
    pub fn template_id(&self) -> Value<String> {
        self.output(Attribute::Id)
    }

    /// Concrete version number of the template, never "$Latest"
    pub fn latest_version(&self) -> Value<u64> {
        self.output(Attribute::LatestVersion)
    }
}

impl NodeGroupHandle {
    /// The role the node group's instances assume, created when the group is applied
    pub fn execution_identity(&self) -> ExecutionIdentity {
        ExecutionIdentity {
            node_group: self.clone(),
        }
    }
}

/// Execution identity owned by a node group
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionIdentity {
    node_group: NodeGroupHandle,
}

impl ExecutionIdentity {
    pub fn node_group(&self) -> &NodeGroupHandle {
        &self.node_group
    }

    pub fn role_arn(&self) -> Value<String> {
        self.node_group.output(Attribute::RoleArn)
    }
}

/// Provider request carried by a declaration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Request {
    Cluster(ClusterRequest),
    LaunchTemplate(LaunchTemplateRequest),
    NodeGroup(NodeGroupRequest),
    PolicyBinding(PolicyBindingRequest),
}

impl Request {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Request::Cluster(_) => ResourceKind::Cluster,
            Request::LaunchTemplate(_) => ResourceKind::LaunchTemplate,
            Request::NodeGroup(_) => ResourceKind::NodeGroup,
            Request::PolicyBinding(_) => ResourceKind::PolicyBinding,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, ConfigurationError> {
        serde_json::to_value(self)
            .map_err(|e| ConfigurationError::invalid("request", e.to_string()))
    }
}

/// A single resource declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub id: ResourceId,
    pub name: String,
    pub request: Request,
    /// `request` as sent to the provider, output references still unresolved
    pub spec: serde_json::Value,
    pub depends_on: Vec<ResourceId>,
}

impl Declaration {
    pub fn kind(&self) -> ResourceKind {
        self.request.kind()
    }
}

/// Ordered set of declarations plus the dependency edges the driver must respect
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclarationGraph {
    nodes: Vec<Declaration>,
    by_name: HashMap<String, ResourceId>,
}

impl DeclarationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration.
    ///
    /// Every output reference in the request becomes a dependency edge, so a
    /// request can only point at declarations already in the graph. That keeps
    /// the graph acyclic.
    pub(crate) fn insert<K>(
        &mut self,
        name: impl Into<String>,
        request: Request,
        extra_deps: &[ResourceId],
    ) -> Result<Handle<K>, ConfigurationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigurationError::MissingField("name"));
        }
        if self.by_name.contains_key(&name) {
            return Err(ConfigurationError::invalid(
                "name",
                format!("resource {} is declared twice", name),
            ));
        }

        let spec = request.to_json()?;
        let mut depends_on = Vec::new();
        for output in collect_refs(&spec) {
            let dep = self
                .by_name
                .get(&output.resource)
                .copied()
                .ok_or_else(|| ConfigurationError::DanglingReference(output.resource.clone()))?;
            if !depends_on.contains(&dep) {
                depends_on.push(dep);
            }
        }
        for dep in extra_deps {
            if dep.0 >= self.nodes.len() {
                return Err(ConfigurationError::DanglingReference(format!("#{}", dep.0)));
            }
            if !depends_on.contains(dep) {
                depends_on.push(*dep);
            }
        }
        depends_on.sort();

        let id = ResourceId(self.nodes.len());
        self.by_name.insert(name.clone(), id);
        self.nodes.push(Declaration {
            id,
            name: name.clone(),
            request,
            spec,
            depends_on,
        });

        Ok(Handle::new(id, name))
    }

    pub fn get(&self, id: ResourceId) -> Option<&Declaration> {
        self.nodes.get(id.0)
    }

    pub(crate) fn handle<K>(&self, name: &str) -> Option<Handle<K>> {
        self.by_name
            .get(name)
            .map(|id| Handle::new(*id, name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Group declarations into waves: everything in a wave depends only on earlier waves
    pub fn waves(&self) -> Vec<Vec<ResourceId>> {
        let mut level = vec![0usize; self.nodes.len()];
        for node in &self.nodes {
            // Dependencies always precede their dependents in `nodes`.
            level[node.id.0] = node
                .depends_on
                .iter()
                .map(|dep| level[dep.0] + 1)
                .max()
                .unwrap_or(0);
        }

        let mut waves: Vec<Vec<ResourceId>> = Vec::new();
        for node in &self.nodes {
            let wave = level[node.id.0];
            if waves.len() <= wave {
                waves.resize_with(wave + 1, Vec::new);
            }
            waves[wave].push(node.id);
        }
        waves
    }

    /// Teardown order: dependents before the resources they depend on
    pub fn teardown_order(&self) -> Vec<ResourceId> {
        self.waves().into_iter().rev().flatten().collect()
    }
}

/// Serializable view used by `plan`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedResource {
    pub name: String,
    pub kind: ResourceKind,
    pub wave: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    pub spec: serde_json::Value,
}

impl DeclarationGraph {
    pub fn plan(&self) -> Vec<PlannedResource> {
        let mut planned = Vec::with_capacity(self.nodes.len());
        for (wave, ids) in self.waves().into_iter().enumerate() {
            for id in ids {
                let node = &self.nodes[id.0];
                planned.push(PlannedResource {
                    name: node.name.clone(),
                    kind: node.kind(),
                    wave,
                    depends_on: node
                        .depends_on
                        .iter()
                        .map(|dep| self.nodes[dep.0].name.clone())
                        .collect(),
                    spec: node.spec.clone(),
                });
            }
        }
        planned
    }
}

/// Realized attributes of one resource
pub type ResourceOutputs = BTreeMap<String, serde_json::Value>;

/// Find every output reference inside a serialized request
pub fn collect_refs(value: &serde_json::Value) -> Vec<OutputRef> {
    let mut refs = Vec::new();
    walk_refs(value, &mut refs);
    refs
}

fn walk_refs(value: &serde_json::Value, refs: &mut Vec<OutputRef>) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(output) = parse_ref(map) {
                refs.push(output);
                return;
            }
            for child in map.values() {
                walk_refs(child, refs);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                walk_refs(item, refs);
            }
        }
        _ => {}
    }
}

fn parse_ref(map: &serde_json::Map<String, serde_json::Value>) -> Option<OutputRef> {
    if map.len() != 1 {
        return None;
    }
    let inner = map.get(OUTPUT_KEY)?.as_object()?;
    let resource = inner.get("resource")?.as_str()?.to_string();
    let attribute = match inner.get("attribute")?.as_str()? {
        "name" => Attribute::Name,
        "endpoint" => Attribute::Endpoint,
        "roleArn" => Attribute::RoleArn,
        "id" => Attribute::Id,
        "latestVersion" => Attribute::LatestVersion,
        _ => return None,
    };
    Some(OutputRef {
        resource,
        attribute,
    })
}

/// Replace output references with realized values.
///
/// Returns the first reference that has no realized value.
pub fn resolve_refs(
    value: &serde_json::Value,
    outputs: &HashMap<String, ResourceOutputs>,
) -> Result<serde_json::Value, OutputRef> {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(output) = parse_ref(map) {
                return outputs
                    .get(&output.resource)
                    .and_then(|attrs| attrs.get(output.attribute.as_str()))
                    .cloned()
                    .ok_or(output);
            }
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, child) in map {
                resolved.insert(key.clone(), resolve_refs(child, outputs)?);
            }
            Ok(serde_json::Value::Object(resolved))
        }
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| resolve_refs(item, outputs))
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array),
        other => Ok(other.clone()),
    }
}
