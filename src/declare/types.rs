/// Opaque inputs supplied by collaborators outside the core
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;

/// Provider-validated Kubernetes version identifier (e.g. "1.33")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTag(String);

impl VersionTag {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute shape identifier (e.g. "m5.large")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceType(String);

impl InstanceType {
    pub fn new(shape: impl Into<String>) -> Self {
        Self(shape.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Node image family understood by the provider
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmiType {
    AL2_x86_64,
    AL2_x86_64_GPU,
    AL2_ARM_64,
    AL2023_x86_64_STANDARD,
    AL2023_ARM_64_STANDARD,
    BOTTLEROCKET_x86_64,
    BOTTLEROCKET_ARM_64,
    BOTTLEROCKET_x86_64_NVIDIA,
    BOTTLEROCKET_ARM_64_NVIDIA,
    CUSTOM,
}

impl AmiType {
    pub const ALL: [AmiType; 10] = [
        AmiType::AL2_x86_64,
        AmiType::AL2_x86_64_GPU,
        AmiType::AL2_ARM_64,
        AmiType::AL2023_x86_64_STANDARD,
        AmiType::AL2023_ARM_64_STANDARD,
        AmiType::BOTTLEROCKET_x86_64,
        AmiType::BOTTLEROCKET_ARM_64,
        AmiType::BOTTLEROCKET_x86_64_NVIDIA,
        AmiType::BOTTLEROCKET_ARM_64_NVIDIA,
        AmiType::CUSTOM,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AmiType::AL2_x86_64 => "AL2_x86_64",
            AmiType::AL2_x86_64_GPU => "AL2_x86_64_GPU",
            AmiType::AL2_ARM_64 => "AL2_ARM_64",
            AmiType::AL2023_x86_64_STANDARD => "AL2023_x86_64_STANDARD",
            AmiType::AL2023_ARM_64_STANDARD => "AL2023_ARM_64_STANDARD",
            AmiType::BOTTLEROCKET_x86_64 => "BOTTLEROCKET_x86_64",
            AmiType::BOTTLEROCKET_ARM_64 => "BOTTLEROCKET_ARM_64",
            AmiType::BOTTLEROCKET_x86_64_NVIDIA => "BOTTLEROCKET_x86_64_NVIDIA",
            AmiType::BOTTLEROCKET_ARM_64_NVIDIA => "BOTTLEROCKET_ARM_64_NVIDIA",
            AmiType::CUSTOM => "CUSTOM",
        }
    }
}

impl fmt::Display for AmiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AmiType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AmiType::ALL
            .into_iter()
            .find(|ami| ami.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownAmiType(s.to_string()))
    }
}

/// Control-plane log stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoggingFacet {
    Api,
    Audit,
    Authenticator,
    ControllerManager,
    Scheduler,
}

impl LoggingFacet {
    pub const ALL: [LoggingFacet; 5] = [
        LoggingFacet::Api,
        LoggingFacet::Audit,
        LoggingFacet::Authenticator,
        LoggingFacet::ControllerManager,
        LoggingFacet::Scheduler,
    ];

    const fn bit(self) -> u8 {
        1 << self as u8
    }

    /// Name used by the provider's logging API
    pub fn as_str(&self) -> &'static str {
        match self {
            LoggingFacet::Api => "api",
            LoggingFacet::Audit => "audit",
            LoggingFacet::Authenticator => "authenticator",
            LoggingFacet::ControllerManager => "controllerManager",
            LoggingFacet::Scheduler => "scheduler",
        }
    }
}

/// Fixed set of logging facets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoggingFacets(u8);

impl LoggingFacets {
    pub const fn all() -> Self {
        Self(
            LoggingFacet::Api.bit()
                | LoggingFacet::Audit.bit()
                | LoggingFacet::Authenticator.bit()
                | LoggingFacet::ControllerManager.bit()
                | LoggingFacet::Scheduler.bit(),
        )
    }

    pub const fn contains(&self, facet: LoggingFacet) -> bool {
        self.0 & facet.bit() != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = LoggingFacet> + '_ {
        LoggingFacet::ALL
            .into_iter()
            .filter(move |facet| self.contains(*facet))
    }
}

impl Serialize for LoggingFacets {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter().map(|facet| facet.as_str()))
    }
}

/// Subnet classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubnetType {
    Public,
    Private,
    Isolated,
}

/// A subnet inside a network reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    #[serde(rename = "type")]
    pub subnet_type: SubnetType,
}

/// Opaque handle to a virtual network and its typed subnets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRef {
    pub id: String,
    pub subnets: Vec<Subnet>,
}

impl NetworkRef {
    /// Subnet ids tagged PUBLIC, in declaration order
    pub fn public_subnets(&self) -> Vec<String> {
        self.subnets
            .iter()
            .filter(|s| s.subnet_type == SubnetType::Public)
            .map(|s| s.id.clone())
            .collect()
    }
}

/// Reference to a helper artifact (e.g. a kubectl layer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Resolves the helper artifact the cluster's tooling needs for a given version.
///
/// The lookup is opaque to the core; closures work as lookups too.
pub trait ArtifactLookup {
    fn lookup(&self, scope: &str, version: &VersionTag) -> ArtifactRef;
}

impl<F> ArtifactLookup for F
where
    F: Fn(&str, &VersionTag) -> ArtifactRef,
{
    fn lookup(&self, scope: &str, version: &VersionTag) -> ArtifactRef {
        self(scope, version)
    }
}

/// Default lookup: one kubectl layer per Kubernetes minor version
#[derive(Debug, Clone, Default)]
pub struct KubectlLayerLookup;

impl ArtifactLookup for KubectlLayerLookup {
    fn lookup(&self, scope: &str, version: &VersionTag) -> ArtifactRef {
        ArtifactRef::new(format!(
            "{}-kubectl-v{}",
            scope,
            version.as_str().replace('.', "-")
        ))
    }
}
