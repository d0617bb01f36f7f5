/// Hardened launch template for node instances
use serde::Serialize;
use tracing::debug;

use super::graph::{DeclarationGraph, LaunchTemplateHandle, Request};
use crate::error::ConfigurationError;

/// Metadata-service token mode. Only session tokens are ever allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpTokens {
    Required,
}

/// Instance metadata-service settings applied at boot.
///
/// Only the hardened form can be constructed: IMDSv2 with a hop limit of 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    require_imdsv2: bool,
    http_endpoint: bool,
    http_put_response_hop_limit: u8,
    http_tokens: HttpTokens,
}

impl LaunchConfig {
    pub const HOP_LIMIT: u8 = 2;

    pub const fn hardened() -> Self {
        Self {
            require_imdsv2: true,
            http_endpoint: true,
            http_put_response_hop_limit: Self::HOP_LIMIT,
            http_tokens: HttpTokens::Required,
        }
    }

    pub fn require_imdsv2(&self) -> bool {
        self.require_imdsv2
    }

    pub fn http_endpoint(&self) -> bool {
        self.http_endpoint
    }

    pub fn hop_limit(&self) -> u8 {
        self.http_put_response_hop_limit
    }

    pub fn http_tokens(&self) -> HttpTokens {
        self.http_tokens
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self::hardened()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchTemplateRequest {
    pub name: String,
    pub metadata_options: LaunchConfig,
}

/// Name of the launch template declared for a cluster
pub fn launch_template_name(cluster_name: &str) -> String {
    format!("{}-launch-template", cluster_name)
}

/// Declare the launch template for a cluster's node group.
///
/// Building the config cannot fail. Registration only fails if the template
/// was already declared in this graph.
pub fn declare_launch_template(
    graph: &mut DeclarationGraph,
    cluster_name: &str,
) -> Result<LaunchTemplateHandle, ConfigurationError> {
    let name = launch_template_name(cluster_name);
    let metadata_options = LaunchConfig::hardened();
    debug!(
        "Declaring launch template {} (imdsv2: {}, endpoint: {}, hop limit: {}, tokens: {:?})",
        name,
        metadata_options.require_imdsv2(),
        metadata_options.http_endpoint(),
        metadata_options.hop_limit(),
        metadata_options.http_tokens()
    );

    let request = LaunchTemplateRequest {
        name: name.clone(),
        metadata_options,
    };
    graph.insert(name, Request::LaunchTemplate(request), &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardened_defaults() {
        let config = LaunchConfig::hardened();
        assert!(config.require_imdsv2());
        assert!(config.http_endpoint());
        assert_eq!(config.hop_limit(), 2);
        assert_eq!(config.http_tokens(), HttpTokens::Required);
        assert_eq!(LaunchConfig::default(), config);
    }

    #[test]
    fn test_building_twice_is_identical() {
        let first = serde_json::to_vec(&LaunchConfig::hardened()).unwrap();
        let second = serde_json::to_vec(&LaunchConfig::hardened()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(
            serde_json::to_value(LaunchConfig::hardened()).unwrap(),
            serde_json::json!({
                "requireImdsv2": true,
                "httpEndpoint": true,
                "httpPutResponseHopLimit": 2,
                "httpTokens": "required"
            })
        );
    }

    #[test]
    fn test_declare_launch_template() {
        let mut graph = DeclarationGraph::new();
        let handle = declare_launch_template(&mut graph, "demo").unwrap();
        assert_eq!(handle.name(), "demo-launch-template");
        assert!(graph.get(handle.id()).unwrap().depends_on.is_empty());

        assert!(declare_launch_template(&mut graph, "demo").is_err());
    }
}
