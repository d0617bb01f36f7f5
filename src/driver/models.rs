/// Control-plane gateway data models
use serde::{Deserialize, Serialize};

use crate::declare::ResourceOutputs;

/// A resource as it currently exists on the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveResource {
    pub name: String,
    /// Last applied request, with all output references resolved
    pub spec: serde_json::Value,
    #[serde(default)]
    pub outputs: ResourceOutputs,
}

/// Status of an asynchronous provider operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Asynchronous operation started by a create, update or delete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub status: OperationStatus,
    #[serde(default)]
    pub progress: u32,
    pub error: Option<ApiError>,
    /// Outputs of the resource once the operation succeeded
    #[serde(default)]
    pub outputs: ResourceOutputs,
}

/// Body of a create-or-update call
#[derive(Debug, Serialize)]
pub struct ApplyResourceRequest<'a> {
    pub spec: &'a serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResourceResponse {
    pub resource: LiveResource,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OperationResponse {
    pub operation: Operation,
}

/// Error response from API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ApiError,
}

/// API error details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_parsing() {
        let json = r#"{
            "operation": {
                "id": "op-42",
                "status": "succeeded",
                "progress": 100,
                "error": null,
                "outputs": {"id": "lt-0123", "latestVersion": 1}
            }
        }"#;
        let response: OperationResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.operation.status, OperationStatus::Succeeded);
        assert_eq!(response.operation.outputs["latestVersion"], 1);
    }

    #[test]
    fn test_error_parsing() {
        let json = r#"{"error": {"code": "quota_exceeded", "message": "too many clusters"}}"#;
        let response: ErrorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.error.code, "quota_exceeded");
        assert!(response.error.details.is_none());
    }
}
