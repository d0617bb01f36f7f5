/// Control-plane gateway client
use anyhow::Context;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::models::*;
use super::Provider;
use crate::config::ProviderConfig;
use crate::declare::{ResourceKind, ResourceOutputs};
use crate::error::ProviderError;
use crate::utils::polling::PollingConfig;

fn transport(e: reqwest::Error) -> ProviderError {
    ProviderError::Transport(e.to_string())
}

/// Provider backed by a JSON control-plane gateway
#[derive(Clone)]
pub struct HttpProvider {
    client: Client,
    base: Url,
    operation_timeout: Duration,
    poll_interval: Duration,
}

impl HttpProvider {
    /// Create a new gateway client from explicit provider settings
    pub fn new(config: &ProviderConfig, api_token: String) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", api_token))
                .context("Invalid API token format")?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "x-keel-region",
            header::HeaderValue::from_str(&config.region).context("Invalid region")?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Self::with_client(config, client)
    }

    fn with_client(config: &ProviderConfig, client: Client) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            base: config.endpoint_url()?,
            operation_timeout: Duration::from_secs(config.operation_timeout_secs),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        })
    }

    /// URL under the gateway base; each segment is percent-encoded on its own
    fn url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Transport(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn resource_url(&self, kind: ResourceKind, name: &str) -> Result<Url, ProviderError> {
        self.url(&["resources", kind.as_str(), name])
    }

    fn operation_url(&self, id: &str) -> Result<Url, ProviderError> {
        self.url(&["operations", id])
    }

    /// Make a GET request; a 404 means the object does not exist
    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, ProviderError> {
        debug!("GET {}", url);

        let response = self.client.get(url).send().await.map_err(transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.handle_response(response).await.map(Some)
    }

    async fn put<R: DeserializeOwned>(
        &self,
        url: Url,
        body: &impl serde::Serialize,
    ) -> Result<R, ProviderError> {
        debug!("PUT {}", url);

        let response = self
            .client
            .put(url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        self.handle_response(response).await
    }

    async fn delete_request<R: DeserializeOwned>(&self, url: Url) -> Result<R, ProviderError> {
        debug!("DELETE {}", url);

        let response = self.client.delete(url).send().await.map_err(transport)?;
        self.handle_response(response).await
    }

    /// Handle API response, checking for errors
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();

        if status.is_success() {
            response.json::<T>().await.map_err(|e| {
                ProviderError::Transport(format!("failed to parse API response: {}", e))
            })
        } else {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                return Err(ProviderError::Api {
                    code: error_response.error.code,
                    message: error_response.error.message,
                });
            }

            Err(ProviderError::Status {
                status: status.as_u16(),
                body: error_text,
            })
        }
    }

    /// Wait for an operation to finish
    pub async fn wait_for_operation(
        &self,
        operation: Operation,
    ) -> Result<Operation, ProviderError> {
        if operation.status == OperationStatus::Succeeded {
            return Ok(operation);
        }

        let id = operation.id.clone();
        let polling = PollingConfig::new(
            self.operation_timeout,
            self.poll_interval,
            format!("operation {}", id),
        );
        let url = self.operation_url(&id)?;
        let (id, url) = (id.as_str(), &url);

        polling
            .poll(move || async move {
                let response: OperationResponse = self
                    .get(url.clone())
                    .await?
                    .ok_or_else(|| ProviderError::OperationFailed {
                        id: id.to_string(),
                        message: "operation disappeared".to_string(),
                    })?;
                let operation = response.operation;

                match operation.status {
                    OperationStatus::Succeeded => Ok(Some(operation)),
                    OperationStatus::Failed => {
                        let message = operation
                            .error
                            .map(|e| format!("{}: {}", e.code, e.message))
                            .unwrap_or_else(|| "Unknown error".to_string());
                        Err(ProviderError::OperationFailed {
                            id: id.to_string(),
                            message,
                        })
                    }
                    OperationStatus::Pending | OperationStatus::Running => {
                        debug!("Operation {} progress: {}%", id, operation.progress);
                        Ok(None)
                    }
                }
            })
            .await
    }
}

impl Provider for HttpProvider {
    async fn describe(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<LiveResource>, ProviderError> {
        let response: Option<ResourceResponse> = self.get(self.resource_url(kind, name)?).await?;
        Ok(response.map(|r| r.resource))
    }

    async fn apply(
        &self,
        kind: ResourceKind,
        name: &str,
        spec: &serde_json::Value,
    ) -> Result<ResourceOutputs, ProviderError> {
        let response: OperationResponse = self
            .put(self.resource_url(kind, name)?, &ApplyResourceRequest { spec })
            .await?;
        let operation = self.wait_for_operation(response.operation).await?;
        Ok(operation.outputs)
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<(), ProviderError> {
        let response: OperationResponse =
            self.delete_request(self.resource_url(kind, name)?).await?;
        let operation = self.wait_for_operation(response.operation).await?;
        if !operation.outputs.is_empty() {
            warn!("Delete of {} {} reported outputs, ignoring", kind, name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;
    use tokio_test::{assert_err, assert_ok};

    fn config(endpoint: &str) -> ProviderConfig {
        ProviderConfig {
            endpoint: endpoint.to_string(),
            region: "us-west-2".to_string(),
            token: None,
            catalog: None,
            operation_timeout_secs: 60,
            poll_interval_secs: 1,
        }
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&data);
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    /// Local gateway answering one connection per canned response, in order.
    /// Resolves to the request lines it received.
    async fn gateway(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/api", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut request_lines = Vec::new();
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                request_lines.push(request.lines().next().unwrap_or_default().to_string());

                let response = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            request_lines
        });

        (endpoint, handle)
    }

    fn local_provider(config: &ProviderConfig) -> HttpProvider {
        let client = Client::builder().no_proxy().build().unwrap();
        HttpProvider::with_client(config, client).unwrap()
    }

    #[test]
    fn test_client_creation() {
        let result = HttpProvider::new(
            &config("https://gateway.example.com/api"),
            "test-token".to_string(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_token_rejected() {
        let result = HttpProvider::new(
            &config("https://gateway.example.com"),
            "bad\ntoken".to_string(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resource_urls_keep_base_path() {
        for endpoint in ["https://gateway.example.com/api", "https://gateway.example.com/api/"] {
            let provider = HttpProvider::new(&config(endpoint), "t".to_string()).unwrap();
            let url = provider
                .resource_url(ResourceKind::NodeGroup, "demo-managed-ng")
                .unwrap();
            assert_eq!(
                url.as_str(),
                "https://gateway.example.com/api/resources/node-group/demo-managed-ng"
            );
        }

        let provider =
            HttpProvider::new(&config("https://gateway.example.com"), "t".to_string()).unwrap();
        assert_eq!(
            provider.operation_url("op-1").unwrap().as_str(),
            "https://gateway.example.com/operations/op-1"
        );
    }

    #[test]
    fn test_names_stay_inside_their_path_segment() {
        let provider =
            HttpProvider::new(&config("https://gateway.example.com/api"), "t".to_string()).unwrap();

        let url = provider
            .resource_url(ResourceKind::Cluster, "demo#x")
            .unwrap();
        assert_eq!(url.path(), "/api/resources/cluster/demo%23x");
        assert_eq!(url.fragment(), None);

        let url = provider
            .resource_url(ResourceKind::Cluster, "../operations/op-1")
            .unwrap();
        let segments: Vec<&str> = url.path_segments().unwrap().collect();
        assert_eq!(
            segments,
            vec!["api", "resources", "cluster", "..%2Foperations%2Fop-1"]
        );

        let url = provider
            .resource_url(ResourceKind::Cluster, "demo?force=true")
            .unwrap();
        assert_eq!(url.query(), None);
        assert_eq!(url.path_segments().unwrap().count(), 4);
    }

    #[tokio::test]
    async fn test_completed_operation_is_not_polled() {
        let provider =
            HttpProvider::new(&config("https://gateway.invalid"), "t".to_string()).unwrap();
        let operation = Operation {
            id: "op-1".to_string(),
            status: OperationStatus::Succeeded,
            progress: 100,
            error: None,
            outputs: ResourceOutputs::new(),
        };
        let done = provider.wait_for_operation(operation).await.unwrap();
        assert_eq!(done.id, "op-1");
    }

    #[tokio::test]
    async fn test_missing_resource_is_none() {
        let (endpoint, requests) = gateway(vec![(404, "")]).await;
        let provider = local_provider(&config(&endpoint));

        let live = assert_ok!(provider.describe(ResourceKind::Cluster, "demo#x").await);
        assert!(live.is_none());
        assert_eq!(
            requests.await.unwrap(),
            vec!["GET /api/resources/cluster/demo%23x HTTP/1.1"]
        );
    }

    #[tokio::test]
    async fn test_error_body_maps_to_api_error() {
        let (endpoint, requests) = gateway(vec![(
            422,
            r#"{"error":{"code":"invalid_spec","message":"hop limit must be 2"}}"#,
        )])
        .await;
        let provider = local_provider(&config(&endpoint));

        let err = assert_err!(
            provider
                .apply(
                    ResourceKind::LaunchTemplate,
                    "demo-launch-template",
                    &serde_json::json!({"name": "demo-launch-template"}),
                )
                .await
        );
        assert_eq!(
            err,
            ProviderError::Api {
                code: "invalid_spec".to_string(),
                message: "hop limit must be 2".to_string(),
            }
        );
        assert_eq!(
            requests.await.unwrap(),
            vec!["PUT /api/resources/launch-template/demo-launch-template HTTP/1.1"]
        );
    }

    #[tokio::test]
    async fn test_unstructured_error_falls_back_to_status() {
        let (endpoint, _requests) = gateway(vec![(500, "upstream exploded")]).await;
        let provider = local_provider(&config(&endpoint));

        let err = assert_err!(provider.describe(ResourceKind::Cluster, "demo").await);
        assert_eq!(
            err,
            ProviderError::Status {
                status: 500,
                body: "upstream exploded".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_apply_waits_for_operation_outputs() {
        let (endpoint, requests) = gateway(vec![
            (
                202,
                r#"{"operation":{"id":"op-5","status":"running","progress":10,"error":null}}"#,
            ),
            (
                200,
                r#"{"operation":{"id":"op-5","status":"succeeded","progress":100,"error":null,"outputs":{"name":"demo","endpoint":"https://demo.example"}}}"#,
            ),
        ])
        .await;
        let provider = local_provider(&config(&endpoint));

        let outputs = assert_ok!(
            provider
                .apply(
                    ResourceKind::Cluster,
                    "demo",
                    &serde_json::json!({"name": "demo"}),
                )
                .await
        );
        assert_eq!(outputs["endpoint"], "https://demo.example");
        assert_eq!(
            requests.await.unwrap(),
            vec![
                "PUT /api/resources/cluster/demo HTTP/1.1",
                "GET /api/operations/op-5 HTTP/1.1",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_operation_is_reported() {
        let (endpoint, _requests) = gateway(vec![
            (
                202,
                r#"{"operation":{"id":"op-7","status":"pending","progress":0,"error":null}}"#,
            ),
            (
                200,
                r#"{"operation":{"id":"op-7","status":"failed","progress":40,"error":{"code":"capacity","message":"no m5.large capacity"}}}"#,
            ),
        ])
        .await;
        let provider = local_provider(&config(&endpoint));

        let err = assert_err!(
            provider
                .apply(
                    ResourceKind::NodeGroup,
                    "demo-managed-ng",
                    &serde_json::json!({"clusterName": "demo"}),
                )
                .await
        );
        assert_eq!(
            err,
            ProviderError::OperationFailed {
                id: "op-7".to_string(),
                message: "capacity: no m5.large capacity".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_operation_timeout() {
        let (endpoint, _requests) = gateway(vec![
            (
                202,
                r#"{"operation":{"id":"op-8","status":"running","progress":5,"error":null}}"#,
            ),
            (
                200,
                r#"{"operation":{"id":"op-8","status":"running","progress":6,"error":null}}"#,
            ),
        ])
        .await;
        let mut config = config(&endpoint);
        config.operation_timeout_secs = 0;
        let provider = local_provider(&config);

        let err = assert_err!(provider.delete(ResourceKind::Cluster, "demo").await);
        assert_eq!(
            err,
            ProviderError::Timeout {
                operation: "operation op-8".to_string(),
                seconds: 0,
            }
        );
    }
}
