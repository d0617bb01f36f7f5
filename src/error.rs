/// Error taxonomy for declaration building and realization
use thiserror::Error;

use crate::utils::polling::PollTimeout;

/// Invalid or missing input detected while composing declarations.
///
/// Always raised before any provider call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("network reference {network} exposes no PUBLIC subnet")]
    NoPublicSubnet { network: String },

    #[error("kubernetes version {0} is not recognized by the provider")]
    UnknownVersion(String),

    #[error("AMI type {0} is not recognized by the provider")]
    UnknownAmiType(String),

    #[error("instance type {0} is not recognized by the provider")]
    UnknownInstanceType(String),

    #[error("node group requires at least one instance type")]
    EmptyInstanceTypes,

    #[error("node group min_size must be at least {minimum}, got {actual}")]
    MinSizeTooSmall { minimum: u32, actual: u32 },

    #[error("node group sizes must satisfy min <= desired <= max (min {min}, desired {desired}, max {max})")]
    InvalidScaling { min: u32, desired: u32, max: u32 },

    #[error("declaration references unknown resource {0}")]
    DanglingReference(String),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigurationError {
    /// Create an invalid-value error for a named field
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Policy attachment failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("no execution identity supplied for policy {policy}")]
    MissingIdentity { policy: String },

    #[error("resource {0} does not own an execution identity")]
    NotAnIdentity(String),

    #[error("execution identity of {node_group} does not exist yet; it must be applied before binding {policy}")]
    IdentityNotRealized { node_group: String, policy: String },

    #[error("managed policy {0} is not recognized by the provider")]
    UnknownPolicy(String),
}

/// Failures surfaced by the provider. Never retried here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider API error: {code} - {message}")]
    Api { code: String, message: String },

    #[error("provider request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("operation {id} failed: {message}")]
    OperationFailed { id: String, message: String },

    #[error("timed out after {seconds} seconds waiting for {operation}")]
    Timeout { operation: String, seconds: u64 },

    #[error("{resource} did not report its {attribute} output")]
    MissingOutput { resource: String, attribute: String },
}

impl From<PollTimeout> for ProviderError {
    fn from(timeout: PollTimeout) -> Self {
        ProviderError::Timeout {
            operation: timeout.description,
            seconds: timeout.seconds,
        }
    }
}

/// Top-level error for the keel core
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("binding error: {0}")]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
