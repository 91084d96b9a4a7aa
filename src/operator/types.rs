//! Operator Types
//!
//! Error types, result alias and shared constants for the controllers

use super::object::Kind;
use super::store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Operator errors
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_yaml_ng::Error),

    #[error("object type {actual} is not {expected}")]
    TypeMismatch { expected: Kind, actual: Kind },

    #[error("invalid label selector on {owner}: {reason}")]
    InvalidSelector { owner: String, reason: String },

    #[error("Invalid resource spec: {0}")]
    InvalidSpec(String),
}

/// Result type for operator operations
pub type Result<T, E = OperatorError> = std::result::Result<T, E>;

/// Delay used when a write lost an optimistic-concurrency race.
pub const CONFLICT_REQUEUE: Duration = Duration::from_secs(2);

/// Label key/values shared by every child object.
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

pub const MANAGED_BY_VALUE: &str = "observability-operator";

/// Annotations linking a cross-namespace GrafanaDataSource back to its stack.
pub const DATASOURCE_OWNER_NAME: &str = "monitoring.rhobs/stack-name";
pub const DATASOURCE_OWNER_NAMESPACE: &str = "monitoring.rhobs/stack-namespace";

/// Field manager used for server-side apply of querier components.
pub const THANOS_QUERIER_FIELD_MANAGER: &str = "thanos-querier-controller";
