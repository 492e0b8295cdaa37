//! The cluster backend capability consumed by the scheduler.
//!
//! Service records are owned by the backend. The scheduler only reads them
//! and asks for creates, updates and removes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClusterError;

/// Backend-assigned version token for optimistic concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(pub u64);

/// What the scheduler asks the backend to run for one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// `{app_id}_{process_type}`.
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub task: TaskSpec,
    pub replicas: u32,
}

/// The container each replica of a service runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub image: String,
    pub command: Vec<String>,
    /// `KEY=VALUE` entries.
    pub env: Vec<String>,
}

/// A service as the backend reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: String,
    pub version: Version,
    pub spec: ServiceSpec,
}

impl ServiceRecord {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.spec.labels.get(key).map(String::as_str)
    }
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCreated {
    pub id: String,
}

/// Narrows a service listing. Backends may apply it server-side or ignore
/// it; callers must not assume the result is filtered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFilter {
    pub labels: BTreeMap<String, String>,
}

impl ServiceFilter {
    pub fn label(key: &str, value: &str) -> Self {
        Self {
            labels: BTreeMap::from([(key.to_string(), value.to_string())]),
        }
    }

    pub fn matches(&self, record: &ServiceRecord) -> bool {
        self.labels
            .iter()
            .all(|(k, v)| record.label(k) == Some(v.as_str()))
    }
}

/// The operations the scheduler needs from a cluster backend.
///
/// Test doubles implement this same trait.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn list_services(&self, filter: &ServiceFilter) -> Result<Vec<ServiceRecord>, ClusterError>;

    async fn create_service(&self, spec: ServiceSpec) -> Result<ServiceCreated, ClusterError>;

    /// Replace a service's spec. Rejected with
    /// [`ClusterError::VersionConflict`] when `version` is stale.
    async fn update_service(
        &self,
        id: &str,
        version: Version,
        spec: ServiceSpec,
    ) -> Result<(), ClusterError>;

    async fn remove_service(&self, id: &str) -> Result<(), ClusterError>;
}
