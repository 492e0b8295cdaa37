//! In-process cluster backend.
//!
//! Behaves like a swarm-style service API: creates start at version 1,
//! every accepted update bumps the version, and updates presenting any
//! other version are rejected. Service names are unique. Each mutation is
//! appended to a journal that callers can inspect.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cluster::{
    ClusterClient, ServiceCreated, ServiceFilter, ServiceRecord, ServiceSpec, Version,
};
use crate::error::ClusterError;

/// A mutation accepted by a [`MemoryCluster`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterOp {
    Create { id: String, name: String },
    Update { id: String, version: Version },
    Remove { id: String },
}

#[derive(Default)]
struct Inner {
    services: BTreeMap<String, ServiceRecord>,
    next_id: u64,
    journal: Vec<ClusterOp>,
}

/// Cluster backend that keeps services in memory.
#[derive(Default)]
pub struct MemoryCluster {
    inner: RwLock<Inner>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record as-is, bypassing name checks and the journal.
    pub async fn insert(&self, record: ServiceRecord) {
        let mut inner = self.inner.write().await;
        inner.services.insert(record.id.clone(), record);
    }

    /// Snapshot of every service, ordered by ID.
    pub async fn services(&self) -> Vec<ServiceRecord> {
        self.inner.read().await.services.values().cloned().collect()
    }

    pub async fn service_by_name(&self, name: &str) -> Option<ServiceRecord> {
        let inner = self.inner.read().await;
        inner.services.values().find(|s| s.spec.name == name).cloned()
    }

    /// Mutations accepted so far, oldest first.
    pub async fn operations(&self) -> Vec<ClusterOp> {
        self.inner.read().await.journal.clone()
    }

    pub async fn clear_operations(&self) {
        self.inner.write().await.journal.clear();
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn list_services(&self, filter: &ServiceFilter) -> Result<Vec<ServiceRecord>, ClusterError> {
        let inner = self.inner.read().await;
        Ok(inner
            .services
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn create_service(&self, spec: ServiceSpec) -> Result<ServiceCreated, ClusterError> {
        let mut inner = self.inner.write().await;
        if inner.services.values().any(|s| s.spec.name == spec.name) {
            return Err(ClusterError::NameConflict(spec.name));
        }

        inner.next_id += 1;
        let id = format!("svc-{}", inner.next_id);
        debug!(%id, name = %spec.name, "service created");
        inner.journal.push(ClusterOp::Create {
            id: id.clone(),
            name: spec.name.clone(),
        });
        inner.services.insert(
            id.clone(),
            ServiceRecord {
                id: id.clone(),
                version: Version(1),
                spec,
            },
        );
        Ok(ServiceCreated { id })
    }

    async fn update_service(
        &self,
        id: &str,
        version: Version,
        spec: ServiceSpec,
    ) -> Result<(), ClusterError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .services
            .get_mut(id)
            .ok_or_else(|| ClusterError::NotFound(id.to_string()))?;

        if record.version != version {
            return Err(ClusterError::VersionConflict {
                id: id.to_string(),
                presented: version.0,
                current: record.version.0,
            });
        }

        record.spec = spec;
        record.version = Version(version.0 + 1);
        debug!(%id, version = record.version.0, "service updated");
        inner.journal.push(ClusterOp::Update {
            id: id.to_string(),
            version,
        });
        Ok(())
    }

    async fn remove_service(&self, id: &str) -> Result<(), ClusterError> {
        let mut inner = self.inner.write().await;
        if inner.services.remove(id).is_none() {
            return Err(ClusterError::NotFound(id.to_string()));
        }
        debug!(%id, "service removed");
        inner.journal.push(ClusterOp::Remove { id: id.to_string() });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::TaskSpec;

    fn spec(name: &str) -> ServiceSpec {
        ServiceSpec {
            name: name.to_string(),
            labels: BTreeMap::new(),
            task: TaskSpec {
                image: "acme/web:latest".to_string(),
                command: vec![],
                env: vec![],
            },
            replicas: 1,
        }
    }

    #[tokio::test]
    async fn create_assigns_id_and_first_version() {
        let cluster = MemoryCluster::new();
        let created = cluster.create_service(spec("app_web")).await.unwrap();

        let services = cluster.services().await;
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].id, created.id);
        assert_eq!(services[0].version, Version(1));
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let cluster = MemoryCluster::new();
        cluster.create_service(spec("app_web")).await.unwrap();
        let err = cluster.create_service(spec("app_web")).await.unwrap_err();
        assert_eq!(err, ClusterError::NameConflict("app_web".to_string()));
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let cluster = MemoryCluster::new();
        let id = cluster.create_service(spec("app_web")).await.unwrap().id;

        cluster
            .update_service(&id, Version(1), spec("app_web"))
            .await
            .unwrap();
        let err = cluster
            .update_service(&id, Version(1), spec("app_web"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ClusterError::VersionConflict {
                id: id.clone(),
                presented: 1,
                current: 2,
            }
        );
        assert_eq!(cluster.operations().await.len(), 2);
    }

    #[tokio::test]
    async fn remove_unknown_service_fails() {
        let cluster = MemoryCluster::new();
        let err = cluster.remove_service("svc-404").await.unwrap_err();
        assert_eq!(err, ClusterError::NotFound("svc-404".to_string()));
        assert!(cluster.operations().await.is_empty());
    }

    #[tokio::test]
    async fn list_honours_label_filter() {
        let cluster = MemoryCluster::new();
        let mut labeled = spec("a_web");
        labeled.labels.insert("keel.app.id".to_string(), "a".to_string());
        cluster.create_service(labeled).await.unwrap();
        cluster.create_service(spec("b_web")).await.unwrap();

        let all = cluster.list_services(&ServiceFilter::default()).await.unwrap();
        let only_a = cluster
            .list_services(&ServiceFilter::label("keel.app.id", "a"))
            .await
            .unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].spec.name, "a_web");
    }
}
