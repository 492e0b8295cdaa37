//! Scheduler — reconciles an app's desired processes with cluster services.
//!
//! Every call re-reads the backend. Services are matched to processes by
//! their identity labels only; there is no side table that could drift
//! from what the backend reports.
//!
//! # Caller obligations
//!
//! A submit lists services and then acts on that listing, so two
//! concurrent `submit`/`remove` calls for the same app can lose updates.
//! Callers must run at most one of them per app ID at a time (the deploy
//! pipeline holds a per-app lock for this). Calls for different apps may
//! run concurrently.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use keel_core::{App, LABEL_APP_ID, LABEL_PROCESS, Process};

use crate::cluster::{ClusterClient, ServiceFilter, ServiceRecord, ServiceSpec};
use crate::error::{Operation, SchedulerError, SchedulerResult};
use crate::spec::service_spec;

/// A running task of a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub process_type: String,
    pub state: String,
}

/// Drives a cluster backend toward an app's desired process set.
pub struct Scheduler {
    cluster: Arc<dyn ClusterClient>,
}

impl Scheduler {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self { cluster }
    }

    /// Converge the cluster on exactly `app.processes`.
    ///
    /// Existing services are updated with the version token they were
    /// listed with, missing ones are created, and services whose process
    /// type is absent from `app` are removed. When several services carry
    /// the same process label, one is kept and the rest are removed. The
    /// first failing operation aborts the submit; operations already
    /// applied stay applied, and a later submit with the same app only
    /// performs what is left.
    pub async fn submit(&self, app: &App) -> SchedulerResult<()> {
        app.validate()?;
        let mut existing = self.services(&app.id).await?;

        let (mut created, mut updated, mut removed) = (0u32, 0u32, 0u32);
        for process in &app.processes {
            let spec = service_spec(app, process);
            let mut records = existing.remove(&process.process_type).unwrap_or_default();

            // Prefer a record that is already up to date.
            let keep = records.iter().position(|r| r.spec == spec).unwrap_or(0);
            let current = (!records.is_empty()).then(|| records.remove(keep));

            for extra in &records {
                self.remove_service(extra, &process.process_type).await?;
                removed += 1;
            }

            match current {
                Some(service) if service.spec == spec => {
                    debug!(app = %app.id, process = %process.process_type, "service up to date");
                }
                Some(service) => {
                    self.update_service(&service, spec, process).await?;
                    updated += 1;
                }
                None => {
                    self.create_service(spec, process).await?;
                    created += 1;
                }
            }
        }

        // Whatever is left has no desired process any more.
        for (process_type, records) in existing {
            for service in &records {
                self.remove_service(service, &process_type).await?;
                removed += 1;
            }
        }

        info!(app = %app.id, created, updated, removed, "app submitted");
        Ok(())
    }

    /// Remove every service belonging to `app_id`.
    pub async fn remove(&self, app_id: &str) -> SchedulerResult<()> {
        let services = self.services(app_id).await?;
        let mut count = 0usize;
        for (process_type, records) in services {
            for service in &records {
                self.remove_service(service, &process_type).await?;
                count += 1;
            }
        }
        info!(app = %app_id, removed = count, "app removed");
        Ok(())
    }

    /// Services currently labeled with `app_id`, grouped by process type.
    ///
    /// A group normally holds one record; more than one means duplicates
    /// that the next submit or remove will clean up.
    pub async fn services(
        &self,
        app_id: &str,
    ) -> SchedulerResult<BTreeMap<String, Vec<ServiceRecord>>> {
        let records = self
            .cluster
            .list_services(&ServiceFilter::label(LABEL_APP_ID, app_id))
            .await
            .map_err(SchedulerError::List)?;

        Ok(app_services(app_id, records))
    }

    pub async fn instances(&self, _app_id: &str) -> SchedulerResult<Vec<Instance>> {
        Err(SchedulerError::Unsupported("listing instances"))
    }

    pub async fn stop(&self, _instance_id: &str) -> SchedulerResult<()> {
        Err(SchedulerError::Unsupported("stopping instances"))
    }

    pub async fn run(
        &self,
        _app: &App,
        _process: &Process,
        _stdin: &mut (dyn Read + Send),
        _stdout: &mut (dyn Write + Send),
    ) -> SchedulerResult<()> {
        Err(SchedulerError::Unsupported("attached runs"))
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn create_service(&self, spec: ServiceSpec, process: &Process) -> SchedulerResult<()> {
        let name = spec.name.clone();
        let created = self
            .cluster
            .create_service(spec)
            .await
            .map_err(|source| SchedulerError::Service {
                operation: Operation::Create,
                process_type: process.process_type.clone(),
                source,
            })?;
        debug!(service = %name, id = %created.id, "service created");
        Ok(())
    }

    async fn update_service(
        &self,
        service: &ServiceRecord,
        spec: ServiceSpec,
        process: &Process,
    ) -> SchedulerResult<()> {
        self.cluster
            .update_service(&service.id, service.version, spec)
            .await
            .map_err(|source| SchedulerError::Service {
                operation: Operation::Update,
                process_type: process.process_type.clone(),
                source,
            })?;
        debug!(id = %service.id, version = service.version.0, "service updated");
        Ok(())
    }

    async fn remove_service(&self, service: &ServiceRecord, process_type: &str) -> SchedulerResult<()> {
        self.cluster
            .remove_service(&service.id)
            .await
            .map_err(|source| SchedulerError::Service {
                operation: Operation::Remove,
                process_type: process_type.to_string(),
                source,
            })?;
        debug!(id = %service.id, process = %process_type, "service removed");
        Ok(())
    }
}

/// Keep the records whose app label is `app_id`, grouped by process label.
///
/// The backend filter is not trusted: names and other labels play no part
/// in deciding ownership.
fn app_services(app_id: &str, records: Vec<ServiceRecord>) -> BTreeMap<String, Vec<ServiceRecord>> {
    let mut grouped: BTreeMap<String, Vec<ServiceRecord>> = BTreeMap::new();
    for record in records {
        if record.label(LABEL_APP_ID) != Some(app_id) {
            continue;
        }
        let process_type = record.label(LABEL_PROCESS).unwrap_or_default().to_string();
        grouped.entry(process_type).or_default().push(record);
    }
    for (process_type, records) in &grouped {
        if records.len() > 1 {
            warn!(app = %app_id, process = %process_type, count = records.len(), "multiple services for one process");
        }
    }
    grouped
}
