//! Translation of an app process into a cluster service spec.

use keel_core::{App, Process, merged_env, merged_labels};

use crate::cluster::{ServiceSpec, TaskSpec};

/// Cluster resource name for a process: `{app_id}_{process_type}`.
pub fn service_name(app_id: &str, process_type: &str) -> String {
    format!("{app_id}_{process_type}")
}

/// Build the service spec for one of an app's processes.
pub fn service_spec(app: &App, process: &Process) -> ServiceSpec {
    let env = merged_env(app, process)
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    ServiceSpec {
        name: service_name(&app.id, &process.process_type),
        labels: merged_labels(app, process),
        task: TaskSpec {
            image: process.image.to_string(),
            command: process.command.clone(),
            env,
        },
        replicas: process.instances,
    }
}
