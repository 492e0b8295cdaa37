//! keel-scheduler — drives cluster services toward an app's desired processes.
//!
//! The scheduler reads the services a cluster backend reports, keeps the
//! ones labeled with the app's ID, and converges them on the desired
//! process set:
//!
//! - Creates a service for every process type with no service yet
//! - Updates existing services, presenting the backend's version token
//! - Removes services whose process type is no longer desired
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── ClusterClient (list / create / update / remove services)
//!   │   └── MemoryCluster (in-process backend, version-checked)
//!   └── spec::service_spec (App + Process → ServiceSpec)
//! ```
//!
//! Nothing is cached between calls. Which service belongs to which
//! app/process is recomputed from the `keel.app.id` and `keel.app.process`
//! labels every time, so a submit can be re-run after any partial failure.

pub mod cluster;
pub mod error;
pub mod memory;
pub mod scheduler;
pub mod spec;

pub use cluster::{
    ClusterClient, ServiceCreated, ServiceFilter, ServiceRecord, ServiceSpec, TaskSpec, Version,
};
pub use error::{ClusterError, Operation, SchedulerError, SchedulerResult};
pub use memory::{ClusterOp, MemoryCluster};
pub use scheduler::{Instance, Scheduler};
pub use spec::{service_name, service_spec};
