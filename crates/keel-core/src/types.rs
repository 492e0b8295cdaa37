//! Desired-state types handed to the scheduler.
//!
//! An [`App`] is supplied fresh on every scheduler call and is never cached.
//! Identity between an app's processes and the services running them is
//! carried by the two label keys below and nothing else.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image::Image;

/// Label holding the owning app's ID on every cluster service.
pub const LABEL_APP_ID: &str = "keel.app.id";

/// Label holding the process type on every cluster service.
pub const LABEL_PROCESS: &str = "keel.app.process";

/// One class of running task within an app (e.g. `web`, `worker`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    #[serde(rename = "type")]
    pub process_type: String,
    pub command: Vec<String>,
    pub instances: u32,
    pub image: Image,
    /// Environment overrides applied on top of the app's env.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Label overrides applied on top of the app's labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Process {
    pub fn new(process_type: &str, command: Vec<String>, instances: u32, image: Image) -> Self {
        Self {
            process_type: process_type.to_string(),
            command,
            instances,
            image,
            env: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }
}

/// Desired state of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub processes: Vec<Process>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("app id must not be empty")]
    EmptyId,
    #[error("process type must not be empty")]
    EmptyProcessType,
    #[error("duplicate process type: {0}")]
    DuplicateProcess(String),
}

impl App {
    /// Check the invariants the scheduler relies on: a non-empty ID and
    /// process types that are non-empty and unique.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.id.is_empty() {
            return Err(AppError::EmptyId);
        }
        let mut seen = std::collections::HashSet::new();
        for p in &self.processes {
            if p.process_type.is_empty() {
                return Err(AppError::EmptyProcessType);
            }
            if !seen.insert(p.process_type.as_str()) {
                return Err(AppError::DuplicateProcess(p.process_type.clone()));
            }
        }
        Ok(())
    }

    pub fn process(&self, process_type: &str) -> Option<&Process> {
        self.processes.iter().find(|p| p.process_type == process_type)
    }
}

/// The environment a process runs with: app env overlaid by process env.
pub fn merged_env(app: &App, process: &Process) -> BTreeMap<String, String> {
    let mut env = app.env.clone();
    env.extend(process.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// The labels attached to a process's service.
///
/// App labels are overlaid by process labels; the identity labels are set
/// last so neither can shadow them.
pub fn merged_labels(app: &App, process: &Process) -> BTreeMap<String, String> {
    let mut labels = app.labels.clone();
    labels.extend(process.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    labels.insert(LABEL_APP_ID.to_string(), app.id.clone());
    labels.insert(LABEL_PROCESS.to_string(), process.process_type.clone());
    labels
}

/// Wait before the first pull attempt when none is configured.
pub const DEFAULT_INITIAL_WAIT: Duration = Duration::from_secs(1);

/// Retry settings for image pulls.
///
/// `max_attempts == 0` means unlimited attempts and a zero `deadline` means
/// no deadline. With both at zero a pull that keeps failing retries forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub deadline: Duration,
    pub initial_wait: Duration,
}

impl RetryPolicy {
    /// The first wait, substituting the default for a zero value.
    pub fn first_wait(&self) -> Duration {
        if self.initial_wait.is_zero() {
            DEFAULT_INITIAL_WAIT
        } else {
            self.initial_wait
        }
    }

    pub fn has_deadline(&self) -> bool {
        !self.deadline.is_zero()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            deadline: Duration::ZERO,
            initial_wait: DEFAULT_INITIAL_WAIT,
        }
    }
}
