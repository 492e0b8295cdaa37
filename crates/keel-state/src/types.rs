//! Records persisted by the Keel state store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use keel_core::Image;

/// Process type -> command, as declared by an image.
pub type ProcessTypes = BTreeMap<String, Vec<String>>;

/// Process type -> instance count.
pub type Formation = BTreeMap<String, u32>;

// ── App ───────────────────────────────────────────────────────────

/// An application, identified by the image repository it deploys from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppRecord {
    pub id: String,
    pub name: String,
    /// Registry-qualified repository, see [`Image::repo`].
    pub repo: String,
    pub created_at: u64,
}

/// Derive an app name from a repository: its last path component.
pub fn app_name_from_repo(repo: &str) -> String {
    repo.rsplit('/').next().unwrap_or(repo).to_string()
}

// ── Config ────────────────────────────────────────────────────────

/// One version of an app's environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub id: String,
    pub app_id: String,
    pub version: u32,
    pub vars: BTreeMap<String, String>,
    pub created_at: u64,
}

// ── Slug ──────────────────────────────────────────────────────────

/// A pulled image paired with the process types it declares.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slug {
    pub id: String,
    pub image: Image,
    pub process_types: ProcessTypes,
    pub created_at: u64,
}

// ── Release ───────────────────────────────────────────────────────

/// An immutable pairing of a config and a slug, numbered per app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub id: String,
    pub app_id: String,
    pub version: u32,
    pub config_id: String,
    pub slug_id: String,
    pub formation: Formation,
    pub description: String,
    pub created_at: u64,
}

/// Instance counts for a new release.
///
/// Process types that survive from the previous release keep their count;
/// new ones start with one `web` instance and zero of anything else.
pub fn next_formation(previous: Option<&Formation>, process_types: &ProcessTypes) -> Formation {
    process_types
        .keys()
        .map(|process_type| {
            let count = previous
                .and_then(|f| f.get(process_type).copied())
                .unwrap_or(if process_type == "web" { 1 } else { 0 });
            (process_type.clone(), count)
        })
        .collect()
}

// ── Deploy ────────────────────────────────────────────────────────

/// The outcome of a successful deploy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deploy {
    pub id: String,
    pub release: Release,
    pub created_at: u64,
}
