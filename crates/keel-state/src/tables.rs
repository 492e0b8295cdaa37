//! redb table definitions for the Keel state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Shape shared by every table.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// App records keyed by app ID.
pub const APPS: JsonTable = TableDefinition::new("apps");

/// Configs keyed by `{app_id}:{version:010}`.
pub const CONFIGS: JsonTable = TableDefinition::new("configs");

/// Slugs keyed by slug ID.
pub const SLUGS: JsonTable = TableDefinition::new("slugs");

/// Releases keyed by `{app_id}:{version:010}`.
pub const RELEASES: JsonTable = TableDefinition::new("releases");

/// Deploys keyed by `{app_id}:{created_at:020}:{deploy_id}`.
pub const DEPLOYS: JsonTable = TableDefinition::new("deploys");

/// Key for a versioned record.
pub fn version_key(app_id: &str, version: u32) -> String {
    format!("{app_id}:{version:010}")
}
