//! StateStore — redb-backed persistence for Keel records.
//!
//! Provides typed operations over apps, configs, slugs, releases, and
//! deploys. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use uuid::Uuid;

use keel_core::Image;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [APPS, CONFIGS, SLUGS, RELEASES, DEPLOYS] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Apps ───────────────────────────────────────────────────────

    /// Return the app deploying from `repo`, creating it on first sight.
    ///
    /// App names are unique: a new app whose derived name is taken by
    /// another repository gets a numeric suffix (`web-2`, `web-3`, ...).
    pub fn find_or_create_app_by_repo(&self, repo: &str) -> StateResult<AppRecord> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let app = {
            let mut table = txn.open_table(APPS).map_err(map_err!(Table))?;
            let existing: Vec<AppRecord> = scan_prefix(&table, "")?;
            if let Some(app) = existing.iter().find(|a| a.repo == repo) {
                return Ok(app.clone());
            }

            let app = AppRecord {
                id: Uuid::new_v4().to_string(),
                name: unique_name(&existing, &app_name_from_repo(repo)),
                repo: repo.to_string(),
                created_at: epoch_secs(),
            };
            let value = to_json(&app)?;
            table
                .insert(app.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            app
        };
        txn.commit().map_err(map_err!(Transaction))?;
        info!(app = %app.id, name = %app.name, %repo, "app created");
        Ok(app)
    }

    /// Get an app by ID.
    pub fn get_app(&self, id: &str) -> StateResult<Option<AppRecord>> {
        self.get_json(APPS, id)
    }

    /// Find an app by name.
    pub fn find_app_by_name(&self, name: &str) -> StateResult<Option<AppRecord>> {
        Ok(self.list_apps()?.into_iter().find(|a| a.name == name))
    }

    /// List all apps.
    pub fn list_apps(&self) -> StateResult<Vec<AppRecord>> {
        self.list_json(APPS, "")
    }

    // ── Configs ────────────────────────────────────────────────────

    /// The latest config for an app. An app without one gets an empty
    /// version-1 config.
    pub fn config_head(&self, app_id: &str) -> StateResult<Config> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let config = {
            let mut table = txn.open_table(CONFIGS).map_err(map_err!(Table))?;
            let prefix = format!("{app_id}:");
            if let Some(head) = scan_prefix::<Config, _>(&table, &prefix)?.pop() {
                return Ok(head);
            }

            let config = new_config(app_id, 1, BTreeMap::new());
            let value = to_json(&config)?;
            table
                .insert(version_key(app_id, 1).as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            config
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(app = %app_id, "initial config created");
        Ok(config)
    }

    /// Write a new config version. `Some(value)` sets a variable and
    /// `None` unsets it; everything else carries over from the head.
    pub fn apply_config(
        &self,
        app_id: &str,
        changes: &BTreeMap<String, Option<String>>,
    ) -> StateResult<Config> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let config = {
            let mut table = txn.open_table(CONFIGS).map_err(map_err!(Table))?;
            let head = scan_prefix::<Config, _>(&table, &format!("{app_id}:"))?.pop();
            let (version, mut vars) = match head {
                Some(head) => (head.version + 1, head.vars),
                None => (1, BTreeMap::new()),
            };
            for (key, value) in changes {
                match value {
                    Some(value) => vars.insert(key.clone(), value.clone()),
                    None => vars.remove(key),
                };
            }

            let config = new_config(app_id, version, vars);
            let value = to_json(&config)?;
            table
                .insert(version_key(app_id, version).as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            config
        };
        txn.commit().map_err(map_err!(Transaction))?;
        info!(app = %app_id, version = config.version, "config applied");
        Ok(config)
    }

    /// All configs for an app, oldest first.
    pub fn list_configs(&self, app_id: &str) -> StateResult<Vec<Config>> {
        self.list_json(CONFIGS, &format!("{app_id}:"))
    }

    // ── Slugs ──────────────────────────────────────────────────────

    /// Persist a slug for a pulled image.
    pub fn create_slug(&self, image: &Image, process_types: ProcessTypes) -> StateResult<Slug> {
        let slug = Slug {
            id: Uuid::new_v4().to_string(),
            image: image.clone(),
            process_types,
            created_at: epoch_secs(),
        };
        self.put_json(SLUGS, &slug.id, &slug)?;
        debug!(slug = %slug.id, %image, "slug stored");
        Ok(slug)
    }

    /// Get a slug by ID.
    pub fn get_slug(&self, id: &str) -> StateResult<Option<Slug>> {
        self.get_json(SLUGS, id)
    }

    /// List all slugs.
    pub fn list_slugs(&self) -> StateResult<Vec<Slug>> {
        self.list_json(SLUGS, "")
    }

    // ── Releases ───────────────────────────────────────────────────

    /// Create the next release of an app from a config and a slug.
    pub fn create_release(
        &self,
        app: &AppRecord,
        config: &Config,
        slug: &Slug,
        description: &str,
    ) -> StateResult<Release> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let release = {
            let configs = txn.open_table(CONFIGS).map_err(map_err!(Table))?;
            match read_json::<Config, _>(&configs, &version_key(&app.id, config.version))? {
                Some(stored) if stored.id == config.id => {}
                _ => {
                    return Err(StateError::NotFound {
                        kind: "config",
                        id: config.id.clone(),
                    });
                }
            }
            let slugs = txn.open_table(SLUGS).map_err(map_err!(Table))?;
            if read_json::<Slug, _>(&slugs, &slug.id)?.is_none() {
                return Err(StateError::NotFound {
                    kind: "slug",
                    id: slug.id.clone(),
                });
            }

            let mut table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
            let previous = scan_prefix::<Release, _>(&table, &format!("{}:", app.id))?.pop();
            let version = previous.as_ref().map_or(1, |r| r.version + 1);

            let release = Release {
                id: Uuid::new_v4().to_string(),
                app_id: app.id.clone(),
                version,
                config_id: config.id.clone(),
                slug_id: slug.id.clone(),
                formation: next_formation(
                    previous.as_ref().map(|r| &r.formation),
                    &slug.process_types,
                ),
                description: description.to_string(),
                created_at: epoch_secs(),
            };
            let value = to_json(&release)?;
            table
                .insert(version_key(&app.id, version).as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            release
        };
        txn.commit().map_err(map_err!(Transaction))?;
        info!(app = %app.name, version = release.version, "release created");
        Ok(release)
    }

    /// Get a release by app and version.
    pub fn get_release(&self, app_id: &str, version: u32) -> StateResult<Option<Release>> {
        self.get_json(RELEASES, &version_key(app_id, version))
    }

    /// All releases of an app, oldest first.
    pub fn list_releases(&self, app_id: &str) -> StateResult<Vec<Release>> {
        self.list_json(RELEASES, &format!("{app_id}:"))
    }

    /// The newest release of an app, if any.
    pub fn head_release(&self, app_id: &str) -> StateResult<Option<Release>> {
        Ok(self.list_releases(app_id)?.pop())
    }

    // ── Deploys ────────────────────────────────────────────────────

    /// Record a successful deploy of `release`.
    pub fn create_deploy(&self, release: &Release) -> StateResult<Deploy> {
        let deploy = Deploy {
            id: Uuid::new_v4().to_string(),
            release: release.clone(),
            created_at: epoch_secs(),
        };
        let key = format!("{}:{:020}:{}", release.app_id, deploy.created_at, deploy.id);
        self.put_json(DEPLOYS, &key, &deploy)?;
        Ok(deploy)
    }

    /// All deploys of an app, oldest first.
    pub fn list_deploys(&self, app_id: &str) -> StateResult<Vec<Deploy>> {
        self.list_json(DEPLOYS, &format!("{app_id}:"))
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn put_json<T: Serialize>(&self, def: JsonTable, key: &str, value: &T) -> StateResult<()> {
        let value = to_json(value)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        read_json(&table, key)
    }

    fn list_json<T: DeserializeOwned>(&self, def: JsonTable, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        scan_prefix(&table, prefix)
    }
}

/// Decode the value stored under `key`, if any.
fn read_json<T, R>(table: &R, key: &str) -> StateResult<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key).map_err(map_err!(Read))? {
        Some(guard) => Ok(Some(
            serde_json::from_slice(guard.value()).map_err(map_err!(Decode))?,
        )),
        None => Ok(None),
    }
}

/// `base`, or `base-N` for the smallest N >= 2 that no app uses yet.
fn unique_name(apps: &[AppRecord], base: &str) -> String {
    let taken = |name: &str| apps.iter().any(|a| a.name == name);
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Decode every value whose key starts with `prefix`, in key order.
fn scan_prefix<T, R>(table: &R, prefix: &str) -> StateResult<Vec<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        if key.value().starts_with(prefix) {
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Decode))?);
        }
    }
    Ok(results)
}

fn to_json<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Encode))
}

fn new_config(app_id: &str, version: u32, vars: BTreeMap<String, String>) -> Config {
    Config {
        id: Uuid::new_v4().to_string(),
        app_id: app_id.to_string(),
        version,
        vars,
        created_at: epoch_secs(),
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image() -> Image {
        Image::parse("remind101/acme-inc:latest").unwrap()
    }

    fn test_types() -> ProcessTypes {
        ProcessTypes::from([
            ("web".to_string(), vec!["./bin/web".to_string()]),
            ("worker".to_string(), vec!["./bin/worker".to_string()]),
        ])
    }

    // ── Apps ───────────────────────────────────────────────────────

    #[test]
    fn find_or_create_is_idempotent() {
        let store = StateStore::open_in_memory().unwrap();

        let first = store.find_or_create_app_by_repo("remind101/acme-inc").unwrap();
        let second = store.find_or_create_app_by_repo("remind101/acme-inc").unwrap();
        let other = store.find_or_create_app_by_repo("remind101/r101-api").unwrap();

        assert_eq!(first, second);
        assert_ne!(first.id, other.id);
        assert_eq!(first.name, "acme-inc");
        assert_eq!(store.list_apps().unwrap().len(), 2);
    }

    #[test]
    fn colliding_app_names_are_suffixed() {
        let store = StateStore::open_in_memory().unwrap();

        let quay = store.find_or_create_app_by_repo("quay.io/a/web").unwrap();
        let hub = store.find_or_create_app_by_repo("b/web").unwrap();
        let third = store.find_or_create_app_by_repo("c/web").unwrap();

        assert_eq!(quay.name, "web");
        assert_eq!(hub.name, "web-2");
        assert_eq!(third.name, "web-3");
        assert_eq!(store.find_app_by_name("web-2").unwrap(), Some(hub.clone()));
        // Existing apps keep their name.
        assert_eq!(store.find_or_create_app_by_repo("b/web").unwrap(), hub);
    }

    #[test]
    fn app_lookup_by_id_and_name() {
        let store = StateStore::open_in_memory().unwrap();
        let app = store.find_or_create_app_by_repo("remind101/acme-inc").unwrap();

        assert_eq!(store.get_app(&app.id).unwrap(), Some(app.clone()));
        assert_eq!(store.find_app_by_name("acme-inc").unwrap(), Some(app));
        assert!(store.find_app_by_name("nope").unwrap().is_none());
    }

    // ── Configs ────────────────────────────────────────────────────

    #[test]
    fn config_head_starts_empty_and_is_stable() {
        let store = StateStore::open_in_memory().unwrap();

        let head = store.config_head("app-1").unwrap();
        assert_eq!(head.version, 1);
        assert!(head.vars.is_empty());
        assert_eq!(store.config_head("app-1").unwrap(), head);
    }

    #[test]
    fn apply_config_sets_and_unsets() {
        let store = StateStore::open_in_memory().unwrap();
        store.config_head("app-1").unwrap();

        let set = BTreeMap::from([
            ("RAILS_ENV".to_string(), Some("production".to_string())),
            ("DEBUG".to_string(), Some("1".to_string())),
        ]);
        let v2 = store.apply_config("app-1", &set).unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!(v2.vars.len(), 2);

        let unset = BTreeMap::from([("DEBUG".to_string(), None)]);
        let v3 = store.apply_config("app-1", &unset).unwrap();
        assert_eq!(v3.version, 3);
        assert_eq!(v3.vars.keys().collect::<Vec<_>>(), vec!["RAILS_ENV"]);
        assert_eq!(store.config_head("app-1").unwrap(), v3);
        assert_eq!(store.list_configs("app-1").unwrap().len(), 3);
    }

    // ── Slugs & releases ───────────────────────────────────────────

    #[test]
    fn slug_round_trip() {
        let store = StateStore::open_in_memory().unwrap();
        let slug = store.create_slug(&test_image(), test_types()).unwrap();

        assert_eq!(store.get_slug(&slug.id).unwrap(), Some(slug));
        assert_eq!(store.list_slugs().unwrap().len(), 1);
    }

    #[test]
    fn releases_are_numbered_per_app() {
        let store = StateStore::open_in_memory().unwrap();
        let acme = store.find_or_create_app_by_repo("remind101/acme-inc").unwrap();
        let api = store.find_or_create_app_by_repo("remind101/r101-api").unwrap();
        let config = store.config_head(&acme.id).unwrap();
        let slug = store.create_slug(&test_image(), test_types()).unwrap();

        let r1 = store.create_release(&acme, &config, &slug, "Deploy 1").unwrap();
        let r2 = store.create_release(&acme, &config, &slug, "Deploy 2").unwrap();
        let api_config = store.config_head(&api.id).unwrap();
        let other = store.create_release(&api, &api_config, &slug, "Deploy").unwrap();

        assert_eq!((r1.version, r2.version, other.version), (1, 2, 1));
        assert_eq!(store.head_release(&acme.id).unwrap(), Some(r2.clone()));
        assert_eq!(store.get_release(&acme.id, 1).unwrap(), Some(r1));
        assert_eq!(store.list_releases(&acme.id).unwrap().len(), 2);
    }

    #[test]
    fn release_requires_stored_config_and_slug() {
        let store = StateStore::open_in_memory().unwrap();
        let app = store.find_or_create_app_by_repo("remind101/acme-inc").unwrap();
        let config = store.config_head(&app.id).unwrap();
        let slug = store.create_slug(&test_image(), test_types()).unwrap();

        let mut unknown_slug = slug.clone();
        unknown_slug.id = "missing".to_string();
        let err = store.create_release(&app, &config, &unknown_slug, "").unwrap_err();
        assert!(matches!(err, StateError::NotFound { kind: "slug", ref id } if id == "missing"));

        let foreign = store.config_head("other-app").unwrap();
        let err = store.create_release(&app, &foreign, &slug, "").unwrap_err();
        assert!(matches!(err, StateError::NotFound { kind: "config", .. }));

        assert!(store.list_releases(&app.id).unwrap().is_empty());
    }

    #[test]
    fn release_formation_carries_over() {
        let store = StateStore::open_in_memory().unwrap();
        let app = store.find_or_create_app_by_repo("remind101/acme-inc").unwrap();
        let config = store.config_head(&app.id).unwrap();
        let slug = store.create_slug(&test_image(), test_types()).unwrap();

        let r1 = store.create_release(&app, &config, &slug, "").unwrap();
        assert_eq!(r1.formation["web"], 1);
        assert_eq!(r1.formation["worker"], 0);

        let web_only = store
            .create_slug(
                &test_image(),
                ProcessTypes::from([("web".to_string(), vec!["./bin/web".to_string()])]),
            )
            .unwrap();
        let r2 = store.create_release(&app, &config, &web_only, "").unwrap();
        assert_eq!(r2.formation.len(), 1);
    }

    // ── Deploys ────────────────────────────────────────────────────

    #[test]
    fn deploys_listed_per_app() {
        let store = StateStore::open_in_memory().unwrap();
        let app = store.find_or_create_app_by_repo("remind101/acme-inc").unwrap();
        let config = store.config_head(&app.id).unwrap();
        let slug = store.create_slug(&test_image(), test_types()).unwrap();
        let release = store.create_release(&app, &config, &slug, "").unwrap();

        let deploy = store.create_deploy(&release).unwrap();

        assert_eq!(store.list_deploys(&app.id).unwrap(), vec![deploy]);
        assert!(store.list_deploys("other").unwrap().is_empty());
    }

    // ── Persistence ────────────────────────────────────────────────

    #[test]
    fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keel.redb");

        let app = {
            let store = StateStore::open(&path).unwrap();
            store.find_or_create_app_by_repo("remind101/acme-inc").unwrap()
        };

        let store = StateStore::open(&path).unwrap();
        assert_eq!(store.get_app(&app.id).unwrap(), Some(app));
    }
}
