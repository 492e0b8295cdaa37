//! The record store the pipeline writes through.

use keel_core::Image;
use keel_state::{
    AppRecord, Config, Deploy, ProcessTypes, Release, Slug, StateResult, StateStore,
};

/// Record operations used by a deploy. Implemented by [`StateStore`];
/// tests wrap it to inject failures.
pub trait Store: Send + Sync {
    fn find_or_create_app_by_repo(&self, repo: &str) -> StateResult<AppRecord>;
    fn find_app_by_name(&self, name: &str) -> StateResult<Option<AppRecord>>;
    fn config_head(&self, app_id: &str) -> StateResult<Config>;
    fn create_slug(&self, image: &Image, process_types: ProcessTypes) -> StateResult<Slug>;
    fn create_release(
        &self,
        app: &AppRecord,
        config: &Config,
        slug: &Slug,
        description: &str,
    ) -> StateResult<Release>;
    fn create_deploy(&self, release: &Release) -> StateResult<Deploy>;
}

impl Store for StateStore {
    fn find_or_create_app_by_repo(&self, repo: &str) -> StateResult<AppRecord> {
        StateStore::find_or_create_app_by_repo(self, repo)
    }

    fn find_app_by_name(&self, name: &str) -> StateResult<Option<AppRecord>> {
        StateStore::find_app_by_name(self, name)
    }

    fn config_head(&self, app_id: &str) -> StateResult<Config> {
        StateStore::config_head(self, app_id)
    }

    fn create_slug(&self, image: &Image, process_types: ProcessTypes) -> StateResult<Slug> {
        StateStore::create_slug(self, image, process_types)
    }

    fn create_release(
        &self,
        app: &AppRecord,
        config: &Config,
        slug: &Slug,
        description: &str,
    ) -> StateResult<Release> {
        StateStore::create_release(self, app, config, slug, description)
    }

    fn create_deploy(&self, release: &Release) -> StateResult<Deploy> {
        StateStore::create_deploy(self, release)
    }
}
