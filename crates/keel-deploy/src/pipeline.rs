//! DeployPipeline — image in, scheduled release out.

use std::io::Write;
use std::sync::Arc;

use tracing::{info, warn};

use keel_core::Image;
use keel_puller::{JsonMessage, write_message};
use keel_scheduler::Scheduler;
use keel_state::Deploy;

use crate::error::{DeployError, DeployResult};
use crate::locks::AppLocks;
use crate::release::release_app;
use crate::slugs::SlugService;
use crate::store::Store;

/// Orchestrates deploys and app teardown.
pub struct DeployPipeline {
    store: Arc<dyn Store>,
    slugs: SlugService,
    scheduler: Arc<Scheduler>,
    locks: AppLocks,
}

impl DeployPipeline {
    pub fn new(store: Arc<dyn Store>, slugs: SlugService, scheduler: Arc<Scheduler>) -> Self {
        Self {
            store,
            slugs,
            scheduler,
            locks: AppLocks::new(),
        }
    }

    /// Deploy `image`, streaming pull progress and status lines to `out`.
    ///
    /// Steps run in order and the first failure is returned, tagged with
    /// its stage. Records created by earlier steps are kept: a retried
    /// deploy reuses the app and creates a fresh slug and release.
    pub async fn deploy(&self, image: &Image, out: &mut (dyn Write + Send)) -> DeployResult<Deploy> {
        let app = self
            .store
            .find_or_create_app_by_repo(&image.repo())
            .map_err(DeployError::FindApp)?;
        let config = self
            .store
            .config_head(&app.id)
            .map_err(DeployError::Config)?;

        let slug = self.slugs.create_by_image(image, out).await?;

        // Release numbering and the scheduler's list-then-act both need
        // exclusive access to the app.
        let _guard = self.locks.lock(&app.id).await;

        let release = self
            .store
            .create_release(&app, &config, &slug, &format!("Deploy {image}"))
            .map_err(DeployError::Release)?;

        let desired = release_app(&app, &config, &release, &slug);
        self.scheduler.submit(&desired).await?;

        let deploy = self
            .store
            .create_deploy(&release)
            .map_err(DeployError::Record)?;

        status(out, format!("Status: Released {} v{}", app.name, release.version));
        info!(app = %app.name, release = release.version, %image, "deployed");
        Ok(deploy)
    }

    /// Remove every service belonging to the app called `app_name`.
    pub async fn destroy(&self, app_name: &str) -> DeployResult<()> {
        let app = self
            .store
            .find_app_by_name(app_name)
            .map_err(DeployError::FindApp)?
            .ok_or_else(|| DeployError::AppNotFound(app_name.to_string()))?;

        let _guard = self.locks.lock(&app.id).await;
        self.scheduler.remove(&app.id).await?;
        info!(app = %app.name, "app destroyed");
        Ok(())
    }
}

fn status(out: &mut (dyn Write + Send), text: String) {
    if let Err(e) = write_message(out, &JsonMessage::status(text)) {
        warn!(error = %e, "failed to write deploy status");
    }
}
