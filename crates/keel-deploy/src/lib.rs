//! Keel deploy pipeline.
//!
//! Turns an image reference into a running release: pull the image and
//! extract its process types into a slug, pair the slug with the app's
//! head config as a new release, and submit the release to the scheduler.
//! Each step's failure aborts the deploy; nothing already created is
//! rolled back.

pub mod error;
pub mod extractor;
pub mod locks;
pub mod pipeline;
pub mod release;
pub mod slugs;
pub mod store;

pub use error::{DeployError, DeployResult, ExtractError, SlugError};
pub use extractor::{Extractor, StaticExtractor};
pub use locks::{AppLockGuard, AppLocks};
pub use pipeline::DeployPipeline;
pub use release::release_app;
pub use slugs::SlugService;
pub use store::Store;
