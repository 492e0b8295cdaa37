use keel_puller::PullError;
use keel_scheduler::SchedulerError;
use keel_state::StateError;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("image {0} declares no process types")]
    NoProcessTypes(String),
}

/// Failure to turn an image into a persisted slug.
#[derive(Debug, thiserror::Error)]
pub enum SlugError {
    #[error("error pulling image: {0}")]
    Pull(#[from] PullError),

    #[error("error extracting process types: {0}")]
    Extract(#[from] ExtractError),

    #[error("error storing slug: {0}")]
    Store(#[from] StateError),
}

/// A deploy failure, tagged with the step that failed.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("finding app: {0}")]
    FindApp(#[source] StateError),

    #[error("reading config: {0}")]
    Config(#[source] StateError),

    #[error("creating slug: {0}")]
    Slug(#[from] SlugError),

    #[error("creating release: {0}")]
    Release(#[source] StateError),

    #[error("scheduling release: {0}")]
    Schedule(#[from] SchedulerError),

    #[error("recording deploy: {0}")]
    Record(#[source] StateError),

    #[error("app not found: {0}")]
    AppNotFound(String),
}

impl DeployError {
    /// Name of the pipeline step that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::FindApp(_) | Self::AppNotFound(_) => "app",
            Self::Config(_) => "config",
            Self::Slug(_) => "slug",
            Self::Release(_) => "release",
            Self::Schedule(_) => "schedule",
            Self::Record(_) => "record",
        }
    }
}

pub type DeployResult<T> = Result<T, DeployError>;
