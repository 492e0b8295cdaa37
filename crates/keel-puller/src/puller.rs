//! The puller capability and its simple implementations.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use keel_core::Image;

use crate::error::PullResult;
use crate::message::{JsonMessage, write_message};

/// Pulls container images, streaming progress records to `out`.
///
/// Dropping the returned future abandons the pull.
#[async_trait]
pub trait Puller: Send + Sync {
    async fn pull(&self, image: &Image, out: &mut (dyn Write + Send)) -> PullResult<()>;
}

#[async_trait]
impl<P: Puller + ?Sized> Puller for Arc<P> {
    async fn pull(&self, image: &Image, out: &mut (dyn Write + Send)) -> PullResult<()> {
        (**self).pull(image, out).await
    }
}

/// Adapts a synchronous closure into a [`Puller`].
pub struct PullerFn<F>(pub F);

#[async_trait]
impl<F> Puller for PullerFn<F>
where
    F: Fn(&Image, &mut (dyn Write + Send)) -> PullResult<()> + Send + Sync,
{
    async fn pull(&self, image: &Image, out: &mut (dyn Write + Send)) -> PullResult<()> {
        (self.0)(image, out)
    }
}

/// A puller that always succeeds after writing a transcript that looks
/// like a real registry pull.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakePuller;

impl FakePuller {
    pub fn transcript(image: &Image) -> Vec<JsonMessage> {
        let layer = "345c7524bc96";
        vec![
            JsonMessage::status(format!("Pulling repository {}", image.repository)),
            JsonMessage::status(format!(
                "Pulling image ({}) from {}",
                image.tag, image.repository
            ))
            .with_id(layer),
            JsonMessage::status("Pulling dependent layers").with_id(layer),
            JsonMessage::status("Downloading")
                .with_id("a1dd7097a8e8")
                .with_progress(2048, 2048),
            JsonMessage::status("Download complete").with_id("a1dd7097a8e8"),
            JsonMessage::status(format!("Status: Image is up to date for {image}")),
        ]
    }
}

#[async_trait]
impl Puller for FakePuller {
    async fn pull(&self, image: &Image, out: &mut (dyn Write + Send)) -> PullResult<()> {
        for msg in Self::transcript(image) {
            write_message(out, &msg)?;
        }
        Ok(())
    }
}
