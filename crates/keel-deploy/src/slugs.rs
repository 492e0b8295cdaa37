//! Slug creation: pull, extract, persist.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info};

use keel_core::Image;
use keel_puller::Puller;
use keel_state::Slug;

use crate::error::SlugError;
use crate::extractor::Extractor;
use crate::store::Store;

/// Creates slugs from image references.
#[derive(Clone)]
pub struct SlugService {
    puller: Arc<dyn Puller>,
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn Store>,
}

impl SlugService {
    pub fn new(
        puller: Arc<dyn Puller>,
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            puller,
            extractor,
            store,
        }
    }

    /// Pull `image`, extract its process types, and persist the slug.
    ///
    /// Pull progress and extractor status go to `out`. Nothing is stored
    /// unless both the pull and the extraction succeed.
    pub async fn create_by_image(
        &self,
        image: &Image,
        out: &mut (dyn Write + Send),
    ) -> Result<Slug, SlugError> {
        self.puller.pull(image, out).await?;
        debug!(%image, "image pulled");

        let process_types = self.extractor.extract(image, out).await?;
        let slug = self.store.create_slug(image, process_types)?;
        info!(slug = %slug.id, %image, types = slug.process_types.len(), "slug created");
        Ok(slug)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use keel_puller::{FakePuller, PullError, PullResult, PullerFn};
    use keel_state::{ProcessTypes, StateStore};

    use super::*;
    use crate::error::ExtractError;
    use crate::extractor::StaticExtractor;

    fn web_types() -> ProcessTypes {
        ProcessTypes::from([("web".to_string(), vec!["./bin/web".to_string()])])
    }

    struct CountingExtractor(AtomicUsize);

    #[async_trait]
    impl Extractor for CountingExtractor {
        async fn extract(
            &self,
            _image: &Image,
            _out: &mut (dyn Write + Send),
        ) -> Result<ProcessTypes, ExtractError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(web_types())
        }
    }

    #[tokio::test]
    async fn creates_slug_after_pull() {
        let store = StateStore::open_in_memory().unwrap();
        let service = SlugService::new(
            Arc::new(FakePuller),
            Arc::new(StaticExtractor::new(web_types())),
            Arc::new(store.clone()),
        );
        let image = Image::parse("remind101/acme-inc:latest").unwrap();
        let mut out = Vec::new();

        let slug = service.create_by_image(&image, &mut out).await.unwrap();

        assert_eq!(slug.image, image);
        assert_eq!(slug.process_types, web_types());
        assert_eq!(store.get_slug(&slug.id).unwrap(), Some(slug));
        assert!(!out.is_empty());
    }

    #[tokio::test]
    async fn failed_pull_skips_extraction_and_storage() {
        let store = StateStore::open_in_memory().unwrap();
        let extractor = Arc::new(CountingExtractor(AtomicUsize::new(0)));
        let puller = PullerFn(|img: &Image, _: &mut (dyn Write + Send)| -> PullResult<()> {
            Err(PullError::NotFound(img.to_string()))
        });
        let service = SlugService::new(Arc::new(puller), extractor.clone(), Arc::new(store.clone()));

        let err = service
            .create_by_image(&Image::parse("acme/missing").unwrap(), &mut std::io::sink())
            .await
            .unwrap_err();

        assert!(matches!(err, SlugError::Pull(PullError::NotFound(_))));
        assert_eq!(extractor.0.load(Ordering::SeqCst), 0);
        assert!(store.list_slugs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_extraction_stores_nothing() {
        let store = StateStore::open_in_memory().unwrap();
        let service = SlugService::new(
            Arc::new(FakePuller),
            Arc::new(StaticExtractor::default()),
            Arc::new(store.clone()),
        );

        let err = service
            .create_by_image(&Image::parse("acme/web").unwrap(), &mut std::io::sink())
            .await
            .unwrap_err();

        assert!(matches!(err, SlugError::Extract(ExtractError::NoProcessTypes(_))));
        assert!(store.list_slugs().unwrap().is_empty());
    }
}
