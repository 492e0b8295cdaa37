//! Process-type extraction from pulled images.

use std::io::Write;

use async_trait::async_trait;
use tracing::warn;

use keel_core::Image;
use keel_puller::{JsonMessage, write_message};
use keel_state::ProcessTypes;

use crate::error::ExtractError;

/// Reads the process types an image declares. Status lines may be
/// written to `out`.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        image: &Image,
        out: &mut (dyn Write + Send),
    ) -> Result<ProcessTypes, ExtractError>;
}

/// Extractor that answers every image with the same process types.
#[derive(Debug, Clone, Default)]
pub struct StaticExtractor {
    process_types: ProcessTypes,
}

impl StaticExtractor {
    pub fn new(process_types: ProcessTypes) -> Self {
        Self { process_types }
    }
}

#[async_trait]
impl Extractor for StaticExtractor {
    async fn extract(
        &self,
        image: &Image,
        out: &mut (dyn Write + Send),
    ) -> Result<ProcessTypes, ExtractError> {
        if self.process_types.is_empty() {
            return Err(ExtractError::NoProcessTypes(image.to_string()));
        }

        let msg = JsonMessage::status(format!("Extracting process types from {image}"));
        if let Err(e) = write_message(out, &msg) {
            warn!(error = %e, "failed to write extraction status");
        }
        Ok(self.process_types.clone())
    }
}

#[cfg(test)]
mod tests {
    use keel_puller::read_messages;

    use super::*;

    #[tokio::test]
    async fn static_extractor_returns_mapping() {
        let types = ProcessTypes::from([("web".to_string(), vec!["./bin/web".to_string()])]);
        let extractor = StaticExtractor::new(types.clone());
        let mut out = Vec::new();

        let extracted = extractor
            .extract(&Image::parse("acme/web").unwrap(), &mut out)
            .await
            .unwrap();

        assert_eq!(extracted, types);
        let messages = read_messages(&out).unwrap();
        assert_eq!(messages[0].status, "Extracting process types from acme/web");
    }

    #[tokio::test]
    async fn empty_mapping_is_an_error() {
        let err = StaticExtractor::default()
            .extract(&Image::parse("acme/web").unwrap(), &mut std::io::sink())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::NoProcessTypes(ref s) if s == "acme/web"));
    }
}
