//! Container image references.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A pullable container image: `[registry/]repository[:tag]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub registry: String,
    pub repository: String,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("empty image reference")]
    Empty,
    #[error("invalid image reference: {0}")]
    Invalid(String),
}

impl Image {
    pub fn new(registry: &str, repository: &str, tag: &str) -> Self {
        Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        }
    }

    /// Parse a docker-style reference such as `quay.io/acme/web:v2`.
    ///
    /// The first path component is only treated as a registry when it looks
    /// like a host (`.` or `:` in it, or `localhost`), so `acme/web` stays a
    /// plain Docker Hub repository.
    pub fn parse(reference: &str) -> Result<Self, ImageError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ImageError::Empty);
        }

        // A ':' only introduces a tag when it comes after the last '/'.
        let (path, tag) = match reference.rsplit_once(':') {
            Some((path, tag)) if !tag.contains('/') => {
                if tag.is_empty() {
                    return Err(ImageError::Invalid(reference.to_string()));
                }
                (path, tag)
            }
            _ => (reference, ""),
        };

        let (registry, repository) = match path.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => (first, rest),
            _ => ("", path),
        };

        if repository.is_empty() || repository.starts_with('/') || repository.ends_with('/') {
            return Err(ImageError::Invalid(reference.to_string()));
        }

        Ok(Self::new(registry, repository, tag))
    }

    /// The registry-qualified repository, without the tag.
    ///
    /// Apps are identified by this value, so every tag of one repository
    /// deploys to the same app.
    pub fn repo(&self) -> String {
        if self.registry.is_empty() {
            self.repository.clone()
        } else {
            format!("{}/{}", self.registry, self.repository)
        }
    }
}

fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repo())?;
        if !self.tag.is_empty() {
            write!(f, ":{}", self.tag)?;
        }
        Ok(())
    }
}

impl FromStr for Image {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hub_repository_with_tag() {
        let img = Image::parse("remind101/acme-inc:latest").unwrap();
        assert_eq!(img, Image::new("", "remind101/acme-inc", "latest"));
        assert_eq!(img.to_string(), "remind101/acme-inc:latest");
    }

    #[test]
    fn parse_registry_with_port() {
        let img = Image::parse("localhost:5000/acme/web:v2").unwrap();
        assert_eq!(img.registry, "localhost:5000");
        assert_eq!(img.repository, "acme/web");
        assert_eq!(img.tag, "v2");
        assert_eq!(img.repo(), "localhost:5000/acme/web");
    }

    #[test]
    fn parse_without_tag() {
        let img = Image::parse("quay.io/acme/worker").unwrap();
        assert_eq!(img.registry, "quay.io");
        assert_eq!(img.tag, "");
        assert_eq!(img.to_string(), "quay.io/acme/worker");
    }

    #[test]
    fn parse_rejects_empty_and_dangling_tag() {
        assert_eq!(Image::parse("  "), Err(ImageError::Empty));
        assert!(matches!(Image::parse("acme/web:"), Err(ImageError::Invalid(_))));
        assert!(matches!(Image::parse("quay.io/"), Err(ImageError::Invalid(_))));
    }

    #[test]
    fn equality_is_structural() {
        let a: Image = "acme/web:1".parse().unwrap();
        let b = Image::new("", "acme/web", "1");
        assert_eq!(a, b);
        assert_ne!(a, Image::new("", "acme/web", "2"));
    }
}
