//! List sources - providers of freshly fetched, already normalized lists
//!
//! Upstream publication formats are parsed elsewhere; a source here hands back
//! a `SanctionsDocument` whose per-list `updated` reflects the freshness of
//! each list. A failed fetch returns an error and nothing is merged.

use crate::domain::types::SanctionsDocument;
use crate::infra::config::{SourceConfig, SourceKind};
use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// External fetch collaborator
#[async_trait]
pub trait ListSource: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &str;

    /// Fetch the current lists, keyed by list identifier
    async fn fetch(&self) -> anyhow::Result<SanctionsDocument>;
}

/// Reads a staged, normalized document from disk
pub struct JsonFileSource {
    path: PathBuf,
    label: String,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = format!("file:{}", path.display());
        Self { path, label }
    }
}

#[async_trait]
impl ListSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.label
    }

    async fn fetch(&self) -> anyhow::Result<SanctionsDocument> {
        let content = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read list source {}", self.path.display()))?;
        let doc: SanctionsDocument = serde_json::from_slice(&content)
            .with_context(|| format!("Failed to parse list source {}", self.path.display()))?;
        info!(source = %self.label, lists = %doc.len(), "source_fetched");
        Ok(doc)
    }
}

/// Fetches a normalized document over HTTP
pub struct HttpSource {
    url: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sanctions-screen/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { url: url.to_string(), client })
    }
}

#[async_trait]
impl ListSource for HttpSource {
    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> anyhow::Result<SanctionsDocument> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", self.url))?
            .error_for_status()
            .with_context(|| format!("Upstream rejected {}", self.url))?;
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body from {}", self.url))?;
        let doc: SanctionsDocument = serde_json::from_slice(&body)
            .with_context(|| format!("Failed to parse lists from {}", self.url))?;
        info!(source = %self.url, lists = %doc.len(), bytes = %body.len(), "source_fetched");
        Ok(doc)
    }
}

/// Union of several sources. Any failing source fails the whole fetch.
/// On duplicate identifiers the list with the higher `updated` wins.
pub struct CompositeSource {
    sources: Vec<Box<dyn ListSource>>,
}

impl CompositeSource {
    pub fn new(sources: Vec<Box<dyn ListSource>>) -> Self {
        Self { sources }
    }

    /// Build sources from configuration entries
    pub fn from_config(configs: &[SourceConfig]) -> anyhow::Result<Self> {
        let mut sources: Vec<Box<dyn ListSource>> = Vec::with_capacity(configs.len());
        for config in configs {
            let source: Box<dyn ListSource> = match config.kind {
                SourceKind::File => Box::new(JsonFileSource::new(&config.location)),
                SourceKind::Http => Box::new(HttpSource::new(
                    &config.location,
                    Duration::from_millis(config.timeout_ms),
                )?),
            };
            sources.push(source);
        }
        Ok(Self::new(sources))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl ListSource for CompositeSource {
    fn name(&self) -> &str {
        "composite"
    }

    async fn fetch(&self) -> anyhow::Result<SanctionsDocument> {
        let mut combined = SanctionsDocument::new();
        for source in &self.sources {
            let doc = source
                .fetch()
                .await
                .with_context(|| format!("Source {} failed", source.name()))?;
            for (list_id, list) in doc {
                match combined.get(&list_id) {
                    Some(existing) if existing.updated >= list.updated => {
                        warn!(
                            list = %list_id,
                            source = %source.name(),
                            "source_duplicate_list_ignored"
                        );
                    }
                    _ => {
                        combined.insert(list_id, list);
                    }
                }
            }
        }
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SanctionList;
    use tempfile::tempdir;

    struct FixedSource(SanctionsDocument);

    #[async_trait]
    impl ListSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self) -> anyhow::Result<SanctionsDocument> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl ListSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn fetch(&self) -> anyhow::Result<SanctionsDocument> {
            anyhow::bail!("upstream unavailable")
        }
    }

    fn single(id: &str, updated: i64, name: &str) -> SanctionsDocument {
        SanctionsDocument::from([(id.to_string(), SanctionList::plain(updated, [name]))])
    }

    #[tokio::test]
    async fn test_file_source_reads_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("staged.json");
        std::fs::write(&path, r#"{"L1": {"updated": 7, "entries": ["Jon Snow"]}}"#).unwrap();

        let doc = JsonFileSource::new(&path).fetch().await.unwrap();
        assert_eq!(doc["L1"].updated, 7);
    }

    #[tokio::test]
    async fn test_file_source_missing_is_error() {
        let dir = tempdir().unwrap();
        let source = JsonFileSource::new(dir.path().join("absent.json"));
        assert!(source.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_composite_prefers_newer_duplicate() {
        let composite = CompositeSource::new(vec![
            Box::new(FixedSource(single("L1", 5, "Old Name"))),
            Box::new(FixedSource(single("L1", 9, "New Name"))),
            Box::new(FixedSource(single("L2", 1, "Other Name"))),
        ]);

        let doc = composite.fetch().await.unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc["L1"].updated, 9);
    }

    #[tokio::test]
    async fn test_composite_fails_if_any_source_fails() {
        let composite = CompositeSource::new(vec![
            Box::new(FixedSource(single("L1", 5, "Jon Snow"))),
            Box::new(FailingSource),
        ]);

        let err = composite.fetch().await.unwrap_err();
        assert!(format!("{err:#}").contains("upstream unavailable"));
    }

    #[test]
    fn test_from_config_builds_each_kind() {
        let configs = vec![
            SourceConfig {
                kind: SourceKind::File,
                location: "data/staged.json".to_string(),
                timeout_ms: 1000,
            },
            SourceConfig {
                kind: SourceKind::Http,
                location: "http://127.0.0.1:9/lists.json".to_string(),
                timeout_ms: 1000,
            },
        ];
        let composite = CompositeSource::from_config(&configs).unwrap();
        assert_eq!(composite.len(), 2);
    }
}
