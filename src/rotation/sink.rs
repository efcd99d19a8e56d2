//! Hand-off of the rendered payload to the host.
//!
//! The controller only knows the [`InjectionSink`] trait. [`FileSink`] drops
//! the document and a small JSON manifest into a directory the host watches;
//! activating the new context is the host's job.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::rotation::store::atomic_write;

/// Everything the host needs to seed a fresh context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Injection {
    pub new_context_id: String,
    pub old_context_id: Option<String>,
    pub archive_path: Option<PathBuf>,
    pub estimated_tokens: usize,
    pub over_budget: bool,
    /// Whether the host should tell the user a rotation happened.
    pub notify: bool,
    pub created_at: DateTime<Utc>,
    /// Rendered document; kept out of the manifest.
    #[serde(skip)]
    pub document: String,
}

/// Destination for injection payloads.
pub trait InjectionSink {
    fn deliver(&mut self, injection: &Injection) -> Result<()>;
}

/// Writes `<dir>/<new_context_id>.md` and `<dir>/<new_context_id>.json`.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn document_path(&self, new_context_id: &str) -> PathBuf {
        self.dir.join(format!("{}.md", new_context_id))
    }

    pub fn manifest_path(&self, new_context_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", new_context_id))
    }
}

impl InjectionSink for FileSink {
    fn deliver(&mut self, injection: &Injection) -> Result<()> {
        let doc_path = self.document_path(&injection.new_context_id);
        atomic_write(&doc_path, injection.document.as_bytes())
            .with_context(|| format!("Failed to write injection document {}", doc_path.display()))?;

        // Manifest last: its presence tells the host the document is complete.
        let manifest_path = self.manifest_path(&injection.new_context_id);
        let json =
            serde_json::to_string_pretty(injection).context("Failed to serialize injection manifest")?;
        atomic_write(&manifest_path, json.as_bytes()).with_context(|| {
            format!("Failed to write injection manifest {}", manifest_path.display())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn injection() -> Injection {
        Injection {
            new_context_id: "new-1".into(),
            old_context_id: Some("old-1".into()),
            archive_path: Some(PathBuf::from("/archive/old-1.jsonl")),
            estimated_tokens: 42,
            over_budget: false,
            notify: true,
            created_at: Utc::now(),
            document: "## Inherited Memory\n".into(),
        }
    }

    #[test]
    fn test_file_sink_writes_document_and_manifest() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::new(dir.path().join("inject"));
        sink.deliver(&injection()).unwrap();

        let doc = std::fs::read_to_string(sink.document_path("new-1")).unwrap();
        assert_eq!(doc, "## Inherited Memory\n");

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(sink.manifest_path("new-1")).unwrap())
                .unwrap();
        assert_eq!(manifest["newContextId"], "new-1");
        assert_eq!(manifest["oldContextId"], "old-1");
        assert_eq!(manifest["estimatedTokens"], 42);
        assert_eq!(manifest["notify"], true);
        assert!(manifest.get("document").is_none());
    }
}
