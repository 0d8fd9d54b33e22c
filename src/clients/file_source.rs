//! Post source backed by JSON files on disk.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::PostSource;
use crate::error::ClientError;
use crate::scoring::Post;

/// Reads batches stored as JSON arrays of posts under a root directory.
///
/// A batch reference is a relative path such as `reddit/tech/2024-05-01.json`.
/// References that escape the root are treated as missing batches.
#[derive(Debug, Clone)]
pub struct FilePostSource {
    root: PathBuf,
}

impl FilePostSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, batch_ref: &str) -> Option<PathBuf> {
        let relative = Path::new(batch_ref);
        let confined = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if batch_ref.is_empty() || !confined {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl PostSource for FilePostSource {
    async fn fetch(&self, batch_ref: &str) -> Result<Vec<Post>, ClientError> {
        let path = self
            .resolve(batch_ref)
            .ok_or_else(|| ClientError::BatchNotFound(batch_ref.to_string()))?;

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ClientError::BatchNotFound(batch_ref.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let posts: Vec<Post> = serde_json::from_str(&raw)?;
        debug!(batch = %batch_ref, posts = posts.len(), "Loaded post batch");
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BATCH: &str = r#"[
        {"title": "Kubernetes 1.30 released", "selftext": "notes", "author": "a",
         "score": 100, "numComments": 10, "createdAt": "2024-05-01T10:00:00Z"},
        {"title": "Ask: kubernetes on bare metal", "score": 5, "num_comments": 1,
         "created_at": "2024-05-01T11:00:00Z"}
    ]"#;

    #[tokio::test]
    async fn test_fetch_reads_batch() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("reddit/tech")).unwrap();
        std::fs::write(dir.path().join("reddit/tech/batch.json"), BATCH).unwrap();

        let source = FilePostSource::new(dir.path());
        let posts = source.fetch("reddit/tech/batch.json").await.unwrap();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].num_comments, 10);
        assert_eq!(posts[1].selftext, "");
    }

    #[tokio::test]
    async fn test_missing_batch() {
        let dir = TempDir::new().unwrap();
        let source = FilePostSource::new(dir.path());

        let err = source.fetch("nope.json").await.unwrap_err();
        assert!(matches!(err, ClientError::BatchNotFound(ref r) if r == "nope.json"));
    }

    #[tokio::test]
    async fn test_reference_cannot_escape_root() {
        let dir = TempDir::new().unwrap();
        let source = FilePostSource::new(dir.path().join("inner"));

        let err = source.fetch("../outside.json").await.unwrap_err();
        assert!(matches!(err, ClientError::BatchNotFound(_)));

        let err = source.fetch("").await.unwrap_err();
        assert!(matches!(err, ClientError::BatchNotFound(_)));
    }

    #[tokio::test]
    async fn test_malformed_batch() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();

        let source = FilePostSource::new(dir.path());
        let err = source.fetch("bad.json").await.unwrap_err();
        assert!(matches!(err, ClientError::Json(_)));
    }
}
