//! Uploaded file storage under the configured media root.
//!
//! Files are written to `<root>/<category>/<user_id>/<uuid>.<ext>` and the
//! relative path is what the database stores.

use std::io;
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Write `bytes` and return the stored relative path.
    pub async fn save(
        &self,
        category: &str,
        user_id: i64,
        extension: &str,
        bytes: &[u8],
    ) -> io::Result<String> {
        let relative = format!("{category}/{user_id}/{}.{extension}", Uuid::new_v4());
        let full = self.root.join(&relative);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        tracing::debug!(path = %relative, size = bytes.len(), "stored upload");
        Ok(relative)
    }

    pub async fn read(&self, relative: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.resolve(relative)?).await
    }

    /// Remove a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, relative: &str) -> io::Result<()> {
        match tokio::fs::remove_file(self.resolve(relative)?).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    /// Hand `result` back unchanged, first deleting the upload at `relative`
    /// when it is an error. Keeps a failed write from leaving an unreferenced
    /// file behind.
    pub async fn discard_on_error<T, E>(
        &self,
        relative: Option<&str>,
        result: Result<T, E>,
    ) -> Result<T, E> {
        if let (Err(_), Some(path)) = (&result, relative) {
            match self.remove(path).await {
                Ok(()) => tracing::debug!(path, "discarded upload after failed write"),
                Err(err) => tracing::warn!(path, error = %err, "failed to discard upload"),
            }
        }
        result
    }

    fn resolve(&self, relative: &str) -> io::Result<PathBuf> {
        let path = Path::new(relative);
        if path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing media path {relative:?}"),
            ));
        }
        Ok(self.root.join(path))
    }
}

/// `Content-Type` for a stored file, by extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf());
        let rel = store.save("receipts", 5, "pdf", b"%PDF-1.4").await.unwrap();
        assert!(rel.starts_with("receipts/5/"));
        assert!(rel.ends_with(".pdf"));
        assert_eq!(store.read(&rel).await.unwrap(), b"%PDF-1.4");
        store.remove(&rel).await.unwrap();
        store.remove(&rel).await.unwrap();
        assert!(store.read(&rel).await.is_err());
    }

    #[tokio::test]
    async fn failed_write_discards_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf());
        let kept = store.save("documents", 1, "pdf", b"kept").await.unwrap();
        let dropped = store.save("documents", 1, "pdf", b"dropped").await.unwrap();

        let ok: Result<u8, &str> = store.discard_on_error(Some(&kept), Ok(1)).await;
        assert_eq!(ok, Ok(1));
        assert!(store.read(&kept).await.is_ok());

        let failed: Result<u8, &str> = store.discard_on_error(Some(&dropped), Err("conflict")).await;
        assert_eq!(failed, Err("conflict"));
        assert!(store.read(&dropped).await.is_err());
    }

    #[tokio::test]
    async fn traversal_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().to_path_buf());
        let err = store.read("../etc/passwd").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(store.read("/etc/passwd").await.is_err());
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a.PDF"), "application/pdf");
        assert_eq!(content_type_for("a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
