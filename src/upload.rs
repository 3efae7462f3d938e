use bytes::Bytes;
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use url::Url;

/// Route prefix the stored files are served under.
pub const UPLOADS_ROUTE: &str = "uploads";

const FALLBACK_NAME: &str = "upload";

#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub filename: String,
    pub url: String,
}

/// Writes uploaded images to a local directory and builds the public URL
/// each one is served back from.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    base_url: Url,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, base_url: Url) -> Self {
        Self {
            dir: dir.into(),
            base_url,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Single attempt, no dedup: same millisecond and same name overwrite.
    pub async fn save(&self, original_name: &str, data: Bytes) -> io::Result<StoredUpload> {
        let filename = stored_filename(Utc::now().timestamp_millis(), original_name);
        let url = self.url_for(&filename)?;

        tokio::fs::write(self.dir.join(&filename), &data).await?;
        tracing::info!(filename = %filename, bytes = data.len(), "upload stored");

        Ok(StoredUpload { filename, url })
    }

    pub fn url_for(&self, filename: &str) -> io::Result<String> {
        self.base_url
            .join(&format!("{}/{}", UPLOADS_ROUTE, filename))
            .map(String::from)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
    }
}

/// `<millis>-<name>`, where name is the last path component of the client's
/// filename with anything outside `[A-Za-z0-9._-]` replaced by `_`.
pub fn stored_filename(millis: i64, original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let clean: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let clean = clean.trim_start_matches('.');

    if clean.is_empty() {
        format!("{}-{}", millis, FALLBACK_NAME)
    } else {
        format!("{}-{}", millis, clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> UploadStore {
        UploadStore::new(dir, Url::parse("http://192.168.3.3:3000/").unwrap())
    }

    #[test]
    fn stored_filename_prefixes_timestamp() {
        assert_eq!(stored_filename(1700000000123, "treino.jpg"), "1700000000123-treino.jpg");
    }

    #[test]
    fn stored_filename_strips_directories() {
        assert_eq!(stored_filename(1, "../../etc/passwd"), "1-passwd");
        assert_eq!(stored_filename(1, "C:\\fotos\\perna.png"), "1-perna.png");
    }

    #[test]
    fn stored_filename_replaces_unsafe_characters() {
        assert_eq!(stored_filename(1, "dia de perna #1?.jpg"), "1-dia_de_perna__1_.jpg");
        assert_eq!(stored_filename(1, "pão.jpg"), "1-p_o.jpg");
    }

    #[test]
    fn stored_filename_falls_back_for_empty_names() {
        assert_eq!(stored_filename(1, ""), "1-upload");
        assert_eq!(stored_filename(1, "fotos/"), "1-upload");
        assert_eq!(stored_filename(1, ".."), "1-upload");
    }

    #[test]
    fn url_for_joins_under_uploads_route() {
        let tmp = tempfile::tempdir().unwrap();
        let url = store(tmp.path()).url_for("1-a.jpg").unwrap();
        assert_eq!(url, "http://192.168.3.3:3000/uploads/1-a.jpg");

        let nested = UploadStore::new(
            tmp.path(),
            Url::parse("https://cdn.example.com/treinos/").unwrap(),
        );
        assert_eq!(
            nested.url_for("1-a.jpg").unwrap(),
            "https://cdn.example.com/treinos/uploads/1-a.jpg"
        );
    }

    #[tokio::test]
    async fn save_writes_file_and_returns_url() {
        let tmp = tempfile::tempdir().unwrap();
        let stored = store(tmp.path())
            .save("treino.jpg", Bytes::from_static(b"jpeg bytes"))
            .await
            .unwrap();

        assert!(stored.filename.ends_with("-treino.jpg"));
        assert!(stored.url.ends_with(&format!("/uploads/{}", stored.filename)));
        let written = std::fs::read(tmp.path().join(&stored.filename)).unwrap();
        assert_eq!(written, b"jpeg bytes");
    }

    #[tokio::test]
    async fn different_names_never_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        let a = store.save("a.jpg", Bytes::from_static(b"a")).await.unwrap();
        let b = store.save("b.jpg", Bytes::from_static(b"b")).await.unwrap();

        assert_ne!(a.filename, b.filename);
        assert_eq!(std::fs::read(tmp.path().join(&a.filename)).unwrap(), b"a");
        assert_eq!(std::fs::read(tmp.path().join(&b.filename)).unwrap(), b"b");
    }

    #[tokio::test]
    async fn save_into_missing_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(&tmp.path().join("missing"));
        assert!(store.save("a.jpg", Bytes::from_static(b"a")).await.is_err());
    }
}
