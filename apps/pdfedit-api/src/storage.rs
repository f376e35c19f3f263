//! On-disk storage for uploaded and edited documents

use std::io;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use pdfedit_core::{Session, SessionId};
use regex::Regex;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref UNSAFE_CHARS: Regex = Regex::new(r"[^A-Za-z0-9_.\-]").unwrap();
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Returns an empty string when nothing usable is left.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let spaced = WHITESPACE.replace_all(base.trim(), "_");
    let safe = UNSAFE_CHARS.replace_all(&spaced, "");
    safe.trim_matches(|c: char| c == '.' || c == '_').to_string()
}

#[derive(Debug, Clone)]
pub struct FileStore {
    upload_dir: PathBuf,
    edited_dir: PathBuf,
}

impl FileStore {
    /// Create the store, making both directories if needed.
    pub fn new(upload_dir: impl Into<PathBuf>, edited_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let store = Self {
            upload_dir: upload_dir.into(),
            edited_dir: edited_dir.into(),
        };
        std::fs::create_dir_all(&store.upload_dir)?;
        std::fs::create_dir_all(&store.edited_dir)?;
        Ok(store)
    }

    pub fn upload_path(&self, id: &SessionId, filename: &str) -> PathBuf {
        self.upload_dir.join(format!("{}_{}", id, filename))
    }

    pub fn edited_path(&self, id: &SessionId, edited_filename: &str) -> PathBuf {
        self.edited_dir.join(format!("{}_{}", id, edited_filename))
    }

    pub async fn save_upload(&self, id: &SessionId, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.upload_path(id, filename);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    pub async fn save_edited(
        &self,
        id: &SessionId,
        edited_filename: &str,
        bytes: &[u8],
    ) -> io::Result<PathBuf> {
        let path = self.edited_path(id, edited_filename);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    pub async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    /// Delete a file, ignoring one that is already gone.
    pub async fn discard(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to delete file"),
        }
    }

    /// Delete everything stored for sessions that no longer exist.
    pub async fn discard_sessions(&self, sessions: &[Session]) {
        for session in sessions {
            self.discard(&session.source_path).await;
            let edited = format!("edited_{}", session.filename);
            self.discard(&self.edited_path(&session.id, &edited)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("my  annual report.pdf"), "my_annual_report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd.pdf"), "passwd.pdf");
        assert_eq!(sanitize_filename("C:\\Users\\me\\doc.pdf"), "doc.pdf");
        assert_eq!(sanitize_filename("résumé (final).pdf"), "rsum_final.pdf");
        assert_eq!(sanitize_filename("..hidden.pdf"), "hidden.pdf");
        assert_eq!(sanitize_filename("/"), "");
    }

    #[tokio::test]
    async fn test_paths_are_prefixed_by_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("up"), dir.path().join("out")).unwrap();
        let id = SessionId::from("abc");

        let path = store.save_upload(&id, "a.pdf", b"%PDF").await.unwrap();
        assert_eq!(path, dir.path().join("up").join("abc_a.pdf"));
        assert_eq!(store.read(&path).await.unwrap(), b"%PDF");

        let edited = store.save_edited(&id, "edited_a.pdf", b"x").await.unwrap();
        assert_eq!(edited, dir.path().join("out").join("abc_edited_a.pdf"));

        store.discard(&path).await;
        store.discard(&path).await;
        assert!(!path.exists());
    }

    proptest! {
        #[test]
        fn sanitized_names_are_single_safe_components(name in ".{0,40}") {
            let clean = sanitize_filename(&name);
            prop_assert!(clean
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')));
            prop_assert!(!clean.starts_with('.') && !clean.starts_with('_'));
            prop_assert!(!clean.ends_with('.') && !clean.ends_with('_'));
        }
    }
}
