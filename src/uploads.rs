//! Upload storage for images and attachments embedded in articles.
//!
//! Files are stored under `uploads/` with ULID names so concurrent uploads
//! never collide, keeping the original extension when it looks sane and
//! falling back to content sniffing otherwise.

use crate::eid::Eid;
use crate::storage::{BackendLocal, StorageManager};
use anyhow::{bail, Result};
use serde::Serialize;

/// Hard cap on a single uploaded file.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    /// Stored file name (ULID + extension)
    pub file_name: String,
    /// Path the file is served from
    pub url: String,
    pub size: usize,
}

/// Persist an uploaded file and return where it can be fetched.
pub fn store_upload(store: &BackendLocal, original_name: &str, data: &[u8]) -> Result<UploadedFile> {
    if data.is_empty() {
        bail!("uploaded file is empty");
    }
    if data.len() > MAX_UPLOAD_BYTES {
        bail!("uploaded file exceeds {MAX_UPLOAD_BYTES} bytes");
    }

    let ext = sanitized_extension(original_name)
        .or_else(|| infer::get(data).map(|kind| kind.extension().to_string()));

    let file_name = match ext {
        Some(ext) => format!("{}.{ext}", Eid::new()),
        None => Eid::new().to_string(),
    };

    store.write(&file_name, data)?;

    Ok(UploadedFile {
        url: format!("/api/file/{file_name}"),
        file_name,
        size: data.len(),
    })
}

/// Extension from the client-supplied name, only if short and alphanumeric.
/// Anything suspicious is ignored in favor of sniffing.
fn sanitized_extension(original_name: &str) -> Option<String> {
    let ext = original_name.rsplit_once('.')?.1;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, BackendLocal) {
        let dir = tempfile::tempdir().unwrap();
        let store = BackendLocal::new(dir.path().to_str().unwrap()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_store_upload_keeps_extension() {
        let (_dir, store) = temp_store();

        let uploaded = store_upload(&store, "Notes.PDF", b"%PDF-1.4 ...").unwrap();
        assert!(uploaded.file_name.ends_with(".pdf"));
        assert_eq!(uploaded.url, format!("/api/file/{}", uploaded.file_name));
        assert_eq!(uploaded.size, 12);
        assert!(store.exists(&uploaded.file_name));
    }

    #[test]
    fn test_store_upload_sniffs_when_name_useless() {
        let (_dir, store) = temp_store();

        // real PNG magic bytes, nonsense filename
        let png = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];
        let uploaded = store_upload(&store, "file", &png).unwrap();
        assert!(uploaded.file_name.ends_with(".png"));
    }

    #[test]
    fn test_store_upload_rejects_empty() {
        let (_dir, store) = temp_store();
        assert!(store_upload(&store, "a.txt", b"").is_err());
    }

    #[test]
    fn test_sanitized_extension() {
        assert_eq!(sanitized_extension("a.pdf"), Some("pdf".to_string()));
        assert_eq!(sanitized_extension("a.PDF"), Some("pdf".to_string()));
        assert_eq!(sanitized_extension("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(sanitized_extension("no-extension"), None);
        assert_eq!(sanitized_extension("dots..."), None);
        assert_eq!(sanitized_extension("weird.e x t"), None);
        assert_eq!(sanitized_extension("toolong.extension123"), None);
    }

    #[test]
    fn test_unique_names_for_same_input() {
        let (_dir, store) = temp_store();
        let a = store_upload(&store, "a.txt", b"same").unwrap();
        let b = store_upload(&store, "a.txt", b"same").unwrap();
        assert_ne!(a.file_name, b.file_name);
    }
}
