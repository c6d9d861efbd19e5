//! Source adapters for PhotoLoop: enumerating web albums and local
//! directories into inventories of candidate media items, and acquiring their
//! bytes.
//!
//! The actual DOM traversal of a web album belongs to an external
//! [`RemoteAlbumInspector`] implementation; this crate only defines that
//! contract and everything around it.

mod inspector;
mod local;
mod remote;

use std::{fs, io::Read, path::Path};

pub use inspector::{
    InspectStage, InspectorError, RemoteAlbumInspector, RemoteItem, RemoteItemMetadata,
    UnavailableInspector,
};
pub use local::{classify_extension, path_from_file_uri, scan_directory};
pub use remote::{
    cache_file_name, download_url, full_resolution_url, sized_url, video_download_url, HttpFetcher,
    MediaFetcher,
};

use photoloop_state::{MediaKind, SourceType};

/// One candidate media item reported by a source during enumeration.
#[derive(Debug, Clone)]
pub struct InventoryItem {
    pub uri: String,
    pub kind: MediaKind,
    pub source_type: SourceType,
    /// Label of the source this item came from, used to scope catalog entries.
    pub album_label: String,
    /// Caption the source happened to surface during bulk enumeration.
    pub caption: Option<String>,
}

/// An error that can occur while enumerating or acquiring media.
#[derive(Debug)]
pub enum SourceError {
    /// The album inspector failed; the whole source fails with it.
    Inspector(InspectorError),
    /// An HTTP request failed or returned a non-success status.
    Http(reqwest::Error),
    /// A filesystem operation failed.
    Io(std::io::Error),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Inspector(e) => write!(f, "inspector error: {e}"),
            SourceError::Http(e) => write!(f, "http error: {e}"),
            SourceError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<InspectorError> for SourceError {
    fn from(e: InspectorError) -> Self {
        SourceError::Inspector(e)
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        SourceError::Http(e)
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        SourceError::Io(e)
    }
}

/// A result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// MD5 of a file's contents as lowercase hex. 128 bits is plenty for change
/// detection and as an integrity signal; this is not a security boundary.
pub fn content_hash(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }
    Ok(format!("{:x}", context.compute()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        fs::write(&path, b"some image bytes").unwrap();
        let first = content_hash(&path).unwrap();
        let second = content_hash(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);

        fs::write(&path, b"different bytes").unwrap();
        assert_ne!(content_hash(&path).unwrap(), first);
    }
}
