use std::path::{Path, PathBuf};

use photoloop_state::{MediaKind, SourceType};
use walkdir::WalkDir;

use crate::InventoryItem;

const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "heic", "heif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];

/// Classify a file by extension, case-insensitively, against the fixed
/// allowlists. Returns `None` for anything that is not displayable media.
pub fn classify_extension(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Photo)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Extract the filesystem path from a `file://` URI.
pub fn path_from_file_uri(uri: &str) -> Option<PathBuf> {
    uri.strip_prefix("file://").map(PathBuf::from)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

/// Recursively scan a local directory for media files, yielding each match as
/// a `file://` URI. Entries whose names begin with `.` are skipped. Symbolic
/// links are followed; the walker's ancestor check prevents link cycles.
///
/// A missing or unreadable directory is a warning, not an error: it yields an
/// empty inventory so the rest of the sync can proceed.
pub fn scan_directory(path: &Path, album_label: &str) -> Vec<InventoryItem> {
    let mut items = Vec::new();

    if !path.is_dir() {
        tracing::warn!("local directory does not exist: {}", path.display());
        return items;
    }

    tracing::info!("scanning local directory: {}", path.display());
    let walker = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("error accessing {}: {e}", path.display());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(kind) = classify_extension(entry.path()) else {
            continue;
        };
        let absolute = match std::path::absolute(entry.path()) {
            Ok(absolute) => absolute,
            Err(e) => {
                tracing::warn!("error resolving {}: {e}", entry.path().display());
                continue;
            }
        };
        items.push(InventoryItem {
            uri: format!("file://{}", absolute.display()),
            kind,
            source_type: SourceType::Local,
            album_label: album_label.to_string(),
            caption: None,
        });
    }

    tracing::info!("found {} media files in {}", items.len(), path.display());
    items
}
