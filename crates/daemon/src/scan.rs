use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

/// Media file extensions considered for conversion
const MEDIA_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg",
];

/// Marker carried by files this daemon already produced; they are never
/// rescanned as candidates.
const OUTPUT_MARKER: &str = ".hevc.";

/// A media file found on disk: its canonical path plus the platform file
/// identity used to tell renames apart from deletions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub inode: u64,
    pub size_bytes: u64,
}

#[cfg(unix)]
fn inode_of(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
fn inode_of(_metadata: &std::fs::Metadata) -> u64 {
    0
}

fn is_media_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.contains(OUTPUT_MARKER) {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MEDIA_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Scan the include roots for media files, skipping excluded directories.
///
/// Scanning never fails as a whole: unreadable roots and entries are logged
/// and skipped so one bad mount cannot stall the scheduler.
pub fn scan(roots: &[PathBuf], excludes: &[PathBuf]) -> Vec<ScannedFile> {
    let mut files = Vec::new();

    for root in roots {
        if !root.is_dir() {
            warn!("{} is not a directory", root.display());
            continue;
        }

        debug!("Scanning directory: {}", root.display());

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && excludes.contains(&e.path().to_path_buf())));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Error reading directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file() || !is_media_file(path) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!("Failed to stat {}: {}", path.display(), e);
                    continue;
                }
            };

            files.push(ScannedFile {
                path: path.to_path_buf(),
                inode: inode_of(&metadata),
                size_bytes: metadata.len(),
            });
        }
    }

    debug!("Scan complete: {} media files found", files.len());
    files
}
