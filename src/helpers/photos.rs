//! ZIP extraction for bulk photo import. Image entries are matched to
//! students by filename stem ("12.jpg" -> roll number "12").

use std::io::{Cursor, Read};
use std::path::Path;

use thiserror::Error;
use zip::ZipArchive;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

#[derive(Error, Debug)]
pub enum PhotoArchiveError {
    #[error("could not read archive: {0}")]
    Archive(String),
}

/// One image entry pulled out of the uploaded archive.
#[derive(Debug, Clone)]
pub struct ArchiveImage {
    /// Full entry name inside the archive
    pub file_name: String,
    /// Lowercased filename stem used for roll-number matching
    pub stem: String,
    pub bytes: Vec<u8>,
}

/// Extract image entries from a ZIP. Returns the images plus the names of
/// non-image entries that were skipped; directories are ignored outright.
pub fn extract_images(bytes: &[u8]) -> Result<(Vec<ArchiveImage>, Vec<String>), PhotoArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| PhotoArchiveError::Archive(e.to_string()))?;

    let mut images = Vec::new();
    let mut skipped = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| PhotoArchiveError::Archive(e.to_string()))?;

        if entry.is_dir() {
            continue;
        }

        let file_name = entry.name().to_string();
        let Some(stem) = image_stem(&file_name) else {
            skipped.push(file_name);
            continue;
        };

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| PhotoArchiveError::Archive(e.to_string()))?;

        images.push(ArchiveImage {
            file_name,
            stem,
            bytes,
        });
    }

    Ok((images, skipped))
}

/// Filename stem of an image entry, or `None` when the extension is not an
/// image type. Nested paths match on the final component.
fn image_stem(entry_name: &str) -> Option<String> {
    let path = Path::new(entry_name);
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?.trim().to_ascii_lowercase();
    (!stem.is_empty()).then_some(stem)
}
