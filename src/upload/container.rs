//! Container Peeker: best-effort top-level listing of ZIP-family archives.
//!
//! Purely advisory — a finalized upload is never rejected because peeking
//! failed, so every error path here collapses to `None` rather than
//! propagating. Grounded in the same `zip::ZipArchive` usage the EPUB
//! resource extractor elsewhere in this codebase uses to walk an archive's
//! entries via `archive.by_index(i)` / `entry.name()`.

use std::path::Path;

use zip::ZipArchive;

/// Archives we bother attempting to peek into, by extension.
const PEEKABLE_EXTENSIONS: &[&str] = &["zip", "epub", "cbz"];

/// Never list more than this many entries, so a pathological archive with
/// millions of entries can't blow up a finalize response.
const MAX_ENTRIES: usize = 50;

/// Recognized by either of two independent signals derived from the
/// filename alone (the file's actual bytes are only trusted once
/// `ZipArchive::new` succeeds): the extension allowlist, or a guessed MIME
/// type that names one of the ZIP-family types.
pub fn is_peekable(filename: &str) -> bool {
    let by_extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| PEEKABLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);

    let by_mime = matches!(
        mime_guess::from_path(filename).first_raw(),
        Some("application/zip" | "application/epub+zip" | "application/vnd.comicbook+zip")
    );

    by_extension || by_mime
}

/// Returns the archive's top-level entry names, up to `MAX_ENTRIES`, or
/// `None` if the file isn't a recognized container or couldn't be opened
/// as one.
pub async fn peek(path: &Path, filename: &str) -> Option<Vec<String>> {
    if !is_peekable(filename) {
        return None;
    }
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || peek_blocking(&path))
        .await
        .ok()
        .flatten()
}

fn peek_blocking(path: &Path) -> Option<Vec<String>> {
    let file = std::fs::File::open(path).ok()?;
    let mut archive = ZipArchive::new(file).ok()?;

    let mut names = Vec::new();
    for i in 0..archive.len() {
        if names.len() >= MAX_ENTRIES {
            break;
        }
        let entry = archive.by_index(i).ok()?;
        let name = entry.name();
        if !name.contains('/') || name.ends_with('/') {
            names.push(name.to_string());
        }
    }
    Some(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use zip::write::{SimpleFileOptions, ZipWriter};

    #[test]
    fn recognizes_peekable_extensions_case_insensitively() {
        assert!(is_peekable("archive.zip"));
        assert!(is_peekable("book.EPUB"));
        assert!(is_peekable("comic.cbz"));
        assert!(!is_peekable("video.mp4"));
        assert!(!is_peekable("no_extension"));
    }

    #[tokio::test]
    async fn peeks_only_top_level_entries_and_directory_markers() {
        let file = NamedTempFile::new().unwrap();
        {
            let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
            let mut writer = ZipWriter::new(file.reopen().unwrap());
            writer.start_file("mimetype", options).unwrap();
            writer.write_all(b"application/epub+zip").unwrap();
            writer.add_directory("META-INF/", options).unwrap();
            writer.start_file("META-INF/container.xml", options).unwrap();
            writer.write_all(b"<container/>").unwrap();
            writer.start_file("OEBPS/content.opf", options).unwrap();
            writer.write_all(b"<package/>").unwrap();
            writer.finish().unwrap();
        }

        let entries = peek(file.path(), "book.epub").await.unwrap();

        // Top-level file and the directory marker survive; the nested
        // non-directory entries (`META-INF/container.xml`, `OEBPS/content.opf`)
        // are excluded.
        assert_eq!(entries, vec!["mimetype", "META-INF/"]);
    }

    #[tokio::test]
    async fn non_archive_bytes_yield_none_instead_of_erroring() {
        let file = NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), b"not a zip file").await.unwrap();

        assert!(peek(file.path(), "fake.zip").await.is_none());
    }

    #[tokio::test]
    async fn unrecognized_extension_is_skipped_without_opening_the_file() {
        let file = NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), b"whatever").await.unwrap();

        assert!(peek(file.path(), "video.mp4").await.is_none());
    }
}
