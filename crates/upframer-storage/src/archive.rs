//! Zip archiving of frame directories.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{StorageError, StorageResult};

/// Zip every regular file under `source_dir` into `writer`.
///
/// Entry names are relative to `source_dir` with `/` separators, in
/// file-name order. Returns the number of entries written.
pub fn write_zip<W: Write + io::Seek>(source_dir: &Path, writer: W) -> StorageResult<usize> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = 0;

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|e| StorageError::archive_failed(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(name, options)?;
        let mut file = File::open(entry.path())?;
        io::copy(&mut file, &mut zip)?;
        entries += 1;
    }

    zip.finish()?;
    Ok(entries)
}

/// Zip `source_dir` into a new file at `zip_path`.
pub fn create_zip_file(source_dir: &Path, zip_path: &Path) -> StorageResult<usize> {
    let file = File::create(zip_path)?;
    let entries = write_zip(source_dir, file)?;
    debug!("Archived {} files from {} into {}", entries, source_dir.display(), zip_path.display());
    Ok(entries)
}

/// Async wrapper running the archive on the blocking pool.
pub async fn archive_directory(source_dir: &Path, zip_path: &Path) -> StorageResult<usize> {
    if !source_dir.is_dir() {
        return Err(StorageError::archive_failed(format!(
            "{} is not a directory",
            source_dir.display()
        )));
    }

    let source_dir: PathBuf = source_dir.to_path_buf();
    let zip_path: PathBuf = zip_path.to_path_buf();

    tokio::task::spawn_blocking(move || create_zip_file(&source_dir, &zip_path))
        .await
        .map_err(|e| StorageError::archive_failed(format!("archive task panicked: {}", e)))?
}
