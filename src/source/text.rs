use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;

use crate::processing::tokenizer::{ScanStats, scan_lines};
use crate::utils::error::{Error, Result};
use crate::utils::geometry::Point3;

fn unreadable(path: &Path, source: io::Error) -> Error {
    Error::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    }
}

/// Open `path` for text scanning without reading it. Fails when the file
/// cannot be opened or is not a regular file.
pub fn check_readable(path: &Path) -> Result<u64> {
    let file = File::open(path).map_err(|e| unreadable(path, e))?;
    let metadata = file.metadata().map_err(|e| unreadable(path, e))?;
    if metadata.is_dir() {
        return Err(unreadable(path, io::Error::other("is a directory")));
    }
    Ok(metadata.len())
}

/// Memory-map `path` and scan it as XYZ lines. The map lives only for this call.
pub fn scan_text_file<F>(path: &Path, emit: F) -> Result<ScanStats>
where
    F: FnMut(Point3) -> Result<()>,
{
    if check_readable(path)? == 0 {
        return scan_lines(&[], emit);
    }
    let file = File::open(path).map_err(|e| unreadable(path, e))?;
    // SAFETY: read-only map; the file is assumed not to be truncated while mapped
    let map = unsafe { Mmap::map(&file) }.map_err(|e| unreadable(path, e))?;
    scan_lines(&map, emit)
}
