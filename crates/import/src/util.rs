use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use bizscan_core::document::{base_name, listing_key};

/// Directory entries in listing order (document, page index, file name), so
/// every platform walks them the same way and input order matches batch order.
pub fn sorted_entries(dir: &Path) -> io::Result<Vec<(PathBuf, bool)>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let is_dir = entry.file_type()?.is_dir();
        entries.push((entry.path(), is_dir));
    }
    entries.sort_by_cached_key(|(path, _)| listing_key(path));
    Ok(entries)
}

/// Stems of every entry already present in a normalized directory.
pub fn identity_set(dir: &Path) -> io::Result<HashSet<String>> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .map(|(path, _)| base_name(&path))
        .collect())
}

/// Create every listed directory that does not exist yet.
pub fn ensure_dirs<P: AsRef<Path>>(dirs: &[P]) -> io::Result<()> {
    for dir in dirs {
        std::fs::create_dir_all(dir.as_ref())?;
    }
    Ok(())
}
