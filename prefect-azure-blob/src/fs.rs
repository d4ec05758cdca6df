//! Local filesystem helpers.

use std::path::{Path, PathBuf};

/// A file under a walked directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Absolute or caller-relative path on disk.
    pub path: PathBuf,
    /// Path relative to the walked root, `/`-separated.
    pub relative: String,
}

/// Recursively list the regular files under `root`, sorted by relative path.
pub async fn walk_files(root: &Path) -> std::io::Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = relative_path(root, &path);
                files.push(LocalFile { path, relative });
            }
        }
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Write `data` to `path`, creating parent directories.
pub async fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await
}
