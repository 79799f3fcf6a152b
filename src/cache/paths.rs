// Cache path utilities.
// Resolves the cache directory and maps store keys to filesystem paths.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Name of the pending-transaction journal inside the cache directory.
pub const JOURNAL_FILE: &str = "journal.json";

/// Get the base cache directory (~/.cache/commit-streak on Linux).
pub fn cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "commit-streak").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Path of the file holding `key`.
pub fn key_path(root: &Path, key: &str) -> PathBuf {
    root.join("keys").join(format!("{}.json", sanitize_name(key)))
}

/// Path of the transaction journal.
pub fn journal_path(root: &Path) -> PathBuf {
    root.join(JOURNAL_FILE)
}

/// Sanitize a name for use in filesystem paths.
/// Replaces problematic characters with underscores.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '.' => '_',
            _ => c,
        })
        .collect()
}
