//! Playbook discovery.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// YAML playbooks under `root`, sorted by path for a stable listing.
pub fn discover_playbooks(root: &Path) -> Vec<PathBuf> {
    let mut playbooks: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("yml") | Some("yaml")
            )
        })
        .collect();
    playbooks.sort();
    playbooks
}

/// Display name for a playbook: its path relative to the discovery root.
pub fn friendly_name(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
