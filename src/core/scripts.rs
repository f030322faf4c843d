use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

/// Extensions the shell treats as runnable scripts.
pub const SCRIPT_EXTENSIONS: [&str; 5] = ["py", "js", "ts", "sh", "sol"];

/// A script found on disk. Never cached; every listing walks the tree again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEntry {
    pub path: PathBuf,
    pub extension: String,
    pub size_bytes: u64,
}

impl ScriptEntry {
    /// Build an entry for an arbitrary existing file.
    pub fn from_path(path: &Path) -> Option<Self> {
        let metadata = path.metadata().ok()?;
        if !metadata.is_file() {
            return None;
        }
        Some(Self {
            path: path.to_path_buf(),
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size_bytes: metadata.len(),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn stem(&self) -> Option<String> {
        self.path.file_stem().map(|s| s.to_string_lossy().into_owned())
    }

    /// Path relative to `base`, or the full path when it lies elsewhere.
    pub fn relative_to(&self, base: &Path) -> PathBuf {
        self.path
            .strip_prefix(base)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| self.path.clone())
    }

    /// `512 B` below one KiB, `1.5 KB` above.
    pub fn display_size(&self) -> String {
        if self.size_bytes < 1024 {
            format!("{} B", self.size_bytes)
        } else {
            format!("{:.1} KB", self.size_bytes as f64 / 1024.0)
        }
    }
}

fn is_script(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SCRIPT_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

/// Every script under `root`, root-level files first, then by path.
pub fn find_scripts(root: &Path) -> Vec<ScriptEntry> {
    let mut scripts: Vec<ScriptEntry> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_script(entry.path()))
        .filter_map(|entry| ScriptEntry::from_path(entry.path()))
        .collect();

    scripts.sort_by(|a, b| {
        let depth_a = a.path.components().count();
        let depth_b = b.path.components().count();
        depth_a.cmp(&depth_b).then_with(|| a.path.cmp(&b.path))
    });

    debug!(root = %root.display(), count = scripts.len(), "scripts enumerated");
    scripts
}
