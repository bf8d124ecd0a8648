//! Bulk import layout: `<dir>/<identity>/<photo>`.
//!
//! Every subdirectory names an identity, every image file inside it
//! becomes one slot. Files are visited in name order so slot keys follow
//! the file names.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct ImportItem {
    pub identity: String,
    pub path: PathBuf,
}

/// Outcome of a bulk import.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub failed: Vec<(String, String)>,
}

fn is_image_file(path: &Path) -> bool {
    path.is_file() && image::ImageFormat::from_path(path).is_ok()
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| !name.starts_with('.'))
        })
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

pub fn plan(dir: &Path) -> std::io::Result<Vec<ImportItem>> {
    let mut items = Vec::new();

    for identity_dir in sorted_entries(dir)? {
        if !identity_dir.is_dir() {
            continue;
        }

        let Some(identity) = identity_dir
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_string())
        else {
            log::warn!("skipping non-utf8 directory {identity_dir:?}");
            continue;
        };

        for path in sorted_entries(&identity_dir)? {
            if is_image_file(&path) {
                items.push(ImportItem {
                    identity: identity.clone(),
                    path,
                });
            }
        }
    }

    Ok(items)
}
