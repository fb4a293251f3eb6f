//! Local side of a reconciliation pass.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use tracing::warn;

/// Filenames present in one local folder at the moment it was listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSnapshot {
    names: BTreeSet<String>,
}

impl LocalSnapshot {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for LocalSnapshot {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// True iff `path` exists and is a directory (symlinks are followed).
pub async fn path_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

/// Lists every entry of `dir`, subdirectories included. Hidden files are not
/// filtered. Names that are not valid UTF-8 can never match a remote name and
/// are left out of the snapshot.
pub async fn list_local_files(dir: &Path) -> io::Result<LocalSnapshot> {
    let mut names = BTreeSet::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        match entry.file_name().into_string() {
            Ok(name) => {
                names.insert(name);
            }
            Err(raw) => {
                warn!(dir = %dir.display(), name = ?raw, "skipping non UTF-8 local name");
            }
        }
    }
    Ok(LocalSnapshot { names })
}
