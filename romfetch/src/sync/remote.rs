//! Remote side of a reconciliation pass.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use tracing::{debug, warn};

use crate::provider::{ProviderError, RemoteEntry, RemoteFolder, RemoteProvider};

/// Working copy of one remote folder's listing, keyed by filename.
///
/// When the provider reports the same name twice, the first entry in listing
/// order wins and later ones are remembered in `duplicates`.
#[derive(Debug, Clone, Default)]
pub struct RemoteFiles {
    entries: BTreeMap<String, RemoteEntry>,
    duplicates: Vec<String>,
}

impl RemoteFiles {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = RemoteEntry>,
    {
        let mut files = Self::default();
        for entry in entries {
            match files.entries.entry(entry.name.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
                Entry::Occupied(kept) => {
                    warn!(
                        name = %entry.name,
                        kept_id = %kept.get().id,
                        dropped_id = %entry.id,
                        "duplicate remote filename, keeping the oldest entry"
                    );
                    files.duplicates.push(entry.name);
                }
            }
        }
        files
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<RemoteEntry> {
        self.entries.remove(name)
    }

    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    pub fn into_parts(self) -> (BTreeMap<String, RemoteEntry>, Vec<String>) {
        (self.entries, self.duplicates)
    }
}

pub async fn list_remote_files<P>(
    provider: &P,
    folder: &RemoteFolder,
) -> Result<RemoteFiles, ProviderError>
where
    P: RemoteProvider + ?Sized,
{
    let entries = provider.list_children(&folder.id).await?;
    debug!(folder = %folder.name, entries = entries.len(), "listed remote folder");
    Ok(RemoteFiles::from_entries(entries))
}
