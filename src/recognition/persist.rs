//! JSON documents backing the catalog.
//!
//! Layout inside the catalog store:
//!
//! - `groups/<group>.json`: name, owner, creation time, model fingerprint
//!   and the member list
//! - `entries/<group>/<identity>.json`: the next slot key and every live
//!   slot as `{"<slot>": {image, embedding, uploadedAt}}`
//!
//! Every write goes through [`StorageManager::write`], which replaces the
//! file atomically.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recognition::catalog::{CatalogEntry, ImageRef, Slot};
use crate::recognition::vector::StoredEmbedding;
use crate::storage::StorageManager;

const GROUPS_DIR: &str = "groups";
const ENTRIES_DIR: &str = "entries";

/// Errors that can occur while reading or writing catalog documents.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document {key}: {source}")]
    Malformed {
        key: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDocument {
    pub name: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 of the extractor model name.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDocument {
    #[serde(default)]
    pub next_slot: Slot,
    #[serde(default)]
    pub slots: BTreeMap<String, SlotDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDocument {
    pub image: ImageRef,
    #[serde(default)]
    pub embedding: StoredEmbedding,
    pub uploaded_at: DateTime<Utc>,
}

impl IdentityDocument {
    pub fn from_entries<'a>(
        next_slot: Slot,
        entries: impl IntoIterator<Item = &'a Arc<CatalogEntry>>,
    ) -> Self {
        let slots = entries
            .into_iter()
            .map(|entry| {
                (
                    entry.slot.to_string(),
                    SlotDocument {
                        image: entry.image.clone(),
                        embedding: entry.embedding.clone(),
                        uploaded_at: entry.created_at,
                    },
                )
            })
            .collect();

        Self { next_slot, slots }
    }

    /// Decode the slots of `identity`.
    ///
    /// Returns the entries and the next slot key, which is never lower than
    /// the highest live slot + 1.
    pub fn into_entries(self, identity: &str) -> (Vec<CatalogEntry>, Slot) {
        let mut next_slot = self.next_slot.max(1);
        let mut entries = Vec::with_capacity(self.slots.len());

        for (key, doc) in self.slots {
            let slot = match key.parse::<Slot>() {
                Ok(slot) if slot > 0 => slot,
                _ => {
                    log::warn!("identity '{identity}': ignoring invalid slot key '{key}'");
                    continue;
                }
            };

            if !doc.embedding.is_valid() {
                log::warn!("identity '{identity}': slot {slot} has no usable embedding");
            }

            next_slot = next_slot.max(slot + 1);
            entries.push(CatalogEntry {
                identity: identity.to_string(),
                slot,
                embedding: doc.embedding,
                image: doc.image,
                created_at: doc.uploaded_at,
            });
        }

        entries.sort_by_key(|entry| entry.slot);
        (entries, next_slot)
    }
}

/// A persisted group together with the identity documents of its members.
pub struct LoadedGroup {
    pub group: GroupDocument,
    pub identities: Vec<(String, IdentityDocument)>,
}

/// Reads and writes catalog documents in a [`StorageManager`].
#[derive(Clone)]
pub struct CatalogStore {
    store: Arc<dyn StorageManager>,
}

impl CatalogStore {
    pub fn new(store: Arc<dyn StorageManager>) -> Self {
        Self { store }
    }

    fn group_key(group: &str) -> String {
        format!("{GROUPS_DIR}/{group}.json")
    }

    fn identity_key(group: &str, identity: &str) -> String {
        format!("{ENTRIES_DIR}/{group}/{identity}.json")
    }

    pub fn save_group(&self, doc: &GroupDocument) -> Result<(), PersistError> {
        let key = Self::group_key(&doc.name);
        self.write_json(&key, doc)
    }

    pub fn save_identity(
        &self,
        group: &str,
        identity: &str,
        doc: &IdentityDocument,
    ) -> Result<(), PersistError> {
        let key = Self::identity_key(group, identity);
        self.write_json(&key, doc)
    }

    /// Load every group. Malformed group documents abort the load; a
    /// malformed identity document only drops that identity.
    pub fn load_all(&self) -> Result<Vec<LoadedGroup>, PersistError> {
        let mut names = self.store.list(GROUPS_DIR);
        names.sort();

        let mut loaded = Vec::with_capacity(names.len());
        for file_name in names {
            if !file_name.ends_with(".json") {
                continue;
            }

            let key = format!("{GROUPS_DIR}/{file_name}");
            let group: GroupDocument = self.read_json(&key)?;

            let mut identities = Vec::with_capacity(group.members.len());
            for identity in &group.members {
                let key = Self::identity_key(&group.name, identity);
                if !self.store.exists(&key) {
                    continue;
                }

                match self.read_json::<IdentityDocument>(&key) {
                    Ok(doc) => identities.push((identity.clone(), doc)),
                    Err(err) => log::error!("failed to load {key}: {err}"),
                }
            }

            loaded.push(LoadedGroup { group, identities });
        }

        Ok(loaded)
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PersistError> {
        let data = serde_json::to_vec_pretty(value).map_err(|source| PersistError::Malformed {
            key: key.to_string(),
            source,
        })?;
        self.store.write(key, &data)?;
        Ok(())
    }

    fn read_json<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<T, PersistError> {
        let data = self.store.read(key)?;
        serde_json::from_slice(&data).map_err(|source| PersistError::Malformed {
            key: key.to_string(),
            source,
        })
    }
}
