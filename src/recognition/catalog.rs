//! In-memory catalog of embeddings, grouped by identity and named group.
//!
//! Each identity owns a monotonic slot counter. Writers for the same
//! identity are serialized by the counter's mutex; readers only ever see
//! fully built `Arc<CatalogEntry>` values, published after the backing
//! document has been written.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recognition::matcher::MatchCandidate;
use crate::recognition::persist::{CatalogStore, GroupDocument, IdentityDocument, PersistError};
use crate::recognition::vector::{EmbeddingVector, StoredEmbedding};
use crate::storage::StorageManager;

/// Slot key of one image within an identity. Starts at 1.
pub type Slot = u64;

const MAX_NAME_LEN: usize = 128;

/// Errors that can occur during catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("group '{0}' not found")]
    GroupNotFound(String),

    #[error("identity '{identity}' not found in group '{group}'")]
    IdentityNotFound { group: String, identity: String },

    #[error("slot {slot} not found for identity '{identity}'")]
    SlotNotFound { identity: String, slot: Slot },

    #[error("group '{0}' already exists")]
    GroupExists(String),

    #[error("identity '{identity}' already belongs to group '{group}'")]
    IdentityInOtherGroup { identity: String, group: String },

    #[error("invalid {kind} name: {name:?}")]
    InvalidName { kind: &'static str, name: String },

    #[error("dimension mismatch: group uses {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("storage error: {0}")]
    Persist(#[from] PersistError),
}

/// Reference to a stored image payload (a key in the image store).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(value: &str) -> Self {
        ImageRef(value.to_string())
    }
}

impl From<String> for ImageRef {
    fn from(value: String) -> Self {
        ImageRef(value)
    }
}

/// One stored image of an identity. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub identity: String,
    pub slot: Slot,
    pub embedding: StoredEmbedding,
    pub image: ImageRef,
    pub created_at: DateTime<Utc>,
}

impl MatchCandidate for CatalogEntry {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn image(&self) -> &ImageRef {
        &self.image
    }

    fn embedding(&self) -> &StoredEmbedding {
        &self.embedding
    }
}

/// Read-only view of a group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub name: String,
    pub owner: String,
    pub model: Option<String>,
    pub members: Vec<String>,
    pub entries: usize,
    pub created_at: DateTime<Utc>,
}

struct IdentitySlots {
    /// Next slot key to hand out. Held for the whole write.
    next_slot: Mutex<Slot>,
    entries: RwLock<BTreeMap<Slot, Arc<CatalogEntry>>>,
}

impl IdentitySlots {
    fn new(next_slot: Slot, entries: BTreeMap<Slot, Arc<CatalogEntry>>) -> Self {
        Self {
            next_slot: Mutex::new(next_slot),
            entries: RwLock::new(entries),
        }
    }
}

struct GroupState {
    name: String,
    owner: String,
    created_at: DateTime<Utc>,
    model: Option<String>,
    members: RwLock<Vec<String>>,
    identities: RwLock<HashMap<String, Arc<IdentitySlots>>>,
    /// Length shared by the group's live vectors, `None` while it has none.
    /// Writers hold it for the whole add or remove.
    dimensions: Mutex<Option<usize>>,
}

impl GroupState {
    fn document(&self, members: &[String]) -> GroupDocument {
        GroupDocument {
            name: self.name.clone(),
            owner: self.owner.clone(),
            created_at: self.created_at,
            model: self.model.clone(),
            members: members.to_vec(),
        }
    }

    fn slots(&self, identity: &str) -> Option<Arc<IdentitySlots>> {
        read(&self.identities).get(identity).cloned()
    }

    fn slots_or_insert(&self, identity: &str) -> Arc<IdentitySlots> {
        write(&self.identities)
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(IdentitySlots::new(1, BTreeMap::new())))
            .clone()
    }

    fn has_vectors(&self) -> bool {
        read(&self.identities).values().any(|slots| {
            read(&slots.entries)
                .values()
                .any(|entry| entry.embedding.is_valid())
        })
    }

    fn entry_count(&self) -> usize {
        read(&self.identities)
            .values()
            .map(|slots| read(&slots.entries).len())
            .sum()
    }
}

/// Catalog of every group, optionally backed by a [`CatalogStore`].
pub struct Catalog {
    store: Option<CatalogStore>,
    groups: RwLock<HashMap<String, Arc<GroupState>>>,
    /// identity -> group it is a member of
    membership: Mutex<HashMap<String, String>>,
}

impl Catalog {
    /// Catalog without persistence.
    pub fn in_memory() -> Self {
        Self {
            store: None,
            groups: RwLock::new(HashMap::new()),
            membership: Mutex::new(HashMap::new()),
        }
    }

    /// Open a catalog persisted in `store`, loading every group.
    pub fn open(store: Arc<dyn StorageManager>) -> Result<Self, CatalogError> {
        let store = CatalogStore::new(store);
        let loaded = store.load_all()?;

        let mut groups = HashMap::with_capacity(loaded.len());
        let mut membership: HashMap<String, String> = HashMap::new();

        for loaded_group in loaded {
            let doc = loaded_group.group;
            let mut members = Vec::with_capacity(doc.members.len());
            for identity in &doc.members {
                match membership.get(identity) {
                    Some(other) => log::warn!(
                        "identity '{identity}' listed in '{}' and '{other}', keeping '{other}'",
                        doc.name
                    ),
                    None => {
                        membership.insert(identity.clone(), doc.name.clone());
                        members.push(identity.clone());
                    }
                }
            }

            let mut loaded_identities = Vec::with_capacity(loaded_group.identities.len());
            for (identity, identity_doc) in loaded_group.identities {
                if !members.contains(&identity) {
                    continue;
                }
                let (entries, next_slot) = identity_doc.into_entries(&identity);
                loaded_identities.push((identity, entries, next_slot));
            }

            let dimensions = settle_dimensions(&doc.name, &mut loaded_identities);

            let mut identities = HashMap::new();
            for (identity, entries, next_slot) in loaded_identities {
                let entries = entries
                    .into_iter()
                    .map(|entry| (entry.slot, Arc::new(entry)))
                    .collect();
                identities.insert(identity, Arc::new(IdentitySlots::new(next_slot, entries)));
            }

            log::info!(
                "loaded group '{}' with {} members",
                doc.name,
                members.len()
            );

            let state = GroupState {
                name: doc.name.clone(),
                owner: doc.owner,
                created_at: doc.created_at,
                model: doc.model,
                members: RwLock::new(members),
                identities: RwLock::new(identities),
                dimensions: Mutex::new(dimensions),
            };
            groups.insert(doc.name, Arc::new(state));
        }

        Ok(Self {
            store: Some(store),
            groups: RwLock::new(groups),
            membership: Mutex::new(membership),
        })
    }

    fn group(&self, name: &str) -> Result<Arc<GroupState>, CatalogError> {
        read(&self.groups)
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::GroupNotFound(name.to_string()))
    }

    /// Create an empty group owned by `owner`.
    ///
    /// `model` fingerprints the extractor that will produce the group's
    /// embeddings.
    pub fn create_group(
        &self,
        name: &str,
        owner: &str,
        model: Option<String>,
    ) -> Result<GroupSummary, CatalogError> {
        validate_name("group", name)?;
        validate_name("owner", owner)?;

        let mut groups = write(&self.groups);
        if groups.contains_key(name) {
            return Err(CatalogError::GroupExists(name.to_string()));
        }

        let state = GroupState {
            name: name.to_string(),
            owner: owner.to_string(),
            created_at: Utc::now(),
            model,
            members: RwLock::new(Vec::new()),
            identities: RwLock::new(HashMap::new()),
            dimensions: Mutex::new(None),
        };

        if let Some(store) = &self.store {
            store.save_group(&state.document(&[]))?;
        }

        let summary = summarize(&state);
        groups.insert(name.to_string(), Arc::new(state));
        log::info!("created group '{name}' owned by '{owner}'");

        Ok(summary)
    }

    pub fn groups(&self) -> Vec<GroupSummary> {
        let mut summaries: Vec<_> = read(&self.groups)
            .values()
            .map(|state| summarize(state))
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn group_summary(&self, group: &str) -> Result<GroupSummary, CatalogError> {
        self.group(group).map(|state| summarize(&state))
    }

    pub fn members(&self, group: &str) -> Result<Vec<String>, CatalogError> {
        let state = self.group(group)?;
        let members = read(&state.members).clone();
        Ok(members)
    }

    /// Every entry of every identity in `group`. Order is members, then
    /// slots, but callers must not rely on it.
    pub fn list_entries(&self, group: &str) -> Result<Vec<Arc<CatalogEntry>>, CatalogError> {
        let state = self.group(group)?;
        let members = read(&state.members).clone();

        let mut entries = Vec::new();
        for identity in members {
            if let Some(slots) = state.slots(&identity) {
                entries.extend(read(&slots.entries).values().cloned());
            }
        }

        Ok(entries)
    }

    /// Store a new image of `identity` under the next slot key.
    ///
    /// Registers `identity` as a member of `group` first if needed.
    pub fn add_entry(
        &self,
        group: &str,
        identity: &str,
        image: ImageRef,
        embedding: EmbeddingVector,
    ) -> Result<Arc<CatalogEntry>, CatalogError> {
        let state = self.group(group)?;
        validate_name("identity", identity)?;

        // Held for the whole write: the group's dimension only changes
        // together with its set of live vectors.
        let mut dimensions = lock(&state.dimensions);
        let got = embedding.dimensions();
        if let Some(expected) = *dimensions {
            if expected != got {
                return Err(CatalogError::DimensionMismatch { expected, got });
            }
        }

        self.ensure_member(&state, identity)?;
        let entry = self.commit_entry(&state, identity, image, embedding)?;
        *dimensions = Some(got);

        Ok(entry)
    }

    fn commit_entry(
        &self,
        state: &GroupState,
        identity: &str,
        image: ImageRef,
        embedding: EmbeddingVector,
    ) -> Result<Arc<CatalogEntry>, CatalogError> {
        let slots = state.slots_or_insert(identity);
        let mut next_slot = lock(&slots.next_slot);

        let slot = *next_slot;
        let entry = Arc::new(CatalogEntry {
            identity: identity.to_string(),
            slot,
            embedding: embedding.into(),
            image,
            created_at: Utc::now(),
        });

        if let Some(store) = &self.store {
            let current = read(&slots.entries);
            let doc = IdentityDocument::from_entries(
                slot + 1,
                current.values().chain(std::iter::once(&entry)),
            );
            store.save_identity(&state.name, identity, &doc)?;
        }

        write(&slots.entries).insert(slot, entry.clone());
        *next_slot = slot + 1;

        log::debug!("group '{}': added {identity}#{slot}", state.name);
        Ok(entry)
    }

    fn ensure_member(&self, state: &GroupState, identity: &str) -> Result<(), CatalogError> {
        let mut membership = lock(&self.membership);
        match membership.get(identity) {
            Some(owner) if owner == &state.name => return Ok(()),
            Some(owner) => {
                return Err(CatalogError::IdentityInOtherGroup {
                    identity: identity.to_string(),
                    group: owner.clone(),
                })
            }
            None => {}
        }

        let mut members = write(&state.members);
        let mut updated = members.clone();
        updated.push(identity.to_string());

        if let Some(store) = &self.store {
            store.save_group(&state.document(&updated))?;
        }

        *members = updated;
        membership.insert(identity.to_string(), state.name.clone());
        Ok(())
    }

    /// Delete one slot. Remaining slot keys are left untouched and the
    /// removed key is never handed out again.
    pub fn remove_entry(
        &self,
        group: &str,
        identity: &str,
        slot: Slot,
    ) -> Result<Arc<CatalogEntry>, CatalogError> {
        let state = self.group(group)?;
        let mut dimensions = lock(&state.dimensions);
        let slots = state
            .slots(identity)
            .ok_or_else(|| CatalogError::IdentityNotFound {
                group: group.to_string(),
                identity: identity.to_string(),
            })?;

        let next_slot = lock(&slots.next_slot);

        let removed = read(&slots.entries).get(&slot).cloned().ok_or_else(|| {
            CatalogError::SlotNotFound {
                identity: identity.to_string(),
                slot,
            }
        })?;

        if let Some(store) = &self.store {
            let current = read(&slots.entries);
            let doc = IdentityDocument::from_entries(
                *next_slot,
                current.values().filter(|entry| entry.slot != slot),
            );
            store.save_identity(&state.name, identity, &doc)?;
        }

        write(&slots.entries).remove(&slot);
        log::debug!("group '{}': removed {identity}#{slot}", state.name);

        if !state.has_vectors() {
            *dimensions = None;
        }

        Ok(removed)
    }
}

fn summarize(state: &GroupState) -> GroupSummary {
    GroupSummary {
        name: state.name.clone(),
        owner: state.owner.clone(),
        model: state.model.clone(),
        members: read(&state.members).clone(),
        entries: state.entry_count(),
        created_at: state.created_at,
    }
}

/// Pick the dimension shared by most loaded vectors (the first one seen on
/// a tie) and mark every other vector as mismatched.
fn settle_dimensions(
    group: &str,
    identities: &mut [(String, Vec<CatalogEntry>, Slot)],
) -> Option<usize> {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for (_, entries, _) in identities.iter() {
        for entry in entries {
            if let StoredEmbedding::Vector(vector) = &entry.embedding {
                match counts.iter_mut().find(|(dims, _)| *dims == vector.dimensions()) {
                    Some((_, count)) => *count += 1,
                    None => counts.push((vector.dimensions(), 1)),
                }
            }
        }
    }

    let mut dominant: Option<(usize, usize)> = None;
    for (dims, count) in counts {
        if dominant.map_or(true, |(_, best)| count > best) {
            dominant = Some((dims, count));
        }
    }
    let expected = dominant.map(|(dims, _)| dims)?;

    for (identity, entries, _) in identities.iter_mut() {
        for entry in entries.iter_mut() {
            let vector = match &entry.embedding {
                StoredEmbedding::Vector(vector) if vector.dimensions() != expected => {
                    vector.clone()
                }
                _ => continue,
            };

            log::warn!(
                "group '{group}': {identity}#{} has {} dimensions, expected {expected}, excluding it from matching",
                entry.slot,
                vector.dimensions()
            );
            entry.embedding = StoredEmbedding::Mismatched { vector, expected };
        }
    }

    Some(expected)
}

/// Names become path components in the store.
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), CatalogError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('.')
        && !name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control());

    if valid {
        Ok(())
    } else {
        Err(CatalogError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

// Every mutation is a single insert/remove performed after the document is
// written, so a poisoned lock still guards consistent data.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f32]) -> EmbeddingVector {
        EmbeddingVector::new(values.to_vec()).unwrap()
    }

    fn catalog_with_group() -> Catalog {
        let catalog = Catalog::in_memory();
        catalog.create_group("pond", "ranger", None).unwrap();
        catalog
    }

    #[test]
    fn test_slots_start_at_one_and_increase() {
        let catalog = catalog_with_group();

        let first = catalog
            .add_entry("pond", "shelly", "a.webp".into(), vector(&[1.0, 0.0]))
            .unwrap();
        let second = catalog
            .add_entry("pond", "shelly", "b.webp".into(), vector(&[0.0, 1.0]))
            .unwrap();

        assert_eq!(first.slot, 1);
        assert_eq!(second.slot, 2);
    }

    #[test]
    fn test_removed_slot_not_reused() {
        let catalog = catalog_with_group();
        catalog
            .add_entry("pond", "shelly", "a.webp".into(), vector(&[1.0, 0.0]))
            .unwrap();
        catalog
            .add_entry("pond", "shelly", "b.webp".into(), vector(&[0.0, 1.0]))
            .unwrap();

        catalog.remove_entry("pond", "shelly", 1).unwrap();
        let third = catalog
            .add_entry("pond", "shelly", "c.webp".into(), vector(&[1.0, 1.0]))
            .unwrap();
        assert_eq!(third.slot, 3);

        // Removing the highest slot must not roll the counter back either.
        catalog.remove_entry("pond", "shelly", 3).unwrap();
        let fourth = catalog
            .add_entry("pond", "shelly", "d.webp".into(), vector(&[1.0, 1.0]))
            .unwrap();
        assert_eq!(fourth.slot, 4);

        let slots: Vec<_> = catalog
            .list_entries("pond")
            .unwrap()
            .iter()
            .map(|e| e.slot)
            .collect();
        assert_eq!(slots, vec![2, 4]);
    }

    #[test]
    fn test_slots_are_per_identity() {
        let catalog = catalog_with_group();
        catalog
            .add_entry("pond", "shelly", "a.webp".into(), vector(&[1.0, 0.0]))
            .unwrap();
        let other = catalog
            .add_entry("pond", "crush", "b.webp".into(), vector(&[1.0, 0.0]))
            .unwrap();
        assert_eq!(other.slot, 1);
        assert_eq!(catalog.members("pond").unwrap(), vec!["shelly", "crush"]);
    }

    #[test]
    fn test_unknown_group() {
        let catalog = Catalog::in_memory();
        assert!(matches!(
            catalog.list_entries("nowhere"),
            Err(CatalogError::GroupNotFound(_))
        ));
        assert!(matches!(
            catalog.add_entry("nowhere", "shelly", "a".into(), vector(&[1.0])),
            Err(CatalogError::GroupNotFound(_))
        ));
        assert!(matches!(
            catalog.remove_entry("nowhere", "shelly", 1),
            Err(CatalogError::GroupNotFound(_))
        ));
    }

    #[test]
    fn test_remove_unknown_identity_or_slot() {
        let catalog = catalog_with_group();
        assert!(matches!(
            catalog.remove_entry("pond", "ghost", 1),
            Err(CatalogError::IdentityNotFound { .. })
        ));

        catalog
            .add_entry("pond", "shelly", "a.webp".into(), vector(&[1.0]))
            .unwrap();
        assert!(matches!(
            catalog.remove_entry("pond", "shelly", 9),
            Err(CatalogError::SlotNotFound { slot: 9, .. })
        ));
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let catalog = catalog_with_group();
        assert!(matches!(
            catalog.create_group("pond", "someone", None),
            Err(CatalogError::GroupExists(_))
        ));
    }

    #[test]
    fn test_identity_belongs_to_one_group() {
        let catalog = catalog_with_group();
        catalog.create_group("river", "ranger", None).unwrap();
        catalog
            .add_entry("pond", "shelly", "a.webp".into(), vector(&[1.0]))
            .unwrap();

        let result = catalog.add_entry("river", "shelly", "b.webp".into(), vector(&[1.0]));
        assert!(matches!(
            result,
            Err(CatalogError::IdentityInOtherGroup { ref group, .. }) if group == "pond"
        ));
        assert!(catalog.members("river").unwrap().is_empty());
    }

    #[test]
    fn test_empty_identity_stays_listed() {
        let catalog = catalog_with_group();
        catalog
            .add_entry("pond", "shelly", "a.webp".into(), vector(&[1.0]))
            .unwrap();
        catalog.remove_entry("pond", "shelly", 1).unwrap();

        assert_eq!(catalog.members("pond").unwrap(), vec!["shelly"]);
        assert!(catalog.list_entries("pond").unwrap().is_empty());
    }

    #[test]
    fn test_group_dimension_enforced() {
        let catalog = catalog_with_group();
        catalog
            .add_entry("pond", "shelly", "a.webp".into(), vector(&[1.0, 0.0]))
            .unwrap();

        let result = catalog.add_entry("pond", "crush", "b.webp".into(), vector(&[1.0, 0.0, 0.0]));
        assert!(matches!(
            result,
            Err(CatalogError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn test_dimension_released_when_group_empties() {
        let catalog = catalog_with_group();
        catalog
            .add_entry("pond", "shelly", "a.webp".into(), vector(&[1.0, 0.0]))
            .unwrap();
        catalog.remove_entry("pond", "shelly", 1).unwrap();

        let entry = catalog
            .add_entry("pond", "shelly", "b.webp".into(), vector(&[1.0, 0.0, 0.0]))
            .unwrap();
        assert_eq!(entry.slot, 2);

        let result = catalog.add_entry("pond", "crush", "c.webp".into(), vector(&[1.0, 0.0]));
        assert!(matches!(
            result,
            Err(CatalogError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_failed_first_add_claims_no_dimension() {
        let catalog = catalog_with_group();
        catalog.create_group("river", "ranger", None).unwrap();
        catalog
            .add_entry("river", "crush", "a.webp".into(), vector(&[1.0]))
            .unwrap();

        let result = catalog.add_entry("pond", "crush", "b.webp".into(), vector(&[1.0, 0.0]));
        assert!(matches!(result, Err(CatalogError::IdentityInOtherGroup { .. })));

        catalog
            .add_entry("pond", "shelly", "c.webp".into(), vector(&[1.0, 0.0, 0.0]))
            .unwrap();
    }

    #[test]
    fn test_invalid_names() {
        let catalog = Catalog::in_memory();
        for name in ["", "../etc", "a/b", ".hidden", "tab\there"] {
            assert!(
                matches!(
                    catalog.create_group(name, "ranger", None),
                    Err(CatalogError::InvalidName { .. })
                ),
                "{name:?}"
            );
        }

        catalog.create_group("pond", "ranger", None).unwrap();
        assert!(matches!(
            catalog.add_entry("pond", "a/b", "x".into(), vector(&[1.0])),
            Err(CatalogError::InvalidName { kind: "identity", .. })
        ));
    }

    #[test]
    fn test_group_summary() {
        let catalog = catalog_with_group();
        catalog
            .add_entry("pond", "shelly", "a.webp".into(), vector(&[1.0]))
            .unwrap();
        catalog
            .add_entry("pond", "shelly", "b.webp".into(), vector(&[1.0]))
            .unwrap();

        let summaries = catalog.groups();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].owner, "ranger");
        assert_eq!(summaries[0].entries, 2);
        assert_eq!(summaries[0].members, vec!["shelly"]);
    }

    #[test]
    fn test_concurrent_adds_get_distinct_slots() {
        let catalog = Arc::new(catalog_with_group());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let catalog = catalog.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .map(|j| {
                            catalog
                                .add_entry(
                                    "pond",
                                    "shelly",
                                    format!("{i}-{j}.webp").into(),
                                    vector(&[1.0, i as f32]),
                                )
                                .unwrap()
                                .slot
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut slots: Vec<Slot> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        slots.sort();

        assert_eq!(slots, (1..=80).collect::<Vec<_>>());
    }
}
