//! Render history: a bounded list of render records, newest first, mirrored
//! to a key-value store under two keys (the records and a favorite-id index).

use std::{
    collections::HashSet,
    str::FromStr,
    sync::{Arc, PoisonError, RwLock},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::render::RenderType;
use crate::storage::{KeyValueStore, StorageError};

pub const HISTORY_KEY: &str = "@puml_viewer_history";
pub const FAVORITES_KEY: &str = "@puml_viewer_favorites";
pub const MAX_HISTORY_ITEMS: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub puml_code: String,
    pub render_id: String,
    pub render_type: RenderType,
    /// Epoch milliseconds.
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Caller-supplied fields of a new record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewHistoryItem {
    pub puml_code: String,
    pub render_id: String,
    pub render_type: RenderType,
    pub preview_url: Option<String>,
    pub title: Option<String>,
}

/// Partial update over the mutable fields of a record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryUpdate {
    /// `Some(None)` clears the title.
    pub title: Option<Option<String>>,
}

impl HistoryUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(Some(title.into())),
        }
    }

    pub fn clear_title() -> Self {
        Self {
            title: Some(None),
        }
    }

    fn apply(&self, item: &mut HistoryItem) {
        if let Some(title) = &self.title {
            item.title = normalize_title(title.clone());
        }
    }
}

fn normalize_title(title: Option<String>) -> Option<String> {
    title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    pub png: usize,
    pub svg: usize,
    pub text: usize,
}

impl TypeCounts {
    pub fn get(&self, kind: RenderType) -> usize {
        match kind {
            RenderType::Png => self.png,
            RenderType::Svg => self.svg,
            RenderType::Text => self.text,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total: usize,
    pub by_type: TypeCounts,
    pub favorites: usize,
}

impl Statistics {
    pub fn from_items(items: &[HistoryItem]) -> Self {
        let mut stats = Statistics {
            total: items.len(),
            ..Statistics::default()
        };
        for item in items {
            match item.render_type {
                RenderType::Png => stats.by_type.png += 1,
                RenderType::Svg => stats.by_type.svg += 1,
                RenderType::Text => stats.by_type.text += 1,
            }
            if item.is_favorite {
                stats.favorites += 1;
            }
        }
        stats
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HistoryFilter {
    #[default]
    All,
    Favorites,
    Type(RenderType),
}

impl HistoryFilter {
    pub fn matches(&self, item: &HistoryItem) -> bool {
        match self {
            HistoryFilter::All => true,
            HistoryFilter::Favorites => item.is_favorite,
            HistoryFilter::Type(t) => item.render_type == *t,
        }
    }
}

impl FromStr for HistoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(HistoryFilter::All),
            "favorites" | "favorite" | "fav" => Ok(HistoryFilter::Favorites),
            other => other
                .parse::<RenderType>()
                .map(HistoryFilter::Type)
                .map_err(|e| e.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("history json: {0}")]
    Json(#[from] serde_json::Error),
}

/// The authoritative in-memory history for this process.
///
/// Readers see the last published snapshot. Mutations are serialized: each
/// one copies the snapshot, changes the copy, persists it and only then
/// publishes it, so a failed write leaves memory matching durable state.
pub struct HistoryStore<S> {
    storage: S,
    items: RwLock<Arc<Vec<HistoryItem>>>,
    write: Mutex<()>,
}

impl<S: KeyValueStore> HistoryStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            items: RwLock::new(Arc::new(Vec::new())),
            write: Mutex::new(()),
        }
    }

    /// Construct and load in one step.
    pub async fn open(storage: S) -> Self {
        let store = Self::new(storage);
        store.load().await;
        store
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Read persisted records into memory. Unreadable or corrupt storage is
    /// logged and leaves the current state in place.
    pub async fn load(&self) {
        let _guard = self.write.lock().await;
        match read_persisted(&self.storage).await {
            Ok(items) => {
                info!(target: "history", "loaded {} history items", items.len());
                self.publish(items);
            }
            Err(e) => {
                warn!(target: "history", "failed to load history: {}", e);
            }
        }
    }

    pub fn history(&self) -> Vec<HistoryItem> {
        self.snapshot().as_ref().clone()
    }

    pub fn favorites(&self) -> Vec<HistoryItem> {
        self.search(HistoryFilter::Favorites, "")
    }

    pub fn get(&self, id: &str) -> Option<HistoryItem> {
        self.snapshot().iter().find(|h| h.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Filter, then match `query` case-insensitively against source and title.
    pub fn search(&self, filter: HistoryFilter, query: &str) -> Vec<HistoryItem> {
        let query = query.trim().to_lowercase();
        self.snapshot()
            .iter()
            .filter(|h| filter.matches(h))
            .filter(|h| {
                query.is_empty()
                    || h.puml_code.to_lowercase().contains(&query)
                    || h
                        .title
                        .as_deref()
                        .is_some_and(|t| t.to_lowercase().contains(&query))
            })
            .cloned()
            .collect()
    }

    pub fn statistics(&self) -> Statistics {
        Statistics::from_items(&self.snapshot())
    }

    /// Record a new render. An existing entry for the same render id is
    /// replaced and the new one goes to the front.
    pub async fn add(&self, new: NewHistoryItem) -> Result<HistoryItem, HistoryError> {
        let item = HistoryItem {
            id: Uuid::new_v4().to_string(),
            puml_code: new.puml_code,
            render_id: new.render_id,
            render_type: new.render_type,
            created_at: now_millis(),
            preview_url: new.preview_url,
            is_favorite: false,
            title: normalize_title(new.title),
        };
        let created = item.clone();
        self.commit("add", move |items| {
            items.retain(|h| h.render_id != item.render_id);
            items.insert(0, item);
            items.truncate(MAX_HISTORY_ITEMS);
            Some(())
        })
        .await?;
        Ok(created)
    }

    /// Returns whether an entry was removed.
    pub async fn remove(&self, id: &str) -> Result<bool, HistoryError> {
        let removed = self
            .commit("remove", |items| {
                let pos = items.iter().position(|h| h.id == id)?;
                items.remove(pos);
                Some(())
            })
            .await?;
        Ok(removed.is_some())
    }

    pub async fn clear(&self) -> Result<(), HistoryError> {
        // Always written, so a clear also overwrites payloads that failed to load.
        self.commit("clear", |items| {
            items.clear();
            Some(())
        })
        .await?;
        Ok(())
    }

    /// Returns the new flag, or `None` when no entry has this id.
    pub async fn toggle_favorite(&self, id: &str) -> Result<Option<bool>, HistoryError> {
        self.commit("toggle_favorite", |items| {
            let item = items.iter_mut().find(|h| h.id == id)?;
            item.is_favorite = !item.is_favorite;
            Some(item.is_favorite)
        })
        .await
    }

    /// Returns the updated record, or `None` when no entry has this id.
    pub async fn update(
        &self,
        id: &str,
        update: HistoryUpdate,
    ) -> Result<Option<HistoryItem>, HistoryError> {
        self.commit("update", |items| {
            let item = items.iter_mut().find(|h| h.id == id)?;
            update.apply(item);
            Some(item.clone())
        })
        .await
    }

    fn snapshot(&self) -> Arc<Vec<HistoryItem>> {
        Arc::clone(&self.items.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, items: Vec<HistoryItem>) {
        *self.items.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(items);
    }

    // `f` returns None when nothing matched; nothing is written in that case.
    async fn commit<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Vec<HistoryItem>) -> Option<T>,
    ) -> Result<Option<T>, HistoryError> {
        let _guard = self.write.lock().await;
        let previous = self.snapshot();
        let mut working = previous.as_ref().clone();
        let Some(out) = f(&mut working) else {
            debug!(target: "history", "{}: no matching entry", op);
            return Ok(None);
        };
        if let Err(e) = self.persist(&previous, &working).await {
            warn!(target: "history", "{} not applied, persist failed: {}", op, e);
            return Err(e);
        }
        debug!(target: "history", "{}: {} items persisted", op, working.len());
        self.publish(working);
        Ok(Some(out))
    }

    async fn persist(
        &self,
        previous: &[HistoryItem],
        next: &[HistoryItem],
    ) -> Result<(), HistoryError> {
        let history_json = serde_json::to_string(next)?;
        let favorites_json = serde_json::to_string(&favorite_ids(next))?;
        let previous_json = serde_json::to_string(previous)?;

        self.storage.set(HISTORY_KEY, &history_json).await?;
        if let Err(e) = self.storage.set(FAVORITES_KEY, &favorites_json).await {
            // The record list already holds `next`; put the old one back.
            if let Err(restore) = self.storage.set(HISTORY_KEY, &previous_json).await {
                warn!(target: "history", "could not restore previous history: {}", restore);
            }
            return Err(e.into());
        }
        Ok(())
    }
}

fn favorite_ids(items: &[HistoryItem]) -> Vec<&str> {
    items
        .iter()
        .filter(|h| h.is_favorite)
        .map(|h| h.id.as_str())
        .collect()
}

async fn read_persisted<S: KeyValueStore>(storage: &S) -> Result<Vec<HistoryItem>, HistoryError> {
    let Some(raw) = storage.get(HISTORY_KEY).await? else {
        return Ok(Vec::new());
    };
    let mut items: Vec<HistoryItem> = serde_json::from_str(&raw)?;

    // The favorite-id index wins when it is readable; otherwise the flags
    // embedded in the records stand.
    match storage.get(FAVORITES_KEY).await {
        Ok(Some(raw)) => match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => {
                let ids: HashSet<String> = ids.into_iter().collect();
                for item in &mut items {
                    item.is_favorite = ids.contains(&item.id);
                }
            }
            Err(e) => warn!(target: "history", "ignoring corrupt favorites index: {}", e),
        },
        Ok(None) => debug!(target: "history", "no favorites index, using embedded flags"),
        Err(e) => warn!(target: "history", "favorites index unreadable: {}", e),
    }

    let mut seen_ids = HashSet::new();
    let mut seen_renders = HashSet::new();
    items.retain(|h| seen_ids.insert(h.id.clone()) && seen_renders.insert(h.render_id.clone()));
    items.truncate(MAX_HISTORY_ITEMS);
    Ok(items)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::storage::MemoryStore;

    // Memory store that can fail reads or writes per key and yields on every
    // write so concurrent callers interleave.
    #[derive(Default)]
    struct TestStore {
        inner: MemoryStore,
        fail_history: AtomicBool,
        fail_favorites: AtomicBool,
        fail_history_reads: AtomicBool,
        fail_favorites_reads: AtomicBool,
        writes: AtomicUsize,
    }

    impl TestStore {
        fn fail_on(&self, key: &str, fail: bool) {
            match key {
                HISTORY_KEY => self.fail_history.store(fail, Ordering::SeqCst),
                _ => self.fail_favorites.store(fail, Ordering::SeqCst),
            }
        }

        fn fail_reads_on(&self, key: &str, fail: bool) {
            match key {
                HISTORY_KEY => self.fail_history_reads.store(fail, Ordering::SeqCst),
                _ => self.fail_favorites_reads.store(fail, Ordering::SeqCst),
            }
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    impl KeyValueStore for TestStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            let fail = match key {
                HISTORY_KEY => self.fail_history_reads.load(Ordering::SeqCst),
                _ => self.fail_favorites_reads.load(Ordering::SeqCst),
            };
            if fail {
                return Err(StorageError::Unavailable(format!("read of {key} refused")));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            tokio::task::yield_now().await;
            let fail = match key {
                HISTORY_KEY => self.fail_history.load(Ordering::SeqCst),
                _ => self.fail_favorites.load(Ordering::SeqCst),
            };
            if fail {
                return Err(StorageError::Unavailable(format!("write to {key} refused")));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key).await
        }
    }

    fn new_item(render_id: &str, kind: RenderType) -> NewHistoryItem {
        NewHistoryItem {
            puml_code: format!("@startuml\nA -> B : {render_id}\n@enduml"),
            render_id: render_id.to_string(),
            render_type: kind,
            preview_url: kind
                .has_preview_url()
                .then(|| format!("https://example.test/api/v1/render/{kind}/{render_id}/raw")),
            title: None,
        }
    }

    fn store() -> HistoryStore<Arc<TestStore>> {
        HistoryStore::new(Arc::new(TestStore::default()))
    }

    #[tokio::test]
    async fn scenario_add_favorite_replace_remove() {
        let store = store();
        let a = store.add(new_item("r1", RenderType::Png)).await.unwrap();
        assert_eq!(
            store.statistics(),
            Statistics {
                total: 1,
                by_type: TypeCounts { png: 1, svg: 0, text: 0 },
                favorites: 0,
            }
        );

        assert_eq!(store.toggle_favorite(&a.id).await.unwrap(), Some(true));
        assert_eq!(store.favorites().len(), 1);
        assert_eq!(store.favorites()[0].id, a.id);

        let mut b_new = new_item("r1", RenderType::Svg);
        b_new.title = Some("second".into());
        let b = store.add(b_new).await.unwrap();
        let history = store.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], b);
        assert_eq!(history[0].render_type, RenderType::Svg);
        assert!(!history[0].is_favorite);

        assert!(store.remove(&b.id).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn add_never_exceeds_capacity_and_evicts_oldest() {
        let store = store();
        for i in 0..(MAX_HISTORY_ITEMS + 10) {
            store
                .add(new_item(&format!("r{i}"), RenderType::Text))
                .await
                .unwrap();
            assert!(store.len() <= MAX_HISTORY_ITEMS);
        }
        let history = store.history();
        assert_eq!(history.len(), MAX_HISTORY_ITEMS);
        assert_eq!(history[0].render_id, format!("r{}", MAX_HISTORY_ITEMS + 9));
        assert!(history.iter().all(|h| h.render_id != "r0"));
        assert!(history.iter().all(|h| h.render_id != "r9"));
        assert!(history.iter().any(|h| h.render_id == "r10"));
    }

    #[tokio::test]
    async fn replacement_moves_to_front() {
        let store = store();
        for r in ["r1", "r2", "r3"] {
            store.add(new_item(r, RenderType::Png)).await.unwrap();
        }
        let replaced = store.add(new_item("r1", RenderType::Text)).await.unwrap();
        let history = store.history();
        let renders: Vec<_> = history.iter().map(|h| h.render_id.as_str()).collect();
        assert_eq!(renders, ["r1", "r3", "r2"]);
        assert_eq!(history[0].id, replaced.id);
        assert_eq!(history.iter().filter(|h| h.render_id == "r1").count(), 1);
    }

    #[tokio::test]
    async fn favorites_track_flags() {
        let store = store();
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(store.add(new_item(&format!("r{i}"), RenderType::Png)).await.unwrap().id);
        }
        store.toggle_favorite(&ids[1]).await.unwrap();
        store.toggle_favorite(&ids[3]).await.unwrap();
        store.toggle_favorite(&ids[3]).await.unwrap();
        store.toggle_favorite(&ids[4]).await.unwrap();

        let expected: Vec<_> = store.history().into_iter().filter(|h| h.is_favorite).collect();
        assert_eq!(store.favorites(), expected);
        assert_eq!(expected.len(), 2);
        assert_eq!(store.statistics().favorites, 2);
    }

    #[tokio::test]
    async fn clear_empties_and_persists() {
        let store = store();
        store.add(new_item("r1", RenderType::Png)).await.unwrap();
        store.add(new_item("r2", RenderType::Svg)).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.history().is_empty());
        assert_eq!(store.statistics().total, 0);
        assert_eq!(
            store.storage().get(HISTORY_KEY).await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn missing_ids_are_noops_without_writes() {
        let store = store();
        store.add(new_item("r1", RenderType::Png)).await.unwrap();
        let before = store.history();
        let writes = store.storage().writes();

        assert!(!store.remove("nope").await.unwrap());
        assert_eq!(store.toggle_favorite("nope").await.unwrap(), None);
        assert_eq!(
            store.update("nope", HistoryUpdate::title("x")).await.unwrap(),
            None
        );
        assert_eq!(store.history(), before);
        assert_eq!(store.storage().writes(), writes);
    }

    #[tokio::test]
    async fn update_sets_and_clears_title() {
        let store = store();
        let a = store.add(new_item("r1", RenderType::Png)).await.unwrap();
        let updated = store
            .update(&a.id, HistoryUpdate::title("  Sequence  "))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title.as_deref(), Some("Sequence"));
        assert_eq!(updated.render_id, a.render_id);
        assert_eq!(updated.created_at, a.created_at);

        let cleared = store
            .update(&a.id, HistoryUpdate::clear_title())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cleared.title, None);
        assert_eq!(store.get(&a.id).unwrap().title, None);
    }

    #[tokio::test]
    async fn reload_restores_collection_with_favorites() {
        let backing = Arc::new(TestStore::default());
        let store = HistoryStore::new(backing.clone());
        let a = store.add(new_item("r1", RenderType::Png)).await.unwrap();
        store.add(new_item("r2", RenderType::Text)).await.unwrap();
        store.toggle_favorite(&a.id).await.unwrap();
        store.update(&a.id, HistoryUpdate::title("pinned")).await.unwrap();
        let before = store.history();

        let reopened = HistoryStore::open(backing).await;
        assert_eq!(reopened.history(), before);
        assert!(reopened.get(&a.id).unwrap().is_favorite);
    }

    #[tokio::test]
    async fn favorites_index_is_source_of_truth_when_present() {
        let backing = Arc::new(TestStore::default());
        let store = HistoryStore::new(backing.clone());
        let a = store.add(new_item("r1", RenderType::Png)).await.unwrap();
        let b = store.add(new_item("r2", RenderType::Png)).await.unwrap();
        store.toggle_favorite(&a.id).await.unwrap();

        backing
            .set(FAVORITES_KEY, &serde_json::to_string(&[b.id.as_str(), "ghost"]).unwrap())
            .await
            .unwrap();
        let reopened = HistoryStore::open(backing).await;
        assert!(!reopened.get(&a.id).unwrap().is_favorite);
        assert!(reopened.get(&b.id).unwrap().is_favorite);
        assert_eq!(reopened.favorites().len(), 1);
    }

    #[tokio::test]
    async fn missing_or_corrupt_index_falls_back_to_embedded_flags() {
        let backing = Arc::new(TestStore::default());
        let store = HistoryStore::new(backing.clone());
        let a = store.add(new_item("r1", RenderType::Png)).await.unwrap();
        store.toggle_favorite(&a.id).await.unwrap();

        backing.remove(FAVORITES_KEY).await.unwrap();
        let reopened = HistoryStore::open(backing.clone()).await;
        assert!(reopened.get(&a.id).unwrap().is_favorite);

        backing.set(FAVORITES_KEY, "{not json").await.unwrap();
        let reopened = HistoryStore::open(backing).await;
        assert!(reopened.get(&a.id).unwrap().is_favorite);
    }

    #[tokio::test]
    async fn corrupt_history_loads_empty() {
        let backing = Arc::new(TestStore::default());
        backing.set(HISTORY_KEY, "[{\"id\": 1").await.unwrap();
        let store = HistoryStore::open(backing).await;
        assert!(store.is_empty());

        store.clear().await.unwrap();
        assert_eq!(
            store.storage().get(HISTORY_KEY).await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn unreadable_history_loads_empty() {
        let backing = Arc::new(TestStore::default());
        let seeded = HistoryStore::new(backing.clone());
        seeded.add(new_item("r1", RenderType::Png)).await.unwrap();

        backing.fail_reads_on(HISTORY_KEY, true);
        let store = HistoryStore::open(backing.clone()).await;
        assert!(store.is_empty());
        assert_eq!(store.statistics().total, 0);

        store.clear().await.unwrap();
        backing.fail_reads_on(HISTORY_KEY, false);
        assert!(HistoryStore::open(backing).await.is_empty());
    }

    #[tokio::test]
    async fn unreadable_favorites_index_keeps_embedded_flags() {
        let backing = Arc::new(TestStore::default());
        let seeded = HistoryStore::new(backing.clone());
        let a = seeded.add(new_item("r1", RenderType::Png)).await.unwrap();
        let b = seeded.add(new_item("r2", RenderType::Svg)).await.unwrap();
        seeded.toggle_favorite(&a.id).await.unwrap();

        backing.fail_reads_on(FAVORITES_KEY, true);
        let store = HistoryStore::open(backing).await;
        assert_eq!(store.len(), 2);
        assert_eq!(store.favorites().len(), 1);
        assert_eq!(store.favorites()[0].id, a.id);
        assert!(!store.get(&b.id).unwrap().is_favorite);
    }

    #[tokio::test]
    async fn load_accepts_records_without_optional_fields() {
        let backing = Arc::new(TestStore::default());
        let raw = r#"[{"id":"1-abc","pumlCode":"@startuml\n@enduml","renderId":"x","renderType":"text","createdAt":1700000000000}]"#;
        backing.set(HISTORY_KEY, raw).await.unwrap();
        let store = HistoryStore::open(backing).await;
        let item = store.get("1-abc").unwrap();
        assert_eq!(item.render_type, RenderType::Text);
        assert!(!item.is_favorite);
        assert_eq!(item.preview_url, None);
    }

    #[tokio::test]
    async fn failed_history_write_rolls_back() {
        let backing = Arc::new(TestStore::default());
        let store = HistoryStore::new(backing.clone());
        let a = store.add(new_item("r1", RenderType::Png)).await.unwrap();
        let before = store.history();

        backing.fail_on(HISTORY_KEY, true);
        assert!(store.add(new_item("r2", RenderType::Png)).await.is_err());
        assert!(store.toggle_favorite(&a.id).await.is_err());
        assert!(store.remove(&a.id).await.is_err());
        assert!(store.update(&a.id, HistoryUpdate::title("renamed")).await.is_err());
        assert!(store.clear().await.is_err());
        assert_eq!(store.history(), before);

        backing.fail_on(HISTORY_KEY, false);
        let reopened = HistoryStore::open(backing).await;
        assert_eq!(reopened.history(), before);
    }

    #[tokio::test]
    async fn failed_favorites_write_restores_previous_history() {
        let backing = Arc::new(TestStore::default());
        let store = HistoryStore::new(backing.clone());
        let a = store.add(new_item("r1", RenderType::Png)).await.unwrap();
        let before = store.history();

        backing.fail_on(FAVORITES_KEY, true);
        let err = store.add(new_item("r2", RenderType::Svg)).await.unwrap_err();
        assert!(matches!(err, HistoryError::Storage(_)));
        assert!(store.toggle_favorite(&a.id).await.is_err());
        assert_eq!(store.history(), before);

        backing.fail_on(FAVORITES_KEY, false);
        let reopened = HistoryStore::open(backing).await;
        assert_eq!(reopened.history(), before);
    }

    #[tokio::test]
    async fn concurrent_mutations_do_not_lose_updates() {
        let store = store();
        let a = store.add(new_item("r1", RenderType::Png)).await.unwrap();
        let b = store.add(new_item("r2", RenderType::Png)).await.unwrap();

        let (ra, rb, rc) = tokio::join!(
            store.toggle_favorite(&a.id),
            store.toggle_favorite(&b.id),
            store.update(&a.id, HistoryUpdate::title("both")),
        );
        ra.unwrap();
        rb.unwrap();
        rc.unwrap();

        let a_now = store.get(&a.id).unwrap();
        assert!(a_now.is_favorite);
        assert_eq!(a_now.title.as_deref(), Some("both"));
        assert!(store.get(&b.id).unwrap().is_favorite);
        assert_eq!(store.favorites().len(), 2);
    }

    #[tokio::test]
    async fn search_filters_by_type_favorites_and_query() {
        let store = store();
        let png = store.add(new_item("r1", RenderType::Png)).await.unwrap();
        let svg = store.add(new_item("r2", RenderType::Svg)).await.unwrap();
        store.add(new_item("r3", RenderType::Text)).await.unwrap();
        store.toggle_favorite(&svg.id).await.unwrap();
        store
            .update(&png.id, HistoryUpdate::title("Login Flow"))
            .await
            .unwrap();

        assert_eq!(store.search(HistoryFilter::All, "").len(), 3);
        assert_eq!(store.search(HistoryFilter::Type(RenderType::Png), "")[0].id, png.id);
        assert_eq!(store.search(HistoryFilter::Favorites, "")[0].id, svg.id);
        assert_eq!(store.search(HistoryFilter::All, "login")[0].id, png.id);
        assert_eq!(store.search(HistoryFilter::All, "A -> B : R3").len(), 1);
        assert!(store.search(HistoryFilter::Favorites, "login").is_empty());
    }

    #[test]
    fn filter_parses_names() {
        assert_eq!("all".parse::<HistoryFilter>().unwrap(), HistoryFilter::All);
        assert_eq!("Favorites".parse::<HistoryFilter>().unwrap(), HistoryFilter::Favorites);
        assert_eq!(
            "svg".parse::<HistoryFilter>().unwrap(),
            HistoryFilter::Type(RenderType::Svg)
        );
        assert!("recent".parse::<HistoryFilter>().is_err());
    }

    #[test]
    fn items_serialize_with_camel_case_keys() {
        let item = HistoryItem {
            id: "1".into(),
            puml_code: "@startuml\n@enduml".into(),
            render_id: "abc".into(),
            render_type: RenderType::Png,
            created_at: 1,
            preview_url: None,
            is_favorite: true,
            title: None,
        };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["pumlCode"], "@startuml\n@enduml");
        assert_eq!(v["renderType"], "png");
        assert_eq!(v["isFavorite"], true);
        assert!(v.get("previewUrl").is_none());
    }
}
