use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use phono_codec::{child_time_window, decode_key};
use phono_store::{KeyValueStore, Namespace, OrderedStore, RawKey, StoreStats};
use phono_types::{Identifier, ObjectType};
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::config::PhonoConfig;
use crate::error::{HierarchyError, ModelError, ModelResult};
use crate::object::{Audio, Object, Segment, Speaker};
use crate::registry::{TypeCounters, TypeRegistry};

/// How `save` treats an existing key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Replace an existing value instead of failing.
    pub overwrite: bool,
    /// Turn an existence conflict into a logged skip.
    pub fail_gracefully: bool,
}

impl SaveOptions {
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            fail_gracefully: false,
        }
    }

    pub fn graceful() -> Self {
        Self {
            overwrite: false,
            fail_gracefully: true,
        }
    }
}

/// Snapshot of cache activity.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionStats {
    pub per_type: BTreeMap<ObjectType, TypeCounters>,
    pub cached: usize,
    pub fully_loaded: Vec<ObjectType>,
    pub sample_fraction: Option<f64>,
    pub persistence_enabled: bool,
    pub store: StoreStats,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} cached objects, persistence {}",
            self.cached,
            if self.persistence_enabled { "on" } else { "off" }
        )?;
        for (t, c) in &self.per_type {
            writeln!(f, "  {:<8} loaded {:>8}  saved {:>8}", t.name(), c.loads, c.saves)?;
        }
        if !self.fully_loaded.is_empty() {
            let names: Vec<&str> = self.fully_loaded.iter().map(|t| t.name()).collect();
            writeln!(f, "  fully loaded: {}", names.join(", "))?;
        }
        if let Some(fraction) = self.sample_fraction {
            writeln!(f, "  sampled: {:.1}% of phrases", fraction * 100.0)?;
        }
        write!(
            f,
            "  store: {} reads, {} writes, {} scans, {} deletes",
            self.store.reads, self.store.writes, self.store.scans, self.store.deletes
        )
    }
}

/// In-process object cache over a [`KeyValueStore`].
///
/// Keys embed the object identifier, so the cache is indexed by identifier
/// and every public operation hands out identifiers rather than references.
/// The key under which each object was last written is tracked separately;
/// a save that computes a different key removes the stale one.
pub struct Session {
    config: PhonoConfig,
    store: Arc<dyn KeyValueStore>,
    registry: TypeRegistry,
    pub(crate) objects: HashMap<Identifier, Object>,
    stored_keys: HashMap<Identifier, RawKey>,
    save_counts: HashMap<RawKey, u64>,
    type_index: Option<BTreeMap<ObjectType, BTreeSet<RawKey>>>,
    loaded_types: BTreeSet<ObjectType>,
    /// Children grouped by parent for parents not yet hydrated.
    pending_children: HashMap<Identifier, Vec<RawKey>>,
    sample_fraction: Option<f64>,
    persistence: bool,
}

impl Session {
    /// Open the store named by `config` and start an empty cache.
    pub fn open(config: PhonoConfig) -> ModelResult<Self> {
        let store: Arc<dyn KeyValueStore> = Arc::new(OrderedStore::open(config.store.clone())?);
        info!(path = ?config.store.path, "session opened");
        Ok(Self::with_store(store, config))
    }

    /// Session over a fresh volatile store.
    pub fn in_memory() -> Self {
        let config = PhonoConfig::in_memory();
        let store = Arc::new(OrderedStore::in_memory(config.store.clone()));
        Self::with_store(store, config)
    }

    pub fn with_store(store: Arc<dyn KeyValueStore>, config: PhonoConfig) -> Self {
        Self::with_registry(store, config, TypeRegistry::standard())
    }

    pub fn with_registry(
        store: Arc<dyn KeyValueStore>,
        config: PhonoConfig,
        registry: TypeRegistry,
    ) -> Self {
        let persistence = config.cache.persistence_enabled;
        Self {
            config,
            store,
            registry,
            objects: HashMap::new(),
            stored_keys: HashMap::new(),
            save_counts: HashMap::new(),
            type_index: None,
            loaded_types: BTreeSet::new(),
            pending_children: HashMap::new(),
            sample_fraction: None,
            persistence,
        }
    }

    /// Drop the cache and, for a journal-backed store, reopen it.
    pub fn reconnect(&mut self) -> ModelResult<()> {
        if self.config.store.path.is_some() {
            self.store = Arc::new(OrderedStore::open(self.config.store.clone())?);
        }
        self.clear_cache();
        self.registry.reset_counters();
        self.save_counts.clear();
        info!(path = ?self.config.store.path, "session reconnected");
        Ok(())
    }

    /// End the session. Writes are already durable; this releases the store.
    pub fn close(self) -> ModelResult<()> {
        info!(cached = self.objects.len(), store = ?self.store.stats(), "session closed");
        Ok(())
    }

    /// Forget every cached object and memoized index.
    pub fn clear_cache(&mut self) {
        self.objects.clear();
        self.stored_keys.clear();
        self.type_index = None;
        self.loaded_types.clear();
        self.pending_children.clear();
        self.sample_fraction = None;
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn config(&self) -> &PhonoConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    // ---- Cache access ----

    /// Put a new object in the cache. Nothing is written.
    pub fn add(&mut self, object: impl Into<Object>) -> Identifier {
        let object = object.into();
        let id = object.identifier();
        self.objects.insert(id, object);
        id
    }

    pub fn get(&self, id: Identifier) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn is_cached(&self, id: Identifier) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn cached_len(&self) -> usize {
        self.objects.len()
    }

    pub fn object(&self, id: Identifier) -> ModelResult<&Object> {
        self.objects.get(&id).ok_or(ModelError::NotCached(id))
    }

    pub fn object_mut(&mut self, id: Identifier) -> ModelResult<&mut Object> {
        self.objects.get_mut(&id).ok_or(ModelError::NotCached(id))
    }

    pub fn segment(&self, id: Identifier) -> ModelResult<&Segment> {
        let object = self.object(id)?;
        object.as_segment().ok_or(ModelError::WrongType {
            id,
            expected: "segment",
            actual: object.object_type(),
        })
    }

    pub fn segment_mut(&mut self, id: Identifier) -> ModelResult<&mut Segment> {
        let object = self.objects.get_mut(&id).ok_or(ModelError::NotCached(id))?;
        let actual = object.object_type();
        object.as_segment_mut().ok_or(ModelError::WrongType {
            id,
            expected: "segment",
            actual,
        })
    }

    pub fn audio(&self, id: Identifier) -> ModelResult<&Audio> {
        let object = self.object(id)?;
        object.as_audio().ok_or(ModelError::WrongType {
            id,
            expected: "Audio",
            actual: object.object_type(),
        })
    }

    pub fn speaker(&self, id: Identifier) -> ModelResult<&Speaker> {
        let object = self.object(id)?;
        object.as_speaker().ok_or(ModelError::WrongType {
            id,
            expected: "Speaker",
            actual: object.object_type(),
        })
    }

    /// Segment type of `id`, or a hierarchy error for audios and speakers.
    pub(crate) fn segment_type(&self, id: Identifier) -> ModelResult<ObjectType> {
        let t = self.object(id)?.object_type();
        if !t.is_segment() {
            return Err(HierarchyError::NotASegment(t).into());
        }
        Ok(t)
    }

    /// Identifiers of cached objects of one type, in key order.
    pub fn cached_of_type(&self, object_type: ObjectType) -> Vec<Identifier> {
        let mut found: Vec<(RawKey, Identifier)> = self
            .objects
            .values()
            .filter(|o| o.object_type() == object_type)
            .filter_map(|o| o.key().ok().map(|k| (k, o.identifier())))
            .collect();
        found.sort();
        found.into_iter().map(|(_, id)| id).collect()
    }

    /// Key the object would be written under now.
    pub fn key_of(&self, id: Identifier) -> ModelResult<RawKey> {
        self.object(id)?.key()
    }

    /// Key the object was last written under or loaded from.
    pub fn stored_key(&self, id: Identifier) -> Option<&RawKey> {
        self.stored_keys.get(&id)
    }

    pub fn is_persisted(&self, id: Identifier) -> bool {
        self.stored_keys.contains_key(&id)
    }

    /// Times a value was written under `key` by this session.
    pub fn save_count(&self, key: &[u8]) -> u64 {
        self.save_counts.get(key).copied().unwrap_or(0)
    }

    // ---- Loading ----

    /// Cached object for `key`, loading it from the store on a miss.
    pub fn load(&mut self, key: &[u8]) -> ModelResult<Identifier> {
        self.try_load(key)?
            .ok_or_else(|| ModelError::NotFound(hex::encode(key)))
    }

    /// Like [`Session::load`], with `None` for an absent key.
    pub fn try_load(&mut self, key: &[u8]) -> ModelResult<Option<Identifier>> {
        if let Some(id) = self.cached_id(key)? {
            return Ok(Some(id));
        }
        match self.store.get(Namespace::Main, key)? {
            Some(value) => self.hydrate(key, &value).map(Some),
            None => Ok(None),
        }
    }

    /// Load `keys`, preserving their order. Misses are fetched in one read.
    pub fn load_many(&mut self, keys: &[RawKey]) -> ModelResult<Vec<Identifier>> {
        self.load_many_inner(keys)?
            .into_iter()
            .zip(keys)
            .map(|(id, key)| id.ok_or_else(|| ModelError::NotFound(hex::encode(key))))
            .collect()
    }

    /// Like [`Session::load_many`], skipping absent keys.
    pub fn load_present(&mut self, keys: &[RawKey]) -> ModelResult<Vec<Identifier>> {
        Ok(self.load_many_inner(keys)?.into_iter().flatten().collect())
    }

    fn load_many_inner(&mut self, keys: &[RawKey]) -> ModelResult<Vec<Option<Identifier>>> {
        let mut out = Vec::with_capacity(keys.len());
        let mut misses: Vec<RawKey> = Vec::new();
        let mut slots: Vec<usize> = Vec::new();
        for (slot, key) in keys.iter().enumerate() {
            let hit = self.cached_id(key)?;
            if hit.is_none() {
                misses.push(key.clone());
                slots.push(slot);
            }
            out.push(hit);
        }
        if misses.is_empty() {
            return Ok(out);
        }

        if misses.len() > self.config.cache.bulk_load_threshold {
            debug!(count = misses.len(), "bulk decode path");
            self.objects.reserve(misses.len());
            self.stored_keys.reserve(misses.len());
        }
        let values = self.store.get_many(Namespace::Main, &misses)?;
        for ((slot, key), value) in slots.into_iter().zip(&misses).zip(values) {
            if let Some(value) = value {
                out[slot] = Some(self.hydrate(key, &value)?);
            }
        }
        debug!(requested = keys.len(), fetched = misses.len(), "load_many");
        Ok(out)
    }

    fn cached_id(&self, key: &[u8]) -> ModelResult<Option<Identifier>> {
        let id = decode_key(key)?.identifier().ok_or(ModelError::NotARecordKey)?;
        Ok(self.objects.contains_key(&id).then_some(id))
    }

    /// Decode a stored entry into the cache. An already cached object wins
    /// over the stored bytes.
    pub(crate) fn hydrate(&mut self, key: &[u8], value: &[u8]) -> ModelResult<Identifier> {
        let info = decode_key(key)?;
        let (Some(object_type), Some(id)) = (info.object_type(), info.identifier()) else {
            return Err(ModelError::NotARecordKey);
        };
        if self.objects.contains_key(&id) {
            return Ok(id);
        }
        let mut object = self.registry.hydrate(object_type, &info, value)?;
        if let Object::Segment(seg) = &mut object {
            self.adopt_children(seg);
        }
        self.objects.insert(id, object);
        self.stored_keys.insert(id, key.to_vec());
        Ok(id)
    }

    fn adopt_children(&mut self, seg: &mut Segment) {
        if let Some(keys) = self.pending_children.remove(&seg.identifier) {
            seg.child_keys = keys;
            seg.children_resolved = true;
        } else if let Some(child_type) = seg.object_type().child_type() {
            if self.loaded_types.contains(&child_type) {
                seg.children_resolved = true;
            }
        }
    }

    // ---- Saving ----

    fn encode(&self, id: Identifier) -> ModelResult<(ObjectType, RawKey, Vec<u8>)> {
        let object = self.object(id)?;
        Ok((object.object_type(), object.key()?, object.encode_value()?))
    }

    /// The stored key of `id` when it differs from `key`.
    fn stale_key(&self, id: Identifier, key: &[u8]) -> Option<RawKey> {
        self.stored_keys.get(&id).filter(|k| k.as_slice() != key).cloned()
    }

    fn record_save(&mut self, id: Identifier, object_type: ObjectType, key: RawKey) -> ModelResult<()> {
        self.registry.count_save(object_type)?;
        *self.save_counts.entry(key.clone()).or_default() += 1;
        if let Some(index) = &mut self.type_index {
            index.entry(object_type).or_default().insert(key.clone());
        }
        self.stored_keys.insert(id, key);
        Ok(())
    }

    fn forget_keys(&mut self, keys: &[RawKey]) {
        if let Some(index) = &mut self.type_index {
            for set in index.values_mut() {
                for key in keys {
                    set.remove(key);
                }
            }
        }
    }

    /// Write one object. Returns `false` when nothing was written: persistence
    /// is off, or a conflict was skipped under `fail_gracefully`.
    ///
    /// If the object's key changed since it was last written (its audio was
    /// reassigned), the stale key is removed once the new one is in place.
    pub fn save(&mut self, id: Identifier, opts: SaveOptions) -> ModelResult<bool> {
        if !self.persistence {
            return Ok(false);
        }
        let (object_type, key, value) = self.encode(id)?;
        let stale = self.stale_key(id, &key);

        match self.store.put(Namespace::Main, &key, &value, opts.overwrite) {
            Ok(()) => {}
            Err(e) if e.is_conflict() && opts.fail_gracefully => {
                warn!(%id, key = %hex::encode(&key), "save skipped: key exists");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }
        if let Some(old) = stale {
            self.store.delete(Namespace::Main, &old)?;
            self.forget_keys(std::slice::from_ref(&old));
            debug!(%id, "key changed; stale key removed");
        }
        self.record_save(id, object_type, key)?;
        Ok(true)
    }

    /// Write many objects in one transaction; all or nothing.
    pub fn save_many(&mut self, ids: &[Identifier], opts: SaveOptions) -> ModelResult<usize> {
        if !self.persistence || ids.is_empty() {
            return Ok(0);
        }
        let mut entries = Vec::with_capacity(ids.len());
        let mut saved = Vec::with_capacity(ids.len());
        let mut stale = Vec::new();
        for &id in ids {
            let (object_type, key, value) = self.encode(id)?;
            if let Some(old) = self.stale_key(id, &key) {
                stale.push(old);
            }
            entries.push((key.clone(), value));
            saved.push((id, object_type, key));
        }

        match self.store.put_many(Namespace::Main, &entries, opts.overwrite) {
            Ok(()) => {}
            Err(e) if e.is_conflict() && opts.fail_gracefully => {
                warn!(count = ids.len(), error = %e, "save_many skipped");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        }
        if !stale.is_empty() {
            self.store.delete_many(Namespace::Main, &stale)?;
            self.forget_keys(&stale);
            debug!(count = stale.len(), "stale keys removed");
        }
        for (id, object_type, key) in saved {
            self.record_save(id, object_type, key)?;
        }
        Ok(ids.len())
    }

    /// Delete `old_key`, then write `id` under its current key.
    pub fn update(&mut self, old_key: &[u8], id: Identifier) -> ModelResult<()> {
        if !self.persistence {
            return Ok(());
        }
        let (object_type, key, value) = self.encode(id)?;
        if old_key != key.as_slice() {
            self.store.delete(Namespace::Main, old_key)?;
            self.forget_keys(&[old_key.to_vec()]);
        }
        self.store.put(Namespace::Main, &key, &value, true)?;
        self.record_save(id, object_type, key)
    }

    // ---- Deleting ----

    /// Delete an object and evict it. Segments take their descendants with
    /// them; audios and speakers drop their link-index entries only.
    /// Returns the number of stored records removed.
    pub fn delete(&mut self, id: Identifier) -> ModelResult<usize> {
        let object_type = self.object(id)?.object_type();
        let mut doomed = vec![id];
        if object_type.is_segment() {
            doomed.extend(self.descendants(id)?);
            self.detach_from_parent(id)?;
        }

        let keys: Vec<RawKey> = doomed
            .iter()
            .filter_map(|d| self.stored_keys.get(d).cloned())
            .collect();
        let removed = self.store.delete_many(Namespace::Main, &keys)?;
        match object_type {
            ObjectType::Speaker => {
                self.store.unlink_speaker(id)?;
            }
            ObjectType::Audio => {
                self.store.unlink_audio(id)?;
            }
            _ => {}
        }
        self.forget_keys(&keys);
        for d in &doomed {
            self.evict(*d);
        }
        debug!(%id, object_type = %object_type, evicted = doomed.len(), removed, "deleted");
        Ok(removed)
    }

    /// Delete several objects; identifiers already gone are skipped.
    pub fn delete_many(&mut self, ids: &[Identifier]) -> ModelResult<usize> {
        let mut removed = 0;
        for &id in ids {
            if self.objects.contains_key(&id) {
                removed += self.delete(id)?;
            }
        }
        Ok(removed)
    }

    /// Delete by key; an absent key is a no-op.
    pub fn delete_key(&mut self, key: &[u8]) -> ModelResult<usize> {
        match self.try_load(key)? {
            Some(id) => self.delete(id),
            None => Ok(0),
        }
    }

    fn evict(&mut self, id: Identifier) {
        self.objects.remove(&id);
        self.stored_keys.remove(&id);
        self.pending_children.remove(&id);
    }

    /// Remove `child` from its cached parent's child list.
    pub(crate) fn detach_from_parent(&mut self, child: Identifier) -> ModelResult<()> {
        let seg = self.segment(child)?;
        let parent = seg.parent_id;
        if parent.is_empty() {
            return Ok(());
        }
        let mut keys = vec![seg.key()?];
        keys.extend(self.stored_keys.get(&child).cloned());
        if let Some(p) = self.objects.get_mut(&parent).and_then(Object::as_segment_mut) {
            p.child_keys.retain(|k| !keys.contains(k));
        }
        Ok(())
    }

    // ---- Persistence toggle ----

    pub fn persistence_enabled(&self) -> bool {
        self.persistence
    }

    pub fn set_persistence(&mut self, enabled: bool) {
        self.persistence = enabled;
    }

    /// Disable saving until the guard drops; the prior state is restored.
    pub fn suspend_persistence(&mut self) -> PersistenceGuard<'_> {
        let previous = self.persistence;
        self.persistence = false;
        PersistenceGuard {
            session: self,
            previous,
        }
    }

    // ---- Type index and preloading ----

    /// Store keys grouped by type. Computed by a full scan once, then kept
    /// current by this session's own writes; `refresh` forces a rescan.
    pub fn type_index(&mut self, refresh: bool) -> ModelResult<&BTreeMap<ObjectType, BTreeSet<RawKey>>> {
        if refresh || self.type_index.is_none() {
            let index = self
                .store
                .all_keys_by_type()?
                .into_iter()
                .map(|(t, keys)| (t, keys.into_iter().collect()))
                .collect();
            self.type_index = Some(index);
        }
        let index: &BTreeMap<ObjectType, BTreeSet<RawKey>> =
            self.type_index.get_or_insert_with(BTreeMap::new);
        Ok(index)
    }

    pub fn keys_of_type(&mut self, object_type: ObjectType) -> ModelResult<Vec<RawKey>> {
        Ok(self
            .type_index(false)?
            .get(&object_type)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub fn is_fully_loaded(&self, object_type: ObjectType) -> bool {
        self.loaded_types.contains(&object_type)
    }

    /// Load every stored object of one type.
    pub fn preload_type(&mut self, object_type: ObjectType) -> ModelResult<Vec<Identifier>> {
        if !self.registry.is_registered(object_type) {
            return Err(ModelError::UnregisteredType(object_type));
        }
        let keys = self.keys_of_type(object_type)?;
        let ids = self.load_many(&keys)?;
        self.loaded_types.insert(object_type);
        if let Some(parent_type) = object_type.parent_type() {
            self.index_children(&ids)?;
            self.mark_childless(parent_type);
        }
        info!(object_type = %object_type, count = ids.len(), "type preloaded");
        Ok(ids)
    }

    /// Record `children` in their parents' child lists. Parents not yet
    /// cached pick the list up when hydrated.
    fn index_children(&mut self, children: &[Identifier]) -> ModelResult<()> {
        let mut groups: HashMap<Identifier, Vec<RawKey>> = HashMap::new();
        for &id in children {
            let seg = self.segment(id)?;
            if let Some(parent) = seg.parent_id.non_empty() {
                groups.entry(parent).or_default().push(seg.key()?);
            }
        }
        for (parent, mut keys) in groups {
            keys.sort();
            match self.objects.get_mut(&parent).and_then(Object::as_segment_mut) {
                Some(p) if p.children_resolved => {
                    for key in keys {
                        if !p.child_keys.contains(&key) {
                            p.child_keys.push(key);
                        }
                    }
                }
                Some(p) => {
                    p.child_keys = keys;
                    p.children_resolved = true;
                }
                None => {
                    self.pending_children.insert(parent, keys);
                }
            }
        }
        Ok(())
    }

    /// With every child of `parent_type` loaded, cached parents that got no
    /// children have none.
    fn mark_childless(&mut self, parent_type: ObjectType) {
        for object in self.objects.values_mut() {
            if let Object::Segment(s) = object {
                if s.object_type() == parent_type && !s.children_resolved {
                    s.children_resolved = true;
                }
            }
        }
    }

    /// Load a random `fraction` of phrases together with their hierarchy,
    /// audios and speakers. Returns the sampled phrases.
    pub fn preload_sample(&mut self, fraction: f64) -> ModelResult<Vec<Identifier>> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ModelError::InvalidFraction(fraction));
        }
        let keys = self.keys_of_type(ObjectType::Phrase)?;
        let count = ((keys.len() as f64 * fraction) as usize).max(1).min(keys.len());
        let sampled: Vec<RawKey> = keys
            .choose_multiple(&mut rand::thread_rng(), count)
            .cloned()
            .collect();
        let phrases = self.load_many(&sampled)?;
        let loaded = self.load_hierarchy_from_phrases(&phrases)?;
        self.sample_fraction = Some(fraction);
        info!(fraction, phrases = phrases.len(), loaded, "sample preloaded");
        Ok(phrases)
    }

    /// Bulk-load words, syllables and phones under `phrases` with one
    /// time-window scan per phrase and type, then their audios and speakers.
    /// Returns the number of newly cached objects.
    pub fn load_hierarchy_from_phrases(&mut self, phrases: &[Identifier]) -> ModelResult<usize> {
        let before = self.objects.len();
        let mut windows = Vec::with_capacity(phrases.len());
        let mut link_keys: BTreeSet<RawKey> = BTreeSet::new();
        for &id in phrases {
            let p = self.segment(id)?;
            windows.push((p.audio_id, p.start_ms, p.end_ms));
            link_keys.extend(p.audio_key());
            link_keys.extend(p.speaker_key());
        }

        for child_type in [ObjectType::Word, ObjectType::Syllable, ObjectType::Phone] {
            let mut ids = Vec::new();
            for &(audio, start, end) in &windows {
                let (lo, hi) = child_time_window(audio, child_type, start, end)?;
                let entries = self.store.scan_range(Namespace::Main, &lo, &hi)?;
                for (key, value) in entries {
                    ids.push(self.hydrate(&key, &value)?);
                }
            }
            self.index_children(&ids)?;
            debug!(object_type = %child_type, count = ids.len(), "hierarchy level loaded");
        }

        let link_keys: Vec<RawKey> = link_keys.into_iter().collect();
        self.load_present(&link_keys)?;
        Ok(self.objects.len() - before)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            per_type: self.registry.all_counters(),
            cached: self.objects.len(),
            fully_loaded: self.loaded_types.iter().copied().collect(),
            sample_fraction: self.sample_fraction,
            persistence_enabled: self.persistence,
            store: self.store.stats(),
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session: {}", self.stats())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.config.store.path)
            .field("cached", &self.objects.len())
            .field("persistence", &self.persistence)
            .finish()
    }
}

/// Scope with persistence disabled; derefs to the session.
pub struct PersistenceGuard<'a> {
    session: &'a mut Session,
    previous: bool,
}

impl Deref for PersistenceGuard<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl DerefMut for PersistenceGuard<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for PersistenceGuard<'_> {
    fn drop(&mut self) {
        self.session.persistence = self.previous;
    }
}
