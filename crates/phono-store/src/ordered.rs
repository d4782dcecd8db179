use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use phono_codec::key::SPEAKER_AUDIO_KEY_LEN;
use phono_types::Identifier;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::journal::{Journal, LogOp, LogRecord, JOURNAL_FILE};
use crate::traits::{KeyValueStore, Namespace, RawKey, StoreStats};

type Table = BTreeMap<RawKey, Vec<u8>>;

#[derive(Default)]
struct Tables {
    main: Table,
    speaker_audio: Table,
    /// Sum of key and value lengths across both tables.
    bytes: u64,
}

impl Tables {
    fn table(&self, ns: Namespace) -> &Table {
        match ns {
            Namespace::Main => &self.main,
            Namespace::SpeakerAudio => &self.speaker_audio,
        }
    }

    fn table_mut(&mut self, ns: Namespace) -> &mut Table {
        match ns {
            Namespace::Main => &mut self.main,
            Namespace::SpeakerAudio => &mut self.speaker_audio,
        }
    }

    fn entry_size(&self, ns: Namespace, key: &[u8]) -> Option<u64> {
        self.table(ns).get(key).map(|v| (key.len() + v.len()) as u64)
    }

    /// Bytes used after applying `ops`, without applying them. Later ops on
    /// the same key see the effect of earlier ones.
    fn projected_bytes(&self, ops: &[LogOp]) -> u64 {
        let mut bytes = self.bytes;
        let mut cleared = false;
        let mut pending: HashMap<(Namespace, &[u8]), Option<u64>> = HashMap::new();
        for op in ops {
            let (slot, new) = match op {
                LogOp::Put { ns, key, value } => {
                    ((*ns, key.as_slice()), Some((key.len() + value.len()) as u64))
                }
                LogOp::Delete { ns, key } => ((*ns, key.as_slice()), None),
                LogOp::Clear => {
                    bytes = 0;
                    cleared = true;
                    pending.clear();
                    continue;
                }
            };
            let old = match pending.get(&slot) {
                Some(size) => *size,
                None if cleared => None,
                None => self.entry_size(slot.0, slot.1),
            };
            bytes = bytes.saturating_sub(old.unwrap_or(0)) + new.unwrap_or(0);
            pending.insert(slot, new);
        }
        bytes
    }

    fn apply(&mut self, op: LogOp) -> bool {
        match op {
            LogOp::Put { ns, key, value } => {
                let added = (key.len() + value.len()) as u64;
                let klen = key.len() as u64;
                if let Some(old) = self.table_mut(ns).insert(key, value) {
                    self.bytes -= klen + old.len() as u64;
                }
                self.bytes += added;
                true
            }
            LogOp::Delete { ns, key } => match self.table_mut(ns).remove(&key) {
                Some(old) => {
                    self.bytes -= (key.len() + old.len()) as u64;
                    true
                }
                None => false,
            },
            LogOp::Clear => {
                self.main.clear();
                self.speaker_audio.clear();
                self.bytes = 0;
                true
            }
        }
    }
}

#[derive(Default)]
struct Counters {
    reads: AtomicU64,
    writes: AtomicU64,
    scans: AtomicU64,
    deletes: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Ordered store over two `BTreeMap` tables.
///
/// Readers share an `RwLock`; each write takes the write lock once, journals
/// the whole transaction as one frame, then applies it. With no configured
/// path the store is volatile.
pub struct OrderedStore {
    config: StoreConfig,
    tables: RwLock<Tables>,
    journal: Option<Journal>,
    counters: Counters,
}

impl OrderedStore {
    /// Volatile store; `config.path` is ignored.
    pub fn in_memory(config: StoreConfig) -> Self {
        Self {
            config: StoreConfig { path: None, ..config },
            tables: RwLock::new(Tables::default()),
            journal: None,
            counters: Counters::default(),
        }
    }

    /// Open the store described by `config`, replaying its journal.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let Some(dir) = config.path.clone() else {
            return Ok(Self::in_memory(config));
        };
        let journal = Journal::open(&dir.join(JOURNAL_FILE), config.sync_mode)?;

        let mut tables = Tables::default();
        let records = journal.recover()?;
        let frames = records.len();
        for record in records {
            for op in record.ops {
                tables.apply(op);
            }
        }
        info!(
            path = %dir.display(),
            frames,
            main = tables.main.len(),
            links = tables.speaker_audio.len(),
            "store opened"
        );

        Ok(Self {
            config,
            tables: RwLock::new(tables),
            journal: Some(journal),
            counters: Counters::default(),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Total key and value bytes currently stored.
    pub fn used_bytes(&self) -> StoreResult<u64> {
        Ok(self.read_tables()?.bytes)
    }

    fn read_tables(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned("tables"))
    }

    fn write_tables(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::LockPoisoned("tables"))
    }

    /// Journal then apply `ops` under an already-held write lock.
    fn commit(&self, tables: &mut Tables, ops: Vec<LogOp>) -> StoreResult<usize> {
        if ops.is_empty() {
            return Ok(0);
        }
        let needed = tables.projected_bytes(&ops);
        if needed > self.config.max_map_size {
            return Err(StoreError::MapFull {
                needed,
                limit: self.config.max_map_size,
            });
        }
        let record = LogRecord::new(ops);
        if let Some(journal) = &self.journal {
            journal.append(&record)?;
        }
        let mut hits = 0;
        for op in record.ops {
            if tables.apply(op) {
                hits += 1;
            }
        }
        Ok(hits)
    }

    fn collect_range(table: &Table, start: Bound<&[u8]>, end: Bound<&[u8]>) -> Vec<(RawKey, Vec<u8>)> {
        table
            .range::<[u8], _>((start, end))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl KeyValueStore for OrderedStore {
    fn get(&self, ns: Namespace, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Counters::bump(&self.counters.reads);
        Ok(self.read_tables()?.table(ns).get(key).cloned())
    }

    fn get_many(&self, ns: Namespace, keys: &[RawKey]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        Counters::bump(&self.counters.reads);
        let tables = self.read_tables()?;
        let table = tables.table(ns);
        Ok(keys.iter().map(|k| table.get(k).cloned()).collect())
    }

    fn put(&self, ns: Namespace, key: &[u8], value: &[u8], overwrite: bool) -> StoreResult<()> {
        Counters::bump(&self.counters.writes);
        let mut tables = self.write_tables()?;
        if !overwrite && tables.table(ns).contains_key(key) {
            return Err(StoreError::KeyExists {
                namespace: ns,
                key: hex_key(key),
            });
        }
        self.commit(
            &mut tables,
            vec![LogOp::Put {
                ns,
                key: key.to_vec(),
                value: value.to_vec(),
            }],
        )?;
        Ok(())
    }

    fn put_many(
        &self,
        ns: Namespace,
        entries: &[(RawKey, Vec<u8>)],
        overwrite: bool,
    ) -> StoreResult<()> {
        Counters::bump(&self.counters.writes);
        let mut tables = self.write_tables()?;
        if !overwrite {
            let table = tables.table(ns);
            let mut seen = HashSet::with_capacity(entries.len());
            let conflicts: Vec<&RawKey> = entries
                .iter()
                .map(|(k, _)| k)
                .filter(|k| table.contains_key(*k) || !seen.insert(*k))
                .collect();
            if let Some(first) = conflicts.first() {
                return Err(StoreError::BatchConflict {
                    namespace: ns,
                    count: conflicts.len(),
                    first: hex_key(first),
                });
            }
        }
        let ops = entries
            .iter()
            .map(|(key, value)| LogOp::Put {
                ns,
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        self.commit(&mut tables, ops)?;
        debug!(namespace = %ns, count = entries.len(), "put_many committed");
        Ok(())
    }

    fn delete(&self, ns: Namespace, key: &[u8]) -> StoreResult<bool> {
        Counters::bump(&self.counters.deletes);
        let mut tables = self.write_tables()?;
        if !tables.table(ns).contains_key(key) {
            return Ok(false);
        }
        let removed = self.commit(&mut tables, vec![LogOp::Delete { ns, key: key.to_vec() }])?;
        Ok(removed > 0)
    }

    fn delete_many(&self, ns: Namespace, keys: &[RawKey]) -> StoreResult<usize> {
        Counters::bump(&self.counters.deletes);
        let batch = self.config.delete_batch_size.max(1);
        let mut removed = 0;
        for chunk in keys.chunks(batch) {
            let mut tables = self.write_tables()?;
            let ops: Vec<LogOp> = chunk
                .iter()
                .filter(|k| tables.table(ns).contains_key(*k))
                .map(|k| LogOp::Delete { ns, key: k.clone() })
                .collect();
            removed += self.commit(&mut tables, ops)?;
        }
        debug!(namespace = %ns, requested = keys.len(), removed, batch, "delete_many committed");
        Ok(removed)
    }

    fn scan_prefix(&self, ns: Namespace, prefix: &[u8]) -> StoreResult<Vec<(RawKey, Vec<u8>)>> {
        Counters::bump(&self.counters.scans);
        let tables = self.read_tables()?;
        Ok(tables
            .table(ns)
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn scan_range(
        &self,
        ns: Namespace,
        start: &[u8],
        end: &[u8],
    ) -> StoreResult<Vec<(RawKey, Vec<u8>)>> {
        Counters::bump(&self.counters.scans);
        if start > end {
            return Ok(Vec::new());
        }
        let tables = self.read_tables()?;
        Ok(Self::collect_range(
            tables.table(ns),
            Bound::Included(start),
            Bound::Included(end),
        ))
    }

    fn exists(&self, ns: Namespace, key: &[u8]) -> StoreResult<bool> {
        Counters::bump(&self.counters.reads);
        Ok(self.read_tables()?.table(ns).contains_key(key))
    }

    fn len(&self, ns: Namespace) -> StoreResult<usize> {
        Ok(self.read_tables()?.table(ns).len())
    }

    fn keys(&self, ns: Namespace) -> StoreResult<Vec<RawKey>> {
        Counters::bump(&self.counters.scans);
        Ok(self.read_tables()?.table(ns).keys().cloned().collect())
    }

    fn delete_prefix(&self, ns: Namespace, prefix: &[u8]) -> StoreResult<usize> {
        let keys: Vec<RawKey> = self
            .scan_prefix(ns, prefix)?
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        self.delete_many(ns, &keys)
    }

    fn clear(&self) -> StoreResult<()> {
        Counters::bump(&self.counters.deletes);
        let mut tables = self.write_tables()?;
        if let Some(journal) = &self.journal {
            journal.append(&LogRecord::new(vec![LogOp::Clear]))?;
        }
        tables.apply(LogOp::Clear);
        info!("store cleared");
        Ok(())
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.counters.reads.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            scans: self.counters.scans.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
        }
    }

    fn compact(&self) -> StoreResult<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let tables = self.write_tables()?;
        let snapshot: Vec<LogRecord> = Namespace::ALL
            .into_iter()
            .map(|ns| {
                LogRecord::new(
                    tables
                        .table(ns)
                        .iter()
                        .map(|(k, v)| LogOp::Put {
                            ns,
                            key: k.clone(),
                            value: v.clone(),
                        })
                        .collect(),
                )
            })
            .filter(|r| !r.ops.is_empty())
            .collect();
        journal.rewrite(&snapshot)
    }

    fn speakers_of_audio(&self, audio: Identifier) -> StoreResult<Vec<Identifier>> {
        Counters::bump(&self.counters.scans);
        let tables = self.read_tables()?;
        tables
            .speaker_audio
            .keys()
            .filter(|k| k.len() == SPEAKER_AUDIO_KEY_LEN && k.ends_with(audio.as_bytes()))
            .map(|k| Identifier::from_slice(&k[..Identifier::LEN]).map_err(|e| StoreError::Codec(e.into())))
            .collect()
    }
}

impl std::fmt::Debug for OrderedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (main, links) = match self.tables.read() {
            Ok(t) => (t.main.len(), t.speaker_audio.len()),
            Err(_) => (0, 0),
        };
        f.debug_struct("OrderedStore")
            .field("path", &self.config.path)
            .field("main", &main)
            .field("speaker_audio", &links)
            .finish()
    }
}

fn hex_key(key: &[u8]) -> String {
    hex::encode(key)
}
