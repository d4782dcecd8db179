use std::collections::BTreeMap;
use std::fmt;

use phono_codec::{decode_key, speaker_audio_key, speaker_link_prefix, KeyInfo};
use phono_types::{Identifier, ObjectType};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Raw store key.
pub type RawKey = Vec<u8>;

/// Logical sub-database.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Namespace {
    /// Typed records.
    Main,
    /// Speaker-audio link index: 16-byte keys, empty values.
    SpeakerAudio,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Main, Namespace::SpeakerAudio];

    pub fn name(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::SpeakerAudio => "speaker_audio",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Round-trip counters; every trait call that touches the tables counts once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub writes: u64,
    pub scans: u64,
    pub deletes: u64,
}

impl StoreStats {
    /// Sum of all counters.
    pub fn total(&self) -> u64 {
        self.reads + self.writes + self.scans + self.deletes
    }
}

/// Ordered, namespaced byte store.
///
/// Implementations must satisfy:
/// - `get_many` reads every key under one read transaction.
/// - `put` checks existence and writes atomically.
/// - `put_many` writes nothing if any key exists and `overwrite` is false.
/// - `delete`/`delete_many` treat absent keys as no-ops.
/// - Scans yield keys in byte-lexicographic order.
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, if any.
    fn get(&self, ns: Namespace, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Values for `keys`, in the same order, under one read transaction.
    fn get_many(&self, ns: Namespace, keys: &[RawKey]) -> StoreResult<Vec<Option<Vec<u8>>>>;

    /// Write one value. Fails with `KeyExists` when `overwrite` is false and
    /// the key is present.
    fn put(&self, ns: Namespace, key: &[u8], value: &[u8], overwrite: bool) -> StoreResult<()>;

    /// Write a batch in order, in one transaction.
    fn put_many(&self, ns: Namespace, entries: &[(RawKey, Vec<u8>)], overwrite: bool)
        -> StoreResult<()>;

    /// Remove one key. Returns `true` if it existed.
    fn delete(&self, ns: Namespace, key: &[u8]) -> StoreResult<bool>;

    /// Remove many keys in bounded sub-batches. Returns how many existed.
    fn delete_many(&self, ns: Namespace, keys: &[RawKey]) -> StoreResult<usize>;

    /// Every entry whose key starts with `prefix`.
    fn scan_prefix(&self, ns: Namespace, prefix: &[u8]) -> StoreResult<Vec<(RawKey, Vec<u8>)>>;

    /// Every entry with `start <= key <= end`.
    fn scan_range(&self, ns: Namespace, start: &[u8], end: &[u8])
        -> StoreResult<Vec<(RawKey, Vec<u8>)>>;

    fn exists(&self, ns: Namespace, key: &[u8]) -> StoreResult<bool>;

    /// Number of keys in `ns`.
    fn len(&self, ns: Namespace) -> StoreResult<usize>;

    /// Every key in `ns`, in order.
    fn keys(&self, ns: Namespace) -> StoreResult<Vec<RawKey>>;

    /// Remove every key starting with `prefix`. Returns the count removed.
    fn delete_prefix(&self, ns: Namespace, prefix: &[u8]) -> StoreResult<usize>;

    /// Remove everything in every namespace.
    fn clear(&self) -> StoreResult<()>;

    fn stats(&self) -> StoreStats;

    /// Shrink durable state to the live entries. No-op for volatile backends.
    fn compact(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Full scan of `Main` grouped by object type.
    ///
    /// Expensive; callers are expected to memoize the result.
    fn all_keys_by_type(&self) -> StoreResult<BTreeMap<ObjectType, Vec<RawKey>>> {
        let mut index: BTreeMap<ObjectType, Vec<RawKey>> = BTreeMap::new();
        for key in self.keys(Namespace::Main)? {
            if let Some(object_type) = decode_key(&key)?.object_type() {
                index.entry(object_type).or_default().push(key);
            }
        }
        Ok(index)
    }

    /// Record that `speaker` appears in `audio`. Idempotent.
    fn link(&self, speaker: Identifier, audio: Identifier) -> StoreResult<()> {
        self.put(Namespace::SpeakerAudio, &speaker_audio_key(speaker, audio), &[], true)
    }

    fn unlink(&self, speaker: Identifier, audio: Identifier) -> StoreResult<bool> {
        self.delete(Namespace::SpeakerAudio, &speaker_audio_key(speaker, audio))
    }

    /// Audios linked to `speaker`, via a prefix scan.
    fn audios_of_speaker(&self, speaker: Identifier) -> StoreResult<Vec<Identifier>> {
        let mut out = Vec::new();
        for (key, _) in self.scan_prefix(Namespace::SpeakerAudio, &speaker_link_prefix(speaker))? {
            if let KeyInfo::SpeakerAudio { audio_id, .. } = decode_key(&key)? {
                out.push(audio_id);
            }
        }
        Ok(out)
    }

    /// Speakers linked to `audio`, via a full scan of the link index
    /// matching on the key suffix.
    fn speakers_of_audio(&self, audio: Identifier) -> StoreResult<Vec<Identifier>> {
        let mut out = Vec::new();
        for key in self.keys(Namespace::SpeakerAudio)? {
            if key.ends_with(audio.as_bytes()) {
                if let KeyInfo::SpeakerAudio { speaker_id, .. } = decode_key(&key)? {
                    out.push(speaker_id);
                }
            }
        }
        Ok(out)
    }

    /// Drop every link of `speaker`.
    fn unlink_speaker(&self, speaker: Identifier) -> StoreResult<usize> {
        self.delete_prefix(Namespace::SpeakerAudio, &speaker_link_prefix(speaker))
    }

    /// Drop every link of `audio`.
    fn unlink_audio(&self, audio: Identifier) -> StoreResult<usize> {
        let keys: Vec<RawKey> = self
            .keys(Namespace::SpeakerAudio)?
            .into_iter()
            .filter(|k| k.ends_with(audio.as_bytes()))
            .collect();
        self.delete_many(Namespace::SpeakerAudio, &keys)
    }
}
