//! Domain objects.
//!
//! Objects hold only their own fields plus the identifiers and start times
//! needed to rebuild any related key. There are no object pointers: every
//! relation is resolved through the [`Session`](crate::Session).
//!
//! Two construction tiers exist. `new` validates and assigns a fresh random
//! identifier. `from_storage` rebuilds an object from a decoded key and value
//! without validation, since the bytes were valid when written.

use std::fmt;

use phono_codec::{
    audio_key, segment_key, speaker_key, starts_within, AnyRecord, AudioRecord, ExtensionMap, KeyInfo,
    PhoneRecord, PhraseRecord, SegmentKey, SpeakerRecord, SubWordFields, SyllableRecord,
    ValueRecord, WordRecord,
};
use phono_store::RawKey;
use phono_types::{Identifier, ObjectType};

use crate::error::{HierarchyError, ModelError, ModelResult};

/// Speaker gender, stored as a one-byte code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Gender {
    Female,
    Male,
    #[default]
    Unknown,
}

impl Gender {
    pub fn code(self) -> u8 {
        match self {
            Self::Female => 1,
            Self::Male => 2,
            Self::Unknown => 9,
        }
    }

    /// Codes other than 1 and 2 read as `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Female,
            2 => Self::Male,
            _ => Self::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Female => "female",
            Self::Male => "male",
            Self::Unknown => "unknown",
        }
    }
}

/// A media file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Audio {
    pub identifier: Identifier,
    pub filename: String,
    pub sample_rate: u32,
    pub duration_ms: u32,
    pub n_channels: u8,
    pub dataset: String,
    pub language: String,
    pub dialect: String,
    pub extra: ExtensionMap,
}

impl Audio {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            identifier: Identifier::random(),
            filename: filename.into(),
            sample_rate: 0,
            duration_ms: 0,
            n_channels: 1,
            dataset: String::new(),
            language: String::new(),
            dialect: String::new(),
            extra: ExtensionMap::new(),
        }
    }

    pub fn key(&self) -> RawKey {
        audio_key(self.identifier)
    }

    pub fn from_storage(audio_id: Identifier, r: AudioRecord) -> Self {
        Self {
            identifier: audio_id,
            filename: r.filename,
            sample_rate: r.sample_rate,
            duration_ms: r.duration_ms,
            n_channels: r.n_channels,
            dataset: r.dataset,
            language: r.language,
            dialect: r.dialect,
            extra: r.extension,
        }
    }

    pub fn to_record(&self) -> AudioRecord {
        AudioRecord {
            n_channels: self.n_channels,
            duration_ms: self.duration_ms,
            sample_rate: self.sample_rate,
            filename: self.filename.clone(),
            dialect: self.dialect.clone(),
            language: self.language.clone(),
            dataset: self.dataset.clone(),
            extension: self.extra.clone(),
        }
    }
}

/// A person appearing in one or more audios.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Speaker {
    pub identifier: Identifier,
    pub name: String,
    pub dataset: String,
    pub gender: Gender,
    pub age: u8,
    pub dialect: String,
    pub region: String,
    pub language: String,
    pub extra: ExtensionMap,
}

impl Speaker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            identifier: Identifier::random(),
            name: name.into(),
            dataset: String::new(),
            gender: Gender::Unknown,
            age: 0,
            dialect: String::new(),
            region: String::new(),
            language: String::new(),
            extra: ExtensionMap::new(),
        }
    }

    pub fn key(&self) -> RawKey {
        speaker_key(self.identifier)
    }

    pub fn from_storage(speaker_id: Identifier, r: SpeakerRecord) -> Self {
        Self {
            identifier: speaker_id,
            name: r.name,
            dataset: r.dataset,
            gender: Gender::from_code(r.gender_code),
            age: r.age,
            dialect: r.dialect,
            region: r.region,
            language: r.language,
            extra: r.extension,
        }
    }

    pub fn to_record(&self) -> SpeakerRecord {
        SpeakerRecord {
            gender_code: self.gender.code(),
            age: self.age,
            name: self.name.clone(),
            dataset: self.dataset.clone(),
            dialect: self.dialect.clone(),
            region: self.region.clone(),
            language: self.language.clone(),
            extension: self.extra.clone(),
        }
    }
}

const META_SOURCE_FILENAME: &str = "source_filename";
const META_LANGUAGE: &str = "language";
const META_CHANNEL: &str = "channel";
const META_VERSION: &str = "version";

/// Phrase-identifying metadata, kept in the extension section under
/// reserved names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PhraseMetadata {
    pub source_filename: Option<String>,
    pub language: Option<String>,
    pub channel: Option<String>,
    pub version: Option<String>,
}

impl PhraseMetadata {
    fn slots(&self) -> [(&'static str, &Option<String>); 4] {
        [
            (META_SOURCE_FILENAME, &self.source_filename),
            (META_LANGUAGE, &self.language),
            (META_CHANNEL, &self.channel),
            (META_VERSION, &self.version),
        ]
    }

    /// Merge into `extra`; reserved names win over open entries.
    fn to_extension(&self, extra: &ExtensionMap) -> ExtensionMap {
        let mut out = extra.clone();
        for (name, value) in self.slots() {
            if let Some(v) = value {
                out.insert(name.to_string(), v.as_bytes().to_vec());
            }
        }
        out
    }

    /// Split reserved names off `extension`. Non-UTF-8 values stay in the
    /// returned open map.
    fn from_extension(mut extension: ExtensionMap) -> (Self, ExtensionMap) {
        let mut take = |name: &str| -> Option<String> {
            let bytes = extension.remove(name)?;
            match String::from_utf8(bytes) {
                Ok(s) => Some(s),
                Err(e) => {
                    extension.insert(name.to_string(), e.into_bytes());
                    None
                }
            }
        };
        let meta = Self {
            source_filename: take(META_SOURCE_FILENAME),
            language: take(META_LANGUAGE),
            channel: take(META_CHANNEL),
            version: take(META_VERSION),
        };
        (meta, extension)
    }
}

/// Type-specific fields of a segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SegmentDetail {
    Phrase(PhraseMetadata),
    Word { ipa: String },
    Syllable { stress_code: u8 },
    Phone { position_code: u8 },
}

impl SegmentDetail {
    pub fn for_type(object_type: ObjectType) -> ModelResult<Self> {
        Ok(match object_type {
            ObjectType::Phrase => Self::Phrase(PhraseMetadata::default()),
            ObjectType::Word => Self::Word { ipa: String::new() },
            ObjectType::Syllable => Self::Syllable { stress_code: 0 },
            ObjectType::Phone => Self::Phone { position_code: 0 },
            other => return Err(HierarchyError::NotASegment(other).into()),
        })
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Phrase(_) => ObjectType::Phrase,
            Self::Word { .. } => ObjectType::Word,
            Self::Syllable { .. } => ObjectType::Syllable,
            Self::Phone { .. } => ObjectType::Phone,
        }
    }
}

/// A time-aligned annotation node: Phrase, Word, Syllable or Phone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub identifier: Identifier,
    pub label: String,
    pub start_ms: u32,
    pub end_ms: u32,
    pub audio_id: Identifier,
    pub speaker_id: Identifier,
    pub parent_id: Identifier,
    pub parent_start_ms: u32,
    pub phrase_id: Identifier,
    pub phrase_start_ms: u32,
    pub detail: SegmentDetail,
    pub extra: ExtensionMap,
    pub(crate) child_keys: Vec<RawKey>,
    /// `child_keys` lists every child. False for freshly hydrated segments
    /// whose children still live only in the store.
    pub(crate) children_resolved: bool,
}

impl Segment {
    /// New unlinked segment with a random identifier.
    pub fn new(
        object_type: ObjectType,
        label: impl Into<String>,
        start_ms: u32,
        end_ms: u32,
    ) -> ModelResult<Self> {
        if start_ms > end_ms {
            return Err(ModelError::InvalidSpan { start_ms, end_ms });
        }
        Ok(Self {
            identifier: Identifier::random(),
            label: label.into(),
            start_ms,
            end_ms,
            audio_id: Identifier::EMPTY,
            speaker_id: Identifier::EMPTY,
            parent_id: Identifier::EMPTY,
            parent_start_ms: 0,
            phrase_id: Identifier::EMPTY,
            phrase_start_ms: 0,
            detail: SegmentDetail::for_type(object_type)?,
            extra: ExtensionMap::new(),
            child_keys: Vec::new(),
            children_resolved: true,
        })
    }

    /// Like [`Segment::new`] with times in seconds, rounded to milliseconds.
    pub fn from_seconds(
        object_type: ObjectType,
        label: impl Into<String>,
        start_s: f64,
        end_s: f64,
    ) -> ModelResult<Self> {
        Self::new(object_type, label, seconds_to_ms(start_s)?, seconds_to_ms(end_s)?)
    }

    pub fn phrase(label: impl Into<String>, start_ms: u32, end_ms: u32) -> ModelResult<Self> {
        Self::new(ObjectType::Phrase, label, start_ms, end_ms)
    }

    pub fn word(label: impl Into<String>, start_ms: u32, end_ms: u32) -> ModelResult<Self> {
        Self::new(ObjectType::Word, label, start_ms, end_ms)
    }

    pub fn syllable(label: impl Into<String>, start_ms: u32, end_ms: u32) -> ModelResult<Self> {
        Self::new(ObjectType::Syllable, label, start_ms, end_ms)
    }

    pub fn phone(label: impl Into<String>, start_ms: u32, end_ms: u32) -> ModelResult<Self> {
        Self::new(ObjectType::Phone, label, start_ms, end_ms)
    }

    /// Rebuild from a decoded key and value.
    pub fn from_storage(key: &SegmentKey, record: AnyRecord) -> ModelResult<Self> {
        let mut seg = Self {
            identifier: key.segment_id,
            label: String::new(),
            start_ms: key.offset_ms,
            end_ms: 0,
            audio_id: key.audio_id,
            speaker_id: Identifier::EMPTY,
            parent_id: Identifier::EMPTY,
            parent_start_ms: 0,
            phrase_id: Identifier::EMPTY,
            phrase_start_ms: 0,
            detail: SegmentDetail::Phrase(PhraseMetadata::default()),
            extra: ExtensionMap::new(),
            child_keys: Vec::new(),
            children_resolved: false,
        };
        match record {
            AnyRecord::Phrase(r) => {
                let (meta, extra) = PhraseMetadata::from_extension(r.extension);
                seg.end_ms = r.end_ms;
                seg.speaker_id = r.speaker_id;
                seg.label = r.label;
                seg.detail = SegmentDetail::Phrase(meta);
                seg.extra = extra;
            }
            AnyRecord::Word(r) => {
                seg.end_ms = r.end_ms;
                seg.speaker_id = r.speaker_id;
                seg.parent_id = r.parent_id;
                seg.parent_start_ms = r.parent_start_ms;
                seg.phrase_id = r.parent_id;
                seg.phrase_start_ms = r.parent_start_ms;
                seg.label = r.label;
                seg.detail = SegmentDetail::Word { ipa: r.ipa };
                seg.extra = r.extension;
            }
            AnyRecord::Syllable(r) => {
                seg.apply_sub_word(r.common);
                seg.detail = SegmentDetail::Syllable { stress_code: r.stress_code };
                seg.extra = r.extension;
            }
            AnyRecord::Phone(r) => {
                seg.apply_sub_word(r.common);
                seg.detail = SegmentDetail::Phone { position_code: r.position_code };
                seg.extra = r.extension;
            }
            other => {
                return Err(ModelError::WrongType {
                    id: key.segment_id,
                    expected: "segment",
                    actual: other.object_type(),
                })
            }
        }
        Ok(seg)
    }

    fn apply_sub_word(&mut self, c: SubWordFields) {
        self.end_ms = c.end_ms;
        self.parent_start_ms = c.parent_start_ms;
        self.phrase_start_ms = c.phrase_start_ms;
        self.speaker_id = c.speaker_id;
        self.parent_id = c.parent_id;
        self.phrase_id = c.phrase_id;
        self.label = c.label;
    }

    fn sub_word(&self) -> SubWordFields {
        SubWordFields {
            end_ms: self.end_ms,
            parent_start_ms: self.parent_start_ms,
            phrase_start_ms: self.phrase_start_ms,
            speaker_id: self.speaker_id,
            parent_id: self.parent_id,
            phrase_id: self.phrase_id,
            label: self.label.clone(),
        }
    }

    pub fn to_record(&self) -> AnyRecord {
        match &self.detail {
            SegmentDetail::Phrase(meta) => AnyRecord::Phrase(PhraseRecord {
                end_ms: self.end_ms,
                speaker_id: self.speaker_id,
                label: self.label.clone(),
                extension: meta.to_extension(&self.extra),
            }),
            SegmentDetail::Word { ipa } => AnyRecord::Word(WordRecord {
                end_ms: self.end_ms,
                parent_start_ms: self.parent_start_ms,
                speaker_id: self.speaker_id,
                parent_id: self.parent_id,
                label: self.label.clone(),
                ipa: ipa.clone(),
                extension: self.extra.clone(),
            }),
            SegmentDetail::Syllable { stress_code } => AnyRecord::Syllable(SyllableRecord {
                stress_code: *stress_code,
                common: self.sub_word(),
                extension: self.extra.clone(),
            }),
            SegmentDetail::Phone { position_code } => AnyRecord::Phone(PhoneRecord {
                position_code: *position_code,
                common: self.sub_word(),
                extension: self.extra.clone(),
            }),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.detail.object_type()
    }

    pub fn duration_ms(&self) -> u32 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    pub fn start_seconds(&self) -> f64 {
        self.start_ms as f64 / 1000.0
    }

    pub fn end_seconds(&self) -> f64 {
        self.end_ms as f64 / 1000.0
    }

    /// Store key; depends on audio, type, start time and identifier.
    pub fn key(&self) -> ModelResult<RawKey> {
        Ok(segment_key(
            self.audio_id,
            self.object_type(),
            self.start_ms as i64,
            self.identifier,
        )?)
    }

    pub fn parent_key(&self) -> ModelResult<Option<RawKey>> {
        let (Some(parent_type), Some(parent_id)) =
            (self.object_type().parent_type(), self.parent_id.non_empty())
        else {
            return Ok(None);
        };
        Ok(Some(segment_key(
            self.audio_id,
            parent_type,
            self.parent_start_ms as i64,
            parent_id,
        )?))
    }

    /// Key of the enclosing phrase; a phrase's own key for a phrase.
    pub fn phrase_key(&self) -> ModelResult<Option<RawKey>> {
        if self.object_type() == ObjectType::Phrase {
            return self.key().map(Some);
        }
        let Some(phrase_id) = self.phrase_id.non_empty() else {
            return Ok(None);
        };
        Ok(Some(segment_key(
            self.audio_id,
            ObjectType::Phrase,
            self.phrase_start_ms as i64,
            phrase_id,
        )?))
    }

    pub fn audio_key(&self) -> Option<RawKey> {
        self.audio_id.non_empty().map(audio_key)
    }

    pub fn speaker_key(&self) -> Option<RawKey> {
        self.speaker_id.non_empty().map(speaker_key)
    }

    /// Child keys known in memory. Complete only once children were resolved
    /// through the session.
    pub fn child_keys(&self) -> &[RawKey] {
        &self.child_keys
    }

    pub fn metadata(&self) -> Option<&PhraseMetadata> {
        match &self.detail {
            SegmentDetail::Phrase(meta) => Some(meta),
            _ => None,
        }
    }

    pub fn metadata_mut(&mut self) -> Option<&mut PhraseMetadata> {
        match &mut self.detail {
            SegmentDetail::Phrase(meta) => Some(meta),
            _ => None,
        }
    }

    pub fn ipa(&self) -> Option<&str> {
        match &self.detail {
            SegmentDetail::Word { ipa } => Some(ipa),
            _ => None,
        }
    }

    pub fn stress_code(&self) -> Option<u8> {
        match self.detail {
            SegmentDetail::Syllable { stress_code } => Some(stress_code),
            _ => None,
        }
    }

    pub fn position_code(&self) -> Option<u8> {
        match self.detail {
            SegmentDetail::Phone { position_code } => Some(position_code),
            _ => None,
        }
    }

    /// `other` ends by `self.end` and starts where a child scan over this
    /// segment will find it.
    pub fn contains_span(&self, other: &Segment) -> bool {
        other.end_ms <= self.end_ms && starts_within(self.start_ms, self.end_ms, other.start_ms)
    }

    pub(crate) fn check_contains(&self, child: &Segment) -> Result<(), HierarchyError> {
        if self.contains_span(child) {
            return Ok(());
        }
        Err(HierarchyError::OutsideParent {
            parent: self.identifier,
            parent_start: self.start_ms,
            parent_end: self.end_ms,
            child: child.identifier,
            child_start: child.start_ms,
            child_end: child.end_ms,
        })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({:?} {}-{} ms)",
            self.object_type(),
            self.label,
            self.start_ms,
            self.end_ms
        )
    }
}

fn seconds_to_ms(s: f64) -> ModelResult<u32> {
    let ms = (s * 1000.0).round();
    if !ms.is_finite() || ms < 0.0 || ms > u32::MAX as f64 {
        return Err(ModelError::InvalidTime(s));
    }
    Ok(ms as u32)
}

/// Any cached object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Object {
    Audio(Audio),
    Speaker(Speaker),
    Segment(Segment),
}

impl Object {
    /// Rebuild from a decoded key and its value bytes.
    pub fn from_storage(info: &KeyInfo, value: &[u8]) -> ModelResult<Self> {
        match info {
            KeyInfo::Audio { audio_id } => {
                Ok(Self::Audio(Audio::from_storage(*audio_id, AudioRecord::decode(value)?)))
            }
            KeyInfo::Speaker { speaker_id } => Ok(Self::Speaker(Speaker::from_storage(
                *speaker_id,
                SpeakerRecord::decode(value)?,
            ))),
            KeyInfo::Segment(key) => {
                let record = AnyRecord::decode(key.object_type, value)?;
                Ok(Self::Segment(Segment::from_storage(key, record)?))
            }
            KeyInfo::SpeakerAudio { .. } => Err(ModelError::NotARecordKey),
        }
    }

    pub fn identifier(&self) -> Identifier {
        match self {
            Self::Audio(a) => a.identifier,
            Self::Speaker(s) => s.identifier,
            Self::Segment(s) => s.identifier,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Audio(_) => ObjectType::Audio,
            Self::Speaker(_) => ObjectType::Speaker,
            Self::Segment(s) => s.object_type(),
        }
    }

    pub fn key(&self) -> ModelResult<RawKey> {
        match self {
            Self::Audio(a) => Ok(a.key()),
            Self::Speaker(s) => Ok(s.key()),
            Self::Segment(s) => s.key(),
        }
    }

    pub fn encode_value(&self) -> ModelResult<Vec<u8>> {
        Ok(match self {
            Self::Audio(a) => a.to_record().encode()?,
            Self::Speaker(s) => s.to_record().encode()?,
            Self::Segment(s) => s.to_record().encode()?,
        })
    }

    pub fn as_segment(&self) -> Option<&Segment> {
        match self {
            Self::Segment(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_segment_mut(&mut self) -> Option<&mut Segment> {
        match self {
            Self::Segment(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_audio(&self) -> Option<&Audio> {
        match self {
            Self::Audio(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_speaker(&self) -> Option<&Speaker> {
        match self {
            Self::Speaker(s) => Some(s),
            _ => None,
        }
    }

    /// True when the identity fields match; cached relation state is ignored.
    pub fn same_identity(&self, other: &Object) -> bool {
        self.identifier() == other.identifier() && self.object_type() == other.object_type()
    }
}

impl From<Audio> for Object {
    fn from(a: Audio) -> Self {
        Self::Audio(a)
    }
}

impl From<Speaker> for Object {
    fn from(s: Speaker) -> Self {
        Self::Speaker(s)
    }
}

impl From<Segment> for Object {
    fn from(s: Segment) -> Self {
        Self::Segment(s)
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio(a) => write!(f, "Audio({:?})", a.filename),
            Self::Speaker(s) => write!(f, "Speaker({:?})", s.name),
            Self::Segment(s) => s.fmt(f),
        }
    }
}
