//! Typed value records, one per object type.
//!
//! Each record maps its fields onto the declared [`Layout`](crate::Layout)
//! of its type. Start time and identifier live in the key, so no record
//! carries them.

use phono_types::{Identifier, ObjectType};

use crate::error::CodecResult;
use crate::layout::{layout, ExtensionMap, FieldSet};

/// A value that packs through the layout of [`ValueRecord::OBJECT_TYPE`].
pub trait ValueRecord: Sized {
    const OBJECT_TYPE: ObjectType;

    fn to_fields(&self) -> FieldSet;

    fn from_fields(fields: &FieldSet, extension: ExtensionMap) -> CodecResult<Self>;

    fn extension(&self) -> &ExtensionMap;

    fn encode(&self) -> CodecResult<Vec<u8>> {
        layout(Self::OBJECT_TYPE).pack(&self.to_fields(), self.extension())
    }

    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let (fields, extension) = layout(Self::OBJECT_TYPE).unpack(bytes)?;
        Self::from_fields(&fields, extension)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioRecord {
    pub n_channels: u8,
    pub duration_ms: u32,
    pub sample_rate: u32,
    pub filename: String,
    pub dialect: String,
    pub language: String,
    pub dataset: String,
    pub extension: ExtensionMap,
}

impl ValueRecord for AudioRecord {
    const OBJECT_TYPE: ObjectType = ObjectType::Audio;

    fn to_fields(&self) -> FieldSet {
        FieldSet::new(Self::OBJECT_TYPE)
            .int("n_channels", self.n_channels)
            .int("duration_ms", self.duration_ms)
            .int("sample_rate", self.sample_rate)
            .str("filename", self.filename.as_str())
            .str("dialect", self.dialect.as_str())
            .str("language", self.language.as_str())
            .str("dataset", self.dataset.as_str())
    }

    fn from_fields(f: &FieldSet, extension: ExtensionMap) -> CodecResult<Self> {
        Ok(Self {
            n_channels: f.get_u8("n_channels")?,
            duration_ms: f.get_u32("duration_ms")?,
            sample_rate: f.get_u32("sample_rate")?,
            filename: f.get_str("filename")?,
            dialect: f.get_str("dialect")?,
            language: f.get_str("language")?,
            dataset: f.get_str("dataset")?,
            extension,
        })
    }

    fn extension(&self) -> &ExtensionMap {
        &self.extension
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpeakerRecord {
    pub gender_code: u8,
    pub age: u8,
    pub name: String,
    pub dataset: String,
    pub dialect: String,
    pub region: String,
    pub language: String,
    pub extension: ExtensionMap,
}

impl ValueRecord for SpeakerRecord {
    const OBJECT_TYPE: ObjectType = ObjectType::Speaker;

    fn to_fields(&self) -> FieldSet {
        FieldSet::new(Self::OBJECT_TYPE)
            .int("gender_code", self.gender_code)
            .int("age", self.age)
            .str("name", self.name.as_str())
            .str("dataset", self.dataset.as_str())
            .str("dialect", self.dialect.as_str())
            .str("region", self.region.as_str())
            .str("language", self.language.as_str())
    }

    fn from_fields(f: &FieldSet, extension: ExtensionMap) -> CodecResult<Self> {
        Ok(Self {
            gender_code: f.get_u8("gender_code")?,
            age: f.get_u8("age")?,
            name: f.get_str("name")?,
            dataset: f.get_str("dataset")?,
            dialect: f.get_str("dialect")?,
            region: f.get_str("region")?,
            language: f.get_str("language")?,
            extension,
        })
    }

    fn extension(&self) -> &ExtensionMap {
        &self.extension
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PhraseRecord {
    pub end_ms: u32,
    pub speaker_id: Identifier,
    pub label: String,
    pub extension: ExtensionMap,
}

impl ValueRecord for PhraseRecord {
    const OBJECT_TYPE: ObjectType = ObjectType::Phrase;

    fn to_fields(&self) -> FieldSet {
        FieldSet::new(Self::OBJECT_TYPE)
            .int("end_ms", self.end_ms)
            .id("speaker_id", self.speaker_id)
            .str("label", self.label.as_str())
    }

    fn from_fields(f: &FieldSet, extension: ExtensionMap) -> CodecResult<Self> {
        Ok(Self {
            end_ms: f.get_u32("end_ms")?,
            speaker_id: f.get_id("speaker_id")?,
            label: f.get_str("label")?,
            extension,
        })
    }

    fn extension(&self) -> &ExtensionMap {
        &self.extension
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WordRecord {
    pub end_ms: u32,
    pub parent_start_ms: u32,
    pub speaker_id: Identifier,
    pub parent_id: Identifier,
    pub label: String,
    pub ipa: String,
    pub extension: ExtensionMap,
}

impl ValueRecord for WordRecord {
    const OBJECT_TYPE: ObjectType = ObjectType::Word;

    fn to_fields(&self) -> FieldSet {
        FieldSet::new(Self::OBJECT_TYPE)
            .int("end_ms", self.end_ms)
            .int("parent_start_ms", self.parent_start_ms)
            .id("speaker_id", self.speaker_id)
            .id("parent_id", self.parent_id)
            .str("label", self.label.as_str())
            .str("ipa", self.ipa.as_str())
    }

    fn from_fields(f: &FieldSet, extension: ExtensionMap) -> CodecResult<Self> {
        Ok(Self {
            end_ms: f.get_u32("end_ms")?,
            parent_start_ms: f.get_u32("parent_start_ms")?,
            speaker_id: f.get_id("speaker_id")?,
            parent_id: f.get_id("parent_id")?,
            label: f.get_str("label")?,
            ipa: f.get_str("ipa")?,
            extension,
        })
    }

    fn extension(&self) -> &ExtensionMap {
        &self.extension
    }
}

/// Fields shared by syllables and phones, which also point at their phrase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubWordFields {
    pub end_ms: u32,
    pub parent_start_ms: u32,
    pub phrase_start_ms: u32,
    pub speaker_id: Identifier,
    pub parent_id: Identifier,
    pub phrase_id: Identifier,
    pub label: String,
}

impl SubWordFields {
    fn write(&self, set: FieldSet) -> FieldSet {
        set.int("end_ms", self.end_ms)
            .int("parent_start_ms", self.parent_start_ms)
            .int("phrase_start_ms", self.phrase_start_ms)
            .id("speaker_id", self.speaker_id)
            .id("parent_id", self.parent_id)
            .id("phrase_id", self.phrase_id)
            .str("label", self.label.as_str())
    }

    fn read(f: &FieldSet) -> CodecResult<Self> {
        Ok(Self {
            end_ms: f.get_u32("end_ms")?,
            parent_start_ms: f.get_u32("parent_start_ms")?,
            phrase_start_ms: f.get_u32("phrase_start_ms")?,
            speaker_id: f.get_id("speaker_id")?,
            parent_id: f.get_id("parent_id")?,
            phrase_id: f.get_id("phrase_id")?,
            label: f.get_str("label")?,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyllableRecord {
    pub stress_code: u8,
    pub common: SubWordFields,
    pub extension: ExtensionMap,
}

impl ValueRecord for SyllableRecord {
    const OBJECT_TYPE: ObjectType = ObjectType::Syllable;

    fn to_fields(&self) -> FieldSet {
        self.common
            .write(FieldSet::new(Self::OBJECT_TYPE).int("stress_code", self.stress_code))
    }

    fn from_fields(f: &FieldSet, extension: ExtensionMap) -> CodecResult<Self> {
        Ok(Self {
            stress_code: f.get_u8("stress_code")?,
            common: SubWordFields::read(f)?,
            extension,
        })
    }

    fn extension(&self) -> &ExtensionMap {
        &self.extension
    }
}

/// Phone labels use a one-byte length prefix.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PhoneRecord {
    pub position_code: u8,
    pub common: SubWordFields,
    pub extension: ExtensionMap,
}

impl ValueRecord for PhoneRecord {
    const OBJECT_TYPE: ObjectType = ObjectType::Phone;

    fn to_fields(&self) -> FieldSet {
        self.common
            .write(FieldSet::new(Self::OBJECT_TYPE).int("position_code", self.position_code))
    }

    fn from_fields(f: &FieldSet, extension: ExtensionMap) -> CodecResult<Self> {
        Ok(Self {
            position_code: f.get_u8("position_code")?,
            common: SubWordFields::read(f)?,
            extension,
        })
    }

    fn extension(&self) -> &ExtensionMap {
        &self.extension
    }
}

/// A decoded value of any type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnyRecord {
    Audio(AudioRecord),
    Speaker(SpeakerRecord),
    Phrase(PhraseRecord),
    Word(WordRecord),
    Syllable(SyllableRecord),
    Phone(PhoneRecord),
}

impl AnyRecord {
    /// Decode `bytes` with the layout of `object_type`, normally taken from
    /// the value's key.
    pub fn decode(object_type: ObjectType, bytes: &[u8]) -> CodecResult<Self> {
        Ok(match object_type {
            ObjectType::Audio => Self::Audio(AudioRecord::decode(bytes)?),
            ObjectType::Speaker => Self::Speaker(SpeakerRecord::decode(bytes)?),
            ObjectType::Phrase => Self::Phrase(PhraseRecord::decode(bytes)?),
            ObjectType::Word => Self::Word(WordRecord::decode(bytes)?),
            ObjectType::Syllable => Self::Syllable(SyllableRecord::decode(bytes)?),
            ObjectType::Phone => Self::Phone(PhoneRecord::decode(bytes)?),
        })
    }

    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        match self {
            Self::Audio(r) => r.encode(),
            Self::Speaker(r) => r.encode(),
            Self::Phrase(r) => r.encode(),
            Self::Word(r) => r.encode(),
            Self::Syllable(r) => r.encode(),
            Self::Phone(r) => r.encode(),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Audio(_) => ObjectType::Audio,
            Self::Speaker(_) => ObjectType::Speaker,
            Self::Phrase(_) => ObjectType::Phrase,
            Self::Word(_) => ObjectType::Word,
            Self::Syllable(_) => ObjectType::Syllable,
            Self::Phone(_) => ObjectType::Phone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use proptest::prelude::*;

    fn id(b: u8) -> Identifier {
        Identifier::from_bytes([b; 8])
    }

    fn phone(label: &str) -> PhoneRecord {
        PhoneRecord {
            position_code: 2,
            common: SubWordFields {
                end_ms: 130,
                parent_start_ms: 100,
                phrase_start_ms: 0,
                speaker_id: id(1),
                parent_id: id(2),
                phrase_id: id(3),
                label: label.to_string(),
            },
            extension: ExtensionMap::new(),
        }
    }

    #[test]
    fn audio_roundtrip() {
        let rec = AudioRecord {
            n_channels: 2,
            duration_ms: 61_000,
            sample_rate: 16_000,
            filename: "a.wav".into(),
            dialect: "north".into(),
            language: "nl".into(),
            dataset: "cgn".into(),
            extension: ExtensionMap::new(),
        };
        let bytes = rec.encode().unwrap();
        assert_eq!(bytes.len(), 11 + 2 + 5 + 2 + 5 + 2 + 2 + 2 + 3);
        assert_eq!(AudioRecord::decode(&bytes).unwrap(), rec);
    }

    #[test]
    fn speaker_roundtrip_with_empty_strings() {
        let rec = SpeakerRecord {
            gender_code: 9,
            age: 0,
            name: "spk".into(),
            ..Default::default()
        };
        let bytes = rec.encode().unwrap();
        assert_eq!(bytes.len(), 4 + 2 + 3 + 4 * 2);
        assert_eq!(SpeakerRecord::decode(&bytes).unwrap(), rec);
    }

    #[test]
    fn word_roundtrip_keeps_unicode() {
        let rec = WordRecord {
            end_ms: 500,
            parent_start_ms: 0,
            speaker_id: id(4),
            parent_id: id(5),
            label: "één".into(),
            ipa: "eːn".into(),
            extension: ExtensionMap::new(),
        };
        assert_eq!(WordRecord::decode(&rec.encode().unwrap()).unwrap(), rec);
    }

    #[test]
    fn syllable_fixed_header_and_roundtrip() {
        let rec = SyllableRecord {
            stress_code: 1,
            common: phone("ka").common,
            extension: ExtensionMap::new(),
        };
        let bytes = rec.encode().unwrap();
        assert_eq!(bytes.len(), 39 + 2 + 2);
        assert_eq!(bytes[2], 1);
        assert_eq!(SyllableRecord::decode(&bytes).unwrap(), rec);
    }

    #[test]
    fn phone_label_limit_is_255_bytes() {
        let ok = phone(&"p".repeat(255));
        let bytes = ok.encode().unwrap();
        assert_eq!(bytes.len(), 39 + 1 + 255);
        assert_eq!(PhoneRecord::decode(&bytes).unwrap(), ok);

        assert!(matches!(
            phone(&"p".repeat(256)).encode(),
            Err(CodecError::StringTooLong { max: 255, .. })
        ));
    }

    #[test]
    fn extension_survives_record_roundtrip() {
        let mut rec = PhraseRecord {
            end_ms: 2_000,
            speaker_id: id(9),
            label: "hello world".into(),
            extension: ExtensionMap::new(),
        };
        rec.extension.insert("channel".into(), b"left".to_vec());
        let decoded = PhraseRecord::decode(&rec.encode().unwrap()).unwrap();
        assert_eq!(decoded.extension.get("channel").map(Vec::as_slice), Some(&b"left"[..]));
    }

    #[test]
    fn any_record_dispatches_on_type() {
        let rec = AnyRecord::Phone(phone("a"));
        let bytes = rec.encode().unwrap();
        assert_eq!(AnyRecord::decode(ObjectType::Phone, &bytes).unwrap(), rec);
        assert_eq!(rec.object_type(), ObjectType::Phone);
        // same bytes read as a word fail on length bookkeeping
        assert!(AnyRecord::decode(ObjectType::Word, &bytes).is_err());
    }

    proptest! {
        #[test]
        fn phrase_roundtrip(end in any::<u32>(), spk in any::<[u8; 8]>(), label in ".{0,64}") {
            let rec = PhraseRecord {
                end_ms: end,
                speaker_id: Identifier::from_bytes(spk),
                label,
                extension: ExtensionMap::new(),
            };
            prop_assert_eq!(PhraseRecord::decode(&rec.encode().unwrap()).unwrap(), rec);
        }
    }
}
