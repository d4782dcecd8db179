//! Fixed-length, big-endian store keys.
//!
//! Decoding dispatches on length alone (9/10/16/22 bytes) and then checks the
//! embedded rank bytes, so the four key classes can never be confused.

use phono_types::{Identifier, ObjectType};

use crate::error::{CodecError, CodecResult};

/// `[SPEAKER_RANK][speaker_id]`
pub const SPEAKER_KEY_LEN: usize = 9;
/// `[AUDIO_RANK][audio_id][AUDIO_RANK]`
pub const AUDIO_KEY_LEN: usize = 10;
/// `[speaker_id][audio_id]`, only in the speaker-audio namespace.
pub const SPEAKER_AUDIO_KEY_LEN: usize = 16;
/// `[AUDIO_RANK][audio_id][rank][start_ms][segment_id]`
pub const SEGMENT_KEY_LEN: usize = 22;
/// `[AUDIO_RANK][audio_id][child_rank]`
pub const CHILD_SCAN_PREFIX_LEN: usize = 10;
/// `[AUDIO_RANK][audio_id][child_rank][offset_ms]`
pub const TIME_BOUND_LEN: usize = 14;

/// Decoded segment key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub object_type: ObjectType,
    pub audio_id: Identifier,
    pub offset_ms: u32,
    pub segment_id: Identifier,
}

impl SegmentKey {
    /// Re-encode. Infallible because every field is already in range.
    pub fn encode(&self) -> Vec<u8> {
        pack_segment(self.audio_id, self.object_type, self.offset_ms, self.segment_id)
    }
}

/// What a key says about the record it addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyInfo {
    Audio { audio_id: Identifier },
    Speaker { speaker_id: Identifier },
    Segment(SegmentKey),
    SpeakerAudio { speaker_id: Identifier, audio_id: Identifier },
}

impl KeyInfo {
    /// Object type of the addressed record. `None` for link-index keys.
    pub fn object_type(&self) -> Option<ObjectType> {
        match self {
            Self::Audio { .. } => Some(ObjectType::Audio),
            Self::Speaker { .. } => Some(ObjectType::Speaker),
            Self::Segment(seg) => Some(seg.object_type),
            Self::SpeakerAudio { .. } => None,
        }
    }

    /// Identifier of the addressed record. `None` for link-index keys.
    pub fn identifier(&self) -> Option<Identifier> {
        match self {
            Self::Audio { audio_id } => Some(*audio_id),
            Self::Speaker { speaker_id } => Some(*speaker_id),
            Self::Segment(seg) => Some(seg.segment_id),
            Self::SpeakerAudio { .. } => None,
        }
    }
}

/// Key of an audio record.
pub fn audio_key(audio_id: Identifier) -> Vec<u8> {
    let rank = ObjectType::Audio.rank();
    let mut key = Vec::with_capacity(AUDIO_KEY_LEN);
    key.push(rank);
    key.extend_from_slice(audio_id.as_bytes());
    key.push(rank);
    key
}

/// Key of a speaker record.
pub fn speaker_key(speaker_id: Identifier) -> Vec<u8> {
    let mut key = Vec::with_capacity(SPEAKER_KEY_LEN);
    key.push(ObjectType::Speaker.rank());
    key.extend_from_slice(speaker_id.as_bytes());
    key
}

/// Key of a segment record.
///
/// `offset_ms` is the segment start; values outside `[0, 2^32)` are rejected.
pub fn segment_key(
    audio_id: Identifier,
    object_type: ObjectType,
    offset_ms: i64,
    segment_id: Identifier,
) -> CodecResult<Vec<u8>> {
    if !object_type.is_segment() {
        return Err(CodecError::NotASegment(object_type));
    }
    let offset = u32::try_from(offset_ms).map_err(|_| CodecError::OffsetOutOfRange(offset_ms))?;
    Ok(pack_segment(audio_id, object_type, offset, segment_id))
}

/// Key of a speaker-audio link in the secondary index.
pub fn speaker_audio_key(speaker_id: Identifier, audio_id: Identifier) -> Vec<u8> {
    let mut key = Vec::with_capacity(SPEAKER_AUDIO_KEY_LEN);
    key.extend_from_slice(speaker_id.as_bytes());
    key.extend_from_slice(audio_id.as_bytes());
    key
}

/// Prefix matching every link of one speaker.
pub fn speaker_link_prefix(speaker_id: Identifier) -> Vec<u8> {
    speaker_id.as_bytes().to_vec()
}

/// Prefix matching every segment of `child_type` inside one audio.
pub fn child_scan_prefix(audio_id: Identifier, child_type: ObjectType) -> CodecResult<Vec<u8>> {
    if !child_type.is_segment() {
        return Err(CodecError::NotASegment(child_type));
    }
    let mut prefix = Vec::with_capacity(CHILD_SCAN_PREFIX_LEN);
    prefix.push(ObjectType::Audio.rank());
    prefix.extend_from_slice(audio_id.as_bytes());
    prefix.push(child_type.rank());
    Ok(prefix)
}

/// Whether a child starting at `child_start` falls in the scan window of a
/// parent spanning `[start_ms, end_ms)`. A zero-length parent owns only
/// children starting exactly at its start.
pub fn starts_within(start_ms: u32, end_ms: u32, child_start: u32) -> bool {
    if start_ms == end_ms {
        child_start == start_ms
    } else {
        start_ms <= child_start && child_start < end_ms
    }
}

/// Inclusive scan bounds covering children of `child_type` whose start
/// satisfies [`starts_within`].
///
/// The lower bound is a 14-byte prefix. For a non-empty span the upper bound
/// is too, and a full 22-byte key starting exactly at `end_ms` sorts after
/// it, so an inclusive `<= end` scan yields a half-open window on start time.
/// For a zero-length span the upper bound is the largest key at `start_ms`.
pub fn child_time_window(
    audio_id: Identifier,
    child_type: ObjectType,
    start_ms: u32,
    end_ms: u32,
) -> CodecResult<(Vec<u8>, Vec<u8>)> {
    let prefix = child_scan_prefix(audio_id, child_type)?;
    let mut lower = Vec::with_capacity(TIME_BOUND_LEN);
    lower.extend_from_slice(&prefix);
    lower.extend_from_slice(&start_ms.to_be_bytes());
    let mut upper = Vec::with_capacity(SEGMENT_KEY_LEN);
    upper.extend_from_slice(&prefix);
    if start_ms == end_ms {
        upper.extend_from_slice(&start_ms.to_be_bytes());
        upper.extend_from_slice(&[0xff; Identifier::LEN]);
    } else {
        upper.extend_from_slice(&end_ms.to_be_bytes());
    }
    Ok((lower, upper))
}

/// Decode any key class.
pub fn decode_key(key: &[u8]) -> CodecResult<KeyInfo> {
    let corrupt = |reason: &str| CodecError::CorruptKey {
        len: key.len(),
        reason: reason.to_string(),
    };
    let audio_rank = ObjectType::Audio.rank();

    match key.len() {
        SPEAKER_KEY_LEN => {
            if key[0] != ObjectType::Speaker.rank() {
                return Err(corrupt("speaker key must start with the speaker rank"));
            }
            Ok(KeyInfo::Speaker {
                speaker_id: Identifier::from_slice(&key[1..9])?,
            })
        }
        AUDIO_KEY_LEN => {
            if key[0] != audio_rank || key[9] != audio_rank {
                return Err(corrupt("audio key must start and end with the audio rank"));
            }
            Ok(KeyInfo::Audio {
                audio_id: Identifier::from_slice(&key[1..9])?,
            })
        }
        SPEAKER_AUDIO_KEY_LEN => Ok(KeyInfo::SpeakerAudio {
            speaker_id: Identifier::from_slice(&key[..8])?,
            audio_id: Identifier::from_slice(&key[8..])?,
        }),
        SEGMENT_KEY_LEN => {
            if key[0] != audio_rank {
                return Err(corrupt("segment key must start with the audio rank"));
            }
            let object_type =
                ObjectType::from_rank(key[9]).map_err(|_| corrupt("unknown segment rank"))?;
            if !object_type.is_segment() {
                return Err(corrupt("rank byte does not name a segment type"));
            }
            let offset_ms = u32::from_be_bytes([key[10], key[11], key[12], key[13]]);
            Ok(KeyInfo::Segment(SegmentKey {
                object_type,
                audio_id: Identifier::from_slice(&key[1..9])?,
                offset_ms,
                segment_id: Identifier::from_slice(&key[14..22])?,
            }))
        }
        0 => Err(corrupt("empty key")),
        _ => Err(corrupt("unknown key length")),
    }
}

fn pack_segment(
    audio_id: Identifier,
    object_type: ObjectType,
    offset_ms: u32,
    segment_id: Identifier,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(SEGMENT_KEY_LEN);
    key.push(ObjectType::Audio.rank());
    key.extend_from_slice(audio_id.as_bytes());
    key.push(object_type.rank());
    key.extend_from_slice(&offset_ms.to_be_bytes());
    key.extend_from_slice(segment_id.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(byte: u8) -> Identifier {
        Identifier::from_bytes([byte; 8])
    }

    #[test]
    fn fixed_lengths_per_class() {
        assert_eq!(audio_key(id(1)).len(), AUDIO_KEY_LEN);
        assert_eq!(speaker_key(id(1)).len(), SPEAKER_KEY_LEN);
        assert_eq!(speaker_audio_key(id(1), id(2)).len(), SPEAKER_AUDIO_KEY_LEN);
        let seg = segment_key(id(1), ObjectType::Word, 5, id(2)).unwrap();
        assert_eq!(seg.len(), SEGMENT_KEY_LEN);
    }

    #[test]
    fn exact_segment_layout() {
        let key = segment_key(id(0xaa), ObjectType::Syllable, 0x0102_0304, id(0xbb)).unwrap();
        let mut expected = vec![0u8];
        expected.extend_from_slice(&[0xaa; 8]);
        expected.push(3);
        expected.extend_from_slice(&[1, 2, 3, 4]);
        expected.extend_from_slice(&[0xbb; 8]);
        assert_eq!(key, expected);
    }

    #[test]
    fn exact_audio_and_speaker_layout() {
        let mut audio = vec![0u8];
        audio.extend_from_slice(&[7; 8]);
        audio.push(0);
        assert_eq!(audio_key(id(7)), audio);

        let mut speaker = vec![5u8];
        speaker.extend_from_slice(&[9; 8]);
        assert_eq!(speaker_key(id(9)), speaker);
    }

    #[test]
    fn boundary_offsets() {
        for offset in [0i64, u32::MAX as i64] {
            let key = segment_key(id(1), ObjectType::Phone, offset, id(2)).unwrap();
            match decode_key(&key).unwrap() {
                KeyInfo::Segment(seg) => assert_eq!(seg.offset_ms as i64, offset),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn offsets_outside_u32_rejected() {
        assert_eq!(
            segment_key(id(1), ObjectType::Word, -1, id(2)).unwrap_err(),
            CodecError::OffsetOutOfRange(-1)
        );
        let too_big = u32::MAX as i64 + 1;
        assert_eq!(
            segment_key(id(1), ObjectType::Word, too_big, id(2)).unwrap_err(),
            CodecError::OffsetOutOfRange(too_big)
        );
    }

    #[test]
    fn non_segment_types_rejected() {
        assert_eq!(
            segment_key(id(1), ObjectType::Audio, 0, id(2)).unwrap_err(),
            CodecError::NotASegment(ObjectType::Audio)
        );
        assert!(child_scan_prefix(id(1), ObjectType::Speaker).is_err());
    }

    #[test]
    fn decode_rejects_bad_lengths_and_ranks() {
        assert!(matches!(decode_key(&[]), Err(CodecError::CorruptKey { len: 0, .. })));
        assert!(matches!(decode_key(&[0; 11]), Err(CodecError::CorruptKey { len: 11, .. })));

        let mut speaker = speaker_key(id(1));
        speaker[0] = 4;
        assert!(decode_key(&speaker).is_err());

        let mut audio = audio_key(id(1));
        audio[9] = 1;
        assert!(decode_key(&audio).is_err());

        let mut seg = segment_key(id(1), ObjectType::Word, 10, id(2)).unwrap();
        seg[9] = ObjectType::Speaker.rank();
        assert!(decode_key(&seg).is_err());
        seg[9] = 9;
        assert!(decode_key(&seg).is_err());
        seg[9] = ObjectType::Word.rank();
        seg[0] = 1;
        assert!(decode_key(&seg).is_err());
    }

    #[test]
    fn key_info_accessors() {
        let info = decode_key(&speaker_audio_key(id(1), id(2))).unwrap();
        assert_eq!(
            info,
            KeyInfo::SpeakerAudio { speaker_id: id(1), audio_id: id(2) }
        );
        assert_eq!(info.object_type(), None);
        assert_eq!(info.identifier(), None);

        let info = decode_key(&audio_key(id(3))).unwrap();
        assert_eq!(info.object_type(), Some(ObjectType::Audio));
        assert_eq!(info.identifier(), Some(id(3)));
    }

    #[test]
    fn scan_prefix_matches_only_children_of_type() {
        let prefix = child_scan_prefix(id(1), ObjectType::Word).unwrap();
        assert_eq!(prefix.len(), CHILD_SCAN_PREFIX_LEN);
        let word = segment_key(id(1), ObjectType::Word, 100, id(2)).unwrap();
        let phone = segment_key(id(1), ObjectType::Phone, 100, id(2)).unwrap();
        let other_audio = segment_key(id(3), ObjectType::Word, 100, id(2)).unwrap();
        assert!(word.starts_with(&prefix));
        assert!(!phone.starts_with(&prefix));
        assert!(!other_audio.starts_with(&prefix));
    }

    #[test]
    fn time_window_is_half_open_on_start() {
        let (lo, hi) = child_time_window(id(1), ObjectType::Word, 500, 1000).unwrap();
        assert_eq!(lo.len(), TIME_BOUND_LEN);
        let inside = |offset: i64| {
            let k = segment_key(id(1), ObjectType::Word, offset, id(0xff)).unwrap();
            k.as_slice() >= lo.as_slice() && k.as_slice() <= hi.as_slice()
        };
        assert!(!inside(499));
        assert!(inside(500));
        assert!(inside(999));
        assert!(!inside(1000));
    }

    #[test]
    fn zero_length_window_holds_its_start_only() {
        let (lo, hi) = child_time_window(id(1), ObjectType::Word, 700, 700).unwrap();
        let inside = |offset: i64, seg: u8| {
            let k = segment_key(id(1), ObjectType::Word, offset, id(seg)).unwrap();
            k.as_slice() >= lo.as_slice() && k.as_slice() <= hi.as_slice()
        };
        assert!(!inside(699, 0xff));
        assert!(inside(700, 0x01));
        assert!(inside(700, 0xff));
        assert!(!inside(701, 0x01));
        assert!(starts_within(700, 700, 700));
        assert!(!starts_within(0, 1000, 1000));
    }

    proptest! {
        #[test]
        fn segment_roundtrip(
            audio in any::<[u8; 8]>(),
            seg in any::<[u8; 8]>(),
            offset in any::<u32>(),
            rank in 1u8..=4,
        ) {
            let ty = ObjectType::from_rank(rank).unwrap();
            let key = segment_key(audio.into(), ty, offset as i64, seg.into()).unwrap();
            let expected = SegmentKey {
                object_type: ty,
                audio_id: audio.into(),
                offset_ms: offset,
                segment_id: seg.into(),
            };
            prop_assert_eq!(decode_key(&key).unwrap(), KeyInfo::Segment(expected));
            prop_assert_eq!(expected.encode(), key);
        }

        #[test]
        fn audio_speaker_link_roundtrip(a in any::<[u8; 8]>(), b in any::<[u8; 8]>()) {
            let (a, b) = (Identifier::from(a), Identifier::from(b));
            prop_assert_eq!(decode_key(&audio_key(a)).unwrap(), KeyInfo::Audio { audio_id: a });
            prop_assert_eq!(decode_key(&speaker_key(a)).unwrap(), KeyInfo::Speaker { speaker_id: a });
            prop_assert_eq!(
                decode_key(&speaker_audio_key(a, b)).unwrap(),
                KeyInfo::SpeakerAudio { speaker_id: a, audio_id: b }
            );
        }

        #[test]
        fn start_order_is_byte_order(
            audio in any::<[u8; 8]>(),
            id_a in any::<[u8; 8]>(),
            id_b in any::<[u8; 8]>(),
            start_a in any::<u32>(),
            start_b in any::<u32>(),
        ) {
            prop_assume!(start_a < start_b);
            let ka = segment_key(audio.into(), ObjectType::Word, start_a as i64, id_a.into()).unwrap();
            let kb = segment_key(audio.into(), ObjectType::Word, start_b as i64, id_b.into()).unwrap();
            prop_assert!(ka < kb);
        }
    }
}
