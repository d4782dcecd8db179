//! Binary key and value codecs for Phono.
//!
//! Keys embed object type, audio linkage and time ordering so that the
//! byte-lexicographic order of a sorted store equals
//! (audio, type, start time, id) order. Values are a fixed-width header
//! followed by length-prefixed UTF-8 strings, laid out per object type by a
//! declarative [`Layout`]; the type itself is never repeated in the value
//! because the key already records it.
//!
//! # Key classes
//!
//! | class         | layout                                          | bytes |
//! |---------------|-------------------------------------------------|-------|
//! | speaker       | `[5][speaker_id]`                               | 9     |
//! | audio         | `[0][audio_id][0]`                              | 10    |
//! | speaker-audio | `[speaker_id][audio_id]`                        | 16    |
//! | segment       | `[0][audio_id][rank][start_ms: u32 BE][seg_id]` | 22    |

pub mod error;
pub mod key;
pub mod layout;
pub mod record;

pub use error::{CodecError, CodecResult};
pub use key::{
    audio_key, child_scan_prefix, child_time_window, decode_key, segment_key, speaker_audio_key,
    speaker_key, speaker_link_prefix, starts_within, KeyInfo, SegmentKey,
};
pub use layout::{layout, ExtensionMap, FieldKind, FieldSet, FieldSpec, FieldValue, Layout, PrefixWidth};
pub use record::{
    AnyRecord, AudioRecord, PhoneRecord, PhraseRecord, SpeakerRecord, SubWordFields,
    SyllableRecord, ValueRecord, WordRecord,
};
