//! Navigation between cached objects.
//!
//! Every method returns identifiers and may hydrate objects on the way.
//! Children come back ordered by start time; a segment's children are
//! scanned from the store once and remembered afterwards.

use phono_codec::{audio_key, child_scan_prefix, child_time_window, speaker_key};
use phono_store::{Namespace, RawKey};
use phono_types::{Identifier, ObjectType};

use crate::error::{ModelError, ModelResult};
use crate::object::Object;
use crate::session::Session;

/// A named relation from one object to others.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    /// Direct children of a segment.
    Children,
    /// Direct parent of a segment.
    Parent,
    /// Enclosing segment of the given type, e.g. `word.phrase`.
    Ancestor(ObjectType),
    /// Contained segments of the given type, e.g. `phrase.phones`.
    Descendants(ObjectType),
    /// The audio a segment belongs to.
    Audio,
    /// The speaker of a segment.
    Speaker,
    /// Phrases of an audio.
    Phrases,
    /// Speakers linked to an audio.
    Speakers,
    /// Audios linked to a speaker.
    Audios,
}

impl Relation {
    /// Resolve `name` on objects of `owner`.
    pub fn parse(owner: ObjectType, name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        match (owner, name.as_str()) {
            (ObjectType::Audio, "phrases") => return Some(Self::Phrases),
            (ObjectType::Audio, "speakers") => return Some(Self::Speakers),
            (ObjectType::Speaker, "audios") => return Some(Self::Audios),
            (ObjectType::Audio | ObjectType::Speaker, _) => return None,
            (_, "children") => return Some(Self::Children),
            (_, "parent") => return Some(Self::Parent),
            (_, "audio") => return Some(Self::Audio),
            (_, "speaker") => return Some(Self::Speaker),
            _ => {}
        }
        let depth = owner.depth()?;
        ObjectType::SEGMENTS.into_iter().find_map(|t| {
            let singular = t.name().to_ascii_lowercase();
            let other = t.depth()?;
            if other < depth && name == singular {
                Some(Self::Ancestor(t))
            } else if other > depth && name == format!("{singular}s") {
                Some(Self::Descendants(t))
            } else {
                None
            }
        })
    }

    /// Type of the objects reached from `owner`.
    pub fn target(self, owner: ObjectType) -> Option<ObjectType> {
        match self {
            Self::Children => owner.child_type(),
            Self::Parent => owner.parent_type(),
            Self::Ancestor(t) | Self::Descendants(t) => Some(t),
            Self::Audio | Self::Audios => Some(ObjectType::Audio),
            Self::Speaker | Self::Speakers => Some(ObjectType::Speaker),
            Self::Phrases => Some(ObjectType::Phrase),
        }
    }

    /// Whether the relation can yield more than one object.
    pub fn is_many(self) -> bool {
        matches!(
            self,
            Self::Children | Self::Descendants(_) | Self::Phrases | Self::Speakers | Self::Audios
        )
    }
}

impl Session {
    /// Follow a relation by name.
    pub fn related(&mut self, id: Identifier, name: &str) -> ModelResult<Vec<Identifier>> {
        let owner = self.object(id)?.object_type();
        let relation = Relation::parse(owner, name).ok_or_else(|| ModelError::UnknownRelation {
            object_type: owner,
            name: name.to_string(),
        })?;
        self.follow(id, relation)
    }

    pub fn follow(&mut self, id: Identifier, relation: Relation) -> ModelResult<Vec<Identifier>> {
        match relation {
            Relation::Children => self.children(id),
            Relation::Parent => Ok(self.parent(id)?.into_iter().collect()),
            Relation::Ancestor(t) => Ok(self.ancestor_of_type(id, t)?.into_iter().collect()),
            Relation::Descendants(t) => self.descendants_of_type(id, t),
            Relation::Audio => Ok(self.audio_of(id)?.into_iter().collect()),
            Relation::Speaker => Ok(self.speaker_of(id)?.into_iter().collect()),
            Relation::Phrases => self.segments_of_audio(id, ObjectType::Phrase),
            Relation::Speakers => self.speakers_of_audio(id),
            Relation::Audios => self.audios_of_speaker(id),
        }
    }

    /// Direct children of a segment, ordered by start time.
    pub fn children(&mut self, id: Identifier) -> ModelResult<Vec<Identifier>> {
        let seg = self.segment(id)?;
        let Some(child_type) = seg.object_type().child_type() else {
            return Ok(Vec::new());
        };

        let mut ids = if seg.children_resolved {
            let keys = seg.child_keys.clone();
            self.load_many(&keys)?
        } else {
            let (lo, hi) = child_time_window(seg.audio_id, child_type, seg.start_ms, seg.end_ms)?;
            let mut keys: Vec<RawKey> = Vec::new();
            let mut found = Vec::new();
            let entries = self.store().scan_range(Namespace::Main, &lo, &hi)?;
            for (key, value) in entries {
                let child = self.hydrate(&key, &value)?;
                if self.segment(child)?.parent_id == id {
                    keys.push(key);
                    found.push(child);
                }
            }
            let seg = self.segment_mut(id)?;
            seg.child_keys = keys;
            seg.children_resolved = true;
            found
        };
        self.sort_by_start(&mut ids);
        Ok(ids)
    }

    pub(crate) fn sort_by_start(&self, ids: &mut [Identifier]) {
        ids.sort_by_key(|id| {
            let start = self.segment(*id).map(|s| s.start_ms).unwrap_or(u32::MAX);
            (start, *id)
        });
    }

    /// Direct parent, loaded on demand.
    pub fn parent(&mut self, id: Identifier) -> ModelResult<Option<Identifier>> {
        let seg = self.segment(id)?;
        let parent = seg.parent_id;
        if parent.is_empty() {
            return Ok(None);
        }
        if self.is_cached(parent) {
            return Ok(Some(parent));
        }
        match seg.parent_key()? {
            Some(key) => self.try_load(&key),
            None => Ok(None),
        }
    }

    /// Enclosing phrase; a phrase is its own phrase.
    pub fn phrase_of(&mut self, id: Identifier) -> ModelResult<Option<Identifier>> {
        let seg = self.segment(id)?;
        if seg.object_type() == ObjectType::Phrase {
            return Ok(Some(id));
        }
        let phrase = seg.phrase_id;
        if phrase.is_empty() {
            return Ok(None);
        }
        if self.is_cached(phrase) {
            return Ok(Some(phrase));
        }
        match seg.phrase_key()? {
            Some(key) => self.try_load(&key),
            None => Ok(None),
        }
    }

    /// Closest enclosing segment of `object_type`.
    pub fn ancestor_of_type(
        &mut self,
        id: Identifier,
        object_type: ObjectType,
    ) -> ModelResult<Option<Identifier>> {
        if object_type == ObjectType::Phrase {
            return self.phrase_of(id);
        }
        let mut current = id;
        while let Some(parent) = self.parent(current)? {
            if self.segment(parent)?.object_type() == object_type {
                return Ok(Some(parent));
            }
            current = parent;
        }
        Ok(None)
    }

    /// Audio of a segment, or the audio itself.
    pub fn audio_of(&mut self, id: Identifier) -> ModelResult<Option<Identifier>> {
        let audio = match self.object(id)? {
            Object::Audio(_) => return Ok(Some(id)),
            Object::Speaker(_) => return Ok(None),
            Object::Segment(s) => s.audio_id,
        };
        if audio.is_empty() {
            return Ok(None);
        }
        if self.is_cached(audio) {
            return Ok(Some(audio));
        }
        self.try_load(&audio_key(audio))
    }

    /// Speaker of a segment, or the speaker itself.
    pub fn speaker_of(&mut self, id: Identifier) -> ModelResult<Option<Identifier>> {
        let speaker = match self.object(id)? {
            Object::Speaker(_) => return Ok(Some(id)),
            Object::Audio(_) => return Ok(None),
            Object::Segment(s) => s.speaker_id,
        };
        if speaker.is_empty() {
            return Ok(None);
        }
        if self.is_cached(speaker) {
            return Ok(Some(speaker));
        }
        self.try_load(&speaker_key(speaker))
    }

    /// Stored segments of one type under an audio, in key order.
    pub fn segments_of_audio(
        &mut self,
        audio: Identifier,
        object_type: ObjectType,
    ) -> ModelResult<Vec<Identifier>> {
        let prefix = child_scan_prefix(audio, object_type)?;
        let entries = self.store().scan_prefix(Namespace::Main, &prefix)?;
        entries
            .into_iter()
            .map(|(key, value)| self.hydrate(&key, &value))
            .collect()
    }

    pub fn speakers_of_audio(&mut self, audio: Identifier) -> ModelResult<Vec<Identifier>> {
        let keys: Vec<RawKey> = self
            .store()
            .speakers_of_audio(audio)?
            .into_iter()
            .map(speaker_key)
            .collect();
        self.load_present(&keys)
    }

    pub fn audios_of_speaker(&mut self, speaker: Identifier) -> ModelResult<Vec<Identifier>> {
        let keys: Vec<RawKey> = self
            .store()
            .audios_of_speaker(speaker)?
            .into_iter()
            .map(audio_key)
            .collect();
        self.load_present(&keys)
    }

    /// Record that `speaker` talks in `audio`.
    pub fn link_speaker_audio(&mut self, speaker: Identifier, audio: Identifier) -> ModelResult<()> {
        Ok(self.store().link(speaker, audio)?)
    }

    /// Segments sharing the parent of `id` (phrases: sharing the audio),
    /// `id` included, ordered by start time.
    pub fn siblings(&mut self, id: Identifier) -> ModelResult<Vec<Identifier>> {
        let seg = self.segment(id)?;
        if seg.object_type() == ObjectType::Phrase {
            if seg.audio_id.is_empty() {
                return Ok(vec![id]);
            }
            let audio = seg.audio_id;
            let mut ids = self.segments_of_audio(audio, ObjectType::Phrase)?;
            let unsaved = self.cached_of_type(ObjectType::Phrase).into_iter().filter(|p| {
                !ids.contains(p)
                    && self
                        .segment(*p)
                        .map(|s| s.audio_id == audio)
                        .unwrap_or(false)
            });
            let unsaved: Vec<Identifier> = unsaved.collect();
            ids.extend(unsaved);
            self.sort_by_start(&mut ids);
            return Ok(ids);
        }
        match self.parent(id)? {
            Some(parent) => self.children(parent),
            None => Ok(vec![id]),
        }
    }

    pub fn next_sibling(&mut self, id: Identifier) -> ModelResult<Option<Identifier>> {
        let siblings = self.siblings(id)?;
        Ok(siblings
            .iter()
            .position(|s| *s == id)
            .and_then(|i| siblings.get(i + 1).copied()))
    }

    pub fn prev_sibling(&mut self, id: Identifier) -> ModelResult<Option<Identifier>> {
        let siblings = self.siblings(id)?;
        Ok(siblings
            .iter()
            .position(|s| *s == id)
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| siblings.get(i).copied()))
    }

    /// Enclosing segments, nearest first.
    pub fn ancestors(&mut self, id: Identifier) -> ModelResult<Vec<Identifier>> {
        let mut out = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current)? {
            out.push(parent);
            current = parent;
        }
        Ok(out)
    }

    /// Contained segments in depth-first, start-time order.
    pub fn descendants(&mut self, id: Identifier) -> ModelResult<Vec<Identifier>> {
        let mut out = Vec::new();
        let mut stack = self.children(id)?;
        stack.reverse();
        while let Some(next) = stack.pop() {
            out.push(next);
            let mut below = self.children(next)?;
            below.reverse();
            stack.extend(below);
        }
        Ok(out)
    }

    pub fn descendants_of_type(
        &mut self,
        id: Identifier,
        object_type: ObjectType,
    ) -> ModelResult<Vec<Identifier>> {
        let all = self.descendants(id)?;
        Ok(all
            .into_iter()
            .filter(|d| self.get(*d).map(Object::object_type) == Some(object_type))
            .collect())
    }

    /// Ancestors (outermost first), the segment itself, then descendants.
    pub fn family(&mut self, id: Identifier) -> ModelResult<Vec<Identifier>> {
        let mut out = self.ancestors(id)?;
        out.reverse();
        out.push(id);
        out.extend(self.descendants(id)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Audio, Segment, Speaker};
    use crate::session::SaveOptions;

    /// phrase [0, 1000) > two words > syllables > phones, all saved.
    fn fixture(s: &mut Session) -> (Identifier, Vec<Identifier>) {
        let audio = s.add(Audio::new("a.wav"));
        let speaker = s.add(Speaker::new("S1"));
        let phrase = s.add(Segment::phrase("hello world", 0, 1000).unwrap());
        s.add_audio(phrase, audio, true).unwrap();
        s.add_speaker(phrase, speaker, true).unwrap();

        let hello = s.add(Segment::word("hello", 0, 500).unwrap());
        let world = s.add(Segment::word("world", 500, 1000).unwrap());
        s.add_child(phrase, world, false).unwrap();
        s.add_child(phrase, hello, false).unwrap();
        let syl = s.add(Segment::syllable("hel", 0, 250).unwrap());
        s.add_child(hello, syl, false).unwrap();
        let ph = s.add(Segment::phone("h", 0, 100).unwrap());
        s.add_child(syl, ph, false).unwrap();

        let all = vec![audio, speaker, phrase, hello, world, syl, ph];
        s.save_many(&all, SaveOptions::default()).unwrap();
        (phrase, all)
    }

    #[test]
    fn relation_names() {
        use ObjectType::*;
        assert_eq!(Relation::parse(Phrase, "words"), Some(Relation::Descendants(Word)));
        assert_eq!(Relation::parse(Phrase, "phones"), Some(Relation::Descendants(Phone)));
        assert_eq!(Relation::parse(Phone, "word"), Some(Relation::Ancestor(Word)));
        assert_eq!(Relation::parse(Word, "phrase"), Some(Relation::Ancestor(Phrase)));
        assert_eq!(Relation::parse(Audio, "phrases"), Some(Relation::Phrases));
        assert_eq!(Relation::parse(Speaker, "audios"), Some(Relation::Audios));
        assert_eq!(Relation::parse(Word, "words"), None);
        assert_eq!(Relation::parse(Phrase, "word"), None);
        assert_eq!(Relation::parse(Audio, "audio"), None);
        assert_eq!(Relation::Children.target(Syllable), Some(Phone));
        assert_eq!(Relation::Parent.target(Phrase), None);
        assert!(Relation::Descendants(Word).is_many());
        assert!(!Relation::Audio.is_many());
    }

    #[test]
    fn children_are_time_ordered() {
        let mut s = Session::in_memory();
        let (phrase, all) = fixture(&mut s);
        assert_eq!(s.children(phrase).unwrap(), vec![all[3], all[4]]);
    }

    #[test]
    fn children_after_reload_use_one_scan() {
        let mut s = Session::in_memory();
        let (phrase, all) = fixture(&mut s);
        let key = s.key_of(phrase).unwrap();
        s.clear_cache();

        let phrase_id = s.load(&key).unwrap();
        assert_eq!(phrase_id, phrase);
        let scans = s.store().stats().scans;
        assert_eq!(s.children(phrase).unwrap(), vec![all[3], all[4]]);
        assert_eq!(s.store().stats().scans, scans + 1);
        s.children(phrase).unwrap();
        assert_eq!(s.store().stats().scans, scans + 1);
    }

    #[test]
    fn upward_navigation_loads_on_demand() {
        let mut s = Session::in_memory();
        let (phrase, all) = fixture(&mut s);
        let phone_key = s.key_of(all[6]).unwrap();
        s.clear_cache();

        let phone = s.load(&phone_key).unwrap();
        assert_eq!(s.parent(phone).unwrap(), Some(all[5]));
        assert_eq!(s.ancestor_of_type(phone, ObjectType::Word).unwrap(), Some(all[3]));
        assert_eq!(s.phrase_of(phone).unwrap(), Some(phrase));
        assert_eq!(s.ancestors(phone).unwrap(), vec![all[5], all[3], phrase]);
        assert_eq!(s.audio_of(phone).unwrap(), Some(all[0]));
        assert_eq!(s.speaker_of(phone).unwrap(), Some(all[1]));
        assert_eq!(s.phrase_of(phrase).unwrap(), Some(phrase));
        assert_eq!(s.parent(phrase).unwrap(), None);
    }

    #[test]
    fn named_relations() {
        let mut s = Session::in_memory();
        let (phrase, all) = fixture(&mut s);
        assert_eq!(s.related(phrase, "words").unwrap(), vec![all[3], all[4]]);
        assert_eq!(s.related(phrase, "phones").unwrap(), vec![all[6]]);
        assert_eq!(s.related(all[6], "phrase").unwrap(), vec![phrase]);
        assert_eq!(s.related(all[0], "phrases").unwrap(), vec![phrase]);
        assert_eq!(s.related(all[0], "speakers").unwrap(), vec![all[1]]);
        assert_eq!(s.related(all[1], "audios").unwrap(), vec![all[0]]);
        let err = s.related(phrase, "vowels").unwrap_err();
        assert!(matches!(err, ModelError::UnknownRelation { .. }));
    }

    #[test]
    fn siblings_and_family() {
        let mut s = Session::in_memory();
        let (phrase, all) = fixture(&mut s);
        let (hello, world) = (all[3], all[4]);
        assert_eq!(s.next_sibling(hello).unwrap(), Some(world));
        assert_eq!(s.next_sibling(world).unwrap(), None);
        assert_eq!(s.prev_sibling(world).unwrap(), Some(hello));
        assert_eq!(s.prev_sibling(hello).unwrap(), None);
        assert_eq!(s.siblings(phrase).unwrap(), vec![phrase]);

        assert_eq!(s.descendants(phrase).unwrap(), vec![hello, all[5], all[6], world]);
        assert_eq!(s.family(all[5]).unwrap(), vec![phrase, hello, all[5], all[6]]);
    }
}
