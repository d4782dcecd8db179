//! Linking protocol: parent/child, audio and speaker assignment.
//!
//! A segment's audio is part of its key, so reassigning audio moves every
//! persisted member of the family to a new key. Speaker links are plain
//! value fields.

use std::collections::{BTreeSet, HashMap};

use phono_codec::{audio_key, speaker_key};
use phono_store::RawKey;
use phono_types::{Identifier, ObjectType};
use tracing::debug;

use crate::error::{HierarchyError, ModelError, ModelResult};
use crate::object::Object;
use crate::session::{SaveOptions, Session};

impl Session {
    /// Make `child` a direct child of `parent`.
    ///
    /// The child must lie inside the parent's span and start before its end
    /// (a zero-length parent takes only zero-length children at its start).
    /// Audio and speaker are reconciled next: a side that has none takes the
    /// other's (propagated through its family); two different values fail.
    /// The child's phrase link flows to its own descendants. With `persist`,
    /// every touched segment is written.
    pub fn add_child(&mut self, parent: Identifier, child: Identifier, persist: bool) -> ModelResult<()> {
        let parent_type = self.segment_type(parent)?;
        let child_type = self.segment_type(child)?;
        if parent_type.child_type() != Some(child_type) {
            return Err(HierarchyError::WrongChildType {
                parent: parent_type,
                child: child_type,
            }
            .into());
        }
        self.segment(parent)?.check_contains(self.segment(child)?)?;

        self.reconcile_audio(parent, child)?;
        self.reconcile_speaker(parent, child)?;

        // Existing children have to be known before the list is extended.
        if !self.segment(parent)?.children_resolved {
            self.children(parent)?;
        }
        let old_parent = self.segment(child)?.parent_id;
        if !old_parent.is_empty() && old_parent != parent {
            self.detach_from_parent(child)?;
        }

        let (parent_start, phrase_id, phrase_start) = {
            let p = self.segment(parent)?;
            if parent_type == ObjectType::Phrase {
                (p.start_ms, p.identifier, p.start_ms)
            } else {
                (p.start_ms, p.phrase_id, p.phrase_start_ms)
            }
        };
        {
            let c = self.segment_mut(child)?;
            c.parent_id = parent;
            c.parent_start_ms = parent_start;
            c.phrase_id = phrase_id;
            c.phrase_start_ms = phrase_start;
        }
        let child_key = self.key_of(child)?;
        {
            let p = self.segment_mut(parent)?;
            if !p.child_keys.contains(&child_key) {
                p.child_keys.push(child_key);
            }
        }

        let below = self.descendants(child)?;
        for &d in &below {
            let s = self.segment_mut(d)?;
            s.phrase_id = phrase_id;
            s.phrase_start_ms = phrase_start;
        }
        debug!(%parent, %child, descendants = below.len(), "child linked");

        if persist {
            let mut touched = vec![parent, child];
            touched.extend(below);
            self.save_many(&touched, SaveOptions::overwrite())?;
        }
        Ok(())
    }

    /// Inverse of [`Session::add_child`]. A phrase never has a parent.
    pub fn add_parent(&mut self, child: Identifier, parent: Identifier, persist: bool) -> ModelResult<()> {
        if self.segment_type(child)? == ObjectType::Phrase {
            return Err(HierarchyError::PhraseHasNoParent.into());
        }
        self.add_child(parent, child, persist)
    }

    /// Attach `segment` (and with `propagate`, its whole family) to `audio`.
    ///
    /// Persisted members move to their new keys; the old keys are deleted.
    pub fn add_audio(&mut self, segment: Identifier, audio: Identifier, propagate: bool) -> ModelResult<()> {
        self.segment_type(segment)?;
        self.require_loaded(audio, ObjectType::Audio)?;
        self.assign_audio(segment, audio, propagate)
    }

    /// Attach `segment` (and with `propagate`, its whole family) to `speaker`.
    pub fn add_speaker(&mut self, segment: Identifier, speaker: Identifier, propagate: bool) -> ModelResult<()> {
        self.segment_type(segment)?;
        self.require_loaded(speaker, ObjectType::Speaker)?;
        self.assign_speaker(segment, speaker, propagate)
    }

    /// Ensure `id` is a cached object of `expected`, loading it if stored.
    fn require_loaded(&mut self, id: Identifier, expected: ObjectType) -> ModelResult<()> {
        if !self.is_cached(id) {
            let key = match expected {
                ObjectType::Audio => audio_key(id),
                _ => speaker_key(id),
            };
            self.load(&key)?;
        }
        let actual = self.object(id)?.object_type();
        if actual != expected {
            return Err(ModelError::WrongType {
                id,
                expected: expected.name(),
                actual,
            });
        }
        Ok(())
    }

    fn reconcile_audio(&mut self, parent: Identifier, child: Identifier) -> ModelResult<()> {
        let p = self.segment(parent)?.audio_id;
        let c = self.segment(child)?.audio_id;
        match (p.non_empty(), c.non_empty()) {
            (Some(p), Some(c)) if p != c => Err(HierarchyError::Mismatch {
                field: "audio",
                parent: p,
                child: c,
            }
            .into()),
            (Some(p), None) => self.assign_audio(child, p, true),
            (None, Some(c)) => self.assign_audio(parent, c, true),
            _ => Ok(()),
        }
    }

    fn reconcile_speaker(&mut self, parent: Identifier, child: Identifier) -> ModelResult<()> {
        let p = self.segment(parent)?.speaker_id;
        let c = self.segment(child)?.speaker_id;
        match (p.non_empty(), c.non_empty()) {
            (Some(p), Some(c)) if p != c => Err(HierarchyError::Mismatch {
                field: "speaker",
                parent: p,
                child: c,
            }
            .into()),
            (Some(p), None) => self.assign_speaker(child, p, true),
            (None, Some(c)) => self.assign_speaker(parent, c, true),
            _ => Ok(()),
        }
    }

    fn members(&mut self, segment: Identifier, propagate: bool) -> ModelResult<Vec<Identifier>> {
        if propagate {
            self.family(segment)
        } else {
            Ok(vec![segment])
        }
    }

    pub(crate) fn assign_audio(&mut self, segment: Identifier, audio: Identifier, propagate: bool) -> ModelResult<()> {
        let members = self.members(segment, propagate)?;
        let mut renames: HashMap<RawKey, RawKey> = HashMap::new();
        let mut moved = Vec::new();
        for &m in &members {
            let old_key = self.key_of(m)?;
            let s = self.segment_mut(m)?;
            if s.audio_id == audio {
                continue;
            }
            s.audio_id = audio;
            renames.insert(old_key, s.key()?);
            moved.push(m);
        }

        // Child lists hold keys; rewrite the ones that just changed.
        if !renames.is_empty() {
            for object in self.objects.values_mut() {
                if let Object::Segment(s) = object {
                    for key in s.child_keys.iter_mut() {
                        if let Some(new_key) = renames.get(key) {
                            *key = new_key.clone();
                        }
                    }
                }
            }
        }

        if self.persistence_enabled() {
            let persisted: Vec<Identifier> = moved.iter().copied().filter(|m| self.is_persisted(*m)).collect();
            self.save_many(&persisted, SaveOptions::overwrite())?;
            for speaker in self.speakers_among(&members)? {
                self.store().link(speaker, audio)?;
            }
        }
        debug!(%segment, %audio, moved = moved.len(), "audio assigned");
        Ok(())
    }

    pub(crate) fn assign_speaker(
        &mut self,
        segment: Identifier,
        speaker: Identifier,
        propagate: bool,
    ) -> ModelResult<()> {
        let members = self.members(segment, propagate)?;
        let mut changed = Vec::new();
        let mut audios = BTreeSet::new();
        for &m in &members {
            let s = self.segment_mut(m)?;
            if let Some(a) = s.audio_id.non_empty() {
                audios.insert(a);
            }
            if s.speaker_id != speaker {
                s.speaker_id = speaker;
                changed.push(m);
            }
        }

        if self.persistence_enabled() {
            let persisted: Vec<Identifier> = changed.iter().copied().filter(|m| self.is_persisted(*m)).collect();
            self.save_many(&persisted, SaveOptions::overwrite())?;
            for audio in audios {
                self.store().link(speaker, audio)?;
            }
        }
        debug!(%segment, %speaker, changed = changed.len(), "speaker assigned");
        Ok(())
    }

    fn speakers_among(&self, members: &[Identifier]) -> ModelResult<BTreeSet<Identifier>> {
        let mut speakers = BTreeSet::new();
        for &m in members {
            if let Some(s) = self.segment(m)?.speaker_id.non_empty() {
                speakers.insert(s);
            }
        }
        Ok(speakers)
    }
}
