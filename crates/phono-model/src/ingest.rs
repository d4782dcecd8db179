//! Helpers for ingestion and playback collaborators.

use phono_types::{Identifier, ObjectType};
use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::object::Segment;
use crate::session::{SaveOptions, Session};

/// An already validated annotation interval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interval {
    pub label: String,
    pub start_ms: u32,
    pub end_ms: u32,
}

impl Interval {
    pub fn new(label: impl Into<String>, start_ms: u32, end_ms: u32) -> Self {
        Self {
            label: label.into(),
            start_ms,
            end_ms,
        }
    }
}

/// What a player needs to render a segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackSpan {
    pub filename: String,
    pub start_ms: u32,
    pub end_ms: u32,
}

impl Session {
    /// Cache one new segment of `object_type` per interval. Nothing is written.
    pub fn add_intervals(
        &mut self,
        object_type: ObjectType,
        intervals: &[Interval],
    ) -> ModelResult<Vec<Identifier>> {
        intervals
            .iter()
            .map(|i| {
                let seg = Segment::new(object_type, i.label.clone(), i.start_ms, i.end_ms)?;
                Ok(self.add(seg))
            })
            .collect()
    }

    /// Link every candidate whose span lies inside `parent` as its child.
    /// Returns the attached candidates in start order.
    pub fn attach_contained(
        &mut self,
        parent: Identifier,
        candidates: &[Identifier],
        persist: bool,
    ) -> ModelResult<Vec<Identifier>> {
        let mut inside = Vec::new();
        {
            let p = self.segment(parent)?;
            for &c in candidates {
                if p.contains_span(self.segment(c)?) {
                    inside.push(c);
                }
            }
        }
        self.sort_by_start(&mut inside);
        for &c in &inside {
            self.add_child(parent, c, false)?;
        }
        if persist && !inside.is_empty() {
            let mut touched = vec![parent];
            touched.extend(&inside);
            for &c in &inside {
                touched.extend(self.descendants(c)?);
            }
            self.save_many(&touched, SaveOptions::overwrite())?;
        }
        debug!(%parent, candidates = candidates.len(), attached = inside.len(), "attach_contained");
        Ok(inside)
    }

    /// New phrase spanning `words`, labelled with their labels joined by
    /// spaces, with the words attached as children. Nothing is written.
    ///
    /// A zero-length word at the phrase end fails with
    /// [`HierarchyError::OutsideParent`](crate::HierarchyError::OutsideParent).
    pub fn phrase_from_words(&mut self, words: &[Identifier]) -> ModelResult<Identifier> {
        let mut words = words.to_vec();
        if words.is_empty() {
            return Err(ModelError::EmptyInput("phrase_from_words"));
        }
        self.sort_by_start(&mut words);

        let mut labels = Vec::with_capacity(words.len());
        let (mut start, mut end) = (u32::MAX, 0);
        for &w in &words {
            let seg = self.segment(w)?;
            if seg.object_type() != ObjectType::Word {
                return Err(ModelError::WrongType {
                    id: w,
                    expected: "Word",
                    actual: seg.object_type(),
                });
            }
            labels.push(seg.label.clone());
            start = start.min(seg.start_ms);
            end = end.max(seg.end_ms);
        }

        let phrase = Segment::phrase(labels.join(" "), start, end)?;
        for &w in &words {
            phrase.check_contains(self.segment(w)?)?;
        }
        let phrase = self.add(phrase);
        for &w in &words {
            self.add_child(phrase, w, false)?;
        }
        Ok(phrase)
    }

    /// Audio file and time span of a segment.
    pub fn playback_span(&mut self, id: Identifier) -> ModelResult<PlaybackSpan> {
        let (start_ms, end_ms) = {
            let seg = self.segment(id)?;
            (seg.start_ms, seg.end_ms)
        };
        let audio = self.audio_of(id)?.ok_or(ModelError::MissingAudio(id))?;
        Ok(PlaybackSpan {
            filename: self.audio(audio)?.filename.clone(),
            start_ms,
            end_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Audio, Speaker};

    #[test]
    fn attach_contained_picks_inner_spans() {
        let mut s = Session::in_memory();
        let word = s.add(Segment::word("kat", 1000, 1600).unwrap());
        let syls = s
            .add_intervals(
                ObjectType::Syllable,
                &[
                    Interval::new("at", 1300, 1600),
                    Interval::new("k", 1000, 1300),
                    Interval::new("next", 1600, 1900),
                    Interval::new("straddle", 900, 1100),
                ],
            )
            .unwrap();

        let attached = s.attach_contained(word, &syls, false).unwrap();
        assert_eq!(attached, vec![syls[1], syls[0]]);
        assert_eq!(s.children(word).unwrap(), vec![syls[1], syls[0]]);
        assert!(s.segment(syls[2]).unwrap().parent_id.is_empty());
        assert!(!s.is_persisted(word));
    }

    #[test]
    fn attach_contained_can_persist() {
        let mut s = Session::in_memory();
        let syl = s.add(Segment::syllable("ka", 0, 300).unwrap());
        let phones = s
            .add_intervals(ObjectType::Phone, &[Interval::new("k", 0, 100), Interval::new("a", 100, 300)])
            .unwrap();
        s.attach_contained(syl, &phones, true).unwrap();
        assert!(s.is_persisted(syl));
        assert!(phones.iter().all(|p| s.is_persisted(*p)));
    }

    #[test]
    fn add_intervals_rejects_reversed_span() {
        let mut s = Session::in_memory();
        let err = s
            .add_intervals(ObjectType::Word, &[Interval::new("bad", 10, 5)])
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidSpan { .. }));
    }

    #[test]
    fn phrase_from_words_spans_and_labels() {
        let mut s = Session::in_memory();
        let audio = s.add(Audio::new("a.wav"));
        let spk = s.add(Speaker::new("S1"));
        let world = s.add(Segment::word("world", 500, 900).unwrap());
        let hello = s.add(Segment::word("hello", 100, 500).unwrap());
        s.add_audio(world, audio, false).unwrap();
        s.add_speaker(world, spk, false).unwrap();

        let phrase = s.phrase_from_words(&[world, hello]).unwrap();
        let p = s.segment(phrase).unwrap();
        assert_eq!(p.label, "hello world");
        assert_eq!((p.start_ms, p.end_ms), (100, 900));
        assert_eq!(p.audio_id, audio);
        assert_eq!(p.speaker_id, spk);
        assert_eq!(s.segment(hello).unwrap().audio_id, audio);
        assert_eq!(s.children(phrase).unwrap(), vec![hello, world]);

        assert!(matches!(s.phrase_from_words(&[]), Err(ModelError::EmptyInput(_))));
        assert!(matches!(
            s.phrase_from_words(&[phrase]),
            Err(ModelError::WrongType { .. })
        ));
    }

    #[test]
    fn playback_span_needs_audio() {
        let mut s = Session::in_memory();
        let audio = s.add(Audio::new("fn000123.wav"));
        s.save(audio, SaveOptions::default()).unwrap();
        let phrase = s.add(Segment::phrase("p", 1500, 2500).unwrap());
        assert!(matches!(s.playback_span(phrase), Err(ModelError::MissingAudio(_))));

        s.add_audio(phrase, audio, true).unwrap();
        assert_eq!(
            s.playback_span(phrase).unwrap(),
            PlaybackSpan {
                filename: "fn000123.wav".into(),
                start_ms: 1500,
                end_ms: 2500,
            }
        );
    }
}
