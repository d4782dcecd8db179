//! End-to-end scenarios across codec, store and session.

use phono_store::{Namespace, RawKey};
use phono_types::{Identifier, ObjectType};

use crate::error::{ErrorKind, HierarchyError, ModelError};
use crate::ingest::Interval;
use crate::object::{Audio, Gender, Object, Segment, Speaker};
use crate::session::{SaveOptions, Session};
use crate::PhonoConfig;

struct Corpus {
    audio: Identifier,
    speaker: Identifier,
    phrase: Identifier,
    words: Vec<Identifier>,
    phones: Vec<Identifier>,
}

/// "hello world" on a.wav, spoken by S1, two phones per word, all saved.
fn hello_world(s: &mut Session) -> Corpus {
    let audio = s.add(Audio::new("a.wav"));
    let mut spk = Speaker::new("S1");
    spk.gender = Gender::Female;
    let speaker = s.add(spk);

    let words = s
        .add_intervals(
            ObjectType::Word,
            &[Interval::new("hello", 0, 500), Interval::new("world", 500, 1000)],
        )
        .unwrap();
    let phones = s
        .add_intervals(
            ObjectType::Phone,
            &[
                Interval::new("h", 0, 200),
                Interval::new("lo", 200, 500),
                Interval::new("w", 500, 700),
                Interval::new("ld", 700, 1000),
            ],
        )
        .unwrap();
    let phrase = s.phrase_from_words(&words).unwrap();
    s.add_audio(phrase, audio, true).unwrap();
    s.add_speaker(phrase, speaker, true).unwrap();

    // Phones hang under one syllable per word.
    let mut all = vec![audio, speaker, phrase];
    for &w in &words {
        let (label, start, end) = {
            let seg = s.segment(w).unwrap();
            (seg.label.clone(), seg.start_ms, seg.end_ms)
        };
        let syl = s.add(Segment::syllable(label, start, end).unwrap());
        s.add_child(w, syl, false).unwrap();
        s.attach_contained(syl, &phones, false).unwrap();
        all.push(w);
        all.push(syl);
    }
    all.extend(&phones);
    s.save_many(&all, SaveOptions::default()).unwrap();

    Corpus {
        audio,
        speaker,
        phrase,
        words,
        phones,
    }
}

fn labels(s: &Session, ids: &[Identifier]) -> Vec<String> {
    ids.iter().map(|id| s.segment(*id).unwrap().label.clone()).collect()
}

#[test]
fn end_to_end_reload() {
    let mut s = Session::in_memory();
    let c = hello_world(&mut s);
    let originals: Vec<Object> = [c.phrase, c.words[0], c.words[1]]
        .iter()
        .map(|id| s.object(*id).unwrap().clone())
        .collect();
    let phrase_key = s.key_of(c.phrase).unwrap();
    s.clear_cache();

    let loaded = s.load_many(&[phrase_key]).unwrap();
    assert_eq!(loaded, vec![c.phrase]);
    let scanned = s.segments_of_audio(c.audio, ObjectType::Word).unwrap();
    assert_eq!(scanned, c.words);

    let words = s.related(c.phrase, "words").unwrap();
    assert_eq!(words, c.words);
    assert_eq!(labels(&s, &words), ["hello", "world"]);
    for (id, original) in [c.phrase, c.words[0], c.words[1]].iter().zip(&originals) {
        assert!(s.object(*id).unwrap().same_identity(original));
        let seg = s.segment(*id).unwrap();
        let orig = original.as_segment().unwrap();
        assert_eq!(
            (seg.label.as_str(), seg.start_ms, seg.end_ms, seg.speaker_id),
            (orig.label.as_str(), orig.start_ms, orig.end_ms, orig.speaker_id)
        );
    }

    let first_phones = s.related(words[0], "phones").unwrap();
    assert_eq!(first_phones, &c.phones[..2]);
    assert_eq!(labels(&s, &first_phones), ["h", "lo"]);

    let audio = s.related(c.phrase, "audio").unwrap();
    assert_eq!(s.audio(audio[0]).unwrap().filename, "a.wav");
    let speaker = s.speaker_of(c.phones[3]).unwrap().unwrap();
    assert_eq!(speaker, c.speaker);
    assert_eq!(s.speaker(speaker).unwrap().gender, Gender::Female);
}

#[test]
fn audio_propagation_rekeys_the_family() {
    let mut s = Session::in_memory();
    let c = hello_world(&mut s);
    let family = s.family(c.phrase).unwrap();
    assert_eq!(family.len(), 9);
    let old_keys: Vec<RawKey> = family.iter().map(|id| s.key_of(*id).unwrap()).collect();
    let old_values: Vec<Vec<u8>> = old_keys
        .iter()
        .map(|k| s.store().get(Namespace::Main, k).unwrap().unwrap())
        .collect();

    let other = s.add(Audio::new("b.wav"));
    s.save(other, SaveOptions::default()).unwrap();
    s.add_audio(c.phrase, other, true).unwrap();

    for (id, (old_key, old_value)) in family.iter().zip(old_keys.iter().zip(&old_values)) {
        assert!(!s.store().exists(Namespace::Main, old_key).unwrap());
        let new_key = s.key_of(*id).unwrap();
        assert_eq!(s.stored_key(*id), Some(&new_key));
        assert_eq!(&new_key[1..9], other.as_bytes());
        assert_eq!(s.store().get(Namespace::Main, &new_key).unwrap().as_ref(), Some(old_value));
    }
    assert!(s.segments_of_audio(c.audio, ObjectType::Phone).unwrap().is_empty());
    assert_eq!(s.segments_of_audio(other, ObjectType::Phone).unwrap().len(), 4);
    assert_eq!(s.store().speakers_of_audio(other).unwrap(), vec![c.speaker]);

    s.clear_cache();
    let phrase_key = phono_codec::segment_key(other, ObjectType::Phrase, 0, c.phrase).unwrap();
    let phrase = s.load(&phrase_key).unwrap();
    assert_eq!(s.descendants(phrase).unwrap().len(), 8);
}

#[test]
fn cache_hit_costs_no_store_access() {
    let mut s = Session::in_memory();
    let c = hello_world(&mut s);
    let keys: Vec<RawKey> = c.phones.iter().map(|id| s.key_of(*id).unwrap()).collect();
    let before = s.store().stats();
    for key in &keys {
        s.load(key).unwrap();
    }
    s.load_many(&keys).unwrap();
    assert_eq!(s.store().stats(), before);
}

#[test]
fn hierarchy_violations() {
    let mut s = Session::in_memory();
    let c = hello_world(&mut s);
    let stray = s.add(Segment::syllable("x", 0, 10).unwrap());
    let err = s.add_child(c.phones[0], stray, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Hierarchy);

    let other = s.add(Segment::phrase("q", 0, 10).unwrap());
    for x in [other, c.words[0], c.audio] {
        let err = s.add_parent(c.phrase, x, false).unwrap_err();
        assert!(matches!(err, ModelError::Hierarchy(HierarchyError::PhraseHasNoParent)));
    }
}

#[test]
fn graceful_and_forced_saves() {
    let mut s = Session::in_memory();
    let c = hello_world(&mut s);
    let err = s.save(c.phrase, SaveOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(!s.save(c.phrase, SaveOptions::graceful()).unwrap());

    s.segment_mut(c.phrase).unwrap().label = "hello there".into();
    assert!(s.save(c.phrase, SaveOptions::overwrite()).unwrap());
    let key = s.key_of(c.phrase).unwrap();
    assert_eq!(s.save_count(&key), 2);
    s.clear_cache();
    let id = s.load(&key).unwrap();
    assert_eq!(s.segment(id).unwrap().label, "hello there");
}

#[test]
fn suspended_persistence_writes_nothing() {
    let mut s = Session::in_memory();
    let writes = s.store().stats().writes;
    {
        let mut quiet = s.suspend_persistence();
        let c = hello_world(&mut quiet);
        assert!(!quiet.is_persisted(c.phrase));
    }
    assert_eq!(s.store().len(Namespace::Main).unwrap(), 0);
    assert_eq!(s.store().len(Namespace::SpeakerAudio).unwrap(), 0);
    assert_eq!(s.store().stats().writes, writes);
    assert!(s.persistence_enabled());
}

#[test]
fn delete_cascades_to_descendants() {
    let mut s = Session::in_memory();
    let c = hello_world(&mut s);
    assert_eq!(s.store().len(Namespace::Main).unwrap(), 11);

    let removed = s.delete(c.words[0]).unwrap();
    assert_eq!(removed, 4);
    assert!(!s.is_cached(c.phones[0]));
    assert_eq!(s.children(c.phrase).unwrap(), vec![c.words[1]]);

    s.delete_many(&[c.phrase, c.words[1]]).unwrap();
    assert_eq!(s.store().len(Namespace::Main).unwrap(), 2);
}

#[test]
fn zero_length_segments_survive_reload_and_delete() {
    let mut s = Session::in_memory();
    let audio = s.add(Audio::new("a.wav"));

    // A point word at the phrase end would be invisible to the child scan.
    let stray = s
        .add_intervals(ObjectType::Word, &[Interval::new("a", 0, 500), Interval::new("b", 1000, 1000)])
        .unwrap();
    let err = s.phrase_from_words(&stray).unwrap_err();
    assert!(matches!(
        err,
        ModelError::Hierarchy(HierarchyError::OutsideParent { child_start: 1000, .. })
    ));

    let words = s
        .add_intervals(
            ObjectType::Word,
            &[
                Interval::new("a", 0, 500),
                Interval::new("b", 500, 500),
                Interval::new("c", 500, 1000),
            ],
        )
        .unwrap();
    let phrase = s.phrase_from_words(&words).unwrap();
    let point = s.add(Segment::phrase("p", 2000, 2000).unwrap());
    let dot = s.add(Segment::word("p", 2000, 2000).unwrap());
    s.add_child(point, dot, false).unwrap();
    s.add_audio(phrase, audio, true).unwrap();
    s.add_audio(point, audio, true).unwrap();

    let mut all = vec![audio, phrase, point, dot];
    all.extend(&words);
    s.save_many(&all, SaveOptions::default()).unwrap();
    let keys = [s.key_of(phrase).unwrap(), s.key_of(point).unwrap()];
    s.clear_cache();

    let phrase = s.load(&keys[0]).unwrap();
    let point = s.load(&keys[1]).unwrap();
    assert_eq!(s.children(phrase).unwrap().len(), 3);
    assert_eq!(s.children(point).unwrap(), vec![dot]);

    assert_eq!(s.delete(phrase).unwrap(), 4);
    assert_eq!(s.delete(point).unwrap(), 2);
    assert_eq!(s.store().len(Namespace::Main).unwrap(), 1);
}

#[test]
fn sample_preload_loads_whole_hierarchy() {
    let dir = tempfile::tempdir().unwrap();
    let key = {
        let mut s = Session::open(PhonoConfig::at(dir.path())).unwrap();
        let c = hello_world(&mut s);
        let key = s.key_of(c.phrase).unwrap();
        s.close().unwrap();
        key
    };

    let mut s = Session::open(PhonoConfig::at(dir.path())).unwrap();
    let phrases = s.preload_sample(1.0).unwrap();
    assert_eq!(phrases.len(), 1);
    assert_eq!(s.key_of(phrases[0]).unwrap(), key);
    assert_eq!(s.cached_len(), 11);
    assert_eq!(s.stats().sample_fraction, Some(1.0));

    let before = s.store().stats();
    let words = s.children(phrases[0]).unwrap();
    assert_eq!(labels(&s, &words), ["hello", "world"]);
    let syllables = s.children(words[1]).unwrap();
    assert_eq!(s.children(syllables[0]).unwrap().len(), 2);
    assert_eq!(s.store().stats(), before);
}

#[test]
fn preloaded_types_resolve_children_from_memory() {
    let mut s = Session::in_memory();
    let c = hello_world(&mut s);
    s.clear_cache();
    for t in [ObjectType::Word, ObjectType::Phrase] {
        s.preload_type(t).unwrap();
    }
    let before = s.store().stats();
    assert_eq!(s.children(c.phrase).unwrap(), c.words);
    assert_eq!(s.store().stats(), before);
}
